// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Authorization delegates
//!
//! A delegate produces the authorization area of a command and validates the
//! authorization area of the matching response. The command layer hands it the
//! cpHash/rpHash so session-based delegates can compute HMACs; the password
//! delegate ignores them.

use super::constants::*;
use super::error::{Error, Result};
use super::marshal::*;

/// Supplies and checks the authorization of a single command.
pub trait AuthorizationDelegate {
    /// Serialized TPMS_AUTH_COMMAND for a command with the given cpHash.
    fn command_authorization(
        &mut self,
        cp_hash: &[u8],
        is_command_parameter_encryption_possible: bool,
        is_response_parameter_encryption_possible: bool,
    ) -> Result<Vec<u8>>;

    /// Validate the serialized TPMS_AUTH_RESPONSE against the rpHash.
    fn check_response_authorization(&mut self, rp_hash: &[u8], authorization: &[u8])
        -> Result<()>;

    /// Encrypt the first TPM2B command parameter in place.
    fn encrypt_command_parameter(&mut self, parameter: &mut Vec<u8>) -> Result<()>;

    /// Decrypt the first TPM2B response parameter in place.
    fn decrypt_response_parameter(&mut self, parameter: &mut Vec<u8>) -> Result<()>;

    /// Authorization value of the entity the next command acts on.
    fn set_entity_authorization_value(&mut self, _value: &[u8]) {}
}

/// Reborrow an optional delegate for one more command.
pub fn delegate_mut<'s>(
    delegate: &'s mut Option<&mut dyn AuthorizationDelegate>,
) -> Option<&'s mut dyn AuthorizationDelegate> {
    match delegate {
        Some(d) => {
            let d: &'s mut dyn AuthorizationDelegate = &mut **d;
            Some(d)
        }
        None => None,
    }
}

/// Plain password authorization (TPM_RS_PW).
#[derive(Debug, Clone, Default)]
pub struct PasswordDelegate {
    password: Vec<u8>,
}

impl PasswordDelegate {
    pub fn new(password: impl Into<Vec<u8>>) -> Self {
        Self {
            password: password.into(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl AuthorizationDelegate for PasswordDelegate {
    fn command_authorization(
        &mut self,
        _cp_hash: &[u8],
        _is_command_parameter_encryption_possible: bool,
        _is_response_parameter_encryption_possible: bool,
    ) -> Result<Vec<u8>> {
        let mut buf = CommandBuffer::with_capacity(9 + self.password.len());
        buf.put_u32(tpm_rh::PW);
        buf.put_tpm2b_empty(); // nonceCaller
        buf.put_u8(TpmaSa::CONTINUE_SESSION);
        buf.put_tpm2b(&self.password);
        Ok(buf.into_vec())
    }

    fn check_response_authorization(
        &mut self,
        _rp_hash: &[u8],
        authorization: &[u8],
    ) -> Result<()> {
        let mut buf = ResponseBuffer::new(authorization);
        let nonce = buf.get_tpm2b().map_err(|_| Error::AuthorizationFailed)?;
        let _attributes = buf.get_u8().map_err(|_| Error::AuthorizationFailed)?;
        let hmac = buf.get_tpm2b().map_err(|_| Error::AuthorizationFailed)?;
        if !nonce.is_empty() || !hmac.is_empty() || buf.remaining() != 0 {
            return Err(Error::AuthorizationFailed);
        }
        Ok(())
    }

    fn encrypt_command_parameter(&mut self, _parameter: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn decrypt_response_parameter(&mut self, _parameter: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn set_entity_authorization_value(&mut self, value: &[u8]) {
        self.password = value.to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_auth_area() {
        let mut delegate = PasswordDelegate::new(b"secret".to_vec());
        let auth = delegate.command_authorization(&[0u8; 32], true, true).unwrap();
        assert_eq!(&auth[..4], &tpm_rh::PW.to_be_bytes());
        assert_eq!(&auth[4..6], &[0, 0]);
        assert_eq!(auth[6], TpmaSa::CONTINUE_SESSION);
        assert_eq!(&auth[7..9], &[0, 6]);
        assert_eq!(&auth[9..], b"secret");
    }

    #[test]
    fn test_password_response_check() {
        let mut delegate = PasswordDelegate::empty();
        assert!(delegate
            .check_response_authorization(&[], &[0, 0, 1, 0, 0])
            .is_ok());
        assert_eq!(
            delegate.check_response_authorization(&[], &[0, 1, 0xAA, 1, 0, 0]),
            Err(Error::AuthorizationFailed)
        );
        assert_eq!(
            delegate.check_response_authorization(&[], &[0, 0]),
            Err(Error::AuthorizationFailed)
        );
    }

    #[test]
    fn test_delegate_reborrow() {
        fn touch(delegate: Option<&mut dyn AuthorizationDelegate>) {
            if let Some(d) = delegate {
                d.set_entity_authorization_value(b"x");
            }
        }
        let mut password = PasswordDelegate::empty();
        let mut delegate: Option<&mut dyn AuthorizationDelegate> = Some(&mut password);
        touch(delegate_mut(&mut delegate));
        touch(delegate_mut(&mut delegate));
        let auth = password.command_authorization(&[], false, false).unwrap();
        assert_eq!(&auth[9..], b"x");
    }
}
