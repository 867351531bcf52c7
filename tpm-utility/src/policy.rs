// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Key attribute checks and scheme defaulting
//!
//! Mirrors what the TPM enforces for general-purpose RSA keys so a misuse is
//! reported before any command is sent.

use tpm2::{Error, Result, TpmAlgId, TpmtPublic, TpmtScheme};

/// Scheme asked for by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeRequest {
    /// Pick the default for the operation
    Default,
    Explicit(TpmAlgId),
}

/// Hash algorithm asked for by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashRequest {
    /// Pick the default for the operation (by digest length when signing)
    Default,
    Explicit(TpmAlgId),
}

impl From<TpmAlgId> for SchemeRequest {
    fn from(alg: TpmAlgId) -> Self {
        match alg {
            TpmAlgId::Null => SchemeRequest::Default,
            alg => SchemeRequest::Explicit(alg),
        }
    }
}

impl From<TpmAlgId> for HashRequest {
    fn from(alg: TpmAlgId) -> Self {
        match alg {
            TpmAlgId::Null => HashRequest::Default,
            alg => HashRequest::Explicit(alg),
        }
    }
}

/// What the key is about to be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOperation {
    Sign { digest_len: usize },
    Verify { digest_len: usize },
    Encrypt,
    Decrypt,
}

impl KeyOperation {
    fn is_signature(self) -> bool {
        matches!(self, KeyOperation::Sign { .. } | KeyOperation::Verify { .. })
    }
}

/// Fully specified scheme ready to be sent to the TPM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedScheme {
    pub scheme: TpmAlgId,
    /// `None` for schemes without a hash (RSAES)
    pub hash_alg: Option<TpmAlgId>,
}

impl ResolvedScheme {
    pub fn to_tpmt(self) -> TpmtScheme {
        TpmtScheme {
            scheme: self.scheme,
            hash_alg: self.hash_alg,
        }
    }
}

/// Check that `public` permits `operation` and fill in scheme defaults.
///
/// Fails with [`Error::BadParameter`] when the key is not an RSA key, lacks
/// the sign or decrypt attribute the operation needs, is restricted, or when
/// the scheme cannot be used with the operation.
pub fn validate_and_resolve_scheme(
    public: &TpmtPublic,
    scheme: SchemeRequest,
    hash: HashRequest,
    operation: KeyOperation,
) -> Result<ResolvedScheme> {
    if public.type_alg != TpmAlgId::Rsa {
        return Err(Error::BadParameter);
    }
    let attributes = public.object_attributes;
    if attributes.is_restricted() {
        return Err(Error::BadParameter);
    }

    if operation.is_signature() {
        if !attributes.can_sign() {
            return Err(Error::BadParameter);
        }
        let scheme = match scheme {
            SchemeRequest::Default => TpmAlgId::RsaSsa,
            SchemeRequest::Explicit(s @ (TpmAlgId::RsaSsa | TpmAlgId::RsaPss)) => s,
            SchemeRequest::Explicit(_) => return Err(Error::BadParameter),
        };
        let digest_len = match operation {
            KeyOperation::Sign { digest_len } | KeyOperation::Verify { digest_len } => digest_len,
            _ => 0,
        };
        let hash_alg = match hash {
            HashRequest::Explicit(h) if h.is_hash() => h,
            HashRequest::Explicit(_) => return Err(Error::BadParameter),
            HashRequest::Default => match digest_len {
                20 => TpmAlgId::Sha1,
                32 => TpmAlgId::Sha256,
                _ => return Err(Error::BadParameter),
            },
        };
        return Ok(ResolvedScheme {
            scheme,
            hash_alg: Some(hash_alg),
        });
    }

    if !attributes.can_decrypt() {
        return Err(Error::BadParameter);
    }
    match scheme {
        SchemeRequest::Default | SchemeRequest::Explicit(TpmAlgId::Oaep) => {
            let hash_alg = match hash {
                HashRequest::Default => TpmAlgId::Sha256,
                HashRequest::Explicit(h) if h.is_hash() => h,
                HashRequest::Explicit(_) => return Err(Error::BadParameter),
            };
            Ok(ResolvedScheme {
                scheme: TpmAlgId::Oaep,
                hash_alg: Some(hash_alg),
            })
        }
        SchemeRequest::Explicit(TpmAlgId::RsaEs) => Ok(ResolvedScheme {
            scheme: TpmAlgId::RsaEs,
            hash_alg: None,
        }),
        SchemeRequest::Explicit(_) => Err(Error::BadParameter),
    }
}
