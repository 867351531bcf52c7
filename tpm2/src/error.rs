// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Error type shared by the command layer and everything built on top of it.
//!
//! Every failure carries a single numeric result code. Codes reported by the
//! TPM are passed through untouched; failures detected on the host before a
//! command is sent live in a separate layer so the two never collide.

use thiserror::Error;

use super::constants::tpm_rc;

/// Bit position of the layer field in a result code.
pub const RC_LAYER_SHIFT: u32 = 16;
pub const RC_LAYER_MASK: u32 = 0xFF << RC_LAYER_SHIFT;

/// Layer for errors raised by the host-side command layer.
pub const SAPI_RC_LAYER: u32 = 8 << RC_LAYER_SHIFT;
/// Layer for errors raised by the device transport.
pub const TCTI_RC_LAYER: u32 = 10 << RC_LAYER_SHIFT;
/// Layer for errors raised by authorization delegates.
pub const AUTH_RC_LAYER: u32 = 12 << RC_LAYER_SHIFT;

pub const SAPI_RC_BAD_PARAMETER: u32 = SAPI_RC_LAYER + 0x00B;
pub const SAPI_RC_INVALID_SESSIONS: u32 = SAPI_RC_LAYER + 0x00D;
pub const SAPI_RC_BAD_SIZE: u32 = SAPI_RC_LAYER + 0x010;
pub const SAPI_RC_MALFORMED_RESPONSE: u32 = SAPI_RC_LAYER + 0x011;
pub const TCTI_RC_IO_ERROR: u32 = TCTI_RC_LAYER + 0x00A;
pub const AUTH_RC_AUTHORIZATION_FAILED: u32 = AUTH_RC_LAYER + 0x001;

/// TPM and host-side failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Result code reported by the TPM
    #[error("{}", error_string(*.0))]
    Tpm(u32),
    #[error("bad parameter")]
    BadParameter,
    #[error("bad size")]
    BadSize,
    #[error("invalid sessions")]
    InvalidSessions,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("response authorization failed")]
    AuthorizationFailed,
    #[error("device i/o failure: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Numeric result code for this error.
    pub fn code(&self) -> u32 {
        match self {
            Error::Tpm(rc) => *rc,
            Error::BadParameter => SAPI_RC_BAD_PARAMETER,
            Error::BadSize => SAPI_RC_BAD_SIZE,
            Error::InvalidSessions => SAPI_RC_INVALID_SESSIONS,
            Error::MalformedResponse(_) => SAPI_RC_MALFORMED_RESPONSE,
            Error::AuthorizationFailed => AUTH_RC_AUTHORIZATION_FAILED,
            Error::Io(_) => TCTI_RC_IO_ERROR,
        }
    }

    /// The TPM response code, if this error came from the TPM.
    pub fn tpm_code(&self) -> Option<u32> {
        match self {
            Error::Tpm(rc) => Some(*rc),
            _ => None,
        }
    }

    /// Whether this error is the given TPM response code, ignoring the
    /// handle/parameter/session number of format-one codes.
    pub fn is_tpm(&self, rc: u32) -> bool {
        match self {
            Error::Tpm(code) => base_code(*code) == rc,
            _ => false,
        }
    }

    pub fn malformed(what: impl Into<String>) -> Self {
        Error::MalformedResponse(what.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

/// Strips the handle/parameter/session number from a format-one code.
pub fn base_code(rc: u32) -> u32 {
    if rc & RC_LAYER_MASK == 0 && rc & tpm_rc::RC_FMT1 != 0 {
        rc & (tpm_rc::RC_FMT1 | 0x3F)
    } else {
        rc
    }
}

fn tpm_code_name(rc: u32) -> Option<&'static str> {
    let name = match rc {
        tpm_rc::SUCCESS => "TPM_RC_SUCCESS",
        tpm_rc::BAD_TAG => "TPM_RC_BAD_TAG",
        tpm_rc::INITIALIZE => "TPM_RC_INITIALIZE",
        tpm_rc::FAILURE => "TPM_RC_FAILURE",
        tpm_rc::SEQUENCE => "TPM_RC_SEQUENCE",
        tpm_rc::DISABLED => "TPM_RC_DISABLED",
        tpm_rc::EXCLUSIVE => "TPM_RC_EXCLUSIVE",
        tpm_rc::AUTH_TYPE => "TPM_RC_AUTH_TYPE",
        tpm_rc::AUTH_MISSING => "TPM_RC_AUTH_MISSING",
        tpm_rc::POLICY => "TPM_RC_POLICY",
        tpm_rc::PCR => "TPM_RC_PCR",
        tpm_rc::PCR_CHANGED => "TPM_RC_PCR_CHANGED",
        tpm_rc::TOO_MANY_CONTEXTS => "TPM_RC_TOO_MANY_CONTEXTS",
        tpm_rc::AUTH_UNAVAILABLE => "TPM_RC_AUTH_UNAVAILABLE",
        tpm_rc::REBOOT => "TPM_RC_REBOOT",
        tpm_rc::COMMAND_SIZE => "TPM_RC_COMMAND_SIZE",
        tpm_rc::COMMAND_CODE => "TPM_RC_COMMAND_CODE",
        tpm_rc::AUTHSIZE => "TPM_RC_AUTHSIZE",
        tpm_rc::NV_RANGE => "TPM_RC_NV_RANGE",
        tpm_rc::NV_SIZE => "TPM_RC_NV_SIZE",
        tpm_rc::NV_LOCKED => "TPM_RC_NV_LOCKED",
        tpm_rc::NV_AUTHORIZATION => "TPM_RC_NV_AUTHORIZATION",
        tpm_rc::NV_UNINITIALIZED => "TPM_RC_NV_UNINITIALIZED",
        tpm_rc::NV_SPACE => "TPM_RC_NV_SPACE",
        tpm_rc::NV_DEFINED => "TPM_RC_NV_DEFINED",
        tpm_rc::BAD_CONTEXT => "TPM_RC_BAD_CONTEXT",
        tpm_rc::CPHASH => "TPM_RC_CPHASH",
        tpm_rc::PARENT => "TPM_RC_PARENT",
        tpm_rc::NEEDS_TEST => "TPM_RC_NEEDS_TEST",
        tpm_rc::SENSITIVE => "TPM_RC_SENSITIVE",
        tpm_rc::ASYMMETRIC => "TPM_RC_ASYMMETRIC",
        tpm_rc::ATTRIBUTES => "TPM_RC_ATTRIBUTES",
        tpm_rc::HASH => "TPM_RC_HASH",
        tpm_rc::VALUE => "TPM_RC_VALUE",
        tpm_rc::HIERARCHY => "TPM_RC_HIERARCHY",
        tpm_rc::KEY_SIZE => "TPM_RC_KEY_SIZE",
        tpm_rc::MGF => "TPM_RC_MGF",
        tpm_rc::MODE => "TPM_RC_MODE",
        tpm_rc::TYPE => "TPM_RC_TYPE",
        tpm_rc::HANDLE => "TPM_RC_HANDLE",
        tpm_rc::KDF => "TPM_RC_KDF",
        tpm_rc::RANGE => "TPM_RC_RANGE",
        tpm_rc::AUTH_FAIL => "TPM_RC_AUTH_FAIL",
        tpm_rc::NONCE => "TPM_RC_NONCE",
        tpm_rc::SCHEME => "TPM_RC_SCHEME",
        tpm_rc::SIZE => "TPM_RC_SIZE",
        tpm_rc::SYMMETRIC => "TPM_RC_SYMMETRIC",
        tpm_rc::TAG => "TPM_RC_TAG",
        tpm_rc::SELECTOR => "TPM_RC_SELECTOR",
        tpm_rc::INSUFFICIENT => "TPM_RC_INSUFFICIENT",
        tpm_rc::SIGNATURE => "TPM_RC_SIGNATURE",
        tpm_rc::KEY => "TPM_RC_KEY",
        tpm_rc::POLICY_FAIL => "TPM_RC_POLICY_FAIL",
        tpm_rc::INTEGRITY => "TPM_RC_INTEGRITY",
        tpm_rc::TICKET => "TPM_RC_TICKET",
        tpm_rc::BAD_AUTH => "TPM_RC_BAD_AUTH",
        tpm_rc::CURVE => "TPM_RC_CURVE",
        tpm_rc::CONTEXT_GAP => "TPM_RC_CONTEXT_GAP",
        tpm_rc::OBJECT_MEMORY => "TPM_RC_OBJECT_MEMORY",
        tpm_rc::SESSION_MEMORY => "TPM_RC_SESSION_MEMORY",
        tpm_rc::MEMORY => "TPM_RC_MEMORY",
        tpm_rc::OBJECT_HANDLES => "TPM_RC_OBJECT_HANDLES",
        tpm_rc::LOCALITY => "TPM_RC_LOCALITY",
        tpm_rc::YIELDED => "TPM_RC_YIELDED",
        tpm_rc::CANCELED => "TPM_RC_CANCELED",
        tpm_rc::TESTING => "TPM_RC_TESTING",
        tpm_rc::NV_RATE => "TPM_RC_NV_RATE",
        tpm_rc::LOCKOUT => "TPM_RC_LOCKOUT",
        tpm_rc::RETRY => "TPM_RC_RETRY",
        tpm_rc::NV_UNAVAILABLE => "TPM_RC_NV_UNAVAILABLE",
        _ => return None,
    };
    Some(name)
}

fn host_code_name(rc: u32) -> Option<&'static str> {
    let name = match rc {
        SAPI_RC_BAD_PARAMETER => "SAPI_RC_BAD_PARAMETER",
        SAPI_RC_INVALID_SESSIONS => "SAPI_RC_INVALID_SESSIONS",
        SAPI_RC_BAD_SIZE => "SAPI_RC_BAD_SIZE",
        SAPI_RC_MALFORMED_RESPONSE => "SAPI_RC_MALFORMED_RESPONSE",
        TCTI_RC_IO_ERROR => "TCTI_RC_IO_ERROR",
        AUTH_RC_AUTHORIZATION_FAILED => "AUTH_RC_AUTHORIZATION_FAILED",
        _ => return None,
    };
    Some(name)
}

fn layer_name(layer: u32) -> &'static str {
    match layer {
        0 => "TPM",
        SAPI_RC_LAYER => "SAPI",
        TCTI_RC_LAYER => "TCTI",
        AUTH_RC_LAYER => "Authorization",
        _ => "Unknown",
    }
}

/// Human-readable description of a result code, for diagnostics only.
pub fn error_string(rc: u32) -> String {
    let layer = rc & RC_LAYER_MASK;
    if layer != 0 {
        return match host_code_name(rc) {
            Some(name) => format!("{name} (0x{rc:08x})"),
            None => format!(
                "{} layer error 0x{:04x} (0x{rc:08x})",
                layer_name(layer),
                rc & !RC_LAYER_MASK
            ),
        };
    }

    let base = base_code(rc);
    let name = tpm_code_name(base)
        .map(str::to_string)
        .unwrap_or_else(|| format!("unknown TPM error 0x{base:03x}"));

    if rc & tpm_rc::RC_FMT1 == 0 {
        return format!("{name} (0x{rc:08x})");
    }

    // Format one: bits 8..11 carry the parameter, handle or session number.
    let number = (rc >> 8) & 0xF;
    if number == 0 {
        format!("{name} (0x{rc:08x})")
    } else if rc & tpm_rc::RC_P != 0 {
        format!("{name} on parameter {number} (0x{rc:08x})")
    } else if number & 0x8 != 0 {
        format!("{name} on session {} (0x{rc:08x})", number & 0x7)
    } else {
        format!("{name} on handle {number} (0x{rc:08x})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_disjoint() {
        assert_eq!(Error::BadParameter.code(), 0x0008_000B);
        assert_eq!(Error::BadSize.code(), 0x0008_0010);
        assert_eq!(Error::InvalidSessions.code(), 0x0008_000D);
        assert_eq!(Error::Tpm(tpm_rc::FAILURE).code(), 0x101);
        assert_ne!(Error::BadSize.code() & RC_LAYER_MASK, 0);
    }

    #[test]
    fn test_error_string_format_zero() {
        assert_eq!(error_string(0x101), "TPM_RC_FAILURE (0x00000101)");
        assert!(error_string(tpm_rc::AUTH_MISSING).starts_with("TPM_RC_AUTH_MISSING"));
    }

    #[test]
    fn test_error_string_format_one() {
        // TPM_RC_VALUE on parameter 1
        assert_eq!(
            error_string(0x1C4),
            "TPM_RC_VALUE on parameter 1 (0x000001c4)"
        );
        // TPM_RC_HANDLE on handle 1
        assert_eq!(error_string(0x18B), "TPM_RC_HANDLE on handle 1 (0x0000018b)");
        // TPM_RC_AUTH_FAIL on session 1
        assert_eq!(
            error_string(0x98E),
            "TPM_RC_AUTH_FAIL on session 1 (0x0000098e)"
        );
        assert!(Error::Tpm(0x18B).is_tpm(tpm_rc::HANDLE));
    }

    #[test]
    fn test_error_string_host_layers() {
        assert_eq!(
            error_string(SAPI_RC_BAD_SIZE),
            "SAPI_RC_BAD_SIZE (0x00080010)"
        );
        assert!(error_string(SAPI_RC_LAYER + 0x7F).starts_with("SAPI layer error"));
        assert_eq!(Error::Tpm(0x101).to_string(), "TPM_RC_FAILURE (0x00000101)");
    }
}
