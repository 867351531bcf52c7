// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: BUSL-1.1

//! TPM 2.0 constants and command codes

/// TPM 2.0 Command Codes (TPM_CC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TpmCc {
    EvictControl = 0x00000120,
    HierarchyControl = 0x00000121,
    NvUndefineSpace = 0x00000122,
    Clear = 0x00000126,
    HierarchyChangeAuth = 0x00000129,
    NvDefineSpace = 0x0000012A,
    PcrAllocate = 0x0000012B,
    CreatePrimary = 0x00000131,
    NvWrite = 0x00000137,
    NvWriteLock = 0x00000138,
    SelfTest = 0x00000143,
    Startup = 0x00000144,
    Shutdown = 0x00000145,
    StirRandom = 0x00000146,
    NvRead = 0x0000014E,
    ObjectChangeAuth = 0x00000150,
    Create = 0x00000153,
    Import = 0x00000156,
    Load = 0x00000157,
    RsaDecrypt = 0x00000159,
    Sign = 0x0000015D,
    FlushContext = 0x00000165,
    NvReadPublic = 0x00000169,
    ReadPublic = 0x00000173,
    RsaEncrypt = 0x00000174,
    VerifySignature = 0x00000177,
    GetCapability = 0x0000017A,
    GetRandom = 0x0000017B,
    PcrRead = 0x0000017E,
    PcrExtend = 0x00000182,
}

impl TpmCc {
    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

/// TPM 2.0 Response Codes (TPM_RC)
pub mod tpm_rc {
    pub const SUCCESS: u32 = 0x000;
    pub const BAD_TAG: u32 = 0x01E;

    pub const RC_FMT1: u32 = 0x080;
    pub const RC_P: u32 = 0x040;
    pub const RC_VER1: u32 = 0x100;
    pub const RC_WARN: u32 = 0x900;

    // Format 0 errors
    pub const INITIALIZE: u32 = RC_VER1;
    pub const FAILURE: u32 = RC_VER1 + 0x001;
    pub const SEQUENCE: u32 = RC_VER1 + 0x003;
    pub const DISABLED: u32 = RC_VER1 + 0x020;
    pub const EXCLUSIVE: u32 = RC_VER1 + 0x021;
    pub const AUTH_TYPE: u32 = RC_VER1 + 0x024;
    pub const AUTH_MISSING: u32 = RC_VER1 + 0x025;
    pub const POLICY: u32 = RC_VER1 + 0x026;
    pub const PCR: u32 = RC_VER1 + 0x027;
    pub const PCR_CHANGED: u32 = RC_VER1 + 0x028;
    pub const TOO_MANY_CONTEXTS: u32 = RC_VER1 + 0x02E;
    pub const AUTH_UNAVAILABLE: u32 = RC_VER1 + 0x02F;
    pub const REBOOT: u32 = RC_VER1 + 0x030;
    pub const COMMAND_SIZE: u32 = RC_VER1 + 0x042;
    pub const COMMAND_CODE: u32 = RC_VER1 + 0x043;
    pub const AUTHSIZE: u32 = RC_VER1 + 0x044;
    pub const NV_RANGE: u32 = RC_VER1 + 0x046;
    pub const NV_SIZE: u32 = RC_VER1 + 0x047;
    pub const NV_LOCKED: u32 = RC_VER1 + 0x048;
    pub const NV_AUTHORIZATION: u32 = RC_VER1 + 0x049;
    pub const NV_UNINITIALIZED: u32 = RC_VER1 + 0x04A;
    pub const NV_SPACE: u32 = RC_VER1 + 0x04B;
    pub const NV_DEFINED: u32 = RC_VER1 + 0x04C;
    pub const BAD_CONTEXT: u32 = RC_VER1 + 0x050;
    pub const CPHASH: u32 = RC_VER1 + 0x051;
    pub const PARENT: u32 = RC_VER1 + 0x052;
    pub const NEEDS_TEST: u32 = RC_VER1 + 0x053;
    pub const SENSITIVE: u32 = RC_VER1 + 0x055;

    // Format 1 errors (parameter, handle and session errors)
    pub const ASYMMETRIC: u32 = RC_FMT1 + 0x001;
    pub const ATTRIBUTES: u32 = RC_FMT1 + 0x002;
    pub const HASH: u32 = RC_FMT1 + 0x003;
    pub const VALUE: u32 = RC_FMT1 + 0x004;
    pub const HIERARCHY: u32 = RC_FMT1 + 0x005;
    pub const KEY_SIZE: u32 = RC_FMT1 + 0x007;
    pub const MGF: u32 = RC_FMT1 + 0x008;
    pub const MODE: u32 = RC_FMT1 + 0x009;
    pub const TYPE: u32 = RC_FMT1 + 0x00A;
    pub const HANDLE: u32 = RC_FMT1 + 0x00B;
    pub const KDF: u32 = RC_FMT1 + 0x00C;
    pub const RANGE: u32 = RC_FMT1 + 0x00D;
    pub const AUTH_FAIL: u32 = RC_FMT1 + 0x00E;
    pub const NONCE: u32 = RC_FMT1 + 0x00F;
    pub const SCHEME: u32 = RC_FMT1 + 0x012;
    pub const SIZE: u32 = RC_FMT1 + 0x015;
    pub const SYMMETRIC: u32 = RC_FMT1 + 0x016;
    pub const TAG: u32 = RC_FMT1 + 0x017;
    pub const SELECTOR: u32 = RC_FMT1 + 0x018;
    pub const INSUFFICIENT: u32 = RC_FMT1 + 0x01A;
    pub const SIGNATURE: u32 = RC_FMT1 + 0x01B;
    pub const KEY: u32 = RC_FMT1 + 0x01C;
    pub const POLICY_FAIL: u32 = RC_FMT1 + 0x01D;
    pub const INTEGRITY: u32 = RC_FMT1 + 0x01F;
    pub const TICKET: u32 = RC_FMT1 + 0x020;
    pub const BAD_AUTH: u32 = RC_FMT1 + 0x022;
    pub const CURVE: u32 = RC_FMT1 + 0x026;

    // Warnings
    pub const CONTEXT_GAP: u32 = RC_WARN + 0x001;
    pub const OBJECT_MEMORY: u32 = RC_WARN + 0x002;
    pub const SESSION_MEMORY: u32 = RC_WARN + 0x003;
    pub const MEMORY: u32 = RC_WARN + 0x004;
    pub const OBJECT_HANDLES: u32 = RC_WARN + 0x006;
    pub const LOCALITY: u32 = RC_WARN + 0x007;
    pub const YIELDED: u32 = RC_WARN + 0x008;
    pub const CANCELED: u32 = RC_WARN + 0x009;
    pub const TESTING: u32 = RC_WARN + 0x00A;
    pub const NV_RATE: u32 = RC_WARN + 0x020;
    pub const LOCKOUT: u32 = RC_WARN + 0x021;
    pub const RETRY: u32 = RC_WARN + 0x022;
    pub const NV_UNAVAILABLE: u32 = RC_WARN + 0x023;
}

/// TPM 2.0 Algorithm IDs (TPM_ALG_ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TpmAlgId {
    Rsa = 0x0001,
    Sha1 = 0x0004,
    Aes = 0x0006,
    KeyedHash = 0x0008,
    Sha256 = 0x000B,
    Sha384 = 0x000C,
    Sha512 = 0x000D,
    Null = 0x0010,
    RsaSsa = 0x0014,
    RsaEs = 0x0015,
    RsaPss = 0x0016,
    Oaep = 0x0017,
    EcDsa = 0x0018,
    Ecc = 0x0023,
    SymCipher = 0x0025,
    Cfb = 0x0043,
}

impl TpmAlgId {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0001 => Some(TpmAlgId::Rsa),
            0x0004 => Some(TpmAlgId::Sha1),
            0x0006 => Some(TpmAlgId::Aes),
            0x0008 => Some(TpmAlgId::KeyedHash),
            0x000B => Some(TpmAlgId::Sha256),
            0x000C => Some(TpmAlgId::Sha384),
            0x000D => Some(TpmAlgId::Sha512),
            0x0010 => Some(TpmAlgId::Null),
            0x0014 => Some(TpmAlgId::RsaSsa),
            0x0015 => Some(TpmAlgId::RsaEs),
            0x0016 => Some(TpmAlgId::RsaPss),
            0x0017 => Some(TpmAlgId::Oaep),
            0x0018 => Some(TpmAlgId::EcDsa),
            0x0023 => Some(TpmAlgId::Ecc),
            0x0025 => Some(TpmAlgId::SymCipher),
            0x0043 => Some(TpmAlgId::Cfb),
            _ => None,
        }
    }

    pub fn digest_size(self) -> usize {
        match self {
            TpmAlgId::Sha1 => 20,
            TpmAlgId::Sha256 => 32,
            TpmAlgId::Sha384 => 48,
            TpmAlgId::Sha512 => 64,
            _ => 0,
        }
    }

    pub fn is_hash(self) -> bool {
        self.digest_size() != 0
    }
}

/// TPM 2.0 Handle Types (most significant octet of a handle)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TpmHt {
    Pcr = 0x00,
    NvIndex = 0x01,
    HmacSession = 0x02,
    PolicySession = 0x03,
    Permanent = 0x40,
    Transient = 0x80,
    Persistent = 0x81,
}

impl TpmHt {
    pub fn of(handle: u32) -> Option<Self> {
        match (handle >> HR_SHIFT) as u8 {
            0x00 => Some(TpmHt::Pcr),
            0x01 => Some(TpmHt::NvIndex),
            0x02 => Some(TpmHt::HmacSession),
            0x03 => Some(TpmHt::PolicySession),
            0x40 => Some(TpmHt::Permanent),
            0x80 => Some(TpmHt::Transient),
            0x81 => Some(TpmHt::Persistent),
            _ => None,
        }
    }
}

pub const HR_SHIFT: u32 = 24;
pub const HR_PCR: u32 = 0x00000000;
pub const NV_INDEX_FIRST: u32 = 0x01000000;
pub const TRANSIENT_FIRST: u32 = 0x80000000;
pub const PERSISTENT_FIRST: u32 = 0x81000000;

/// TPM 2.0 Permanent Handles
pub mod tpm_rh {
    pub const FIRST: u32 = 0x40000000;
    pub const OWNER: u32 = 0x40000001;
    pub const NULL: u32 = 0x40000007;
    pub const PW: u32 = 0x40000009; // Password authorization
    pub const LOCKOUT: u32 = 0x4000000A;
    pub const ENDORSEMENT: u32 = 0x4000000B;
    pub const PLATFORM: u32 = 0x4000000C;
}

/// Number of PCRs implemented by the reference platform.
pub const IMPLEMENTATION_PCR: u32 = 24;
/// Minimum size of a PCR selection bitmap.
pub const PCR_SELECT_MIN: usize = ((IMPLEMENTATION_PCR + 7) / 8) as usize;

/// Largest value accepted in a TPM2B_DIGEST-sized authorization field.
pub const SHA256_DIGEST_SIZE: usize = 32;

/// TPM 2.0 Startup Types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmSu {
    Clear = 0x0000,
    State = 0x0001,
}

impl TpmSu {
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// TPM 2.0 Capability Types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TpmCap {
    Handles = 0x00000001,
    Commands = 0x00000002,
    Pcrs = 0x00000005,
    TpmProperties = 0x00000006,
    PcrProperties = 0x00000007,
}

impl TpmCap {
    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

/// TPM 2.0 Property Tags (TPM_PT)
pub mod tpm_pt {
    pub const FIXED: u32 = 0x100;
    pub const VAR: u32 = 0x200;
    pub const PERMANENT: u32 = VAR;
    pub const STARTUP_CLEAR: u32 = VAR + 1;
}

/// TPMA_PERMANENT bits
pub mod tpma_permanent {
    pub const OWNER_AUTH_SET: u32 = 1 << 0;
    pub const ENDORSEMENT_AUTH_SET: u32 = 1 << 1;
    pub const LOCKOUT_AUTH_SET: u32 = 1 << 2;
    pub const DISABLE_CLEAR: u32 = 1 << 8;
    pub const IN_LOCKOUT: u32 = 1 << 9;
}

/// TPMA_STARTUP_CLEAR bits
pub mod tpma_startup_clear {
    pub const PH_ENABLE: u32 = 1 << 0;
    pub const SH_ENABLE: u32 = 1 << 1;
    pub const EH_ENABLE: u32 = 1 << 2;
    pub const PH_ENABLE_NV: u32 = 1 << 3;
    pub const ORDERLY: u32 = 1 << 31;
}

/// TPM 2.0 Object Attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmaObject(pub u32);

impl TpmaObject {
    pub const FIXED_TPM: u32 = 1 << 1;
    pub const ST_CLEAR: u32 = 1 << 2;
    pub const FIXED_PARENT: u32 = 1 << 4;
    pub const SENSITIVE_DATA_ORIGIN: u32 = 1 << 5;
    pub const USER_WITH_AUTH: u32 = 1 << 6;
    pub const ADMIN_WITH_POLICY: u32 = 1 << 7;
    pub const NO_DA: u32 = 1 << 10;
    pub const ENCRYPTED_DUPLICATION: u32 = 1 << 11;
    pub const RESTRICTED: u32 = 1 << 16;
    pub const DECRYPT: u32 = 1 << 17;
    pub const SIGN_ENCRYPT: u32 = 1 << 18;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    pub fn is_restricted(self) -> bool {
        self.contains(Self::RESTRICTED)
    }

    pub fn can_decrypt(self) -> bool {
        self.contains(Self::DECRYPT)
    }

    pub fn can_sign(self) -> bool {
        self.contains(Self::SIGN_ENCRYPT)
    }

    pub fn with_fixed_tpm(mut self) -> Self {
        self.0 |= Self::FIXED_TPM;
        self
    }

    pub fn with_fixed_parent(mut self) -> Self {
        self.0 |= Self::FIXED_PARENT;
        self
    }

    pub fn with_sensitive_data_origin(mut self) -> Self {
        self.0 |= Self::SENSITIVE_DATA_ORIGIN;
        self
    }

    pub fn with_user_with_auth(mut self) -> Self {
        self.0 |= Self::USER_WITH_AUTH;
        self
    }

    pub fn with_no_da(mut self) -> Self {
        self.0 |= Self::NO_DA;
        self
    }

    pub fn with_restricted(mut self) -> Self {
        self.0 |= Self::RESTRICTED;
        self
    }

    pub fn with_decrypt(mut self) -> Self {
        self.0 |= Self::DECRYPT;
        self
    }

    pub fn with_sign_encrypt(mut self) -> Self {
        self.0 |= Self::SIGN_ENCRYPT;
        self
    }
}

/// TPM 2.0 NV Attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmaNv(pub u32);

impl TpmaNv {
    pub const PP_WRITE: u32 = 1 << 0;
    pub const OWNER_WRITE: u32 = 1 << 1;
    pub const AUTH_WRITE: u32 = 1 << 2;
    pub const POLICY_WRITE: u32 = 1 << 3;
    pub const POLICY_DELETE: u32 = 1 << 10;
    pub const WRITE_LOCKED: u32 = 1 << 11;
    pub const WRITE_ALL: u32 = 1 << 12;
    pub const WRITE_DEFINE: u32 = 1 << 13;
    pub const WRITE_STCLEAR: u32 = 1 << 14;
    pub const GLOBAL_LOCK: u32 = 1 << 15;
    pub const PP_READ: u32 = 1 << 16;
    pub const OWNER_READ: u32 = 1 << 17;
    pub const AUTH_READ: u32 = 1 << 18;
    pub const POLICY_READ: u32 = 1 << 19;
    pub const NO_DA: u32 = 1 << 25;
    pub const ORDERLY: u32 = 1 << 26;
    pub const CLEAR_STCLEAR: u32 = 1 << 27;
    pub const READ_LOCKED: u32 = 1 << 28;
    pub const WRITTEN: u32 = 1 << 29;
    pub const PLATFORM_CREATE: u32 = 1 << 30;
    pub const READ_STCLEAR: u32 = 1 << 31;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    pub fn insert(&mut self, bits: u32) {
        self.0 |= bits;
    }

    pub fn with_owner_write(mut self) -> Self {
        self.0 |= Self::OWNER_WRITE;
        self
    }

    pub fn with_write_define(mut self) -> Self {
        self.0 |= Self::WRITE_DEFINE;
        self
    }

    pub fn with_auth_read(mut self) -> Self {
        self.0 |= Self::AUTH_READ;
        self
    }
}

/// TPM 2.0 Session Attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmaSa(pub u8);

impl TpmaSa {
    pub const CONTINUE_SESSION: u8 = 1 << 0;
    pub const AUDIT_EXCLUSIVE: u8 = 1 << 1;
    pub const AUDIT_RESET: u8 = 1 << 2;
    pub const DECRYPT: u8 = 1 << 5;
    pub const ENCRYPT: u8 = 1 << 6;
    pub const AUDIT: u8 = 1 << 7;
}

/// TPM structure tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmSt {
    RspCommand = 0x00C4,
    Null = 0x8000,
    NoSessions = 0x8001,
    Sessions = 0x8002,
    Verified = 0x8022,
    HashCheck = 0x8024,
}

impl TpmSt {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x00C4 => Some(TpmSt::RspCommand),
            0x8000 => Some(TpmSt::Null),
            0x8001 => Some(TpmSt::NoSessions),
            0x8002 => Some(TpmSt::Sessions),
            0x8022 => Some(TpmSt::Verified),
            0x8024 => Some(TpmSt::HashCheck),
            _ => None,
        }
    }
}

/// ECC Curve IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmEccCurve {
    None = 0x0000,
    NistP256 = 0x0003,
    NistP384 = 0x0004,
    NistP521 = 0x0005,
}

impl TpmEccCurve {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0000 => Some(TpmEccCurve::None),
            0x0003 => Some(TpmEccCurve::NistP256),
            0x0004 => Some(TpmEccCurve::NistP384),
            0x0005 => Some(TpmEccCurve::NistP521),
            _ => None,
        }
    }
}
