// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! High-level TPM 2.0 operations
//!
//! [`TpmUtility`] turns operations such as "take ownership", "import a key"
//! or "write an NV space" into correctly shaped TPM commands issued through a
//! [`tpm2::Tpm`] implementation. Key attributes and schemes are checked before
//! anything is sent, so misuse fails with a local error code instead of an
//! opaque device error.
//!
//! ```no_run
//! use tpm2::{PasswordDelegate, TpmContext};
//! use tpm_utility::TpmUtility;
//!
//! let mut utility = TpmUtility::new(TpmContext::new(None)?);
//! utility.startup()?;
//! let mut owner = PasswordDelegate::new(b"owner".to_vec());
//! utility.define_nv_space(1, 32, Some(&mut owner))?;
//! # Ok::<(), tpm2::Error>(())
//! ```

use std::collections::HashMap;

use tpm2::{Tpm, TpmsNvPublic};

pub mod config;
mod hierarchy;
mod keys;
mod nvram;
mod pcr;
pub mod policy;
pub mod state;

#[cfg(test)]
mod test_support;

pub use config::UtilityConfig;
pub use keys::{AsymmetricKeyUsage, KeyBlob, MAX_PASSWORD_LENGTH, MAX_RSA_KEY_BYTES};
pub use nvram::{MAX_NV_INDEX, MAX_NV_SIZE};
pub use policy::{HashRequest, KeyOperation, ResolvedScheme, SchemeRequest};
pub use state::TpmState;
pub use tpm2::{error_string, AuthorizationDelegate, Error, PasswordDelegate, Result};

/// Utility layer over a TPM command adapter.
///
/// Owns the adapter and a cache of NV space public areas keyed by the
/// caller's logical NV index.
pub struct TpmUtility<T: Tpm> {
    tpm: T,
    config: UtilityConfig,
    nvram_public_areas: HashMap<u32, TpmsNvPublic>,
}

impl<T: Tpm> TpmUtility<T> {
    pub fn new(tpm: T) -> Self {
        Self::with_config(tpm, UtilityConfig::default())
    }

    pub fn with_config(tpm: T, config: UtilityConfig) -> Self {
        Self {
            tpm,
            config,
            nvram_public_areas: HashMap::new(),
        }
    }

    pub fn config(&self) -> &UtilityConfig {
        &self.config
    }

    pub fn tpm(&self) -> &T {
        &self.tpm
    }

    pub fn tpm_mut(&mut self) -> &mut T {
        &mut self.tpm
    }

    pub fn into_inner(self) -> T {
        self.tpm
    }
}
