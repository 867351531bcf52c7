// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Snapshot of the TPM's permanent and startup-clear state flags.

use tpm2::{
    tpm_pt, tpma_permanent, tpma_startup_clear, AuthorizationDelegate, Error, Result, Tpm, TpmCap,
};

/// State flags as reported by GetCapability(TPM_PROPERTIES).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmState {
    permanent: u32,
    startup_clear: u32,
}

impl TpmState {
    pub fn from_flags(permanent: u32, startup_clear: u32) -> Self {
        Self {
            permanent,
            startup_clear,
        }
    }

    /// Query both property words from the TPM.
    pub fn refresh<T: Tpm>(
        tpm: &mut T,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Self> {
        let response = tpm.get_capability(TpmCap::TpmProperties, tpm_pt::PERMANENT, 2, delegate)?;
        let properties = &response.properties;
        let (Some(permanent), Some(startup_clear)) = (
            properties.get(tpm_pt::PERMANENT),
            properties.get(tpm_pt::STARTUP_CLEAR),
        ) else {
            return Err(Error::malformed("TPM state properties missing"));
        };
        Ok(Self::from_flags(permanent, startup_clear))
    }

    pub fn is_owner_password_set(&self) -> bool {
        self.permanent & tpma_permanent::OWNER_AUTH_SET != 0
    }

    pub fn is_endorsement_password_set(&self) -> bool {
        self.permanent & tpma_permanent::ENDORSEMENT_AUTH_SET != 0
    }

    pub fn is_lockout_password_set(&self) -> bool {
        self.permanent & tpma_permanent::LOCKOUT_AUTH_SET != 0
    }

    pub fn is_in_lockout(&self) -> bool {
        self.permanent & tpma_permanent::IN_LOCKOUT != 0
    }

    pub fn is_platform_hierarchy_enabled(&self) -> bool {
        self.startup_clear & tpma_startup_clear::PH_ENABLE != 0
    }

    pub fn is_storage_hierarchy_enabled(&self) -> bool {
        self.startup_clear & tpma_startup_clear::SH_ENABLE != 0
    }

    pub fn is_endorsement_hierarchy_enabled(&self) -> bool {
        self.startup_clear & tpma_startup_clear::EH_ENABLE != 0
    }

    pub fn was_shutdown_orderly(&self) -> bool {
        self.startup_clear & tpma_startup_clear::ORDERLY != 0
    }
}

impl std::fmt::Display for TpmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "owner password set:        {}", self.is_owner_password_set())?;
        writeln!(f, "endorsement password set:  {}", self.is_endorsement_password_set())?;
        writeln!(f, "lockout password set:      {}", self.is_lockout_password_set())?;
        writeln!(f, "in lockout:                {}", self.is_in_lockout())?;
        writeln!(f, "platform hierarchy:        {}", self.is_platform_hierarchy_enabled())?;
        writeln!(f, "storage hierarchy:         {}", self.is_storage_hierarchy_enabled())?;
        writeln!(f, "endorsement hierarchy:     {}", self.is_endorsement_hierarchy_enabled())?;
        write!(f, "orderly shutdown:          {}", self.was_shutdown_orderly())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockTpm;

    #[test]
    fn test_refresh_decodes_flags() {
        let mut tpm = MockTpm::new();
        tpm.permanent = tpma_permanent::OWNER_AUTH_SET | tpma_permanent::IN_LOCKOUT;
        tpm.startup_clear = tpma_startup_clear::PH_ENABLE | tpma_startup_clear::ORDERLY;

        let state = TpmState::refresh(&mut tpm, None).unwrap();
        assert!(state.is_owner_password_set());
        assert!(!state.is_endorsement_password_set());
        assert!(!state.is_lockout_password_set());
        assert!(state.is_in_lockout());
        assert!(state.is_platform_hierarchy_enabled());
        assert!(!state.is_storage_hierarchy_enabled());
        assert!(state.was_shutdown_orderly());
    }

    #[test]
    fn test_display_lists_every_flag() {
        let state = TpmState::from_flags(
            tpma_permanent::LOCKOUT_AUTH_SET,
            tpma_startup_clear::ORDERLY,
        );
        let text = state.to_string();
        assert_eq!(text.lines().count(), 8);
        assert!(text.contains("lockout password set:      true"));
        assert!(text.contains("owner password set:        false"));
        assert!(text.ends_with("orderly shutdown:          true"));
    }

    #[test]
    fn test_refresh_propagates_failure() {
        let mut tpm = MockTpm::new();
        tpm.fail_once(tpm2::TpmCc::GetCapability, tpm2::tpm_rc::FAILURE);
        assert_eq!(
            TpmState::refresh(&mut tpm, None),
            Err(Error::Tpm(tpm2::tpm_rc::FAILURE))
        );
    }
}
