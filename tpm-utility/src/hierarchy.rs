// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM startup, clear and shutdown, platform initialization and taking
//! ownership of the owner, endorsement and lockout hierarchies.
//!
//! No state is kept between calls: each operation re-reads the TPM state
//! flags it depends on.

use tracing::{debug, info, warn};

use tpm2::{
    handle_name, tpm_rc, tpm_rh, AuthorizationDelegate, Error, PasswordDelegate, Result, Tpm,
    TpmAlgId, TpmSu, TpmlPcrSelection, TpmsPcrSelection, PCR_SELECT_MIN,
};

use crate::keys::MAX_PASSWORD_LENGTH;
use crate::state::TpmState;
use crate::TpmUtility;

impl<T: Tpm> TpmUtility<T> {
    /// Current TPM state flags.
    pub fn tpm_state(&mut self) -> Result<TpmState> {
        TpmState::refresh(&mut self.tpm, None)
    }

    /// Start the TPM and run a full self test. A TPM that was already
    /// started is accepted.
    pub fn startup(&mut self) -> Result<()> {
        match self.tpm.startup(TpmSu::Clear) {
            Ok(()) => {}
            Err(err) if err.is_tpm(tpm_rc::INITIALIZE) => info!("TPM already started"),
            Err(err) => return Err(err),
        }
        self.tpm.self_test(true)
    }

    /// Clear the TPM through the platform hierarchy.
    ///
    /// A first attempt is made without authorization. If the TPM reports
    /// AUTH_MISSING, the platform password was left behind by an interrupted
    /// initialization and the clear is retried once with it.
    pub fn clear(&mut self) -> Result<()> {
        let platform_name = handle_name(tpm_rh::PLATFORM);
        let result = self.tpm.clear(
            tpm_rh::PLATFORM,
            &platform_name,
            Some(&mut PasswordDelegate::empty()),
        );
        match result {
            Err(err) if err.is_tpm(tpm_rc::AUTH_MISSING) => {
                warn!("clear requires platform authorization, retrying with the platform password");
                let mut platform = PasswordDelegate::new(self.config.platform_password.as_bytes());
                self.tpm
                    .clear(tpm_rh::PLATFORM, &platform_name, Some(&mut platform))
            }
            other => other,
        }
    }

    /// Orderly shutdown. Failures are logged and otherwise ignored.
    pub fn shutdown(&mut self) {
        if let Err(err) = self.tpm.shutdown(TpmSu::Clear) {
            debug!("shutdown failed: {err}");
        }
    }

    /// Allocate PCR banks, set the platform password and disable the
    /// platform hierarchy. Nothing is done once the platform hierarchy is
    /// already disabled.
    pub fn initialize_tpm(&mut self) -> Result<()> {
        let state = self.tpm_state()?;
        if !state.was_shutdown_orderly() {
            warn!("TPM was not shut down orderly");
        }
        if state.is_in_lockout() {
            warn!("TPM is in dictionary attack lockout");
        }
        if !state.is_platform_hierarchy_enabled() {
            debug!("platform hierarchy already disabled");
            return Ok(());
        }

        self.allocate_pcr(Some(&mut PasswordDelegate::empty()))?;

        let password = self.config.platform_password.clone().into_bytes();
        self.set_hierarchy_authorization(
            tpm_rh::PLATFORM,
            &password,
            Some(&mut PasswordDelegate::empty()),
        )?;

        let mut platform = PasswordDelegate::new(password);
        self.tpm.hierarchy_control(
            tpm_rh::PLATFORM,
            &handle_name(tpm_rh::PLATFORM),
            tpm_rh::PLATFORM,
            false,
            Some(&mut platform),
        )?;
        info!("platform hierarchy disabled");
        Ok(())
    }

    /// Allocate the SHA-256 bank with every PCR selected.
    pub fn allocate_pcr(&mut self, delegate: Option<&mut dyn AuthorizationDelegate>) -> Result<()> {
        let allocation = TpmlPcrSelection::new(vec![TpmsPcrSelection::all(
            TpmAlgId::Sha256,
            PCR_SELECT_MIN,
        )]);
        let response = self.tpm.pcr_allocate(
            tpm_rh::PLATFORM,
            &handle_name(tpm_rh::PLATFORM),
            &allocation,
            delegate,
        )?;
        if !response.allocation_success {
            warn!(
                "PCR allocation rejected: needed {} bytes, {} available",
                response.size_needed, response.size_available
            );
            return Err(Error::Tpm(tpm_rc::FAILURE));
        }
        Ok(())
    }

    /// Set the owner, endorsement and lockout passwords.
    ///
    /// Hierarchies that already have a password are skipped. The first
    /// failure is returned; changes made before it are kept.
    pub fn take_ownership(
        &mut self,
        owner_password: &[u8],
        endorsement_password: &[u8],
        lockout_password: &[u8],
    ) -> Result<()> {
        let state = self.tpm_state()?;
        let hierarchies = [
            (
                "owner",
                tpm_rh::OWNER,
                owner_password,
                state.is_owner_password_set(),
            ),
            (
                "endorsement",
                tpm_rh::ENDORSEMENT,
                endorsement_password,
                state.is_endorsement_password_set(),
            ),
            (
                "lockout",
                tpm_rh::LOCKOUT,
                lockout_password,
                state.is_lockout_password_set(),
            ),
        ];
        for (label, hierarchy, password, already_set) in hierarchies {
            if already_set {
                info!("{label} password already set");
                continue;
            }
            self.set_hierarchy_authorization(
                hierarchy,
                password,
                Some(&mut PasswordDelegate::empty()),
            )?;
            info!("{label} password set");
        }
        Ok(())
    }

    /// HierarchyChangeAuth for one hierarchy.
    pub fn set_hierarchy_authorization(
        &mut self,
        hierarchy: u32,
        password: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        if password.len() > MAX_PASSWORD_LENGTH {
            return Err(Error::BadSize);
        }
        self.tpm
            .hierarchy_change_auth(hierarchy, &handle_name(hierarchy), password, delegate)
    }

    /// Install `password` as the owner password unless one is already set.
    pub fn set_known_owner_password(&mut self, password: &[u8]) -> Result<()> {
        if self.tpm_state()?.is_owner_password_set() {
            info!("owner password already set");
            return Ok(());
        }
        self.set_hierarchy_authorization(
            tpm_rh::OWNER,
            password,
            Some(&mut PasswordDelegate::empty()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Call, MockTpm};
    use tpm2::{tpma_permanent, tpma_startup_clear, TpmCc};

    fn utility() -> TpmUtility<MockTpm> {
        TpmUtility::new(MockTpm::new())
    }

    fn changed_hierarchies(tpm: &MockTpm) -> Vec<(u32, Vec<u8>)> {
        tpm.calls_to(TpmCc::HierarchyChangeAuth)
            .into_iter()
            .map(|r| match &r.call {
                Call::HierarchyChangeAuth {
                    auth_handle,
                    new_auth,
                } => (*auth_handle, new_auth.clone()),
                _ => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn test_startup() {
        let mut utility = utility();
        utility.startup().unwrap();
        assert_eq!(
            utility.tpm().calls.iter().map(|r| r.call.clone()).collect::<Vec<_>>(),
            vec![Call::Startup(TpmSu::Clear), Call::SelfTest(true)]
        );
    }

    #[test]
    fn test_startup_already_started() {
        let mut utility = utility();
        utility
            .tpm_mut()
            .fail_once(TpmCc::Startup, tpm_rc::INITIALIZE);
        assert_eq!(utility.startup(), Ok(()));
        assert_eq!(utility.tpm().count(TpmCc::SelfTest), 1);
    }

    #[test]
    fn test_startup_failures() {
        let mut utility = utility();
        utility.tpm_mut().fail_once(TpmCc::Startup, tpm_rc::FAILURE);
        assert_eq!(utility.startup(), Err(Error::Tpm(tpm_rc::FAILURE)));
        assert_eq!(utility.tpm().count(TpmCc::SelfTest), 0);

        let mut utility = self::utility();
        utility.tpm_mut().fail_once(TpmCc::SelfTest, tpm_rc::FAILURE);
        assert_eq!(utility.startup(), Err(Error::Tpm(tpm_rc::FAILURE)));
    }

    #[test]
    fn test_clear() {
        let mut utility = utility();
        utility.clear().unwrap();
        let clear = utility.tpm().calls_to(TpmCc::Clear);
        assert_eq!(clear.len(), 1);
        assert_eq!(
            clear[0].call,
            Call::Clear {
                auth_handle: tpm_rh::PLATFORM
            }
        );
        assert_eq!(clear[0].password(), Some(&b""[..]));
    }

    #[test]
    fn test_clear_retries_with_platform_password() {
        let mut utility = utility();
        utility
            .tpm_mut()
            .fail_once(TpmCc::Clear, tpm_rc::AUTH_MISSING);
        utility.clear().unwrap();
        let clear = utility.tpm().calls_to(TpmCc::Clear);
        assert_eq!(clear.len(), 2);
        assert_eq!(clear[1].password(), Some(&b"cros-platform"[..]));
    }

    #[test]
    fn test_clear_failures() {
        let mut utility = utility();
        utility.tpm_mut().fail_once(TpmCc::Clear, tpm_rc::FAILURE);
        assert_eq!(utility.clear(), Err(Error::Tpm(tpm_rc::FAILURE)));
        assert_eq!(utility.tpm().count(TpmCc::Clear), 1);

        let mut utility = self::utility();
        utility
            .tpm_mut()
            .fail_always(TpmCc::Clear, tpm_rc::AUTH_MISSING);
        assert_eq!(utility.clear(), Err(Error::Tpm(tpm_rc::AUTH_MISSING)));
        assert_eq!(utility.tpm().count(TpmCc::Clear), 2);
    }

    #[test]
    fn test_shutdown_ignores_failure() {
        let mut utility = utility();
        utility.tpm_mut().fail_once(TpmCc::Shutdown, tpm_rc::FAILURE);
        utility.shutdown();
        assert_eq!(utility.tpm().calls[0].call, Call::Shutdown(TpmSu::Clear));
    }

    #[test]
    fn test_initialize_with_platform_hierarchy_disabled() {
        let mut utility = utility();
        utility.initialize_tpm().unwrap();
        utility.initialize_tpm().unwrap();
        assert_eq!(
            utility.tpm().codes(),
            vec![TpmCc::GetCapability, TpmCc::GetCapability]
        );
    }

    #[test]
    fn test_initialize_disables_platform_hierarchy() {
        let mut utility = utility();
        utility.tpm_mut().startup_clear = tpma_startup_clear::PH_ENABLE;
        utility.initialize_tpm().unwrap();

        let tpm = utility.tpm();
        assert_eq!(
            tpm.codes(),
            vec![
                TpmCc::GetCapability,
                TpmCc::PcrAllocate,
                TpmCc::HierarchyChangeAuth,
                TpmCc::HierarchyControl,
            ]
        );
        assert_eq!(
            changed_hierarchies(tpm),
            vec![(tpm_rh::PLATFORM, b"cros-platform".to_vec())]
        );
        let control = tpm.calls_to(TpmCc::HierarchyControl);
        assert_eq!(
            control[0].call,
            Call::HierarchyControl {
                auth_handle: tpm_rh::PLATFORM,
                enable: tpm_rh::PLATFORM,
                state: false,
            }
        );
        assert_eq!(control[0].password(), Some(&b"cros-platform"[..]));
    }

    #[test]
    fn test_initialize_failures_abort() {
        let mut utility = utility();
        utility.tpm_mut().startup_clear = tpma_startup_clear::PH_ENABLE;
        utility
            .tpm_mut()
            .fail_always(TpmCc::HierarchyChangeAuth, tpm_rc::FAILURE);
        assert_eq!(utility.initialize_tpm(), Err(Error::Tpm(tpm_rc::FAILURE)));
        assert_eq!(utility.tpm().count(TpmCc::HierarchyControl), 0);

        let mut utility = self::utility();
        utility.tpm_mut().startup_clear = tpma_startup_clear::PH_ENABLE;
        utility
            .tpm_mut()
            .fail_always(TpmCc::HierarchyControl, tpm_rc::FAILURE);
        assert_eq!(utility.initialize_tpm(), Err(Error::Tpm(tpm_rc::FAILURE)));

        let mut utility = self::utility();
        utility.tpm_mut().startup_clear = tpma_startup_clear::PH_ENABLE;
        utility.tpm_mut().allocation_success = false;
        assert_eq!(utility.initialize_tpm(), Err(Error::Tpm(tpm_rc::FAILURE)));
        assert_eq!(utility.tpm().count(TpmCc::HierarchyChangeAuth), 0);
    }

    #[test]
    fn test_allocate_pcr_selects_whole_sha256_bank() {
        let mut utility = utility();
        utility.allocate_pcr(None).unwrap();
        let allocate = utility.tpm().calls_to(TpmCc::PcrAllocate);
        let Call::PcrAllocate {
            auth_handle,
            allocation,
        } = &allocate[0].call
        else {
            unreachable!()
        };
        assert_eq!(*auth_handle, tpm_rh::PLATFORM);
        assert_eq!(allocation.pcr_selections.len(), 1);
        assert_eq!(allocation.pcr_selections[0].hash, TpmAlgId::Sha256);
        assert_eq!(allocation.pcr_selections[0].pcr_select, vec![0xFF; PCR_SELECT_MIN]);
    }

    #[test]
    fn test_allocate_pcr_failures() {
        let mut utility = utility();
        utility
            .tpm_mut()
            .fail_once(TpmCc::PcrAllocate, tpm_rc::FAILURE);
        assert_eq!(utility.allocate_pcr(None), Err(Error::Tpm(tpm_rc::FAILURE)));

        utility.tpm_mut().allocation_success = false;
        assert_eq!(utility.allocate_pcr(None), Err(Error::Tpm(tpm_rc::FAILURE)));
    }

    #[test]
    fn test_take_ownership() {
        let mut utility = utility();
        utility
            .take_ownership(b"owner", b"endorsement", b"lockout")
            .unwrap();
        assert_eq!(
            changed_hierarchies(utility.tpm()),
            vec![
                (tpm_rh::OWNER, b"owner".to_vec()),
                (tpm_rh::ENDORSEMENT, b"endorsement".to_vec()),
                (tpm_rh::LOCKOUT, b"lockout".to_vec()),
            ]
        );
    }

    #[test]
    fn test_take_ownership_already_done() {
        let mut utility = utility();
        utility.tpm_mut().permanent = tpma_permanent::OWNER_AUTH_SET
            | tpma_permanent::ENDORSEMENT_AUTH_SET
            | tpma_permanent::LOCKOUT_AUTH_SET;
        utility
            .take_ownership(b"owner", b"endorsement", b"lockout")
            .unwrap();
        assert_eq!(utility.tpm().codes(), vec![TpmCc::GetCapability]);
    }

    #[test]
    fn test_take_ownership_skips_set_hierarchies() {
        let mut utility = utility();
        utility.tpm_mut().permanent = tpma_permanent::ENDORSEMENT_AUTH_SET;
        utility
            .take_ownership(b"owner", b"endorsement", b"lockout")
            .unwrap();
        assert_eq!(
            changed_hierarchies(utility.tpm()),
            vec![
                (tpm_rh::OWNER, b"owner".to_vec()),
                (tpm_rh::LOCKOUT, b"lockout".to_vec()),
            ]
        );

        let mut utility = self::utility();
        utility.tpm_mut().permanent =
            tpma_permanent::ENDORSEMENT_AUTH_SET | tpma_permanent::LOCKOUT_AUTH_SET;
        utility
            .take_ownership(b"owner", b"endorsement", b"lockout")
            .unwrap();
        assert_eq!(
            changed_hierarchies(utility.tpm()),
            vec![(tpm_rh::OWNER, b"owner".to_vec())]
        );
    }

    #[test]
    fn test_take_ownership_stops_at_first_failure() {
        let mut utility = utility();
        utility
            .tpm_mut()
            .fail_once(TpmCc::HierarchyChangeAuth, tpm_rc::FAILURE);
        assert_eq!(
            utility.take_ownership(b"owner", b"endorsement", b"lockout"),
            Err(Error::Tpm(tpm_rc::FAILURE))
        );
        assert_eq!(utility.tpm().count(TpmCc::HierarchyChangeAuth), 1);

        let mut utility = {
            let mut tpm = MockTpm::new();
            tpm.fail_once(TpmCc::GetCapability, tpm_rc::FAILURE);
            TpmUtility::new(tpm)
        };
        assert_eq!(
            utility.take_ownership(b"owner", b"endorsement", b"lockout"),
            Err(Error::Tpm(tpm_rc::FAILURE))
        );
        assert_eq!(utility.tpm().count(TpmCc::HierarchyChangeAuth), 0);
    }

    #[test]
    fn test_take_ownership_failure_skips_remaining() {
        let mut utility = utility();
        utility.tpm_mut().permanent = tpma_permanent::OWNER_AUTH_SET;
        utility
            .tpm_mut()
            .fail_once(TpmCc::HierarchyChangeAuth, tpm_rc::AUTH_FAIL);
        assert_eq!(
            utility.take_ownership(b"owner", b"endorsement", b"lockout"),
            Err(Error::Tpm(tpm_rc::AUTH_FAIL))
        );
        assert_eq!(
            changed_hierarchies(utility.tpm()),
            vec![(tpm_rh::ENDORSEMENT, b"endorsement".to_vec())]
        );
    }

    #[test]
    fn test_password_length_is_bounded() {
        let mut utility = utility();
        let long = [0x61; MAX_PASSWORD_LENGTH + 1];
        assert_eq!(
            utility.set_hierarchy_authorization(tpm_rh::OWNER, &long, None),
            Err(Error::BadSize)
        );
        assert_eq!(
            utility.take_ownership(&long, b"", b""),
            Err(Error::BadSize)
        );
        assert_eq!(utility.tpm().count(TpmCc::HierarchyChangeAuth), 0);
    }

    #[test]
    fn test_set_known_owner_password() {
        let mut utility = utility();
        utility.set_known_owner_password(b"password").unwrap();
        assert_eq!(
            changed_hierarchies(utility.tpm()),
            vec![(tpm_rh::OWNER, b"password".to_vec())]
        );

        let mut utility = self::utility();
        utility.tpm_mut().permanent = tpma_permanent::OWNER_AUTH_SET;
        utility.set_known_owner_password(b"password").unwrap();
        assert_eq!(utility.tpm().count(TpmCc::HierarchyChangeAuth), 0);

        let mut utility = self::utility();
        utility
            .tpm_mut()
            .fail_always(TpmCc::HierarchyChangeAuth, tpm_rc::FAILURE);
        assert_eq!(
            utility.set_known_owner_password(b"password"),
            Err(Error::Tpm(tpm_rc::FAILURE))
        );
    }
}
