// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Typed TPM command interface
//!
//! One method per TPM 2.0 command. Every handle that takes part in the
//! authorization is passed together with its name, since the name is part of
//! the cpHash. Passing `None` for the delegate sends the command without an
//! authorization area.

use super::constants::*;
use super::error::Result;
use super::session::AuthorizationDelegate;
use super::types::*;

/// Output of TPM2_CreatePrimary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePrimaryResponse {
    pub object_handle: u32,
    pub out_public: TpmtPublic,
    pub name: Vec<u8>,
}

/// Output of TPM2_Create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResponse {
    pub out_private: Tpm2bPrivate,
    pub out_public: TpmtPublic,
}

/// Output of TPM2_Load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResponse {
    pub object_handle: u32,
    pub name: Vec<u8>,
}

/// Output of TPM2_ReadPublic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPublicResponse {
    pub out_public: TpmtPublic,
    pub name: Vec<u8>,
    pub qualified_name: Vec<u8>,
}

/// Output of TPM2_PCR_Read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcrReadResponse {
    pub update_counter: u32,
    pub selection: TpmlPcrSelection,
    pub values: TpmlDigest,
}

/// Output of TPM2_PCR_Allocate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcrAllocateResponse {
    pub allocation_success: bool,
    pub max_pcr: u32,
    pub size_needed: u32,
    pub size_available: u32,
}

/// Output of TPM2_NV_ReadPublic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NvReadPublicResponse {
    pub nv_public: TpmsNvPublic,
    pub name: Vec<u8>,
}

/// Output of TPM2_GetCapability for TPM_CAP_TPM_PROPERTIES
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityResponse {
    pub more_data: bool,
    pub properties: TpmlTaggedTpmProperty,
}

/// TPM 2.0 command set used by the utility layer.
#[allow(clippy::too_many_arguments)]
pub trait Tpm {
    fn startup(&mut self, startup_type: TpmSu) -> Result<()>;

    fn shutdown(&mut self, shutdown_type: TpmSu) -> Result<()>;

    fn self_test(&mut self, full_test: bool) -> Result<()>;

    /// TPM2_Clear
    fn clear(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()>;

    fn hierarchy_change_auth(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        new_auth: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()>;

    fn hierarchy_control(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        enable: u32,
        state: bool,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()>;

    fn pcr_allocate(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        allocation: &TpmlPcrSelection,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<PcrAllocateResponse>;

    fn get_random(
        &mut self,
        bytes_requested: u16,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>>;

    fn stir_random(
        &mut self,
        in_data: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()>;

    fn pcr_extend(
        &mut self,
        pcr_handle: u32,
        pcr_name: &[u8],
        digests: &TpmlDigestValues,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()>;

    fn pcr_read(
        &mut self,
        selection: &TpmlPcrSelection,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<PcrReadResponse>;

    fn read_public(
        &mut self,
        object_handle: u32,
        object_name: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<ReadPublicResponse>;

    fn create_primary(
        &mut self,
        primary_handle: u32,
        primary_name: &[u8],
        in_sensitive: &Tpm2bSensitiveCreate,
        in_public: &TpmtPublic,
        outside_info: &[u8],
        creation_pcr: &TpmlPcrSelection,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<CreatePrimaryResponse>;

    fn create(
        &mut self,
        parent_handle: u32,
        parent_name: &[u8],
        in_sensitive: &Tpm2bSensitiveCreate,
        in_public: &TpmtPublic,
        outside_info: &[u8],
        creation_pcr: &TpmlPcrSelection,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<CreateResponse>;

    fn load(
        &mut self,
        parent_handle: u32,
        parent_name: &[u8],
        in_private: &Tpm2bPrivate,
        in_public: &TpmtPublic,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<LoadResponse>;

    fn import(
        &mut self,
        parent_handle: u32,
        parent_name: &[u8],
        encryption_key: &[u8],
        object_public: &TpmtPublic,
        duplicate: &[u8],
        in_sym_seed: &[u8],
        symmetric_alg: &TpmtSymDef,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Tpm2bPrivate>;

    fn object_change_auth(
        &mut self,
        object_handle: u32,
        object_name: &[u8],
        parent_handle: u32,
        parent_name: &[u8],
        new_auth: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Tpm2bPrivate>;

    fn evict_control(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        object_handle: u32,
        object_name: &[u8],
        persistent_handle: u32,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()>;

    fn flush_context(&mut self, flush_handle: u32) -> Result<()>;

    fn sign(
        &mut self,
        key_handle: u32,
        key_name: &[u8],
        digest: &[u8],
        scheme: &TpmtSigScheme,
        validation: &TpmtTicket,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<TpmtSignature>;

    fn verify_signature(
        &mut self,
        key_handle: u32,
        key_name: &[u8],
        digest: &[u8],
        signature: &TpmtSignature,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<TpmtTicket>;

    fn rsa_encrypt(
        &mut self,
        key_handle: u32,
        key_name: &[u8],
        message: &[u8],
        scheme: &TpmtRsaDecrypt,
        label: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>>;

    fn rsa_decrypt(
        &mut self,
        key_handle: u32,
        key_name: &[u8],
        cipher_text: &[u8],
        scheme: &TpmtRsaDecrypt,
        label: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>>;

    fn nv_define_space(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        auth: &[u8],
        public_info: &TpmsNvPublic,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()>;

    fn nv_undefine_space(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        nv_index: u32,
        nv_name: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()>;

    fn nv_write(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        nv_index: u32,
        nv_name: &[u8],
        data: &[u8],
        offset: u16,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()>;

    fn nv_read(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        nv_index: u32,
        nv_name: &[u8],
        size: u16,
        offset: u16,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>>;

    fn nv_write_lock(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        nv_index: u32,
        nv_name: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()>;

    fn nv_read_public(
        &mut self,
        nv_index: u32,
        nv_name: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<NvReadPublicResponse>;

    fn get_capability(
        &mut self,
        capability: TpmCap,
        property: u32,
        property_count: u32,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<CapabilityResponse>;
}
