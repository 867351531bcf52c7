// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! In-memory TPM double for unit tests.
//!
//! `MockTpm` records every command with its arguments and the authorization
//! area the delegate produced, and answers from a small simulated state:
//! loaded objects, NV spaces, PCR values and the capability flags.

use std::collections::{HashMap, VecDeque};

use sha2::{Digest, Sha256};
use tpm2::*;

/// A command as seen by the mock
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Startup(TpmSu),
    Shutdown(TpmSu),
    SelfTest(bool),
    Clear {
        auth_handle: u32,
    },
    HierarchyChangeAuth {
        auth_handle: u32,
        new_auth: Vec<u8>,
    },
    HierarchyControl {
        auth_handle: u32,
        enable: u32,
        state: bool,
    },
    PcrAllocate {
        auth_handle: u32,
        allocation: TpmlPcrSelection,
    },
    GetRandom(u16),
    StirRandom(Vec<u8>),
    PcrExtend {
        pcr_handle: u32,
        pcr_name: Vec<u8>,
        digests: TpmlDigestValues,
    },
    PcrRead(TpmlPcrSelection),
    ReadPublic(u32),
    CreatePrimary {
        primary_handle: u32,
        in_sensitive: Tpm2bSensitiveCreate,
        in_public: TpmtPublic,
    },
    Create {
        parent_handle: u32,
        parent_name: Vec<u8>,
        in_sensitive: Tpm2bSensitiveCreate,
        in_public: TpmtPublic,
    },
    Load {
        parent_handle: u32,
        parent_name: Vec<u8>,
        in_private: Tpm2bPrivate,
        in_public: TpmtPublic,
    },
    Import {
        parent_handle: u32,
        parent_name: Vec<u8>,
        encryption_key: Vec<u8>,
        object_public: TpmtPublic,
        duplicate: Vec<u8>,
        in_sym_seed: Vec<u8>,
        symmetric_alg: TpmtSymDef,
    },
    ObjectChangeAuth {
        object_handle: u32,
        object_name: Vec<u8>,
        parent_handle: u32,
        parent_name: Vec<u8>,
        new_auth: Vec<u8>,
    },
    EvictControl {
        auth_handle: u32,
        object_handle: u32,
        object_name: Vec<u8>,
        persistent_handle: u32,
    },
    FlushContext(u32),
    Sign {
        key_handle: u32,
        digest: Vec<u8>,
        scheme: TpmtSigScheme,
        validation: TpmtTicket,
    },
    VerifySignature {
        key_handle: u32,
        digest: Vec<u8>,
        signature: TpmtSignature,
    },
    RsaEncrypt {
        key_handle: u32,
        message: Vec<u8>,
        scheme: TpmtRsaDecrypt,
    },
    RsaDecrypt {
        key_handle: u32,
        cipher_text: Vec<u8>,
        scheme: TpmtRsaDecrypt,
    },
    NvDefineSpace {
        auth_handle: u32,
        public_info: TpmsNvPublic,
    },
    NvUndefineSpace {
        auth_handle: u32,
        nv_index: u32,
        nv_name: Vec<u8>,
    },
    NvWrite {
        auth_handle: u32,
        nv_index: u32,
        data: Vec<u8>,
        offset: u16,
    },
    NvRead {
        auth_handle: u32,
        nv_index: u32,
        size: u16,
        offset: u16,
    },
    NvWriteLock {
        auth_handle: u32,
        nv_index: u32,
    },
    NvReadPublic(u32),
    GetCapability {
        capability: TpmCap,
        property: u32,
        count: u32,
    },
}

impl Call {
    pub fn code(&self) -> TpmCc {
        match self {
            Call::Startup(_) => TpmCc::Startup,
            Call::Shutdown(_) => TpmCc::Shutdown,
            Call::SelfTest(_) => TpmCc::SelfTest,
            Call::Clear { .. } => TpmCc::Clear,
            Call::HierarchyChangeAuth { .. } => TpmCc::HierarchyChangeAuth,
            Call::HierarchyControl { .. } => TpmCc::HierarchyControl,
            Call::PcrAllocate { .. } => TpmCc::PcrAllocate,
            Call::GetRandom(_) => TpmCc::GetRandom,
            Call::StirRandom(_) => TpmCc::StirRandom,
            Call::PcrExtend { .. } => TpmCc::PcrExtend,
            Call::PcrRead(_) => TpmCc::PcrRead,
            Call::ReadPublic(_) => TpmCc::ReadPublic,
            Call::CreatePrimary { .. } => TpmCc::CreatePrimary,
            Call::Create { .. } => TpmCc::Create,
            Call::Load { .. } => TpmCc::Load,
            Call::Import { .. } => TpmCc::Import,
            Call::ObjectChangeAuth { .. } => TpmCc::ObjectChangeAuth,
            Call::EvictControl { .. } => TpmCc::EvictControl,
            Call::FlushContext(_) => TpmCc::FlushContext,
            Call::Sign { .. } => TpmCc::Sign,
            Call::VerifySignature { .. } => TpmCc::VerifySignature,
            Call::RsaEncrypt { .. } => TpmCc::RsaEncrypt,
            Call::RsaDecrypt { .. } => TpmCc::RsaDecrypt,
            Call::NvDefineSpace { .. } => TpmCc::NvDefineSpace,
            Call::NvUndefineSpace { .. } => TpmCc::NvUndefineSpace,
            Call::NvWrite { .. } => TpmCc::NvWrite,
            Call::NvRead { .. } => TpmCc::NvRead,
            Call::NvWriteLock { .. } => TpmCc::NvWriteLock,
            Call::NvReadPublic(_) => TpmCc::NvReadPublic,
            Call::GetCapability { .. } => TpmCc::GetCapability,
        }
    }
}

/// One recorded command and the authorization area it carried
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub call: Call,
    pub auth: Option<Vec<u8>>,
}

impl Recorded {
    /// Password carried by a `PasswordDelegate` authorization area.
    pub fn password(&self) -> Option<&[u8]> {
        self.auth.as_deref().and_then(|auth| auth.get(9..))
    }
}

pub struct MockTpm {
    pub calls: Vec<Recorded>,
    one_shot_failures: HashMap<TpmCc, VecDeque<u32>>,
    sticky_failures: HashMap<TpmCc, u32>,

    /// Objects visible to ReadPublic, keyed by handle
    pub objects: HashMap<u32, TpmtPublic>,
    /// NV spaces keyed by TPM NV index
    pub nv_spaces: HashMap<u32, TpmsNvPublic>,
    /// SHA-256 bank values
    pub pcr_values: HashMap<u32, Vec<u8>>,
    /// Replaces the simulated PCR_Read answer
    pub pcr_read_response: Option<PcrReadResponse>,

    /// Most bytes a single GetRandom returns
    pub random_limit: usize,
    pub allocation_success: bool,
    pub permanent: u32,
    pub startup_clear: u32,
    pub next_handle: u32,
}

impl MockTpm {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            one_shot_failures: HashMap::new(),
            sticky_failures: HashMap::new(),
            objects: HashMap::new(),
            nv_spaces: HashMap::new(),
            pcr_values: HashMap::new(),
            pcr_read_response: None,
            random_limit: 32,
            allocation_success: true,
            permanent: 0,
            startup_clear: 0,
            next_handle: TRANSIENT_FIRST,
        }
    }

    /// Fail the next `cc` command with `rc`. Queued failures are consumed in order.
    pub fn fail_once(&mut self, cc: TpmCc, rc: u32) {
        self.one_shot_failures.entry(cc).or_default().push_back(rc);
    }

    /// Fail every `cc` command with `rc`.
    pub fn fail_always(&mut self, cc: TpmCc, rc: u32) {
        self.sticky_failures.insert(cc, rc);
    }

    /// Recorded commands with the given code
    pub fn calls_to(&self, cc: TpmCc) -> Vec<&Recorded> {
        self.calls.iter().filter(|r| r.call.code() == cc).collect()
    }

    pub fn count(&self, cc: TpmCc) -> usize {
        self.calls_to(cc).len()
    }

    pub fn codes(&self) -> Vec<TpmCc> {
        self.calls.iter().map(|r| r.call.code()).collect()
    }

    pub fn add_object(&mut self, handle: u32, public: TpmtPublic) {
        self.objects.insert(handle, public);
    }

    /// Register an RSA key with the given attributes at `handle`.
    pub fn add_rsa_key(&mut self, handle: u32, attributes: TpmaObject) {
        let mut public = TpmtPublic::rsa_default();
        public.object_attributes = attributes;
        public.unique = TpmtPublicUnique::Rsa(vec![0xC5; 256]);
        self.add_object(handle, public);
    }

    fn record(
        &mut self,
        call: Call,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        let code = call.code();
        let auth = match delegate {
            Some(d) => Some(d.command_authorization(&[], false, false)?),
            None => None,
        };
        self.calls.push(Recorded { call, auth });
        if let Some(rc) = self
            .one_shot_failures
            .get_mut(&code)
            .and_then(VecDeque::pop_front)
        {
            return Err(Error::Tpm(rc));
        }
        if let Some(rc) = self.sticky_failures.get(&code) {
            return Err(Error::Tpm(*rc));
        }
        Ok(())
    }

    fn allocate_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn object(&self, handle: u32) -> Result<&TpmtPublic> {
        self.objects
            .get(&handle)
            .ok_or(Error::Tpm(tpm_rc::HANDLE))
    }

    fn simulated_pcr_read(&self, selection: &TpmlPcrSelection) -> PcrReadResponse {
        let mut values = TpmlDigest::default();
        for sel in &selection.pcr_selections {
            for pcr in sel.selected() {
                let value = self
                    .pcr_values
                    .get(&pcr)
                    .cloned()
                    .unwrap_or_else(|| vec![0; SHA256_DIGEST_SIZE]);
                values.digests.push(Tpm2bDigest::new(value));
            }
        }
        PcrReadResponse {
            update_counter: 1,
            selection: selection.clone(),
            values,
        }
    }
}

impl Default for MockTpm {
    fn default() -> Self {
        Self::new()
    }
}

impl Tpm for MockTpm {
    fn startup(&mut self, startup_type: TpmSu) -> Result<()> {
        self.record(Call::Startup(startup_type), None)
    }

    fn shutdown(&mut self, shutdown_type: TpmSu) -> Result<()> {
        self.record(Call::Shutdown(shutdown_type), None)
    }

    fn self_test(&mut self, full_test: bool) -> Result<()> {
        self.record(Call::SelfTest(full_test), None)
    }

    fn clear(
        &mut self,
        auth_handle: u32,
        _auth_name: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        self.record(Call::Clear { auth_handle }, delegate)
    }

    fn hierarchy_change_auth(
        &mut self,
        auth_handle: u32,
        _auth_name: &[u8],
        new_auth: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        self.record(
            Call::HierarchyChangeAuth {
                auth_handle,
                new_auth: new_auth.to_vec(),
            },
            delegate,
        )
    }

    fn hierarchy_control(
        &mut self,
        auth_handle: u32,
        _auth_name: &[u8],
        enable: u32,
        state: bool,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        self.record(
            Call::HierarchyControl {
                auth_handle,
                enable,
                state,
            },
            delegate,
        )
    }

    fn pcr_allocate(
        &mut self,
        auth_handle: u32,
        _auth_name: &[u8],
        allocation: &TpmlPcrSelection,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<PcrAllocateResponse> {
        self.record(
            Call::PcrAllocate {
                auth_handle,
                allocation: allocation.clone(),
            },
            delegate,
        )?;
        Ok(PcrAllocateResponse {
            allocation_success: self.allocation_success,
            max_pcr: IMPLEMENTATION_PCR,
            size_needed: 0,
            size_available: 0,
        })
    }

    fn get_random(
        &mut self,
        bytes_requested: u16,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>> {
        self.record(Call::GetRandom(bytes_requested), delegate)?;
        Ok(vec![0xA5; (bytes_requested as usize).min(self.random_limit)])
    }

    fn stir_random(
        &mut self,
        in_data: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        self.record(Call::StirRandom(in_data.to_vec()), delegate)
    }

    fn pcr_extend(
        &mut self,
        pcr_handle: u32,
        pcr_name: &[u8],
        digests: &TpmlDigestValues,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        self.record(
            Call::PcrExtend {
                pcr_handle,
                pcr_name: pcr_name.to_vec(),
                digests: digests.clone(),
            },
            delegate,
        )?;
        for digest in &digests.digests {
            if digest.hash_alg != TpmAlgId::Sha256 {
                continue;
            }
            let pcr = pcr_handle - HR_PCR;
            let old = self
                .pcr_values
                .get(&pcr)
                .cloned()
                .unwrap_or_else(|| vec![0; SHA256_DIGEST_SIZE]);
            let mut hasher = Sha256::new();
            hasher.update(&old);
            hasher.update(&digest.digest);
            self.pcr_values.insert(pcr, hasher.finalize().to_vec());
        }
        Ok(())
    }

    fn pcr_read(
        &mut self,
        selection: &TpmlPcrSelection,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<PcrReadResponse> {
        self.record(Call::PcrRead(selection.clone()), delegate)?;
        Ok(match &self.pcr_read_response {
            Some(response) => response.clone(),
            None => self.simulated_pcr_read(selection),
        })
    }

    fn read_public(
        &mut self,
        object_handle: u32,
        _object_name: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<ReadPublicResponse> {
        self.record(Call::ReadPublic(object_handle), delegate)?;
        let out_public = self.object(object_handle)?.clone();
        let name = out_public.name()?;
        Ok(ReadPublicResponse {
            out_public,
            qualified_name: name.clone(),
            name,
        })
    }

    fn create_primary(
        &mut self,
        primary_handle: u32,
        _primary_name: &[u8],
        in_sensitive: &Tpm2bSensitiveCreate,
        in_public: &TpmtPublic,
        _outside_info: &[u8],
        _creation_pcr: &TpmlPcrSelection,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<CreatePrimaryResponse> {
        self.record(
            Call::CreatePrimary {
                primary_handle,
                in_sensitive: in_sensitive.clone(),
                in_public: in_public.clone(),
            },
            delegate,
        )?;
        let object_handle = self.allocate_handle();
        self.objects.insert(object_handle, in_public.clone());
        Ok(CreatePrimaryResponse {
            object_handle,
            out_public: in_public.clone(),
            name: in_public.name()?,
        })
    }

    fn create(
        &mut self,
        parent_handle: u32,
        parent_name: &[u8],
        in_sensitive: &Tpm2bSensitiveCreate,
        in_public: &TpmtPublic,
        _outside_info: &[u8],
        _creation_pcr: &TpmlPcrSelection,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<CreateResponse> {
        self.record(
            Call::Create {
                parent_handle,
                parent_name: parent_name.to_vec(),
                in_sensitive: in_sensitive.clone(),
                in_public: in_public.clone(),
            },
            delegate,
        )?;
        Ok(CreateResponse {
            out_private: Tpm2bPrivate::new(b"created private".to_vec()),
            out_public: in_public.clone(),
        })
    }

    fn load(
        &mut self,
        parent_handle: u32,
        parent_name: &[u8],
        in_private: &Tpm2bPrivate,
        in_public: &TpmtPublic,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<LoadResponse> {
        self.record(
            Call::Load {
                parent_handle,
                parent_name: parent_name.to_vec(),
                in_private: in_private.clone(),
                in_public: in_public.clone(),
            },
            delegate,
        )?;
        let object_handle = self.allocate_handle();
        self.objects.insert(object_handle, in_public.clone());
        Ok(LoadResponse {
            object_handle,
            name: in_public.name()?,
        })
    }

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
    ) -> Result<Tpm2bPrivate> {
        self.record(
            Call::Import {
                parent_handle,
                parent_name: parent_name.to_vec(),
                encryption_key: encryption_key.to_vec(),
                object_public: object_public.clone(),
                duplicate: duplicate.to_vec(),
                in_sym_seed: in_sym_seed.to_vec(),
                symmetric_alg: *symmetric_alg,
            },
            delegate,
        )?;
        Ok(Tpm2bPrivate::new(b"imported private".to_vec()))
    }

    fn object_change_auth(
        &mut self,
        object_handle: u32,
        object_name: &[u8],
        parent_handle: u32,
        parent_name: &[u8],
        new_auth: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Tpm2bPrivate> {
        self.record(
            Call::ObjectChangeAuth {
                object_handle,
                object_name: object_name.to_vec(),
                parent_handle,
                parent_name: parent_name.to_vec(),
                new_auth: new_auth.to_vec(),
            },
            delegate,
        )?;
        Ok(Tpm2bPrivate::new(b"changed private".to_vec()))
    }

    fn evict_control(
        &mut self,
        auth_handle: u32,
        _auth_name: &[u8],
        object_handle: u32,
        object_name: &[u8],
        persistent_handle: u32,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        self.record(
            Call::EvictControl {
                auth_handle,
                object_handle,
                object_name: object_name.to_vec(),
                persistent_handle,
            },
            delegate,
        )?;
        let public = self.object(object_handle)?.clone();
        self.objects.insert(persistent_handle, public);
        Ok(())
    }

    fn flush_context(&mut self, flush_handle: u32) -> Result<()> {
        self.record(Call::FlushContext(flush_handle), None)?;
        self.objects.remove(&flush_handle);
        Ok(())
    }

    fn sign(
        &mut self,
        key_handle: u32,
        _key_name: &[u8],
        digest: &[u8],
        scheme: &TpmtSigScheme,
        validation: &TpmtTicket,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<TpmtSignature> {
        self.record(
            Call::Sign {
                key_handle,
                digest: digest.to_vec(),
                scheme: *scheme,
                validation: validation.clone(),
            },
            delegate,
        )?;
        Ok(TpmtSignature {
            sig_alg: scheme.scheme,
            hash_alg: scheme.hash_alg.unwrap_or(TpmAlgId::Null),
            signature: b"signature".to_vec(),
        })
    }

    fn verify_signature(
        &mut self,
        key_handle: u32,
        _key_name: &[u8],
        digest: &[u8],
        signature: &TpmtSignature,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<TpmtTicket> {
        self.record(
            Call::VerifySignature {
                key_handle,
                digest: digest.to_vec(),
                signature: signature.clone(),
            },
            delegate,
        )?;
        Ok(TpmtTicket {
            tag: TpmSt::Verified.to_u16(),
            hierarchy: tpm_rh::OWNER,
            digest: Tpm2bDigest::empty(),
        })
    }

    fn rsa_encrypt(
        &mut self,
        key_handle: u32,
        _key_name: &[u8],
        message: &[u8],
        scheme: &TpmtRsaDecrypt,
        _label: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>> {
        self.record(
            Call::RsaEncrypt {
                key_handle,
                message: message.to_vec(),
                scheme: *scheme,
            },
            delegate,
        )?;
        Ok(b"ciphertext".to_vec())
    }

    fn rsa_decrypt(
        &mut self,
        key_handle: u32,
        _key_name: &[u8],
        cipher_text: &[u8],
        scheme: &TpmtRsaDecrypt,
        _label: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>> {
        self.record(
            Call::RsaDecrypt {
                key_handle,
                cipher_text: cipher_text.to_vec(),
                scheme: *scheme,
            },
            delegate,
        )?;
        Ok(b"plaintext".to_vec())
    }

    fn nv_define_space(
        &mut self,
        auth_handle: u32,
        _auth_name: &[u8],
        _auth: &[u8],
        public_info: &TpmsNvPublic,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        self.record(
            Call::NvDefineSpace {
                auth_handle,
                public_info: public_info.clone(),
            },
            delegate,
        )?;
        self.nv_spaces
            .insert(public_info.nv_index, public_info.clone());
        Ok(())
    }

    fn nv_undefine_space(
        &mut self,
        auth_handle: u32,
        _auth_name: &[u8],
        nv_index: u32,
        nv_name: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        self.record(
            Call::NvUndefineSpace {
                auth_handle,
                nv_index,
                nv_name: nv_name.to_vec(),
            },
            delegate,
        )?;
        self.nv_spaces.remove(&nv_index);
        Ok(())
    }

    fn nv_write(
        &mut self,
        auth_handle: u32,
        _auth_name: &[u8],
        nv_index: u32,
        _nv_name: &[u8],
        data: &[u8],
        offset: u16,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        self.record(
            Call::NvWrite {
                auth_handle,
                nv_index,
                data: data.to_vec(),
                offset,
            },
            delegate,
        )?;
        if let Some(space) = self.nv_spaces.get_mut(&nv_index) {
            if space.attributes.contains(TpmaNv::WRITE_LOCKED) {
                return Err(Error::Tpm(tpm_rc::NV_LOCKED));
            }
            space.attributes.insert(TpmaNv::WRITTEN);
        }
        Ok(())
    }

    fn nv_read(
        &mut self,
        auth_handle: u32,
        _auth_name: &[u8],
        nv_index: u32,
        _nv_name: &[u8],
        size: u16,
        offset: u16,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>> {
        self.record(
            Call::NvRead {
                auth_handle,
                nv_index,
                size,
                offset,
            },
            delegate,
        )?;
        Ok(vec![0x5A; size as usize])
    }

    fn nv_write_lock(
        &mut self,
        auth_handle: u32,
        _auth_name: &[u8],
        nv_index: u32,
        _nv_name: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        self.record(
            Call::NvWriteLock {
                auth_handle,
                nv_index,
            },
            delegate,
        )?;
        if let Some(space) = self.nv_spaces.get_mut(&nv_index) {
            space.attributes.insert(TpmaNv::WRITE_LOCKED);
        }
        Ok(())
    }

    fn nv_read_public(
        &mut self,
        nv_index: u32,
        _nv_name: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<NvReadPublicResponse> {
        self.record(Call::NvReadPublic(nv_index), delegate)?;
        let nv_public = self
            .nv_spaces
            .get(&nv_index)
            .cloned()
            .ok_or(Error::Tpm(tpm_rc::HANDLE))?;
        let name = nv_public.name()?;
        Ok(NvReadPublicResponse { nv_public, name })
    }

    fn get_capability(
        &mut self,
        capability: TpmCap,
        property: u32,
        property_count: u32,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<CapabilityResponse> {
        self.record(
            Call::GetCapability {
                capability,
                property,
                count: property_count,
            },
            delegate,
        )?;
        Ok(CapabilityResponse {
            more_data: false,
            properties: TpmlTaggedTpmProperty {
                properties: vec![
                    TpmsTaggedProperty {
                        property: tpm_pt::PERMANENT,
                        value: self.permanent,
                    },
                    TpmsTaggedProperty {
                        property: tpm_pt::STARTUP_CLEAR,
                        value: self.startup_clear,
                    },
                ],
            },
        })
    }
}

/// Delegate double that stamps a fixed marker into every authorization area.
#[derive(Debug, Default)]
pub struct RecordingDelegate {
    pub commands: usize,
    pub entity_auth: Vec<u8>,
}

impl RecordingDelegate {
    pub const MARKER: &'static [u8] = b"recording-delegate";
}

impl AuthorizationDelegate for RecordingDelegate {
    fn command_authorization(&mut self, _cp_hash: &[u8], _: bool, _: bool) -> Result<Vec<u8>> {
        self.commands += 1;
        Ok(Self::MARKER.to_vec())
    }

    fn check_response_authorization(&mut self, _rp_hash: &[u8], _auth: &[u8]) -> Result<()> {
        Ok(())
    }

    fn encrypt_command_parameter(&mut self, _parameter: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn decrypt_response_parameter(&mut self, _parameter: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn set_entity_authorization_value(&mut self, value: &[u8]) {
        self.entity_auth = value.to_vec();
    }
}
