// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 command implementations
//!
//! `TpmContext` marshals each command, runs it through the authorization
//! delegate, sends it over a transport and unmarshals the response.

use sha2::{Digest, Sha256};
use tracing::debug;

use super::constants::*;
use super::device::*;
use super::error::{error_string, Error, Result};
use super::marshal::*;
use super::session::AuthorizationDelegate;
use super::tpm::*;
use super::types::*;

/// Response handle count and parameter encryption capability of a command.
#[derive(Debug, Clone, Copy)]
struct Shape {
    response_handles: usize,
    encrypt_command: bool,
    decrypt_response: bool,
}

const PLAIN: Shape = Shape {
    response_handles: 0,
    encrypt_command: false,
    decrypt_response: false,
};

/// Apply `f` to the value of the TPM2B at the start of `params`.
fn with_first_tpm2b(
    params: &mut [u8],
    f: impl FnOnce(&mut Vec<u8>) -> Result<()>,
) -> Result<()> {
    if params.len() < 2 {
        return Err(Error::malformed("no TPM2B parameter to transform"));
    }
    let size = u16::from_be_bytes([params[0], params[1]]) as usize;
    let value_range = 2..2 + size;
    let Some(slice) = params.get_mut(value_range) else {
        return Err(Error::malformed("truncated TPM2B parameter"));
    };
    let mut value = slice.to_vec();
    f(&mut value)?;
    if value.len() != size {
        return Err(Error::malformed("parameter encryption changed the size"));
    }
    slice.copy_from_slice(&value);
    Ok(())
}

/// cpHash: H(commandCode || names || parameters)
fn command_hash(code: TpmCc, names: &[&[u8]], params: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(code.to_u32().to_be_bytes());
    for name in names {
        hasher.update(name);
    }
    hasher.update(params);
    hasher.finalize().to_vec()
}

/// rpHash: H(responseCode || commandCode || parameters)
fn response_hash(code: TpmCc, params: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(tpm_rc::SUCCESS.to_be_bytes());
    hasher.update(code.to_u32().to_be_bytes());
    hasher.update(params);
    hasher.finalize().to_vec()
}

/// Pure Rust TPM context
pub struct TpmContext<T: Transport = TpmDevice> {
    transport: T,
}

impl TpmContext<TpmDevice> {
    /// Create a new TPM context with the given device path
    pub fn new(tcti_path: Option<&str>) -> Result<Self> {
        let device = match tcti_path {
            Some(path) => TpmDevice::open(path)?,
            None => TpmDevice::detect()?,
        };

        Ok(Self { transport: device })
    }

    /// Get the device path
    pub fn device_path(&self) -> &str {
        self.transport.path()
    }
}

impl<T: Transport> TpmContext<T> {
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Run one command through the delegate and the transport. Returns the
    /// response areas with the parameters already decrypted.
    fn execute(
        &mut self,
        mut cmd: TpmCommand,
        names: &[&[u8]],
        shape: Shape,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<ResponseAreas> {
        let code = cmd.code();
        let mut delegate = delegate;

        if let Some(d) = delegate.as_deref_mut() {
            let mut params = cmd.parameters().to_vec();
            if shape.encrypt_command {
                with_first_tpm2b(&mut params, |value| d.encrypt_command_parameter(value))?;
                cmd.set_parameters(params.clone());
            }
            let cp_hash = command_hash(code, names, &params);
            let authorization = d.command_authorization(
                &cp_hash,
                shape.encrypt_command,
                shape.decrypt_response,
            )?;
            cmd.set_authorization(authorization);
        }

        let command = cmd.finalize();
        debug!("{:?}: sending {} bytes", code, command.len());
        let response_bytes = self.transport.transmit(&command)?;
        let response = TpmResponse::parse(&response_bytes)?;
        if !response.is_success() {
            debug!(
                "{:?} failed: {}",
                code,
                error_string(response.response_code)
            );
            return Err(Error::Tpm(response.response_code));
        }

        let mut areas = response.split(shape.response_handles)?;
        if let Some(d) = delegate {
            if response.tag != TpmSt::Sessions {
                return Err(Error::malformed("response carries no authorization"));
            }
            let rp_hash = response_hash(code, &areas.parameters);
            d.check_response_authorization(&rp_hash, &areas.authorization)?;
            if shape.decrypt_response {
                with_first_tpm2b(&mut areas.parameters, |value| {
                    d.decrypt_response_parameter(value)
                })?;
            }
        }
        Ok(areas)
    }
}

impl<T: Transport> Tpm for TpmContext<T> {
    fn startup(&mut self, startup_type: TpmSu) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::Startup);
        cmd.add_u16(startup_type.to_u16());
        self.execute(cmd, &[], PLAIN, None)?;
        Ok(())
    }

    fn shutdown(&mut self, shutdown_type: TpmSu) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::Shutdown);
        cmd.add_u16(shutdown_type.to_u16());
        self.execute(cmd, &[], PLAIN, None)?;
        Ok(())
    }

    fn self_test(&mut self, full_test: bool) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::SelfTest);
        cmd.add_u8(full_test as u8);
        self.execute(cmd, &[], PLAIN, None)?;
        Ok(())
    }

    fn clear(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::Clear);
        cmd.add_handle(auth_handle);
        self.execute(cmd, &[auth_name], PLAIN, delegate)?;
        Ok(())
    }

    fn hierarchy_change_auth(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        new_auth: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::HierarchyChangeAuth);
        cmd.add_handle(auth_handle);
        cmd.add_tpm2b(new_auth);
        let shape = Shape {
            encrypt_command: true,
            ..PLAIN
        };
        self.execute(cmd, &[auth_name], shape, delegate)?;
        Ok(())
    }

    fn hierarchy_control(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        enable: u32,
        state: bool,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::HierarchyControl);
        cmd.add_handle(auth_handle);
        cmd.add_u32(enable);
        cmd.add_u8(state as u8);
        self.execute(cmd, &[auth_name], PLAIN, delegate)?;
        Ok(())
    }

    fn pcr_allocate(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        allocation: &TpmlPcrSelection,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<PcrAllocateResponse> {
        let mut cmd = TpmCommand::new(TpmCc::PcrAllocate);
        cmd.add_handle(auth_handle);
        cmd.add(allocation);
        let areas = self.execute(cmd, &[auth_name], PLAIN, delegate)?;

        let mut buf = ResponseBuffer::new(&areas.parameters);
        let response = PcrAllocateResponse {
            allocation_success: buf.get_u8()? != 0,
            max_pcr: buf.get_u32()?,
            size_needed: buf.get_u32()?,
            size_available: buf.get_u32()?,
        };
        buf.finish()?;
        Ok(response)
    }

    fn get_random(
        &mut self,
        bytes_requested: u16,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>> {
        let mut cmd = TpmCommand::new(TpmCc::GetRandom);
        cmd.add_u16(bytes_requested);
        let shape = Shape {
            decrypt_response: true,
            ..PLAIN
        };
        let areas = self.execute(cmd, &[], shape, delegate)?;

        let mut buf = ResponseBuffer::new(&areas.parameters);
        let random_bytes = buf.get_tpm2b()?;
        buf.finish()?;
        Ok(random_bytes)
    }

    fn stir_random(
        &mut self,
        in_data: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::StirRandom);
        cmd.add_tpm2b(in_data);
        let shape = Shape {
            encrypt_command: true,
            ..PLAIN
        };
        self.execute(cmd, &[], shape, delegate)?;
        Ok(())
    }

    fn pcr_extend(
        &mut self,
        pcr_handle: u32,
        pcr_name: &[u8],
        digests: &TpmlDigestValues,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::PcrExtend);
        cmd.add_handle(pcr_handle);
        cmd.add(digests);
        self.execute(cmd, &[pcr_name], PLAIN, delegate)?;
        debug!("extended PCR {}", pcr_handle - HR_PCR);
        Ok(())
    }

    fn pcr_read(
        &mut self,
        selection: &TpmlPcrSelection,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<PcrReadResponse> {
        let mut cmd = TpmCommand::new(TpmCc::PcrRead);
        cmd.add(selection);
        let areas = self.execute(cmd, &[], PLAIN, delegate)?;

        let mut buf = ResponseBuffer::new(&areas.parameters);
        let response = PcrReadResponse {
            update_counter: buf.get_u32()?,
            selection: TpmlPcrSelection::unmarshal(&mut buf)?,
            values: TpmlDigest::unmarshal(&mut buf)?,
        };
        buf.finish()?;
        Ok(response)
    }

    fn read_public(
        &mut self,
        object_handle: u32,
        object_name: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<ReadPublicResponse> {
        let mut cmd = TpmCommand::new(TpmCc::ReadPublic);
        cmd.add_handle(object_handle);
        let shape = Shape {
            decrypt_response: true,
            ..PLAIN
        };
        let areas = self.execute(cmd, &[object_name], shape, delegate)?;

        let mut buf = ResponseBuffer::new(&areas.parameters);
        let response = ReadPublicResponse {
            out_public: buf.get_sized()?,
            name: buf.get_tpm2b()?,
            qualified_name: buf.get_tpm2b()?,
        };
        buf.finish()?;
        Ok(response)
    }

    fn create_primary(
        &mut self,
        primary_handle: u32,
        primary_name: &[u8],
        in_sensitive: &Tpm2bSensitiveCreate,
        in_public: &TpmtPublic,
        outside_info: &[u8],
        creation_pcr: &TpmlPcrSelection,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<CreatePrimaryResponse> {
        let mut cmd = TpmCommand::new(TpmCc::CreatePrimary);
        cmd.add_handle(primary_handle);
        cmd.add(in_sensitive);
        cmd.add_sized(in_public);
        cmd.add_tpm2b(outside_info);
        cmd.add(creation_pcr);
        let shape = Shape {
            response_handles: 1,
            encrypt_command: true,
            decrypt_response: true,
        };
        let areas = self.execute(cmd, &[primary_name], shape, delegate)?;

        let mut buf = ResponseBuffer::new(&areas.parameters);
        let out_public = buf.get_sized()?;
        let _creation_data = buf.get_tpm2b()?;
        let _creation_hash = buf.get_tpm2b()?;
        let _creation_ticket = TpmtTicket::unmarshal(&mut buf)?;
        let name = buf.get_tpm2b()?;
        buf.finish()?;

        let object_handle = areas.handles[0];
        debug!("created primary key with handle 0x{:08x}", object_handle);
        Ok(CreatePrimaryResponse {
            object_handle,
            out_public,
            name,
        })
    }

    fn create(
        &mut self,
        parent_handle: u32,
        parent_name: &[u8],
        in_sensitive: &Tpm2bSensitiveCreate,
        in_public: &TpmtPublic,
        outside_info: &[u8],
        creation_pcr: &TpmlPcrSelection,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<CreateResponse> {
        let mut cmd = TpmCommand::new(TpmCc::Create);
        cmd.add_handle(parent_handle);
        cmd.add(in_sensitive);
        cmd.add_sized(in_public);
        cmd.add_tpm2b(outside_info);
        cmd.add(creation_pcr);
        let shape = Shape {
            response_handles: 0,
            encrypt_command: true,
            decrypt_response: true,
        };
        let areas = self.execute(cmd, &[parent_name], shape, delegate)?;

        let mut buf = ResponseBuffer::new(&areas.parameters);
        let out_private = Tpm2bPrivate::unmarshal(&mut buf)?;
        let out_public = buf.get_sized()?;
        let _creation_data = buf.get_tpm2b()?;
        let _creation_hash = buf.get_tpm2b()?;
        let _creation_ticket = TpmtTicket::unmarshal(&mut buf)?;
        buf.finish()?;
        Ok(CreateResponse {
            out_private,
            out_public,
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
        let mut cmd = TpmCommand::new(TpmCc::Load);
        cmd.add_handle(parent_handle);
        cmd.add(in_private);
        cmd.add_sized(in_public);
        let shape = Shape {
            response_handles: 1,
            encrypt_command: true,
            decrypt_response: true,
        };
        let areas = self.execute(cmd, &[parent_name], shape, delegate)?;

        let mut buf = ResponseBuffer::new(&areas.parameters);
        let name = buf.get_tpm2b()?;
        buf.finish()?;

        let object_handle = areas.handles[0];
        debug!("loaded object with handle 0x{:08x}", object_handle);
        Ok(LoadResponse {
            object_handle,
            name,
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
        let mut cmd = TpmCommand::new(TpmCc::Import);
        cmd.add_handle(parent_handle);
        cmd.add_tpm2b(encryption_key);
        cmd.add_sized(object_public);
        cmd.add_tpm2b(duplicate);
        cmd.add_tpm2b(in_sym_seed);
        cmd.add(symmetric_alg);
        let shape = Shape {
            response_handles: 0,
            encrypt_command: true,
            decrypt_response: true,
        };
        let areas = self.execute(cmd, &[parent_name], shape, delegate)?;

        let mut buf = ResponseBuffer::new(&areas.parameters);
        let out_private = Tpm2bPrivate::unmarshal(&mut buf)?;
        buf.finish()?;
        Ok(out_private)
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
        let mut cmd = TpmCommand::new(TpmCc::ObjectChangeAuth);
        cmd.add_handle(object_handle);
        cmd.add_handle(parent_handle);
        cmd.add_tpm2b(new_auth);
        let shape = Shape {
            response_handles: 0,
            encrypt_command: true,
            decrypt_response: true,
        };
        let areas = self.execute(cmd, &[object_name, parent_name], shape, delegate)?;

        let mut buf = ResponseBuffer::new(&areas.parameters);
        let out_private = Tpm2bPrivate::unmarshal(&mut buf)?;
        buf.finish()?;
        Ok(out_private)
    }

    fn evict_control(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        object_handle: u32,
        object_name: &[u8],
        persistent_handle: u32,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::EvictControl);
        cmd.add_handle(auth_handle);
        cmd.add_handle(object_handle);
        cmd.add_u32(persistent_handle);
        self.execute(cmd, &[auth_name, object_name], PLAIN, delegate)?;
        debug!("made key persistent at 0x{:08x}", persistent_handle);
        Ok(())
    }

    fn flush_context(&mut self, flush_handle: u32) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::FlushContext);
        cmd.add_u32(flush_handle);
        self.execute(cmd, &[], PLAIN, None)?;
        Ok(())
    }

    fn sign(
        &mut self,
        key_handle: u32,
        key_name: &[u8],
        digest: &[u8],
        scheme: &TpmtSigScheme,
        validation: &TpmtTicket,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<TpmtSignature> {
        let mut cmd = TpmCommand::new(TpmCc::Sign);
        cmd.add_handle(key_handle);
        cmd.add_tpm2b(digest);
        cmd.add(scheme);
        cmd.add(validation);
        let shape = Shape {
            encrypt_command: true,
            ..PLAIN
        };
        let areas = self.execute(cmd, &[key_name], shape, delegate)?;
        TpmtSignature::from_bytes(&areas.parameters)
    }

    fn verify_signature(
        &mut self,
        key_handle: u32,
        key_name: &[u8],
        digest: &[u8],
        signature: &TpmtSignature,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<TpmtTicket> {
        let mut cmd = TpmCommand::new(TpmCc::VerifySignature);
        cmd.add_handle(key_handle);
        cmd.add_tpm2b(digest);
        cmd.add(signature);
        let shape = Shape {
            encrypt_command: true,
            ..PLAIN
        };
        let areas = self.execute(cmd, &[key_name], shape, delegate)?;
        TpmtTicket::from_bytes(&areas.parameters)
    }

    fn rsa_encrypt(
        &mut self,
        key_handle: u32,
        key_name: &[u8],
        message: &[u8],
        scheme: &TpmtRsaDecrypt,
        label: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>> {
        let mut cmd = TpmCommand::new(TpmCc::RsaEncrypt);
        cmd.add_handle(key_handle);
        cmd.add_tpm2b(message);
        cmd.add(scheme);
        cmd.add_tpm2b(label);
        let shape = Shape {
            response_handles: 0,
            encrypt_command: true,
            decrypt_response: true,
        };
        let areas = self.execute(cmd, &[key_name], shape, delegate)?;

        let mut buf = ResponseBuffer::new(&areas.parameters);
        let out_data = buf.get_tpm2b()?;
        buf.finish()?;
        Ok(out_data)
    }

    fn rsa_decrypt(
        &mut self,
        key_handle: u32,
        key_name: &[u8],
        cipher_text: &[u8],
        scheme: &TpmtRsaDecrypt,
        label: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>> {
        let mut cmd = TpmCommand::new(TpmCc::RsaDecrypt);
        cmd.add_handle(key_handle);
        cmd.add_tpm2b(cipher_text);
        cmd.add(scheme);
        cmd.add_tpm2b(label);
        let shape = Shape {
            response_handles: 0,
            encrypt_command: true,
            decrypt_response: true,
        };
        let areas = self.execute(cmd, &[key_name], shape, delegate)?;

        let mut buf = ResponseBuffer::new(&areas.parameters);
        let message = buf.get_tpm2b()?;
        buf.finish()?;
        Ok(message)
    }

    fn nv_define_space(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        auth: &[u8],
        public_info: &TpmsNvPublic,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::NvDefineSpace);
        cmd.add_handle(auth_handle);
        cmd.add_tpm2b(auth);
        cmd.add_sized(public_info);
        let shape = Shape {
            encrypt_command: true,
            ..PLAIN
        };
        self.execute(cmd, &[auth_name], shape, delegate)?;
        debug!(
            "defined NV index 0x{:08x} with size {}",
            public_info.nv_index, public_info.data_size
        );
        Ok(())
    }

    fn nv_undefine_space(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        nv_index: u32,
        nv_name: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::NvUndefineSpace);
        cmd.add_handle(auth_handle);
        cmd.add_handle(nv_index);
        self.execute(cmd, &[auth_name, nv_name], PLAIN, delegate)?;
        debug!("undefined NV index 0x{:08x}", nv_index);
        Ok(())
    }

    fn nv_write(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        nv_index: u32,
        nv_name: &[u8],
        data: &[u8],
        offset: u16,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::NvWrite);
        cmd.add_handle(auth_handle);
        cmd.add_handle(nv_index);
        cmd.add_tpm2b(data);
        cmd.add_u16(offset);
        let shape = Shape {
            encrypt_command: true,
            ..PLAIN
        };
        self.execute(cmd, &[auth_name, nv_name], shape, delegate)?;
        debug!("wrote {} bytes to NV index 0x{:08x}", data.len(), nv_index);
        Ok(())
    }

    fn nv_read(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        nv_index: u32,
        nv_name: &[u8],
        size: u16,
        offset: u16,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>> {
        let mut cmd = TpmCommand::new(TpmCc::NvRead);
        cmd.add_handle(auth_handle);
        cmd.add_handle(nv_index);
        cmd.add_u16(size);
        cmd.add_u16(offset);
        let shape = Shape {
            decrypt_response: true,
            ..PLAIN
        };
        let areas = self.execute(cmd, &[auth_name, nv_name], shape, delegate)?;

        let mut buf = ResponseBuffer::new(&areas.parameters);
        let data = buf.get_tpm2b()?;
        buf.finish()?;
        Ok(data)
    }

    fn nv_write_lock(
        &mut self,
        auth_handle: u32,
        auth_name: &[u8],
        nv_index: u32,
        nv_name: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::NvWriteLock);
        cmd.add_handle(auth_handle);
        cmd.add_handle(nv_index);
        self.execute(cmd, &[auth_name, nv_name], PLAIN, delegate)?;
        Ok(())
    }

    fn nv_read_public(
        &mut self,
        nv_index: u32,
        nv_name: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<NvReadPublicResponse> {
        let mut cmd = TpmCommand::new(TpmCc::NvReadPublic);
        cmd.add_handle(nv_index);
        let shape = Shape {
            decrypt_response: true,
            ..PLAIN
        };
        let areas = self.execute(cmd, &[nv_name], shape, delegate)?;

        let mut buf = ResponseBuffer::new(&areas.parameters);
        let response = NvReadPublicResponse {
            nv_public: buf.get_sized()?,
            name: buf.get_tpm2b()?,
        };
        buf.finish()?;
        Ok(response)
    }

    fn get_capability(
        &mut self,
        capability: TpmCap,
        property: u32,
        property_count: u32,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<CapabilityResponse> {
        let mut cmd = TpmCommand::new(TpmCc::GetCapability);
        cmd.add_u32(capability.to_u32());
        cmd.add_u32(property);
        cmd.add_u32(property_count);
        let areas = self.execute(cmd, &[], PLAIN, delegate)?;

        let mut buf = ResponseBuffer::new(&areas.parameters);
        let more_data = buf.get_u8()? != 0;
        let returned = buf.get_u32()?;
        if returned != TpmCap::TpmProperties.to_u32() {
            return Err(Error::malformed(format!(
                "unsupported capability data: 0x{returned:08x}"
            )));
        }
        let properties = TpmlTaggedTpmProperty::unmarshal(&mut buf)?;
        buf.finish()?;
        Ok(CapabilityResponse {
            more_data,
            properties,
        })
    }
}
