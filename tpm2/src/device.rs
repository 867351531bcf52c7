// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM device communication layer
//!
//! Provides low-level communication with TPM devices via /dev/tpmrm0 or /dev/tpm0,
//! plus the command/response framing shared by every transport.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use tracing::trace;

use super::constants::*;
use super::error::{Error, Result};
use super::marshal::*;

/// Maximum TPM command/response size
const TPM_MAX_COMMAND_SIZE: usize = 4096;

/// Size of the tag/size/code header common to commands and responses
pub const TPM_HEADER_SIZE: usize = 10;

/// Something that carries a marshalled command to a TPM and returns its
/// marshalled response.
pub trait Transport {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>>;
}

/// TPM character device
pub struct TpmDevice {
    file: File,
    path: String,
}

impl TpmDevice {
    /// Open a TPM device
    pub fn open(path: &str) -> Result<Self> {
        // Strip "device:" prefix if present
        let device_path = path.strip_prefix("device:").unwrap_or(path);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device_path)
            .map_err(|e| Error::Io(format!("failed to open {device_path}: {e}")))?;

        Ok(Self {
            file,
            path: device_path.to_string(),
        })
    }

    /// Detect and open the default TPM device, preferring the resource manager
    pub fn detect() -> Result<Self> {
        if Path::new("/dev/tpmrm0").exists() {
            Self::open("/dev/tpmrm0")
        } else if Path::new("/dev/tpm0").exists() {
            Self::open("/dev/tpm0")
        } else {
            Err(Error::Io("TPM device not found".into()))
        }
    }

    /// Get the device path
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Transport for TpmDevice {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        self.file.write_all(command)?;

        let mut response = vec![0u8; TPM_MAX_COMMAND_SIZE];
        let n = self.file.read(&mut response)?;
        response.truncate(n);
        trace!("{}: {} byte command, {} byte response", self.path, command.len(), n);
        Ok(response)
    }
}

/// TPM command builder
///
/// Handles, the optional authorization area and the parameter area are kept
/// apart until `finalize`, so callers can hash and encrypt the parameters
/// before the authorization is computed.
pub struct TpmCommand {
    code: TpmCc,
    handles: Vec<u32>,
    authorization: Option<Vec<u8>>,
    params: CommandBuffer,
}

impl TpmCommand {
    pub fn new(code: TpmCc) -> Self {
        Self {
            code,
            handles: Vec::new(),
            authorization: None,
            params: CommandBuffer::with_capacity(256),
        }
    }

    pub fn code(&self) -> TpmCc {
        self.code
    }

    /// Add a handle to the command
    pub fn add_handle(&mut self, handle: u32) {
        self.handles.push(handle);
    }

    pub fn handles(&self) -> &[u32] {
        &self.handles
    }

    /// Add a u8 parameter
    pub fn add_u8(&mut self, v: u8) {
        self.params.put_u8(v);
    }

    /// Add a u16 parameter
    pub fn add_u16(&mut self, v: u16) {
        self.params.put_u16(v);
    }

    /// Add a u32 parameter
    pub fn add_u32(&mut self, v: u32) {
        self.params.put_u32(v);
    }

    /// Add a TPM2B parameter
    pub fn add_tpm2b(&mut self, data: &[u8]) {
        self.params.put_tpm2b(data);
    }

    /// Add an empty TPM2B parameter
    pub fn add_tpm2b_empty(&mut self) {
        self.params.put_tpm2b_empty();
    }

    /// Add a marshallable parameter
    pub fn add<T: Marshal + ?Sized>(&mut self, value: &T) {
        value.marshal(&mut self.params);
    }

    /// Add a marshallable parameter wrapped in a TPM2B size prefix
    pub fn add_sized<T: Marshal + ?Sized>(&mut self, value: &T) {
        self.params.put_sized(value);
    }

    /// The marshalled parameter area
    pub fn parameters(&self) -> &[u8] {
        self.params.as_bytes()
    }

    /// Replace the parameter area, e.g. after parameter encryption
    pub fn set_parameters(&mut self, params: Vec<u8>) {
        let mut buf = CommandBuffer::with_capacity(params.len());
        buf.put_bytes(&params);
        self.params = buf;
    }

    /// Attach a serialized authorization area (one or more TPMS_AUTH_COMMAND)
    pub fn set_authorization(&mut self, authorization: Vec<u8>) {
        self.authorization = Some(authorization);
    }

    /// Finalize the command and return the bytes
    pub fn finalize(self) -> Vec<u8> {
        let mut buf = CommandBuffer::with_capacity(TPM_HEADER_SIZE + 64 + self.params.len());

        // Header: tag (2) + size (4) + command code (4)
        let tag = if self.authorization.is_some() {
            TpmSt::Sessions
        } else {
            TpmSt::NoSessions
        };
        buf.put_u16(tag.to_u16());
        buf.put_u32(0); // Size placeholder
        buf.put_u32(self.code.to_u32());

        for handle in &self.handles {
            buf.put_u32(*handle);
        }
        if let Some(auth) = &self.authorization {
            buf.put_u32(auth.len() as u32);
            buf.put_bytes(auth);
        }
        buf.put_bytes(self.params.as_bytes());

        let size = buf.len() as u32;
        buf.update_u32(2, size);
        buf.into_vec()
    }
}

/// TPM response parser
#[derive(Debug)]
pub struct TpmResponse {
    pub tag: TpmSt,
    pub response_code: u32,
    pub data: Vec<u8>,
}

/// A successful response split into its areas
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ResponseAreas {
    pub handles: Vec<u32>,
    pub parameters: Vec<u8>,
    pub authorization: Vec<u8>,
}

impl TpmResponse {
    /// Parse a TPM response
    pub fn parse(response: &[u8]) -> Result<Self> {
        if response.len() < TPM_HEADER_SIZE {
            return Err(Error::malformed(format!(
                "TPM response too short: {} bytes",
                response.len()
            )));
        }

        let mut buf = ResponseBuffer::new(response);

        let tag_raw = buf.get_u16()?;
        let tag = TpmSt::from_u16(tag_raw)
            .ok_or_else(|| Error::malformed(format!("invalid response tag: 0x{tag_raw:04x}")))?;

        let size = buf.get_u32()? as usize;
        if size < TPM_HEADER_SIZE || response.len() < size {
            return Err(Error::malformed(format!(
                "TPM response size mismatch: header says {}, got {}",
                size,
                response.len()
            )));
        }

        let response_code = buf.get_u32()?;

        // Remaining data after header
        let data = response[TPM_HEADER_SIZE..size].to_vec();

        Ok(Self {
            tag,
            response_code,
            data,
        })
    }

    /// Check if the response indicates success
    pub fn is_success(&self) -> bool {
        self.response_code == tpm_rc::SUCCESS
    }

    /// Ensure the response is successful
    pub fn ensure_success(&self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(Error::Tpm(self.response_code))
        }
    }

    /// Split the response body into handles, parameters and authorization.
    pub fn split(&self, handle_count: usize) -> Result<ResponseAreas> {
        let mut buf = ResponseBuffer::new(&self.data);
        let mut handles = Vec::with_capacity(handle_count);
        for _ in 0..handle_count {
            handles.push(buf.get_u32()?);
        }
        let (parameters, authorization) = match self.tag {
            TpmSt::Sessions => {
                let param_size = buf.get_u32()? as usize;
                let parameters = buf.get_bytes(param_size)?;
                (parameters, buf.get_remaining())
            }
            _ => (buf.get_remaining(), Vec::new()),
        };
        Ok(ResponseAreas {
            handles,
            parameters,
            authorization,
        })
    }
}
