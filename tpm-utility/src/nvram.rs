// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! NV space management
//!
//! Callers address spaces by a logical index below [`MAX_NV_INDEX`]; the TPM
//! index is that value offset into the NV handle range. Public areas are
//! cached per logical index and updated as writes and locks succeed.

use tracing::{debug, warn};

use tpm2::{
    handle_name, tpm_rh, AuthorizationDelegate, Error, Result, Tpm, TpmaNv, TpmsNvPublic,
    NV_INDEX_FIRST,
};

use crate::TpmUtility;

/// Largest NV space this layer defines, reads or writes.
pub const MAX_NV_SIZE: usize = 1024;

/// Highest logical NV index.
pub const MAX_NV_INDEX: u32 = (1 << 24) - 1;

fn nv_index(index: u32) -> u32 {
    NV_INDEX_FIRST + index
}

fn check_bounds(index: u32, end: usize) -> Result<()> {
    if end > MAX_NV_SIZE {
        return Err(Error::BadSize);
    }
    if index > MAX_NV_INDEX {
        return Err(Error::BadParameter);
    }
    Ok(())
}

fn end_of(offset: u32, length: usize) -> Result<usize> {
    (offset as usize).checked_add(length).ok_or(Error::BadSize)
}

fn check_index(index: u32) -> Result<()> {
    check_bounds(index, 0)
}

impl<T: Tpm> TpmUtility<T> {
    /// Define an owner-writable, auth-readable space of `length` bytes.
    pub fn define_nv_space(
        &mut self,
        index: u32,
        length: usize,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        check_bounds(index, length)?;
        let delegate = delegate.ok_or(Error::InvalidSessions)?;
        let attributes = TpmaNv::new()
            .with_owner_write()
            .with_write_define()
            .with_auth_read();
        let public_info = TpmsNvPublic::new(nv_index(index), length as u16, attributes);
        self.tpm.nv_define_space(
            tpm_rh::OWNER,
            &handle_name(tpm_rh::OWNER),
            &[],
            &public_info,
            Some(delegate),
        )?;
        debug!("defined NV index 0x{:08x} with size {length}", nv_index(index));
        self.nvram_public_areas.insert(index, public_info);
        Ok(())
    }

    /// Undefine a space. The space does not need to be readable first.
    pub fn destroy_nv_space(
        &mut self,
        index: u32,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        check_index(index)?;
        let delegate = delegate.ok_or(Error::InvalidSessions)?;
        let nv_name = self.nv_name_best_effort(index);
        self.tpm.nv_undefine_space(
            tpm_rh::OWNER,
            &handle_name(tpm_rh::OWNER),
            nv_index(index),
            &nv_name,
            Some(delegate),
        )?;
        self.nvram_public_areas.remove(&index);
        debug!("undefined NV index 0x{:08x}", nv_index(index));
        Ok(())
    }

    /// Block further writes until the next TPM reset.
    pub fn lock_nv_space(
        &mut self,
        index: u32,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        check_index(index)?;
        let delegate = delegate.ok_or(Error::InvalidSessions)?;
        let nv_name = self.get_nv_space_name(index)?;
        let handle = nv_index(index);
        self.tpm
            .nv_write_lock(handle, &nv_name, handle, &nv_name, Some(delegate))?;
        self.mark_nv_space(index, TpmaNv::WRITE_LOCKED);
        Ok(())
    }

    pub fn write_nv_space(
        &mut self,
        index: u32,
        offset: u32,
        data: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        check_bounds(index, end_of(offset, data.len())?)?;
        let delegate = delegate.ok_or(Error::InvalidSessions)?;
        let nv_name = self.get_nv_space_name(index)?;
        self.tpm.nv_write(
            tpm_rh::OWNER,
            &handle_name(tpm_rh::OWNER),
            nv_index(index),
            &nv_name,
            data,
            offset as u16,
            Some(delegate),
        )?;
        self.mark_nv_space(index, TpmaNv::WRITTEN);
        Ok(())
    }

    /// Read `length` bytes at `offset`, authorized by the space itself.
    pub fn read_nv_space(
        &mut self,
        index: u32,
        offset: u32,
        length: usize,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>> {
        check_bounds(index, end_of(offset, length)?)?;
        let delegate = delegate.ok_or(Error::InvalidSessions)?;
        let nv_name = self.get_nv_space_name(index)?;
        let handle = nv_index(index);
        self.tpm.nv_read(
            handle,
            &nv_name,
            handle,
            &nv_name,
            length as u16,
            offset as u16,
            Some(delegate),
        )
    }

    /// Name of the space as currently reported by the TPM. The cache is
    /// left untouched.
    pub fn get_nv_space_name(&mut self, index: u32) -> Result<Vec<u8>> {
        check_index(index)?;
        let response = self
            .tpm
            .nv_read_public(nv_index(index), &handle_name(nv_index(index)), None)?;
        Ok(response.name)
    }

    /// Public area of the space, served from the cache when known.
    pub fn get_nv_space_public_area(&mut self, index: u32) -> Result<TpmsNvPublic> {
        check_index(index)?;
        if let Some(public) = self.nvram_public_areas.get(&index) {
            return Ok(public.clone());
        }
        let response = self
            .tpm
            .nv_read_public(nv_index(index), &handle_name(nv_index(index)), None)?;
        self.nvram_public_areas
            .insert(index, response.nv_public.clone());
        Ok(response.nv_public)
    }

    fn nv_name_best_effort(&mut self, index: u32) -> Vec<u8> {
        if let Some(name) = self
            .nvram_public_areas
            .get(&index)
            .and_then(|public| public.name().ok())
        {
            return name;
        }
        match self.get_nv_space_name(index) {
            Ok(name) => name,
            Err(err) => {
                warn!("failed to read name of NV index {index}: {err}");
                handle_name(nv_index(index))
            }
        }
    }

    fn mark_nv_space(&mut self, index: u32, flag: u32) {
        if let Some(public) = self.nvram_public_areas.get_mut(&index) {
            public.attributes.insert(flag);
        }
    }
}
