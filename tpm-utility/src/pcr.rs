// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! PCR extend/read and the TPM random number generator.

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use tpm2::{
    delegate_mut, handle_name, tpm_rc, AuthorizationDelegate, Error, Result, Tpm, TpmAlgId,
    TpmlDigestValues, TpmlPcrSelection, TpmtHa, HR_PCR, IMPLEMENTATION_PCR, SHA256_DIGEST_SIZE,
};

use crate::TpmUtility;

/// Most bytes requested from a single GetRandom.
const MAX_RANDOM_BYTES_PER_CALL: usize = SHA256_DIGEST_SIZE;

fn pcr_handle(index: u32) -> Result<u32> {
    if index >= IMPLEMENTATION_PCR {
        return Err(Error::Tpm(tpm_rc::FAILURE));
    }
    Ok(HR_PCR + index)
}

impl<T: Tpm> TpmUtility<T> {
    /// Extend the SHA-256 bank of PCR `index` with SHA-256(`data`).
    pub fn extend_pcr(
        &mut self,
        index: u32,
        data: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        let handle = pcr_handle(index)?;
        let digests = TpmlDigestValues::single(TpmtHa::sha256(Sha256::digest(data).to_vec()));
        debug!("extending PCR {index}");
        self.tpm
            .pcr_extend(handle, &handle_name(handle), &digests, delegate)
    }

    /// Current SHA-256 value of PCR `index`.
    pub fn read_pcr(&mut self, index: u32) -> Result<Vec<u8>> {
        pcr_handle(index)?;
        let selection = TpmlPcrSelection::single(TpmAlgId::Sha256, &[index]);
        let response = self.tpm.pcr_read(&selection, None)?;

        let returned = &response.selection.pcr_selections;
        let selection_matches = returned.len() == 1
            && returned[0].hash == TpmAlgId::Sha256
            && returned[0].selected() == [index];
        if !selection_matches || response.values.digests.len() != 1 {
            warn!(
                "PCR_Read returned an unexpected selection for PCR {index}: {:?} with {} digests",
                response.selection,
                response.values.digests.len()
            );
            return Err(Error::Tpm(tpm_rc::FAILURE));
        }
        let mut values = response.values.digests;
        Ok(values.remove(0).buffer)
    }

    /// Fetch exactly `num_bytes` random bytes, chunked to what one
    /// GetRandom call can return.
    pub fn generate_random(
        &mut self,
        num_bytes: usize,
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>> {
        let mut delegate = delegate;
        let mut random = Vec::with_capacity(num_bytes);
        while random.len() < num_bytes {
            let wanted = (num_bytes - random.len()).min(MAX_RANDOM_BYTES_PER_CALL);
            let chunk = self
                .tpm
                .get_random(wanted as u16, delegate_mut(&mut delegate))?;
            if chunk.is_empty() {
                warn!("GetRandom returned no bytes");
                return Err(Error::Tpm(tpm_rc::FAILURE));
            }
            random.extend_from_slice(&chunk);
        }
        random.truncate(num_bytes);
        Ok(random)
    }

    /// Mix caller entropy into the TPM RNG state.
    pub fn stir_random(
        &mut self,
        entropy: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        let digest = Sha256::digest(entropy);
        self.tpm.stir_random(&digest, delegate)
    }
}
