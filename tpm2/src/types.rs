// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: BUSL-1.1

//! TPM 2.0 data types

use sha2::{Digest, Sha256, Sha384, Sha512};

use super::constants::*;
use super::error::{Error, Result};
use super::marshal::*;

fn alg_from_u16(raw: u16) -> Result<TpmAlgId> {
    TpmAlgId::from_u16(raw).ok_or_else(|| Error::malformed(format!("unknown algorithm: 0x{raw:04x}")))
}

/// Hash `data` with a TPM hash algorithm.
pub fn hash_data(alg: TpmAlgId, data: &[u8]) -> Result<Vec<u8>> {
    match alg {
        TpmAlgId::Sha256 => Ok(Sha256::digest(data).to_vec()),
        TpmAlgId::Sha384 => Ok(Sha384::digest(data).to_vec()),
        TpmAlgId::Sha512 => Ok(Sha512::digest(data).to_vec()),
        _ => Err(Error::BadParameter),
    }
}

/// TPM name of an entity: nameAlg followed by the digest of its public area.
/// A NULL name algorithm yields an empty name.
pub fn compute_name(name_alg: TpmAlgId, public_area: &[u8]) -> Result<Vec<u8>> {
    if name_alg == TpmAlgId::Null {
        return Ok(Vec::new());
    }
    let digest = hash_data(name_alg, public_area)?;
    let mut name = Vec::with_capacity(2 + digest.len());
    name.extend_from_slice(&name_alg.to_u16().to_be_bytes());
    name.extend_from_slice(&digest);
    Ok(name)
}

/// Name of a PCR, permanent or session handle: the handle itself.
pub fn handle_name(handle: u32) -> Vec<u8> {
    handle.to_be_bytes().to_vec()
}

/// TPM2B_DIGEST - Variable length digest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tpm2bDigest {
    pub buffer: Vec<u8>,
}

impl Tpm2bDigest {
    pub fn new(data: Vec<u8>) -> Self {
        Self { buffer: data }
    }

    pub fn empty() -> Self {
        Self { buffer: Vec::new() }
    }
}

impl Marshal for Tpm2bDigest {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_tpm2b(&self.buffer);
    }
}

impl Unmarshal for Tpm2bDigest {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        Ok(Self {
            buffer: buf.get_tpm2b()?,
        })
    }
}

/// TPM2B_AUTH - Authorization value
pub type Tpm2bAuth = Tpm2bDigest;

/// TPM2B_SENSITIVE_DATA - Sensitive data for object creation
pub type Tpm2bSensitiveData = Tpm2bDigest;

/// TPM2B_PRIVATE - Private area as produced by the TPM
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tpm2bPrivate {
    pub buffer: Vec<u8>,
}

impl Tpm2bPrivate {
    pub fn new(data: Vec<u8>) -> Self {
        Self { buffer: data }
    }
}

impl Marshal for Tpm2bPrivate {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_tpm2b(&self.buffer);
    }
}

impl Unmarshal for Tpm2bPrivate {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        Ok(Self {
            buffer: buf.get_tpm2b()?,
        })
    }
}

/// TPMS_PCR_SELECTION - PCR selection for a single hash algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsPcrSelection {
    pub hash: TpmAlgId,
    pub pcr_select: Vec<u8>, // Bitmap of selected PCRs
}

impl TpmsPcrSelection {
    pub fn new(hash: TpmAlgId, pcrs: &[u32]) -> Self {
        // At least PCR_SELECT_MIN bytes, enough for the highest PCR
        let max_pcr = pcrs.iter().max().copied().unwrap_or(0);
        let size = ((max_pcr / 8) + 1).max(PCR_SELECT_MIN as u32) as usize;
        let mut pcr_select = vec![0u8; size];

        for &pcr in pcrs {
            pcr_select[(pcr / 8) as usize] |= 1 << (pcr % 8);
        }

        Self { hash, pcr_select }
    }

    /// Every PCR of the bank selected.
    pub fn all(hash: TpmAlgId, size: usize) -> Self {
        Self {
            hash,
            pcr_select: vec![0xFF; size],
        }
    }

    /// Indices of the selected PCRs, ascending.
    pub fn selected(&self) -> Vec<u32> {
        let mut pcrs = Vec::new();
        for (byte_idx, &byte) in self.pcr_select.iter().enumerate() {
            for bit in 0..8 {
                if byte & (1 << bit) != 0 {
                    pcrs.push((byte_idx * 8 + bit) as u32);
                }
            }
        }
        pcrs
    }
}

impl Marshal for TpmsPcrSelection {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u16(self.hash.to_u16());
        buf.put_u8(self.pcr_select.len() as u8);
        buf.put_bytes(&self.pcr_select);
    }
}

impl Unmarshal for TpmsPcrSelection {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let hash = alg_from_u16(buf.get_u16()?)?;
        let size = buf.get_u8()? as usize;
        let pcr_select = buf.get_bytes(size)?;
        Ok(Self { hash, pcr_select })
    }
}

/// TPML_PCR_SELECTION - List of PCR selections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmlPcrSelection {
    pub pcr_selections: Vec<TpmsPcrSelection>,
}

impl TpmlPcrSelection {
    pub fn new(selections: Vec<TpmsPcrSelection>) -> Self {
        Self {
            pcr_selections: selections,
        }
    }

    pub fn single(hash: TpmAlgId, pcrs: &[u32]) -> Self {
        Self {
            pcr_selections: vec![TpmsPcrSelection::new(hash, pcrs)],
        }
    }
}

impl Marshal for TpmlPcrSelection {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u32(self.pcr_selections.len() as u32);
        for sel in &self.pcr_selections {
            sel.marshal(buf);
        }
    }
}

impl Unmarshal for TpmlPcrSelection {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let count = buf.get_u32()? as usize;
        let mut pcr_selections = Vec::with_capacity(count.min(16));
        for _ in 0..count {
            pcr_selections.push(TpmsPcrSelection::unmarshal(buf)?);
        }
        Ok(Self { pcr_selections })
    }
}

/// TPML_DIGEST - List of digests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmlDigest {
    pub digests: Vec<Tpm2bDigest>,
}

impl Unmarshal for TpmlDigest {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let count = buf.get_u32()? as usize;
        let mut digests = Vec::with_capacity(count.min(16));
        for _ in 0..count {
            digests.push(Tpm2bDigest::unmarshal(buf)?);
        }
        Ok(Self { digests })
    }
}

/// TPMS_NV_PUBLIC - NV index public area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsNvPublic {
    pub nv_index: u32,
    pub name_alg: TpmAlgId,
    pub attributes: TpmaNv,
    pub auth_policy: Tpm2bDigest,
    pub data_size: u16,
}

impl TpmsNvPublic {
    pub fn new(nv_index: u32, data_size: u16, attributes: TpmaNv) -> Self {
        Self {
            nv_index,
            name_alg: TpmAlgId::Sha256,
            attributes,
            auth_policy: Tpm2bDigest::empty(),
            data_size,
        }
    }

    /// Name of the NV index as the TPM computes it.
    pub fn name(&self) -> Result<Vec<u8>> {
        compute_name(self.name_alg, &self.to_bytes())
    }
}

impl Marshal for TpmsNvPublic {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u32(self.nv_index);
        buf.put_u16(self.name_alg.to_u16());
        buf.put_u32(self.attributes.0);
        self.auth_policy.marshal(buf);
        buf.put_u16(self.data_size);
    }
}

impl Unmarshal for TpmsNvPublic {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let nv_index = buf.get_u32()?;
        let name_alg = alg_from_u16(buf.get_u16()?)?;
        let attributes = TpmaNv(buf.get_u32()?);
        let auth_policy = Tpm2bDigest::unmarshal(buf)?;
        let data_size = buf.get_u16()?;
        Ok(Self {
            nv_index,
            name_alg,
            attributes,
            auth_policy,
            data_size,
        })
    }
}

/// TPMT_SYM_DEF(_OBJECT) - Symmetric algorithm definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtSymDef {
    pub algorithm: TpmAlgId,
    pub key_bits: u16,
    pub mode: TpmAlgId,
}

impl TpmtSymDef {
    pub fn null() -> Self {
        Self {
            algorithm: TpmAlgId::Null,
            key_bits: 0,
            mode: TpmAlgId::Null,
        }
    }

    pub fn aes_128_cfb() -> Self {
        Self {
            algorithm: TpmAlgId::Aes,
            key_bits: 128,
            mode: TpmAlgId::Cfb,
        }
    }
}

impl Marshal for TpmtSymDef {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u16(self.algorithm.to_u16());
        if self.algorithm != TpmAlgId::Null {
            buf.put_u16(self.key_bits);
            buf.put_u16(self.mode.to_u16());
        }
    }
}

impl Unmarshal for TpmtSymDef {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let algorithm = alg_from_u16(buf.get_u16()?)?;
        if algorithm == TpmAlgId::Null {
            return Ok(Self::null());
        }
        let key_bits = buf.get_u16()?;
        let mode = alg_from_u16(buf.get_u16()?)?;
        Ok(Self {
            algorithm,
            key_bits,
            mode,
        })
    }
}

/// Scheme selector followed by its hash detail.
///
/// Shared layout of TPMT_RSA_SCHEME, TPMT_RSA_DECRYPT, TPMT_SIG_SCHEME,
/// TPMT_ECC_SCHEME and TPMT_KDF_SCHEME: the hash is present for every scheme
/// except NULL and RSAES.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtScheme {
    pub scheme: TpmAlgId,
    pub hash_alg: Option<TpmAlgId>,
}

pub type TpmtRsaScheme = TpmtScheme;
pub type TpmtRsaDecrypt = TpmtScheme;
pub type TpmtSigScheme = TpmtScheme;
pub type TpmtEccScheme = TpmtScheme;
pub type TpmtKdfScheme = TpmtScheme;

impl TpmtScheme {
    pub fn null() -> Self {
        Self {
            scheme: TpmAlgId::Null,
            hash_alg: None,
        }
    }

    pub fn with_hash(scheme: TpmAlgId, hash: TpmAlgId) -> Self {
        Self {
            scheme,
            hash_alg: Some(hash),
        }
    }

    pub fn rsaes() -> Self {
        Self {
            scheme: TpmAlgId::RsaEs,
            hash_alg: None,
        }
    }

    fn has_hash_detail(scheme: TpmAlgId) -> bool {
        !matches!(scheme, TpmAlgId::Null | TpmAlgId::RsaEs)
    }
}

impl Marshal for TpmtScheme {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u16(self.scheme.to_u16());
        if Self::has_hash_detail(self.scheme) {
            buf.put_u16(self.hash_alg.unwrap_or(TpmAlgId::Null).to_u16());
        }
    }
}

impl Unmarshal for TpmtScheme {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let scheme = alg_from_u16(buf.get_u16()?)?;
        let hash_alg = if Self::has_hash_detail(scheme) {
            Some(alg_from_u16(buf.get_u16()?)?)
        } else {
            None
        };
        Ok(Self { scheme, hash_alg })
    }
}

/// TPMS_RSA_PARMS - RSA key parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsRsaParms {
    pub symmetric: TpmtSymDef,
    pub scheme: TpmtRsaScheme,
    pub key_bits: u16,
    pub exponent: u32,
}

impl Marshal for TpmsRsaParms {
    fn marshal(&self, buf: &mut CommandBuffer) {
        self.symmetric.marshal(buf);
        self.scheme.marshal(buf);
        buf.put_u16(self.key_bits);
        buf.put_u32(self.exponent);
    }
}

impl Unmarshal for TpmsRsaParms {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        Ok(Self {
            symmetric: TpmtSymDef::unmarshal(buf)?,
            scheme: TpmtScheme::unmarshal(buf)?,
            key_bits: buf.get_u16()?,
            exponent: buf.get_u32()?,
        })
    }
}

/// TPMS_ECC_PARMS - ECC key parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsEccParms {
    pub symmetric: TpmtSymDef,
    pub scheme: TpmtEccScheme,
    pub curve_id: TpmEccCurve,
    pub kdf: TpmtKdfScheme,
}

impl Marshal for TpmsEccParms {
    fn marshal(&self, buf: &mut CommandBuffer) {
        self.symmetric.marshal(buf);
        self.scheme.marshal(buf);
        buf.put_u16(self.curve_id.to_u16());
        self.kdf.marshal(buf);
    }
}

impl Unmarshal for TpmsEccParms {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let symmetric = TpmtSymDef::unmarshal(buf)?;
        let scheme = TpmtScheme::unmarshal(buf)?;
        let raw_curve = buf.get_u16()?;
        let curve_id = TpmEccCurve::from_u16(raw_curve)
            .ok_or_else(|| Error::malformed(format!("unknown curve: 0x{raw_curve:04x}")))?;
        let kdf = TpmtScheme::unmarshal(buf)?;
        Ok(Self {
            symmetric,
            scheme,
            curve_id,
            kdf,
        })
    }
}

/// TPMU_PUBLIC_PARMS - Public parameters union
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmtPublicParms {
    Rsa(TpmsRsaParms),
    Ecc(TpmsEccParms),
}

impl Marshal for TpmtPublicParms {
    fn marshal(&self, buf: &mut CommandBuffer) {
        match self {
            TpmtPublicParms::Rsa(p) => p.marshal(buf),
            TpmtPublicParms::Ecc(p) => p.marshal(buf),
        }
    }
}

/// TPMU_PUBLIC_ID - Unique identifier union
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmtPublicUnique {
    Rsa(Vec<u8>),          // TPM2B_PUBLIC_KEY_RSA
    Ecc(Vec<u8>, Vec<u8>), // TPMS_ECC_POINT (x, y)
}

impl Marshal for TpmtPublicUnique {
    fn marshal(&self, buf: &mut CommandBuffer) {
        match self {
            TpmtPublicUnique::Rsa(n) => buf.put_tpm2b(n),
            TpmtPublicUnique::Ecc(x, y) => {
                buf.put_tpm2b(x);
                buf.put_tpm2b(y);
            }
        }
    }
}

/// TPMT_PUBLIC - Public area of an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtPublic {
    pub type_alg: TpmAlgId,
    pub name_alg: TpmAlgId,
    pub object_attributes: TpmaObject,
    pub auth_policy: Tpm2bDigest,
    pub parameters: TpmtPublicParms,
    pub unique: TpmtPublicUnique,
}

impl TpmtPublic {
    /// RSA-2048 template bound to this TPM and parent, with no scheme and
    /// the default exponent.
    pub fn rsa_default() -> Self {
        Self {
            type_alg: TpmAlgId::Rsa,
            name_alg: TpmAlgId::Sha256,
            object_attributes: TpmaObject::new().with_fixed_tpm().with_fixed_parent(),
            auth_policy: Tpm2bDigest::empty(),
            parameters: TpmtPublicParms::Rsa(TpmsRsaParms {
                symmetric: TpmtSymDef::null(),
                scheme: TpmtScheme::null(),
                key_bits: 2048,
                exponent: 0, // Default exponent (65537)
            }),
            unique: TpmtPublicUnique::Rsa(Vec::new()),
        }
    }

    /// ECC NIST P-256 template bound to this TPM and parent.
    pub fn ecc_default() -> Self {
        Self {
            type_alg: TpmAlgId::Ecc,
            name_alg: TpmAlgId::Sha256,
            object_attributes: TpmaObject::new().with_fixed_tpm().with_fixed_parent(),
            auth_policy: Tpm2bDigest::empty(),
            parameters: TpmtPublicParms::Ecc(TpmsEccParms {
                symmetric: TpmtSymDef::null(),
                scheme: TpmtScheme::null(),
                curve_id: TpmEccCurve::NistP256,
                kdf: TpmtScheme::null(),
            }),
            unique: TpmtPublicUnique::Ecc(Vec::new(), Vec::new()),
        }
    }

    /// Restricted decryption key usable as a storage parent.
    pub fn storage_key(mut self) -> Self {
        self.object_attributes = self
            .object_attributes
            .with_sensitive_data_origin()
            .with_user_with_auth()
            .with_no_da()
            .with_restricted()
            .with_decrypt();
        match &mut self.parameters {
            TpmtPublicParms::Rsa(rsa) => rsa.symmetric = TpmtSymDef::aes_128_cfb(),
            TpmtPublicParms::Ecc(ecc) => ecc.symmetric = TpmtSymDef::aes_128_cfb(),
        }
        self
    }

    pub fn rsa_parameters(&self) -> Option<&TpmsRsaParms> {
        match &self.parameters {
            TpmtPublicParms::Rsa(rsa) => Some(rsa),
            TpmtPublicParms::Ecc(_) => None,
        }
    }

    pub fn rsa_parameters_mut(&mut self) -> Option<&mut TpmsRsaParms> {
        match &mut self.parameters {
            TpmtPublicParms::Rsa(rsa) => Some(rsa),
            TpmtPublicParms::Ecc(_) => None,
        }
    }

    /// Object name: nameAlg followed by the digest of the marshalled area.
    pub fn name(&self) -> Result<Vec<u8>> {
        compute_name(self.name_alg, &self.to_bytes())
    }
}

impl Marshal for TpmtPublic {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u16(self.type_alg.to_u16());
        buf.put_u16(self.name_alg.to_u16());
        buf.put_u32(self.object_attributes.0);
        self.auth_policy.marshal(buf);
        self.parameters.marshal(buf);
        self.unique.marshal(buf);
    }
}

impl Unmarshal for TpmtPublic {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let type_alg = alg_from_u16(buf.get_u16()?)?;
        let name_alg = alg_from_u16(buf.get_u16()?)?;
        let object_attributes = TpmaObject(buf.get_u32()?);
        let auth_policy = Tpm2bDigest::unmarshal(buf)?;
        let (parameters, unique) = match type_alg {
            TpmAlgId::Rsa => {
                let parms = TpmsRsaParms::unmarshal(buf)?;
                let modulus = buf.get_tpm2b()?;
                (TpmtPublicParms::Rsa(parms), TpmtPublicUnique::Rsa(modulus))
            }
            TpmAlgId::Ecc => {
                let parms = TpmsEccParms::unmarshal(buf)?;
                let x = buf.get_tpm2b()?;
                let y = buf.get_tpm2b()?;
                (TpmtPublicParms::Ecc(parms), TpmtPublicUnique::Ecc(x, y))
            }
            other => {
                return Err(Error::malformed(format!(
                    "unsupported public area type: {other:?}"
                )))
            }
        };
        Ok(Self {
            type_alg,
            name_alg,
            object_attributes,
            auth_policy,
            parameters,
            unique,
        })
    }
}

/// TPM2B_SENSITIVE_CREATE - Sensitive data for object creation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tpm2bSensitiveCreate {
    pub user_auth: Tpm2bAuth,
    pub data: Tpm2bSensitiveData,
}

impl Tpm2bSensitiveCreate {
    pub fn with_auth(user_auth: &[u8]) -> Self {
        Self {
            user_auth: Tpm2bAuth::new(user_auth.to_vec()),
            data: Tpm2bSensitiveData::empty(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl Marshal for Tpm2bSensitiveCreate {
    fn marshal(&self, buf: &mut CommandBuffer) {
        let mut inner = CommandBuffer::new();
        self.user_auth.marshal(&mut inner);
        self.data.marshal(&mut inner);
        buf.put_tpm2b(inner.as_bytes());
    }
}

/// TPMT_SENSITIVE - Sensitive area of an object
///
/// `sensitive` holds the TPMU_SENSITIVE_COMPOSITE member, e.g. one RSA prime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtSensitive {
    pub sensitive_type: TpmAlgId,
    pub auth_value: Tpm2bAuth,
    pub seed_value: Tpm2bDigest,
    pub sensitive: Vec<u8>,
}

impl Marshal for TpmtSensitive {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u16(self.sensitive_type.to_u16());
        self.auth_value.marshal(buf);
        self.seed_value.marshal(buf);
        buf.put_tpm2b(&self.sensitive);
    }
}

impl Unmarshal for TpmtSensitive {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        Ok(Self {
            sensitive_type: alg_from_u16(buf.get_u16()?)?,
            auth_value: Tpm2bAuth::unmarshal(buf)?,
            seed_value: Tpm2bDigest::unmarshal(buf)?,
            sensitive: buf.get_tpm2b()?,
        })
    }
}

/// TPMT_SIGNATURE - RSA signature with its scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtSignature {
    pub sig_alg: TpmAlgId,
    pub hash_alg: TpmAlgId,
    pub signature: Vec<u8>,
}

impl Marshal for TpmtSignature {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u16(self.sig_alg.to_u16());
        if self.sig_alg != TpmAlgId::Null {
            buf.put_u16(self.hash_alg.to_u16());
            buf.put_tpm2b(&self.signature);
        }
    }
}

impl Unmarshal for TpmtSignature {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let sig_alg = alg_from_u16(buf.get_u16()?)?;
        match sig_alg {
            TpmAlgId::Null => Ok(Self {
                sig_alg,
                hash_alg: TpmAlgId::Null,
                signature: Vec::new(),
            }),
            TpmAlgId::RsaSsa | TpmAlgId::RsaPss => Ok(Self {
                sig_alg,
                hash_alg: alg_from_u16(buf.get_u16()?)?,
                signature: buf.get_tpm2b()?,
            }),
            other => Err(Error::malformed(format!(
                "unsupported signature algorithm: {other:?}"
            ))),
        }
    }
}

/// TPMT_TK_* - Ticket (hash check, verified, creation)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtTicket {
    pub tag: u16,
    pub hierarchy: u32,
    pub digest: Tpm2bDigest,
}

impl TpmtTicket {
    /// Empty hash-check ticket for signing digests not produced by the TPM.
    pub fn null_hashcheck() -> Self {
        Self {
            tag: TpmSt::HashCheck.to_u16(),
            hierarchy: tpm_rh::NULL,
            digest: Tpm2bDigest::empty(),
        }
    }
}

impl Marshal for TpmtTicket {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u16(self.tag);
        buf.put_u32(self.hierarchy);
        self.digest.marshal(buf);
    }
}

impl Unmarshal for TpmtTicket {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        Ok(Self {
            tag: buf.get_u16()?,
            hierarchy: buf.get_u32()?,
            digest: Tpm2bDigest::unmarshal(buf)?,
        })
    }
}

/// TPMT_HA - Hash value with algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtHa {
    pub hash_alg: TpmAlgId,
    pub digest: Vec<u8>,
}

impl TpmtHa {
    pub fn sha256(digest: Vec<u8>) -> Self {
        Self {
            hash_alg: TpmAlgId::Sha256,
            digest,
        }
    }
}

impl Marshal for TpmtHa {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u16(self.hash_alg.to_u16());
        buf.put_bytes(&self.digest);
    }
}

/// TPML_DIGEST_VALUES - List of digest values for PCR extend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmlDigestValues {
    pub digests: Vec<TpmtHa>,
}

impl TpmlDigestValues {
    pub fn single(digest: TpmtHa) -> Self {
        Self {
            digests: vec![digest],
        }
    }
}

impl Marshal for TpmlDigestValues {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u32(self.digests.len() as u32);
        for d in &self.digests {
            d.marshal(buf);
        }
    }
}

/// TPMS_TAGGED_PROPERTY - One TPM property and its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsTaggedProperty {
    pub property: u32,
    pub value: u32,
}

/// TPML_TAGGED_TPM_PROPERTY
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmlTaggedTpmProperty {
    pub properties: Vec<TpmsTaggedProperty>,
}

impl TpmlTaggedTpmProperty {
    pub fn get(&self, property: u32) -> Option<u32> {
        self.properties
            .iter()
            .find(|p| p.property == property)
            .map(|p| p.value)
    }
}

impl Unmarshal for TpmlTaggedTpmProperty {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let count = buf.get_u32()? as usize;
        let mut properties = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            properties.push(TpmsTaggedProperty {
                property: buf.get_u32()?,
                value: buf.get_u32()?,
            });
        }
        Ok(Self { properties })
    }
}
