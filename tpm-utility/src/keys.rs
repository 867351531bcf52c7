// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Key lifecycle: creation, import, loading and use of RSA keys, and the
//! persistent storage root and salting keys.

use aes::Aes128;
use cfb_mode::Encryptor;
use cipher::{AsyncStreamCipher, KeyIvInit};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use tpm2::{
    delegate_mut, handle_name, tpm_rh, AuthorizationDelegate, CommandBuffer, Error, Marshal,
    PasswordDelegate, ReadPublicResponse, ResponseBuffer, Result, Tpm, Tpm2bAuth, Tpm2bDigest,
    Tpm2bPrivate, Tpm2bSensitiveCreate, TpmAlgId, TpmaObject, TpmlPcrSelection, TpmtPublic,
    TpmtPublicUnique, TpmtSensitive, TpmtSignature, TpmtSymDef, TpmtTicket, Unmarshal,
    SHA256_DIGEST_SIZE,
};

use crate::policy::{validate_and_resolve_scheme, HashRequest, KeyOperation, SchemeRequest};
use crate::TpmUtility;

/// Longest authorization value accepted for keys and hierarchies.
pub const MAX_PASSWORD_LENGTH: usize = SHA256_DIGEST_SIZE;

/// Largest RSA modulus accepted for import (2048 bits).
pub const MAX_RSA_KEY_BYTES: usize = 256;

const MAX_RSA_PRIME_BYTES: usize = MAX_RSA_KEY_BYTES / 2;
const AES_KEY_SIZE: usize = 16;
const AES_BLOCK_SIZE: usize = 16;

/// What a general-purpose RSA key may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsymmetricKeyUsage {
    DecryptKey,
    SignKey,
    DecryptAndSignKey,
}

impl AsymmetricKeyUsage {
    fn apply(self, attributes: TpmaObject) -> TpmaObject {
        match self {
            AsymmetricKeyUsage::DecryptKey => attributes.with_decrypt(),
            AsymmetricKeyUsage::SignKey => attributes.with_sign_encrypt(),
            AsymmetricKeyUsage::DecryptAndSignKey => attributes.with_decrypt().with_sign_encrypt(),
        }
    }
}

/// Public and private parts of a key as produced by Create or Import.
///
/// Serialized as TPM2B_PUBLIC followed by TPM2B_PRIVATE so a blob can be
/// stored by the caller and handed back to [`TpmUtility::load_key`] later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBlob {
    pub public: TpmtPublic,
    pub private: Tpm2bPrivate,
}

impl Marshal for KeyBlob {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_sized(&self.public);
        self.private.marshal(buf);
    }
}

impl Unmarshal for KeyBlob {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        Ok(Self {
            public: buf.get_sized()?,
            private: Tpm2bPrivate::unmarshal(buf)?,
        })
    }
}

impl<T: Tpm> TpmUtility<T> {
    // ==================== Key Inspection ====================

    fn read_public(&mut self, handle: u32) -> Result<ReadPublicResponse> {
        self.tpm.read_public(handle, &handle_name(handle), None)
    }

    fn key_exists(&mut self, handle: u32) -> bool {
        self.read_public(handle).is_ok()
    }

    fn flush_transient(&mut self, handle: u32) {
        if let Err(err) = self.tpm.flush_context(handle) {
            warn!("failed to flush transient object 0x{handle:08x}: {err}");
        }
    }

    /// Name of a loaded or persistent key as reported by the TPM.
    pub fn get_key_name(&mut self, handle: u32) -> Result<Vec<u8>> {
        Ok(self.read_public(handle)?.name)
    }

    pub fn get_key_public_area(&mut self, handle: u32) -> Result<TpmtPublic> {
        Ok(self.read_public(handle)?.out_public)
    }

    /// Name the TPM would assign to an object with this public area.
    pub fn compute_key_name(public: &TpmtPublic) -> Result<Vec<u8>> {
        public.name()
    }

    // ==================== Key Use ====================

    /// Sign `digest` with a loaded RSA key, returning the raw signature.
    pub fn sign(
        &mut self,
        key_handle: u32,
        scheme: SchemeRequest,
        hash: HashRequest,
        digest: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>> {
        let delegate = delegate.ok_or(Error::InvalidSessions)?;
        let key = self.read_public(key_handle)?;
        let resolved = validate_and_resolve_scheme(
            &key.out_public,
            scheme,
            hash,
            KeyOperation::Sign {
                digest_len: digest.len(),
            },
        )?;
        debug!("signing with key 0x{key_handle:08x} using {resolved:?}");
        let signature = self.tpm.sign(
            key_handle,
            &key.name,
            digest,
            &resolved.to_tpmt(),
            &TpmtTicket::null_hashcheck(),
            Some(delegate),
        )?;
        Ok(signature.signature)
    }

    /// Check an RSA signature over `digest`. Succeeds only if the TPM
    /// validates it.
    pub fn verify(
        &mut self,
        key_handle: u32,
        scheme: SchemeRequest,
        hash: HashRequest,
        digest: &[u8],
        signature: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<()> {
        let key = self.read_public(key_handle)?;
        let resolved = validate_and_resolve_scheme(
            &key.out_public,
            scheme,
            hash,
            KeyOperation::Verify {
                digest_len: digest.len(),
            },
        )?;
        let signature = TpmtSignature {
            sig_alg: resolved.scheme,
            hash_alg: resolved.hash_alg.unwrap_or(TpmAlgId::Null),
            signature: signature.to_vec(),
        };
        self.tpm
            .verify_signature(key_handle, &key.name, digest, &signature, delegate)?;
        Ok(())
    }

    pub fn asymmetric_encrypt(
        &mut self,
        key_handle: u32,
        scheme: SchemeRequest,
        hash: HashRequest,
        plaintext: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>> {
        let key = self.read_public(key_handle)?;
        let resolved =
            validate_and_resolve_scheme(&key.out_public, scheme, hash, KeyOperation::Encrypt)?;
        self.tpm.rsa_encrypt(
            key_handle,
            &key.name,
            plaintext,
            &resolved.to_tpmt(),
            &[],
            delegate,
        )
    }

    pub fn asymmetric_decrypt(
        &mut self,
        key_handle: u32,
        scheme: SchemeRequest,
        hash: HashRequest,
        ciphertext: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>> {
        let delegate = delegate.ok_or(Error::InvalidSessions)?;
        let key = self.read_public(key_handle)?;
        let resolved =
            validate_and_resolve_scheme(&key.out_public, scheme, hash, KeyOperation::Decrypt)?;
        self.tpm.rsa_decrypt(
            key_handle,
            &key.name,
            ciphertext,
            &resolved.to_tpmt(),
            &[],
            Some(delegate),
        )
    }

    // ==================== Key Lifecycle ====================

    /// Change the authorization value of a loaded key.
    ///
    /// The delegate must authorize the key with its current value. When
    /// `want_blob` is set, the re-wrapped key is returned as a [`KeyBlob`]
    /// that replaces the old one.
    pub fn change_key_authorization_data(
        &mut self,
        key_handle: u32,
        new_password: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
        want_blob: bool,
    ) -> Result<Option<Vec<u8>>> {
        let delegate = delegate.ok_or(Error::InvalidSessions)?;
        if new_password.len() > MAX_PASSWORD_LENGTH {
            return Err(Error::BadSize);
        }
        let key = self.read_public(key_handle)?;
        let parent = self.config.storage_root_key;
        let parent_name = self.get_key_name(parent)?;
        let private = self.tpm.object_change_auth(
            key_handle,
            &key.name,
            parent,
            &parent_name,
            new_password,
            Some(delegate),
        )?;
        if !want_blob {
            return Ok(None);
        }
        let blob = KeyBlob {
            public: key.out_public,
            private,
        };
        Ok(Some(blob.to_bytes()))
    }

    /// Wrap an externally generated RSA key for the storage root key and
    /// import it, returning the resulting key blob.
    pub fn import_rsa_key(
        &mut self,
        usage: AsymmetricKeyUsage,
        modulus: &[u8],
        public_exponent: u32,
        prime_factor: &[u8],
        password: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>> {
        let delegate = delegate.ok_or(Error::InvalidSessions)?;
        if modulus.len() > MAX_RSA_KEY_BYTES || prime_factor.len() > MAX_RSA_PRIME_BYTES {
            return Err(Error::BadParameter);
        }
        if password.len() > MAX_PASSWORD_LENGTH {
            return Err(Error::BadSize);
        }
        let parent = self.config.storage_root_key;
        let parent_name = self.get_key_name(parent)?;

        let mut public = TpmtPublic::rsa_default();
        public.object_attributes =
            usage.apply(TpmaObject::new().with_user_with_auth().with_no_da());
        if let Some(rsa) = public.rsa_parameters_mut() {
            rsa.key_bits = (modulus.len() * 8) as u16;
            rsa.exponent = public_exponent;
        }
        public.unique = TpmtPublicUnique::Rsa(modulus.to_vec());
        let object_name = public.name()?;

        let sensitive = TpmtSensitive {
            sensitive_type: TpmAlgId::Rsa,
            auth_value: Tpm2bAuth::new(password.to_vec()),
            seed_value: Tpm2bDigest::empty(),
            sensitive: prime_factor.to_vec(),
        };
        let mut encoded = CommandBuffer::new();
        encoded.put_sized(&sensitive);
        let sensitive_bytes = encoded.into_vec();

        let mut hasher = Sha256::new();
        hasher.update(&sensitive_bytes);
        hasher.update(&object_name);
        let integrity = hasher.finalize();

        let mut duplicate = CommandBuffer::new();
        duplicate.put_tpm2b(&integrity);
        duplicate.put_bytes(&sensitive_bytes);
        let mut duplicate = duplicate.into_vec();

        let mut encryption_key = [0u8; AES_KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut encryption_key);
        let iv = [0u8; AES_BLOCK_SIZE];
        Encryptor::<Aes128>::new(&encryption_key.into(), &iv.into()).encrypt(&mut duplicate);

        debug!("importing {}-bit RSA key", modulus.len() * 8);
        let private = self.tpm.import(
            parent,
            &parent_name,
            &encryption_key,
            &public,
            &duplicate,
            &[],
            &TpmtSymDef::aes_128_cfb(),
            Some(delegate),
        )?;
        Ok(KeyBlob { public, private }.to_bytes())
    }

    /// Create an RSA key under the storage root key and return its blob.
    #[allow(clippy::too_many_arguments)]
    pub fn create_rsa_key_pair(
        &mut self,
        usage: AsymmetricKeyUsage,
        modulus_bits: u16,
        public_exponent: u32,
        password: &[u8],
        policy_digest: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<Vec<u8>> {
        let delegate = delegate.ok_or(Error::InvalidSessions)?;
        if password.len() > MAX_PASSWORD_LENGTH || policy_digest.len() > SHA256_DIGEST_SIZE {
            return Err(Error::BadSize);
        }
        let parent = self.config.storage_root_key;
        let parent_name = self.get_key_name(parent)?;

        let mut template = TpmtPublic::rsa_default();
        template.object_attributes = usage.apply(
            template
                .object_attributes
                .with_sensitive_data_origin()
                .with_user_with_auth()
                .with_no_da(),
        );
        template.auth_policy = Tpm2bDigest::new(policy_digest.to_vec());
        if let Some(rsa) = template.rsa_parameters_mut() {
            rsa.key_bits = modulus_bits;
            rsa.exponent = public_exponent;
        }

        debug!("creating {modulus_bits}-bit RSA key ({usage:?})");
        let created = self.tpm.create(
            parent,
            &parent_name,
            &Tpm2bSensitiveCreate::with_auth(password),
            &template,
            &[],
            &TpmlPcrSelection::default(),
            Some(delegate),
        )?;
        let blob = KeyBlob {
            public: created.out_public,
            private: created.out_private,
        };
        Ok(blob.to_bytes())
    }

    /// Load a key blob under the storage root key.
    pub fn load_key(
        &mut self,
        key_blob: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<u32> {
        let delegate = delegate.ok_or(Error::InvalidSessions)?;
        let blob = KeyBlob::from_bytes(key_blob).map_err(|err| {
            warn!("rejecting key blob: {err}");
            Error::BadParameter
        })?;
        let parent = self.config.storage_root_key;
        let parent_name = self.get_key_name(parent)?;
        let loaded = self.tpm.load(
            parent,
            &parent_name,
            &blob.private,
            &blob.public,
            Some(delegate),
        )?;
        debug!("loaded key at 0x{:08x}", loaded.object_handle);
        Ok(loaded.object_handle)
    }

    /// Create a key with the configured defaults and load it.
    ///
    /// Returns the transient handle and the key blob. A failed load leaves
    /// the created key unloaded; nothing is cleaned up.
    pub fn create_and_load_rsa_key(
        &mut self,
        usage: AsymmetricKeyUsage,
        password: &[u8],
        delegate: Option<&mut dyn AuthorizationDelegate>,
    ) -> Result<(u32, Vec<u8>)> {
        let mut delegate = delegate;
        let blob = self.create_rsa_key_pair(
            usage,
            self.config.default_key_bits,
            self.config.default_public_exponent,
            password,
            &[],
            delegate_mut(&mut delegate),
        )?;
        let handle = self.load_key(&blob, delegate)?;
        Ok((handle, blob))
    }

    // ==================== Persistent Keys ====================

    /// Create and persist the RSA and ECC storage root keys.
    ///
    /// A root key that already answers ReadPublic is left alone, so calling
    /// this again is a no-op.
    pub fn create_storage_root_keys(&mut self, owner_password: &[u8]) -> Result<()> {
        let roots = [
            (
                self.config.storage_root_key,
                TpmtPublic::rsa_default().storage_key(),
            ),
            (
                self.config.ecc_storage_root_key,
                TpmtPublic::ecc_default().storage_key(),
            ),
        ];
        let owner_name = handle_name(tpm_rh::OWNER);
        for (persistent_handle, template) in roots {
            if self.key_exists(persistent_handle) {
                info!("storage root key 0x{persistent_handle:08x} already exists");
                continue;
            }
            let mut owner = PasswordDelegate::new(owner_password);
            let created = self.tpm.create_primary(
                tpm_rh::OWNER,
                &owner_name,
                &Tpm2bSensitiveCreate::empty(),
                &template,
                &[],
                &TpmlPcrSelection::default(),
                Some(&mut owner),
            )?;
            let persisted = self.tpm.evict_control(
                tpm_rh::OWNER,
                &owner_name,
                created.object_handle,
                &created.name,
                persistent_handle,
                Some(&mut owner),
            );
            self.flush_transient(created.object_handle);
            persisted?;
            info!("created storage root key at 0x{persistent_handle:08x}");
        }
        Ok(())
    }

    /// Create and persist the RSA key used to salt sessions.
    pub fn create_salting_key(&mut self, owner_password: &[u8]) -> Result<()> {
        let salting_key = self.config.salting_key;
        if self.key_exists(salting_key) {
            info!("salting key 0x{salting_key:08x} already exists");
            return Ok(());
        }
        let parent = self.config.storage_root_key;
        let parent_name = self.get_key_name(parent)?;

        let mut template = TpmtPublic::rsa_default();
        template.object_attributes = template
            .object_attributes
            .with_decrypt()
            .with_sensitive_data_origin()
            .with_user_with_auth()
            .with_no_da();

        let mut parent_auth = PasswordDelegate::empty();
        let created = self.tpm.create(
            parent,
            &parent_name,
            &Tpm2bSensitiveCreate::empty(),
            &template,
            &[],
            &TpmlPcrSelection::default(),
            Some(&mut parent_auth),
        )?;
        let loaded = self.tpm.load(
            parent,
            &parent_name,
            &created.out_private,
            &created.out_public,
            Some(&mut parent_auth),
        )?;

        let owner_name = handle_name(tpm_rh::OWNER);
        let mut owner = PasswordDelegate::new(owner_password);
        let persisted = self.tpm.evict_control(
            tpm_rh::OWNER,
            &owner_name,
            loaded.object_handle,
            &loaded.name,
            salting_key,
            Some(&mut owner),
        );
        self.flush_transient(loaded.object_handle);
        persisted?;
        info!("created salting key at 0x{salting_key:08x}");
        Ok(())
    }
}
