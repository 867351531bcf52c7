// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::{bail, ensure, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};
use sha2::{Digest, Sha256};
use tracing::warn;

use tpm2::{Tpm, TpmAlgId, TpmContext};
use tpm_utility::{
    AsymmetricKeyUsage, HashRequest, PasswordDelegate, SchemeRequest, TpmUtility, UtilityConfig,
};

/// TPM 2.0 provisioning and diagnostics
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// TPM device path (auto-detected when omitted)
    #[arg(short, long, env = "TPM_DEVICE", global = true)]
    device: Option<String>,

    /// JSON file overriding the default handles and passwords
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the TPM state flags
    Status,
    /// Start the TPM and run a full self test
    Startup,
    /// Allocate PCRs and disable the platform hierarchy
    Init,
    /// Clear the TPM through the platform hierarchy
    Clear,
    /// Set the owner, endorsement and lockout passwords
    TakeOwnership(TakeOwnershipArgs),
    /// Print random bytes from the TPM
    Random(RandomArgs),
    /// Print the SHA-256 value of a PCR
    PcrRead(PcrArgs),
    /// Extend a PCR with the SHA-256 of the given data
    PcrExtend(PcrExtendArgs),
    /// Define an NV space
    NvDefine(NvDefineArgs),
    /// Write an NV space
    NvWrite(NvWriteArgs),
    /// Read an NV space
    NvRead(NvReadArgs),
    /// Write-lock an NV space
    NvLock(NvIndexArgs),
    /// Destroy an NV space
    NvDestroy(NvOwnerArgs),
    /// Create the persistent RSA and ECC storage root keys
    CreateRootKeys(OwnerArgs),
    /// Create the persistent session salting key
    CreateSaltingKey(OwnerArgs),
    /// Run end-to-end scenarios against the device
    SelfTest(SelfTestArgs),
}

#[derive(Parser)]
struct TakeOwnershipArgs {
    #[arg(long, default_value = "")]
    owner: String,
    #[arg(long, default_value = "")]
    endorsement: String,
    #[arg(long, default_value = "")]
    lockout: String,
}

#[derive(Parser)]
struct RandomArgs {
    /// number of bytes
    #[arg(default_value_t = 32)]
    bytes: usize,
}

#[derive(Parser)]
struct PcrArgs {
    index: u32,
}

#[derive(Parser)]
struct PcrExtendArgs {
    index: u32,
    /// data to measure
    data: String,
}

#[derive(Parser)]
struct OwnerArgs {
    /// owner hierarchy password
    #[arg(long, default_value = "")]
    owner_password: String,
}

#[derive(Parser)]
struct NvOwnerArgs {
    index: u32,
    #[command(flatten)]
    owner: OwnerArgs,
}

#[derive(Parser)]
struct NvIndexArgs {
    index: u32,
}

#[derive(Parser)]
struct NvDefineArgs {
    index: u32,
    /// size of the space in bytes
    size: usize,
    #[command(flatten)]
    owner: OwnerArgs,
}

#[derive(Parser)]
struct NvWriteArgs {
    index: u32,
    /// hex encoded data
    data: String,
    #[arg(long, default_value_t = 0)]
    offset: u32,
    #[command(flatten)]
    owner: OwnerArgs,
}

#[derive(Parser)]
struct NvReadArgs {
    index: u32,
    /// number of bytes to read
    length: usize,
    #[arg(long, default_value_t = 0)]
    offset: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    Rng,
    Sign,
    Decrypt,
    Import,
    AuthChange,
    Pcr,
    Nvram,
    All,
}

#[derive(Parser)]
struct SelfTestArgs {
    #[arg(value_enum, default_value = "all")]
    scenario: Scenario,
    #[command(flatten)]
    owner: OwnerArgs,
    /// NV index used by the nvram scenario
    #[arg(long, default_value_t = 0x10)]
    nv_index: u32,
    /// PCR used by the pcr scenario
    #[arg(long, default_value_t = 16)]
    pcr: u32,
}

type Utility = TpmUtility<TpmContext>;

fn empty() -> PasswordDelegate {
    PasswordDelegate::empty()
}

fn flush(utility: &mut Utility, handle: u32) {
    if let Err(err) = utility.tpm_mut().flush_context(handle) {
        warn!("failed to flush 0x{handle:08x}: {err}");
    }
}

fn cmd_status(utility: &mut Utility) -> Result<()> {
    println!("{}", utility.tpm_state()?);
    Ok(())
}

// ==================== Self test scenarios ====================

fn test_rng(utility: &mut Utility, _args: &SelfTestArgs) -> Result<()> {
    utility.stir_random(b"self test entropy", None)?;
    let random = utility.generate_random(70, None)?;
    ensure!(random.len() == 70, "got {} random bytes", random.len());
    Ok(())
}

fn test_sign(utility: &mut Utility, _args: &SelfTestArgs) -> Result<()> {
    let password = b"sign";
    let (handle, _) =
        utility.create_and_load_rsa_key(AsymmetricKeyUsage::SignKey, password, Some(&mut empty()))?;
    let digest = Sha256::digest(b"self test message");
    let result = (|| -> Result<()> {
        let signature = utility.sign(
            handle,
            SchemeRequest::Explicit(TpmAlgId::RsaSsa),
            HashRequest::Explicit(TpmAlgId::Sha256),
            &digest,
            Some(&mut PasswordDelegate::new(password.to_vec())),
        )?;
        utility.verify(
            handle,
            SchemeRequest::Explicit(TpmAlgId::RsaSsa),
            HashRequest::Explicit(TpmAlgId::Sha256),
            &digest,
            &signature,
            None,
        )?;
        Ok(())
    })();
    flush(utility, handle);
    result
}

fn encrypt_decrypt(utility: &mut Utility, handle: u32, password: &[u8]) -> Result<()> {
    let plaintext = b"self test plaintext";
    let ciphertext = utility.asymmetric_encrypt(
        handle,
        SchemeRequest::Explicit(TpmAlgId::Oaep),
        HashRequest::Default,
        plaintext,
        None,
    )?;
    let decrypted = utility.asymmetric_decrypt(
        handle,
        SchemeRequest::Explicit(TpmAlgId::Oaep),
        HashRequest::Default,
        &ciphertext,
        Some(&mut PasswordDelegate::new(password.to_vec())),
    )?;
    ensure!(decrypted == plaintext, "decrypted data does not match");
    Ok(())
}

fn test_decrypt(utility: &mut Utility, _args: &SelfTestArgs) -> Result<()> {
    let password = b"decrypt";
    let (handle, _) = utility.create_and_load_rsa_key(
        AsymmetricKeyUsage::DecryptKey,
        password,
        Some(&mut empty()),
    )?;
    let result = encrypt_decrypt(utility, handle, password);
    flush(utility, handle);
    result
}

fn test_import(utility: &mut Utility, _args: &SelfTestArgs) -> Result<()> {
    let exponent = 0x10001u32;
    let key = RsaPrivateKey::new_with_exp(&mut rand::thread_rng(), 2048, &BigUint::from(exponent))
        .context("failed to generate RSA key")?;
    let Some(prime) = key.primes().first() else {
        bail!("generated key has no prime factors");
    };
    let password = b"import";
    let blob = utility.import_rsa_key(
        AsymmetricKeyUsage::DecryptKey,
        &key.n().to_bytes_be(),
        exponent,
        &prime.to_bytes_be(),
        password,
        Some(&mut empty()),
    )?;
    let handle = utility.load_key(&blob, Some(&mut empty()))?;
    let result = encrypt_decrypt(utility, handle, password);
    flush(utility, handle);
    result
}

fn test_auth_change(utility: &mut Utility, _args: &SelfTestArgs) -> Result<()> {
    let old_password = b"old";
    let new_password = b"new";
    let (handle, _) = utility.create_and_load_rsa_key(
        AsymmetricKeyUsage::DecryptKey,
        old_password,
        Some(&mut empty()),
    )?;
    let changed = utility.change_key_authorization_data(
        handle,
        new_password,
        Some(&mut PasswordDelegate::new(old_password.to_vec())),
        true,
    );
    flush(utility, handle);
    let Some(blob) = changed? else {
        bail!("no key blob returned");
    };
    let handle = utility.load_key(&blob, Some(&mut empty()))?;
    let result = encrypt_decrypt(utility, handle, new_password);
    flush(utility, handle);
    result
}

fn test_pcr(utility: &mut Utility, args: &SelfTestArgs) -> Result<()> {
    let data = b"self test measurement";
    let old = utility.read_pcr(args.pcr)?;
    utility.extend_pcr(args.pcr, data, Some(&mut empty()))?;
    let new = utility.read_pcr(args.pcr)?;

    let mut hasher = Sha256::new();
    hasher.update(&old);
    hasher.update(Sha256::digest(data));
    ensure!(
        new == hasher.finalize().to_vec(),
        "PCR {} has an unexpected value",
        args.pcr
    );
    Ok(())
}

fn test_nvram(utility: &mut Utility, args: &SelfTestArgs) -> Result<()> {
    let index = args.nv_index;
    let mut owner = PasswordDelegate::new(args.owner.owner_password.as_bytes());
    let data = b"nv self test data";

    utility.define_nv_space(index, data.len(), Some(&mut owner))?;
    let result = (|| -> Result<()> {
        utility.write_nv_space(index, 0, data, Some(&mut owner))?;
        let read = utility.read_nv_space(index, 0, data.len(), Some(&mut empty()))?;
        ensure!(read == data, "NV data does not match");
        utility.lock_nv_space(index, Some(&mut empty()))?;
        ensure!(
            utility
                .write_nv_space(index, 0, data, Some(&mut owner))
                .is_err(),
            "write to a locked NV space succeeded"
        );
        Ok(())
    })();
    utility.destroy_nv_space(index, Some(&mut owner))?;
    result
}

type ScenarioFn = fn(&mut Utility, &SelfTestArgs) -> Result<()>;

fn cmd_self_test(utility: &mut Utility, args: SelfTestArgs) -> Result<()> {
    let scenarios: [(Scenario, &str, ScenarioFn); 7] = [
        (Scenario::Rng, "rng", test_rng),
        (Scenario::Sign, "sign", test_sign),
        (Scenario::Decrypt, "decrypt", test_decrypt),
        (Scenario::Import, "import", test_import),
        (Scenario::AuthChange, "auth-change", test_auth_change),
        (Scenario::Pcr, "pcr", test_pcr),
        (Scenario::Nvram, "nvram", test_nvram),
    ];
    let mut failed = 0;
    for (scenario, name, run) in scenarios {
        if args.scenario != Scenario::All && args.scenario != scenario {
            continue;
        }
        match run(utility, &args) {
            Ok(()) => println!("✓ {name}"),
            Err(err) => {
                failed += 1;
                println!("✗ {name}: {err:#}");
            }
        }
    }
    if failed > 0 {
        bail!("{failed} scenario(s) failed");
    }
    Ok(())
}

fn main() -> Result<()> {
    {
        use tracing_subscriber::{fmt, EnvFilter};
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt().with_env_filter(filter).init();
    }

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => UtilityConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => UtilityConfig::default(),
    };
    let tpm = TpmContext::new(cli.device.as_deref()).context("failed to open TPM device")?;
    let mut utility = TpmUtility::with_config(tpm, config);

    match cli.command {
        Commands::Status => cmd_status(&mut utility)?,
        Commands::Startup => utility.startup()?,
        Commands::Init => utility.initialize_tpm()?,
        Commands::Clear => utility.clear()?,
        Commands::TakeOwnership(args) => utility.take_ownership(
            args.owner.as_bytes(),
            args.endorsement.as_bytes(),
            args.lockout.as_bytes(),
        )?,
        Commands::Random(args) => {
            let random = utility.generate_random(args.bytes, None)?;
            println!("{}", hex::encode(random));
        }
        Commands::PcrRead(args) => {
            println!("{}", hex::encode(utility.read_pcr(args.index)?));
        }
        Commands::PcrExtend(args) => {
            utility.extend_pcr(args.index, args.data.as_bytes(), Some(&mut empty()))?;
        }
        Commands::NvDefine(args) => {
            let mut owner = PasswordDelegate::new(args.owner.owner_password.as_bytes());
            utility.define_nv_space(args.index, args.size, Some(&mut owner))?;
        }
        Commands::NvWrite(args) => {
            let data = hex::decode(&args.data).context("NV data is not hex")?;
            let mut owner = PasswordDelegate::new(args.owner.owner_password.as_bytes());
            utility.write_nv_space(args.index, args.offset, &data, Some(&mut owner))?;
        }
        Commands::NvRead(args) => {
            let data =
                utility.read_nv_space(args.index, args.offset, args.length, Some(&mut empty()))?;
            println!("{}", hex::encode(data));
        }
        Commands::NvLock(args) => utility.lock_nv_space(args.index, Some(&mut empty()))?,
        Commands::NvDestroy(args) => {
            let mut owner = PasswordDelegate::new(args.owner.owner_password.as_bytes());
            utility.destroy_nv_space(args.index, Some(&mut owner))?;
        }
        Commands::CreateRootKeys(args) => {
            utility.create_storage_root_keys(args.owner_password.as_bytes())?
        }
        Commands::CreateSaltingKey(args) => {
            utility.create_salting_key(args.owner_password.as_bytes())?
        }
        Commands::SelfTest(args) => cmd_self_test(&mut utility, args)?,
    }
    Ok(())
}
