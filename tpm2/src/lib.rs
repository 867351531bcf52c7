// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Pure Rust TPM 2.0 command layer
//!
//! This crate marshals TPM 2.0 commands, authorizes them through an
//! [`AuthorizationDelegate`], and talks directly to the TPM device without C
//! library dependencies.
//!
//! ## Features
//!
//! - **Typed command set**: the [`Tpm`] trait has one method per command, so
//!   higher layers can be tested against an in-memory double
//! - **Direct device communication**: Talks directly to `/dev/tpmrm0` or `/dev/tpm0`
//! - **Single error type**: every failure maps to one numeric result code, see
//!   [`Error::code`] and [`error_string`]
//!
//! ## Example
//!
//! ```no_run
//! use tpm2::{Tpm, TpmContext};
//!
//! let mut ctx = TpmContext::new(None)?; // Auto-detect TPM device
//! let random_bytes = ctx.get_random(32, None)?;
//! # Ok::<(), tpm2::Error>(())
//! ```

mod commands;
mod constants;
mod device;
mod error;
mod marshal;
mod session;
mod tpm;
mod types;

pub use commands::TpmContext;
pub use constants::*;
pub use error::*;
pub use session::{delegate_mut, AuthorizationDelegate, PasswordDelegate};
pub use tpm::*;
pub use types::*;

// Re-export device for advanced usage
pub use device::{ResponseAreas, TpmCommand, TpmDevice, TpmResponse, Transport, TPM_HEADER_SIZE};
pub use marshal::{CommandBuffer, Marshal, ResponseBuffer, Unmarshal};
