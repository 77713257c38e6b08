//! # apk_rebuild
//!
//! Rebuild Android packages so they trust user-installed CA certificates,
//! which makes their TLS traffic inspectable with an intercepting proxy.
//!
//! The input package is decompiled with apktool, and the copy's
//! `network_security_config.xml` and `AndroidManifest.xml` are patched.
//! It is then rebuilt and signed with uber-apk-signer. `.aab` bundles are
//! first converted with bundletool, and every package inside an `.xapk` is
//! processed on its own.
//!
//! ## Usage
//!
//! ```bash
//! apk_rebuild app.apk                  # writes app-patched.apk
//! apk_rebuild app.aab --pause          # stop for manual edits before rebuilding
//! apk_rebuild bundle.xapk -o out/ -i   # rebuild every split and install them
//! ```
//!
//! Temporary files are tracked in a [`Ledger`] and removed on Ctrl-C.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod interrupt;
pub mod ledger;
pub mod patcher;
pub mod pipeline;
pub mod tools;
pub mod xml;

pub use cli::Args;
pub use config::ToolsConfig;
pub use dispatch::{ContainerKind, dispatch};
pub use error::{CliError, PatchError, PreconditionError, RebuildError, Result, ToolError};
pub use ledger::Ledger;
pub use patcher::{DocumentChange, PatchReport, patch_working_tree};
pub use pipeline::{PackageUnit, Pipeline, PipelineOptions, PipelineState, Stopwatch};
pub use tools::{JavaToolchain, SigningKey, ToolOutcome, Toolchain};
