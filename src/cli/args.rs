//! Command line argument parsing and validation.

use crate::tools::KeystoreArgs;
use clap::Parser;
use std::path::PathBuf;

/// Rebuild an Android package so it trusts user-installed CA certificates
#[derive(Parser, Debug, Clone)]
#[command(
    name = "apk_rebuild",
    version,
    about = "Rebuild .apk/.aab/.xapk packages to trust user CA certificates",
    long_about = "Decompile an Android package, patch its network security config so \
user-installed certificates are trusted, then rebuild and sign it.

Usage:
  apk_rebuild app.apk
  apk_rebuild app.aab --ks release.jks --ks-pass pass --ks-alias key --ks-alias-pass pass
  apk_rebuild bundle.xapk -o out/ --install

Press Ctrl-C at any time; temporary files are removed before exiting."
)]
pub struct Args {
    /// Package to rebuild (.apk, .aab or .xapk)
    #[arg(index = 1, value_name = "SOURCE")]
    pub source: PathBuf,

    /// Output file (directory for .xapk)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Keep the decompiled working tree
    #[arg(short, long)]
    pub preserve: bool,

    /// Remove the source file after a successful rebuild
    #[arg(short, long)]
    pub remove: bool,

    /// Wait for ENTER between patching and rebuilding, for manual edits
    #[arg(long)]
    pub pause: bool,

    /// Do not decompile dex files (passes --no-src to apktool)
    #[arg(long)]
    pub no_src: bool,

    /// Only decompile main dex classes (passes --only-main-classes to apktool)
    #[arg(long)]
    pub only_main_classes: bool,

    /// Custom keystore for signing
    #[arg(long = "ks", value_name = "FILE")]
    pub keystore: Option<PathBuf>,

    /// Keystore password
    #[arg(long = "ks-pass", value_name = "PASSWORD")]
    pub keystore_pass: Option<String>,

    /// Key alias
    #[arg(long = "ks-alias", value_name = "ALIAS")]
    pub key_alias: Option<String>,

    /// Key password
    #[arg(long = "ks-alias-pass", value_name = "PASSWORD")]
    pub key_pass: Option<String>,

    /// Install the rebuilt package(s) with adb
    #[arg(short, long)]
    pub install: bool,

    /// Directory for downloaded tools
    #[arg(long, value_name = "DIR", env = "APK_REBUILD_TOOLS_DIR")]
    pub tools_dir: Option<PathBuf>,

    /// Tool version/URL overrides (TOML)
    #[arg(long, value_name = "FILE", env = "APK_REBUILD_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.source.as_os_str().is_empty() {
            return Err("Source package is required".to_string());
        }
        if self.keystore.is_none()
            && (self.keystore_pass.is_some() || self.key_alias.is_some() || self.key_pass.is_some())
        {
            return Err("--ks-pass, --ks-alias and --ks-alias-pass require --ks".to_string());
        }
        Ok(())
    }

    /// Extra apktool decode flags
    pub fn decompile_options(&self) -> Vec<String> {
        let mut options = Vec::new();
        if self.no_src {
            options.push("--no-src".to_string());
        }
        if self.only_main_classes {
            options.push("--only-main-classes".to_string());
        }
        options
    }

    /// Keystore flags for provisioning
    pub fn keystore_args(&self) -> KeystoreArgs {
        KeystoreArgs {
            path: self.keystore.clone(),
            store_pass: self.keystore_pass.clone(),
            alias: self.key_alias.clone(),
            key_pass: self.key_pass.clone(),
        }
    }
}
