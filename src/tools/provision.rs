//! Up-front availability checks for java, the tool jars and the signing key.
//!
//! Every check runs even after an earlier one failed; the caller gets one
//! [`ToolError::Unavailable`] listing all problems at once.

use super::{JavaToolchain, Keystore, SigningKey, http};
use crate::cli::OutputManager;
use crate::config::ToolsConfig;
use crate::error::{Result, ToolError};
use crate::ledger::Ledger;
use std::path::PathBuf;
use tokio::process::Command;

const DEBUG_KEYSTORE_PASS: &str = "android";
const DEBUG_KEY_ALIAS: &str = "androiddebugkey";

/// Keystore flags as given on the command line
#[derive(Clone, Default, PartialEq, Eq)]
pub struct KeystoreArgs {
    /// `--ks`
    pub path: Option<PathBuf>,
    /// `--ks-pass`
    pub store_pass: Option<String>,
    /// `--ks-alias`
    pub alias: Option<String>,
    /// `--ks-alias-pass`
    pub key_pass: Option<String>,
}

impl std::fmt::Debug for KeystoreArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoreArgs")
            .field("path", &self.path)
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

/// Check that a custom keystore is complete.
///
/// `Ok(None)` means no custom keystore was requested. Every missing piece is
/// reported, not just the first.
pub fn validate_keystore_args(args: &KeystoreArgs) -> std::result::Result<Option<Keystore>, Vec<String>> {
    let Some(path) = &args.path else {
        return Ok(None);
    };

    let mut issues = Vec::new();
    let path = path_absolutize::Absolutize::absolutize(path.as_path())
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.clone());
    if !path.is_file() {
        issues.push(format!("Keystore file {} not found", path.display()));
    }
    if args.store_pass.is_none() {
        issues.push("Keystore password is missing, specify it with --ks-pass".to_string());
    }
    if args.alias.is_none() {
        issues.push("Keystore alias is missing, specify it with --ks-alias".to_string());
    }
    if args.key_pass.is_none() {
        issues.push("Key password is missing, specify it with --ks-alias-pass".to_string());
    }

    match (&args.store_pass, &args.alias, &args.key_pass) {
        (Some(store_pass), Some(alias), Some(key_pass)) if issues.is_empty() => Ok(Some(Keystore {
            path,
            store_pass: store_pass.clone(),
            alias: alias.clone(),
            key_pass: key_pass.clone(),
        })),
        _ => Err(issues),
    }
}

/// Interpret `keytool -list` output for a keystore/alias pair
fn keytool_listing_issue(output: &str, keystore: &Keystore) -> Option<String> {
    if output.contains("password was incorrect") {
        Some("Provided keystore password is incorrect".to_string())
    } else if output.contains("does not exist") {
        Some(format!("Provided alias name '{}' is not found", keystore.alias))
    } else {
        None
    }
}

async fn check_java() -> std::result::Result<PathBuf, String> {
    let java = which::which("java").map_err(|_| "java not found".to_string())?;
    let output = Command::new(&java)
        .arg("-version")
        .output()
        .await
        .map_err(|e| format!("java could not be started: {e}"))?;
    // `java -version` prints to stderr
    let banner = String::from_utf8_lossy(&output.stderr).to_lowercase();
    if banner.contains("build") {
        log::debug!("java found at {}", java.display());
        Ok(java)
    } else {
        Err("java not found".to_string())
    }
}

/// Remove every installed version of a tool before fetching a new one
fn remove_previous_versions(pattern: &str) {
    let Ok(paths) = glob::glob(pattern) else {
        return;
    };
    for path in paths.flatten() {
        if let Err(e) = std::fs::remove_file(&path) {
            log::warn!("Error while deleting {}: {}", path.display(), e);
        }
    }
}

async fn ensure_jars(config: &ToolsConfig, ledger: &Ledger, output: &OutputManager, issues: &mut Vec<String>) {
    let _ = output.info(&format!("Tools directory: {}", config.tools_dir.display()));
    if let Err(e) = tokio::fs::create_dir_all(&config.tools_dir).await {
        issues.push(format!("Could not create tools directory {}: {}", config.tools_dir.display(), e));
        return;
    }

    for tool in config.tools() {
        let jar = config.jar_path(tool);
        if jar.exists() {
            continue;
        }
        output.error(&format!("{} is missing", tool.file_name()));
        let _ = output.info(&format!("Removing previous versions of {}", tool.name));
        remove_previous_versions(&tool.glob_pattern(&config.tools_dir));

        let _ = output.info(&format!("Downloading {}", tool.file_name()));
        if let Err(e) = http::download_to(&tool.url(), &jar, ledger).await {
            log::warn!("Download of {} failed: {}", tool.url(), e);
        }
        if !jar.exists() {
            issues.push(format!("Unable to download {}", tool.file_name()));
        }
    }
}

async fn ensure_debug_keystore(output: &OutputManager) -> std::result::Result<PathBuf, String> {
    let android_dir = dirs::home_dir()
        .ok_or_else(|| "Could not determine home directory for the debug keystore".to_string())?
        .join(".android");
    let keystore = android_dir.join("debug.keystore");
    if keystore.exists() {
        return Ok(keystore);
    }

    let _ = output.warn(&format!("File {} not found, generating it", keystore.display()));
    std::fs::create_dir_all(&android_dir)
        .map_err(|e| format!("Could not create {}: {}", android_dir.display(), e))?;
    let keytool = which::which("keytool").map_err(|_| "keytool not found, cannot create the debug keystore".to_string())?;

    let status = Command::new(keytool)
        .args(["-genkeypair", "-keystore"])
        .arg(&keystore)
        .args([
            "-storepass",
            DEBUG_KEYSTORE_PASS,
            "-alias",
            DEBUG_KEY_ALIAS,
            "-keypass",
            DEBUG_KEYSTORE_PASS,
            "-keyalg",
            "RSA",
            "-keysize",
            "2048",
            "-validity",
            "10000",
            "-dname",
            "CN=Android Debug,O=Android,C=US",
        ])
        .status()
        .await
        .map_err(|e| format!("keytool could not be started: {e}"))?;

    if status.success() && keystore.exists() {
        Ok(keystore)
    } else {
        Err(format!("Unable to create debug keystore {}", keystore.display()))
    }
}

async fn verify_keystore(keystore: &Keystore) -> Option<String> {
    let keytool = match which::which("keytool") {
        Ok(path) => path,
        Err(_) => return Some("keytool not found, cannot verify the keystore".to_string()),
    };
    let output = Command::new(keytool)
        .args(["-J-Duser.language=en", "-list", "-keystore"])
        .arg(&keystore.path)
        .args(["-storepass", keystore.store_pass.as_str(), "-alias", keystore.alias.as_str()])
        .output()
        .await;
    match output {
        Ok(output) => keytool_listing_issue(&String::from_utf8_lossy(&output.stdout), keystore),
        Err(e) => Some(format!("keytool could not be started: {e}")),
    }
}

/// Make sure everything a run needs is present, downloading missing jars.
///
/// Returns the toolchain and the key to sign with.
pub async fn provision(
    config: &ToolsConfig,
    keystore_args: &KeystoreArgs,
    ledger: &Ledger,
    output: &OutputManager,
) -> Result<(JavaToolchain, SigningKey)> {
    let mut issues = Vec::new();

    let java = match check_java().await {
        Ok(java) => Some(java),
        Err(issue) => {
            issues.push(issue);
            None
        }
    };

    ensure_jars(config, ledger, output, &mut issues).await;

    let signing_key = match validate_keystore_args(keystore_args) {
        Ok(Some(keystore)) => match verify_keystore(&keystore).await {
            Some(issue) => {
                issues.push(issue);
                None
            }
            None => Some(SigningKey::Custom(keystore)),
        },
        Ok(None) => match ensure_debug_keystore(output).await {
            Ok(path) => Some(SigningKey::Debug(path)),
            Err(issue) => {
                issues.push(issue);
                None
            }
        },
        Err(mut found) => {
            issues.append(&mut found);
            None
        }
    };

    match (java, signing_key) {
        (Some(java), Some(key)) if issues.is_empty() => {
            let toolchain = JavaToolchain::new(
                java,
                config.jar_path(&config.apktool),
                config.jar_path(&config.bundletool),
                config.jar_path(&config.signer),
            );
            Ok((toolchain, key))
        }
        _ => {
            for issue in &issues {
                output.error(issue);
            }
            Err(ToolError::Unavailable { issues }.into())
        }
    }
}

/// Whether `adb` is installed and answers `--version`
pub async fn adb_available() -> bool {
    match Command::new("adb").arg("--version").output().await {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .to_lowercase()
            .contains("debug"),
        Err(_) => false,
    }
}
