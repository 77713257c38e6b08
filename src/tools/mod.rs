//! Adapters for the external tools the pipeline orchestrates.
//!
//! Every invocation is synchronous from the caller's point of view, streams
//! the tool's output straight to the terminal and returns a [`ToolOutcome`].
//! Exit statuses are recorded and logged but never turned into errors; the
//! pipeline judges success only by the artifacts left on disk.

mod http;
mod provision;

pub use provision::{KeystoreArgs, adb_available, provision, validate_keystore_args};

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

/// Custom signing key supplied by the operator
#[derive(Clone, PartialEq, Eq)]
pub struct Keystore {
    /// Keystore file
    pub path: PathBuf,
    /// Store password
    pub store_pass: String,
    /// Key alias
    pub alias: String,
    /// Key password
    pub key_pass: String,
}

impl fmt::Debug for Keystore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keystore")
            .field("path", &self.path)
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

/// Key used to sign rebuilt packages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningKey {
    /// Provisioned Android debug keystore
    Debug(PathBuf),
    /// Operator supplied keystore
    Custom(Keystore),
}

/// Result of one external tool invocation
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// Human readable program description
    pub program: String,
    /// Exit status, or None if the process could not be started
    pub status: Option<ExitStatus>,
}

impl ToolOutcome {
    /// Whether the tool ran and exited successfully
    pub fn succeeded(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }
}

/// The external collaborators of the rebuild pipeline
#[allow(async_fn_in_trait)]
pub trait Toolchain {
    /// Decompile `source` into `working_tree`
    async fn decompile(&self, source: &Path, working_tree: &Path, options: &[String]) -> ToolOutcome;

    /// Build `working_tree` into a package at `output`
    async fn build(&self, working_tree: &Path, output: &Path) -> ToolOutcome;

    /// Sign `package` in place
    async fn sign(&self, package: &Path, key: &SigningKey) -> ToolOutcome;

    /// Convert an app bundle into an archive holding a universal package
    async fn bundle(&self, bundle: &Path, archive: &Path, key: &SigningKey) -> ToolOutcome;

    /// Install one package, or several split packages together
    async fn install(&self, packages: &[PathBuf]) -> ToolOutcome;
}

/// [`Toolchain`] backed by `java -jar` and `adb`
#[derive(Debug, Clone)]
pub struct JavaToolchain {
    java: PathBuf,
    apktool: PathBuf,
    bundletool: PathBuf,
    signer: PathBuf,
}

impl JavaToolchain {
    /// Toolchain using the given java binary and jar locations
    pub fn new(java: PathBuf, apktool: PathBuf, bundletool: PathBuf, signer: PathBuf) -> Self {
        Self {
            java,
            apktool,
            bundletool,
            signer,
        }
    }

    async fn jar(&self, jar: &Path, args: Vec<OsString>) -> ToolOutcome {
        let mut full = vec![OsString::from("-jar"), jar.as_os_str().to_owned()];
        full.extend(args);
        run_passthrough(&self.java, full).await
    }
}

impl Toolchain for JavaToolchain {
    async fn decompile(&self, source: &Path, working_tree: &Path, options: &[String]) -> ToolOutcome {
        let mut args: Vec<OsString> = vec![
            "decode".into(),
            source.into(),
            "--output".into(),
            working_tree.into(),
        ];
        args.extend(options.iter().map(OsString::from));
        self.jar(&self.apktool, args).await
    }

    async fn build(&self, working_tree: &Path, output: &Path) -> ToolOutcome {
        let args: Vec<OsString> = vec![
            "build".into(),
            working_tree.into(),
            "--use-aapt2".into(),
            "--output".into(),
            output.into(),
        ];
        self.jar(&self.apktool, args).await
    }

    async fn sign(&self, package: &Path, key: &SigningKey) -> ToolOutcome {
        let mut args: Vec<OsString> = vec![
            "--apks".into(),
            package.into(),
            "--allowResign".into(),
            "--overwrite".into(),
        ];
        match key {
            SigningKey::Debug(path) => {
                args.extend(["--ksDebug".into(), path.into()]);
            }
            SigningKey::Custom(ks) => {
                args.extend([
                    "--ks".into(),
                    ks.path.clone().into(),
                    "--ksPass".into(),
                    ks.store_pass.clone().into(),
                    "--ksAlias".into(),
                    ks.alias.clone().into(),
                    "--ksKeyPass".into(),
                    ks.key_pass.clone().into(),
                ]);
            }
        }
        self.jar(&self.signer, args).await
    }

    async fn bundle(&self, bundle: &Path, archive: &Path, key: &SigningKey) -> ToolOutcome {
        let mut args: Vec<OsString> = vec![
            "build-apks".into(),
            prefixed("--bundle=", bundle),
            prefixed("--output=", archive),
            "--mode=universal".into(),
        ];
        if let SigningKey::Custom(ks) = key {
            args.extend([
                prefixed("--ks=", &ks.path),
                format!("--ks-pass=pass:{}", ks.store_pass).into(),
                format!("--ks-key-alias={}", ks.alias).into(),
                format!("--key-pass=pass:{}", ks.key_pass).into(),
            ]);
        }
        self.jar(&self.bundletool, args).await
    }

    async fn install(&self, packages: &[PathBuf]) -> ToolOutcome {
        let subcommand = if packages.len() > 1 { "install-multiple" } else { "install" };
        let mut args: Vec<OsString> = vec![subcommand.into()];
        args.extend(packages.iter().map(OsString::from));
        run_passthrough(Path::new("adb"), args).await
    }
}

fn prefixed(flag: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(flag);
    arg.push(path.as_os_str());
    arg
}

const SECRET_FLAGS: [&str; 2] = ["--ksPass", "--ksKeyPass"];
const SECRET_PREFIXES: [&str; 2] = ["--ks-pass=", "--key-pass="];

/// Command line for logs, with passwords masked
fn describe(program: &Path, args: &[OsString]) -> String {
    let mut parts = vec![program.display().to_string()];
    let mut mask_next = false;
    for arg in args {
        let arg = arg.to_string_lossy();
        if mask_next {
            parts.push("***".to_string());
            mask_next = false;
            continue;
        }
        if let Some(prefix) = SECRET_PREFIXES.iter().find(|p| arg.starts_with(**p)) {
            parts.push(format!("{prefix}***"));
            continue;
        }
        mask_next = SECRET_FLAGS.iter().any(|flag| arg == *flag);
        parts.push(arg.into_owned());
    }
    parts.join(" ")
}

/// Run a tool with inherited stdout/stderr and wait for it.
///
/// stdin is detached so the tool cannot swallow the operator's resume key.
/// The child is killed if the returned future is dropped (interrupt).
pub(crate) async fn run_passthrough(program: &Path, args: Vec<OsString>) -> ToolOutcome {
    let description = describe(program, &args);
    log::debug!("Running {description}");

    let status = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .status()
        .await;

    match status {
        Ok(status) => {
            if !status.success() {
                log::warn!("{} exited with {}", program.display(), status);
            }
            ToolOutcome {
                program: description,
                status: Some(status),
            }
        }
        Err(e) => {
            log::warn!("Failed to start {}: {}", program.display(), e);
            ToolOutcome {
                program: description,
                status: None,
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Recording toolchain that fabricates plausible artifacts.

    use super::*;
    use std::sync::{Arc, Mutex};

    pub(crate) const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="no"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.example.app">
    <application android:label="@string/app_name"/>
</manifest>
"#;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Call {
        Decompile(PathBuf),
        Build(PathBuf),
        Sign(PathBuf),
        Bundle(PathBuf),
        Install(Vec<PathBuf>),
    }

    #[derive(Debug, Clone, Default)]
    pub(crate) struct FakeToolchain {
        pub calls: Arc<Mutex<Vec<Call>>>,
    }

    impl FakeToolchain {
        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) -> ToolOutcome {
            self.calls.lock().unwrap().push(call);
            ToolOutcome {
                program: "fake".to_string(),
                status: None,
            }
        }
    }

    impl Toolchain for FakeToolchain {
        async fn decompile(&self, source: &Path, working_tree: &Path, _options: &[String]) -> ToolOutcome {
            std::fs::create_dir_all(working_tree).unwrap();
            std::fs::write(working_tree.join("AndroidManifest.xml"), MANIFEST).unwrap();
            self.record(Call::Decompile(source.to_path_buf()))
        }

        async fn build(&self, working_tree: &Path, output: &Path) -> ToolOutcome {
            std::fs::write(output, working_tree.display().to_string()).unwrap();
            self.record(Call::Build(output.to_path_buf()))
        }

        async fn sign(&self, package: &Path, _key: &SigningKey) -> ToolOutcome {
            self.record(Call::Sign(package.to_path_buf()))
        }

        async fn bundle(&self, bundle: &Path, archive: &Path, _key: &SigningKey) -> ToolOutcome {
            let file = std::fs::File::create(archive).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file("toc.pb", zip::write::SimpleFileOptions::default()).unwrap();
            zip.start_file("universal.apk", zip::write::SimpleFileOptions::default()).unwrap();
            std::io::Write::write_all(&mut zip, b"universal").unwrap();
            zip.finish().unwrap();
            self.record(Call::Bundle(bundle.to_path_buf()))
        }

        async fn install(&self, packages: &[PathBuf]) -> ToolOutcome {
            self.record(Call::Install(packages.to_vec()))
        }
    }
}
