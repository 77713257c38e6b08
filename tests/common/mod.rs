//! Shared fixtures: a toolchain that fakes apktool/bundletool/signer output.

#![allow(dead_code)]

use apk_rebuild::cli::OutputManager;
use apk_rebuild::pipeline::ResumeSignal;
use apk_rebuild::{PipelineOptions, SigningKey, ToolOutcome, Toolchain};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="no"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.example.app">
    <uses-permission android:name="android.permission.INTERNET"/>
    <application android:label="@string/app_name" android:allowBackup="true">
        <activity android:name=".MainActivity" android:exported="true"/>
    </application>
</manifest>
"#;

/// Pre-existing config that pins certificates and lacks the user source
pub const PINNING_CONFIG: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<network-security-config>
    <domain-config>
        <domain includeSubdomains="true">api.example.com</domain>
        <pin-set>
            <pin digest="SHA-256">7HIpactkIAq2Y49orFOOQKurWxmmSFZhBCoQYcRhJ3Y=</pin>
        </pin-set>
    </domain-config>
    <base-config cleartextTrafficPermitted="false">
        <trust-anchors>
            <certificates src="system"/>
        </trust-anchors>
    </base-config>
</network-security-config>
"#;

/// Records invocations and writes the files the real tools would
#[derive(Debug, Default)]
pub struct Recorder {
    pub log: Mutex<Vec<String>>,
    /// Written into the working tree after decompiling, if set
    pub security_config: Option<&'static str>,
}

impl Recorder {
    pub fn with_security_config(config: &'static str) -> Self {
        Self {
            security_config: Some(config),
            ..Self::default()
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: String) -> ToolOutcome {
        self.log.lock().unwrap().push(entry);
        ToolOutcome {
            program: "recorder".to_string(),
            status: None,
        }
    }
}

fn name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

impl Toolchain for Recorder {
    async fn decompile(&self, source: &Path, working_tree: &Path, options: &[String]) -> ToolOutcome {
        std::fs::create_dir_all(working_tree.join("res/xml")).unwrap();
        std::fs::write(working_tree.join("AndroidManifest.xml"), MANIFEST).unwrap();
        if let Some(config) = self.security_config {
            std::fs::write(working_tree.join("res/xml/network_security_config.xml"), config).unwrap();
        }
        let mut entry = format!("decode {}", name(source));
        for option in options {
            entry.push(' ');
            entry.push_str(option);
        }
        self.record(entry)
    }

    async fn build(&self, working_tree: &Path, output: &Path) -> ToolOutcome {
        assert!(working_tree.join("AndroidManifest.xml").exists());
        std::fs::write(output, b"rebuilt").unwrap();
        self.record(format!("build {}", name(output)))
    }

    async fn sign(&self, package: &Path, key: &SigningKey) -> ToolOutcome {
        let key = match key {
            SigningKey::Debug(_) => "debug",
            SigningKey::Custom(_) => "custom",
        };
        self.record(format!("sign {} {}", name(package), key))
    }

    async fn bundle(&self, bundle: &Path, archive: &Path, _key: &SigningKey) -> ToolOutcome {
        write_zip(archive, &[("toc.pb", b""), ("universal.apk", b"universal")]);
        self.record(format!("bundle {}", name(bundle)))
    }

    async fn install(&self, packages: &[PathBuf]) -> ToolOutcome {
        let names: Vec<_> = packages.iter().map(|p| name(p)).collect();
        self.record(format!("install {}", names.join(" ")))
    }
}

/// Resume immediately
pub struct Continue;

impl ResumeSignal for Continue {
    async fn wait(&mut self) {}
}

pub fn options() -> PipelineOptions {
    PipelineOptions {
        preserve_working_tree: false,
        pause_before_build: false,
        decompile_options: Vec::new(),
        signing: SigningKey::Debug(PathBuf::from("/keys/debug.keystore")),
    }
}

pub fn quiet() -> OutputManager {
    OutputManager::new(true)
}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    for (name, data) in entries {
        zip.start_file(*name, zip::write::SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// Sorted file names directly inside `dir`
pub fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
