//! Tool locations and versions.
//!
//! Defaults pin the versions the rebuild flow is tested with. An optional
//! TOML file (by default `<tools dir>/config.toml`) may override the version
//! or download URL of any tool.

use crate::error::{ErrorExt, RebuildError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the per-user tools directory
pub const TOOLS_DIR_NAME: &str = "apk-rebuild";

/// Config file looked up inside the tools directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// One downloadable jar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    /// Short name used in messages
    pub name: &'static str,
    /// File name prefix; older versions are matched by `<prefix>*`
    pub file_prefix: &'static str,
    /// Version string embedded in the file name
    pub version: String,
    /// Release download base; `<base><version>/<file name>`
    pub url_base: &'static str,
    /// Full URL override from the config file
    pub url_override: Option<String>,
}

impl ToolSpec {
    /// Jar file name, e.g. `apktool_2.8.0.jar`
    pub fn file_name(&self) -> String {
        format!("{}{}.jar", self.file_prefix, self.version)
    }

    /// Download URL
    pub fn url(&self) -> String {
        match &self.url_override {
            Some(url) => url.clone(),
            None => format!("{}{}/{}", self.url_base, self.version, self.file_name()),
        }
    }

    /// Glob matching every installed version of this tool
    pub fn glob_pattern(&self, tools_dir: &Path) -> String {
        format!("{}/{}*", tools_dir.display(), self.file_prefix)
    }

    fn apply(&mut self, over: Option<ToolOverride>) {
        if let Some(over) = over {
            if let Some(version) = over.version {
                self.version = version;
            }
            self.url_override = over.url;
        }
    }
}

/// Resolved tool configuration
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    /// Directory holding the downloaded jars
    pub tools_dir: PathBuf,
    /// bundletool (aab → apks)
    pub bundletool: ToolSpec,
    /// apktool (decode/build)
    pub apktool: ToolSpec,
    /// uber-apk-signer
    pub signer: ToolSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    bundletool: Option<ToolOverride>,
    apktool: Option<ToolOverride>,
    signer: Option<ToolOverride>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolOverride {
    version: Option<String>,
    url: Option<String>,
}

/// Platform default tools directory
/// (`~/.config/apk-rebuild`, `~/Library/Application Support/apk-rebuild`, `%APPDATA%\apk-rebuild`)
pub fn default_tools_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(TOOLS_DIR_NAME))
}

impl ToolsConfig {
    /// Built-in versions rooted at `tools_dir`
    pub fn with_tools_dir(tools_dir: PathBuf) -> Self {
        Self {
            tools_dir,
            bundletool: ToolSpec {
                name: "bundletool",
                file_prefix: "bundletool-all-",
                version: "1.15.4".to_string(),
                url_base: "https://github.com/google/bundletool/releases/download/",
                url_override: None,
            },
            apktool: ToolSpec {
                name: "apktool",
                file_prefix: "apktool_",
                version: "2.8.0".to_string(),
                url_base: "https://github.com/iBotPeaches/Apktool/releases/download/v",
                url_override: None,
            },
            signer: ToolSpec {
                name: "uber-apk-signer",
                file_prefix: "uber-apk-signer-",
                version: "1.2.1".to_string(),
                url_base: "https://github.com/patrickfav/uber-apk-signer/releases/download/v",
                url_override: None,
            },
        }
    }

    /// Resolve the configuration.
    ///
    /// `config_file` is read when given (and must exist); otherwise
    /// `<tools dir>/config.toml` is read if present.
    pub fn load(tools_dir: Option<PathBuf>, config_file: Option<&Path>) -> Result<Self> {
        let tools_dir = match tools_dir.or_else(default_tools_dir) {
            Some(dir) => dir,
            None => {
                return Err(crate::error::CliError::InvalidArguments {
                    reason: "could not determine a tools directory, pass --tools-dir".to_string(),
                }
                .into());
            }
        };
        let mut config = Self::with_tools_dir(tools_dir);

        let path = match config_file {
            Some(path) => Some(path.to_path_buf()),
            None => Some(config.tools_dir.join(CONFIG_FILE_NAME)).filter(|p| p.is_file()),
        };
        if let Some(path) = path {
            let text = std::fs::read_to_string(&path).fs_context("reading config", &path)?;
            config.apply_toml(&text, &path)?;
            log::debug!("Loaded tool overrides from {}", path.display());
        }
        Ok(config)
    }

    fn apply_toml(&mut self, text: &str, path: &Path) -> Result<()> {
        let file: ConfigFile = toml::from_str(text).map_err(|source| RebuildError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        self.bundletool.apply(file.bundletool);
        self.apktool.apply(file.apktool);
        self.signer.apply(file.signer);
        Ok(())
    }

    /// All jars in provisioning order
    pub fn tools(&self) -> [&ToolSpec; 3] {
        [&self.bundletool, &self.apktool, &self.signer]
    }

    /// Installed jar location for a tool
    pub fn jar_path(&self, tool: &ToolSpec) -> PathBuf {
        self.tools_dir.join(tool.file_name())
    }
}
