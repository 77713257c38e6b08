//! Idempotent repair of the trust-policy declarations inside a working tree.
//!
//! Two documents are touched: `res/xml/network_security_config.xml`, which
//! must trust both system and user certificate stores, and
//! `AndroidManifest.xml`, whose `<application>` must reference that config.
//! A document that already complies is never rewritten, so running the
//! patcher twice performs zero writes on the second pass.

mod manifest;
mod security_config;

pub use manifest::{ANDROID_NAMESPACE, NETWORK_SECURITY_CONFIG_REF};
pub use security_config::SECURITY_CONFIG_PATH;

use crate::error::{ErrorExt, PatchError, Result};
use crate::xml::Document;
use std::path::Path;

/// Outcome for one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentChange {
    /// Already compliant; not written
    Unchanged,
    /// Did not exist; synthesized and written
    Created,
    /// Existed but was missing pieces; each added piece is listed
    Repaired {
        /// Human readable description of each added element/attribute
        added: Vec<String>,
    },
}

impl DocumentChange {
    /// Whether the document was written
    pub fn written(&self) -> bool {
        !matches!(self, DocumentChange::Unchanged)
    }
}

/// What the patcher did to a working tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    /// network_security_config.xml outcome
    pub security_config: DocumentChange,
    /// AndroidManifest.xml outcome
    pub manifest: DocumentChange,
}

impl PatchReport {
    /// Number of documents written
    pub fn writes(&self) -> usize {
        usize::from(self.security_config.written()) + usize::from(self.manifest.written())
    }
}

/// Repair both documents of a decompiled working tree
pub fn patch_working_tree(working_tree: &Path) -> Result<PatchReport> {
    let security_config = security_config::ensure_user_trust(working_tree)?;
    let manifest = manifest::ensure_config_reference(working_tree)?;
    Ok(PatchReport {
        security_config,
        manifest,
    })
}

fn read_document(path: &Path) -> Result<Document> {
    let text = std::fs::read_to_string(path).fs_context("reading", path)?;
    Document::parse(&text).map_err(|e| {
        PatchError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn write_document(path: &Path, document: &Document) -> Result<()> {
    let bytes = document.to_bytes().map_err(|e| PatchError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    std::fs::write(path, bytes).fs_context("writing", path)
}
