//! AndroidManifest.xml network-security-config reference.

use super::{DocumentChange, read_document, write_document};
use crate::error::{PatchError, Result};
use crate::xml::{Element, ElementPath, Step};
use std::path::Path;

/// Android resource attribute namespace
pub const ANDROID_NAMESPACE: &str = "http://schemas.android.com/apk/res/android";

/// Resource reference the application element must carry
pub const NETWORK_SECURITY_CONFIG_REF: &str = "@xml/network_security_config";

const MANIFEST: &str = "AndroidManifest.xml";
const APPLICATION: &str = "application";
const ATTRIBUTE: &str = "networkSecurityConfig";

/// Prefix bound to the android namespace on the root, if any
fn android_prefix(root: &Element) -> Option<String> {
    root.attributes()
        .find(|(key, value)| key.starts_with("xmlns:") && *value == ANDROID_NAMESPACE)
        .map(|(key, _)| key["xmlns:".len()..].to_string())
}

pub(super) fn ensure_config_reference(working_tree: &Path) -> Result<DocumentChange> {
    let path = working_tree.join(MANIFEST);
    if !path.exists() {
        return Err(PatchError::MissingDocument { path }.into());
    }

    let mut document = read_document(&path)?;
    let mut added = Vec::new();

    let prefix = match android_prefix(document.root()) {
        Some(prefix) => prefix,
        None => {
            document
                .root_mut()
                .set_attr("xmlns:android", ANDROID_NAMESPACE);
            added.push(format!("xmlns:android=\"{ANDROID_NAMESPACE}\""));
            "android".to_string()
        }
    };
    let qualified = format!("{prefix}:{ATTRIBUTE}");

    let application = document
        .root_mut()
        .find_mut(&ElementPath::from(vec![Step::named(APPLICATION)]))
        .ok_or_else(|| PatchError::MissingElement {
            element: APPLICATION.to_string(),
            path: path.clone(),
        })?;

    if application.attr(&qualified).as_deref() == Some(NETWORK_SECURITY_CONFIG_REF) && added.is_empty() {
        log::info!("{MANIFEST} meets the requirements");
        return Ok(DocumentChange::Unchanged);
    }

    log::warn!("{MANIFEST} doesn't meet the requirements");
    if application.set_attr(&qualified, NETWORK_SECURITY_CONFIG_REF) {
        log::info!("Adding attribute {qualified}=\"{NETWORK_SECURITY_CONFIG_REF}\"");
        added.push(format!("{qualified}=\"{NETWORK_SECURITY_CONFIG_REF}\""));
    }
    write_document(&path, &document)?;
    Ok(DocumentChange::Repaired { added })
}
