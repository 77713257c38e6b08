//! network_security_config.xml synthesis and repair.

use super::{DocumentChange, read_document, write_document};
use crate::error::{ErrorExt, Result};
use crate::xml::{Document, Element, ElementPath, Step};
use std::path::Path;

/// Location of the security config relative to the working tree root
pub const SECURITY_CONFIG_PATH: &str = "res/xml/network_security_config.xml";

const ROOT: &str = "network-security-config";
const BASE_CONFIG: &str = "base-config";
const TRUST_ANCHORS: &str = "trust-anchors";
const CERTIFICATES: &str = "certificates";
const CERT_SOURCES: [&str; 2] = ["system", "user"];

fn base_config() -> Element {
    Element::new(BASE_CONFIG).with_attr("cleartextTrafficPermitted", "false")
}

fn certificates(src: &str) -> Step {
    Step::with_attr(CERTIFICATES, "src", src)
}

/// Fresh document trusting both the system and the user store
pub fn synthesize() -> Document {
    let mut anchors = Element::new(TRUST_ANCHORS);
    for src in CERT_SOURCES {
        anchors.push(certificates(src).to_element());
    }
    let mut base = base_config();
    base.push(anchors);
    let mut root = Element::new(ROOT);
    root.push(base);
    Document::new(root)
}

/// Add whatever is missing among base-config, trust-anchors and the two
/// certificate sources. Existing siblings are left untouched.
///
/// Returns one description per element added.
pub fn repair(document: &mut Document) -> Vec<String> {
    let mut added = Vec::new();

    let (base, created) = document
        .root_mut()
        .ensure_child(&Step::named(BASE_CONFIG), base_config);
    if created {
        log::info!("Adding element <base-config cleartextTrafficPermitted=\"false\">");
        added.push("<base-config cleartextTrafficPermitted=\"false\">".to_string());
    }

    let anchors_step = Step::named(TRUST_ANCHORS);
    let (anchors, created) = base.ensure_child(&anchors_step, || anchors_step.to_element());
    if created {
        log::info!("Adding element <trust-anchors>");
        added.push("<trust-anchors>".to_string());
    }

    for src in CERT_SOURCES {
        let step = certificates(src);
        let (_, created) = anchors.ensure_child(&step, || step.to_element());
        if created {
            log::info!("Adding element <certificates src=\"{src}\">");
            added.push(format!("<certificates src=\"{src}\">"));
        }
    }

    added
}

fn user_trust_path() -> ElementPath {
    ElementPath::from(vec![
        Step::named(BASE_CONFIG),
        Step::named(TRUST_ANCHORS),
        certificates("user"),
    ])
}

pub(super) fn ensure_user_trust(working_tree: &Path) -> Result<DocumentChange> {
    let path = working_tree.join(SECURITY_CONFIG_PATH);

    if !path.exists() {
        log::warn!("{SECURITY_CONFIG_PATH} not found, creating");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;
        }
        write_document(&path, &synthesize())?;
        return Ok(DocumentChange::Created);
    }

    let mut document = read_document(&path)?;
    if document.root().find(&user_trust_path()).is_some() {
        log::info!("{SECURITY_CONFIG_PATH} meets the requirements");
        return Ok(DocumentChange::Unchanged);
    }

    log::warn!("{SECURITY_CONFIG_PATH} doesn't meet the requirements");
    let added = repair(&mut document);
    write_document(&path, &document)?;
    Ok(DocumentChange::Repaired { added })
}
