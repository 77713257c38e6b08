//! HTTP download of tool jars.

use crate::error::{ErrorExt, Result};
use crate::ledger::Ledger;
use std::path::Path;

/// Downloads a file from a URL.
///
/// Returns the file contents as a byte vector. Non-2xx responses are errors.
pub async fn download(url: &str) -> Result<Vec<u8>> {
    log::info!("Downloading {}", url);

    let response = reqwest::get(url).await?.error_for_status()?;
    let bytes = response.bytes().await?;

    Ok(bytes.to_vec())
}

/// Download `url` to `dest` through a `.part` file tracked by the ledger,
/// so an interrupted download never leaves a truncated jar behind.
pub async fn download_to(url: &str, dest: &Path, ledger: &Ledger) -> Result<()> {
    let partial = dest.with_extension("jar.part");
    ledger.register_file(&partial);

    let data = download(url).await?;
    tokio::fs::write(&partial, &data)
        .await
        .fs_context("writing download", &partial)?;
    tokio::fs::rename(&partial, dest)
        .await
        .fs_context("moving download into place", dest)?;

    ledger.release(&partial);
    Ok(())
}
