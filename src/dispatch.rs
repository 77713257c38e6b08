//! Container formats: turn one input file into package units and run them.
//!
//! - `.apk` is a single unit.
//! - `.aab` is converted to a universal `.apk` first, then run as one unit.
//! - `.xapk` is unpacked and every contained `.apk` becomes its own unit.

use crate::error::{ErrorExt, PreconditionError, Result};
use crate::pipeline::{PackageUnit, Pipeline, ResumeSignal, Stopwatch, UnitKind};
use crate::tools::Toolchain;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Suffix of rebuilt package file names
pub const OUTPUT_SUFFIX: &str = "-patched.apk";

const UNIVERSAL_ENTRY: &str = "universal.apk";

/// Supported input containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// `.apk`
    Package,
    /// `.aab`
    Bundle,
    /// `.xapk`
    SplitBundle,
}

impl ContainerKind {
    /// Classify by extension, ignoring case
    pub fn classify(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "apk" => Ok(Self::Package),
            "aab" => Ok(Self::Bundle),
            "xapk" => Ok(Self::SplitBundle),
            _ => Err(PreconditionError::UnsupportedFormat { extension }.into()),
        }
    }
}

/// Checks that need no tools: the source exists and has a known extension
pub fn preflight(source: &Path) -> Result<ContainerKind> {
    if !source.is_file() {
        return Err(PreconditionError::SourceMissing {
            path: source.to_path_buf(),
        }
        .into());
    }
    ContainerKind::classify(source)
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parent(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Output path for a single rebuilt package.
///
/// Defaults to `<source dir>/<stem>-patched.apk`. An explicit path is used
/// as is unless it names an existing directory, in which case the default
/// file name is placed inside it.
pub fn resolve_output(source: &Path, explicit: Option<&Path>) -> PathBuf {
    let file_name = format!("{}{}", stem(source), OUTPUT_SUFFIX);
    match explicit {
        Some(path) if path.is_dir() => path.join(file_name),
        Some(path) => path.to_path_buf(),
        None => parent(source).join(file_name),
    }
}

/// Run every package unit contained in `source`.
///
/// Returns the produced packages in processing order.
pub async fn dispatch<T: Toolchain, R: ResumeSignal>(
    source: &Path,
    output: Option<&Path>,
    pipeline: &mut Pipeline<'_, T, R>,
    total: &mut Stopwatch,
) -> Result<Vec<PathBuf>> {
    let kind = preflight(source)?;
    log::debug!("{} classified as {:?}", source.display(), kind);

    match kind {
        ContainerKind::Package => {
            let unit = PackageUnit::new(source, resolve_output(source, output), UnitKind::Package);
            let report = pipeline.run(&unit, total).await?;
            Ok(vec![report.output])
        }
        ContainerKind::Bundle => run_bundle(source, output, pipeline, total).await,
        ContainerKind::SplitBundle => run_split_bundle(source, output, pipeline, total).await,
    }
}

async fn run_bundle<T: Toolchain, R: ResumeSignal>(
    source: &Path,
    output: Option<&Path>,
    pipeline: &mut Pipeline<'_, T, R>,
    total: &mut Stopwatch,
) -> Result<Vec<PathBuf>> {
    let dir = parent(source);
    let stem = stem(source);
    let archive = dir.join(format!("{stem}.apks"));
    let extract_dir = dir.join(&stem);
    let universal = dir.join(format!("{stem}.apk"));

    for path in [&archive, &extract_dir, &universal] {
        if path.exists() {
            return Err(PreconditionError::OutputExists { path: path.clone() }.into());
        }
    }

    let ledger = pipeline.ledger().clone();
    let _ = pipeline
        .output()
        .info(&format!("Converting {} to a universal package", source.display()));
    ledger.register_file(&archive);
    pipeline
        .toolchain()
        .bundle(source, &archive, &pipeline.options().signing)
        .await;

    ledger.register_dir(&extract_dir);
    extract_archive(&archive, &extract_dir, |_| {})?;

    ledger.register_file(&universal);
    let extracted = extract_dir.join(UNIVERSAL_ENTRY);
    std::fs::rename(&extracted, &universal).fs_context("moving universal package", &extracted)?;

    std::fs::remove_file(&archive).fs_context("removing archive", &archive)?;
    ledger.release(&archive);
    std::fs::remove_dir_all(&extract_dir).fs_context("removing extracted archive", &extract_dir)?;
    ledger.release(&extract_dir);

    let unit = PackageUnit::new(&universal, resolve_output(source, output), UnitKind::Universal);
    let report = pipeline.run(&unit, total).await?;

    std::fs::remove_file(&universal).fs_context("removing universal package", &universal)?;
    ledger.release(&universal);

    Ok(vec![report.output])
}

async fn run_split_bundle<T: Toolchain, R: ResumeSignal>(
    source: &Path,
    output: Option<&Path>,
    pipeline: &mut Pipeline<'_, T, R>,
    total: &mut Stopwatch,
) -> Result<Vec<PathBuf>> {
    let out_dir = match output {
        Some(dir) => dir.to_path_buf(),
        None => parent(source).join(stem(source)),
    };
    let ledger = pipeline.ledger().clone();

    let created = !out_dir.exists();
    if created {
        ledger.register_dir(&out_dir);
        std::fs::create_dir_all(&out_dir).fs_context("creating output directory", &out_dir)?;
    } else if let Some(path) = archive_targets(source, &out_dir)?.into_iter().find(|p| p.exists()) {
        return Err(PreconditionError::OutputExists { path }.into());
    }

    let _ = pipeline
        .output()
        .info(&format!("Extracting {} into {}", source.display(), out_dir.display()));
    let extracted = extract_archive(source, &out_dir, |path| {
        if !created {
            ledger.register_file(path);
        }
    })?;
    let extracted: HashSet<PathBuf> = extracted.into_iter().collect();

    // Enumerate before the first unit writes its output into the same directory
    let mut packages = Vec::new();
    for entry in std::fs::read_dir(&out_dir).fs_context("listing output directory", &out_dir)? {
        let path = entry.fs_context("listing output directory", &out_dir)?.path();
        let is_apk = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("apk"));
        if is_apk && extracted.contains(&path) {
            packages.push(path);
        }
    }
    log::debug!("{} contains {} packages", source.display(), packages.len());

    let mut outputs = Vec::with_capacity(packages.len());
    for package in &packages {
        let target = out_dir.join(format!("{}{}", stem(package), OUTPUT_SUFFIX));
        let unit = PackageUnit::new(package, target, UnitKind::Split);
        let report = pipeline.run(&unit, total).await?;
        outputs.push(report.output);

        std::fs::remove_file(package).fs_context("removing split package", package)?;
        ledger.release(package);
    }

    if created {
        ledger.release(&out_dir);
    } else {
        for path in &extracted {
            ledger.release(path);
        }
    }

    Ok(outputs)
}

/// Paths the regular entries of a zip archive would be extracted to
fn archive_targets(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(archive).fs_context("opening archive", archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    let mut targets = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        if let Some(relative) = entry.enclosed_name() {
            targets.push(dest.join(relative));
        }
    }
    Ok(targets)
}

/// Unpack every regular entry of a zip archive below `dest`.
///
/// `before_write` sees each target path before the file is created. Entries
/// escaping `dest` are skipped.
fn extract_archive(archive: &Path, dest: &Path, mut before_write: impl FnMut(&Path)) -> Result<Vec<PathBuf>> {
    let file = File::open(archive).fs_context("opening archive", archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    let mut written = Vec::with_capacity(zip.len());

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            log::warn!("Skipping archive entry outside the target: {}", entry.name());
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target).fs_context("creating directory", &target)?;
            continue;
        }
        if let Some(dir) = target.parent() {
            std::fs::create_dir_all(dir).fs_context("creating directory", dir)?;
        }

        before_write(&target);
        let mut out = File::create(&target).fs_context("extracting", &target)?;
        std::io::copy(&mut entry, &mut out).fs_context("extracting", &target)?;
        written.push(target);
    }

    Ok(written)
}
