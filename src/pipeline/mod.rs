//! Per-package transform: decompile, patch, optionally pause, rebuild, sign
//! and clean up.
//!
//! Every artifact the pipeline creates is registered with the [`Ledger`]
//! before anything depends on it, so an interrupt at any await point leaves
//! nothing behind after teardown.

mod clock;

pub use clock::{EnterKey, ResumeSignal, Stopwatch};

use crate::cli::OutputManager;
use crate::error::{ErrorExt, PreconditionError, Result};
use crate::ledger::Ledger;
use crate::patcher::{self, PatchReport};
use crate::tools::{SigningKey, Toolchain};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Suffix appended to a package path to name its working tree
pub const WORKING_TREE_SUFFIX: &str = "-decompiled";

/// Where a package unit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// The input `.apk` itself
    Package,
    /// Universal package derived from an `.aab`
    Universal,
    /// One split package from an `.xapk`
    Split,
}

/// One package being transformed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageUnit {
    /// Package to decompile
    pub source: PathBuf,
    /// Decompiled tree, `<source>-decompiled`
    pub working_tree: PathBuf,
    /// Rebuilt, signed package
    pub output: PathBuf,
    /// Origin of the unit
    pub kind: UnitKind,
}

impl PackageUnit {
    /// Unit for `source` writing to `output`
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>, kind: UnitKind) -> Self {
        let source = source.into();
        Self {
            working_tree: working_tree_for(&source),
            source,
            output: output.into(),
            kind,
        }
    }
}

/// Working tree path for a package: the package path plus `-decompiled`
pub fn working_tree_for(source: &Path) -> PathBuf {
    let mut path = OsString::from(source.as_os_str());
    path.push(WORKING_TREE_SUFFIX);
    PathBuf::from(path)
}

/// Progress of one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing done yet
    Init,
    /// Working tree produced
    Decompiled,
    /// Documents repaired
    Patched,
    /// Waiting for the operator
    Paused,
    /// Output package built
    Rebuilt,
    /// Output package signed
    Signed,
    /// Working tree removed or handed over (terminal)
    Cleaned,
    /// Stale working tree found, nothing done (terminal)
    Aborted,
}

/// Knobs shared by every unit of a run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Keep the working tree after the build
    pub preserve_working_tree: bool,
    /// Wait for the operator between patching and rebuilding
    pub pause_before_build: bool,
    /// Extra decompiler flags (`--no-src`, `--only-main-classes`)
    pub decompile_options: Vec<String>,
    /// Key for the signer (and the bundler)
    pub signing: SigningKey,
}

/// Outcome of a completed unit
#[derive(Debug, Clone)]
pub struct UnitReport {
    /// Signed output package
    pub output: PathBuf,
    /// What the patcher changed
    pub patch: PatchReport,
    /// Time spent on the unit, pause excluded
    pub duration: Duration,
}

/// Drives package units through their states
pub struct Pipeline<'a, T, R> {
    toolchain: &'a T,
    ledger: Ledger,
    options: PipelineOptions,
    resume: R,
    output: &'a OutputManager,
    state: PipelineState,
}

impl<'a, T: Toolchain, R: ResumeSignal> Pipeline<'a, T, R> {
    /// Pipeline sharing `ledger` with the rest of the run
    pub fn new(toolchain: &'a T, ledger: Ledger, options: PipelineOptions, resume: R, output: &'a OutputManager) -> Self {
        Self {
            toolchain,
            ledger,
            options,
            resume,
            output,
            state: PipelineState::Init,
        }
    }

    /// The toolchain units run through
    pub fn toolchain(&self) -> &T {
        self.toolchain
    }

    /// The shared ledger
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Run options
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Operator output
    pub fn output(&self) -> &OutputManager {
        self.output
    }

    /// State reached by the most recent unit
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Create the output's missing parent directories.
    ///
    /// Returns the outermost directory created, which stays registered until
    /// the output is signed.
    fn ensure_output_dir(&self, output: &Path) -> Result<Option<PathBuf>> {
        let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty() && !p.is_dir()) else {
            return Ok(None);
        };
        let outermost = parent
            .ancestors()
            .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
            .last()
            .map(Path::to_path_buf);
        if let Some(dir) = &outermost {
            self.ledger.register_dir(dir);
        }
        std::fs::create_dir_all(parent).fs_context("creating output directory", parent)?;
        Ok(outermost)
    }

    fn transition(&mut self, next: PipelineState) {
        log::debug!("pipeline: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Transform one unit.
    ///
    /// `total` is the run-wide stopwatch; it is stopped together with the
    /// unit's own clock while paused.
    pub async fn run(&mut self, unit: &PackageUnit, total: &mut Stopwatch) -> Result<UnitReport> {
        self.state = PipelineState::Init;
        let mut clock = Stopwatch::started();

        if unit.working_tree.exists() {
            self.transition(PipelineState::Aborted);
            return Err(PreconditionError::AlreadyProcessed {
                package: unit.source.clone(),
                working_tree: unit.working_tree.clone(),
            }
            .into());
        }

        let _ = self.output.info(&format!("Decompiling {}", unit.source.display()));
        self.ledger.register_dir(&unit.working_tree);
        self.toolchain
            .decompile(&unit.source, &unit.working_tree, &self.options.decompile_options)
            .await;
        self.transition(PipelineState::Decompiled);

        let _ = self.output.info("Patching network security config and manifest");
        let patch = patcher::patch_working_tree(&unit.working_tree)?;
        self.transition(PipelineState::Patched);

        if self.options.pause_before_build {
            self.transition(PipelineState::Paused);
            clock.stop();
            total.stop();
            let _ = self.output.warn(&format!(
                "Paused. Edit {} as needed, then press ENTER to continue",
                unit.working_tree.display()
            ));
            self.resume.wait().await;
            clock.start();
            total.start();
        }

        let _ = self.output.info(&format!("Rebuilding {}", unit.output.display()));
        let created_dir = self.ensure_output_dir(&unit.output)?;
        self.ledger.register_file(&unit.output);
        self.toolchain.build(&unit.working_tree, &unit.output).await;
        self.transition(PipelineState::Rebuilt);

        let _ = self.output.info(&format!("Signing {}", unit.output.display()));
        self.toolchain.sign(&unit.output, &self.options.signing).await;
        self.ledger.release(&unit.output);
        if let Some(dir) = &created_dir {
            self.ledger.release(dir);
        }
        self.transition(PipelineState::Signed);

        if self.options.preserve_working_tree {
            let _ = self.output.info(&format!("Keeping {}", unit.working_tree.display()));
        } else {
            match std::fs::remove_dir_all(&unit.working_tree) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    return Err(e).fs_context("removing working tree", &unit.working_tree);
                }
                _ => {}
            }
        }
        self.ledger.release(&unit.working_tree);
        self.transition(PipelineState::Cleaned);

        clock.stop();
        Ok(UnitReport {
            output: unit.output.clone(),
            patch,
            duration: clock.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fake::{Call, FakeToolchain};

    struct Sleep(Duration);

    impl ResumeSignal for Sleep {
        async fn wait(&mut self) {
            tokio::time::sleep(self.0).await;
        }
    }

    fn options() -> PipelineOptions {
        PipelineOptions {
            preserve_working_tree: false,
            pause_before_build: false,
            decompile_options: vec!["--no-src".to_string()],
            signing: SigningKey::Debug(PathBuf::from("/keys/debug.keystore")),
        }
    }

    fn unit_in(dir: &Path) -> PackageUnit {
        let source = dir.join("app.apk");
        std::fs::write(&source, b"apk").unwrap();
        PackageUnit::new(&source, dir.join("app-patched.apk"), UnitKind::Package)
    }

    #[test]
    fn working_tree_is_suffixed_path() {
        assert_eq!(
            working_tree_for(Path::new("/data/app.apk")),
            PathBuf::from("/data/app.apk-decompiled")
        );
    }

    #[tokio::test]
    async fn stale_working_tree_aborts_before_any_tool() {
        let tmp = tempfile::tempdir().unwrap();
        let unit = unit_in(tmp.path());
        std::fs::create_dir(&unit.working_tree).unwrap();

        let tools = FakeToolchain::default();
        let ledger = Ledger::new();
        let output = OutputManager::new(true);
        let mut pipeline = Pipeline::new(&tools, ledger.clone(), options(), Sleep(Duration::ZERO), &output);

        let err = pipeline.run(&unit, &mut Stopwatch::started()).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::RebuildError::Precondition(PreconditionError::AlreadyProcessed { .. })
        ));
        assert_eq!(pipeline.state(), PipelineState::Aborted);
        assert!(tools.calls().is_empty());
        assert!(ledger.snapshot().is_empty());
        assert!(unit.working_tree.exists());
    }

    #[tokio::test]
    async fn full_run_cleans_up_and_leaves_only_output() {
        let tmp = tempfile::tempdir().unwrap();
        let unit = unit_in(tmp.path());

        let tools = FakeToolchain::default();
        let ledger = Ledger::new();
        let output = OutputManager::new(true);
        let mut pipeline = Pipeline::new(&tools, ledger.clone(), options(), Sleep(Duration::ZERO), &output);

        let report = pipeline.run(&unit, &mut Stopwatch::started()).await.unwrap();
        assert_eq!(report.output, unit.output);
        assert_eq!(report.patch.writes(), 2);
        assert_eq!(pipeline.state(), PipelineState::Cleaned);
        assert_eq!(
            tools.calls(),
            vec![
                Call::Decompile(unit.source.clone()),
                Call::Build(unit.output.clone()),
                Call::Sign(unit.output.clone()),
            ]
        );
        assert!(unit.output.exists());
        assert!(unit.source.exists());
        assert!(!unit.working_tree.exists());
        assert!(ledger.snapshot().is_empty());
    }

    #[tokio::test]
    async fn missing_output_directory_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("app.apk");
        std::fs::write(&source, b"apk").unwrap();
        let output_path = tmp.path().join("out/nested/app-patched.apk");
        let unit = PackageUnit::new(&source, &output_path, UnitKind::Package);

        let tools = FakeToolchain::default();
        let ledger = Ledger::new();
        let output = OutputManager::new(true);
        let mut pipeline = Pipeline::new(&tools, ledger.clone(), options(), Sleep(Duration::ZERO), &output);

        let report = pipeline.run(&unit, &mut Stopwatch::started()).await.unwrap();
        assert_eq!(report.output, output_path);
        assert!(output_path.exists());
        assert!(ledger.snapshot().is_empty());
    }

    #[tokio::test]
    async fn output_under_a_file_fails_before_build() {
        let tmp = tempfile::tempdir().unwrap();
        let unit = {
            let source = tmp.path().join("app.apk");
            std::fs::write(&source, b"apk").unwrap();
            std::fs::write(tmp.path().join("blocker"), b"file").unwrap();
            PackageUnit::new(&source, tmp.path().join("blocker/app-patched.apk"), UnitKind::Package)
        };

        let tools = FakeToolchain::default();
        let ledger = Ledger::new();
        let output = OutputManager::new(true);
        let mut pipeline = Pipeline::new(&tools, ledger.clone(), options(), Sleep(Duration::ZERO), &output);

        let err = pipeline.run(&unit, &mut Stopwatch::started()).await.unwrap_err();
        assert!(err.to_string().contains("creating output directory"));
        assert_eq!(tools.calls(), vec![Call::Decompile(unit.source.clone())]);
        assert_eq!(ledger.snapshot().dirs, vec![unit.working_tree.clone()]);
    }

    #[tokio::test]
    async fn preserved_tree_is_released_not_deleted() {
        let tmp = tempfile::tempdir().unwrap();
        let unit = unit_in(tmp.path());

        let tools = FakeToolchain::default();
        let ledger = Ledger::new();
        let output = OutputManager::new(true);
        let opts = PipelineOptions {
            preserve_working_tree: true,
            ..options()
        };
        let mut pipeline = Pipeline::new(&tools, ledger.clone(), opts, Sleep(Duration::ZERO), &output);

        pipeline.run(&unit, &mut Stopwatch::started()).await.unwrap();
        assert!(unit.working_tree.join(patcher::SECURITY_CONFIG_PATH).exists());
        assert!(ledger.snapshot().is_empty());

        // A second run over the same source now hits the stale tree
        let err = pipeline.run(&unit, &mut Stopwatch::started()).await.unwrap_err();
        assert!(matches!(err, crate::error::RebuildError::Precondition(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_is_excluded_from_both_clocks() {
        let tmp = tempfile::tempdir().unwrap();
        let unit = unit_in(tmp.path());

        let tools = FakeToolchain::default();
        let output = OutputManager::new(true);
        let opts = PipelineOptions {
            pause_before_build: true,
            ..options()
        };
        let pause = Duration::from_secs(30);
        let mut pipeline = Pipeline::new(&tools, Ledger::new(), opts, Sleep(pause), &output);

        let wall = tokio::time::Instant::now();
        let mut total = Stopwatch::started();
        let report = pipeline.run(&unit, &mut total).await.unwrap();

        assert!(wall.elapsed() >= pause);
        assert!(report.duration < Duration::from_secs(1));
        assert!(total.elapsed() < Duration::from_secs(1));
        assert!(total.is_running());
    }

    #[tokio::test]
    async fn malformed_manifest_stops_before_build() {
        struct BrokenDecompile(FakeToolchain);

        impl Toolchain for BrokenDecompile {
            async fn decompile(&self, source: &Path, working_tree: &Path, options: &[String]) -> crate::tools::ToolOutcome {
                let outcome = self.0.decompile(source, working_tree, options).await;
                std::fs::write(working_tree.join("AndroidManifest.xml"), "<manifest><application>").unwrap();
                outcome
            }
            async fn build(&self, working_tree: &Path, output: &Path) -> crate::tools::ToolOutcome {
                self.0.build(working_tree, output).await
            }
            async fn sign(&self, package: &Path, key: &SigningKey) -> crate::tools::ToolOutcome {
                self.0.sign(package, key).await
            }
            async fn bundle(&self, bundle: &Path, archive: &Path, key: &SigningKey) -> crate::tools::ToolOutcome {
                self.0.bundle(bundle, archive, key).await
            }
            async fn install(&self, packages: &[PathBuf]) -> crate::tools::ToolOutcome {
                self.0.install(packages).await
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let unit = unit_in(tmp.path());
        let tools = BrokenDecompile(FakeToolchain::default());
        let ledger = Ledger::new();
        let output = OutputManager::new(true);
        let mut pipeline = Pipeline::new(&tools, ledger.clone(), options(), Sleep(Duration::ZERO), &output);

        let err = pipeline.run(&unit, &mut Stopwatch::started()).await.unwrap_err();
        assert!(matches!(err, crate::error::RebuildError::Patch(_)));
        assert_eq!(tools.0.calls().len(), 1);
        // The tree stays tracked so the caller's teardown removes it
        assert_eq!(ledger.snapshot().dirs, vec![unit.working_tree.clone()]);
    }
}
