//! End-to-end runs of the dispatcher and pipeline against a fake toolchain.

mod common;

#[cfg(test)]
mod tests {
    use super::common::{self, Continue, Recorder};
    use apk_rebuild::pipeline::Stopwatch;
    use apk_rebuild::{DocumentChange, Ledger, Pipeline, PipelineOptions, RebuildError, dispatch, patch_working_tree};

    #[tokio::test]
    async fn apk_is_patched_rebuilt_and_signed() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("app.apk");
        std::fs::write(&source, b"apk").unwrap();

        let tools = Recorder::default();
        let ledger = Ledger::new();
        let output = common::quiet();
        let options = PipelineOptions {
            decompile_options: vec!["--no-src".to_string()],
            ..common::options()
        };
        let mut pipeline = Pipeline::new(&tools, ledger.clone(), options, Continue, &output);

        let outputs = dispatch(&source, None, &mut pipeline, &mut Stopwatch::started())
            .await
            .unwrap();

        assert_eq!(outputs, vec![tmp.path().join("app-patched.apk")]);
        assert_eq!(
            tools.log(),
            vec![
                "decode app.apk --no-src",
                "build app-patched.apk",
                "sign app-patched.apk debug",
            ]
        );
        assert_eq!(common::listing(tmp.path()), vec!["app-patched.apk", "app.apk"]);
        assert!(ledger.snapshot().is_empty());
    }

    #[tokio::test]
    async fn pinned_config_keeps_its_pins_and_gains_user_trust() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("app.apk");
        std::fs::write(&source, b"apk").unwrap();

        let tools = Recorder::with_security_config(common::PINNING_CONFIG);
        let output = common::quiet();
        let options = PipelineOptions {
            preserve_working_tree: true,
            ..common::options()
        };
        let mut pipeline = Pipeline::new(&tools, Ledger::new(), options, Continue, &output);
        dispatch(&source, None, &mut pipeline, &mut Stopwatch::started())
            .await
            .unwrap();

        let tree = tmp.path().join("app.apk-decompiled");
        let config = std::fs::read_to_string(tree.join("res/xml/network_security_config.xml")).unwrap();
        assert!(config.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(config.contains("<pin digest=\"SHA-256\">7HIpactkIAq2Y49orFOOQKurWxmmSFZhBCoQYcRhJ3Y=</pin>"));
        assert_eq!(config.matches("<certificates src=\"system\"/>").count(), 1);
        assert_eq!(config.matches("<certificates src=\"user\"/>").count(), 1);
        assert_eq!(config.matches("<base-config").count(), 1);

        let manifest = std::fs::read_to_string(tree.join("AndroidManifest.xml")).unwrap();
        assert!(manifest.contains("android:networkSecurityConfig=\"@xml/network_security_config\""));
        assert!(manifest.contains("android:allowBackup=\"true\""));

        // The preserved tree is already compliant
        let again = patch_working_tree(&tree).unwrap();
        assert_eq!(again.security_config, DocumentChange::Unchanged);
        assert_eq!(again.manifest, DocumentChange::Unchanged);
    }

    #[tokio::test]
    async fn preserved_tree_blocks_the_next_run() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("app.apk");
        std::fs::write(&source, b"apk").unwrap();

        let tools = Recorder::default();
        let ledger = Ledger::new();
        let output = common::quiet();
        let options = PipelineOptions {
            preserve_working_tree: true,
            ..common::options()
        };
        let mut pipeline = Pipeline::new(&tools, ledger.clone(), options, Continue, &output);

        dispatch(&source, None, &mut pipeline, &mut Stopwatch::started())
            .await
            .unwrap();
        let calls = tools.log().len();

        let err = dispatch(&source, None, &mut pipeline, &mut Stopwatch::started())
            .await
            .unwrap_err();
        assert!(matches!(err, RebuildError::Precondition(_)));
        assert!(err.to_string().contains("already processed"));
        assert_eq!(tools.log().len(), calls);
        assert!(ledger.snapshot().is_empty());
    }

    #[tokio::test]
    async fn aab_goes_through_a_universal_package() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("game.aab");
        std::fs::write(&source, b"aab").unwrap();
        let out_dir = tmp.path().join("out");
        std::fs::create_dir(&out_dir).unwrap();

        let tools = Recorder::default();
        let ledger = Ledger::new();
        let output = common::quiet();
        let mut pipeline = Pipeline::new(&tools, ledger.clone(), common::options(), Continue, &output);

        let outputs = dispatch(&source, Some(&out_dir), &mut pipeline, &mut Stopwatch::started())
            .await
            .unwrap();

        assert_eq!(outputs, vec![out_dir.join("game-patched.apk")]);
        assert_eq!(
            tools.log(),
            vec![
                "bundle game.aab",
                "decode game.apk",
                "build game-patched.apk",
                "sign game-patched.apk debug",
            ]
        );
        assert_eq!(common::listing(tmp.path()), vec!["game.aab", "out"]);
        assert!(ledger.snapshot().is_empty());
    }

    #[tokio::test]
    async fn xapk_rebuilds_every_contained_package() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("social.xapk");
        common::write_zip(
            &source,
            &[
                ("manifest.json", b"{\"split_apks\":[]}"),
                ("icon.png", b"png"),
                ("com.example.social.apk", b"base"),
                ("config.en.apk", b"lang"),
                ("config.xxhdpi.apk", b"density"),
            ],
        );

        let tools = Recorder::default();
        let ledger = Ledger::new();
        let output = common::quiet();
        let mut pipeline = Pipeline::new(&tools, ledger.clone(), common::options(), Continue, &output);

        let outputs = dispatch(&source, None, &mut pipeline, &mut Stopwatch::started())
            .await
            .unwrap();

        assert_eq!(outputs.len(), 3);
        let out_dir = tmp.path().join("social");
        assert_eq!(
            common::listing(&out_dir),
            vec![
                "com.example.social-patched.apk",
                "config.en-patched.apk",
                "config.xxhdpi-patched.apk",
                "icon.png",
                "manifest.json",
            ]
        );
        assert_eq!(tools.log().iter().filter(|e| e.starts_with("sign ")).count(), 3);
        assert!(source.exists());
        assert!(ledger.snapshot().is_empty());
    }

    #[tokio::test]
    async fn unsupported_and_missing_sources_run_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let notes = tmp.path().join("notes.txt");
        std::fs::write(&notes, b"hi").unwrap();

        let tools = Recorder::default();
        let output = common::quiet();
        let mut pipeline = Pipeline::new(&tools, Ledger::new(), common::options(), Continue, &output);

        let err = dispatch(&notes, None, &mut pipeline, &mut Stopwatch::started())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported file extension"));

        let err = dispatch(&tmp.path().join("gone.apk"), None, &mut pipeline, &mut Stopwatch::started())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert!(tools.log().is_empty());
    }
}
