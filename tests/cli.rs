//! Command line surface. None of these reach tool provisioning.

#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use assert_cmd::cargo::cargo_bin_cmd;
    use predicates::prelude::*;

    fn apk_rebuild() -> Command {
        let mut cmd = cargo_bin_cmd!("apk_rebuild");
        cmd.env_remove("APK_REBUILD_TOOLS_DIR").env_remove("APK_REBUILD_CONFIG");
        cmd
    }

    #[test]
    fn help_lists_keystore_flags() {
        apk_rebuild()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("--ks-alias-pass"))
            .stdout(predicate::str::contains("--only-main-classes"))
            .stdout(predicate::str::contains("APK_REBUILD_TOOLS_DIR"));
    }

    #[test]
    fn source_is_required() {
        apk_rebuild().assert().failure();
    }

    #[test]
    fn missing_source_exits_one() {
        let tmp = tempfile::tempdir().unwrap();
        apk_rebuild()
            .arg(tmp.path().join("absent.apk"))
            .assert()
            .code(1)
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn unsupported_extension_exits_one() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("app.ipa");
        std::fs::write(&source, b"ipa").unwrap();

        apk_rebuild()
            .arg(&source)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Unsupported file extension 'ipa'"));
        assert!(source.exists());
    }

    #[test]
    fn keystore_options_without_keystore_exit_one() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("app.apk");
        std::fs::write(&source, b"apk").unwrap();

        apk_rebuild()
            .arg(&source)
            .args(["--ks-pass", "secret"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("require --ks"));
    }
}
