//! Integration tests for rbup

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn rbup() -> Command {
        cargo_bin_cmd!("rbup")
    }

    #[test]
    fn help_displays() {
        rbup()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Ruby runtime provisioner"));
    }

    #[test]
    fn version_displays() {
        rbup()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("rbup"));
    }

    #[test]
    fn versions_lists_ruby() {
        rbup()
            .arg("versions")
            .assert()
            .success()
            .stdout(predicate::str::contains("3.3.5"));
    }

    #[test]
    fn versions_lists_alternative_engines() {
        rbup()
            .args(["versions", "--engine", "jruby"])
            .assert()
            .success()
            .stdout(predicate::str::contains("9.4.8.0"));
    }

    #[test]
    fn versions_unknown_engine_fails() {
        rbup()
            .args(["versions", "--engine", "rubinius"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown engine rubinius"));
    }

    #[test]
    fn install_unknown_engine_fails() {
        let dir = TempDir::new().unwrap();
        rbup()
            .current_dir(dir.path())
            .args(["install", "rubinius-5.0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown engine rubinius"));
    }

    #[test]
    fn install_unknown_version_lists_available() {
        let dir = TempDir::new().unwrap();
        rbup()
            .current_dir(dir.path())
            .args(["install", "9.9.9"])
            .assert()
            .failure()
            .stderr(
                predicate::str::contains("Unknown version 9.9.9")
                    .and(predicate::str::contains("available versions for ruby")),
            );
    }

    #[test]
    fn install_without_version_input_fails() {
        let dir = TempDir::new().unwrap();
        rbup()
            .current_dir(dir.path())
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains(".ruby-version"));
    }

    #[test]
    fn install_reads_ruby_version_file() {
        // The version file is honored even when it names an impossible
        // version; resolution fails before any network access
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".ruby-version"), "9.9.9\n").unwrap();
        rbup()
            .current_dir(dir.path())
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown version 9.9.9"));
    }

    #[test]
    fn cache_list_empty() {
        let dir = TempDir::new().unwrap();
        rbup()
            .args(["cache", "list", "--cache-dir"])
            .arg(dir.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entries"));
    }

    #[test]
    fn cache_clear_requires_yes() {
        let dir = TempDir::new().unwrap();
        rbup()
            .args(["cache", "clear", "--cache-dir"])
            .arg(dir.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("--yes"));
    }

    #[test]
    fn cache_clear_empty_store() {
        let dir = TempDir::new().unwrap();
        rbup()
            .args(["cache", "clear", "--yes", "--cache-dir"])
            .arg(dir.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 0 cache entries"));
    }

    #[test]
    fn completions_generate() {
        rbup()
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("rbup"));
    }
}
