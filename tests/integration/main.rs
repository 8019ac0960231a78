//! Integration tests for Hoard

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn hoard(dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("hoard");
        cmd.current_dir(dir)
            .env("CI", "1")
            .env_remove("HOARD_CONFIG");
        cmd
    }

    /// A project with a local directory remote next to it
    fn project() -> (TempDir, std::path::PathBuf) {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        fs::create_dir_all(&work).unwrap();
        let remote = temp.path().join("remote");

        hoard(&work)
            .args(["init", "--remote", remote.to_str().unwrap()])
            .assert()
            .success();
        (temp, work)
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        hoard(temp.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("content-addressed storage"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        hoard(temp.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("hoard"));
    }

    #[test]
    fn init_writes_project_config() {
        let (_temp, work) = project();
        let config = fs::read_to_string(work.join(".hoard/config.toml")).unwrap();
        assert!(config.contains("[remote.origin]"));
        assert!(config.contains("remote = \"origin\""));
    }

    #[test]
    fn save_then_checkout_restores_tree() {
        let (_temp, work) = project();
        fs::create_dir_all(work.join("data/sub")).unwrap();
        fs::write(work.join("data/a.txt"), "alpha").unwrap();
        fs::write(work.join("data/sub/b.txt"), "beta").unwrap();

        hoard(&work)
            .args(["save", "data"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Saved data"));
        assert!(work.join("data.hoard").is_file());

        fs::remove_dir_all(work.join("data")).unwrap();
        hoard(&work)
            .arg("checkout")
            .assert()
            .success()
            .stdout(predicate::str::contains("Checked out"));

        assert_eq!(fs::read_to_string(work.join("data/a.txt")).unwrap(), "alpha");
        assert_eq!(fs::read_to_string(work.join("data/sub/b.txt")).unwrap(), "beta");
    }

    #[test]
    fn checkout_untracked_path_fails() {
        let (_temp, work) = project();
        hoard(&work)
            .args(["checkout", "nothing"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("is not tracked"));
    }

    #[test]
    fn push_then_pull_into_empty_cache() {
        let (temp, work) = project();
        fs::write(work.join("model.bin"), "weights").unwrap();
        hoard(&work).args(["save", "model.bin"]).assert().success();

        hoard(&work)
            .arg("push")
            .assert()
            .success()
            .stdout(predicate::str::contains("Pushed 1 objects"));

        let shards: Vec<_> = fs::read_dir(temp.path().join("remote"))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(shards.len(), 1);

        hoard(&work)
            .arg("push")
            .assert()
            .success()
            .stdout(predicate::str::contains("Pushed 0 objects (1 up to date)"));

        fs::remove_dir_all(work.join(".hoard/cache")).unwrap();
        fs::remove_file(work.join("model.bin")).unwrap();

        hoard(&work)
            .arg("pull")
            .assert()
            .success()
            .stdout(predicate::str::contains("Pulled 1 objects"));
        assert_eq!(fs::read_to_string(work.join("model.bin")).unwrap(), "weights");
    }

    #[test]
    fn pull_restores_what_it_can() {
        let (temp, work) = project();
        fs::write(work.join("a.txt"), "first").unwrap();
        fs::write(work.join("b.txt"), "second").unwrap();
        hoard(&work)
            .args(["save", "a.txt", "b.txt"])
            .assert()
            .success();
        hoard(&work).arg("push").assert().success();

        let pointer: serde_json::Value =
            serde_json::from_slice(&fs::read(work.join("b.txt.hoard")).unwrap()).unwrap();
        let checksum = pointer["sha256"].as_str().unwrap();
        fs::remove_file(
            temp.path()
                .join("remote")
                .join(&checksum[..2])
                .join(&checksum[2..]),
        )
        .unwrap();

        fs::remove_dir_all(work.join(".hoard/cache")).unwrap();
        fs::remove_file(work.join("a.txt")).unwrap();
        fs::remove_file(work.join("b.txt")).unwrap();

        hoard(&work)
            .arg("pull")
            .assert()
            .success()
            .stdout(predicate::str::contains("Pulled 1 objects"))
            .stdout(predicate::str::contains("b.txt"));

        assert_eq!(fs::read_to_string(work.join("a.txt")).unwrap(), "first");
        assert!(!work.join("b.txt").exists());
    }

    #[test]
    fn checkout_fails_when_nothing_restores() {
        let (_temp, work) = project();
        fs::write(work.join("a.txt"), "first").unwrap();
        hoard(&work).args(["save", "a.txt"]).assert().success();

        fs::remove_dir_all(work.join(".hoard/cache")).unwrap();
        fs::remove_file(work.join("a.txt")).unwrap();

        hoard(&work)
            .arg("checkout")
            .assert()
            .failure()
            .stderr(predicate::str::contains("1 of 1 items failed to checkout"));
    }

    #[test]
    fn status_reports_unpushed_as_new() {
        let (_temp, work) = project();
        fs::write(work.join("a.txt"), "text").unwrap();
        hoard(&work).args(["save", "a.txt"]).assert().success();

        hoard(&work)
            .args(["status", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "\"982d9e3eb996f559e633f4d194def3761d909f5a3b647d1a851fead67c32c9d1\": \"new\"",
            ));

        hoard(&work).arg("push").assert().success();
        hoard(&work)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("in sync"));
    }

    #[test]
    fn push_without_remote_warns() {
        let temp = TempDir::new().unwrap();
        hoard(temp.path()).arg("init").assert().success();
        hoard(temp.path())
            .arg("push")
            .assert()
            .success()
            .stdout(predicate::str::contains("No remote configured"));
    }

    #[test]
    fn gc_removes_untracked_entries() {
        let (_temp, work) = project();
        fs::write(work.join("keep.txt"), "keep").unwrap();
        fs::write(work.join("drop.txt"), "drop").unwrap();
        hoard(&work)
            .args(["save", "keep.txt", "drop.txt"])
            .assert()
            .success();
        fs::remove_file(work.join("drop.txt.hoard")).unwrap();

        hoard(&work)
            .arg("gc")
            .assert()
            .success()
            .stdout(predicate::str::contains("Aborted"));

        hoard(&work)
            .args(["gc", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 1 cache entries"));
    }

    #[test]
    fn config_remote_sets_default() {
        let temp = TempDir::new().unwrap();
        hoard(temp.path()).arg("init").assert().success();
        hoard(temp.path())
            .args(["config", "remote", "backup", "memory://bucket/data", "--default"])
            .assert()
            .success();

        hoard(temp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[remote.backup]"))
            .stdout(predicate::str::contains("remote = \"backup\""));
    }

    #[test]
    fn config_path_points_into_project() {
        let temp = TempDir::new().unwrap();
        hoard(temp.path()).arg("init").assert().success();
        hoard(temp.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(".hoard"));
    }
}
