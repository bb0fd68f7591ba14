use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn touch(dir: &Path, name: &str) {
    fs::create_dir_all(dir).expect("mkdir");
    fs::write(dir.join(name), format!("{{\"name\":\"{name}\"}}\n")).expect("write member");
}

fn safran_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("safran-archive");
    cmd.current_dir(home)
        .env("SAFRAN_HOME", home)
        .env("SAFRAN_BACKEND", "json")
        .env("SAFRAN_FILE_EXTENSION", "json");
    cmd
}

#[test]
fn dry_run_reports_without_deleting() {
    let tmp = tempdir().expect("tempdir");
    let archive = tmp.path().join("output");
    let older = "T_QUOT_SIM2_latest-20200101-20200125.json";
    touch(&archive, older);
    touch(&archive, "T_QUOT_SIM2_latest-20200101-20200130.json");

    safran_cmd(tmp.path())
        .args(["sweep", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("would_remove="))
        .stdout(predicate::str::contains("kept=1 removed=1"));

    assert!(archive.join(older).exists());
    assert!(!archive.join("manifest.json").exists());
}

#[test]
fn sweep_keeps_newest_per_variable_and_is_idempotent() {
    let tmp = tempdir().expect("tempdir");
    let archive = tmp.path().join("output");
    let older = "T_QUOT_SIM2_latest-20200101-20200125.json";
    let other_variable = "PRENEI_QUOT_SIM2_latest-20200101-20200110.json";
    touch(&archive, older);
    touch(&archive, "T_QUOT_SIM2_latest-20200101-20200130.json");
    touch(&archive, other_variable);
    touch(&archive, "T_QUOT_SIM2_historical-19580801-20200731.json");

    safran_cmd(tmp.path())
        .arg("sweep")
        .assert()
        .success()
        .stdout(predicate::str::contains("kept=3 removed=1"));

    assert!(!archive.join(older).exists());
    assert!(archive.join(other_variable).exists());
    assert!(archive.join("manifest.json").exists());

    safran_cmd(tmp.path())
        .arg("sweep")
        .assert()
        .success()
        .stdout(predicate::str::contains("kept=3 removed=0"));
}

#[test]
fn retention_tie_keeps_both_and_warns() {
    let tmp = tempdir().expect("tempdir");
    let archive = tmp.path().join("output");
    let tied = [
        "T_QUOT_SIM2_latest-20200101-20200130.json",
        "T_QUOT_SIM2_latest-20200105-20200130.json",
    ];
    for name in tied {
        touch(&archive, name);
    }

    safran_cmd(tmp.path())
        .arg("sweep")
        .assert()
        .success()
        .stdout(predicate::str::contains("[E004_RETENTION_AMBIGUITY]"));

    for name in tied {
        assert!(archive.join(name).exists(), "{name}");
    }

    let tie = "retention tie recorded in manifest";
    safran_cmd(tmp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains(tie));
}

#[test]
fn status_flags_members_changed_after_the_manifest() {
    let tmp = tempdir().expect("tempdir");
    let archive = tmp.path().join("output");
    touch(&archive, "T_QUOT_SIM2_previous-20200101-20200120.json");
    safran_cmd(tmp.path()).arg("sweep").assert().success();

    safran_cmd(tmp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "current.previous.T=T_QUOT_SIM2_previous-20200101-20200120.json",
        ));

    fs::write(
        archive.join("T_QUOT_SIM2_previous-20200101-20200120.json"),
        "tampered\n",
    )
    .expect("tamper");
    safran_cmd(tmp.path())
        .arg("status")
        .assert()
        .failure()
        .stdout(predicate::str::contains("checksum mismatch"));
}

#[test]
fn status_on_fresh_home_reports_missing_archive() {
    let tmp = tempdir().expect("tempdir");
    safran_cmd(tmp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("archive_dir missing"));
}

#[test]
fn publish_list_labels_current_members() {
    let tmp = tempdir().expect("tempdir");
    let archive = tmp.path().join("output");
    touch(&archive, "T_QUOT_SIM2_historical-19580801-20200731.json");
    touch(&archive, "T_QUOT_SIM2_latest-20200101-20200130.json");
    let out = tmp.path().join("list.json");

    safran_cmd(tmp.path())
        .args(["publish-list", "--out"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("[T, latest]"));

    let raw = fs::read_to_string(&out).expect("read list");
    assert!(raw.contains("\"historical\""));
    assert!(raw.contains("T_QUOT_SIM2_latest-20200101-20200130.json"));
}

#[test]
fn bad_config_file_is_fatal() {
    let tmp = tempdir().expect("tempdir");
    fs::write(
        tmp.path().join("safran-archive.toml"),
        "[dataset]\nsuffix = \"\"\n",
    )
    .expect("write config");

    safran_cmd(tmp.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: invalid dataset suffix"));
}

#[test]
fn relative_archive_dir_still_refreshes_the_manifest() {
    let tmp = tempdir().expect("tempdir");
    let archive = tmp.path().join("output");
    let older = "T_QUOT_SIM2_latest-20200101-20200125.json";
    touch(&archive, older);
    touch(&archive, "T_QUOT_SIM2_latest-20200101-20200130.json");

    safran_cmd(tmp.path())
        .args(["sweep", "--dir", "./output/."])
        .assert()
        .success()
        .stdout(predicate::str::contains("manifest="));

    assert!(archive.join("manifest.json").exists());
    assert!(!archive.join(older).exists());
}

#[test]
fn download_dir_sweep_uses_extension_list_and_category_groups() {
    let tmp = tempdir().expect("tempdir");
    let raw = tmp.path().join("raw");
    let older = "QUOT_SIM2_latest-20200101-20200125.csv.gz";
    let newer = "QUOT_SIM2_latest-20200101-20200130.csv.gz";
    let previous = "QUOT_SIM2_previous-20200101-20200120.csv.gz";
    for name in [older, newer, previous] {
        touch(&raw, name);
    }

    safran_cmd(tmp.path())
        .args(["sweep", "--dir", "raw", "--ext", "csv.gz"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kept=2 removed=1"));

    assert!(!raw.join(older).exists());
    assert!(raw.join(newer).exists());
    assert!(raw.join(previous).exists());
    assert!(!raw.join("manifest.json").exists());
}

#[test]
fn invalid_concurrency_in_env_is_fatal() {
    let tmp = tempdir().expect("tempdir");
    safran_cmd(tmp.path())
        .env("SAFRAN_CONCURRENCY", "abc")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("SAFRAN_CONCURRENCY"));
}
