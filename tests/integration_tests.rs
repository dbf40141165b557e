//! Integration tests for the prjindex CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd. Every
//! test runs against its own library and global config directory.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Env {
    tmp: TempDir,
}

impl Env {
    fn new() -> Self {
        let env = Self {
            tmp: TempDir::new().unwrap(),
        };
        fs::create_dir_all(env.library()).unwrap();
        env.cmd().arg("init").arg(env.library()).assert().success();
        env
    }

    fn library(&self) -> PathBuf {
        self.tmp.path().join("library")
    }

    fn share(&self) -> PathBuf {
        self.tmp.path().join("share")
    }

    /// A prjindex command isolated from the user's config and environment
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("prjindex").unwrap();
        cmd.env("PRJINDEX_CONFIG_DIR", self.tmp.path().join("config"))
            .env_remove("PRJINDEX_LIBRARY")
            .env_remove("PRJINDEX_LOG")
            .arg("--library")
            .arg(self.library());
        cmd
    }

    /// Create a project and return its id
    fn new_project(&self, name: &str, customer: &str, extra: &[&str]) -> String {
        let output = self
            .cmd()
            .args(["new", name, "--customer", customer, "--month", "2024-03", "-f", "id"])
            .args(extra)
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.cmd().args(args).args(["-f", "json"]).output().unwrap();
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

fn mkdirs(base: &Path, rel: &str) -> PathBuf {
    let dir = base.join(rel);
    fs::create_dir_all(&dir).unwrap();
    dir
}

// ============================================================================
// CLI Basic Tests
// ============================================================================

#[test]
fn test_help_displays() {
    Command::cargo_bin("prjindex")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Project library index"));
}

#[test]
fn test_version_displays() {
    Command::cargo_bin("prjindex")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("prjindex"));
}

#[test]
fn test_init_creates_catalog() {
    let env = Env::new();
    assert!(env.library().join(".pm_system").join("index.sqlite").is_file());
}

#[test]
fn test_missing_library_is_reported() {
    let tmp = TempDir::new().unwrap();
    Command::cargo_bin("prjindex")
        .unwrap()
        .env("PRJINDEX_CONFIG_DIR", tmp.path().join("config"))
        .env_remove("PRJINDEX_LIBRARY")
        .args(["--library"])
        .arg(tmp.path().join("nowhere"))
        .arg("stats")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_completions_bash() {
    Command::cargo_bin("prjindex")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("prjindex"));
}

// ============================================================================
// Projects
// ============================================================================

#[test]
fn test_new_project_is_searchable() {
    let env = Env::new();
    let id = env.new_project("Front Beam Inspection", "ACME", &["--tag", "beam"]);
    assert_eq!(id, "PRJ-202403-001");
    assert!(env
        .library()
        .join("2024-03")
        .join("PRJ-202403-001_ACME_Front Beam Inspection")
        .join(".project.json")
        .is_file());

    env.cmd()
        .args(["search", "beam"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PRJ-202403-001"));

    let second = env.new_project("Rear Bumper", "ACME", &[]);
    assert_eq!(second, "PRJ-202403-002");
}

#[test]
fn test_duplicate_part_number_rejected() {
    let env = Env::new();
    env.new_project("Front Beam", "ACME", &["--part-number", "PN-100"]);
    env.cmd()
        .args(["new", "Other", "--customer", "ACME", "--part-number", "PN-100"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PN-100"));
}

#[test]
fn test_search_heals_deleted_project() {
    let env = Env::new();
    let keep = env.new_project("Keep Me", "ACME", &[]);
    let gone = env.new_project("Delete Me", "ACME", &[]);
    let gone_dir = env
        .library()
        .join("2024-03")
        .join(format!("{}_ACME_Delete Me", gone));
    fs::remove_dir_all(gone_dir).unwrap();

    let results = env.json(&["search"]);
    let ids: Vec<&str> = results["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![keep.as_str()]);

    env.cmd()
        .args(["show", &gone])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_show_and_recent_prune_deleted_project() {
    let env = Env::new();
    let keep = env.new_project("Keep Me", "ACME", &[]);
    let gone = env.new_project("Delete Me", "ACME", &[]);
    env.cmd().args(["open", &gone]).assert().success();
    fs::remove_dir_all(
        env.library()
            .join("2024-03")
            .join(format!("{}_ACME_Delete Me", gone)),
    )
    .unwrap();

    let recent = env.json(&["recent"]);
    let ids: Vec<&str> = recent
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![keep.as_str()]);

    env.cmd()
        .args(["show", &gone])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    env.cmd().args(["show", &keep]).assert().success();
}

#[test]
fn test_archive_unarchive_and_delete() {
    let env = Env::new();
    let id = env.new_project("Front Beam", "ACME", &[]);
    let month_dir = env.library().join("2024-03").join(format!("{}_ACME_Front Beam", id));

    env.cmd().args(["archive", &id]).assert().success();
    let archived_dir = env.library().join("归档项目").join(format!("{}_ACME_Front Beam", id));
    assert!(archived_dir.join(".project.json").is_file());
    assert!(!month_dir.exists());
    let shown = env.json(&["show", &id]);
    assert_eq!(shown["project"]["status"], "archived");
    let results = env.json(&["search"]);
    assert_eq!(results["rows"], serde_json::json!([]));

    env.cmd()
        .args(["unarchive", &id, "--status", "delivered"])
        .assert()
        .success();
    assert!(month_dir.join(".project.json").is_file());
    let shown = env.json(&["show", &id]);
    assert_eq!(shown["project"]["status"], "delivered");

    // Archiving through edit moves the directory too
    env.cmd()
        .args(["edit", &id, "--status", "archived"])
        .assert()
        .success();
    assert!(archived_dir.is_dir());
    assert!(!month_dir.exists());

    env.cmd().args(["delete", &id, "--yes"]).assert().success();
    assert!(!archived_dir.exists());
    env.cmd()
        .args(["show", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_rebuild_is_idempotent() {
    let env = Env::new();
    env.new_project("Front Beam", "ACME", &[]);
    env.new_project("Rear Bumper", "Globex", &[]);

    let first = env.json(&["rebuild"]);
    assert_eq!(first["projects"], 2);
    let before = env.json(&["search"]);
    env.json(&["rebuild"]);
    let after = env.json(&["search"]);
    assert_eq!(before, after);
}

#[test]
fn test_pin_and_open() {
    let env = Env::new();
    let id = env.new_project("Front Beam", "ACME", &[]);

    env.cmd().args(["pin", &id]).assert().success();
    let shown = env.json(&["show", &id]);
    assert_eq!(shown["project"]["pinned"], true);

    env.cmd()
        .args(["open", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Front Beam"));
    let shown = env.json(&["show", &id]);
    assert_eq!(shown["project"]["open_count"], 1);

    let recent = env.json(&["recent"]);
    assert_eq!(recent[0]["action"], "opened");

    env.cmd()
        .args(["pin", "PRJ-209901-001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_edit_updates_ground_truth_and_catalog() {
    let env = Env::new();
    let id = env.new_project("Front Beam", "ACME", &["--tag", "old"]);
    env.cmd()
        .args(["edit", &id, "--status", "delivered", "--add-tag", "new", "--remove-tag", "old"])
        .assert()
        .success();

    let shown = env.json(&["show", &id]);
    assert_eq!(shown["project"]["status"], "delivered");
    assert_eq!(shown["project"]["tags"], serde_json::json!(["new"]));

    env.cmd()
        .args(["edit", &id, "--status", "finished"])
        .assert()
        .failure();
}

#[test]
fn test_stats_counts_statuses() {
    let env = Env::new();
    let id = env.new_project("Front Beam", "ACME", &["--tag", "beam"]);
    env.new_project("Rear Bumper", "ACME", &["--tag", "beam"]);
    env.cmd()
        .args(["edit", &id, "--status", "delivered"])
        .assert()
        .success();

    let stats = env.json(&["stats"]);
    assert_eq!(stats["projects"]["total"], 2);
    assert_eq!(stats["projects"]["delivered"], 1);
    assert_eq!(stats["popular_tags"][0], serde_json::json!(["beam", 2]));
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_roots_round_trip() {
    let env = Env::new();
    let share = mkdirs(&env.share(), "");
    env.cmd()
        .args(["config", "add-root", "inspection"])
        .arg(&share)
        .assert()
        .success();

    let config = env.json(&["config", "show"]);
    assert_eq!(config["inspection_roots"][0], share.display().to_string());

    env.cmd()
        .args(["config", "remove-root", "inspection"])
        .arg(&share)
        .assert()
        .success();
    let config = env.json(&["config", "show"]);
    assert_eq!(config["inspection_roots"], serde_json::json!([]));
}

#[test]
fn test_version_one_config_is_migrated() {
    let env = Env::new();
    let config_dir = env.tmp.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("config.yaml"),
        "inspection_root: /mnt/reports\nshared_drive_root: /mnt/share\n",
    )
    .unwrap();

    let config = env.json(&["config", "show"]);
    assert_eq!(config["inspection_roots"], serde_json::json!(["/mnt/reports"]));
    assert_eq!(config["shared_drive_roots"], serde_json::json!(["/mnt/share"]));
}

// ============================================================================
// Resource links
// ============================================================================

#[test]
fn test_new_project_links_matching_report_folder() {
    let env = Env::new();
    mkdirs(&env.share(), "2024/ACME01_FrontBeam_2024/raw");
    mkdirs(&env.share(), "2024/Unrelated_Folder/raw");
    env.cmd()
        .args(["config", "add-root", "inspection"])
        .arg(env.share())
        .assert()
        .success();

    let id = env.new_project("Front Beam Inspection", "ACME", &["--customer-code", "ACME01"]);

    let links = env.json(&["link", "list", "--project", &id]);
    let links = links.as_array().unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0]["folder_name"], "ACME01_FrontBeam_2024");
    assert_eq!(links[0]["match_score"], 100);
    assert_eq!(links[0]["status"], "pending");

    let link_id = links[0]["id"].as_i64().unwrap().to_string();
    env.cmd().args(["link", "confirm", &link_id]).assert().success();
    env.cmd().args(["link", "scan", "--kind", "inspection"]).assert().success();

    let links = env.json(&["link", "list", "--project", &id]);
    assert_eq!(links.as_array().unwrap().len(), 1);
    assert_eq!(links[0]["status"], "confirmed");
}

#[test]
fn test_inspection_links_cannot_be_unconfirmed() {
    let env = Env::new();
    mkdirs(&env.share(), "ACME01_FrontBeam/raw");
    env.cmd()
        .args(["config", "add-root", "inspection"])
        .arg(env.share())
        .assert()
        .success();
    let id = env.new_project("Front Beam", "ACME", &["--customer-code", "ACME01"]);
    let links = env.json(&["link", "list", "--project", &id]);
    let link_id = links[0]["id"].as_i64().unwrap().to_string();

    env.cmd()
        .args(["link", "unconfirm", &link_id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be unconfirmed"));
}

#[test]
fn test_shared_folder_scan_and_clear() {
    let env = Env::new();
    let folder = mkdirs(&env.share(), "ACME01_Drawings/rev-a");
    fs::write(folder.join("beam.pdf"), b"12345").unwrap();
    env.cmd()
        .args(["config", "add-root", "shared-folder"])
        .arg(env.share())
        .assert()
        .success();
    let id = env.new_project("Front Beam", "ACME", &["--customer-code", "ACME01", "--no-link"]);

    let report = env.json(&["link", "scan", "--kind", "shared-folder"]);
    assert_eq!(report["shared-folder"]["inserted"], 1);

    let links = env.json(&["link", "list", "--kind", "shared-folder", "--project", &id]);
    assert_eq!(links[0]["aggregate"]["file_count"], 1);
    assert_eq!(links[0]["aggregate"]["total_size"], 5);

    let link_id = links[0]["id"].as_i64().unwrap().to_string();
    env.cmd()
        .args(["link", "confirm", "--kind", "shared-folder", &link_id])
        .assert()
        .success();
    env.cmd()
        .args(["link", "unconfirm", "--kind", "shared-folder", &link_id])
        .assert()
        .success();

    env.cmd()
        .args(["link", "clear", "--kind", "shared-folder"])
        .arg(env.share())
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 1"));
}

#[test]
fn test_manual_link_rejects_duplicates() {
    let env = Env::new();
    let id = env.new_project("Front Beam", "ACME", &[]);
    let folder = mkdirs(&env.share(), "hand-picked");

    env.cmd()
        .args(["link", "add", &id])
        .arg(&folder)
        .assert()
        .success();
    env.cmd()
        .args(["link", "add", &id])
        .arg(&folder)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    let links = env.json(&["link", "list", "--project", &id]);
    assert_eq!(links[0]["status"], "confirmed");
    assert_eq!(links[0]["match_score"], 100);
}

#[test]
fn test_scan_without_roots_is_a_noop() {
    let env = Env::new();
    env.cmd()
        .args(["link", "scan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No scan roots configured"));
}

#[test]
fn test_scan_refuses_while_lease_held() {
    let env = Env::new();
    mkdirs(&env.share(), "ACME01_FrontBeam/raw");
    env.cmd()
        .args(["config", "add-root", "inspection"])
        .arg(env.share())
        .assert()
        .success();
    let library = prjindex::core::Library::open(&env.library()).unwrap();
    let lease = prjindex::core::LibraryLease::acquire(&library).unwrap();

    env.cmd()
        .args(["link", "scan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already running"));

    drop(lease);
    env.cmd().args(["link", "scan"]).assert().success();
}

