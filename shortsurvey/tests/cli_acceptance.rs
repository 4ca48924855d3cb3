use shortsurvey_core::{AdminTable, Database};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("shortsurvey/data.db")
    }

    fn backup_dir(&self) -> PathBuf {
        self.xdg_state.join("shortsurvey/backups")
    }

    /// Write a sheet file and return its path
    fn write_sheet(&self, file_name: &str, body: &str) -> PathBuf {
        let path = self.temp_dir.path().join(file_name);
        fs::write(&path, body).expect("failed to write sheet");
        path
    }

    fn seed_users(&self) {
        let sheet = self.write_sheet(
            "users.json",
            r#"{
                "name": "users",
                "columns": ["id", "name", "password"],
                "rows": [["alice123", "Alice", "pw1"], ["bob", "Bob", "pw2"]]
            }"#,
        );
        let args = ["import", "users", sheet.to_str().expect("utf-8 path")];
        let output = run_bin(self, &args);
        assert_success(&args, &output);
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("shortsurvey"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("YOUTUBE_API_KEY")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute shortsurvey: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "shortsurvey {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn run_ok(env: &CliTestEnv, args: &[&str]) -> String {
    let output = run_bin(env, args);
    assert_success(args, &output);
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn login_checks_credentials_and_logs_session() {
    let env = CliTestEnv::new();
    env.seed_users();

    let session = run_ok(&env, &["login", "--user", "alice123", "--password", "pw1"]);
    assert_eq!(session.trim().len(), 36, "expected a uuid, got {session}");

    let rejected = run_bin(&env, &["login", "--user", "alice123", "--password", "nope"]);
    assert!(!rejected.status.success());
    assert!(String::from_utf8_lossy(&rejected.stderr).contains("invalid user id or password"));

    let db = Database::open(&env.db_path()).expect("failed to open db");
    db.migrate().expect("failed to migrate db");
    let events = db.list_events().expect("failed to list events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].video_id, "N/A");
    assert_eq!(events[0].session_id, session.trim());

    // The log goes to the state dir next to the backups
    let log_files: Vec<String> = fs::read_dir(env.xdg_state.join("shortsurvey"))
        .expect("state dir exists")
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("shortsurvey.log"))
        .collect();
    assert!(!log_files.is_empty(), "no log file in state dir");
}

#[test]
fn logged_events_show_up_in_metrics() {
    let env = CliTestEnv::new();
    let video = "https://www.youtube.com/shorts/abc";

    for (user, kind) in [
        ("alice123", "watch_start"),
        ("alice123", "like"),
        ("alice123", "watch_stop"),
        ("bob", "watch_start"),
        ("bob", "dislike"),
    ] {
        run_ok(
            &env,
            &["log-event", "-u", user, "-v", video, "-k", kind, "-s", "s1"],
        );
    }

    let stdout = run_ok(&env, &["metrics", "--user", "alice", "--format", "json"]);
    let table: serde_json::Value = serde_json::from_str(&stdout).expect("metrics should be JSON");
    let rows = table["rows"].as_array().expect("rows array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["user_id"], "alice123");
    assert!(rows[0]["like"].as_str().expect("like is text").starts_with('1'));
    assert_eq!(rows[0]["dislike"], "0");

    let text = run_ok(&env, &["metrics"]);
    assert!(text.starts_with("user_id\tvideo_id\twatch_seconds"));
    assert!(text.contains("(2 rows)"));
}

#[test]
fn unknown_event_kind_is_rejected() {
    let env = CliTestEnv::new();
    let output = run_bin(
        &env,
        &["log-event", "-u", "u1", "-v", "v1", "-k", "super_like"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown event kind"));
}

#[test]
fn comment_then_page_lists_it() {
    let env = CliTestEnv::new();
    let video = "https://www.youtube.com/shorts/abc";

    let id = run_ok(&env, &["comment", "-u", "alice123", "-v", video, "-t", "great clip"]);
    assert!(id.trim().starts_with("user_comment_"));
    run_ok(
        &env,
        &["comment", "-u", "bob", "-v", video, "-t", "agreed", "--parent", id.trim()],
    );

    let stdout = run_ok(&env, &["comments", "-v", video, "--format", "json"]);
    let page: serde_json::Value = serde_json::from_str(&stdout).expect("page should be JSON");
    let threads = page["comments"].as_array().expect("comments array");
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0]["text"], "great clip");
    assert_eq!(threads[0]["replies"][0]["author"], "bob");
    assert_eq!(page["has_next_page"], false);
}

#[test]
fn clear_writes_backup_before_deleting() {
    let env = CliTestEnv::new();
    env.seed_users();

    let stdout = run_ok(&env, &["clear", "users"]);
    assert!(stdout.contains("backup written to"));

    let backups: Vec<_> = fs::read_dir(env.backup_dir())
        .expect("backup dir should exist")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(backups.len(), 1);
    assert!(backups[0].starts_with("users_backup_"));

    let db = Database::open(&env.db_path()).expect("failed to open db");
    db.migrate().expect("failed to migrate db");
    let users = db
        .export_table(AdminTable::Users, None, None)
        .expect("failed to export users");
    assert!(users.rows.is_empty());

    let again = run_ok(&env, &["clear", "users"]);
    assert!(again.contains("already empty"));
}

#[test]
fn import_rejects_unsupported_table_and_bad_columns() {
    let env = CliTestEnv::new();
    env.seed_users();

    let bad = env.write_sheet(
        "bad.json",
        r#"{"name": "users", "columns": ["id", "nickname"], "rows": [["x", "y"]]}"#,
    );
    let output = run_bin(&env, &["import", "users", bad.to_str().expect("utf-8 path")]);
    assert!(!output.status.success());

    // Existing users survive the failed import
    run_ok(&env, &["login", "-u", "bob", "-p", "pw2"]);

    let output = run_bin(&env, &["import", "events", bad.to_str().expect("utf-8 path")]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("only supported for users and videos"));
}

#[test]
fn export_measurement_results_to_file() {
    let env = CliTestEnv::new();
    run_ok(&env, &["comment", "-u", "u1", "-v", "v1", "-t", "hello"]);

    let out = env.temp_dir.path().join("results.json");
    run_ok(
        &env,
        &["export", "measurement_results", "-o", out.to_str().expect("utf-8 path")],
    );

    let sheet: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).expect("export file")).expect("JSON sheet");
    assert_eq!(sheet["name"], "measurement_results");
    assert_eq!(sheet["columns"].as_array().map(|c| c.len()), Some(11));
    assert_eq!(sheet["rows"][0][6], 1);
}

#[test]
fn crawl_without_api_key_reports_error() {
    let env = CliTestEnv::new();
    let output = run_bin(&env, &["crawl"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("api_key"), "unexpected stderr:\n{stderr}");
}
