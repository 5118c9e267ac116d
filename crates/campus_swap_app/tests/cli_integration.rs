//! End-to-end tests for the `campus-swap` binary: temp config and session
//! files, REST backend served by axum on a background thread.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use predicates::prelude::*;
use serde_json::{json, Value};

fn router() -> Router {
    Router::new()
        .route(
            "/api/auth/login",
            post(|Json(body): Json<Value>| async move {
                if body["password"] == "x" {
                    Json(json!({"token": "T", "user": {"id": "1", "name": "Sam"}})).into_response()
                } else {
                    (StatusCode::UNAUTHORIZED, Json(json!({"error": "Invalid credentials"})))
                        .into_response()
                }
            }),
        )
        .route(
            "/api/items",
            get(|| async {
                Json(json!([
                    {"id": 1, "title": "Calculus Textbook", "description": "Calc 101", "price": "45.00", "category": "books", "seller": "Jamie Chen"},
                    {"id": 2, "title": "Desk Lamp", "description": "LED", "price": "28.50", "category": "furniture", "seller": "Morgan Smith"}
                ]))
            }),
        )
        .route(
            "/api/users/profile",
            get(|| async { Json(json!({"name": "Sam", "email": "sam@uni.edu"})) }),
        )
}

/// Serve the mock backend on its own thread; returns the `/api` base URL.
fn spawn_backend() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router()).await.unwrap();
        });
    });
    format!("http://{}/api", addr)
}

fn closed_port_url() -> String {
    let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    format!("http://127.0.0.1:{}/api", l.local_addr().unwrap().port())
}

/// Write a config pointing at `base_url` with the session kept in `dir`.
fn write_config(dir: &Path, base_url: &str) -> PathBuf {
    let config_path = dir.join("config.yaml");
    let session_path = dir.join("session.json");
    std::fs::write(
        &config_path,
        format!(
            "api:\n  base_url: \"{}\"\n  timeout_secs: 5\nstorage:\n  session_path: \"{}\"\n",
            base_url,
            session_path.display()
        ),
    )
    .unwrap();
    config_path
}

fn campus_swap(dir: &Path, config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("campus-swap").unwrap();
    cmd.env("HOME", dir)
        .env_remove("CAMPUS_SWAP_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config);
    cmd
}

#[test]
fn protected_command_without_session_asks_for_login() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &spawn_backend());

    campus_swap(dir.path(), &config)
        .args(["items", "list"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Not logged in"));
}

#[test]
fn login_whoami_logout() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &spawn_backend());

    campus_swap(dir.path(), &config)
        .args(["login", "--email", "a@b.com", "--password", "wrong"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid credentials (HTTP 401)"));

    campus_swap(dir.path(), &config)
        .args(["login", "--email", "a@b.com", "--password", "x"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged in as Sam"));
    assert!(predicate::path::exists().eval(&dir.path().join("session.json")));

    campus_swap(dir.path(), &config)
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("Sam (1)"));

    campus_swap(dir.path(), &config)
        .args(["profile", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sam@uni.edu"));

    campus_swap(dir.path(), &config)
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out"));

    campus_swap(dir.path(), &config)
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not logged in"));
}

#[test]
fn items_list_filters_by_category() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &spawn_backend());
    campus_swap(dir.path(), &config)
        .args(["login", "--email", "a@b.com", "--password", "x"])
        .assert()
        .success();

    campus_swap(dir.path(), &config)
        .args(["items", "list", "--category", "books"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Calculus Textbook"))
        .stdout(predicate::str::contains("Desk Lamp").not());
}

#[test]
fn items_list_offline_shows_placeholders() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &closed_port_url());
    std::fs::write(
        dir.path().join("session.json"),
        r#"{"token": "T", "user": "{\"id\":\"1\"}"}"#,
    )
    .unwrap();

    campus_swap(dir.path(), &config)
        .args(["items", "list"])
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "Failed to load items. Using placeholder data instead.",
        ))
        .stdout(predicate::str::contains("MacBook Pro 2019"))
        .stdout(predicate::str::contains("Psychology Textbook"));
}

#[test]
fn malformed_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(&config, "api: [unclosed").unwrap();

    campus_swap(dir.path(), &config)
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config"));
}

#[test]
fn config_path_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &closed_port_url());

    let mut cmd = Command::cargo_bin("campus-swap").unwrap();
    cmd.env("HOME", dir.path())
        .env("CAMPUS_SWAP_CONFIG", &config)
        .args(["login", "--email", "a@b.com", "--password", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Network error"));
}
