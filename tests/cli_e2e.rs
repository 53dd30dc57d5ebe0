//! End-to-end CLI tests for the rangeget binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Binary command isolated from the user's config file and environment.
fn rangeget(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rangeget").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RANGEGET_DOWNLOAD_RETRIES")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    let config_home = TempDir::new().unwrap();
    rangeget(&config_home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("concurrent byte ranges"))
        .stdout(predicate::str::contains("--download-retries"));
}

#[test]
fn test_binary_version_displays_version() {
    let config_home = TempDir::new().unwrap();
    rangeget(&config_home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rangeget"));
}

#[test]
fn test_binary_missing_output_returns_error() {
    let config_home = TempDir::new().unwrap();
    rangeget(&config_home)
        .arg("https://example.com/file")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--output"));
}

#[test]
fn test_binary_invalid_retries_fails_before_network() {
    let config_home = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    rangeget(&config_home)
        .args(["http://127.0.0.1:9/file.bin", "-o"])
        .arg(out_dir.path().join("file.bin"))
        .args(["--download-retries", "foo", "--no-progress"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "could not convert download retries to number",
        ))
        .stderr(predicate::str::contains("download failed (configuration)"));
}

#[test]
fn test_binary_invalid_config_file_is_reported() {
    let config_home = TempDir::new().unwrap();
    let config_dir = config_home.path().join("rangeget");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "concurrency = 0\n").unwrap();
    let out_dir = TempDir::new().unwrap();

    rangeget(&config_home)
        .args(["http://127.0.0.1:9/file.bin", "-o"])
        .arg(out_dir.path().join("file.bin"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_downloads_file_and_prints_json_summary() {
    let server = MockServer::start().await;
    let body = b"fake product content".to_vec();
    Mock::given(method("HEAD"))
        .and(path("/product.tgz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/product.tgz"))
        .respond_with(|request: &wiremock::Request| {
            let range = request
                .headers
                .get("range")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let (lower, upper) = range
                .trim_start_matches("bytes=")
                .split_once('-')
                .map(|(l, u)| (l.parse::<usize>().unwrap(), u.parse::<usize>().unwrap()))
                .unwrap();
            ResponseTemplate::new(206)
                .set_body_bytes(b"fake product content"[lower..=upper].to_vec())
        })
        .mount(&server)
        .await;

    let config_home = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let target = out_dir.path().join("product.tgz");
    let url = format!("{}/product.tgz", server.uri());

    let mut cmd = rangeget(&config_home);
    cmd.arg(&url)
        .arg("-o")
        .arg(&target)
        .args(["--hunks", "3", "-c", "2", "--json", "-q"]);
    let assert = tokio::task::spawn_blocking(move || cmd.assert())
        .await
        .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("\"content_length\":20"))
        .stdout(predicate::str::contains("\"ranges\":3"));
    assert_eq!(std::fs::read(&target).unwrap(), body);
}
