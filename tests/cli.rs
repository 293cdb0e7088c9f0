use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::process::Command;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A scratch working directory. Keep the guard alive for the test's duration.
fn workdir(name: &str) -> (TempDir, PathBuf) {
    let guard = tempfile::Builder::new()
        .prefix(&format!("lstn-cli-{name}-"))
        .tempdir()
        .expect("create temp dir");
    let path = guard.path().canonicalize().expect("canonical temp dir");
    (guard, path)
}

async fn lstn(cwd: &Path, args: &[&str], envs: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_lstn"));
    cmd.args(args)
        .current_dir(cwd)
        .env_clear()
        .env("HOME", cwd);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    cmd.output().await.expect("failed to run lstn")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[tokio::test]
async fn debug_options_print_defaults_without_config() {
    let (_guard, cwd) = workdir("defaults");
    let output = lstn(&cwd, &["to", "--debug-options"], &[]).await;

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stderr(&output), "Running without a configuration file\n");
    let options = stdout_json(&output);
    assert_eq!(options["debug-options"], json!(true));
    assert_eq!(
        options["endpoint"],
        json!({"npm": "https://npm.listen.dev", "pypi": "https://pypi.listen.dev"})
    );
    assert_eq!(options["timeout"], json!(60));
}

#[tokio::test]
async fn timeout_flag_overrides_env() {
    let (_guard, cwd) = workdir("timeout");
    let output = lstn(
        &cwd,
        &["in", "--debug-options", "--timeout", "8888"],
        &[("LSTN_TIMEOUT", "9999")],
    )
    .await;

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_json(&output)["timeout"], json!(8888));
}

#[tokio::test]
async fn ignore_packages_flag_overrides_env() {
    let (_guard, cwd) = workdir("ignore");
    let output = lstn(
        &cwd,
        &[
            "scan",
            "--ignore-packages",
            "@vue/devtools,anotherpackage",
            "--debug-options",
        ],
        &[("LSTN_IGNORE_PACKAGES", "overriddenbyflag")],
    )
    .await;

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        stdout_json(&output)["ignore-packages"],
        json!(["@vue/devtools", "anotherpackage"])
    );
}

#[tokio::test]
async fn config_file_in_working_directory_is_announced() {
    let (_guard, cwd) = workdir("config");
    fs::write(cwd.join(".listendev.yaml"), "timeout: 120\n").expect("write config");
    let output = lstn(&cwd, &["to", "--debug-options"], &[]).await;

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        stderr(&output),
        format!(
            "Using config file: {}\n",
            cwd.join(".listendev.yaml").display()
        )
    );
    assert_eq!(stdout_json(&output)["timeout"], json!(120));
}

#[tokio::test]
async fn in_without_lockfile_fails() {
    let (_guard, cwd) = workdir("nolock");
    let output = lstn(&cwd, &["in"], &[]).await;

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).ends_with(&format!(
        "directory {} does not contain the package-lock.json file\n",
        cwd.display()
    )));
}

#[tokio::test]
async fn to_without_arguments_fails() {
    let (_guard, cwd) = workdir("noargs");
    let output = lstn(&cwd, &["to"], &[]).await;

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        stderr(&output),
        "Error: requires at least 1 arg (package name)\n"
    );
    assert!(output.stdout.is_empty());
}

#[tokio::test]
async fn to_with_too_many_arguments_fails_before_loading_config() {
    let (_guard, cwd) = workdir("manyargs");
    fs::write(cwd.join(".listendev.yaml"), "timeout: 120\n").expect("write config");
    let output = lstn(&cwd, &["to", "a", "1.0.0", "b", "c"], &[]).await;

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        stderr(&output),
        "Error: accepts between 1 and 3 arg(s), received 4\n"
    );
}

#[tokio::test]
async fn invalid_options_fail_with_every_message() {
    let (_guard, cwd) = workdir("invalid");
    let output = lstn(
        &cwd,
        &["to", "react", "--timeout", "1", "--loglevel", "loud"],
        &[],
    )
    .await;

    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr(&output);
    assert!(stderr.contains("Error: invalid configuration options/flags\n"));
    assert!(stderr.contains("timeout must be 30 or greater"));
    assert!(stderr.contains("log level must be one of"));
}

#[tokio::test(flavor = "multi_thread")]
async fn to_prints_verdicts_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/npm/verdicts"))
        .and(body_partial_json(json!({"name": "debug", "version": "4.3.4"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "debug", "version": "4.3.4", "verdicts": []}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let (_guard, cwd) = workdir("to-json");
    let endpoint = server.uri();
    let output = lstn(
        &cwd,
        &[
            "to",
            "debug",
            "4.3.4",
            "--json",
            "--jq",
            ".[].name",
            "--npm-endpoint",
            &endpoint,
        ],
        &[],
    )
    .await;

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "debug\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn jq_halt_error_sets_the_exit_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/npm/verdicts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "debug", "version": "4.3.4", "verdicts": []}
        ])))
        .mount(&server)
        .await;

    let (_guard, cwd) = workdir("to-halt");
    let endpoint = server.uri();
    let output = lstn(
        &cwd,
        &[
            "to",
            "debug",
            "--json",
            "--jq",
            ".[].name, (\"stop\" | halt_error(7))",
            "--npm-endpoint",
            &endpoint,
        ],
        &[],
    )
    .await;

    assert_eq!(output.status.code(), Some(7));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "debug\n");
    assert!(stderr(&output).ends_with("stop"));
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_token_exits_with_auth_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/npm/verdicts"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (_guard, cwd) = workdir("to-auth");
    let endpoint = server.uri();
    let output = lstn(
        &cwd,
        &["to", "debug", "--jwt-token", "expired", "--npm-endpoint", &endpoint],
        &[],
    )
    .await;

    assert_eq!(output.status.code(), Some(4));
}

#[tokio::test]
async fn version_prints_the_release_tag() {
    let (_guard, cwd) = workdir("version");
    let output = lstn(&cwd, &["version"], &[]).await;

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        format!("lstn v{}\n", env!("CARGO_PKG_VERSION"))
    );
}
