//! Runs a prepared renderer against one test case under a wall-clock
//! timeout, capturing everything it prints into a durable log file.

use crate::{Settings, TestCase, Workspace};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// How the child process finished.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// The process ran to completion. The code is absent when the process
    /// was killed by a signal rather than exiting.
    Exited(Option<i32>),
    /// The process outlived the wall-clock budget and was killed.
    TimedOut,
    /// The process could never be started.
    SpawnFailed(String),
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Exited(Some(0)))
    }
}

/// Everything recorded about one test execution. Whether the image was
/// actually produced is the publisher's concern, not the runner's; only
/// the expected path is recorded here.
#[derive(Debug)]
pub struct RunOutcome {
    pub duration: Duration,
    pub status: RunStatus,
    pub log_path: PathBuf,
    pub image_path: PathBuf,
}

/// Executes the renderer for `test` and classifies the outcome.
///
/// Abnormal terminations (non-zero exit, timeout, spawn failure) are data,
/// not errors: they come back inside the `RunOutcome`. An `Err` here means
/// the judge itself could not set the run up.
#[tracing::instrument(skip(exe, test, workspace, settings), fields(test = test.name.as_str()))]
pub async fn run_test(
    exe: &Path,
    test: &TestCase,
    workspace: &Workspace,
    settings: &Settings,
) -> anyhow::Result<RunOutcome> {
    let log_path = workspace.log_path();
    let image_path = workspace.image_path();

    // Both stdout and stderr go straight to disk so that a chatty or hung
    // renderer cannot grow judge memory, and partial output survives a
    // timeout kill.
    let log = std::fs::File::create(&log_path)
        .with_context(|| format!("failed to create log file at {}", log_path.display()))?;
    let log_err = log.try_clone().context("failed to clone log handle")?;

    let mut cmd = tokio::process::Command::new(exe);
    cmd.arg("--in").arg(&test.scene);
    cmd.arg("--out").arg(&image_path);
    cmd.arg("--height").arg(settings.render_height.to_string());
    if let Some(camera) = &test.camera {
        cmd.arg("--camera").arg(camera);
        cmd.arg("--ambient")
            .arg(test.ambient.unwrap_or(0.0).to_string());
    }
    // Relative paths inside contestant code resolve next to the binary.
    cmd.current_dir(exe.parent().unwrap_or_else(|| Path::new(".")));
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(log);
    cmd.stderr(log_err);
    cmd.kill_on_drop(true);

    let started = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::warn!(err = %err, "renderer failed to start");
            return Ok(RunOutcome {
                duration: started.elapsed(),
                status: RunStatus::SpawnFailed(err.to_string()),
                log_path,
                image_path,
            });
        }
    };

    let status = match tokio::time::timeout(settings.timeout, child.wait()).await {
        Ok(waited) => {
            let exit = waited.context("failed to wait for renderer")?;
            RunStatus::Exited(exit.code())
        }
        Err(_elapsed) => {
            tracing::warn!(
                timeout_secs = settings.timeout.as_secs(),
                "renderer exceeded the time budget, killing it"
            );
            child.start_kill().ok();
            child.wait().await.ok();
            RunStatus::TimedOut
        }
    };

    let duration = started.elapsed();
    tracing::info!(status = ?status, elapsed_ms = duration.as_millis() as u64, "renderer finished");
    Ok(RunOutcome {
        duration,
        status,
        log_path,
        image_path,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn settings(scratch: &Path, timeout: Duration) -> Settings {
        Settings {
            scratch_dir: scratch.to_path_buf(),
            drive_root: "root".to_string(),
            round: "Round 0".to_string(),
            timeout,
            render_height: 64,
        }
    }

    fn test_case(name: &str) -> TestCase {
        TestCase {
            name: name.to_string(),
            scene: PathBuf::from("scene.glb"),
            camera: None,
            ambient: None,
        }
    }

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("render");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn workspace(tmp: &tempfile::TempDir) -> Workspace {
        let ws = Workspace::new(tmp.path().join("work"));
        std::fs::create_dir_all(ws.root()).unwrap();
        ws
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = workspace(&tmp);
        // $4 is the value passed after --out.
        let exe = write_script(tmp.path(), "echo hello\necho oops >&2\n: > \"$4\"");
        let outcome = run_test(
            &exe,
            &test_case("duck"),
            &ws,
            &settings(tmp.path(), Duration::from_secs(10)),
        )
        .await
        .unwrap();
        assert_eq!(outcome.status, RunStatus::Exited(Some(0)));
        assert!(outcome.image_path.exists());
        let log = std::fs::read_to_string(&outcome.log_path).unwrap();
        assert!(log.contains("hello"));
        assert!(log.contains("oops"));
    }

    #[tokio::test]
    async fn classifies_non_zero_exit() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = workspace(&tmp);
        let exe = write_script(tmp.path(), "exit 3");
        let outcome = run_test(
            &exe,
            &test_case("duck"),
            &ws,
            &settings(tmp.path(), Duration::from_secs(10)),
        )
        .await
        .unwrap();
        assert_eq!(outcome.status, RunStatus::Exited(Some(3)));
        assert!(!outcome.status.is_success());
        assert!(!outcome.image_path.exists());
    }

    #[tokio::test]
    async fn kills_hung_renderer_on_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = workspace(&tmp);
        let exe = write_script(tmp.path(), "sleep 60");
        let outcome = run_test(
            &exe,
            &test_case("duck"),
            &ws,
            &settings(tmp.path(), Duration::from_secs(1)),
        )
        .await
        .unwrap();
        assert_eq!(outcome.status, RunStatus::TimedOut);
        assert!(outcome.duration < Duration::from_secs(30));
        // The log file survives the kill, even if empty.
        assert!(outcome.log_path.exists());
        assert!(!outcome.image_path.exists());
    }

    #[tokio::test]
    async fn classifies_spawn_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = workspace(&tmp);
        let exe = tmp.path().join("does-not-exist");
        let outcome = run_test(
            &exe,
            &test_case("duck"),
            &ws,
            &settings(tmp.path(), Duration::from_secs(1)),
        )
        .await
        .unwrap();
        match outcome.status {
            RunStatus::SpawnFailed(_) => {}
            other => panic!("expected spawn failure, got {:?}", other),
        }
        assert!(outcome.log_path.exists());
    }

    #[tokio::test]
    async fn passes_camera_arguments_when_present() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = workspace(&tmp);
        let exe = write_script(tmp.path(), "echo \"$@\"");
        let mut test = test_case("cam-front");
        test.camera = Some("front".to_string());
        test.ambient = Some(0.25);
        let outcome = run_test(
            &exe,
            &test,
            &ws,
            &settings(tmp.path(), Duration::from_secs(10)),
        )
        .await
        .unwrap();
        let log = std::fs::read_to_string(&outcome.log_path).unwrap();
        assert!(log.contains("--camera front"));
        assert!(log.contains("--ambient 0.25"));
    }
}
