use std::time::{Duration, Instant};

use ferrule::{ExecutionRequest, Stage, Verdict};

use super::{fixture_source, test_runner, tools_available};

/// A process counts as gone once it no longer exists or is a zombie
fn is_gone(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
        Err(_) => true,
    }
}

#[tokio::test]
async fn test_python_infinite_loop_times_out() {
    if !tools_available(&["python3"]) {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let started = Instant::now();
    let report = test_runner(root.path())
        .execute_report(&ExecutionRequest::new(
            "python",
            fixture_source("infinite_loop.py"),
        ))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(matches!(
        report.verdict,
        Verdict::Timeout {
            stage: Stage::Run,
            ..
        }
    ));

    let result = report.into_result();
    assert!(!result.success);
    assert!(result.error.contains("timed out after 5 seconds"));
    assert_eq!(result.exit_code, -1);
}

#[tokio::test]
async fn test_cpp_infinite_loop_times_out_in_run_stage() {
    if !tools_available(&["g++"]) {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let report = test_runner(root.path())
        .execute_report(&ExecutionRequest::new(
            "cpp",
            fixture_source("infinite_loop.cpp"),
        ))
        .await
        .unwrap();

    assert!(report.compile.as_ref().unwrap().exited_ok());
    assert!(report.run.as_ref().unwrap().timed_out);
    assert_eq!(
        report.into_result().error,
        "Execution timed out after 5 seconds"
    );
}

#[tokio::test]
async fn test_timeout_kills_child_processes() {
    if !tools_available(&["python3", "sleep"]) {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let marker = tempfile::tempdir().unwrap();
    let pid_file = marker.path().join("child.pid");

    let request = ExecutionRequest::new("python", fixture_source("spawn_child.py"))
        .with_input(format!("{}\n", pid_file.display()));
    let result = test_runner(root.path()).execute(&request).await.unwrap();
    assert!(result.error.contains("timed out"));

    let pid: i32 = std::fs::read_to_string(&pid_file)
        .expect("child pid was not recorded")
        .trim()
        .parse()
        .unwrap();

    let mut gone = false;
    for _ in 0..50 {
        if is_gone(pid) {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(gone, "child process {pid} survived the timeout");
}
