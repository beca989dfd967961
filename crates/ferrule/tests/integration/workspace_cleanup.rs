use ferrule::ExecutionRequest;

use super::{fixture_source, leftover_workspaces, test_runner, tools_available};

#[tokio::test]
async fn test_workspaces_removed_after_each_outcome() {
    if !tools_available(&["python3", "g++"]) {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let requests = [
        ExecutionRequest::new("python", fixture_source("hello.py")),
        ExecutionRequest::new("python", fixture_source("runtime_error.py")),
        ExecutionRequest::new("cpp", fixture_source("hello.cpp")),
        ExecutionRequest::new("cpp", fixture_source("compile_error.cpp")),
        ExecutionRequest::new("ruby", "puts 1"),
    ];

    for request in &requests {
        let report = runner.execute_report(request).await.unwrap();
        if let Some(path) = &report.workspace {
            assert!(!path.exists(), "{} was not removed", path.display());
        }
        assert_eq!(leftover_workspaces(root.path()), 0);
    }
}

#[tokio::test]
async fn test_concurrent_executions_do_not_interfere() {
    if !tools_available(&["python3"]) {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());
    let code = fixture_source("echo.py");

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let runner = runner.clone();
            let request = ExecutionRequest::new("python", code.clone()).with_input(format!("run-{i}\n"));
            tokio::spawn(async move { runner.execute(&request).await })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap().unwrap();
        assert!(result.success, "{result:?}");
        assert_eq!(result.output, format!("echo: run-{i}\n"));
    }
    assert_eq!(leftover_workspaces(root.path()), 0);
}
