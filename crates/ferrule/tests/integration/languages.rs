use ferrule::ExecutionRequest;

use super::{fixture_source, test_runner, tools_available};

async fn assert_hello(language: &str, fixture: &str, tools: &[&str]) {
    if !tools_available(tools) {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let result = runner
        .execute(&ExecutionRequest::new(language, fixture_source(fixture)))
        .await
        .expect("execution failed");

    assert!(result.success, "{language} failed: {result:?}");
    assert_eq!(result.output.trim_end(), "Hello, World!");
    assert_eq!(result.error, "");
    assert_eq!(result.exit_code, 0);
}

async fn assert_echo(language: &str, fixture: &str, tools: &[&str]) {
    if !tools_available(tools) {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());
    let request = ExecutionRequest::new(language, fixture_source(fixture)).with_input("hello\n");

    let result = runner.execute(&request).await.expect("execution failed");

    assert!(result.success, "{language} failed: {result:?}");
    assert!(result.output.contains("echo: hello"));
}

#[tokio::test]
async fn test_python_hello() {
    assert_hello("python", "hello.py", &["python3"]).await;
}

#[tokio::test]
async fn test_javascript_hello() {
    assert_hello("javascript", "hello.js", &["node"]).await;
}

#[tokio::test]
async fn test_cpp_hello() {
    assert_hello("cpp", "hello.cpp", &["g++"]).await;
}

#[tokio::test]
async fn test_java_hello() {
    assert_hello("java", "hello.java", &["javac", "java"]).await;
}

#[tokio::test]
async fn test_language_id_is_case_insensitive() {
    assert_hello("Python", "hello.py", &["python3"]).await;
}

#[tokio::test]
async fn test_python_stdin() {
    assert_echo("python", "echo.py", &["python3"]).await;
}

#[tokio::test]
async fn test_javascript_stdin() {
    assert_echo("javascript", "echo.js", &["node"]).await;
}

#[tokio::test]
async fn test_cpp_stdin() {
    assert_echo("cpp", "echo.cpp", &["g++"]).await;
}

#[tokio::test]
async fn test_java_public_class_with_stdin() {
    if !tools_available(&["javac", "java"]) {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let request =
        ExecutionRequest::new("java", fixture_source("solution.java")).with_input("hello\n");

    let result = test_runner(root.path()).execute(&request).await.unwrap();

    assert!(result.success, "{result:?}");
    assert_eq!(result.output.trim_end(), "Solution read: hello");
}

#[tokio::test]
async fn test_python_runtime_error() {
    if !tools_available(&["python3"]) {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let result = test_runner(root.path())
        .execute(&ExecutionRequest::new(
            "python",
            fixture_source("runtime_error.py"),
        ))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.output, "before\n");
    assert!(result.error.contains("ValueError: boom"));
    assert_eq!(result.exit_code, 1);
}

#[tokio::test]
async fn test_unsupported_language() {
    let root = tempfile::tempdir().unwrap();
    let result = test_runner(root.path())
        .execute(&ExecutionRequest::new("ruby", "puts 'hi'"))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.output, "");
    assert_eq!(result.error, "Unsupported language: ruby");
    assert_eq!(result.exit_code, -1);
}

#[tokio::test]
async fn test_empty_python_source() {
    if !tools_available(&["python3"]) {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let result = test_runner(root.path())
        .execute(&ExecutionRequest::new("python", ""))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.output, "");
}
