use ferrule::{ExecutionRequest, Verdict};

use super::{fixture_source, test_runner, tools_available};

async fn assert_compile_error(language: &str, fixture: &str, tools: &[&str]) {
    if !tools_available(tools) {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let report = test_runner(root.path())
        .execute_report(&ExecutionRequest::new(language, fixture_source(fixture)))
        .await
        .expect("execution failed");

    assert!(report.compile.is_some());
    assert!(report.run.is_none(), "run stage must not start after a compile error");
    assert!(matches!(report.verdict, Verdict::CompilationFailure { .. }));

    let result = report.into_result();
    assert!(!result.success);
    assert_eq!(result.output, "");
    assert!(result.error.starts_with("Compilation error:"));
    assert!(result.error.contains("error"));
    assert_ne!(result.exit_code, 0);
}

#[tokio::test]
async fn test_cpp_syntax_error() {
    assert_compile_error("cpp", "compile_error.cpp", &["g++"]).await;
}

#[tokio::test]
async fn test_java_type_error() {
    assert_compile_error("java", "compile_error.java", &["javac", "java"]).await;
}

#[tokio::test]
async fn test_cpp_compile_then_run_stages() {
    if !tools_available(&["g++"]) {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let report = test_runner(root.path())
        .execute_report(&ExecutionRequest::new("cpp", fixture_source("hello.cpp")))
        .await
        .unwrap();

    let compile = report.compile.as_ref().unwrap();
    assert!(compile.exited_ok());
    assert_eq!(compile.program, "g++");

    let run = report.run.as_ref().unwrap();
    assert!(run.exited_ok());
    assert!(run.program.ends_with("/main"));
}

#[tokio::test]
async fn test_java_class_file_named_after_public_class() {
    if !tools_available(&["javac", "java"]) {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let report = test_runner(root.path())
        .execute_report(
            &ExecutionRequest::new("java", fixture_source("solution.java")).with_input("x\n"),
        )
        .await
        .unwrap();

    let run = report.run.as_ref().unwrap();
    assert_eq!(run.program, "java");
    assert!(report.verdict.is_success(), "{:?}", report.verdict);
}
