use ferrule::config::{Config, SandboxKind};

use super::FIXTURES_PATH;

#[test]
fn test_load_valid_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_full.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert!(config.get_language("python").is_ok());
    assert!(config.get_language("cpp").is_ok());
    assert_eq!(config.max_concurrent, 2);
    assert_eq!(config.limits.wall_time_limit, Some(3.0));
    assert_eq!(config.sandbox.policy, SandboxKind::Rlimits);
    assert!(config.sandbox.clear_env);

    let cpp = config.get_language("cpp").unwrap();
    let compile_limits = config.effective_limits(cpp.compile.as_ref().unwrap().limits.as_ref());
    assert_eq!(compile_limits.wall_time_limit, Some(10.0));
    assert_eq!(compile_limits.memory_limit, Some(262144));
}

#[test]
fn test_load_minimal_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_minimal.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert!(config.languages.contains_key("test"));
    assert_eq!(config.effective_limits(None).wall_time_seconds(), 5.0);
    assert_eq!(config.max_concurrent, 8);
}

#[test]
fn test_load_invalid_configs() {
    for name in [
        "invalid_empty_name.toml",
        "invalid_empty_extension.toml",
        "invalid_empty_run_command.toml",
        "invalid_wall_time.toml",
        "invalid_sandbox_policy.toml",
    ] {
        let path = format!("{FIXTURES_PATH}/configs/{name}");
        assert!(Config::from_file(&path).is_err(), "{name} should be rejected");
    }
}

#[test]
fn test_load_missing_file() {
    let path = format!("{FIXTURES_PATH}/configs/does_not_exist.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_without_path_uses_embedded_table() {
    let config = Config::load(None).unwrap();
    assert_eq!(
        config.language_ids(),
        vec!["cpp", "java", "javascript", "python"]
    );
}
