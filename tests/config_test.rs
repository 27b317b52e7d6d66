//! 配置加载集成测试
//!
//! 测试 YAML / JSON 配置文件加载、默认值填充和校验

use module_kernel::{CoreError, KernelConfig, LoggerConfig, RotationStrategy};
use tempfile::TempDir;

#[tokio::test]
async fn test_load_yaml_with_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("kernel.yaml");
    tokio::fs::write(
        &path,
        r#"
registry:
  health_check_interval_ms: 10000
  activation_timeout_ms: null
guard:
  default_timeout_ms: 2000
  lifecycle_patterns:
    - "module.*"
bus:
  handler_timeout_ms: 1500
logging:
  level: debug
  rotation: hourly
"#,
    )
    .await
    .unwrap();

    let config = KernelConfig::from_file(&path).await.unwrap();
    assert_eq!(config.config_path.as_deref(), Some(path.as_path()));

    assert_eq!(config.registry.health_check_interval_ms, 10_000);
    assert_eq!(config.registry.activation_timeout_ms, None);
    // 未设置的字段使用默认值
    assert_eq!(config.registry.graceful_shutdown_timeout_ms, 5_000);
    assert_eq!(config.registry.overdue_factor, 2);

    assert_eq!(config.guard.default_timeout_ms, 2_000);
    assert_eq!(config.guard.max_timeout_ms, 10_000);
    assert_eq!(config.guard.lifecycle_patterns, vec!["module.*".to_string()]);
    assert_eq!(config.guard.system_patterns.len(), 3);

    assert_eq!(config.bus.handler_timeout_ms, Some(1_500));
    assert_eq!(config.bus.health_check_interval_ms, 30_000);

    let logger = LoggerConfig::from_log_config(&config.logging);
    assert_eq!(logger.level, "debug");
    assert_eq!(logger.rotation, RotationStrategy::Hourly);
    assert!(logger.file_output.is_none());
}

#[tokio::test]
async fn test_load_json() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("kernel.json");
    let content = serde_json::json!({
        "guard": { "circuit_breaker_enabled": false, "failure_threshold": 5 },
        "logging": { "json_format": true, "file_output": true, "log_dir": "/var/log/pos" }
    });
    tokio::fs::write(&path, serde_json::to_string_pretty(&content).unwrap())
        .await
        .unwrap();

    let config = KernelConfig::from_file(&path).await.unwrap();
    assert!(!config.guard.circuit_breaker_enabled);
    assert_eq!(config.guard.failure_threshold, 5);
    assert!(config.logging.json_format);

    let logger = LoggerConfig::from_log_config(&config.logging);
    assert_eq!(
        logger.file_output.as_deref(),
        Some(std::path::Path::new("/var/log/pos"))
    );
    assert_eq!(logger.max_files, Some(7));
}

#[tokio::test]
async fn test_invalid_value_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("kernel.yaml");
    tokio::fs::write(
        &path,
        r#"
guard:
  default_timeout_ms: 20000
  max_timeout_ms: 10000
"#,
    )
    .await
    .unwrap();

    match KernelConfig::from_file(&path).await {
        Err(CoreError::InvalidConfigValue { key, .. }) => {
            assert_eq!(key, "guard.default_timeout_ms")
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_malformed_and_missing_files() {
    let temp_dir = TempDir::new().unwrap();

    let missing = temp_dir.path().join("missing.yaml");
    let err = KernelConfig::from_file(&missing).await.unwrap_err();
    assert!(matches!(err, CoreError::ConfigLoadFailed(_)));

    let broken = temp_dir.path().join("broken.yaml");
    tokio::fs::write(&broken, "registry: [not, a, map]").await.unwrap();
    let err = KernelConfig::from_file(&broken).await.unwrap_err();
    assert!(matches!(err, CoreError::Yaml(_)));
}

#[test]
fn test_builder_roundtrip_through_yaml() {
    let config = KernelConfig::builder()
        .graceful_shutdown_timeout_ms(2_500)
        .handler_timeout_ms(1_000)
        .circuit_reset_timeout_ms(10_000)
        .json_logging()
        .build();

    let yaml = serde_yaml::to_string(&config).unwrap();
    let parsed: KernelConfig = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed.registry.graceful_shutdown_timeout_ms, 2_500);
    assert_eq!(parsed.guard.default_timeout_ms, 1_000);
    assert_eq!(parsed.guard.circuit_reset_timeout_ms, 10_000);
    assert!(parsed.logging.json_format);
    assert!(parsed.validate().is_ok());
}
