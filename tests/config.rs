// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, defaults, discovery, and the init template.

use std::time::Duration;
use verdigris::config::*;
use verdigris::types::PoolColor;

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config_applies_defaults() {
        let yaml = r#"
group: book-service
repository: book-service
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.group.as_str(), "book-service");
        assert_eq!(config.replicas, 2);
        assert_eq!(config.health_check.path, "/");
        assert_eq!(config.health_check.interval, Duration::from_secs(35));
        assert_eq!(config.health_check.timeout, Duration::from_secs(20));
        assert_eq!(config.listeners.production.port, 80);
        assert_eq!(config.listeners.test.as_ref().map(|l| l.port), Some(8080));
        assert_eq!(config.task.cpu, 2048);
        assert_eq!(config.task.memory_mib, 4096);
        assert_eq!(config.task.container_port, 3000);
        assert_eq!(
            config.deployment.deregistration_delay,
            Duration::from_secs(30)
        );
        assert_eq!(config.deployment.policy, PromotionPolicy::AllAtOnce);
        assert_eq!(config.capacity_providers.len(), 2);
        assert_eq!(config.capacity_providers.head.name, "FARGATE");
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
group: book-service
repository: books/api
registry: registry.example.com
replicas: 4
task:
  cpu: 1024
  memory_mib: 2048
  container_port: 8000
  env:
    RUST_LOG: info
pools:
  blue: tg-books-blue
health_check:
  path: /healthz
  interval: 10s
  timeout: 5s
  healthy_threshold: 2
  unhealthy_threshold: 3
listeners:
  production:
    port: 443
  test:
    port: 9443
deployment:
  policy:
    type: all_at_once
  bake_time: 5m
  require_approval: true
  deregistration_delay: 45s
retry:
  max_attempts: 3
  initial_backoff: 500ms
  max_backoff: 5s
capacity_providers:
  - FARGATE
  - name: FARGATE_SPOT
    weight: 2
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.replicas, 4);
        assert_eq!(config.registry.as_deref(), Some("registry.example.com"));
        assert_eq!(config.task.env.get("RUST_LOG").map(String::as_str), Some("info"));
        assert_eq!(config.pool_address(PoolColor::Blue), "tg-books-blue");
        assert_eq!(config.pool_address(PoolColor::Green), "book-service-green");
        assert_eq!(config.health_check.interval, Duration::from_secs(10));
        assert_eq!(config.deployment.bake_time, Duration::from_secs(300));
        assert!(config.deployment.require_approval);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(500));
        assert_eq!(config.capacity_providers.head.weight, 1);
        assert_eq!(config.capacity_providers.tail[0].weight, 2);
    }

    #[test]
    fn shifted_policies_parse() {
        let yaml = r#"
group: book-service
repository: book-service
deployment:
  policy:
    type: canary
    percent: 10
    interval: 5m
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(!config.deployment.policy.is_supported());
    }

    #[test]
    fn missing_group_returns_error() {
        assert!(Config::from_yaml("repository: app\n").is_err());
    }

    #[test]
    fn invalid_group_name_returns_error() {
        assert!(Config::from_yaml("group: ../evil\nrepository: app\n").is_err());
    }

    #[test]
    fn empty_capacity_providers_return_error() {
        let yaml = "group: g\nrepository: app\ncapacity_providers: []\n";
        assert!(Config::from_yaml(yaml).is_err());
    }
}

mod validation {
    use super::*;

    fn rejects(yaml_tail: &str) {
        let yaml = format!("group: book-service\nrepository: book-service\n{yaml_tail}");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(
            err.to_string().contains("invalid configuration"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn zero_replicas() {
        rejects("replicas: 0\n");
    }

    #[test]
    fn zero_thresholds() {
        rejects("health_check:\n  healthy_threshold: 0\n");
    }

    #[test]
    fn shared_listener_port() {
        rejects("listeners:\n  production:\n    port: 80\n  test:\n    port: 80\n");
    }

    #[test]
    fn approval_without_bake_time() {
        rejects("deployment:\n  require_approval: true\n");
    }

    #[test]
    fn no_weighted_capacity_provider() {
        rejects("capacity_providers:\n  - name: FARGATE_SPOT\n    weight: 0\n");
    }
}

mod discovery {
    use super::*;

    #[test]
    fn finds_config_in_hidden_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".verdigris")).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILENAME_DIR),
            "group: hidden\nrepository: app\n",
        )
        .unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.group.as_str(), "hidden");
    }

    #[test]
    fn missing_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::discover(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn init_writes_a_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), Some("books"), Some("books/api"), false).unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.group.as_str(), "books");
        assert_eq!(config.repository, "books/api");

        assert!(init_config(dir.path(), None, None, false).is_err());
        assert!(init_config(dir.path(), None, None, true).is_ok());
    }
}
