// Typed settings (§6 "Configuration (consumed, not owned)"). Conductor takes
// a parsed `ConductorConfig` value; it never loads config files itself
// (property-sourced configuration loading is out of scope per §1) — only
// `Deserialize` is provided so an embedding application's own loader can
// hand Conductor a parsed value.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryStrategy {
    ExponentialBackoff,
    FixedDelay,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub strategy: RetryStrategy,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_enabled: bool,
    pub jitter_factor: f64,
    pub max_total_duration_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: RetryStrategy::ExponentialBackoff,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter_enabled: true,
            jitter_factor: 0.2,
            max_total_duration_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlidingWindowType {
    CountBased,
    TimeBased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub sliding_window_type: SlidingWindowType,
    pub sliding_window_size: u64,
    pub minimum_calls: u64,
    pub failure_rate_threshold: f64,
    pub slow_call_duration_threshold_ms: u64,
    pub slow_call_rate_threshold: f64,
    pub wait_duration_in_open_state_ms: u64,
    pub permitted_calls_in_half_open_state: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            sliding_window_type: SlidingWindowType::CountBased,
            sliding_window_size: 10,
            minimum_calls: 10,
            failure_rate_threshold: 50.0,
            slow_call_duration_threshold_ms: 10_000,
            slow_call_rate_threshold: 100.0,
            wait_duration_in_open_state_ms: 60_000,
            permitted_calls_in_half_open_state: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterSettings {
    pub limit_for_period: u32,
    pub limit_refresh_period_ms: u64,
    pub timeout_ms: u64,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            limit_for_period: 50,
            limit_refresh_period_ms: 1_000,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeLimiterSettings {
    pub timeout_ms: u64,
}

impl Default for TimeLimiterSettings {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelismSettings {
    pub enabled: bool,
    pub max_threads: Option<usize>,
    pub max_tasks_per_batch: usize,
    pub task_timeout_seconds: u64,
    pub batch_timeout_seconds: u64,
    pub fallback_sequential: bool,
    pub min_tasks_for_parallel_execution: usize,
    pub parallelism_threshold: f64,
}

impl Default for ParallelismSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_threads: None,
            max_tasks_per_batch: 8,
            task_timeout_seconds: 120,
            batch_timeout_seconds: 1_800,
            fallback_sequential: true,
            min_tasks_for_parallel_execution: 2,
            parallelism_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    pub default_limit: usize,
    pub max_entries: usize,
    pub retention_days: u32,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub emergency_threshold: f64,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_entries: 10_000,
            retention_days: 30,
            warning_threshold: 0.7,
            critical_threshold: 0.85,
            emergency_threshold: 0.95,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub approval_default_timeout_secs: u64,
    pub approval_max_timeout_secs: u64,
    pub stage_default_timeout_secs: u64,
    pub max_stages: usize,
    pub max_dependency_depth: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            approval_default_timeout_secs: 300,
            approval_max_timeout_secs: 7 * 24 * 3600,
            stage_default_timeout_secs: 120,
            max_stages: 100,
            max_dependency_depth: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellExecSettings {
    pub timeout_secs: u64,
    pub allowed_commands: Vec<String>,
    pub max_output_bytes: usize,
}

impl Default for ShellExecSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            allowed_commands: Vec::new(),
            max_output_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileReadSettings {
    pub base_dir: String,
    pub allow_symlinks: bool,
    pub max_bytes: usize,
    pub max_path_length: usize,
}

impl Default for FileReadSettings {
    fn default() -> Self {
        Self {
            base_dir: ".".to_string(),
            allow_symlinks: false,
            max_bytes: 1024 * 1024,
            max_path_length: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub shell_exec: ShellExecSettings,
    pub file_read: FileReadSettings,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            shell_exec: ShellExecSettings::default(),
            file_read: FileReadSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateCacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub max_size: usize,
    pub ttl_secs: u64,
}

impl Default for TemplateCacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 256,
            ttl_secs: 300,
        }
    }
}

/// The typed settings struct consumed throughout C4/C6/C7 (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub rate_limiter: RateLimiterSettings,
    pub time_limiter: TimeLimiterSettings,
    pub parallelism: ParallelismSettings,
    pub memory: MemorySettings,
    pub workflow: WorkflowSettings,
    pub tools: ToolSettings,
    pub template: TemplateCacheSettings,
    /// Anything an embedder passes that this version of Conductor doesn't
    /// recognize yet; preserved rather than rejected.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Resolves credential material: env-var lookup first, then a
/// caller-supplied fallback map (§6). The engine itself never logs secret
/// values.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct EnvSecretResolver {
    pub fallback: HashMap<String, String>,
}

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        std::env::var(name)
            .ok()
            .or_else(|| self.fallback.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_named_values() {
        let config = ConductorConfig::default();
        assert_eq!(config.parallelism.min_tasks_for_parallel_execution, 2);
        assert!((config.parallelism.parallelism_threshold - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.workflow.approval_default_timeout_secs, 300);
        assert_eq!(config.workflow.max_dependency_depth, 20);
        assert_eq!(config.workflow.max_stages, 100);
    }

    #[test]
    fn parses_from_partial_yaml_with_defaults() {
        // Field-name casing is handled by the embedder's own loader in
        // practice; a camelCase key is simply unrecognized and the default
        // takes over rather than the value being applied.
        let yaml_camel = r#"
            retry:
              maxAttempts: 5
        "#;
        let parsed_camel: ConductorConfig = serde_yaml::from_str(yaml_camel).unwrap();
        assert_eq!(parsed_camel.retry.max_attempts, 3);

        let yaml_snake = r#"
            retry:
              max_attempts: 5
        "#;
        let parsed_snake: ConductorConfig = serde_yaml::from_str(yaml_snake).unwrap();
        assert_eq!(parsed_snake.retry.max_attempts, 5);
        assert_eq!(parsed_snake.retry.initial_delay_ms, 100);
    }

    #[test]
    fn env_secret_resolver_prefers_env_over_fallback() {
        std::env::set_var("CONDUCTOR_TEST_SECRET", "from-env");
        let mut resolver = EnvSecretResolver::default();
        resolver.fallback.insert("CONDUCTOR_TEST_SECRET".to_string(), "from-fallback".to_string());
        assert_eq!(resolver.resolve("CONDUCTOR_TEST_SECRET"), Some("from-env".to_string()));
        std::env::remove_var("CONDUCTOR_TEST_SECRET");
    }

    #[test]
    fn env_secret_resolver_falls_back_when_env_absent() {
        let mut resolver = EnvSecretResolver::default();
        resolver.fallback.insert("CONDUCTOR_ONLY_FALLBACK".to_string(), "value".to_string());
        assert_eq!(resolver.resolve("CONDUCTOR_ONLY_FALLBACK"), Some("value".to_string()));
    }
}
