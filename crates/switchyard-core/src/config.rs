//! switchyard.toml configuration parser.
//!
//! Every section is optional except `[environments.blue]` and
//! `[environments.green]`; missing values fall back to the defaults of the
//! runtime settings types.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchyardConfig {
    pub orchestrator: Option<OrchestratorSection>,
    pub health: Option<HealthSection>,
    pub smoke: Option<SmokeSection>,
    pub traffic: Option<TrafficSection>,
    pub router: Option<RouterSection>,
    pub migration: Option<MigrationSection>,
    pub environments: EnvironmentsSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorSection {
    pub initial_active: Option<String>,
    pub deployment_timeout: Option<String>,
    pub validation_settle: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthSection {
    pub probe_timeout: Option<String>,
    pub check_timeout: Option<String>,
    pub history_limit: Option<usize>,
    pub integrations: Option<Vec<String>>,
    pub max_attempts: Option<u32>,
    pub retry_delay: Option<String>,
    pub exponential_backoff: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmokeSection {
    pub endpoints: Option<Vec<String>>,
    pub webhook_path: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficSection {
    pub gradual: Option<bool>,
    pub steps: Option<Vec<u8>>,
    pub step_settle: Option<String>,
    pub validate_each_step: Option<bool>,
    pub auto_rollback: Option<bool>,
    pub warmup_paths: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterSection {
    /// Admin endpoint that receives `{"blue": n, "green": m}` weight updates.
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationSection {
    pub run: Option<Vec<String>>,
    pub validate: Option<Vec<String>>,
    pub compatibility: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentsSection {
    pub blue: EnvironmentSection,
    pub green: EnvironmentSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentSection {
    pub base_url: String,
    pub database_url: Option<String>,
    pub cache_url: Option<String>,
    pub health_path: Option<String>,
    pub readiness_path: Option<String>,
    pub max_response_time_ms: Option<u64>,
    pub max_error_rate: Option<f64>,
    pub min_success_rate: Option<f64>,
}

impl SwitchyardConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> CoreResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Build a validated runtime config from the file contents.
    pub fn orchestrator_config(&self) -> CoreResult<OrchestratorConfig> {
        let mut config = OrchestratorConfig::new(
            self.environment_config(Environment::Blue),
            self.environment_config(Environment::Green),
        );

        if let Some(section) = &self.orchestrator {
            if let Some(active) = &section.initial_active {
                config.initial_active = active.parse()?;
            }
            if let Some(timeout) = &section.deployment_timeout {
                config.deployment_timeout = require_duration(timeout)?;
            }
            if let Some(settle) = &section.validation_settle {
                config.validation_settle = require_duration(settle)?;
            }
        }

        if let Some(section) = &self.health {
            if let Some(t) = &section.probe_timeout {
                config.health.probe_timeout = require_duration(t)?;
            }
            if let Some(t) = &section.check_timeout {
                config.health.check_timeout = require_duration(t)?;
            }
            if let Some(limit) = section.history_limit {
                config.health.history_limit = limit;
            }
            if let Some(integrations) = &section.integrations {
                config.health.integrations = integrations.clone();
            }
            if let Some(attempts) = section.max_attempts {
                config.retry.max_attempts = attempts;
            }
            if let Some(delay) = &section.retry_delay {
                config.retry.delay = require_duration(delay)?;
            }
            if let Some(exponential) = section.exponential_backoff {
                config.retry.exponential = exponential;
            }
        }

        if let Some(section) = &self.smoke {
            if let Some(endpoints) = &section.endpoints {
                config.smoke.endpoints = endpoints.clone();
            }
            if let Some(path) = &section.webhook_path {
                config.smoke.webhook_path = path.clone();
            }
            if let Some(t) = &section.timeout {
                config.smoke.timeout = require_duration(t)?;
            }
        }

        if let Some(section) = &self.traffic {
            let plan = &mut config.plan;
            if let Some(gradual) = section.gradual {
                plan.gradual = gradual;
            }
            if let Some(steps) = &section.steps {
                plan.steps = steps.clone();
            }
            if let Some(settle) = &section.step_settle {
                plan.step_settle = require_duration(settle)?;
            }
            if let Some(validate) = section.validate_each_step {
                plan.validate_each_step = validate;
            }
            if let Some(auto) = section.auto_rollback {
                plan.auto_rollback = auto;
            }
            if let Some(paths) = &section.warmup_paths {
                plan.warmup_paths = paths.clone();
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn environment_config(&self, env: Environment) -> EnvironmentConfig {
        let section = match env {
            Environment::Blue => &self.environments.blue,
            Environment::Green => &self.environments.green,
        };
        let mut config = EnvironmentConfig::new(env, section.base_url.clone());
        if let Some(url) = &section.database_url {
            config.database_url = url.clone();
        }
        if let Some(url) = &section.cache_url {
            config.cache_url = url.clone();
        }
        if let Some(path) = &section.health_path {
            config.health_path = path.clone();
        }
        if let Some(path) = &section.readiness_path {
            config.readiness_path = path.clone();
        }
        if let Some(ms) = section.max_response_time_ms {
            config.max_response_time_ms = ms;
        }
        if let Some(rate) = section.max_error_rate {
            config.max_error_rate = rate;
        }
        if let Some(rate) = section.min_success_rate {
            config.min_success_rate = rate;
        }
        config
    }

    /// A starter switchyard.toml for two local stacks.
    pub fn scaffold() -> Self {
        let env = |port: u16, db: &str| EnvironmentSection {
            base_url: format!("http://127.0.0.1:{port}"),
            database_url: Some(format!("postgres://app@127.0.0.1:5432/{db}")),
            cache_url: Some("redis://127.0.0.1:6379/0".to_string()),
            health_path: Some("/health".to_string()),
            readiness_path: Some("/health/ready".to_string()),
            max_response_time_ms: Some(2000),
            max_error_rate: Some(0.05),
            min_success_rate: Some(0.99),
        };

        SwitchyardConfig {
            orchestrator: Some(OrchestratorSection {
                initial_active: Some("blue".to_string()),
                deployment_timeout: Some("300s".to_string()),
                validation_settle: Some("5s".to_string()),
            }),
            health: Some(HealthSection {
                probe_timeout: Some("2s".to_string()),
                check_timeout: Some("10s".to_string()),
                history_limit: Some(100),
                integrations: Some(vec!["crm".to_string()]),
                max_attempts: Some(3),
                retry_delay: Some("2s".to_string()),
                exponential_backoff: Some(false),
            }),
            smoke: None,
            traffic: Some(TrafficSection {
                gradual: Some(true),
                steps: Some(vec![10, 50, 100]),
                step_settle: Some("5s".to_string()),
                validate_each_step: Some(true),
                auto_rollback: Some(true),
                warmup_paths: None,
            }),
            router: None,
            migration: None,
            environments: EnvironmentsSection {
                blue: env(8001, "app_blue"),
                green: env(8002, "app_green"),
            },
        }
    }
}

/// Parse a duration string like "5s", "500ms", "2m", or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn require_duration(s: &str) -> CoreResult<Duration> {
    parse_duration(s).ok_or_else(|| CoreError::InvalidDuration(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[environments.blue]
base_url = "http://blue.internal:8000"

[environments.green]
base_url = "http://green.internal:8000"
"#;

    #[test]
    fn parse_duration_seconds() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("300s"), Some(Duration::from_secs(300)));
    }

    #[test]
    fn parse_duration_milliseconds() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
    }

    #[test]
    fn parse_duration_minutes() {
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration(&format!("{}m", u64::MAX)), None);
    }

    #[test]
    fn parse_duration_plain_number_as_seconds() {
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = SwitchyardConfig::parse(MINIMAL).unwrap();
        let runtime = config.orchestrator_config().unwrap();

        assert_eq!(runtime.initial_active, Environment::Blue);
        assert_eq!(runtime.plan.steps, vec![10, 50, 100]);
        assert_eq!(runtime.retry.max_attempts, 3);
        assert_eq!(runtime.green.health_path, "/health");
        assert_eq!(runtime.green.environment, Environment::Green);
        assert_eq!(runtime.deployment_timeout, Duration::from_secs(300));
    }

    #[test]
    fn sections_override_defaults() {
        let content = format!(
            r#"
[orchestrator]
initial_active = "green"
deployment_timeout = "2m"

[health]
max_attempts = 5
retry_delay = "500ms"
integrations = ["crm", "payments"]

[traffic]
gradual = false
steps = [25, 100]
auto_rollback = false
{MINIMAL}"#
        );
        let runtime = SwitchyardConfig::parse(&content)
            .unwrap()
            .orchestrator_config()
            .unwrap();

        assert_eq!(runtime.initial_active, Environment::Green);
        assert_eq!(runtime.deployment_timeout, Duration::from_secs(120));
        assert_eq!(runtime.retry.max_attempts, 5);
        assert_eq!(runtime.retry.delay, Duration::from_millis(500));
        assert_eq!(runtime.health.integrations, vec!["crm", "payments"]);
        assert!(!runtime.plan.gradual);
        assert!(!runtime.plan.auto_rollback);
        assert_eq!(runtime.plan.steps, vec![25, 100]);
    }

    #[test]
    fn invalid_plan_is_rejected() {
        let content = format!("[traffic]\nsteps = [10, 50]\n{MINIMAL}");
        let err = SwitchyardConfig::parse(&content)
            .unwrap()
            .orchestrator_config()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPlan(_)));
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let content = format!("[orchestrator]\ndeployment_timeout = \"forever\"\n{MINIMAL}");
        let err = SwitchyardConfig::parse(&content)
            .unwrap()
            .orchestrator_config()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidDuration(_)));
    }

    #[test]
    fn overflowing_minutes_are_rejected() {
        let content = format!("[orchestrator]\ndeployment_timeout = \"{}m\"\n{MINIMAL}", u64::MAX / 2);
        let err = SwitchyardConfig::parse(&content)
            .unwrap()
            .orchestrator_config()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidDuration(_)));
    }

    #[test]
    fn missing_environment_fails_to_parse() {
        let content = "[environments.blue]\nbase_url = \"http://blue\"\n";
        assert!(SwitchyardConfig::parse(content).is_err());
    }

    #[test]
    fn scaffold_roundtrips_through_toml() {
        let rendered = SwitchyardConfig::scaffold().to_toml_string().unwrap();
        let parsed = SwitchyardConfig::parse(&rendered).unwrap();
        let runtime = parsed.orchestrator_config().unwrap();
        assert_eq!(runtime.blue.base_url, "http://127.0.0.1:8001");
        assert_eq!(runtime.green.base_url, "http://127.0.0.1:8002");
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchyard.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = SwitchyardConfig::from_file(&path).unwrap();
        assert_eq!(config.environments.green.base_url, "http://green.internal:8000");

        let missing = SwitchyardConfig::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(CoreError::Io { .. })));
    }
}
