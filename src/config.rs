//! Process-wide settings shared by the web process and every worker
//!
//! The serving process and the worker pool communicate only through the
//! broker, so both sides must be built from compatible settings. A
//! `Settings` value is constructed once at startup and passed by reference
//! to everything that needs it; there is no global mutable state.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{TaskError, TaskResult};

/// The only serializer this crate speaks
pub const JSON_SERIALIZER: &str = "json";

/// The content type carried in every task message
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Immutable configuration for both process types
#[derive(Debug, Clone)]
pub struct Settings {
    /// Redis URL the broker client connects to
    pub broker_url: String,
    /// Redis URL for the result backend (usually the same instance)
    pub result_backend_url: String,
    /// Serializer name for task messages
    pub task_serializer: String,
    /// Serializer name for task results
    pub result_serializer: String,
    /// Content types workers will accept
    pub accept_content: Vec<String>,
    /// Queue tasks are enqueued to by default
    pub default_queue: String,
    /// Task result TTL in seconds
    pub result_ttl: u64,
    /// Address the HTTP server binds to
    pub http_bind: SocketAddr,
    /// How long the demonstration task sleeps
    pub work_duration: Duration,
    /// Where the demonstration task writes its report
    pub report_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker_url: "redis://127.0.0.1:6379".to_string(),
            result_backend_url: "redis://127.0.0.1:6379".to_string(),
            task_serializer: JSON_SERIALIZER.to_string(),
            result_serializer: JSON_SERIALIZER.to_string(),
            accept_content: vec![JSON_CONTENT_TYPE.to_string()],
            default_queue: "default".to_string(),
            result_ttl: 86400, // 24 hours
            http_bind: ([127, 0, 0, 1], 8000).into(),
            work_duration: Duration::from_secs(10),
            report_path: PathBuf::from("task_report.txt"),
        }
    }
}

impl Settings {
    /// Build settings from `WTQ_*` environment variables over the defaults.
    ///
    /// Both process types read the same variables, which keeps the broker
    /// configuration identical across them.
    pub fn from_env() -> TaskResult<Self> {
        let defaults = Self::default();

        let http_bind = match env_var("WTQ_HTTP_BIND") {
            Some(raw) => raw
                .parse()
                .map_err(|_| TaskError::config(format!("invalid WTQ_HTTP_BIND: {raw}")))?,
            None => defaults.http_bind,
        };

        let work_duration = match env_var("WTQ_WORK_DURATION_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    TaskError::config(format!("invalid WTQ_WORK_DURATION_SECS: {raw}"))
                })?;
                Duration::from_secs(secs)
            }
            None => defaults.work_duration,
        };

        let result_ttl = match env_var("WTQ_RESULT_TTL_SECS") {
            Some(raw) => raw
                .parse()
                .map_err(|_| TaskError::config(format!("invalid WTQ_RESULT_TTL_SECS: {raw}")))?,
            None => defaults.result_ttl,
        };

        let broker_url = env_var("WTQ_BROKER_URL").unwrap_or(defaults.broker_url);
        let settings = Self {
            // The result backend follows the broker unless overridden.
            result_backend_url: env_var("WTQ_RESULT_BACKEND_URL").unwrap_or_else(|| broker_url.clone()),
            broker_url,
            task_serializer: env_var("WTQ_TASK_SERIALIZER").unwrap_or(defaults.task_serializer),
            result_serializer: env_var("WTQ_RESULT_SERIALIZER").unwrap_or(defaults.result_serializer),
            accept_content: env_var("WTQ_ACCEPT_CONTENT")
                .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.accept_content),
            default_queue: env_var("WTQ_DEFAULT_QUEUE").unwrap_or(defaults.default_queue),
            result_ttl,
            http_bind,
            work_duration,
            report_path: env_var("WTQ_REPORT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.report_path),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the pipeline cannot honor.
    ///
    /// Serializer and content-type mismatches between producer and worker
    /// would only surface as undecodable messages at dequeue time, so they
    /// are refused at startup instead.
    pub fn validate(&self) -> TaskResult<()> {
        if self.task_serializer != JSON_SERIALIZER {
            return Err(TaskError::config(format!(
                "unsupported task serializer: {} (only {JSON_SERIALIZER} is supported)",
                self.task_serializer
            )));
        }
        if self.result_serializer != JSON_SERIALIZER {
            return Err(TaskError::config(format!(
                "unsupported result serializer: {} (only {JSON_SERIALIZER} is supported)",
                self.result_serializer
            )));
        }
        if !self.accept_content.iter().any(|c| c == JSON_CONTENT_TYPE) {
            return Err(TaskError::config(format!(
                "accepted content types must include {JSON_CONTENT_TYPE}, got {:?}",
                self.accept_content
            )));
        }
        if self.default_queue.is_empty() {
            return Err(TaskError::config("default queue name must not be empty"));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.task_serializer, "json");
        assert_eq!(settings.accept_content, vec!["application/json"]);
        assert_eq!(settings.work_duration, Duration::from_secs(10));
    }

    #[test]
    fn rejects_unknown_task_serializer() {
        let settings = Settings {
            task_serializer: "pickle".to_string(),
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, TaskError::Config { .. }));
    }

    #[test]
    fn rejects_incompatible_accept_content() {
        let settings = Settings {
            accept_content: vec!["application/x-yaml".to_string()],
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_empty_queue_name() {
        let settings = Settings {
            default_queue: String::new(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        std::env::set_var("WTQ_DEFAULT_QUEUE", "reports");
        std::env::set_var("WTQ_WORK_DURATION_SECS", "3");
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.default_queue, "reports");
        assert_eq!(settings.work_duration, Duration::from_secs(3));
        std::env::remove_var("WTQ_DEFAULT_QUEUE");
        std::env::remove_var("WTQ_WORK_DURATION_SECS");
    }
}
