// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::constants;
use crate::errors::ConfigError;

/// Tuning for a [`crate::transmission::Transmission`].
///
/// Every field has a usable default, so `Config::default()` is a working
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Capacity of the pending-work queue. Zero means "use the default".
    pub pending_work_capacity: usize,
    /// Capacity of the response channel. Zero means "use the default".
    pub response_queue_size: usize,
    /// Wait for room in the pending-work queue instead of failing the event.
    pub block_on_send: bool,
    /// Wait for the consumer instead of dropping responses when the channel is full.
    pub block_on_response: bool,
    /// Largest accepted serialized field data of a single event.
    pub max_event_size_bytes: usize,
    /// Largest uncompressed batch body sent in one request.
    pub max_batch_size_bytes: usize,
    /// Appended to the versioned `User-Agent`, trimmed of surrounding whitespace.
    pub user_agent_addition: Option<String>,
    /// Interval between timer-driven aggregation passes.
    pub batch_timeout: Duration,
    /// Queue length that triggers a pass ahead of the timer.
    pub batch_trigger_size: usize,
    /// Destination batches allowed in flight at once.
    pub max_concurrent_batches: usize,
    /// Timeout of one batch request.
    pub timeout: Duration,
    pub https_proxy: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pending_work_capacity: constants::DEFAULT_PENDING_WORK_CAPACITY,
            response_queue_size: constants::DEFAULT_RESPONSE_QUEUE_SIZE,
            block_on_send: false,
            block_on_response: false,
            max_event_size_bytes: constants::MAX_EVENT_SIZE_BYTES,
            max_batch_size_bytes: constants::MAX_BATCH_SIZE_BYTES,
            user_agent_addition: None,
            batch_timeout: constants::DEFAULT_BATCH_TIMEOUT,
            batch_trigger_size: constants::DEFAULT_BATCH_TRIGGER_SIZE,
            max_concurrent_batches: constants::DEFAULT_MAX_CONCURRENT_BATCHES,
            timeout: constants::DEFAULT_HTTP_TIMEOUT,
            https_proxy: None,
        }
    }
}

impl Config {
    /// Create configuration from `TRANSMISSION_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let pending_work_capacity = parse_env("TRANSMISSION_PENDING_WORK_CAPACITY")
            .unwrap_or(defaults.pending_work_capacity);
        let response_queue_size = parse_env("TRANSMISSION_RESPONSE_QUEUE_SIZE")
            .unwrap_or(defaults.response_queue_size);
        let block_on_send = env_flag("TRANSMISSION_BLOCK_ON_SEND").unwrap_or(false);
        let block_on_response = env_flag("TRANSMISSION_BLOCK_ON_RESPONSE").unwrap_or(false);
        let user_agent_addition = env::var("TRANSMISSION_USER_AGENT_ADDITION")
            .ok()
            .filter(|addition| !addition.trim().is_empty());
        let batch_timeout = parse_env("TRANSMISSION_BATCH_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.batch_timeout);
        let max_concurrent_batches = parse_env("TRANSMISSION_MAX_CONCURRENT_BATCHES")
            .unwrap_or(defaults.max_concurrent_batches);
        let https_proxy = env::var("TRANSMISSION_HTTPS_PROXY")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();

        let config = Self {
            pending_work_capacity,
            response_queue_size,
            block_on_send,
            block_on_response,
            user_agent_addition,
            batch_timeout,
            max_concurrent_batches,
            https_proxy,
            ..defaults
        }
        .normalized();

        config.validate()?;
        Ok(config)
    }

    /// Replaces "unspecified" zero capacities with their defaults.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.pending_work_capacity == 0 {
            self.pending_work_capacity = constants::DEFAULT_PENDING_WORK_CAPACITY;
        }
        if self.response_queue_size == 0 {
            self.response_queue_size = constants::DEFAULT_RESPONSE_QUEUE_SIZE;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_event_size_bytes == 0 {
            return Err(ConfigError::Zero("max_event_size_bytes"));
        }
        if self.max_batch_size_bytes == 0 {
            return Err(ConfigError::Zero("max_batch_size_bytes"));
        }
        if self.max_event_size_bytes > self.max_batch_size_bytes {
            return Err(ConfigError::EventLargerThanBatch {
                event: self.max_event_size_bytes,
                batch: self.max_batch_size_bytes,
            });
        }
        if self.batch_timeout.is_zero() {
            return Err(ConfigError::Zero("batch_timeout"));
        }
        if self.max_concurrent_batches == 0 {
            return Err(ConfigError::Zero("max_concurrent_batches"));
        }
        if let Some(proxy) = &self.https_proxy {
            if reqwest::Proxy::https(proxy.as_str()).is_err() {
                return Err(ConfigError::InvalidProxy(proxy.clone()));
            }
        }
        Ok(())
    }

    /// The full `User-Agent` header value.
    #[must_use]
    pub fn user_agent(&self) -> String {
        match self
            .user_agent_addition
            .as_deref()
            .map(str::trim)
            .filter(|addition| !addition.is_empty())
        {
            Some(addition) => format!("{} {addition}", constants::USER_AGENT_BASE),
            None => constants::USER_AGENT_BASE.to_string(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.trim().parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|value| matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: [&str; 9] = [
        "TRANSMISSION_PENDING_WORK_CAPACITY",
        "TRANSMISSION_RESPONSE_QUEUE_SIZE",
        "TRANSMISSION_BLOCK_ON_SEND",
        "TRANSMISSION_BLOCK_ON_RESPONSE",
        "TRANSMISSION_USER_AGENT_ADDITION",
        "TRANSMISSION_BATCH_TIMEOUT_MS",
        "TRANSMISSION_MAX_CONCURRENT_BATCHES",
        "TRANSMISSION_HTTPS_PROXY",
        "HTTPS_PROXY",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pending_work_capacity, 100);
        assert_eq!(config.response_queue_size, 100);
        assert!(!config.block_on_send);
        assert!(!config.block_on_response);
    }

    #[test]
    fn test_normalized_replaces_zero_capacities() {
        let config = Config {
            pending_work_capacity: 0,
            response_queue_size: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.pending_work_capacity, 100);
        assert_eq!(config.response_queue_size, 100);
    }

    #[test]
    fn test_validate_event_larger_than_batch() {
        let config = Config {
            max_event_size_bytes: 2_000,
            max_batch_size_bytes: 1_000,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::EventLargerThanBatch {
                event: 2_000,
                batch: 1_000
            })
        );
    }

    #[test]
    fn test_validate_zero_values() {
        let config = Config {
            batch_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("batch_timeout")));

        let config = Config {
            max_concurrent_batches: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero("max_concurrent_batches"))
        );
    }

    #[test]
    fn test_validate_invalid_proxy() {
        let config = Config {
            https_proxy: Some("http://[::1".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidProxy(_))
        ));
    }

    #[test]
    fn test_user_agent() {
        let config = Config::default();
        assert_eq!(config.user_agent(), constants::USER_AGENT_BASE);

        let config = Config {
            user_agent_addition: Some("  fancyApp/3 ".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.user_agent(),
            format!("{} fancyApp/3", constants::USER_AGENT_BASE)
        );

        let config = Config {
            user_agent_addition: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(config.user_agent(), constants::USER_AGENT_BASE);
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = Config::from_env().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var("TRANSMISSION_PENDING_WORK_CAPACITY", "500");
        env::set_var("TRANSMISSION_RESPONSE_QUEUE_SIZE", "0");
        env::set_var("TRANSMISSION_BLOCK_ON_SEND", "true");
        env::set_var("TRANSMISSION_BLOCK_ON_RESPONSE", "FALSE");
        env::set_var("TRANSMISSION_USER_AGENT_ADDITION", "myapp/1.2");
        env::set_var("TRANSMISSION_BATCH_TIMEOUT_MS", "250");
        env::set_var("HTTPS_PROXY", "http://proxy.example.com:3128");

        let config = Config::from_env().unwrap();
        clear_env();

        assert_eq!(config.pending_work_capacity, 500);
        assert_eq!(config.response_queue_size, 100);
        assert!(config.block_on_send);
        assert!(!config.block_on_response);
        assert_eq!(config.user_agent_addition.as_deref(), Some("myapp/1.2"));
        assert_eq!(config.batch_timeout, Duration::from_millis(250));
        assert_eq!(
            config.https_proxy.as_deref(),
            Some("http://proxy.example.com:3128")
        );
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_unparsable_numbers() {
        clear_env();
        env::set_var("TRANSMISSION_PENDING_WORK_CAPACITY", "lots");
        let config = Config::from_env().unwrap();
        clear_env();
        assert_eq!(config.pending_work_capacity, 100);
    }
}
