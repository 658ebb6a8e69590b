//! Configuration validation.

use crate::config::Config;

/// Validate the configuration.
///
/// Checks for:
/// - A non-empty load balancer description
/// - Health thresholds of at least one
/// - A non-zero probe interval and timeout
/// - Probe jitter no larger than the interval
/// - A known log level
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing every problem.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    if config.load_balancer.description.trim().is_empty() {
        errors.push("load balancer description cannot be empty".to_string());
    }

    let health = &config.health;

    if health.unhealthy_threshold == 0 {
        errors.push("unhealthy_threshold must be >= 1".to_string());
    }

    if health.healthy_threshold == 0 {
        errors.push("healthy_threshold must be >= 1".to_string());
    }

    if health.probe_interval.is_zero() {
        errors.push("probe_interval must be greater than zero".to_string());
    }

    if health.probe_timeout.is_zero() {
        errors.push("probe_timeout must be greater than zero".to_string());
    }

    if health.probe_jitter > health.probe_interval {
        errors.push(format!(
            "probe_jitter ({:?}) must not exceed probe_interval ({:?})",
            health.probe_jitter, health.probe_interval
        ));
    }

    // Validate log level
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_thresholds() {
        let mut config = Config::default();
        config.health.unhealthy_threshold = 0;
        config.health.healthy_threshold = 0;

        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("unhealthy_threshold"));
        assert!(err.contains("healthy_threshold must be"));
    }

    #[test]
    fn test_jitter_exceeds_interval() {
        let mut config = Config::default();
        config.health.probe_interval = Duration::from_secs(1);
        config.health.probe_jitter = Duration::from_secs(2);

        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("probe_jitter"));
    }

    #[test]
    fn test_zero_interval() {
        let mut config = Config::default();
        config.health.probe_interval = Duration::ZERO;
        config.health.probe_jitter = Duration::ZERO;

        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("probe_interval must be greater than zero"));
    }

    #[test]
    fn test_empty_description() {
        let mut config = Config::default();
        config.load_balancer.description = " ".to_string();

        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("description"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.global.log_level = "loud".to_string();

        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("invalid log level"));
    }
}
