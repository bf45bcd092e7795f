//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{CommandsConfig, HeraldConfig, LogOutput, LoggingConfig, RuntimeConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &HeraldConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_commands_config(&config.commands)?;
    validate_runtime_config(&config.runtime)?;

    if config.handler.handler_timeout.is_some_and(|t| t.is_zero()) {
        return Err(ConfigError::validation(
            "handler.handler_timeout_ms must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }

    if logging.filters.keys().any(|module| module.trim().is_empty()) {
        return Err(ConfigError::validation("Log filter module cannot be empty"));
    }

    Ok(())
}

fn validate_commands_config(commands: &CommandsConfig) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for prefix in &commands.prefixes {
        if prefix.is_empty() {
            return Err(ConfigError::validation("Command prefixes cannot be empty"));
        }
        if !seen.insert(prefix) {
            return Err(ConfigError::validation(format!(
                "Duplicate command prefix: {prefix}"
            )));
        }
    }

    if commands.owners.iter().any(|owner| owner.trim().is_empty()) {
        return Err(ConfigError::validation("Owner ids cannot be empty"));
    }

    Ok(())
}

fn validate_runtime_config(runtime: &RuntimeConfig) -> ConfigResult<()> {
    if runtime.channel_capacity == 0 {
        return Err(ConfigError::validation(
            "runtime.channel_capacity must be greater than 0",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&HeraldConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_empty_prefix() {
        let mut config = HeraldConfig::default();
        config.commands.prefixes = vec!["!".into(), String::new()];
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_no_prefixes_is_allowed() {
        let mut config = HeraldConfig::default();
        config.commands.prefixes.clear();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = HeraldConfig::default();
        config.handler.handler_timeout = Some(Duration::ZERO);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = HeraldConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
        config.logging.file_path = Some("herald.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_capacity() {
        let mut config = HeraldConfig::default();
        config.runtime.channel_capacity = 0;
        assert!(validate_config(&config).is_err());
    }
}
