//! Configuration loading from disk.

use std::path::Path;
use std::fs;
use crate::config::schema::NetConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "config is not valid TOML: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "config rejected: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<NetConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<NetConfig, ConfigError> {
    let config: NetConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:0");
        assert_eq!(config.stream.outbound_credit, 1);
        assert!(config.tls.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse_config(
            r#"
            [loops]
            name = "echo"
            size = 2

            [timeouts]
            connect_ms = 250

            [tls]
            insecure = true

            [http]
            compress = true
            "#,
        )
        .unwrap();

        assert_eq!(config.loops.name, "echo");
        assert_eq!(config.loops.size, Some(2));
        assert_eq!(config.timeouts.connect_ms, 250);
        assert_eq!(config.timeouts.handshake_ms, 10_000);
        assert!(config.tls.as_ref().unwrap().insecure);
        assert!(config.http.compress);
    }

    #[test]
    fn validation_failures_are_reported() {
        let err = parse_config("[stream]\ninbound_credit = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().starts_with("config rejected: "));
        assert!(err.to_string().contains("stream.inbound_credit"));
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        let err = parse_config("[loops\nsize = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().starts_with("config is not valid TOML: "));
    }

    #[test]
    fn missing_file_names_the_read_failure() {
        let err = load_config(Path::new("/nonexistent/netloop.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
        assert!(err.to_string().starts_with("cannot read config file: "));
    }
}
