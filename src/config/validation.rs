//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes, credits and timeouts > 0)
//! - Check that addresses parse
//! - Check that TLS material is configured in pairs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: NetConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{NetConfig, MAX_UDP_PAYLOAD};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &NetConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.loops.size == Some(0) {
        errors.push(ValidationError::new("loops.size", "must be at least 1"));
    }
    if config.loops.name.is_empty() {
        errors.push(ValidationError::new("loops.name", "must not be empty"));
    }

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be at least 1"));
    }
    if config.listener.backlog == 0 {
        errors.push(ValidationError::new("listener.backlog", "must be at least 1"));
    }

    if config.timeouts.connect_ms == 0 {
        errors.push(ValidationError::new("timeouts.connect_ms", "must be greater than 0"));
    }
    if config.timeouts.handshake_ms == 0 {
        errors.push(ValidationError::new("timeouts.handshake_ms", "must be greater than 0"));
    }

    if config.stream.read_buffer_size == 0 {
        errors.push(ValidationError::new("stream.read_buffer_size", "must be greater than 0"));
    }
    if config.stream.inbound_credit == 0 {
        errors.push(ValidationError::new("stream.inbound_credit", "must be at least 1"));
    }
    if config.stream.outbound_credit == 0 {
        errors.push(ValidationError::new("stream.outbound_credit", "must be at least 1"));
    }

    if let Some(tls) = &config.tls {
        if tls.cert_path.is_some() != tls.key_path.is_some() {
            errors.push(ValidationError::new(
                "tls.cert_path",
                "cert_path and key_path must be set together",
            ));
        }
        if tls.cert_path.is_none() && tls.self_signed_names.is_empty() {
            errors.push(ValidationError::new(
                "tls.self_signed_names",
                "needs at least one name when no certificate is configured",
            ));
        }
        if tls.server_name.is_empty() {
            errors.push(ValidationError::new("tls.server_name", "must not be empty"));
        }
    }

    check_address(&mut errors, "udp.bind_address", &config.udp.bind_address);
    if config.udp.max_datagram_size == 0 || config.udp.max_datagram_size > MAX_UDP_PAYLOAD {
        errors.push(ValidationError::new(
            "udp.max_datagram_size",
            format!("must be between 1 and {MAX_UDP_PAYLOAD}"),
        ));
    }
    if config.udp.inbound_credit == 0 {
        errors.push(ValidationError::new("udp.inbound_credit", "must be at least 1"));
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if let Err(e) = value.parse::<SocketAddr>() {
        errors.push(ValidationError::new(field, format!("invalid socket address '{value}': {e}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TlsConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&NetConfig::default()).is_ok());
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = NetConfig::default();
        config.loops.size = Some(0);
        config.timeouts.connect_ms = 0;
        config.listener.bind_address = "not-an-address".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["loops.size", "listener.bind_address", "timeouts.connect_ms"]
        );
    }

    #[test]
    fn tls_material_must_be_paired() {
        let mut config = NetConfig::default();
        config.tls = Some(TlsConfig {
            cert_path: Some("cert.pem".into()),
            ..TlsConfig::default()
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "tls.cert_path");
    }

    #[test]
    fn datagram_limit_is_bounded() {
        let mut config = NetConfig::default();
        config.udp.max_datagram_size = MAX_UDP_PAYLOAD + 1;
        assert!(validate_config(&config).is_err());
    }
}
