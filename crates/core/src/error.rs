//! Core error types for the Felarr domain

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FelarrError {
    /// The persistent store could not complete an operation. Fatal to the
    /// current operation; callers surface it to the user.
    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// The request never produced an HTTP response (connect, DNS, timeout).
    #[error("Transport error from {service}: {error}")]
    Transport { service: String, error: String },

    /// The service answered with HTTP >= 400. Never retried.
    #[error("Protocol error from {service}: status {status}")]
    Protocol {
        service: String,
        status: u16,
        body_excerpt: String,
    },

    /// The service answered but the payload could not be decoded.
    #[error("Malformed response from {service}: {error}")]
    Malformed { service: String, error: String },

    /// Informational miss, not a failure.
    #[error("Not found: {entity}")]
    NotFound { entity: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Domain validation error: {field} - {message}")]
    ValidationError { field: String, message: String },

    #[error("Configuration error: {field} - {message}")]
    ConfigurationError { field: String, message: String },
}

impl FelarrError {
    /// Transport error helper used by every HTTP client.
    pub fn transport(service: impl Into<String>, error: impl std::fmt::Display) -> Self {
        FelarrError::Transport {
            service: service.into(),
            error: error.to_string(),
        }
    }

    /// Protocol error helper; keeps at most the first 200 bytes of the
    /// body, cut on a character boundary so multibyte bodies cannot
    /// panic the caller.
    pub fn protocol(service: impl Into<String>, status: u16, body: &str) -> Self {
        let excerpt = if body.len() > 200 {
            let mut end = 200;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body[..end].to_string()
        } else {
            body.to_string()
        };
        FelarrError::Protocol {
            service: service.into(),
            status,
            body_excerpt: excerpt,
        }
    }

    pub fn malformed(service: impl Into<String>, error: impl std::fmt::Display) -> Self {
        FelarrError::Malformed {
            service: service.into(),
            error: error.to_string(),
        }
    }

    pub fn store(message: impl std::fmt::Display) -> Self {
        FelarrError::StoreUnavailable {
            message: message.to_string(),
        }
    }

    /// True when the failure is a transport-level one eligible for the
    /// single immediate retry the download client performs.
    pub fn is_transport(&self) -> bool {
        matches!(self, FelarrError::Transport { .. })
    }
}

pub type Result<T> = std::result::Result<T, FelarrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_excerpt_is_truncated() {
        let body = "x".repeat(500);
        match FelarrError::protocol("plex", 500, &body) {
            FelarrError::Protocol { body_excerpt, .. } => assert_eq!(body_excerpt.len(), 200),
            _ => panic!("expected protocol error"),
        }
    }

    #[test]
    fn protocol_excerpt_respects_char_boundaries() {
        // 3-byte characters; byte 200 lands mid-character
        let body = "€".repeat(100);
        match FelarrError::protocol("tracker", 502, &body) {
            FelarrError::Protocol { body_excerpt, .. } => {
                assert_eq!(body_excerpt.len(), 198);
                assert!(body_excerpt.chars().all(|c| c == '€'));
            }
            _ => panic!("expected protocol error"),
        }
    }

    #[test]
    fn transport_is_distinguishable() {
        let err = FelarrError::transport("qbittorrent", "connection refused");
        assert!(err.is_transport());
        assert!(!FelarrError::NotFound {
            entity: "movie".into()
        }
        .is_transport());
    }
}
