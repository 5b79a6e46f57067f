//! Route resolution for OpenAPI-described HTTP APIs.
//!
//! A spec is flattened into a [`Catalog`] of endpoint templates. A loosely
//! typed request such as `GET /user/42` is then run through a matching
//! cascade (exact, normalized, positional, fuzzy) and bound to the winning
//! template's parameters, producing a [`ResolvedRequest`] that the blocking
//! client can send.

pub mod auth;
pub mod catalog;
pub mod cli;
pub mod client;
pub mod error;
pub mod loader;
pub mod matcher;
pub mod normalize;
pub mod output;
pub mod resolver;

pub use catalog::{
    BodyRequirement, Catalog, EndpointTemplate, HttpMethod, ParamLocation, ParamSpec, SchemaHint,
    SecurityScheme,
};
pub use error::{CatalogError, ErrorKind, NetworkError, ResolveError};
pub use loader::{load_catalog, parse_catalog, parse_openapi};
pub use matcher::{match_route, suggest, MatchCandidate, MatchOutcome, Stage, Suggestion};
pub use resolver::{bind, resolve, RequestArgs, ResolvedRequest};

// =====================
// Public API
// =====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Toon,
    Json,
}

/// Configuration for request execution including timeouts and output format.
#[derive(Debug, Clone)]
pub struct ExecutionConfig<'a> {
    pub output: OutputFormat,
    pub conn_timeout_secs: Option<f64>,
    pub request_timeout_secs: Option<f64>,
    pub user_agent: &'a str,
    pub verbose: bool,
}

impl<'a> ExecutionConfig<'a> {
    #[must_use]
    pub fn new(user_agent: &'a str) -> Self {
        Self {
            output: OutputFormat::Toon,
            conn_timeout_secs: None,
            request_timeout_secs: None,
            user_agent,
            verbose: false,
        }
    }
}

pub use openapiv3;
pub use reqwest;

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== ExecutionConfig tests ====================

    #[test]
    fn test_execution_config_new_defaults() {
        let config = ExecutionConfig::new("test-agent/1.0");
        assert_eq!(config.output, OutputFormat::Toon);
        assert_eq!(config.conn_timeout_secs, None);
        assert_eq!(config.request_timeout_secs, None);
        assert_eq!(config.user_agent, "test-agent/1.0");
        assert!(!config.verbose);
    }

    #[test]
    fn test_execution_config_custom_values() {
        let config = ExecutionConfig {
            output: OutputFormat::Json,
            conn_timeout_secs: Some(5.0),
            request_timeout_secs: Some(2.5),
            user_agent: "custom/1.0",
            verbose: true,
        };
        assert_eq!(config.output, OutputFormat::Json);
        assert_eq!(config.request_timeout_secs, Some(2.5));
        assert!(config.verbose);
    }
}
