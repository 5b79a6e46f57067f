//! Error handling for openroute.

use serde::Serialize;
use thiserror::Error;

use crate::matcher::Stage;

/// Fixed tag carried by every resolution failure.
///
/// The tag is what the output layer prints in the `error` field of the
/// structured error record, so the strings must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NoMatch,
    AmbiguousMatch,
    MissingParameter,
    UnresolvedPlaceholder,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NoMatch => "NO_MATCH",
            ErrorKind::AmbiguousMatch => "AMBIGUOUS_MATCH",
            ErrorKind::MissingParameter => "MISSING_PARAMETER",
            ErrorKind::UnresolvedPlaceholder => "UNRESOLVED_PLACEHOLDER",
        }
    }
}

/// Recoverable outcomes of resolving a request against a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("No endpoint matches '{method} {path}'.{}", did_you_mean(suggestions))]
    NoMatch {
        method: String,
        path: String,
        /// Up to three `METHOD /path` hints, closest first.
        suggestions: Vec<String>,
    },

    #[error("'{method} {path}' matches several endpoints at the {stage} stage: {}", candidates.join(", "))]
    AmbiguousMatch {
        method: String,
        path: String,
        stage: Stage,
        candidates: Vec<String>,
    },

    #[error("Missing required parameter(s): {}", flag_list(names))]
    MissingParameter { names: Vec<String> },

    #[error("Unresolved path placeholder(s): {}", flag_list(names))]
    UnresolvedPlaceholder { names: Vec<String> },
}

impl ResolveError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoMatch { .. } => ErrorKind::NoMatch,
            Self::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            Self::MissingParameter { .. } => ErrorKind::MissingParameter,
            Self::UnresolvedPlaceholder { .. } => ErrorKind::UnresolvedPlaceholder,
        }
    }

    /// Process exit code the CLI uses for this outcome.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        1
    }
}

fn did_you_mean(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" Did you mean: {}?", suggestions.join(", "))
    }
}

fn flag_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("'{n}' (pass it with --{n} <value>)"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Violations of the loader contract. These indicate a broken spec document
/// rather than bad user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("endpoint catalog is empty: the document declares no operations")]
    Empty,

    #[error("unsupported HTTP method: {method}")]
    UnsupportedMethod { method: String },
}

/// Failures while talking to the API.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("invalid request URL: {url}")]
    InvalidUrl { url: String },

    #[error("invalid header: {name}")]
    InvalidHeader { name: String },

    #[error("request timed out")]
    Timeout(#[source] reqwest::Error),

    #[error("connection failed")]
    Connect(#[source] reqwest::Error),

    #[error("HTTP request failed")]
    Request(#[source] reqwest::Error),

    #[error("failed to read response body")]
    ResponseRead(#[source] reqwest::Error),
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout(err)
        } else if err.is_connect() {
            NetworkError::Connect(err)
        } else {
            NetworkError::Request(err)
        }
    }
}

/// A Result type alias for resolution operations.
pub type Result<T> = std::result::Result<T, ResolveError>;
