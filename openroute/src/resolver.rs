//! Parameter binding: turn a matched template plus the user's named flags,
//! positional captures and body into a concrete request description.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::{BodyRequirement, Catalog, EndpointTemplate, HttpMethod, ParamLocation};
use crate::error::{ResolveError, Result};
use crate::matcher::{match_route, MatchCandidate, MatchOutcome};
use crate::normalize::normalize_placeholder;

/// Flags owned by the command line itself. They are never bound to an
/// endpoint parameter.
pub const RESERVED_FLAGS: &[&str] = &[
    "body",
    "spec",
    "json",
    "json-output",
    "token",
    "api-key",
    "username",
    "password",
    "config-dir",
    "base-url",
    "timeout",
    "conn-timeout",
    "verbose",
];

#[must_use]
pub fn is_reserved_flag(name: &str) -> bool {
    RESERVED_FLAGS.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// Raw arguments from the parsing layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestArgs {
    /// `--name value` pairs in the order given.
    pub flags: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RequestArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_flag(mut self, name: &str, value: &str) -> Self {
        self.flags.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// Case-insensitive flag lookup; a repeated flag resolves to its last
    /// occurrence.
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<&str> {
        self.flags
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A request ready for the HTTP executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRequest<'c> {
    #[serde(skip)]
    pub template: &'c EndpointTemplate,
    pub method: HttpMethod,
    /// Template path with every placeholder substituted.
    pub path: String,
    pub path_values: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    /// Passed through unparsed.
    pub body: Option<String>,
}

/// Match `(method, path)` against the catalog and bind the arguments to the
/// winning template.
pub fn resolve<'c>(
    catalog: &'c Catalog,
    method: HttpMethod,
    path: &str,
    args: &RequestArgs,
) -> Result<ResolvedRequest<'c>> {
    match match_route(catalog, method, path) {
        MatchOutcome::Matched(candidate) => {
            debug!(
                stage = %candidate.stage,
                template = %candidate.template.describe(),
                score = candidate.score,
                "route matched"
            );
            bind(&candidate, args)
        }
        MatchOutcome::Ambiguous { stage, candidates } => Err(ResolveError::AmbiguousMatch {
            method: method.to_string(),
            path: path.to_string(),
            stage,
            candidates: candidates.iter().map(|t| t.describe()).collect(),
        }),
        MatchOutcome::NoMatch { suggestions } => Err(ResolveError::NoMatch {
            method: method.to_string(),
            path: path.to_string(),
            suggestions: suggestions.iter().map(|s| s.template.describe()).collect(),
        }),
    }
}

/// Bind arguments to a matched template.
///
/// Path placeholders take a positional capture first, then a flag of the
/// same name. Every unresolved placeholder is reported together; only when
/// all placeholders are bound are the remaining required parameters checked,
/// again reporting every missing name at once.
pub fn bind<'c>(candidate: &MatchCandidate<'c>, args: &RequestArgs) -> Result<ResolvedRequest<'c>> {
    let template = candidate.template;
    let mut path_values: BTreeMap<String, String> = BTreeMap::new();
    let mut query: BTreeMap<String, String> = BTreeMap::new();
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    let mut cookies: BTreeMap<String, String> = BTreeMap::new();
    let mut unresolved: Vec<String> = Vec::new();

    for name in template.placeholder_names() {
        if path_values.contains_key(name) || unresolved.iter().any(|u| u == name) {
            continue;
        }
        let value = match (candidate.capture(name), args.flag(name)) {
            (Some(captured), Some(flag)) => {
                if captured != flag {
                    warn!(
                        placeholder = name,
                        captured,
                        flag,
                        "path value given both positionally and as a flag, using the positional one"
                    );
                }
                decode_capture(captured)
            }
            (Some(captured), None) => decode_capture(captured),
            (None, Some(flag)) => coerce(template, name, flag),
            (None, None) => {
                unresolved.push(name.to_string());
                continue;
            }
        };
        path_values.insert(name.to_string(), value);
    }

    for (name, value) in &args.flags {
        if is_reserved_flag(name) || template.placeholder_names().any(|p| p.eq_ignore_ascii_case(name)) {
            continue;
        }
        match template.find_param(name) {
            Some(param) => {
                let value = param.schema.coerce(value);
                match param.location {
                    ParamLocation::Query => {
                        query.insert(param.name.clone(), value);
                    }
                    ParamLocation::Header => {
                        headers.insert(param.name.clone(), value);
                    }
                    ParamLocation::Cookie => {
                        cookies.insert(param.name.clone(), value);
                    }
                    ParamLocation::Path => {
                        path_values.insert(param.name.clone(), value);
                    }
                    ParamLocation::Body => {
                        debug!(flag = %name, "body parameter given as a flag, ignoring (use --body)");
                    }
                }
            }
            None => {
                query.insert(name.clone(), value.clone());
            }
        }
    }

    if !unresolved.is_empty() {
        return Err(ResolveError::UnresolvedPlaceholder { names: unresolved });
    }

    let mut missing: Vec<String> = template
        .parameters()
        .iter()
        .filter(|p| p.required)
        .filter(|p| match p.location {
            ParamLocation::Path => !path_values.contains_key(&p.name),
            ParamLocation::Query => !query.contains_key(&p.name),
            ParamLocation::Header => !headers.contains_key(&p.name),
            ParamLocation::Cookie => !cookies.contains_key(&p.name),
            ParamLocation::Body => false,
        })
        .map(|p| p.name.clone())
        .collect();
    if template.body() == BodyRequirement::Required && args.body.is_none() {
        missing.push("body".to_string());
    }
    if !missing.is_empty() {
        return Err(ResolveError::MissingParameter { names: missing });
    }

    if args.body.is_some() && !template.method().carries_body() {
        debug!(method = %template.method(), "sending a body with a method that usually has none");
    }
    if !cookies.is_empty() {
        let cookie = cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        headers.insert("Cookie".to_string(), cookie);
    }

    Ok(ResolvedRequest {
        template,
        method: template.method(),
        path: substitute_path(template.path(), &path_values),
        path_values,
        query,
        headers,
        body: args.body.clone(),
    })
}

fn coerce(template: &EndpointTemplate, name: &str, value: &str) -> String {
    template
        .find_param(name)
        .map_or_else(|| value.to_string(), |p| p.schema.coerce(value))
}

/// A captured segment is path text the user typed, so `%2F` and friends are
/// read back to the value they stand for.
fn decode_capture(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), Cow::into_owned)
}

/// Replace placeholder segments of any delimiter style with their bound
/// values, leaving the rest of the template untouched. Each value is
/// percent-encoded so it stays inside its own segment.
#[must_use]
pub fn substitute_path(template: &str, values: &BTreeMap<String, String>) -> String {
    template
        .split('/')
        .map(|segment| {
            normalize_placeholder(segment)
                .name
                .and_then(|name| values.get(&name))
                .map_or_else(|| segment.to_string(), |v| urlencoding::encode(v).into_owned())
        })
        .collect::<Vec<_>>()
        .join("/")
}
