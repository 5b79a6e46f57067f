//! The endpoint catalog: an immutable, already-flattened list of the
//! operations an OpenAPI document declares.
//!
//! Templates are built once by the loader and never mutated afterwards. The
//! normalized segment form used by the matcher is computed at construction
//! time so that every resolution only reads it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::CatalogError;
use crate::normalize::{canonicalize, Segment};

/// HTTP verbs an endpoint can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Patch,
    Options,
    Head,
    Trace,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 8] = [
        HttpMethod::Get,
        HttpMethod::Put,
        HttpMethod::Post,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Options,
        HttpMethod::Head,
        HttpMethod::Trace,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Trace => "TRACE",
        }
    }

    /// Whether the verb belongs to the create/update family that
    /// conventionally carries a request payload.
    #[must_use]
    pub fn carries_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    #[must_use]
    pub fn to_http(self) -> http::Method {
        match self {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Delete => http::Method::DELETE,
            HttpMethod::Patch => http::Method::PATCH,
            HttpMethod::Options => http::Method::OPTIONS,
            HttpMethod::Head => http::Method::HEAD,
            HttpMethod::Trace => http::Method::TRACE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CatalogError::UnsupportedMethod {
                method: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
    Body,
}

impl ParamLocation {
    /// Parse the `in` field of a parameter object. Unknown locations fall
    /// back to query, which is where an API is most likely to accept them.
    #[must_use]
    pub fn from_spec(raw: &str) -> Self {
        match raw {
            "path" => ParamLocation::Path,
            "header" => ParamLocation::Header,
            "cookie" => ParamLocation::Cookie,
            "body" | "formData" => ParamLocation::Body,
            _ => ParamLocation::Query,
        }
    }
}

/// Coarse type family of a parameter. Only used to normalize obvious
/// spellings, never to reject a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaHint {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl SchemaHint {
    #[must_use]
    pub fn from_spec(raw: Option<&str>) -> Self {
        match raw {
            Some("integer") => SchemaHint::Integer,
            Some("number") => SchemaHint::Number,
            Some("boolean") => SchemaHint::Boolean,
            Some("object") => SchemaHint::Object,
            Some("array") => SchemaHint::Array,
            _ => SchemaHint::String,
        }
    }

    #[must_use]
    pub fn coerce(self, value: &str) -> String {
        match self {
            SchemaHint::Boolean => match value.trim().to_ascii_lowercase().as_str() {
                "1" | "yes" | "on" | "true" => "true".to_string(),
                "0" | "no" | "off" | "false" => "false".to_string(),
                _ => value.to_string(),
            },
            SchemaHint::Integer | SchemaHint::Number => value.trim().to_string(),
            SchemaHint::String | SchemaHint::Object | SchemaHint::Array => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub schema: SchemaHint,
}

impl ParamSpec {
    #[must_use]
    pub fn new(name: &str, location: ParamLocation) -> Self {
        Self {
            name: name.to_string(),
            location,
            required: location == ParamLocation::Path,
            schema: SchemaHint::default(),
        }
    }

    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    #[must_use]
    pub fn schema(mut self, schema: SchemaHint) -> Self {
        self.schema = schema;
        self
    }
}

/// Whether, and how strictly, an operation declares a request body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyRequirement {
    #[default]
    None,
    Optional,
    Required,
}

/// One declared API operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTemplate {
    method: HttpMethod,
    path: String,
    parameters: Vec<ParamSpec>,
    summary: String,
    operation_id: Option<String>,
    body: BodyRequirement,
    segments: Vec<Segment>,
}

impl EndpointTemplate {
    #[must_use]
    pub fn new(method: HttpMethod, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            parameters: Vec::new(),
            summary: String::new(),
            operation_id: None,
            body: BodyRequirement::None,
            segments: canonicalize(path),
        }
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<ParamSpec>) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = summary.to_string();
        self
    }

    #[must_use]
    pub fn with_operation_id(mut self, operation_id: Option<String>) -> Self {
        self.operation_id = operation_id;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: BodyRequirement) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn parameters(&self) -> &[ParamSpec] {
        &self.parameters
    }

    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    #[must_use]
    pub fn operation_id(&self) -> Option<&str> {
        self.operation_id.as_deref()
    }

    #[must_use]
    pub fn body(&self) -> BodyRequirement {
        self.body
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Case-insensitive lookup of a declared parameter.
    #[must_use]
    pub fn find_param(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Placeholder names in path order.
    pub fn placeholder_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(Segment::placeholder_name)
    }

    /// `METHOD /path`, the form used in suggestions and ambiguity reports.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SecurityScheme {
    Bearer,
    Basic,
    ApiKey { name: String, location: ParamLocation },
    OAuth2,
    OpenIdConnect,
}

/// The full set of operations an OpenAPI document declares, plus document metadata the
/// collaborators around the resolver need.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub title: String,
    pub version: String,
    pub base_url: String,
    pub security_schemes: BTreeMap<String, SecurityScheme>,
    endpoints: Vec<EndpointTemplate>,
}

impl Catalog {
    /// Build a catalog. An empty endpoint list means the loader contract was
    /// violated and is rejected here, so resolution never sees one.
    pub fn new(endpoints: Vec<EndpointTemplate>) -> Result<Self, CatalogError> {
        if endpoints.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self {
            title: String::new(),
            version: String::new(),
            base_url: String::new(),
            security_schemes: BTreeMap::new(),
            endpoints,
        })
    }

    #[must_use]
    pub fn endpoints(&self) -> &[EndpointTemplate] {
        &self.endpoints
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
