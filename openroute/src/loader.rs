//! Spec loading: read an OpenAPI 3.x or Swagger 2.0 document from disk or
//! over HTTP and flatten it into a [`Catalog`].

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use openapiv3::{OpenAPI, Parameter, ParameterSchemaOrContent, ReferenceOr};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::{
    BodyRequirement, Catalog, EndpointTemplate, HttpMethod, ParamLocation, ParamSpec, SchemaHint,
    SecurityScheme,
};

const FETCH_TIMEOUT_SECS: u64 = 30;

/// Load a spec from a file path or `http(s)` URL and build its catalog.
pub fn load_catalog(reference: &str) -> Result<Catalog> {
    let text = load_spec_text(reference)?;
    parse_catalog(&text, Some(reference))
}

/// Read the raw document text behind a reference.
pub fn load_spec_text(reference: &str) -> Result<String> {
    if is_url(reference) {
        debug!(url = reference, "fetching spec");
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        let resp = client
            .get(reference)
            .send()
            .with_context(|| format!("Failed to fetch spec from {reference}"))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("Fetching spec from {reference} returned HTTP {status}"));
        }
        resp.text()
            .with_context(|| format!("Failed to read spec body from {reference}"))
    } else {
        std::fs::read_to_string(reference)
            .with_context(|| format!("Failed to read spec file: {reference}"))
    }
}

/// Parse OpenAPI 3.x from YAML or JSON string.
pub fn parse_openapi(spec: &str) -> Result<OpenAPI> {
    // Try YAML first, then JSON
    if let Ok(api) = serde_yaml::from_str::<OpenAPI>(spec) {
        return Ok(api);
    }
    serde_json::from_str::<OpenAPI>(spec)
        .context("Failed to parse OpenAPI as YAML, and also failed to parse as JSON")
}

fn parse_document(spec: &str) -> Result<Value> {
    if let Ok(value) = serde_yaml::from_str::<Value>(spec) {
        return Ok(value);
    }
    serde_json::from_str::<Value>(spec)
        .context("Failed to parse spec document as YAML, and also failed to parse as JSON")
}

/// Build a catalog from document text. `reference` is where the text came
/// from; a URL reference anchors a relative server URL.
pub fn parse_catalog(text: &str, reference: Option<&str>) -> Result<Catalog> {
    let raw = parse_document(text)?;
    let is_swagger2 = raw
        .get("swagger")
        .and_then(Value::as_str)
        .is_some_and(|v| v.starts_with('2'));

    let mut catalog = if is_swagger2 {
        swagger2_catalog(&raw)?
    } else {
        openapi3_catalog(&parse_openapi(text)?)?
    };
    if let Some(reference) = reference {
        catalog.base_url = resolve_base_url(&catalog.base_url, reference);
    }
    info!(
        title = %catalog.title,
        endpoints = catalog.len(),
        base_url = %catalog.base_url,
        "spec loaded"
    );
    Ok(catalog)
}

fn is_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Anchor a relative server URL (e.g. `/api/v3`) at the origin of the URL
/// the document was fetched from.
#[must_use]
pub fn resolve_base_url(base_url: &str, reference: &str) -> String {
    if is_url(base_url) || !is_url(reference) {
        return base_url.to_string();
    }
    match reqwest::Url::parse(reference) {
        Ok(url) => format!("{}{}", url.origin().ascii_serialization(), base_url),
        Err(err) => {
            warn!(reference, error = %err, "could not parse spec URL, keeping base URL as is");
            base_url.to_string()
        }
    }
}

// =====================
// OpenAPI 3.x
// =====================

fn openapi3_catalog(api: &OpenAPI) -> Result<Catalog> {
    let mut endpoints = Vec::new();
    for (path, item) in &api.paths.paths {
        let ReferenceOr::Item(item) = item else {
            debug!(path = %path, "skipping path item reference");
            continue;
        };
        let shared = openapi3_params(api, &item.parameters);
        let operations = [
            (HttpMethod::Get, &item.get),
            (HttpMethod::Put, &item.put),
            (HttpMethod::Post, &item.post),
            (HttpMethod::Delete, &item.delete),
            (HttpMethod::Patch, &item.patch),
            (HttpMethod::Options, &item.options),
            (HttpMethod::Head, &item.head),
            (HttpMethod::Trace, &item.trace),
        ];
        for (method, op) in operations {
            let Some(op) = op else { continue };
            let own = openapi3_params(api, &op.parameters);
            let body = match &op.request_body {
                None => BodyRequirement::None,
                Some(ReferenceOr::Item(rb)) => body_requirement(rb.required),
                Some(ReferenceOr::Reference { reference }) => {
                    let required = reference
                        .strip_prefix("#/components/requestBodies/")
                        .and_then(|name| api.components.as_ref()?.request_bodies.get(name))
                        .and_then(|rb| match rb {
                            ReferenceOr::Item(rb) => Some(rb.required),
                            ReferenceOr::Reference { .. } => None,
                        })
                        .unwrap_or(false);
                    body_requirement(required)
                }
            };
            endpoints.push(
                EndpointTemplate::new(method, path)
                    .with_parameters(merge_params(own, &shared))
                    .with_summary(op.summary.as_deref().unwrap_or_default())
                    .with_operation_id(op.operation_id.clone())
                    .with_body(body),
            );
        }
    }

    let mut catalog = Catalog::new(endpoints)?;
    catalog.title = api.info.title.clone();
    catalog.version = api.info.version.clone();
    catalog.base_url = api
        .servers
        .first()
        .map(|s| s.url.clone())
        .unwrap_or_default();
    if let Some(components) = &api.components {
        for (name, scheme) in &components.security_schemes {
            if let ReferenceOr::Item(scheme) = scheme {
                catalog
                    .security_schemes
                    .insert(name.clone(), openapi3_security(scheme));
            }
        }
    }
    Ok(catalog)
}

fn body_requirement(required: bool) -> BodyRequirement {
    if required {
        BodyRequirement::Required
    } else {
        BodyRequirement::Optional
    }
}

fn openapi3_params(api: &OpenAPI, raw: &[ReferenceOr<Parameter>]) -> Vec<ParamSpec> {
    raw.iter()
        .filter_map(|p| match p {
            ReferenceOr::Item(p) => Some(p),
            ReferenceOr::Reference { reference } => {
                let found = reference
                    .strip_prefix("#/components/parameters/")
                    .and_then(|name| api.components.as_ref()?.parameters.get(name))
                    .and_then(|p| match p {
                        ReferenceOr::Item(p) => Some(p),
                        ReferenceOr::Reference { .. } => None,
                    });
                if found.is_none() {
                    debug!(reference = %reference, "skipping unresolvable parameter reference");
                }
                found
            }
        })
        .map(openapi3_param)
        .collect()
}

fn openapi3_param(param: &Parameter) -> ParamSpec {
    let (data, location) = match param {
        Parameter::Query { parameter_data, .. } => (parameter_data, ParamLocation::Query),
        Parameter::Header { parameter_data, .. } => (parameter_data, ParamLocation::Header),
        Parameter::Path { parameter_data, .. } => (parameter_data, ParamLocation::Path),
        Parameter::Cookie { parameter_data, .. } => (parameter_data, ParamLocation::Cookie),
    };
    let schema_type = match &data.format {
        ParameterSchemaOrContent::Schema(ReferenceOr::Item(schema)) => serde_json::to_value(schema)
            .ok()
            .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_string)),
        _ => None,
    };
    ParamSpec::new(&data.name, location)
        .required(data.required || location == ParamLocation::Path)
        .schema(SchemaHint::from_spec(schema_type.as_deref()))
}

fn openapi3_security(scheme: &openapiv3::SecurityScheme) -> SecurityScheme {
    match scheme {
        openapiv3::SecurityScheme::APIKey { location, name, .. } => SecurityScheme::ApiKey {
            name: name.clone(),
            location: match location {
                openapiv3::APIKeyLocation::Query => ParamLocation::Query,
                openapiv3::APIKeyLocation::Header => ParamLocation::Header,
                openapiv3::APIKeyLocation::Cookie => ParamLocation::Cookie,
            },
        },
        openapiv3::SecurityScheme::HTTP { scheme, .. } if scheme.eq_ignore_ascii_case("basic") => {
            SecurityScheme::Basic
        }
        openapiv3::SecurityScheme::HTTP { .. } => SecurityScheme::Bearer,
        openapiv3::SecurityScheme::OAuth2 { .. } => SecurityScheme::OAuth2,
        openapiv3::SecurityScheme::OpenIDConnect { .. } => SecurityScheme::OpenIdConnect,
    }
}

/// Operation-level parameters win over path-level ones of the same name.
fn merge_params(own: Vec<ParamSpec>, shared: &[ParamSpec]) -> Vec<ParamSpec> {
    let mut merged = own;
    for p in shared {
        if !merged.iter().any(|o| o.name == p.name) {
            merged.push(p.clone());
        }
    }
    merged
}

// =====================
// Swagger 2.0
// =====================

fn swagger2_catalog(raw: &Value) -> Result<Catalog> {
    let mut endpoints = Vec::new();
    let paths = raw.get("paths").and_then(Value::as_object);
    for (path, item) in paths.into_iter().flatten() {
        let Some(item) = item.as_object() else { continue };
        let shared = swagger2_params(raw, item.get("parameters"));
        for method in HttpMethod::ALL {
            let key = method.as_str().to_ascii_lowercase();
            let Some(op) = item.get(&key).filter(|op| op.is_object()) else {
                continue;
            };
            let own = swagger2_params(raw, op.get("parameters"));
            let body = own
                .iter()
                .chain(shared.iter())
                .find(|p| p.location == ParamLocation::Body)
                .map_or(BodyRequirement::None, |p| body_requirement(p.required));
            let params = merge_params(own, &shared)
                .into_iter()
                .filter(|p| p.location != ParamLocation::Body)
                .collect();
            endpoints.push(
                EndpointTemplate::new(method, path)
                    .with_parameters(params)
                    .with_summary(op.get("summary").and_then(Value::as_str).unwrap_or_default())
                    .with_operation_id(
                        op.get("operationId")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    )
                    .with_body(body),
            );
        }
    }

    let mut catalog = Catalog::new(endpoints)?;
    let info = raw.get("info");
    catalog.title = str_field(info, "title");
    catalog.version = str_field(info, "version");
    catalog.base_url = swagger2_base_url(raw);
    catalog.security_schemes = swagger2_security(raw);
    Ok(catalog)
}

fn str_field(value: Option<&Value>, key: &str) -> String {
    value
        .and_then(|v| v.get(key))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Follow a local JSON pointer such as `#/parameters/limit`.
fn resolve_ref<'a>(root: &'a Value, reference: &str) -> Option<&'a Value> {
    root.pointer(reference.strip_prefix('#')?)
}

fn swagger2_params(root: &Value, raw: Option<&Value>) -> Vec<ParamSpec> {
    let mut out = Vec::new();
    for p in raw.and_then(Value::as_array).into_iter().flatten() {
        let p = match p.get("$ref").and_then(Value::as_str) {
            Some(reference) => match resolve_ref(root, reference) {
                Some(found) => found,
                None => {
                    debug!(reference, "skipping unresolvable parameter reference");
                    continue;
                }
            },
            None => p,
        };
        let Some(name) = p.get("name").and_then(Value::as_str) else {
            continue;
        };
        let location = ParamLocation::from_spec(p.get("in").and_then(Value::as_str).unwrap_or("query"));
        let required = p.get("required").and_then(Value::as_bool).unwrap_or(false);
        let schema_type = p
            .get("type")
            .or_else(|| p.get("schema").and_then(|s| s.get("type")))
            .and_then(Value::as_str);
        out.push(
            ParamSpec::new(name, location)
                .required(required || location == ParamLocation::Path)
                .schema(SchemaHint::from_spec(schema_type)),
        );
    }
    out
}

fn swagger2_base_url(raw: &Value) -> String {
    let host = raw.get("host").and_then(Value::as_str).unwrap_or_default();
    let base_path = raw.get("basePath").and_then(Value::as_str).unwrap_or_default();
    if host.is_empty() {
        return base_path.to_string();
    }
    let scheme = raw
        .get("schemes")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
        .and_then(Value::as_str)
        .unwrap_or("https");
    format!("{scheme}://{host}{base_path}")
}

fn swagger2_security(raw: &Value) -> BTreeMap<String, SecurityScheme> {
    let mut schemes = BTreeMap::new();
    let defs = raw.get("securityDefinitions").and_then(Value::as_object);
    for (name, def) in defs.into_iter().flatten() {
        let scheme = match def.get("type").and_then(Value::as_str) {
            Some("basic") => SecurityScheme::Basic,
            Some("apiKey") => SecurityScheme::ApiKey {
                name: str_field(Some(def), "name"),
                location: ParamLocation::from_spec(
                    def.get("in").and_then(Value::as_str).unwrap_or("header"),
                ),
            },
            Some("oauth2") => SecurityScheme::OAuth2,
            other => {
                debug!(scheme = %name, kind = ?other, "ignoring unknown security definition");
                continue;
            }
        };
        schemes.insert(name.clone(), scheme);
    }
    schemes
}
