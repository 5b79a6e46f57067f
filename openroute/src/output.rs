//! Rendering of responses, endpoint listings and error records.
//!
//! Two formats are supported: TOON, a compact indentation-based layout that
//! prints uniform arrays of objects as a single header plus one row per
//! element, and a pretty-printed JSON envelope. Errors are always a single
//! line of JSON so that callers can parse them from stderr.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::catalog::Catalog;
use crate::client::ApiResponse;
use crate::OutputFormat;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_CLI_ERROR: i32 = 1;
pub const EXIT_AUTH_ERROR: i32 = 2;
pub const EXIT_CLIENT_ERROR: i32 = 3;
pub const EXIT_SERVER_ERROR: i32 = 4;
pub const EXIT_NETWORK_ERROR: i32 = 5;

/// Map an HTTP status to the process exit code. `None` means no response
/// was received at all.
#[must_use]
pub fn exit_code_for_status(status: Option<u16>) -> i32 {
    match status {
        None => EXIT_NETWORK_ERROR,
        Some(401 | 403) => EXIT_AUTH_ERROR,
        Some(400..=499) => EXIT_CLIENT_ERROR,
        Some(500..=599) => EXIT_SERVER_ERROR,
        Some(_) => EXIT_SUCCESS,
    }
}

/// One-line JSON error record: `{"error", "message", "status"}`.
#[must_use]
pub fn format_error(kind: &str, message: &str, status: Option<u16>) -> String {
    json!({
        "error": kind,
        "message": message,
        "status": status,
    })
    .to_string()
}

pub fn print_error(kind: &str, message: &str, status: Option<u16>) {
    eprintln!("{}", format_error(kind, message, status));
}

/// Print a response in the requested format and return the exit code its
/// status maps to.
pub fn print_response(response: &ApiResponse, format: OutputFormat) -> i32 {
    match format {
        OutputFormat::Toon => println!("{}", encode_toon(response)),
        OutputFormat::Json => println!("{}", encode_json(response)),
    }
    exit_code_for_status(Some(response.status))
}

#[must_use]
pub fn encode_json(response: &ApiResponse) -> String {
    let envelope = json!({
        "status": response.status,
        "headers": response.headers,
        "body": response.body,
        "elapsed_ms": response.elapsed_ms,
    });
    serde_json::to_string_pretty(&envelope).unwrap_or_else(|_| envelope.to_string())
}

#[must_use]
pub fn encode_toon(response: &ApiResponse) -> String {
    let mut lines = vec![
        format!("status: {}", response.status),
        format!("elapsed_ms: {}", response.elapsed_ms),
    ];
    if let Some(ct) = response.content_type() {
        lines.push("headers:".to_string());
        lines.push(format!(" content-type: {ct}"));
    }
    match &response.body {
        Value::Null => {}
        Value::Object(map) => {
            lines.push("body:".to_string());
            toon_object(map, 1, &mut lines);
        }
        Value::Array(items) => toon_array("body", items, 0, &mut lines),
        other => lines.push(format!("body: {}", toon_scalar(other))),
    }
    lines.join("\n")
}

fn toon_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Column names when every element is an object with the same key set.
fn uniform_columns(items: &[Value]) -> Option<Vec<&String>> {
    let first = items.first()?.as_object()?;
    let cols: Vec<&String> = first.keys().collect();
    let uniform = items.iter().all(|item| {
        item.as_object()
            .is_some_and(|o| o.len() == cols.len() && cols.iter().all(|c| o.contains_key(*c)))
    });
    uniform.then_some(cols)
}

fn toon_array(key: &str, items: &[Value], indent: usize, lines: &mut Vec<String>) {
    let prefix = " ".repeat(indent);
    if let Some(cols) = uniform_columns(items) {
        let header: Vec<&str> = cols.iter().map(|c| c.as_str()).collect();
        lines.push(format!("{prefix}{key}[{}]{{{}}}:", items.len(), header.join(",")));
        for item in items {
            let row: Vec<String> = cols.iter().map(|c| toon_scalar(&item[c.as_str()])).collect();
            lines.push(format!("{prefix} {}", row.join(",")));
        }
        return;
    }
    lines.push(format!("{prefix}{key}[{}]:", items.len()));
    for item in items {
        match item {
            Value::Object(map) => {
                lines.push(format!("{prefix} -"));
                toon_object(map, indent + 2, lines);
            }
            other => lines.push(format!("{prefix} {}", toon_scalar(other))),
        }
    }
}

fn toon_object(map: &Map<String, Value>, indent: usize, lines: &mut Vec<String>) {
    let prefix = " ".repeat(indent);
    for (key, value) in map {
        match value {
            Value::Object(inner) => {
                lines.push(format!("{prefix}{key}:"));
                toon_object(inner, indent + 1, lines);
            }
            Value::Array(items) => toon_array(key, items, indent, lines),
            other => lines.push(format!("{prefix}{key}: {}", toon_scalar(other))),
        }
    }
}

// =====================
// Endpoint listing
// =====================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointRow {
    pub method: String,
    pub path: String,
    pub summary: String,
}

/// Every catalog entry, ordered by path then method.
#[must_use]
pub fn endpoint_rows(catalog: &Catalog) -> Vec<EndpointRow> {
    let mut templates: Vec<_> = catalog.endpoints().iter().collect();
    templates.sort_by(|a, b| {
        a.path()
            .cmp(b.path())
            .then_with(|| a.method().as_str().cmp(b.method().as_str()))
    });
    templates
        .into_iter()
        .map(|t| EndpointRow {
            method: t.method().to_string(),
            path: t.path().to_string(),
            summary: t.summary().to_string(),
        })
        .collect()
}

#[must_use]
pub fn render_endpoints(rows: &[EndpointRow], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Toon => {
            let mut lines = vec![format!("endpoints[{}]{{method,path,summary}}:", rows.len())];
            lines.extend(
                rows.iter()
                    .map(|r| format!(" {},{},{}", r.method, r.path, r.summary)),
            );
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EndpointTemplate, HttpMethod};
    use std::collections::BTreeMap;

    fn response(status: u16, body: Value) -> ApiResponse {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        ApiResponse {
            status,
            headers,
            body,
            elapsed_ms: 12,
        }
    }

    // ==================== exit code tests ====================

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for_status(Some(200)), 0);
        assert_eq!(exit_code_for_status(Some(204)), 0);
        assert_eq!(exit_code_for_status(Some(302)), 0);
        assert_eq!(exit_code_for_status(Some(401)), 2);
        assert_eq!(exit_code_for_status(Some(403)), 2);
        assert_eq!(exit_code_for_status(Some(404)), 3);
        assert_eq!(exit_code_for_status(Some(422)), 3);
        assert_eq!(exit_code_for_status(Some(500)), 4);
        assert_eq!(exit_code_for_status(Some(503)), 4);
        assert_eq!(exit_code_for_status(None), 5);
    }

    // ==================== format_error tests ====================

    #[test]
    fn test_format_error_is_one_line_json() {
        let line = format_error("NO_MATCH", "No endpoint matches 'GET /x'.", None);
        assert!(!line.contains('\n'));
        let v: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["error"], "NO_MATCH");
        assert_eq!(v["status"], Value::Null);
    }

    #[test]
    fn test_format_error_with_status() {
        let v: Value = serde_json::from_str(&format_error("HTTP_ERROR", "x", Some(500))).unwrap();
        assert_eq!(v["status"], 500);
    }

    // ==================== TOON tests ====================

    #[test]
    fn test_toon_object_body() {
        let out = encode_toon(&response(200, json!({"id": 1, "name": "Fido", "tag": null})));
        assert_eq!(
            out,
            "status: 200\nelapsed_ms: 12\nheaders:\n content-type: application/json\nbody:\n id: 1\n name: Fido\n tag: null"
        );
    }

    #[test]
    fn test_toon_uniform_array_is_tabular() {
        let out = encode_toon(&response(
            200,
            json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]),
        ));
        assert!(out.ends_with("body[2]{id,name}:\n 1,a\n 2,b"), "{out}");
    }

    #[test]
    fn test_toon_mixed_array() {
        let out = encode_toon(&response(200, json!([1, "two", {"k": true}])));
        assert!(out.ends_with("body[3]:\n 1\n two\n -\n  k: true"), "{out}");
    }

    #[test]
    fn test_toon_nested() {
        let out = encode_toon(&response(
            200,
            json!({"owner": {"name": "x"}, "tags": ["a", "b"]}),
        ));
        assert!(out.contains("body:\n owner:\n  name: x\n tags[2]:\n  a\n  b"), "{out}");
    }

    #[test]
    fn test_toon_text_body_and_no_body() {
        let mut r = response(200, json!("plain"));
        r.headers.clear();
        assert_eq!(encode_toon(&r), "status: 200\nelapsed_ms: 12\nbody: plain");
        r.body = Value::Null;
        assert_eq!(encode_toon(&r), "status: 200\nelapsed_ms: 12");
    }

    // ==================== JSON tests ====================

    #[test]
    fn test_json_envelope() {
        let out = encode_json(&response(201, json!({"id": 3})));
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["status"], 201);
        assert_eq!(v["body"]["id"], 3);
        assert_eq!(v["elapsed_ms"], 12);
        assert_eq!(v["headers"]["content-type"], "application/json");
    }

    // ==================== listing tests ====================

    #[test]
    fn test_endpoint_rows_sorted() {
        let catalog = Catalog::new(vec![
            EndpointTemplate::new(HttpMethod::Post, "/pets").with_summary("Create"),
            EndpointTemplate::new(HttpMethod::Get, "/users"),
            EndpointTemplate::new(HttpMethod::Get, "/pets").with_summary("List"),
        ])
        .unwrap();
        let rows = endpoint_rows(&catalog);
        let order: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.method.as_str(), r.path.as_str()))
            .collect();
        assert_eq!(order, vec![("GET", "/pets"), ("POST", "/pets"), ("GET", "/users")]);

        let toon = render_endpoints(&rows, OutputFormat::Toon);
        assert_eq!(
            toon,
            "endpoints[3]{method,path,summary}:\n GET,/pets,List\n POST,/pets,Create\n GET,/users,"
        );

        let json: Value = serde_json::from_str(&render_endpoints(&rows, OutputFormat::Json)).unwrap();
        assert_eq!(json[0]["summary"], "List");
    }
}
