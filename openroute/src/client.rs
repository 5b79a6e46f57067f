//! Blocking HTTP execution of a resolved request.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::blocking::{Client, ClientBuilder};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::auth::AppliedAuth;
use crate::error::NetworkError;
use crate::resolver::ResolvedRequest;
use crate::ExecutionConfig;

/// What came back from the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON when the server says so, otherwise the raw text.
    pub body: Value,
    pub elapsed_ms: u64,
}

impl ApiResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}

/// Send `request` to `base_url` with the given auth applied.
pub fn execute(
    request: &ResolvedRequest<'_>,
    base_url: &str,
    auth: &AppliedAuth,
    config: &ExecutionConfig<'_>,
) -> Result<ApiResponse, NetworkError> {
    let mut builder: ClientBuilder = Client::builder().user_agent(config.user_agent);
    if let Some(secs) = config.conn_timeout_secs {
        builder = builder.connect_timeout(Duration::from_secs_f64(secs));
    }
    if let Some(secs) = config.request_timeout_secs {
        builder = builder.timeout(Duration::from_secs_f64(secs));
    }
    let client = builder.build().map_err(NetworkError::Client)?;

    let full_url = build_url(base_url, &request.path);
    let url = reqwest::Url::parse(&full_url).map_err(|_| NetworkError::InvalidUrl {
        url: full_url.clone(),
    })?;

    let mut query = request.query.clone();
    query.extend(auth.query.clone());
    let mut headers = request.headers.clone();
    headers.extend(auth.headers.clone());
    let header_map = build_headers(&headers)?;
    let has_content_type = header_map.contains_key(CONTENT_TYPE);

    let mut req = client.request(request.method.to_http(), url);
    if !query.is_empty() {
        req = req.query(&query);
    }
    if !header_map.is_empty() {
        req = req.headers(header_map);
    }
    if let Some(body) = &request.body {
        req = match serde_json::from_str::<Value>(body) {
            Ok(json) => req.json(&json),
            Err(_) if has_content_type => req.body(body.clone()),
            Err(_) => req.header(CONTENT_TYPE, "text/plain").body(body.clone()),
        };
    }

    if config.verbose {
        eprintln!("-> {} {}", request.method, full_url);
        if !query.is_empty() {
            eprintln!("-> Query: {query:?}");
        }
        if let Some(b) = &request.body {
            eprintln!("-> Body: {b}");
        }
    }
    info!(method = %request.method, url = %full_url, "sending request");

    let started = Instant::now();
    let resp = req.send()?;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let status = resp.status().as_u16();
    if config.verbose {
        eprintln!("<- {status} {full_url} ({elapsed_ms} ms)");
    }
    debug!(status, elapsed_ms, "response received");

    let headers: BTreeMap<String, String> = resp
        .headers()
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect();
    let is_json = headers
        .get("content-type")
        .is_some_and(|ct| ct.contains("json"));
    let text = resp.text().map_err(NetworkError::ResponseRead)?;

    Ok(ApiResponse {
        status,
        headers,
        body: decode_body(&text, is_json),
        elapsed_ms,
    })
}

fn decode_body(text: &str, is_json: bool) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    if is_json {
        if let Ok(v) = serde_json::from_str(text) {
            return v;
        }
    }
    Value::String(text.to_string())
}

/// Join a base URL and a resolved path with exactly one slash between them.
#[must_use]
pub fn build_url(base_url: &str, path: &str) -> String {
    let has_slash = base_url.ends_with('/') || path.starts_with('/');
    if has_slash {
        format!("{}{}", base_url.trim_end_matches('/'), path)
    } else {
        format!("{base_url}/{path}")
    }
}

fn build_headers(raw: &BTreeMap<String, String>) -> Result<HeaderMap, NetworkError> {
    let mut map = HeaderMap::new();
    for (name, value) in raw {
        let header_name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| NetworkError::InvalidHeader { name: name.clone() })?;
        let header_value = HeaderValue::from_str(value.trim())
            .map_err(|_| NetworkError::InvalidHeader { name: name.clone() })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        BodyRequirement, Catalog, EndpointTemplate, HttpMethod, ParamLocation, ParamSpec,
    };
    use crate::resolver::{resolve, RequestArgs};
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn catalog() -> Catalog {
        Catalog::new(vec![
            EndpointTemplate::new(HttpMethod::Get, "/pets")
                .with_parameters(vec![ParamSpec::new("limit", ParamLocation::Query)]),
            EndpointTemplate::new(HttpMethod::Get, "/pets/{petId}").with_parameters(vec![
                ParamSpec::new("X-Trace", ParamLocation::Header),
            ]),
            EndpointTemplate::new(HttpMethod::Post, "/pets").with_body(BodyRequirement::Optional),
        ])
        .unwrap()
    }

    fn run(
        base: &str,
        m: HttpMethod,
        p: &str,
        args: RequestArgs,
        auth: AppliedAuth,
        timeout: Option<f64>,
    ) -> Result<ApiResponse, NetworkError> {
        let catalog = catalog();
        let request = resolve(&catalog, m, p, &args).unwrap();
        let mut config = ExecutionConfig::new("openroute-test/0.1");
        config.request_timeout_secs = timeout;
        execute(&request, base, &auth, &config)
    }

    // ==================== build_url tests ====================

    #[test]
    fn test_build_url_joins_with_single_slash() {
        assert_eq!(build_url("http://x/api/", "/pets"), "http://x/api/pets");
        assert_eq!(build_url("http://x/api", "/pets"), "http://x/api/pets");
        assert_eq!(build_url("http://x/api", "pets"), "http://x/api/pets");
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body("", true), Value::Null);
        assert_eq!(decode_body(r#"{"a":1}"#, true), json!({"a": 1}));
        assert_eq!(decode_body(r#"{"a":1}"#, false), json!(r#"{"a":1}"#));
        assert_eq!(decode_body("oops", true), json!("oops"));
    }

    #[test]
    fn test_build_headers_rejects_bad_name() {
        let mut raw = BTreeMap::new();
        raw.insert("bad header".to_string(), "v".to_string());
        assert!(matches!(
            build_headers(&raw),
            Err(NetworkError::InvalidHeader { .. })
        ));
    }

    // ==================== execute tests ====================

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_get_with_query_and_json_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pets"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .expect(1)
            .mount(&server)
            .await;

        let base = server.uri();
        let resp = tokio::task::spawn_blocking(move || {
            run(
                &base,
                HttpMethod::Get,
                "/pets",
                RequestArgs::new().with_flag("limit", "5"),
                AppliedAuth::default(),
                None,
            )
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(resp.status, 200);
        assert!(resp.is_success());
        assert_eq!(resp.body, json!([{"id": 1}]));
        assert!(resp.content_type().unwrap().contains("json"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_sends_headers_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pets/7"))
            .and(header("X-Trace", "t-1"))
            .and(header("Authorization", "Bearer secret"))
            .and(query_param("api_key", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let mut auth = AppliedAuth::default();
        auth.headers
            .insert("Authorization".to_string(), "Bearer secret".to_string());
        auth.query.insert("api_key".to_string(), "k".to_string());
        let base = server.uri();
        let resp = tokio::task::spawn_blocking(move || {
            run(
                &base,
                HttpMethod::Get,
                "/pets/7",
                RequestArgs::new().with_flag("X-Trace", "t-1"),
                auth,
                None,
            )
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, json!("ok"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pets"))
            .and(body_json(json!({"name": "Fido"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9})))
            .expect(1)
            .mount(&server)
            .await;

        let base = server.uri();
        let resp = tokio::task::spawn_blocking(move || {
            run(
                &base,
                HttpMethod::Post,
                "/pets",
                RequestArgs::new().with_body(r#"{"name": "Fido"}"#),
                AppliedAuth::default(),
                None,
            )
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(resp.status, 201);
        assert_eq!(resp.body["id"], 9);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_text_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pets"))
            .and(header("content-type", "text/plain"))
            .and(body_string("just text"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let base = server.uri();
        let resp = tokio::task::spawn_blocking(move || {
            run(
                &base,
                HttpMethod::Post,
                "/pets",
                RequestArgs::new().with_body("just text"),
                AppliedAuth::default(),
                None,
            )
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(resp.status, 204);
        assert_eq!(resp.body, Value::Null);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_error_status_is_not_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "nope"})))
            .mount(&server)
            .await;

        let base = server.uri();
        let resp = tokio::task::spawn_blocking(move || {
            run(
                &base,
                HttpMethod::Get,
                "/pets/404",
                RequestArgs::new(),
                AppliedAuth::default(),
                None,
            )
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(resp.status, 404);
        assert!(!resp.is_success());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let base = server.uri();
        let err = tokio::task::spawn_blocking(move || {
            run(
                &base,
                HttpMethod::Get,
                "/pets",
                RequestArgs::new(),
                AppliedAuth::default(),
                Some(0.2),
            )
        })
        .await
        .unwrap()
        .unwrap_err();

        assert!(matches!(err, NetworkError::Timeout(_)));
    }

    #[test]
    fn test_execute_connection_refused() {
        let err = run(
            "http://127.0.0.1:1",
            HttpMethod::Get,
            "/pets",
            RequestArgs::new(),
            AppliedAuth::default(),
            Some(2.0),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            NetworkError::Connect(_) | NetworkError::Request(_)
        ));
    }

    #[test]
    fn test_execute_invalid_base_url() {
        let err = run(
            "not a url",
            HttpMethod::Get,
            "/pets",
            RequestArgs::new(),
            AppliedAuth::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidUrl { .. }));
    }
}
