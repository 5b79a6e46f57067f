//! Credential lookup, storage and application.
//!
//! Credentials come from command-line flags first, then environment
//! variables (both handled by clap), then a per-API credentials file under
//! the config directory written by the `auth` subcommand. The file is keyed
//! by the document's host name (URL references) or file stem.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::debug;

use crate::catalog::{Catalog, ParamLocation, SecurityScheme};

/// Directory name under `$HOME` holding per-API credential files.
pub const CONFIG_DIR_NAME: &str = ".openroute";

pub const KEY_BEARER_TOKEN: &str = "BEARER_TOKEN";
pub const KEY_OAUTH_TOKEN: &str = "OAUTH_TOKEN";
pub const KEY_BASIC_USERNAME: &str = "BASIC_USERNAME";
pub const KEY_BASIC_PASSWORD: &str = "BASIC_PASSWORD";

/// Credentials supplied on the command line or through the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub token: Option<String>,
    pub api_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.token.is_none()
            && self.api_key.is_none()
            && self.username.is_none()
            && self.password.is_none()
    }

    /// Fill every field still unset from a stored credentials file. Values
    /// already present win.
    #[must_use]
    pub fn or_stored(self, catalog: &Catalog, stored: &StoredCredentials) -> Self {
        let stored_api_key = || {
            catalog
                .security_schemes
                .values()
                .find_map(|scheme| match scheme {
                    SecurityScheme::ApiKey { name, .. } => stored.get(&api_key_entry(name)),
                    _ => None,
                })
                .map(str::to_string)
        };
        Self {
            token: self.token.or_else(|| {
                stored
                    .get(KEY_BEARER_TOKEN)
                    .or_else(|| stored.get(KEY_OAUTH_TOKEN))
                    .map(str::to_string)
            }),
            api_key: self.api_key.or_else(stored_api_key),
            username: self
                .username
                .or_else(|| stored.get(KEY_BASIC_USERNAME).map(str::to_string)),
            password: self
                .password
                .or_else(|| stored.get(KEY_BASIC_PASSWORD).map(str::to_string)),
        }
    }

    /// Entries to persist for these credentials, named the way
    /// [`Credentials::or_stored`] reads them back.
    #[must_use]
    pub fn to_entries(&self, catalog: &Catalog) -> BTreeMap<String, String> {
        let mut entries = BTreeMap::new();
        if let Some(token) = &self.token {
            entries.insert(KEY_BEARER_TOKEN.to_string(), token.clone());
        }
        if let Some(username) = &self.username {
            entries.insert(KEY_BASIC_USERNAME.to_string(), username.clone());
        }
        if let Some(password) = &self.password {
            entries.insert(KEY_BASIC_PASSWORD.to_string(), password.clone());
        }
        if let Some(key) = &self.api_key {
            let mut named = false;
            for scheme in catalog.security_schemes.values() {
                if let SecurityScheme::ApiKey { name, .. } = scheme {
                    entries.insert(api_key_entry(name), key.clone());
                    named = true;
                }
            }
            if !named {
                entries.insert(api_key_entry("api_key"), key.clone());
            }
        }
        entries
    }
}

fn api_key_entry(param_name: &str) -> String {
    format!("API_KEY_{}", param_name.to_ascii_uppercase())
}

/// Contents of a credentials file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredCredentials(pub BTreeMap<String, String>);

impl StoredCredentials {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// Headers and query parameters to merge into an outgoing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedAuth {
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
}

/// Work out where each credential goes based on the schemes the document
/// declares. A token with no bearer-style scheme to attach to is still sent
/// as `Authorization: Bearer`, and so is an API key no scheme placed.
#[must_use]
pub fn apply_credentials(catalog: &Catalog, credentials: &Credentials) -> AppliedAuth {
    let mut applied = AppliedAuth::default();
    if credentials.is_empty() {
        return applied;
    }

    let mut api_key_placed = false;
    for (name, scheme) in &catalog.security_schemes {
        match scheme {
            SecurityScheme::Bearer | SecurityScheme::OAuth2 | SecurityScheme::OpenIdConnect => {
                if let Some(token) = &credentials.token {
                    debug!(scheme = %name, "applying bearer token");
                    applied
                        .headers
                        .insert("Authorization".to_string(), format!("Bearer {token}"));
                }
            }
            SecurityScheme::ApiKey { name: key_name, location } => {
                let Some(key) = &credentials.api_key else { continue };
                debug!(scheme = %name, location = ?location, "applying api key");
                api_key_placed = true;
                match location {
                    ParamLocation::Query => {
                        applied.query.insert(key_name.clone(), key.clone());
                    }
                    ParamLocation::Cookie => {
                        applied
                            .headers
                            .insert("Cookie".to_string(), format!("{key_name}={key}"));
                    }
                    _ => {
                        applied.headers.insert(key_name.clone(), key.clone());
                    }
                }
            }
            SecurityScheme::Basic => {
                let Some(username) = &credentials.username else {
                    debug!(scheme = %name, "basic auth declared, no username given");
                    continue;
                };
                debug!(scheme = %name, "applying basic auth");
                let password = credentials.password.as_deref().unwrap_or_default();
                applied
                    .headers
                    .insert("Authorization".to_string(), basic_header(username, password));
            }
        }
    }

    if !applied.headers.contains_key("Authorization") {
        let fallback = credentials
            .token
            .as_ref()
            .or_else(|| credentials.api_key.as_ref().filter(|_| !api_key_placed));
        if let Some(token) = fallback {
            applied
                .headers
                .insert("Authorization".to_string(), format!("Bearer {token}"));
        }
    }
    applied
}

#[must_use]
pub fn basic_header(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
}

// =====================
// Credentials file
// =====================

/// Key for a document reference: the host of a URL, the sanitized stem of
/// a file path.
#[must_use]
pub fn domain_from_spec(reference: &str) -> String {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return reqwest::Url::parse(reference)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
    }
    let stem = Path::new(reference)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    sanitize_key(&stem)
}

/// Replace anything but word characters, `.` and `-` with `_`.
#[must_use]
pub fn sanitize_key(raw: &str) -> String {
    let key: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if key.is_empty() {
        "unknown".to_string()
    } else {
        key
    }
}

/// `$HOME/.openroute`, when a home directory is known.
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(|home| PathBuf::from(home).join(CONFIG_DIR_NAME))
}

#[must_use]
pub fn credentials_path(config_dir: &Path, key: &str) -> PathBuf {
    config_dir.join(format!("{key}.env"))
}

/// Read a credentials file. A missing file is an empty set.
pub fn load_credentials_file(path: &Path) -> Result<StoredCredentials> {
    if !path.exists() {
        return Ok(StoredCredentials::default());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials file: {}", path.display()))?;
    Ok(parse_env(&text))
}

/// Write `entries` as `KEY="value"` lines, replacing any previous file.
pub fn save_credentials(path: &Path, entries: &BTreeMap<String, String>) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    }
    let body: String = entries
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"\n", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    fs::write(path, body)
        .with_context(|| format!("Failed to write credentials file: {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict permissions on {}", path.display()))?;
    }
    debug!(path = %path.display(), entries = entries.len(), "credentials saved");
    Ok(())
}

fn parse_env(text: &str) -> StoredCredentials {
    let mut entries = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            debug!(line, "skipping malformed credentials line");
            continue;
        };
        entries.insert(key.trim().to_string(), unquote(value.trim()));
    }
    StoredCredentials(entries)
}

fn unquote(value: &str) -> String {
    if let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(c);
            }
        }
        return out;
    }
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EndpointTemplate, HttpMethod};

    fn catalog_with(schemes: Vec<(&str, SecurityScheme)>) -> Catalog {
        let mut catalog =
            Catalog::new(vec![EndpointTemplate::new(HttpMethod::Get, "/ping")]).unwrap();
        for (name, scheme) in schemes {
            catalog.security_schemes.insert(name.to_string(), scheme);
        }
        catalog
    }

    fn header_key(name: &str, location: ParamLocation) -> SecurityScheme {
        SecurityScheme::ApiKey {
            name: name.to_string(),
            location,
        }
    }

    fn token(t: &str) -> Credentials {
        Credentials {
            token: Some(t.to_string()),
            ..Credentials::default()
        }
    }

    fn api_key(k: &str) -> Credentials {
        Credentials {
            api_key: Some(k.to_string()),
            ..Credentials::default()
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("openroute-auth-{tag}-{}", std::process::id()))
    }

    // ==================== apply_credentials tests ====================

    #[test]
    fn test_no_credentials_applies_nothing() {
        let catalog = catalog_with(vec![("bearer", SecurityScheme::Bearer)]);
        assert_eq!(
            apply_credentials(&catalog, &Credentials::default()),
            AppliedAuth::default()
        );
    }

    #[test]
    fn test_bearer_token() {
        let catalog = catalog_with(vec![("bearer", SecurityScheme::Bearer)]);
        let applied = apply_credentials(&catalog, &token("abc"));
        assert_eq!(
            applied.headers.get("Authorization").map(String::as_str),
            Some("Bearer abc")
        );
    }

    #[test]
    fn test_api_key_header_and_query() {
        let catalog = catalog_with(vec![
            ("header", header_key("X-API-Key", ParamLocation::Header)),
            ("query", header_key("api_key", ParamLocation::Query)),
        ]);
        let applied = apply_credentials(&catalog, &api_key("k1"));
        assert_eq!(applied.headers.get("X-API-Key").map(String::as_str), Some("k1"));
        assert_eq!(applied.query.get("api_key").map(String::as_str), Some("k1"));
        assert!(!applied.headers.contains_key("Authorization"));
    }

    #[test]
    fn test_api_key_without_scheme_sent_as_bearer() {
        let catalog = catalog_with(vec![("bearer", SecurityScheme::Bearer)]);
        let applied = apply_credentials(&catalog, &api_key("k2"));
        assert_eq!(
            applied.headers.get("Authorization").map(String::as_str),
            Some("Bearer k2")
        );
    }

    #[test]
    fn test_token_wins_over_unplaced_api_key() {
        let catalog = catalog_with(vec![]);
        let creds = Credentials {
            token: Some("t".to_string()),
            api_key: Some("k".to_string()),
            ..Credentials::default()
        };
        let applied = apply_credentials(&catalog, &creds);
        assert_eq!(
            applied.headers.get("Authorization").map(String::as_str),
            Some("Bearer t")
        );
    }

    #[test]
    fn test_token_without_scheme_still_bearer() {
        let catalog = catalog_with(vec![]);
        let applied = apply_credentials(&catalog, &token("t"));
        assert_eq!(
            applied.headers.get("Authorization").map(String::as_str),
            Some("Bearer t")
        );
    }

    #[test]
    fn test_oauth2_uses_bearer() {
        let catalog = catalog_with(vec![("oauth", SecurityScheme::OAuth2)]);
        let applied = apply_credentials(&catalog, &token("o"));
        assert_eq!(
            applied.headers.get("Authorization").map(String::as_str),
            Some("Bearer o")
        );
    }

    #[test]
    fn test_basic_auth_from_username_and_password() {
        let catalog = catalog_with(vec![("basic", SecurityScheme::Basic)]);
        let creds = Credentials {
            username: Some("Aladdin".to_string()),
            password: Some("open sesame".to_string()),
            ..Credentials::default()
        };
        let applied = apply_credentials(&catalog, &creds);
        assert_eq!(
            applied.headers.get("Authorization").map(String::as_str),
            Some("Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==")
        );
    }

    #[test]
    fn test_basic_auth_needs_username() {
        let catalog = catalog_with(vec![("basic", SecurityScheme::Basic)]);
        let creds = Credentials {
            password: Some("secret".to_string()),
            ..Credentials::default()
        };
        assert!(apply_credentials(&catalog, &creds).headers.is_empty());
    }

    // ==================== stored credentials tests ====================

    #[test]
    fn test_domain_from_spec() {
        assert_eq!(domain_from_spec("https://api.example.com/v1/openapi.json"), "api.example.com");
        assert_eq!(domain_from_spec("./specs/petstore.yaml"), "petstore");
        assert_eq!(domain_from_spec("my api.v2.yaml"), "my_api.v2");
        assert_eq!(sanitize_key(""), "unknown");
    }

    #[test]
    fn test_flags_win_over_stored() {
        let catalog = catalog_with(vec![("key", header_key("X-Key", ParamLocation::Header))]);
        let mut map = BTreeMap::new();
        map.insert(KEY_BEARER_TOKEN.to_string(), "stored-token".to_string());
        map.insert("API_KEY_X-KEY".to_string(), "stored-key".to_string());
        map.insert(KEY_BASIC_USERNAME.to_string(), "bob".to_string());
        let stored = StoredCredentials(map);

        let merged = token("flag-token").or_stored(&catalog, &stored);
        assert_eq!(merged.token.as_deref(), Some("flag-token"));
        assert_eq!(merged.api_key.as_deref(), Some("stored-key"));
        assert_eq!(merged.username.as_deref(), Some("bob"));
        assert_eq!(merged.password, None);
    }

    #[test]
    fn test_stored_oauth_token_used_as_token() {
        let catalog = catalog_with(vec![]);
        let mut map = BTreeMap::new();
        map.insert(KEY_OAUTH_TOKEN.to_string(), "o".to_string());
        let merged = Credentials::default().or_stored(&catalog, &StoredCredentials(map));
        assert_eq!(merged.token.as_deref(), Some("o"));
    }

    #[test]
    fn test_parse_env_quoting() {
        let stored = parse_env(
            "# saved\nBEARER_TOKEN=\"a\\\"b\"\nexport BASIC_USERNAME='bob'\nAPI_KEY_X=plain\nbroken\n",
        );
        assert_eq!(stored.get("BEARER_TOKEN"), Some("a\"b"));
        assert_eq!(stored.get("BASIC_USERNAME"), Some("bob"));
        assert_eq!(stored.get("API_KEY_X"), Some("plain"));
        assert_eq!(stored.0.len(), 3);
    }

    #[test]
    fn test_save_then_load_credentials_file() {
        let dir = temp_dir("save");
        let path = credentials_path(&dir, "api.example.com");
        let catalog = catalog_with(vec![("key", header_key("api_key", ParamLocation::Query))]);
        let creds = Credentials {
            token: Some("tok\"en".to_string()),
            api_key: Some("k".to_string()),
            ..Credentials::default()
        };

        save_credentials(&path, &creds.to_entries(&catalog)).unwrap();
        let stored = load_credentials_file(&path).unwrap();
        let _ = fs::remove_dir_all(&dir);

        assert_eq!(stored.get(KEY_BEARER_TOKEN), Some("tok\"en"));
        assert_eq!(stored.get("API_KEY_API_KEY"), Some("k"));
        assert_eq!(Credentials::default().or_stored(&catalog, &stored), creds);
    }

    #[test]
    fn test_missing_credentials_file_is_empty() {
        let stored = load_credentials_file(&temp_dir("missing").join("none.env")).unwrap();
        assert_eq!(stored, StoredCredentials::default());
    }
}
