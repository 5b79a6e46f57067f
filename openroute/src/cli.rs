use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::debug;

use crate::auth::{
    apply_credentials, credentials_path, default_config_dir, domain_from_spec,
    load_credentials_file, sanitize_key, save_credentials, Credentials, StoredCredentials,
};
use crate::catalog::{Catalog, HttpMethod};
use crate::client::execute;
use crate::output::{
    endpoint_rows, print_error, print_response, render_endpoints, EXIT_CLI_ERROR,
    EXIT_NETWORK_ERROR,
};
use crate::resolver::{resolve, RequestArgs};
use crate::{ExecutionConfig, OutputFormat};

/// Clap's builder API requires `'static` strings for command names and
/// default values. The CLI is built once per process from runtime data, so
/// the few strings involved are leaked.
fn leak_str<S: Into<String>>(s: S) -> &'static str {
    Box::leak(s.into().into_boxed_str())
}

/// Build the command tree: global options, `list`, and one subcommand per
/// HTTP method taking a path plus free-form `--name value` pairs.
pub fn build_cli(catalog: &Catalog) -> Command {
    let about = if catalog.title.is_empty() {
        "Call any endpoint of an OpenAPI-described API".to_string()
    } else {
        format!("Call any endpoint of {} {}", catalog.title, catalog.version)
    };

    let mut base_url = Arg::new("base-url")
        .long("base-url")
        .short('u')
        .help("Base API URL (defaults to the document's first server)")
        .num_args(1);
    if !catalog.base_url.is_empty() {
        base_url = base_url.default_value(leak_str(catalog.base_url.clone()));
    }

    let mut app = Command::new("openroute")
        .about(about)
        .version(env!("CARGO_PKG_VERSION"))
        // Global options
        .arg(
            Arg::new("spec")
                .long("spec")
                .short('s')
                .env("OPENROUTE_SPEC")
                .help("OpenAPI spec file path or URL")
                .num_args(1),
        )
        .arg(base_url)
        .arg(
            Arg::new("json-output")
                .long("json-output")
                .visible_alias("json")
                .short('j')
                .help("Output a JSON envelope instead of TOON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .env("OPENROUTE_TOKEN")
                .hide_env_values(true)
                .help("Bearer token")
                .num_args(1),
        )
        .arg(
            Arg::new("api-key")
                .long("api-key")
                .env("OPENROUTE_API_KEY")
                .hide_env_values(true)
                .help("API key, sent where the document's apiKey scheme says")
                .num_args(1),
        )
        .arg(
            Arg::new("username")
                .long("username")
                .env("OPENROUTE_USERNAME")
                .help("Username for HTTP basic auth")
                .num_args(1),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .env("OPENROUTE_PASSWORD")
                .hide_env_values(true)
                .help("Password for HTTP basic auth")
                .num_args(1),
        )
        .arg(
            Arg::new("config-dir")
                .long("config-dir")
                .env("OPENROUTE_CONFIG_DIR")
                .help("Directory holding saved credentials (default ~/.openroute)")
                .num_args(1),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Verbose output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("conn-timeout")
                .long("conn-timeout")
                .help("Connection timeout in seconds")
                .num_args(1),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .short('t')
                .help("Request timeout in seconds")
                .default_value("30")
                .num_args(1),
        )
        .subcommand(Command::new("list").about("List every endpoint the document declares"))
        .subcommand(
            Command::new("auth")
                .about("Save --token, --api-key, --username and --password for this API"),
        );

    for method in HttpMethod::ALL {
        let name = leak_str(method.as_str().to_ascii_lowercase());
        let cmd = Command::new(name)
            .about(format!("Send a {method} request"))
            .arg(
                Arg::new("path")
                    .help("Endpoint path, e.g. /pets/1 or /pets/{petId}")
                    .value_name("PATH")
                    .required(true),
            )
            .arg(
                Arg::new("params")
                    .help("Parameters as --name value pairs; --body <raw> sets the request body")
                    .value_name("PARAMS")
                    .num_args(0..)
                    .trailing_var_arg(true)
                    .allow_hyphen_values(true),
            );
        app = app.subcommand(cmd);
    }
    app
}

pub fn pre_scan_value(args: &[String], key: &str) -> Option<String> {
    for i in 0..args.len() {
        if args[i] == key && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        if let Some(rest) = args[i].strip_prefix(&(key.to_string() + "=")) {
            return Some(rest.to_string());
        }
    }
    None
}

/// Output switches that never take a value, even when the next token does
/// not look like a flag.
const SWITCH_FLAGS: &[&str] = &["json", "json-output", "verbose"];

/// Turn trailing tokens into named flags plus an optional body. A flag
/// followed by another flag, or by nothing, gets the value `true`.
#[must_use]
pub fn parse_extra_params(tokens: &[String]) -> RequestArgs {
    let mut args = RequestArgs::new();
    let mut i = 0;
    while i < tokens.len() {
        let Some(flag) = tokens[i].strip_prefix("--") else {
            debug!(token = %tokens[i], "ignoring stray positional argument");
            i += 1;
            continue;
        };
        let (key, value) = match flag.split_once('=') {
            Some((k, v)) => {
                i += 1;
                (k.to_string(), v.to_string())
            }
            None => match tokens.get(i + 1) {
                Some(next)
                    if !next.starts_with("--")
                        && !SWITCH_FLAGS.iter().any(|f| f.eq_ignore_ascii_case(flag)) =>
                {
                    i += 2;
                    (flag.to_string(), next.clone())
                }
                _ => {
                    i += 1;
                    (flag.to_string(), "true".to_string())
                }
            },
        };
        if key == "body" {
            args.body = Some(value);
        } else {
            args.flags.push((key, value));
        }
    }
    args
}

/// Credentials from global options (flag or env), falling back to the same
/// names given after the path.
fn flag_credentials(matches: &ArgMatches, trailing: Option<&RequestArgs>) -> Credentials {
    let pick = |name: &str| {
        matches
            .get_one::<String>(name)
            .cloned()
            .or_else(|| trailing.and_then(|a| a.flag(name)).map(str::to_string))
    };
    Credentials {
        token: pick("token"),
        api_key: pick("api-key"),
        username: pick("username"),
        password: pick("password"),
    }
}

/// Where this API's saved credentials live: keyed by the `--spec`
/// reference, or by the document title for the embedded document.
fn credentials_file(catalog: &Catalog, matches: &ArgMatches) -> Option<PathBuf> {
    let dir = matches
        .get_one::<String>("config-dir")
        .map(PathBuf::from)
        .or_else(default_config_dir)?;
    let key = match matches.get_one::<String>("spec") {
        Some(reference) => domain_from_spec(reference),
        None => sanitize_key(&catalog.title.to_lowercase()),
    };
    Some(credentials_path(&dir, &key))
}

fn save_auth(catalog: &Catalog, matches: &ArgMatches, path: Option<&Path>) -> anyhow::Result<i32> {
    let Some(path) = path else {
        print_error(
            "NO_CONFIG_DIR",
            "No home directory found; pass --config-dir",
            None,
        );
        return Ok(EXIT_CLI_ERROR);
    };
    let credentials = flag_credentials(matches, None);
    if credentials.is_empty() {
        print_error(
            "NO_CREDENTIALS",
            "Nothing to save; pass --token, --api-key, --username or --password",
            None,
        );
        return Ok(EXIT_CLI_ERROR);
    }
    save_credentials(path, &credentials.to_entries(catalog))?;
    println!("saved: {}", path.display());
    Ok(0)
}

fn parse_timeout(matches: &ArgMatches, arg_name: &str) -> Option<f64> {
    matches
        .get_one::<String>(arg_name)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| *v >= 0.0)
}

pub fn drive_command(
    catalog: &Catalog,
    matches: &ArgMatches,
    user_agent: &str,
) -> anyhow::Result<i32> {
    let json_output = matches.get_flag("json-output");
    let config = ExecutionConfig {
        output: if json_output {
            OutputFormat::Json
        } else {
            OutputFormat::Toon
        },
        conn_timeout_secs: parse_timeout(matches, "conn-timeout"),
        request_timeout_secs: parse_timeout(matches, "timeout"),
        user_agent,
        verbose: matches.get_flag("verbose"),
    };

    let Some((name, sub)) = matches.subcommand() else {
        let _ = build_cli(catalog).print_help();
        println!();
        return Ok(0);
    };

    if name == "list" {
        println!("{}", render_endpoints(&endpoint_rows(catalog), config.output));
        return Ok(0);
    }

    let credentials_file = credentials_file(catalog, matches);

    if name == "auth" {
        return save_auth(catalog, matches, credentials_file.as_deref());
    }

    let method = HttpMethod::from_str(name)?;
    let path = sub
        .get_one::<String>("path")
        .ok_or_else(|| anyhow::anyhow!("missing PATH argument"))?;
    let tokens: Vec<String> = sub
        .get_many::<String>("params")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    let args = parse_extra_params(&tokens);

    // Output flags are also honored after the path.
    let mut config = config;
    if args.flag("json").is_some() || args.flag("json-output").is_some() {
        config.output = OutputFormat::Json;
    }
    if args.flag("verbose").is_some() {
        config.verbose = true;
    }

    let request = match resolve(catalog, method, path, &args) {
        Ok(request) => request,
        Err(err) => {
            print_error(err.kind().as_str(), &err.to_string(), None);
            return Ok(err.exit_code());
        }
    };

    let base_url = matches
        .get_one::<String>("base-url")
        .cloned()
        .unwrap_or_else(|| catalog.base_url.clone());
    if base_url.is_empty() {
        print_error(
            "NO_BASE_URL",
            "The document declares no server URL; pass --base-url",
            None,
        );
        return Ok(EXIT_CLI_ERROR);
    }

    let stored = match &credentials_file {
        Some(path) => load_credentials_file(path)?,
        None => StoredCredentials::default(),
    };
    let credentials = flag_credentials(matches, Some(&args)).or_stored(catalog, &stored);
    let auth = apply_credentials(catalog, &credentials);

    match execute(&request, &base_url, &auth, &config) {
        Ok(response) => Ok(print_response(&response, config.output)),
        Err(err) => {
            let message = match std::error::Error::source(&err) {
                Some(source) => format!("{err}: {source}"),
                None => err.to_string(),
            };
            print_error("NETWORK_ERROR", &message, None);
            Ok(EXIT_NETWORK_ERROR)
        }
    }
}
