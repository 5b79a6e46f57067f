use std::env;

use anyhow::{Context, Result};
use openroute::output::{print_error, EXIT_CLI_ERROR};

const EMBEDDED_OPENAPI: &str = include_str!("petstore-openapi.yaml");
const APP_NAME: &str = "petstore-cli";

fn main() {
    if let Err(err) = real_main() {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn real_main() -> Result<()> {
    // Pre-scan for options needed before the command tree exists
    let args: Vec<String> = env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_tracing(verbose);

    let spec_ref = openroute::cli::pre_scan_value(&args, "--spec")
        .or_else(|| openroute::cli::pre_scan_value(&args, "-s"))
        .or_else(|| env::var("OPENROUTE_SPEC").ok());

    tracing::debug!(spec = ?spec_ref, "loading spec");

    // Without --spec, drive the bundled Petstore document
    let loaded = match spec_ref.as_deref() {
        Some(reference) => openroute::load_catalog(reference),
        None => openroute::parse_catalog(EMBEDDED_OPENAPI, None)
            .context("Embedded Petstore spec is invalid"),
    };
    let catalog = match loaded {
        Ok(catalog) => catalog,
        Err(err) => {
            print_error("SPEC_LOAD_ERROR", &format!("Failed to load spec: {err:#}"), None);
            std::process::exit(EXIT_CLI_ERROR);
        }
    };

    let matches = openroute::cli::build_cli(&catalog).get_matches();

    let user_agent = format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION"));
    let exit_code = openroute::cli::drive_command(&catalog, &matches, &user_agent)?;
    std::process::exit(exit_code);
}

/// Logs go to stderr so stdout stays machine-readable. `RUST_LOG` wins over
/// the `--verbose` default.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("openroute=debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
