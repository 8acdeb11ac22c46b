//! glfixture: GitLab test-instance provisioning CLI.
//!
//! Entry point and error handling boundary. Uses `anyhow` for
//! ergonomic error propagation and user-facing messages.

mod cli;

use glfixture::config;
use glfixture::constants;
use glfixture::env;
use glfixture::issuer;
use glfixture::license;

use std::process;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::args::{Cli, Command, IssueArgs, OutputFormat, TokenArgs, VerifyArgs};
use config::Config;
use env::Env;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Err(err) = run(cli) {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

/// Log to stderr; `RUST_LOG` wins over the `-v`/`-q` flags.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,{}={level}", constants::APP_NAME)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    if let Command::Version = cli.command {
        return run_version();
    }

    let working_dir = std::env::current_dir().ok();
    let mut config = Config::load(cli.config.as_deref(), working_dir.as_deref(), &Env::real())
        .context("failed to load configuration")?;

    match cli.command {
        Command::Issue(args) => run_issue(&args, &mut config),
        Command::Verify(args) => run_verify(&args, &config),
        Command::Token(args) => run_token(&args, &mut config),
        Command::Version => run_version(),
    }
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

/// Print detailed version and build information.
fn run_version() -> Result<()> {
    use colored::Colorize;

    println!(
        "{} {}",
        constants::APP_NAME.bold(),
        constants::VERSION.green().bold()
    );
    println!("{}     {}", "target:".dimmed(), constants::TARGET);
    Ok(())
}

/// Generate key material and issue a license.
fn run_issue(args: &IssueArgs, config: &mut Config) -> Result<()> {
    args.apply(config);
    config.validate()?;

    let issue_date = args.date.unwrap_or_else(today);
    let issuer = issuer::Issuer::new(
        config.paths.clone(),
        config.license_template(),
        args.key_source(),
    );
    let report = issuer.run(issue_date).context("license issuance failed")?;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .context("failed to serialize issue report")?;
            println!("{json}");
        }
        OutputFormat::Terminal => cli::print_issue_summary(&report),
    }
    Ok(())
}

/// Verify a license artifact against a public key.
fn run_verify(args: &VerifyArgs, config: &Config) -> Result<()> {
    let Some((license_path, public_key_path)) = args.resolve(config) else {
        bail!("no public key given and none configured");
    };

    let record = issuer::verify_files(&license_path, &public_key_path)
        .with_context(|| format!("failed to verify {}", license_path.display()))?;
    let status = record.expiry_status(args.date.unwrap_or_else(today));

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::json!({ "license": &record, "expiry": status });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Terminal => cli::print_verification(&record, status),
    }

    if status == license::ExpiryStatus::Expired {
        bail!("license expired on {}", record.expires_at);
    }
    Ok(())
}

/// Render the access token fixture script.
fn run_token(args: &TokenArgs, config: &mut Config) -> Result<()> {
    args.apply(config);
    let script = config.token.render().context("invalid token fixture")?;

    match args.output {
        Some(ref path) => {
            std::fs::write(path, &script)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote token script");
        }
        None => print!("{script}"),
    }
    Ok(())
}
