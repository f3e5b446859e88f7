#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for running webmail diagnostic probes

use clap::{Parser, Subcommand};
use mailprobe::{
    Endpoint, JsonRenderer, MailTargets, ProbeConfig, Renderer, RunMode, Suite, TextRenderer,
    TlsMode,
};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mailprobe")]
#[command(about = "Diagnostic probes for IMAP/SMTP webmail installations")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Run independent checks concurrently
    #[arg(long, global = true)]
    concurrent: bool,

    /// Skip checks not started after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    deadline: Option<f64>,

    /// Per-check I/O timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<f64>,
}

#[derive(Subcommand)]
enum Command {
    /// Try the IMAP credentials at raw, library and application level
    Login,

    /// Check ports, installation, config file and database
    Env,

    /// Connect to HOST:PORT and print its greeting
    Socket {
        host: String,
        port: u16,

        /// Transport: plain, starttls or tls
        #[arg(long, default_value = "plain")]
        tls: TlsMode,
    },

    /// Environment checks plus login when credentials are set
    All,
}

fn parse_secs(flag: &str, secs: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| anyhow::anyhow!("Invalid --{flag} '{secs}': {e}"))
}

fn apply_flags(mut config: ProbeConfig, args: &Args) -> anyhow::Result<ProbeConfig> {
    if args.concurrent {
        config.mode = RunMode::Concurrent;
    }
    if let Some(secs) = args.deadline {
        config.deadline = Some(parse_secs("deadline", secs)?);
    }
    if let Some(secs) = args.timeout {
        config.timeout = parse_secs("timeout", secs)?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // The library selects its provider explicitly; this only covers
    // anything else in the process that asks for the default.
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = apply_flags(ProbeConfig::from_env()?, &args)?;

    let suite = match &args.command {
        Command::Login => Suite::login(config, &MailTargets::from_env()?)?,
        Command::Env => Suite::environment(config, &MailTargets::from_env()?)?,
        Command::All => Suite::all(config, &MailTargets::from_env()?)?,
        Command::Socket { host, port, tls } => {
            Suite::socket(config, Endpoint::new(host.clone(), *port).with_tls(*tls))?
        }
    };

    let report = suite.run().await;

    if args.json {
        println!("{}", JsonRenderer.render(&report));
    } else {
        print!("{}", TextRenderer.render(&report));
    }

    Ok(if report.is_healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
