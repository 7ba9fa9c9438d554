use anyhow::{Context, Result};
use clap::Parser;
use gmail_cleanup::cli::{self, Cli, Commands, ProgressReporter};
use gmail_cleanup::config::Config;
use gmail_cleanup::error::CleanupError;
use gmail_cleanup::server;
use gmail_cleanup::service::GmailServiceProvider;
use gmail_cleanup::tools::{CleanupTools, ToolSettings};
use gmail_cleanup::unsubscribe::HttpLinkFetcher;
use serde_json::json;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Exit with proper code on error
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        eprintln!("\nFor help, run: gmail-cleanup --help");
        process::exit(1);
    }
}

fn init_tracing(verbose: bool, log_json: bool) {
    let default_directive = if verbose {
        "gmail_cleanup=debug,info"
    } else {
        "gmail_cleanup=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    // stdout carries only tool results
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // On non-Windows platforms, use aws-lc-rs; on Windows, use ring
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    if let Commands::InitConfig { output, force } = &cli.command {
        if output.exists() && !force {
            return Err(CleanupError::ConfigError(format!(
                "Configuration file already exists at {:?}. Use --force to overwrite.",
                output
            ))
            .into());
        }
        Config::create_example(output).await?;
        eprintln!("Created example configuration file at: {:?}", output);
        return Ok(());
    }

    let mut config = Config::load(&cli.config)
        .await
        .with_context(|| format!("loading {:?}", cli.config))?;
    config.apply_env_overrides()?;
    let config = Arc::new(config);

    if let Commands::Auth { force } = &cli.command {
        let paths = cli::authenticate(&config, *force).await?;
        println!("{}", serde_json::to_string_pretty(&json!({ "tokens": paths }))?);
        return Ok(());
    }

    let tools = Arc::new(CleanupTools::new(
        Arc::new(GmailServiceProvider::new(Arc::clone(&config))),
        Arc::new(HttpLinkFetcher::new()?),
        ToolSettings::from_config(&config),
    ));

    if let Commands::Serve { bind } = &cli.command {
        let bind = bind.as_deref().unwrap_or(&config.server.bind);
        let addr: SocketAddr = bind
            .parse()
            .with_context(|| format!("invalid bind address '{}'", bind))?;
        server::serve(addr, tools).await?;
        return Ok(());
    }

    let (tool, args) = cli
        .command
        .tool_call()
        .context("command does not map to a tool")?;

    tracing::info!("gmail-cleanup running {}", tool);
    let reporter = ProgressReporter::new();
    let spinner = reporter.add_spinner(&format!("Running {}...", tool));
    let reply = tools.call(tool, args).await;
    reporter.finish_spinner(&spinner);

    println!("{}", serde_json::to_string_pretty(&reply)?);

    if reply.get("error").is_some() {
        process::exit(2);
    }
    Ok(())
}
