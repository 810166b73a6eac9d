// Copyright (c) 2025 - Cowboy AI, Inc.
//! Search Enclave CLI
//!
//! Composes the enclave from configuration and drives it against the
//! file-backed in-memory provider.
//!
//! Usage: search-enclave [--config <FILE>] [--state <FILE>] <validate|plan|apply|destroy|trigger>
//!
//! Environment:
//! - `SEARCH_ENCLAVE_CONFIG`: JSON configuration file (defaults otherwise)
//! - `SEARCH_ENCLAVE_STATE`: provider state file (default `search-enclave-state.json`)
//! - `SEARCH_ENCLAVE_*`: individual configuration overrides
//! - `NATS_URL`: publish events to NATS (requires the `nats` feature)

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use cim_search_enclave::{
    domain::ConfigStoreSpec,
    events::{EventSink, InMemoryEventSink, ProvisioningEvent},
    AutomationRunner, EnclaveResult, EnvironmentConfig, InMemoryProvider, Provisioner,
    SearchEnclave,
};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "search-enclave")]
#[command(about = "Compose, plan and provision a network-isolated search enclave", long_about = None)]
struct Cli {
    /// JSON configuration file; built-in defaults otherwise
    #[arg(long, env = "SEARCH_ENCLAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Provider state file
    #[arg(long, env = "SEARCH_ENCLAVE_STATE", default_value = "search-enclave-state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Command {
    /// Compose the enclave and run every preflight check
    Validate,
    /// Print the dependency-ordered plan
    Plan,
    /// Converge the provider state to the composed enclave
    Apply,
    /// Tear down everything the state file records
    Destroy,
    /// Run the automation runner once
    Trigger,
}

/// Where the CLI publishes provisioning events
enum CliSink {
    Memory(InMemoryEventSink),
    #[cfg(feature = "nats")]
    Nats(cim_search_enclave::NatsEventSink),
}

impl CliSink {
    async fn from_env() -> Result<Self> {
        #[cfg(feature = "nats")]
        if let Some(config) = cim_search_enclave::NatsConfig::from_env() {
            let sink = cim_search_enclave::NatsEventSink::connect(config)
                .await
                .context("Failed to connect to NATS")?;
            return Ok(Self::Nats(sink));
        }
        Ok(Self::Memory(InMemoryEventSink::new()))
    }
}

#[async_trait]
impl EventSink for CliSink {
    async fn publish(&self, event: &ProvisioningEvent) -> EnclaveResult<()> {
        match self {
            Self::Memory(sink) => sink.publish(event).await,
            #[cfg(feature = "nats")]
            Self::Nats(sink) => sink.publish(event).await,
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EnvironmentConfig> {
    let mut config = match path {
        Some(path) => EnvironmentConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => EnvironmentConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn compose(config: &EnvironmentConfig) -> Result<SearchEnclave> {
    let store = ConfigStoreSpec::from_dir(SearchEnclave::config_store_id()?, &config.config_seed_dir)
        .with_context(|| {
            format!(
                "Failed to read configuration seed directory {}",
                config.config_seed_dir.display()
            )
        })?;
    Ok(SearchEnclave::compose(config, store)?)
}

/// Refuse a state file recorded for another region or account
///
/// Literal ARNs (such as the domain's access policy) embed the configured
/// region and account, while recorded outputs embed the provider's.
fn ensure_same_environment(
    provider: &InMemoryProvider,
    config: &EnvironmentConfig,
    state_path: &Path,
) -> Result<()> {
    if provider.region() != config.region || provider.account() != config.account {
        bail!(
            "State file {} belongs to {}/{} but the configuration targets {}/{}",
            state_path.display(),
            provider.account(),
            provider.region(),
            config.account,
            config.region
        );
    }
    Ok(())
}

fn open_provider(config: &EnvironmentConfig, state_path: &Path) -> Result<InMemoryProvider> {
    let provider = InMemoryProvider::open(state_path, &config.region, &config.account)
        .with_context(|| format!("Failed to open state file {}", state_path.display()))?;
    ensure_same_environment(&provider, config, state_path)?;
    Ok(provider)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let state_path = cli.state;
    info!(environment = %config.name, region = %config.region, command = ?cli.command, "Starting");

    match cli.command {
        Command::Validate => {
            let enclave = compose(&config)?;
            enclave.preflight()?;
            info!(resources = enclave.graph().len(), "Enclave is valid");
        }
        Command::Plan => {
            let enclave = compose(&config)?;
            enclave.preflight()?;
            print_json(&enclave.plan())?;
        }
        Command::Apply => {
            let enclave = compose(&config)?;
            let provider = open_provider(&config, &state_path)?;
            let provisioner = Provisioner::new(provider, CliSink::from_env().await?);
            let result = provisioner.apply(&enclave).await;
            provisioner.provider().save(&state_path).await?;
            print_json(&result.context("Apply failed")?)?;
        }
        Command::Destroy => {
            let provider = open_provider(&config, &state_path)?;
            let provisioner = Provisioner::new(provider, CliSink::from_env().await?);
            let result = provisioner.destroy().await;
            provisioner.provider().save(&state_path).await?;
            print_json(&result.context("Destroy failed")?)?;
        }
        Command::Trigger => {
            let enclave = compose(&config)?;
            let provider = open_provider(&config, &state_path)?;
            let sink = CliSink::from_env().await?;
            let runner = AutomationRunner::new(&provider, &sink, enclave.ids().runner.clone());
            let run = runner.trigger().await?;
            provider.save(&state_path).await?;
            print_json(&run)?;
            if !run.succeeded() {
                bail!("Automation run {} failed", run.build_id);
            }
        }
    }

    Ok(())
}
