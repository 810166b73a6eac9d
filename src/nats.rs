// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS event sink
//!
//! Publishes provisioning events as JSON on `enclave.{scope}.{operation}`
//! subjects.

use async_nats::{Client, ConnectOptions};
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{EnclaveError, EnclaveResult};
use crate::events::{EventSink, ProvisioningEvent};

/// Where and how the sink connects
#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub servers: Vec<String>,
    /// Connection name shown in server monitoring
    pub name: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "search-enclave".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl NatsConfig {
    /// Read `NATS_URL` (comma-separated) and `NATS_CLIENT_NAME`
    ///
    /// Returns `None` when no server is configured.
    pub fn from_env() -> Option<Self> {
        let servers: Vec<String> = std::env::var("NATS_URL")
            .ok()?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if servers.is_empty() {
            return None;
        }
        let defaults = Self::default();
        Some(Self {
            servers,
            name: std::env::var("NATS_CLIENT_NAME").unwrap_or(defaults.name),
            ..defaults
        })
    }
}

/// Event sink backed by a NATS connection
#[derive(Clone)]
pub struct NatsEventSink {
    client: Client,
}

impl NatsEventSink {
    pub async fn connect(config: NatsConfig) -> EnclaveResult<Self> {
        let options = ConnectOptions::new()
            .name(&config.name)
            .connection_timeout(config.connect_timeout)
            .request_timeout(Some(config.request_timeout));

        let client = async_nats::connect_with_options(config.servers.join(","), options)
            .await
            .map_err(|e| EnclaveError::Publish(format!("cannot connect to NATS: {}", e)))?;

        info!(servers = ?config.servers, name = %config.name, "Connected event sink to NATS");

        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait::async_trait]
impl EventSink for NatsEventSink {
    async fn publish(&self, event: &ProvisioningEvent) -> EnclaveResult<()> {
        let subject = event.subject();
        let payload = serde_json::to_vec(event)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| EnclaveError::Publish(e.to_string()))?;

        debug!(subject = %subject, event_id = %event.event_id, "Published provisioning event");
        Ok(())
    }
}
