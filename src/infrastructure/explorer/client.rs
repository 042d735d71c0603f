use async_trait::async_trait;
use bitcoin::Txid;
use reqwest::Client;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use super::{ExplorerClientError, TransactionBroadcaster, UtxoSource};
use crate::config::AppConfig;
use crate::domain::models::UtxoRecord;
use crate::utils::logging;

/// UTXO entry as returned by `GET /address/{address}/utxo`
#[derive(Debug, Deserialize)]
struct ExplorerUtxo {
    txid: String,
    vout: u32,
    value: u64,
    #[serde(default)]
    status: ExplorerUtxoStatus,
}

#[derive(Debug, Default, Deserialize)]
struct ExplorerUtxoStatus {
    #[serde(default)]
    confirmed: bool,
}

/// Client for an Esplora-compatible explorer (mempool.space, blockstream)
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    client: Client,
    base_url: String,
}

impl ExplorerClient {
    /// Create a new explorer client
    pub fn new(config: &AppConfig) -> Result<Self, ExplorerClientError> {
        Self::with_base_url(
            &config.network.explorer_url,
            Duration::from_secs(config.network.explorer_timeout_secs),
        )
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ExplorerClientError> {
        if base_url.trim().is_empty() {
            return Err(ExplorerClientError::ConfigError(
                "Explorer URL not configured".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ExplorerClientError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl UtxoSource for ExplorerClient {
    async fn fetch_utxos(&self, address: &str) -> Result<Vec<UtxoRecord>, ExplorerClientError> {
        let url = format!("{}/address/{}/utxo", self.base_url, address);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            logging::log_error(&format!(
                "Explorer returned status {} for UTXOs of {}",
                status, address
            ));
            return Err(ExplorerClientError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let utxos = parse_utxos(&body)?;
        logging::log_debug(&format!("Fetched {} UTXOs for {}", utxos.len(), address));
        Ok(utxos)
    }
}

#[async_trait]
impl TransactionBroadcaster for ExplorerClient {
    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String, ExplorerClientError> {
        let url = format!("{}/tx", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "text/plain")
            .body(raw_tx_hex.to_string())
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ExplorerClientError::BroadcastRejected(body.trim().to_string()));
        }

        let txid = parse_txid(&body)?;
        logging::log_info(&format!("Broadcast transaction {}", txid));
        Ok(txid)
    }
}

/// Parse the explorer's UTXO list. Entries whose txid is not a valid
/// transaction id are skipped.
pub fn parse_utxos(body: &str) -> Result<Vec<UtxoRecord>, ExplorerClientError> {
    let raw: Vec<ExplorerUtxo> = serde_json::from_str(body)?;
    let mut utxos = Vec::with_capacity(raw.len());

    for u in raw {
        match Txid::from_str(&u.txid) {
            Ok(txid) => utxos.push(UtxoRecord::new(
                txid.to_string(),
                u.vout,
                u.value,
                u.status.confirmed,
            )),
            Err(e) => logging::log_warning(&format!(
                "Skipping explorer UTXO with malformed txid '{}': {}",
                u.txid, e
            )),
        }
    }
    Ok(utxos)
}

/// The broadcast endpoint answers with the bare txid
pub fn parse_txid(body: &str) -> Result<String, ExplorerClientError> {
    let txid = body.trim();
    Txid::from_str(txid)
        .map(|t| t.to_string())
        .map_err(|_| {
            ExplorerClientError::BroadcastRejected(format!(
                "unexpected broadcast response: {}",
                txid
            ))
        })
}
