use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use super::{ProverClientError, SpellProver};
use crate::config::AppConfig;
use crate::domain::models::{SpellContext, TransactionPair, UtxoRecord};
use crate::utils::logging;

/// Body of `POST /spells/prove`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProveRequest {
    /// Spell as a YAML string
    pub spell: String,
    pub binaries: BTreeMap<String, String>,
    pub prev_txs: Vec<Value>,
    /// `txid:vout` of the UTXO paying the fees
    pub funding_utxo: String,
    pub funding_utxo_value: u64,
    pub change_address: String,
    pub fee_rate: f64,
    pub chain: String,
}

impl ProveRequest {
    pub fn new(
        spell: &SpellContext,
        funding_utxo: &UtxoRecord,
        change_address: &str,
        fee_rate: f64,
    ) -> Self {
        Self {
            spell: spell.spell.clone(),
            binaries: spell.binaries.clone(),
            prev_txs: spell
                .prev_txs
                .iter()
                .map(|tx| json!({ "bitcoin": tx }))
                .collect(),
            funding_utxo: funding_utxo.id.to_string(),
            funding_utxo_value: funding_utxo.value_sats,
            change_address: change_address.to_string(),
            fee_rate,
            chain: "bitcoin".to_string(),
        }
    }
}

/// Client for the Charms prover API
#[derive(Debug, Clone)]
pub struct ProverClient {
    client: Client,
    prove_url: String,
}

impl ProverClient {
    /// Create a new prover client
    pub fn new(config: &AppConfig) -> Result<Self, ProverClientError> {
        if config.network.prover_url.trim().is_empty() {
            return Err(ProverClientError::ConfigError(
                "Prover URL not configured".to_string(),
            ));
        }
        // Proof generation routinely takes minutes
        let client = Client::builder()
            .timeout(Duration::from_secs(config.network.prover_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            prove_url: format!(
                "{}/spells/prove",
                config.network.prover_url.trim_end_matches('/')
            ),
        })
    }
}

#[async_trait]
impl SpellProver for ProverClient {
    async fn prove(&self, request: &ProveRequest) -> Result<TransactionPair, ProverClientError> {
        logging::log_info(&format!(
            "Submitting spell to prover (funding {} = {} sats)",
            request.funding_utxo, request.funding_utxo_value
        ));

        let response = self.client.post(&self.prove_url).json(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            logging::log_error(&format!("Prover returned status {}: {}", status, body));
            return Err(ProverClientError::Rejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let value: Value = serde_json::from_str(&body)?;
        parse_prove_response(&value)
    }
}

/// The prover answers with `[commit, spell]` where each item is either a hex
/// string or `{"bitcoin": hex}`
pub fn parse_prove_response(value: &Value) -> Result<TransactionPair, ProverClientError> {
    let items = value
        .as_array()
        .filter(|items| items.len() == 2)
        .ok_or_else(|| {
            ProverClientError::InvalidResponse(format!("expected two transactions, got {}", value))
        })?;

    let commit_tx = extract_tx_hex(&items[0])?;
    let spell_tx = extract_tx_hex(&items[1])?;
    Ok(TransactionPair { commit_tx, spell_tx })
}

fn extract_tx_hex(item: &Value) -> Result<String, ProverClientError> {
    let raw = item
        .as_str()
        .or_else(|| item.get("bitcoin").and_then(Value::as_str))
        .ok_or_else(|| ProverClientError::InvalidResponse(format!("not a transaction: {}", item)))?;

    hex::decode(raw)
        .map_err(|e| ProverClientError::InvalidResponse(format!("transaction is not hex: {}", e)))?;
    Ok(raw.to_string())
}
