//! Token transfer executor and address derivation
//!
//! The executor is the on-chain boundary: submit a transfer, then ask
//! whether a given transfer id is confirmed. Confirmation is eventually
//! consistent; an unconfirmed transfer leaves its ledger entry unsettled
//! and the distributor retries it on a later pass.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::MannaError;

/// External token-transfer executor
#[async_trait]
pub trait TransferExecutor: Send + Sync {
    /// Submit a transfer, returning the external transfer identifier
    async fn transfer(&self, address: &str, amount: i64) -> Result<String, MannaError>;

    /// Is the given transfer confirmed on-chain?
    async fn is_confirmed(&self, transfer_id: &str) -> Result<bool, MannaError>;
}

/// Deterministic address derivation from a sender's public key: SHA-256
/// over the key bytes (hex-decoded when the key is hex, raw otherwise),
/// last 20 bytes, 0x-prefixed hex.
pub fn sender_key_to_address(sender_key: &str) -> String {
    let stripped = sender_key.strip_prefix("0x").unwrap_or(sender_key);
    let bytes = hex::decode(stripped).unwrap_or_else(|_| sender_key.as_bytes().to_vec());

    let digest = Sha256::digest(&bytes);
    format!("0x{}", hex::encode(&digest[digest.len() - 20..]))
}

// ============================================================================
// HTTP relay implementation
// ============================================================================

#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    address: &'a str,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TransferStatus {
    #[serde(default)]
    confirmed: bool,
}

/// Transfer executor backed by an HTTP relay service
pub struct HttpTransferExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransferExecutor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TransferExecutor for HttpTransferExecutor {
    async fn transfer(&self, address: &str, amount: i64) -> Result<String, MannaError> {
        let response = self
            .client
            .post(format!("{}/transfers", self.base_url))
            .json(&TransferRequest { address, amount })
            .send()
            .await
            .map_err(|e| MannaError::Transfer(format!("Transfer submission failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(MannaError::Transfer(format!(
                "Transfer relay returned {}",
                response.status()
            )));
        }

        let body: TransferResponse = response
            .json()
            .await
            .map_err(|e| MannaError::Transfer(format!("Transfer response parse failed: {}", e)))?;

        debug!(address = %address, amount, transfer_id = %body.id, "Transfer submitted");
        Ok(body.id)
    }

    async fn is_confirmed(&self, transfer_id: &str) -> Result<bool, MannaError> {
        let response = self
            .client
            .get(format!("{}/transfers/{}", self.base_url, transfer_id))
            .send()
            .await
            .map_err(|e| MannaError::Transfer(format!("Confirmation check failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(MannaError::Transfer(format!(
                "Transfer relay returned {}",
                response.status()
            )));
        }

        let status: TransferStatus = response
            .json()
            .await
            .map_err(|e| MannaError::Transfer(format!("Status parse failed: {}", e)))?;

        Ok(status.confirmed)
    }
}
