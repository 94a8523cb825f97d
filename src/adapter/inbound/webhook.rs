//! Push-path ingestion of `MarketCreated` deliveries.
//!
//! HTTP routing lives outside this crate; whatever receives the request
//! hands the raw body to [`WebhookIngress::deliver`]. The payload carries
//! the log fields in camelCase, with `params` either as a JSON object or
//! as the ABI `bytes` value (hex-encoded UTF-8 JSON).

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::application::ingest::{EventListener, IngestOutcome};
use crate::domain::MarketId;
use crate::error::{Error, Result};
use crate::port::MarketCreatedEvent;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload {
    market: Address,
    creator: Address,
    #[serde(default)]
    market_type: String,
    params: ParamsField,
    transaction_hash: B256,
    log_index: u64,
    block_number: u64,
    contract_address: Address,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParamsField {
    Object(serde_json::Map<String, serde_json::Value>),
    Encoded(String),
}

impl ParamsField {
    fn into_value(self) -> Result<serde_json::Value> {
        match self {
            Self::Object(map) => Ok(serde_json::Value::Object(map)),
            Self::Encoded(text) => {
                let text = text.trim();
                if let Some(hex_body) = text.strip_prefix("0x") {
                    let bytes = hex::decode(hex_body)
                        .map_err(|e| Error::Parse(format!("params: invalid hex: {e}")))?;
                    Ok(serde_json::from_slice(&bytes)?)
                } else {
                    Ok(serde_json::from_str(text)?)
                }
            }
        }
    }
}

/// Decode a webhook body into the event the log poll would have produced.
pub fn decode_payload(body: &[u8]) -> Result<MarketCreatedEvent> {
    let payload: WebhookPayload = serde_json::from_slice(body)?;
    let params = payload.params.into_value()?;
    Ok(MarketCreatedEvent {
        market: MarketId::new(payload.market),
        creator: payload.creator,
        market_type: payload.market_type,
        params,
        transaction_hash: payload.transaction_hash,
        log_index: payload.log_index,
        block_number: payload.block_number,
        contract_address: payload.contract_address,
    })
}

/// Feeds decoded deliveries into the shared [`EventListener`].
#[derive(Clone)]
pub struct WebhookIngress {
    listener: Arc<EventListener>,
}

impl WebhookIngress {
    pub fn new(listener: Arc<EventListener>) -> Self {
        Self { listener }
    }

    /// Decode and ingest one delivery.
    ///
    /// An undecodable body is dropped as [`IngestOutcome::Malformed`];
    /// only store failures surface as errors.
    pub async fn deliver(&self, body: &[u8]) -> Result<IngestOutcome> {
        let event = match decode_payload(body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, bytes = body.len(), "Rejecting malformed webhook payload");
                return Ok(IngestOutcome::Malformed(e.to_string()));
            }
        };
        debug!(event = %event.key(), market = %event.market, "Webhook delivery");
        self.listener.handle_event(event).await
    }
}
