use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sui_json_rpc_types::SuiTransactionBlockResponseOptions;
use sui_sdk::SuiClientBuilder;
use sui_types::digests::TransactionDigest;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::ExplainError;
use crate::models::MoveCallInfo;
use crate::names::NameLookup;
use crate::util::{timestamp_from_value, value_to_i128, value_to_string};

pub const SUI_COIN_TYPE: &str = "0x2::sui::SUI";

// Who owns an object or a balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "address")]
pub enum Owner {
    Address(String),
    Object(String),
    Shared,
    Immutable,
    Unknown,
}

impl Owner {
    pub fn from_value(value: &Value) -> Owner {
        match value {
            Value::String(s) if s == "Immutable" => Owner::Immutable,
            Value::Object(map) => {
                if let Some(addr) = map.get("AddressOwner").and_then(Value::as_str) {
                    Owner::Address(addr.to_string())
                } else if let Some(addr) = map.get("ObjectOwner").and_then(Value::as_str) {
                    Owner::Object(addr.to_string())
                } else if map.contains_key("Shared") {
                    Owner::Shared
                } else if let Some(addr) = map
                    .get("ConsensusAddressOwner")
                    .and_then(|o| o.get("owner"))
                    .and_then(Value::as_str)
                {
                    Owner::Address(addr.to_string())
                } else {
                    Owner::Unknown
                }
            }
            _ => Owner::Unknown,
        }
    }

    // Address or parent object id; shared and immutable objects have none
    pub fn address(&self) -> Option<&str> {
        match self {
            Owner::Address(a) | Owner::Object(a) => Some(a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectChangeKind {
    Created,
    Transferred,
    Mutated,
    Deleted,
    Wrapped,
    Published,
    Other,
}

impl ObjectChangeKind {
    fn parse(kind: &str) -> Self {
        match kind {
            "created" => ObjectChangeKind::Created,
            "transferred" => ObjectChangeKind::Transferred,
            "mutated" => ObjectChangeKind::Mutated,
            "deleted" => ObjectChangeKind::Deleted,
            "wrapped" => ObjectChangeKind::Wrapped,
            "published" => ObjectChangeKind::Published,
            _ => ObjectChangeKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectChange {
    pub kind: ObjectChangeKind,
    pub object_id: String,
    pub object_type: Option<String>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub amount: Option<i128>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinBalanceChange {
    pub owner: Owner,
    pub coin_type: String,
    pub amount: i128,
}

// Gas figures in MIST
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasSummary {
    pub computation_cost: i128,
    pub storage_cost: i128,
    pub storage_rebate: i128,
    pub non_refundable_storage_fee: i128,
    pub total_cost: Option<i128>,
    pub gas_price: Option<i128>,
}

impl GasSummary {
    pub fn total(&self) -> i128 {
        self.total_cost.unwrap_or(
            self.computation_cost + self.storage_cost - self.storage_rebate
                + self.non_refundable_storage_fee,
        )
    }
}

/// Sui transaction in the shape the explainer works on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiTransaction {
    pub digest: String,
    pub sender: Option<String>,
    pub status: Option<String>,
    pub gas: GasSummary,
    pub object_changes: Vec<ObjectChange>,
    pub balance_changes: Vec<CoinBalanceChange>,
    pub move_calls: Vec<MoveCallInfo>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Provider body this was normalized from, returned to callers untouched.
    #[serde(skip)]
    pub raw: Option<Value>,
}

// Primary data provider
pub struct BlockberryClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl BlockberryClient {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        BlockberryClient {
            http,
            base_url: base_url.into(),
            api_key,
        }
    }

    // Raw JSON-RPC style transaction body, unwrapped from its `result` envelope
    pub async fn raw_transaction(&self, digest: &str) -> Result<Value, ExplainError> {
        let url = self.endpoint(&["raw-transactions", digest])?;
        let response = self
            .get(url)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExplainError::Upstream {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let mut body: Value = response.json().await?;
        if body.get("result").is_some_and(Value::is_object) {
            return Ok(body["result"].take());
        }
        Ok(body)
    }

    pub async fn account_name(&self, address: &str) -> Option<String> {
        let url = self.endpoint(&["accounts", address]).ok()?;
        let response = match self.get(url).header("Accept", "*/*").send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(%address, status = r.status().as_u16(), "Account name lookup failed");
                return None;
            }
            Err(e) => {
                debug!(%address, "Account name lookup failed: {}", e);
                return None;
            }
        };
        let body: Value = response.json().await.ok()?;
        body.get("accountName")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.http.get(url);
        match &self.api_key {
            Some(key) => request.header("X-API-Key", key),
            None => request,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ExplainError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ExplainError::Decode(format!("Invalid Blockberry URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ExplainError::Decode("Blockberry URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl NameLookup for BlockberryClient {
    async fn lookup(&self, address: &str) -> Option<String> {
        self.account_name(address).await
    }
}

// Direct full-node access, used only when the primary provider fails
pub struct FullNodeClient {
    rpc_url: String,
    client: OnceCell<sui_sdk::SuiClient>,
}

impl FullNodeClient {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        FullNodeClient {
            rpc_url: rpc_url.into(),
            client: OnceCell::new(),
        }
    }

    // Connect lazily; building the SDK client talks to the node
    async fn client(&self) -> Result<&sui_sdk::SuiClient> {
        self.client
            .get_or_try_init(|| async {
                SuiClientBuilder::default()
                    .build(&self.rpc_url)
                    .await
                    .context("Failed to build Sui client")
            })
            .await
    }

    //Fetch a transaction with all details, as JSON-RPC shaped JSON
    pub async fn transaction(&self, digest: TransactionDigest) -> Result<Value> {
        let tx_response = self
            .client()
            .await?
            .read_api()
            .get_transaction_with_options(
                digest,
                SuiTransactionBlockResponseOptions {
                    show_input: true,
                    show_effects: true,
                    show_events: true,
                    show_object_changes: true,
                    show_balance_changes: true,
                    ..Default::default()
                },
            )
            .await
            .context("Failed to fetch transaction from Sui")?;

        serde_json::to_value(&tx_response).context("Failed to encode Sui response")
    }
}

/// Fetches from Blockberry, falling back to the full node on any primary failure.
///
/// The error only surfaces when both fail, and names the primary's reason.
pub async fn fetch_with_fallback(
    primary: &BlockberryClient,
    fallback: &FullNodeClient,
    digest: &str,
) -> Result<SuiTransaction, ExplainError> {
    let digest = digest.trim();
    let parsed: TransactionDigest = digest
        .parse()
        .map_err(|e| ExplainError::Validation(format!("Invalid transaction digest format: {}", e)))?;

    info!(%digest, "Fetching Sui transaction");
    let primary_error = match primary.raw_transaction(digest).await {
        Ok(raw) => match normalize_transaction(&raw) {
            Ok(tx) => return Ok(tx),
            Err(e) => e,
        },
        Err(e) => e,
    };

    warn!(%digest, "Blockberry API failed, falling back to Sui RPC: {}", primary_error);
    match fallback.transaction(parsed).await {
        Ok(raw) => normalize_transaction(&raw).map_err(|e| {
            warn!(%digest, "Sui RPC returned an unusable body: {}", e);
            ExplainError::Fetch(primary_error.to_string())
        }),
        Err(e) => {
            warn!(%digest, "Sui RPC fallback failed: {:#}", e);
            Err(ExplainError::Fetch(primary_error.to_string()))
        }
    }
}

/// Maps a JSON-RPC shaped transaction body onto [`SuiTransaction`].
pub fn normalize_transaction(raw: &Value) -> Result<SuiTransaction, ExplainError> {
    if !raw.is_object() {
        return Err(ExplainError::Decode(
            "Sui transaction body is not an object".to_string(),
        ));
    }
    let effects = raw.get("effects").or_else(|| raw.get("effect"));
    if effects.is_none() && raw.get("transaction").is_none() {
        return Err(ExplainError::Decode(
            "Sui transaction body has neither transaction nor effects".to_string(),
        ));
    }

    let tx_block = raw.get("transaction");
    let sender = tx_block
        .and_then(|t| t.pointer("/data/sender").or_else(|| t.get("sender")))
        .or_else(|| raw.get("sender"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let status = effects
        .and_then(|e| e.pointer("/status/status"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let gas_used = effects.and_then(|e| e.get("gasUsed"));
    let gas_field = |name: &str| {
        gas_used
            .and_then(|g| g.get(name))
            .and_then(value_to_i128)
    };
    let gas = GasSummary {
        computation_cost: gas_field("computationCost").unwrap_or_default(),
        storage_cost: gas_field("storageCost").unwrap_or_default(),
        storage_rebate: gas_field("storageRebate").unwrap_or_default(),
        non_refundable_storage_fee: gas_field("nonRefundableStorageFee").unwrap_or_default(),
        total_cost: gas_field("totalCost"),
        gas_price: gas_field("gasPrice").or_else(|| {
            tx_block
                .and_then(|t| t.pointer("/data/gasData/price"))
                .and_then(value_to_i128)
        }),
    };

    let object_changes = raw
        .get("objectChanges")
        .and_then(Value::as_array)
        .map(|changes| changes.iter().filter_map(parse_object_change).collect())
        .unwrap_or_default();

    let balance_changes = raw
        .get("balanceChanges")
        .and_then(Value::as_array)
        .map(|changes| changes.iter().filter_map(parse_balance_change).collect())
        .unwrap_or_default();

    let commands = tx_block
        .and_then(|t| {
            t.pointer("/data/transaction/transactions")
                .or_else(|| t.get("transactions"))
        })
        .and_then(Value::as_array);
    let move_calls = commands
        .map(|cmds| cmds.iter().filter_map(parse_move_call).collect())
        .unwrap_or_default();

    let timestamp = raw
        .get("timestampMs")
        .or_else(|| effects.and_then(|e| e.get("timestampMs")))
        .or_else(|| raw.get("timestamp"))
        .and_then(timestamp_from_value);

    Ok(SuiTransaction {
        digest: raw
            .get("digest")
            .and_then(value_to_string)
            .unwrap_or_default(),
        sender,
        status,
        gas,
        object_changes,
        balance_changes,
        move_calls,
        timestamp,
        raw: Some(raw.clone()),
    })
}

fn parse_object_change(change: &Value) -> Option<ObjectChange> {
    let kind = ObjectChangeKind::parse(change.get("type")?.as_str()?);
    let object_id = change
        .get("objectId")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    // The new owner can hide under four encodings; first one present wins
    let recipient = [
        ("recipient", "AddressOwner"),
        ("recipient", "ObjectOwner"),
        ("owner", "AddressOwner"),
        ("owner", "ObjectOwner"),
    ]
    .iter()
    .find_map(|(field, encoding)| {
        change
            .get(*field)
            .and_then(|o| o.get(*encoding))
            .and_then(Value::as_str)
    })
    .map(str::to_string);

    Some(ObjectChange {
        kind,
        object_id,
        object_type: change
            .get("objectType")
            .and_then(Value::as_str)
            .map(str::to_string),
        sender: change
            .get("sender")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        recipient,
        amount: change.get("amount").and_then(value_to_i128),
    })
}

fn parse_balance_change(change: &Value) -> Option<CoinBalanceChange> {
    Some(CoinBalanceChange {
        owner: change
            .get("owner")
            .map(Owner::from_value)
            .unwrap_or(Owner::Unknown),
        coin_type: change
            .get("coinType")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .unwrap_or(SUI_COIN_TYPE)
            .to_string(),
        amount: change.get("amount").and_then(value_to_i128)?,
    })
}

fn parse_move_call(command: &Value) -> Option<MoveCallInfo> {
    let call = command.get("MoveCall")?;
    Some(MoveCallInfo {
        package: call.get("package")?.as_str()?.to_string(),
        module: call.get("module")?.as_str()?.to_string(),
        function: call.get("function")?.as_str()?.to_string(),
        arguments: call
            .get("arguments")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    })
}
