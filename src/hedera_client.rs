use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ExplainError;
use crate::names::NameLookup;
use crate::util::{de_opt_i64, de_opt_u32, parse_hedera_timestamp};

/// Hedera transaction in the shape the explainer works on.
///
/// Amounts stay in tinybar / raw token units; formatting happens later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HederaTransaction {
    pub transaction_id: String,
    pub transaction_hash: Option<String>,
    pub transaction_type: String,
    pub result: Option<String>,
    pub fee: i64,
    pub transfers: Vec<HbarTransfer>,
    pub token_transfers: Vec<TokenTransfer>,
    pub consensus_timestamp: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HbarTransfer {
    pub account: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub token_id: String,
    pub account: String,
    pub amount: i64,
    pub decimals: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TokenInfo {
    pub symbol: Option<String>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_u32")]
    pub decimals: Option<u32>,
}

// Raw mirror node record; only the fields we read
#[derive(Debug, Deserialize)]
struct MirrorTransaction {
    transaction_id: Option<String>,
    transaction_hash: Option<String>,
    consensus_timestamp: Option<String>,
    name: Option<String>,
    result: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    charged_tx_fee: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    transaction_fee: Option<i64>,
    transfers: Option<Vec<MirrorTransfer>>,
    token_transfers: Option<Vec<MirrorTokenTransfer>>,
    memo_base64: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MirrorTransfer {
    account: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MirrorTokenTransfer {
    token_id: Option<String>,
    account: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    amount: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_u32")]
    decimals: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct MirrorAccount {
    alias: Option<String>,
}

/// `0.0.123@1699000000.123456789` → `0.0.123-1699000000-123456789`.
///
/// Anything that is not an `@` id is returned trimmed and untouched (hashes, `-` ids).
pub fn normalize_transaction_id(raw: &str) -> String {
    let raw = raw.trim();
    if let Some((account, valid_start)) = raw.split_once('@') {
        return format!("{}-{}", account, valid_start.replacen('.', "-", 1));
    }
    raw.to_string()
}

// True for shard.realm.num-seconds-nanos
pub fn is_transaction_id(id: &str) -> bool {
    let parts: Vec<&str> = id.split('-').collect();
    parts.len() == 3
        && parts[0].split('.').count() == 3
        && parts[0].split('.').all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
        && parts[1..]
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

// Client for the Hedera Mirror Node REST API
pub struct MirrorNodeClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl MirrorNodeClient {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        MirrorNodeClient {
            http,
            base_url: base_url.into(),
            api_key,
        }
    }

    // Fetch a transaction by id, falling back to a hash search when a non-id lookup 404s
    pub async fn fetch_transaction(&self, digest: &str) -> Result<HederaTransaction, ExplainError> {
        let id = normalize_transaction_id(digest);
        if id.is_empty() {
            return Err(ExplainError::Validation(
                "Transaction digest is required".to_string(),
            ));
        }

        let structured = is_transaction_id(&id);
        let kind = if structured { "id" } else { "hash" };
        info!(%id, kind, "Fetching Hedera transaction");
        if let Some(tx) = self.lookup_by_id(&id).await? {
            return Ok(tx);
        }
        // The mirror node rejects ids in the hash filter, so a missing id is final
        if structured {
            return Err(ExplainError::NotFound(id));
        }

        debug!(%id, "Direct lookup returned 404, searching by hash");
        let resolved = self.search_by_hash(digest.trim()).await?;
        match resolved {
            Some(tx_id) if normalize_transaction_id(&tx_id) != id => {
                let tx_id = normalize_transaction_id(&tx_id);
                self.lookup_by_id(&tx_id)
                    .await?
                    .ok_or(ExplainError::NotFound(tx_id))
            }
            _ => Err(ExplainError::NotFound(digest.trim().to_string())),
        }
    }

    // None means the mirror node answered 404
    async fn lookup_by_id(&self, id: &str) -> Result<Option<HederaTransaction>, ExplainError> {
        let url = self.endpoint(&["transactions", id])?;
        let response = self.get(url).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(upstream(status));
        }

        let body: Value = response.json().await?;
        let record = match body.get("transactions") {
            Some(Value::Array(list)) => match list.first() {
                Some(first) => first.clone(),
                None => return Ok(None),
            },
            _ => body,
        };

        normalize_transaction(record).map(Some)
    }

    async fn search_by_hash(&self, hash: &str) -> Result<Option<String>, ExplainError> {
        let mut url = self.endpoint(&["transactions"])?;
        url.query_pairs_mut().append_pair("transactionhash", hash);
        let response = self.get(url).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(upstream(status));
        }

        let body: Value = response.json().await?;
        Ok(body
            .get("transactions")
            .and_then(Value::as_array)
            .and_then(|list| list.first())
            .and_then(|tx| tx.get("transaction_id"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    pub async fn account_alias(&self, account: &str) -> Option<String> {
        let url = self.endpoint(&["accounts", account]).ok()?;
        let response = match self.get(url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(%account, status = r.status().as_u16(), "Account lookup failed");
                return None;
            }
            Err(e) => {
                warn!(%account, "Account lookup failed: {}", e);
                return None;
            }
        };
        let account_info: MirrorAccount = response.json().await.ok()?;
        account_info.alias.filter(|a| !a.is_empty())
    }

    pub async fn token_info(&self, token_id: &str) -> Option<TokenInfo> {
        let url = self.endpoint(&["tokens", token_id]).ok()?;
        match self.get(url).send().await {
            Ok(r) if r.status().is_success() => r.json::<TokenInfo>().await.ok(),
            Ok(r) => {
                debug!(%token_id, status = r.status().as_u16(), "Token lookup failed");
                None
            }
            Err(e) => {
                warn!(%token_id, "Token lookup failed: {}", e);
                None
            }
        }
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.http.get(url).header("Accept", "application/json");
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ExplainError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ExplainError::Decode(format!("Invalid mirror node URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ExplainError::Decode("Mirror node URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl NameLookup for MirrorNodeClient {
    async fn lookup(&self, address: &str) -> Option<String> {
        self.account_alias(address).await
    }
}

fn upstream(status: StatusCode) -> ExplainError {
    ExplainError::Upstream {
        status: status.as_u16(),
        message: status.canonical_reason().unwrap_or("Unknown").to_string(),
    }
}

/// Maps one mirror node record onto [`HederaTransaction`].
pub fn normalize_transaction(record: Value) -> Result<HederaTransaction, ExplainError> {
    let mirror: MirrorTransaction = serde_json::from_value(record)
        .map_err(|e| ExplainError::Decode(format!("Malformed Hedera transaction: {}", e)))?;

    let transaction_id = mirror
        .transaction_id
        .clone()
        .or_else(|| mirror.transaction_hash.clone())
        .ok_or_else(|| ExplainError::Decode("Hedera transaction has no id".to_string()))?;

    let transfers = mirror
        .transfers
        .unwrap_or_default()
        .into_iter()
        .filter_map(|t| {
            Some(HbarTransfer {
                account: t.account?,
                amount: t.amount?,
            })
        })
        .collect();

    let token_transfers = mirror
        .token_transfers
        .unwrap_or_default()
        .into_iter()
        .filter_map(|t| {
            Some(TokenTransfer {
                token_id: t.token_id.unwrap_or_else(|| "UNKNOWN".to_string()),
                account: t.account?,
                amount: t.amount?,
                decimals: t.decimals,
            })
        })
        .collect();

    let timestamp = mirror
        .consensus_timestamp
        .as_deref()
        .and_then(parse_hedera_timestamp);

    Ok(HederaTransaction {
        transaction_id,
        transaction_hash: mirror.transaction_hash,
        transaction_type: mirror.name.unwrap_or_else(|| "TRANSACTION".to_string()),
        result: mirror.result,
        fee: mirror
            .charged_tx_fee
            .or(mirror.transaction_fee)
            .unwrap_or_default(),
        transfers,
        token_transfers,
        consensus_timestamp: mirror.consensus_timestamp,
        timestamp,
        memo: mirror.memo_base64.filter(|m| !m.is_empty()),
    })
}
