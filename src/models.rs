use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ExplainError;

// Which network the caller wants the digest looked up on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Blockchain {
    #[default]
    Hedera,
    Sui,
}

impl FromStr for Blockchain {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hedera" => Ok(Blockchain::Hedera),
            "sui" => Ok(Blockchain::Sui),
            other => Err(ExplainError::Validation(format!(
                "Unsupported blockchain: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Blockchain::Hedera => write!(f, "hedera"),
            Blockchain::Sui => write!(f, "sui"),
        }
    }
}

// What the user sends in a POST body
#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    pub digest: Option<String>,
    #[serde(rename = "useAI", default = "default_use_ai", deserialize_with = "de_use_ai")]
    pub use_ai: bool,
    pub blockchain: Option<String>,
}

fn default_use_ai() -> bool {
    true
}

// An explicit null means "not specified"
fn de_use_ai<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or_else(default_use_ai))
}

// Same request, carried in the query string of a GET
#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub digest: Option<String>,
    #[serde(rename = "useAI")]
    pub use_ai: Option<String>,
    pub blockchain: Option<String>,
}

impl From<ExplainQuery> for ExplainRequest {
    fn from(query: ExplainQuery) -> Self {
        ExplainRequest {
            digest: query.digest,
            use_ai: query.use_ai.as_deref() != Some("false"),
            blockchain: query.blockchain,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Transfer,
    Create,
    Mutate,
    Call,
}

/// One step of what the transaction did, in the order it should be displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

impl Action {
    pub fn new(kind: ActionType, description: impl Into<String>) -> Self {
        Action {
            kind,
            description: description.into(),
            from: None,
            to: None,
            amount: None,
            token: None,
            object_id: None,
        }
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_object_id(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDirection {
    Increase,
    Decrease,
}

// Net movement of one coin for one account; amount is always the absolute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    pub address: String,
    pub amount: String,
    pub coin_type: String,
    pub change: ChangeDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveCallInfo {
    pub package: String,
    pub module: String,
    pub function: String,
    #[serde(default)]
    pub arguments: Vec<serde_json::Value>,
}

/// Resolved display labels keyed by address or account id.
///
/// A missing key means no name is known; renderers fall back to the shortened
/// address and never drop the account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountNameMap(BTreeMap<String, String>);

impl AccountNameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &str) -> Option<&str> {
        self.0.get(address).map(String::as_str)
    }

    pub fn insert(&mut self, address: impl Into<String>, name: impl Into<String>) {
        self.0.insert(address.into(), name.into());
    }

    pub fn contains(&self, address: &str) -> bool {
        self.0.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn extend(&mut self, other: AccountNameMap) {
        self.0.extend(other.0);
    }
}

impl FromIterator<(String, String)> for AccountNameMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        AccountNameMap(iter.into_iter().collect())
    }
}

// Deterministic explanation of one transaction, built once per request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub summary: String,
    pub actions: Vec<Action>,
    pub gas_used: String,
    pub gas_price: String,
    pub total_gas_cost: String,
    pub objects_created: u32,
    pub objects_transferred: u32,
    pub objects_mutated: u32,
    pub involved_addresses: Vec<String>,
    pub move_calls: Vec<MoveCallInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_formatted: Option<String>,
    pub balance_changes: Vec<BalanceChange>,
    pub account_names: AccountNameMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiStatus {
    Enabled,
    Disabled,
    Timeout,
    Error,
    NoKey,
}

// Explanation plus the outcome of the optional AI pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedExplanation {
    #[serde(flatten)]
    pub explanation: Explanation,
    pub ai_enhanced: bool,
    pub ai_insights: Vec<String>,
    pub ai_risks: Vec<String>,
    pub ai_status: AiStatus,
    pub ai_status_message: String,
}

// What is returned to the user on success
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainResponse {
    pub success: bool,
    pub digest: String,
    pub explanation: EnhancedExplanation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_transaction: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
