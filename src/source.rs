//! Chain-specific adapters behind one fetch → resolve → explain pipeline.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::ExplainError;
use crate::hedera_client::{HederaTransaction, MirrorNodeClient, TokenInfo};
use crate::models::{AccountNameMap, Explanation};
use crate::names::{NameCache, resolve_names};
use crate::sui_client::{BlockberryClient, FullNodeClient, SuiTransaction, fetch_with_fallback};
use crate::{hedera_explainer, sui_explainer};

// Receivers looked up per Sui transaction, on top of the sender
pub const MAX_RECEIVER_LOOKUPS: usize = 10;

/// A blockchain the service can explain.
///
/// `fetch` is the only fatal step; `explain` enriches with names and
/// metadata on a best-effort basis and cannot fail.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    type Transaction: Serialize + Send + Sync;

    async fn fetch(&self, digest: &str) -> Result<Self::Transaction, ExplainError>;

    async fn explain(&self, tx: &Self::Transaction) -> Explanation;

    // What callers get back as `rawTransaction`
    fn raw_json(&self, tx: &Self::Transaction) -> serde_json::Result<Value> {
        serde_json::to_value(tx)
    }
}

/// Output of [`run`]: the explanation plus the transaction as JSON, if it encoded.
pub struct Explained {
    pub explanation: Explanation,
    pub raw_transaction: Option<Value>,
}

pub async fn run<S>(source: &S, digest: &str) -> Result<Explained, ExplainError>
where
    S: TransactionSource + ?Sized,
{
    let tx = source.fetch(digest).await?;
    let explanation = source.explain(&tx).await;

    let raw_transaction = match source.raw_json(&tx) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(%digest, "Failed to serialize raw transaction, omitting it: {}", e);
            None
        }
    };

    Ok(Explained {
        explanation,
        raw_transaction,
    })
}

pub struct HederaSource {
    mirror: MirrorNodeClient,
}

impl HederaSource {
    pub fn new(mirror: MirrorNodeClient) -> Self {
        HederaSource { mirror }
    }
}

#[async_trait]
impl TransactionSource for HederaSource {
    type Transaction = HederaTransaction;

    async fn fetch(&self, digest: &str) -> Result<HederaTransaction, ExplainError> {
        self.mirror.fetch_transaction(digest).await
    }

    async fn explain(&self, tx: &HederaTransaction) -> Explanation {
        let token_ids = hedera_explainer::token_ids(tx);
        let (names, infos) = futures::join!(
            resolve_names(&self.mirror, hedera_explainer::involved_accounts(tx), None),
            join_all(token_ids.iter().map(|id| self.mirror.token_info(id))),
        );

        let tokens: HashMap<String, TokenInfo> = token_ids
            .into_iter()
            .zip(infos)
            .filter_map(|(id, info)| info.map(|info| (id, info)))
            .collect();

        info!(
            tx_id = %tx.transaction_id,
            names = names.len(),
            tokens = tokens.len(),
            "Resolved Hedera metadata"
        );
        hedera_explainer::explain(tx, &names, &tokens)
    }
}

pub struct SuiSource {
    primary: BlockberryClient,
    fallback: FullNodeClient,
    cache: NameCache,
}

impl SuiSource {
    pub fn new(primary: BlockberryClient, fallback: FullNodeClient, cache: NameCache) -> Self {
        SuiSource {
            primary,
            fallback,
            cache,
        }
    }

    // Sender first, then a bounded batch of receivers in parallel
    async fn names(&self, tx: &SuiTransaction) -> AccountNameMap {
        let sender = tx.sender.clone().unwrap_or_default();
        let mut names = resolve_names(&self.primary, [sender.clone()], Some(&self.cache)).await;

        let receivers: Vec<String> = sui_explainer::receiver_addresses(tx)
            .into_iter()
            .filter(|address| *address != sender)
            .take(MAX_RECEIVER_LOOKUPS)
            .collect();
        names.extend(resolve_names(&self.primary, receivers, Some(&self.cache)).await);
        names
    }
}

#[async_trait]
impl TransactionSource for SuiSource {
    type Transaction = SuiTransaction;

    async fn fetch(&self, digest: &str) -> Result<SuiTransaction, ExplainError> {
        fetch_with_fallback(&self.primary, &self.fallback, digest).await
    }

    async fn explain(&self, tx: &SuiTransaction) -> Explanation {
        let names = self.names(tx).await;
        info!(digest = %tx.digest, names = names.len(), "Resolved Sui account names");
        sui_explainer::explain(tx, &names)
    }

    // Both providers answer in the JSON-RPC shape; pass that body through
    fn raw_json(&self, tx: &SuiTransaction) -> serde_json::Result<Value> {
        match &tx.raw {
            Some(raw) => Ok(raw.clone()),
            None => serde_json::to_value(tx),
        }
    }
}
