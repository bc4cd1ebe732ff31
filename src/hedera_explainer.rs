use std::collections::HashMap;

use crate::format::{
    HEDERA_BURN_SHORT, HEDERA_SHORT, NAME_UNAVAILABLE, balance_label, display_name, format_hbar,
    format_token_amount, short_address,
};
use crate::hedera_client::{HederaTransaction, TokenInfo, TokenTransfer};
use crate::models::{
    AccountNameMap, Action, ActionType, BalanceChange, ChangeDirection, Explanation,
};
use crate::util::timestamp_fields;

const DEFAULT_TOKEN_DECIMALS: u32 = 8;
const FALLBACK_SUMMARY: &str = "Hedera transaction processed.";

// Accounts that swallow burned tokens
fn is_burn_account(account: &str, burn_type: bool) -> bool {
    account == "BURN" || account == "0.0.0" || (burn_type && account.to_uppercase().contains("BURN"))
}

// Every account touched by the transaction, in first-seen order
pub fn involved_accounts(tx: &HederaTransaction) -> Vec<String> {
    let mut accounts: Vec<String> = Vec::new();
    let all = tx
        .transfers
        .iter()
        .map(|t| &t.account)
        .chain(tx.token_transfers.iter().map(|t| &t.account));
    for account in all {
        if !account.is_empty() && !accounts.contains(account) {
            accounts.push(account.clone());
        }
    }
    accounts
}

pub fn token_ids(tx: &HederaTransaction) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for tt in &tx.token_transfers {
        if !ids.contains(&tt.token_id) {
            ids.push(tt.token_id.clone());
        }
    }
    ids
}

struct Builder<'a> {
    names: &'a AccountNameMap,
    summary: Vec<String>,
    actions: Vec<Action>,
    balance_changes: Vec<BalanceChange>,
}

impl Builder<'_> {
    fn display(&self, account: &str) -> String {
        display_name(account, self.names, HEDERA_SHORT)
    }

    fn balance(&mut self, address: &str, amount: &str, coin_type: &str, change: ChangeDirection) {
        let label = balance_label(address, self.names, HEDERA_SHORT);
        let verb = match change {
            ChangeDirection::Increase => "received",
            ChangeDirection::Decrease => "sent",
        };
        self.balance_changes.push(BalanceChange {
            address: address.to_string(),
            amount: amount.to_string(),
            coin_type: coin_type.to_string(),
            change,
            account_name: self.names.get(address).map(str::to_string),
            explanation: format!("{} {} {} {}", label, verb, amount, coin_type),
        });
    }
}

/// Builds the explanation for a normalized Hedera transaction.
///
/// Pure: the same transaction, names and token metadata always give the same output.
pub fn explain(
    tx: &HederaTransaction,
    names: &AccountNameMap,
    tokens: &HashMap<String, TokenInfo>,
) -> Explanation {
    let tx_type = tx.transaction_type.to_uppercase();
    let burn_type = tx_type.contains("BURN");
    let mint_type = tx_type.contains("MINT");

    let mut b = Builder {
        names,
        summary: Vec::new(),
        actions: Vec::new(),
        balance_changes: Vec::new(),
    };

    // HBAR: first payer to first payee
    let sent = tx.transfers.iter().find(|t| t.amount < 0);
    let received = tx.transfers.iter().find(|t| t.amount > 0);
    if let (Some(from), Some(to)) = (sent, received) {
        let amount = format_hbar(from.amount);
        let line = format!(
            "{} transferred {} HBAR to {}",
            b.display(&from.account),
            amount,
            b.display(&to.account)
        );
        b.summary.push(line);
        b.actions.push(
            Action::new(ActionType::Transfer, format!("Transferred {} HBAR", amount))
                .with_from(&from.account)
                .with_to(&to.account)
                .with_amount(format!("{} HBAR", amount)),
        );
        b.balance(&from.account, &amount, "HBAR", ChangeDirection::Decrease);
        b.balance(&to.account, &amount, "HBAR", ChangeDirection::Increase);
    }

    for (token_id, group) in group_by_token(&tx.token_transfers) {
        let info = tokens.get(&token_id);
        let token = info
            .and_then(|i| i.symbol.clone().filter(|s| !s.is_empty()))
            .or_else(|| info.and_then(|i| i.name.clone().filter(|s| !s.is_empty())))
            .unwrap_or_else(|| token_id.clone());
        let decimals_of = |t: &TokenTransfer| {
            t.decimals
                .or_else(|| info.and_then(|i| i.decimals))
                .unwrap_or(DEFAULT_TOKEN_DECIMALS)
        };

        let sent: Vec<&TokenTransfer> = group.iter().copied().filter(|t| t.amount < 0).collect();
        let received: Vec<&TokenTransfer> =
            group.iter().copied().filter(|t| t.amount > 0).collect();

        let burn_account = received
            .iter()
            .any(|t| is_burn_account(&t.account, burn_type));
        let burning = burn_type || (!sent.is_empty() && received.is_empty());

        if (burning || burn_account) && !sent.is_empty() {
            let from = sent[0];
            let amount = format_token_amount(from.amount, decimals_of(from));
            let short = short_address(&from.account, HEDERA_BURN_SHORT);
            let who = match names.get(&from.account) {
                Some(name) => format!("{} ({})", name, short),
                None => format!("{} ({})", short, NAME_UNAVAILABLE),
            };
            b.summary.push(format!("{} burned {} {}", who, amount, token));
            b.actions.push(
                Action::new(ActionType::Mutate, format!("Burned {} {}", amount, token))
                    .with_from(&from.account)
                    .with_amount(&amount)
                    .with_token(&token),
            );
            b.balance(&from.account, &amount, &token, ChangeDirection::Decrease);
        } else if mint_type && sent.is_empty() && !received.is_empty() {
            let to = received[0];
            let amount = format_token_amount(to.amount, decimals_of(to));
            let line = format!(
                "{} received {} newly minted {}",
                b.display(&to.account),
                amount,
                token
            );
            b.summary.push(line);
            b.actions.push(
                Action::new(ActionType::Create, format!("Minted {} {}", amount, token))
                    .with_to(&to.account)
                    .with_amount(&amount)
                    .with_token(&token),
            );
            b.balance(&to.account, &amount, &token, ChangeDirection::Increase);
        } else if !sent.is_empty() && !received.is_empty() {
            let from = sent[0];
            let to = received[0];
            if is_burn_account(&to.account, burn_type) {
                continue;
            }
            let amount = format_token_amount(from.amount, decimals_of(from));
            let line = format!(
                "{} transferred {} {} to {}",
                b.display(&from.account),
                amount,
                token,
                b.display(&to.account)
            );
            b.summary.push(line);
            b.actions.push(
                Action::new(ActionType::Transfer, format!("Transferred {} {}", amount, token))
                    .with_from(&from.account)
                    .with_to(&to.account)
                    .with_amount(&amount)
                    .with_token(&token),
            );
            b.balance(&from.account, &amount, &token, ChangeDirection::Decrease);
            b.balance(&to.account, &amount, &token, ChangeDirection::Increase);
        }
    }

    let fee = if tx.fee > 0 {
        Some(format!("{} HBAR", format_hbar(tx.fee)))
    } else {
        None
    };
    if let Some(fee) = &fee {
        b.summary.push(format!("Transaction fee: {}", fee));
    }

    let summary = if b.summary.is_empty() {
        FALLBACK_SUMMARY.to_string()
    } else {
        format!("{}.", b.summary.join(". "))
    };

    let gas = fee.unwrap_or_else(|| "0 HBAR".to_string());
    let (timestamp, timestamp_formatted) = timestamp_fields(tx.timestamp.as_ref());

    Explanation {
        summary,
        actions: b.actions,
        gas_used: gas.clone(),
        gas_price: "0".to_string(),
        total_gas_cost: gas,
        objects_created: 0,
        objects_transferred: 0,
        objects_mutated: 0,
        involved_addresses: involved_accounts(tx),
        move_calls: Vec::new(),
        timestamp,
        timestamp_formatted,
        balance_changes: b.balance_changes,
        account_names: names.clone(),
    }
}

// Token transfers grouped by token id, groups in first-seen order
fn group_by_token(transfers: &[TokenTransfer]) -> Vec<(String, Vec<&TokenTransfer>)> {
    let mut groups: Vec<(String, Vec<&TokenTransfer>)> = Vec::new();
    for tt in transfers {
        match groups.iter_mut().find(|(id, _)| *id == tt.token_id) {
            Some((_, members)) => members.push(tt),
            None => groups.push((tt.token_id.clone(), vec![tt])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hedera_client::HbarTransfer;
    use crate::util::parse_hedera_timestamp;

    fn tx(kind: &str) -> HederaTransaction {
        HederaTransaction {
            transaction_id: "0.0.100-1699000000-500000000".to_string(),
            transaction_hash: None,
            transaction_type: kind.to_string(),
            result: Some("SUCCESS".to_string()),
            fee: 0,
            transfers: Vec::new(),
            token_transfers: Vec::new(),
            consensus_timestamp: None,
            timestamp: None,
            memo: None,
        }
    }

    fn hbar(account: &str, amount: i64) -> HbarTransfer {
        HbarTransfer {
            account: account.to_string(),
            amount,
        }
    }

    fn token(token_id: &str, account: &str, amount: i64) -> TokenTransfer {
        TokenTransfer {
            token_id: token_id.to_string(),
            account: account.to_string(),
            amount,
            decimals: None,
        }
    }

    #[test]
    fn native_transfer_pairs_sender_and_receiver() {
        let mut t = tx("CRYPTOTRANSFER");
        t.transfers = vec![hbar("0.0.100", -100_000_000), hbar("0.0.200", 100_000_000)];

        let explanation = explain(&t, &AccountNameMap::new(), &HashMap::new());

        assert_eq!(explanation.actions.len(), 1);
        let action = &explanation.actions[0];
        assert_eq!(action.kind, ActionType::Transfer);
        assert_eq!(action.from.as_deref(), Some("0.0.100"));
        assert_eq!(action.to.as_deref(), Some("0.0.200"));
        assert_eq!(action.amount.as_deref(), Some("1.000000000 HBAR"));

        assert_eq!(explanation.balance_changes.len(), 2);
        assert_eq!(explanation.balance_changes[0].amount, "1.000000000");
        assert_eq!(explanation.balance_changes[0].change, ChangeDirection::Decrease);
        assert_eq!(explanation.balance_changes[1].amount, "1.000000000");
        assert_eq!(explanation.balance_changes[1].change, ChangeDirection::Increase);
        assert!(
            explanation.balance_changes[0]
                .explanation
                .contains("account name not available")
        );
        assert_eq!(
            explanation.summary,
            "0.0.100 (account name not available) transferred 1.000000000 HBAR to 0.0.200 (account name not available)."
        );
    }

    #[test]
    fn named_accounts_render_with_their_names() {
        let mut t = tx("CRYPTOTRANSFER");
        t.transfers = vec![hbar("0.0.100", -50), hbar("0.0.200", 50)];
        let mut names = AccountNameMap::new();
        names.insert("0.0.100", "Treasury");

        let explanation = explain(&t, &names, &HashMap::new());
        assert!(explanation.summary.starts_with("Treasury (0.0.100) transferred"));
        assert_eq!(
            explanation.balance_changes[0].account_name.as_deref(),
            Some("Treasury")
        );
    }

    #[test]
    fn sends_without_receives_are_a_burn() {
        let mut t = tx("CRYPTOTRANSFER");
        t.token_transfers = vec![token("0.0.456", "0.0.100", -250_000_000)];
        let mut tokens = HashMap::new();
        tokens.insert(
            "0.0.456".to_string(),
            TokenInfo {
                symbol: Some("SAUCE".to_string()),
                name: None,
                decimals: Some(6),
            },
        );

        let explanation = explain(&t, &AccountNameMap::new(), &tokens);
        let action = &explanation.actions[0];
        assert_eq!(action.kind, ActionType::Mutate);
        assert_eq!(action.description, "Burned 250 SAUCE");
        assert_eq!(explanation.balance_changes.len(), 1);
        assert!(explanation.summary.contains("burned 250 SAUCE"));
    }

    #[test]
    fn sentinel_receiver_marks_a_burn() {
        let mut t = tx("CRYPTOTRANSFER");
        t.token_transfers = vec![
            token("0.0.456", "0.0.100", -100_000_000),
            token("0.0.456", "0.0.0", 100_000_000),
        ];

        let explanation = explain(&t, &AccountNameMap::new(), &HashMap::new());
        assert_eq!(explanation.actions.len(), 1);
        assert_eq!(explanation.actions[0].kind, ActionType::Mutate);
        assert_eq!(explanation.actions[0].token.as_deref(), Some("0.0.456"));
        assert_eq!(explanation.actions[0].amount.as_deref(), Some("1"));
    }

    #[test]
    fn burn_type_flag_wins_over_receivers() {
        let mut t = tx("TOKENBURN");
        t.token_transfers = vec![
            token("0.0.456", "0.0.100", -300),
            token("0.0.456", "0.0.300", 300),
        ];
        let explanation = explain(&t, &AccountNameMap::new(), &HashMap::new());
        assert_eq!(explanation.actions[0].kind, ActionType::Mutate);
    }

    #[test]
    fn token_transfer_uses_default_decimals() {
        let mut t = tx("CRYPTOTRANSFER");
        t.token_transfers = vec![
            token("0.0.456", "0.0.100", -150_000_000),
            token("0.0.456", "0.0.200", 150_000_000),
        ];
        let explanation = explain(&t, &AccountNameMap::new(), &HashMap::new());
        let action = &explanation.actions[0];
        assert_eq!(action.kind, ActionType::Transfer);
        assert_eq!(action.amount.as_deref(), Some("1.5"));
        assert_eq!(explanation.balance_changes.len(), 2);
    }

    #[test]
    fn mint_emits_a_create_action() {
        let mut t = tx("TOKENMINT");
        t.token_transfers = vec![token("0.0.456", "0.0.100", 1_000)];
        let explanation = explain(&t, &AccountNameMap::new(), &HashMap::new());
        assert_eq!(explanation.actions[0].kind, ActionType::Create);
        assert_eq!(
            explanation.balance_changes[0].change,
            ChangeDirection::Increase
        );
        assert!(explanation.summary.contains("newly minted"));
    }

    #[test]
    fn fee_clause_and_gas_fields() {
        let mut t = tx("CONSENSUSSUBMITMESSAGE");
        t.fee = 84_000;
        t.timestamp = parse_hedera_timestamp("1699000000.500000000");
        let explanation = explain(&t, &AccountNameMap::new(), &HashMap::new());
        assert_eq!(explanation.summary, "Transaction fee: 0.000840000 HBAR.");
        assert_eq!(explanation.total_gas_cost, "0.000840000 HBAR");
        assert_eq!(explanation.gas_price, "0");
        assert_eq!(
            explanation.timestamp.as_deref(),
            Some("2023-11-03T08:26:40.500Z")
        );
    }

    #[test]
    fn empty_transaction_falls_back() {
        let explanation = explain(&tx("UNKNOWN"), &AccountNameMap::new(), &HashMap::new());
        assert_eq!(explanation.summary, "Hedera transaction processed.");
        assert_eq!(explanation.gas_used, "0 HBAR");
        assert!(explanation.timestamp.is_none());
        assert!(explanation.timestamp_formatted.is_none());
    }

    #[test]
    fn involved_accounts_are_unique_and_ordered() {
        let mut t = tx("CRYPTOTRANSFER");
        t.transfers = vec![hbar("0.0.2", -1), hbar("0.0.1", 1)];
        t.token_transfers = vec![token("0.0.9", "0.0.2", -1), token("0.0.9", "0.0.3", 1)];
        assert_eq!(involved_accounts(&t), vec!["0.0.2", "0.0.1", "0.0.3"]);
        assert_eq!(token_ids(&t), vec!["0.0.9"]);
    }
}
