//! Turns a normalized Sui transaction into an [`Explanation`].
//!
//! Everything here is a pure function of the transaction and the resolved
//! account names, so running it twice yields byte-identical output.

use std::sync::LazyLock;

use regex::Regex;

use crate::format::{
    SUI_SHORT, balance_label, count_phrase, display_name, format_amount, format_gas, plural,
    short_address, token_symbol,
};
use crate::models::{
    AccountNameMap, Action, ActionType, BalanceChange, ChangeDirection, Explanation, MoveCallInfo,
};
use crate::sui_client::{ObjectChangeKind, SuiTransaction};
use crate::util::timestamp_fields;

/// Relative difference under which a send and a receive count as the same transfer.
pub const MATCH_TOLERANCE: f64 = 0.01;

const MAX_SUMMARY_TRANSFERS: usize = 3;
const MAX_SUMMARY_ACCOUNTS: usize = 5;
const MAX_LISTED_PACKAGES: usize = 3;
const FALLBACK_SUMMARY: &str = "Transaction executed successfully";

static SENT_AND_RECEIVED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s+(sent.+?and received.+?)$").expect("static regex"));

// Insertion-ordered set of addresses
#[derive(Default)]
struct AddressSet(Vec<String>);

impl AddressSet {
    fn add(&mut self, address: &str) {
        if !address.is_empty() && !self.0.iter().any(|a| a == address) {
            self.0.push(address.to_string());
        }
    }
}

/// A one-sided coin movement taken from the balance changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub address: String,
    pub amount: f64,
    pub coin_type: String,
}

/// Result of pairing senders with recipients.
#[derive(Debug, Default, PartialEq)]
pub struct Reconciliation {
    pub matched: Vec<(usize, usize)>,
    pub unmatched_senders: Vec<usize>,
    pub unmatched_recipients: Vec<usize>,
}

/// Greedy first-fit pairing of senders to recipients.
///
/// Each sender, in input order, takes the first unclaimed recipient whose amount is within
/// [`MATCH_TOLERANCE`] of its own. This is order dependent and not an optimal assignment;
/// multi-party transactions can pair differently than a human would.
pub fn reconcile(senders: &[Flow], recipients: &[Flow]) -> Reconciliation {
    let mut claimed = vec![false; recipients.len()];
    let mut result = Reconciliation::default();

    for (i, sender) in senders.iter().enumerate() {
        let hit = recipients.iter().enumerate().find(|(j, recipient)| {
            !claimed[*j]
                && sender.amount > 0.0
                && (sender.amount - recipient.amount).abs() / sender.amount < MATCH_TOLERANCE
        });
        match hit {
            Some((j, _)) => {
                claimed[j] = true;
                result.matched.push((i, j));
            }
            None => result.unmatched_senders.push(i),
        }
    }

    result.unmatched_recipients = claimed
        .iter()
        .enumerate()
        .filter(|(_, taken)| !**taken)
        .map(|(j, _)| j)
        .collect();
    result
}

// Addresses that receive something, in first-seen order; the sender is not included
pub fn receiver_addresses(tx: &SuiTransaction) -> Vec<String> {
    let mut receivers = AddressSet::default();
    for change in &tx.object_changes {
        if change.kind == ObjectChangeKind::Transferred {
            if let Some(recipient) = &change.recipient {
                receivers.add(recipient);
            }
        }
    }
    for change in &tx.balance_changes {
        if change.amount > 0 {
            if let Some(owner) = change.owner.address() {
                receivers.add(owner);
            }
        }
    }
    receivers.0
}

fn prefix(id: &str, len: usize) -> &str {
    match id.char_indices().nth(len) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

pub fn explain(tx: &SuiTransaction, names: &AccountNameMap) -> Explanation {
    let display = |address: &str| display_name(address, names, SUI_SHORT);

    let mut actions = Vec::new();
    let mut involved = AddressSet::default();
    let mut created = 0u32;
    let mut transferred = 0u32;
    let mut mutated = 0u32;

    let sender = tx.sender.as_deref().unwrap_or_default();
    involved.add(sender);

    for change in &tx.object_changes {
        match change.kind {
            ObjectChangeKind::Created => {
                created += 1;
                actions.push(
                    Action::new(
                        ActionType::Create,
                        format!("New object created: {}...", prefix(&change.object_id, 16)),
                    )
                    .with_object_id(&change.object_id),
                );
            }
            ObjectChangeKind::Mutated => {
                mutated += 1;
                actions.push(
                    Action::new(
                        ActionType::Mutate,
                        format!("Object mutated: {}...", prefix(&change.object_id, 16)),
                    )
                    .with_object_id(&change.object_id),
                );
            }
            ObjectChangeKind::Transferred => {
                transferred += 1;
                let from = change.sender.as_deref().unwrap_or(sender);
                let to = change.recipient.as_deref().unwrap_or("Unknown");
                if change.recipient.is_some() {
                    involved.add(to);
                }
                involved.add(from);

                let object_type = change.object_type.as_deref().unwrap_or_default();
                let mut action = if object_type.contains("Coin") || object_type.contains("Token")
                {
                    let amount = change.amount.map(|a| format_amount(a.unsigned_abs() as f64));
                    let what = amount.clone().unwrap_or_else(|| "token".to_string());
                    let description = if from.is_empty() {
                        format!("Transferred {} to {}", what, display(to))
                    } else {
                        format!("Transferred {} from {} to {}", what, display(from), display(to))
                    };
                    let action = Action::new(ActionType::Transfer, description).with_token(object_type);
                    match amount {
                        Some(amount) => action.with_amount(amount),
                        None => action,
                    }
                } else {
                    let description = if from.is_empty() {
                        format!("Object transferred to {}", display(to))
                    } else {
                        format!("Object transferred from {} to {}", display(from), display(to))
                    };
                    Action::new(ActionType::Transfer, description).with_object_id(&change.object_id)
                };
                if !from.is_empty() {
                    action = action.with_from(from);
                }
                if change.recipient.is_some() {
                    action = action.with_to(to);
                }
                actions.push(action);
            }
            _ => {}
        }
    }

    // Split owned balance movements by sign, then pair them up
    let mut senders = Vec::new();
    let mut recipients = Vec::new();
    for change in &tx.balance_changes {
        let Some(owner) = change.owner.address() else {
            continue;
        };
        involved.add(owner);
        let flow = Flow {
            address: owner.to_string(),
            amount: change.amount.unsigned_abs() as f64,
            coin_type: change.coin_type.clone(),
        };
        if change.amount > 0 {
            recipients.push(flow);
        } else if change.amount < 0 {
            senders.push(flow);
        }
    }

    let pairing = reconcile(&senders, &recipients);
    for &(i, j) in &pairing.matched {
        let (s, r) = (&senders[i], &recipients[j]);
        let amount = format_amount(s.amount);
        actions.push(
            Action::new(
                ActionType::Transfer,
                format!(
                    "Transferred {} {} from {} to {}",
                    amount,
                    token_symbol(&s.coin_type),
                    display(&s.address),
                    display(&r.address)
                ),
            )
            .with_from(&s.address)
            .with_to(&r.address)
            .with_amount(amount)
            .with_token(&s.coin_type),
        );
    }
    for &i in &pairing.unmatched_senders {
        let s = &senders[i];
        let amount = format_amount(s.amount);
        actions.push(
            Action::new(
                ActionType::Transfer,
                format!(
                    "{} sent {} {}",
                    display(&s.address),
                    amount,
                    token_symbol(&s.coin_type)
                ),
            )
            .with_from(&s.address)
            .with_amount(amount)
            .with_token(&s.coin_type),
        );
    }
    for &j in &pairing.unmatched_recipients {
        let r = &recipients[j];
        let amount = format_amount(r.amount);
        let counterparty = if sender.is_empty() {
            String::new()
        } else {
            format!(" from {}", display(sender))
        };
        actions.push(
            Action::new(
                ActionType::Transfer,
                format!(
                    "{} received {} {}{}",
                    display(&r.address),
                    amount,
                    token_symbol(&r.coin_type),
                    counterparty
                ),
            )
            .with_to(&r.address)
            .with_amount(amount)
            .with_token(&r.coin_type),
        );
    }

    let balance_changes = balance_rows(tx, names);
    let total_gas = format_gas(tx.gas.total());
    let summary = generate_summary(
        &actions,
        created as usize,
        mutated as usize,
        &tx.move_calls,
        names,
        &total_gas,
        &balance_changes,
    );
    let (timestamp, timestamp_formatted) = timestamp_fields(tx.timestamp.as_ref());

    Explanation {
        summary,
        actions,
        gas_used: format_gas(tx.gas.computation_cost),
        gas_price: format_gas(tx.gas.gas_price.unwrap_or_default()),
        total_gas_cost: total_gas,
        objects_created: created,
        objects_transferred: transferred,
        objects_mutated: mutated,
        involved_addresses: involved.0,
        move_calls: tx.move_calls.clone(),
        timestamp,
        timestamp_formatted,
        balance_changes,
        account_names: names.clone(),
    }
}

// One row per owned, non-zero balance change, independent of the pairing
fn balance_rows(tx: &SuiTransaction, names: &AccountNameMap) -> Vec<BalanceChange> {
    tx.balance_changes
        .iter()
        .filter(|c| c.amount != 0)
        .filter_map(|c| {
            let owner = c.owner.address()?;
            let amount = format_amount(c.amount.unsigned_abs() as f64);
            let (change, verb) = if c.amount > 0 {
                (ChangeDirection::Increase, "received")
            } else {
                (ChangeDirection::Decrease, "sent")
            };
            Some(BalanceChange {
                address: owner.to_string(),
                explanation: format!(
                    "{} {} {} {}",
                    balance_label(owner, names, SUI_SHORT),
                    verb,
                    amount,
                    token_symbol(&c.coin_type)
                ),
                amount,
                coin_type: c.coin_type.clone(),
                change,
                account_name: names.get(owner).map(str::to_string),
            })
        })
        .collect()
}

/// What kind of transaction the Move calls suggest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    OracleUpdate { feeds: usize, cross_chain: bool },
    MultiSwap { swaps: usize },
    Swap,
    Plain,
}

impl Classification {
    pub fn of(move_calls: &[MoveCallInfo]) -> Self {
        let swaps = move_calls
            .iter()
            .filter(|c| c.function == "swap" || c.module == "swap")
            .count();
        let routed = move_calls.iter().any(|c| c.module == "router");
        let feeds = move_calls
            .iter()
            .filter(|c| c.module == "pyth" || c.package.contains("pyth"))
            .count();
        let cross_chain = move_calls.iter().any(|c| c.module == "vaa");

        if feeds > 0 {
            Classification::OracleUpdate { feeds, cross_chain }
        } else if routed && swaps > 1 {
            Classification::MultiSwap { swaps }
        } else if swaps > 0 {
            Classification::Swap
        } else {
            Classification::Plain
        }
    }

    fn is_swap(&self) -> bool {
        matches!(self, Classification::Swap | Classification::MultiSwap { .. })
    }

    // Mutations and package lists are noise for these
    fn hides_incidentals(&self) -> bool {
        !matches!(self, Classification::Plain)
    }
}

/// Assembles the natural-language summary, clauses joined with ". ".
pub fn generate_summary(
    actions: &[Action],
    created: usize,
    mutated: usize,
    move_calls: &[MoveCallInfo],
    names: &AccountNameMap,
    gas_cost: &str,
    balance_changes: &[BalanceChange],
) -> String {
    let display = |address: &str| display_name(address, names, SUI_SHORT);
    let kind = Classification::of(move_calls);
    let mut parts: Vec<String> = Vec::new();

    let transfers: Vec<&Action> = actions
        .iter()
        .filter(|a| a.kind == ActionType::Transfer && a.from.is_some() && a.to.is_some())
        .collect();

    match kind {
        Classification::OracleUpdate { feeds, cross_chain } => parts.push(format!(
            "Updated {} price feed{} via Pyth oracle{}",
            feeds,
            plural(feeds),
            if cross_chain { " (cross-chain data)" } else { "" }
        )),
        Classification::MultiSwap { swaps } => parts.push(format!(
            "Executed {} token swaps through a DEX aggregator",
            swaps
        )),
        Classification::Swap => parts.push("Executed a token swap".to_string()),
        Classification::Plain => {
            for transfer in transfers.iter().take(MAX_SUMMARY_TRANSFERS) {
                let from = display(transfer.from.as_deref().unwrap_or_default());
                let to = display(transfer.to.as_deref().unwrap_or_default());
                let label = match (&transfer.token, &transfer.object_id) {
                    (Some(token), _) => token_symbol(token),
                    (None, Some(_)) => "object".to_string(),
                    (None, None) => "Token".to_string(),
                };
                let object = transfer
                    .object_id
                    .as_deref()
                    .map(|id| format!(" #{}", prefix(id, 8)))
                    .unwrap_or_default();
                match &transfer.amount {
                    Some(amount) => parts.push(format!(
                        "{} transferred {} {}{} to {}",
                        from, amount, label, object, to
                    )),
                    None => parts.push(format!("{} transferred {}{} to {}", from, label, object, to)),
                }
            }
            if transfers.len() > MAX_SUMMARY_TRANSFERS {
                let more = transfers.len() - MAX_SUMMARY_TRANSFERS;
                parts.push(format!("... and {} more transfer{}", more, plural(more)));
            }
        }
    }

    if created > 0 {
        parts.push(format!("{} created", count_phrase(created, "new object")));
    }

    if !gas_cost.is_empty() && gas_cost != "0 MIST" && gas_cost != "0 SUI" {
        parts.push(format!("Gas used: {}", gas_cost));
    }

    if let Some(narrative) = balance_narrative(balance_changes, &display, kind.is_swap()) {
        parts.extend(narrative);
    }

    if mutated > 0 && !kind.hides_incidentals() {
        parts.push(format!("{} modified", count_phrase(mutated, "object")));
    }

    if !move_calls.is_empty() && !kind.hides_incidentals() {
        let mut packages: Vec<String> = Vec::new();
        for call in move_calls {
            let short = short_address(&call.package, SUI_SHORT);
            if !packages.contains(&short) {
                packages.push(short);
            }
        }
        if packages.len() <= MAX_LISTED_PACKAGES {
            parts.push(format!(
                "Called Move functions from package{}: {}",
                plural(packages.len()),
                packages.join(", ")
            ));
        } else {
            parts.push(format!(
                "Executed {} Move function call{} from {} packages",
                move_calls.len(),
                plural(move_calls.len()),
                packages.len()
            ));
        }
    }

    if parts.is_empty() {
        FALLBACK_SUMMARY.to_string()
    } else {
        parts.join(". ")
    }
}

// Per-account "sent X and received Y" clauses, rewritten as an exchange for single-account swaps
fn balance_narrative(
    changes: &[BalanceChange],
    display: &dyn Fn(&str) -> String,
    is_swap: bool,
) -> Option<Vec<String>> {
    if changes.is_empty() {
        return None;
    }

    let mut accounts: Vec<(&str, Vec<&BalanceChange>)> = Vec::new();
    for change in changes {
        match accounts.iter_mut().find(|(a, _)| *a == change.address) {
            Some((_, rows)) => rows.push(change),
            None => accounts.push((&change.address, vec![change])),
        }
    }

    let mut clauses = Vec::new();
    for (address, rows) in accounts.iter().take(MAX_SUMMARY_ACCOUNTS) {
        let list = |direction: ChangeDirection| {
            rows.iter()
                .filter(|r| r.change == direction)
                .map(|r| format!("{} {}", r.amount, token_symbol(&r.coin_type)))
                .collect::<Vec<_>>()
        };
        let sent = list(ChangeDirection::Decrease);
        let received = list(ChangeDirection::Increase);

        let mut doing = Vec::new();
        if !sent.is_empty() {
            doing.push(format!("sent {}", sent.join(" and ")));
        }
        if !received.is_empty() {
            doing.push(format!("received {}", received.join(" and ")));
        }
        if !doing.is_empty() {
            clauses.push(format!("{} {}", display(*address), doing.join(" and ")));
        }
    }

    let mut parts = Vec::new();
    if !clauses.is_empty() {
        if is_swap && accounts.len() == 1 {
            let clause = &clauses[0];
            match SENT_AND_RECEIVED.captures(clause) {
                Some(caps) => parts.push(format!(
                    "{} exchanged {}",
                    &caps[1],
                    caps[2]
                        .replacen("sent ", "", 1)
                        .replacen(" and received ", " for ", 1)
                )),
                None => parts.push(clause.clone()),
            }
        } else {
            parts.push(clauses.join(", "));
        }
    }

    if accounts.len() > MAX_SUMMARY_ACCOUNTS {
        let more = accounts.len() - MAX_SUMMARY_ACCOUNTS;
        parts.push(format!(
            "... and {} more account{} with balance changes",
            more,
            plural(more)
        ));
    }
    Some(parts)
}
