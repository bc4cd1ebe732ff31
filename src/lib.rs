//! Plain-language explanations of Hedera and Sui transactions.
//!
//! A request flows fetch → resolve names → explain → optional AI pass. The
//! explainers are pure; everything that talks to the network sits behind
//! [`source::TransactionSource`], [`names::NameLookup`] and [`ai::Enhancer`].

pub mod ai;
pub mod config;
pub mod error;
pub mod format;
pub mod handlers;
pub mod hedera_client;
pub mod hedera_explainer;
pub mod models;
pub mod names;
pub mod source;
pub mod sui_client;
pub mod sui_explainer;
pub mod util;
