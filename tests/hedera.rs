use mockito::Matcher;
use reqwest::Client;
use serde_json::{Value, json};
use tx_readable::error::ExplainError;
use tx_readable::hedera_client::MirrorNodeClient;
use tx_readable::models::ActionType;
use tx_readable::source::{HederaSource, run};

const TX_ID: &str = "0.0.100-1699000000-500000000";
const TX_HASH: &str = "9f2c4e7a01b3d5f6a8c0e2b4d6f8a0c2e4b6d8f0a2c4e6b8d0f2a4c6e8b0d2f4";

fn record() -> Value {
    json!({
        "transaction_id": TX_ID,
        "transaction_hash": TX_HASH,
        "name": "CRYPTOTRANSFER",
        "result": "SUCCESS",
        "charged_tx_fee": 84754,
        "consensus_timestamp": "1699000000.500000000",
        "transfers": [
            {"account": "0.0.100", "amount": -500_000_000},
            {"account": "0.0.200", "amount": 500_000_000}
        ],
        "token_transfers": [
            {"token_id": "0.0.5000", "account": "0.0.100", "amount": -1_250_000},
            {"token_id": "0.0.5000", "account": "0.0.200", "amount": 1_250_000}
        ]
    })
}

fn mirror(server: &mockito::Server) -> MirrorNodeClient {
    MirrorNodeClient::new(Client::new(), server.url(), None)
}

#[tokio::test]
async fn test_fetch_by_at_style_id() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", format!("/transactions/{}", TX_ID).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"transactions": [record()]}).to_string())
        .create_async()
        .await;

    let tx = mirror(&server)
        .fetch_transaction("0.0.100@1699000000.500000000")
        .await
        .unwrap();

    assert_eq!(tx.transaction_id, TX_ID);
    assert_eq!(tx.fee, 84754);
    assert_eq!(tx.transfers.len(), 2);
    assert_eq!(tx.timestamp.unwrap().timestamp_millis(), 1_699_000_000_500);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_hash_falls_back_to_search() {
    let mut server = mockito::Server::new_async().await;
    let direct = server
        .mock("GET", format!("/transactions/{}", TX_HASH).as_str())
        .with_status(404)
        .create_async()
        .await;
    let search = server
        .mock("GET", "/transactions")
        .match_query(Matcher::UrlEncoded("transactionhash".into(), TX_HASH.into()))
        .with_status(200)
        .with_body(json!({"transactions": [{"transaction_id": "0.0.100@1699000000.500000000"}]}).to_string())
        .create_async()
        .await;
    let by_id = server
        .mock("GET", format!("/transactions/{}", TX_ID).as_str())
        .with_status(200)
        .with_body(record().to_string())
        .create_async()
        .await;

    let tx = mirror(&server).fetch_transaction(TX_HASH).await.unwrap();

    assert_eq!(tx.transaction_id, TX_ID);
    direct.assert_async().await;
    search.assert_async().await;
    by_id.assert_async().await;
}

#[tokio::test]
async fn test_unknown_hash_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    let _direct = server
        .mock("GET", format!("/transactions/{}", TX_HASH).as_str())
        .with_status(404)
        .create_async()
        .await;
    let _search = server
        .mock("GET", "/transactions")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({"transactions": []}).to_string())
        .create_async()
        .await;

    let err = mirror(&server).fetch_transaction(TX_HASH).await.unwrap_err();

    assert!(matches!(err, ExplainError::NotFound(_)));
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn test_missing_transaction_id_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    let direct = server
        .mock("GET", format!("/transactions/{}", TX_ID).as_str())
        .with_status(404)
        .create_async()
        .await;
    // ids are not valid hash filters; the mirror node answers 400
    let search = server
        .mock("GET", "/transactions")
        .match_query(Matcher::Any)
        .with_status(400)
        .expect(0)
        .create_async()
        .await;

    let err = mirror(&server).fetch_transaction(TX_ID).await.unwrap_err();

    assert!(matches!(err, ExplainError::NotFound(ref id) if id == TX_ID), "{err}");
    direct.assert_async().await;
    search.assert_async().await;
}

#[tokio::test]
async fn test_upstream_failure_is_surfaced() {
    let mut server = mockito::Server::new_async().await;
    let _failing = server
        .mock("GET", format!("/transactions/{}", TX_ID).as_str())
        .with_status(503)
        .create_async()
        .await;

    let err = mirror(&server).fetch_transaction(TX_ID).await.unwrap_err();

    match err {
        ExplainError::Upstream { status, .. } => assert_eq!(status, 503),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_source_resolves_names_and_tokens() {
    let mut server = mockito::Server::new_async().await;
    let _tx = server
        .mock("GET", format!("/transactions/{}", TX_ID).as_str())
        .with_status(200)
        .with_body(record().to_string())
        .create_async()
        .await;
    let _bob = server
        .mock("GET", "/accounts/0.0.200")
        .with_status(200)
        .with_body(json!({"account": "0.0.200", "alias": "Bob"}).to_string())
        .create_async()
        .await;
    let _payer = server
        .mock("GET", "/accounts/0.0.100")
        .with_status(404)
        .create_async()
        .await;
    let token = server
        .mock("GET", "/tokens/0.0.5000")
        .with_status(200)
        .with_body(json!({"symbol": "USDC", "name": "USD Coin", "decimals": "6"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let source = HederaSource::new(mirror(&server));
    let explained = run(&source, TX_ID).await.unwrap();
    let explanation = explained.explanation;

    assert_eq!(
        explanation.summary,
        "0.0.100 (account name not available) transferred 5.000000000 HBAR to Bob (0.0.200). \
         0.0.100 (account name not available) transferred 1.25 USDC to Bob (0.0.200). \
         Transaction fee: 0.000847540 HBAR."
    );
    assert_eq!(explanation.actions.len(), 2);
    assert!(explanation.actions.iter().all(|a| a.kind == ActionType::Transfer));
    assert_eq!(explanation.account_names.get("0.0.200"), Some("Bob"));
    assert!(!explanation.account_names.contains("0.0.100"));
    assert_eq!(explanation.total_gas_cost, "0.000847540 HBAR");
    assert_eq!(
        explanation.timestamp.as_deref(),
        Some("2023-11-03T08:26:40.500Z")
    );

    let raw = explained.raw_transaction.unwrap();
    assert_eq!(raw["transactionId"], TX_ID);
    assert_eq!(raw["result"], "SUCCESS");
    token.assert_async().await;
}
