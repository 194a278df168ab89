//! Recurrence Provisioning Walkthrough
//!
//! Wires the real gateway client (mutual-TLS transport + token cache)
//! against an in-memory store and runs one provisioning workflow. Needs a
//! reachable gateway plus certificate material under PIX_CERT_DIR; merchant
//! credentials come from environment variables.

use chrono::Duration as ChronoDuration;
use recpix_backend::config::AppConfig;
use recpix_backend::logging::init_tracing;
use recpix_backend::pix::certs::fs_source;
use recpix_backend::pix::token::{OAuthTokenFetcher, SystemClock, TokenCache};
use recpix_backend::pix::transport::Transport;
use recpix_backend::pix::{
    MerchantAccount, Periodicity, PixGatewayClient, ProvisionService, RecurrenceRequest,
    RetryPolicy,
};
use recpix_backend::store::InMemoryStore;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    config.validate()?;
    init_tracing(&config.logging);

    println!("=== PIX Recurrence Provisioning Demo ===\n");

    let account = MerchantAccount {
        id: "demo-merchant".to_string(),
        name: "Demo Merchant".to_string(),
        app_key: std::env::var("PIX_APP_KEY")?,
        basic_auth: std::env::var("PIX_BASIC_AUTH")?,
        base_url: std::env::var("PIX_BASE_URL")?,
        oauth_url: std::env::var("PIX_OAUTH_URL")?,
        receiving_key: std::env::var("PIX_RECEIVING_KEY").ok(),
        active: true,
    };

    let source = fs_source(&config.pix.cert_dir);
    let transport = Arc::new(Transport::from_source(&source, config.pix.http_settings())?);
    let tokens = Arc::new(TokenCache::new(
        Arc::new(OAuthTokenFetcher::new(transport.clone())),
        Arc::new(SystemClock),
        ChronoDuration::seconds(config.pix.token_safety_margin as i64),
    ));
    let gateway = Arc::new(PixGatewayClient::new(
        transport,
        tokens,
        config.pix.charge_expiry,
    ));

    let store = Arc::new(InMemoryStore::new());
    store.insert_account(account);

    let service = ProvisionService::new(
        gateway,
        store.clone(),
        store,
        config.pix.poll_settings(),
    );

    let request = RecurrenceRequest {
        debtor_cpf: "12345678901".to_string(),
        debtor_name: "Fulano de Tal".to_string(),
        contract: "CT-DEMO-001".to_string(),
        start_date: chrono::Utc::now().date_naive() + ChronoDuration::days(1),
        periodicity: Periodicity::Mensal,
        retry_policy: RetryPolicy::Permite3R7D,
        recurring_value: "99.90".to_string(),
        upfront_value: "99.90".to_string(),
        receiving_key: None,
        payer_note: None,
    };

    match service.provision("demo-merchant", request).await {
        Ok(record) => {
            println!("Provisioned: txid={} id_rec={}", record.txid, record.id_rec);
            println!("Status: {:?}", record.status);
            if let Some(code) = &record.payment_code {
                println!("Payment code:\n{code}");
            }
            println!("Polling metadata: {}", record.metadata);
        }
        Err(e) => {
            eprintln!("Provisioning failed: {}", e.user_message());
            std::process::exit(1);
        }
    }

    Ok(())
}
