//! Provisioning workflow
//!
//! Sequences the four gateway steps, persists the pending record before
//! polling starts (a crash mid-poll must still leave an auditable trail),
//! then folds the poll outcome into the record. Failures propagate typed;
//! an already-created record stays PENDENTE for out-of-band reconciliation
//! because the gateway side may still resolve asynchronously.

use crate::pix::error::{PixError, PixResult};
use crate::pix::gateway::{NewRecurrence, RecurrenceGateway, DEFAULT_PAYER_NOTE};
use crate::pix::polling::{PollSettings, PollingEngine};
use crate::pix::types::{MerchantAccount, RecurrenceRequest, TransactionRecord, TransactionStatus};
use crate::store::{AccountStore, NewTransaction, TransactionPatch, TransactionStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Fresh correlation id: 32 lowercase hex chars from a CSPRNG.
pub fn generate_txid() -> String {
    Uuid::new_v4().simple().to_string()
}

pub struct ProvisionService {
    gateway: Arc<dyn RecurrenceGateway>,
    accounts: Arc<dyn AccountStore>,
    transactions: Arc<dyn TransactionStore>,
    polling: PollingEngine,
}

impl ProvisionService {
    pub fn new(
        gateway: Arc<dyn RecurrenceGateway>,
        accounts: Arc<dyn AccountStore>,
        transactions: Arc<dyn TransactionStore>,
        poll_settings: PollSettings,
    ) -> Self {
        let polling = PollingEngine::new(gateway.clone(), poll_settings);
        Self {
            gateway,
            accounts,
            transactions,
            polling,
        }
    }

    /// Runs the full provisioning workflow:
    /// charge -> location -> recurrence -> pending record -> polling ->
    /// enriched record.
    #[instrument(skip(self, request))]
    pub async fn provision(
        &self,
        account_id: &str,
        request: RecurrenceRequest,
    ) -> PixResult<TransactionRecord> {
        let account = self.resolve_account(account_id).await?;

        let receiving_key = request
            .receiving_key
            .clone()
            .or_else(|| account.receiving_key.clone())
            .ok_or_else(|| {
                PixError::validation("no receiving PIX key configured for this request or account")
            })?;

        let txid = generate_txid();
        let payer_note = request
            .payer_note
            .clone()
            .unwrap_or_else(|| DEFAULT_PAYER_NOTE.to_string());

        info!(txid = %txid, contract = %request.contract, "starting recurrence provisioning");

        self.gateway
            .create_charge(
                &account,
                &txid,
                &request.upfront_value,
                &receiving_key,
                &payer_note,
            )
            .await?;

        let location_id = self.gateway.create_location(&account).await?;

        let id_rec = self
            .gateway
            .create_recurrence(
                &account,
                &NewRecurrence {
                    contract: request.contract.clone(),
                    debtor_cpf: request.debtor_cpf.clone(),
                    debtor_name: request.debtor_name.clone(),
                    start_date: request.start_date,
                    periodicity: request.periodicity,
                    retry_policy: request.retry_policy,
                    recurring_value: request.recurring_value.clone(),
                    location_id,
                    txid: txid.clone(),
                },
            )
            .await?;

        // persisted before polling so an aborted poll leaves a PENDENTE trail
        let record = self
            .transactions
            .create_transaction(NewTransaction {
                account_id: account.id.clone(),
                txid: txid.clone(),
                id_rec: id_rec.clone(),
                contract: request.contract,
                debtor_cpf: request.debtor_cpf,
                debtor_name: request.debtor_name,
                upfront_value: request.upfront_value,
                recurring_value: request.recurring_value,
                start_date: request.start_date,
                periodicity: request.periodicity,
                retry_policy: request.retry_policy,
                status: TransactionStatus::Pendente,
            })
            .await?;

        let outcome = self.polling.poll(&account, &id_rec, &txid).await?;

        let status = outcome
            .status
            .map(TransactionStatus::from)
            .unwrap_or(TransactionStatus::Ativa);
        let metadata = serde_json::json!({
            "attempts": outcome.attempts_used,
            "checksum_valid": outcome.checksum_valid,
            "id_rec": id_rec,
            "txid": txid,
            "source": "GET /rec/{idRec}?txid",
            "qr_image": outcome.qr_image,
            "timestamp": Utc::now().to_rfc3339(),
        });

        let updated = self
            .transactions
            .update_transaction(
                record.id,
                TransactionPatch {
                    status: Some(status),
                    payment_code: Some(outcome.payment_code),
                    journey: Some(outcome.journey),
                    metadata: Some(metadata),
                },
            )
            .await?;

        info!(
            txid = %updated.txid,
            id_rec = %updated.id_rec,
            attempts = outcome.attempts_used,
            "recurrence provisioned"
        );
        Ok(updated)
    }

    async fn resolve_account(&self, account_id: &str) -> PixResult<MerchantAccount> {
        let account = self
            .accounts
            .get_account(account_id)
            .await?
            .ok_or_else(|| {
                PixError::validation(format!("merchant account {account_id} not found"))
            })?;
        if !account.active {
            return Err(PixError::validation(format!(
                "merchant account {account_id} is inactive"
            )));
        }
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pix::gateway::RecurrenceView;
    use crate::pix::types::{Periodicity, RetryPolicy};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingGateway {
        charges: AtomicU32,
    }

    #[async_trait]
    impl RecurrenceGateway for CountingGateway {
        async fn create_charge(
            &self,
            _: &MerchantAccount,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
        ) -> PixResult<()> {
            self.charges.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn create_location(&self, _: &MerchantAccount) -> PixResult<u64> {
            Ok(7)
        }

        async fn create_recurrence(
            &self,
            _: &MerchantAccount,
            _: &NewRecurrence,
        ) -> PixResult<String> {
            Ok("RR1".to_string())
        }

        async fn query_recurrence(
            &self,
            _: &MerchantAccount,
            _: &str,
            _: &str,
        ) -> PixResult<Option<RecurrenceView>> {
            Ok(None)
        }
    }

    fn request() -> RecurrenceRequest {
        RecurrenceRequest {
            debtor_cpf: "12345678901".to_string(),
            debtor_name: "Fulano de Tal".to_string(),
            contract: "CT-1".to_string(),
            start_date: chrono::NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            periodicity: Periodicity::Mensal,
            retry_policy: RetryPolicy::Permite3R7D,
            recurring_value: "99.90".to_string(),
            upfront_value: "99.90".to_string(),
            receiving_key: None,
            payer_note: None,
        }
    }

    fn service(store: Arc<InMemoryStore>, gateway: Arc<CountingGateway>) -> ProvisionService {
        ProvisionService::new(gateway, store.clone(), store, PollSettings::default())
    }

    #[test]
    fn txid_is_32_hex_chars_and_unpredictable() {
        let a = generate_txid();
        let b = generate_txid();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn missing_account_fails_before_any_gateway_call() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(CountingGateway {
            charges: AtomicU32::new(0),
        });
        let err = service(store, gateway.clone())
            .provision("ghost", request())
            .await
            .unwrap_err();
        assert!(matches!(err, PixError::Validation { .. }));
        assert_eq!(gateway.charges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn inactive_account_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_account(MerchantAccount {
            id: "acc-1".to_string(),
            name: "Test".to_string(),
            app_key: "app".to_string(),
            basic_auth: "YTpi".to_string(),
            base_url: "https://gw.example".to_string(),
            oauth_url: "https://gw.example/oauth/token".to_string(),
            receiving_key: Some("key@example.com".to_string()),
            active: false,
        });
        let gateway = Arc::new(CountingGateway {
            charges: AtomicU32::new(0),
        });
        let err = service(store, gateway.clone())
            .provision("acc-1", request())
            .await
            .unwrap_err();
        assert!(matches!(err, PixError::Validation { .. }));
        assert_eq!(gateway.charges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_receiving_key_fails_fast() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_account(MerchantAccount {
            id: "acc-1".to_string(),
            name: "Test".to_string(),
            app_key: "app".to_string(),
            basic_auth: "YTpi".to_string(),
            base_url: "https://gw.example".to_string(),
            oauth_url: "https://gw.example/oauth/token".to_string(),
            receiving_key: None,
            active: true,
        });
        let gateway = Arc::new(CountingGateway {
            charges: AtomicU32::new(0),
        });
        let err = service(store.clone(), gateway.clone())
            .provision("acc-1", request())
            .await
            .unwrap_err();
        assert!(matches!(err, PixError::Validation { .. }));
        assert_eq!(gateway.charges.load(Ordering::SeqCst), 0);
        assert_eq!(store.transaction_count(), 0);
    }
}
