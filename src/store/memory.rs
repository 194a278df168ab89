//! Map-backed store for demos and tests

use crate::pix::types::{MerchantAccount, TransactionRecord};
use crate::store::{
    AccountStore, NewTransaction, StoreError, TransactionPatch, TransactionStore,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    accounts: RwLock<HashMap<String, MerchantAccount>>,
    transactions: RwLock<HashMap<Uuid, TransactionRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_account(&self, account: MerchantAccount) {
        self.accounts
            .write()
            .expect("account map lock poisoned")
            .insert(account.id.clone(), account);
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions
            .read()
            .expect("transaction map lock poisoned")
            .len()
    }

    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.transactions
            .read()
            .expect("transaction map lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn get_account(&self, id: &str) -> Result<Option<MerchantAccount>, StoreError> {
        Ok(self
            .accounts
            .read()
            .expect("account map lock poisoned")
            .get(id)
            .cloned())
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn create_transaction(
        &self,
        fields: NewTransaction,
    ) -> Result<TransactionRecord, StoreError> {
        let now = Utc::now();
        let record = TransactionRecord {
            id: Uuid::new_v4(),
            account_id: fields.account_id,
            txid: fields.txid,
            id_rec: fields.id_rec,
            contract: fields.contract,
            debtor_cpf: fields.debtor_cpf,
            debtor_name: fields.debtor_name,
            upfront_value: fields.upfront_value,
            recurring_value: fields.recurring_value,
            start_date: fields.start_date,
            periodicity: fields.periodicity,
            retry_policy: fields.retry_policy,
            status: fields.status,
            payment_code: None,
            journey: None,
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        };
        self.transactions
            .write()
            .expect("transaction map lock poisoned")
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_transaction(
        &self,
        id: Uuid,
        patch: TransactionPatch,
    ) -> Result<TransactionRecord, StoreError> {
        let mut map = self
            .transactions
            .write()
            .expect("transaction map lock poisoned");
        let record = map.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "transaction",
            id: id.to_string(),
        })?;

        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(code) = patch.payment_code {
            record.payment_code = Some(code);
        }
        if let Some(journey) = patch.journey {
            record.journey = Some(journey);
        }
        if let Some(metadata) = patch.metadata {
            record.metadata = metadata;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<TransactionRecord>, StoreError> {
        Ok(self
            .transactions
            .read()
            .expect("transaction map lock poisoned")
            .get(&id)
            .cloned())
    }
}
