//! Persistence collaborator interfaces
//!
//! The durable side of provisioning lives outside this crate; these traits
//! are the contract it must satisfy. An in-memory implementation ships in
//! [`memory`] for demos and tests.

pub mod memory;

use crate::pix::types::{MerchantAccount, TransactionRecord, TransactionStatus};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemoryStore;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("record not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    #[error("serialization failure: {message}")]
    Serialization { message: String },
}

/// Fields for a new transaction record. The store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account_id: String,
    pub txid: String,
    pub id_rec: String,
    pub contract: String,
    pub debtor_cpf: String,
    pub debtor_name: String,
    pub upfront_value: String,
    pub recurring_value: String,
    pub start_date: chrono::NaiveDate,
    pub periodicity: crate::pix::types::Periodicity,
    pub retry_policy: crate::pix::types::RetryPolicy,
    pub status: TransactionStatus,
}

/// Patch applied once polling concludes. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub status: Option<TransactionStatus>,
    pub payment_code: Option<String>,
    pub journey: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, id: &str) -> Result<Option<MerchantAccount>, StoreError>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn create_transaction(
        &self,
        fields: NewTransaction,
    ) -> Result<TransactionRecord, StoreError>;

    async fn update_transaction(
        &self,
        id: Uuid,
        patch: TransactionPatch,
    ) -> Result<TransactionRecord, StoreError>;

    async fn get_transaction(&self, id: Uuid) -> Result<Option<TransactionRecord>, StoreError>;
}
