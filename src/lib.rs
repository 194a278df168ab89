//! recpix-backend — PIX recurring-payment provisioning core
//!
//! Orchestrates recurring payment orders against an OAuth2-protected,
//! mutually-authenticated instant-payment gateway: token acquisition and
//! caching, mutual-TLS transport, the charge/location/recurrence creation
//! workflow, and the polling state machine that converges on a
//! checksum-valid payment code.

pub mod config;
pub mod logging;
pub mod pix;
pub mod store;

pub use config::{AppConfig, ConfigError, PixConfig};
pub use pix::{
    MerchantAccount, Periodicity, PixError, PixGatewayClient, PixResult, PollSettings,
    ProvisionService, RecurrenceGateway, RecurrenceRequest, RetryPolicy, TransactionRecord,
    TransactionStatus,
};
pub use store::{AccountStore, InMemoryStore, StoreError, TransactionStore};
