//! PIX recurrence provisioning core

pub mod certs;
pub mod emv;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod polling;
pub mod token;
pub mod transport;
pub mod types;

pub use error::{PixError, PixResult};
pub use gateway::{PixGatewayClient, RecurrenceGateway, RecurrenceView};
pub use orchestrator::{generate_txid, ProvisionService};
pub use polling::{PollOutcome, PollSettings, PollingEngine};
pub use token::{OAuthTokenFetcher, SystemClock, TokenCache};
pub use transport::{HttpSettings, Transport};
pub use types::{
    MerchantAccount, Periodicity, RecurrenceRequest, RecurrenceStatus, RetryPolicy,
    TransactionRecord, TransactionStatus,
};
