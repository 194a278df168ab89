//! Core domain types for PIX recurrence provisioning

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One gateway-integrated merchant. Read-only to this crate; owned by the
/// persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantAccount {
    pub id: String,
    pub name: String,
    /// gw-dev-app-key query parameter value.
    pub app_key: String,
    /// Pre-encoded credential for `Authorization: Basic <...>`.
    pub basic_auth: String,
    pub base_url: String,
    pub oauth_url: String,
    /// Default receiving PIX key (chave do recebedor).
    pub receiving_key: Option<String>,
    pub active: bool,
}

impl MerchantAccount {
    /// Builds the Basic credential from a client id/secret pair.
    pub fn encode_basic_auth(client_id: &str, client_secret: &str) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(format!("{client_id}:{client_secret}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Periodicity {
    #[serde(rename = "DIARIA")]
    Diaria,
    #[serde(rename = "SEMANAL")]
    Semanal,
    #[serde(rename = "MENSAL")]
    Mensal,
    #[serde(rename = "ANUAL")]
    Anual,
}

impl Periodicity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Periodicity::Diaria => "DIARIA",
            Periodicity::Semanal => "SEMANAL",
            Periodicity::Mensal => "MENSAL",
            Periodicity::Anual => "ANUAL",
        }
    }
}

/// Gateway retry policy for failed debit attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryPolicy {
    #[serde(rename = "PERMITE_3R_7D")]
    Permite3R7D,
    #[serde(rename = "PERMITE_3R_15D")]
    Permite3R15D,
    #[serde(rename = "PERMITE_3R_30D")]
    Permite3R30D,
}

impl RetryPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryPolicy::Permite3R7D => "PERMITE_3R_7D",
            RetryPolicy::Permite3R15D => "PERMITE_3R_15D",
            RetryPolicy::Permite3R30D => "PERMITE_3R_30D",
        }
    }
}

/// Recurrence status as reported by the gateway. Unknown values must not
/// break deserialization of the recurrence view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrenceStatus {
    #[serde(rename = "CRIADA")]
    Criada,
    #[serde(rename = "APROVADA")]
    Aprovada,
    #[serde(rename = "ATIVA")]
    Ativa,
    #[serde(rename = "REJEITADA")]
    Rejeitada,
    #[serde(rename = "CANCELADA")]
    Cancelada,
    #[serde(rename = "EXPIRADA")]
    Expirada,
    #[serde(other)]
    Desconhecida,
}

impl RecurrenceStatus {
    /// Terminal-negative states: the gateway will never attach a payment
    /// code to these, so polling must stop immediately.
    pub fn is_terminal_negative(&self) -> bool {
        matches!(
            self,
            RecurrenceStatus::Rejeitada | RecurrenceStatus::Cancelada | RecurrenceStatus::Expirada
        )
    }
}

impl fmt::Display for RecurrenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecurrenceStatus::Criada => "CRIADA",
            RecurrenceStatus::Aprovada => "APROVADA",
            RecurrenceStatus::Ativa => "ATIVA",
            RecurrenceStatus::Rejeitada => "REJEITADA",
            RecurrenceStatus::Cancelada => "CANCELADA",
            RecurrenceStatus::Expirada => "EXPIRADA",
            RecurrenceStatus::Desconhecida => "DESCONHECIDA",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    #[serde(rename = "PENDENTE")]
    Pendente,
    #[serde(rename = "ATIVA")]
    Ativa,
    #[serde(rename = "REJEITADA")]
    Rejeitada,
    #[serde(rename = "CANCELADA")]
    Cancelada,
    #[serde(rename = "EXPIRADA")]
    Expirada,
}

impl From<RecurrenceStatus> for TransactionStatus {
    fn from(status: RecurrenceStatus) -> Self {
        match status {
            RecurrenceStatus::Rejeitada => TransactionStatus::Rejeitada,
            RecurrenceStatus::Cancelada => TransactionStatus::Cancelada,
            RecurrenceStatus::Expirada => TransactionStatus::Expirada,
            // CRIADA/APROVADA views with a valid code settle as active
            _ => TransactionStatus::Ativa,
        }
    }
}

/// Caller-supplied provisioning request. Immutable once submitted.
///
/// Monetary values travel as decimal strings ("99.90") exactly as the
/// gateway expects them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceRequest {
    pub debtor_cpf: String,
    pub debtor_name: String,
    pub contract: String,
    pub start_date: NaiveDate,
    pub periodicity: Periodicity,
    pub retry_policy: RetryPolicy,
    pub recurring_value: String,
    pub upfront_value: String,
    /// Overrides the account's default receiving key when set.
    pub receiving_key: Option<String>,
    /// Overrides the default upfront-charge note (solicitacaoPagador).
    pub payer_note: Option<String>,
}

/// Durable provisioning artifact. Created `PENDENTE` before polling begins;
/// patched once to a terminal status when polling concludes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub account_id: String,
    pub txid: String,
    pub id_rec: String,
    pub contract: String,
    pub debtor_cpf: String,
    pub debtor_name: String,
    pub upfront_value: String,
    pub recurring_value: String,
    pub start_date: NaiveDate,
    pub periodicity: Periodicity,
    pub retry_policy: RetryPolicy,
    pub status: TransactionStatus,
    pub payment_code: Option<String>,
    pub journey: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
