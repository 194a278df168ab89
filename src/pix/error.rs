use crate::pix::types::RecurrenceStatus;
use crate::store::StoreError;
use thiserror::Error;

pub type PixResult<T> = Result<T, PixError>;

/// Retryable HTTP statuses during polling (gateway eventual consistency).
pub const RETRYABLE_HTTP_STATUSES: [u16; 9] = [404, 408, 409, 423, 429, 500, 502, 503, 504];

#[derive(Debug, Clone, Error)]
pub enum PixError {
    #[error("Authentication failed: {message}")]
    Auth {
        message: String,
        remediation: String,
    },

    #[error("Gateway error: HTTP {status}: {message}")]
    Gateway { status: u16, message: String },

    #[error("Network error: {message}")]
    Network { message: String, timeout: bool },

    #[error("Recurrence reached terminal status {status}")]
    TerminalRecurrence { status: RecurrenceStatus },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Payment code not obtained after {attempts} attempts (id_rec={id_rec})")]
    PollingExhausted { attempts: u32, id_rec: String },

    #[error("Certificate material error: {message}")]
    Certificate { message: String },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl PixError {
    pub fn validation(message: impl Into<String>) -> Self {
        PixError::Validation {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>, remediation: impl Into<String>) -> Self {
        PixError::Auth {
            message: message.into(),
            remediation: remediation.into(),
        }
    }

    /// Whether a polling attempt that hit this error may be retried.
    ///
    /// 401/403 mean the credentials are wrong and insisting cannot help;
    /// other 4xx outside the retryable set are contract violations. Anything
    /// else is absorbed by the polling loop up to its attempt budget.
    pub fn is_retryable(&self) -> bool {
        match self {
            PixError::Gateway { status, .. } => {
                if matches!(*status, 401 | 403) {
                    return false;
                }
                if RETRYABLE_HTTP_STATUSES.contains(status) {
                    return true;
                }
                !(400..500).contains(status)
            }
            PixError::Network { .. } => true,
            PixError::Auth { .. } => false,
            PixError::TerminalRecurrence { .. } => false,
            PixError::Validation { .. } => false,
            PixError::PollingExhausted { .. } => false,
            PixError::Certificate { .. } => false,
            PixError::Store(_) => false,
        }
    }

    /// Caller-facing summary. Keeps the three failure families apart:
    /// credential/certificate problems, gateway rejection, and convergence
    /// timeout each need different remediation.
    pub fn user_message(&self) -> String {
        match self {
            PixError::Auth {
                message,
                remediation,
            } => format!("{message}. {remediation}"),
            PixError::Certificate { message } => {
                format!("Client certificate problem: {message}")
            }
            PixError::Gateway { status, message } => {
                format!("Gateway rejected the request (HTTP {status}): {message}")
            }
            PixError::Network { .. } => {
                "Gateway is temporarily unreachable. Please retry shortly".to_string()
            }
            PixError::TerminalRecurrence { status } => {
                format!("Recurrence was declined by the gateway (status {status})")
            }
            PixError::Validation { message } => message.clone(),
            PixError::PollingExhausted { attempts, .. } => format!(
                "Gateway did not produce a valid payment code after {attempts} attempts"
            ),
            PixError::Store(e) => format!("Persistence failure: {e}"),
        }
    }
}
