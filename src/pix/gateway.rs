//! Typed client for the gateway's recurrence endpoints
//!
//! Four calls, each resolving a bearer token through the cache and going out
//! over the shared mutual-TLS transport. The wire field names are the
//! gateway's own (Portuguese), kept behind serde renames.

use crate::pix::error::{PixError, PixResult};
use crate::pix::token::TokenCache;
use crate::pix::transport::Transport;
use crate::pix::types::{MerchantAccount, Periodicity, RecurrenceStatus, RetryPolicy};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Note attached to the upfront charge when the caller supplies none.
pub const DEFAULT_PAYER_NOTE: &str = "Primeira parcela - Pix Automatico";

/// Parameters for registering a recurring mandate.
#[derive(Debug, Clone)]
pub struct NewRecurrence {
    pub contract: String,
    pub debtor_cpf: String,
    pub debtor_name: String,
    pub start_date: NaiveDate,
    pub periodicity: Periodicity,
    pub retry_policy: RetryPolicy,
    pub recurring_value: String,
    pub location_id: u64,
    pub txid: String,
}

/// Gateway seam. The polling engine and the orchestrator only see this
/// trait, so tests drive them with scripted implementations.
#[async_trait]
pub trait RecurrenceGateway: Send + Sync {
    /// Idempotent upsert of the upfront charge keyed by txid.
    async fn create_charge(
        &self,
        account: &MerchantAccount,
        txid: &str,
        value: &str,
        receiving_key: &str,
        payer_note: &str,
    ) -> PixResult<()>;

    /// Allocates the location identifier binding the recurrence.
    async fn create_location(&self, account: &MerchantAccount) -> PixResult<u64>;

    /// Registers the mandate; returns the gateway's recurrence id.
    async fn create_recurrence(
        &self,
        account: &MerchantAccount,
        recurrence: &NewRecurrence,
    ) -> PixResult<String>;

    /// Current gateway view of the recurrence. HTTP 404 maps to `Ok(None)`:
    /// the recurrence may simply not be visible yet.
    async fn query_recurrence(
        &self,
        account: &MerchantAccount,
        id_rec: &str,
        txid: &str,
    ) -> PixResult<Option<RecurrenceView>>;
}

// ---- wire types -----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LocationCreated {
    id: u64,
}

fn charge_body(expiry_secs: u64, value: &str, receiving_key: &str, payer_note: &str) -> serde_json::Value {
    serde_json::json!({
        "calendario": { "expiracao": expiry_secs },
        "valor": { "original": value },
        "chave": receiving_key,
        "solicitacaoPagador": payer_note,
    })
}

fn recurrence_body(recurrence: &NewRecurrence) -> serde_json::Value {
    serde_json::json!({
        "vinculo": {
            "objeto": "masterClassic",
            "contrato": recurrence.contract,
            "devedor": {
                "cpf": recurrence.debtor_cpf,
                "nome": recurrence.debtor_name,
            },
        },
        "calendario": {
            "dataInicial": recurrence.start_date,
            "periodicidade": recurrence.periodicity,
        },
        "politicaRetentativa": recurrence.retry_policy,
        "loc": recurrence.location_id,
        "valor": { "valorRec": recurrence.recurring_value },
        "ativacao": {
            "dadosJornada": { "txid": recurrence.txid },
        },
    })
}

#[derive(Debug, Deserialize)]
struct RecurrenceCreated {
    #[serde(rename = "idRec")]
    id_rec: String,
}

/// Gateway view of a recurrence. The payment code shows up under different
/// keys depending on how far the gateway has converged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecurrenceView {
    pub status: Option<RecurrenceStatus>,
    #[serde(rename = "idRec")]
    pub id_rec: Option<String>,
    #[serde(rename = "dadosQR")]
    pub dados_qr: Option<QrData>,
    #[serde(rename = "pixCopiaECola")]
    pub pix_copia_e_cola: Option<String>,
    pub qrcode: Option<QrCodeBlock>,
    pub payload: Option<PayloadBlock>,
    #[serde(rename = "imagemQrcode")]
    pub imagem_qrcode: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QrData {
    #[serde(rename = "pixCopiaECola")]
    pub pix_copia_e_cola: Option<String>,
    pub jornada: Option<String>,
    #[serde(rename = "imagemQrcode")]
    pub imagem_qrcode: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QrCodeBlock {
    pub emv: Option<String>,
    #[serde(rename = "imagemQrcode")]
    pub imagem_qrcode: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayloadBlock {
    pub emv: Option<String>,
}

impl RecurrenceView {
    /// The candidate payment code, wherever the gateway attached it.
    pub fn emv(&self) -> Option<&str> {
        self.dados_qr
            .as_ref()
            .and_then(|qr| qr.pix_copia_e_cola.as_deref())
            .or(self.pix_copia_e_cola.as_deref())
            .or_else(|| self.qrcode.as_ref().and_then(|q| q.emv.as_deref()))
            .or_else(|| self.payload.as_ref().and_then(|p| p.emv.as_deref()))
    }

    /// Journey tag the gateway assigned, when declared.
    pub fn journey(&self) -> Option<&str> {
        self.dados_qr.as_ref().and_then(|qr| qr.jornada.as_deref())
    }

    pub fn qr_image(&self) -> Option<&str> {
        self.imagem_qrcode
            .as_deref()
            .or_else(|| self.qrcode.as_ref().and_then(|q| q.imagem_qrcode.as_deref()))
    }
}

// ---- client ---------------------------------------------------------------

pub struct PixGatewayClient {
    transport: Arc<Transport>,
    tokens: Arc<TokenCache>,
    charge_expiry_secs: u64,
}

impl PixGatewayClient {
    pub fn new(transport: Arc<Transport>, tokens: Arc<TokenCache>, charge_expiry_secs: u64) -> Self {
        Self {
            transport,
            tokens,
            charge_expiry_secs,
        }
    }

    async fn send(
        &self,
        account: &MerchantAccount,
        method: Method,
        path: &str,
        extra_query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> PixResult<(u16, String)> {
        let token = self.tokens.get_token(account).await?;
        let base = account.base_url.trim_end_matches('/');
        let url = format!("{base}{path}");

        let mut request = self
            .transport
            .client()
            .request(method, &url)
            .bearer_auth(token)
            .query(&[("gw-dev-app-key", account.app_key.as_str())]);
        for (key, value) in extra_query {
            request = request.query(&[(*key, *value)]);
        }
        if let Some(payload) = body {
            request = request.json(&payload);
        }

        let response = request.send().await.map_err(|e| PixError::Network {
            message: format!("gateway request to {path} failed: {e}"),
            timeout: e.is_timeout(),
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        Ok((status, text))
    }

    fn parse<T: serde::de::DeserializeOwned>(status: u16, body: &str, path: &str) -> PixResult<T> {
        if !(200..300).contains(&status) {
            return Err(PixError::Gateway {
                status,
                message: gateway_message(body),
            });
        }
        serde_json::from_str::<T>(body).map_err(|e| PixError::Gateway {
            status,
            message: format!("invalid gateway JSON from {path}: {e}"),
        })
    }
}

/// Prefers the gateway's own error fields, falls back to a body snippet.
fn gateway_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["mensagem", "message", "detail", "error_description"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    let snippet: String = body.chars().take(200).collect();
    if snippet.is_empty() {
        "gateway returned an empty error body".to_string()
    } else {
        snippet
    }
}

#[async_trait]
impl RecurrenceGateway for PixGatewayClient {
    async fn create_charge(
        &self,
        account: &MerchantAccount,
        txid: &str,
        value: &str,
        receiving_key: &str,
        payer_note: &str,
    ) -> PixResult<()> {
        let body = charge_body(self.charge_expiry_secs, value, receiving_key, payer_note);
        let path = format!("/cob/{txid}");
        let (status, text) = self
            .send(account, Method::PUT, &path, &[], Some(body))
            .await?;
        if !(200..300).contains(&status) {
            return Err(PixError::Gateway {
                status,
                message: gateway_message(&text),
            });
        }
        info!(account = %account.id, txid, "upfront charge created");
        Ok(())
    }

    async fn create_location(&self, account: &MerchantAccount) -> PixResult<u64> {
        let (status, text) = self
            .send(
                account,
                Method::POST,
                "/locrec",
                &[],
                Some(serde_json::json!({})),
            )
            .await?;
        let created: LocationCreated = Self::parse(status, &text, "/locrec")?;
        info!(account = %account.id, location_id = created.id, "recurrence location allocated");
        Ok(created.id)
    }

    async fn create_recurrence(
        &self,
        account: &MerchantAccount,
        recurrence: &NewRecurrence,
    ) -> PixResult<String> {
        let body = recurrence_body(recurrence);
        let (status, text) = self
            .send(account, Method::POST, "/rec", &[], Some(body))
            .await?;
        let created: RecurrenceCreated = Self::parse(status, &text, "/rec")?;
        info!(
            account = %account.id,
            id_rec = %created.id_rec,
            txid = %recurrence.txid,
            "recurring mandate registered"
        );
        Ok(created.id_rec)
    }

    async fn query_recurrence(
        &self,
        account: &MerchantAccount,
        id_rec: &str,
        txid: &str,
    ) -> PixResult<Option<RecurrenceView>> {
        let path = format!("/rec/{id_rec}");
        let (status, text) = self
            .send(account, Method::GET, &path, &[("txid", txid)], None)
            .await?;

        if status == 404 {
            debug!(account = %account.id, id_rec, "recurrence not visible yet");
            return Ok(None);
        }

        // the gateway sometimes wraps the view in a one-element array
        let value: serde_json::Value = Self::parse(status, &text, &path)?;
        let unwrapped = match value {
            serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            serde_json::Value::Array(_) => return Ok(None),
            other => other,
        };
        let view: RecurrenceView =
            serde_json::from_value(unwrapped).map_err(|e| PixError::Gateway {
                status,
                message: format!("invalid recurrence view: {e}"),
            })?;
        Ok(Some(view))
    }
}
