//! Polling state machine for recurrence convergence
//!
//! The gateway assembles the payment code asynchronously after the mandate
//! is registered, so the engine re-queries on a fixed backoff ladder until
//! it sees a checksum-valid code in the expected journey, a terminal
//! status, or a fatal error. Each attempt reduces to an explicit tagged
//! outcome so the retryable/fatal distinction is enumerable rather than
//! buried in control flow.

use crate::pix::emv::is_valid_payment_code;
use crate::pix::error::{PixError, PixResult};
use crate::pix::gateway::{RecurrenceGateway, RecurrenceView};
use crate::pix::types::{MerchantAccount, RecurrenceStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Journey tag this flow expects the gateway to assign.
pub const EXPECTED_JOURNEY: &str = "JORNADA_3";

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub max_attempts: u32,
    /// Seconds to wait after attempt N, indexed by N-1. The last value
    /// repeats when attempts outnumber the ladder.
    pub ladder: Vec<Duration>,
    pub expected_journey: String,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            ladder: [1, 2, 3, 5, 5, 5, 8, 8, 8, 10, 10]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
            expected_journey: EXPECTED_JOURNEY.to_string(),
        }
    }
}

impl PollSettings {
    fn delay_after(&self, attempt: u32) -> Duration {
        self.ladder
            .get(attempt as usize - 1)
            .or_else(|| self.ladder.last())
            .copied()
            .unwrap_or(Duration::from_secs(2))
    }
}

/// Outcome of one polling attempt.
#[derive(Debug)]
pub enum Attempt {
    Ready {
        code: String,
        journey: Option<String>,
        status: Option<RecurrenceStatus>,
        qr_image: Option<String>,
    },
    NotReady,
    Retryable(PixError),
    Fatal(PixError),
}

/// Final successful poll result, folded into the transaction record by the
/// orchestrator.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub payment_code: String,
    pub journey: String,
    pub status: Option<RecurrenceStatus>,
    pub attempts_used: u32,
    pub checksum_valid: bool,
    pub qr_image: Option<String>,
}

/// Classifies a gateway view of the recurrence.
fn classify_view(view: RecurrenceView, expected_journey: &str) -> Attempt {
    if let Some(status) = view.status {
        if status.is_terminal_negative() {
            return Attempt::Fatal(PixError::TerminalRecurrence { status });
        }
    }

    let Some(code) = view.emv() else {
        return Attempt::NotReady;
    };
    if !is_valid_payment_code(code) {
        // partially assembled code; keep waiting
        return Attempt::NotReady;
    }
    match view.journey() {
        Some(journey) if journey != expected_journey => Attempt::NotReady,
        declared => Attempt::Ready {
            code: code.to_string(),
            journey: declared.map(str::to_string),
            status: view.status,
            qr_image: view.qr_image().map(str::to_string),
        },
    }
}

/// Classifies a query failure using the structured error taxonomy.
fn classify_error(err: PixError) -> Attempt {
    if err.is_retryable() {
        Attempt::Retryable(err)
    } else {
        Attempt::Fatal(err)
    }
}

pub struct PollingEngine {
    gateway: Arc<dyn RecurrenceGateway>,
    settings: PollSettings,
}

impl PollingEngine {
    pub fn new(gateway: Arc<dyn RecurrenceGateway>, settings: PollSettings) -> Self {
        Self { gateway, settings }
    }

    /// Polls until the recurrence yields a valid payment code, a terminal
    /// state, a fatal error, or the attempt budget runs out.
    pub async fn poll(
        &self,
        account: &MerchantAccount,
        id_rec: &str,
        txid: &str,
    ) -> PixResult<PollOutcome> {
        for attempt in 1..=self.settings.max_attempts {
            let outcome = match self.gateway.query_recurrence(account, id_rec, txid).await {
                Ok(None) => Attempt::NotReady,
                Ok(Some(view)) => classify_view(view, &self.settings.expected_journey),
                Err(e) => classify_error(e),
            };

            match outcome {
                Attempt::Ready {
                    code,
                    journey,
                    status,
                    qr_image,
                } => {
                    info!(id_rec, txid, attempt, "payment code obtained and validated");
                    return Ok(PollOutcome {
                        payment_code: code,
                        journey: journey
                            .unwrap_or_else(|| self.settings.expected_journey.clone()),
                        status,
                        attempts_used: attempt,
                        checksum_valid: true,
                        qr_image,
                    });
                }
                Attempt::Fatal(err) => {
                    warn!(id_rec, txid, attempt, error = %err, "polling aborted");
                    return Err(err);
                }
                Attempt::NotReady => {
                    debug!(id_rec, txid, attempt, "recurrence not ready");
                }
                Attempt::Retryable(err) => {
                    debug!(id_rec, txid, attempt, error = %err, "retryable gateway error");
                }
            }

            if attempt < self.settings.max_attempts {
                tokio::time::sleep(self.settings.delay_after(attempt)).await;
            }
        }

        Err(PixError::PollingExhausted {
            attempts: self.settings.max_attempts,
            id_rec: id_rec.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pix::gateway::NewRecurrence;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    const VALID_EMV: &str = "00020126580014br.gov.bcb.pix0136123e4567-e12b-12d1-a456-42665544000052040000530398654041.005802BR5913Fulano de Tal6008BRASILIA62070503***6304B836";

    struct ScriptedGateway {
        responses: Mutex<VecDeque<PixResult<Option<RecurrenceView>>>>,
        queries: AtomicU32,
    }

    impl ScriptedGateway {
        fn new(responses: Vec<PixResult<Option<RecurrenceView>>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                queries: AtomicU32::new(0),
            })
        }

        fn query_count(&self) -> u32 {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecurrenceGateway for ScriptedGateway {
        async fn create_charge(
            &self,
            _: &MerchantAccount,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
        ) -> PixResult<()> {
            Ok(())
        }

        async fn create_location(&self, _: &MerchantAccount) -> PixResult<u64> {
            Ok(1)
        }

        async fn create_recurrence(
            &self,
            _: &MerchantAccount,
            _: &NewRecurrence,
        ) -> PixResult<String> {
            Ok("RR0000001".to_string())
        }

        async fn query_recurrence(
            &self,
            _: &MerchantAccount,
            _: &str,
            _: &str,
        ) -> PixResult<Option<RecurrenceView>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(None))
        }
    }

    fn account() -> MerchantAccount {
        MerchantAccount {
            id: "acc-1".to_string(),
            name: "Test".to_string(),
            app_key: "app".to_string(),
            basic_auth: "YTpi".to_string(),
            base_url: "https://gw.example".to_string(),
            oauth_url: "https://gw.example/oauth/token".to_string(),
            receiving_key: Some("key@example.com".to_string()),
            active: true,
        }
    }

    fn ready_view(journey: Option<&str>) -> RecurrenceView {
        serde_json::from_value(serde_json::json!({
            "status": "ATIVA",
            "dadosQR": {
                "pixCopiaECola": VALID_EMV,
                "jornada": journey,
            }
        }))
        .unwrap()
    }

    fn status_view(status: &str) -> RecurrenceView {
        serde_json::from_value(serde_json::json!({ "status": status })).unwrap()
    }

    fn engine(gateway: Arc<ScriptedGateway>) -> PollingEngine {
        PollingEngine::new(gateway, PollSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_first_ready_attempt_after_not_ready() {
        let gateway = ScriptedGateway::new(vec![
            Ok(None),
            Ok(Some(status_view("CRIADA"))),
            Ok(Some(ready_view(Some("JORNADA_3")))),
        ]);
        let outcome = engine(gateway.clone())
            .poll(&account(), "RR1", "tx1")
            .await
            .unwrap();
        assert_eq!(outcome.attempts_used, 3);
        assert_eq!(outcome.payment_code, VALID_EMV);
        assert_eq!(outcome.journey, "JORNADA_3");
        assert!(outcome.checksum_valid);
        assert_eq!(gateway.query_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_journey_defaults_to_expected_marker() {
        let gateway = ScriptedGateway::new(vec![Ok(Some(ready_view(None)))]);
        let outcome = engine(gateway).poll(&account(), "RR1", "tx1").await.unwrap();
        assert_eq!(outcome.journey, "JORNADA_3");
        assert_eq!(outcome.attempts_used, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_journey_keeps_waiting() {
        let gateway = ScriptedGateway::new(vec![
            Ok(Some(ready_view(Some("JORNADA_1")))),
            Ok(Some(ready_view(Some("JORNADA_3")))),
        ]);
        let outcome = engine(gateway).poll(&account(), "RR1", "tx1").await.unwrap();
        assert_eq!(outcome.attempts_used, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_status_fails_immediately() {
        for status in ["REJEITADA", "CANCELADA", "EXPIRADA"] {
            let gateway = ScriptedGateway::new(vec![
                Ok(Some(status_view(status))),
                Ok(Some(ready_view(Some("JORNADA_3")))),
            ]);
            let err = engine(gateway.clone())
                .poll(&account(), "RR1", "tx1")
                .await
                .unwrap_err();
            assert!(matches!(err, PixError::TerminalRecurrence { .. }), "{status}");
            assert_eq!(gateway.query_count(), 1, "{status} must not keep polling");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_checksum_is_treated_as_not_ready() {
        let broken = VALID_EMV.replace("B836", "0000");
        let broken_view: RecurrenceView = serde_json::from_value(serde_json::json!({
            "dadosQR": { "pixCopiaECola": broken, "jornada": "JORNADA_3" }
        }))
        .unwrap();
        let gateway = ScriptedGateway::new(vec![
            Ok(Some(broken_view)),
            Ok(Some(ready_view(Some("JORNADA_3")))),
        ]);
        let outcome = engine(gateway).poll(&account(), "RR1", "tx1").await.unwrap();
        assert_eq!(outcome.attempts_used, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_http_errors_are_absorbed() {
        let gateway = ScriptedGateway::new(vec![
            Err(PixError::Gateway {
                status: 503,
                message: "upstream busy".to_string(),
            }),
            Err(PixError::Network {
                message: "connection reset".to_string(),
                timeout: false,
            }),
            Ok(Some(ready_view(Some("JORNADA_3")))),
        ]);
        let outcome = engine(gateway).poll(&account(), "RR1", "tx1").await.unwrap();
        assert_eq!(outcome.attempts_used, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn credential_errors_short_circuit() {
        for status in [401, 403] {
            let gateway = ScriptedGateway::new(vec![Err(PixError::Gateway {
                status,
                message: "denied".to_string(),
            })]);
            let err = engine(gateway.clone())
                .poll(&account(), "RR1", "tx1")
                .await
                .unwrap_err();
            assert!(matches!(err, PixError::Gateway { .. }));
            assert_eq!(gateway.query_count(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_4xx_is_fatal() {
        let gateway = ScriptedGateway::new(vec![Err(PixError::Gateway {
            status: 422,
            message: "campo invalido".to_string(),
        })]);
        let err = engine(gateway.clone())
            .poll(&account(), "RR1", "tx1")
            .await
            .unwrap_err();
        assert!(matches!(err, PixError::Gateway { status: 422, .. }));
        assert_eq!(gateway.query_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_attempts_yields_polling_exhausted() {
        let gateway = ScriptedGateway::new(vec![]); // every query returns Ok(None)
        let err = engine(gateway.clone())
            .poll(&account(), "RR9", "tx9")
            .await
            .unwrap_err();
        match err {
            PixError::PollingExhausted { attempts, id_rec } => {
                assert_eq!(attempts, 12);
                assert_eq!(id_rec, "RR9");
            }
            other => panic!("expected PollingExhausted, got {other:?}"),
        }
        assert_eq!(gateway.query_count(), 12);
    }

    #[test]
    fn ladder_repeats_its_last_value() {
        let settings = PollSettings::default();
        assert_eq!(settings.delay_after(1), Duration::from_secs(1));
        assert_eq!(settings.delay_after(6), Duration::from_secs(5));
        assert_eq!(settings.delay_after(11), Duration::from_secs(10));
        assert_eq!(settings.delay_after(15), Duration::from_secs(10));
    }
}
