//! Remote sentiment classifier.
//!
//! Wire contract: `POST /predict {text, user_id, title}` answered by
//! `{durum: "Olumlu"|"Olumsuz", derece: 0-10, baslik, error?}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{GuardError, GuardResult};
use crate::model::Verdict;

const POSITIVE: &str = "Olumlu";
const NEGATIVE: &str = "Olumsuz";
const MAX_SEVERITY: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredictRequest {
    pub text: String,
    pub user_id: String,
    pub title: String,
}

/// Raw classifier payload. Every field is optional on the wire; missing
/// required fields are rejected rather than defaulted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictResponse {
    pub durum: Option<String>,
    pub derece: Option<i64>,
    pub baslik: Option<String>,
    pub error: Option<String>,
}

/// Validated classifier answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierVerdict {
    pub verdict: Verdict,
    pub severity: u8,
    /// Title as resolved by the classifier.
    pub title: Option<String>,
}

impl PredictResponse {
    pub fn into_verdict(self) -> GuardResult<ClassifierVerdict> {
        if let Some(error) = self.error.filter(|e| !e.is_empty()) {
            return Err(GuardError::ClassifierRejected(error));
        }

        let verdict = match self.durum.as_deref() {
            Some(POSITIVE) => Verdict::Positive,
            Some(NEGATIVE) => Verdict::Negative,
            Some(other) => {
                return Err(GuardError::ClassifierRejected(format!(
                    "unknown verdict {:?}",
                    other
                )))
            }
            None => {
                return Err(GuardError::ClassifierRejected(
                    "classifier response has no verdict".into(),
                ))
            }
        };

        let severity = match self.derece {
            Some(d) if (0..=MAX_SEVERITY).contains(&d) => d as u8,
            Some(d) => {
                return Err(GuardError::ClassifierRejected(format!(
                    "severity {} out of range",
                    d
                )))
            }
            None => {
                return Err(GuardError::ClassifierRejected(
                    "classifier response has no severity".into(),
                ))
            }
        };

        Ok(ClassifierVerdict {
            verdict,
            severity,
            title: self.baslik.filter(|t| !t.trim().is_empty()),
        })
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, request: &PredictRequest) -> GuardResult<ClassifierVerdict>;
}

/// HTTP client for the `/predict` endpoint.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpClassifier {
    pub fn new(endpoint: &str, timeout: Duration) -> GuardResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| GuardError::Config(format!("Invalid classifier URL: {}", e)))?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("newsguard/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| GuardError::Config(format!("Client error: {}", e)))?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, request: &PredictRequest) -> GuardResult<ClassifierVerdict> {
        log::debug!("POST {} ({} chars)", self.endpoint, request.text.chars().count());

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| GuardError::ClassifierUnavailable(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            GuardError::ClassifierUnavailable(format!("Failed to read body: {}", e))
        })?;

        interpret(status.as_u16(), &body)
    }
}

/// Error statuses still carry the classifier's own message in `error`;
/// that is passed through, anything else is an availability failure.
fn interpret(status: u16, body: &str) -> GuardResult<ClassifierVerdict> {
    let payload = serde_json::from_str::<PredictResponse>(body);
    if !(200..300).contains(&status) {
        return match payload {
            Ok(PredictResponse {
                error: Some(error), ..
            }) if !error.is_empty() => Err(GuardError::ClassifierRejected(error)),
            _ => Err(GuardError::ClassifierUnavailable(format!("HTTP error: {}", status))),
        };
    }
    payload
        .map_err(|e| GuardError::ClassifierUnavailable(format!("Malformed response: {}", e)))?
        .into_verdict()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> GuardResult<ClassifierVerdict> {
        serde_json::from_str::<PredictResponse>(json).unwrap().into_verdict()
    }

    #[test]
    fn maps_turkish_fields() {
        let v = parse(r#"{"durum":"Olumsuz","derece":8,"baslik":"Deprem","error":null}"#).unwrap();
        assert_eq!(v.verdict, Verdict::Negative);
        assert_eq!(v.severity, 8);
        assert_eq!(v.title.as_deref(), Some("Deprem"));

        let v = parse(r#"{"durum":"Olumlu","derece":0}"#).unwrap();
        assert_eq!(v.verdict, Verdict::Positive);
        assert_eq!(v.title, None);
    }

    #[test]
    fn error_field_is_passed_through() {
        let err = parse(r#"{"error":"Metin bulunamadı!"}"#).unwrap_err();
        assert_eq!(err, GuardError::ClassifierRejected("Metin bulunamadı!".into()));
    }

    #[test]
    fn missing_fields_are_rejected() {
        // The duplicate-title answer carries only a message.
        assert!(matches!(
            parse(r#"{"message":"Bu haber zaten analiz edilmiş."}"#),
            Err(GuardError::ClassifierRejected(_))
        ));
        assert!(matches!(
            parse(r#"{"durum":"Olumsuz"}"#),
            Err(GuardError::ClassifierRejected(_))
        ));
        assert!(matches!(
            parse(r#"{"durum":"Olumsuz","derece":11}"#),
            Err(GuardError::ClassifierRejected(_))
        ));
        assert!(matches!(
            parse(r#"{"durum":"Nötr","derece":2}"#),
            Err(GuardError::ClassifierRejected(_))
        ));
    }

    #[test]
    fn error_status_keeps_classifier_message() {
        let err = interpret(400, r#"{"error":"Metin bulunamadı!"}"#).unwrap_err();
        assert_eq!(err, GuardError::ClassifierRejected("Metin bulunamadı!".into()));

        let err = interpret(502, "<html>Bad Gateway</html>").unwrap_err();
        assert!(err.is_retryable());

        let ok = interpret(200, r#"{"durum":"Olumsuz","derece":5,"baslik":"x"}"#).unwrap();
        assert_eq!(ok.severity, 5);
    }

    #[test]
    fn request_serialises_wire_names() {
        let body = serde_json::to_value(PredictRequest {
            text: "metin".into(),
            user_id: "u_1".into(),
            title: "başlık".into(),
        })
        .unwrap();
        assert_eq!(body["text"], "metin");
        assert_eq!(body["user_id"], "u_1");
        assert_eq!(body["title"], "başlık");
    }

    #[test]
    fn rejects_bad_endpoint() {
        assert!(HttpClassifier::new("not a url", Duration::from_secs(1)).is_err());
    }
}
