//! Inference API Types
//!
//! Wire types for the inference service. Field names follow the service's
//! JSON (camelCase); interpretation into domain types happens in `scan`.

use serde::{Deserialize, Serialize};

/// Prediction response body
/// Endpoint: POST /predict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictResponse {
    /// Freshness label: "fresh", "rotten" or "unknown"
    pub result: String,
    /// Freshness confidence, percent
    pub confidence: f64,
    /// Detected produce type
    pub fruit_type: String,
    /// Confidence of the produce-type prediction, percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fruit_confidence: Option<f64>,
}

/// Error body returned by the service on failure
///
/// `detail` is a string for most errors but a list of objects for
/// request-validation errors, so it is kept as raw JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ApiError {
    /// Human-readable form of `detail`
    pub fn message(&self) -> Option<String> {
        match &self.detail {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_response_parses_service_body() {
        let body = r#"{"result":"rotten","confidence":81.25,"fruitType":"banana","fruitConfidence":97.1}"#;
        let parsed: PredictResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.result, "rotten");
        assert_eq!(parsed.confidence, 81.25);
        assert_eq!(parsed.fruit_type, "banana");
        assert_eq!(parsed.fruit_confidence, Some(97.1));
    }

    #[test]
    fn test_predict_response_without_fruit_confidence() {
        let body = r#"{"result":"fresh","confidence":92.5,"fruitType":"apple"}"#;
        let parsed: PredictResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.fruit_confidence, None);
    }

    #[test]
    fn test_predict_response_rejects_missing_fields() {
        assert!(serde_json::from_str::<PredictResponse>(r#"{"result":"fresh"}"#).is_err());
        assert!(
            serde_json::from_str::<PredictResponse>(
                r#"{"result":"fresh","confidence":"high","fruitType":"apple"}"#
            )
            .is_err()
        );
    }

    #[test]
    fn test_api_error_message() {
        let err: ApiError = serde_json::from_str(r#"{"detail":"Model not loaded"}"#).unwrap();
        assert_eq!(err.message().as_deref(), Some("Model not loaded"));

        let err: ApiError = serde_json::from_str(r#"{"detail":[{"loc":["body","file"]}]}"#).unwrap();
        assert!(err.message().unwrap().contains("file"));

        assert_eq!(ApiError::default().message(), None);
    }
}
