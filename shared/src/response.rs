//! Remote-authority response types
//!
//! The authority answers every request with a `{success, message, data}`
//! envelope; the facade reports operation outcomes to the presentation
//! layer the same way, so failure is always a value rather than a thrown
//! side channel.

use serde::{Deserialize, Serialize};

/// Response envelope returned by the remote authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Outcome of a facade accept/deny operation.
///
/// A failed attempt leaves the offer in its last-known state; the caller
/// may retry immediately.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfferActionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OfferActionOutcome {
    pub fn ok(data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_parses_authority_shape() {
        let parsed: ApiResponse<Vec<i32>> =
            serde_json::from_str(r#"{"success":true,"data":[1,2,3]}"#).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.data.unwrap(), vec![1, 2, 3]);

        let failed: ApiResponse<Vec<i32>> =
            serde_json::from_str(r#"{"success":false,"message":"Offer not found"}"#).unwrap();
        assert!(!failed.success);
        assert_eq!(failed.message.as_deref(), Some("Offer not found"));
    }
}
