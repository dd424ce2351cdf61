//! Remote authority client
//!
//! The authority is the backend that owns berth allocation. The client
//! fetches the current offer set and submits accept/deny responses; the
//! authority's verdict is final and arrives either in the HTTP response
//! or later over the socket as a confirmation/rejection event.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use shared::models::OfferDraft;
use shared::response::ApiResponse;

/// Accept/deny/fetch surface of the allocation backend.
///
/// Abstracted as a trait so the session facade can be driven by a mock
/// in tests.
#[async_trait]
pub trait Authority: Send + Sync {
    /// Current offer records for a PNR
    async fn fetch_offers(&self, pnr: &str) -> SyncResult<Vec<OfferDraft>>;

    /// Submit an accept for a notification
    async fn accept_upgrade(
        &self,
        pnr: &str,
        notification_id: &str,
    ) -> SyncResult<ApiResponse<Value>>;

    /// Submit a deny with a reason
    async fn deny_upgrade(
        &self,
        pnr: &str,
        notification_id: &str,
        reason: &str,
    ) -> SyncResult<ApiResponse<Value>>;
}

/// HTTP implementation over the passenger REST API
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    client: Client,
    base_url: String,
}

impl HttpAuthority {
    pub fn new(config: &ClientConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> SyncResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "GET");
        let response = self.client.get(&url).send().await?;
        Self::handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> SyncResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "POST");
        let response = self.client.post(&url).json(body).send().await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> SyncResult<T> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SyncError::Remote(format!("{status}: {text}")));
        }
        response.json().await.map_err(Into::into)
    }
}

#[async_trait]
impl Authority for HttpAuthority {
    async fn fetch_offers(&self, pnr: &str) -> SyncResult<Vec<OfferDraft>> {
        let response: ApiResponse<Vec<OfferDraft>> = self
            .get(&format!("/api/passenger/upgrade-notifications/{pnr}"))
            .await?;

        if !response.success {
            return Err(SyncError::Remote(
                response
                    .message
                    .unwrap_or_else(|| "Failed to fetch offers".to_string()),
            ));
        }
        Ok(response.data.unwrap_or_default())
    }

    async fn accept_upgrade(
        &self,
        pnr: &str,
        notification_id: &str,
    ) -> SyncResult<ApiResponse<Value>> {
        #[derive(serde::Serialize)]
        #[serde(rename_all = "camelCase")]
        struct AcceptRequest<'a> {
            pnr: &'a str,
            notification_id: &'a str,
        }

        self.post(
            "/api/passenger/accept-upgrade",
            &AcceptRequest {
                pnr,
                notification_id,
            },
        )
        .await
    }

    async fn deny_upgrade(
        &self,
        pnr: &str,
        notification_id: &str,
        reason: &str,
    ) -> SyncResult<ApiResponse<Value>> {
        #[derive(serde::Serialize)]
        #[serde(rename_all = "camelCase")]
        struct DenyRequest<'a> {
            pnr: &'a str,
            notification_id: &'a str,
            reason: &'a str,
        }

        self.post(
            "/api/passenger/deny-upgrade",
            &DenyRequest {
                pnr,
                notification_id,
                reason,
            },
        )
        .await
    }
}
