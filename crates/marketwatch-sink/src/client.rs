//! HTTP client for the core API that records product and subscription state.

use serde::Serialize;
use std::time::Duration;

use marketwatch_core::types::{EventPosition, ProductId, ProductTerms};

use crate::error::SinkError;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Request bodies ───────────────────────────────────────────────────────────

/// Pricing and ownership fields shared by deploy and pricing updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermsBody {
    pub owner_address: String,
    pub beneficiary_address: String,
    pub price_per_second: String,
    pub price_currency: String,
    pub minimum_subscription_in_seconds: String,
}

impl From<&ProductTerms> for TermsBody {
    fn from(terms: &ProductTerms) -> Self {
        Self {
            owner_address: terms.owner.clone(),
            beneficiary_address: terms.beneficiary.clone(),
            price_per_second: terms.price_per_second.clone(),
            price_currency: terms.currency.symbol().to_string(),
            minimum_subscription_in_seconds: terms.minimum_subscription_seconds.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedBody {
    pub block_number: u64,
    pub block_index: u64,
    /// Absent for a redeploy.
    #[serde(flatten)]
    pub terms: Option<TermsBody>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndeployedBody {
    pub block_number: u64,
    pub block_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingBody {
    pub block_number: u64,
    pub block_index: u64,
    #[serde(flatten)]
    pub terms: TermsBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionBody {
    pub block_number: u64,
    pub block_index: u64,
    pub product: String,
    pub address: String,
    pub ends_at: String,
}

impl UndeployedBody {
    pub fn at(position: EventPosition) -> Self {
        Self {
            block_number: position.block_number,
            block_index: position.block_index,
        }
    }
}

// ─── Client ───────────────────────────────────────────────────────────────────

/// Authenticated JSON client for the core API.
pub struct CoreApiClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl CoreApiClient {
    /// `base_url` may carry a trailing slash; it is dropped.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, SinkError> {
        let base_url = base_url.into();
        let base_url = base_url.strip_suffix('/').unwrap_or(&base_url).to_string();
        if base_url.is_empty() {
            return Err(SinkError::Config("no core API URL given".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SinkError::Config(format!("building HTTP client: {e}")))?;
        Ok(Self {
            base_url,
            token: token.into(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn set_deployed(&self, id: &ProductId, body: &DeployedBody) -> Result<(), SinkError> {
        self.post(&format!("products/{id}/setDeployed"), body).await
    }

    pub async fn set_undeployed(&self, id: &ProductId, body: &UndeployedBody) -> Result<(), SinkError> {
        self.post(&format!("products/{id}/setUndeployed"), body).await
    }

    pub async fn set_pricing(&self, id: &ProductId, body: &PricingBody) -> Result<(), SinkError> {
        self.post(&format!("products/{id}/setPricing"), body).await
    }

    pub async fn subscribe(&self, body: &SubscriptionBody) -> Result<(), SinkError> {
        self.post("subscriptions", body).await
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), SinkError> {
        let url = format!("{}/{path}", self.base_url);
        tracing::info!(url = %url, "POST core API");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(SinkError::from_reqwest)?;

        let status = resp.status();
        if status.is_success() {
            tracing::debug!(url = %url, status = status.as_u16(), "Core API accepted");
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(SinkError::Unavailable(format!("HTTP 503: {text}")));
        }
        Err(SinkError::Status {
            status: status.as_u16(),
            body: text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketwatch_core::types::Currency;
    use serde_json::json;

    fn terms() -> ProductTerms {
        ProductTerms {
            owner: "0xOwner".into(),
            beneficiary: "0xBeneficiary".into(),
            price_per_second: "3".into(),
            currency: Currency::Usd,
            minimum_subscription_seconds: "60".into(),
        }
    }

    #[test]
    fn deployed_body_flattens_terms() {
        let body = DeployedBody {
            block_number: 7,
            block_index: 2,
            terms: Some(TermsBody::from(&terms())),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "blockNumber": 7,
                "blockIndex": 2,
                "ownerAddress": "0xOwner",
                "beneficiaryAddress": "0xBeneficiary",
                "pricePerSecond": "3",
                "priceCurrency": "USD",
                "minimumSubscriptionInSeconds": "60"
            })
        );
    }

    #[test]
    fn redeploy_body_has_only_position() {
        let body = DeployedBody {
            block_number: 7,
            block_index: 2,
            terms: None,
        };
        assert_eq!(serde_json::to_value(&body).unwrap(), json!({"blockNumber": 7, "blockIndex": 2}));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = CoreApiClient::new("https://api.example.com/v1/", "t", DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(client.base_url(), "https://api.example.com/v1");
    }

    #[test]
    fn empty_url_is_rejected() {
        assert!(matches!(
            CoreApiClient::new("/", "t", DEFAULT_REQUEST_TIMEOUT),
            Err(SinkError::Config(_))
        ));
    }
}
