//! `ReportingSink`: the event handler that forwards domain events to the
//! core API.

use async_trait::async_trait;

use marketwatch_core::dispatcher::EventHandler;
use marketwatch_core::error::WatchError;
use marketwatch_core::types::{DomainEvent, EventKind};

use crate::client::{
    CoreApiClient, DeployedBody, PricingBody, SubscriptionBody, TermsBody, UndeployedBody,
};
use crate::error::SinkError;

pub const HANDLER_NAME: &str = "core-api";

pub struct ReportingSink {
    client: CoreApiClient,
}

impl ReportingSink {
    pub fn new(client: CoreApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &CoreApiClient {
        &self.client
    }

    async fn deliver(&self, event: &DomainEvent) -> Result<(), SinkError> {
        let position = event.position;
        match &event.kind {
            EventKind::ProductDeployed { product_id, terms } => {
                let body = DeployedBody {
                    block_number: position.block_number,
                    block_index: position.block_index,
                    terms: terms.as_ref().map(TermsBody::from),
                };
                self.client.set_deployed(product_id, &body).await
            }
            EventKind::ProductUndeployed { product_id } => {
                self.client
                    .set_undeployed(product_id, &UndeployedBody::at(position))
                    .await
            }
            EventKind::ProductUpdated { product_id, terms } => {
                let body = PricingBody {
                    block_number: position.block_number,
                    block_index: position.block_index,
                    terms: TermsBody::from(terms),
                };
                self.client.set_pricing(product_id, &body).await
            }
            EventKind::Subscribed {
                product_id,
                subscriber,
                ends_at,
            } => {
                let body = SubscriptionBody {
                    block_number: position.block_number,
                    block_index: position.block_index,
                    product: product_id.to_string(),
                    address: subscriber.clone(),
                    ends_at: ends_at.clone(),
                };
                self.client.subscribe(&body).await
            }
            EventKind::Ignored { .. } => Ok(()),
        }
    }
}

#[async_trait]
impl EventHandler for ReportingSink {
    fn name(&self) -> &str {
        HANDLER_NAME
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), WatchError> {
        self.deliver(event).await.map_err(|e| {
            let handler = HANDLER_NAME.to_string();
            let reason = e.to_string();
            if e.is_unavailable() {
                WatchError::SinkUnavailable { handler, reason }
            } else {
                WatchError::SinkRejected { handler, reason }
            }
        })
    }
}
