//! Client entry point
//!
//! The [`CallAutomationClient`] owns the one [`EventProcessor`] for the
//! process and hands out [`CallConnection`] handles that share it. The
//! event-delivery path feeds raw webhook bodies in through
//! [`CallAutomationClient::process_events`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rvoip_call_automation::prelude::*;
//!
//! # async fn example(transport: Arc<dyn CallConnectionTransport>) -> Result<()> {
//! let client = CallAutomationClientBuilder::new()
//!     .transport(transport)
//!     .config(CallAutomationConfig::new().with_default_wait_timeout(Duration::from_secs(90)))
//!     .build()?;
//!
//! let connection = client.get_call_connection("call-1")?;
//! let result = connection
//!     .remove_participant(CommunicationIdentifier::communication_user("8:acs:bob"), None)
//!     .await?;
//!
//! // Elsewhere, the webhook handler does:
//! // client.process_events(&body)?;
//!
//! let outcome = result.wait_for_outcome_default().await?;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::config::CallAutomationConfig;
use crate::connection::CallConnection;
use crate::errors::{CallAutomationError, Result};
use crate::events::EventProcessor;
use crate::transport::CallConnectionTransport;
use crate::types::CallConnectionId;

/// Issues call connection handles over one transport and one event processor
#[derive(Debug, Clone)]
pub struct CallAutomationClient {
    config: CallAutomationConfig,
    transport: Arc<dyn CallConnectionTransport>,
    processor: EventProcessor,
}

impl CallAutomationClient {
    pub fn builder() -> CallAutomationClientBuilder {
        CallAutomationClientBuilder::new()
    }

    pub fn config(&self) -> &CallAutomationConfig {
        &self.config
    }

    pub fn event_processor(&self) -> &EventProcessor {
        &self.processor
    }

    /// Handle for an existing call
    pub fn get_call_connection(&self, call_connection_id: impl Into<CallConnectionId>) -> Result<CallConnection> {
        let call_connection_id = call_connection_id.into();
        if call_connection_id.as_str().is_empty() {
            return Err(CallAutomationError::argument("call_connection_id"));
        }
        Ok(CallConnection::new(
            call_connection_id,
            Arc::clone(&self.transport),
            &self.config,
            self.processor.clone(),
        ))
    }

    /// Feed a raw webhook body into the event processor
    pub fn process_events(&self, body: &str) -> Result<usize> {
        self.processor.process_events(body)
    }
}

/// Builder for [`CallAutomationClient`]
#[derive(Debug, Default)]
pub struct CallAutomationClientBuilder {
    config: Option<CallAutomationConfig>,
    transport: Option<Arc<dyn CallConnectionTransport>>,
    processor: Option<EventProcessor>,
}

impl CallAutomationClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: CallAutomationConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn CallConnectionTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share an existing processor instead of creating one from the config
    pub fn event_processor(mut self, processor: EventProcessor) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Validate the configuration and build the client.
    ///
    /// # Errors
    ///
    /// * `CallAutomationError::Argument` - no transport was supplied
    /// * `CallAutomationError::Configuration` - the configuration is invalid
    pub fn build(self) -> Result<CallAutomationClient> {
        let transport = self.transport.ok_or(CallAutomationError::argument("transport"))?;
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let processor = self
            .processor
            .unwrap_or_else(|| EventProcessor::new(config.retention.clone(), config.broadcast_capacity));

        tracing::debug!(
            "Built call automation client (retention {} events / {:?})",
            config.retention.max_retained_events,
            config.retention.retention_ttl
        );

        Ok(CallAutomationClient {
            config,
            transport,
            processor,
        })
    }
}
