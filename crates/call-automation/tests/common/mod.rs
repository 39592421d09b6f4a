#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use rvoip_call_automation::prelude::*;
use rvoip_call_automation::request::CallCommand;

/// One command as the transport saw it
#[derive(Debug, Clone)]
pub struct SentCommand {
    pub call_connection_id: CallConnectionId,
    pub command: CallCommand,
    pub repeatability: Option<RepeatabilityToken>,
}

/// In-memory transport that records every send and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentCommand>>,
    failures: Mutex<VecDeque<CallAutomationError>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, error: CallAutomationError) {
        self.failures.lock().push_back(error);
    }

    pub fn sent(&self) -> Vec<SentCommand> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl CallConnectionTransport for RecordingTransport {
    async fn send(
        &self,
        call_connection_id: &CallConnectionId,
        command: &CallCommand,
        repeatability: Option<&RepeatabilityToken>,
    ) -> Result<CommandAck> {
        self.sent.lock().push(SentCommand {
            call_connection_id: call_connection_id.clone(),
            command: command.clone(),
            repeatability: repeatability.copied(),
        });
        match self.failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(CommandAck::new(202)),
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("rvoip_call_automation=debug")
        .with_test_writer()
        .try_init();
}

pub fn client(transport: Arc<RecordingTransport>, config: CallAutomationConfig) -> CallAutomationClient {
    CallAutomationClient::builder()
        .transport(transport)
        .config(config)
        .build()
        .expect("valid client configuration")
}

/// CloudEvents webhook body for a single event
pub fn webhook_body(kind: &str, call_connection_id: &str, operation_context: &str) -> String {
    json!([{
        "id": uuid::Uuid::new_v4().to_string(),
        "source": format!("calling/callConnections/{call_connection_id}"),
        "type": format!("Microsoft.Communication.{kind}"),
        "specversion": "1.0",
        "data": {
            "callConnectionId": call_connection_id,
            "operationContext": operation_context,
            "resultInformation": { "code": 200, "subCode": 0, "message": "ok" }
        }
    }])
    .to_string()
}
