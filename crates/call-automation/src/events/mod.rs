//! Asynchronous call events
//!
//! Parsing of webhook deliveries and the processor that correlates events
//! with the commands that produced them.

pub mod parser;
pub mod processor;
pub mod types;

pub use parser::parse_events;
pub use processor::{EventFilter, EventProcessor, EventProcessorStats, OngoingHandler, SubscriptionId};
pub use types::{CallAutomationEventKind, InboundEvent, ResultInformation};
