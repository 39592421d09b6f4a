//! Operation context allocation
//!
//! Every command carries an operation context. A caller who wants to chain
//! operations supplies their own; otherwise a fresh UUID is generated. The
//! service echoes the value back inside the events the command produces.

use uuid::Uuid;

use crate::errors::{CallAutomationError, Result};
use crate::types::OperationContext;

/// Field name reported in validation errors
pub const OPERATION_CONTEXT_FIELD: &str = "operation_context";

/// Length of a generated context (a hyphenated UUID)
pub const GENERATED_CONTEXT_LENGTH: usize = 36;

/// Resolve the operation context for one command.
///
/// An absent or empty value is replaced by a fresh UUID. A supplied value is
/// used unchanged after its length has been checked against `max_length`.
pub fn allocate(supplied: Option<&str>, max_length: usize) -> Result<OperationContext> {
    match supplied {
        Some(context) if !context.is_empty() => {
            check_max_length(OPERATION_CONTEXT_FIELD, context, max_length)?;
            Ok(OperationContext(context.to_string()))
        }
        _ => Ok(generate()),
    }
}

/// A fresh, globally unique context
pub fn generate() -> OperationContext {
    OperationContext(Uuid::new_v4().to_string())
}

/// Length check shared by every free-text field; counts characters, not bytes
pub fn check_max_length(field: &'static str, value: &str, max_length: usize) -> Result<()> {
    let length = value.chars().count();
    if length > max_length {
        return Err(CallAutomationError::validation(
            field,
            format!("length {length} exceeds the maximum of {max_length}"),
        ));
    }
    Ok(())
}
