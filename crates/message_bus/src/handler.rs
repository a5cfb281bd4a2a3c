use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::bus::MessageBus;
use crate::message::Message;

#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(String),

    #[error("handler failed: {0}")]
    Failed(String),
}

/// A capability provider addressable by message type.
///
/// Handlers declare the message types they accept at registration time and
/// implement a single entry point. They may issue further requests on the
/// bus they are handed, which makes capability composition possible; nested
/// sends inherit the same timeout discipline as any other bus caller.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Message types this handler accepts. Receiving any other type is a
    /// contract violation and fails fast on the bus side.
    fn message_types(&self) -> Vec<String>;

    async fn handle(&self, request: &Message, bus: &MessageBus) -> Result<Message, HandlerError>;
}

pub type SharedHandler = Arc<dyn CapabilityHandler>;
