pub mod bus;
pub mod handler;
pub mod message;
pub mod registry;

pub use bus::{BusConfig, MessageBus};
pub use handler::{CapabilityHandler, HandlerError, SharedHandler};
pub use message::{
    ErrorCode, FileEntry, Message, MessageKind, Payload, ProjectSnapshot,
};
pub use registry::{CapabilityRegistry, RegistryError};
