use dashmap::{mapref::entry::Entry, DashMap};
use thiserror::Error;

use crate::handler::SharedHandler;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("handler already registered for message type '{0}'")]
    DuplicateRegistration(String),

    #[error("invalid registration: {0}")]
    InvalidRegistration(String),
}

/// Maps message types to the handler bound to each of them.
///
/// Reads are concurrent; writes for the same type are serialized through the
/// map's entry API. Overwriting requires an explicit `unregister` first —
/// registering over an existing binding is rejected.
pub struct CapabilityRegistry {
    handlers: DashMap<String, SharedHandler>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Bind `handler` to a single message type.
    pub fn register(
        &self,
        message_type: &str,
        handler: SharedHandler,
    ) -> Result<(), RegistryError> {
        let message_type = message_type.trim();

        if message_type.is_empty() {
            return Err(RegistryError::InvalidRegistration(
                "message type cannot be empty".to_string(),
            ));
        }

        match self.handlers.entry(message_type.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateRegistration(
                message_type.to_string(),
            )),
            Entry::Vacant(entry) => {
                entry.insert(handler);
                Ok(())
            }
        }
    }

    /// Bind `handler` to every message type it declares. Fails without
    /// side effects if any of those types is already bound.
    pub fn register_handler(&self, handler: SharedHandler) -> Result<(), RegistryError> {
        let types = handler.message_types();

        if types.is_empty() {
            return Err(RegistryError::InvalidRegistration(format!(
                "handler '{}' declares no message types",
                handler.name()
            )));
        }

        for message_type in &types {
            if self.handlers.contains_key(message_type.trim()) {
                return Err(RegistryError::DuplicateRegistration(message_type.clone()));
            }
        }

        for message_type in &types {
            self.register(message_type, SharedHandler::clone(&handler))?;
        }

        Ok(())
    }

    pub fn resolve(&self, message_type: &str) -> Option<SharedHandler> {
        self.handlers
            .get(message_type)
            .map(|entry| SharedHandler::clone(entry.value()))
    }

    /// Remove the binding for `message_type`. Idempotent; returns whether a
    /// binding existed.
    pub fn unregister(&self, message_type: &str) -> bool {
        self.handlers.remove(message_type).is_some()
    }

    pub fn message_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
