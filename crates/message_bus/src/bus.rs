use std::sync::Arc;
use std::time::Duration;

use crate::handler::HandlerError;
use crate::message::{ErrorCode, Message, MessageKind};
use crate::registry::CapabilityRegistry;

/// Sender id stamped on envelopes the bus synthesizes itself.
const BUS_SENDER_ID: &str = "message_bus";

/// Configuration for a bus instance.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Upper bound on a single handler invocation.
    pub request_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Routes a request to the one handler registered for its message type and
/// hands the response (or a synthesized error envelope) back to the caller.
///
/// `send` never fails at the call boundary: missing handlers, declared-type
/// violations, timeouts, handler errors and handler panics all come back as
/// correlated `Error` envelopes. The bus holds no state between calls beyond
/// its registry reference; construct one per execution scope and pass it
/// down instead of sharing a process-wide instance.
#[derive(Clone)]
pub struct MessageBus {
    registry: Arc<CapabilityRegistry>,
    config: BusConfig,
}

impl MessageBus {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self::with_config(registry, BusConfig::default())
    }

    pub fn with_config(registry: Arc<CapabilityRegistry>, config: BusConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Dispatch `request` and await its response up to the configured
    /// timeout.
    pub async fn send(&self, request: Message) -> Message {
        self.send_with_timeout(request, self.config.request_timeout)
            .await
    }

    /// Dispatch `request` with a per-call timeout override.
    ///
    /// On timeout the invocation is left running detached; cancellation is
    /// best-effort only.
    pub async fn send_with_timeout(&self, request: Message, timeout: Duration) -> Message {
        let handler = match self.registry.resolve(&request.message_type) {
            Some(handler) => handler,
            None => {
                log::warn!(
                    "[{}] no handler registered for message type '{}'",
                    request.sender_id,
                    request.message_type
                );
                return Message::error(
                    &request,
                    BUS_SENDER_ID,
                    ErrorCode::NoHandlerFound,
                    format!(
                        "no handler registered for message type '{}'",
                        request.message_type
                    ),
                );
            }
        };

        // Fail fast on a registration/declaration mismatch instead of
        // attempting best-effort handling.
        if !handler
            .message_types()
            .iter()
            .any(|t| t == &request.message_type)
        {
            return Message::error(
                &request,
                BUS_SENDER_ID,
                ErrorCode::UnsupportedMessageType,
                format!(
                    "handler '{}' does not accept message type '{}'",
                    handler.name(),
                    request.message_type
                ),
            );
        }

        log::debug!(
            "[{}] dispatching '{}' to handler '{}'",
            request.sender_id,
            request.message_type,
            handler.name()
        );

        let handler_name = handler.name().to_string();
        let bus = self.clone();
        let dispatched = request.clone();
        let invocation =
            tokio::spawn(async move { handler.handle(&dispatched, &bus).await });

        match tokio::time::timeout(timeout, invocation).await {
            Err(_elapsed) => {
                log::warn!(
                    "[{}] handler '{}' timed out after {:?} on '{}'",
                    request.sender_id,
                    handler_name,
                    timeout,
                    request.message_type
                );
                Message::error(
                    &request,
                    BUS_SENDER_ID,
                    ErrorCode::HandlerTimeout,
                    format!(
                        "handler '{}' did not respond within {:?}",
                        handler_name, timeout
                    ),
                )
            }
            Ok(Err(join_error)) => Message::error(
                &request,
                BUS_SENDER_ID,
                ErrorCode::HandlerFailed,
                format!("handler '{}' aborted: {}", handler_name, join_error),
            ),
            Ok(Ok(Err(HandlerError::UnsupportedMessageType(message_type)))) => Message::error(
                &request,
                &handler_name,
                ErrorCode::UnsupportedMessageType,
                format!("unsupported message type: {}", message_type),
            ),
            Ok(Ok(Err(error))) => Message::error(
                &request,
                &handler_name,
                ErrorCode::HandlerFailed,
                error.to_string(),
            ),
            Ok(Ok(Ok(mut response))) => {
                // Enforce correlation regardless of how the handler built
                // its envelope.
                response.correlates_to = Some(request.id);
                if response.kind == MessageKind::Request {
                    response.kind = MessageKind::Response;
                }
                response
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::handler::{CapabilityHandler, HandlerError};
    use crate::message::Payload;

    use super::*;

    struct CountingHandler {
        invocations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CapabilityHandler for CountingHandler {
        fn name(&self) -> &str {
            "counting"
        }

        fn message_types(&self) -> Vec<String> {
            vec!["COUNTED_REQUEST".to_string()]
        }

        async fn handle(
            &self,
            request: &Message,
            _bus: &MessageBus,
        ) -> Result<Message, HandlerError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(Message::response(request, self.name(), Payload::Empty))
        }
    }

    struct SleepyHandler;

    #[async_trait]
    impl CapabilityHandler for SleepyHandler {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn message_types(&self) -> Vec<String> {
            vec!["SLOW_REQUEST".to_string()]
        }

        async fn handle(
            &self,
            request: &Message,
            _bus: &MessageBus,
        ) -> Result<Message, HandlerError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Message::response(request, self.name(), Payload::Empty))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl CapabilityHandler for FailingHandler {
        fn name(&self) -> &str {
            "failing"
        }

        fn message_types(&self) -> Vec<String> {
            vec!["FAILING_REQUEST".to_string()]
        }

        async fn handle(
            &self,
            _request: &Message,
            _bus: &MessageBus,
        ) -> Result<Message, HandlerError> {
            Err(HandlerError::Failed("backend unavailable".to_string()))
        }
    }

    /// Answers "OUTER_REQUEST" by issuing a nested "COUNTED_REQUEST" on the
    /// same bus.
    struct ComposingHandler;

    #[async_trait]
    impl CapabilityHandler for ComposingHandler {
        fn name(&self) -> &str {
            "composing"
        }

        fn message_types(&self) -> Vec<String> {
            vec!["OUTER_REQUEST".to_string()]
        }

        async fn handle(
            &self,
            request: &Message,
            bus: &MessageBus,
        ) -> Result<Message, HandlerError> {
            let nested = Message::request(self.name(), "COUNTED_REQUEST", Payload::Empty);
            let nested_response = bus.send(nested).await;

            if nested_response.is_error() {
                return Err(HandlerError::Failed(
                    nested_response
                        .error_detail()
                        .unwrap_or("nested request failed")
                        .to_string(),
                ));
            }

            Ok(Message::response(
                request,
                self.name(),
                Payload::data([("nested".to_string(), json!(true))]),
            ))
        }
    }

    fn bus_with_registry() -> (MessageBus, Arc<CapabilityRegistry>) {
        let registry = Arc::new(CapabilityRegistry::new());
        (MessageBus::new(Arc::clone(&registry)), registry)
    }

    #[tokio::test]
    async fn unrouted_request_yields_no_handler_found() {
        let (bus, registry) = bus_with_registry();
        let invocations = Arc::new(AtomicUsize::new(0));
        registry
            .register_handler(Arc::new(CountingHandler {
                invocations: Arc::clone(&invocations),
            }))
            .unwrap();

        let request = Message::request("tester", "UNROUTED_REQUEST", Payload::Empty);
        let request_id = request.id;
        let response = bus.send(request).await;

        assert_eq!(response.error_code, Some(ErrorCode::NoHandlerFound));
        assert_eq!(response.correlates_to, Some(request_id));
        // The registered handler must never have been invoked.
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn routed_request_reaches_its_handler() {
        let (bus, registry) = bus_with_registry();
        let invocations = Arc::new(AtomicUsize::new(0));
        registry
            .register_handler(Arc::new(CountingHandler {
                invocations: Arc::clone(&invocations),
            }))
            .unwrap();

        let request = Message::request("tester", "COUNTED_REQUEST", Payload::Empty);
        let request_id = request.id;
        let response = bus.send(request).await;

        assert_eq!(response.kind, MessageKind::Response);
        assert!(response.success);
        assert_eq!(response.correlates_to, Some(request_id));
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let (bus, registry) = bus_with_registry();
        registry.register_handler(Arc::new(SleepyHandler)).unwrap();

        let request = Message::request("tester", "SLOW_REQUEST", Payload::Empty);
        let response = bus
            .send_with_timeout(request, Duration::from_millis(20))
            .await;

        assert_eq!(response.error_code, Some(ErrorCode::HandlerTimeout));
        assert!(response.error_detail().unwrap().contains("sleepy"));
    }

    #[tokio::test]
    async fn undeclared_type_fails_fast() {
        let (bus, registry) = bus_with_registry();
        // Bind the handler to a type it does not declare.
        registry
            .register("OTHER_REQUEST", Arc::new(SleepyHandler))
            .unwrap();

        let request = Message::request("tester", "OTHER_REQUEST", Payload::Empty);
        let response = bus.send(request).await;

        assert_eq!(
            response.error_code,
            Some(ErrorCode::UnsupportedMessageType)
        );
    }

    #[tokio::test]
    async fn handler_error_becomes_error_envelope() {
        let (bus, registry) = bus_with_registry();
        registry.register_handler(Arc::new(FailingHandler)).unwrap();

        let request = Message::request("tester", "FAILING_REQUEST", Payload::Empty);
        let response = bus.send(request).await;

        assert_eq!(response.error_code, Some(ErrorCode::HandlerFailed));
        assert_eq!(response.error_detail(), Some("handler failed: backend unavailable"));
    }

    #[tokio::test]
    async fn handlers_compose_through_the_bus() {
        let (bus, registry) = bus_with_registry();
        let invocations = Arc::new(AtomicUsize::new(0));
        registry
            .register_handler(Arc::new(CountingHandler {
                invocations: Arc::clone(&invocations),
            }))
            .unwrap();
        registry
            .register_handler(Arc::new(ComposingHandler))
            .unwrap();

        let request = Message::request("tester", "OUTER_REQUEST", Payload::Empty);
        let response = bus.send(request).await;

        assert!(response.success);
        assert_eq!(response.payload.get("nested"), Some(&json!(true)));
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }
}
