use async_trait::async_trait;

use message_bus::{CapabilityHandler, HandlerError, Message, MessageBus, Payload};
use response_parser::extract_fenced_block;

use crate::backend::{PromptParameters, SharedBackend};

pub const CODE_GENERATION_REQUEST: &str = "CODE_GENERATION_REQUEST";

/// Turns an instruction into generated code, stripping any fenced-block
/// chatter the backend wraps around it.
pub struct CodeGenerationAgent {
    backend: SharedBackend,
    parameters: PromptParameters,
    language: String,
}

impl CodeGenerationAgent {
    pub fn new(backend: SharedBackend) -> Self {
        Self::for_language(backend, "kotlin")
    }

    pub fn for_language(backend: SharedBackend, language: impl Into<String>) -> Self {
        Self {
            backend,
            parameters: PromptParameters::default(),
            language: language.into(),
        }
    }
}

#[async_trait]
impl CapabilityHandler for CodeGenerationAgent {
    fn name(&self) -> &str {
        "code_generation_agent"
    }

    fn message_types(&self) -> Vec<String> {
        vec![CODE_GENERATION_REQUEST.to_string()]
    }

    async fn handle(&self, request: &Message, _bus: &MessageBus) -> Result<Message, HandlerError> {
        let instruction = request.payload.get_str("instruction").ok_or_else(|| {
            HandlerError::Failed("request payload is missing 'instruction'".to_string())
        })?;

        let prompt = format!(
            "Write {} code for the following task. Reply with a single \
             fenced code block and nothing else.\n\n{}",
            self.language, instruction
        );

        let reply = self
            .backend
            .send_prompt(&prompt, &self.parameters)
            .await
            .map_err(|error| HandlerError::Failed(error.to_string()))?;

        let code = extract_fenced_block(&reply, &self.language);
        if code.is_empty() {
            return Err(HandlerError::Failed(
                "backend returned an empty reply".to_string(),
            ));
        }

        Ok(Message::response(request, self.name(), Payload::Text(code)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use message_bus::CapabilityRegistry;

    use crate::backend::{BackendError, PromptBackend};

    use super::*;

    struct ScriptedBackend(String);

    #[async_trait]
    impl PromptBackend for ScriptedBackend {
        async fn send_prompt(
            &self,
            _prompt: &str,
            _parameters: &PromptParameters,
        ) -> Result<String, BackendError> {
            Ok(self.0.clone())
        }
    }

    struct UnavailableBackend;

    #[async_trait]
    impl PromptBackend for UnavailableBackend {
        async fn send_prompt(
            &self,
            _prompt: &str,
            _parameters: &PromptParameters,
        ) -> Result<String, BackendError> {
            Err(BackendError::Transport("connection refused".to_string()))
        }
    }

    fn bus_with(backend: Arc<dyn PromptBackend>) -> MessageBus {
        let registry = Arc::new(CapabilityRegistry::new());
        registry
            .register_handler(Arc::new(CodeGenerationAgent::new(backend)))
            .unwrap();
        MessageBus::new(registry)
    }

    #[tokio::test]
    async fn strips_the_fence_around_generated_code() {
        let bus = bus_with(Arc::new(ScriptedBackend(
            "Sure! Here you go:\n```kotlin\nfun greet() = \"hi\"\n```\nHope that helps.".to_string(),
        )));

        let request = Message::request(
            "tester",
            CODE_GENERATION_REQUEST,
            Payload::data([("instruction".to_string(), json!("write a greeter"))]),
        );
        let response = bus.send(request).await;

        assert!(!response.is_error());
        assert_eq!(response.payload.as_text(), Some("fun greet() = \"hi\""));
    }

    #[tokio::test]
    async fn unfenced_reply_passes_through_trimmed() {
        let bus = bus_with(Arc::new(ScriptedBackend(
            "  fun greet() = \"hi\"  \n".to_string(),
        )));

        let request = Message::request(
            "tester",
            CODE_GENERATION_REQUEST,
            Payload::data([("instruction".to_string(), json!("write a greeter"))]),
        );
        let response = bus.send(request).await;

        assert_eq!(response.payload.as_text(), Some("fun greet() = \"hi\""));
    }

    #[tokio::test]
    async fn backend_failure_becomes_an_error_envelope() {
        let bus = bus_with(Arc::new(UnavailableBackend));

        let request = Message::request(
            "tester",
            CODE_GENERATION_REQUEST,
            Payload::data([("instruction".to_string(), json!("write anything"))]),
        );
        let response = bus.send(request).await;

        assert!(response.is_error());
        assert!(response.error_detail().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn missing_instruction_fails_the_request() {
        let bus = bus_with(Arc::new(ScriptedBackend("```\ncode\n```".to_string())));

        let request = Message::request("tester", CODE_GENERATION_REQUEST, Payload::Empty);
        let response = bus.send(request).await;

        assert!(response.is_error());
        assert!(response.error_detail().unwrap().contains("instruction"));
    }
}
