use async_trait::async_trait;
use serde_json::json;

use message_bus::{CapabilityHandler, HandlerError, Message, MessageBus, Payload};
use response_parser::{parse, validate, ParsedResponse, ResponseFormat, ResponseSchema};

use crate::backend::{PromptParameters, SharedBackend};
use crate::file_data::FILE_DATA_REQUEST;

pub const BUG_DETECTION_REQUEST: &str = "BUG_DETECTION_REQUEST";

const ANALYSIS_SCHEMA: &str = r#"{
  "summary": "one paragraph overview",
  "bugs": []
}"#;

/// Asks the backend to analyze code for defects and returns the structured
/// analysis. When the reply does not match the expected JSON shape the raw
/// text is passed through instead of failing the request.
pub struct BugDetectionAgent {
    backend: SharedBackend,
    parameters: PromptParameters,
    schema: ResponseSchema,
}

impl BugDetectionAgent {
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            parameters: PromptParameters::default(),
            schema: ResponseSchema::new(ResponseFormat::Json, ANALYSIS_SCHEMA),
        }
    }

    /// Pull a file listing over the bus so the prompt can mention the
    /// project layout. A failed scan degrades to a code-only prompt.
    async fn project_context(&self, request: &Message, bus: &MessageBus) -> Option<String> {
        let path = request.payload.get_str("path")?;

        let scan = Message::request(
            self.name(),
            FILE_DATA_REQUEST,
            Payload::data([("path".to_string(), json!(path))]),
        );
        let response = bus.send(scan).await;

        if response.is_error() {
            log::warn!(
                "[bug_detection] project scan failed, analyzing without file context: {}",
                response.error_detail().unwrap_or("unknown error")
            );
            return None;
        }

        response.payload.as_snapshot().map(|snapshot| {
            let listing: Vec<&str> = snapshot
                .files
                .iter()
                .map(|file| file.path.as_str())
                .collect();
            format!("Project files under {}:\n{}", snapshot.root, listing.join("\n"))
        })
    }

    fn build_prompt(&self, code: &str, context: Option<&str>) -> String {
        let mut prompt = String::from(
            "Analyze the following code for bugs. Reply with JSON containing \
             a 'summary' string and a 'bugs' array.\n\n",
        );
        if let Some(context) = context {
            prompt.push_str(context);
            prompt.push_str("\n\n");
        }
        prompt.push_str("```\n");
        prompt.push_str(code);
        prompt.push_str("\n```");
        prompt
    }
}

#[async_trait]
impl CapabilityHandler for BugDetectionAgent {
    fn name(&self) -> &str {
        "bug_detection_agent"
    }

    fn message_types(&self) -> Vec<String> {
        vec![BUG_DETECTION_REQUEST.to_string()]
    }

    async fn handle(&self, request: &Message, bus: &MessageBus) -> Result<Message, HandlerError> {
        let code = request
            .payload
            .get_str("code")
            .ok_or_else(|| HandlerError::Failed("request payload is missing 'code'".to_string()))?;

        let context = self.project_context(request, bus).await;
        let prompt = self.build_prompt(code, context.as_deref());

        let reply = self
            .backend
            .send_prompt(&prompt, &self.parameters)
            .await
            .map_err(|error| HandlerError::Failed(error.to_string()))?;

        let parsed = parse(&reply, ResponseFormat::Json);
        let violation = validate(&parsed, &self.schema);

        let payload = match (&parsed, violation) {
            (ParsedResponse::Json { value, .. }, None) => {
                Payload::data([("analysis".to_string(), value.clone())])
            }
            (_, violation) => {
                let warning = violation
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "backend reply was not valid JSON".to_string());
                log::warn!("[bug_detection] degraded analysis: {}", warning);
                Payload::data([
                    ("analysis_text".to_string(), json!(parsed.raw())),
                    ("degraded".to_string(), json!(true)),
                    ("warning".to_string(), json!(warning)),
                ])
            }
        };

        Ok(Message::response(request, self.name(), payload))
    }
}
