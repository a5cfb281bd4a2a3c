use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-step status machine.
///
/// `Pending → Running → {Done, Failed, RequiresInput}`; a `RequiresInput`
/// step returns to `Running` once external input is supplied. `Done` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
    RequiresInput,
}

impl Default for StepStatus {
    fn default() -> Self {
        StepStatus::Pending
    }
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Done | StepStatus::Failed)
    }
}

/// One unit of work inside a plan, bound to the capability (message type)
/// that executes it. Dependencies are plain step ids resolved through the
/// owning plan's index — steps never reference their plan back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub description: String,
    /// Message type dispatched on the bus when this step runs.
    pub capability: String,
    #[serde(default)]
    pub input: HashMap<String, Value>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        capability: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            capability: capability.into(),
            input: HashMap::new(),
            dependencies: Vec::new(),
            status: StepStatus::Pending,
            output: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_input(mut self, input: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.input = input.into_iter().collect();
        self
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Outcome of executing one step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub success: bool,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub requires_user_input: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl StepResult {
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            requires_user_input: false,
            input_prompt: None,
            metadata: HashMap::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
            requires_user_input: false,
            input_prompt: None,
            metadata: HashMap::new(),
        }
    }

    pub fn needs_input(prompt: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: None,
            requires_user_input: true,
            input_prompt: Some(prompt.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
