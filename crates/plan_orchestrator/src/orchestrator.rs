use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use message_bus::{Message, MessageBus, Payload};

use crate::plan::{PlanError, TaskPlan};
use crate::step::{Step, StepResult, StepStatus};

/// Configuration for a plan run.
pub struct OrchestratorConfig {
    /// Upper bound on concurrently dispatched steps.
    pub max_concurrency: usize,
    /// Sender id stamped on the requests this orchestrator emits.
    pub sender_id: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            sender_id: "plan_orchestrator".to_string(),
        }
    }
}

/// Terminal (or paused) state of a plan run.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStatus {
    Completed,
    Failed,
    AwaitingInput { step_id: String, prompt: String },
}

/// Per-step results plus the ids of steps skipped because an upstream
/// dependency failed (mapped to the failed ancestor).
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub status: PlanStatus,
    pub results: HashMap<String, StepResult>,
    pub skipped: HashMap<String, String>,
}

impl PlanOutcome {
    pub fn success(&self) -> bool {
        self.status == PlanStatus::Completed
    }
}

/// Drives a plan to a terminal state over the message bus.
///
/// Each scheduling pass takes a consistent snapshot of step statuses (the
/// orchestrator owns the plan mutably for the whole pass), dispatches every
/// ready step concurrently up to `max_concurrency`, and applies the
/// resulting transitions before scanning again. A failure only stops the
/// branches that depend on it; independent subtrees keep running.
pub struct PlanOrchestrator {
    bus: MessageBus,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl PlanOrchestrator {
    pub fn new(bus: MessageBus) -> Self {
        Self::with_config(bus, OrchestratorConfig::default())
    }

    pub fn with_config(bus: MessageBus, config: OrchestratorConfig) -> Self {
        Self {
            bus,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts the run when cancelled. In-flight bus calls are
    /// signalled best-effort; handlers may not stop promptly.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Execute until no pending step is ready: either the plan completed,
    /// the remaining steps are unreachable past a failure, or a step is
    /// awaiting external input.
    pub async fn run(&self, plan: &mut TaskPlan) -> PlanOutcome {
        let mut results: HashMap<String, StepResult> = HashMap::new();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

        loop {
            if self.cancel.is_cancelled() {
                self.fail_remaining(plan, &mut results);
                break;
            }

            let ready = plan.ready_steps();
            if ready.is_empty() {
                break;
            }

            log::debug!(
                "plan {}: dispatching wave of {} step(s): {:?}",
                plan.id,
                ready.len(),
                ready
            );

            let wave: Vec<Step> = ready
                .iter()
                .filter_map(|id| plan.step(id).cloned())
                .collect();
            for id in &ready {
                if let Some(step) = plan.step_mut(id) {
                    step.status = StepStatus::Running;
                }
            }

            let dispatches = wave.into_iter().map(|step| {
                let bus = self.bus.clone();
                let sender_id = self.config.sender_id.clone();
                let semaphore = Arc::clone(&semaphore);
                let cancel = self.cancel.clone();
                async move {
                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => return (step.id, StepResult::failure("scheduler shut down")),
                    };

                    let request = Message::request(
                        sender_id,
                        step.capability.clone(),
                        Payload::Data(step.input.clone()),
                    );

                    let response = tokio::select! {
                        _ = cancel.cancelled() => {
                            return (step.id, StepResult::failure("plan aborted"));
                        }
                        response = bus.send(request) => response,
                    };

                    (step.id, step_result_from_response(response))
                }
            });

            for (step_id, result) in join_all(dispatches).await {
                self.apply_transition(plan, &step_id, &result);
                results.insert(step_id, result);
            }
        }

        self.finalize(plan, results)
    }

    /// Supply external input for a step that paused in `RequiresInput` and
    /// continue the run. The input is merged into the step's input map and
    /// the step goes back through `Running` on the next scheduling pass.
    pub async fn resume(
        &self,
        plan: &mut TaskPlan,
        step_id: &str,
        input: HashMap<String, Value>,
    ) -> Result<PlanOutcome, PlanError> {
        let step = plan
            .step_mut(step_id)
            .ok_or_else(|| PlanError::UnknownStep(step_id.to_string()))?;

        if step.status != StepStatus::RequiresInput {
            return Err(PlanError::NotAwaitingInput(step_id.to_string()));
        }

        step.input.extend(input);
        step.status = StepStatus::Pending;

        Ok(self.run(plan).await)
    }

    fn apply_transition(&self, plan: &mut TaskPlan, step_id: &str, result: &StepResult) {
        let Some(step) = plan.step_mut(step_id) else {
            return;
        };

        if result.requires_user_input {
            step.status = StepStatus::RequiresInput;
            step.output = Some(result.output.clone());
            log::info!(
                "step '{}' paused awaiting input: {}",
                step_id,
                result.input_prompt.as_deref().unwrap_or("")
            );
        } else if result.success {
            step.status = StepStatus::Done;
            step.output = Some(result.output.clone());
        } else {
            step.status = StepStatus::Failed;
            log::warn!(
                "step '{}' failed: {}",
                step_id,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    /// Abort path: every non-terminal step becomes a failed step.
    fn fail_remaining(&self, plan: &mut TaskPlan, results: &mut HashMap<String, StepResult>) {
        let remaining: Vec<String> = plan
            .steps()
            .iter()
            .filter(|step| !step.status.is_terminal())
            .map(|step| step.id.clone())
            .collect();

        for step_id in remaining {
            if let Some(step) = plan.step_mut(&step_id) {
                step.status = StepStatus::Failed;
            }
            results.insert(step_id, StepResult::failure("plan aborted"));
        }
    }

    fn finalize(
        &self,
        plan: &mut TaskPlan,
        mut results: HashMap<String, StepResult>,
    ) -> PlanOutcome {
        let mut skipped = HashMap::new();

        for (step_id, ancestor) in plan.unreachable_steps() {
            if let Some(step) = plan.step_mut(&step_id) {
                step.status = StepStatus::Failed;
            }
            results.insert(
                step_id.clone(),
                StepResult::failure(format!(
                    "upstream dependency failed: step '{}' did not complete",
                    ancestor
                ))
                .with_metadata("failed_ancestor", Value::String(ancestor.clone())),
            );
            skipped.insert(step_id, ancestor);
        }

        let status = if let Some(step) = plan.awaiting_input() {
            let prompt = results
                .get(&step.id)
                .and_then(|result| result.input_prompt.clone())
                .unwrap_or_default();
            PlanStatus::AwaitingInput {
                step_id: step.id.clone(),
                prompt,
            }
        } else if plan.all_done() {
            PlanStatus::Completed
        } else {
            PlanStatus::Failed
        };

        log::info!("plan {} finished: {:?}", plan.id, status);

        PlanOutcome {
            status,
            results,
            skipped,
        }
    }
}

/// Translate a bus envelope into a step outcome.
///
/// Handlers signal the requires-input pause through a data payload carrying
/// `requires_user_input: true` and a `prompt`.
fn step_result_from_response(response: Message) -> StepResult {
    if response.is_error() {
        let mut result = StepResult::failure(
            response
                .error_detail()
                .unwrap_or("handler returned an error")
                .to_string(),
        );
        if let Some(code) = response.error_code {
            result = result.with_metadata(
                "error_code",
                serde_json::to_value(code).unwrap_or(Value::Null),
            );
        }
        return result;
    }

    if response
        .payload
        .get("requires_user_input")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        let prompt = response
            .payload
            .get_str("prompt")
            .unwrap_or("additional input required")
            .to_string();
        return StepResult::needs_input(prompt);
    }

    StepResult::ok(payload_to_value(response.payload))
}

fn payload_to_value(payload: Payload) -> Value {
    match payload {
        Payload::Data(map) => Value::Object(map.into_iter().collect()),
        Payload::Text(text) => Value::String(text),
        Payload::ProjectStructure(snapshot) => {
            serde_json::to_value(snapshot).unwrap_or(Value::Null)
        }
        Payload::Empty => Value::Null,
    }
}
