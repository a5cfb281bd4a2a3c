pub mod orchestrator;
pub mod plan;
pub mod step;

pub use orchestrator::{OrchestratorConfig, PlanOrchestrator, PlanOutcome, PlanStatus};
pub use plan::{PlanError, TaskPlan};
pub use step::{Step, StepResult, StepStatus};
