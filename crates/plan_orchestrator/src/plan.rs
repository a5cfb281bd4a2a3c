use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::step::{Step, StepStatus};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("cyclic dependency involving step '{0}'")]
    CyclicDependency(String),

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),

    #[error("unknown step '{0}'")]
    UnknownStep(String),

    #[error("step '{0}' is not awaiting input")]
    NotAwaitingInput(String),
}

/// A dependency graph of steps, validated at construction.
///
/// The plan exclusively owns its steps and is the only place dependency ids
/// are resolved. Construction rejects duplicate ids, references to unknown
/// steps and cycles, so the orchestrator never has to detect a deadlocked
/// graph at runtime.
#[derive(Debug, Clone)]
pub struct TaskPlan {
    pub id: Uuid,
    steps: Vec<Step>,
    index: HashMap<String, usize>,
    pub created_at: DateTime<Utc>,
}

impl TaskPlan {
    pub fn new(steps: Vec<Step>) -> Result<Self, PlanError> {
        let mut index = HashMap::with_capacity(steps.len());
        for (position, step) in steps.iter().enumerate() {
            if index.insert(step.id.clone(), position).is_some() {
                return Err(PlanError::DuplicateStepId(step.id.clone()));
            }
        }

        for step in &steps {
            for dependency in &step.dependencies {
                if !index.contains_key(dependency) {
                    return Err(PlanError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        detect_cycle(&steps, &index)?;

        Ok(Self {
            id: Uuid::new_v4(),
            steps,
            index,
            created_at: Utc::now(),
        })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.index.get(id).map(|&position| &self.steps[position])
    }

    pub(crate) fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        let position = *self.index.get(id)?;
        Some(&mut self.steps[position])
    }

    /// Ids of `Pending` steps whose dependencies are all `Done`.
    pub fn ready_steps(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Pending)
            .filter(|step| {
                step.dependencies.iter().all(|dependency| {
                    self.step(dependency)
                        .map(|d| d.status == StepStatus::Done)
                        .unwrap_or(false)
                })
            })
            .map(|step| step.id.clone())
            .collect()
    }

    /// `Pending` steps that can never run because an ancestor failed,
    /// paired with the id of the nearest failed ancestor (breadth-first
    /// over the dependency closure).
    pub fn unreachable_steps(&self) -> Vec<(String, String)> {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Pending)
            .filter_map(|step| {
                self.nearest_failed_ancestor(&step.id)
                    .map(|ancestor| (step.id.clone(), ancestor))
            })
            .collect()
    }

    fn nearest_failed_ancestor(&self, step_id: &str) -> Option<String> {
        let mut queue: VecDeque<&str> = self
            .step(step_id)
            .map(|step| step.dependencies.iter().map(String::as_str).collect())
            .unwrap_or_default();
        let mut seen: Vec<&str> = Vec::new();

        while let Some(candidate) = queue.pop_front() {
            if seen.contains(&candidate) {
                continue;
            }
            seen.push(candidate);

            let Some(step) = self.step(candidate) else {
                continue;
            };
            if step.status == StepStatus::Failed {
                return Some(step.id.clone());
            }
            queue.extend(step.dependencies.iter().map(String::as_str));
        }

        None
    }

    pub fn all_done(&self) -> bool {
        self.steps
            .iter()
            .all(|step| step.status == StepStatus::Done)
    }

    pub fn awaiting_input(&self) -> Option<&Step> {
        self.steps
            .iter()
            .find(|step| step.status == StepStatus::RequiresInput)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Kahn's algorithm over the dependency edges. If any step survives the
/// topological pass it sits on a cycle.
fn detect_cycle(steps: &[Step], index: &HashMap<String, usize>) -> Result<(), PlanError> {
    let mut in_degree: Vec<usize> = steps.iter().map(|step| step.dependencies.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];

    for (position, step) in steps.iter().enumerate() {
        for dependency in &step.dependencies {
            dependents[index[dependency]].push(position);
        }
    }

    let mut queue: VecDeque<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &degree)| degree == 0)
        .map(|(position, _)| position)
        .collect();
    let mut processed = 0;

    while let Some(position) = queue.pop_front() {
        processed += 1;
        for &dependent in &dependents[position] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if processed < steps.len() {
        let culprit = in_degree
            .iter()
            .position(|&degree| degree > 0)
            .map(|position| steps[position].id.clone())
            .unwrap_or_default();
        return Err(PlanError::CyclicDependency(culprit));
    }

    Ok(())
}
