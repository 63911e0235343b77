//! Task brief: the delegation contract handed to a child agent at spawn.

use serde::{Deserialize, Serialize};

/// The five-field delegation contract attached to a child at spawn.
///
/// Stored per-agent and included verbatim in the child's system prompt.
/// Created once at spawn, cleared on termination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskBrief {
    /// What the child is expected to achieve.
    pub objective: String,

    /// Ordered list of constraints the child must respect.
    #[serde(default)]
    pub constraints: Vec<String>,

    /// What the child is given to work with.
    #[serde(default)]
    pub inputs: String,

    /// What the child is expected to produce.
    #[serde(default)]
    pub outputs: String,

    /// How the parent will judge the work complete.
    pub completion_criteria: String,
}

impl TaskBrief {
    /// Validate that the brief is usable as a delegation contract.
    ///
    /// `objective` and `completion_criteria` must be non-empty; the other
    /// fields are free text and may be blank.
    pub fn validate(&self) -> Result<(), BriefError> {
        if self.objective.trim().is_empty() {
            return Err(BriefError::MissingObjective);
        }
        if self.completion_criteria.trim().is_empty() {
            return Err(BriefError::MissingCompletionCriteria);
        }
        Ok(())
    }

    /// Render the brief as the block embedded in a child's system prompt.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("【Task Brief】\n");
        out.push_str(&format!("Objective: {}\n", self.objective));
        if !self.constraints.is_empty() {
            out.push_str("Constraints:\n");
            for c in &self.constraints {
                out.push_str(&format!("- {c}\n"));
            }
        }
        if !self.inputs.is_empty() {
            out.push_str(&format!("Inputs: {}\n", self.inputs));
        }
        if !self.outputs.is_empty() {
            out.push_str(&format!("Outputs: {}\n", self.outputs));
        }
        out.push_str(&format!("Completion criteria: {}", self.completion_criteria));
        out
    }
}

/// Validation failure for a [`TaskBrief`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum BriefError {
    /// The objective field is empty.
    #[error("task brief objective must not be empty")]
    MissingObjective,

    /// The completion criteria field is empty.
    #[error("task brief completion_criteria must not be empty")]
    MissingCompletionCriteria,
}

impl BriefError {
    /// Stable error code (`invalid_task_brief`).
    pub fn code(&self) -> &'static str {
        "invalid_task_brief"
    }
}
