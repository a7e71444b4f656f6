//! Tool boundary - typed requests from the decision loop
//!
//! Tool arguments arrive as loosely shaped JSON. They are parsed into
//! [`ToolRequest`] and checked here, so the core only sees well-formed
//! names and nodes.

use crate::core::TaskNode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolRequest {
    /// Create or reuse a named worker
    RegisterWorker {
        name: String,
        #[serde(default, alias = "system_prompt")]
        role: String,
    },
    /// Replace the whole task graph. An empty list clears it.
    PlanGraph {
        #[serde(default)]
        nodes: Vec<TaskNode>,
    },
    /// Dispatch a worker against a planned task
    Assign {
        worker: String,
        task: String,
        #[serde(default)]
        instructions: String,
    },
}

/// Malformed tool input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Error: invalid tool request: {0}")]
    Parse(String),

    #[error("Error: '{field}' must not be empty for {tool}.")]
    EmptyField {
        tool: &'static str,
        field: &'static str,
    },
}

impl ToolRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterWorker { .. } => "register_worker",
            Self::PlanGraph { .. } => "plan_graph",
            Self::Assign { .. } => "assign",
        }
    }

    /// Parse a JSON request and check required fields
    pub fn parse(json: &str) -> Result<Self, RequestError> {
        let request: Self =
            serde_json::from_str(json).map_err(|e| RequestError::Parse(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    /// Reject blank identifiers before they reach the core
    pub fn validate(&self) -> Result<(), RequestError> {
        let tool = self.name();
        let blank = |field: &'static str, value: &str| {
            if value.trim().is_empty() {
                Err(RequestError::EmptyField { tool, field })
            } else {
                Ok(())
            }
        };

        match self {
            Self::RegisterWorker { name, .. } => blank("name", name),
            Self::PlanGraph { nodes } => nodes.iter().try_for_each(|n| blank("task", &n.task)),
            Self::Assign { worker, task, .. } => {
                blank("worker", worker)?;
                blank("task", task)
            }
        }
    }
}

/// Reply to one tool request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolReply {
    pub tool: String,
    /// False when the request was rejected
    pub ok: bool,
    pub message: String,
}

impl ToolReply {
    pub fn ok(tool: &str, message: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            ok: true,
            message: message.into(),
        }
    }

    pub fn rejected(tool: &str, message: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            ok: false,
            message: message.into(),
        }
    }

    /// Serialize to JSON line
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
