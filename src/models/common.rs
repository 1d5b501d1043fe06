use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "runware:100@1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub default_steps: u32,
    pub description: String,
}

/// Last request sent and the reply it produced, for inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub task_uuid: String,
    pub request: serde_json::Value,
    pub response: Option<serde_json::Value>,
    pub error: Option<String>,
}
