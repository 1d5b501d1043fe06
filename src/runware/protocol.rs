//! Wire format of the Runware WebSocket API.
//!
//! Every client frame is a JSON array holding one task object tagged by
//! `taskType`. Server frames are JSON objects carrying either an `error` /
//! `errors` field or a `data` array of task results.

use crate::{
    error::{ArtifyError, Result},
    models::{GenerateImageParams, DEFAULT_MODEL},
};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

pub const SCHEDULER: &str = "FlowMatchEulerDiscreteScheduler";
pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 1024;
pub const DEFAULT_STEPS: u32 = 4;
pub const DEFAULT_CFG_SCALE: f32 = 1.0;
pub const DEFAULT_NUMBER_RESULTS: u32 = 1;
pub const NEGATIVE_PROMPT_MIN_CHARS: usize = 2;
pub const NEGATIVE_PROMPT_MAX_CHARS: usize = 3000;

const AUTHENTICATION: &str = "authentication";
const DEFAULT_ERROR_MESSAGE: &str = "An error occurred";
const DEFAULT_TASK_ERROR_MESSAGE: &str = "Generation failed";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "taskType")]
pub enum ClientTask {
    #[serde(rename = "authentication")]
    Authentication {
        #[serde(rename = "apiKey")]
        api_key: String,
    },
    #[serde(rename = "imageInference")]
    ImageInference(ImageInferenceTask),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageInferenceTask {
    #[serde(rename = "taskUUID")]
    pub task_uuid: Uuid,
    #[serde(rename = "positivePrompt")]
    pub positive_prompt: String,
    #[serde(rename = "negativePrompt", skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    pub model: String,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "numberResults")]
    pub number_results: u32,
    #[serde(rename = "outputFormat")]
    pub output_format: String,
    pub steps: u32,
    #[serde(rename = "CFGScale")]
    pub cfg_scale: f32,
    pub scheduler: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

/// Serializes a task as a single-element JSON array.
pub fn encode_frame(task: &ClientTask) -> Result<String> {
    serde_json::to_string(&[task]).map_err(ArtifyError::from)
}

/// Normalises caller parameters into a wire task.
pub fn build_inference_task(
    params: &GenerateImageParams,
    task_uuid: Uuid,
) -> Result<ImageInferenceTask> {
    if params.prompt.trim().is_empty() {
        return Err(ArtifyError::ValidationError(
            "Prompt must not be empty".into(),
        ));
    }

    let (width, height) = parse_size(params.size.as_deref());

    Ok(ImageInferenceTask {
        task_uuid,
        positive_prompt: params.prompt.clone(),
        negative_prompt: normalize_negative_prompt(params.negative_prompt.as_deref()),
        model: params
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MODEL)
            .to_string(),
        width,
        height,
        number_results: params
            .num_images
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_NUMBER_RESULTS),
        output_format: params.format.unwrap_or_default().as_str().to_string(),
        steps: params.steps.filter(|s| *s > 0).unwrap_or(DEFAULT_STEPS),
        cfg_scale: params
            .cfg_scale
            .filter(|c| c.is_finite() && *c > 0.0)
            .unwrap_or(DEFAULT_CFG_SCALE),
        scheduler: SCHEDULER.to_string(),
        seed: parse_seed(params.seed.as_deref()),
    })
}

/// Splits `"WxH"` into two positive integers, falling back to 1024x1024.
pub fn parse_size(size: Option<&str>) -> (u32, u32) {
    size.and_then(|s| {
        let (w, h) = s.trim().split_once(|c| matches!(c, 'x' | 'X' | '×'))?;
        let width = w.trim().parse::<u32>().ok().filter(|v| *v > 0)?;
        let height = h.trim().parse::<u32>().ok().filter(|v| *v > 0)?;
        Some((width, height))
    })
    .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT))
}

/// Keeps a trimmed negative prompt only when it is 2..=3000 characters long.
pub fn normalize_negative_prompt(negative_prompt: Option<&str>) -> Option<String> {
    let trimmed = negative_prompt?.trim();
    let len = trimmed.chars().count();
    if (NEGATIVE_PROMPT_MIN_CHARS..=NEGATIVE_PROMPT_MAX_CHARS).contains(&len) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

pub fn parse_seed(seed: Option<&str>) -> Option<i64> {
    seed.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<i64>().ok())
}

/// A failure reported by the peer, optionally naming the task it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFailure {
    pub task_uuid: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataItem {
    Authenticated,
    TaskResult { task_uuid: Uuid, payload: Value },
    TaskError { task_uuid: Uuid, message: String },
    /// Item without a usable `taskUUID`.
    Untracked(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    Errors(Vec<RemoteFailure>),
    Data(Vec<DataItem>),
    Unrecognised(Value),
}

impl ServerFrame {
    pub fn is_authentication_ack(&self) -> bool {
        matches!(self, ServerFrame::Data(items) if items.contains(&DataItem::Authenticated))
    }
}

pub fn parse_server_frame(text: &str) -> Result<ServerFrame> {
    let value: Value = serde_json::from_str(text)?;
    Ok(classify_server_frame(value))
}

pub fn classify_server_frame(value: Value) -> ServerFrame {
    let Some(object) = value.as_object() else {
        return ServerFrame::Unrecognised(value);
    };

    if is_truthy(object.get("error")) || is_truthy(object.get("errors")) {
        return ServerFrame::Errors(collect_failures(object));
    }

    match object.get("data") {
        Some(Value::Array(items)) => {
            ServerFrame::Data(items.iter().cloned().map(classify_item).collect())
        }
        _ => ServerFrame::Unrecognised(value),
    }
}

fn classify_item(item: Value) -> DataItem {
    if item.get("taskType").and_then(Value::as_str) == Some(AUTHENTICATION) {
        return DataItem::Authenticated;
    }

    let Some(task_uuid) = task_uuid_of(&item) else {
        return DataItem::Untracked(item);
    };

    if is_truthy(item.get("error")) {
        let message = message_field(&item, "errorMessage")
            .or_else(|| item.get("error").and_then(Value::as_str).map(String::from))
            .unwrap_or_else(|| DEFAULT_TASK_ERROR_MESSAGE.to_string());
        return DataItem::TaskError { task_uuid, message };
    }

    DataItem::TaskResult {
        task_uuid,
        payload: item,
    }
}

fn collect_failures(object: &Map<String, Value>) -> Vec<RemoteFailure> {
    let top_level_uuid = object
        .get("error")
        .and_then(task_uuid_of)
        .or_else(|| task_uuid_of_map(object));

    if let Some(Value::Array(entries)) = object.get("errors") {
        if !entries.is_empty() && !is_truthy(object.get("error")) {
            let override_message = message_field_map(object, "errorMessage");
            return entries
                .iter()
                .map(|entry| RemoteFailure {
                    task_uuid: task_uuid_of(entry).or(top_level_uuid),
                    message: override_message
                        .clone()
                        .or_else(|| message_field(entry, "message"))
                        .or_else(|| entry.as_str().map(String::from))
                        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
                })
                .collect();
        }
    }

    let message = message_field_map(object, "errorMessage")
        .or_else(|| match object.get("error") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(error @ Value::Object(_)) => message_field(error, "message"),
            _ => None,
        })
        .or_else(|| {
            object
                .get("errors")
                .and_then(|errors| errors.get(0))
                .and_then(|first| message_field(first, "message"))
        })
        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());

    vec![RemoteFailure {
        task_uuid: top_level_uuid,
        message,
    }]
}

fn task_uuid_of(value: &Value) -> Option<Uuid> {
    value.as_object().and_then(task_uuid_of_map)
}

fn task_uuid_of_map(object: &Map<String, Value>) -> Option<Uuid> {
    object
        .get("taskUUID")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn message_field(value: &Value, key: &str) -> Option<String> {
    value.as_object().and_then(|o| message_field_map(o, key))
}

fn message_field_map(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn is_truthy(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null) | Some(Value::Bool(false)))
}
