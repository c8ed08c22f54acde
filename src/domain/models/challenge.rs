//! Challenge payload, verdict and routing models.
//!
//! Payloads and verdicts are deserialized from the challenge provider's JSON. Fields the
//! orchestrator does not interpret are preserved in `extra` so strategies can read them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Challenge request type reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Pick the images that match the prompt.
    ImageLabelBinary,
    /// Click points or areas on a canvas.
    ImageLabelAreaSelect,
    /// Drag pieces onto targets.
    ImageDragDrop,
    /// Any type this crate does not know.
    #[serde(other)]
    Unknown,
}

/// One task entry of a payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChallengeTask {
    /// Provider key of the task.
    #[serde(default)]
    pub task_key: Option<String>,
    /// Image URL of the task.
    #[serde(default)]
    pub datapoint_uri: Option<String>,
    /// Draggable entities, for drag tasks.
    #[serde(default)]
    pub entities: Vec<Value>,
}

/// Per-payload request configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Upper bound on clicks per image, for area-select tasks.
    #[serde(default)]
    pub max_shapes_per_image: Option<u32>,
    /// Fields not modelled here.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decoded description of the current challenge round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChallengePayload {
    /// Round key.
    #[serde(default)]
    pub key: Option<String>,
    /// Declared challenge type.
    #[serde(default)]
    pub request_type: Option<RequestType>,
    /// Either a plain string or a `{lang: text}` map.
    #[serde(default)]
    pub requester_question: Option<Value>,
    /// Tasks of the round.
    #[serde(default, rename = "tasklist")]
    pub tasks: Vec<ChallengeTask>,
    /// Presence marks a JSON body as a payload.
    #[serde(default)]
    pub request_config: Option<RequestConfig>,
    /// Fields not modelled here.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChallengePayload {
    /// Parse a payload from provider JSON.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// The prompt text, preferring English when the question is localized.
    pub fn question(&self) -> String {
        match &self.requester_question {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Object(map)) => map
                .get("en")
                .or_else(|| map.values().next())
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        }
    }
}

/// Pass/fail result of a submitted round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChallengeVerdict {
    /// Whether the round passed.
    #[serde(default)]
    pub pass: bool,
    /// Pass token, `generated_pass_UUID` on the wire.
    #[serde(default, rename = "generated_pass_UUID")]
    pub token: Option<String>,
    /// Token lifetime in seconds.
    #[serde(default)]
    pub expiration: Option<u64>,
    /// Fields not modelled here.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChallengeVerdict {
    /// Parse a verdict from provider JSON.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Whether the verdict passes the challenge.
    pub fn is_pass(&self) -> bool {
        self.pass
    }
}

/// Solving strategy family a payload is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    /// Binary image grid.
    ImageLabelBinary,
    /// One click per image.
    AreaSelectSingle,
    /// Several clicks per image.
    AreaSelectMulti,
    /// One drag move.
    DragSingle,
    /// Several drag moves.
    DragMulti,
}

impl ChallengeKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageLabelBinary => "image_label_binary",
            Self::AreaSelectSingle => "image_label_single_select",
            Self::AreaSelectMulti => "image_label_multi_select",
            Self::DragSingle => "image_drag_single",
            Self::DragMulti => "image_drag_multi",
        }
    }
}

/// Routing decision for a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeRoute {
    /// `None` when the payload alone is not enough; the strategy routes visually.
    pub kind: Option<ChallengeKind>,
    /// Number of rounds (crumbs) expected for this challenge.
    pub crumb_count: usize,
}

const DRAG_KEYWORDS: &[&str] = &[
    "drag", "arraste", "puzzle", "segment", "position", "mova", "coloca", "piece", "line", "slot",
];

const VIDEO_KEYWORDS: &[&str] = &["video", "clip"];

/// Route a payload to a challenge kind.
///
/// Prompt keywords take precedence over the declared request type, which is
/// sometimes generic for drag and motion challenges.
pub fn route_payload(payload: &ChallengePayload) -> ChallengeRoute {
    let prompt = payload.question().to_lowercase();
    let task_count = payload.tasks.len().max(1);

    if DRAG_KEYWORDS.iter().any(|k| prompt.contains(k)) {
        let single = payload
            .tasks
            .first()
            .is_some_and(|task| task.entities.len() == 1);
        return ChallengeRoute {
            kind: Some(if single { ChallengeKind::DragSingle } else { ChallengeKind::DragMulti }),
            crumb_count: task_count,
        };
    }

    if prompt.contains("select") && prompt.contains("motion") {
        return ChallengeRoute {
            kind: Some(ChallengeKind::AreaSelectSingle),
            crumb_count: task_count,
        };
    }

    if VIDEO_KEYWORDS.iter().any(|k| prompt.contains(k)) {
        return ChallengeRoute {
            kind: Some(ChallengeKind::AreaSelectSingle),
            crumb_count: 1,
        };
    }

    match payload.request_type {
        Some(RequestType::ImageLabelBinary) => ChallengeRoute {
            kind: Some(ChallengeKind::ImageLabelBinary),
            crumb_count: (payload.tasks.len() / 9).max(1),
        },
        Some(RequestType::ImageDragDrop) => ChallengeRoute {
            kind: Some(ChallengeKind::DragSingle),
            crumb_count: task_count,
        },
        Some(RequestType::ImageLabelAreaSelect) => {
            let max_shapes = payload
                .request_config
                .as_ref()
                .and_then(|c| c.max_shapes_per_image)
                .unwrap_or(1);
            ChallengeRoute {
                kind: Some(if max_shapes == 1 {
                    ChallengeKind::AreaSelectSingle
                } else {
                    ChallengeKind::AreaSelectMulti
                }),
                crumb_count: task_count,
            }
        }
        Some(RequestType::Unknown) | None => ChallengeRoute {
            kind: None,
            crumb_count: task_count,
        },
    }
}
