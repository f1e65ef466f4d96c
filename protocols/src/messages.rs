//! Conversation transcript types.
//!
//! A transcript is an ordered list of [`Message`]s, each carrying ordered
//! [`Part`]s. Tool calls travel as [`ToolCallPart`]s whose `state` and
//! `output` fields carry the human approval decision between client and
//! server.

use serde::{de::Error as _, ser::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

// ============================================================================
// Decision sentinels
// ============================================================================

/// Output value the client writes onto a tool call to approve it.
pub const APPROVAL_YES: &str = "Yes, confirmed.";

/// Output value the client writes onto a tool call to deny it.
pub const APPROVAL_NO: &str = "No, denied.";

/// Output recorded on a tool call after the user denied it.
pub const DENIED_OUTPUT: &str = "Error: User denied access to tool execution";

/// Human decision encoded in a tool call's output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Denied,
}

impl Decision {
    /// Decode a sentinel. Anything other than the two exact strings is not a decision.
    pub fn from_output(output: &Value) -> Option<Self> {
        match output.as_str()? {
            APPROVAL_YES => Some(Self::Approved),
            APPROVAL_NO => Some(Self::Denied),
            _ => None,
        }
    }

    pub fn sentinel(self) -> &'static str {
        match self {
            Self::Approved => APPROVAL_YES,
            Self::Denied => APPROVAL_NO,
        }
    }
}

impl From<bool> for Decision {
    fn from(approved: bool) -> Self {
        if approved {
            Self::Approved
        } else {
            Self::Denied
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Message {
    pub fn new(id: impl Into<String>, role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: id.into(),
            role,
            parts,
            metadata: None,
        }
    }

    pub fn user_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::User, vec![Part::text(text)])
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallPart> {
        self.parts.iter().filter_map(Part::as_tool_call)
    }

    pub fn tool_call(&self, call_id: &str) -> Option<&ToolCallPart> {
        self.tool_calls().find(|call| call.tool_call_id == call_id)
    }

    pub fn tool_call_mut(&mut self, call_id: &str) -> Option<&mut ToolCallPart> {
        self.parts
            .iter_mut()
            .filter_map(Part::as_tool_call_mut)
            .find(|call| call.tool_call_id == call_id)
    }
}

/// Wire prefix of statically typed tool parts, `tool-<toolName>`.
pub const TOOL_PART_PREFIX: &str = "tool-";

/// A typed segment of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
    },
    File {
        url: String,
        media_type: String,
        filename: Option<String>,
    },
    StepStart,
    /// `dynamic-tool`: the tool name travels in `toolName`.
    DynamicTool(ToolCallPart),
    /// `tool-<name>`: the tool name travels in the type tag.
    Tool(ToolCallPart),
    /// Part kinds this gateway does not interpret (sources, custom data, ...),
    /// kept verbatim so they round-trip unchanged.
    Other(Value),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCallPart> {
        match self {
            Self::DynamicTool(call) | Self::Tool(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_tool_call_mut(&mut self) -> Option<&mut ToolCallPart> {
        match self {
            Self::DynamicTool(call) | Self::Tool(call) => Some(call),
            _ => None,
        }
    }
}

/// Part kinds with a fixed type tag.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum TaggedPart {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
    },
    File {
        url: String,
        #[serde(rename = "mediaType")]
        media_type: String,
        #[serde(default)]
        filename: Option<String>,
    },
    StepStart,
    DynamicTool(ToolCallPart),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum TaggedPartRef<'a> {
    Text {
        text: &'a str,
    },
    Reasoning {
        text: &'a str,
    },
    File {
        url: &'a str,
        #[serde(rename = "mediaType")]
        media_type: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<&'a str>,
    },
    StepStart,
    DynamicTool(&'a ToolCallPart),
}

const TAGGED_PART_TYPES: &[&str] = &["text", "reasoning", "file", "step-start", "dynamic-tool"];

impl Serialize for Part {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tagged = match self {
            Self::Text { text } => TaggedPartRef::Text { text },
            Self::Reasoning { text } => TaggedPartRef::Reasoning { text },
            Self::File {
                url,
                media_type,
                filename,
            } => TaggedPartRef::File {
                url,
                media_type,
                filename: filename.as_deref(),
            },
            Self::StepStart => TaggedPartRef::StepStart,
            Self::DynamicTool(call) => TaggedPartRef::DynamicTool(call),
            Self::Tool(call) => {
                let value = static_tool_value(call).map_err(S::Error::custom)?;
                return value.serialize(serializer);
            }
            Self::Other(raw) => return raw.serialize(serializer),
        };
        tagged.serialize(serializer)
    }
}

/// `{"type": "tool-<name>", ...}` with `toolName` folded into the tag.
fn static_tool_value(call: &ToolCallPart) -> Result<Value, serde_json::Error> {
    let value = serde_json::to_value(call)?;
    let Value::Object(fields) = value else {
        return Ok(value);
    };
    let mut out = Map::with_capacity(fields.len());
    out.insert(
        "type".to_string(),
        Value::String(format!("{}{}", TOOL_PART_PREFIX, call.tool_name)),
    );
    out.extend(fields.into_iter().filter(|(key, _)| key != "toolName"));
    Ok(Value::Object(out))
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut raw = Value::deserialize(deserializer)?;
        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| D::Error::missing_field("type"))?;

        if TAGGED_PART_TYPES.contains(&kind.as_str()) {
            let tagged = TaggedPart::deserialize(raw).map_err(D::Error::custom)?;
            return Ok(match tagged {
                TaggedPart::Text { text } => Self::Text { text },
                TaggedPart::Reasoning { text } => Self::Reasoning { text },
                TaggedPart::File {
                    url,
                    media_type,
                    filename,
                } => Self::File {
                    url,
                    media_type,
                    filename,
                },
                TaggedPart::StepStart => Self::StepStart,
                TaggedPart::DynamicTool(call) => Self::DynamicTool(call),
            });
        }

        if let Some(tool_name) = kind.strip_prefix(TOOL_PART_PREFIX) {
            if let Some(fields) = raw.as_object_mut() {
                fields.remove("type");
                fields.insert("toolName".to_string(), Value::String(tool_name.to_string()));
            }
            let call = ToolCallPart::deserialize(raw).map_err(D::Error::custom)?;
            return Ok(Self::Tool(call));
        }

        Ok(Self::Other(raw))
    }
}

// ============================================================================
// Tool calls
// ============================================================================

/// Lifecycle of a tool call part.
///
/// `InputStreaming` → `InputAvailable` (awaiting approval) → `OutputAvailable`
/// or `OutputError`. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCallState {
    InputStreaming,
    InputAvailable,
    OutputAvailable,
    OutputError,
}

impl ToolCallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::OutputAvailable | Self::OutputError)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPart {
    pub tool_call_id: String,
    /// Namespaced name, `provider__tool`.
    pub tool_name: String,
    pub state: ToolCallState,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    /// Set once the server has acted on the decision. A resolved part is final.
    #[serde(default, skip_serializing_if = "is_false")]
    pub resolved: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ToolCallPart {
    /// A freshly proposed call, awaiting approval.
    pub fn awaiting_approval(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            state: ToolCallState::InputAvailable,
            input,
            output: None,
            error_text: None,
            resolved: false,
        }
    }

    pub fn is_awaiting_approval(&self) -> bool {
        self.state == ToolCallState::InputAvailable
    }

    /// The pending human decision, if the client recorded one and the server has
    /// not yet acted on it.
    pub fn pending_decision(&self) -> Option<Decision> {
        if self.resolved || self.state != ToolCallState::OutputAvailable {
            return None;
        }
        self.output.as_ref().and_then(Decision::from_output)
    }

    /// Record the final output for this call.
    #[must_use]
    pub fn resolved_with(mut self, output: impl Into<String>) -> Self {
        self.output = Some(Value::String(output.into()));
        self.state = ToolCallState::OutputAvailable;
        self.resolved = true;
        self
    }

    /// Whether the model should see a result for this call.
    pub fn has_result(&self) -> bool {
        self.state.is_terminal() && self.pending_decision().is_none()
    }

    /// Output rendered as text for the model.
    pub fn output_text(&self) -> Option<String> {
        if self.state == ToolCallState::OutputError {
            return self.error_text.clone();
        }
        self.output.as_ref().map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}
