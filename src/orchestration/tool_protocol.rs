use crate::config::{RegisterName, ToolName};
use crate::orchestration::pending_operation::OperationReport;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const REGISTER_REF_KEY: &str = "$register";

/// A tool argument: either a literal supplied by the caller or a reference to a
/// register, written on the wire as `{"$register": "<name>"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentValue {
    Literal(Value),
    Register(RegisterName),
}

impl ArgumentValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn register(name: &str) -> Result<Self, String> {
        RegisterName::parse(name).map(Self::Register)
    }
}

impl Serialize for ArgumentValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Literal(value) => value.serialize(serializer),
            Self::Register(name) => {
                let mut map = Map::new();
                map.insert(
                    REGISTER_REF_KEY.to_string(),
                    Value::String(name.to_string()),
                );
                Value::Object(map).serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for ArgumentValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let Value::Object(map) = &value else {
            return Ok(Self::Literal(value));
        };
        let Some(reference) = map.get(REGISTER_REF_KEY) else {
            return Ok(Self::Literal(value));
        };
        if map.len() != 1 {
            return Err(D::Error::custom(format!(
                "`{REGISTER_REF_KEY}` references cannot carry other keys"
            )));
        }
        let name = reference
            .as_str()
            .ok_or_else(|| D::Error::custom(format!("`{REGISTER_REF_KEY}` must be a string")))?;
        RegisterName::parse(name)
            .map(Self::Register)
            .map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool: ToolName,
    #[serde(default)]
    pub arguments: BTreeMap<String, ArgumentValue>,
}

impl ToolRequest {
    pub fn new(tool: ToolName) -> Self {
        Self {
            tool,
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_literal(mut self, arg: &str, value: impl Into<Value>) -> Self {
        self.arguments
            .insert(arg.to_string(), ArgumentValue::literal(value));
        self
    }

    pub fn with_register(mut self, arg: &str, register: RegisterName) -> Self {
        self.arguments
            .insert(arg.to_string(), ArgumentValue::Register(register));
        self
    }
}

/// The request a handler actually receives: every register reference has been
/// replaced by the stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCall {
    pub tool: ToolName,
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolErrorBody {
    pub kind: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub outputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationReport>,
}

impl ToolResponse {
    pub fn ok(outputs: Map<String, Value>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            outputs,
            error: None,
            operation: None,
        }
    }

    pub fn error(kind: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            outputs: Map::new(),
            error: Some(ToolErrorBody {
                kind: kind.into(),
                detail: detail.into(),
            }),
            operation: None,
        }
    }

    pub fn with_operation(mut self, report: OperationReport) -> Self {
        self.operation = Some(report);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

/// External tool boundary. Calls block until the tool returns; the engine never
/// retries.
pub trait ToolHandler {
    fn call(&mut self, call: &ResolvedCall) -> ToolResponse;
}

impl<F> ToolHandler for F
where
    F: FnMut(&ResolvedCall) -> ToolResponse,
{
    fn call(&mut self, call: &ResolvedCall) -> ToolResponse {
        self(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_references_parse_from_wire_objects() {
        let request: ToolRequest = serde_json::from_value(json!({
            "tool": "transfer",
            "arguments": {
                "to": {"$register": "recipient_address"},
                "memo": {"note": "thanks"},
                "amount": "5k"
            }
        }))
        .expect("request");

        assert_eq!(
            request.arguments["to"],
            ArgumentValue::register("recipient_address").expect("ref")
        );
        assert_eq!(
            request.arguments["memo"],
            ArgumentValue::literal(json!({"note": "thanks"}))
        );
        assert_eq!(request.arguments["amount"], ArgumentValue::literal("5k"));
    }

    #[test]
    fn malformed_register_references_are_rejected_not_treated_as_literals() {
        let extra_key = serde_json::from_value::<ArgumentValue>(
            json!({"$register": "recipient_address", "value": "0xabc"}),
        );
        assert!(extra_key.is_err());

        let bad_name = serde_json::from_value::<ArgumentValue>(json!({"$register": "bad name"}));
        assert!(bad_name.is_err());
    }

    #[test]
    fn responses_follow_the_wire_shape() {
        let response: ToolResponse = serde_json::from_value(json!({
            "status": "error",
            "error": {"kind": "rate_limited", "detail": "retry after 30s"}
        }))
        .expect("response");
        assert!(!response.is_ok());
        assert_eq!(response.error.expect("error").kind, "rate_limited");

        let encoded = serde_json::to_value(ToolResponse::ok(Map::new())).expect("encode");
        assert_eq!(encoded, json!({"status": "ok", "outputs": {}}));
    }
}
