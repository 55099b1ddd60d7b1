/*!
Execution request decoding.

Body shape: `{"command": "<name>", "args": [<string|number|bool|placeholder>...]}`.
Unknown top-level keys (ids, titles from the UI) are ignored. A placeholder is any
object whose `type` is `tmp-file-path`; every other element is passed through as its
textual form.
*/

use serde_json::{Map, Value};

use crate::errors::GatewayError;

pub const TMP_FILE_PATH: &str = "tmp-file-path";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub command: String,
    pub args: Vec<ArgSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgSpec {
    /// Passed verbatim to the child.
    Literal(String),
    TempFile(TempFilePlaceholder),
}

/// "Allocate me an empty file, give its path to the child and optionally let me download it."
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TempFilePlaceholder {
    pub download: bool,
    /// Display name offered to the end user; may be absent even when `download` is set.
    pub download_name: Option<String>,
}

impl ExecutionRequest {
    /// Decode and validate a raw request body. Nothing is spawned or allocated here.
    pub fn from_json_bytes(body: &[u8]) -> Result<Self, GatewayError> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, GatewayError> {
        let Value::Object(mut obj) = value else {
            return Err(GatewayError::Validation(
                "Request body must be a JSON object".to_string(),
            ));
        };

        let command = match obj.remove("command") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s,
            Some(_) => {
                return Err(GatewayError::Validation(
                    "'command' must be a string".to_string(),
                ))
            }
        };
        if command.is_empty() {
            return Err(GatewayError::Validation(
                "Missing 'command' in request body".to_string(),
            ));
        }

        let args = match obj.remove("args") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.into_iter().map(ArgSpec::from_value).collect(),
            Some(_) => {
                return Err(GatewayError::Validation(
                    "'args' must be an array".to_string(),
                ))
            }
        };

        Ok(Self { command, args })
    }

    pub fn placeholder_count(&self) -> usize {
        self.args
            .iter()
            .filter(|a| matches!(a, ArgSpec::TempFile(_)))
            .count()
    }
}

impl ArgSpec {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => ArgSpec::Literal(s),
            Value::Object(obj) if is_placeholder(&obj) => {
                ArgSpec::TempFile(TempFilePlaceholder::from_object(&obj))
            }
            other => ArgSpec::Literal(other.to_string()),
        }
    }
}

impl TempFilePlaceholder {
    fn from_object(obj: &Map<String, Value>) -> Self {
        let download = obj.get("download").map(truthy).unwrap_or(false);
        let download_name = match obj.get("downloadName") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };
        Self {
            download,
            download_name,
        }
    }
}

fn is_placeholder(obj: &Map<String, Value>) -> bool {
    obj.get("type").and_then(Value::as_str) == Some(TMP_FILE_PATH)
}

// Lenient flag reading: UIs send `"download": 1` or `"true"` as often as a real bool.
fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_scalars_and_placeholders_in_order() {
        let req = ExecutionRequest::from_value(json!({
            "id": "test-2",
            "title": "Temp File Test",
            "command": "bash",
            "args": [
                "-c",
                42,
                true,
                1.5,
                {"type": "tmp-file-path", "download": true, "downloadName": "test.txt"},
                {"type": "tmp-file-path"}
            ]
        }))
        .unwrap();
        assert_eq!(req.command, "bash");
        assert_eq!(
            req.args,
            vec![
                ArgSpec::Literal("-c".into()),
                ArgSpec::Literal("42".into()),
                ArgSpec::Literal("true".into()),
                ArgSpec::Literal("1.5".into()),
                ArgSpec::TempFile(TempFilePlaceholder {
                    download: true,
                    download_name: Some("test.txt".into()),
                }),
                ArgSpec::TempFile(TempFilePlaceholder::default()),
            ]
        );
        assert_eq!(req.placeholder_count(), 2);
    }

    #[test]
    fn download_without_name_is_kept() {
        let arg = ArgSpec::from_value(json!({"type": "tmp-file-path", "download": true}));
        assert_eq!(
            arg,
            ArgSpec::TempFile(TempFilePlaceholder {
                download: true,
                download_name: None,
            })
        );
    }

    #[test]
    fn objects_of_other_types_are_literal_json() {
        let arg = ArgSpec::from_value(json!({"type": "other", "x": 1}));
        assert_eq!(arg, ArgSpec::Literal(r#"{"type":"other","x":1}"#.into()));
    }

    #[test]
    fn missing_or_empty_command_is_rejected() {
        for body in [json!({"args": []}), json!({"command": ""}), json!({"command": null})] {
            let err = ExecutionRequest::from_value(body).unwrap_err();
            assert_eq!(err.status_code(), 400);
            assert_eq!(err.body(), "Missing 'command' in request body");
        }
    }

    #[test]
    fn wrong_shapes_are_validation_errors() {
        assert!(matches!(
            ExecutionRequest::from_value(json!(["echo"])),
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            ExecutionRequest::from_value(json!({"command": 5})),
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            ExecutionRequest::from_value(json!({"command": "echo", "args": "hi"})),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn args_default_to_empty() {
        let req = ExecutionRequest::from_value(json!({"command": "true"})).unwrap();
        assert!(req.args.is_empty());
    }

    #[test]
    fn malformed_json_is_invalid_json() {
        let err = ExecutionRequest::from_json_bytes(b"{invalid json").unwrap_err();
        assert!(matches!(err, GatewayError::InvalidJson(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn download_flag_is_lenient() {
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!("yes")));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(null)));
    }
}
