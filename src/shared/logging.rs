use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

pub fn engine_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/engine.log")
}

/// Appends one JSON object per line. Failures are swallowed: logging never
/// changes the outcome of an engine call.
pub fn append_engine_log(
    state_root: &Path,
    level: LogLevel,
    event: &str,
    session_id: &str,
    message: &str,
    fields: Option<Value>,
) {
    let mut payload = json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "level": level.as_str(),
        "event": event,
        "session_id": session_id,
        "message": message,
    });
    if let (Some(Value::Object(extra)), Value::Object(base)) = (fields, &mut payload) {
        for (key, value) in extra {
            base.entry(key).or_insert(value);
        }
    }

    let Ok(line) = serde_json::to_string(&payload) else {
        return;
    };

    let path = engine_log_path(state_root);
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(path) else {
        return;
    };
    let _ = writeln!(file, "{line}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn engine_log_lines_are_json_with_extra_fields() {
        let temp = tempdir().expect("tempdir");
        append_engine_log(
            temp.path(),
            LogLevel::Warn,
            "dispatch.rejected",
            "sess-1",
            "tool rejected",
            Some(json!({"error_kind": "tool_not_allowed", "event": "ignored"})),
        );

        let raw = fs::read_to_string(engine_log_path(temp.path())).expect("read log");
        let line: Value = serde_json::from_str(raw.trim()).expect("json line");
        assert_eq!(line["level"], "warn");
        assert_eq!(line["event"], "dispatch.rejected");
        assert_eq!(line["session_id"], "sess-1");
        assert_eq!(line["error_kind"], "tool_not_allowed");
    }
}
