use crate::config::SessionId;
use crate::orchestration::error::OrchestratorError;
use crate::orchestration::session::{Session, SessionSnapshot};
use crate::shared::fs_atomic::atomic_write_json;
use crate::shared::logging::{append_engine_log, LogLevel};
use getrandom::getrandom;
use serde_json::json;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SESSION_SUFFIX_SPACE: u32 = 36_u32.pow(4);
const SESSION_ID_MAX_GENERATION_ATTEMPTS: usize = 8;

/// File-backed session snapshots under `<state_root>/sessions`.
#[derive(Debug, Clone)]
pub struct SessionStore {
    state_root: PathBuf,
}

impl SessionStore {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: state_root.into(),
        }
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.state_root.join("sessions")
    }

    pub fn session_path(&self, session_id: &SessionId) -> PathBuf {
        self.sessions_dir().join(format!("{session_id}.json"))
    }

    /// Picks a fresh id that no stored session uses yet.
    pub fn allocate_session_id(&self, now: i64) -> Result<SessionId, OrchestratorError> {
        for _ in 0..SESSION_ID_MAX_GENERATION_ATTEMPTS {
            let session_id = generate_session_id(now)?;
            if !self.session_path(&session_id).exists() {
                return Ok(session_id);
            }
        }
        Err(OrchestratorError::SessionIdAllocation(format!(
            "no unique id after {SESSION_ID_MAX_GENERATION_ATTEMPTS} attempts"
        )))
    }

    pub fn save(&self, session: &Session) -> Result<PathBuf, OrchestratorError> {
        self.save_snapshot(&session.snapshot())
    }

    pub fn save_snapshot(&self, snapshot: &SessionSnapshot) -> Result<PathBuf, OrchestratorError> {
        let session_id = SessionId::parse(&snapshot.session_id).map_err(|reason| {
            OrchestratorError::InvalidSessionId {
                session_id: snapshot.session_id.clone(),
                reason,
            }
        })?;
        let path = self.session_path(&session_id);
        atomic_write_json(&path, snapshot).map_err(|source| io_error(&path, source))?;
        append_engine_log(
            &self.state_root,
            LogLevel::Info,
            "session.saved",
            &snapshot.session_id,
            "session snapshot written",
            Some(json!({
                "path": path.display().to_string(),
                "invocations": snapshot.invocations.len(),
            })),
        );
        Ok(path)
    }

    pub fn load(&self, session_id: &SessionId) -> Result<SessionSnapshot, OrchestratorError> {
        let path = self.session_path(session_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => {
                return Err(OrchestratorError::UnknownSession {
                    session_id: session_id.to_string(),
                })
            }
            Err(source) => return Err(io_error(&path, source)),
        };
        serde_json::from_str(&raw).map_err(|source| json_error(&path, source))
    }

    /// Every stored snapshot, oldest update first.
    pub fn list(&self) -> Result<Vec<SessionSnapshot>, OrchestratorError> {
        let root = self.sessions_dir();
        let entries = match fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(io_error(&root, source)),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| io_error(&root, source))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|value| value.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path).map_err(|source| io_error(&path, source))?;
            let snapshot: SessionSnapshot =
                serde_json::from_str(&raw).map_err(|source| json_error(&path, source))?;
            snapshots.push(snapshot);
        }
        snapshots.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(snapshots)
    }

    pub fn latest_session(&self) -> Result<Option<SessionSnapshot>, OrchestratorError> {
        Ok(self.list()?.pop())
    }
}

/// `sess-<base36 timestamp>-<4 base36 random chars>`.
pub fn generate_session_id(now: i64) -> Result<SessionId, OrchestratorError> {
    let timestamp = u64::try_from(now).map_err(|_| {
        OrchestratorError::SessionIdAllocation("timestamp must be non-negative".to_string())
    })?;
    let mut bytes = [0_u8; 4];
    getrandom(&mut bytes)
        .map_err(|err| OrchestratorError::SessionIdAllocation(format!("randomness: {err}")))?;
    let sample = u32::from_le_bytes(bytes) % SESSION_SUFFIX_SPACE;
    let raw = format!(
        "sess-{}-{}",
        base36_encode_u64(timestamp),
        base36_encode_fixed_u32(sample, 4)
    );
    SessionId::parse(&raw).map_err(OrchestratorError::SessionIdAllocation)
}

fn base36_encode_u64(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut chars = Vec::new();
    while value > 0 {
        chars.push(BASE36_ALPHABET[(value % 36) as usize] as char);
        value /= 36;
    }
    chars.iter().rev().collect()
}

fn base36_encode_fixed_u32(mut value: u32, width: usize) -> String {
    let mut chars = vec!['0'; width];
    for idx in (0..width).rev() {
        chars[idx] = BASE36_ALPHABET[(value % 36) as usize] as char;
        value /= 36;
    }
    chars.into_iter().collect()
}

fn io_error(path: &Path, source: std::io::Error) -> OrchestratorError {
    OrchestratorError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn json_error(path: &Path, source: serde_json::Error) -> OrchestratorError {
    OrchestratorError::Json {
        path: path.display().to_string(),
        source,
    }
}
