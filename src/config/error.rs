#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("settings validation failed: {0}")]
    Settings(String),
    #[error("workflow `{workflow}` validation failed: {reason}")]
    Workflow { workflow: String, reason: String },
    #[error("workflow `{name}` version {version} is declared more than once")]
    DuplicateWorkflow { name: String, version: u32 },
    #[error("failed to resolve home directory for global config path")]
    HomeDirectoryUnavailable,
}
