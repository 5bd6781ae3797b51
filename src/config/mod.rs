pub mod error;
pub mod load;
pub mod paths;
pub mod settings;
pub mod workflow_file;
pub mod workflow_library;

pub use crate::shared::ids::{ModeId, RegisterName, SessionId, ToolName, WorkflowName};
pub use error::ConfigError;
pub use load::{load_global_settings, load_workflow_library};
pub use paths::{
    default_global_config_path, default_state_root_path, CONFIG_PATH_ENV,
    GLOBAL_SETTINGS_FILE_NAME, GLOBAL_STATE_DIR,
};
pub use settings::{
    FailurePolicy, ModeConfig, OperationRole, Settings, ToolSpec, DEFAULT_MODE_SELECTION_TOOL,
};
pub use workflow_file::{TaskDraft, WorkflowDefinition, WorkflowRef};
pub use workflow_library::WorkflowLibrary;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn settings_fixture() -> Settings {
        serde_yaml::from_str(
            r#"
modes:
  finance:
    tools: [resolve_identity, transfer]
  messaging:
    tools: [post_message]
tools:
  transfer:
    requires: [token_address]
    inputs:
      to: recipient_address
    outputs: [tx_hash]
    amount_args: [amount]
    operation: submit
"#,
        )
        .expect("parse settings")
    }

    #[test]
    fn settings_defaults_apply_when_omitted() {
        let settings = settings_fixture();
        settings.validate().expect("valid settings");

        assert_eq!(settings.mode_selection_tool.as_str(), DEFAULT_MODE_SELECTION_TOOL);
        assert_eq!(settings.failure_policy, FailurePolicy::RestartWorkflow);
        let transfer = settings.tool_spec(&ToolName::parse("transfer").expect("tool"));
        assert_eq!(transfer.operation, Some(OperationRole::Submit));
        let names = transfer
            .consumed_registers()
            .into_iter()
            .map(|name| name.to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["token_address", "recipient_address"]);

        let undeclared = settings.tool_spec(&ToolName::parse("post_message").expect("tool"));
        assert_eq!(undeclared, ToolSpec::default());
    }

    #[test]
    fn settings_validation_rejects_selection_tool_in_allow_list() {
        let settings: Settings = serde_yaml::from_str(
            r#"
modes:
  finance:
    tools: [select_mode, transfer]
"#,
        )
        .expect("parse settings");

        let err = settings.validate().expect_err("must fail");
        assert!(err.to_string().contains("always allowed"));
    }

    #[test]
    fn settings_validation_rejects_amount_arg_bound_to_register() {
        let settings: Settings = serde_yaml::from_str(
            r#"
modes:
  finance:
    tools: [transfer]
tools:
  transfer:
    inputs:
      amount: transfer_amount
    amount_args: [amount]
"#,
        )
        .expect("parse settings");

        let err = settings.validate().expect_err("must fail");
        assert!(err.to_string().contains("both an amount and a register input"));
    }

    #[test]
    fn settings_reject_invalid_identifiers_at_parse_time() {
        let err = serde_yaml::from_str::<Settings>(
            r#"
modes:
  "bad mode":
    tools: []
"#,
        )
        .expect_err("invalid mode id");
        assert!(err.to_string().contains("invalid mode id"));
    }

    #[test]
    fn workflow_validation_requires_contiguous_ordinals_and_declared_checklists() {
        let definition: WorkflowDefinition = serde_yaml::from_str(
            r#"
name: send_tokens
version: 1
required_tools: [transfer]
tasks:
  - ordinal: 1
    description: resolve recipient
  - ordinal: 3
    description: send
"#,
        )
        .expect("parse workflow");
        let err = definition.validate().expect_err("gap in ordinals");
        assert!(err.to_string().contains("task ordinals must run 1..=2"));

        let definition: WorkflowDefinition = serde_yaml::from_str(
            r#"
name: send_tokens
version: 1
required_tools: [transfer]
tasks:
  - ordinal: 1
    description: send
    checklist: [broadcast]
"#,
        )
        .expect("parse workflow");
        let err = definition.validate().expect_err("undeclared checklist tool");
        assert!(err.to_string().contains("not in required_tools"));
    }

    #[test]
    fn workflow_validation_against_settings_requires_a_reachable_mode() {
        let settings = settings_fixture();
        let definition: WorkflowDefinition = serde_yaml::from_str(
            r#"
name: mixed
version: 2
required_tools: [transfer, post_message]
tasks:
  - ordinal: 1
    description: do both
"#,
        )
        .expect("parse workflow");

        let err = definition
            .validate_against(&settings)
            .expect_err("no single mode has both tools");
        assert!(err.to_string().contains("mixed@2"));
        assert!(err.to_string().contains("no configured mode"));
    }

    #[test]
    fn library_loads_directory_and_resolves_latest_version() {
        let temp = tempdir().expect("tempdir");
        let settings = settings_fixture();
        fs::write(
            temp.path().join("send-v1.yaml"),
            "name: send_tokens\nversion: 1\nrequired_tools: [transfer]\ntasks:\n  - ordinal: 1\n    description: send\n",
        )
        .expect("write v1");
        fs::write(
            temp.path().join("send-v2.json"),
            r#"{"name":"send_tokens","version":2,"required_tools":["transfer"],"tasks":[{"ordinal":1,"description":"send"}]}"#,
        )
        .expect("write v2");
        fs::write(temp.path().join("notes.txt"), "ignored").expect("write notes");

        let library = WorkflowLibrary::load_dir(temp.path(), &settings).expect("load library");
        assert_eq!(library.len(), 2);
        let latest = library
            .latest(&WorkflowName::parse("send_tokens").expect("name"))
            .expect("latest");
        assert_eq!(latest.version, 2);
    }

    #[test]
    fn library_rejects_duplicate_versions() {
        let mut library = WorkflowLibrary::default();
        let definition = WorkflowDefinition {
            name: WorkflowName::parse("send_tokens").expect("name"),
            version: 1,
            description: None,
            metadata: Default::default(),
            required_tools: Default::default(),
            tasks: vec![TaskDraft::new(1, "send")],
        };
        library.insert(definition.clone()).expect("first insert");
        let err = library.insert(definition).expect_err("duplicate");
        assert!(matches!(err, ConfigError::DuplicateWorkflow { version: 1, .. }));
    }

    #[test]
    fn global_config_path_honors_env_override() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        let previous = std::env::var_os(CONFIG_PATH_ENV);
        std::env::set_var(CONFIG_PATH_ENV, "/tmp/skillgate-test/config.yaml");

        let path = default_global_config_path().expect("path");
        assert_eq!(path, std::path::PathBuf::from("/tmp/skillgate-test/config.yaml"));

        match previous {
            Some(value) => std::env::set_var(CONFIG_PATH_ENV, value),
            None => std::env::remove_var(CONFIG_PATH_ENV),
        }
    }
}
