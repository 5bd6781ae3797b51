use crate::app::command_support::{load_library, load_settings, map_config_err};
use crate::config::{Settings, WorkflowDefinition};
use std::path::Path;

pub fn cmd_workflow(args: &[String]) -> Result<String, String> {
    if args.is_empty() {
        return Err("usage: workflow <list|validate|show> ...".to_string());
    }

    match args[0].as_str() {
        "list" => {
            if args.len() != 1 {
                return Err("usage: workflow list".to_string());
            }
            let settings = load_settings()?;
            let library = load_library(&settings)?;
            Ok(library
                .references()
                .iter()
                .map(|reference| reference.to_string())
                .collect::<Vec<_>>()
                .join("\n"))
        }
        "validate" => {
            if args.len() != 2 {
                return Err("usage: workflow validate <path>".to_string());
            }
            let settings = load_settings()?;
            let definition = load_checked(Path::new(&args[1]), &settings)?;
            Ok(format!(
                "workflow valid\nworkflow={}\ntasks={}\nrequired_tools={}",
                definition.reference(),
                definition.tasks.len(),
                definition.required_tools.len()
            ))
        }
        "show" => {
            if args.len() != 2 {
                return Err("usage: workflow show <path>".to_string());
            }
            let settings = load_settings()?;
            let definition = load_checked(Path::new(&args[1]), &settings)?;
            serde_yaml::to_string(&definition)
                .map_err(|e| format!("failed to encode workflow: {e}"))
        }
        other => Err(format!("unknown workflow subcommand `{other}`")),
    }
}

pub fn load_checked(path: &Path, settings: &Settings) -> Result<WorkflowDefinition, String> {
    let definition = WorkflowDefinition::from_path(path).map_err(map_config_err)?;
    definition.validate().map_err(map_config_err)?;
    definition
        .validate_against(settings)
        .map_err(map_config_err)?;
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_subcommand_is_rejected() {
        let err = cmd_workflow(&["bogus".to_string()]).expect_err("unknown");
        assert_eq!(err, "unknown workflow subcommand `bogus`");
    }

    #[test]
    fn load_checked_applies_settings_rules() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("pay.yaml");
        std::fs::write(
            &path,
            "name: pay\nversion: 1\nrequired_tools: [send]\ntasks:\n  - ordinal: 1\n    description: send\n",
        )
        .expect("write");
        let settings: Settings =
            serde_yaml::from_str("modes:\n  research:\n    tools: [search]\n").expect("settings");

        let err = load_checked(&path, &settings).expect_err("no mode allows send");
        assert!(err.contains("no configured mode allows every required tool"));
    }
}
