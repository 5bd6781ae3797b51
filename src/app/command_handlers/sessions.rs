use crate::app::command_support::{
    load_library, load_settings, map_orchestrator_err, session_store, to_pretty_json,
};
use crate::config::SessionId;
use crate::orchestration::progress::ProgressSnapshot;
use crate::orchestration::session::{Session, SessionSnapshot};
use std::sync::Arc;

pub fn cmd_session(args: &[String]) -> Result<String, String> {
    if args.is_empty() {
        return Err("usage: session <list|show|progress> ...".to_string());
    }

    match args[0].as_str() {
        "list" => {
            if args.len() != 1 {
                return Err("usage: session list".to_string());
            }
            let settings = load_settings()?;
            let snapshots = session_store(&settings)?
                .list()
                .map_err(map_orchestrator_err)?;
            Ok(render_session_list(&snapshots))
        }
        "show" => {
            if args.len() != 2 {
                return Err("usage: session show <session_id>".to_string());
            }
            let session_id = parse_session_id(&args[1])?;
            let settings = load_settings()?;
            let snapshot = session_store(&settings)?
                .load(&session_id)
                .map_err(map_orchestrator_err)?;
            to_pretty_json(&snapshot)
        }
        "progress" => {
            if args.len() != 2 {
                return Err("usage: session progress <session_id>".to_string());
            }
            let session_id = parse_session_id(&args[1])?;
            let settings = load_settings()?;
            let library = load_library(&settings)?;
            let snapshot = session_store(&settings)?
                .load(&session_id)
                .map_err(map_orchestrator_err)?;
            let session = Session::restore(snapshot, &library, Arc::new(settings))
                .map_err(map_orchestrator_err)?;
            to_pretty_json(&ProgressSnapshot::from_session(&session))
        }
        other => Err(format!("unknown session subcommand `{other}`")),
    }
}

fn parse_session_id(raw: &str) -> Result<SessionId, String> {
    SessionId::parse(raw).map_err(|reason| format!("invalid session id `{raw}`: {reason}"))
}

pub fn render_session_list(snapshots: &[SessionSnapshot]) -> String {
    if snapshots.is_empty() {
        return "no sessions".to_string();
    }
    snapshots
        .iter()
        .map(|snapshot| {
            format!(
                "{} updated_at={} mode={} workflow={} queue={}",
                snapshot.session_id,
                snapshot.updated_at,
                snapshot
                    .selected_mode
                    .as_ref()
                    .map(|mode| mode.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                snapshot
                    .workflow
                    .as_ref()
                    .map(|workflow| workflow.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                snapshot.queue.state()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn session_list_renders_one_line_per_snapshot() {
        let settings: Settings =
            serde_yaml::from_str("modes:\n  research:\n    tools: [search]\n").expect("settings");
        let session = Session::new("sess-a", Arc::new(settings));
        let out = render_session_list(&[session.snapshot()]);
        assert!(out.starts_with("sess-a updated_at="));
        assert!(out.ends_with("mode=- workflow=- queue=empty"));
        assert_eq!(render_session_list(&[]), "no sessions");
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        let err = cmd_session(&["purge".to_string()]).expect_err("unknown");
        assert_eq!(err, "unknown session subcommand `purge`");
    }

    #[test]
    fn path_like_session_ids_are_rejected_before_loading() {
        let err = cmd_session(&["show".to_string(), "../../etc/passwd".to_string()])
            .expect_err("invalid id");
        assert!(err.starts_with("invalid session id `../../etc/passwd`"));
    }
}
