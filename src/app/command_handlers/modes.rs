use crate::app::command_support::load_settings;
use crate::config::Settings;

pub fn cmd_modes(args: &[String]) -> Result<String, String> {
    if !args.is_empty() {
        return Err("usage: modes".to_string());
    }
    let settings = load_settings()?;
    Ok(render_modes(&settings))
}

pub fn render_modes(settings: &Settings) -> String {
    let mut lines = vec![
        format!("selection_tool={}", settings.mode_selection_tool),
        format!("failure_policy={}", settings.failure_policy),
    ];
    for (mode, config) in &settings.modes {
        let tools = config
            .tools
            .iter()
            .map(|tool| tool.to_string())
            .collect::<Vec<_>>()
            .join(",");
        lines.push(format!("mode.{mode}={tools}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_render_as_key_value_lines() {
        let settings: Settings = serde_yaml::from_str(
            "failure_policy: retry_task\nmodes:\n  wallet:\n    tools: [send, balance]\n  research:\n    tools: []\n",
        )
        .expect("settings");
        let out = render_modes(&settings);
        assert_eq!(
            out,
            "selection_tool=select_mode\nfailure_policy=retry_task\nmode.research=\nmode.wallet=balance,send"
        );
    }
}
