#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Help,
    Modes,
    Workflow,
    Amount,
    Session,
    Replay,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "help" | "--help" | "-h" => CliVerb::Help,
        "modes" => CliVerb::Modes,
        "workflow" => CliVerb::Workflow,
        "amount" => CliVerb::Amount,
        "session" => CliVerb::Session,
        "replay" => CliVerb::Replay,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  modes                                List configured modes and their tools".to_string(),
        "  workflow list                        List workflows in the configured library"
            .to_string(),
        "  workflow validate <path>             Check a workflow file against the settings"
            .to_string(),
        "  workflow show <path>                 Print a validated workflow as YAML".to_string(),
        "  amount <raw>                         Evaluate numeric shorthand (5k, 2.5m)".to_string(),
        "  session list                         List stored sessions".to_string(),
        "  session show <session_id>            Print a stored session snapshot".to_string(),
        "  session progress <session_id>        Print the progress view of a stored session"
            .to_string(),
        "  replay <script.yaml> [--save]        Drive a session with recorded tool responses"
            .to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    let mut lines = vec![
        "skillgate: ordered, mode-gated tool orchestration".to_string(),
        String::new(),
    ];
    lines.extend(cli_help_lines());
    lines.join("\n")
}
