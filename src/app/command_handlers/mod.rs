use crate::app::cli::{help_text, parse_cli_verb, CliVerb};

pub mod amount;
pub mod modes;
pub mod replay;
pub mod sessions;
pub mod workflows;

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    if args.is_empty() {
        return Ok(help_text());
    }

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::Help => Ok(help_text()),
        CliVerb::Modes => modes::cmd_modes(&args[1..]),
        CliVerb::Workflow => workflows::cmd_workflow(&args[1..]),
        CliVerb::Amount => amount::cmd_amount(&args[1..]),
        CliVerb::Session => sessions::cmd_session(&args[1..]),
        CliVerb::Replay => replay::cmd_replay(&args[1..]),
        CliVerb::Unknown => Err(format!("unknown command `{}`", args[0])),
    }
}
