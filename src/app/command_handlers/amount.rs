use crate::app::command_support::map_orchestrator_err;
use crate::orchestration::amount::parse_amount;

pub fn cmd_amount(args: &[String]) -> Result<String, String> {
    if args.len() != 1 {
        return Err("usage: amount <raw>".to_string());
    }
    let amount = parse_amount(&args[0]).map_err(map_orchestrator_err)?;
    Ok(format!(
        "raw={}\namount={}\nintegral={}",
        args[0].trim(),
        amount,
        amount.is_integral()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_command_prints_normalized_value() {
        let out = cmd_amount(&["2.5m".to_string()]).expect("amount");
        assert!(out.contains("amount=2500000"));
        assert!(out.contains("integral=true"));
    }

    #[test]
    fn amount_command_reports_error_kind() {
        let err = cmd_amount(&["10x".to_string()]).expect_err("invalid");
        assert!(err.contains("invalid_amount_format"));
    }
}
