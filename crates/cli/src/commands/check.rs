use std::path::Path;
use std::process;

use rpl_engine::{AccessRequest, Context, PolicyEngine};

use super::{load_policy, print_json};
use crate::config::RplConfig;
use crate::{report_error, OutputFormat};

pub(crate) struct CheckArgs<'a> {
    pub subject: String,
    pub action: String,
    pub resource: String,
    pub context: Option<&'a str>,
    pub explain: bool,
}

pub(crate) fn cmd_check(
    path: &Path,
    args: CheckArgs<'_>,
    config: &RplConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let context = match args.context.map(parse_context).transpose() {
        Ok(c) => c.unwrap_or_default(),
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    let table = load_policy(path, config, output, quiet);
    let engine = PolicyEngine::with_options(table, config.engine);
    let request =
        AccessRequest::new(args.subject, args.action, args.resource).with_context(context);

    if args.explain {
        let explanation = engine.explain(&request);
        if quiet {
            return;
        }
        match output {
            OutputFormat::Json => print_json(&explanation),
            OutputFormat::Text => {
                print_decision(&explanation.decision);
                println!("evaluated {} rule(s):", explanation.evaluated_rules);
                for step in &explanation.steps {
                    let condition = match (&step.condition_error, step.condition_passed) {
                        (Some(err), _) => format!(", condition unevaluable ({})", err),
                        (None, Some(true)) => ", condition passed".to_string(),
                        (None, Some(false)) => ", condition failed".to_string(),
                        (None, None) => String::new(),
                    };
                    println!(
                        "  line {}: {} {} action={} resource={}{}{}",
                        step.line,
                        step.rule_type,
                        step.resource_pattern,
                        yes_no(step.action_matched),
                        yes_no(step.resource_matched),
                        condition,
                        if step.matched { " => matched" } else { "" }
                    );
                }
            }
        }
        return;
    }

    let decision = engine.check(&request);
    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => print_json(&decision),
        OutputFormat::Text => print_decision(&decision),
    }
}

fn print_decision(decision: &rpl_engine::Decision) {
    println!(
        "{}: {} {} {}",
        if decision.allowed { "ALLOW" } else { "DENY" },
        decision.subject,
        decision.action,
        decision.resource
    );
    println!("reason: {}", decision.reason);
    for rule in &decision.matched_rules {
        println!(
            "  matched {} [{}] on {} (line {})",
            rule.rule_type,
            rule.actions.join(", "),
            rule.resource_pattern,
            rule.line_number
        );
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

fn parse_context(raw: &str) -> Result<Context, String> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err("error: --context must be a JSON object".to_string()),
        Err(e) => Err(format!("error: invalid JSON in --context: {}", e)),
    }
}
