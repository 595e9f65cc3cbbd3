use std::path::Path;
use std::process;

use rpl_engine::user_permissions;
use time::{Date, OffsetDateTime};

use super::{load_policy, print_json};
use crate::config::RplConfig;
use crate::{report_error, OutputFormat};

pub(crate) fn cmd_permissions(
    path: &Path,
    user: &str,
    as_of: Option<&str>,
    config: &RplConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let today = match as_of {
        Some(raw) => match rpl_core::parse_date(raw) {
            Some(d) => d,
            None => {
                report_error(&format!("error: unrecognized date '{}'", raw), output, quiet);
                process::exit(1);
            }
        },
        None => OffsetDateTime::now_utc().date(),
    };

    let table = load_policy(path, config, output, quiet);
    let report = match user_permissions(&table, user, today) {
        Some(r) => r,
        None => {
            report_error(&format!("error: user '{}' is not declared", user), output, quiet);
            process::exit(1);
        }
    };

    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "as_of": today.to_string(),
            "active": report.active(),
            "report": report,
        })),
        OutputFormat::Text => {
            println!("User: {}", report.user);
            if report.roles.is_empty() {
                println!("Roles: (none)");
            } else {
                println!("Roles: {}", report.roles.join(", "));
            }
            println!(
                "Validity: {} .. {}{}",
                date_or_open(report.valid_from),
                date_or_open(report.valid_until),
                if report.expired {
                    " (expired)"
                } else if report.not_yet_valid {
                    " (not yet valid)"
                } else {
                    ""
                }
            );
            if report.permissions.is_empty() {
                println!("Permissions: (none)");
            } else {
                println!("Permissions:");
                for (resource, actions) in &report.permissions {
                    let actions: Vec<&str> = actions.iter().map(String::as_str).collect();
                    println!(
                        "  {}: {}{}",
                        resource,
                        actions.join(", "),
                        if report.conditional.contains(resource) {
                            " (conditional)"
                        } else {
                            ""
                        }
                    );
                }
            }
        }
    }
}

fn date_or_open(date: Option<Date>) -> String {
    date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
}
