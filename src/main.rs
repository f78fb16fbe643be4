mod debug_report;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use serde_json::{Value, json};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use trellis::{AppVersion, Payload, SettingsForm};

/// Evaluate a settings payload and report what the settings page shows.
#[derive(Debug, Parser)]
#[command(name = "trellis", version, about)]
struct Cli {
    /// Payload JSON file. Reads stdin when omitted or `-`.
    payload: Option<PathBuf>,

    /// Running application version, e.g. `2.53`. Unknown versions pass every check.
    #[arg(long, value_name = "VERSION")]
    app_version: Option<String>,

    /// Write a value before reporting. Repeatable, applied in order.
    #[arg(long = "set", value_name = "TYPE.ID=JSON", value_parser = parse_assignment)]
    set: Vec<Assignment>,

    /// Print setting views and the save document as JSON.
    #[arg(long)]
    json: bool,

    /// Force ANSI color output.
    #[arg(long, conflicts_with = "no_color")]
    color: bool,

    /// Disable ANSI color output.
    #[arg(long)]
    no_color: bool,
}

#[derive(Debug, Clone)]
struct Assignment {
    kind: String,
    id: String,
    value: Value,
}

/// `type.id=<json>`; a value that is not valid JSON is taken as a string.
fn parse_assignment(raw: &str) -> Result<Assignment, String> {
    let (key, value) = raw.split_once('=').ok_or_else(|| format!("expected TYPE.ID=JSON, got '{raw}'"))?;
    let (kind, id) = key.split_once('.').ok_or_else(|| format!("expected TYPE.ID, got '{key}'"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok(Assignment { kind: kind.to_string(), id: id.to_string(), value })
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("TRELLIS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let cli = Cli::parse();

    let form = match load(&cli) {
        Ok(form) => form,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(2);
        }
    };

    match report(&cli, &form) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn load(cli: &Cli) -> Result<SettingsForm> {
    let text = match cli.payload.as_deref() {
        Some(path) if path.as_os_str() != "-" => {
            std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
        }
        _ => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer).context("failed to read stdin")?;
            buffer
        }
    };
    if text.trim().is_empty() {
        return Err(anyhow!("no payload provided"));
    }

    let payload = Payload::from_json(&text).context("invalid payload")?;
    let version = cli.app_version.clone().map(AppVersion::new).unwrap_or_else(AppVersion::unknown);
    let mut form = SettingsForm::load(payload, version)?;

    for assignment in &cli.set {
        let id = form.require(&assignment.kind, &assignment.id)?;
        form.set_visible_value(id, assignment.value.clone());
    }
    Ok(form)
}

fn report(cli: &Cli, form: &SettingsForm) -> Result<()> {
    if cli.json {
        let out = json!({ "settings": form.views(), "document": form.serialize() });
        println!("{}", serde_json::to_string_pretty(&out).context("failed to encode report")?);
        return Ok(());
    }

    let color = !cli.no_color && (cli.color || io::stdout().is_terminal());
    debug_report::print_form(form, color);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_accept_json_or_bare_strings() {
        let a = parse_assignment("hq.cc_user_domain=true").unwrap();
        assert_eq!((a.kind.as_str(), a.id.as_str(), a.value), ("hq", "cc_user_domain", json!(true)));

        let b = parse_assignment("properties.cc-entry-mode=cc-entry-review").unwrap();
        assert_eq!(b.value, json!("cc-entry-review"));

        assert!(parse_assignment("no-equals").is_err());
        assert!(parse_assignment("nodot=1").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
