use std::{collections::BTreeMap, path::Path};

use {
    anyhow::{Result, bail},
    clap::Subcommand,
    dingbot_config::validate::{self, Diagnostic, Severity},
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print which config file would be used.
    Path,
}

pub fn handle_config(action: ConfigAction, explicit: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check { verbose } => check(explicit, verbose),
        ConfigAction::Path => {
            match explicit
                .map(Path::to_path_buf)
                .or_else(dingbot_config::find_config_file)
            {
                Some(path) => println!("{}", path.display()),
                None => eprintln!("No config file found."),
            }
            Ok(())
        },
    }
}

fn severity_style(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "\x1b[1;31m",
        Severity::Warning => "\x1b[1;33m",
        Severity::Info => "\x1b[1;36m",
    }
}

/// Top-level config table a diagnostic belongs to; file-wide ones have none.
fn section(path: &str) -> &str {
    match path.split_once('.') {
        Some((table, _)) => table,
        None if path.is_empty() => "file",
        None => path,
    }
}

fn check(explicit: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate::validate(explicit);
    match &result.config_path {
        Some(path) => eprintln!("checking {}", path.display()),
        None => eprintln!("no config file found, checking built-in defaults"),
    }

    let mut sections: BTreeMap<&str, Vec<&Diagnostic>> = BTreeMap::new();
    for d in &result.diagnostics {
        if verbose || d.severity != Severity::Info {
            sections.entry(section(&d.path)).or_default().push(d);
        }
    }
    for (name, diagnostics) in &sections {
        eprintln!("\n[{name}]");
        for d in diagnostics {
            let field = d.path.split_once('.').map_or("", |(_, field)| field);
            let style = severity_style(d.severity);
            if field.is_empty() {
                eprintln!("  {style}{}\x1b[0m {}", d.severity, d.message);
            } else {
                eprintln!("  {style}{}\x1b[0m {field}: {}", d.severity, d.message);
            }
        }
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    if errors == 0 && warnings == 0 {
        eprintln!("config ok");
        return Ok(());
    }
    eprintln!("\n{errors} error(s), {warnings} warning(s)");
    if result.has_errors() {
        bail!("config check failed");
    }
    Ok(())
}
