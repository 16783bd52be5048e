#![forbid(unsafe_code)]

use std::path::PathBuf;

use lf_analysis::{
    AnalysisOptions, DEFAULT_PREVIEW_ROWS, NameHeuristicClassifier, analyze, link_details, preview,
};
use lf_io::{RuleStore, read_table};
use lf_rules::FilterRule;
use lf_runtime::DiagnosticLedger;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

enum Mode {
    Analyze,
    Preview(usize),
    Link(String),
    ListRules,
    SaveRule(String),
    DeleteRule(String),
}

#[derive(Serialize)]
struct Output<'a, T: Serialize> {
    result: &'a T,
    diagnostics: &'a DiagnosticLedger,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut file: Option<PathBuf> = None;
    let mut rule_file: Option<PathBuf> = None;
    let mut rule_name: Option<String> = None;
    let mut rules_dir = RuleStore::default_root();
    let mut options = AnalysisOptions::default();
    let mut mode = Mode::Analyze;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--file" => {
                file = Some(args.next().ok_or("--file requires a path")?.into());
            }
            "--rule" => {
                rule_file = Some(args.next().ok_or("--rule requires a JSON file")?.into());
            }
            "--rule-name" => {
                rule_name = Some(args.next().ok_or("--rule-name requires a stored rule name")?);
            }
            "--rules-dir" => {
                rules_dir = args.next().ok_or("--rules-dir requires a directory")?.into();
            }
            "--days" => {
                let value = args.next().ok_or("--days requires a number")?;
                options.days = value
                    .parse()
                    .map_err(|_| format!("invalid --days value: {value}"))?;
            }
            "--preview" => {
                mode = Mode::Preview(DEFAULT_PREVIEW_ROWS);
            }
            "--rows" => {
                let value = args.next().ok_or("--rows requires a number")?;
                let rows = value
                    .parse()
                    .map_err(|_| format!("invalid --rows value: {value}"))?;
                mode = Mode::Preview(rows);
            }
            "--link" => {
                mode = Mode::Link(args.next().ok_or("--link requires a link value")?);
            }
            "--list-rules" => {
                mode = Mode::ListRules;
            }
            "--save-rule" => {
                mode = Mode::SaveRule(args.next().ok_or("--save-rule requires a name")?);
            }
            "--delete-rule" => {
                mode = Mode::DeleteRule(args.next().ok_or("--delete-rule requires a name")?);
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}").into());
            }
        }
    }

    let store = RuleStore::new(rules_dir);
    match mode {
        Mode::ListRules => {
            print_json(&store.list()?)?;
            return Ok(());
        }
        Mode::SaveRule(name) => {
            let path = rule_file.ok_or("--save-rule requires --rule <file>")?;
            let rule = FilterRule::from_json(&std::fs::read_to_string(&path)?)?;
            let written = store.save(&name, &rule)?;
            println!("saved rule {name} to {}", written.display());
            return Ok(());
        }
        Mode::DeleteRule(name) => {
            store.delete(&name)?;
            println!("deleted rule {name}");
            return Ok(());
        }
        Mode::Analyze | Mode::Preview(_) | Mode::Link(_) => {}
    }

    let path = file.ok_or("--file is required (see --help)")?;
    let frame = read_table(&path)?;
    info!(path = %path.display(), rows = frame.len(), "loaded table");

    match mode {
        Mode::Preview(rows) => print_json(&preview(&frame, rows)?)?,
        Mode::Link(link) => print_json(&link_details(&frame, &link, &NameHeuristicClassifier)?)?,
        _ => {
            let rule = match (rule_file, rule_name) {
                (Some(path), _) => FilterRule::from_json(&std::fs::read_to_string(path)?)?,
                (None, Some(name)) => store.load(&name)?,
                (None, None) => store.load_default()?.unwrap_or_default(),
            };
            let mut ledger = DiagnosticLedger::new();
            let report = analyze(frame, &rule, &options, &mut ledger)?;
            print_json(&Output {
                result: &report,
                diagnostics: &ledger,
            })?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_help() {
    println!("linkfilter-cli --file <xlsx|csv> [options]");
    println!("  --rule <file>          filter rule as JSON");
    println!("  --rule-name <name>     stored rule to apply (default: the stored `default` rule)");
    println!("  --rules-dir <dir>      rule store directory (default: data/excel_rules)");
    println!("  --days <n>             averaging window in days, 1..=30 (default: 7)");
    println!("  --preview              print the header and the first 10 rows");
    println!("  --rows <n>             preview the first n rows instead");
    println!("  --link <value>         print every row of one link");
    println!("  --list-rules           list stored rules");
    println!("  --save-rule <name>     store the rule given with --rule");
    println!("  --delete-rule <name>   remove a stored rule");
    println!("  RUST_LOG               log filter, e.g. RUST_LOG=debug");
}
