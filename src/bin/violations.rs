//! violations - view, summarize, export, or clear the violation log

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, IsTerminal};
use std::path::PathBuf;

use ppe_sentinel::violation_log::report::{counts_by_type, export_csv, recent};
use ppe_sentinel::{CsvViolationLog, SentinelConfig, ViolationLogStore};

#[allow(dead_code)]
#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,
    /// Violation log CSV file (defaults to the configured log).
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the most recent violations, newest first.
    Show {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print violation counts per type.
    Stats,
    /// Write the full log as CSV.
    Export {
        #[arg(long, default_value = "violation_export.csv")]
        out: PathBuf,
    },
    /// Delete every logged violation.
    Clear,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let log_path = match &args.log_file {
        Some(path) => path.clone(),
        None => SentinelConfig::load_from(args.config.as_deref())?.log_path,
    };
    let mut store = CsvViolationLog::new(log_path);

    if let Command::Clear = args.command {
        let _stage = ui.stage("Clear violation log");
        store.clear()?;
        println!("cleared {}", store.path().display());
        return Ok(());
    }

    let records = {
        let _stage = ui.stage("Read violation log");
        store.read_all_or_reset()?
    };

    match args.command {
        Command::Show { limit } => {
            if records.is_empty() {
                println!("no violations logged in {}", store.path().display());
                return Ok(());
            }
            println!("{:<19}  {:<24}  {}", "Timestamp", "Violation", "Confidence");
            for record in recent(&records, limit) {
                println!(
                    "{:<19}  {:<24}  {}",
                    record.timestamp_field(),
                    record.violation_type,
                    record.confidence_field()
                );
            }
        }
        Command::Stats => {
            println!("total violations: {}", records.len());
            for entry in counts_by_type(&records) {
                println!("{:<24}  {}", entry.violation_type, entry.count);
            }
        }
        Command::Export { out } => {
            let _stage = ui.stage("Export violation log");
            let file = File::create(&out)
                .with_context(|| format!("failed to create export file {}", out.display()))?;
            export_csv(&records, BufWriter::new(file))?;
            println!("exported {} violations to {}", records.len(), out.display());
        }
        Command::Clear => {}
    }
    Ok(())
}
