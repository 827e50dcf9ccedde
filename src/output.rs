use std::io::{self, Write};

use crossterm::style::Stylize;
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunSummary};
use crate::dispatch::TransferStatus;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Colored progress and summary lines on stdout.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_summary(summary: &RunSummary) {
        let report = &summary.report;
        if report.dry_run {
            println!("{}", "Dry run, nothing downloaded:".blue());
            print!("{}", report.command_listing());
            return;
        }

        for outcome in &report.transfers {
            match outcome.status {
                TransferStatus::Done => println!("{} {}", " > done".green(), outcome.output),
                TransferStatus::Failed => {
                    println!("{} {}", " > FAILED".red(), outcome.command)
                }
                TransferStatus::Planned => println!(" > {}", outcome.command),
            }
        }
        let failed = report.failures().count();
        let line = format!(
            "{} of {} files retrieved from {} ({} records)",
            report.transfers.len() - failed,
            report.transfers.len(),
            summary.source,
            summary.records
        );
        if failed == 0 {
            println!("{}", line.blue());
        } else {
            println!("{}", line.yellow());
        }
        if let Some(path) = &report.log_file {
            println!("run log: {path}");
        }
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let message = event
            .message
            .split_once("; ")
            .map(|(_, rest)| rest)
            .unwrap_or(event.message.as_str());
        match event.elapsed {
            Some(elapsed) => println!(
                "{} {}",
                message.green(),
                format!("({:.1}s)", elapsed.as_secs_f64()).dark_grey()
            ),
            None => println!("{}", message.green()),
        }
    }
}
