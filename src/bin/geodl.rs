use std::collections::BTreeSet;
use std::process::ExitCode;

use clap::Parser;
use crossterm::style::Stylize;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use geodl::app::{App, RunOptions};
use geodl::catalog::CatalogHttpClient;
use geodl::config::{ConfigLoader, ConfigOverrides};
use geodl::domain::{RetrievalMode, TransferKind};
use geodl::error::GeodlError;
use geodl::output::{ConsoleOutput, JsonOutput, OutputMode};
use geodl::transfer::SystemTransferTool;

#[derive(Parser)]
#[command(name = "geodl")]
#[command(
    about = "Download fastq files of a GEO series, an ENA study or an ENA metadata file, named after their samples"
)]
#[command(version, author)]
struct Cli {
    /// Where runs and sample names come from.
    #[arg(value_enum)]
    mode: RetrievalMode,

    /// GSE accession (geo, prefetch), ENA study accession (ena) or metadata file (meta).
    input: String,

    /// Print the transfer commands without running them.
    #[arg(long)]
    dry: bool,

    /// Only download these samples (GSM ids in geo mode, naming-column values otherwise).
    #[arg(long, num_args = 1..)]
    samples: Vec<String>,

    /// Metadata column used to name the output files.
    #[arg(long)]
    name_column: Option<String>,

    /// Metadata column listing the fastq urls.
    #[arg(long)]
    url_column: Option<String>,

    /// Transfer tool for fastq files; aspera also switches prefetch to the fasp transport.
    #[arg(long, value_enum)]
    tool: Option<TransferKind>,

    /// Path to the ascp binary.
    #[arg(long)]
    ascp: Option<String>,

    /// Aspera private key file.
    #[arg(long)]
    aspera_key: Option<String>,

    #[arg(long)]
    output_dir: Option<String>,

    #[arg(long)]
    log_file: Option<String>,

    /// JSON config file (default: ./geodl.json when present).
    #[arg(long)]
    config: Option<String>,

    /// Print a JSON summary instead of colored progress.
    #[arg(long)]
    non_interactive: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<GeodlError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GeodlError) -> u8 {
    match error {
        GeodlError::InvalidGeoAccession(_)
        | GeodlError::InvalidStudyAccession(_)
        | GeodlError::MissingColumn { .. }
        | GeodlError::DuplicateSampleName { .. }
        | GeodlError::MalformedRow { .. }
        | GeodlError::InvalidRow { .. }
        | GeodlError::UnmappedAccession(_)
        | GeodlError::UnexpectedUrlCount { .. }
        | GeodlError::AmbiguousAccession { .. } => 2,
        GeodlError::CatalogUnreachable { .. }
        | GeodlError::CatalogParse { .. }
        | GeodlError::InconsistentResultCount { .. }
        | GeodlError::ToolNotFound(_) => 3,
        _ => 1,
    }
}

// GeodlError is propagated as-is so `main` can map it to an exit code.
fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let overrides = ConfigOverrides {
        output_dir: cli.output_dir,
        log_file: cli.log_file,
        url_column: cli.url_column,
        name_column: cli.name_column,
        transfer: cli.tool,
        ascp: cli.ascp,
        aspera_key: cli.aspera_key,
    };
    let config = ConfigLoader::resolve(cli.config.as_deref(), overrides)?;
    let catalog = CatalogHttpClient::new()?;
    let app = App::new(catalog, SystemTransferTool::new(), config);

    let options = RunOptions {
        dry_run: cli.dry,
        samples: cli.samples.into_iter().collect::<BTreeSet<_>>(),
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let summary = app.run(cli.mode, &cli.input, &options, &JsonOutput)?;
            JsonOutput::print_summary(&summary).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            println!(
                "{}",
                format!("geodl {} ({} mode)", env!("CARGO_PKG_VERSION"), cli.mode).blue()
            );
            let summary = app.run(cli.mode, &cli.input, &options, &ConsoleOutput)?;
            ConsoleOutput::print_summary(&summary);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_error_kind() {
        assert_eq!(map_exit_code(&GeodlError::UnmappedAccession("GSM1".to_string())), 2);
        assert_eq!(
            map_exit_code(&GeodlError::InvalidRow {
                source_name: "meta.tsv".to_string(),
                line: 3,
                message: "invalid utf-8".to_string(),
            }),
            2
        );
        assert_eq!(map_exit_code(&GeodlError::ToolNotFound("wget".to_string())), 3);
        assert_eq!(map_exit_code(&GeodlError::unreachable("GEO", "timeout")), 3);
        assert_eq!(map_exit_code(&GeodlError::Filesystem("disk full".to_string())), 1);
    }
}
