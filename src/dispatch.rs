use std::collections::{BTreeSet, HashSet};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::accession::{AccessionMap, sanitize_name};
use crate::domain::RetrievalMode;
use crate::error::GeodlError;
use crate::metadata::MetadataTable;
use crate::runlog::RunLog;
use crate::transfer::{CommandTemplates, TransferCommand, TransferTool};

/// How records turn into output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPolicy {
    /// One `.fq.gz` per fastq url, `_R1`/`_R2` for paired runs.
    Fastq,
    /// One `.sra` archive per run.
    Archive,
}

impl OutputPolicy {
    pub fn for_mode(mode: RetrievalMode) -> Self {
        match mode {
            RetrievalMode::Prefetch => OutputPolicy::Archive,
            RetrievalMode::Geo | RetrievalMode::Ena | RetrievalMode::Meta => OutputPolicy::Fastq,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rename {
    pub from: Utf8PathBuf,
    pub to: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTransfer {
    pub key: String,
    pub name: String,
    pub output: String,
    pub command: TransferCommand,
    pub rename: Option<Rename>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Planned,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    pub key: String,
    pub output: String,
    pub command: String,
    pub status: TransferStatus,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub dry_run: bool,
    pub log_file: Option<String>,
    pub transfers: Vec<TransferOutcome>,
}

impl DispatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.transfers
            .iter()
            .filter(|outcome| outcome.status == TransferStatus::Failed)
    }

    /// Command lines in dispatch order, as printed by a dry run.
    pub fn command_listing(&self) -> String {
        let mut out = String::new();
        for outcome in &self.transfers {
            out.push_str(&outcome.command);
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub dry_run: bool,
    pub output_dir: Utf8PathBuf,
    pub log_file: Utf8PathBuf,
    /// First line of the run log, usually the accession.
    pub label: String,
}

pub struct Dispatcher<'a, T: TransferTool> {
    templates: &'a CommandTemplates,
    tool: &'a T,
}

impl<'a, T: TransferTool> Dispatcher<'a, T> {
    pub fn new(templates: &'a CommandTemplates, tool: &'a T) -> Self {
        Self { templates, tool }
    }

    /// Resolves names and layouts for every selected record without side effects.
    pub fn plan(
        &self,
        table: &MetadataTable,
        map: &AccessionMap,
        policy: OutputPolicy,
        only: &BTreeSet<String>,
    ) -> Result<Vec<PlannedTransfer>, GeodlError> {
        let mut planned = Vec::new();
        let mut outputs = HashSet::new();
        for record in table.records() {
            if !only.is_empty() && !only.contains(&record.key) {
                tracing::debug!(key = %record.key, "skipped by sample filter");
                continue;
            }
            let name = sanitize_name(map.resolve(&record.key)?);

            match policy {
                OutputPolicy::Fastq => {
                    let layout = record.layout()?;
                    for (url, suffix) in record.urls.iter().zip(layout.suffixes()) {
                        let output = format!("{name}{suffix}.fq.gz");
                        planned.push(PlannedTransfer {
                            key: record.key.clone(),
                            name: name.clone(),
                            command: self.templates.file(url, &output),
                            output,
                            rename: None,
                        });
                    }
                }
                OutputPolicy::Archive => {
                    let run = record.run_accession.as_deref().unwrap_or(&record.key);
                    let output = format!("{name}.sra");
                    planned.push(PlannedTransfer {
                        key: record.key.clone(),
                        name: name.clone(),
                        command: self.templates.archive(run),
                        rename: Some(Rename {
                            from: CommandTemplates::archive_output(run),
                            to: Utf8PathBuf::from(&output),
                        }),
                        output,
                    });
                }
            }
        }

        for transfer in &planned {
            if !outputs.insert(transfer.output.as_str()) {
                return Err(GeodlError::DuplicateSampleName {
                    name: transfer.name.clone(),
                    source_name: table.source().to_string(),
                });
            }
        }
        Ok(planned)
    }

    /// Runs a plan in order. Only missing tools and log errors stop the run;
    /// a failing transfer is recorded and the next file is attempted.
    pub fn execute(
        &self,
        planned: &[PlannedTransfer],
        options: &DispatchOptions,
    ) -> Result<DispatchReport, GeodlError> {
        if options.dry_run {
            let transfers = planned
                .iter()
                .map(|transfer| TransferOutcome {
                    key: transfer.key.clone(),
                    output: transfer.output.clone(),
                    command: transfer.command.to_string(),
                    status: TransferStatus::Planned,
                    exit_code: None,
                })
                .collect();
            return Ok(DispatchReport {
                dry_run: true,
                log_file: None,
                transfers,
            });
        }

        let mut programs = BTreeSet::new();
        for transfer in planned {
            if programs.insert(transfer.command.program.as_str()) {
                self.tool.ensure_available(&transfer.command.program)?;
            }
        }

        std::fs::create_dir_all(&options.output_dir).map_err(|err| {
            GeodlError::Filesystem(format!("create {}: {err}", options.output_dir))
        })?;
        let mut log = RunLog::open(&options.log_file)?;
        log.header(&options.label)?;

        let mut transfers = Vec::with_capacity(planned.len());
        let mut last_key: Option<&str> = None;
        for transfer in planned {
            if last_key != Some(transfer.key.as_str()) {
                log.mapping(&transfer.key, &transfer.name)?;
                last_key = Some(transfer.key.as_str());
            }
            let outcome = self.transfer_one(transfer, &options.output_dir, &mut log)?;
            transfers.push(outcome);
        }

        Ok(DispatchReport {
            dry_run: false,
            log_file: Some(log.path().to_string()),
            transfers,
        })
    }

    fn transfer_one(
        &self,
        transfer: &PlannedTransfer,
        output_dir: &Utf8Path,
        log: &mut RunLog,
    ) -> Result<TransferOutcome, GeodlError> {
        let command = transfer.command.to_string();
        tracing::info!(output = %transfer.output, "starting transfer");
        log.command(&command)?;

        let failed = |code: Option<i32>, command: String| TransferOutcome {
            key: transfer.key.clone(),
            output: transfer.output.clone(),
            command,
            status: TransferStatus::Failed,
            exit_code: code,
        };

        let status = match self.tool.run(&transfer.command, output_dir) {
            Ok(status) => status,
            Err(GeodlError::TransferFailed { code, command }) => {
                tracing::warn!(%command, "transfer could not be started");
                log.failure(code, &command)?;
                return Ok(failed(code, command));
            }
            Err(err) => return Err(err),
        };
        if !status.success() {
            let err = GeodlError::TransferFailed {
                code: status.code,
                command: command.clone(),
            };
            tracing::warn!("{err}");
            log.failure(status.code, &command)?;
            return Ok(failed(status.code, command));
        }

        if let Some(rename) = &transfer.rename {
            let from = output_dir.join(&rename.from);
            let to = output_dir.join(&rename.to);
            if let Err(err) = self.tool.rename(&from, &to) {
                let described = format!("mv {from} {to}");
                tracing::warn!("{err}");
                log.failure(None, &described)?;
                return Ok(failed(None, described));
            }
        }

        Ok(TransferOutcome {
            key: transfer.key.clone(),
            output: transfer.output.clone(),
            command,
            status: TransferStatus::Done,
            exit_code: status.code,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use assert_matches::assert_matches;

    use super::*;
    use crate::config::ResolvedConfig;
    use crate::domain::TransferKind;
    use crate::metadata::{Columns, RunRecord};
    use crate::transfer::ExitStatus;

    #[derive(Default)]
    struct RecordingTool {
        calls: RefCell<Vec<String>>,
        fail_outputs: Vec<String>,
    }

    impl TransferTool for RecordingTool {
        fn ensure_available(&self, _program: &str) -> Result<(), GeodlError> {
            Ok(())
        }

        fn run(&self, command: &TransferCommand, _cwd: &Utf8Path) -> Result<ExitStatus, GeodlError> {
            self.calls.borrow_mut().push(command.to_string());
            let failing = self
                .fail_outputs
                .iter()
                .any(|output| command.args.contains(output));
            Ok(ExitStatus {
                code: Some(if failing { 1 } else { 0 }),
            })
        }

        fn rename(&self, _from: &Utf8Path, _to: &Utf8Path) -> Result<(), GeodlError> {
            Ok(())
        }
    }

    fn templates() -> CommandTemplates {
        CommandTemplates::new(TransferKind::Wget, ResolvedConfig::default().tools)
    }

    fn table(text: &str) -> MetadataTable {
        let columns = Columns {
            url: "fastq_ftp".to_string(),
            name: "sample_alias".to_string(),
        };
        MetadataTable::parse(text.as_bytes(), "meta.tsv", &columns).unwrap()
    }

    #[test]
    fn paired_run_yields_two_suffixed_files() {
        let table = table("sample_alias\tfastq_ftp\nSampleB\tftp://host/f_1.fastq.gz;ftp://host/f_2.fastq.gz\n");
        let templates = templates();
        let tool = RecordingTool::default();
        let dispatcher = Dispatcher::new(&templates, &tool);
        let plan = dispatcher
            .plan(&table, &AccessionMap::Identity, OutputPolicy::Fastq, &BTreeSet::new())
            .unwrap();
        let outputs: Vec<&str> = plan.iter().map(|p| p.output.as_str()).collect();
        assert_eq!(outputs, vec!["SampleB_R1.fq.gz", "SampleB_R2.fq.gz"]);
        assert_eq!(plan[0].command.args[0], "ftp://host/f_1.fastq.gz");
    }

    #[test]
    fn filter_skips_unlisted_keys_before_lookup() {
        let table = table("sample_alias\tfastq_ftp\nGSM1\tftp://h/a.fq.gz\nGSM2\tftp://h/b.fq.gz\n");
        let map = AccessionMap::explicit([("GSM1", "Liver Sample 1")]);
        let templates = templates();
        let tool = RecordingTool::default();
        let dispatcher = Dispatcher::new(&templates, &tool);
        let only = BTreeSet::from(["GSM1".to_string()]);
        let plan = dispatcher
            .plan(&table, &map, OutputPolicy::Fastq, &only)
            .unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].output, "Liver_Sample_1.fq.gz");

        let err = dispatcher
            .plan(&table, &map, OutputPolicy::Fastq, &BTreeSet::new())
            .unwrap_err();
        assert_matches!(err, GeodlError::UnmappedAccession(ref key) if key == "GSM2");
    }

    #[test]
    fn colliding_output_names_are_rejected() {
        let table = table("sample_alias\tfastq_ftp\nGSM1\tftp://h/a.fq.gz\nGSM2\tftp://h/b.fq.gz\n");
        let map = AccessionMap::explicit([("GSM1", "liver"), ("GSM2", "liver")]);
        let templates = templates();
        let tool = RecordingTool::default();
        let err = Dispatcher::new(&templates, &tool)
            .plan(&table, &map, OutputPolicy::Fastq, &BTreeSet::new())
            .unwrap_err();
        assert_matches!(err, GeodlError::DuplicateSampleName { ref name, .. } if name == "liver");
    }

    #[test]
    fn archive_policy_renames_prefetch_output() {
        let records = vec![RunRecord {
            line: 1,
            key: "SRR1".to_string(),
            urls: Vec::new(),
            run_accession: Some("SRR1".to_string()),
            sample_title: Some("liver".to_string()),
        }];
        let table = MetadataTable::new("PRJNA1", "run_accession", records).unwrap();
        let map = AccessionMap::explicit([("SRR1", "liver")]);
        let templates = templates();
        let tool = RecordingTool::default();
        let plan = Dispatcher::new(&templates, &tool)
            .plan(&table, &map, OutputPolicy::Archive, &BTreeSet::new())
            .unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].output, "liver.sra");
        assert_eq!(plan[0].command.to_string(), "prefetch -v -X 100GB SRR1");
        assert_eq!(
            plan[0].rename,
            Some(Rename {
                from: Utf8PathBuf::from("SRR1/SRR1.sra"),
                to: Utf8PathBuf::from("liver.sra"),
            })
        );
    }

    #[test]
    fn failed_transfer_does_not_stop_the_mate() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let table = table("sample_alias\tfastq_ftp\nS\tftp://h/1.fq.gz;ftp://h/2.fq.gz\n");
        let templates = templates();
        let tool = RecordingTool {
            calls: RefCell::new(Vec::new()),
            fail_outputs: vec!["S_R1.fq.gz".to_string()],
        };
        let dispatcher = Dispatcher::new(&templates, &tool);
        let plan = dispatcher
            .plan(&table, &AccessionMap::Identity, OutputPolicy::Fastq, &BTreeSet::new())
            .unwrap();
        let options = DispatchOptions {
            dry_run: false,
            output_dir: dir.clone(),
            log_file: dir.join("geoDL.logs"),
            label: "meta.tsv".to_string(),
        };
        let report = dispatcher.execute(&plan, &options).unwrap();

        assert_eq!(tool.calls.borrow().len(), 2);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.transfers[0].exit_code, Some(1));
        assert_eq!(report.transfers[1].status, TransferStatus::Done);

        let log = std::fs::read_to_string(dir.join("geoDL.logs")).unwrap();
        assert!(log.contains("S --> S"));
        assert!(log.contains("FAILED (exit 1): wget ftp://h/1.fq.gz -nH -O S_R1.fq.gz"));
        assert!(log.contains("wget ftp://h/2.fq.gz -nH -O S_R2.fq.gz"));
    }

    #[test]
    fn dry_run_touches_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().join("out")).unwrap();
        let table = table("sample_alias\tfastq_ftp\nSampleA\tftp://host/fileA.fastq.gz\n");
        let templates = templates();
        let tool = RecordingTool::default();
        let dispatcher = Dispatcher::new(&templates, &tool);
        let plan = dispatcher
            .plan(&table, &AccessionMap::Identity, OutputPolicy::Fastq, &BTreeSet::new())
            .unwrap();
        let options = DispatchOptions {
            dry_run: true,
            output_dir: dir.clone(),
            log_file: dir.join("geoDL.logs"),
            ..DispatchOptions::default()
        };
        let report = dispatcher.execute(&plan, &options).unwrap();

        assert!(tool.calls.borrow().is_empty());
        assert!(!dir.exists());
        assert_eq!(
            report.command_listing(),
            "wget ftp://host/fileA.fastq.gz -nH -O SampleA.fq.gz\n"
        );
    }
}
