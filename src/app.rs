use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::accession::{self, AccessionMap};
use crate::catalog::CatalogClient;
use crate::config::ResolvedConfig;
use crate::dispatch::{DispatchOptions, DispatchReport, Dispatcher, OutputPolicy};
use crate::domain::{GeoSeriesAccession, RetrievalMode, StudyAccession};
use crate::error::GeodlError;
use crate::metadata::{Columns, ENA_REPORT_FIELDS, MetadataTable};
use crate::transfer::{CommandTemplates, TransferTool};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    /// Sample keys to download; empty means all.
    pub samples: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mode: RetrievalMode,
    pub input: String,
    pub source: String,
    pub records: usize,
    pub report: DispatchReport,
}

/// Metadata table and name map produced by one workflow's catalog stage.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub table: MetadataTable,
    pub map: AccessionMap,
}

#[derive(Debug, Clone, Copy)]
pub enum Phase {
    Resolve,
    Metadata,
    Dispatch,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Resolve => "Resolve",
            Phase::Metadata => "Metadata",
            Phase::Dispatch => "Dispatch",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, phase: Phase, message: impl AsRef<str>) {
    sink.event(ProgressEvent {
        message: format!("phase={}; {}", phase.label(), message.as_ref()),
        elapsed: None,
    });
}

pub struct App<C: CatalogClient, T: TransferTool> {
    catalog: C,
    tool: T,
    config: ResolvedConfig,
}

impl<C: CatalogClient, T: TransferTool> App<C, T> {
    pub fn new(catalog: C, tool: T, config: ResolvedConfig) -> Self {
        Self {
            catalog,
            tool,
            config,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn tool(&self) -> &T {
        &self.tool
    }

    pub fn run(
        &self,
        mode: RetrievalMode,
        input: &str,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, GeodlError> {
        let prepared = self.prepare(mode, input, sink)?;
        let templates = CommandTemplates::new(self.config.transfer, self.config.tools.clone());
        let dispatcher = Dispatcher::new(&templates, &self.tool);

        emit(
            sink,
            Phase::Dispatch,
            format!("planning {} records", prepared.table.len()),
        );
        let planned = dispatcher.plan(
            &prepared.table,
            &prepared.map,
            OutputPolicy::for_mode(mode),
            &options.samples,
        )?;
        if planned.is_empty() {
            tracing::warn!("no records selected for download");
        }

        let dispatch_options = DispatchOptions {
            dry_run: options.dry_run,
            output_dir: self.config.output_dir.clone(),
            log_file: self.config.log_file.clone(),
            label: input.to_string(),
        };
        let start = Instant::now();
        let report = dispatcher.execute(&planned, &dispatch_options)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Dispatch; {} transfers, {} failed",
                report.transfers.len(),
                report.failures().count()
            ),
            elapsed: Some(start.elapsed()),
        });

        Ok(RunSummary {
            mode,
            input: input.to_string(),
            source: prepared.table.source().to_string(),
            records: prepared.table.len(),
            report,
        })
    }

    pub fn prepare(
        &self,
        mode: RetrievalMode,
        input: &str,
        sink: &dyn ProgressSink,
    ) -> Result<Prepared, GeodlError> {
        match mode {
            RetrievalMode::Geo => self.prepare_geo(&input.parse()?, sink),
            RetrievalMode::Ena => self.prepare_ena(&input.parse()?, sink),
            RetrievalMode::Meta => self.prepare_meta(input, sink),
            RetrievalMode::Prefetch => self.prepare_prefetch(&input.parse()?, sink),
        }
    }

    pub fn prepare_geo(
        &self,
        accession: &GeoSeriesAccession,
        sink: &dyn ProgressSink,
    ) -> Result<Prepared, GeodlError> {
        emit(sink, Phase::Resolve, format!("reading GEO samples of {accession}"));
        let map = accession::geo_sample_map(&self.catalog, accession.as_str())?;

        emit(sink, Phase::Resolve, "looking up the ENA study");
        let xml = self.catalog.fetch_ena_study_search(accession.as_str())?;
        let study = accession::resolve_ena_study(&xml, accession.as_str())?;
        tracing::info!(%study, "GEO series maps to ENA study");

        let table = self.fetch_ena_table(&study, RetrievalMode::Geo, sink)?;
        Ok(Prepared { table, map })
    }

    pub fn prepare_ena(
        &self,
        accession: &StudyAccession,
        sink: &dyn ProgressSink,
    ) -> Result<Prepared, GeodlError> {
        let table = self.fetch_ena_table(accession.as_str(), RetrievalMode::Ena, sink)?;
        Ok(Prepared {
            table,
            map: AccessionMap::Identity,
        })
    }

    pub fn prepare_meta(&self, path: &str, sink: &dyn ProgressSink) -> Result<Prepared, GeodlError> {
        emit(sink, Phase::Metadata, format!("using metadata file {path}"));
        let table = MetadataTable::from_path(
            &Utf8PathBuf::from(path),
            &self.columns(RetrievalMode::Meta),
        )?;
        Ok(Prepared {
            table,
            map: AccessionMap::Identity,
        })
    }

    pub fn prepare_prefetch(
        &self,
        accession: &GeoSeriesAccession,
        sink: &dyn ProgressSink,
    ) -> Result<Prepared, GeodlError> {
        emit(
            sink,
            Phase::Resolve,
            format!("resolving sequence archive runs of {accession}"),
        );
        let (table, map) = accession::prefetch_catalog(&self.catalog, accession.as_str())?;
        emit(sink, Phase::Metadata, format!("{} runs found", table.len()));
        Ok(Prepared { table, map })
    }

    fn fetch_ena_table(
        &self,
        study: &str,
        mode: RetrievalMode,
        sink: &dyn ProgressSink,
    ) -> Result<MetadataTable, GeodlError> {
        emit(sink, Phase::Metadata, format!("fetching ENA file report for {study}"));
        let text = self.catalog.fetch_ena_file_report(study, ENA_REPORT_FIELDS)?;
        let source = format!("ENA file report {study}");
        let table = MetadataTable::parse(text.as_bytes(), &source, &self.columns(mode))?;
        emit(sink, Phase::Metadata, format!("{} runs in file report", table.len()));
        Ok(table)
    }

    fn columns(&self, mode: RetrievalMode) -> Columns {
        Columns {
            url: self.config.url_column.clone(),
            name: self.config.name_column_for(mode),
        }
    }
}
