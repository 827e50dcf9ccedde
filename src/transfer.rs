use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::config::ToolPaths;
use crate::domain::TransferKind;
use crate::error::GeodlError;

const ENA_FTP_HOST: &str = "ftp.sra.ebi.ac.uk";
const ENA_FASP_HOST: &str = "era-fasp@fasp.sra.ebi.ac.uk:";

/// One external tool call, kept verbatim for the run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl TransferCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for TransferCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Builds tool command lines from the configured tool paths.
#[derive(Debug, Clone)]
pub struct CommandTemplates {
    kind: TransferKind,
    tools: ToolPaths,
}

impl CommandTemplates {
    pub fn new(kind: TransferKind, tools: ToolPaths) -> Self {
        Self { kind, tools }
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    /// Command fetching one fastq url into `outfile`.
    pub fn file(&self, url: &str, outfile: &str) -> TransferCommand {
        match self.kind {
            TransferKind::Wget => TransferCommand::new(
                self.tools.wget.clone(),
                vec![
                    ftp_url(url),
                    "-nH".to_string(),
                    "-O".to_string(),
                    outfile.to_string(),
                ],
            ),
            TransferKind::Aspera => TransferCommand::new(
                self.tools.ascp.clone(),
                vec![
                    "-T".to_string(),
                    "--policy".to_string(),
                    "high".to_string(),
                    "-l".to_string(),
                    "10G".to_string(),
                    "-i".to_string(),
                    self.tools.aspera_key.to_string(),
                    "-P".to_string(),
                    "33001".to_string(),
                    fasp_url(url),
                    outfile.to_string(),
                ],
            ),
        }
    }

    /// SRA Toolkit download of a whole run.
    pub fn archive(&self, run_accession: &str) -> TransferCommand {
        let mut args = vec!["-v".to_string(), "-X".to_string(), "100GB".to_string()];
        if self.kind == TransferKind::Aspera {
            args.push("-t".to_string());
            args.push("fasp".to_string());
            args.push("-a".to_string());
            args.push(format!("{}|{}", self.tools.ascp, self.tools.aspera_key));
        }
        args.push(run_accession.to_string());
        TransferCommand::new(self.tools.prefetch.clone(), args)
    }

    /// Where `prefetch` leaves a run, relative to its working directory.
    pub fn archive_output(run_accession: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(run_accession).join(format!("{run_accession}.sra"))
    }
}

pub fn ftp_url(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("ftp://{url}")
    }
}

pub fn fasp_url(url: &str) -> String {
    let path = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    match path.strip_prefix(ENA_FTP_HOST) {
        Some(rest) => format!("{ENA_FASP_HOST}{rest}"),
        None => path.to_string(),
    }
}

/// Exit status of one tool call; `None` when killed by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
}

impl ExitStatus {
    pub fn success(self) -> bool {
        self.code == Some(0)
    }
}

pub trait TransferTool {
    /// Fails with `ToolNotFound` when `program` cannot be executed.
    fn ensure_available(&self, program: &str) -> Result<(), GeodlError>;
    fn run(&self, command: &TransferCommand, cwd: &Utf8Path) -> Result<ExitStatus, GeodlError>;
    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), GeodlError>;
}

#[derive(Debug, Clone, Default)]
pub struct SystemTransferTool;

impl SystemTransferTool {
    pub fn new() -> Self {
        Self
    }
}

impl TransferTool for SystemTransferTool {
    fn ensure_available(&self, program: &str) -> Result<(), GeodlError> {
        let path = program_path(program);
        let found = if path.components().count() > 1 {
            path.exists()
        } else {
            find_in_path(program).is_some()
        };
        if found {
            Ok(())
        } else {
            Err(GeodlError::ToolNotFound(program.to_string()))
        }
    }

    fn run(&self, command: &TransferCommand, cwd: &Utf8Path) -> Result<ExitStatus, GeodlError> {
        let status = Command::new(program_path(&command.program))
            .args(&command.args)
            .current_dir(cwd)
            .status()
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => GeodlError::ToolNotFound(command.program.clone()),
                _ => GeodlError::TransferFailed {
                    code: None,
                    command: format!("{command}: {err}"),
                },
            })?;
        Ok(ExitStatus {
            code: status.code(),
        })
    }

    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), GeodlError> {
        std::fs::rename(from, to)
            .map_err(|err| GeodlError::Filesystem(format!("rename {from} -> {to}: {err}")))?;
        if let Some(parent) = from.parent() {
            if !parent.as_str().is_empty() {
                if let Err(err) = std::fs::remove_dir(parent) {
                    tracing::debug!(dir = %parent, %err, "run directory left in place");
                }
            }
        }
        Ok(())
    }
}

/// Relative paths with a directory part are taken from the process working
/// directory, not from the directory the tool runs in.
fn program_path(program: &str) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() && path.components().count() > 1 {
        if let Ok(cwd) = std::env::current_dir() {
            return cwd.join(path);
        }
    }
    path.to_path_buf()
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
