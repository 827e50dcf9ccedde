use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::GeodlError;

/// Append-only diagnostic log of one dispatch phase.
///
/// The file is flushed and closed when the value is dropped, so every exit
/// path of the dispatcher leaves a complete log behind.
pub struct RunLog {
    path: Utf8PathBuf,
    writer: BufWriter<File>,
}

impl RunLog {
    pub fn open(path: &Utf8Path) -> Result<Self, GeodlError> {
        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| GeodlError::Filesystem(format!("create {parent}: {err}")))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| GeodlError::Filesystem(format!("open log {path}: {err}")))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn header(&mut self, input: &str) -> Result<(), GeodlError> {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        self.line(&format!("{input} download log {stamp}"))
    }

    pub fn mapping(&mut self, key: &str, name: &str) -> Result<(), GeodlError> {
        self.line(&format!("{key} --> {name}"))
    }

    pub fn command(&mut self, command: &str) -> Result<(), GeodlError> {
        self.line(command)
    }

    pub fn failure(&mut self, code: Option<i32>, command: &str) -> Result<(), GeodlError> {
        let code = code.map_or_else(|| "signal".to_string(), |code| code.to_string());
        self.line(&format!("FAILED (exit {code}): {command}"))
    }

    fn line(&mut self, text: &str) -> Result<(), GeodlError> {
        writeln!(self.writer, "{text}")
            .and_then(|_| self.writer.flush())
            .map_err(|err| GeodlError::Filesystem(format!("write log {}: {err}", self.path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_appends_across_opens() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("logs").join("geoDL.logs")).unwrap();

        {
            let mut log = RunLog::open(&path).unwrap();
            log.mapping("GSM1", "liver").unwrap();
            log.command("wget ftp://x -nH -O liver.fq.gz").unwrap();
        }
        {
            let mut log = RunLog::open(&path).unwrap();
            log.failure(Some(8), "wget ftp://y -nH -O heart.fq.gz").unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "GSM1 --> liver",
                "wget ftp://x -nH -O liver.fq.gz",
                "FAILED (exit 8): wget ftp://y -nH -O heart.fq.gz",
            ]
        );
    }
}
