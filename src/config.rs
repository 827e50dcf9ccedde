use std::fs;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{RetrievalMode, TransferKind};
use crate::error::GeodlError;

pub const DEFAULT_CONFIG_FILE: &str = "geodl.json";
pub const DEFAULT_LOG_FILE: &str = "geoDL.logs";
pub const DEFAULT_URL_COLUMN: &str = "fastq_ftp";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default)]
    pub url_column: Option<String>,
    #[serde(default)]
    pub name_column: Option<String>,
    #[serde(default)]
    pub tools: ToolsEntry,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ToolsEntry {
    #[serde(default)]
    pub transfer: Option<TransferKind>,
    #[serde(default)]
    pub wget: Option<String>,
    #[serde(default)]
    pub ascp: Option<String>,
    #[serde(default)]
    pub aspera_key: Option<String>,
    #[serde(default)]
    pub prefetch: Option<String>,
}

/// Command line values that win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output_dir: Option<String>,
    pub log_file: Option<String>,
    pub url_column: Option<String>,
    pub name_column: Option<String>,
    pub transfer: Option<TransferKind>,
    pub ascp: Option<String>,
    pub aspera_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub wget: String,
    pub ascp: String,
    pub aspera_key: Utf8PathBuf,
    pub prefetch: String,
}

impl ToolPaths {
    /// Makes relative tool and key paths absolute against `base`, since the
    /// tools run inside the output directory. Bare program names are left for
    /// `PATH` lookup.
    pub fn anchored(self, base: &Utf8Path) -> Self {
        let program = |value: String| {
            let path = Utf8Path::new(&value);
            if path.is_relative() && path.components().count() > 1 {
                base.join(path).into_string()
            } else {
                value
            }
        };
        let aspera_key = if self.aspera_key.is_relative() {
            base.join(&self.aspera_key)
        } else {
            self.aspera_key
        };
        Self {
            wget: program(self.wget),
            ascp: program(self.ascp),
            aspera_key,
            prefetch: program(self.prefetch),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub output_dir: Utf8PathBuf,
    pub log_file: Utf8PathBuf,
    pub url_column: String,
    /// `None` means the mode's default naming column.
    pub name_column: Option<String>,
    pub transfer: TransferKind,
    pub tools: ToolPaths,
}

impl ResolvedConfig {
    pub fn name_column_for(&self, mode: RetrievalMode) -> String {
        self.name_column
            .clone()
            .unwrap_or_else(|| mode.default_name_column().to_string())
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default(), ConfigOverrides::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, GeodlError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| GeodlError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| GeodlError::ConfigParse(err.to_string()))?
        };

        let mut resolved = Self::resolve_config(config, overrides);
        resolved.tools = resolved.tools.anchored(&working_dir()?);
        Ok(resolved)
    }

    pub fn resolve_config(config: Config, overrides: ConfigOverrides) -> ResolvedConfig {
        let tools = config.tools;
        let aspera_key = overrides
            .aspera_key
            .or(tools.aspera_key)
            .map(Utf8PathBuf::from)
            .unwrap_or_else(default_aspera_key);

        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            output_dir: Utf8PathBuf::from(
                overrides
                    .output_dir
                    .or(config.output_dir)
                    .unwrap_or_else(|| ".".to_string()),
            ),
            log_file: Utf8PathBuf::from(
                overrides
                    .log_file
                    .or(config.log_file)
                    .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()),
            ),
            url_column: overrides
                .url_column
                .or(config.url_column)
                .unwrap_or_else(|| DEFAULT_URL_COLUMN.to_string()),
            name_column: overrides.name_column.or(config.name_column),
            transfer: overrides
                .transfer
                .or(tools.transfer)
                .unwrap_or(TransferKind::Wget),
            tools: ToolPaths {
                wget: tools.wget.unwrap_or_else(|| "wget".to_string()),
                ascp: overrides
                    .ascp
                    .or(tools.ascp)
                    .unwrap_or_else(|| "ascp".to_string()),
                aspera_key,
                prefetch: tools.prefetch.unwrap_or_else(|| "prefetch".to_string()),
            },
        }
    }
}

fn working_dir() -> Result<Utf8PathBuf, GeodlError> {
    let cwd = std::env::current_dir().map_err(|err| GeodlError::Filesystem(err.to_string()))?;
    Utf8PathBuf::from_path_buf(cwd).map_err(|path| {
        GeodlError::Filesystem(format!("working directory is not UTF-8: {}", path.display()))
    })
}

/// Key file shipped with the Aspera Connect client.
pub fn default_aspera_key() -> Utf8PathBuf {
    let relative = ".aspera/connect/etc/asperaweb_id_dsa.openssh";
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().join(relative)).ok())
        .unwrap_or_else(|| Utf8PathBuf::from(relative))
}
