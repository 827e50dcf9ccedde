use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use geodl::config::{Config, ConfigLoader, ConfigOverrides, ToolsEntry};
use geodl::domain::{RetrievalMode, TransferKind};
use geodl::error::GeodlError;

#[test]
fn config_file_values_are_used() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("geodl.json");
    std::fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "output_dir": "reads",
            "log_file": "reads/run.log",
            "name_column": "sample_title",
            "tools": { "transfer": "aspera", "ascp": "/opt/aspera/bin/ascp", "aspera_key": "/opt/aspera/key.openssh" }
        }"#,
    )
    .unwrap();

    let resolved =
        ConfigLoader::resolve(Some(path.to_str().unwrap()), ConfigOverrides::default()).unwrap();
    assert_eq!(resolved.output_dir, Utf8PathBuf::from("reads"));
    assert_eq!(resolved.log_file, Utf8PathBuf::from("reads/run.log"));
    assert_eq!(resolved.url_column, "fastq_ftp");
    assert_eq!(resolved.transfer, TransferKind::Aspera);
    assert_eq!(resolved.tools.ascp, "/opt/aspera/bin/ascp");
    assert_eq!(
        resolved.tools.aspera_key,
        Utf8PathBuf::from("/opt/aspera/key.openssh")
    );
    assert_eq!(resolved.name_column_for(RetrievalMode::Meta), "sample_title");
}

#[test]
fn overrides_win_over_config_file() {
    let config = Config {
        output_dir: Some("from-file".to_string()),
        tools: ToolsEntry {
            transfer: Some(TransferKind::Aspera),
            ..ToolsEntry::default()
        },
        ..Config::default()
    };
    let overrides = ConfigOverrides {
        output_dir: Some("from-cli".to_string()),
        transfer: Some(TransferKind::Wget),
        url_column: Some("submitted_ftp".to_string()),
        ..ConfigOverrides::default()
    };

    let resolved = ConfigLoader::resolve_config(config, overrides);
    assert_eq!(resolved.output_dir, Utf8PathBuf::from("from-cli"));
    assert_eq!(resolved.transfer, TransferKind::Wget);
    assert_eq!(resolved.url_column, "submitted_ftp");
    assert_eq!(resolved.name_column_for(RetrievalMode::Geo), "experiment_alias");
    assert_eq!(
        resolved.name_column_for(RetrievalMode::Prefetch),
        "run_accession"
    );
}

#[test]
fn explicit_missing_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(Some(path.to_str().unwrap()), ConfigOverrides::default())
        .unwrap_err();
    assert_matches!(err, GeodlError::ConfigRead(_));
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("geodl.json");
    std::fs::write(&path, "{ \"tools\": { \"transfer\": \"ftp\" } }").unwrap();
    let err = ConfigLoader::resolve(Some(path.to_str().unwrap()), ConfigOverrides::default())
        .unwrap_err();
    assert_matches!(err, GeodlError::ConfigParse(_));
}

#[test]
fn relative_tool_overrides_resolve_from_working_directory() {
    let overrides = ConfigOverrides {
        ascp: Some("aspera/bin/ascp".to_string()),
        aspera_key: Some("keys/asperaweb_id_dsa.openssh".to_string()),
        ..ConfigOverrides::default()
    };
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("geodl.json");
    std::fs::write(&path, "{}").unwrap();

    let resolved = ConfigLoader::resolve(Some(path.to_str().unwrap()), overrides).unwrap();
    let cwd = Utf8PathBuf::from_path_buf(std::env::current_dir().unwrap()).unwrap();
    assert_eq!(resolved.tools.ascp, cwd.join("aspera/bin/ascp").as_str());
    assert_eq!(
        resolved.tools.aspera_key,
        cwd.join("keys/asperaweb_id_dsa.openssh")
    );
    assert_eq!(resolved.tools.wget, "wget");
}
