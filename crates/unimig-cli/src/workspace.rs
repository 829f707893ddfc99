//! Files and stores shared by the subcommands.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use unimig_core::migration::MigrationError;
use unimig_core::{AnalysisError, MemorySource, SledTarget, SourceSnapshot, Vocabulary};

/// Command failures.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Engine(#[from] unimig_core::Error),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("{0}")]
    Usage(String),
}

/// Read a JSON document produced by an earlier subcommand.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a JSON document for a later subcommand.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CliError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, text).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "Wrote document");
    Ok(())
}

/// Load a source snapshot exported from the legacy database.
pub fn open_source(path: &Path) -> Result<MemorySource, CliError> {
    let snapshot: SourceSnapshot = read_json(path)?;
    debug!(
        path = %path.display(),
        source = %snapshot.name,
        tables = snapshot.tables.len(),
        "Loaded source snapshot"
    );
    Ok(MemorySource::from_snapshot(snapshot))
}

/// Open the EAV target store in `dir`.
pub fn open_target(dir: &Path) -> Result<(sled::Db, Arc<SledTarget>), CliError> {
    let db = sled::open(dir)?;
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "eav".to_string());
    let target = SledTarget::open(&db, name)?;
    Ok((db, Arc::new(target)))
}

/// Open the migration log store in `dir`.
pub fn open_log(dir: &Path) -> Result<sled::Db, CliError> {
    Ok(sled::open(dir)?)
}

/// The standard vocabulary, or a custom one from a JSON file.
pub fn load_vocabulary(path: Option<&Path>) -> Result<Vocabulary, CliError> {
    match path {
        Some(path) => read_json(path),
        None => Ok(Vocabulary::standard()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unimig_core::TargetConfig;

    #[test]
    fn test_json_round_trip_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("target.json");

        let config = TargetConfig::default().with_batch_size(250);
        write_json(&path, &config).unwrap();
        let back: TargetConfig = read_json(&path).unwrap();
        assert_eq!(back.batch_size, 250);
    }

    #[test]
    fn test_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = read_json::<TargetConfig>(&path).unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn test_open_target_uses_directory_name() {
        let dir = tempfile::tempdir().unwrap();
        let (_db, target) = open_target(&dir.path().join("warehouse")).unwrap();
        assert_eq!(unimig_core::TargetWriter::name(target.as_ref()), "warehouse");
    }
}
