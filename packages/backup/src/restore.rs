//! Preparation of the engine init directory for restore-from-backup
//! instances.
//!
//! Both official images execute the contents of the init directory on
//! first start, before accepting external connections. Plain SQL dumps are
//! loaded by the entrypoint directly; postgres custom-format archives need
//! a `pg_restore` script next to them.

use std::path::{Path, PathBuf};

use common::EngineType;
use tokio::fs;

use crate::error::ImportError;
use crate::import::BackupSource;

pub const RESTORE_SCRIPT: &str = "10-restore.sh";

/// Artifact formats the init directory understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    PlainSql,
    GzippedSql,
    PostgresArchive,
}

impl DumpFormat {
    pub fn detect(file_name: &str, engine: EngineType) -> Result<Self, ImportError> {
        let lower = file_name.to_ascii_lowercase();
        let format = if lower.ends_with(".sql") {
            Self::PlainSql
        } else if lower.ends_with(".sql.gz") {
            Self::GzippedSql
        } else if engine == EngineType::Postgres {
            Self::PostgresArchive
        } else {
            return Err(ImportError::UnsupportedFormat {
                file: file_name.to_string(),
                engine,
            });
        };
        Ok(format)
    }

    fn target_name(&self) -> &'static str {
        match self {
            Self::PlainSql => "05-backup.sql",
            Self::GzippedSql => "05-backup.sql.gz",
            Self::PostgresArchive => "backup.dump",
        }
    }
}

/// Check that a backup location names an artifact `engine` can restore,
/// without fetching it.
pub fn restorable_format(location: &str, engine: EngineType) -> Result<DumpFormat, ImportError> {
    let source = BackupSource::parse(location)?;
    DumpFormat::detect(&source.file_name(), engine)
}

fn restore_script(archive: &Path) -> String {
    format!(
        "#!/bin/sh\nset -e\npg_restore --no-owner --no-privileges \
         -U \"$POSTGRES_USER\" -d \"$POSTGRES_DB\" \"{}\"\n",
        archive.display()
    )
}

/// Move a staged artifact into `init_dir` under the name the image expects,
/// adding the restore script for postgres archives. Returns the files
/// written, in execution order.
pub async fn prepare_init_dir(
    engine: EngineType,
    staged: &Path,
    init_dir: &Path,
) -> Result<Vec<PathBuf>, ImportError> {
    let file_name = staged
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let format = DumpFormat::detect(file_name, engine)?;

    fs::create_dir_all(init_dir).await?;
    let target = init_dir.join(format.target_name());
    if staged != target {
        fs::rename(staged, &target).await?;
    }

    let mut written = vec![target.clone()];
    if format == DumpFormat::PostgresArchive {
        let script = init_dir.join(RESTORE_SCRIPT);
        fs::write(&script, restore_script(&target)).await?;
        written.push(script);
    }
    Ok(written)
}
