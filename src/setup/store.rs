// =============================================================================
// Setup store — append-only table persisted as JSON and CSV
// =============================================================================
//
// Every append rewrites both files in full.  Each file is written to a `.tmp`
// sibling and renamed over the original so a crash never leaves a truncated
// table behind.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::recorder::SetupRecord;
use crate::error::StoreError;

pub struct SetupStore {
    json_path: PathBuf,
    csv_path: Option<PathBuf>,
    records: Vec<SetupRecord>,
}

impl SetupStore {
    /// Open the store at `json_path`, reading existing records if the file
    /// exists.  `csv_path`, when given, receives a CSV copy on every write.
    pub fn load(json_path: impl Into<PathBuf>, csv_path: Option<PathBuf>) -> Result<Self, StoreError> {
        let json_path = json_path.into();
        let records = if json_path.exists() {
            let content = std::fs::read_to_string(&json_path).map_err(|source| StoreError::Io {
                path: json_path.display().to_string(),
                source,
            })?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Vec::new()
        };

        info!(path = %json_path.display(), records = records.len(), "setup store loaded");
        Ok(Self {
            json_path,
            csv_path,
            records,
        })
    }

    /// Append `record` and rewrite the persisted table.
    ///
    /// On a write error the record stays in memory and the error is
    /// returned.
    pub fn append(&mut self, record: SetupRecord) -> Result<(), StoreError> {
        self.records.push(record);
        self.persist()
    }

    /// Rewrite the JSON and CSV files from the in-memory table.
    pub fn persist(&self) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(&self.records)?;
        write_atomic(&self.json_path, &json)?;

        if let Some(csv_path) = &self.csv_path {
            write_atomic(csv_path, &self.to_csv(csv_path)?)?;
        }

        debug!(path = %self.json_path.display(), records = self.records.len(), "setup store written");
        Ok(())
    }

    pub fn records(&self) -> &[SetupRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every field name appearing in any record, sorted.
    pub fn columns(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self.records.iter().flat_map(|r| r.keys()).collect();
        set.into_iter().collect()
    }

    fn to_csv(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        let header = self.columns();
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&header)?;
        for record in &self.records {
            writer.write_record(
                header
                    .iter()
                    .map(|field| record.get(field).map(ToString::to_string).unwrap_or_default()),
            )?;
        }
        writer.into_inner().map_err(|e| StoreError::Io {
            path: path.display().to_string(),
            source: e.into_error(),
        })
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let io_err = |p: &Path| {
        let path = p.display().to_string();
        move |source| StoreError::Io { path, source }
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);

    std::fs::write(&tmp_path, content).map_err(io_err(&tmp_path))?;
    std::fs::rename(&tmp_path, path).map_err(io_err(path))?;
    Ok(())
}
