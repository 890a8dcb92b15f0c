//! On-storage layout of a table and the operations that create, probe and destroy it.
//!
//! ```text
//! <base>/
//!   .snaptable/
//!     table.json                  table config, written once at initialization
//!     <txn>.inflight              marker for a started transaction
//!     <txn>.commit                a committed transaction
//!   <partition>/<fileId>_<txn>.jsonl
//! ```
//!
//! A table exists exactly when its `table.json` exists.

use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use url::Url;

use crate::mode::TableExistence;
use crate::options::StorageType;
use crate::transaction::TransactionId;
use crate::utils::{current_time_ms, ensure_trailing_slash, require};
use crate::{Error, StorageHandler, TableResult};

pub const METADATA_FOLDER: &str = ".snaptable";
pub const TABLE_CONFIG_FILE: &str = "table.json";
pub const DEFAULT_ARCHIVE_FOLDER: &str = "archived";
pub const INFLIGHT_SUFFIX: &str = ".inflight";
pub const COMMIT_SUFFIX: &str = ".commit";
/// Version of the layout described in the module docs.
pub const LAYOUT_VERSION: u32 = 1;

/// Contents of `table.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    pub name: String,
    pub storage_type: StorageType,
    pub archive_folder: String,
    pub layout_version: u32,
    pub created_time_ms: i64,
}

/// Resolves the locations of a table's files relative to its base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    base_path: Url,
}

impl TableLayout {
    pub fn new(base_path: Url) -> Self {
        Self {
            base_path: ensure_trailing_slash(base_path),
        }
    }

    pub fn base_path(&self) -> &Url {
        &self.base_path
    }

    pub fn metadata_dir(&self) -> TableResult<Url> {
        Ok(self.base_path.join(&format!("{METADATA_FOLDER}/"))?)
    }

    pub fn config_file(&self) -> TableResult<Url> {
        Ok(self.metadata_dir()?.join(TABLE_CONFIG_FILE)?)
    }

    pub fn inflight_file(&self, txn: &TransactionId) -> TableResult<Url> {
        Ok(self.metadata_dir()?.join(&format!("{txn}{INFLIGHT_SUFFIX}"))?)
    }

    pub fn commit_file(&self, txn: &TransactionId) -> TableResult<Url> {
        Ok(self.metadata_dir()?.join(&format!("{txn}{COMMIT_SUFFIX}"))?)
    }

    /// Directory of a partition. Partition paths are relative, `/`-separated and may not step
    /// outside the table or into its metadata folder.
    pub fn partition_dir(&self, partition_path: &str) -> TableResult<Url> {
        let segments: Vec<&str> = partition_path.split('/').collect();
        let valid = !partition_path.is_empty()
            && segments
                .iter()
                .all(|s| !s.is_empty() && *s != "." && *s != "..")
            && segments.first() != Some(&METADATA_FOLDER);
        require!(
            valid,
            Error::invalid_record_key(format!("Invalid partition path '{partition_path}'"))
        );
        let mut url = self.base_path.clone();
        url.path_segments_mut()
            .map_err(|_| Error::invalid_table_location(&self.base_path))?
            .pop_if_empty()
            .extend(segments)
            .push("");
        Ok(url)
    }

    /// `<partition>/<fileId>_<txn>.jsonl`
    pub fn data_file(
        &self,
        partition_path: &str,
        file_id: &str,
        txn: &TransactionId,
    ) -> TableResult<Url> {
        Ok(self
            .partition_dir(partition_path)?
            .join(&format!("{file_id}_{txn}.jsonl"))?)
    }
}

/// Read the table's existence state at its base path.
pub fn probe_existence(
    storage: &dyn StorageHandler,
    layout: &TableLayout,
) -> TableResult<TableExistence> {
    Ok(storage.exists(&layout.config_file()?)?.into())
}

/// Write fresh table metadata. Fails with [`Error::Precondition`] if a table config already
/// exists, so two concurrent initializations cannot both succeed.
#[instrument(skip_all, fields(base_path = %layout.base_path()))]
pub fn initialize_table(
    storage: &dyn StorageHandler,
    layout: &TableLayout,
    name: &str,
    storage_type: StorageType,
) -> TableResult<TableConfig> {
    let config = TableConfig {
        name: name.to_string(),
        storage_type,
        archive_folder: DEFAULT_ARCHIVE_FOLDER.to_string(),
        layout_version: LAYOUT_VERSION,
        created_time_ms: current_time_ms()?,
    };
    let data = Bytes::from(serde_json::to_vec(&config)?);
    match storage.put(&layout.config_file()?, data, false) {
        Ok(()) => {}
        Err(Error::FileAlreadyExists(_)) => {
            return Err(Error::precondition(format!(
                "Table already initialized at {}",
                layout.base_path()
            )))
        }
        Err(e) => return Err(e),
    }
    info!(table = name, %storage_type, "initialized table");
    Ok(config)
}

/// Remove every object under the table's base path, data and metadata alike. There is no backup
/// and nothing can be recovered afterwards.
#[instrument(skip_all, fields(base_path = %layout.base_path()))]
pub fn delete_table_recursively(
    storage: &dyn StorageHandler,
    layout: &TableLayout,
) -> TableResult<u64> {
    warn!("recursively deleting all table data");
    let start = Instant::now();
    let removed = storage.delete_recursive(layout.base_path())?;
    warn!(removed, elapsed = ?start.elapsed(), "deleted table");
    Ok(removed)
}

pub fn read_table_config(
    storage: &dyn StorageHandler,
    layout: &TableLayout,
) -> TableResult<TableConfig> {
    let location = layout.config_file()?;
    match storage.read(&location) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(Error::FileNotFound(_)) => Err(Error::precondition(format!(
            "No table at {}",
            layout.base_path()
        ))),
        Err(e) => Err(e),
    }
}

/// Ids of every committed transaction, oldest first.
pub fn committed_transactions(
    storage: &dyn StorageHandler,
    layout: &TableLayout,
) -> TableResult<Vec<TransactionId>> {
    let mut ids: Vec<TransactionId> = storage
        .list(&layout.metadata_dir()?)?
        .into_iter()
        .filter_map(|meta| {
            let name = meta.location.path_segments()?.last()?.to_string();
            name.strip_suffix(COMMIT_SUFFIX)
                .and_then(|id| TransactionId::try_parse(id).ok())
        })
        .collect();
    ids.sort();
    Ok(ids)
}
