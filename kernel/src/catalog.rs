//! Post-commit publication of table metadata to an external catalog.
//!
//! When catalog sync is enabled, a successful commit is followed by one
//! [`CatalogPublisher::sync_table`] call carrying a [`SyncDescriptor`] built from the resolved
//! options. The commit is already durable at that point; [`CatalogSyncPolicy`] decides whether a
//! failed publication is only reported ([`CatalogSyncPolicy::BestEffort`]) or fails the call
//! ([`CatalogSyncPolicy::Strict`]).

use std::fmt::{self, Debug, Formatter};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::options::{
    CatalogSyncPolicy, ResolvedOptions, CATALOG_SYNC_DATABASE_KEY, CATALOG_SYNC_PARTITION_EXTRACTOR_KEY,
    CATALOG_SYNC_PARTITION_FIELDS_KEY, CATALOG_SYNC_PASSWORD_KEY, CATALOG_SYNC_TABLE_KEY,
    CATALOG_SYNC_URL_KEY, CATALOG_SYNC_USERNAME_KEY,
};
use crate::{Error, TableResult};

/// Everything a catalog needs to register or refresh a table.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDescriptor {
    pub base_path: String,
    pub database: String,
    pub table: String,
    pub username: String,
    pub password: String,
    pub url: String,
    pub partition_fields: Vec<String>,
    pub partition_extractor: String,
    pub assume_date_partitioning: bool,
}

impl SyncDescriptor {
    pub fn from_options(options: &ResolvedOptions) -> TableResult<Self> {
        let field = |key: &str| -> TableResult<String> {
            options
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::configuration(format!("'{key}' must be set")))
        };
        let partition_fields = options
            .get(CATALOG_SYNC_PARTITION_FIELDS_KEY)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(String::from)
            .collect();
        Ok(Self {
            base_path: options.base_path()?.to_string(),
            database: field(CATALOG_SYNC_DATABASE_KEY)?,
            table: field(CATALOG_SYNC_TABLE_KEY)?,
            username: field(CATALOG_SYNC_USERNAME_KEY)?,
            password: options
                .get(CATALOG_SYNC_PASSWORD_KEY)
                .unwrap_or_default()
                .to_string(),
            url: field(CATALOG_SYNC_URL_KEY)?,
            partition_fields,
            partition_extractor: field(CATALOG_SYNC_PARTITION_EXTRACTOR_KEY)?,
            assume_date_partitioning: options.assume_date_partitioning()?,
        })
    }
}

impl Debug for SyncDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncDescriptor")
            .field("base_path", &self.base_path)
            .field("database", &self.database)
            .field("table", &self.table)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("url", &self.url)
            .field("partition_fields", &self.partition_fields)
            .field("partition_extractor", &self.partition_extractor)
            .field("assume_date_partitioning", &self.assume_date_partitioning)
            .finish()
    }
}

/// Publishes table metadata to a catalog.
pub trait CatalogPublisher: Send + Sync + Debug {
    /// Register or refresh the table. `Ok(false)` means the catalog declined the sync.
    fn sync_table(&self, descriptor: &SyncDescriptor) -> TableResult<bool>;
}

/// What happened to catalog publication for a committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSyncStatus {
    /// Sync was not enabled
    Disabled,
    Synced,
    /// Sync failed under [`CatalogSyncPolicy::BestEffort`]
    Failed(String),
}

/// Run one publication and apply `policy` to its result.
#[instrument(skip_all, fields(database = %descriptor.database, table = %descriptor.table))]
pub fn publish(
    publisher: &dyn CatalogPublisher,
    descriptor: &SyncDescriptor,
    policy: CatalogSyncPolicy,
) -> TableResult<CatalogSyncStatus> {
    let start = Instant::now();
    let failure = match publisher.sync_table(descriptor) {
        Ok(true) => {
            info!(elapsed = ?start.elapsed(), "synced table to catalog");
            return Ok(CatalogSyncStatus::Synced);
        }
        Ok(false) => "catalog declined the sync".to_string(),
        Err(e) => e.to_string(),
    };
    match policy {
        CatalogSyncPolicy::BestEffort => {
            warn!("catalog sync failed, continuing: {failure}");
            Ok(CatalogSyncStatus::Failed(failure))
        }
        CatalogSyncPolicy::Strict => Err(Error::catalog_sync(failure)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::options::{
        resolve_options, OptionScope, CATALOG_SYNC_ASSUME_DATE_PARTITION_KEY, PATH_KEY,
    };

    /// Records descriptors and answers with a fixed result.
    #[derive(Debug)]
    pub(crate) struct RecordingPublisher {
        pub(crate) calls: Mutex<Vec<SyncDescriptor>>,
        pub(crate) result: Result<bool, String>,
    }

    impl RecordingPublisher {
        pub(crate) fn new(result: Result<bool, String>) -> Self {
            Self {
                calls: Mutex::new(vec![]),
                result,
            }
        }
    }

    impl CatalogPublisher for RecordingPublisher {
        fn sync_table(&self, descriptor: &SyncDescriptor) -> TableResult<bool> {
            self.calls.lock().unwrap().push(descriptor.clone());
            self.result.clone().map_err(Error::catalog_sync)
        }
    }

    fn options(extra: &[(&str, &str)]) -> ResolvedOptions {
        let mut raw = HashMap::from([(PATH_KEY.to_string(), "memory:///t/orders".to_string())]);
        raw.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        resolve_options(&raw, OptionScope::Read).unwrap()
    }

    #[test]
    fn descriptor_from_options() {
        let descriptor = SyncDescriptor::from_options(&options(&[
            (CATALOG_SYNC_PARTITION_FIELDS_KEY, " year, month ,,day "),
            (CATALOG_SYNC_DATABASE_KEY, "sales"),
            (CATALOG_SYNC_PASSWORD_KEY, "hunter2"),
            (CATALOG_SYNC_ASSUME_DATE_PARTITION_KEY, "true"),
        ]))
        .unwrap();
        assert_eq!(descriptor.base_path, "memory:///t/orders/");
        assert_eq!(descriptor.partition_fields, vec!["year", "month", "day"]);
        assert_eq!(descriptor.database, "sales");
        assert_eq!(descriptor.table, "unknown");
        assert_eq!(descriptor.url, "http://localhost:10000/");
        assert_eq!(descriptor.partition_extractor, "slash_encoded_day");
        assert!(descriptor.assume_date_partitioning);

        let debug = format!("{descriptor:?}");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn empty_partition_field_list() {
        let descriptor = SyncDescriptor::from_options(&options(&[])).unwrap();
        assert!(descriptor.partition_fields.is_empty());
    }

    #[test]
    fn policies() {
        let descriptor = SyncDescriptor::from_options(&options(&[])).unwrap();

        let ok = RecordingPublisher::new(Ok(true));
        assert_eq!(
            publish(&ok, &descriptor, CatalogSyncPolicy::Strict).unwrap(),
            CatalogSyncStatus::Synced
        );
        assert_eq!(ok.calls.lock().unwrap().len(), 1);

        let failing = RecordingPublisher::new(Err("catalog down".to_string()));
        assert!(matches!(
            publish(&failing, &descriptor, CatalogSyncPolicy::BestEffort).unwrap(),
            CatalogSyncStatus::Failed(msg) if msg.contains("catalog down")
        ));
        assert!(matches!(
            publish(&failing, &descriptor, CatalogSyncPolicy::Strict),
            Err(Error::CatalogSync(_))
        ));

        let declining = RecordingPublisher::new(Ok(false));
        assert!(matches!(
            publish(&declining, &descriptor, CatalogSyncPolicy::BestEffort).unwrap(),
            CatalogSyncStatus::Failed(_)
        ));
    }
}
