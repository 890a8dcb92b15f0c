use serde::{Deserialize, Serialize};

/// Register a table with the catalog, or refresh its partitions if it is already registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTableRequest {
    pub database: String,
    pub table: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partition_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_extractor: Option<String>,
    #[serde(default)]
    pub assume_date_partitioning: bool,
}

impl SyncTableRequest {
    pub fn new(
        database: impl Into<String>,
        table: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            location: location.into(),
            partition_fields: Vec::new(),
            partition_extractor: None,
            assume_date_partitioning: false,
        }
    }

    pub fn with_partition_fields(mut self, fields: impl IntoIterator<Item = String>) -> Self {
        self.partition_fields = fields.into_iter().collect();
        self
    }

    pub fn with_partition_extractor(mut self, extractor: impl Into<String>) -> Self {
        self.partition_extractor = Some(extractor.into());
        self
    }

    pub fn with_assume_date_partitioning(mut self, assume: bool) -> Self {
        self.assume_date_partitioning = assume;
        self
    }

    /// `databases/{database}/tables/{table}/sync`, relative to the catalog endpoint.
    pub(crate) fn path_segments(&self) -> [&str; 5] {
        ["databases", &self.database, "tables", &self.table, "sync"]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTableResponse {
    /// Whether the catalog now reflects the table
    pub synced: bool,
    /// True when the table was registered by this call rather than refreshed
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub partitions_added: u64,
}
