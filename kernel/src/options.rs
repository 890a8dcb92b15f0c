//! Option resolution for read and write calls.
//!
//! Callers hand the kernel a flat `String -> String` map. [`resolve_options`] merges that map
//! with the fixed [`DEFAULT_OPTIONS`] table and returns a [`ResolvedOptions`] in which every
//! recognized key is present. Resolution is a pure function: the caller's map is never touched and
//! the result is immutable. Keys the kernel does not recognize are carried through verbatim, which
//! is how callers attach commit metadata (see [`ResolvedOptions::commit_metadata`]).

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display as StrumDisplay, EnumString};
use url::Url;

use crate::utils::require;
use crate::{try_parse_uri, Error, TableResult};

/// Location of the table. Required for every call.
pub const PATH_KEY: &str = "path";

pub const VIEW_TYPE_KEY: &str = "snaptable.datasource.view.type";
pub const BEGIN_INSTANTTIME_KEY: &str = "snaptable.datasource.read.begin.instanttime";
pub const END_INSTANTTIME_KEY: &str = "snaptable.datasource.read.end.instanttime";

pub const OPERATION_KEY: &str = "snaptable.datasource.write.operation";
pub const STORAGE_TYPE_KEY: &str = "snaptable.datasource.write.storage.type";
/// Name of the table. Required for writes.
pub const TABLE_NAME_KEY: &str = "snaptable.datasource.write.table.name";
pub const PRECOMBINE_FIELD_KEY: &str = "snaptable.datasource.write.precombine.field";
pub const PAYLOAD_KIND_KEY: &str = "snaptable.datasource.write.payload.kind";
pub const RECORDKEY_FIELD_KEY: &str = "snaptable.datasource.write.recordkey.field";
pub const PARTITIONPATH_FIELD_KEY: &str = "snaptable.datasource.write.partitionpath.field";
pub const KEYGENERATOR_KEY: &str = "snaptable.datasource.write.keygenerator";
pub const COMMIT_METADATA_KEYPREFIX_KEY: &str = "snaptable.datasource.write.commitmeta.key.prefix";
pub const COMBINE_BEFORE_UPSERT_KEY: &str = "snaptable.datasource.write.combine.before.upsert";
pub const VERBOSE_ERRORS_KEY: &str = "snaptable.datasource.write.errors.verbose";

pub const CATALOG_SYNC_ENABLED_KEY: &str = "snaptable.datasource.catalog_sync.enable";
pub const CATALOG_SYNC_POLICY_KEY: &str = "snaptable.datasource.catalog_sync.policy";
pub const CATALOG_SYNC_DATABASE_KEY: &str = "snaptable.datasource.catalog_sync.database";
pub const CATALOG_SYNC_TABLE_KEY: &str = "snaptable.datasource.catalog_sync.table";
pub const CATALOG_SYNC_USERNAME_KEY: &str = "snaptable.datasource.catalog_sync.username";
pub const CATALOG_SYNC_PASSWORD_KEY: &str = "snaptable.datasource.catalog_sync.password";
pub const CATALOG_SYNC_URL_KEY: &str = "snaptable.datasource.catalog_sync.url";
pub const CATALOG_SYNC_PARTITION_FIELDS_KEY: &str =
    "snaptable.datasource.catalog_sync.partition_fields";
pub const CATALOG_SYNC_PARTITION_EXTRACTOR_KEY: &str =
    "snaptable.datasource.catalog_sync.partition_extractor";
pub const CATALOG_SYNC_ASSUME_DATE_PARTITION_KEY: &str =
    "snaptable.datasource.catalog_sync.assume_date_partitioning";

/// Defaults for every recognized key that has one. `path`, the table name and the incremental
/// read instants have no default.
pub const DEFAULT_OPTIONS: &[(&str, &str)] = &[
    (VIEW_TYPE_KEY, "read_optimized"),
    (OPERATION_KEY, "upsert"),
    (STORAGE_TYPE_KEY, "COPY_ON_WRITE"),
    (PRECOMBINE_FIELD_KEY, "ts"),
    (PAYLOAD_KIND_KEY, "overwrite_with_latest"),
    (RECORDKEY_FIELD_KEY, "uuid"),
    (PARTITIONPATH_FIELD_KEY, "partitionpath"),
    (KEYGENERATOR_KEY, "simple"),
    (COMMIT_METADATA_KEYPREFIX_KEY, "_"),
    (COMBINE_BEFORE_UPSERT_KEY, "true"),
    (VERBOSE_ERRORS_KEY, "false"),
    (CATALOG_SYNC_ENABLED_KEY, "false"),
    (CATALOG_SYNC_POLICY_KEY, "best_effort"),
    (CATALOG_SYNC_DATABASE_KEY, "default"),
    (CATALOG_SYNC_TABLE_KEY, "unknown"),
    (CATALOG_SYNC_USERNAME_KEY, "catalog"),
    (CATALOG_SYNC_PASSWORD_KEY, "catalog"),
    (CATALOG_SYNC_URL_KEY, "http://localhost:10000/"),
    (CATALOG_SYNC_PARTITION_FIELDS_KEY, ""),
    (CATALOG_SYNC_PARTITION_EXTRACTOR_KEY, "slash_encoded_day"),
    (CATALOG_SYNC_ASSUME_DATE_PARTITION_KEY, "false"),
];

/// Which keys must be supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionScope {
    /// Only `path` is required.
    Read,
    /// `path` and the table name are required.
    Write,
}

/// How a read relation exposes the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, StrumDisplay, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ViewType {
    /// Latest committed snapshot of the columnar base files
    ReadOptimized,
    /// Only the records changed within a range of instants
    Incremental,
    /// Base files merged with pending log files. Not served by the data source.
    Realtime,
}

/// The write operation handed to the transaction client.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, StrumDisplay, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Insert,
    Upsert,
    BulkInsert,
}

/// Physical storage layout of the table, recorded once at table initialization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumString, StrumDisplay, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageType {
    CopyOnWrite,
    MergeOnRead,
}

/// How records sharing a key are merged within a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, StrumDisplay, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PayloadKind {
    /// The record with the greatest ordering value wins.
    OverwriteWithLatest,
}

/// What a failed catalog publication does to the overall call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, StrumDisplay, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CatalogSyncPolicy {
    /// Log the failure and report it in the write status
    BestEffort,
    /// Fail the call with [`Error::CatalogSync`]. The commit itself stays durable.
    Strict,
}

/// A complete, immutable option set. Every key of [`DEFAULT_OPTIONS`] is present, along with
/// whatever else the caller supplied.
///
/// Equality compares the full key/value set, so two resolutions of the same input are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
    options: BTreeMap<String, String>,
}

/// Merge `raw` with [`DEFAULT_OPTIONS`]. Caller values win over defaults.
///
/// Fails with [`Error::Configuration`] if `path` is missing or blank, or if `scope` is
/// [`OptionScope::Write`] and the table name is missing or blank.
pub fn resolve_options(
    raw: &HashMap<String, String>,
    scope: OptionScope,
) -> TableResult<ResolvedOptions> {
    let mut options: BTreeMap<String, String> = DEFAULT_OPTIONS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    options.extend(raw.iter().map(|(k, v)| (k.clone(), v.clone())));
    let resolved = ResolvedOptions { options };

    require!(
        resolved.non_blank(PATH_KEY).is_some(),
        Error::configuration(format!("'{PATH_KEY}' must be set"))
    );
    if scope == OptionScope::Write {
        require!(
            resolved.non_blank(TABLE_NAME_KEY).is_some(),
            Error::configuration(format!("'{TABLE_NAME_KEY}' must be set"))
        );
    }
    Ok(resolved)
}

impl ResolvedOptions {
    /// Look up any option, recognized or not.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    fn non_blank(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> TableResult<&str> {
        self.non_blank(key)
            .ok_or_else(|| Error::configuration(format!("'{key}' must be set")))
    }

    fn parse<T: FromStr>(&self, key: &str) -> TableResult<T> {
        let value = self.required(key)?;
        value.trim().parse().map_err(|_| {
            Error::configuration(format!("Invalid value '{value}' for option '{key}'"))
        })
    }

    fn flag(&self, key: &str) -> TableResult<bool> {
        let value = self.required(key)?;
        match value.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(Error::configuration(format!(
                "Invalid value '{value}' for boolean option '{key}'"
            ))),
        }
    }

    /// Iterate over all options in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of options in the set.
    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// The raw `path` option as supplied by the caller.
    pub fn path(&self) -> TableResult<&str> {
        self.required(PATH_KEY)
    }

    /// The table location as a directory-like url.
    pub fn base_path(&self) -> TableResult<Url> {
        try_parse_uri(self.path()?)
    }

    pub fn table_name(&self) -> TableResult<&str> {
        self.required(TABLE_NAME_KEY)
    }

    pub fn view_type(&self) -> TableResult<ViewType> {
        self.parse(VIEW_TYPE_KEY)
    }

    pub fn begin_instant(&self) -> Option<&str> {
        self.non_blank(BEGIN_INSTANTTIME_KEY)
    }

    pub fn end_instant(&self) -> Option<&str> {
        self.non_blank(END_INSTANTTIME_KEY)
    }

    pub fn operation(&self) -> TableResult<OperationKind> {
        self.parse(OPERATION_KEY)
    }

    pub fn storage_type(&self) -> TableResult<StorageType> {
        self.parse(STORAGE_TYPE_KEY)
    }

    pub fn precombine_field(&self) -> TableResult<&str> {
        self.required(PRECOMBINE_FIELD_KEY)
    }

    pub fn payload_kind(&self) -> TableResult<PayloadKind> {
        self.parse(PAYLOAD_KIND_KEY)
    }

    pub fn record_key_field(&self) -> TableResult<&str> {
        self.required(RECORDKEY_FIELD_KEY)
    }

    pub fn partition_path_field(&self) -> TableResult<&str> {
        self.required(PARTITIONPATH_FIELD_KEY)
    }

    pub fn key_generator(&self) -> TableResult<&str> {
        self.required(KEYGENERATOR_KEY)
    }

    pub fn combine_before_upsert(&self) -> TableResult<bool> {
        self.flag(COMBINE_BEFORE_UPSERT_KEY)
    }

    pub fn verbose_errors(&self) -> TableResult<bool> {
        self.flag(VERBOSE_ERRORS_KEY)
    }

    pub fn catalog_sync_enabled(&self) -> TableResult<bool> {
        self.flag(CATALOG_SYNC_ENABLED_KEY)
    }

    pub fn catalog_sync_policy(&self) -> TableResult<CatalogSyncPolicy> {
        self.parse(CATALOG_SYNC_POLICY_KEY)
    }

    pub fn assume_date_partitioning(&self) -> TableResult<bool> {
        self.flag(CATALOG_SYNC_ASSUME_DATE_PARTITION_KEY)
    }

    /// The configured commit metadata prefix. An empty prefix disables metadata attachment.
    pub fn commit_metadata_prefix(&self) -> &str {
        self.get(COMMIT_METADATA_KEYPREFIX_KEY).unwrap_or_default()
    }

    /// Every option whose key starts with the commit metadata prefix, exactly as supplied.
    pub fn commit_metadata(&self) -> HashMap<String, String> {
        let prefix = self.commit_metadata_prefix();
        if prefix.is_empty() {
            return HashMap::new();
        }
        self.options
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a ResolvedOptions {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.options.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn every_default_is_filled_in() {
        let resolved = resolve_options(&raw(&[(PATH_KEY, "/t/orders")]), OptionScope::Read).unwrap();
        for (key, value) in DEFAULT_OPTIONS {
            assert_eq!(resolved.get(key), Some(*value), "missing default for {key}");
        }
        assert_eq!(resolved.len(), DEFAULT_OPTIONS.len() + 1);
    }

    #[test]
    fn caller_values_win_and_unknown_keys_survive() {
        let resolved = resolve_options(
            &raw(&[
                (PATH_KEY, "/t/orders"),
                (PRECOMBINE_FIELD_KEY, "updated_at"),
                ("_job", "nightly"),
            ]),
            OptionScope::Read,
        )
        .unwrap();
        assert_eq!(resolved.precombine_field().unwrap(), "updated_at");
        assert_eq!(resolved.get("_job"), Some("nightly"));
    }

    #[test]
    fn input_map_is_not_modified() {
        let input = raw(&[(PATH_KEY, "/t/orders")]);
        let before = input.clone();
        let _ = resolve_options(&input, OptionScope::Read).unwrap();
        assert_eq!(input, before);
    }

    #[test]
    fn missing_required_keys() {
        let err = resolve_options(&raw(&[]), OptionScope::Read).unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("'path'")));

        let err = resolve_options(&raw(&[(PATH_KEY, "  ")]), OptionScope::Read).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = resolve_options(&raw(&[(PATH_KEY, "/t/orders")]), OptionScope::Write)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains(TABLE_NAME_KEY)));

        let ok = resolve_options(
            &raw(&[(PATH_KEY, "/t/orders"), (TABLE_NAME_KEY, "orders")]),
            OptionScope::Write,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn resolution_is_deterministic() {
        let input = raw(&[(PATH_KEY, "/t/orders"), ("_a", "1"), ("_b", "2")]);
        let first = resolve_options(&input, OptionScope::Read).unwrap();
        let second = resolve_options(&input, OptionScope::Read).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn typed_accessors() {
        let resolved = resolve_options(
            &raw(&[
                (PATH_KEY, "memory:///t/orders"),
                (OPERATION_KEY, "BULK_INSERT"),
                (STORAGE_TYPE_KEY, "merge_on_read"),
                (VIEW_TYPE_KEY, "incremental"),
                (CATALOG_SYNC_POLICY_KEY, "strict"),
            ]),
            OptionScope::Read,
        )
        .unwrap();
        assert_eq!(resolved.operation().unwrap(), OperationKind::BulkInsert);
        assert_eq!(resolved.storage_type().unwrap(), StorageType::MergeOnRead);
        assert_eq!(resolved.view_type().unwrap(), ViewType::Incremental);
        assert_eq!(resolved.payload_kind().unwrap(), PayloadKind::OverwriteWithLatest);
        assert_eq!(
            resolved.catalog_sync_policy().unwrap(),
            CatalogSyncPolicy::Strict
        );
        assert!(resolved.combine_before_upsert().unwrap());
        assert!(!resolved.catalog_sync_enabled().unwrap());
        assert_eq!(resolved.base_path().unwrap().as_str(), "memory:///t/orders/");
    }

    #[test]
    fn invalid_enum_and_flag_values() {
        let resolved = resolve_options(
            &raw(&[
                (PATH_KEY, "/t/orders"),
                (OPERATION_KEY, "merge"),
                (CATALOG_SYNC_ENABLED_KEY, "yes"),
            ]),
            OptionScope::Read,
        )
        .unwrap();
        assert!(matches!(
            resolved.operation(),
            Err(Error::Configuration(msg)) if msg.contains("merge")
        ));
        assert!(matches!(
            resolved.catalog_sync_enabled(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn commit_metadata_uses_prefix() {
        let resolved = resolve_options(
            &raw(&[
                (PATH_KEY, "/t/orders"),
                ("_job", "nightly"),
                ("_run", "42"),
                ("job", "ignored"),
            ]),
            OptionScope::Read,
        )
        .unwrap();
        let metadata = resolved.commit_metadata();
        assert_eq!(
            metadata,
            raw(&[("_job", "nightly"), ("_run", "42")]),
            "only prefixed keys are attached"
        );

        let resolved = resolve_options(
            &raw(&[
                (PATH_KEY, "/t/orders"),
                (COMMIT_METADATA_KEYPREFIX_KEY, "meta."),
                ("_job", "nightly"),
            ]),
            OptionScope::Read,
        )
        .unwrap();
        assert!(resolved.commit_metadata().is_empty());

        let resolved = resolve_options(
            &raw(&[(PATH_KEY, "/t/orders"), (COMMIT_METADATA_KEYPREFIX_KEY, "")]),
            OptionScope::Read,
        )
        .unwrap();
        assert!(resolved.commit_metadata().is_empty());
    }
}
