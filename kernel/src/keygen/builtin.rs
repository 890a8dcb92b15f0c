//! The key generators every registry starts with.

use itertools::Itertools;

use super::{KeyGenerator, DEFAULT_PARTITION_PATH};
use crate::options::ResolvedOptions;
use crate::record::RecordKey;
use crate::schema::StructType;
use crate::value::{get_nested_field, Scalar};
use crate::{Error, TableResult};

const NULL_KEY_PLACEHOLDER: &str = "__null__";
const EMPTY_KEY_PLACEHOLDER: &str = "__empty__";

fn check_field(schema: &StructType, field: &str, role: &str) -> TableResult<()> {
    match schema.resolve_path(field) {
        Some(_) => Ok(()),
        None => Err(Error::configuration(format!(
            "{role} field '{field}' does not exist in the record schema"
        ))),
    }
}

fn lookup<'a>(schema: &StructType, values: &'a [Scalar], field: &str) -> TableResult<&'a Scalar> {
    get_nested_field(schema, values, field).ok_or_else(|| {
        Error::configuration(format!("Field '{field}' does not exist in the record schema"))
    })
}

/// Some non-empty string, or None for null and empty values.
fn non_empty(value: &Scalar) -> Option<String> {
    value.to_key_string().filter(|s| !s.is_empty())
}

fn split_fields(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(String::from)
        .collect()
}

fn simple_record_key(schema: &StructType, values: &[Scalar], field: &str) -> TableResult<String> {
    non_empty(lookup(schema, values, field)?).ok_or_else(|| {
        Error::invalid_record_key(format!(
            "record key field '{field}' is null or empty"
        ))
    })
}

/// Record key and partition path each come from a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleKeyGenerator {
    record_key_field: String,
    partition_path_field: String,
}

impl SimpleKeyGenerator {
    pub fn new(record_key_field: impl Into<String>, partition_path_field: impl Into<String>) -> Self {
        Self {
            record_key_field: record_key_field.into(),
            partition_path_field: partition_path_field.into(),
        }
    }

    pub fn try_from_options(options: &ResolvedOptions) -> TableResult<Self> {
        Ok(Self::new(
            options.record_key_field()?.trim(),
            options.partition_path_field()?.trim(),
        ))
    }
}

impl KeyGenerator for SimpleKeyGenerator {
    fn validate(&self, schema: &StructType) -> TableResult<()> {
        check_field(schema, &self.record_key_field, "Record key")?;
        check_field(schema, &self.partition_path_field, "Partition path")
    }

    fn extract_key(&self, schema: &StructType, values: &[Scalar]) -> TableResult<RecordKey> {
        let key = simple_record_key(schema, values, &self.record_key_field)?;
        let partition = non_empty(lookup(schema, values, &self.partition_path_field)?)
            .unwrap_or_else(|| DEFAULT_PARTITION_PATH.to_string());
        RecordKey::try_new(key, partition)
    }
}

/// Record key and partition path built from several fields each.
///
/// The record key is `f1:v1,f2:v2` and the partition path is the partition values joined with
/// `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexKeyGenerator {
    record_key_fields: Vec<String>,
    partition_path_fields: Vec<String>,
}

impl ComplexKeyGenerator {
    pub fn try_new(
        record_key_fields: Vec<String>,
        partition_path_fields: Vec<String>,
    ) -> TableResult<Self> {
        if record_key_fields.is_empty() {
            return Err(Error::configuration(
                "complex key generator needs at least one record key field",
            ));
        }
        Ok(Self {
            record_key_fields,
            partition_path_fields,
        })
    }

    pub fn try_from_options(options: &ResolvedOptions) -> TableResult<Self> {
        Self::try_new(
            split_fields(options.record_key_field()?),
            split_fields(options.partition_path_field()?),
        )
    }
}

impl KeyGenerator for ComplexKeyGenerator {
    fn validate(&self, schema: &StructType) -> TableResult<()> {
        for field in &self.record_key_fields {
            check_field(schema, field, "Record key")?;
        }
        for field in &self.partition_path_fields {
            check_field(schema, field, "Partition path")?;
        }
        Ok(())
    }

    fn extract_key(&self, schema: &StructType, values: &[Scalar]) -> TableResult<RecordKey> {
        let mut all_missing = true;
        let mut parts = Vec::with_capacity(self.record_key_fields.len());
        for field in &self.record_key_fields {
            let part = match lookup(schema, values, field)?.to_key_string() {
                None => NULL_KEY_PLACEHOLDER.to_string(),
                Some(s) if s.is_empty() => EMPTY_KEY_PLACEHOLDER.to_string(),
                Some(s) => {
                    all_missing = false;
                    s
                }
            };
            parts.push(format!("{field}:{part}"));
        }
        if all_missing {
            return Err(Error::invalid_record_key(format!(
                "all record key fields [{}] are null or empty",
                self.record_key_fields.join(", ")
            )));
        }

        let partition = if self.partition_path_fields.is_empty() {
            DEFAULT_PARTITION_PATH.to_string()
        } else {
            self.partition_path_fields
                .iter()
                .map(|field| -> TableResult<String> {
                    Ok(non_empty(lookup(schema, values, field)?)
                        .unwrap_or_else(|| DEFAULT_PARTITION_PATH.to_string()))
                })
                .process_results(|mut segments| segments.join("/"))?
        };
        RecordKey::try_new(parts.join(","), partition)
    }
}

/// Every record lands in the [`DEFAULT_PARTITION_PATH`] partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonPartitionedKeyGenerator {
    record_key_field: String,
}

impl NonPartitionedKeyGenerator {
    pub fn new(record_key_field: impl Into<String>) -> Self {
        Self {
            record_key_field: record_key_field.into(),
        }
    }

    pub fn try_from_options(options: &ResolvedOptions) -> TableResult<Self> {
        Ok(Self::new(options.record_key_field()?.trim()))
    }
}

impl KeyGenerator for NonPartitionedKeyGenerator {
    fn validate(&self, schema: &StructType) -> TableResult<()> {
        check_field(schema, &self.record_key_field, "Record key")
    }

    fn extract_key(&self, schema: &StructType, values: &[Scalar]) -> TableResult<RecordKey> {
        let key = simple_record_key(schema, values, &self.record_key_field)?;
        RecordKey::try_new(key, DEFAULT_PARTITION_PATH)
    }
}
