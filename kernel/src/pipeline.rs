//! The record pipeline: turns input rows into [`CanonicalRecord`]s.
//!
//! Every row goes through three steps, in order:
//!
//! 1. conversion to the canonical payload schema (arity, declared types and nullability),
//! 2. extraction of the ordering value from the precombine field,
//! 3. extraction of `(record key, partition path)` through the configured [`KeyGenerator`].
//!
//! A row that fails any step fails the whole call; no partial record set is ever produced. The
//! pipeline holds no mutable state, so an [`Engine`](crate::Engine) may run it over disjoint
//! chunks of rows in parallel through its [`RowProcessor`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::keygen::KeyGenerator;
use crate::options::{PayloadKind, ResolvedOptions};
use crate::record::{CanonicalRecord, CanonicalSchema, OrderingValue, Payload, RecordKey};
use crate::schema::{DataType, PrimitiveType, StructType};
use crate::value::{get_nested_field, Row, Scalar};
use crate::{Error, TableResult};

/// Converts rows into canonical records for one write.
#[derive(Debug)]
pub struct RecordPipeline {
    schema: Arc<CanonicalSchema>,
    precombine_field: String,
    key_generator: Arc<dyn KeyGenerator>,
}

impl RecordPipeline {
    /// Build a pipeline, checking up front that the precombine field and every field the key
    /// generator reads exist in the schema.
    pub fn try_new(
        schema: Arc<CanonicalSchema>,
        options: &ResolvedOptions,
        key_generator: Arc<dyn KeyGenerator>,
    ) -> TableResult<Self> {
        let precombine_field = options.precombine_field()?.trim().to_string();
        let Some((_, field)) = schema.schema.resolve_path(&precombine_field) else {
            return Err(Error::configuration(format!(
                "Precombine field '{precombine_field}' does not exist in the record schema"
            )));
        };
        if !is_orderable(field.data_type()) {
            return Err(Error::configuration(format!(
                "Precombine field '{precombine_field}' has type {} which cannot be ordered",
                field.data_type()
            )));
        }
        key_generator.validate(&schema.schema)?;
        Ok(Self {
            schema,
            precombine_field,
            key_generator,
        })
    }

    pub fn schema(&self) -> &Arc<CanonicalSchema> {
        &self.schema
    }

    /// Check a row against the canonical schema and wrap its values as a [`Payload`].
    pub fn convert_row(&self, row: Row) -> TableResult<Payload> {
        check_struct(&self.schema.schema, &row.values, "")?;
        Ok(Payload::new(row.values))
    }

    /// Run all three pipeline steps over one row.
    pub fn process_row(&self, row: Row) -> TableResult<CanonicalRecord> {
        let payload = self.convert_row(row)?;
        let schema = &self.schema.schema;
        let ordering_value = get_nested_field(schema, payload.values(), &self.precombine_field)
            .cloned()
            .ok_or_else(|| {
                Error::configuration(format!(
                    "Precombine field '{}' does not exist in the record schema",
                    self.precombine_field
                ))
            })?;
        let key = self.key_generator.extract_key(schema, payload.values())?;
        if ordering_value.is_null() {
            return Err(Error::schema_conversion(format!(
                "Precombine field '{}' is null for record '{key}' in {}",
                self.precombine_field,
                self.schema.full_name()
            )));
        }
        let ordering_value = OrderingValue::new(ordering_value);
        trace!(%key, "converted row");
        Ok(CanonicalRecord {
            key,
            ordering_value,
            payload,
        })
    }

    /// Process rows in order, stopping at the first failure.
    pub fn process_rows(&self, rows: Vec<Row>) -> TableResult<Vec<CanonicalRecord>> {
        rows.into_iter().map(|row| self.process_row(row)).collect()
    }
}

/// Types whose values [`OrderingValue::try_cmp`] can compare.
fn is_orderable(data_type: &DataType) -> bool {
    !matches!(
        data_type,
        DataType::Struct(_) | DataType::Primitive(PrimitiveType::Binary)
    )
}

fn check_struct(schema: &StructType, values: &[Scalar], prefix: &str) -> TableResult<()> {
    if values.len() != schema.num_fields() {
        return Err(Error::schema_conversion(format!(
            "Expected {} values for {}, got {}",
            schema.num_fields(),
            if prefix.is_empty() { "record" } else { prefix },
            values.len()
        )));
    }
    for (field, value) in schema.fields().zip(values) {
        let path = if prefix.is_empty() {
            field.name().clone()
        } else {
            format!("{prefix}.{}", field.name())
        };
        match (value, field.data_type()) {
            (Scalar::Null, _) if !field.is_nullable() => {
                return Err(Error::schema_conversion(format!(
                    "Field '{path}' is not nullable but the value is null"
                )));
            }
            (Scalar::Null, _) => {}
            (Scalar::Struct(children), DataType::Struct(child_schema)) => {
                check_struct(child_schema, children, &path)?
            }
            (value, data_type) if !value.matches_type(data_type) => {
                return Err(Error::schema_conversion(format!(
                    "Field '{path}' has type {data_type} but the value is {value}"
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Merge records that share a [`RecordKey`], keeping one record per key.
///
/// The surviving records keep the order in which their keys were first seen. With
/// [`PayloadKind::OverwriteWithLatest`] the record with the greatest ordering value wins and the
/// first one seen wins ties. Ordering values that cannot be compared fail the call.
pub fn combine_records(
    records: Vec<CanonicalRecord>,
    kind: PayloadKind,
) -> TableResult<Vec<CanonicalRecord>> {
    let input = records.len();
    let mut positions: HashMap<RecordKey, usize> = HashMap::with_capacity(input);
    let mut combined: Vec<CanonicalRecord> = Vec::with_capacity(input);
    for record in records {
        match positions.get(&record.key) {
            None => {
                positions.insert(record.key.clone(), combined.len());
                combined.push(record);
            }
            Some(&index) => {
                let current = &mut combined[index];
                match kind {
                    PayloadKind::OverwriteWithLatest => {
                        let ordering = record
                            .ordering_value
                            .try_cmp(&current.ordering_value)
                            .ok_or_else(|| {
                                Error::schema_conversion(format!(
                                    "Cannot compare ordering values {} and {} for record key '{}'",
                                    record.ordering_value.value(),
                                    current.ordering_value.value(),
                                    record.key
                                ))
                            })?;
                        if ordering == Ordering::Greater {
                            *current = record;
                        }
                    }
                }
            }
        }
    }
    debug!(input, output = combined.len(), "combined records by key");
    Ok(combined)
}

/// Runs a [`RecordPipeline`] over a batch of rows.
///
/// Implementations must return records in input order and fail if any row fails.
pub trait RowProcessor: Send + Sync {
    fn process(
        &self,
        pipeline: Arc<RecordPipeline>,
        rows: Vec<Row>,
    ) -> TableResult<Vec<CanonicalRecord>>;
}

/// Processes rows one after another on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialRowProcessor;

impl RowProcessor for SerialRowProcessor {
    fn process(
        &self,
        pipeline: Arc<RecordPipeline>,
        rows: Vec<Row>,
    ) -> TableResult<Vec<CanonicalRecord>> {
        pipeline.process_rows(rows)
    }
}
