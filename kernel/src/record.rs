//! Canonical keyed records, the unit handed to a transaction client.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::SchemaRef;
use crate::utils::require;
use crate::value::{struct_to_json, Scalar};
use crate::{Error, TableResult};

/// The `(record key, partition path)` pair that locates a record. Both parts are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    key: String,
    partition_path: String,
}

impl RecordKey {
    pub fn try_new(key: impl Into<String>, partition_path: impl Into<String>) -> TableResult<Self> {
        let key = key.into();
        let partition_path = partition_path.into();
        require!(
            !key.is_empty(),
            Error::invalid_record_key("record key must not be empty")
        );
        require!(
            !partition_path.is_empty(),
            Error::invalid_record_key(format!("partition path for key '{key}' must not be empty"))
        );
        Ok(Self {
            key,
            partition_path,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn partition_path(&self) -> &str {
        &self.partition_path
    }
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.key, self.partition_path)
    }
}

/// The value of the precombine field. Decides which record wins among records sharing a key.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderingValue(Scalar);

impl OrderingValue {
    pub fn new(value: Scalar) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &Scalar {
        &self.0
    }

    /// Compare two ordering values. Only non-null values of the same primitive type are
    /// comparable; everything else yields `None`.
    pub fn try_cmp(&self, other: &OrderingValue) -> Option<Ordering> {
        self.0.partial_cmp_same_type(&other.0)
    }
}

/// The record schema handed to a transaction client. Derived from the batch schema and the table
/// name; `name` and `namespace` are how the schema is registered with the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSchema {
    pub name: String,
    pub namespace: String,
    pub schema: SchemaRef,
}

impl CanonicalSchema {
    pub fn try_new(table_name: &str, schema: SchemaRef) -> TableResult<Self> {
        let table_name = table_name.trim();
        require!(
            !table_name.is_empty(),
            Error::schema_conversion("table name must not be empty")
        );
        require!(
            schema.num_fields() > 0,
            Error::schema_conversion("record schema must have at least one field")
        );
        Ok(Self {
            name: format!("snaptable_{table_name}_record"),
            namespace: format!("snaptable.{table_name}"),
            schema,
        })
    }

    /// `namespace.name`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

/// Row values that conform to a [`CanonicalSchema`].
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    values: Vec<Scalar>,
}

impl Payload {
    pub(crate) fn new(values: Vec<Scalar>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    /// Encode as a json object keyed by field name.
    pub fn to_json(&self, schema: &CanonicalSchema) -> TableResult<Value> {
        struct_to_json(&schema.schema, &self.values)
    }
}

/// One converted row.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub key: RecordKey,
    pub ordering_value: OrderingValue,
    pub payload: Payload,
}

impl CanonicalRecord {
    pub fn record_key(&self) -> &str {
        self.key.key()
    }

    pub fn partition_path(&self) -> &str {
        self.key.partition_path()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::schema::{DataType, StructField, StructType};

    #[test]
    fn record_key_rejects_empty_parts() {
        assert!(matches!(
            RecordKey::try_new("", "2024/01/01"),
            Err(Error::InvalidRecordKey(_))
        ));
        assert!(matches!(
            RecordKey::try_new("k1", ""),
            Err(Error::InvalidRecordKey(_))
        ));
        let key = RecordKey::try_new("k1", "2024/01/01").unwrap();
        assert_eq!(key.to_string(), "k1@2024/01/01");
    }

    #[test]
    fn canonical_schema_names() {
        let schema = Arc::new(StructType::new_unchecked([StructField::nullable(
            "id",
            DataType::STRING,
        )]));
        let canonical = CanonicalSchema::try_new("orders", schema).unwrap();
        assert_eq!(canonical.name, "snaptable_orders_record");
        assert_eq!(canonical.namespace, "snaptable.orders");
        assert_eq!(canonical.full_name(), "snaptable.orders.snaptable_orders_record");

        let empty = Arc::new(StructType::new_unchecked(Vec::<StructField>::new()));
        assert!(matches!(
            CanonicalSchema::try_new("orders", empty),
            Err(Error::SchemaConversion(_))
        ));
    }

    #[test]
    fn ordering_values() {
        let a = OrderingValue::new(Scalar::Long(5));
        let b = OrderingValue::new(Scalar::Long(7));
        assert_eq!(a.try_cmp(&b), Some(Ordering::Less));
        let s = OrderingValue::new(Scalar::from("7"));
        assert_eq!(a.try_cmp(&s), None);
    }
}
