//! Row-level values: [`Scalar`], [`Row`] and [`RowBatch`].

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, NaiveDate, TimeDelta};
use serde_json::{Map, Value};

use crate::schema::{DataType, PrimitiveType, SchemaRef, StructType};
use crate::utils::require;
use crate::{Error, TableResult};

/// A single value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    /// Days since the unix epoch
    Date(i32),
    /// Microseconds since the unix epoch, UTC
    Timestamp(i64),
    /// Field values in the order of the struct's schema
    Struct(Vec<Scalar>),
}

static NULL: Scalar = Scalar::Null;

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// The primitive type of this value, if it is a non-null primitive.
    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        let ty = match self {
            Scalar::Boolean(_) => PrimitiveType::Boolean,
            Scalar::Integer(_) => PrimitiveType::Integer,
            Scalar::Long(_) => PrimitiveType::Long,
            Scalar::Float(_) => PrimitiveType::Float,
            Scalar::Double(_) => PrimitiveType::Double,
            Scalar::String(_) => PrimitiveType::String,
            Scalar::Binary(_) => PrimitiveType::Binary,
            Scalar::Date(_) => PrimitiveType::Date,
            Scalar::Timestamp(_) => PrimitiveType::Timestamp,
            Scalar::Null | Scalar::Struct(_) => return None,
        };
        Some(ty)
    }

    /// Whether this value may be stored under `data_type`. Null matches every type; nullability is
    /// checked by the caller.
    pub fn matches_type(&self, data_type: &DataType) -> bool {
        match (self, data_type) {
            (Scalar::Null, _) => true,
            (Scalar::Struct(values), DataType::Struct(s)) => {
                values.len() == s.num_fields()
                    && values
                        .iter()
                        .zip(s.fields())
                        .all(|(v, f)| v.matches_type(f.data_type()))
            }
            (value, DataType::Primitive(p)) => value.primitive_type() == Some(*p),
            _ => false,
        }
    }

    /// Compare two values of the same primitive type. Values of different types, nulls, structs
    /// and binaries are not comparable.
    pub fn partial_cmp_same_type(&self, other: &Scalar) -> Option<Ordering> {
        use Scalar::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Integer(a), Integer(b)) => Some(a.cmp(b)),
            (Long(a), Long(b)) => Some(a.cmp(b)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Double(a), Double(b)) => a.partial_cmp(b),
            (String(a), String(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Render this value for use inside a record key or partition path. Nulls render as `None`.
    pub fn to_key_string(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Encode this value as json, using `data_type` to name struct fields.
    pub fn to_json(&self, data_type: &DataType) -> TableResult<Value> {
        let value = match (self, data_type) {
            (Scalar::Null, _) => Value::Null,
            (Scalar::Boolean(b), _) => Value::Bool(*b),
            (Scalar::Integer(i), _) => Value::from(*i),
            (Scalar::Long(l), _) => Value::from(*l),
            (Scalar::Float(f), _) => Value::from(*f),
            (Scalar::Double(d), _) => Value::from(*d),
            (Scalar::String(s), _) => Value::String(s.clone()),
            (Scalar::Binary(_) | Scalar::Date(_) | Scalar::Timestamp(_), _) => {
                Value::String(self.to_string())
            }
            (Scalar::Struct(values), DataType::Struct(s)) => struct_to_json(s, values)?,
            (Scalar::Struct(_), DataType::Primitive(p)) => {
                return Err(Error::schema_conversion(format!(
                    "Struct value does not match type {p}"
                )))
            }
        };
        Ok(value)
    }
}

pub(crate) fn struct_to_json(schema: &StructType, values: &[Scalar]) -> TableResult<Value> {
    require!(
        values.len() == schema.num_fields(),
        Error::schema_conversion(format!(
            "Expected {} values, got {}",
            schema.num_fields(),
            values.len()
        ))
    );
    let mut map = Map::with_capacity(values.len());
    for (field, value) in schema.fields().zip(values) {
        map.insert(field.name().clone(), value.to_json(field.data_type())?);
    }
    Ok(Value::Object(map))
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Boolean(b) => write!(f, "{b}"),
            Scalar::Integer(i) => write!(f, "{i}"),
            Scalar::Long(l) => write!(f, "{l}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Double(v) => write!(f, "{v}"),
            Scalar::String(s) => write!(f, "'{s}'"),
            Scalar::Binary(bytes) => {
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Scalar::Date(days) => {
                let date = NaiveDate::default().checked_add_signed(TimeDelta::days(*days as i64));
                match date {
                    Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
                    None => write!(f, "date({days})"),
                }
            }
            Scalar::Timestamp(micros) => match DateTime::from_timestamp_micros(*micros) {
                Some(ts) => write!(f, "{}", ts.format("%Y-%m-%dT%H:%M:%S%.6fZ")),
                None => write!(f, "timestamp({micros})"),
            },
            Scalar::Struct(values) => {
                write!(f, "{{")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from(value: $ty) -> Self {
                    Scalar::$variant(value.into())
                }
            }
        )*
    };
}

impl_from_scalar!(
    bool => Boolean,
    i32 => Integer,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    &str => String,
    Vec<u8> => Binary,
);

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// Look up the value at a dotted field path. A null anywhere along the path yields null.
///
/// Returns `None` if the path does not name a field of `schema`.
pub fn get_nested_field<'a>(
    schema: &StructType,
    values: &'a [Scalar],
    path: &str,
) -> Option<&'a Scalar> {
    let (indexes, _) = schema.resolve_path(path)?;
    let mut current = values;
    let (last, parents) = indexes.split_last()?;
    for index in parents {
        match current.get(*index)? {
            Scalar::Struct(children) => current = children,
            _ => return Some(&NULL),
        }
    }
    current.get(*last)
}

/// One input row. Values are positional and line up with the batch schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Scalar>,
}

impl Row {
    pub fn new(values: impl IntoIterator<Item = impl Into<Scalar>>) -> Self {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Vec<Scalar>> for Row {
    fn from(values: Vec<Scalar>) -> Self {
        Self { values }
    }
}

/// The rows of a write call together with their schema.
#[derive(Debug, Clone)]
pub struct RowBatch {
    schema: SchemaRef,
    rows: Vec<Row>,
}

impl RowBatch {
    /// Build a batch. Every row must have exactly one value per schema field.
    pub fn try_new(schema: SchemaRef, rows: Vec<Row>) -> TableResult<Self> {
        let width = schema.num_fields();
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.values.len() != width)
        {
            return Err(Error::schema_conversion(format!(
                "Row {i} has {} values but the schema has {width} fields",
                row.values.len()
            )));
        }
        Ok(Self { schema, rows })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_parts(self) -> (SchemaRef, Vec<Row>) {
        (self.schema, self.rows)
    }
}
