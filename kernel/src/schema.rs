//! Definitions and functions to describe the shape of incoming rows.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::utils::require;
use crate::{Error, TableResult};

pub type SchemaRef = Arc<StructType>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveType {
    Boolean,
    /// 32bit integer
    Integer,
    /// 64bit integer
    Long,
    /// 32bit floating point
    Float,
    /// 64bit floating point
    Double,
    String,
    Binary,
    /// Days since the unix epoch
    Date,
    /// Microseconds since the unix epoch, UTC
    Timestamp,
}

impl Display for PrimitiveType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Integer => "integer",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
            PrimitiveType::String => "string",
            PrimitiveType::Binary => "binary",
            PrimitiveType::Date => "date",
            PrimitiveType::Timestamp => "timestamp",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Primitive(PrimitiveType),
    Struct(Box<StructType>),
}

impl DataType {
    pub const BOOLEAN: Self = DataType::Primitive(PrimitiveType::Boolean);
    pub const INTEGER: Self = DataType::Primitive(PrimitiveType::Integer);
    pub const LONG: Self = DataType::Primitive(PrimitiveType::Long);
    pub const FLOAT: Self = DataType::Primitive(PrimitiveType::Float);
    pub const DOUBLE: Self = DataType::Primitive(PrimitiveType::Double);
    pub const STRING: Self = DataType::Primitive(PrimitiveType::String);
    pub const BINARY: Self = DataType::Primitive(PrimitiveType::Binary);
    pub const DATE: Self = DataType::Primitive(PrimitiveType::Date);
    pub const TIMESTAMP: Self = DataType::Primitive(PrimitiveType::Timestamp);

    pub fn struct_type(fields: impl IntoIterator<Item = StructField>) -> TableResult<Self> {
        Ok(DataType::Struct(Box::new(StructType::try_new(fields)?)))
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match self {
            DataType::Struct(s) => Some(s),
            DataType::Primitive(_) => None,
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Primitive(p) => write!(f, "{p}"),
            DataType::Struct(s) => {
                write!(f, "struct<")?;
                for (i, field) in s.fields().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.data_type)?;
                }
                write!(f, ">")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    /// Name of this (possibly nested) column
    pub name: String,
    /// The data type of this field
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Denotes whether this Field can be null
    pub nullable: bool,
}

impl StructField {
    pub fn new(name: impl Into<String>, data_type: impl Into<DataType>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        }
    }

    pub fn nullable(name: impl Into<String>, data_type: impl Into<DataType>) -> Self {
        Self::new(name, data_type, true)
    }

    pub fn not_null(name: impl Into<String>, data_type: impl Into<DataType>) -> Self {
        Self::new(name, data_type, false)
    }

    #[inline]
    pub fn name(&self) -> &String {
        &self.name
    }

    #[inline]
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

impl From<PrimitiveType> for DataType {
    fn from(p: PrimitiveType) -> Self {
        DataType::Primitive(p)
    }
}

impl From<StructType> for DataType {
    fn from(s: StructType) -> Self {
        DataType::Struct(Box::new(s))
    }
}

/// An ordered collection of uniquely named fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructType {
    fields: Vec<StructField>,
}

impl StructType {
    /// Build a struct, rejecting duplicate field names.
    pub fn try_new(fields: impl IntoIterator<Item = StructField>) -> TableResult<Self> {
        let fields: Vec<_> = fields.into_iter().collect();
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            require!(
                seen.insert(field.name.as_str()),
                Error::schema_conversion(format!("Duplicate field name '{}'", field.name))
            );
        }
        Ok(Self { fields })
    }

    /// Build a struct without checking field names. Only for schemas known to be valid.
    pub fn new_unchecked(fields: impl IntoIterator<Item = StructField>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn fields(&self) -> impl ExactSizeIterator<Item = &StructField> {
        self.fields.iter()
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Resolve a dotted path such as `a.b.c` to the chain of field indexes that reaches it,
    /// along with the leaf field.
    pub fn resolve_path(&self, path: &str) -> Option<(Vec<usize>, &StructField)> {
        let mut indexes = Vec::new();
        let mut current = self;
        let mut parts = path.split('.').peekable();
        while let Some(part) = parts.next() {
            let index = current.index_of(part)?;
            let field = &current.fields[index];
            indexes.push(index);
            if parts.peek().is_none() {
                return Some((indexes, field));
            }
            current = field.data_type.as_struct()?;
        }
        None
    }
}
