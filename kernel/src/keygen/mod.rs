//! Key generation: how a record's `(record key, partition path)` is derived from its values.
//!
//! Generators are looked up by name in a [`KeyGeneratorRegistry`]. The registry returned by
//! [`KeyGeneratorRegistry::default`] knows the built-in generators ([`SIMPLE`], [`COMPLEX`] and
//! [`NON_PARTITIONED`]); engines can register their own under new names.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::options::ResolvedOptions;
use crate::record::RecordKey;
use crate::schema::StructType;
use crate::value::Scalar;
use crate::{Error, TableResult};

mod builtin;

pub use builtin::{ComplexKeyGenerator, NonPartitionedKeyGenerator, SimpleKeyGenerator};

/// Partition path used when a record's partition value is null or empty.
pub const DEFAULT_PARTITION_PATH: &str = "default";

pub const SIMPLE: &str = "simple";
pub const COMPLEX: &str = "complex";
pub const NON_PARTITIONED: &str = "non_partitioned";

/// Derives a [`RecordKey`] from a record's values.
///
/// Implementations are shared across row-processing workers and must not hold mutable state.
pub trait KeyGenerator: Send + Sync + Debug {
    /// Check that every field this generator reads exists in `schema`. Called once per write,
    /// before any row is processed.
    fn validate(&self, schema: &StructType) -> TableResult<()>;

    /// Extract the key of one record whose values line up with `schema`.
    fn extract_key(&self, schema: &StructType, values: &[Scalar]) -> TableResult<RecordKey>;
}

/// Builds a generator from the resolved options of a write.
pub type KeyGeneratorFactory = fn(&ResolvedOptions) -> TableResult<Arc<dyn KeyGenerator>>;

/// Name-keyed key generator factories.
#[derive(Debug, Clone)]
pub struct KeyGeneratorRegistry {
    factories: HashMap<String, KeyGeneratorFactory>,
}

impl KeyGeneratorRegistry {
    /// A registry without any generators.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register `factory` under `name`, replacing any previous factory of that name.
    pub fn register(&mut self, name: impl Into<String>, factory: KeyGeneratorFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn with(mut self, name: impl Into<String>, factory: KeyGeneratorFactory) -> Self {
        self.register(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Build the generator named by the key generator option.
    pub fn resolve(&self, options: &ResolvedOptions) -> TableResult<Arc<dyn KeyGenerator>> {
        let name = options.key_generator()?.trim();
        let factory = self.factories.get(name).ok_or_else(|| {
            Error::configuration(format!("Unknown key generator '{name}'"))
        })?;
        factory(options)
    }
}

impl Default for KeyGeneratorRegistry {
    fn default() -> Self {
        Self::empty()
            .with(SIMPLE, |options| {
                Ok(Arc::new(SimpleKeyGenerator::try_from_options(options)?))
            })
            .with(COMPLEX, |options| {
                Ok(Arc::new(ComplexKeyGenerator::try_from_options(options)?))
            })
            .with(NON_PARTITIONED, |options| {
                Ok(Arc::new(NonPartitionedKeyGenerator::try_from_options(
                    options,
                )?))
            })
    }
}
