//! Value generation for key properties
//!
//! Generators are looked up per (entity type, property) and cached in a
//! [`ValueGeneratorCache`] shared by every registry of a database, so two
//! contexts never hand out the same sequential value.
//!
//! - `Sequential` properties get permanent values counting up from 1
//! - `OnSave` properties get temporary negative placeholders that the
//!   store replaces on commit
//! - custom generators can be registered, sync or async

use changetrack_core::{EntityType, EntityTypeId, Property, Result, Value, ValueGeneration, ValueKind};
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Future returned by [`AsyncValueGenerator::next_async`]
pub type GeneratedValue<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

/// Produces values for a property of newly added entities
pub trait ValueGenerator: Send + Sync {
    /// Next value for `property` of `entity_type`
    fn next(&self, entity_type: &EntityType, property: &Property) -> Value;

    /// True if values are placeholders to be replaced on commit
    fn generates_temporary_values(&self) -> bool {
        false
    }
}

/// Produces values asynchronously, e.g. from a hi-lo block fetched remotely
pub trait AsyncValueGenerator: Send + Sync {
    /// Next value for `property` of `entity_type`
    fn next_async<'a>(
        &'a self,
        entity_type: &'a EntityType,
        property: &'a Property,
    ) -> GeneratedValue<'a>;

    /// True if values are placeholders to be replaced on commit
    fn generates_temporary_values(&self) -> bool {
        false
    }
}

fn number_as(kind: ValueKind, n: i64) -> Value {
    match kind {
        ValueKind::String => Value::String(n.to_string()),
        ValueKind::Float => Value::Float(n as f64),
        _ => Value::Int(n),
    }
}

/// Permanent values 1, 2, 3, ...
#[derive(Debug, Default)]
pub struct SequentialValueGenerator {
    current: AtomicI64,
}

impl SequentialValueGenerator {
    /// Generator whose first value is 1
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValueGenerator for SequentialValueGenerator {
    fn next(&self, _entity_type: &EntityType, property: &Property) -> Value {
        let n = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        number_as(property.kind(), n)
    }
}

/// Temporary values -1, -2, -3, ...
#[derive(Debug, Default)]
pub struct TemporaryValueGenerator {
    current: AtomicI64,
}

impl TemporaryValueGenerator {
    /// Generator whose first value is -1
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValueGenerator for TemporaryValueGenerator {
    fn next(&self, _entity_type: &EntityType, property: &Property) -> Value {
        let n = self.current.fetch_sub(1, Ordering::Relaxed) - 1;
        number_as(property.kind(), n)
    }

    fn generates_temporary_values(&self) -> bool {
        true
    }
}

type GeneratorKey = (EntityTypeId, usize);

/// Generators by (entity type, property), shared across registries
#[derive(Default)]
pub struct ValueGeneratorCache {
    generators: DashMap<GeneratorKey, Arc<dyn ValueGenerator>>,
    async_generators: DashMap<GeneratorKey, Arc<dyn AsyncValueGenerator>>,
}

impl ValueGeneratorCache {
    /// Empty cache; built-in generators are created on first use
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `generator` for the property instead of the built-in one
    pub fn register(
        &self,
        entity_type: EntityTypeId,
        property: usize,
        generator: Arc<dyn ValueGenerator>,
    ) {
        self.generators.insert((entity_type, property), generator);
    }

    /// Use `generator` for the property when adding asynchronously
    pub fn register_async(
        &self,
        entity_type: EntityTypeId,
        property: usize,
        generator: Arc<dyn AsyncValueGenerator>,
    ) {
        self.async_generators
            .insert((entity_type, property), generator);
    }

    /// Generator for the property; `None` if the property is not generated
    pub fn generator_for(
        &self,
        entity_type: &EntityType,
        property: &Property,
    ) -> Option<Arc<dyn ValueGenerator>> {
        let key = (entity_type.id(), property.index());
        if let Some(g) = self.generators.get(&key) {
            return Some(g.value().clone());
        }
        let built: Arc<dyn ValueGenerator> = match property.value_generation() {
            ValueGeneration::None => return None,
            ValueGeneration::Sequential => Arc::new(SequentialValueGenerator::new()),
            ValueGeneration::OnSave => Arc::new(TemporaryValueGenerator::new()),
        };
        Some(self.generators.entry(key).or_insert(built).value().clone())
    }

    /// Async generator registered for the property
    pub fn async_generator_for(
        &self,
        entity_type: EntityTypeId,
        property: usize,
    ) -> Option<Arc<dyn AsyncValueGenerator>> {
        self.async_generators
            .get(&(entity_type, property))
            .map(|g| g.value().clone())
    }
}

impl std::fmt::Debug for ValueGeneratorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueGeneratorCache")
            .field("generators", &self.generators.len())
            .field("async_generators", &self.async_generators.len())
            .finish()
    }
}
