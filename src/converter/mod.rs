//! Object Conversion Registry
//!
//! Process-wide mapping from a concrete value type to an [`ObjectConverter`]
//! able to render a value to its canonical string form and rebuild it again.
//!
//! # Design
//!
//! - Keyed by `TypeId` for capture and by canonical type name for replay
//! - Append-only: converters are registered at process start, never removed
//! - Unregistered types are an [`Error::UnsupportedType`], never a fallback
//!
//! # Example
//!
//! ```ignore
//! let text = converter::render(&42i32)?;
//! let value: i32 = converter::reconstruct(&text)?;
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Canonical format for [`NaiveDateTime`] values.
const NAIVE_DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

// =============================================================================
// Converter Trait
// =============================================================================

/// Renders values of one concrete type to strings and back.
pub trait ObjectConverter: Send + Sync {
    /// Canonical name recorded alongside rendered values.
    fn type_name(&self) -> &'static str;

    /// Render the value. `value` is always of the registered type.
    fn render(&self, value: &dyn Any) -> Result<String>;

    /// Rebuild a value from its rendered form.
    fn reconstruct(&self, value: &str) -> Result<Box<dyn Any + Send>>;
}

/// Converter for any type with matching `Display` and `FromStr` impls.
pub struct TypeConverter<T> {
    type_name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypeConverter<T> {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            _marker: PhantomData,
        }
    }
}

impl<T> ObjectConverter for TypeConverter<T>
where
    T: Any + Send + Display + FromStr,
    T::Err: Display,
{
    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn render(&self, value: &dyn Any) -> Result<String> {
        value
            .downcast_ref::<T>()
            .map(ToString::to_string)
            .ok_or_else(|| Error::unsupported(self.type_name))
    }

    fn reconstruct(&self, value: &str) -> Result<Box<dyn Any + Send>> {
        value
            .parse::<T>()
            .map(|v| Box::new(v) as Box<dyn Any + Send>)
            .map_err(|e| Error::Conversion {
                type_name: self.type_name.to_string(),
                value: value.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Converter for `NaiveDateTime` using an unambiguous ISO-8601 layout.
struct NaiveDateTimeConverter;

impl ObjectConverter for NaiveDateTimeConverter {
    fn type_name(&self) -> &'static str {
        "NaiveDateTime"
    }

    fn render(&self, value: &dyn Any) -> Result<String> {
        value
            .downcast_ref::<NaiveDateTime>()
            .map(|v| v.format(NAIVE_DATE_TIME_FORMAT).to_string())
            .ok_or_else(|| Error::unsupported(self.type_name()))
    }

    fn reconstruct(&self, value: &str) -> Result<Box<dyn Any + Send>> {
        NaiveDateTime::parse_from_str(value, NAIVE_DATE_TIME_FORMAT)
            .map(|v| Box::new(v) as Box<dyn Any + Send>)
            .map_err(|e| Error::Conversion {
                type_name: self.type_name().to_string(),
                value: value.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Converter for UTC timestamps, rendered as RFC 3339 with full precision.
struct UtcDateTimeConverter;

impl ObjectConverter for UtcDateTimeConverter {
    fn type_name(&self) -> &'static str {
        "DateTime<Utc>"
    }

    fn render(&self, value: &dyn Any) -> Result<String> {
        value
            .downcast_ref::<DateTime<Utc>>()
            .map(|v| v.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            .ok_or_else(|| Error::unsupported(self.type_name()))
    }

    fn reconstruct(&self, value: &str) -> Result<Box<dyn Any + Send>> {
        DateTime::parse_from_rfc3339(value)
            .map(|v| Box::new(v.with_timezone(&Utc)) as Box<dyn Any + Send>)
            .map_err(|e| Error::Conversion {
                type_name: self.type_name().to_string(),
                value: value.to_string(),
                reason: e.to_string(),
            })
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Table of registered converters.
pub struct ObjectConverterRegistry {
    by_type: HashMap<TypeId, Arc<dyn ObjectConverter>>,
    by_name: HashMap<&'static str, Arc<dyn ObjectConverter>>,
}

impl ObjectConverterRegistry {
    /// Create an empty registry.
    pub fn empty() -> Self {
        Self {
            by_type: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Create a registry with the built-in primitive and temporal converters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();

        registry.add::<String>(TypeConverter::<String>::new("String"));
        registry.add::<char>(TypeConverter::<char>::new("char"));
        registry.add::<bool>(TypeConverter::<bool>::new("bool"));
        registry.add::<i8>(TypeConverter::<i8>::new("i8"));
        registry.add::<i16>(TypeConverter::<i16>::new("i16"));
        registry.add::<i32>(TypeConverter::<i32>::new("i32"));
        registry.add::<i64>(TypeConverter::<i64>::new("i64"));
        registry.add::<u8>(TypeConverter::<u8>::new("u8"));
        registry.add::<u16>(TypeConverter::<u16>::new("u16"));
        registry.add::<u32>(TypeConverter::<u32>::new("u32"));
        registry.add::<u64>(TypeConverter::<u64>::new("u64"));
        registry.add::<usize>(TypeConverter::<usize>::new("usize"));
        registry.add::<f32>(TypeConverter::<f32>::new("f32"));
        registry.add::<f64>(TypeConverter::<f64>::new("f64"));

        registry.add::<NaiveDate>(TypeConverter::<NaiveDate>::new("NaiveDate"));
        registry.add::<NaiveTime>(TypeConverter::<NaiveTime>::new("NaiveTime"));
        registry.add::<NaiveDateTime>(NaiveDateTimeConverter);
        registry.add::<DateTime<Utc>>(UtcDateTimeConverter);

        registry
    }

    /// Register a converter for `T`. Returns `false` and keeps the existing
    /// converter if `T` or its canonical name is already registered.
    pub fn add<T: Any>(&mut self, converter: impl ObjectConverter + 'static) -> bool {
        let type_id = TypeId::of::<T>();
        let name = converter.type_name();

        if self.by_type.contains_key(&type_id) || self.by_name.contains_key(name) {
            return false;
        }

        let converter: Arc<dyn ObjectConverter> = Arc::new(converter);
        self.by_type.insert(type_id, converter.clone());
        self.by_name.insert(name, converter);
        true
    }

    /// Check whether the dynamic value's type is registered.
    pub fn is_supported(&self, value: &dyn Any) -> bool {
        self.by_type.contains_key(&value.type_id())
    }

    /// Canonical name of the value's registered type.
    pub fn type_name_of(&self, value: &dyn Any) -> Option<&'static str> {
        self.by_type.get(&value.type_id()).map(|c| c.type_name())
    }

    /// Canonical name registered for `type_id`.
    pub fn type_name_for(&self, type_id: TypeId) -> Option<&'static str> {
        self.by_type.get(&type_id).map(|c| c.type_name())
    }

    /// Render a value. `type_name` only labels the error for unregistered types.
    pub fn render(&self, value: &dyn Any, type_name: &str) -> Result<String> {
        match self.by_type.get(&value.type_id()) {
            Some(converter) => converter.render(value),
            None => Err(Error::unsupported(type_name)),
        }
    }

    /// Rebuild a value given its canonical type name and rendered form.
    pub fn reconstruct(&self, type_name: &str, value: &str) -> Result<Box<dyn Any + Send>> {
        match self.by_name.get(type_name) {
            Some(converter) => converter.reconstruct(value),
            None => Err(Error::unsupported(type_name)),
        }
    }

    /// Number of registered converters.
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl Default for ObjectConverterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ObjectConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.by_name.keys().collect();
        names.sort();
        f.debug_struct("ObjectConverterRegistry")
            .field("types", &names)
            .finish()
    }
}

static REGISTRY: Lazy<RwLock<ObjectConverterRegistry>> =
    Lazy::new(|| RwLock::new(ObjectConverterRegistry::with_builtins()));

// =============================================================================
// Process-wide API
// =============================================================================

/// Register a converter in the process-wide registry.
///
/// Intended for process start, before producers begin capturing values.
pub fn register<T: Any>(converter: impl ObjectConverter + 'static) -> bool {
    let name = converter.type_name();
    let added = REGISTRY.write().add::<T>(converter);

    if added {
        debug!(type_name = name, "Registered object converter");
    } else {
        warn!(type_name = name, "Object converter already registered, keeping existing");
    }
    added
}

/// Check whether a value's type has a registered converter.
pub fn is_supported(value: &dyn Any) -> bool {
    REGISTRY.read().is_supported(value)
}

/// Canonical type name of a registered value.
pub fn type_name_of(value: &dyn Any) -> Option<&'static str> {
    REGISTRY.read().type_name_of(value)
}

/// Canonical type name registered for `T`.
pub fn type_name_for<T: Any>() -> Option<&'static str> {
    REGISTRY.read().type_name_for(TypeId::of::<T>())
}

/// Render a value of a statically known type.
pub fn render<T: Any>(value: &T) -> Result<String> {
    REGISTRY.read().render(value, std::any::type_name::<T>())
}

/// Render a dynamic value; `type_name` labels the error when unsupported.
pub fn render_any(value: &dyn Any, type_name: &str) -> Result<String> {
    REGISTRY.read().render(value, type_name)
}

/// Rebuild a boxed value from a canonical type name and rendered form.
pub fn reconstruct_any(type_name: &str, value: &str) -> Result<Box<dyn Any + Send>> {
    REGISTRY.read().reconstruct(type_name, value)
}

/// Rebuild a value of a statically known type from its rendered form.
pub fn reconstruct<T: Any>(value: &str) -> Result<T> {
    let registry = REGISTRY.read();
    let name = registry
        .type_name_for(TypeId::of::<T>())
        .ok_or_else(|| Error::unsupported(std::any::type_name::<T>()))?;

    registry
        .reconstruct(name, value)?
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| Error::Internal(format!("converter for '{}' built a foreign type", name)))
}

// =============================================================================
// Tests
// =============================================================================
