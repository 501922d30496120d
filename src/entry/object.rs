//! Object snapshot entries

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::converter;
use crate::error::{Error, Result};

/// A value that can be snapshotted into an [`ObjectEntry`].
///
/// Implemented for every `'static` type with a `Debug` impl.
pub trait Captured: fmt::Debug {
    fn as_any(&self) -> &dyn Any;

    /// Rust type name, used when the type has no registered converter.
    fn captured_type_name(&self) -> &'static str;
}

impl<T: Any + fmt::Debug> Captured for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn captured_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Snapshot of an arbitrary value at capture time.
///
/// Registered types carry their canonical rendering and can be rebuilt with
/// [`ObjectEntry::to_value`]. Unregistered types keep their `Debug` output for
/// display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub str_value: Option<String>,
    #[serde(default)]
    pub supported: bool,
}

impl ObjectEntry {
    /// Snapshot a value of a statically known type.
    pub fn of<T: Any + fmt::Debug>(value: &T) -> Self {
        Self::from_captured(value)
    }

    /// Snapshot an optional value, `None` becoming [`ObjectEntry::null`].
    pub fn of_option<T: Any + fmt::Debug>(value: Option<&T>) -> Self {
        value.map(Self::of).unwrap_or_else(Self::null)
    }

    /// Snapshot a dynamically typed value.
    pub fn from_captured(value: &dyn Captured) -> Self {
        let any = value.as_any();

        if let Some(name) = converter::type_name_of(any) {
            match converter::render_any(any, name) {
                Ok(rendered) => {
                    return Self {
                        type_name: Some(name.to_string()),
                        str_value: Some(rendered),
                        supported: true,
                    };
                }
                Err(e) => warn!(type_name = name, error = %e, "Converter failed, keeping debug form"),
            }
        }

        Self {
            type_name: Some(value.captured_type_name().to_string()),
            str_value: Some(format!("{:?}", value)),
            supported: false,
        }
    }

    /// Entry for an absent value.
    pub fn null() -> Self {
        Self {
            type_name: None,
            str_value: None,
            supported: true,
        }
    }

    pub fn is_null(&self) -> bool {
        self.type_name.is_none() && self.str_value.is_none()
    }

    /// Rebuild the captured value.
    ///
    /// `T` must be the type the value was captured as; a value rendered from
    /// a `String` is not read back as an `i32` even when the text parses.
    pub fn to_value<T: Any>(&self) -> Result<T> {
        let text = self.checked_value()?;
        let expected = converter::type_name_for::<T>()
            .ok_or_else(|| Error::unsupported(std::any::type_name::<T>()))?;

        let captured = self.type_name.as_deref().unwrap_or_default();
        if captured != expected {
            return Err(Error::Conversion {
                type_name: expected.to_string(),
                value: text.to_string(),
                reason: format!("value was captured as {}", captured),
            });
        }
        converter::reconstruct::<T>(text)
    }

    /// Rebuild the captured value as a boxed `Any`.
    pub fn to_object(&self) -> Result<Box<dyn Any + Send>> {
        let text = self.checked_value()?;
        let name = self.type_name.as_deref().unwrap_or_default();
        converter::reconstruct_any(name, text)
    }

    fn checked_value(&self) -> Result<&str> {
        if self.is_null() {
            return Err(Error::Conversion {
                type_name: "null".to_string(),
                value: String::new(),
                reason: "entry holds no value".to_string(),
            });
        }
        if !self.supported {
            return Err(Error::unsupported(
                self.type_name.clone().unwrap_or_default(),
            ));
        }
        Ok(self.str_value.as_deref().unwrap_or_default())
    }
}

impl fmt::Display for ObjectEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.str_value {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "null"),
        }
    }
}
