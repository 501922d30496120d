//! SQL bind parameter entries

use serde::{Deserialize, Serialize};

use crate::entry::MethodCallEntry;

/// A bind parameter call, identified by name or by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlParameterEntry {
    #[serde(flatten)]
    pub call: MethodCallEntry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

impl SqlParameterEntry {
    pub fn named(name: impl Into<String>, call: MethodCallEntry) -> Self {
        Self {
            call,
            name: Some(name.into()),
            index: None,
        }
    }

    pub fn indexed(index: u32, call: MethodCallEntry) -> Self {
        Self {
            call,
            name: None,
            index: Some(index),
        }
    }

    /// Bound value as captured from the call's last argument.
    pub fn value(&self) -> Option<&crate::entry::ObjectEntry> {
        let last = self.call.arguments.len().checked_sub(1)?;
        self.call.object_argument(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Entry, MethodSignature, ObjectEntry};

    #[test]
    fn test_flattened_wire_form() {
        let call = MethodCallEntry::new(MethodSignature::new("PreparedStatement", "set_int", vec![]))
            .with_arguments(vec![ObjectEntry::of(&1u32).into(), ObjectEntry::of(&42i64).into()]);
        let entry: Entry = SqlParameterEntry::indexed(1, call).into();

        let json = entry.to_json().unwrap();
        assert!(json.contains(r#""type":"SQLParameterEntry""#));
        assert!(json.contains(r#""index":1"#));
        assert!(json.contains(r#""signature""#));

        let back = Entry::from_json(&json).unwrap();
        assert_eq!(back, entry);
        assert_eq!(back.method_call().unwrap().method_name(), "set_int");
        match back {
            Entry::SqlParameter(param) => {
                assert_eq!(param.value().unwrap().to_value::<i64>().unwrap(), 42);
                assert!(param.name.is_none());
            }
            other => panic!("unexpected entry {:?}", other),
        }
    }
}
