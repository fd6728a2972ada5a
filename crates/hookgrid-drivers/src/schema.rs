//! Field descriptors published for each driver's configuration.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Describes one configuration field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
}

impl FieldDescriptor {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            required: false,
            options: Vec::new(),
            default: None,
            min: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// An `enum` field with the given options.
    pub fn options(mut self, options: &[&'static str]) -> Self {
        self.kind = "enum";
        self.options = options.to_vec();
        self
    }

    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }
}

/// Schema of one driver's configuration resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverSchema {
    pub id: String,
    pub resource_fields: BTreeMap<&'static str, FieldDescriptor>,
}

impl DriverSchema {
    /// Schema for `driver`, named `<driver>Config`.
    pub fn new(driver: &str) -> Self {
        Self {
            id: format!("{driver}Config"),
            resource_fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, name: &'static str, field: FieldDescriptor) -> Self {
        self.resource_fields.insert(name, field);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_like_a_resource_schema() {
        let schema = DriverSchema::new("scaleHost").field(
            "action",
            FieldDescriptor::new("string").required().options(&["up", "down"]),
        );
        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({
                "id": "scaleHostConfig",
                "resourceFields": {
                    "action": {"type": "enum", "required": true, "options": ["up", "down"]}
                }
            })
        );
    }
}
