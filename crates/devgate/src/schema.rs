//! Declarative argument schemas for tools.
//!
//! Each tool describes its arguments as a list of [`ArgumentSpec`]s. The registry checks raw
//! model-supplied arguments against the schema before a handler ever runs, and the same
//! description is rendered as JSON schema for the model's capability list.

use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    Integer,
    Boolean,
}

impl ArgKind {
    fn json_type(self) -> &'static str {
        match self {
            ArgKind::String => "string",
            ArgKind::Integer => "integer",
            ArgKind::Boolean => "boolean",
        }
    }

    /// Models regularly send `2.0` for integers; everything else passes through untouched
    fn coerce(self, value: &Value) -> Value {
        match (self, value.as_f64()) {
            (ArgKind::Integer, Some(f))
                if !value.is_i64() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 =>
            {
                json!(f as i64)
            }
            _ => value.clone(),
        }
    }

    fn fits(self, value: &Value) -> bool {
        match self {
            ArgKind::String => value.is_string(),
            ArgKind::Integer => value.is_i64() || value.is_u64(),
            ArgKind::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentSpec {
    pub name: String,
    pub kind: ArgKind,
    pub required: bool,
    pub default: Option<Value>,
    pub description: String,
}

impl ArgumentSpec {
    pub fn required<N: Into<String>, D: Into<String>>(name: N, kind: ArgKind, description: D) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
            description: description.into(),
        }
    }

    pub fn optional<N: Into<String>, D: Into<String>>(name: N, kind: ArgKind, description: D) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    /// Value filled in when the argument is absent
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentSchema {
    specs: Vec<ArgumentSpec>,
}

impl ArgumentSchema {
    pub fn new(specs: Vec<ArgumentSpec>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[ArgumentSpec] {
        &self.specs
    }

    /// Check raw arguments against the rendered JSON schema, returning every violated field on
    /// failure.
    ///
    /// Nulls and unknown fields are dropped, integral floats coerced and defaults filled in
    /// before the schema sees the arguments.
    pub fn validate(&self, raw: &Value) -> Result<Arguments, Vec<String>> {
        let empty = Map::new();
        let object = match raw {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(vec![format!(
                    "arguments: expected an object, got {}",
                    describe(other)
                )])
            }
        };
        let values = self.prepare(object);

        let validator = jsonschema::validator_for(&self.to_json_schema())
            .map_err(|e| vec![format!("schema: {e}")])?;
        let instance = Value::Object(values.clone());
        if validator.is_valid(&instance) {
            return Ok(Arguments { values });
        }

        let mut violations = self.field_violations(&instance);
        if violations.is_empty() {
            violations = validator
                .iter_errors(&instance)
                .map(|error| error.to_string())
                .collect();
        }
        Err(violations)
    }

    fn prepare(&self, object: &Map<String, Value>) -> Map<String, Value> {
        let mut values = Map::new();
        for spec in &self.specs {
            let value = match object.get(&spec.name).filter(|v| !v.is_null()) {
                Some(value) => spec.kind.coerce(value),
                None => match &spec.default {
                    Some(default) => default.clone(),
                    None => continue,
                },
            };
            values.insert(spec.name.clone(), value);
        }
        values
    }

    /// One line per field the schema rejects, in declaration order
    fn field_violations(&self, instance: &Value) -> Vec<String> {
        self.specs
            .iter()
            .filter_map(|spec| match instance.get(&spec.name) {
                None if spec.required => Some(format!("{}: required", spec.name)),
                Some(value) if !spec.kind.fits(value) => Some(format!(
                    "{}: expected {}, got {}",
                    spec.name,
                    spec.kind.json_type(),
                    describe(value)
                )),
                _ => None,
            })
            .collect()
    }

    /// Render as JSON schema for the model
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for spec in &self.specs {
            let mut property = json!({
                "type": spec.kind.json_type(),
                "description": spec.description,
            });
            if let Some(default) = &spec.default {
                property["default"] = default.clone();
            }
            properties.insert(spec.name.clone(), property);
        }
        let required: Vec<&str> = self
            .specs
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Arguments that passed validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Map<String, Value>,
}

impl Arguments {
    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }
}
