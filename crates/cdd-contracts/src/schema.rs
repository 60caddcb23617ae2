//! Thin adapter over the `jsonschema` engine that reports failures keyed by field.
//!
//! Schemas are compiled once when a contract is registered. Validation never fails hard: every
//! offending field (missing, mistyped or unexpected) ends up in the outcome map so callers can
//! reproduce the failure exactly.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, ValidationError, Validator};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const MISSING_FIELD: &str = "Required field is missing";
pub const UNKNOWN_KEY: &str = "Key does not exist on validator";
const ROOT_FIELD: &str = "$";

/// Subschema keywords walked when closing object schemas.
const NESTED_MAPS: &[&str] = &["properties", "patternProperties", "definitions", "$defs"];
const NESTED_LISTS: &[&str] = &["anyOf", "oneOf"];
const NESTED_SINGLE: &[&str] = &["items", "additionalItems"];
/// Branches applied to the same instance as their parent. They stay open and their property
/// names count as known keys of the parent.
const SHARED_LISTS: &[&str] = &["allOf"];
const SHARED_SINGLE: &[&str] = &["if", "then", "else"];

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Pass,
    Fail,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FieldError {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl FieldError {
    pub fn new(error: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            error: error.into(),
            value,
        }
    }
}

/// Result of validating one value against one schema.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ValidationOutcome {
    pub result: ValidationStatus,
    #[serde(default)]
    pub errors: BTreeMap<String, FieldError>,
}

impl ValidationOutcome {
    pub fn pass() -> Self {
        Self {
            result: ValidationStatus::Pass,
            errors: BTreeMap::new(),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.result == ValidationStatus::Pass
    }

    pub fn field(&self, name: &str) -> Option<&FieldError> {
        self.errors.get(name)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaOptions {
    /// Close object schemas that list `properties` without saying anything about
    /// `additionalProperties`, so unknown keys are reported.
    pub strict: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self { strict: true }
    }
}

/// A compiled declarative schema.
#[derive(Clone)]
pub struct Schema {
    raw: Value,
    validator: Arc<Validator>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema").field("raw", &self.raw).finish()
    }
}

impl Schema {
    pub fn compile(
        mut raw: Value,
        options: SchemaOptions,
    ) -> Result<Self, ValidationError<'static>> {
        if options.strict {
            close_objects(&mut raw);
        }
        let validator = jsonschema::options()
            .with_draft(Draft::Draft7)
            .build(&raw)?;
        Ok(Self {
            raw,
            validator: Arc::new(validator),
        })
    }

    /// Schema document as compiled, after strict-mode rewriting.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn validate(&self, value: &Value) -> ValidationOutcome {
        let mut errors: BTreeMap<String, FieldError> = BTreeMap::new();
        for err in self.validator.iter_errors(value) {
            let base = pointer_to_field(&err.instance_path.to_string());
            match &err.kind {
                ValidationErrorKind::Required { property } => {
                    let name = property
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| property.to_string());
                    errors
                        .entry(join_field(&base, &name))
                        .or_insert_with(|| FieldError::new(MISSING_FIELD, None));
                }
                ValidationErrorKind::AdditionalProperties { unexpected } => {
                    for name in unexpected {
                        let found = err.instance.get(name.as_str()).cloned();
                        errors
                            .entry(join_field(&base, name))
                            .or_insert_with(|| FieldError::new(UNKNOWN_KEY, found));
                    }
                }
                _ => {
                    let key = if base.is_empty() {
                        ROOT_FIELD.to_string()
                    } else {
                        base
                    };
                    let found = (*err.instance).clone();
                    errors
                        .entry(key)
                        .or_insert_with(|| FieldError::new(err.to_string(), Some(found)));
                }
            }
        }
        if errors.is_empty() {
            ValidationOutcome::pass()
        } else {
            ValidationOutcome {
                result: ValidationStatus::Fail,
                errors,
            }
        }
    }
}

fn pointer_to_field(pointer: &str) -> String {
    pointer
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

fn join_field(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}.{name}")
    }
}

fn close_objects(schema: &mut Value) {
    close_level(schema, true);
}

fn close_level(schema: &mut Value, close_here: bool) {
    let Value::Object(map) = schema else {
        return;
    };
    if close_here && !map.contains_key("additionalProperties") {
        let mut shared = BTreeSet::new();
        shared_property_names(map, &mut shared);
        if map.contains_key("properties") || !shared.is_empty() {
            let properties = map
                .entry("properties")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(properties) = properties {
                for name in shared {
                    properties.entry(name).or_insert(Value::Bool(true));
                }
            }
            map.insert("additionalProperties".into(), Value::Bool(false));
        }
    }
    for key in NESTED_MAPS {
        if let Some(Value::Object(children)) = map.get_mut(*key) {
            for child in children.values_mut() {
                close_level(child, true);
            }
        }
    }
    for_each_subschema(map, NESTED_LISTS, NESTED_SINGLE, |child| close_level(child, true));
    for_each_subschema(map, SHARED_LISTS, SHARED_SINGLE, |child| close_level(child, false));
    if let Some(child) = map.get_mut("not") {
        close_level(child, false);
    }
}

fn for_each_subschema(
    map: &mut Map<String, Value>,
    lists: &[&str],
    singles: &[&str],
    mut visit: impl FnMut(&mut Value),
) {
    for key in lists.iter().chain(singles) {
        match map.get_mut(*key) {
            Some(Value::Array(children)) => children.iter_mut().for_each(&mut visit),
            Some(child) => visit(child),
            None => {}
        }
    }
}

/// Property names declared by branches that validate the same object as `map`.
fn shared_property_names(map: &Map<String, Value>, names: &mut BTreeSet<String>) {
    let branches = SHARED_LISTS
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_array))
        .flatten()
        .chain(SHARED_SINGLE.iter().filter_map(|key| map.get(*key)));
    for branch in branches {
        let Value::Object(branch) = branch else {
            continue;
        };
        if let Some(Value::Object(properties)) = branch.get("properties") {
            names.extend(properties.keys().cloned());
        }
        shared_property_names(branch, names);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema_a_string() -> Schema {
        Schema::compile(
            json!({
                "type": "object",
                "properties": {"a": {"type": "string"}},
                "required": ["a"]
            }),
            SchemaOptions::default(),
        )
        .expect("schema compiles")
    }

    #[test]
    fn passes_matching_value() {
        let outcome = schema_a_string().validate(&json!({"a": "foo"}));
        assert!(outcome.is_pass());
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn reports_missing_and_unexpected_fields() {
        let outcome = schema_a_string().validate(&json!({"x": "foo"}));
        assert_eq!(outcome.result, ValidationStatus::Fail);
        assert_eq!(
            outcome.field("a"),
            Some(&FieldError::new(MISSING_FIELD, None))
        );
        assert_eq!(
            outcome.field("x"),
            Some(&FieldError::new(UNKNOWN_KEY, Some(json!("foo"))))
        );
        assert_eq!(outcome.errors.len(), 2);
    }

    #[test]
    fn reports_mistyped_field_with_value() {
        let outcome = schema_a_string().validate(&json!({"a": 12}));
        let field = outcome.field("a").expect("a is reported");
        assert_eq!(field.value, Some(json!(12)));
        assert!(field.error.contains("string"));
    }

    #[test]
    fn missing_value_is_omitted_from_serialized_outcome() {
        let outcome = schema_a_string().validate(&json!({}));
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"result": "fail", "errors": {"a": {"error": MISSING_FIELD}}})
        );
    }

    #[test]
    fn nested_fields_use_dotted_paths() {
        let schema = Schema::compile(
            json!({
                "type": "object",
                "properties": {
                    "owner": {
                        "type": "object",
                        "properties": {"name": {"type": "string"}},
                        "required": ["name"]
                    }
                }
            }),
            SchemaOptions::default(),
        )
        .unwrap();
        let outcome = schema.validate(&json!({"owner": {"nick": "z"}}));
        assert!(outcome.field("owner.name").is_some());
        assert_eq!(outcome.field("owner.nick").unwrap().error, UNKNOWN_KEY);
    }

    #[test]
    fn root_type_mismatch_is_keyed_as_root() {
        let outcome = schema_a_string().validate(&json!("not an object"));
        assert!(outcome.field(ROOT_FIELD).is_some());
    }

    #[test]
    fn lenient_mode_keeps_objects_open() {
        let schema = Schema::compile(
            json!({"type": "object", "properties": {"a": {"type": "string"}}}),
            SchemaOptions { strict: false },
        )
        .unwrap();
        assert!(schema.validate(&json!({"a": "x", "extra": 1})).is_pass());
        assert!(schema.raw().get("additionalProperties").is_none());
    }

    #[test]
    fn explicit_additional_properties_is_respected() {
        let schema = Schema::compile(
            json!({
                "type": "object",
                "properties": {"a": {"type": "string"}},
                "additionalProperties": true
            }),
            SchemaOptions::default(),
        )
        .unwrap();
        assert!(schema.validate(&json!({"a": "x", "extra": 1})).is_pass());
    }

    #[test]
    fn strict_mode_closes_array_item_schemas() {
        let schema = Schema::compile(
            json!({
                "type": "array",
                "items": {"type": "object", "properties": {"id": {"type": "string"}}}
            }),
            SchemaOptions::default(),
        )
        .unwrap();
        let outcome = schema.validate(&json!([{"id": "a"}, {"id": "b", "junk": true}]));
        assert_eq!(outcome.field("1.junk").unwrap().error, UNKNOWN_KEY);
    }

    #[test]
    fn strict_all_of_accepts_keys_from_every_branch() {
        let schema = Schema::compile(
            json!({
                "type": "object",
                "allOf": [
                    {"properties": {"a": {"type": "string"}}, "required": ["a"]},
                    {
                        "properties": {
                            "b": {"type": "integer"},
                            "owner": {"type": "object", "properties": {"name": {"type": "string"}}}
                        }
                    }
                ]
            }),
            SchemaOptions::default(),
        )
        .unwrap();
        assert!(schema.validate(&json!({"a": "x", "b": 1})).is_pass());

        let outcome = schema.validate(&json!({"a": "x", "b": 1, "c": 2, "owner": {"nick": "z"}}));
        assert_eq!(outcome.field("c").unwrap().error, UNKNOWN_KEY);
        assert_eq!(outcome.field("owner.nick").unwrap().error, UNKNOWN_KEY);
        assert!(outcome.field("a").is_none());
        assert!(outcome.field("b").is_none());
    }

    #[test]
    fn strict_conditional_branches_share_the_parent_keys() {
        let schema = Schema::compile(
            json!({
                "type": "object",
                "properties": {"kind": {"type": "string"}},
                "required": ["kind"],
                "if": {"properties": {"kind": {"const": "card"}}},
                "then": {"properties": {"number": {"type": "string"}}, "required": ["number"]},
                "else": {"properties": {"iban": {"type": "string"}}}
            }),
            SchemaOptions::default(),
        )
        .unwrap();
        assert!(schema.validate(&json!({"kind": "card", "number": "4111"})).is_pass());
        assert!(schema.validate(&json!({"kind": "bank", "iban": "DE00"})).is_pass());

        let missing = schema.validate(&json!({"kind": "card"}));
        assert_eq!(missing.field("number").unwrap().error, MISSING_FIELD);

        let extra = schema.validate(&json!({"kind": "card", "number": "1", "pin": 7}));
        assert_eq!(extra.field("pin").unwrap().error, UNKNOWN_KEY);
        assert_eq!(extra.errors.len(), 1);
    }

    #[test]
    fn invalid_schema_does_not_compile() {
        assert!(Schema::compile(json!({"type": 12}), SchemaOptions::default()).is_err());
    }
}
