// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Alias Domain Model
//!
//! An alias declares that one topic (the *alias*) mirrors another topic (the
//! *target*), optionally through a transform/inverse expression pair.
//!
//! | Type | Description |
//! |------|-------------|
//! | `AliasSpec` | Canonical declaration of one alias, keyed by `alias` |
//! | `AliasDeclaration` | Boundary input: `[target, alias]` short form or a full object |
//! | `RegistryState` | The full `{alias: AliasSpec}` map; single source of truth |
//!
//! Declarations are resolved into one `AliasSpec` before any registry logic
//! runs, so the registry only ever sees the canonical shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::transform::{TransformError, ValueTransform};

const DECLARATION_FIELDS: [&str; 5] = ["target", "alias", "transform", "inverse", "description"];

/// Declaration of a single alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasSpec {
    /// Topic mirrored from
    pub target: String,

    /// Topic mirrored to (registry key)
    pub alias: String,

    /// Expression applied to values flowing target → alias
    #[serde(default)]
    pub transform: Option<String>,

    /// Expression applied to values flowing alias → target
    #[serde(default)]
    pub inverse: Option<String>,

    #[serde(default)]
    pub description: String,
}

impl AliasSpec {
    /// Plain mirror without transforms and with the default description.
    pub fn new(target: impl Into<String>, alias: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            description: default_description(&target),
            target,
            alias: alias.into(),
            transform: None,
            inverse: None,
        }
    }

    pub fn with_transform(mut self, transform: impl Into<String>, inverse: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self.inverse = Some(inverse.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

fn default_description(target: &str) -> String {
    format!("Alias of {}", target)
}

/// Reasons a declaration is rejected before it reaches the registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeclarationError {
    #[error("Alias declaration is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Alias declaration field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Alias declaration sets '{present}' but is missing '{missing}'; transform and inverse must be given together")]
    UnpairedTransform {
        present: &'static str,
        missing: &'static str,
    },

    #[error("Alias declaration has unexpected fields: {}", .0.join(", "))]
    UnexpectedFields(Vec<String>),

    #[error("Alias declaration must be a [target, alias] pair or an object")]
    WrongShape,

    #[error("Alias declaration has an invalid {field} expression: {source}")]
    InvalidExpression {
        field: &'static str,
        #[source]
        source: TransformError,
    },
}

/// Request payload for declaring an alias.
#[derive(Debug, Clone, PartialEq)]
pub enum AliasDeclaration {
    /// `[target, alias]`
    ShortForm { target: String, alias: String },

    /// `{"target": ..., "alias": ..., ...}`
    Full(Map<String, Value>),
}

impl AliasDeclaration {
    pub fn short(target: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::ShortForm {
            target: target.into(),
            alias: alias.into(),
        }
    }

    /// Resolve a raw bus payload into a declaration.
    pub fn from_value(value: Value) -> Result<Self, DeclarationError> {
        match value {
            Value::Array(items) => match <[Value; 2]>::try_from(items) {
                Ok([Value::String(target), Value::String(alias)]) => {
                    Ok(Self::ShortForm { target, alias })
                }
                _ => Err(DeclarationError::WrongShape),
            },
            Value::Object(map) => Ok(Self::Full(map)),
            _ => Err(DeclarationError::WrongShape),
        }
    }

    /// Normalise into a canonical `AliasSpec`, enforcing the declaration rules.
    pub fn into_spec(self) -> Result<AliasSpec, DeclarationError> {
        match self {
            Self::ShortForm { target, alias } => {
                if target.is_empty() {
                    return Err(DeclarationError::MissingField("target"));
                }
                if alias.is_empty() {
                    return Err(DeclarationError::MissingField("alias"));
                }
                Ok(AliasSpec::new(target, alias))
            }
            Self::Full(map) => {
                let mut unexpected: Vec<String> = map
                    .keys()
                    .filter(|k| !DECLARATION_FIELDS.contains(&k.as_str()))
                    .cloned()
                    .collect();
                if !unexpected.is_empty() {
                    unexpected.sort();
                    return Err(DeclarationError::UnexpectedFields(unexpected));
                }

                let target = required_str(&map, "target")?;
                let alias = required_str(&map, "alias")?;
                let transform = optional_str(&map, "transform")?;
                let inverse = optional_str(&map, "inverse")?;

                match (&transform, &inverse) {
                    (Some(_), None) => {
                        return Err(DeclarationError::UnpairedTransform {
                            present: "transform",
                            missing: "inverse",
                        })
                    }
                    (None, Some(_)) => {
                        return Err(DeclarationError::UnpairedTransform {
                            present: "inverse",
                            missing: "transform",
                        })
                    }
                    _ => {}
                }

                if let Some(expr) = &transform {
                    ValueTransform::parse(expr).map_err(|source| {
                        DeclarationError::InvalidExpression {
                            field: "transform",
                            source,
                        }
                    })?;
                }
                if let Some(expr) = &inverse {
                    ValueTransform::parse(expr).map_err(|source| {
                        DeclarationError::InvalidExpression {
                            field: "inverse",
                            source,
                        }
                    })?;
                }

                let description = optional_str(&map, "description")?
                    .unwrap_or_else(|| default_description(&target));

                Ok(AliasSpec {
                    target,
                    alias,
                    transform,
                    inverse,
                    description,
                })
            }
        }
    }
}

impl From<AliasSpec> for AliasDeclaration {
    fn from(spec: AliasSpec) -> Self {
        let mut map = Map::new();
        map.insert("target".into(), Value::String(spec.target));
        map.insert("alias".into(), Value::String(spec.alias));
        if let Some(t) = spec.transform {
            map.insert("transform".into(), Value::String(t));
        }
        if let Some(i) = spec.inverse {
            map.insert("inverse".into(), Value::String(i));
        }
        map.insert("description".into(), Value::String(spec.description));
        Self::Full(map)
    }
}

fn required_str(map: &Map<String, Value>, field: &'static str) -> Result<String, DeclarationError> {
    match map.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        None | Some(Value::Null) | Some(Value::String(_)) => Err(DeclarationError::MissingField(field)),
        Some(_) => Err(DeclarationError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}

fn optional_str(map: &Map<String, Value>, field: &'static str) -> Result<Option<String>, DeclarationError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DeclarationError::InvalidField {
            field,
            expected: "a string or null",
        }),
    }
}

/// Authoritative `{alias: AliasSpec}` mapping.
///
/// Ordered so that republication, diffing and cycle reports are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryState(BTreeMap<String, AliasSpec>);

impl RegistryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, alias: &str) -> Option<&AliasSpec> {
        self.0.get(alias)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.0.contains_key(alias)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AliasSpec)> {
        self.0.iter()
    }

    pub fn specs(&self) -> impl Iterator<Item = &AliasSpec> {
        self.0.values()
    }

    /// Insert or replace the spec keyed by `spec.alias`.
    pub fn insert(&mut self, spec: AliasSpec) -> Option<AliasSpec> {
        self.0.insert(spec.alias.clone(), spec)
    }

    pub fn remove(&mut self, alias: &str) -> Option<AliasSpec> {
        self.0.remove(alias)
    }

    /// Candidate state with `spec` declared.
    pub fn with_alias(&self, spec: AliasSpec) -> Self {
        let mut next = self.clone();
        next.insert(spec);
        next
    }

    /// Candidate state with `alias` removed.
    pub fn without_alias(&self, alias: &str) -> Self {
        let mut next = self.clone();
        next.remove(alias);
        next
    }

    /// Alias → target edges of the induced alias graph, taken from the
    /// specs themselves so they match the mirrors that would run.
    pub fn edges(&self) -> BTreeMap<String, String> {
        self.0
            .values()
            .map(|spec| (spec.alias.clone(), spec.target.clone()))
            .collect()
    }

    /// First entry whose key is not its own alias path. Such an entry would
    /// mirror a different topic than the one the state claims.
    pub fn mismatched_entry(&self) -> Option<(&String, &AliasSpec)> {
        self.0.iter().find(|(key, spec)| **key != spec.alias)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

impl FromIterator<AliasSpec> for RegistryState {
    fn from_iter<I: IntoIterator<Item = AliasSpec>>(iter: I) -> Self {
        Self(iter.into_iter().map(|s| (s.alias.clone(), s)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn declare(value: Value) -> Result<AliasSpec, DeclarationError> {
        AliasDeclaration::from_value(value)?.into_spec()
    }

    #[test]
    fn test_short_form_defaults() {
        let spec = declare(json!(["sensors/temp", "house/temp"])).unwrap();
        assert_eq!(spec.target, "sensors/temp");
        assert_eq!(spec.alias, "house/temp");
        assert_eq!(spec.transform, None);
        assert_eq!(spec.inverse, None);
        assert_eq!(spec.description, "Alias of sensors/temp");
    }

    #[test]
    fn test_short_form_wrong_arity_or_types() {
        assert_eq!(declare(json!(["a"])), Err(DeclarationError::WrongShape));
        assert_eq!(declare(json!(["a", "b", "c"])), Err(DeclarationError::WrongShape));
        assert_eq!(declare(json!(["a", 1])), Err(DeclarationError::WrongShape));
        assert_eq!(declare(json!("a")), Err(DeclarationError::WrongShape));
        assert_eq!(declare(json!(["", "b"])), Err(DeclarationError::MissingField("target")));
    }

    #[test]
    fn test_full_form() {
        let spec = declare(json!({
            "target": "sensors/temp_c",
            "alias": "sensors/temp_f",
            "transform": "x * 9 / 5 + 32",
            "inverse": "(x - 32) * 5 / 9",
            "description": "Temperature in Fahrenheit"
        }))
        .unwrap();
        assert_eq!(spec.transform.as_deref(), Some("x * 9 / 5 + 32"));
        assert_eq!(spec.inverse.as_deref(), Some("(x - 32) * 5 / 9"));
        assert_eq!(spec.description, "Temperature in Fahrenheit");
    }

    #[test]
    fn test_full_form_missing_fields() {
        assert_eq!(
            declare(json!({"alias": "b"})),
            Err(DeclarationError::MissingField("target"))
        );
        assert_eq!(
            declare(json!({"target": "a"})),
            Err(DeclarationError::MissingField("alias"))
        );
        assert_eq!(
            declare(json!({"target": "a", "alias": 5})),
            Err(DeclarationError::InvalidField { field: "alias", expected: "a string" })
        );
    }

    #[test]
    fn test_unpaired_transform_names_missing_field() {
        let err = declare(json!({"target": "a", "alias": "b", "transform": "x * 2"})).unwrap_err();
        assert_eq!(
            err,
            DeclarationError::UnpairedTransform { present: "transform", missing: "inverse" }
        );
        assert!(err.to_string().contains("missing 'inverse'"));

        let err = declare(json!({"target": "a", "alias": "b", "inverse": "x / 2"})).unwrap_err();
        assert!(err.to_string().contains("missing 'transform'"));
    }

    #[test]
    fn test_unexpected_fields() {
        let err = declare(json!({"target": "a", "alias": "b", "zeta": 1, "extra": true})).unwrap_err();
        assert_eq!(
            err,
            DeclarationError::UnexpectedFields(vec!["extra".to_string(), "zeta".to_string()])
        );
    }

    #[test]
    fn test_invalid_expression() {
        let err = declare(json!({
            "target": "a", "alias": "b", "transform": "x +", "inverse": "x"
        }))
        .unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidExpression { field: "transform", .. }));
    }

    #[test]
    fn test_spec_roundtrips_through_declaration() {
        let spec = AliasSpec::new("a", "b").with_transform("x * 2", "x / 2");
        let back = AliasDeclaration::from(spec.clone()).into_spec().unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_state_serialization_shape() {
        let state: RegistryState = [AliasSpec::new("a", "b")].into_iter().collect();
        assert_eq!(
            state.to_value(),
            json!({
                "b": {
                    "target": "a",
                    "alias": "b",
                    "transform": null,
                    "inverse": null,
                    "description": "Alias of a"
                }
            })
        );

        let parsed: RegistryState = serde_json::from_value(state.to_value()).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn test_candidate_builders_do_not_mutate() {
        let state: RegistryState = [AliasSpec::new("a", "b")].into_iter().collect();
        let added = state.with_alias(AliasSpec::new("c", "d"));
        let removed = state.without_alias("b");

        assert_eq!(state.len(), 1);
        assert_eq!(added.len(), 2);
        assert!(removed.is_empty());
        assert_eq!(
            added.edges(),
            BTreeMap::from([
                ("b".to_string(), "a".to_string()),
                ("d".to_string(), "c".to_string()),
            ])
        );
    }

    #[test]
    fn test_edges_follow_spec_alias_not_key() {
        let state: RegistryState = serde_json::from_value(json!({
            "k": { "target": "b", "alias": "a", "description": "" },
            "b": { "target": "a", "alias": "b", "description": "" },
        }))
        .unwrap();

        assert_eq!(
            state.edges(),
            BTreeMap::from([
                ("a".to_string(), "b".to_string()),
                ("b".to_string(), "a".to_string()),
            ])
        );
        let (key, spec) = state.mismatched_entry().unwrap();
        assert_eq!((key.as_str(), spec.alias.as_str()), ("k", "a"));

        let keyed: RegistryState = [AliasSpec::new("a", "b")].into_iter().collect();
        assert!(keyed.mismatched_entry().is_none());
    }
}
