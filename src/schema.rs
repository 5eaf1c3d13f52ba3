// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Declarative payload schema validation.
//!
//! An optional list of required fields and their JSON types, checked at
//! listener intake. Non-conforming payloads are rejected as malformed rather
//! than passed through. With no schema configured the payload is opaque.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Expected JSON type of a required field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Any JSON number.
    Number,
    /// A number with no fractional part.
    Integer,
    String,
    Boolean,
    Object,
    Array,
    /// Any non-null value.
    Any,
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::String => value.is_string(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
            FieldKind::Any => !value.is_null(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::String => "string",
            FieldKind::Boolean => "boolean",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
            FieldKind::Any => "any",
        };
        write!(f, "{}", name)
    }
}

/// One required field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Top-level field name in the reading payload.
    pub name: String,

    /// Expected type (defaults to `any`).
    #[serde(default = "default_kind")]
    pub kind: FieldKind,
}

fn default_kind() -> FieldKind {
    FieldKind::Any
}

/// Schema violations.
#[derive(Debug, Error)]
pub enum SchemaViolation {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("field '{field}' is not a {expected}")]
    WrongKind { field: String, expected: FieldKind },
}

/// Required-field schema for reading payloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayloadSchema {
    /// Fields that must be present, with their expected types.
    pub required: Vec<FieldSpec>,
}

impl PayloadSchema {
    /// Check a payload against the schema.
    pub fn validate(&self, payload: &Value) -> Result<(), SchemaViolation> {
        let object = payload.as_object().ok_or(SchemaViolation::NotAnObject)?;

        for spec in &self.required {
            match object.get(&spec.name) {
                None | Some(Value::Null) => {
                    return Err(SchemaViolation::MissingField(spec.name.clone()));
                }
                Some(value) if !spec.kind.matches(value) => {
                    return Err(SchemaViolation::WrongKind {
                        field: spec.name.clone(),
                        expected: spec.kind,
                    });
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}
