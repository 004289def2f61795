// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parameter validation against an entry's JSON Schema.
//!
//! Validation runs before any snapshot or filesystem mutation, so a bad
//! parameter never leaves a trace on disk.

use nos_core::{CatalogEntry, ErrorBody, ErrorKind};
use std::collections::BTreeMap;

/// Validate `params` against the entry's schema (when it declares one).
///
/// The first violation is surfaced with `details.field` set to the
/// instance path and `details.hint` to the schema's message.
pub fn validate_params(
    entry: &CatalogEntry,
    params: &BTreeMap<String, serde_json::Value>,
) -> Result<(), ErrorBody> {
    let Some(schema) = &entry.schema else {
        return Ok(());
    };

    let validator = jsonschema::validator_for(schema).map_err(|e| {
        ErrorBody::new(
            ErrorKind::Validation,
            "schema",
            format!("catalog entry {} has an invalid schema", entry.id),
        )
        .with_hint(e.to_string())
    })?;

    let instance = serde_json::Value::Object(
        params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    );

    if let Some(error) = validator.iter_errors(&instance).next() {
        let field = error.instance_path.to_string();
        let field = field.trim_start_matches('/').to_string();
        return Err(ErrorBody::new(
            ErrorKind::Validation,
            "params",
            format!("invalid parameters for {}", entry.id),
        )
        .with_field(if field.is_empty() { "params".into() } else { field })
        .with_hint(error.to_string()));
    }

    Ok(())
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
