// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `${VAR}` parameter substitution.
//!
//! Supports `${VAR}` and `${VAR:-default}`. Undefined variables without a
//! default expand to the empty string. Keys beginning with `_` are
//! structured pass-through (ports, volumes, resources) and never reach
//! the env map.

use std::collections::BTreeMap;

/// Expand `${VAR}` and `${VAR:-default}` against the given env map.
pub fn expand(template: &str, env: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let inner = &after[..end];
                let (name, default) = match inner.split_once(":-") {
                    Some((name, default)) => (name, Some(default)),
                    None => (inner, None),
                };
                match env.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(default.unwrap_or("")),
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated placeholder: emit literally.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Build the env map from entry defaults and caller params; later wins.
///
/// Param values are coerced to strings (strings verbatim, scalars via
/// display). `_`-prefixed keys are skipped.
pub fn merge_env(
    defaults: &BTreeMap<String, String>,
    params: &BTreeMap<String, serde_json::Value>,
) -> BTreeMap<String, String> {
    let mut env = defaults.clone();
    for (key, value) in params {
        if key.starts_with('_') {
            continue;
        }
        env.insert(key.clone(), coerce(value));
    }
    env
}

fn coerce(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
