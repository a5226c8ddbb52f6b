//! Storage-safe extension keys.
//!
//! Stored documents never carry `.` inside a map key: it would collide with
//! dotted filter paths. Keys are escaped to `[dot]` on write and restored on
//! render, and the full-width stop used by older records is restored too.

use serde_json::{Map, Value};

pub const DOT_PLACEHOLDER: &str = "[dot]";
pub const LEGACY_DOT: char = '\u{FF0E}';

/// Extension maps inside a statement or a SubStatement object.
const EXTENSION_PATHS: [&[&str]; 3] = [
    &["context", "extensions"],
    &["result", "extensions"],
    &["object", "definition", "extensions"],
];

fn rewrite_keys(extensions: &mut Value, rewrite: impl Fn(&str) -> String) {
    if let Value::Object(map) = extensions {
        let rewritten: Map<String, Value> = std::mem::take(map)
            .into_iter()
            .map(|(key, value)| (rewrite(&key), value))
            .collect();
        *map = rewritten;
    }
}

fn each_extension_map(statement: &mut Value, rewrite: &dyn Fn(&str) -> String) {
    for path in EXTENSION_PATHS {
        if let Some(extensions) = path
            .iter()
            .try_fold(&mut *statement, |node, key| node.get_mut(*key))
        {
            rewrite_keys(extensions, rewrite);
        }
    }

    let is_sub_statement = statement
        .pointer("/object/objectType")
        .and_then(Value::as_str)
        == Some("SubStatement");
    if is_sub_statement {
        if let Some(object) = statement.get_mut("object") {
            each_extension_map(object, rewrite);
        }
    }
}

pub fn escape_key(key: &str) -> String {
    key.replace('.', DOT_PLACEHOLDER)
}

pub fn unescape_key(key: &str) -> String {
    key.replace(DOT_PLACEHOLDER, ".").replace(LEGACY_DOT, ".")
}

pub fn escape_statement(statement: &mut Value) {
    each_extension_map(statement, &escape_key);
}

pub fn unescape_statement(statement: &mut Value) {
    each_extension_map(statement, &unescape_key);
}

/// Restores the definition extensions of a stored activity object.
pub fn unescape_activity(activity: &mut Value) {
    if let Some(extensions) = activity.pointer_mut("/definition/extensions") {
        rewrite_keys(extensions, unescape_key);
    }
}
