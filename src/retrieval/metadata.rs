//! Metadata post-processing applied to every record the retriever returns.

use serde_json::{Map, Value};

/// Rewrites a metadata record in place.
pub trait MetadataPostProcessor: Send + Sync {
    fn process(&self, metadata: &mut Map<String, Value>);
}

/// Rewrites `path` as `parents/.../name` for files that live inside folders.
///
/// File-source connectors report a file's parent folder ids separately from
/// its name; this joins them back into a logical path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentFolderPath;

impl MetadataPostProcessor for ParentFolderPath {
    fn process(&self, metadata: &mut Map<String, Value>) {
        fix_parent_folder_path(metadata);
    }
}

/// Applies the [`ParentFolderPath`] rewrite.
///
/// Only fires when `path` already exists and `parents` is a non-empty array;
/// otherwise the record is left untouched.
pub fn fix_parent_folder_path(metadata: &mut Map<String, Value>) {
    if !metadata.contains_key("path") {
        return;
    }
    let parents: Vec<String> = match metadata.get("parents").and_then(Value::as_array) {
        Some(list) if !list.is_empty() => list.iter().map(value_as_segment).collect(),
        _ => return,
    };
    let name = metadata
        .get("name")
        .map(value_as_segment)
        .unwrap_or_default();
    let path = format!("{}/{}", parents.join("/"), name);
    metadata.insert("path".to_string(), Value::String(path));
}

fn value_as_segment(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_path_rebuilt_from_parents() {
        let mut m = obj(json!({
            "parents": ["f1", "f2"],
            "name": "doc.txt",
            "path": "doc.txt"
        }));
        fix_parent_folder_path(&mut m);
        assert_eq!(m["path"], "f1/f2/doc.txt");
    }

    #[test]
    fn test_empty_parents_leave_metadata_unchanged() {
        let original = obj(json!({"parents": [], "name": "doc.txt", "path": "doc.txt"}));
        let mut m = original.clone();
        fix_parent_folder_path(&mut m);
        assert_eq!(m, original);
    }

    #[test]
    fn test_missing_path_leaves_metadata_unchanged() {
        let original = obj(json!({"parents": ["f1"], "name": "doc.txt"}));
        let mut m = original.clone();
        ParentFolderPath.process(&mut m);
        assert_eq!(m, original);
    }

    #[test]
    fn test_missing_parents_leave_metadata_unchanged() {
        let original = obj(json!({"name": "doc.txt", "path": "a/doc.txt"}));
        let mut m = original.clone();
        fix_parent_folder_path(&mut m);
        assert_eq!(m, original);
    }
}
