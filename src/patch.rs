//! JSON patch evaluator: a pure function `(payload, patch_ops) ->
//! new_payload | error`, operating on RFC 6901 JSON-Pointer paths. Kept as
//! a standalone evaluator over an explicit op list rather than mutating
//! in place piecemeal, so a failing op in the middle of a batch never
//! leaves the caller with a partially-applied document.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PatchOp {
    Set { path: String, value: Value },
    Delete { path: String },
    Insert { path: String, value: Value },
}

fn split_pointer(path: &str) -> Result<Vec<String>> {
    if path.is_empty() || path == "/" {
        return Err(EngineError::InvalidPath(path.to_string()));
    }
    if !path.starts_with('/') {
        return Err(EngineError::InvalidPath(format!(
            "path '{path}' must be a slash-delimited JSON Pointer"
        )));
    }
    Ok(path[1..]
        .split('/')
        .map(|seg| seg.replace("~1", "/").replace("~0", "~"))
        .collect())
}

/// Navigates to the parent of the pointer's final segment, returning the
/// parent value and the final key.
fn navigate_parent<'a>(root: &'a mut Value, segments: &[String]) -> Result<(&'a mut Value, &'a str)> {
    let (last, init) = segments.split_last().expect("split_pointer never returns empty");
    let mut current = root;
    for seg in init {
        current = current
            .get_mut(seg.as_str())
            .ok_or_else(|| EngineError::InvalidPath(format!("no such path segment '{seg}'")))?;
        if !current.is_object() {
            return Err(EngineError::InvalidPath(format!(
                "path segment '{seg}' is not an object"
            )));
        }
    }
    Ok((current, last.as_str()))
}

/// Applies `ops` in order to `payload`, which must decode as a JSON object
/// (a patch targeting a non-object payload fails with `NotJsonObject`). An
/// empty op list fails with `InvalidPatch`.
pub fn apply_patch(payload: &[u8], ops: &[PatchOp]) -> Result<Vec<u8>> {
    if ops.is_empty() {
        return Err(EngineError::InvalidPatch("patch must contain at least one operation".into()));
    }

    let mut root: Value = serde_json::from_slice(payload)?;
    if !root.is_object() {
        return Err(EngineError::NotJsonObject);
    }

    for op in ops {
        match op {
            PatchOp::Set { path, value } => {
                let segments = split_pointer(path)?;
                let (parent, key) = navigate_parent(&mut root, &segments)?;
                parent
                    .as_object_mut()
                    .expect("navigate_parent guarantees an object")
                    .insert(key.to_string(), value.clone());
            }
            PatchOp::Insert { path, value } => {
                let segments = split_pointer(path)?;
                let (parent, key) = navigate_parent(&mut root, &segments)?;
                let obj = parent.as_object_mut().expect("navigate_parent guarantees an object");
                if obj.contains_key(key) {
                    return Err(EngineError::InvalidPatch(format!("path '{path}' already exists")));
                }
                obj.insert(key.to_string(), value.clone());
            }
            PatchOp::Delete { path } => {
                let segments = split_pointer(path)?;
                let (parent, key) = navigate_parent(&mut root, &segments)?;
                let obj = parent.as_object_mut().expect("navigate_parent guarantees an object");
                if obj.remove(key).is_none() {
                    return Err(EngineError::InvalidPath(format!("no such path '{path}'")));
                }
            }
        }
    }

    Ok(serde_json::to_vec(&root)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_overwrites_and_creates() {
        let payload = br#"{"a":1}"#;
        let out = apply_patch(payload, &[PatchOp::Set { path: "/a".into(), value: json!(2) }]).unwrap();
        let v: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["a"], json!(2));
    }

    #[test]
    fn insert_fails_if_present() {
        let payload = br#"{"a":1}"#;
        let err = apply_patch(payload, &[PatchOp::Insert { path: "/a".into(), value: json!(2) }]);
        assert!(matches!(err, Err(EngineError::InvalidPatch(_))));
    }

    #[test]
    fn delete_removes_key() {
        let payload = br#"{"a":1,"b":2}"#;
        let out = apply_patch(payload, &[PatchOp::Delete { path: "/a".into() }]).unwrap();
        let v: Value = serde_json::from_slice(&out).unwrap();
        assert!(v.get("a").is_none());
        assert_eq!(v["b"], json!(2));
    }

    #[test]
    fn non_object_payload_rejected() {
        let payload = br#"[1,2,3]"#;
        let err = apply_patch(payload, &[PatchOp::Delete { path: "/0".into() }]);
        assert!(matches!(err, Err(EngineError::NotJsonObject)));
    }

    #[test]
    fn empty_patch_rejected() {
        let payload = br#"{"a":1}"#;
        assert!(matches!(apply_patch(payload, &[]), Err(EngineError::InvalidPatch(_))));
    }

    #[test]
    fn nested_set() {
        let payload = br#"{"a":{"b":1}}"#;
        let out = apply_patch(payload, &[PatchOp::Set { path: "/a/b".into(), value: json!(9) }]).unwrap();
        let v: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["a"]["b"], json!(9));
    }
}
