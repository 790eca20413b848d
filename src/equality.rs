//! Comparison of desired objects with what is applied in physical cluster.
//!
//! Only fields written by us are compared, anything apiserver or other
//! controllers add to the object is ignored.

use fieldpath::PathBuf;
use kube::Resource;
use serde::Serialize;
use serde_json::Value;

use crate::Result;

/// Canonical form of the last desired object, makes removed fields visible
pub const LAST_APPLIED_ANNOTATION: &str = "refsync.dev/last-applied";

/// Stamping an already stamped object yields the same stamp
pub fn stamp_last_applied<K: Resource + Serialize>(desired: &mut K) -> Result<()> {
	let meta = desired.meta_mut();
	if let Some(annotations) = meta.annotations.as_mut() {
		annotations.remove(LAST_APPLIED_ANNOTATION);
		if annotations.is_empty() {
			meta.annotations = None;
		}
	}
	let canonical = serde_json::to_string(&*desired)?;
	desired
		.meta_mut()
		.annotations
		.get_or_insert_with(Default::default)
		.insert(LAST_APPLIED_ANNOTATION.to_owned(), canonical);
	Ok(())
}

fn is_empty_value(value: &Value) -> bool {
	match value {
		Value::Null => true,
		Value::Object(obj) => obj.is_empty(),
		Value::Array(arr) => arr.is_empty(),
		_ => false,
	}
}

/// Every field of desired is present in actual with the same value.
/// Maps are compared by keys of desired only, everything else exactly.
pub fn is_subset(desired: &Value, actual: &Value) -> bool {
	match (desired, actual) {
		(Value::Object(desired), Value::Object(actual)) => {
			desired.iter().all(|(key, value)| match actual.get(key) {
				Some(found) => is_subset(value, found),
				None => is_empty_value(value),
			})
		}
		(desired, actual) if is_empty_value(desired) && is_empty_value(actual) => true,
		(desired, actual) => desired == actual,
	}
}

pub fn applied_objects_equal<K: Serialize>(physical: &K, desired: &K) -> Result<bool> {
	let physical = serde_json::to_value(physical)?;
	let desired = serde_json::to_value(desired)?;
	Ok(is_subset(&desired, &physical))
}

/// Paths at which physical object differs from desired one
pub fn drifted_paths(physical: &Value, desired: &Value) -> Vec<PathBuf> {
	let patch = json_patch::diff(physical, desired);
	let ops = match serde_json::to_value(&patch) {
		Ok(Value::Array(ops)) => ops,
		_ => return Vec::new(),
	};
	ops.iter()
		.filter(|op| op["op"] != "remove")
		.filter_map(|op| op["path"].as_str())
		.map(|pointer| PathBuf::from_rfc6901(pointer, desired))
		.collect()
}
