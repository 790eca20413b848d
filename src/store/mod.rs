//! Read and write access to objects of a single cluster

mod cluster;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::{ResourceRef, Result};

pub use cluster::KubeStore;
pub use memory::{MemoryStore, Operation};

#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
	async fn get(&self, at: &ResourceRef) -> Result<Option<K>>;

	/// Objects in namespace carrying all of the labels
	async fn list(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<K>>;

	/// Create object if it is missing, otherwise converge fields we own
	async fn apply(&self, obj: &K) -> Result<K>;

	/// Deleting missing object is not an error
	async fn delete(&self, at: &ResourceRef) -> Result<()>;
}

pub(crate) fn label_selector(labels: &BTreeMap<String, String>) -> String {
	labels
		.iter()
		.map(|(k, v)| format!("{}={}", k, v))
		.collect::<Vec<_>>()
		.join(",")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn selector() {
		let labels = [
			("refsync.dev/managed-by".to_owned(), "vc".to_owned()),
			("app".to_owned(), "web".to_owned()),
		]
		.into_iter()
		.collect();
		assert_eq!(label_selector(&labels), "app=web,refsync.dev/managed-by=vc");
		assert_eq!(label_selector(&BTreeMap::new()), "");
	}
}
