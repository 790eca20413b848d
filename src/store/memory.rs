use std::{
	collections::BTreeMap,
	sync::{
		atomic::{AtomicU64, AtomicUsize, Ordering},
		Mutex, PoisonError,
	},
};

use async_trait::async_trait;
use kube::Resource;
use rustc_hash::FxHashMap;

use super::ObjectStore;
use crate::{Error, ResourceRef, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	Get,
	List,
	Apply,
	Delete,
}

/// In-process store, mimics apiserver bookkeeping of uid and resourceVersion.
///
/// Failures of any operation may be injected to emulate unavailable cluster.
pub struct MemoryStore<K> {
	objects: Mutex<BTreeMap<ResourceRef, K>>,
	failures: Mutex<FxHashMap<Operation, usize>>,
	revision: AtomicU64,
	writes: AtomicUsize,
}

impl<K> Default for MemoryStore<K> {
	fn default() -> Self {
		Self {
			objects: Mutex::new(BTreeMap::new()),
			failures: Mutex::new(FxHashMap::default()),
			revision: AtomicU64::new(0),
			writes: AtomicUsize::new(0),
		}
	}
}

impl<K> MemoryStore<K>
where
	K: Resource + Clone,
	K::DynamicType: Default,
{
	pub fn new() -> Self {
		Self::default()
	}

	/// Put object as is, bypassing failure injection
	pub fn insert(&self, obj: K) -> Result<()> {
		let at = ResourceRef::of(&obj)?;
		self.lock().insert(at, obj);
		Ok(())
	}

	pub fn remove(&self, at: &ResourceRef) -> Option<K> {
		self.lock().remove(at)
	}

	pub fn snapshot(&self, at: &ResourceRef) -> Option<K> {
		self.lock().get(at).cloned()
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Make next `times` calls of operation fail
	pub fn fail_next(&self, operation: Operation, times: usize) {
		self.failures
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(operation, times);
	}

	/// Number of successful applies and deletes
	pub fn writes(&self) -> usize {
		self.writes.load(Ordering::SeqCst)
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ResourceRef, K>> {
		self.objects.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn check(&self, operation: Operation) -> Result<()> {
		let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
		match failures.get_mut(&operation) {
			Some(left) if *left > 0 => {
				*left -= 1;
				Err(Error::Unavailable(format!("injected {:?} failure", operation)))
			}
			_ => Ok(()),
		}
	}
}

fn has_labels<K: Resource>(obj: &K, labels: &BTreeMap<String, String>) -> bool {
	let found = obj.meta().labels.as_ref();
	labels
		.iter()
		.all(|(k, v)| found.and_then(|found| found.get(k)) == Some(v))
}

#[async_trait]
impl<K> ObjectStore<K> for MemoryStore<K>
where
	K: Resource + Clone + Send + Sync,
	K::DynamicType: Default,
{
	async fn get(&self, at: &ResourceRef) -> Result<Option<K>> {
		self.check(Operation::Get)?;
		Ok(self.snapshot(at))
	}

	async fn list(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<K>> {
		self.check(Operation::List)?;
		Ok(self
			.lock()
			.iter()
			.filter(|(at, obj)| at.namespace == namespace && has_labels(*obj, labels))
			.map(|(_, obj)| obj.clone())
			.collect())
	}

	async fn apply(&self, obj: &K) -> Result<K> {
		self.check(Operation::Apply)?;
		let at = ResourceRef::of(obj)?;
		let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;

		let mut objects = self.lock();
		let mut applied = obj.clone();
		let uid = match objects.get(&at) {
			Some(existing) => existing.meta().uid.clone(),
			None => Some(format!("uid-{}", revision)),
		};
		applied.meta_mut().uid = uid;
		applied.meta_mut().resource_version = Some(revision.to_string());
		objects.insert(at, applied.clone());
		self.writes.fetch_add(1, Ordering::SeqCst);
		Ok(applied)
	}

	async fn delete(&self, at: &ResourceRef) -> Result<()> {
		self.check(Operation::Delete)?;
		if self.lock().remove(at).is_some() {
			self.writes.fetch_add(1, Ordering::SeqCst);
		}
		Ok(())
	}
}
