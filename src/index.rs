//! Dependency index: for every dependent kind, which objects reference a key.
//!
//! Entries are derived from observed dependent objects only. Every update
//! replaces the whole contribution of a single object under one write lock,
//! so concurrent readers see either the old or the new set of its keys.

use std::{
	collections::{BTreeMap, BTreeSet},
	sync::{Arc, PoisonError, RwLock},
};

use kube::Resource;
use rustc_hash::FxHashMap;

use crate::{extract::ReferenceExtractor, ResourceRef};

#[derive(Default)]
struct Entries {
	by_key: FxHashMap<ResourceRef, BTreeSet<ResourceRef>>,
	by_object: FxHashMap<ResourceRef, Vec<ResourceRef>>,
}

impl Entries {
	fn unlink(&mut self, object: &ResourceRef) -> Vec<ResourceRef> {
		let keys = self.by_object.remove(object).unwrap_or_default();
		for key in &keys {
			if let Some(referrers) = self.by_key.get_mut(key) {
				referrers.remove(object);
				if referrers.is_empty() {
					self.by_key.remove(key);
				}
			}
		}
		keys
	}
}

/// Index of a single dependent kind
pub struct KindIndex {
	kind: String,
	entries: RwLock<Entries>,
}

impl KindIndex {
	pub fn new(kind: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			entries: RwLock::new(Entries::default()),
		}
	}

	pub fn kind(&self) -> &str {
		&self.kind
	}

	/// Replace keys referenced by object, returning the ones it referenced before
	pub fn set(&self, object: ResourceRef, mut keys: Vec<ResourceRef>) -> Vec<ResourceRef> {
		keys.sort();
		keys.dedup();

		let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
		let previous = entries.unlink(&object);
		for key in &keys {
			entries
				.by_key
				.entry(key.clone())
				.or_default()
				.insert(object.clone());
		}
		if !keys.is_empty() {
			entries.by_object.insert(object, keys);
		}
		previous
	}

	pub fn remove(&self, object: &ResourceRef) -> Vec<ResourceRef> {
		self.entries
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.unlink(object)
	}

	pub fn query(&self, key: &ResourceRef) -> BTreeSet<ResourceRef> {
		self.entries
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.by_key
			.get(key)
			.cloned()
			.unwrap_or_default()
	}

	/// Keys currently referenced by object, sorted
	pub fn keys_of(&self, object: &ResourceRef) -> Vec<ResourceRef> {
		self.entries
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.by_object
			.get(object)
			.cloned()
			.unwrap_or_default()
	}

	pub fn is_referenced(&self, key: &ResourceRef) -> bool {
		self.entries
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.by_key
			.contains_key(key)
	}

	/// Objects currently contributing at least one key
	pub fn objects(&self) -> Vec<ResourceRef> {
		self.entries
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.by_object
			.keys()
			.cloned()
			.collect()
	}

	/// Number of referenced keys
	pub fn len(&self) -> usize {
		self.entries
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.by_key
			.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Indexes of all registered dependent kinds
#[derive(Default)]
pub struct DependencyIndex {
	kinds: BTreeMap<String, Arc<KindIndex>>,
}

impl DependencyIndex {
	pub fn new() -> Self {
		Self::default()
	}

	/// Get or create index for kind
	pub fn register(&mut self, kind: &str) -> Arc<KindIndex> {
		self.kinds
			.entry(kind.to_owned())
			.or_insert_with(|| Arc::new(KindIndex::new(kind)))
			.clone()
	}

	pub fn kinds(&self) -> impl Iterator<Item = &str> {
		self.kinds.keys().map(String::as_str)
	}

	pub fn indexes(&self) -> impl Iterator<Item = &Arc<KindIndex>> {
		self.kinds.values()
	}

	pub fn kind(&self, kind: &str) -> Option<&Arc<KindIndex>> {
		self.kinds.get(kind)
	}

	/// Objects of kind referencing key, empty for unregistered kinds
	pub fn query(&self, kind: &str, key: &ResourceRef) -> BTreeSet<ResourceRef> {
		self.kinds
			.get(kind)
			.map(|index| index.query(key))
			.unwrap_or_default()
	}

	/// Referencing objects of every kind which has any
	pub fn referrers(&self, key: &ResourceRef) -> Vec<(&str, BTreeSet<ResourceRef>)> {
		self.kinds
			.iter()
			.map(|(kind, index)| (kind.as_str(), index.query(key)))
			.filter(|(_, found)| !found.is_empty())
			.collect()
	}
}

/// Keeps index of one kind up to date with observed objects
pub struct Indexer<E> {
	extractor: E,
	index: Arc<KindIndex>,
}

impl<E> Indexer<E>
where
	E: ReferenceExtractor,
	E::Object: Resource,
	<E::Object as Resource>::DynamicType: Default,
{
	pub fn new(extractor: E, index: &mut DependencyIndex) -> Self {
		let index = index.register(extractor.kind());
		Self { extractor, index }
	}

	pub fn extractor(&self) -> &E {
		&self.extractor
	}

	pub fn index(&self) -> &Arc<KindIndex> {
		&self.index
	}

	/// Index added or updated object.
	///
	/// Returns keys it references now or referenced before the change.
	pub fn observe(&self, obj: &E::Object) -> Vec<ResourceRef> {
		let object = match ResourceRef::of(obj) {
			Ok(object) => object,
			Err(e) => {
				log::warn!("not indexing {}: {}", self.extractor.kind(), e);
				return Vec::new();
			}
		};
		let keys = match self.extractor.extract(obj) {
			Ok(keys) => keys,
			Err(e) => {
				log::warn!(
					"failed to extract references of {} {}: {}",
					self.extractor.kind(),
					object,
					e
				);
				Vec::new()
			}
		};
		log::trace!(
			"{} {} references {} keys",
			self.extractor.kind(),
			object,
			keys.len()
		);
		let previous = self.index.set(object, keys.clone());
		union(previous, keys)
	}

	/// Drop deleted object, returning keys it referenced
	pub fn forget(&self, obj: &E::Object) -> Vec<ResourceRef> {
		match ResourceRef::of(obj) {
			Ok(object) => self.forget_ref(&object),
			Err(_) => Vec::new(),
		}
	}

	pub fn forget_ref(&self, object: &ResourceRef) -> Vec<ResourceRef> {
		self.index.remove(object)
	}
}

pub(crate) fn union(mut a: Vec<ResourceRef>, b: Vec<ResourceRef>) -> Vec<ResourceRef> {
	a.extend(b);
	a.sort();
	a.dedup();
	a
}
