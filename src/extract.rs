use std::marker::PhantomData;

use fieldpath::{FieldpathExt, PathBuf};
use kube::Resource;
use serde::Serialize;

use crate::{Error, ResourceRef, Result};

/// Maps object of dependent kind to the keys of objects it references
pub trait ReferenceExtractor: Send + Sync {
	type Object;

	/// Name of dependent kind, index is registered under it
	fn kind(&self) -> &str;

	/// Composite `namespace/name` keys, not yet validated
	fn extract_keys(&self, obj: &Self::Object) -> Result<Vec<String>>;

	fn extract(&self, obj: &Self::Object) -> Result<Vec<ResourceRef>> {
		let mut refs = self
			.extract_keys(obj)?
			.iter()
			.filter_map(|key| ResourceRef::parse_key(key))
			.collect::<Vec<_>>();
		refs.sort();
		refs.dedup();
		Ok(refs)
	}
}

/// How referenced name found in field is turned into key
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyScope {
	/// Bare name, always in namespace of the referencing object
	Local,
	/// Either bare name, or already `namespace/name`
	Qualified,
}

/// Extractor reading referenced names from a set of field paths
pub struct PathExtractor<K> {
	kind: String,
	rules: Vec<(PathBuf, KeyScope)>,
	_object: PhantomData<fn(&K)>,
}

impl<K> PathExtractor<K> {
	pub fn new(kind: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			rules: Vec::new(),
			_object: PhantomData,
		}
	}

	pub fn field(mut self, path: &str, scope: KeyScope) -> Result<Self> {
		let parsed = fieldpath::parse(path)
			.map_err(|e| Error::Config(format!("invalid field path {}: {}", path, e)))?;
		self.rules.push((parsed, scope));
		Ok(self)
	}

	pub fn fields<'a>(
		self,
		paths: impl IntoIterator<Item = &'a str>,
		scope: KeyScope,
	) -> Result<Self> {
		paths
			.into_iter()
			.try_fold(self, |this, path| this.field(path, scope))
	}
}

impl<K> ReferenceExtractor for PathExtractor<K>
where
	K: Resource + Serialize,
{
	type Object = K;

	fn kind(&self) -> &str {
		&self.kind
	}

	fn extract_keys(&self, obj: &K) -> Result<Vec<String>> {
		let namespace = obj.meta().namespace.clone().unwrap_or_default();
		let value = serde_json::to_value(obj)?;

		let mut keys = Vec::new();
		for (path, scope) in &self.rules {
			for found in value.collect_path(path)? {
				let name = match found.as_str() {
					Some(name) => name,
					None => continue,
				};
				match scope {
					KeyScope::Qualified if name.contains('/') => keys.push(name.to_owned()),
					_ => keys.push(format!("{}/{}", namespace, name)),
				}
			}
		}
		Ok(keys)
	}
}
