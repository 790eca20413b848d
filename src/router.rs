//! Turns watch events of a dependent kind into reconciliation requests.

use kube::{runtime::watcher::Event, Resource};
use rustc_hash::FxHashSet;

use crate::{
	extract::ReferenceExtractor,
	index::{union, Indexer},
	ResourceRef,
};

/// Keeps dependency index of one kind in sync with its watch stream.
///
/// Index is always updated before requests are returned, so reconciliation
/// triggered by them sees the change that caused it.
pub struct ChangeRouter<E> {
	indexer: Indexer<E>,
	/// Objects seen during ongoing relist
	relisted: Option<FxHashSet<ResourceRef>>,
}

impl<E> ChangeRouter<E>
where
	E: ReferenceExtractor,
	E::Object: Resource,
	<E::Object as Resource>::DynamicType: Default,
{
	pub fn new(indexer: Indexer<E>) -> Self {
		Self {
			indexer,
			relisted: None,
		}
	}

	pub fn indexer(&self) -> &Indexer<E> {
		&self.indexer
	}

	/// Keys referenced by object, no index update
	pub fn map(&self, obj: &E::Object) -> Vec<ResourceRef> {
		match self.indexer.extractor().extract(obj) {
			Ok(keys) => keys,
			Err(e) => {
				log::warn!(
					"failed to extract references of {}: {}",
					self.indexer.extractor().kind(),
					e
				);
				Vec::new()
			}
		}
	}

	/// Apply watch event to index, returning keys needing reconciliation
	pub fn route(&mut self, event: Event<E::Object>) -> Vec<ResourceRef> {
		let keys = match event {
			Event::Apply(obj) => self.indexer.observe(&obj),
			Event::Delete(obj) => self.indexer.forget(&obj),
			Event::Init => {
				log::debug!("relisting {}", self.indexer.extractor().kind());
				self.relisted = Some(FxHashSet::default());
				Vec::new()
			}
			Event::InitApply(obj) => {
				if let (Some(relisted), Ok(at)) = (self.relisted.as_mut(), ResourceRef::of(&obj)) {
					relisted.insert(at);
				}
				self.indexer.observe(&obj)
			}
			Event::InitDone => self.finish_relist(),
		};
		union(keys, Vec::new())
	}

	/// Objects missing from the relist were deleted while not watching
	fn finish_relist(&mut self) -> Vec<ResourceRef> {
		let relisted = match self.relisted.take() {
			Some(relisted) => relisted,
			None => return Vec::new(),
		};
		let mut keys = Vec::new();
		for object in self.indexer.index().objects() {
			if relisted.contains(&object) {
				continue;
			}
			log::debug!(
				"{} {} is gone after relist",
				self.indexer.extractor().kind(),
				object
			);
			keys.extend(self.indexer.forget_ref(&object));
		}
		keys
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		extract::{KeyScope, PathExtractor},
		index::DependencyIndex,
	};
	use k8s_openapi::api::core::v1::ConfigMap;
	use serde_json::json;

	fn holder(name: &str, secret: Option<&str>) -> ConfigMap {
		serde_json::from_value(json!({
			"apiVersion": "v1",
			"kind": "ConfigMap",
			"metadata": {"name": name, "namespace": "ns"},
			"data": match secret {
				Some(secret) => json!({"secret": secret}),
				None => json!({}),
			},
		}))
		.unwrap()
	}

	fn router() -> (DependencyIndex, ChangeRouter<PathExtractor<ConfigMap>>) {
		let mut deps = DependencyIndex::new();
		let extractor = PathExtractor::new("holders")
			.field(".data.secret", KeyScope::Local)
			.unwrap();
		let router = ChangeRouter::new(Indexer::new(extractor, &mut deps));
		(deps, router)
	}

	fn key(name: &str) -> ResourceRef {
		ResourceRef::new("ns", name)
	}

	#[test]
	fn apply_and_delete() {
		let (deps, mut router) = router();
		assert_eq!(
			router.route(Event::Apply(holder("a", Some("db")))),
			vec![key("db")]
		);
		assert!(deps.query("holders", &key("db")).contains(&key("a")));

		assert_eq!(
			router.route(Event::Apply(holder("a", Some("cache")))),
			vec![key("cache"), key("db")]
		);
		assert!(deps.query("holders", &key("db")).is_empty());

		assert_eq!(
			router.route(Event::Delete(holder("a", Some("cache")))),
			vec![key("cache")]
		);
		assert!(router.indexer().index().is_empty());
	}

	#[test]
	fn dropped_reference_is_routed() {
		let (_deps, mut router) = router();
		router.route(Event::Apply(holder("a", Some("db"))));
		assert_eq!(
			router.route(Event::Apply(holder("a", None))),
			vec![key("db")]
		);
	}

	#[test]
	fn map_does_not_index() {
		let (deps, router) = router();
		assert_eq!(router.map(&holder("a", Some("db"))), vec![key("db")]);
		assert!(deps.query("holders", &key("db")).is_empty());
	}

	#[test]
	fn relist_forgets_missing() {
		let (deps, mut router) = router();
		router.route(Event::Apply(holder("a", Some("db"))));
		router.route(Event::Apply(holder("b", Some("cache"))));

		assert!(router.route(Event::Init).is_empty());
		assert_eq!(
			router.route(Event::InitApply(holder("a", Some("db")))),
			vec![key("db")]
		);
		assert_eq!(router.route(Event::InitDone), vec![key("cache")]);
		assert!(deps.query("holders", &key("cache")).is_empty());
		assert!(!deps.query("holders", &key("db")).is_empty());
	}

	#[test]
	fn done_without_init() {
		let (_deps, mut router) = router();
		router.route(Event::Apply(holder("a", Some("db"))));
		assert!(router.route(Event::InitDone).is_empty());
		assert_eq!(router.indexer().index().len(), 1);
	}
}
