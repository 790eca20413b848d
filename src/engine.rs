//! Reconciliation of a single virtual object with its physical counterpart.
//!
//! Nothing is remembered between reconciliations: every call observes the
//! current pair and a fresh dependency index, decides, and acts. Actions
//! re-check their precondition, as usage or physical state may change after
//! the decision was made.

use std::{collections::BTreeMap, fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use kube::{runtime::controller::Action, Resource};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
	config::DEFAULT_RETRY_DELAY,
	equality::{applied_objects_equal, drifted_paths, stamp_last_applied},
	events::{EventRecorder, DELETE_ERROR, SYNC_ERROR},
	reference::kind_name,
	store::ObjectStore,
	translate::Translator,
	usage::UsagePredicate,
	Error, ResourceRef, Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
	/// Virtual object is gone, `physical` is whether it left a counterpart of ours
	VirtualAbsent { physical: bool },
	/// Nothing references virtual object
	Unused { physical: bool },
	UsedNoPhysical,
	UsedAndSynced,
	UsedAndDrifted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncDecision {
	CreateNeeded,
	UpdateNeeded,
	DeleteNeeded,
	NoOp,
}

impl SyncState {
	pub fn decision(self) -> SyncDecision {
		match self {
			Self::VirtualAbsent { physical: true } | Self::Unused { physical: true } => {
				SyncDecision::DeleteNeeded
			}
			Self::VirtualAbsent { physical: false } | Self::Unused { physical: false } => {
				SyncDecision::NoOp
			}
			Self::UsedNoPhysical => SyncDecision::CreateNeeded,
			Self::UsedAndSynced => SyncDecision::NoOp,
			Self::UsedAndDrifted => SyncDecision::UpdateNeeded,
		}
	}
}

/// Capabilities of a synced kind.
///
/// `*_needed` checks are advisory, every action checks its precondition again.
#[async_trait]
pub trait Syncer: Send + Sync {
	type Object: Resource + Clone + Send + Sync;

	fn name(&self) -> &str;

	fn physical_ref(&self, virtual_ref: &ResourceRef) -> Result<ResourceRef>;

	/// Virtual object which physical one belongs to, `None` for foreign objects
	fn origin(&self, physical: &Self::Object) -> Option<ResourceRef>;

	async fn is_used(&self, virtual_obj: &Self::Object) -> Result<bool>;

	async fn forward_create_needed(&self, virtual_obj: &Self::Object) -> Result<bool>;
	async fn forward_create(&self, virtual_obj: &Self::Object) -> Result<Action>;

	async fn forward_update_needed(
		&self,
		physical: &Self::Object,
		virtual_obj: &Self::Object,
	) -> Result<bool>;
	async fn forward_update(
		&self,
		physical: &Self::Object,
		virtual_obj: &Self::Object,
	) -> Result<Action>;

	/// Remove physical object, whose virtual counterpart no longer exists
	async fn forward_delete(&self, physical: &Self::Object) -> Result<Action>;

	async fn backward_update_needed(
		&self,
		_physical: &Self::Object,
		_virtual_obj: &Self::Object,
	) -> Result<bool> {
		Ok(false)
	}
	async fn backward_update(
		&self,
		_physical: &Self::Object,
		_virtual_obj: &Self::Object,
	) -> Result<Action> {
		Ok(Action::await_change())
	}
}

fn belongs_to<S: Syncer + ?Sized>(syncer: &S, physical: &S::Object, at: &ResourceRef) -> bool {
	syncer.origin(physical).as_ref() == Some(at)
}

pub async fn observe<S: Syncer + ?Sized>(
	syncer: &S,
	at: &ResourceRef,
	virtual_obj: Option<&S::Object>,
	physical: Option<&S::Object>,
) -> Result<SyncState> {
	let ours = physical.map_or(false, |p| belongs_to(syncer, p, at));
	let virtual_obj = match virtual_obj {
		Some(v) => v,
		None => return Ok(SyncState::VirtualAbsent { physical: ours }),
	};
	if !syncer.is_used(virtual_obj).await? {
		return Ok(SyncState::Unused { physical: ours });
	}
	match physical {
		None => Ok(SyncState::UsedNoPhysical),
		Some(p) if syncer.forward_update_needed(p, virtual_obj).await? => {
			Ok(SyncState::UsedAndDrifted)
		}
		Some(_) => Ok(SyncState::UsedAndSynced),
	}
}

pub async fn decide<S: Syncer + ?Sized>(
	syncer: &S,
	at: &ResourceRef,
	virtual_obj: Option<&S::Object>,
	physical: Option<&S::Object>,
) -> Result<SyncDecision> {
	Ok(observe(syncer, at, virtual_obj, physical).await?.decision())
}

/// Bring physical object at `at` in line with current virtual one
pub async fn reconcile<S: Syncer + ?Sized>(
	syncer: &S,
	at: &ResourceRef,
	virtual_obj: Option<&S::Object>,
	physical: Option<&S::Object>,
) -> Result<Action> {
	let state = observe(syncer, at, virtual_obj, physical).await?;
	log::debug!("{}: {} is {:?}", syncer.name(), at, state);

	match (state.decision(), virtual_obj, physical) {
		(SyncDecision::CreateNeeded, Some(v), _) => syncer.forward_create(v).await,
		(SyncDecision::UpdateNeeded, Some(v), Some(p))
		| (SyncDecision::DeleteNeeded, Some(v), Some(p)) => syncer.forward_update(p, v).await,
		(SyncDecision::DeleteNeeded, None, Some(p)) => syncer.forward_delete(p).await,
		(SyncDecision::NoOp, Some(v), Some(p)) => {
			if syncer.backward_update_needed(p, v).await? {
				syncer.backward_update(p, v).await
			} else {
				Ok(Action::await_change())
			}
		}
		_ => Ok(Action::await_change()),
	}
}

/// Syncer of a kind whose objects are mirrored only while referenced
pub struct SyncEngine<K, T> {
	name: String,
	translator: T,
	usage: Arc<dyn UsagePredicate>,
	virtual_store: Arc<dyn ObjectStore<K>>,
	physical_store: Arc<dyn ObjectStore<K>>,
	recorder: Arc<dyn EventRecorder>,
	retry_delay: Duration,
}

impl<K, T> SyncEngine<K, T>
where
	K: Resource + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
	K::DynamicType: Default,
	T: Translator<K>,
{
	pub fn new(
		name: impl Into<String>,
		translator: T,
		usage: Arc<dyn UsagePredicate>,
		virtual_store: Arc<dyn ObjectStore<K>>,
		physical_store: Arc<dyn ObjectStore<K>>,
		recorder: Arc<dyn EventRecorder>,
	) -> Self {
		Self {
			name: name.into(),
			translator,
			usage,
			virtual_store,
			physical_store,
			recorder,
			retry_delay: DEFAULT_RETRY_DELAY,
		}
	}

	pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
		self.retry_delay = retry_delay;
		self
	}

	pub fn translator(&self) -> &T {
		&self.translator
	}

	pub fn virtual_store(&self) -> &Arc<dyn ObjectStore<K>> {
		&self.virtual_store
	}

	pub fn physical_store(&self) -> &Arc<dyn ObjectStore<K>> {
		&self.physical_store
	}

	/// Reconcile every physical object carrying `labels`, including the ones
	/// whose virtual object is gone and so can't be reached from virtual side.
	///
	/// Returns number of objects that failed to reconcile.
	pub async fn sweep(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<usize> {
		let mut failed = 0;
		for physical in self.physical_store.list(namespace, labels).await? {
			let origin = match self.translator.virtual_ref(&physical) {
				Some(origin) => origin,
				None => continue,
			};
			let virtual_obj = match self.virtual_store.get(&origin).await {
				Ok(virtual_obj) => virtual_obj,
				Err(e) => {
					log::warn!("{}: sweep can't read {}: {}", self.name, origin, e);
					failed += 1;
					continue;
				}
			};
			if let Err(e) = reconcile(self, &origin, virtual_obj.as_ref(), Some(&physical)).await {
				log::warn!("{}: sweep of {} failed: {}", self.name, origin, e);
				failed += 1;
			}
		}
		Ok(failed)
	}

	fn desired(&self, virtual_obj: &K) -> Result<K> {
		let mut desired = self.translator.translate(virtual_obj)?;
		stamp_last_applied(&mut desired)?;
		Ok(desired)
	}

	fn check_owned(&self, physical: &K, virtual_ref: &ResourceRef) -> Result<()> {
		if self.translator.virtual_ref(physical).as_ref() == Some(virtual_ref) {
			return Ok(());
		}
		log::warn!(
			"{}: physical {} for {} exists, but wasn't created by us",
			self.name,
			kind_name::<K>(),
			virtual_ref
		);
		Err(Error::NotOwned(ResourceRef::of(physical)?))
	}

	fn failed(&self, target: ResourceRef, source: Error) -> Error {
		Error::Sync {
			target,
			retry_after: self.retry_delay,
			source: Box::new(source),
		}
	}

	/// Create or converge physical object, same path for missing and stale ones
	async fn upsert(&self, virtual_obj: &K) -> Result<Action> {
		let virtual_ref = ResourceRef::of(virtual_obj)?;
		let desired = self.desired(virtual_obj)?;

		if let Err(e) = self.physical_store.apply(&desired).await {
			log::info!(
				"error syncing {} to physical cluster: {}",
				virtual_ref,
				e
			);
			let regarding = virtual_obj.object_ref(&Default::default());
			self.recorder
				.warning(
					&regarding,
					SYNC_ERROR,
					format!("Error syncing to physical cluster: {}", e),
				)
				.await;
			return Err(self.failed(virtual_ref, e));
		}
		Ok(Action::await_change())
	}

	async fn delete_physical(&self, physical: &K, virtual_obj: Option<&K>) -> Result<Action> {
		let physical_ref = ResourceRef::of(physical)?;
		if let Err(e) = self.physical_store.delete(&physical_ref).await {
			log::info!(
				"error deleting physical object {} in physical cluster: {}",
				physical_ref,
				e
			);
			if let Some(virtual_obj) = virtual_obj {
				let regarding = virtual_obj.object_ref(&Default::default());
				self.recorder
					.warning(
						&regarding,
						DELETE_ERROR,
						format!("Error deleting from physical cluster: {}", e),
					)
					.await;
			}
			return Err(self.failed(physical_ref, e));
		}
		log::info!(
			"{}: pruned physical {} {}",
			self.name,
			kind_name::<K>(),
			physical_ref
		);
		Ok(Action::await_change())
	}
}

#[async_trait]
impl<K, T> Syncer for SyncEngine<K, T>
where
	K: Resource + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
	K::DynamicType: Default,
	T: Translator<K>,
{
	type Object = K;

	fn name(&self) -> &str {
		&self.name
	}

	fn physical_ref(&self, virtual_ref: &ResourceRef) -> Result<ResourceRef> {
		self.translator.physical_ref(virtual_ref)
	}

	fn origin(&self, physical: &K) -> Option<ResourceRef> {
		self.translator.virtual_ref(physical)
	}

	async fn is_used(&self, virtual_obj: &K) -> Result<bool> {
		self.usage.is_used(&ResourceRef::of(virtual_obj)?)
	}

	async fn forward_create_needed(&self, virtual_obj: &K) -> Result<bool> {
		let virtual_ref = ResourceRef::of(virtual_obj)?;
		if !self.usage.is_used(&virtual_ref)? {
			return Ok(false);
		}
		let physical_ref = self.translator.physical_ref(&virtual_ref)?;
		match self.physical_store.get(&physical_ref).await? {
			None => Ok(true),
			Some(existing) => {
				self.check_owned(&existing, &virtual_ref)?;
				Ok(false)
			}
		}
	}

	async fn forward_create(&self, virtual_obj: &K) -> Result<Action> {
		if !self.forward_create_needed(virtual_obj).await? {
			return Ok(Action::await_change());
		}
		self.upsert(virtual_obj).await
	}

	async fn forward_update_needed(&self, physical: &K, virtual_obj: &K) -> Result<bool> {
		let virtual_ref = ResourceRef::of(virtual_obj)?;
		if !self.usage.is_used(&virtual_ref)? {
			// needs a write, which is deletion
			return Ok(belongs_to(self, physical, &virtual_ref));
		}
		self.check_owned(physical, &virtual_ref)?;

		let desired = self.desired(virtual_obj)?;
		if applied_objects_equal(physical, &desired)? {
			return Ok(false);
		}
		if log::log_enabled!(log::Level::Debug) {
			let drifted = drifted_paths(
				&serde_json::to_value(physical)?,
				&serde_json::to_value(&desired)?,
			);
			log::debug!(
				"{}: {} drifted at {}",
				self.name,
				virtual_ref,
				drifted
					.iter()
					.map(ToString::to_string)
					.collect::<Vec<_>>()
					.join(", ")
			);
		}
		Ok(true)
	}

	async fn forward_update(&self, physical: &K, virtual_obj: &K) -> Result<Action> {
		let virtual_ref = ResourceRef::of(virtual_obj)?;
		if !self.usage.is_used(&virtual_ref)? {
			if !belongs_to(self, physical, &virtual_ref) {
				return Ok(Action::await_change());
			}
			log::debug!(
				"delete physical {} {}, because it is not used anymore",
				kind_name::<K>(),
				virtual_ref
			);
			return self.delete_physical(physical, Some(virtual_obj)).await;
		}
		self.check_owned(physical, &virtual_ref)?;
		self.upsert(virtual_obj).await
	}

	async fn forward_delete(&self, physical: &K) -> Result<Action> {
		let origin = match self.translator.virtual_ref(physical) {
			Some(origin) => origin,
			None => return Ok(Action::await_change()),
		};
		if self.virtual_store.get(&origin).await?.is_some() {
			log::debug!("{}: {} reappeared, keeping physical object", self.name, origin);
			return Ok(Action::await_change());
		}
		self.delete_physical(physical, None).await
	}

	async fn backward_update_needed(&self, physical: &K, virtual_obj: &K) -> Result<bool> {
		match self.translator.translate_backward(physical, virtual_obj) {
			Some(updated) => Ok(!applied_objects_equal(virtual_obj, &updated)?),
			None => Ok(false),
		}
	}

	async fn backward_update(&self, physical: &K, virtual_obj: &K) -> Result<Action> {
		let updated = match self.translator.translate_backward(physical, virtual_obj) {
			Some(updated) if !applied_objects_equal(virtual_obj, &updated)? => updated,
			_ => return Ok(Action::await_change()),
		};
		let virtual_ref = ResourceRef::of(virtual_obj)?;
		log::debug!("{}: updating virtual {} from physical", self.name, virtual_ref);
		if let Err(e) = self.virtual_store.apply(&updated).await {
			log::info!("error updating virtual {}: {}", virtual_ref, e);
			return Err(self.failed(virtual_ref, e));
		}
		Ok(Action::await_change())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		config::SyncConfig,
		events::MemoryRecorder,
		index::{DependencyIndex, KindIndex},
		store::{MemoryStore, Operation},
		translate::{MetadataTranslator, OBJECT_NAME_ANNOTATION},
	};
	use k8s_openapi::api::core::v1::ConfigMap;
	use serde_json::json;

	struct Fixture<T> {
		refs: Arc<KindIndex>,
		virtual_store: Arc<MemoryStore<ConfigMap>>,
		physical_store: Arc<MemoryStore<ConfigMap>>,
		recorder: Arc<MemoryRecorder>,
		engine: SyncEngine<ConfigMap, T>,
	}

	fn fixture_with<T: Translator<ConfigMap>>(translator: T) -> Fixture<T> {
		let mut deps = DependencyIndex::new();
		let refs = deps.register("holders");
		let virtual_store = Arc::new(MemoryStore::<ConfigMap>::new());
		let physical_store = Arc::new(MemoryStore::<ConfigMap>::new());
		let recorder = Arc::new(MemoryRecorder::new());
		let engine = SyncEngine::new(
			"configmap",
			translator,
			Arc::new(deps),
			virtual_store.clone(),
			physical_store.clone(),
			recorder.clone(),
		);
		Fixture {
			refs,
			virtual_store,
			physical_store,
			recorder,
			engine,
		}
	}

	fn fixture() -> Fixture<MetadataTranslator> {
		fixture_with(MetadataTranslator::new(&SyncConfig::new("target-ns", "vc")))
	}

	fn config_map(value: &str) -> ConfigMap {
		serde_json::from_value(json!({
			"apiVersion": "v1",
			"kind": "ConfigMap",
			"metadata": {"name": "settings", "namespace": "ns", "uid": "v-1"},
			"data": {"value": value},
		}))
		.unwrap()
	}

	fn at() -> ResourceRef {
		ResourceRef::new("ns", "settings")
	}

	fn physical_at() -> ResourceRef {
		ResourceRef::new("target-ns", "settings")
	}

	fn reference(f: &Fixture<impl Translator<ConfigMap>>) {
		f.refs.set(ResourceRef::new("ns", "holder"), vec![at()]);
	}

	async fn run<T: Translator<ConfigMap>>(f: &Fixture<T>, v: Option<&ConfigMap>) -> Result<Action> {
		let physical = f.physical_store.snapshot(&physical_at());
		reconcile(&f.engine, &at(), v, physical.as_ref()).await
	}

	#[test]
	fn decisions() {
		assert_eq!(
			SyncState::VirtualAbsent { physical: true }.decision(),
			SyncDecision::DeleteNeeded
		);
		assert_eq!(
			SyncState::VirtualAbsent { physical: false }.decision(),
			SyncDecision::NoOp
		);
		assert_eq!(
			SyncState::Unused { physical: true }.decision(),
			SyncDecision::DeleteNeeded
		);
		assert_eq!(
			SyncState::Unused { physical: false }.decision(),
			SyncDecision::NoOp
		);
		assert_eq!(SyncState::UsedNoPhysical.decision(), SyncDecision::CreateNeeded);
		assert_eq!(SyncState::UsedAndSynced.decision(), SyncDecision::NoOp);
		assert_eq!(SyncState::UsedAndDrifted.decision(), SyncDecision::UpdateNeeded);
	}

	#[tokio::test]
	async fn unused_is_not_created() {
		let f = fixture();
		let v = config_map("1");
		assert!(!f.engine.forward_create_needed(&v).await.unwrap());
		assert_eq!(
			observe(&f.engine, &at(), Some(&v), None).await.unwrap(),
			SyncState::Unused { physical: false }
		);
		assert_eq!(run(&f, Some(&v)).await.unwrap(), Action::await_change());
		assert!(f.physical_store.is_empty());
	}

	#[tokio::test]
	async fn used_is_created_and_converges() {
		let f = fixture();
		let v = config_map("1");
		reference(&f);

		assert_eq!(
			decide(&f.engine, &at(), Some(&v), None).await.unwrap(),
			SyncDecision::CreateNeeded
		);
		run(&f, Some(&v)).await.unwrap();
		let physical = f.physical_store.snapshot(&physical_at()).unwrap();
		assert_eq!(physical.data, v.data);
		assert_ne!(physical.metadata.uid.as_deref(), Some("v-1"));

		let writes = f.physical_store.writes();
		assert_eq!(
			observe(&f.engine, &at(), Some(&v), Some(&physical)).await.unwrap(),
			SyncState::UsedAndSynced
		);
		run(&f, Some(&v)).await.unwrap();
		assert_eq!(f.physical_store.writes(), writes);
	}

	#[tokio::test]
	async fn changed_virtual_is_updated() {
		let f = fixture();
		reference(&f);
		run(&f, Some(&config_map("1"))).await.unwrap();

		let v = config_map("2");
		let physical = f.physical_store.snapshot(&physical_at()).unwrap();
		assert!(f.engine.forward_update_needed(&physical, &v).await.unwrap());
		run(&f, Some(&v)).await.unwrap();
		let physical = f.physical_store.snapshot(&physical_at()).unwrap();
		assert_eq!(physical.data, v.data);
		assert!(!f.engine.forward_update_needed(&physical, &v).await.unwrap());
	}

	#[tokio::test]
	async fn unreferenced_is_pruned() {
		let f = fixture();
		let v = config_map("1");
		reference(&f);
		run(&f, Some(&v)).await.unwrap();
		assert_eq!(f.physical_store.len(), 1);

		f.refs.remove(&ResourceRef::new("ns", "holder"));
		let physical = f.physical_store.snapshot(&physical_at()).unwrap();
		assert!(f.engine.forward_update_needed(&physical, &v).await.unwrap());
		assert_eq!(
			decide(&f.engine, &at(), Some(&v), Some(&physical)).await.unwrap(),
			SyncDecision::DeleteNeeded
		);
		run(&f, Some(&v)).await.unwrap();
		assert!(f.physical_store.is_empty());
	}

	#[tokio::test]
	async fn create_rechecks_usage() {
		let f = fixture();
		let v = config_map("1");
		reference(&f);
		assert!(f.engine.forward_create_needed(&v).await.unwrap());

		f.refs.remove(&ResourceRef::new("ns", "holder"));
		f.engine.forward_create(&v).await.unwrap();
		assert!(f.physical_store.is_empty());
	}

	#[tokio::test]
	async fn foreign_objects_are_left_alone() {
		let f = fixture();
		let v = config_map("1");
		let mut foreign = config_map("foreign");
		foreign.metadata.namespace = Some("target-ns".into());
		f.physical_store.insert(foreign.clone()).unwrap();

		reference(&f);
		assert!(matches!(
			f.engine.forward_create_needed(&v).await,
			Err(Error::NotOwned(_))
		));
		assert!(matches!(
			run(&f, Some(&v)).await,
			Err(Error::NotOwned(_))
		));

		f.refs.remove(&ResourceRef::new("ns", "holder"));
		run(&f, Some(&v)).await.unwrap();
		run(&f, None).await.unwrap();
		assert_eq!(
			f.physical_store.snapshot(&physical_at()).unwrap().data,
			foreign.data
		);
		assert_eq!(f.physical_store.writes(), 0);
	}

	#[tokio::test]
	async fn virtual_absent_deletes_owned() {
		let f = fixture();
		let v = config_map("1");
		reference(&f);
		run(&f, Some(&v)).await.unwrap();

		let physical = f.physical_store.snapshot(&physical_at()).unwrap();
		assert_eq!(
			observe(&f.engine, &at(), None, Some(&physical)).await.unwrap(),
			SyncState::VirtualAbsent { physical: true }
		);
		run(&f, None).await.unwrap();
		assert!(f.physical_store.is_empty());
	}

	#[tokio::test]
	async fn sweep_prunes_orphans() {
		let f = fixture();
		let v = config_map("1");
		reference(&f);
		run(&f, Some(&v)).await.unwrap();
		let mut foreign = config_map("foreign");
		foreign.metadata.name = Some("foreign".into());
		foreign.metadata.namespace = Some("target-ns".into());
		f.physical_store.insert(foreign).unwrap();

		let labels = f.engine.translator().managed_labels();
		f.virtual_store.insert(v).unwrap();
		assert_eq!(f.engine.sweep("target-ns", &labels).await.unwrap(), 0);
		assert_eq!(f.physical_store.len(), 2);

		f.virtual_store.remove(&at());
		assert_eq!(f.engine.sweep("target-ns", &labels).await.unwrap(), 0);
		assert_eq!(f.physical_store.len(), 1);
		assert!(f.physical_store.snapshot(&physical_at()).is_none());
	}

	#[tokio::test]
	async fn sweep_skips_unreadable_virtual() {
		let f = fixture();
		let mut other = config_map("2");
		other.metadata.name = Some("other".into());
		f.refs.set(
			ResourceRef::new("ns", "holder"),
			vec![at(), ResourceRef::new("ns", "other")],
		);
		f.engine.forward_create(&config_map("1")).await.unwrap();
		f.engine.forward_create(&other).await.unwrap();
		assert_eq!(f.physical_store.len(), 2);

		let labels = f.engine.translator().managed_labels();
		f.virtual_store.fail_next(Operation::Get, 1);
		assert_eq!(f.engine.sweep("target-ns", &labels).await.unwrap(), 1);
		assert_eq!(f.physical_store.len(), 1);

		assert_eq!(f.engine.sweep("target-ns", &labels).await.unwrap(), 0);
		assert!(f.physical_store.is_empty());
	}

	#[tokio::test]
	async fn sweep_fails_when_listing_fails() {
		let f = fixture();
		let labels = f.engine.translator().managed_labels();
		f.physical_store.fail_next(Operation::List, 1);
		assert!(matches!(
			f.engine.sweep("target-ns", &labels).await,
			Err(Error::Unavailable(_))
		));
	}

	#[tokio::test]
	async fn forward_delete_rechecks_virtual() {
		let f = fixture();
		let v = config_map("1");
		reference(&f);
		run(&f, Some(&v)).await.unwrap();
		f.virtual_store.insert(v.clone()).unwrap();

		let physical = f.physical_store.snapshot(&physical_at()).unwrap();
		f.engine.forward_delete(&physical).await.unwrap();
		assert_eq!(f.physical_store.len(), 1);
	}

	#[tokio::test]
	async fn invalid_object_aborts_without_writes() {
		let f = fixture();
		let mut v = config_map("1");
		reference(&f);
		v.metadata.namespace = None;
		assert!(matches!(
			f.engine.forward_create(&v).await,
			Err(Error::InvalidObject(..))
		));
		assert!(f.physical_store.is_empty());
	}

	#[tokio::test]
	async fn apply_failure_requests_retry() {
		let f = fixture();
		let v = config_map("1");
		reference(&f);
		f.physical_store.fail_next(Operation::Apply, 1);

		let err = run(&f, Some(&v)).await.unwrap_err();
		assert_eq!(err.retry_after(), Some(DEFAULT_RETRY_DELAY));
		let events = f.recorder.events();
		assert_eq!(events.len(), 1);
		assert_eq!(events[0].reason, SYNC_ERROR);
		assert_eq!(events[0].regarding.name.as_deref(), Some("settings"));

		run(&f, Some(&v)).await.unwrap();
		assert_eq!(f.physical_store.len(), 1);
	}

	#[tokio::test]
	async fn delete_failure_requests_retry() {
		let f = fixture();
		let v = config_map("1");
		reference(&f);
		run(&f, Some(&v)).await.unwrap();
		f.refs.remove(&ResourceRef::new("ns", "holder"));
		f.physical_store.fail_next(Operation::Delete, 1);

		let err = run(&f, Some(&v)).await.unwrap_err();
		assert!(err.is_retryable());
		assert_eq!(f.recorder.events()[0].reason, DELETE_ERROR);
		run(&f, Some(&v)).await.unwrap();
		assert!(f.physical_store.is_empty());
	}

	/// Copies `observed` key of physical object back to the virtual one
	struct Reflecting(MetadataTranslator);

	impl Translator<ConfigMap> for Reflecting {
		fn translate(&self, virtual_obj: &ConfigMap) -> Result<ConfigMap> {
			Translator::<ConfigMap>::translate(&self.0, virtual_obj)
		}

		fn physical_ref(&self, virtual_ref: &ResourceRef) -> Result<ResourceRef> {
			Translator::<ConfigMap>::physical_ref(&self.0, virtual_ref)
		}

		fn virtual_ref(&self, physical: &ConfigMap) -> Option<ResourceRef> {
			self.0.origin_of(physical)
		}

		fn translate_backward(
			&self,
			physical: &ConfigMap,
			virtual_obj: &ConfigMap,
		) -> Option<ConfigMap> {
			let observed = physical.metadata.annotations.as_ref()?.get("observed")?;
			let mut updated = virtual_obj.clone();
			updated
				.metadata
				.annotations
				.get_or_insert_with(Default::default)
				.insert("observed".to_owned(), observed.clone());
			Some(updated)
		}
	}

	#[tokio::test]
	async fn virtual_authoritative_has_no_backward_sync() {
		let f = fixture();
		let v = config_map("1");
		reference(&f);
		run(&f, Some(&v)).await.unwrap();
		let physical = f.physical_store.snapshot(&physical_at()).unwrap();
		assert!(!f.engine.backward_update_needed(&physical, &v).await.unwrap());
	}

	#[tokio::test]
	async fn backward_sync() {
		let f = fixture_with(Reflecting(MetadataTranslator::new(&SyncConfig::new(
			"target-ns",
			"vc",
		))));
		let v = config_map("1");
		reference(&f);
		run(&f, Some(&v)).await.unwrap();

		let mut physical = f.physical_store.snapshot(&physical_at()).unwrap();
		assert!(!f.engine.backward_update_needed(&physical, &v).await.unwrap());
		physical
			.metadata
			.annotations
			.get_or_insert_with(Default::default)
			.insert("observed".to_owned(), "ready".to_owned());
		f.physical_store.insert(physical).unwrap();

		run(&f, Some(&v)).await.unwrap();
		let updated = f.virtual_store.snapshot(&at()).unwrap();
		let annotations = updated.metadata.annotations.unwrap();
		assert_eq!(annotations.get("observed").map(String::as_str), Some("ready"));
		assert_eq!(annotations.get(OBJECT_NAME_ANNOTATION), None);
	}
}
