use std::collections::BTreeMap;

use fieldpath::{path, FieldpathExt};
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
	config::{NamingStrategy, SyncConfig},
	reference::kind_name,
	Error, ResourceRef, Result,
};

pub const MANAGED_BY_LABEL: &str = "refsync.dev/managed-by";
pub const OBJECT_NAME_ANNOTATION: &str = "refsync.dev/object-name";
pub const OBJECT_NAMESPACE_ANNOTATION: &str = "refsync.dev/object-namespace";

/// Longest name accepted by apiserver for most kinds
const MAX_NAME_LENGTH: usize = 253;

/// Maps virtual object to its physical representation
pub trait Translator<K>: Send + Sync {
	fn translate(&self, virtual_obj: &K) -> Result<K>;

	/// Where physical counterpart of virtual object lives
	fn physical_ref(&self, virtual_ref: &ResourceRef) -> Result<ResourceRef>;

	/// Virtual object physical one was created from, `None` if it isn't ours
	fn virtual_ref(&self, physical: &K) -> Option<ResourceRef>;

	/// Virtual object updated with state owned by physical side.
	///
	/// Virtual side is authoritative unless overridden.
	fn translate_backward(&self, _physical: &K, _virtual_obj: &K) -> Option<K> {
		None
	}
}

/// Remove fields populated by apiserver, they have no meaning in other cluster
pub fn strip_server_fields(value: &mut Value) {
	for path in [
		path!(."metadata"."managedFields"),
		path!(."metadata"."selfLink"),
		path!(."metadata"."uid"),
		path!(."metadata"."resourceVersion"),
		path!(."metadata"."generation"),
		path!(."metadata"."creationTimestamp"),
		path!(."metadata"."deletionTimestamp"),
		path!(."metadata"."deletionGracePeriodSeconds"),
		path!(."metadata"."generateName"),
		path!(."metadata"."ownerReferences"),
		path!(."metadata"."finalizers"),
		path!(."metadata"."annotations"."kubectl.kubernetes.io/last-applied-configuration"),
		path!(."status"),
	]
	.iter()
	{
		let _res = value.remove_path(path);
	}
}

/// Identity rewriting shared by every kind
#[derive(Clone, Debug)]
pub struct MetadataTranslator {
	target_namespace: String,
	owner: String,
	naming: NamingStrategy,
}

impl MetadataTranslator {
	pub fn new(config: &SyncConfig) -> Self {
		Self {
			target_namespace: config.target_namespace.clone(),
			owner: config.owner.clone(),
			naming: config.naming,
		}
	}

	/// Labels every object created by this syncer carries
	pub fn managed_labels(&self) -> BTreeMap<String, String> {
		[(MANAGED_BY_LABEL.to_owned(), self.owner.clone())]
			.into_iter()
			.collect()
	}

	pub fn owns<K: Resource>(&self, physical: &K) -> bool {
		physical
			.meta()
			.labels
			.as_ref()
			.and_then(|labels| labels.get(MANAGED_BY_LABEL))
			.map(|owner| owner == &self.owner)
			.unwrap_or(false)
	}

	fn physical_name(&self, virtual_ref: &ResourceRef) -> Result<String> {
		let name = match self.naming {
			NamingStrategy::Preserve => virtual_ref.name.clone(),
			NamingStrategy::Qualified => format!(
				"{}-x-{}-x-{}",
				virtual_ref.name, virtual_ref.namespace, self.owner
			),
		};
		if name.len() > MAX_NAME_LENGTH {
			return Err(Error::InvalidObject(
				virtual_ref.to_string(),
				format!("physical name {} is too long", name),
			));
		}
		Ok(name)
	}

	pub fn setup_metadata<K>(&self, virtual_obj: &K) -> Result<K>
	where
		K: Resource + Serialize + DeserializeOwned,
		K::DynamicType: Default,
	{
		let origin = ResourceRef::of(virtual_obj)?;
		let target = self.physical_ref_of(&origin)?;

		let mut value = serde_json::to_value(virtual_obj)?;
		strip_server_fields(&mut value);
		let mut obj: K = serde_json::from_value(value).map_err(|e| {
			Error::InvalidObject(format!("{} {}", kind_name::<K>(), origin), e.to_string())
		})?;

		let meta = obj.meta_mut();
		meta.name = Some(target.name);
		meta.namespace = Some(target.namespace);
		meta.labels
			.get_or_insert_with(Default::default)
			.insert(MANAGED_BY_LABEL.to_owned(), self.owner.clone());
		let annotations = meta.annotations.get_or_insert_with(Default::default);
		annotations.insert(OBJECT_NAME_ANNOTATION.to_owned(), origin.name);
		annotations.insert(OBJECT_NAMESPACE_ANNOTATION.to_owned(), origin.namespace);
		Ok(obj)
	}

	fn physical_ref_of(&self, virtual_ref: &ResourceRef) -> Result<ResourceRef> {
		Ok(ResourceRef::new(
			self.target_namespace.clone(),
			self.physical_name(virtual_ref)?,
		))
	}

	pub fn origin_of<K: Resource>(&self, physical: &K) -> Option<ResourceRef> {
		if !self.owns(physical) {
			return None;
		}
		let annotations = physical.meta().annotations.as_ref()?;
		let name = annotations.get(OBJECT_NAME_ANNOTATION)?;
		let namespace = annotations.get(OBJECT_NAMESPACE_ANNOTATION)?;
		if name.is_empty() || namespace.is_empty() {
			return None;
		}
		Some(ResourceRef::new(namespace.clone(), name.clone()))
	}
}

impl<K> Translator<K> for MetadataTranslator
where
	K: Resource + Serialize + DeserializeOwned,
	K::DynamicType: Default,
{
	fn translate(&self, virtual_obj: &K) -> Result<K> {
		self.setup_metadata(virtual_obj)
	}

	fn physical_ref(&self, virtual_ref: &ResourceRef) -> Result<ResourceRef> {
		self.physical_ref_of(virtual_ref)
	}

	fn virtual_ref(&self, physical: &K) -> Option<ResourceRef> {
		self.origin_of(physical)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use k8s_openapi::api::core::v1::ConfigMap;
	use serde_json::json;

	fn virtual_config_map() -> ConfigMap {
		serde_json::from_value(json!({
			"apiVersion": "v1",
			"kind": "ConfigMap",
			"metadata": {
				"name": "settings",
				"namespace": "ns",
				"uid": "7d1c",
				"resourceVersion": "42",
				"creationTimestamp": "2021-03-01T10:00:00Z",
				"ownerReferences": [{
					"apiVersion": "apps/v1",
					"kind": "Deployment",
					"name": "app",
					"uid": "91ab",
				}],
				"labels": {"app": "web"},
				"annotations": {
					"kubectl.kubernetes.io/last-applied-configuration": "{}",
					"team": "db",
				},
			},
			"data": {"key": "value"},
		}))
		.unwrap()
	}

	#[test]
	fn rewrites_identity() {
		let translator = MetadataTranslator::new(&SyncConfig::new("target-ns", "vc"));
		let physical: ConfigMap = translator.translate(&virtual_config_map()).unwrap();

		let meta = &physical.metadata;
		assert_eq!(meta.name.as_deref(), Some("settings"));
		assert_eq!(meta.namespace.as_deref(), Some("target-ns"));
		assert_eq!(meta.uid, None);
		assert_eq!(meta.resource_version, None);
		assert_eq!(meta.creation_timestamp, None);
		assert_eq!(meta.owner_references, None);

		let labels = meta.labels.as_ref().unwrap();
		assert_eq!(labels.get("app").map(String::as_str), Some("web"));
		assert_eq!(labels.get(MANAGED_BY_LABEL).map(String::as_str), Some("vc"));

		let annotations = meta.annotations.as_ref().unwrap();
		assert!(!annotations.contains_key("kubectl.kubernetes.io/last-applied-configuration"));
		assert_eq!(annotations.get("team").map(String::as_str), Some("db"));
		assert_eq!(
			annotations.get(OBJECT_NAMESPACE_ANNOTATION).map(String::as_str),
			Some("ns")
		);

		assert_eq!(physical.data, virtual_config_map().data);
		assert_eq!(
			Translator::<ConfigMap>::virtual_ref(&translator, &physical),
			Some(ResourceRef::new("ns", "settings"))
		);
	}

	#[test]
	fn qualified_names() {
		let mut config = SyncConfig::new("target-ns", "vc");
		config.naming = NamingStrategy::Qualified;
		let translator = MetadataTranslator::new(&config);
		let physical: ConfigMap = translator.translate(&virtual_config_map()).unwrap();
		assert_eq!(physical.metadata.name.as_deref(), Some("settings-x-ns-x-vc"));
		assert_eq!(
			Translator::<ConfigMap>::physical_ref(&translator, &ResourceRef::new("ns", "settings"))
				.unwrap(),
			ResourceRef::new("target-ns", "settings-x-ns-x-vc")
		);

		let long = ResourceRef::new("ns", "a".repeat(250));
		assert!(Translator::<ConfigMap>::physical_ref(&translator, &long).is_err());
	}

	#[test]
	fn foreign_objects_have_no_origin() {
		let translator = MetadataTranslator::new(&SyncConfig::new("target-ns", "vc"));
		let mut physical: ConfigMap = translator.translate(&virtual_config_map()).unwrap();
		assert!(translator.owns(&physical));

		let other = MetadataTranslator::new(&SyncConfig::new("target-ns", "other"));
		assert!(!other.owns(&physical));
		assert_eq!(other.origin_of(&physical), None);

		physical.metadata.labels = None;
		assert_eq!(translator.origin_of(&physical), None);
	}

	#[test]
	fn rejects_unnamespaced() {
		let translator = MetadataTranslator::new(&SyncConfig::new("target-ns", "vc"));
		let mut obj = virtual_config_map();
		obj.metadata.namespace = None;
		let result: Result<ConfigMap> = translator.translate(&obj);
		assert!(matches!(result, Err(Error::InvalidObject(..))));
	}
}
