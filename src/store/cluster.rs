use std::{collections::BTreeMap, fmt::Debug, marker::PhantomData};

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{
	api::{DeleteParams, ListParams, Patch, PatchParams},
	Api, Client, Resource,
};
use serde::{de::DeserializeOwned, Serialize};

use super::{label_selector, ObjectStore};
use crate::{ResourceRef, Result};

/// Store backed by apiserver, writes are server-side applies
pub struct KubeStore<K> {
	client: Client,
	field_manager: String,
	_object: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
	pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
		Self {
			client,
			field_manager: field_manager.into(),
			_object: PhantomData,
		}
	}
}

impl<K> KubeStore<K>
where
	K: Resource<Scope = NamespaceResourceScope>,
	K::DynamicType: Default,
{
	fn api(&self, namespace: &str) -> Api<K> {
		Api::namespaced(self.client.clone(), namespace)
	}
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
	K: Resource<Scope = NamespaceResourceScope>
		+ Clone
		+ Serialize
		+ DeserializeOwned
		+ Debug
		+ Send
		+ Sync
		+ 'static,
	K::DynamicType: Default,
{
	async fn get(&self, at: &ResourceRef) -> Result<Option<K>> {
		Ok(self.api(&at.namespace).get_opt(&at.name).await?)
	}

	async fn list(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<K>> {
		let params = ListParams::default().labels(&label_selector(labels));
		Ok(self.api(namespace).list(&params).await?.items)
	}

	async fn apply(&self, obj: &K) -> Result<K> {
		let at = ResourceRef::of(obj)?;
		log::trace!("applying {} as {}", at, self.field_manager);
		let params = PatchParams::apply(&self.field_manager).force();
		Ok(self
			.api(&at.namespace)
			.patch(&at.name, &params, &Patch::Apply(obj))
			.await?)
	}

	async fn delete(&self, at: &ResourceRef) -> Result<()> {
		match self
			.api(&at.namespace)
			.delete(&at.name, &DeleteParams::default())
			.await
		{
			Ok(_) => Ok(()),
			Err(kube::Error::Api(apierror)) if apierror.code == 404 => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}
