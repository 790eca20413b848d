//! Secrets are mirrored only while a pod or an ingress references them.

use std::sync::Arc;

use k8s_openapi::api::{
	core::v1::{Pod, Secret},
	networking::v1::Ingress,
};

use crate::{
	config::{SyncConfig, INGRESSES},
	engine::SyncEngine,
	events::EventRecorder,
	extract::{KeyScope, PathExtractor},
	index::{DependencyIndex, Indexer},
	router::ChangeRouter,
	store::ObjectStore,
	translate::{MetadataTranslator, Translator},
	ResourceRef, Result,
};

pub const PODS: &str = "pods";

/// Event reporter of warnings attached to virtual secrets
pub const COMPONENT: &str = "secret-syncer";

const SERVICE_ACCOUNT_TOKEN: &str = "kubernetes.io/service-account-token";
const OPAQUE: &str = "Opaque";

const POD_CONTAINER_LISTS: &[&str] = &["containers", "initContainers", "ephemeralContainers"];

const POD_VOLUME_PATHS: &[&str] = &[
	".spec.volumes[*].secret.secretName",
	".spec.volumes[*].projected.sources[*].secret.name",
	".spec.volumes[*].csi.nodePublishSecretRef.name",
	".spec.imagePullSecrets[*].name",
];

const INGRESS_TLS_PATHS: &[&str] = &[".spec.tls[*].secretName"];

/// Annotations of ingress-nginx, may point to other namespace
const INGRESS_ANNOTATION_PATHS: &[&str] = &[
	".metadata.annotations.\"nginx.ingress.kubernetes.io/auth-secret\"",
	".metadata.annotations.\"nginx.ingress.kubernetes.io/auth-tls-secret\"",
];

pub fn pod_secret_extractor() -> Result<PathExtractor<Pod>> {
	let container_paths = POD_CONTAINER_LISTS
		.iter()
		.flat_map(|list| {
			[
				format!(".spec.{}[*].env[*].valueFrom.secretKeyRef.name", list),
				format!(".spec.{}[*].envFrom[*].secretRef.name", list),
			]
		})
		.collect::<Vec<_>>();
	PathExtractor::new(PODS)
		.fields(POD_VOLUME_PATHS.iter().copied(), KeyScope::Local)?
		.fields(container_paths.iter().map(String::as_str), KeyScope::Local)
}

pub fn ingress_secret_extractor() -> Result<PathExtractor<Ingress>> {
	PathExtractor::new(INGRESSES)
		.fields(INGRESS_TLS_PATHS.iter().copied(), KeyScope::Local)?
		.fields(INGRESS_ANNOTATION_PATHS.iter().copied(), KeyScope::Qualified)
}

/// Secret translation, on top of identity rewriting
#[derive(Clone, Debug)]
pub struct SecretTranslator {
	metadata: MetadataTranslator,
}

impl SecretTranslator {
	pub fn new(config: &SyncConfig) -> Self {
		Self {
			metadata: MetadataTranslator::new(config),
		}
	}

	pub fn metadata(&self) -> &MetadataTranslator {
		&self.metadata
	}
}

impl Translator<Secret> for SecretTranslator {
	fn translate(&self, virtual_obj: &Secret) -> Result<Secret> {
		let mut secret: Secret = self.metadata.setup_metadata(virtual_obj)?;
		// token is only valid for identity of virtual service account
		if secret.type_.as_deref() == Some(SERVICE_ACCOUNT_TOKEN) {
			secret.type_ = Some(OPAQUE.to_owned());
		}
		Ok(secret)
	}

	fn physical_ref(&self, virtual_ref: &ResourceRef) -> Result<ResourceRef> {
		Translator::<Secret>::physical_ref(&self.metadata, virtual_ref)
	}

	fn virtual_ref(&self, physical: &Secret) -> Option<ResourceRef> {
		self.metadata.origin_of(physical)
	}
}

pub type SecretSyncer = SyncEngine<Secret, SecretTranslator>;

/// Dependency index of secrets, with routers feeding it
pub struct SecretDependencies {
	pub index: Arc<DependencyIndex>,
	pub pods: ChangeRouter<PathExtractor<Pod>>,
	/// `None` when ingresses are disabled
	pub ingresses: Option<ChangeRouter<PathExtractor<Ingress>>>,
}

pub fn dependencies(config: &SyncConfig) -> Result<SecretDependencies> {
	let mut index = DependencyIndex::new();
	let pods = ChangeRouter::new(Indexer::new(pod_secret_extractor()?, &mut index));
	let ingresses = if config.include_ingresses {
		Some(ChangeRouter::new(Indexer::new(
			ingress_secret_extractor()?,
			&mut index,
		)))
	} else {
		log::info!("ingresses are disabled, not tracking their secrets");
		None
	};
	Ok(SecretDependencies {
		index: Arc::new(index),
		pods,
		ingresses,
	})
}

pub fn secret_syncer(
	config: &SyncConfig,
	index: Arc<DependencyIndex>,
	virtual_store: Arc<dyn ObjectStore<Secret>>,
	physical_store: Arc<dyn ObjectStore<Secret>>,
	recorder: Arc<dyn EventRecorder>,
) -> SecretSyncer {
	SyncEngine::new(
		"secret",
		SecretTranslator::new(config),
		index,
		virtual_store,
		physical_store,
		recorder,
	)
	.with_retry_delay(config.retry_delay)
}
