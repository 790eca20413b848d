//! Wiring of secret syncer into kube runtime

use std::{fmt::Debug, sync::Arc, time::Duration};

use futures::{
	channel::{mpsc, oneshot},
	future, StreamExt,
};
use k8s_openapi::api::{
	core::v1::{Pod, Secret},
	networking::v1::Ingress,
};
use kube::{
	runtime::{
		controller::{Action, Controller},
		reflector::ObjectRef,
		watcher::{self, Event},
		WatchStreamExt,
	},
	Api, Client, Resource,
};
use serde::de::DeserializeOwned;

use crate::{
	config::SyncConfig,
	engine::{self, Syncer},
	events::KubeEventRecorder,
	extract::ReferenceExtractor,
	router::ChangeRouter,
	secrets::{self, SecretSyncer, COMPONENT},
	store::{label_selector, KubeStore},
	translate::Translator,
	Error, ResourceRef, Result,
};

pub struct Context {
	syncer: SecretSyncer,
	retry_delay: Duration,
	/// Backoff of ownership conflicts, nothing routes a request once they clear
	conflict_delay: Duration,
}

impl Context {
	pub fn new(syncer: SecretSyncer, config: &SyncConfig) -> Self {
		Self {
			syncer,
			retry_delay: config.retry_delay,
			conflict_delay: config.resync_interval,
		}
	}
}

fn object_ref(at: &ResourceRef) -> ObjectRef<Secret> {
	ObjectRef::new(&at.name).within(&at.namespace)
}

async fn reconcile(secret: Arc<Secret>, ctx: Arc<Context>) -> Result<Action> {
	let at = ResourceRef::of(secret.as_ref())?;
	let physical_ref = ctx.syncer.physical_ref(&at)?;
	let physical = ctx.syncer.physical_store().get(&physical_ref).await?;
	engine::reconcile(&ctx.syncer, &at, Some(secret.as_ref()), physical.as_ref()).await
}

fn error_policy(secret: Arc<Secret>, err: &Error, ctx: Arc<Context>) -> Action {
	let name = secret.meta().name.as_deref().unwrap_or_default();
	if !err.is_retryable() {
		log::warn!("not retrying secret {}: {}", name, err);
		return Action::await_change();
	}
	if err.is_conflict() {
		log::info!("secret {} conflicts with foreign object, retrying later: {}", name, err);
		return Action::requeue(ctx.conflict_delay);
	}
	log::debug!("retrying secret {}: {}", name, err);
	Action::requeue(err.retry_after().unwrap_or(ctx.retry_delay))
}

/// Feed dependency changes into index and reconciliation queue.
///
/// `ready` fires once the initial list is indexed.
async fn route_changes<E>(
	api: Api<E::Object>,
	mut router: ChangeRouter<E>,
	requests: mpsc::UnboundedSender<ObjectRef<Secret>>,
	ready: oneshot::Sender<()>,
) where
	E: ReferenceExtractor,
	E::Object: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
	<E::Object as Resource>::DynamicType: Default,
{
	let kind = router.indexer().extractor().kind().to_owned();
	let mut ready = Some(ready);
	let mut events = watcher::watcher(api, watcher::Config::default())
		.default_backoff()
		.boxed();
	while let Some(event) = events.next().await {
		let event = match event {
			Ok(event) => event,
			Err(e) => {
				log::warn!("watch of {} failed: {}", kind, e);
				continue;
			}
		};
		let done = matches!(event, Event::InitDone);
		for key in router.route(event) {
			if requests.unbounded_send(object_ref(&key)).is_err() {
				return;
			}
		}
		if done {
			if let Some(ready) = ready.take() {
				log::info!("{} are indexed", kind);
				let _ = ready.send(());
			}
		}
	}
}

async fn sweep_orphans(ctx: Arc<Context>, namespace: String, interval: Duration) {
	let labels = ctx.syncer.translator().metadata().managed_labels();
	let mut ticks = tokio::time::interval(interval);
	loop {
		ticks.tick().await;
		match ctx.syncer.sweep(&namespace, &labels).await {
			Ok(0) => log::trace!("orphan sweep done"),
			Ok(failed) => log::warn!("orphan sweep: {} secrets failed to sync", failed),
			Err(e) => log::warn!("orphan sweep failed: {}", e),
		}
	}
}

/// Run secret syncer until shutdown signal
///
/// Deleting a virtual secret doesn't trigger reconciliation: the controller
/// only reconciles objects it still has in its store. Its mirror is pruned by
/// orphan sweep instead, so it lingers for up to `resync_interval`.
pub async fn run(config: SyncConfig, virtual_client: Client, physical_client: Client) -> Result<()> {
	config.validate()?;
	let deps = secrets::dependencies(&config)?;

	let recorder = Arc::new(KubeEventRecorder::new(virtual_client.clone(), COMPONENT));
	let virtual_store = Arc::new(KubeStore::<Secret>::new(
		virtual_client.clone(),
		config.field_manager.clone(),
	));
	let physical_store = Arc::new(KubeStore::<Secret>::new(
		physical_client.clone(),
		config.field_manager.clone(),
	));
	let syncer = secrets::secret_syncer(
		&config,
		deps.index.clone(),
		virtual_store,
		physical_store,
		recorder,
	);
	let translator = syncer.translator().clone();
	let ctx = Arc::new(Context::new(syncer, &config));

	let (requests, triggers) = mpsc::unbounded();
	let mut indexed = Vec::new();

	let (ready, pods_ready) = oneshot::channel();
	tokio::spawn(route_changes(
		Api::<Pod>::all(virtual_client.clone()),
		deps.pods,
		requests.clone(),
		ready,
	));
	indexed.push(pods_ready);
	if let Some(ingresses) = deps.ingresses {
		let (ready, ingresses_ready) = oneshot::channel();
		tokio::spawn(route_changes(
			Api::<Ingress>::all(virtual_client.clone()),
			ingresses,
			requests.clone(),
			ready,
		));
		indexed.push(ingresses_ready);
	}
	drop(requests);

	// secrets seen before their users would be pruned
	future::try_join_all(indexed)
		.await
		.map_err(|_| Error::Unavailable("dependency watch stopped".into()))?;

	tokio::spawn(sweep_orphans(
		ctx.clone(),
		config.target_namespace.clone(),
		config.resync_interval,
	));

	let owned = watcher::Config::default()
		.labels(&label_selector(&translator.metadata().managed_labels()));
	log::info!(
		"syncing secrets to {} as {}",
		config.target_namespace,
		config.owner
	);
	Controller::new(Api::<Secret>::all(virtual_client), watcher::Config::default())
		.watches(
			Api::<Secret>::namespaced(physical_client, &config.target_namespace),
			owned,
			move |physical: Secret| translator.virtual_ref(&physical).map(|at| object_ref(&at)),
		)
		.reconcile_on(triggers)
		.shutdown_on_signal()
		.run(reconcile, error_policy, ctx)
		.for_each(|res| async move {
			match res {
				Ok((secret, _)) => log::trace!("reconciled {}", secret),
				Err(e) => log::debug!("reconcile failed: {}", e),
			}
		})
		.await;
	Ok(())
}
