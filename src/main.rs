use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use kube::{
	config::{KubeConfigOptions, Kubeconfig},
	Client, Config,
};
use refsync::{
	config::{NamingStrategy, SyncConfig, DEFAULT_FIELD_MANAGER},
	controller,
};

#[derive(Parser)]
#[command(version, author = "Lach")]
struct Opts {
	/// Namespace in physical cluster, where secrets are mirrored to
	#[arg(long, env = "TARGET_NAMESPACE")]
	target_namespace: String,
	/// Identifies objects created by this instance
	#[arg(long, env = "SYNC_OWNER")]
	owner: String,
	/// Comma separated list of resources, which are not synced (`ingresses`)
	#[arg(long, env = "DISABLE_SYNC_RESOURCES", default_value = "")]
	disable_sync_resources: String,
	/// `preserve` or `qualified`
	#[arg(long, env = "SYNC_NAMING", default_value = "preserve")]
	naming: NamingStrategy,
	/// Kubeconfig of virtual cluster, physical one is taken from environment
	#[arg(long, env = "VIRTUAL_KUBECONFIG")]
	virtual_kubeconfig: PathBuf,
	#[arg(long, env = "RETRY_DELAY_SECS", default_value = "1")]
	retry_delay_secs: u64,
	#[arg(long, env = "RESYNC_INTERVAL_SECS", default_value = "300")]
	resync_interval_secs: u64,
	#[arg(long, env = "FIELD_MANAGER", default_value = DEFAULT_FIELD_MANAGER)]
	field_manager: String,
}

impl Opts {
	fn sync_config(&self) -> SyncConfig {
		let mut config = SyncConfig::new(&self.target_namespace, &self.owner)
			.disable_resources(&self.disable_sync_resources);
		config.naming = self.naming;
		config.retry_delay = Duration::from_secs(self.retry_delay_secs);
		config.resync_interval = Duration::from_secs(self.resync_interval_secs);
		config.field_manager = self.field_manager.clone();
		config
	}
}

async fn virtual_client(path: &Path) -> Result<Client> {
	let kubeconfig = Kubeconfig::read_from(path)
		.with_context(|| format!("reading {}", path.display()))?;
	let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
	Ok(Client::try_from(config)?)
}

#[tokio::main]
async fn main() -> Result<()> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let opts: Opts = Opts::parse();
	let config = opts.sync_config();
	config.validate()?;

	let virtual_client = virtual_client(&opts.virtual_kubeconfig).await?;
	let physical_client = Client::try_default()
		.await
		.context("connecting to physical cluster")?;

	controller::run(config, virtual_client, physical_client).await?;
	Ok(())
}
