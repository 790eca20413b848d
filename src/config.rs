use std::{str::FromStr, time::Duration};

use crate::{Error, Result};

/// Backoff requested when write to physical cluster fails
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_FIELD_MANAGER: &str = "refsync";

/// Resource name accepted by disabled resources list
pub const INGRESSES: &str = "ingresses";

/// How physical object names are derived from virtual ones
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NamingStrategy {
	/// Keep the virtual name
	#[default]
	Preserve,
	/// `<name>-x-<namespace>-x-<owner>`, unique across virtual namespaces
	Qualified,
}

impl FromStr for NamingStrategy {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"preserve" => Ok(Self::Preserve),
			"qualified" => Ok(Self::Qualified),
			other => Err(Error::Config(format!("unknown naming strategy: {}", other))),
		}
	}
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
	/// Namespace of physical cluster, where every object is mirrored to
	pub target_namespace: String,
	/// Identifies objects created by this syncer instance
	pub owner: String,
	/// Whether ingresses referencing secrets keep them in use
	pub include_ingresses: bool,
	pub naming: NamingStrategy,
	pub retry_delay: Duration,
	pub resync_interval: Duration,
	pub field_manager: String,
}

impl SyncConfig {
	pub fn new(target_namespace: impl Into<String>, owner: impl Into<String>) -> Self {
		Self {
			target_namespace: target_namespace.into(),
			owner: owner.into(),
			include_ingresses: true,
			naming: NamingStrategy::default(),
			retry_delay: DEFAULT_RETRY_DELAY,
			resync_interval: DEFAULT_RESYNC_INTERVAL,
			field_manager: DEFAULT_FIELD_MANAGER.to_owned(),
		}
	}

	/// Apply comma separated list of resources excluded from sync
	pub fn disable_resources(mut self, list: &str) -> Self {
		if is_disabled(list, INGRESSES) {
			self.include_ingresses = false;
		}
		self
	}

	pub fn validate(&self) -> Result<()> {
		if self.target_namespace.is_empty() {
			return Err(Error::Config("target namespace is not set".into()));
		}
		if self.owner.is_empty() {
			return Err(Error::Config("owner is not set".into()));
		}
		if self.resync_interval.is_zero() {
			return Err(Error::Config("resync interval must be positive".into()));
		}
		if self.field_manager.is_empty() {
			return Err(Error::Config("field manager is not set".into()));
		}
		Ok(())
	}
}

pub fn is_disabled(list: &str, resource: &str) -> bool {
	list.split(',').map(str::trim).any(|item| item == resource)
}
