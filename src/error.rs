use std::time::Duration;

use thiserror::Error;

use crate::reference::ResourceRef;

#[derive(Error, Debug)]
pub enum Error {
	/// Source object can't be translated, retrying won't help
	#[error("invalid object {0}: {1}")]
	InvalidObject(String, String),
	#[error("physical object {0} is not managed by this syncer")]
	NotOwned(ResourceRef),
	#[error("error syncing {target} to physical cluster: {source}")]
	Sync {
		target: ResourceRef,
		retry_after: Duration,
		#[source]
		source: Box<Error>,
	},
	#[error("store unavailable: {0}")]
	Unavailable(String),
	#[error("invalid configuration: {0}")]
	Config(String),
	#[error("kube error: {0}")]
	Kube(#[from] kube::Error),
	#[error("json error: {0}")]
	Json(#[from] serde_json::Error),
	#[error("path error: {0}")]
	Path(#[from] fieldpath::Error),
}
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
	/// Fixed backoff requested by the failing operation
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Sync { retry_after, .. } => Some(*retry_after),
			_ => None,
		}
	}

	pub fn is_retryable(&self) -> bool {
		match self {
			Self::InvalidObject(..) | Self::Config(_) | Self::Path(_) => false,
			Self::Sync { source, .. } => source.is_retryable(),
			Self::NotOwned(_) | Self::Unavailable(_) | Self::Kube(_) | Self::Json(_) => true,
		}
	}

	/// Target slot is held by object we don't own.
	///
	/// It may be freed later (e.g. another virtual object with the same
	/// physical name gets pruned), but not soon.
	pub fn is_conflict(&self) -> bool {
		match self {
			Self::NotOwned(_) => true,
			Self::Sync { source, .. } => source.is_conflict(),
			_ => false,
		}
	}
}
