//! Warning events attached to virtual objects.
//!
//! Recording is fire-and-forget, failure to publish is logged and otherwise
//! ignored, it never affects reconciliation.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::{
	runtime::events::{Event, EventType, Recorder, Reporter},
	Client,
};

pub const SYNC_ERROR: &str = "SyncError";
pub const DELETE_ERROR: &str = "DeleteError";

const ACTION_SYNC: &str = "Sync";

#[async_trait]
pub trait EventRecorder: Send + Sync {
	async fn warning(&self, regarding: &ObjectReference, reason: &str, note: String);
}

pub struct KubeEventRecorder {
	recorder: Recorder,
}

impl KubeEventRecorder {
	pub fn new(client: Client, component: &str) -> Self {
		let reporter = Reporter {
			controller: component.to_owned(),
			instance: None,
		};
		Self {
			recorder: Recorder::new(client, reporter),
		}
	}
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
	async fn warning(&self, regarding: &ObjectReference, reason: &str, note: String) {
		let event = Event {
			type_: EventType::Warning,
			reason: reason.to_owned(),
			note: Some(note),
			action: ACTION_SYNC.to_owned(),
			secondary: None,
		};
		if let Err(e) = self.recorder.publish(&event, regarding).await {
			log::warn!("failed to publish {} event: {}", reason, e);
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEvent {
	pub regarding: ObjectReference,
	pub reason: String,
	pub note: String,
}

/// Keeps events in memory
#[derive(Default)]
pub struct MemoryRecorder {
	events: Mutex<Vec<RecordedEvent>>,
}

impl MemoryRecorder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn events(&self) -> Vec<RecordedEvent> {
		self.events
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}
}

#[async_trait]
impl EventRecorder for MemoryRecorder {
	async fn warning(&self, regarding: &ObjectReference, reason: &str, note: String) {
		self.events
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push(RecordedEvent {
				regarding: regarding.clone(),
				reason: reason.to_owned(),
				note,
			});
	}
}
