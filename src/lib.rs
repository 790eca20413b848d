//! Mirrors objects of virtual cluster into physical one, for as long as
//! something alive in virtual cluster references them.

pub mod config;
pub mod controller;
pub mod engine;
mod error;
pub mod equality;
pub mod events;
pub mod extract;
pub mod index;
mod reference;
pub mod router;
pub mod secrets;
pub mod store;
pub mod translate;
pub mod usage;

pub use error::{Error, Result};
pub use reference::ResourceRef;
