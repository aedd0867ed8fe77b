//! Settle Core
//!
//! Core library for reconciling declared resources against remote control
//! planes whose mutations complete asynchronously: dispatch a call, then
//! poll the resource's status until it settles.

pub mod differ;
pub mod effect;
pub mod error;
pub mod handler;
pub mod hook;
pub mod identifier;
pub mod interpreter;
pub mod plan;
pub mod probe;
pub mod provider;
pub mod reconciler;
pub mod resource;
pub mod retry;
pub mod settings;
pub mod status;
pub mod transition;
pub mod waiter;

pub use tokio_util::sync::CancellationToken;
