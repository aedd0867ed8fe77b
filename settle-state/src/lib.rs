//! Settle State Management
//!
//! Records, for every resource settle manages, the identifier the remote
//! assigned and the attributes it last reported. The differ compares the
//! manifest against this record; delete and update effects take their
//! identifiers from it.
//!
//! # Overview
//!
//! - **StateFile**: resources in creation order, plus serial and lineage
//! - **StateBackend**: storage with locking for concurrent access control
//! - **LockInfo**: who holds the lock, for which operation, until when
//!
//! ```ignore
//! let backend = create_backend(&BackendConfig::local("settle.state.json"))?;
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//! // ... apply effects, record results ...
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::create_backend;
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
