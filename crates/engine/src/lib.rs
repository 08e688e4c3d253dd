//! Context engine for changetrack
//!
//! This crate ties the registry to a store:
//! - Database: shared model, store, value generators and default config
//! - Context: one unit of work with Add / Attach / Update / Remove, Find,
//!   queries and SaveChanges
//! - ContextPool: reusable contexts, reset on return
//! - Config: `changetrack.toml` loading
//! - Logging: `tracing-subscriber` setup driven by the config
//!
//! Change tracking itself lives in `changetrack-tracking`; the engine only
//! decides when it runs and where its output is written.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod database;
pub mod logging;
pub mod pool;
mod save;

pub use config::{ContextConfig, LoggingConfig, QueryTrackingBehavior, CONFIG_FILE_NAME};
pub use context::Context;
pub use database::Database;
pub use pool::{ContextPool, PooledContext};
