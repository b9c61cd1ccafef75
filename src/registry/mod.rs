// src/registry/mod.rs

//! Handle registry: decides which [`WatchHandle`] backs which [`Watch`].
//!
//! The contract every registry honours:
//! - `attach` is only called for watches whose canonical path resolves,
//! - it eventually calls [`Watch::bind_to_handle`] for every attached watch,
//! - before retiring a handle it calls [`WatchHandle::request_reattach`] on
//!   that handle, naming the replacement and the scope it covered.
//!
//! [`NestingRegistry`] is the policy used by the manager.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use crate::errors::WatchError;
use crate::handle::WatchHandle;
use crate::session::BoxFuture;
use crate::watch::{Watch, WatchOptions};

pub mod nesting;

pub use nesting::NestingRegistry;

/// Builds a fresh handle for a canonical root.
pub type HandleFactory = Arc<dyn Fn(&Path, &WatchOptions) -> WatchHandle + Send + Sync>;

pub trait Registry: Send + Sync + Debug {
    /// Choose or create a handle for `watch` and bind the watch to it.
    fn attach<'a>(&'a self, watch: &'a Watch) -> BoxFuture<'a, Result<(), WatchError>>;
}
