//! Context pooling
//!
//! Returned contexts are reset before reuse: the registry is emptied,
//! handlers are dropped and options go back to the database config, so
//! nothing tracked or subscribed in one rental is visible in the next.

use crate::context::Context;
use crate::database::Database;
use parking_lot::Mutex;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::debug;

/// Pool of reusable contexts over one database
pub struct ContextPool {
    database: Arc<Database>,
    idle: Mutex<Vec<Context>>,
    max_retained: usize,
}

impl ContextPool {
    /// Pool keeping at most `max_retained` idle contexts
    pub fn new(database: Arc<Database>, max_retained: usize) -> Self {
        Self {
            database,
            idle: Mutex::new(Vec::with_capacity(max_retained)),
            max_retained,
        }
    }

    /// Take an idle context or create one
    pub fn rent(&self) -> PooledContext<'_> {
        let context = self
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| Context::new(Arc::clone(&self.database)));
        PooledContext {
            pool: self,
            context: ManuallyDrop::new(context),
        }
    }

    /// Number of idle contexts
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Upper bound on idle contexts
    pub fn max_retained(&self) -> usize {
        self.max_retained
    }

    fn give_back(&self, mut context: Context) {
        let mut idle = self.idle.lock();
        if idle.len() >= self.max_retained {
            debug!(target: "changetrack::engine", "Pool full, dropping context");
            return;
        }
        context.log_disposed();
        context.reset();
        idle.push(context);
        debug!(target: "changetrack::engine", idle = idle.len(), "Context returned to pool");
    }
}

impl std::fmt::Debug for ContextPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextPool")
            .field("idle", &self.idle_count())
            .field("max_retained", &self.max_retained)
            .finish()
    }
}

/// A rented context; returned to its pool on drop
pub struct PooledContext<'a> {
    pool: &'a ContextPool,
    context: ManuallyDrop<Context>,
}

impl Deref for PooledContext<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.context
    }
}

impl DerefMut for PooledContext<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        &mut self.context
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        // SAFETY: `context` is not used again after this take.
        let context = unsafe { ManuallyDrop::take(&mut self.context) };
        self.pool.give_back(context);
    }
}
