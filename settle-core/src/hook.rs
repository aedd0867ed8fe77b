//! Hooks around mutation dispatch
//!
//! Some resource types need work done on neighbouring resources before or
//! after a mutation: a load balancer policy must be unassigned from its
//! listeners before it can be deleted and reassigned after it is recreated,
//! an internet gateway must be detached before it can be deleted. A hook
//! captures what it needs in `before` and restores it in `after`.

use std::collections::HashMap;

use crate::error::ProviderResult;
use crate::provider::BoxFuture;
use crate::resource::Value;
use crate::status::Operation;

/// Values captured by [`MutationHook::before`] and handed back to `after`
pub type HookContext = HashMap<String, Value>;

pub trait MutationHook: Send + Sync {
    /// Runs before the mutation is dispatched. An error aborts the mutation.
    fn before<'a>(
        &'a self,
        _operation: Operation,
        _identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<HookContext>> {
        Box::pin(async { Ok(HookContext::new()) })
    }

    /// Runs after the mutation has settled
    fn after<'a>(
        &'a self,
        _operation: Operation,
        _identifier: &'a str,
        _context: HookContext,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
