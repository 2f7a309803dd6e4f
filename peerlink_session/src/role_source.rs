use crate::event::RoleEvent;
use async_trait::async_trait;
use auto_impl::auto_impl;

/// Answers "what is the group state right now". Queried once when a client role
/// event arrives before the owner address has resolved
#[async_trait]
#[auto_impl(Arc, Box)]
pub trait RoleSource: Send + Sync {
    /// `None` if the group state is unavailable
    async fn query_role(&self) -> Option<RoleEvent>;
}
