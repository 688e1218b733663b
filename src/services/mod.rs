// services/mod.rs - Entity services: optimistic local write, then enqueue

pub mod items;
pub mod projects;
pub mod transactions;

pub use items::{ItemService, NewItem};
pub use projects::ProjectService;
pub use transactions::{NewTransaction, TransactionService};

use crate::context::ContextManager;
use crate::models::OfflineContext;
use crate::{Error, Result};

/// Resolve a complete identity or refuse the write up front
pub(crate) async fn require_identity(
    context: &ContextManager,
) -> Result<(String, String, OfflineContext)> {
    let snapshot = context.get().await;
    let user_id = snapshot
        .user_id
        .clone()
        .ok_or_else(|| Error::OfflineContext("No user id in offline context".to_string()))?;
    let account_id = snapshot
        .account_id
        .clone()
        .ok_or_else(|| Error::OfflineContext("No account id in offline context".to_string()))?;
    Ok((user_id, account_id, snapshot))
}
