use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use chorus_db::Database;
use chorus_types::ChatResult;
use chorus_types::models::GroupId;

use crate::blocking;

/// Read-only view of group membership.
#[async_trait]
pub trait GroupRoster: Send + Sync {
    async fn members_of(&self, group_id: GroupId) -> ChatResult<Vec<String>>;
    async fn is_member(&self, group_id: GroupId, identity: &str) -> ChatResult<bool>;
}

#[async_trait]
impl GroupRoster for Arc<Database> {
    async fn members_of(&self, group_id: GroupId) -> ChatResult<Vec<String>> {
        let db = self.clone();
        blocking(move || Database::members_of(&db, group_id)).await
    }

    async fn is_member(&self, group_id: GroupId, identity: &str) -> ChatResult<bool> {
        let db = self.clone();
        let identity = identity.to_string();
        blocking(move || Database::is_member(&db, group_id, &identity)).await
    }
}

/// Who receives a group event: every current member except the sender,
/// once each. The roster is read on every call; a member leaving while a
/// send is in flight may or may not get it.
pub async fn fanout_targets(
    roster: &dyn GroupRoster,
    group_id: GroupId,
    sender: &str,
) -> ChatResult<Vec<String>> {
    let members = roster.members_of(group_id).await?;
    let mut seen = HashSet::new();
    Ok(members
        .into_iter()
        .filter(|member| member != sender && seen.insert(member.clone()))
        .collect())
}
