use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use chorus_db::Database;
use chorus_gateway::blocking;
use chorus_gateway::connection::CommandHandler;
use chorus_gateway::dispatcher::Dispatcher;
use chorus_gateway::fanout::{GroupRoster, fanout_targets};
use chorus_types::events::{GatewayCommand, GatewayEvent};
use chorus_types::models::{
    Conversation, GroupId, Message, MessageBody, MessageId, NotificationKind, Reaction, Target,
    ThreadKey,
};
use chorus_types::{ChatError, ChatResult};

use crate::notifier::NotificationFanout;

/// Orchestrates every chat operation: validate and persist through the store,
/// then project to a gateway event and route it.
///
/// Persistence always happens first; a failed write never produces a live
/// event.
pub struct ChatService {
    db: Arc<Database>,
    roster: Arc<dyn GroupRoster>,
    dispatcher: Dispatcher,
    notifications: NotificationFanout,
}

impl ChatService {
    pub fn new(
        db: Arc<Database>,
        roster: Arc<dyn GroupRoster>,
        dispatcher: Dispatcher,
        notifications: NotificationFanout,
    ) -> Self {
        Self {
            db,
            roster,
            dispatcher,
            notifications,
        }
    }

    pub async fn send_direct(&self, sender: &str, receiver: &str, body: MessageBody) -> ChatResult<Message> {
        let db = self.db.clone();
        let (s, r) = (sender.to_string(), receiver.to_string());
        let message = blocking(move || db.send_direct(&s, &r, body)).await?;

        let sessions = self
            .dispatcher
            .deliver(receiver, &GatewayEvent::Message(message.clone()));
        debug!(
            "Message {} {} -> {} pushed to {} sessions",
            message.id, sender, receiver, sessions
        );

        if sender != receiver {
            let text = format!("{} sent you a message", sender);
            // The message is already stored; a failed notification doesn't undo the send.
            if let Err(e) = self
                .notifications
                .create(receiver, NotificationKind::Message, Some(message.id), sender, &text)
                .await
            {
                error!("Failed to create message notification for {}: {}", receiver, e);
            }
        }

        Ok(message)
    }

    pub async fn send_group(&self, sender: &str, group_id: GroupId, body: MessageBody) -> ChatResult<Message> {
        let db = self.db.clone();
        let s = sender.to_string();
        let message = blocking(move || db.send_group(&s, group_id, body)).await?;

        // Roster read after the write; members who left in between may still
        // get this one, members who just joined may not.
        let targets = match fanout_targets(self.roster.as_ref(), group_id, sender).await {
            Ok(targets) => targets,
            Err(e) => {
                // Stored already; members catch up through history.
                warn!("Fanout of group message {} to {} skipped: {}", message.id, group_id, e);
                return Ok(message);
            }
        };
        let sessions = self.dispatcher.deliver_all(
            targets.iter().map(String::as_str),
            &GatewayEvent::Message(message.clone()),
        );
        debug!(
            "Group message {} in {} fanned out to {} members ({} sessions)",
            message.id,
            group_id,
            targets.len(),
            sessions
        );

        Ok(message)
    }

    /// Marks `peer`'s messages to `reader` as read and tells `peer`.
    pub async fn mark_read(&self, reader: &str, peer: &str) -> ChatResult<usize> {
        let db = self.db.clone();
        let (r, p) = (reader.to_string(), peer.to_string());
        let updated = blocking(move || db.mark_read(&r, &p)).await?;

        if updated > 0 {
            self.dispatcher.deliver(
                peer,
                &GatewayEvent::Read {
                    reader: reader.to_string(),
                },
            );
        }
        Ok(updated)
    }

    pub async fn react(&self, identity: &str, message_id: MessageId, label: &str) -> ChatResult<Reaction> {
        let db = self.db.clone();
        let (i, l) = (identity.to_string(), label.to_string());
        let (thread, reaction) = blocking(move || db.react(message_id, &i, &l)).await?;

        let targets: Vec<String> = match &thread {
            ThreadKey::Direct { a, b } => [a, b]
                .into_iter()
                .filter(|party| party.as_str() != identity)
                .cloned()
                .collect(),
            ThreadKey::Group { group_id } => {
                match fanout_targets(self.roster.as_ref(), *group_id, identity).await {
                    Ok(targets) => targets,
                    Err(e) => {
                        warn!("Reaction on {} not pushed to group {}: {}", message_id, group_id, e);
                        return Ok(reaction);
                    }
                }
            }
        };

        self.dispatcher.deliver_all(
            targets.iter().map(String::as_str),
            &GatewayEvent::Reaction {
                message_id,
                thread,
                user: reaction.user.clone(),
                label: reaction.label.clone(),
            },
        );
        Ok(reaction)
    }

    /// History of a thread `identity` takes part in.
    pub async fn history(&self, identity: &str, target: Target, page: u32, size: u32) -> ChatResult<Vec<Message>> {
        let thread = match target {
            Target::User(peer) => ThreadKey::direct(identity, &peer),
            Target::Group(group_id) => {
                let members = self.roster.members_of(group_id).await?;
                if !members.iter().any(|m| m == identity) {
                    return Err(ChatError::NotAMember(group_id));
                }
                ThreadKey::group(group_id)
            }
        };

        let db = self.db.clone();
        blocking(move || db.history(&thread, page, size)).await
    }

    pub async fn inbox(&self, identity: &str) -> ChatResult<Vec<Conversation>> {
        let db = self.db.clone();
        let identity = identity.to_string();
        blocking(move || db.inbox(&identity)).await
    }

    /// Relays a typing indicator. Nothing is stored.
    pub async fn typing(&self, identity: &str, target: Target) -> ChatResult<()> {
        match target {
            Target::User(peer) => {
                let db = self.db.clone();
                let (a, b) = (identity.to_string(), peer.clone());
                if blocking(move || db.is_blocked_between(&a, &b)).await? {
                    return Ok(());
                }
                self.dispatcher.deliver(
                    &peer,
                    &GatewayEvent::Typing {
                        from: identity.to_string(),
                        group_id: None,
                    },
                );
            }
            Target::Group(group_id) => {
                if !self.roster.is_member(group_id, identity).await? {
                    return Err(ChatError::NotAMember(group_id));
                }
                let targets = fanout_targets(self.roster.as_ref(), group_id, identity).await?;
                self.dispatcher.deliver_all(
                    targets.iter().map(String::as_str),
                    &GatewayEvent::Typing {
                        from: identity.to_string(),
                        group_id: Some(group_id),
                    },
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for ChatService {
    async fn handle(&self, identity: &str, command: GatewayCommand) -> ChatResult<()> {
        match command {
            GatewayCommand::SendDirect { to, body } => {
                let message = self.send_direct(identity, &to, body).await?;
                info!("{} sent message {} to {} over gateway", identity, message.id, to);
            }
            GatewayCommand::SendGroup { group_id, body } => {
                let message = self.send_group(identity, group_id, body).await?;
                info!("{} sent message {} to group {} over gateway", identity, message.id, group_id);
            }
            GatewayCommand::Typing { target } => self.typing(identity, target).await?,
            GatewayCommand::MarkRead { peer } => {
                self.mark_read(identity, &peer).await?;
            }
            GatewayCommand::React { message_id, label } => {
                self.react(identity, message_id, &label).await?;
            }
        }
        Ok(())
    }
}
