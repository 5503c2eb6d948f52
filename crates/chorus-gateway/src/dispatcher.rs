use std::collections::HashSet;

use tracing::{debug, error, warn};

use chorus_types::events::GatewayEvent;

use crate::registry::{ConnectionId, Payload, SessionRegistry};

/// Pushes gateway events to every live session of an identity.
///
/// Fire-and-forget: an offline identity is a no-op, a dead session is
/// unbound and skipped. The durable copy lives in the store.
#[derive(Clone)]
pub struct Dispatcher {
    registry: SessionRegistry,
}

impl Dispatcher {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Send a targeted event to every session of one identity.
    /// Returns how many sessions accepted it.
    pub fn deliver(&self, identity: &str, event: &GatewayEvent) -> usize {
        match encode(event) {
            Some(payload) => self.deliver_payload(identity, &payload),
            None => 0,
        }
    }

    /// Send one event to a set of identities, serializing it once.
    /// Each identity gets at most one attempt even if listed twice.
    pub fn deliver_all<'a, I>(&self, targets: I, event: &GatewayEvent) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let Some(payload) = encode(event) else {
            return 0;
        };

        let mut seen = HashSet::new();
        targets
            .into_iter()
            .filter(|target| seen.insert(*target))
            .map(|target| self.deliver_payload(target, &payload))
            .sum()
    }

    pub fn deliver_payload(&self, identity: &str, payload: &Payload) -> usize {
        let outcome = self.registry.with_sessions(identity, |sessions| {
            let mut delivered = 0;
            let mut dead: Vec<ConnectionId> = Vec::new();
            for (conn_id, session) in sessions {
                if session.tx.send(payload.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*conn_id);
                }
            }
            (delivered, dead)
        });

        let Some((delivered, dead)) = outcome else {
            debug!("{} is offline, live push skipped", identity);
            return 0;
        };

        // Shard guard is released; now safe to unbind.
        for conn_id in dead {
            warn!("Push to {} ({}) failed, unbinding dead connection", identity, conn_id);
            self.registry.unbind(identity, conn_id);
        }

        delivered
    }
}

fn encode(event: &GatewayEvent) -> Option<Payload> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Payload::from(json)),
        Err(e) => {
            error!("Failed to serialize {} event: {}", event.kind(), e);
            None
        }
    }
}
