use std::sync::Arc;

use chorus_db::Database;
use chorus_gateway::auth::IdentityVerifier;
use chorus_gateway::dispatcher::Dispatcher;
use chorus_gateway::registry::SessionRegistry;

use crate::media::MediaStore;
use crate::notifier::NotificationFanout;
use crate::service::ChatService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub chat: Arc<ChatService>,
    pub notifications: NotificationFanout,
    pub dispatcher: Dispatcher,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub media: Arc<dyn MediaStore>,
}

impl AppStateInner {
    /// Wires one registry into both the router and the gateway; the SQLite
    /// store doubles as the group roster.
    pub fn new(
        db: Arc<Database>,
        verifier: Arc<dyn IdentityVerifier>,
        media: Arc<dyn MediaStore>,
    ) -> AppState {
        let dispatcher = Dispatcher::new(SessionRegistry::new());
        let notifications = NotificationFanout::new(db.clone(), dispatcher.clone());
        let chat = ChatService::new(
            db.clone(),
            Arc::new(db),
            dispatcher.clone(),
            notifications.clone(),
        );

        Arc::new(Self {
            chat: Arc::new(chat),
            notifications,
            dispatcher,
            verifier,
            media,
        })
    }
}
