pub mod error;
pub mod media;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod notifier;
pub mod reactions;
pub mod routes;
pub mod service;
pub mod state;
