use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use cosnap_core::{ServiceError, Services};
use cosnap_db::Subscription;
use cosnap_types::events::{GatewayCommand, GatewayEvent};

/// Per-connection state: the identified user, the outbound event queue and
/// the live conversation watches. Dropping the session releases every
/// subscription it holds.
pub struct Session {
    user_id: String,
    services: Services,
    events: mpsc::UnboundedSender<GatewayEvent>,
    inbox: Option<Subscription>,
    watches: HashMap<String, Subscription>,
}

impl Session {
    pub fn new(user_id: String, services: Services, events: mpsc::UnboundedSender<GatewayEvent>) -> Self {
        Self {
            user_id,
            services,
            events,
            inbox: None,
            watches: HashMap::new(),
        }
    }

    /// Start pushing `InboxSnapshot`s for the user's conversations.
    pub fn watch_inbox(&mut self) {
        let events = self.events.clone();
        let user_id = self.user_id.clone();
        let sub = self
            .services
            .messaging
            .listen_to_user_conversations(&self.user_id, move |conversations| {
                let total_unread = conversations
                    .iter()
                    .map(|c| u64::from(c.unread_for(&user_id)))
                    .sum();
                let _ = events.send(GatewayEvent::InboxSnapshot {
                    conversations,
                    total_unread,
                });
            });
        self.inbox = Some(sub);
    }

    pub fn watching(&self, conversation_id: &str) -> bool {
        self.watches.contains_key(conversation_id)
    }

    fn send_error(&self, message: impl Into<String>) {
        let _ = self.events.send(GatewayEvent::Error {
            message: message.into(),
        });
    }

    pub async fn handle_command(&mut self, cmd: GatewayCommand) {
        match cmd {
            GatewayCommand::Identify { .. } => {} // Already handled

            GatewayCommand::WatchConversation { conversation_id } => {
                if self.watching(&conversation_id) {
                    return;
                }

                let messaging = self.services.messaging.clone();
                let lookup_id = conversation_id.clone();
                let allowed = tokio::task::spawn_blocking(move || messaging.get_conversation(&lookup_id))
                    .await
                    .map_err(|e| ServiceError::Store(e.into()))
                    .and_then(|found| found)
                    .and_then(|conversation| {
                        if conversation.has_participant(&self.user_id) {
                            Ok(())
                        } else {
                            Err(ServiceError::permission("not part of this conversation"))
                        }
                    });

                if let Err(e) = allowed {
                    warn!("{} cannot watch conversation {}: {}", self.user_id, conversation_id, e);
                    self.send_error(e.to_string());
                    return;
                }

                info!("{} watching conversation {}", self.user_id, conversation_id);
                let events = self.events.clone();
                let snapshot_id = conversation_id.clone();
                let sub = self
                    .services
                    .messaging
                    .listen_to_conversation_messages(&conversation_id, move |messages| {
                        let _ = events.send(GatewayEvent::ConversationSnapshot {
                            conversation_id: snapshot_id.clone(),
                            messages,
                        });
                    });
                self.watches.insert(conversation_id, sub);
            }

            GatewayCommand::UnwatchConversation { conversation_id } => {
                if let Some(sub) = self.watches.remove(&conversation_id) {
                    sub.unsubscribe();
                    debug!("{} stopped watching conversation {}", self.user_id, conversation_id);
                }
            }
        }
    }
}
