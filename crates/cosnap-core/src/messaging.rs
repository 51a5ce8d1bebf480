use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use cosnap_db::queries::{conversations, messages, new_id, now};
use cosnap_db::{Change, Database, Subscription};
use cosnap_types::models::{Conversation, LastMessage, Message};

use crate::error::{ServiceError, ServiceResult};

/// Stored as the text of messages that only carry an image.
pub const IMAGE_ONLY_TEXT: &str = "📷 Image";

/// Two-party conversations, their messages and unread bookkeeping.
#[derive(Clone)]
pub struct MessagingRegistry {
    db: Arc<Database>,
}

impl MessagingRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn announce(&self, conversation: &Conversation) {
        self.db.publish(Change::Conversation {
            id: conversation.id.clone(),
            participants: conversation.participants.clone(),
        });
    }

    /// Return the conversation between two users, creating it on first contact.
    /// Argument order does not matter.
    pub fn create_conversation(&self, user_a: &str, user_b: &str) -> ServiceResult<String> {
        if user_a.trim().is_empty() || user_b.trim().is_empty() {
            return Err(ServiceError::validation("both participants are required"));
        }
        if user_a == user_b {
            return Err(ServiceError::validation("cannot start a conversation with yourself"));
        }

        let (conversation, created) = self.db.with_tx(|tx| {
            if let Some(existing) = conversations::find_by_pair(tx, user_a, user_b)? {
                return Ok((existing, false));
            }

            let at = now();
            let conversation = Conversation {
                id: new_id(),
                participants: [user_a.to_string(), user_b.to_string()],
                last_message: None,
                unread_counts: BTreeMap::from([(user_a.to_string(), 0), (user_b.to_string(), 0)]),
                created_at: at,
                updated_at: at,
            };
            conversations::insert(tx, &conversation)?;
            Ok((conversation, true))
        })?;

        if created {
            self.announce(&conversation);
            info!("Conversation {} opened between {} and {}", conversation.id, user_a, user_b);
        }
        Ok(conversation.id)
    }

    pub fn get_conversation(&self, id: &str) -> ServiceResult<Conversation> {
        self.db
            .with_conn(|conn| conversations::get(conn, id))?
            .ok_or_else(|| ServiceError::not_found(format!("conversation {id}")))
    }

    /// Append a message, refresh the conversation preview and bump the
    /// recipient's unread counter, all in one transaction.
    pub fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        text: &str,
        image_url: Option<&str>,
    ) -> ServiceResult<Message> {
        let image_url = image_url.map(str::trim).filter(|u| !u.is_empty());
        let text = match (text.trim().is_empty(), image_url) {
            (false, _) => text.to_string(),
            (true, Some(_)) => IMAGE_ONLY_TEXT.to_string(),
            (true, None) => return Err(ServiceError::validation("message text is required")),
        };

        let message = Message {
            id: new_id(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            text,
            image_url: image_url.map(str::to_string),
            created_at: now(),
            read: false,
        };

        let conversation = self.db.with_tx(|tx| {
            let conversation = conversations::get(tx, conversation_id)?
                .ok_or_else(|| ServiceError::not_found(format!("conversation {conversation_id}")))?;
            if !conversation.has_participant(sender_id) {
                return Err(ServiceError::permission("sender is not part of this conversation").into());
            }

            messages::insert(tx, &message)?;
            conversations::record_message(
                tx,
                conversation_id,
                &LastMessage {
                    text: message.text.clone(),
                    sender_id: message.sender_id.clone(),
                    sent_at: message.created_at,
                },
            )?;
            Ok(conversation)
        })?;

        self.db.publish(Change::Message {
            conversation_id: conversation_id.to_string(),
        });
        self.announce(&conversation);

        debug!(
            "{} sent message {} to {} in {}",
            sender_id,
            message.id,
            conversation.other_participant(sender_id).unwrap_or("?"),
            conversation_id
        );
        Ok(message)
    }

    /// Zero `user_id`'s unread counter and mark the other side's messages
    /// read. Repeated calls are no-ops.
    pub fn mark_messages_as_read(&self, conversation_id: &str, user_id: &str) -> ServiceResult<()> {
        let (conversation, changed) = self.db.with_tx(|tx| {
            let conversation = conversations::get(tx, conversation_id)?
                .ok_or_else(|| ServiceError::not_found(format!("conversation {conversation_id}")))?;
            if !conversation.has_participant(user_id) {
                return Err(ServiceError::permission("not part of this conversation").into());
            }

            let counter_reset = conversations::reset_unread(tx, conversation_id, user_id)?;
            let marked = messages::mark_read_for(tx, conversation_id, user_id)?;
            Ok((conversation, counter_reset || marked > 0))
        })?;

        if changed {
            self.db.publish(Change::Message {
                conversation_id: conversation_id.to_string(),
            });
            self.announce(&conversation);
        }
        Ok(())
    }

    /// Read receipts must never block the caller: failures are logged and dropped.
    pub fn mark_messages_as_read_quietly(&self, conversation_id: &str, user_id: &str) {
        if let Err(e) = self.mark_messages_as_read(conversation_id, user_id) {
            warn!(
                "Failed to mark conversation {} read for {}: {}",
                conversation_id, user_id, e
            );
        }
    }

    /// Oldest first.
    pub fn list_messages(&self, conversation_id: &str) -> ServiceResult<Vec<Message>> {
        Ok(self.db.with_conn(|conn| messages::list(conn, conversation_id))?)
    }

    /// Most recently active first.
    pub fn list_user_conversations(&self, user_id: &str) -> ServiceResult<Vec<Conversation>> {
        Ok(self.db.with_conn(|conn| conversations::list_for_user(conn, user_id))?)
    }

    pub fn get_total_unread_messages(&self, user_id: &str) -> ServiceResult<u64> {
        Ok(self.db.with_conn(|conn| conversations::total_unread(conn, user_id))?)
    }

    /// Call `on_snapshot` with every message of the conversation, oldest
    /// first, now and after each change. Requires a tokio runtime.
    pub fn listen_to_conversation_messages<C>(&self, conversation_id: &str, on_snapshot: C) -> Subscription
    where
        C: FnMut(Vec<Message>) + Send + 'static,
    {
        let watched = conversation_id.to_string();
        let queried = conversation_id.to_string();
        self.db.watch(
            move |change| change.concerns_messages_of(&watched),
            move |db| db.with_conn(|conn| messages::list(conn, &queried)),
            on_snapshot,
        )
    }

    /// Call `on_snapshot` with the user's conversations, most recently active
    /// first, now and after each change. Requires a tokio runtime.
    pub fn listen_to_user_conversations<C>(&self, user_id: &str, on_snapshot: C) -> Subscription
    where
        C: FnMut(Vec<Conversation>) + Send + 'static,
    {
        let watched = user_id.to_string();
        let queried = user_id.to_string();
        self.db.watch(
            move |change| change.concerns_participant(&watched),
            move |db| db.with_conn(|conn| conversations::list_for_user(conn, &queried)),
            on_snapshot,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn registry() -> MessagingRegistry {
        MessagingRegistry::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    #[test]
    fn create_conversation_is_idempotent_in_either_order() {
        let reg = registry();
        let first = reg.create_conversation("alice", "bob").unwrap();
        let again = reg.create_conversation("alice", "bob").unwrap();
        let reversed = reg.create_conversation("bob", "alice").unwrap();
        assert_eq!(first, again);
        assert_eq!(first, reversed);
        assert_eq!(reg.list_user_conversations("alice").unwrap().len(), 1);

        let conv = reg.get_conversation(&first).unwrap();
        assert_eq!(conv.unread_for("alice"), 0);
        assert_eq!(conv.unread_for("bob"), 0);
        assert!(conv.unread_counts.contains_key("alice") && conv.unread_counts.contains_key("bob"));
    }

    #[test]
    fn conversation_needs_two_distinct_users() {
        let reg = registry();
        assert!(matches!(reg.create_conversation("a", "a"), Err(ServiceError::Validation(_))));
        assert!(matches!(reg.create_conversation("a", " "), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn unread_counts_follow_sends_and_reads() {
        let reg = registry();
        let conv = reg.create_conversation("a", "b").unwrap();

        reg.send_message(&conv, "a", "hi", None).unwrap();
        let after_send = reg.get_conversation(&conv).unwrap();
        assert_eq!(after_send.unread_for("b"), 1);
        assert_eq!(after_send.unread_for("a"), 0);
        let last = after_send.last_message.unwrap();
        assert_eq!(last.text, "hi");
        assert_eq!(last.sender_id, "a");

        reg.send_message(&conv, "a", "are you free saturday?", None).unwrap();
        assert_eq!(reg.get_total_unread_messages("b").unwrap(), 2);

        reg.mark_messages_as_read(&conv, "b").unwrap();
        assert_eq!(reg.get_conversation(&conv).unwrap().unread_for("b"), 0);
        assert!(reg.list_messages(&conv).unwrap().iter().all(|m| m.read));

        // idempotent and fine with nothing unread
        reg.mark_messages_as_read(&conv, "b").unwrap();
        reg.mark_messages_as_read(&conv, "a").unwrap();
        assert_eq!(reg.get_total_unread_messages("b").unwrap(), 0);
    }

    #[test]
    fn total_unread_sums_across_conversations() {
        let reg = registry();
        let with_a = reg.create_conversation("a", "me").unwrap();
        let with_b = reg.create_conversation("b", "me").unwrap();

        reg.send_message(&with_a, "a", "one", None).unwrap();
        reg.send_message(&with_b, "b", "two", None).unwrap();
        reg.send_message(&with_b, "b", "three", None).unwrap();
        reg.send_message(&with_b, "me", "reply", None).unwrap();

        assert_eq!(reg.get_total_unread_messages("me").unwrap(), 3);
        assert_eq!(reg.get_total_unread_messages("b").unwrap(), 1);

        let inbox = reg.list_user_conversations("me").unwrap();
        assert_eq!(inbox[0].id, with_b);
    }

    #[test]
    fn message_rules() {
        let reg = registry();
        let conv = reg.create_conversation("a", "b").unwrap();

        assert!(matches!(reg.send_message(&conv, "a", "  ", None), Err(ServiceError::Validation(_))));
        assert!(matches!(reg.send_message(&conv, "c", "hi", None), Err(ServiceError::Permission(_))));
        assert!(matches!(reg.send_message("missing", "a", "hi", None), Err(ServiceError::NotFound(_))));
        assert!(matches!(reg.mark_messages_as_read(&conv, "c"), Err(ServiceError::Permission(_))));

        let image = reg
            .send_message(&conv, "a", "", Some("https://cdn.example/p.jpg"))
            .unwrap();
        assert_eq!(image.text, IMAGE_ONLY_TEXT);
        assert_eq!(image.image_url.as_deref(), Some("https://cdn.example/p.jpg"));

        let listed = reg.list_messages(&conv).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], image);
    }

    #[test]
    fn quiet_read_receipt_swallows_errors() {
        let reg = registry();
        reg.mark_messages_as_read_quietly("missing", "a");
    }

    #[tokio::test]
    async fn conversation_listener_gets_full_snapshots() {
        let reg = registry();
        let conv = reg.create_conversation("a", "b").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let sub = reg.listen_to_conversation_messages(&conv, move |snapshot| {
            let _ = tx.send(snapshot);
        });

        let initial = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert!(initial.is_empty());

        reg.send_message(&conv, "a", "first", None).unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);

        reg.send_message(&conv, "b", "second", None).unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        let texts: Vec<&str> = snapshot.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);

        sub.unsubscribe();
        reg.send_message(&conv, "a", "third", None).unwrap();
        let after = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(matches!(after, Ok(None) | Err(_)));
    }

    #[tokio::test]
    async fn inbox_listener_tracks_unread() {
        let reg = registry();
        let conv = reg.create_conversation("a", "b").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _sub = reg.listen_to_user_conversations("b", move |snapshot| {
            let _ = tx.send(snapshot);
        });

        let initial = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(initial.len(), 1);
        assert_eq!(initial[0].unread_for("b"), 0);

        reg.send_message(&conv, "a", "hello", None).unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(snapshot[0].unread_for("b"), 1);

        reg.mark_messages_as_read(&conv, "b").unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(snapshot[0].unread_for("b"), 0);
    }
}
