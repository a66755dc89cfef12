//! Message log and unread tracking over [`NodeStorage`].

use hamrokotha_messaging::{
    now_ms, Conversation, ConversationId, ConversationKind, InquiryStatus, Message, MessageId,
    MessagingError, PropertyId, UserId,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};
use crate::listings::PropertyRecord;
use crate::storage::NodeStorage;

/// One row of a user's conversation list.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub other_participant: Option<UserId>,
    pub unread_count: usize,
    pub last_message: Option<Message>,
}

#[derive(Clone)]
pub struct MessageTracker {
    storage: NodeStorage,
}

impl MessageTracker {
    pub fn new(storage: NodeStorage) -> Self {
        Self { storage }
    }

    /// Chat room between `a` and `b`, in either order. Callers reject `a == b`
    /// before getting here.
    pub fn get_or_create_conversation(
        &self,
        a: UserId,
        b: UserId,
        property: Option<PropertyId>,
    ) -> ServiceResult<(Conversation, bool)> {
        self.get_or_create(ConversationKind::Chat, a, b, property)
    }

    /// Inquiry thread between a tenant and the owner of `property`. Callers
    /// reject owners inquiring about their own listing.
    pub fn open_inquiry(
        &self,
        tenant: UserId,
        property: &PropertyRecord,
    ) -> ServiceResult<(Conversation, bool)> {
        self.get_or_create(
            ConversationKind::Inquiry,
            tenant,
            property.owner,
            Some(property.id),
        )
    }

    fn get_or_create(
        &self,
        kind: ConversationKind,
        a: UserId,
        b: UserId,
        property: Option<PropertyId>,
    ) -> ServiceResult<(Conversation, bool)> {
        let (conversation, created) = self
            .storage
            .get_or_create_conversation(kind, a, b, property)?;
        if created {
            info!(conversation = %conversation.id, ?kind, "conversation started");
        }
        Ok((conversation, created))
    }

    pub fn conversation(&self, id: ConversationId) -> ServiceResult<Conversation> {
        self.storage
            .conversation(id)?
            .ok_or(ServiceError::NotFound("conversation"))
    }

    /// Loads a conversation on behalf of `user`, who must take part in it.
    pub fn conversation_for(&self, id: ConversationId, user: UserId) -> ServiceResult<Conversation> {
        let conversation = self.conversation(id)?;
        if !conversation.is_participant(user) {
            return Err(MessagingError::NotParticipant.into());
        }
        Ok(conversation)
    }

    /// Appends a message from `sender`, who the caller has checked is a
    /// participant. Blank bodies are rejected before anything is written.
    pub fn post_message(
        &self,
        conversation_id: ConversationId,
        sender: UserId,
        body: &str,
    ) -> ServiceResult<Message> {
        let message = Message::new(conversation_id, sender, body)?;
        let (message, conversation) = self
            .storage
            .append_message(conversation_id, &message)?
            .ok_or(ServiceError::NotFound("conversation"))?;
        debug!(
            conversation = %conversation_id,
            message = %message.id,
            status = ?conversation.inquiry_status,
            "message posted"
        );
        Ok(message)
    }

    /// Marks everything the other side sent as read. Returns how many
    /// messages changed; zero on a repeat call.
    pub fn mark_read(&self, conversation_id: ConversationId, reader: UserId) -> ServiceResult<usize> {
        let conversation = self.conversation(conversation_id)?;
        let changed = self.storage.mark_read(&conversation, reader, now_ms())?;
        if changed > 0 {
            debug!(conversation = %conversation_id, %reader, changed, "messages marked read");
        }
        Ok(changed)
    }

    pub fn unread_count(&self, conversation_id: ConversationId, user: UserId) -> ServiceResult<usize> {
        Ok(self.storage.unread_count(conversation_id, user)?)
    }

    /// Unread messages for `user` across every conversation.
    pub fn total_unread_count(&self, user: UserId) -> ServiceResult<usize> {
        Ok(self.storage.total_unread_count(user)?)
    }

    /// Messages in creation order, optionally only those after `after`.
    pub fn messages(
        &self,
        conversation_id: ConversationId,
        after: Option<MessageId>,
    ) -> ServiceResult<Vec<Message>> {
        Ok(self.storage.messages(conversation_id, after)?)
    }

    /// `user`'s conversations, most recent activity first.
    pub fn conversations_for(&self, user: UserId) -> ServiceResult<Vec<ConversationSummary>> {
        let conversations = self.storage.conversations_for(user)?;
        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            summaries.push(ConversationSummary {
                other_participant: conversation.other_participant(user),
                unread_count: self.storage.unread_count(conversation.id, user)?,
                last_message: self.storage.last_message(conversation.id)?,
                conversation,
            });
        }
        Ok(summaries)
    }

    pub fn close_inquiry(&self, id: ConversationId, by: UserId) -> ServiceResult<InquiryStatus> {
        self.transition(id, |conversation| conversation.close_inquiry(by))
    }

    pub fn reopen_inquiry(&self, id: ConversationId, by: UserId) -> ServiceResult<InquiryStatus> {
        self.transition(id, |conversation| conversation.reopen_inquiry(by))
    }

    fn transition(
        &self,
        id: ConversationId,
        apply: impl FnMut(&mut Conversation) -> hamrokotha_messaging::Result<InquiryStatus>,
    ) -> ServiceResult<InquiryStatus> {
        let (_, outcome) = self
            .storage
            .update_conversation(id, apply)?
            .ok_or(ServiceError::NotFound("conversation"))?;
        let status = outcome?;
        info!(conversation = %id, %status, "inquiry status changed");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> MessageTracker {
        MessageTracker::new(NodeStorage::temporary().unwrap())
    }

    #[test]
    fn fresh_conversation_has_nothing_unread() {
        let tracker = tracker();
        let alice = UserId::new();
        let bob = UserId::new();
        let (conversation, created) = tracker.get_or_create_conversation(alice, bob, None).unwrap();
        assert!(created);
        assert_eq!(tracker.unread_count(conversation.id, alice).unwrap(), 0);
        assert_eq!(tracker.unread_count(conversation.id, bob).unwrap(), 0);
    }

    #[test]
    fn post_counts_for_recipient_only() {
        let tracker = tracker();
        let alice = UserId::new();
        let bob = UserId::new();
        let (conversation, _) = tracker.get_or_create_conversation(alice, bob, None).unwrap();

        let message = tracker.post_message(conversation.id, alice, "hi").unwrap();
        assert!(!message.is_read);
        assert_eq!(tracker.unread_count(conversation.id, bob).unwrap(), 1);
        assert_eq!(tracker.unread_count(conversation.id, alice).unwrap(), 0);

        let reloaded = tracker.conversation(conversation.id).unwrap();
        assert!(reloaded.updated_ms >= conversation.updated_ms);
        assert_eq!(reloaded.last_message_ms, Some(message.created_ms));
    }

    #[test]
    fn mark_read_twice_changes_nothing() {
        let tracker = tracker();
        let alice = UserId::new();
        let bob = UserId::new();
        let (conversation, _) = tracker.get_or_create_conversation(alice, bob, None).unwrap();
        tracker.post_message(conversation.id, alice, "hi").unwrap();

        assert_eq!(tracker.mark_read(conversation.id, bob).unwrap(), 1);
        assert_eq!(tracker.unread_count(conversation.id, bob).unwrap(), 0);
        let snapshot = tracker.messages(conversation.id, None).unwrap();

        assert_eq!(tracker.mark_read(conversation.id, bob).unwrap(), 0);
        assert_eq!(tracker.messages(conversation.id, None).unwrap(), snapshot);
    }

    #[test]
    fn reversed_lookup_returns_same_conversation() {
        let tracker = tracker();
        let alice = UserId::new();
        let bob = UserId::new();
        let (first, created_first) = tracker.get_or_create_conversation(alice, bob, None).unwrap();
        let (second, created_second) = tracker.get_or_create_conversation(bob, alice, None).unwrap();
        assert!(created_first);
        assert!(!created_second);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn empty_body_is_a_validation_error() {
        let tracker = tracker();
        let alice = UserId::new();
        let (conversation, _) = tracker
            .get_or_create_conversation(alice, UserId::new(), None)
            .unwrap();

        let err = tracker.post_message(conversation.id, alice, "   ").unwrap_err();
        assert!(matches!(err, ServiceError::Messaging(MessagingError::EmptyBody)));
        assert!(tracker.messages(conversation.id, None).unwrap().is_empty());
    }

    #[test]
    fn posting_to_unknown_conversation_is_not_found() {
        let tracker = tracker();
        let err = tracker
            .post_message(ConversationId::new(), UserId::new(), "hello")
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("conversation")));
    }

    #[test]
    fn total_unread_follows_reads() {
        let tracker = tracker();
        let a = UserId::new();
        let b = UserId::new();

        let (c, created) = tracker.get_or_create_conversation(a, b, None).unwrap();
        assert!(created);
        tracker.post_message(c.id, b, "Hello").unwrap();
        assert_eq!(tracker.total_unread_count(a).unwrap(), 1);

        tracker.mark_read(c.id, a).unwrap();
        assert_eq!(tracker.total_unread_count(a).unwrap(), 0);
    }

    #[test]
    fn conversation_list_carries_unread_and_last_message() {
        let tracker = tracker();
        let alice = UserId::new();
        let bob = UserId::new();
        let carol = UserId::new();
        let (with_bob, _) = tracker.get_or_create_conversation(alice, bob, None).unwrap();
        let (with_carol, _) = tracker.get_or_create_conversation(carol, alice, None).unwrap();
        tracker.post_message(with_bob.id, bob, "first").unwrap();
        tracker.post_message(with_carol.id, carol, "second").unwrap();

        let list = tracker.conversations_for(alice).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list
            .windows(2)
            .all(|w| w[0].conversation.activity_ms() >= w[1].conversation.activity_ms()));
        let carol_row = list
            .iter()
            .find(|row| row.conversation.id == with_carol.id)
            .unwrap();
        assert_eq!(carol_row.other_participant, Some(carol));
        assert_eq!(carol_row.unread_count, 1);
        assert_eq!(carol_row.last_message.as_ref().unwrap().body, "second");
    }

    #[test]
    fn non_participant_is_refused() {
        let tracker = tracker();
        let (conversation, _) = tracker
            .get_or_create_conversation(UserId::new(), UserId::new(), None)
            .unwrap();
        let err = tracker
            .conversation_for(conversation.id, UserId::new())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Messaging(MessagingError::NotParticipant)));
    }

    #[test]
    fn inquiry_moves_through_statuses() {
        let tracker = tracker();
        let tenant = UserId::new();
        let property = PropertyRecord::new(UserId::new(), "Room in Thamel");

        let (inquiry, created) = tracker.open_inquiry(tenant, &property).unwrap();
        assert!(created);
        assert_eq!(inquiry.property_id, Some(property.id));
        assert_eq!(inquiry.inquiry_status, Some(InquiryStatus::Pending));

        tracker.post_message(inquiry.id, tenant, "Is it available?").unwrap();
        tracker.post_message(inquiry.id, property.owner, "Yes").unwrap();
        assert_eq!(
            tracker.conversation(inquiry.id).unwrap().inquiry_status,
            Some(InquiryStatus::Responded)
        );

        let err = tracker.close_inquiry(inquiry.id, tenant).unwrap_err();
        assert!(matches!(err, ServiceError::Messaging(MessagingError::NotOwner)));
        assert_eq!(
            tracker.close_inquiry(inquiry.id, property.owner).unwrap(),
            InquiryStatus::Closed
        );
        assert_eq!(
            tracker.reopen_inquiry(inquiry.id, tenant).unwrap(),
            InquiryStatus::Responded
        );

        let (again, created) = tracker.open_inquiry(tenant, &property).unwrap();
        assert!(!created);
        assert_eq!(again.id, inquiry.id);
    }

    #[test]
    fn each_listing_gets_its_own_inquiry() {
        let tracker = tracker();
        let owner = UserId::new();
        let tenant = UserId::new();
        let flat = PropertyRecord::new(owner, "Flat in Lalitpur");
        let room = PropertyRecord::new(owner, "Room in Baneshwor");

        let (first, _) = tracker.open_inquiry(tenant, &flat).unwrap();
        let (second, created) = tracker.open_inquiry(tenant, &room).unwrap();
        assert!(created);
        assert_ne!(first.id, second.id);
        assert_eq!(second.property_id, Some(room.id));

        let (chat, _) = tracker.get_or_create_conversation(tenant, owner, None).unwrap();
        assert_ne!(chat.id, first.id);
        assert_ne!(chat.id, second.id);
    }

    #[test]
    fn closed_inquiry_gives_way_to_a_new_one() {
        let tracker = tracker();
        let tenant = UserId::new();
        let property = PropertyRecord::new(UserId::new(), "Room in Thamel");

        let (old, _) = tracker.open_inquiry(tenant, &property).unwrap();
        tracker.close_inquiry(old.id, property.owner).unwrap();

        let (fresh, created) = tracker.open_inquiry(tenant, &property).unwrap();
        assert!(created);
        assert_ne!(fresh.id, old.id);
        tracker.post_message(fresh.id, tenant, "Still available?").unwrap();
        assert_eq!(
            tracker.conversation(fresh.id).unwrap().inquiry_status,
            Some(InquiryStatus::Pending)
        );
        assert_eq!(
            tracker.conversation(old.id).unwrap().inquiry_status,
            Some(InquiryStatus::Closed)
        );

        let (again, created) = tracker.open_inquiry(tenant, &property).unwrap();
        assert!(!created);
        assert_eq!(again.id, fresh.id);
        assert_eq!(tracker.conversations_for(tenant).unwrap().len(), 2);
    }
}
