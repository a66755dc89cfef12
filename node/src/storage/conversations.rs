use std::ops::Bound;

use anyhow::Result;
use hamrokotha_messaging::{
    Conversation, ConversationId, ConversationKind, Message, MessageId, PropertyId, UserId,
};
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};
use sled::Transactional;

use super::{decode, decode_tx, encode, encode_tx, keys, tx_error, NodeStorage};

type TxResult<T> = ConflictableTransactionResult<T, anyhow::Error>;

impl NodeStorage {
    /// Finds the conversation of `kind` between `a` and `b` in either order,
    /// creating it when missing. Inquiries are looked up per listing, and a
    /// closed inquiry is replaced by a fresh one. A supplied listing is
    /// attached to a chat only when it has none. The boolean is `true` on
    /// creation.
    pub fn get_or_create_conversation(
        &self,
        kind: ConversationKind,
        a: UserId,
        b: UserId,
        property: Option<PropertyId>,
    ) -> Result<(Conversation, bool)> {
        let pairs = self.tree(Self::CONVERSATION_PAIRS)?;
        let conversations = self.tree(Self::CONVERSATIONS)?;
        let user_conversations = self.tree(Self::USER_CONVERSATIONS)?;
        let pair_key = keys::conversation_pair(kind, a, b, property);

        let create = |pairs: &TransactionalTree,
                      conversations: &TransactionalTree,
                      user_conversations: &TransactionalTree|
         -> TxResult<(Conversation, bool)> {
            let conversation = Conversation::new(kind, a, b, property);
            let id = conversation.id;
            conversations.insert(&id.as_bytes()[..], encode_tx(&conversation)?)?;
            pairs.insert(&pair_key[..], &id.as_bytes()[..])?;
            user_conversations.insert(keys::user_conversation(&a, &id), Vec::<u8>::new())?;
            user_conversations.insert(keys::user_conversation(&b, &id), Vec::<u8>::new())?;
            Ok((conversation, true))
        };

        (&pairs, &conversations, &user_conversations)
            .transaction(
                |(pairs, conversations, user_conversations)| -> TxResult<(Conversation, bool)> {
                    if let Some(existing) = pairs.get(&pair_key[..])? {
                        if let Some(bytes) = conversations.get(&existing)? {
                            let mut conversation: Conversation = decode_tx(&bytes)?;
                            let closed = conversation
                                .inquiry_status
                                .is_some_and(|status| !status.is_open());
                            if closed {
                                return create(pairs, conversations, user_conversations);
                            }
                            if let Some(property) = property {
                                if conversation.attach_property(property) {
                                    conversations.insert(
                                        &conversation.id.as_bytes()[..],
                                        encode_tx(&conversation)?,
                                    )?;
                                }
                            }
                            return Ok((conversation, false));
                        }
                    }

                    create(pairs, conversations, user_conversations)
                },
            )
            .map_err(tx_error)
    }

    pub fn conversation(&self, id: ConversationId) -> Result<Option<Conversation>> {
        let tree = self.tree(Self::CONVERSATIONS)?;
        tree.get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Read-modify-write of a single conversation. The record is only written
    /// back when `apply` changed it.
    pub fn update_conversation<T>(
        &self,
        id: ConversationId,
        mut apply: impl FnMut(&mut Conversation) -> T,
    ) -> Result<Option<(Conversation, T)>> {
        let tree = self.tree(Self::CONVERSATIONS)?;
        let key = id.as_bytes();
        loop {
            let Some(current) = tree.get(key)? else {
                return Ok(None);
            };
            let original: Conversation = decode(&current)?;
            let mut updated = original.clone();
            let outcome = apply(&mut updated);
            if updated == original {
                return Ok(Some((updated, outcome)));
            }
            if tree
                .compare_and_swap(key, Some(&current), Some(encode(&updated)?))?
                .is_ok()
            {
                tree.flush()?;
                return Ok(Some((updated, outcome)));
            }
        }
    }

    /// Conversations `user` takes part in, most recent activity first.
    pub fn conversations_for(&self, user: UserId) -> Result<Vec<Conversation>> {
        let user_conversations = self.tree(Self::USER_CONVERSATIONS)?;
        let mut found = Vec::new();
        for entry in user_conversations.scan_prefix(user.as_bytes()).keys() {
            let key = entry?;
            let Some(id) = keys::conversation_from_user_key(&key) else {
                continue;
            };
            if let Some(conversation) = self.conversation(id)? {
                found.push(conversation);
            }
        }
        found.sort_by(|a, b| b.activity_ms().cmp(&a.activity_ms()));
        Ok(found)
    }

    /// Appends `message` and advances the conversation in one transaction.
    ///
    /// The message's timestamp is clamped so it never precedes the previous
    /// one, and an unread entry is recorded for the recipient. Returns `None`
    /// when the conversation does not exist.
    pub fn append_message(
        &self,
        conversation_id: ConversationId,
        message: &Message,
    ) -> Result<Option<(Message, Conversation)>> {
        let conversations = self.tree(Self::CONVERSATIONS)?;
        let messages = self.tree(Self::MESSAGES)?;
        let message_keys = self.tree(Self::MESSAGE_KEYS)?;
        let unread = self.tree(Self::UNREAD)?;

        let appended = (&conversations, &messages, &message_keys, &unread)
            .transaction(
                |(conversations, messages, message_keys, unread)| -> TxResult<Option<(Message, Conversation)>> {
                    let Some(bytes) = conversations.get(conversation_id.as_bytes())? else {
                        return Ok(None);
                    };
                    let mut conversation: Conversation = decode_tx(&bytes)?;
                    let mut message = message.clone();
                    if let Some(last) = conversation.last_message_ms {
                        message.created_ms = message.created_ms.max(last);
                    }
                    let sequence = conversation.record_message(message.sender, message.created_ms);

                    let key = keys::message(&conversation.id, sequence, &message.id);
                    messages.insert(&key[..], encode_tx(&message)?)?;
                    message_keys.insert(&message.id.as_bytes()[..], &key[..])?;
                    if let Some(recipient) = conversation.other_participant(message.sender) {
                        unread.insert(
                            keys::unread(&recipient, &conversation.id, &message.id),
                            Vec::<u8>::new(),
                        )?;
                    }
                    conversations.insert(&conversation.id.as_bytes()[..], encode_tx(&conversation)?)?;
                    Ok(Some((message, conversation)))
                },
            )
            .map_err(tx_error)?;
        messages.flush()?;
        Ok(appended)
    }

    /// Messages in append order. With `after`, only those appended after
    /// that message; an unknown `after` id yields the full log.
    pub fn messages(
        &self,
        conversation_id: ConversationId,
        after: Option<MessageId>,
    ) -> Result<Vec<Message>> {
        let messages = self.tree(Self::MESSAGES)?;
        let prefix = conversation_id.as_bytes();

        let start = match after {
            Some(after) => self
                .tree(Self::MESSAGE_KEYS)?
                .get(after.as_bytes())?
                .filter(|key| key.starts_with(prefix)),
            None => None,
        };
        let iter = match start {
            Some(key) => messages.range((Bound::Excluded(key), Bound::Unbounded)),
            None => messages.scan_prefix(prefix),
        };

        let mut found = Vec::new();
        for entry in iter {
            let (key, value) = entry?;
            if !key.starts_with(prefix) {
                break;
            }
            found.push(decode(&value)?);
        }
        Ok(found)
    }

    pub fn last_message(&self, conversation_id: ConversationId) -> Result<Option<Message>> {
        let messages = self.tree(Self::MESSAGES)?;
        messages
            .scan_prefix(conversation_id.as_bytes())
            .values()
            .next_back()
            .transpose()?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Marks every unread message not sent by `reader` as read and drops the
    /// matching unread entries. Returns how many messages changed.
    pub fn mark_read(
        &self,
        conversation: &Conversation,
        reader: UserId,
        now_ms: i64,
    ) -> Result<usize> {
        let messages = self.tree(Self::MESSAGES)?;
        let unread = self.tree(Self::UNREAD)?;

        let mut pending = Vec::new();
        for entry in messages.scan_prefix(conversation.id.as_bytes()) {
            let (key, value) = entry?;
            let message: Message = decode(&value)?;
            if message.is_unread_for(reader) {
                pending.push(key);
            }
        }
        if pending.is_empty() {
            return Ok(0);
        }

        let changed = (&messages, &unread)
            .transaction(|(messages, unread)| -> TxResult<usize> {
                let mut changed = 0;
                for key in &pending {
                    let Some(bytes) = messages.get(key)? else {
                        continue;
                    };
                    let mut message: Message = decode_tx(&bytes)?;
                    if !message.is_unread_for(reader) || !message.mark_read(now_ms) {
                        continue;
                    }
                    messages.insert(key.clone(), encode_tx(&message)?)?;
                    if let Some(recipient) = conversation.other_participant(message.sender) {
                        unread.remove(keys::unread(&recipient, &conversation.id, &message.id))?;
                    }
                    changed += 1;
                }
                Ok(changed)
            })
            .map_err(tx_error)?;
        if changed > 0 {
            messages.flush()?;
        }
        Ok(changed)
    }

    /// Unread messages waiting for `user` in one conversation.
    pub fn unread_count(&self, conversation_id: ConversationId, user: UserId) -> Result<usize> {
        let unread = self.tree(Self::UNREAD)?;
        let mut prefix = user.as_bytes().to_vec();
        prefix.extend_from_slice(conversation_id.as_bytes());
        count_keys(&unread, &prefix)
    }

    /// Unread messages waiting for `user` across all conversations, answered
    /// by a single prefix count over the recipient index.
    pub fn total_unread_count(&self, user: UserId) -> Result<usize> {
        let unread = self.tree(Self::UNREAD)?;
        count_keys(&unread, user.as_bytes())
    }
}

fn count_keys(tree: &sled::Tree, prefix: &[u8]) -> Result<usize> {
    let mut count = 0;
    for key in tree.scan_prefix(prefix).keys() {
        key?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(storage: &NodeStorage, a: UserId, b: UserId) -> Conversation {
        storage
            .get_or_create_conversation(ConversationKind::Chat, a, b, None)
            .unwrap()
            .0
    }

    fn post(storage: &NodeStorage, conversation: &Conversation, sender: UserId, body: &str) -> Message {
        let message = Message::new(conversation.id, sender, body).unwrap();
        storage
            .append_message(conversation.id, &message)
            .unwrap()
            .unwrap()
            .0
    }

    #[test]
    fn pair_lookup_is_order_independent() {
        let storage = NodeStorage::temporary().unwrap();
        let alice = UserId::new();
        let bob = UserId::new();

        let (first, created) = storage
            .get_or_create_conversation(ConversationKind::Chat, alice, bob, None)
            .unwrap();
        assert!(created);
        let (second, created) = storage
            .get_or_create_conversation(ConversationKind::Chat, bob, alice, None)
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);

        let (inquiry, created) = storage
            .get_or_create_conversation(ConversationKind::Inquiry, alice, bob, None)
            .unwrap();
        assert!(created);
        assert_ne!(inquiry.id, first.id);
    }

    #[test]
    fn property_is_attached_once() {
        let storage = NodeStorage::temporary().unwrap();
        let alice = UserId::new();
        let bob = UserId::new();
        let first = PropertyId::new();

        chat(&storage, alice, bob);
        let (linked, _) = storage
            .get_or_create_conversation(ConversationKind::Chat, bob, alice, Some(first))
            .unwrap();
        assert_eq!(linked.property_id, Some(first));

        let (again, _) = storage
            .get_or_create_conversation(ConversationKind::Chat, alice, bob, Some(PropertyId::new()))
            .unwrap();
        assert_eq!(again.property_id, Some(first));
        assert_eq!(
            storage.conversation(linked.id).unwrap().unwrap().property_id,
            Some(first)
        );
    }

    #[test]
    fn append_tracks_unread_for_recipient() {
        let storage = NodeStorage::temporary().unwrap();
        let alice = UserId::new();
        let bob = UserId::new();
        let conversation = chat(&storage, alice, bob);

        post(&storage, &conversation, alice, "hi");
        assert_eq!(storage.unread_count(conversation.id, bob).unwrap(), 1);
        assert_eq!(storage.unread_count(conversation.id, alice).unwrap(), 0);
        assert_eq!(storage.total_unread_count(bob).unwrap(), 1);

        let stored = storage.conversation(conversation.id).unwrap().unwrap();
        assert_eq!(stored.message_count, 1);
        assert!(stored.last_message_ms.is_some());
    }

    #[test]
    fn append_to_missing_conversation_is_none() {
        let storage = NodeStorage::temporary().unwrap();
        let id = ConversationId::new();
        let message = Message::new(id, UserId::new(), "hello").unwrap();
        assert!(storage.append_message(id, &message).unwrap().is_none());
        assert!(storage.messages(id, None).unwrap().is_empty());
    }

    #[test]
    fn messages_come_back_in_order_and_after_cursor() {
        let storage = NodeStorage::temporary().unwrap();
        let alice = UserId::new();
        let bob = UserId::new();
        let conversation = chat(&storage, alice, bob);
        let other = chat(&storage, alice, UserId::new());

        let first = post(&storage, &conversation, alice, "one");
        let second = post(&storage, &conversation, bob, "two");
        let third = post(&storage, &conversation, alice, "three");
        post(&storage, &other, alice, "elsewhere");

        let all = storage.messages(conversation.id, None).unwrap();
        let bodies: Vec<_> = all.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["one", "two", "three"]);
        assert!(all.windows(2).all(|w| w[0].created_ms <= w[1].created_ms));

        let newer = storage.messages(conversation.id, Some(first.id)).unwrap();
        assert_eq!(
            newer.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![second.id, third.id]
        );
        assert!(storage
            .messages(conversation.id, Some(third.id))
            .unwrap()
            .is_empty());
        assert_eq!(
            storage
                .messages(conversation.id, Some(MessageId::new()))
                .unwrap()
                .len(),
            3
        );
        assert_eq!(
            storage.last_message(conversation.id).unwrap().map(|m| m.id),
            Some(third.id)
        );
    }

    #[test]
    fn mark_read_is_idempotent() {
        let storage = NodeStorage::temporary().unwrap();
        let alice = UserId::new();
        let bob = UserId::new();
        let conversation = chat(&storage, alice, bob);

        post(&storage, &conversation, alice, "one");
        post(&storage, &conversation, alice, "two");
        post(&storage, &conversation, bob, "mine");

        assert_eq!(storage.mark_read(&conversation, bob, 42).unwrap(), 2);
        assert_eq!(storage.unread_count(conversation.id, bob).unwrap(), 0);
        assert_eq!(storage.unread_count(conversation.id, alice).unwrap(), 1);

        let before = storage.messages(conversation.id, None).unwrap();
        assert_eq!(storage.mark_read(&conversation, bob, 99).unwrap(), 0);
        let after = storage.messages(conversation.id, None).unwrap();
        assert_eq!(before, after);
        assert!(after
            .iter()
            .filter(|m| m.sender == alice)
            .all(|m| m.is_read && m.read_ms == Some(42)));
    }

    #[test]
    fn total_unread_spans_conversations() {
        let storage = NodeStorage::temporary().unwrap();
        let alice = UserId::new();
        let bob = UserId::new();
        let carol = UserId::new();
        let with_bob = chat(&storage, alice, bob);
        let with_carol = chat(&storage, carol, alice);

        post(&storage, &with_bob, bob, "hey");
        post(&storage, &with_carol, carol, "hi");
        post(&storage, &with_carol, carol, "there?");
        post(&storage, &with_carol, alice, "yes");

        assert_eq!(storage.total_unread_count(alice).unwrap(), 3);
        assert_eq!(storage.total_unread_count(carol).unwrap(), 1);

        storage.mark_read(&with_carol, alice, 1).unwrap();
        assert_eq!(storage.total_unread_count(alice).unwrap(), 1);
    }

    #[test]
    fn conversations_sorted_by_activity() {
        let storage = NodeStorage::temporary().unwrap();
        let alice = UserId::new();
        let quiet = chat(&storage, alice, UserId::new());
        let busy = chat(&storage, alice, UserId::new());

        let message = Message {
            created_ms: quiet.updated_ms + 60_000,
            ..Message::new(busy.id, alice, "latest").unwrap()
        };
        storage.append_message(busy.id, &message).unwrap();

        let listed = storage.conversations_for(alice).unwrap();
        assert_eq!(
            listed.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![busy.id, quiet.id]
        );
    }

    #[test]
    fn update_skips_unchanged_records() {
        let storage = NodeStorage::temporary().unwrap();
        let conversation = chat(&storage, UserId::new(), UserId::new());
        let (same, touched) = storage
            .update_conversation(conversation.id, |_| false)
            .unwrap()
            .unwrap();
        assert!(!touched);
        assert_eq!(same, conversation);
        assert!(storage
            .update_conversation(ConversationId::new(), |_| ())
            .unwrap()
            .is_none());
    }
}
