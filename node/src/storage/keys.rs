//! Composite key layouts for the index trees.

use hamrokotha_fraud_core::ContentDigest;
use hamrokotha_messaging::{
    participant_pair, ConversationId, ConversationKind, MessageId, PropertyId, UserId,
};

use crate::listings::ImageId;

const ID_LEN: usize = 16;

fn concat(parts: &[&[u8]]) -> Vec<u8> {
    let mut key = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

/// `property | image`
pub fn property_image(property: &PropertyId, image: &ImageId) -> Vec<u8> {
    concat(&[property.as_bytes(), image.as_bytes()])
}

/// `digest | image`, value is the owning property.
pub fn image_digest(digest: &ContentDigest, image: &ImageId) -> Vec<u8> {
    concat(&[digest.as_bytes(), image.as_bytes()])
}

pub fn image_from_digest_key(key: &[u8]) -> Option<ImageId> {
    ImageId::from_slice(key.get(hamrokotha_fraud_core::DIGEST_LEN..)?)
}

pub fn image_from_property_key(key: &[u8]) -> Option<ImageId> {
    ImageId::from_slice(key.get(ID_LEN..)?)
}

/// `kind | low user | high user`, followed by the listing for inquiries.
/// Chats between two users are unique whatever they talk about; inquiries
/// are unique per listing.
pub fn conversation_pair(
    kind: ConversationKind,
    a: UserId,
    b: UserId,
    property: Option<PropertyId>,
) -> Vec<u8> {
    let (low, high) = participant_pair(a, b);
    let mut key = concat(&[&[kind.tag()], low.as_bytes(), high.as_bytes()]);
    if let (ConversationKind::Inquiry, Some(property)) = (kind, property) {
        key.extend_from_slice(property.as_bytes());
    }
    key
}

/// `user | conversation`
pub fn user_conversation(user: &UserId, conversation: &ConversationId) -> Vec<u8> {
    concat(&[user.as_bytes(), conversation.as_bytes()])
}

pub fn conversation_from_user_key(key: &[u8]) -> Option<ConversationId> {
    ConversationId::from_slice(key.get(ID_LEN..)?)
}

/// `conversation | sequence (big endian) | message`, so a prefix scan yields
/// a conversation's messages in the order they were appended.
pub fn message(conversation: &ConversationId, sequence: u64, message: &MessageId) -> Vec<u8> {
    concat(&[conversation.as_bytes(), &sequence.to_be_bytes(), message.as_bytes()])
}

/// `recipient | conversation | message`
pub fn unread(recipient: &UserId, conversation: &ConversationId, message: &MessageId) -> Vec<u8> {
    concat(&[recipient.as_bytes(), conversation.as_bytes(), message.as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_ignores_argument_order() {
        let a = UserId::new();
        let b = UserId::new();
        assert_eq!(
            conversation_pair(ConversationKind::Chat, a, b, None),
            conversation_pair(ConversationKind::Chat, b, a, None)
        );
        assert_ne!(
            conversation_pair(ConversationKind::Chat, a, b, None),
            conversation_pair(ConversationKind::Inquiry, a, b, None)
        );
    }

    #[test]
    fn inquiry_keys_include_listing() {
        let a = UserId::new();
        let b = UserId::new();
        let first = PropertyId::new();
        let second = PropertyId::new();
        assert_ne!(
            conversation_pair(ConversationKind::Inquiry, a, b, Some(first)),
            conversation_pair(ConversationKind::Inquiry, a, b, Some(second))
        );
        assert_eq!(
            conversation_pair(ConversationKind::Chat, a, b, Some(first)),
            conversation_pair(ConversationKind::Chat, a, b, Some(second))
        );
    }

    #[test]
    fn message_keys_sort_by_sequence() {
        let conversation = ConversationId::new();
        let earlier = message(&conversation, 255, &MessageId::new());
        let later = message(&conversation, 256, &MessageId::new());
        assert!(earlier < later);
        assert!(earlier.starts_with(conversation.as_bytes()));
    }

    #[test]
    fn ids_recovered_from_keys() {
        let digest = ContentDigest::of(b"photo");
        let image = ImageId::new();
        assert_eq!(image_from_digest_key(&image_digest(&digest, &image)), Some(image));

        let property = PropertyId::new();
        assert_eq!(
            image_from_property_key(&property_image(&property, &image)),
            Some(image)
        );
    }
}
