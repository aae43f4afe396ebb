use std::collections::HashSet;

use crate::control::{ControlPing, ControlPingReply};
use crate::message::{Message, MessageInfo};

/// Set of message types whose IDs are resolved against VPP on connect.
///
/// The control ping pair is always present.
#[derive(Debug, Clone)]
pub struct MessageRegistry {
    messages: Vec<MessageInfo>,
    seen: HashSet<(&'static str, &'static str)>,
}

impl MessageRegistry {
    /// Create a registry holding only the control ping pair.
    pub fn new() -> Self {
        let mut registry = Self {
            messages: Vec::new(),
            seen: HashSet::new(),
        };
        registry.register::<ControlPing>();
        registry.register::<ControlPingReply>();
        registry
    }

    /// Register a message type.
    pub fn register<M: Message + Default>(&mut self) -> &mut Self {
        self.register_info(MessageInfo::of(&M::default()))
    }

    /// Register a message type by its identity. Duplicates are ignored.
    pub fn register_info(&mut self, info: MessageInfo) -> &mut Self {
        if self.seen.insert((info.name, info.crc)) {
            self.messages.push(info);
        }
        self
    }

    /// Builder-style variant of [`MessageRegistry::register`].
    pub fn with<M: Message + Default>(mut self) -> Self {
        self.register::<M>();
        self
    }

    /// Whether a message with this name and crc is registered.
    pub fn contains(&self, name: &str, crc: &str) -> bool {
        self.messages
            .iter()
            .any(|info| info.name == name && info.crc == crc)
    }

    /// Registered messages in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &MessageInfo> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{CONTROL_PING, CONTROL_PING_REPLY};
    use crate::message::MessageType;

    #[test]
    fn new_registry_contains_control_ping_pair() {
        let registry = MessageRegistry::new();
        assert_eq!(registry.len(), 2);
        let names: Vec<_> = registry.iter().map(|info| info.name).collect();
        assert_eq!(names, vec![CONTROL_PING, CONTROL_PING_REPLY]);
    }

    #[test]
    fn duplicates_are_ignored() {
        let registry = MessageRegistry::new()
            .with::<ControlPing>()
            .with::<ControlPingReply>();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn register_info_adds_new_types() {
        let mut registry = MessageRegistry::new();
        registry.register_info(MessageInfo {
            name: "show_version",
            crc: "51077d14",
            kind: MessageType::Request,
        });

        assert_eq!(registry.len(), 3);
        assert!(registry.contains("show_version", "51077d14"));
        assert!(!registry.contains("show_version", "00000000"));
    }
}
