use std::collections::HashSet;

use crate::message::MsgClass;

/// Local record of (topic, class) pairs this client has registered with
/// the broker. At most one entry per pair.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    entries: HashSet<(String, MsgClass)>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the pair was already present.
    pub fn insert(&mut self, name: &str, class: MsgClass) -> bool {
        self.entries.insert((name.to_string(), class))
    }

    /// Returns false if the pair was not present.
    pub fn remove(&mut self, name: &str, class: MsgClass) -> bool {
        self.entries.remove(&(name.to_string(), class))
    }

    pub fn contains(&self, name: &str, class: MsgClass) -> bool {
        self.entries.contains(&(name.to_string(), class))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, MsgClass)> {
        self.entries.iter().map(|(name, class)| (name.as_str(), *class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_twice_unsubscribe_once() {
        let mut table = SubscriptionTable::new();
        assert!(table.insert("alarm", MsgClass::Instant));
        assert!(!table.insert("alarm", MsgClass::Instant));
        assert_eq!(table.len(), 1);

        assert!(table.remove("alarm", MsgClass::Instant));
        assert!(!table.contains("alarm", MsgClass::Instant));
        assert!(table.is_empty());
    }

    #[test]
    fn class_is_part_of_the_key() {
        let mut table = SubscriptionTable::new();
        table.insert("svc", MsgClass::Request);
        assert!(table.contains("svc", MsgClass::Request));
        assert!(!table.contains("svc", MsgClass::Instant));
        assert!(!table.remove("svc", MsgClass::Instant));
        assert_eq!(table.iter().collect::<Vec<_>>(), vec![("svc", MsgClass::Request)]);
    }
}
