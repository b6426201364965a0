use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{ConnError, Result};
use crate::topic::Topic;

/// Topics registered on one connection, keyed by name.
///
/// Topics are only ever added explicitly; a frame naming an unknown topic
/// never creates one.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    topics: HashMap<String, Topic>,
    closed: bool,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `topic` under its name.
    ///
    /// Fails with [`ConnError::DuplicateTopic`] when the name is taken, with
    /// [`ConnError::TopicInUse`] when the topic already serves another
    /// registry and with [`ConnError::Closed`] once this registry has been
    /// closed. The registry is unchanged on failure.
    pub fn add(&self, topic: Topic) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(ConnError::Closed);
        }
        match state.topics.entry(topic.name().to_string()) {
            Entry::Occupied(slot) => Err(ConnError::DuplicateTopic(slot.key().clone())),
            Entry::Vacant(slot) => {
                if !topic.attach() {
                    return Err(ConnError::TopicInUse(slot.into_key()));
                }
                slot.insert(topic);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Topic> {
        self.lock().topics.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().topics.contains_key(name)
    }

    /// Registered topic names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().topics.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Empty the registry, refuse further additions and release every
    /// subscriber of every topic. Returns the number of subscribers released.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Topic> = {
            let mut state = self.lock();
            state.closed = true;
            state.topics.drain().map(|(_, topic)| topic).collect()
        };
        drained.iter().map(Topic::close).sum()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_lookup() {
        let registry = TopicRegistry::new();
        registry.add(Topic::new("dog")).unwrap();
        registry.add(Topic::new("cat")).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("dog"));
        assert_eq!(registry.get("cat").unwrap().name(), "cat");
        assert!(registry.get("bird").is_none());
        assert_eq!(registry.names(), vec!["cat".to_string(), "dog".to_string()]);
    }

    #[test]
    fn duplicate_keeps_original_and_lock_is_released() {
        let registry = TopicRegistry::new();
        let original = Topic::new("dog");
        let _sub = original.subscribe();
        registry.add(original).unwrap();

        let err = registry.add(Topic::new("dog")).unwrap_err();
        assert!(matches!(err, ConnError::DuplicateTopic(ref name) if name == "dog"));
        assert_eq!(registry.get("dog").unwrap().subscriber_count(), 1);

        // The failed add must not leave the lock held.
        registry.add(Topic::new("cat")).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn topic_serves_one_registry() {
        let first = TopicRegistry::new();
        let second = TopicRegistry::new();
        let dog = Topic::new("dog");
        first.add(dog.clone()).unwrap();

        let err = second.add(dog.clone()).unwrap_err();
        assert!(matches!(err, ConnError::TopicInUse(ref name) if name == "dog"));
        assert!(second.is_empty());

        first.close_all();
        assert!(matches!(second.add(dog), Err(ConnError::TopicInUse(_))));
    }

    #[tokio::test]
    async fn close_all_releases_subscribers_and_refuses_additions() {
        let registry = TopicRegistry::new();
        let dog = Topic::new("dog");
        let mut first = dog.subscribe();
        let mut second = dog.subscribe();
        registry.add(dog.clone()).unwrap();
        let cat = Topic::new("cat");
        let mut third = cat.subscribe();
        registry.add(cat).unwrap();

        assert_eq!(registry.close_all(), 3);
        assert!(registry.is_empty());
        assert!(registry.is_closed());
        assert!(dog.is_closed());
        assert!(first.recv().await.is_none());
        assert!(second.recv().await.is_none());
        assert!(third.recv().await.is_none());

        assert!(matches!(
            registry.add(Topic::new("bird")),
            Err(ConnError::Closed)
        ));
        assert_eq!(registry.close_all(), 0);
    }
}
