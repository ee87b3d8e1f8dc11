use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use crate::bus::Event;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfProfile {
    pub uid: String,
    pub nick: String,
}

pub trait ProfileService: Send + Sync {
    fn get(&self) -> Option<SelfProfile>;

    /// Called for every bus event.
    fn observe(&self, event: &Event);
}

#[derive(Default)]
pub struct ProfileCache {
    current: RwLock<Option<SelfProfile>>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileService for ProfileCache {
    fn get(&self) -> Option<SelfProfile> {
        self.current.read().ok().and_then(|p| p.clone())
    }

    fn observe(&self, event: &Event) {
        if let Event::Login(profile) = event {
            if let Ok(mut current) = self.current.write() {
                *current = Some(profile.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ExtensionEvent;
    use serde_json::Value;

    #[test]
    fn test_login_event_updates_cache() {
        let cache = ProfileCache::new();
        cache.observe(&Event::Extension(ExtensionEvent::new("noise", Value::Null)));
        assert!(cache.get().is_none());

        let me = SelfProfile {
            uid: "u_1".to_string(),
            nick: "bot".to_string(),
        };
        cache.observe(&Event::Login(me.clone()));
        cache.observe(&Event::Extension(ExtensionEvent::new("noise", Value::Null)));
        assert_eq!(cache.get(), Some(me));
    }
}
