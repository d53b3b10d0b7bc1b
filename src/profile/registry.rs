//! Profile registry mapping URIs to profile factories.
//!
//! Each channel gets its own profile instance, created from the registered
//! factory when the channel starts. Registration order is the order the
//! greeting advertises.
//!
//! # Example
//!
//! ```
//! use beepwire::profile::{ChannelContext, Profile, ProfileRegistry};
//! use beepwire::{Message, Result};
//!
//! struct Echo;
//!
//! impl Profile for Echo {
//!     fn handle_msg(&mut self, ctx: &mut ChannelContext<'_>, msgno: u32, message: Message) -> Result<()> {
//!         ctx.send_rpy(msgno, message);
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = ProfileRegistry::new();
//! registry.register("http://example.com/echo", || Echo);
//!
//! assert!(registry.contains("http://example.com/echo"));
//! assert_eq!(registry.uris().collect::<Vec<_>>(), vec!["http://example.com/echo"]);
//! ```

use super::Profile;

/// Factory creating a fresh profile instance per channel.
pub type ProfileFactory = Box<dyn Fn() -> Box<dyn Profile> + Send + Sync>;

/// Entry for a registered profile.
struct ProfileEntry {
    uri: String,
    factory: ProfileFactory,
}

/// Registry mapping profile URIs to factories.
#[derive(Default)]
pub struct ProfileRegistry {
    entries: Vec<ProfileEntry>,
}

impl ProfileRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a profile. Registering a URI again replaces its factory.
    pub fn register<F, P>(&mut self, uri: &str, factory: F)
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: Profile + 'static,
    {
        let factory: ProfileFactory = Box::new(move || Box::new(factory()));
        match self.entries.iter_mut().find(|entry| entry.uri == uri) {
            Some(entry) => entry.factory = factory,
            None => self.entries.push(ProfileEntry {
                uri: uri.to_string(),
                factory,
            }),
        }
    }

    /// Check whether a URI is registered.
    pub fn contains(&self, uri: &str) -> bool {
        self.entries.iter().any(|entry| entry.uri == uri)
    }

    /// Registered URIs in registration order.
    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.uri.as_str())
    }

    /// Create a profile instance for `uri`.
    pub fn create(&self, uri: &str) -> Option<Box<dyn Profile>> {
        self.entries
            .iter()
            .find(|entry| entry.uri == uri)
            .map(|entry| (entry.factory)())
    }

    /// Number of registered profiles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ProfileRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.uris()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::message::Message;
    use crate::profile::ChannelContext;

    struct Silent;

    impl Profile for Silent {
        fn handle_msg(&mut self, _ctx: &mut ChannelContext<'_>, _msgno: u32, _message: Message) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registration_order_is_kept() {
        let mut registry = ProfileRegistry::new();
        registry.register("b", || Silent);
        registry.register("a", || Silent);

        assert_eq!(registry.uris().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut registry = ProfileRegistry::new();
        registry.register("a", || Silent);
        registry.register("a", || Silent);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_create_unknown() {
        let mut registry = ProfileRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.create("missing").is_none());

        registry.register("present", || Silent);
        assert!(registry.create("present").is_some());
    }
}
