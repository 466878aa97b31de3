//! Per-slug in-flight registry
//!
//! At most one regeneration per slug may run at a time. A caller acquires a
//! [`RegenerationGuard`] before generating; the slug is released when the
//! guard drops, including on error or panic.

use crate::error::LexicaError;
use dashmap::DashMap;
use std::sync::Arc;

/// Slugs that currently have a regeneration running
#[derive(Default, Clone)]
pub struct InFlightRegenerations {
    slugs: Arc<DashMap<String, ()>>,
}

impl InFlightRegenerations {
    pub fn new() -> Self {
        Self {
            slugs: Arc::new(DashMap::new()),
        }
    }

    /// Claim `slug`, failing with [`LexicaError::InFlight`] if it is taken
    pub fn acquire(&self, slug: &str) -> Result<RegenerationGuard, LexicaError> {
        use dashmap::mapref::entry::Entry;

        match self.slugs.entry(slug.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Ok(RegenerationGuard {
                    slug: slug.to_string(),
                    slugs: Arc::clone(&self.slugs),
                })
            }
            Entry::Occupied(_) => Err(LexicaError::InFlight(slug.to_string())),
        }
    }

    pub fn is_in_flight(&self, slug: &str) -> bool {
        self.slugs.contains_key(slug)
    }

    pub fn len(&self) -> usize {
        self.slugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }
}

/// Holds a slug in the registry until dropped
pub struct RegenerationGuard {
    slug: String,
    slugs: Arc<DashMap<String, ()>>,
}

impl RegenerationGuard {
    pub fn slug(&self) -> &str {
        &self.slug
    }
}

impl Drop for RegenerationGuard {
    fn drop(&mut self) {
        self.slugs.remove(&self.slug);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_rejected_until_drop() {
        let registry = InFlightRegenerations::new();
        let guard = registry.acquire("naps").unwrap();
        assert!(registry.is_in_flight("naps"));
        assert!(matches!(
            registry.acquire("naps"),
            Err(LexicaError::InFlight(slug)) if slug == "naps"
        ));

        // Other slugs are independent
        let other = registry.acquire("colic").unwrap();
        assert_eq!(registry.len(), 2);

        drop(guard);
        assert!(!registry.is_in_flight("naps"));
        assert!(registry.acquire("naps").is_ok());
        drop(other);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = InFlightRegenerations::new();
        let clone = registry.clone();
        let _guard = registry.acquire("naps").unwrap();
        assert!(clone.acquire("naps").is_err());
    }
}
