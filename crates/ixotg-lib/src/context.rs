use crate::error::{Error, RemoteError};
use crate::remote::Href;
use std::collections::HashMap;

/// Configuration names (ports, devices, tracked fields) to the href of their remote object
#[derive(Debug, Clone, Default)]
pub struct Registry {
    hrefs: HashMap<String, Href>,
}

impl Registry {
    pub fn insert(&mut self, name: &str, href: Href) {
        self.hrefs.insert(name.to_string(), href);
    }

    pub fn get(&self, name: &str) -> Option<&Href> {
        self.hrefs.get(name)
    }

    /// The configuration name of a remote object
    pub fn name_of(&self, href: &Href) -> Option<&str> {
        self.hrefs
            .iter()
            .find(|(_, h)| *h == href)
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.hrefs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hrefs.is_empty()
    }
}

/// State of one configuration pass: the registry being rebuilt and the non-fatal
/// remote errors met so far
#[derive(Debug, Default)]
pub struct ReconcileContext {
    pub registry: Registry,
    pub errors: Vec<RemoteError>,
}

impl ReconcileContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep a non-fatal remote error for the end of the pass
    pub fn record(&mut self, e: RemoteError) {
        log::warn!("{e}");
        self.errors.push(e);
    }

    /// The registry, or every recorded error at once
    pub fn finish(self) -> Result<Registry, Error> {
        if self.errors.is_empty() {
            Ok(self.registry)
        } else {
            Err(Error::Aggregate(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_reverse_lookup() {
        let mut registry = Registry::default();
        registry.insert("p1", Href::new("/vport/1"));
        registry.insert("p2", Href::new("/vport/2"));
        assert_eq!(registry.name_of(&Href::new("/vport/2")), Some("p2"));
        assert_eq!(registry.name_of(&Href::new("/vport/3")), None);
        assert_eq!(registry.get("p1"), Some(&Href::new("/vport/1")));
    }

    #[test]
    fn test_finish() {
        let ctx = ReconcileContext::new();
        assert!(ctx.finish().is_ok());
        let mut ctx = ReconcileContext::new();
        ctx.record(RemoteError::Rejected("boom".to_string()));
        assert!(matches!(ctx.finish(), Err(Error::Aggregate(e)) if e.len() == 1));
    }
}
