//! Tag prefix registrations from `<%@ Register %>` directives.

use crate::options::ParserOptions;
use crate::resolver::TypeRef;
use indexmap::IndexMap;
use serde::Serialize;

/// Maps tag prefixes to namespaces and `prefix:name` tags to user control
/// types. Prefixes and names are matched without regard to case.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControlRegistry {
    namespaces: IndexMap<String, Vec<String>>,
    controls: IndexMap<String, TypeRef>,
}

fn control_key(prefix: &str, name: &str) -> String {
    format!("{}:{}", prefix.to_ascii_lowercase(), name.to_ascii_lowercase())
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in web controls prefix.
    pub fn with_defaults(options: &ParserOptions) -> Self {
        let mut registry = Self::new();
        registry.add_defaults(options);
        registry
    }

    /// Register the built-in web controls prefix.
    pub fn add_defaults(&mut self, options: &ParserOptions) {
        self.add_namespace(&options.web_controls_prefix, &options.web_controls_namespace);
    }

    pub fn add_namespace(&mut self, prefix: &str, namespace: &str) {
        let namespaces = self
            .namespaces
            .entry(prefix.to_ascii_lowercase())
            .or_default();
        if !namespaces.iter().any(|n| n.eq_ignore_ascii_case(namespace)) {
            namespaces.push(namespace.to_string());
        }
    }

    /// Namespaces registered for `prefix`, in registration order.
    pub fn namespaces(&self, prefix: &str) -> &[String] {
        self.namespaces
            .get(&prefix.to_ascii_lowercase())
            .map_or(&[], Vec::as_slice)
    }

    /// Register `prefix:name` as `ty`. Re-registering the same type is a
    /// no-op; a different type is rejected with the existing one.
    pub fn add_control(&mut self, prefix: &str, name: &str, ty: TypeRef) -> Result<(), TypeRef> {
        let key = control_key(prefix, name);
        match self.controls.get(&key) {
            Some(existing) if *existing != ty => Err(existing.clone()),
            Some(_) => Ok(()),
            None => {
                self.controls.insert(key, ty);
                Ok(())
            }
        }
    }

    pub fn control(&self, prefix: &str, name: &str) -> Option<&TypeRef> {
        self.controls.get(&control_key(prefix, name))
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        let prefix = prefix.to_ascii_lowercase();
        self.namespaces.contains_key(&prefix)
            || self
                .controls
                .keys()
                .any(|key| key.split_once(':').is_some_and(|(p, _)| p == prefix))
    }
}
