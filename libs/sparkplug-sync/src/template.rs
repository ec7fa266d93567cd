//! UDT definition registry
//!
//! Instances refer to their definition through a `DefinitionId`, an index
//! into this registry. Ids stay valid for the registry's lifetime; registering
//! the same `(name, version)` again replaces the definition in place.

use crate::node::CompositeMetric;
use crate::wire::WireMetric;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Handle to a registered UDT definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(usize);

impl DefinitionId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    definitions: RwLock<Vec<Arc<CompositeMetric>>>,
    index: DashMap<(String, String), DefinitionId>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, keyed by its definition name and version
    pub fn register(&self, mut definition: CompositeMetric) -> DefinitionId {
        definition.mark_as_definition();
        let key = (
            definition.definition_name().to_string(),
            definition.definition_version().to_string(),
        );

        // Shard lock is held across the vector update so concurrent
        // registrations of one key cannot allocate two ids.
        match self.index.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let id = *entry.get();
                self.definitions.write()[id.0] = Arc::new(definition);
                debug!("Replaced UDT definition {:?} as {:?}", entry.key(), id);
                id
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let mut definitions = self.definitions.write();
                let id = DefinitionId(definitions.len());
                definitions.push(Arc::new(definition));
                debug!("Registered UDT definition {:?} as {:?}", entry.key(), id);
                entry.insert(id);
                id
            }
        }
    }

    pub fn lookup(&self, name: &str, version: &str) -> Option<DefinitionId> {
        self.index
            .get(&(name.to_string(), version.to_string()))
            .map(|id| *id)
    }

    pub fn get(&self, id: DefinitionId) -> Option<Arc<CompositeMetric>> {
        self.definitions.read().get(id.0).cloned()
    }

    /// Snapshot of all definitions in registration order
    pub fn definitions(&self) -> Vec<Arc<CompositeMetric>> {
        self.definitions.read().clone()
    }

    /// Birth-form metrics of every definition, for the node birth
    pub fn to_birth_metrics(&self) -> Vec<WireMetric> {
        self.definitions()
            .iter()
            .map(|definition| definition.to_birth_metric())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::node::{MetricNode, SimpleMetric};
    use crate::value::{DataType, MetricValue};

    fn pump_definition(version: &str, rated: f32) -> CompositeMetric {
        let mut def = CompositeMetric::definition("Pump", version, 0);
        def.insert_metric(MetricNode::Simple(SimpleMetric::new(
            "speed",
            DataType::UInt16,
            None,
            0,
        )));
        def.insert_parameter("rated", MetricValue::Float(rated));
        def
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = DefinitionRegistry::new();
        assert!(registry.is_empty());

        let v1 = registry.register(pump_definition("1.0", 10.0));
        let v2 = registry.register(pump_definition("2.0", 12.0));

        assert_ne!(v1, v2);
        assert_eq!(registry.lookup("Pump", "1.0"), Some(v1));
        assert_eq!(registry.lookup("Pump", "2.0"), Some(v2));
        assert_eq!(registry.lookup("Pump", "3.0"), None);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_reregister_keeps_id() {
        let registry = DefinitionRegistry::new();
        let first = registry.register(pump_definition("1.0", 10.0));
        let second = registry.register(pump_definition("1.0", 11.0));

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        let def = registry.get(first).unwrap();
        assert_eq!(def.parameter("rated"), Some(&MetricValue::Float(11.0)));
    }

    #[test]
    fn test_birth_metrics_are_definitions() {
        let registry = DefinitionRegistry::new();
        registry.register(pump_definition("1.0", 10.0));

        let metrics = registry.to_birth_metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name, "Pump");
        assert_eq!(metrics[0].datatype, DataType::Template.wire_code());
        match &metrics[0].value {
            crate::wire::WireValue::TemplateValue(t) => {
                assert!(t.is_definition);
                assert!(t.template_ref.is_none());
                assert_eq!(t.version.as_deref(), Some("1.0"));
            }
            other => panic!("expected template, got {:?}", other),
        }
    }
}
