//! Build-system argument resolvers.
//!
//! A resolver recognizes targets by the shape of their extension payload
//! (`data_kind`/`data`), extracts "selector" metadata (axes of build
//! configuration, each with a discrete option set), and derives the extra
//! CLI arguments to append to compile/test/run requests from the
//! currently selected option per axis. Selections persist through a
//! [`SelectionStore`] so they survive restarts.
//!
//! Resolvers live in an ordered [`ResolverRegistry`]; the first resolver
//! whose `can_handle` accepts a target owns it. Registration order is
//! deterministic, so ownership is too.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use gantry_config::SelectionStore;
use gantry_types::{BuildTarget, BuildTargetId, OperationKind};

/// `data_kind` handled by [`SelectorResolver`].
pub const SELECTORS_DATA_KIND: &str = "selectors";

/// One selectable option on a selector axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorOption {
    /// Display name, also the persisted identity of the choice.
    pub name: String,
    /// Opaque CLI arguments this option contributes.
    #[serde(default)]
    pub arguments: Vec<String>,
}

/// A named axis of build configuration (e.g. "configuration",
/// "destination") with its ordered option set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub key: String,
    #[serde(default)]
    pub label: String,
    pub options: Vec<SelectorOption>,
}

/// Ordered selector list advertised by one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSet {
    pub selectors: Vec<Selector>,
}

/// Derives extra CLI arguments for a build target.
///
/// Implementations cache per-target state internally; instance identity
/// matters, so tests construct a fresh resolver each.
pub trait BuildArgumentResolver: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether this resolver recognizes the target's extension payload.
    fn can_handle(&self, target: &BuildTarget) -> bool;

    /// Parse and cache the target's selector metadata, loading persisted
    /// selections (defaulting each axis to its first option). Returns
    /// `None` when the payload does not parse.
    fn extract_custom_data(&mut self, target: &BuildTarget) -> Option<SelectorSet>;

    /// Whether this resolver has cached metadata for the target.
    fn handles_target(&self, target: &BuildTargetId) -> bool;

    /// Extra arguments for one operation, in selector declaration order.
    fn arguments(&self, kind: OperationKind, target: &BuildTargetId) -> Vec<String>;

    /// Record a user selection, persist it, and notify observers.
    fn handle_dynamic_selection(
        &mut self,
        target: &BuildTargetId,
        selector_key: &str,
        option_name: &str,
    ) -> anyhow::Result<()>;

    /// Cached selector metadata, for UI display.
    fn selector_set(&self, target: &BuildTargetId) -> Option<SelectorSet>;
}

/// Resolver for targets whose `data_kind` is `"selectors"`.
///
/// The payload shape is `{"selectors": [{key, label, options: [{name,
/// arguments}]}]}`. Arguments are kind-independent: the same selected
/// options apply to compile, test, and run.
pub struct SelectorResolver {
    store: Arc<dyn SelectionStore>,
    cache: HashMap<BuildTargetId, SelectorSet>,
    /// Selected option per (target, selector key).
    selections: HashMap<BuildTargetId, HashMap<String, SelectorOption>>,
    change_tx: Option<mpsc::UnboundedSender<BuildTargetId>>,
}

impl SelectorResolver {
    #[must_use]
    pub fn new(store: Arc<dyn SelectionStore>) -> Self {
        Self {
            store,
            cache: HashMap::new(),
            selections: HashMap::new(),
            change_tx: None,
        }
    }

    /// Receive the target id of every selection change.
    #[must_use]
    pub fn with_change_notifier(mut self, tx: mpsc::UnboundedSender<BuildTargetId>) -> Self {
        self.change_tx = Some(tx);
        self
    }

    /// Restore persisted option names for a target, falling back to each
    /// selector's first option.
    fn load_selections(&self, target: &BuildTargetId, set: &SelectorSet) -> HashMap<String, SelectorOption> {
        let persisted: HashMap<String, String> = self
            .store
            .get(target.uri())
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();

        let mut selections = HashMap::new();
        for selector in &set.selectors {
            let chosen = persisted
                .get(&selector.key)
                .and_then(|name| selector.options.iter().find(|o| &o.name == name))
                .or_else(|| selector.options.first());
            if let Some(option) = chosen {
                selections.insert(selector.key.clone(), option.clone());
            }
        }
        selections
    }

    fn persist_selections(&self, target: &BuildTargetId) {
        let Some(selections) = self.selections.get(target) else {
            return;
        };
        let value = serde_json::Value::Object(
            selections
                .iter()
                .map(|(key, option)| (key.clone(), serde_json::Value::String(option.name.clone())))
                .collect(),
        );
        if let Err(e) = self.store.set(target.uri(), value) {
            tracing::warn!("Failed to persist selections for '{target}': {e:#}");
        }
    }
}

impl BuildArgumentResolver for SelectorResolver {
    fn name(&self) -> &'static str {
        "selectors"
    }

    fn can_handle(&self, target: &BuildTarget) -> bool {
        target.data_kind.as_deref() == Some(SELECTORS_DATA_KIND) && target.data.is_some()
    }

    fn extract_custom_data(&mut self, target: &BuildTarget) -> Option<SelectorSet> {
        if let Some(cached) = self.cache.get(&target.id) {
            return Some(cached.clone());
        }
        let data = target.data.as_ref()?;
        let set: SelectorSet = match serde_json::from_value(data.clone()) {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!("Malformed selector payload on '{}': {e}", target.id);
                return None;
            }
        };

        let selections = self.load_selections(&target.id, &set);
        self.selections.insert(target.id.clone(), selections);
        self.cache.insert(target.id.clone(), set.clone());
        Some(set)
    }

    fn handles_target(&self, target: &BuildTargetId) -> bool {
        self.cache.contains_key(target)
    }

    fn arguments(&self, _kind: OperationKind, target: &BuildTargetId) -> Vec<String> {
        let Some(set) = self.cache.get(target) else {
            return Vec::new();
        };
        let Some(selections) = self.selections.get(target) else {
            return Vec::new();
        };
        let mut arguments = Vec::new();
        // Declaration order of the selectors, not map order.
        for selector in &set.selectors {
            if let Some(option) = selections.get(&selector.key) {
                arguments.extend(option.arguments.iter().cloned());
            }
        }
        arguments
    }

    fn handle_dynamic_selection(
        &mut self,
        target: &BuildTargetId,
        selector_key: &str,
        option_name: &str,
    ) -> anyhow::Result<()> {
        let set = self
            .cache
            .get(target)
            .ok_or_else(|| anyhow::anyhow!("no selector metadata cached for '{target}'"))?;
        let selector = set
            .selectors
            .iter()
            .find(|s| s.key == selector_key)
            .ok_or_else(|| anyhow::anyhow!("unknown selector '{selector_key}' on '{target}'"))?;
        let option = selector
            .options
            .iter()
            .find(|o| o.name == option_name)
            .ok_or_else(|| {
                anyhow::anyhow!("unknown option '{option_name}' for selector '{selector_key}'")
            })?
            .clone();

        self.selections
            .entry(target.clone())
            .or_default()
            .insert(selector_key.to_string(), option);
        self.persist_selections(target);

        if let Some(tx) = &self.change_tx {
            let _ = tx.send(target.clone());
        }
        Ok(())
    }

    fn selector_set(&self, target: &BuildTargetId) -> Option<SelectorSet> {
        self.cache.get(target).cloned()
    }
}

/// Ordered, first-match-wins collection of resolvers.
#[derive(Default)]
pub struct ResolverRegistry {
    resolvers: Vec<Box<dyn BuildArgumentResolver>>,
}

impl ResolverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resolver. Earlier registrations win ties.
    pub fn register(&mut self, resolver: Box<dyn BuildArgumentResolver>) {
        self.resolvers.push(resolver);
    }

    /// Offer a target to the resolvers; the first that recognizes it
    /// extracts and caches its metadata. Returns the owning resolver's
    /// name, if any.
    pub fn ingest_target(&mut self, target: &BuildTarget) -> Option<&'static str> {
        for resolver in &mut self.resolvers {
            if resolver.can_handle(target) {
                return resolver
                    .extract_custom_data(target)
                    .map(|_| resolver.name());
            }
        }
        None
    }

    /// Extra arguments for an operation on a target. Empty when no
    /// resolver owns the target.
    #[must_use]
    pub fn arguments_for(&self, kind: OperationKind, target: &BuildTargetId) -> Vec<String> {
        self.resolvers
            .iter()
            .find(|r| r.handles_target(target))
            .map(|r| r.arguments(kind, target))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn compile_arguments(&self, target: &BuildTargetId) -> Vec<String> {
        self.arguments_for(OperationKind::Compile, target)
    }

    #[must_use]
    pub fn test_arguments(&self, target: &BuildTargetId) -> Vec<String> {
        self.arguments_for(OperationKind::Test, target)
    }

    #[must_use]
    pub fn run_arguments(&self, target: &BuildTargetId) -> Vec<String> {
        self.arguments_for(OperationKind::Run, target)
    }

    /// Route a user selection to the resolver owning the target.
    pub fn handle_dynamic_selection(
        &mut self,
        target: &BuildTargetId,
        selector_key: &str,
        option_name: &str,
    ) -> anyhow::Result<()> {
        let resolver = self
            .resolvers
            .iter_mut()
            .find(|r| r.handles_target(target))
            .ok_or_else(|| anyhow::anyhow!("no resolver handles '{target}'"))?;
        resolver.handle_dynamic_selection(target, selector_key, option_name)
    }

    /// Selector metadata for UI display, from the owning resolver.
    #[must_use]
    pub fn selector_set(&self, target: &BuildTargetId) -> Option<SelectorSet> {
        self.resolvers
            .iter()
            .find(|r| r.handles_target(target))
            .and_then(|r| r.selector_set(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_config::InMemoryStore;

    fn selector_target(uri: &str) -> BuildTarget {
        serde_json::from_value(serde_json::json!({
            "id": { "uri": uri },
            "capabilities": { "canCompile": true },
            "dataKind": "selectors",
            "data": {
                "selectors": [
                    {
                        "key": "configuration",
                        "label": "Build Configuration",
                        "options": [
                            { "name": "Debug", "arguments": ["--configuration", "Debug"] },
                            { "name": "Release", "arguments": ["--configuration", "Release"] }
                        ]
                    },
                    {
                        "key": "destination",
                        "label": "Destination",
                        "options": [
                            { "name": "Simulator", "arguments": ["--destination", "sim"] },
                            { "name": "Device", "arguments": ["--destination", "device"] }
                        ]
                    }
                ]
            }
        }))
        .unwrap()
    }

    fn plain_target(uri: &str) -> BuildTarget {
        serde_json::from_value(serde_json::json!({ "id": { "uri": uri } })).unwrap()
    }

    #[test]
    fn test_can_handle_requires_data_kind_and_payload() {
        let resolver = SelectorResolver::new(Arc::new(InMemoryStore::new()));
        assert!(resolver.can_handle(&selector_target("bsp://w/app")));
        assert!(!resolver.can_handle(&plain_target("bsp://w/lib")));
    }

    #[test]
    fn test_defaults_to_first_option_of_each_selector() {
        let mut resolver = SelectorResolver::new(Arc::new(InMemoryStore::new()));
        let target = selector_target("bsp://w/app");
        let set = resolver.extract_custom_data(&target).unwrap();
        assert_eq!(set.selectors.len(), 2);

        let args = resolver.arguments(OperationKind::Compile, &target.id);
        assert_eq!(
            args,
            ["--configuration", "Debug", "--destination", "sim"]
        );
    }

    #[test]
    fn test_selection_roundtrip_before_persistence_reload() {
        let mut resolver = SelectorResolver::new(Arc::new(InMemoryStore::new()));
        let target = selector_target("bsp://w/app");
        resolver.extract_custom_data(&target).unwrap();

        resolver
            .handle_dynamic_selection(&target.id, "configuration", "Release")
            .unwrap();

        let args = resolver.arguments(OperationKind::Compile, &target.id);
        assert_eq!(
            args,
            ["--configuration", "Release", "--destination", "sim"]
        );
    }

    #[test]
    fn test_selection_survives_simulated_restart() {
        let store: Arc<dyn SelectionStore> = Arc::new(InMemoryStore::new());
        let target = selector_target("bsp://w/app");

        let mut first = SelectorResolver::new(store.clone());
        first.extract_custom_data(&target).unwrap();
        first
            .handle_dynamic_selection(&target.id, "destination", "Device")
            .unwrap();
        let before = first.arguments(OperationKind::Test, &target.id);

        // Fresh resolver over the same store, as after a process restart.
        let mut second = SelectorResolver::new(store);
        second.extract_custom_data(&target).unwrap();
        let after = second.arguments(OperationKind::Test, &target.id);
        assert_eq!(before, after);
        assert_eq!(after, ["--configuration", "Debug", "--destination", "device"]);
    }

    #[test]
    fn test_unknown_selector_or_option_rejected() {
        let mut resolver = SelectorResolver::new(Arc::new(InMemoryStore::new()));
        let target = selector_target("bsp://w/app");
        resolver.extract_custom_data(&target).unwrap();

        assert!(resolver
            .handle_dynamic_selection(&target.id, "nonsense", "Debug")
            .is_err());
        assert!(resolver
            .handle_dynamic_selection(&target.id, "configuration", "Nonsense")
            .is_err());
    }

    #[test]
    fn test_selection_change_notifies_observer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut resolver =
            SelectorResolver::new(Arc::new(InMemoryStore::new())).with_change_notifier(tx);
        let target = selector_target("bsp://w/app");
        resolver.extract_custom_data(&target).unwrap();

        resolver
            .handle_dynamic_selection(&target.id, "configuration", "Release")
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), target.id);
    }

    #[test]
    fn test_malformed_payload_returns_none() {
        let mut resolver = SelectorResolver::new(Arc::new(InMemoryStore::new()));
        let target: BuildTarget = serde_json::from_value(serde_json::json!({
            "id": { "uri": "bsp://w/app" },
            "dataKind": "selectors",
            "data": { "selectors": "not a list" }
        }))
        .unwrap();
        assert!(resolver.can_handle(&target));
        assert!(resolver.extract_custom_data(&target).is_none());
    }

    // A resolver that claims everything, for registry-order tests.
    struct GreedyResolver {
        tag: &'static str,
    }

    impl BuildArgumentResolver for GreedyResolver {
        fn name(&self) -> &'static str {
            self.tag
        }
        fn can_handle(&self, _target: &BuildTarget) -> bool {
            true
        }
        fn extract_custom_data(&mut self, _target: &BuildTarget) -> Option<SelectorSet> {
            Some(SelectorSet::default())
        }
        fn handles_target(&self, _target: &BuildTargetId) -> bool {
            true
        }
        fn arguments(&self, _kind: OperationKind, _target: &BuildTargetId) -> Vec<String> {
            vec![format!("--from-{}", self.tag)]
        }
        fn handle_dynamic_selection(
            &mut self,
            _target: &BuildTargetId,
            _key: &str,
            _option: &str,
        ) -> anyhow::Result<()> {
            Ok(())
        }
        fn selector_set(&self, _target: &BuildTargetId) -> Option<SelectorSet> {
            None
        }
    }

    #[test]
    fn test_registry_first_match_wins() {
        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(GreedyResolver { tag: "first" }));
        registry.register(Box::new(GreedyResolver { tag: "second" }));

        let target = plain_target("bsp://w/app");
        assert_eq!(registry.ingest_target(&target), Some("first"));
        assert_eq!(
            registry.compile_arguments(&target.id),
            ["--from-first"]
        );
    }

    #[test]
    fn test_registry_unrecognized_target_yields_no_arguments() {
        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(SelectorResolver::new(Arc::new(
            InMemoryStore::new(),
        ))));

        let target = plain_target("bsp://w/lib");
        assert_eq!(registry.ingest_target(&target), None);
        assert!(registry.compile_arguments(&target.id).is_empty());
        assert!(registry.test_arguments(&target.id).is_empty());
        assert!(registry.run_arguments(&target.id).is_empty());
        assert!(registry
            .handle_dynamic_selection(&target.id, "configuration", "Debug")
            .is_err());
    }

    #[test]
    fn test_registry_routes_selection_to_owner() {
        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(SelectorResolver::new(Arc::new(
            InMemoryStore::new(),
        ))));

        let target = selector_target("bsp://w/app");
        assert_eq!(registry.ingest_target(&target), Some("selectors"));
        registry
            .handle_dynamic_selection(&target.id, "configuration", "Release")
            .unwrap();
        assert_eq!(
            registry.arguments_for(OperationKind::Run, &target.id),
            ["--configuration", "Release", "--destination", "sim"]
        );
        assert!(registry.selector_set(&target.id).is_some());
    }
}
