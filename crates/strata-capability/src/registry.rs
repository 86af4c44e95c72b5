use crate::provider::{CapabilityDescriptor, CapabilityProvider};
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::{StrataError, StrataResult};
use tracing::info;

/// Central registry for all available capability providers.
///
/// Built once at startup; the decomposer resolves capabilities against
/// it when the task graph is constructed, so unknown capabilities are a
/// decomposition-time error rather than a dispatch-time surprise.
pub struct CapabilityRegistry {
    providers: HashMap<String, Arc<dyn CapabilityProvider>>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Registers a provider under its descriptor ID.
    pub fn register(&mut self, provider: Arc<dyn CapabilityProvider>) {
        let id = provider.descriptor().id.clone();
        info!(capability = %id, "Registered capability provider");
        self.providers.insert(id, provider);
    }

    /// Looks up a provider by ID.
    pub fn get(&self, id: &str) -> Option<&Arc<dyn CapabilityProvider>> {
        self.providers.get(id)
    }

    /// Looks up a provider by ID, erroring if absent.
    pub fn resolve(&self, id: &str) -> StrataResult<Arc<dyn CapabilityProvider>> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| StrataError::Decomposition(format!("Unknown capability: {id}")))
    }

    /// All registered descriptors.
    pub fn descriptors(&self) -> Vec<&CapabilityDescriptor> {
        self.providers.values().map(|p| p.descriptor()).collect()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CapabilityRequest, CapabilityResponse};
    use async_trait::async_trait;

    struct EchoProvider {
        descriptor: CapabilityDescriptor,
    }

    impl EchoProvider {
        fn new(id: &str) -> Self {
            Self {
                descriptor: CapabilityDescriptor {
                    id: id.to_string(),
                    description: "echoes its input".to_string(),
                    keywords: vec!["echo".to_string()],
                },
            }
        }
    }

    #[async_trait]
    impl CapabilityProvider for EchoProvider {
        fn descriptor(&self) -> &CapabilityDescriptor {
            &self.descriptor
        }

        async fn invoke(&self, request: CapabilityRequest) -> StrataResult<CapabilityResponse> {
            Ok(CapabilityResponse::ok(request.task_description, 1))
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(EchoProvider::new("echo")));

        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_resolve_unknown_is_decomposition_error() {
        let registry = CapabilityRegistry::new();
        let err = registry.resolve("ghost").err().unwrap();
        assert!(matches!(err, StrataError::Decomposition(_)));
    }

    #[test]
    fn test_descriptors() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(EchoProvider::new("a")));
        registry.register(Arc::new(EchoProvider::new("b")));
        assert_eq!(registry.descriptors().len(), 2);
    }
}
