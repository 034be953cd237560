//! # UnifiedNetworkPolicy Translator
//!
//! Stores the whole policy object as JSON under
//! `/nimbess/unp/<namespace>/<name>`.

use super::{SyncError, Translator};
use crate::controller::identity::ResourceIdentity;
use crate::crd::UnifiedNetworkPolicy;
use model::key::{Key, KvPair, Value};
use model::unp::UnpKey;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct UnpTranslator;

impl Translator for UnpTranslator {
    type Resource = UnifiedNetworkPolicy;

    fn kind(&self) -> &'static str {
        "unp"
    }

    fn key_for(&self, identity: &ResourceIdentity) -> Arc<dyn Key> {
        Arc::new(UnpKey::new(identity.to_string()))
    }

    fn translate(&self, policy: &UnifiedNetworkPolicy) -> Result<KvPair, SyncError> {
        // An unnamed policy yields an empty key, rejected by the store.
        let name = ResourceIdentity::from_resource(policy)
            .map(|id| id.to_string())
            .unwrap_or_default();
        let value = Value::from_record(policy).map_err(|e| SyncError::Translation {
            kind: "unp",
            reason: e.to_string(),
        })?;
        Ok(KvPair::new(UnpKey::new(name), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::UnifiedNetworkPolicySpec;

    fn policy() -> UnifiedNetworkPolicy {
        let mut policy = UnifiedNetworkPolicy::new(
            "block-ads",
            UnifiedNetworkPolicySpec {
                network: "default".to_string(),
                ..UnifiedNetworkPolicySpec::default()
            },
        );
        policy.metadata.namespace = Some("web".to_string());
        policy
    }

    #[test]
    fn test_translate_uses_namespaced_path() {
        let pair = UnpTranslator.translate(&policy()).unwrap();
        assert_eq!(pair.key.default_path().unwrap(), "/nimbess/unp/web/block-ads");
        assert_eq!(pair.key.to_string(), "UNP(name=web/block-ads)");

        let json = pair.value.as_structured().unwrap();
        assert_eq!(json["kind"], "UnifiedNetworkPolicy");
        assert_eq!(json["spec"]["network"], "default");
    }

    #[test]
    fn test_key_for_matches_translated_key() {
        let pair = UnpTranslator.translate(&policy()).unwrap();
        let key = UnpTranslator.key_for(&ResourceIdentity::namespaced("web", "block-ads"));
        assert_eq!(key.default_path(), pair.key.default_path());
    }

    #[test]
    fn test_unnamed_policy_has_no_path() {
        let mut unnamed = policy();
        unnamed.metadata.name = None;
        let pair = UnpTranslator.translate(&unnamed).unwrap();
        assert!(pair.key.default_path().is_err());
    }
}
