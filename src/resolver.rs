//! Memoized id -> display name resolution for one export run.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::gateway::{Gateway, SlackApi};
use crate::model::{EntityKind, EntityName, IssueKind};
use crate::slack_render::SlackReferences;

/// A name ready to print, plus the issue to record when it is a stand-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Named {
    pub name: String,
    pub issue: Option<IssueKind>,
}

/// Resolves ids through the gateway, at most one lookup per `(kind, id)`.
///
/// Built fresh for every export; the cache is never shared across runs.
pub struct EntityResolver<'g, A> {
    gateway: &'g Gateway<A>,
    cache: HashMap<(EntityKind, String), EntityName>,
    lookups: usize,
}

impl<'g, A: SlackApi> EntityResolver<'g, A> {
    pub fn new(gateway: &'g Gateway<A>) -> Self {
        EntityResolver {
            gateway,
            cache: HashMap::new(),
            lookups: 0,
        }
    }

    /// Unknown entities resolve to a placeholder and are cached like any
    /// other name. Lookup failures are returned and not cached.
    pub async fn resolve(
        &mut self,
        kind: EntityKind,
        id: &str,
    ) -> Result<EntityName, GatewayError> {
        let key = (kind, id.to_string());
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }

        self.lookups += 1;
        let entity = match self.gateway.lookup(kind, id).await {
            Ok(Some(name)) => EntityName::found(kind, id, name),
            Ok(None) => {
                warn!(%kind, id, "entity not found, using placeholder");
                EntityName::placeholder(kind, id)
            }
            Err(e) if e.is_not_found() => {
                warn!(%kind, id, "entity not found, using placeholder");
                EntityName::placeholder(kind, id)
            }
            Err(e) => return Err(e),
        };
        debug!(%kind, id, name = %entity.name, "resolved");
        self.cache.insert(key, entity.clone());
        Ok(entity)
    }

    /// Like [`resolve`](Self::resolve), but every failure except a rejected
    /// credential degrades to a placeholder with an issue attached.
    pub async fn name_for(&mut self, kind: EntityKind, id: &str) -> Result<Named, GatewayError> {
        match self.resolve(kind, id).await {
            Ok(entity) if entity.found => Ok(Named {
                name: entity.name,
                issue: None,
            }),
            Ok(entity) => Ok(Named {
                name: entity.name,
                issue: Some(IssueKind::UnknownEntity {
                    entity: kind,
                    id: id.to_string(),
                }),
            }),
            Err(e) if e.is_unauthorized() => Err(e),
            Err(e) => {
                warn!(%kind, id, error = %e, "lookup failed, using placeholder");
                Ok(Named {
                    name: kind.placeholder(id),
                    issue: Some(IssueKind::ResolutionFailed {
                        entity: kind,
                        id: id.to_string(),
                        reason: e.to_string(),
                    }),
                })
            }
        }
    }

    /// Fill every unresolved entry of `refs`, returning the issues met.
    pub async fn resolve_references(
        &mut self,
        refs: &mut SlackReferences,
    ) -> Result<Vec<IssueKind>, GatewayError> {
        let mut issues = Vec::new();
        for (kind, id, slot) in refs.unresolved_mut() {
            let named = self.name_for(kind, id).await?;
            issues.extend(named.issue);
            *slot = Some(named.name);
        }
        Ok(issues)
    }

    /// Record a name already known from message data, without a lookup.
    pub fn prime(&mut self, kind: EntityKind, id: &str, name: &str) {
        self.cache
            .entry((kind, id.to_string()))
            .or_insert_with(|| EntityName::found(kind, id, name.to_string()));
    }

    /// Resolve a batch of ids ahead of time. Stops at the first failure.
    pub async fn bulk_prime<'i>(
        &mut self,
        kind: EntityKind,
        ids: impl IntoIterator<Item = &'i str>,
    ) -> Result<(), GatewayError> {
        for id in ids {
            self.resolve(kind, id).await?;
        }
        Ok(())
    }

    pub fn cached(&self, kind: EntityKind, id: &str) -> Option<&EntityName> {
        self.cache.get(&(kind, id.to_string()))
    }

    /// Lookups actually sent through the gateway.
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::ApiFailure;
    use crate::gateway::{Endpoint, ListParams, Page};

    /// Knows one user; counts lookups; fails channel lookups.
    #[derive(Default)]
    struct Directory {
        lookups: Cell<usize>,
    }

    impl SlackApi for Directory {
        async fn list_page(
            &self,
            _endpoint: Endpoint,
            _params: &ListParams,
            _cursor: Option<&str>,
            _limit: u16,
        ) -> Result<Page, ApiFailure> {
            Ok(Page::default())
        }

        async fn lookup(&self, kind: EntityKind, id: &str) -> Result<Option<String>, ApiFailure> {
            self.lookups.set(self.lookups.get() + 1);
            match (kind, id) {
                (EntityKind::User, "U1") => Ok(Some("alice".to_string())),
                (EntityKind::Channel, _) => Err(ApiFailure::Transport("reset".to_string())),
                (EntityKind::Bot, _) => Err(ApiFailure::Unauthorized {
                    code: "invalid_auth".to_string(),
                }),
                _ => Ok(None),
            }
        }
    }

    #[tokio::test]
    async fn test_resolve_is_memoized() {
        let gateway = Gateway::new(Directory::default());
        let mut resolver = EntityResolver::new(&gateway);

        let first = resolver.resolve(EntityKind::User, "U1").await.unwrap();
        let second = resolver.resolve(EntityKind::User, "U1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.name, "alice");
        assert_eq!(resolver.lookups(), 1);
        assert_eq!(gateway.api().lookups.get(), 1);
    }

    #[tokio::test]
    async fn test_unknown_entity_is_cached_placeholder() {
        let gateway = Gateway::new(Directory::default());
        let mut resolver = EntityResolver::new(&gateway);

        let named = resolver.name_for(EntityKind::User, "U9").await.unwrap();
        resolver.name_for(EntityKind::User, "U9").await.unwrap();

        assert_eq!(named.name, "unknown_user_U9");
        assert_eq!(
            named.issue,
            Some(IssueKind::UnknownEntity {
                entity: EntityKind::User,
                id: "U9".to_string(),
            })
        );
        assert!(resolver.cached(EntityKind::User, "U9").is_some());
        assert_eq!(gateway.api().lookups.get(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_not_cached() {
        let gateway = Gateway::new(Directory::default());
        let mut resolver = EntityResolver::new(&gateway);

        let err = resolver.resolve(EntityKind::Channel, "C1").await.unwrap_err();
        assert!(err.is_retryable());
        let named = resolver.name_for(EntityKind::Channel, "C1").await.unwrap();

        assert_eq!(named.name, "unknown_channel_C1");
        assert!(matches!(named.issue, Some(IssueKind::ResolutionFailed { .. })));
        assert!(resolver.cached(EntityKind::Channel, "C1").is_none());
        assert_eq!(gateway.api().lookups.get(), 2);
    }

    #[tokio::test]
    async fn test_rejected_credential_propagates() {
        let gateway = Gateway::new(Directory::default());
        let mut resolver = EntityResolver::new(&gateway);

        let err = resolver.name_for(EntityKind::Bot, "B1").await.unwrap_err();

        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_primed_names_skip_lookup() {
        let gateway = Gateway::new(Directory::default());
        let mut resolver = EntityResolver::new(&gateway);

        resolver.prime(EntityKind::Bot, "B1", "deploybot");
        let named = resolver.name_for(EntityKind::Bot, "B1").await.unwrap();

        assert_eq!(named.name, "deploybot");
        assert_eq!(named.issue, None);
        assert_eq!(gateway.api().lookups.get(), 0);
    }

    #[tokio::test]
    async fn test_resolve_references_fills_every_slot() {
        let gateway = Gateway::new(Directory::default());
        let mut resolver = EntityResolver::new(&gateway);
        let mut refs = crate::slack_render::find_references_in_text("<@U1> <@U2>");

        let issues = resolver.resolve_references(&mut refs).await.unwrap();

        assert_eq!(refs.name(EntityKind::User, "U1"), Some("alice"));
        assert_eq!(refs.name(EntityKind::User, "U2"), Some("unknown_user_U2"));
        assert_eq!(issues.len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_prime_fills_cache() {
        let gateway = Gateway::new(Directory::default());
        let mut resolver = EntityResolver::new(&gateway);

        resolver
            .bulk_prime(EntityKind::User, ["U1", "U2", "U1"])
            .await
            .unwrap();

        assert_eq!(resolver.lookups(), 2);
        assert!(resolver.cached(EntityKind::User, "U2").is_some());
    }
}
