//! Webhook Registry Stores
//!
//! Pluggable persistence for registrations, mirroring the idempotency
//! store split: an in-memory map for development and tests, Postgres
//! for durable deployments.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use uuid::Uuid;

use super::types::{WebhookError, WebhookRegistration};

/// Pluggable registration persistence.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn insert(&self, registration: WebhookRegistration) -> Result<(), WebhookError>;

    async fn get(&self, id: Uuid) -> Result<Option<WebhookRegistration>, WebhookError>;

    /// Remove a registration, returning whether it existed.
    async fn delete(&self, id: Uuid) -> Result<bool, WebhookError>;

    async fn list(&self) -> Result<Vec<WebhookRegistration>, WebhookError>;

    /// Registrations whose filter matches `event_type` (including wildcard).
    async fn find_for_event(&self, event_type: &str)
        -> Result<Vec<WebhookRegistration>, WebhookError>;
}

/// In-memory registry for single-process development and tests.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    registrations: DashMap<Uuid, WebhookRegistration>,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistry {
    async fn insert(&self, registration: WebhookRegistration) -> Result<(), WebhookError> {
        self.registrations.insert(registration.id, registration);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<WebhookRegistration>, WebhookError> {
        Ok(self.registrations.get(&id).map(|r| r.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, WebhookError> {
        Ok(self.registrations.remove(&id).is_some())
    }

    async fn list(&self) -> Result<Vec<WebhookRegistration>, WebhookError> {
        let mut all: Vec<_> = self
            .registrations
            .iter()
            .map(|r| r.value().clone())
            .collect();
        all.sort_by_key(|r| r.created_at);
        Ok(all)
    }

    async fn find_for_event(
        &self,
        event_type: &str,
    ) -> Result<Vec<WebhookRegistration>, WebhookError> {
        Ok(self
            .registrations
            .iter()
            .filter(|r| r.subscribes_to(event_type))
            .map(|r| r.value().clone())
            .collect())
    }
}

/// Durable registry over Postgres.
#[derive(Debug, Clone)]
pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistryStore for PgRegistry {
    async fn insert(&self, registration: WebhookRegistration) -> Result<(), WebhookError> {
        sqlx::query(
            r"
            INSERT INTO webhook_registrations (id, url, secret, event_filter, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(registration.id)
        .bind(&registration.url)
        .bind(&registration.secret)
        .bind(&registration.event_filter)
        .bind(registration.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<WebhookRegistration>, WebhookError> {
        let registration = sqlx::query_as::<_, WebhookRegistration>(
            r"
            SELECT id, url, secret, event_filter, created_at
            FROM webhook_registrations
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(registration)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, WebhookError> {
        let result = sqlx::query("DELETE FROM webhook_registrations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<WebhookRegistration>, WebhookError> {
        let registrations = sqlx::query_as::<_, WebhookRegistration>(
            r"
            SELECT id, url, secret, event_filter, created_at
            FROM webhook_registrations
            ORDER BY created_at
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(registrations)
    }

    async fn find_for_event(
        &self,
        event_type: &str,
    ) -> Result<Vec<WebhookRegistration>, WebhookError> {
        let registrations = sqlx::query_as::<_, WebhookRegistration>(
            r"
            SELECT id, url, secret, event_filter, created_at
            FROM webhook_registrations
            WHERE $1 = ANY(event_filter) OR '*' = ANY(event_filter)
            ",
        )
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(registrations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn registration(filter: &[&str]) -> WebhookRegistration {
        WebhookRegistration {
            id: Uuid::new_v4(),
            url: "https://example.com/hook".to_string(),
            secret: "s".to_string(),
            event_filter: filter.iter().map(ToString::to_string).collect(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_crud_roundtrip() {
        let registry = MemoryRegistry::new();
        let reg = registration(&["order.created"]);
        let id = reg.id;

        registry.insert(reg).await.unwrap();
        assert!(registry.get(id).await.unwrap().is_some());
        assert_eq!(registry.list().await.unwrap().len(), 1);

        assert!(registry.delete(id).await.unwrap());
        assert!(registry.get(id).await.unwrap().is_none());
        assert!(!registry.delete(id).await.unwrap());
    }

    #[tokio::test]
    async fn find_for_event_honors_filters_and_wildcard() {
        let registry = MemoryRegistry::new();
        let exact = registration(&["order.created"]);
        let wildcard = registration(&["*"]);
        let other = registration(&["user.deleted"]);

        let exact_id = exact.id;
        let wildcard_id = wildcard.id;

        registry.insert(exact).await.unwrap();
        registry.insert(wildcard).await.unwrap();
        registry.insert(other).await.unwrap();

        let matched = registry.find_for_event("order.created").await.unwrap();
        let ids: Vec<_> = matched.iter().map(|r| r.id).collect();

        assert_eq!(matched.len(), 2);
        assert!(ids.contains(&exact_id));
        assert!(ids.contains(&wildcard_id));
    }
}
