//! Trait abstractions for flow I/O
//!
//! These traits let the processor, dispatcher and sweeper run against the
//! SQLite adapter in production and in-memory mocks in tests.

use super::FlowError;
use crate::cache::CachedPayload;
use crate::chain::{ChatRef, SelectionChain, Step};
use crate::db::{Brand, City, Database, Generation, Maintenance, Model, Specification};
use crate::textback::{Delivery, OutboundMessage, TransportError};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Storage for selection chains
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Create and persist an empty chain for a chat
    async fn create_chain(&self, chat: &ChatRef) -> Result<SelectionChain, FlowError>;

    async fn get_chain(&self, id: i64) -> Result<SelectionChain, FlowError>;

    /// Compare-and-swap on the chain version; bumps it on success
    async fn save_chain(&self, chain: &mut SelectionChain) -> Result<(), FlowError>;

    /// Chains with `finalized == false`; a record that fails to load is
    /// returned as its own error
    async fn list_open_chains(&self) -> Result<Vec<Result<SelectionChain, FlowError>>, FlowError>;
}

/// TTL key-value store behind button tokens
#[async_trait]
pub trait TokenCache: Send + Sync {
    /// Expired entries read as `None`
    async fn get(&self, token: &str) -> Result<Option<CachedPayload>, FlowError>;

    /// Insert or overwrite, restarting the TTL
    async fn put(&self, token: &str, payload: &CachedPayload, ttl: Duration)
        -> Result<(), FlowError>;

    /// Idempotent
    async fn remove(&self, token: &str) -> Result<(), FlowError>;

    /// Reclaim storage held by expired entries
    async fn purge_expired(&self) -> Result<usize, FlowError> {
        Ok(0)
    }
}

/// Read-only vehicle catalog, scoped by parent
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn cities(&self) -> Result<Vec<City>, FlowError>;
    async fn brands_in_city(&self, city_id: i64) -> Result<Vec<Brand>, FlowError>;
    async fn models_of_brand(&self, brand_id: i64) -> Result<Vec<Model>, FlowError>;
    async fn generations_of_model(&self, model_id: i64) -> Result<Vec<Generation>, FlowError>;
    async fn specifications_of_generation(
        &self,
        generation_id: i64,
    ) -> Result<Vec<Specification>, FlowError>;
    async fn maintenances_of_specification(
        &self,
        specification_id: i64,
    ) -> Result<Vec<Maintenance>, FlowError>;

    /// Whether the id exists in the catalog table for `step`
    async fn exists(&self, step: Step, id: i64) -> Result<bool, FlowError>;
}

/// Outbound chat transport
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<Delivery, TransportError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ChainStore + ?Sized> ChainStore for Arc<T> {
    async fn create_chain(&self, chat: &ChatRef) -> Result<SelectionChain, FlowError> {
        (**self).create_chain(chat).await
    }

    async fn get_chain(&self, id: i64) -> Result<SelectionChain, FlowError> {
        (**self).get_chain(id).await
    }

    async fn save_chain(&self, chain: &mut SelectionChain) -> Result<(), FlowError> {
        (**self).save_chain(chain).await
    }

    async fn list_open_chains(&self) -> Result<Vec<Result<SelectionChain, FlowError>>, FlowError> {
        (**self).list_open_chains().await
    }
}

#[async_trait]
impl<T: TokenCache + ?Sized> TokenCache for Arc<T> {
    async fn get(&self, token: &str) -> Result<Option<CachedPayload>, FlowError> {
        (**self).get(token).await
    }

    async fn put(
        &self,
        token: &str,
        payload: &CachedPayload,
        ttl: Duration,
    ) -> Result<(), FlowError> {
        (**self).put(token, payload, ttl).await
    }

    async fn remove(&self, token: &str) -> Result<(), FlowError> {
        (**self).remove(token).await
    }

    async fn purge_expired(&self) -> Result<usize, FlowError> {
        (**self).purge_expired().await
    }
}

#[async_trait]
impl<T: Catalog + ?Sized> Catalog for Arc<T> {
    async fn cities(&self) -> Result<Vec<City>, FlowError> {
        (**self).cities().await
    }

    async fn brands_in_city(&self, city_id: i64) -> Result<Vec<Brand>, FlowError> {
        (**self).brands_in_city(city_id).await
    }

    async fn models_of_brand(&self, brand_id: i64) -> Result<Vec<Model>, FlowError> {
        (**self).models_of_brand(brand_id).await
    }

    async fn generations_of_model(&self, model_id: i64) -> Result<Vec<Generation>, FlowError> {
        (**self).generations_of_model(model_id).await
    }

    async fn specifications_of_generation(
        &self,
        generation_id: i64,
    ) -> Result<Vec<Specification>, FlowError> {
        (**self).specifications_of_generation(generation_id).await
    }

    async fn maintenances_of_specification(
        &self,
        specification_id: i64,
    ) -> Result<Vec<Maintenance>, FlowError> {
        (**self).maintenances_of_specification(specification_id).await
    }

    async fn exists(&self, step: Step, id: i64) -> Result<bool, FlowError> {
        (**self).exists(step, id).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, message: &OutboundMessage) -> Result<Delivery, TransportError> {
        (**self).send(message).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as chain store, token cache and catalog
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[allow(dead_code)] // Useful for tests
    pub fn inner(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl ChainStore for DatabaseStorage {
    async fn create_chain(&self, chat: &ChatRef) -> Result<SelectionChain, FlowError> {
        Ok(self.db.create_chain(chat)?)
    }

    async fn get_chain(&self, id: i64) -> Result<SelectionChain, FlowError> {
        Ok(self.db.get_chain(id)?)
    }

    async fn save_chain(&self, chain: &mut SelectionChain) -> Result<(), FlowError> {
        Ok(self.db.save_chain(chain)?)
    }

    async fn list_open_chains(&self) -> Result<Vec<Result<SelectionChain, FlowError>>, FlowError> {
        Ok(self
            .db
            .list_open_chains()?
            .into_iter()
            .map(|row| row.map_err(FlowError::from))
            .collect())
    }
}

#[async_trait]
impl TokenCache for DatabaseStorage {
    async fn get(&self, token: &str) -> Result<Option<CachedPayload>, FlowError> {
        let Some(raw) = self.db.get_token(token, Utc::now())? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| FlowError::storage(format!("cached payload for {token}: {e}")))
    }

    async fn put(
        &self,
        token: &str,
        payload: &CachedPayload,
        ttl: Duration,
    ) -> Result<(), FlowError> {
        let raw = serde_json::to_string(payload).map_err(|e| FlowError::storage(e.to_string()))?;
        self.db.put_token(token, &raw, Utc::now() + ttl)?;
        Ok(())
    }

    async fn remove(&self, token: &str) -> Result<(), FlowError> {
        Ok(self.db.remove_token(token)?)
    }

    async fn purge_expired(&self) -> Result<usize, FlowError> {
        Ok(self.db.purge_expired_tokens(Utc::now())?)
    }
}

#[async_trait]
impl Catalog for DatabaseStorage {
    async fn cities(&self) -> Result<Vec<City>, FlowError> {
        Ok(self.db.list_cities()?)
    }

    async fn brands_in_city(&self, city_id: i64) -> Result<Vec<Brand>, FlowError> {
        Ok(self.db.list_brands_in_city(city_id)?)
    }

    async fn models_of_brand(&self, brand_id: i64) -> Result<Vec<Model>, FlowError> {
        Ok(self.db.list_models_of_brand(brand_id)?)
    }

    async fn generations_of_model(&self, model_id: i64) -> Result<Vec<Generation>, FlowError> {
        Ok(self.db.list_generations_of_model(model_id)?)
    }

    async fn specifications_of_generation(
        &self,
        generation_id: i64,
    ) -> Result<Vec<Specification>, FlowError> {
        Ok(self.db.list_specifications_of_generation(generation_id)?)
    }

    async fn maintenances_of_specification(
        &self,
        specification_id: i64,
    ) -> Result<Vec<Maintenance>, FlowError> {
        Ok(self.db.list_maintenances_of_specification(specification_id)?)
    }

    async fn exists(&self, step: Step, id: i64) -> Result<bool, FlowError> {
        Ok(self.db.catalog_entry_exists(step, id)?)
    }
}
