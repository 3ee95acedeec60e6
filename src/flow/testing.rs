//! Mock implementations for testing
//!
//! In-memory stand-ins for the chain store, token cache, catalog and chat
//! transport, plus a small seeded catalog used across flow tests.

use super::traits::*;
use super::{FlowError, FlowServices, FlowSettings};
use crate::cache::CachedPayload;
use crate::chain::{ChatRef, SelectionChain, Step};
use crate::db::{Brand, City, Generation, Maintenance, Model, Specification};
use crate::textback::{Delivery, OutboundMessage, TransportError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Memory Chain Store
// ============================================================================

/// Chain store with the same version check as the database
#[allow(dead_code)]
pub struct MemoryChainStore {
    chains: Mutex<HashMap<i64, SelectionChain>>,
    next_id: AtomicI64,
    conflict_next: AtomicBool,
}

#[allow(dead_code)]
impl MemoryChainStore {
    pub fn new() -> Self {
        Self {
            chains: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            conflict_next: AtomicBool::new(false),
        }
    }

    /// Seed a chain created at a specific time
    pub fn insert_created_at(&self, chat: &ChatRef, created_at: DateTime<Utc>) -> SelectionChain {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let chain = SelectionChain::new(id, chat.clone(), created_at);
        self.chains.lock().unwrap().insert(id, chain.clone());
        chain
    }

    /// Overwrite a stored chain without a version check
    pub fn replace(&self, chain: SelectionChain) {
        self.chains.lock().unwrap().insert(chain.id(), chain);
    }

    /// Make the next save lose the version race, as if another writer
    /// committed between load and save
    pub fn conflict_on_next_save(&self) {
        self.conflict_next.store(true, Ordering::SeqCst);
    }

    pub fn snapshot(&self, id: i64) -> Option<SelectionChain> {
        self.chains.lock().unwrap().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<SelectionChain> {
        let mut chains: Vec<_> = self.chains.lock().unwrap().values().cloned().collect();
        chains.sort_by_key(SelectionChain::id);
        chains
    }
}

impl Default for MemoryChainStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainStore for MemoryChainStore {
    async fn create_chain(&self, chat: &ChatRef) -> Result<SelectionChain, FlowError> {
        Ok(self.insert_created_at(chat, Utc::now()))
    }

    async fn get_chain(&self, id: i64) -> Result<SelectionChain, FlowError> {
        self.snapshot(id)
            .ok_or_else(|| FlowError::not_found(format!("chain {id}")))
    }

    async fn save_chain(&self, chain: &mut SelectionChain) -> Result<(), FlowError> {
        let mut chains = self.chains.lock().unwrap();
        let stored = chains
            .get_mut(&chain.id())
            .ok_or_else(|| FlowError::not_found(format!("chain {}", chain.id())))?;
        if self.conflict_next.swap(false, Ordering::SeqCst) {
            stored.set_version(stored.version() + 1);
        }
        if stored.version() != chain.version() {
            return Err(FlowError::Conflict {
                chain_id: chain.id(),
            });
        }
        chain.set_version(chain.version() + 1);
        *stored = chain.clone();
        Ok(())
    }

    async fn list_open_chains(&self) -> Result<Vec<Result<SelectionChain, FlowError>>, FlowError> {
        Ok(self
            .all()
            .into_iter()
            .filter(|chain| !chain.is_finalized())
            .map(Ok)
            .collect())
    }
}

// ============================================================================
// Memory Token Cache
// ============================================================================

#[allow(dead_code)]
pub struct MemoryTokenCache {
    entries: Mutex<HashMap<String, (CachedPayload, DateTime<Utc>)>>,
}

#[allow(dead_code)]
impl MemoryTokenCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a live entry exists for the token
    pub fn contains(&self, token: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(token)
            .is_some_and(|(_, expires_at)| *expires_at > Utc::now())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

impl Default for MemoryTokenCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenCache for MemoryTokenCache {
    async fn get(&self, token: &str) -> Result<Option<CachedPayload>, FlowError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .get(token)
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(payload, _)| payload.clone()))
    }

    async fn put(
        &self,
        token: &str,
        payload: &CachedPayload,
        ttl: Duration,
    ) -> Result<(), FlowError> {
        self.entries
            .lock()
            .unwrap()
            .insert(token.to_string(), (payload.clone(), Utc::now() + ttl));
        Ok(())
    }

    async fn remove(&self, token: &str) -> Result<(), FlowError> {
        self.entries.lock().unwrap().remove(token);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, FlowError> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        let now = Utc::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        Ok(before - entries.len())
    }
}

// ============================================================================
// Memory Catalog
// ============================================================================

/// Catalog returning parent-scoped rows unfiltered and unsorted, the way
/// the tables hold them
#[derive(Default)]
#[allow(dead_code)]
pub struct MemoryCatalog {
    pub cities: Vec<City>,
    pub brands: Vec<Brand>,
    /// (`brand_id`, `city_id`)
    pub brand_cities: Vec<(i64, i64)>,
    pub models: Vec<Model>,
    pub generations: Vec<Generation>,
    pub specifications: Vec<Specification>,
    pub maintenances: Vec<Maintenance>,
}

#[allow(dead_code)]
impl MemoryCatalog {
    /// Fixture catalog:
    ///
    /// - cities 1 and 2 active, 3 inactive
    /// - brand 10 (Kia) sold in city 1 with a full model tree
    /// - brand 11 (Ghost) sold in city 1 with only an inactive model
    /// - brand 12 (Skoda) sold in city 2 with no models
    pub fn seeded() -> Self {
        Self {
            cities: vec![
                City { id: 1, name: "Москва".into(), active: true },
                City { id: 2, name: "Казань".into(), active: true },
                City { id: 3, name: "Тверь".into(), active: false },
            ],
            brands: vec![
                Brand { id: 10, name: "Kia".into(), active: true },
                Brand { id: 11, name: "Ghost".into(), active: true },
                Brand { id: 12, name: "Skoda".into(), active: true },
            ],
            brand_cities: vec![(10, 1), (11, 1), (12, 2)],
            models: vec![
                Model {
                    id: 100,
                    brand_id: 10,
                    name: "Rio".into(),
                    external_id: Some("kia-rio".into()),
                    active: true,
                },
                Model {
                    id: 101,
                    brand_id: 10,
                    name: "Ceed".into(),
                    external_id: Some("kia-ceed".into()),
                    active: true,
                },
                Model {
                    id: 102,
                    brand_id: 10,
                    name: "Picanto".into(),
                    external_id: None,
                    active: true,
                },
                Model {
                    id: 110,
                    brand_id: 11,
                    name: "Phantom".into(),
                    external_id: Some("ghost-phantom".into()),
                    active: false,
                },
            ],
            generations: vec![
                Generation {
                    id: 1000,
                    model_id: 100,
                    label: "III (2011 - 2017)".into(),
                    year_of_issue: 2011,
                    active: true,
                },
                Generation {
                    id: 1001,
                    model_id: 100,
                    label: "IV (2017 - 2020)".into(),
                    year_of_issue: 2017,
                    active: true,
                },
            ],
            specifications: vec![
                Specification {
                    id: 5000,
                    generation_id: 1001,
                    full_name: "1.6 AT (123 л.с.)".into(),
                    engine_capacity: 1591,
                    engine_power: 123,
                    active: true,
                },
                Specification {
                    id: 5001,
                    generation_id: 1001,
                    full_name: "1.4 MT (100 л.с.)".into(),
                    engine_capacity: 1368,
                    engine_power: 100,
                    active: true,
                },
            ],
            maintenances: vec![
                Maintenance {
                    id: 9001,
                    specification_id: 5000,
                    number: 2,
                    distance: 30000,
                    period: 2,
                    active: true,
                },
                Maintenance {
                    id: 9000,
                    specification_id: 5000,
                    number: 1,
                    distance: 15000,
                    period: 1,
                    active: true,
                },
            ],
        }
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn cities(&self) -> Result<Vec<City>, FlowError> {
        Ok(self.cities.clone())
    }

    async fn brands_in_city(&self, city_id: i64) -> Result<Vec<Brand>, FlowError> {
        Ok(self
            .brands
            .iter()
            .filter(|b| self.brand_cities.contains(&(b.id, city_id)))
            .cloned()
            .collect())
    }

    async fn models_of_brand(&self, brand_id: i64) -> Result<Vec<Model>, FlowError> {
        Ok(self
            .models
            .iter()
            .filter(|m| m.brand_id == brand_id)
            .cloned()
            .collect())
    }

    async fn generations_of_model(&self, model_id: i64) -> Result<Vec<Generation>, FlowError> {
        Ok(self
            .generations
            .iter()
            .filter(|g| g.model_id == model_id)
            .cloned()
            .collect())
    }

    async fn specifications_of_generation(
        &self,
        generation_id: i64,
    ) -> Result<Vec<Specification>, FlowError> {
        Ok(self
            .specifications
            .iter()
            .filter(|s| s.generation_id == generation_id)
            .cloned()
            .collect())
    }

    async fn maintenances_of_specification(
        &self,
        specification_id: i64,
    ) -> Result<Vec<Maintenance>, FlowError> {
        Ok(self
            .maintenances
            .iter()
            .filter(|m| m.specification_id == specification_id)
            .cloned()
            .collect())
    }

    async fn exists(&self, step: Step, id: i64) -> Result<bool, FlowError> {
        Ok(match step {
            Step::City => self.cities.iter().any(|c| c.id == id),
            Step::Brand => self.brands.iter().any(|b| b.id == id),
            Step::Model => self.models.iter().any(|m| m.id == id),
            Step::Generation => self.generations.iter().any(|g| g.id == id),
            Step::Specification => self.specifications.iter().any(|s| s.id == id),
            Step::Maintenance => self.maintenances.iter().any(|m| m.id == id),
        })
    }
}

// ============================================================================
// Mock Transport
// ============================================================================

/// Transport recording every message; can be switched to fail
#[allow(dead_code)]
pub struct MockTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    failing: AtomicBool,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages passed to `send`, failed ones included
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<OutboundMessage> {
        self.sent.lock().unwrap().last().cloned()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<Delivery, TransportError> {
        self.sent.lock().unwrap().push(message.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::timeout("mock transport timed out"));
        }
        Ok(Delivery {
            status_code: 200,
            content: "{}".to_string(),
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Concrete mocks wired into `FlowServices`
#[allow(dead_code)]
pub struct TestHarness {
    pub store: Arc<MemoryChainStore>,
    pub cache: Arc<MemoryTokenCache>,
    pub catalog: Arc<MemoryCatalog>,
    pub transport: Arc<MockTransport>,
}

#[allow(dead_code)]
impl TestHarness {
    pub fn new() -> Self {
        Self::with_catalog(MemoryCatalog::seeded())
    }

    pub fn with_catalog(catalog: MemoryCatalog) -> Self {
        Self {
            store: Arc::new(MemoryChainStore::new()),
            cache: Arc::new(MemoryTokenCache::new()),
            catalog: Arc::new(catalog),
            transport: Arc::new(MockTransport::new()),
        }
    }

    pub fn services(&self) -> FlowServices {
        FlowServices {
            store: self.store.clone(),
            cache: self.cache.clone(),
            catalog: self.catalog.clone(),
            transport: self.transport.clone(),
        }
    }

    pub fn settings() -> FlowSettings {
        FlowSettings {
            site_url: "https://site.test".to_string(),
            chain_lifetime: Duration::hours(24),
            token_ttl: Duration::hours(24),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
