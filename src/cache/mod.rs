//! In-memory reference data cache
//!
//! Reference records (currencies, rates, countries, payment methods and systems,
//! commissions, VAT, system fees, projects, merchants) are held in one immutable
//! [`ReferenceSnapshot`] with a strongly typed map per kind. A rebuild replaces the
//! whole snapshot atomically; readers keep the `Arc` they obtained for the
//! duration of a request and therefore always see a consistent view.
//!
//! Lookups return the latest active record or [`CacheError::NotFound`]. Entity
//! records with their own "inactive" error (projects, merchants, payment methods,
//! payment systems) are returned regardless of their flag so callers can report it.

pub mod error;
pub mod keys;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::{
    Commission, Country, Currency, CurrencyRate, Merchant, PaymentMethod, PaymentSystem, Project,
    SystemFees, Vat,
};
use error::{CacheError, CacheResult, ReferenceKind};
use keys::{CommissionKey, MethodGroupKey, RateKey, SystemFeesKey, VatKey};

/// Raw reference data as delivered by a [`ReferenceSource`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceData {
    #[serde(default)]
    pub currencies: Vec<Currency>,
    #[serde(default)]
    pub currency_rates: Vec<CurrencyRate>,
    #[serde(default)]
    pub countries: Vec<Country>,
    #[serde(default)]
    pub payment_methods: Vec<PaymentMethod>,
    #[serde(default)]
    pub payment_systems: Vec<PaymentSystem>,
    #[serde(default)]
    pub commissions: Vec<Commission>,
    #[serde(default)]
    pub vat: Vec<Vat>,
    #[serde(default)]
    pub system_fees: Vec<SystemFees>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub merchants: Vec<Merchant>,
}

/// Immutable, indexed view of one generation of reference data
#[derive(Debug, Default)]
pub struct ReferenceSnapshot {
    currencies: HashMap<i32, Currency>,
    currency_codes: HashMap<String, i32>,
    rates: HashMap<RateKey, CurrencyRate>,
    countries: HashMap<String, Country>,
    payment_methods: HashMap<String, PaymentMethod>,
    method_groups: HashMap<MethodGroupKey, Vec<String>>,
    payment_systems: HashMap<String, PaymentSystem>,
    commissions: HashMap<CommissionKey, Vec<Commission>>,
    vat: HashMap<VatKey, Vat>,
    system_fees: HashMap<SystemFeesKey, Vec<SystemFees>>,
    projects: HashMap<String, Project>,
    merchants: HashMap<String, Merchant>,
}

impl ReferenceSnapshot {
    pub fn build(data: ReferenceData) -> Self {
        let mut snapshot = ReferenceSnapshot::default();

        for currency in data.currencies.into_iter().filter(|c| c.is_active) {
            snapshot
                .currency_codes
                .insert(currency.code_a3.to_uppercase(), currency.code_int);
            snapshot.currencies.insert(currency.code_int, currency);
        }

        for rate in data.currency_rates.into_iter().filter(|r| r.is_active) {
            snapshot
                .rates
                .insert(RateKey::new(rate.currency_from, rate.currency_to), rate);
        }

        for country in data.countries.into_iter().filter(|c| c.is_active) {
            snapshot
                .countries
                .insert(country.code_a2.to_uppercase(), country);
        }

        for method in data.payment_methods {
            for currency in &method.currencies {
                snapshot
                    .method_groups
                    .entry(MethodGroupKey::new(method.group_alias.clone(), *currency))
                    .or_default()
                    .push(method.id.clone());
            }
            snapshot.payment_methods.insert(method.id.clone(), method);
        }
        // Active methods first, then by id, so group resolution is deterministic.
        for ids in snapshot.method_groups.values_mut() {
            let methods = &snapshot.payment_methods;
            ids.sort_by(|a, b| {
                let active_a = methods.get(a).map(|m| m.is_active).unwrap_or(false);
                let active_b = methods.get(b).map(|m| m.is_active).unwrap_or(false);
                active_b.cmp(&active_a).then_with(|| a.cmp(b))
            });
        }

        for system in data.payment_systems {
            snapshot.payment_systems.insert(system.id.clone(), system);
        }

        for commission in data.commissions.into_iter().filter(|c| c.is_active) {
            snapshot
                .commissions
                .entry(CommissionKey::new(
                    commission.project_id.clone(),
                    commission.payment_method_id.clone(),
                ))
                .or_default()
                .push(commission);
        }
        for list in snapshot.commissions.values_mut() {
            list.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        }

        for vat in data.vat.into_iter().filter(|v| v.is_active) {
            snapshot
                .vat
                .insert(VatKey::new(vat.country.clone(), vat.subdivision.clone()), vat);
        }

        for fees in data.system_fees.into_iter().filter(|f| f.is_active) {
            snapshot
                .system_fees
                .entry(SystemFeesKey::new(
                    fees.payment_method_id.clone(),
                    fees.region.clone(),
                    fees.card_brand.clone(),
                ))
                .or_default()
                .push(fees);
        }
        for list in snapshot.system_fees.values_mut() {
            list.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        }

        for project in data.projects {
            snapshot.projects.insert(project.id.clone(), project);
        }
        for merchant in data.merchants {
            snapshot.merchants.insert(merchant.id.clone(), merchant);
        }

        snapshot
    }

    pub fn currency(&self, code_int: i32) -> CacheResult<&Currency> {
        self.currencies
            .get(&code_int)
            .ok_or_else(|| CacheError::not_found(ReferenceKind::Currency, code_int))
    }

    pub fn currency_by_a3(&self, code_a3: &str) -> CacheResult<&Currency> {
        let normalized = code_a3.trim().to_uppercase();
        self.currency_codes
            .get(&normalized)
            .and_then(|code| self.currencies.get(code))
            .ok_or_else(|| CacheError::not_found(ReferenceKind::Currency, normalized))
    }

    /// The single directed edge `from -> to`; no inverse or multi-hop fallback
    pub fn currency_rate(&self, from: i32, to: i32) -> CacheResult<&CurrencyRate> {
        let key = RateKey::new(from, to);
        self.rates
            .get(&key)
            .ok_or_else(|| CacheError::not_found(ReferenceKind::CurrencyRate { from, to }, key))
    }

    pub fn country(&self, code_a2: &str) -> CacheResult<&Country> {
        let normalized = code_a2.trim().to_uppercase();
        self.countries
            .get(&normalized)
            .ok_or_else(|| CacheError::not_found(ReferenceKind::Country, normalized))
    }

    pub fn payment_method(&self, id: &str) -> CacheResult<&PaymentMethod> {
        self.payment_methods
            .get(id)
            .ok_or_else(|| CacheError::not_found(ReferenceKind::PaymentMethod, id))
    }

    pub fn payment_method_by_group_and_currency(
        &self,
        group_alias: &str,
        currency: i32,
    ) -> CacheResult<&PaymentMethod> {
        let key = MethodGroupKey::new(group_alias, currency);
        self.method_groups
            .get(&key)
            .and_then(|ids| ids.first())
            .and_then(|id| self.payment_methods.get(id))
            .ok_or_else(|| CacheError::not_found(ReferenceKind::PaymentMethod, key))
    }

    /// Every payment method accepting the given currency, ordered by id
    pub fn payment_methods_for_currency(&self, currency: i32) -> Vec<&PaymentMethod> {
        let mut methods: Vec<&PaymentMethod> = self
            .payment_methods
            .values()
            .filter(|m| m.currencies.contains(&currency))
            .collect();
        methods.sort_by(|a, b| a.id.cmp(&b.id));
        methods
    }

    pub fn payment_system(&self, id: &str) -> CacheResult<&PaymentSystem> {
        self.payment_systems
            .get(id)
            .ok_or_else(|| CacheError::not_found(ReferenceKind::PaymentSystem, id))
    }

    /// Latest commission already in effect for the project and payment method
    pub fn commission(&self, project_id: &str, payment_method_id: &str) -> CacheResult<&Commission> {
        let key = CommissionKey::new(project_id, payment_method_id);
        let now = Utc::now();
        self.commissions
            .get(&key)
            .and_then(|list| list.iter().find(|c| c.start_date <= now))
            .ok_or_else(|| CacheError::not_found(ReferenceKind::Commission, key))
    }

    /// VAT row for the payer location; the subdivision only matters for countries
    /// taxing per subdivision
    pub fn vat(&self, country: &str, subdivision: Option<&str>) -> CacheResult<&Vat> {
        let country = self
            .country(country)
            .map_err(|_| CacheError::not_found(ReferenceKind::Vat, country))?;
        let subdivision = if country.vat_by_subdivision {
            subdivision.map(str::to_string)
        } else {
            None
        };
        let key = VatKey::new(country.code_a2.clone(), subdivision);
        self.vat
            .get(&key)
            .ok_or_else(|| CacheError::not_found(ReferenceKind::Vat, key))
    }

    pub fn system_fees(
        &self,
        payment_method_id: &str,
        region: &str,
        card_brand: Option<&str>,
    ) -> CacheResult<&SystemFees> {
        let key = SystemFeesKey::new(payment_method_id, region, card_brand.map(str::to_string));
        let now = Utc::now();
        self.system_fees
            .get(&key)
            .and_then(|list| list.iter().find(|f| f.start_date <= now))
            .ok_or_else(|| CacheError::not_found(ReferenceKind::SystemFees, key))
    }

    pub fn project(&self, id: &str) -> CacheResult<&Project> {
        self.projects
            .get(id)
            .ok_or_else(|| CacheError::not_found(ReferenceKind::Project, id))
    }

    pub fn merchant(&self, id: &str) -> CacheResult<&Merchant> {
        self.merchants
            .get(id)
            .ok_or_else(|| CacheError::not_found(ReferenceKind::Merchant, id))
    }
}

/// Where reference data is loaded from on every rebuild
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn load(&self) -> CacheResult<ReferenceData>;
}

/// Fixed data set, mostly for tests and local runs
pub struct StaticReferenceSource {
    data: ReferenceData,
}

impl StaticReferenceSource {
    pub fn new(data: ReferenceData) -> Self {
        Self { data }
    }
}

#[async_trait]
impl ReferenceSource for StaticReferenceSource {
    async fn load(&self) -> CacheResult<ReferenceData> {
        Ok(self.data.clone())
    }
}

/// Reads a JSON export of the reference collections
pub struct JsonFileReferenceSource {
    path: PathBuf,
}

impl JsonFileReferenceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReferenceSource for JsonFileReferenceSource {
    async fn load(&self) -> CacheResult<ReferenceData> {
        let raw = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// Shared handle to the current reference snapshot
pub struct ReferenceCache {
    current: RwLock<Arc<ReferenceSnapshot>>,
}

impl Default for ReferenceCache {
    fn default() -> Self {
        Self::new(ReferenceSnapshot::default())
    }
}

impl ReferenceCache {
    pub fn new(snapshot: ReferenceSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn from_data(data: ReferenceData) -> Self {
        Self::new(ReferenceSnapshot::build(data))
    }

    /// Current generation; hold on to it for the whole request
    pub fn snapshot(&self) -> Arc<ReferenceSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, snapshot: ReferenceSnapshot) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    /// Rebuild from the source; the previous snapshot stays in place on failure
    pub async fn rebuild(&self, source: &dyn ReferenceSource) -> CacheResult<()> {
        let data = source.load().await?;
        let snapshot = ReferenceSnapshot::build(data);
        debug!(
            currencies = snapshot.currencies.len(),
            rates = snapshot.rates.len(),
            payment_methods = snapshot.payment_methods.len(),
            projects = snapshot.projects.len(),
            "Reference snapshot rebuilt"
        );
        self.replace(snapshot);
        Ok(())
    }

    /// Periodically rebuild until the exit signal flips to `true`
    pub fn spawn_refresh(
        self: Arc<Self>,
        source: Arc<dyn ReferenceSource>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Reference cache refresh started");
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.rebuild(source.as_ref()).await {
                            warn!(error = %e, "Reference cache rebuild failed, keeping previous snapshot");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Reference cache refresh stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}
