//! Driver/Profession Catalog.
//!
//! A [`Profession`] names a pluggable capability domain and carries the
//! drivers that implement it. Drivers are factories: they decode a JSON
//! configuration into their own type and build [`Worker`] instances from it.
//! Live workers accept replacement configurations through [`Worker::reset`]
//! without losing their identity.
//!
//! The catalog is assembled once at startup and read-only afterwards.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{DriverError, WorkerError};
use crate::id::{RequireId, WorkerId};
use crate::schema::ConfigSchema;

const CATALOG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::catalog");

/// How many workers a profession may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfessionMode {
    /// Exactly one worker, named after its driver.
    Singleton,
    /// Any number of independently named workers.
    Multiple,
}

/// Decoded driver configuration.
///
/// Drivers downcast it back to their own configuration type.
pub struct DriverConfig {
    inner: Box<dyn Any + Send + Sync>,
}

impl DriverConfig {
    /// Wraps a typed configuration value.
    #[must_use]
    pub fn new<T: Any + Send + Sync>(config: T) -> Self {
        Self {
            inner: Box::new(config),
        }
    }

    /// Decodes a JSON body into `T` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] carrying the deserialiser message.
    pub fn decode<T>(body: &Value) -> Result<Self, DriverError>
    where
        T: DeserializeOwned + Any + Send + Sync,
    {
        T::deserialize(body)
            .map(Self::new)
            .map_err(|error| DriverError::new(error.to_string()))
    }

    /// Borrows the configuration as `T`, if that is its type.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    /// Borrows the configuration as `T` or reports a type mismatch.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] when the configuration holds another type.
    pub fn expect_type<T: Any>(&self) -> Result<&T, DriverError> {
        self.downcast_ref().ok_or_else(|| {
            DriverError::new(format!(
                "configuration is not a {}",
                std::any::type_name::<T>()
            ))
        })
    }
}

impl fmt::Debug for DriverConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("DriverConfig").finish_non_exhaustive()
    }
}

/// Resolved dependencies of one worker configuration.
#[derive(Clone, Default)]
pub struct Requires {
    resolved: BTreeMap<RequireId, Arc<dyn Worker>>,
}

impl Requires {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a resolved dependency.
    pub fn insert(&mut self, id: RequireId, worker: Arc<dyn Worker>) {
        self.resolved.insert(id, worker);
    }

    /// Looks up a resolved dependency.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Worker>> {
        self.resolved.get(&RequireId::new(id))
    }

    /// Iterates over the dependency ids.
    pub fn ids(&self) -> impl Iterator<Item = &RequireId> {
        self.resolved.keys()
    }

    /// Number of dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    /// Returns true when the configuration has no dependencies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

impl fmt::Debug for Requires {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_set()
            .entries(self.resolved.keys())
            .finish()
    }
}

/// A live worker instance.
pub trait Worker: Send + Sync {
    /// Replaces the instance's behaviour with a new configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] when the configuration cannot be applied;
    /// the instance must keep its previous behaviour in that case.
    fn reset(&self, config: &DriverConfig, requires: &Requires) -> Result<(), DriverError>;

    /// Releases the instance's resources.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] when the instance cannot be stopped.
    fn stop(&self) -> Result<(), DriverError>;

    /// Reports whether the instance provides a named capability.
    fn check_skill(&self, skill: &str) -> bool {
        let _ = skill;
        false
    }
}

/// Optional extended validation run before a worker is created or reset.
pub trait ConfigChecker: Send + Sync {
    /// Inspects a decoded configuration and its resolved dependencies.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] describing why the configuration is
    /// unacceptable.
    fn check(&self, config: &DriverConfig, requires: &Requires) -> Result<(), DriverError>;
}

/// Factory for workers of one implementation.
pub trait Driver: Send + Sync {
    /// Driver name, unique within its profession.
    fn name(&self) -> &str;

    /// Human-readable title.
    fn title(&self) -> &str {
        self.name()
    }

    /// Schema of the configuration type.
    fn schema(&self) -> &ConfigSchema;

    /// Decodes a JSON configuration body into the driver's type.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] when the body does not match the type.
    fn decode(&self, body: &Value) -> Result<DriverConfig, DriverError>;

    /// Builds a new worker instance.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] when the instance cannot be built.
    fn create(
        &self,
        id: &WorkerId,
        config: &DriverConfig,
        requires: &Requires,
    ) -> Result<Arc<dyn Worker>, DriverError>;

    /// Extended validation capability, when the driver offers one.
    fn checker(&self) -> Option<&dyn ConfigChecker> {
        None
    }
}

/// Descriptor of a pluggable capability domain.
#[derive(Clone)]
pub struct Profession {
    name: String,
    mode: ProfessionMode,
    drivers: BTreeMap<String, Arc<dyn Driver>>,
    append_labels: Vec<String>,
    dependencies: Vec<String>,
}

impl Profession {
    /// Creates a profession without drivers.
    #[must_use]
    pub fn new(name: impl Into<String>, mode: ProfessionMode) -> Self {
        Self {
            name: name.into(),
            mode,
            drivers: BTreeMap::new(),
            append_labels: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Adds a driver.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::DuplicateCatalogEntry`] when the profession
    /// already has a driver of that name.
    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Result<Self, WorkerError> {
        let name = driver.name().to_owned();
        if self.drivers.contains_key(&name) {
            return Err(WorkerError::DuplicateCatalogEntry {
                what: "driver",
                name,
            });
        }
        self.drivers.insert(name, driver);
        Ok(self)
    }

    /// Sets the labels copied from worker bodies into listings.
    #[must_use]
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.append_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Declares professions whose workers this profession's workers use.
    #[must_use]
    pub fn depends_on<I, S>(mut self, professions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = professions.into_iter().map(Into::into).collect();
        self
    }

    /// Profession name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance mode.
    #[must_use]
    pub const fn mode(&self) -> ProfessionMode {
        self.mode
    }

    /// Looks up a driver by name.
    #[must_use]
    pub fn driver(&self, name: &str) -> Option<&Arc<dyn Driver>> {
        self.drivers.get(name)
    }

    /// Iterates over the drivers in name order.
    pub fn drivers(&self) -> impl Iterator<Item = &Arc<dyn Driver>> {
        self.drivers.values()
    }

    /// Labels exposed when listing workers.
    #[must_use]
    pub fn append_labels(&self) -> &[String] {
        &self.append_labels
    }

    /// Professions this profession depends on.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Serialisable summary for admin listings.
    #[must_use]
    pub fn view(&self) -> ProfessionView {
        ProfessionView {
            name: self.name.clone(),
            mode: self.mode,
            drivers: self
                .drivers
                .values()
                .map(|driver| DriverView {
                    name: driver.name().to_owned(),
                    title: driver.title().to_owned(),
                    schema: driver.schema().document().clone(),
                })
                .collect(),
            labels: self.append_labels.clone(),
            dependencies: self.dependencies.clone(),
        }
    }
}

impl fmt::Debug for Profession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Profession")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("drivers", &self.drivers.keys().collect::<Vec<_>>())
            .field("append_labels", &self.append_labels)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Serialisable description of a profession.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfessionView {
    /// Profession name.
    pub name: String,
    /// Instance mode.
    pub mode: ProfessionMode,
    /// Offered drivers.
    pub drivers: Vec<DriverView>,
    /// Labels exposed in listings.
    pub labels: Vec<String>,
    /// Professions depended upon.
    pub dependencies: Vec<String>,
}

/// Serialisable description of a driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverView {
    /// Driver name.
    pub name: String,
    /// Human-readable title.
    pub title: String,
    /// Configuration schema document.
    pub schema: Value,
}

/// The set of registered professions.
#[derive(Debug, Clone, Default)]
pub struct Professions {
    entries: Vec<Profession>,
    index: HashMap<String, usize>,
}

impl Professions {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a profession.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::DuplicateCatalogEntry`] when the name is taken.
    pub fn register(&mut self, profession: Profession) -> Result<(), WorkerError> {
        if self.index.contains_key(profession.name()) {
            return Err(WorkerError::DuplicateCatalogEntry {
                what: "profession",
                name: profession.name().to_owned(),
            });
        }
        self.index
            .insert(profession.name().to_owned(), self.entries.len());
        self.entries.push(profession);
        Ok(())
    }

    /// Looks up a profession by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Profession> {
        self.index
            .get(name)
            .and_then(|position| self.entries.get(*position))
    }

    /// Iterates over professions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Profession> {
        self.entries.iter()
    }

    /// Number of registered professions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Orders professions so that depended-upon professions come first.
    ///
    /// Dependencies on unknown professions are ignored. Professions caught
    /// in a cycle keep their registration order after every acyclic one.
    #[must_use]
    pub fn sorted(&self) -> Vec<&Profession> {
        let mut in_degree = vec![0_usize; self.entries.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.entries.len()];
        for (position, profession) in self.entries.iter().enumerate() {
            for dependency in profession.dependencies() {
                let Some(&target) = self.index.get(dependency) else {
                    continue;
                };
                if let (Some(degree), Some(edges)) =
                    (in_degree.get_mut(position), dependents.get_mut(target))
                {
                    *degree += 1;
                    edges.push(position);
                }
            }
        }

        let mut ready: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(position, _)| position)
            .collect();
        let mut order = Vec::with_capacity(self.entries.len());
        while let Some(position) = ready.pop_front() {
            order.push(position);
            for &dependent in dependents.get(position).map_or(&[][..], Vec::as_slice) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        if order.len() < self.entries.len() {
            let cyclic: Vec<usize> = (0..self.entries.len())
                .filter(|position| !order.contains(position))
                .collect();
            warn!(
                target: CATALOG_TARGET,
                professions = ?cyclic
                    .iter()
                    .filter_map(|position| self.entries.get(*position))
                    .map(Profession::name)
                    .collect::<Vec<_>>(),
                "profession dependencies form a cycle; using registration order"
            );
            order.extend(cyclic);
        }

        order
            .into_iter()
            .filter_map(|position| self.entries.get(position))
            .collect()
    }
}
