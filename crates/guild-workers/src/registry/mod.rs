//! Worker Registry.
//!
//! [`Workers`] owns every live worker together with the dependency tracker
//! and the variable set. All mutations run under one write lock so a
//! dependency added by [`Workers::set`] can never interleave with the
//! reference-count check of [`Workers::delete`]. Listings take the read lock
//! and therefore observe a consistent snapshot.
//!
//! A failed operation leaves the registry untouched: the configuration is
//! substituted, parsed, checked, and applied to the driver before any state
//! is replaced.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::catalog::{Driver, ProfessionMode, Professions, Requires, Worker};
use crate::error::WorkerError;
use crate::id::{RequireId, WorkerId};
use crate::requires::RequireManager;
use crate::schema::RequireRef;
use crate::store::{WorkerRecord, WorkerStore, format_time, parse_time};
use crate::variables::Variables;

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Administrative request to create or replace a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    /// Profession the worker belongs to.
    pub profession: String,
    /// Worker name.
    pub name: String,
    /// Driver name; ignored for singleton professions.
    pub driver: String,
    /// Free-form description.
    pub description: String,
    /// Raw configuration body.
    pub body: Vec<u8>,
}

impl WorkerSpec {
    /// Builds a request without description.
    #[must_use]
    pub fn new(
        profession: impl Into<String>,
        name: impl Into<String>,
        driver: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            profession: profession.into(),
            name: name.into(),
            driver: driver.into(),
            description: String::new(),
            body: body.into(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl From<&WorkerRecord> for WorkerSpec {
    fn from(record: &WorkerRecord) -> Self {
        Self {
            profession: record.profession.clone(),
            name: record.name.clone(),
            driver: record.driver.clone(),
            description: record.description.clone(),
            body: record.body.clone().into_bytes(),
        }
    }
}

/// Registry record of one worker.
#[derive(Clone)]
pub struct WorkerInfo {
    id: WorkerId,
    driver: String,
    description: String,
    body: Vec<u8>,
    config_type: String,
    create_time: OffsetDateTime,
    update_time: OffsetDateTime,
    worker: Arc<dyn Worker>,
}

impl WorkerInfo {
    /// Worker id.
    #[must_use]
    pub const fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Profession name.
    #[must_use]
    pub fn profession(&self) -> &str {
        self.id.profession()
    }

    /// Worker name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.id.name()
    }

    /// Driver name.
    #[must_use]
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Description supplied with the last successful set.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Raw body that produced the live state.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Name of the driver's configuration type.
    #[must_use]
    pub fn config_type(&self) -> &str {
        &self.config_type
    }

    /// Creation time, preserved across resets.
    #[must_use]
    pub const fn create_time(&self) -> OffsetDateTime {
        self.create_time
    }

    /// Time of the last successful set.
    #[must_use]
    pub const fn update_time(&self) -> OffsetDateTime {
        self.update_time
    }

    /// Live worker instance.
    #[must_use]
    pub const fn worker(&self) -> &Arc<dyn Worker> {
        &self.worker
    }

    /// Serialisable record for the worker store.
    #[must_use]
    pub fn record(&self) -> WorkerRecord {
        WorkerRecord {
            id: self.id.to_string(),
            profession: self.profession().to_owned(),
            name: self.name().to_owned(),
            driver: self.driver.clone(),
            description: self.description.clone(),
            body: String::from_utf8_lossy(&self.body).into_owned(),
            create_time: format_time(self.create_time),
            update_time: format_time(self.update_time),
        }
    }

    fn view(&self, labels: &[String]) -> InstanceView {
        InstanceView {
            id: self.id.to_string(),
            profession: self.profession().to_owned(),
            name: self.name().to_owned(),
            driver: self.driver.clone(),
            description: self.description.clone(),
            create_time: format_time(self.create_time),
            update_time: format_time(self.update_time),
            labels: extract_labels(&self.body, labels),
        }
    }
}

impl fmt::Debug for WorkerInfo {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("WorkerInfo")
            .field("id", &self.id)
            .field("driver", &self.driver)
            .field("description", &self.description)
            .field("config_type", &self.config_type)
            .field("create_time", &self.create_time)
            .field("update_time", &self.update_time)
            .finish_non_exhaustive()
    }
}

/// Listing entry returned by [`Workers::list_employees`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceView {
    /// Worker id.
    pub id: String,
    /// Profession name.
    pub profession: String,
    /// Worker name.
    pub name: String,
    /// Driver name.
    pub driver: String,
    /// Description.
    pub description: String,
    /// Creation time, RFC 3339.
    pub create_time: String,
    /// Last update time, RFC 3339.
    pub update_time: String,
    /// Values of the profession's extra labels found in the body.
    pub labels: BTreeMap<String, String>,
}

/// Outcome of [`Workers::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Workers materialised.
    pub loaded: usize,
    /// Workers whose records failed and were skipped.
    pub skipped: usize,
}

#[derive(Default)]
struct State {
    data: BTreeMap<WorkerId, WorkerInfo>,
    requires: RequireManager,
    variables: Variables,
}

/// The authoritative worker registry.
pub struct Workers {
    professions: Arc<Professions>,
    state: RwLock<State>,
}

impl Workers {
    /// Creates an empty registry over a catalog.
    #[must_use]
    pub fn new(professions: Arc<Professions>) -> Self {
        Self::with_variables(professions, Variables::new())
    }

    /// Creates an empty registry with initial variable values.
    #[must_use]
    pub fn with_variables(professions: Arc<Professions>, variables: Variables) -> Self {
        Self {
            professions,
            state: RwLock::new(State {
                variables,
                ..State::default()
            }),
        }
    }

    /// The catalog the registry was built over.
    #[must_use]
    pub fn professions(&self) -> &Professions {
        &self.professions
    }

    /// Creates a worker or resets the existing worker with the same id.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkerError`] when the profession, driver, or a
    /// dependency is unknown, when the body fails substitution, decoding, or
    /// validation, or when the driver refuses to create or reset the worker.
    /// The registry is unchanged on error.
    pub fn set(&self, spec: &WorkerSpec) -> Result<WorkerInfo, WorkerError> {
        let mut state = self.write();
        self.set_locked(&mut state, spec, OffsetDateTime::now_utc())
    }

    /// Like [`Workers::set`], but an empty driver reuses the existing
    /// worker's driver.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::WorkerNotExist`] when the driver is empty and
    /// no worker exists to infer it from, plus every error of
    /// [`Workers::set`].
    pub fn update(&self, mut spec: WorkerSpec) -> Result<WorkerInfo, WorkerError> {
        let mut state = self.write();
        if spec.driver.is_empty() {
            let id = WorkerId::new(&spec.name, &spec.profession)?;
            let existing = state
                .data
                .get(&id)
                .ok_or_else(|| WorkerError::WorkerNotExist { id: id.to_string() })?;
            spec.driver = existing.driver.clone();
        }
        self.set_locked(&mut state, &spec, OffsetDateTime::now_utc())
    }

    /// Stops and removes a worker nobody depends on.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::WorkerNotExist`] for an unknown id,
    /// [`WorkerError::RequireInUse`] while other workers reference it, and
    /// [`WorkerError::Driver`] when stopping fails; the record is kept in
    /// every error case.
    pub fn delete(&self, id: &WorkerId) -> Result<WorkerInfo, WorkerError> {
        let mut state = self.write();
        let info = state
            .data
            .get(id)
            .ok_or_else(|| WorkerError::WorkerNotExist { id: id.to_string() })?;
        let dependents = state.requires.require_by_count(id.as_str());
        if dependents > 0 {
            return Err(WorkerError::RequireInUse {
                id: id.to_string(),
                dependents,
            });
        }
        info.worker.stop().map_err(|source| WorkerError::Driver {
            id: id.to_string(),
            action: "stop",
            source,
        })?;

        let removed = state
            .data
            .remove(id)
            .ok_or_else(|| WorkerError::WorkerNotExist { id: id.to_string() })?;
        state.requires.del(id);
        state.variables.remove_worker(id);
        info!(target: REGISTRY_TARGET, id = %id, "worker deleted");
        Ok(removed)
    }

    /// Looks up a worker.
    #[must_use]
    pub fn get(&self, id: &WorkerId) -> Option<WorkerInfo> {
        self.read().data.get(id).cloned()
    }

    /// Lists the workers of a profession with its extra labels.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::ProfessionNotExist`] for an unknown profession.
    pub fn list_employees(&self, profession: &str) -> Result<Vec<InstanceView>, WorkerError> {
        let descriptor =
            self.professions
                .get(profession)
                .ok_or_else(|| WorkerError::ProfessionNotExist {
                    profession: profession.to_owned(),
                })?;
        let state = self.read();
        Ok(state
            .data
            .values()
            .filter(|info| info.profession() == profession)
            .map(|info| info.view(descriptor.append_labels()))
            .collect())
    }

    /// Snapshot of every worker grouped by profession.
    #[must_use]
    pub fn export(&self) -> BTreeMap<String, Vec<WorkerInfo>> {
        let state = self.read();
        let mut grouped: BTreeMap<String, Vec<WorkerInfo>> = BTreeMap::new();
        for info in state.data.values() {
            grouped
                .entry(info.profession().to_owned())
                .or_default()
                .push(info.clone());
        }
        grouped
    }

    /// Number of workers depending on `id`.
    #[must_use]
    pub fn require_by_count(&self, id: &WorkerId) -> usize {
        self.read().requires.require_by_count(id.as_str())
    }

    /// Current variable values.
    #[must_use]
    pub fn variables(&self) -> BTreeMap<String, String> {
        self.read().variables.values().clone()
    }

    /// Defines or replaces a variable and returns the workers whose current
    /// body references it. Those workers keep their resolved configuration
    /// until they are set again.
    pub fn set_variable(&self, name: &str, value: &str) -> Vec<WorkerId> {
        let mut state = self.write();
        state.variables.set(name, value);
        state.variables.workers_using(name)
    }

    /// Workers whose current body references the variable.
    #[must_use]
    pub fn workers_using(&self, name: &str) -> Vec<WorkerId> {
        self.read().variables.workers_using(name)
    }

    /// Snapshot suitable for persistence.
    #[must_use]
    pub fn store(&self) -> WorkerStore {
        let state = self.read();
        WorkerStore {
            variables: state.variables.values().clone(),
            workers: state.data.values().map(WorkerInfo::record).collect(),
        }
    }

    /// Materialises a persisted store.
    ///
    /// Variables are applied first, then workers in profession dependency
    /// order. Records that fail are logged and skipped. Stored timestamps
    /// are restored when they parse.
    pub fn load(&self, store: WorkerStore) -> LoadSummary {
        let rank: HashMap<&str, usize> = self
            .professions
            .sorted()
            .into_iter()
            .enumerate()
            .map(|(position, profession)| (profession.name(), position))
            .collect();
        let mut records = store.workers;
        records.sort_by_key(|record| {
            rank.get(record.profession.as_str())
                .copied()
                .unwrap_or(usize::MAX)
        });

        let mut state = self.write();
        for (name, value) in store.variables {
            state.variables.set(name, value);
        }

        let mut summary = LoadSummary::default();
        for record in &records {
            match self.set_locked(&mut state, &WorkerSpec::from(record), OffsetDateTime::now_utc())
            {
                Ok(loaded) => {
                    if let Some(info) = state.data.get_mut(loaded.id()) {
                        restore_times(info, record);
                    }
                    summary.loaded += 1;
                }
                Err(error) => {
                    warn!(
                        target: REGISTRY_TARGET,
                        id = %record.id,
                        error = %error,
                        "skipping stored worker"
                    );
                    summary.skipped += 1;
                }
            }
        }
        info!(
            target: REGISTRY_TARGET,
            loaded = summary.loaded,
            skipped = summary.skipped,
            "worker store loaded"
        );
        summary
    }

    /// Stops every worker, dependents before the professions they use, and
    /// empties the registry. Returns how many workers stopped cleanly.
    pub fn shutdown(&self) -> usize {
        let mut state = self.write();
        let mut order: Vec<WorkerId> = Vec::with_capacity(state.data.len());
        for profession in self.professions.sorted().into_iter().rev() {
            order.extend(
                state
                    .data
                    .keys()
                    .filter(|id| id.profession() == profession.name())
                    .cloned(),
            );
        }

        let mut stopped = 0;
        for id in order {
            let Some(info) = state.data.remove(&id) else {
                continue;
            };
            state.requires.del(&id);
            state.variables.remove_worker(&id);
            match info.worker.stop() {
                Ok(()) => stopped += 1,
                Err(error) => {
                    warn!(target: REGISTRY_TARGET, id = %id, error = %error, "worker failed to stop");
                }
            }
        }
        info!(target: REGISTRY_TARGET, stopped, "workers shut down");
        stopped
    }

    fn set_locked(
        &self,
        state: &mut State,
        spec: &WorkerSpec,
        now: OffsetDateTime,
    ) -> Result<WorkerInfo, WorkerError> {
        let profession = self.professions.get(&spec.profession).ok_or_else(|| {
            WorkerError::ProfessionNotExist {
                profession: spec.profession.clone(),
            }
        })?;
        let id = WorkerId::new(&spec.name, profession.name())?;
        let driver_name = match profession.mode() {
            ProfessionMode::Singleton => {
                if let Some(existing) = state
                    .data
                    .keys()
                    .find(|other| other.profession() == profession.name() && **other != id)
                {
                    return Err(WorkerError::SingletonOccupied {
                        profession: profession.name().to_owned(),
                        existing: existing.to_string(),
                    });
                }
                spec.name.as_str()
            }
            ProfessionMode::Multiple => spec.driver.as_str(),
        };
        let driver = profession
            .driver(driver_name)
            .ok_or_else(|| WorkerError::DriverNotExist {
                profession: profession.name().to_owned(),
                driver: driver_name.to_owned(),
            })?;

        let substitution = state
            .variables
            .substitute(&spec.body)
            .map_err(|error| with_driver(error, driver.name()))?;
        let body: Value =
            serde_json::from_slice(&substitution.body).map_err(|error| WorkerError::Decode {
                driver: driver.name().to_owned(),
                message: error.to_string(),
            })?;
        let references = driver.schema().collect_requires(&body)?;
        let requires = resolve_requires(state, &id, &references)?;
        let config = driver
            .decode(&body)
            .map_err(|error| WorkerError::Decode {
                driver: driver.name().to_owned(),
                message: error.to_string(),
            })?;
        if let Some(checker) = driver.checker() {
            checker
                .check(&config, &requires)
                .map_err(|source| WorkerError::Rejected {
                    driver: driver.name().to_owned(),
                    source,
                })?;
        }

        let (worker, create_time) = match state.data.get(&id) {
            Some(existing) if existing.driver == driver.name() => {
                existing
                    .worker
                    .reset(&config, &requires)
                    .map_err(|source| WorkerError::Driver {
                        id: id.to_string(),
                        action: "reset",
                        source,
                    })?;
                debug!(target: REGISTRY_TARGET, id = %id, "worker reset");
                (Arc::clone(&existing.worker), existing.create_time)
            }
            Some(existing) => {
                let worker = create_worker(driver.as_ref(), &id, &config, &requires)?;
                if let Err(error) = existing.worker.stop() {
                    warn!(
                        target: REGISTRY_TARGET,
                        id = %id,
                        error = %error,
                        "previous driver instance failed to stop"
                    );
                }
                info!(
                    target: REGISTRY_TARGET,
                    id = %id,
                    from = %existing.driver,
                    to = %driver.name(),
                    "worker driver replaced"
                );
                (worker, existing.create_time)
            }
            None => {
                let worker = create_worker(driver.as_ref(), &id, &config, &requires)?;
                info!(target: REGISTRY_TARGET, id = %id, driver = %driver.name(), "worker created");
                (worker, now)
            }
        };

        let info = WorkerInfo {
            id: id.clone(),
            driver: driver.name().to_owned(),
            description: spec.description.clone(),
            body: spec.body.clone(),
            config_type: driver
                .schema()
                .title()
                .unwrap_or_else(|| driver.name())
                .to_owned(),
            create_time,
            update_time: now,
            worker,
        };
        state.requires.set(&id, requires.ids().cloned());
        state.variables.set_variables_by_id(&id, substitution.used);
        state.data.insert(id, info.clone());
        Ok(info)
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Workers {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        formatter
            .debug_struct("Workers")
            .field("professions", &self.professions.len())
            .field("workers", &state.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn create_worker(
    driver: &dyn Driver,
    id: &WorkerId,
    config: &crate::catalog::DriverConfig,
    requires: &Requires,
) -> Result<Arc<dyn Worker>, WorkerError> {
    driver
        .create(id, config, requires)
        .map_err(|source| WorkerError::Driver {
            id: id.to_string(),
            action: "create",
            source,
        })
}

fn resolve_requires(
    state: &State,
    id: &WorkerId,
    references: &[RequireRef],
) -> Result<Requires, WorkerError> {
    let mut requires = Requires::new();
    for reference in references {
        if reference.id.as_str() == id.as_str() {
            return Err(WorkerError::InvalidRequire {
                path: reference.path.clone(),
                message: "a worker cannot require itself".to_owned(),
            });
        }
        let target = reference
            .id
            .as_str()
            .parse::<WorkerId>()
            .ok()
            .and_then(|target| state.data.get(&target))
            .ok_or_else(|| WorkerError::RequireNotExist {
                id: id.to_string(),
                require: reference.id.to_string(),
            })?;
        if let Some(skill) = &reference.skill
            && !target.worker.check_skill(skill)
        {
            return Err(WorkerError::SkillMismatch {
                require: reference.id.to_string(),
                skill: skill.clone(),
            });
        }
        requires.insert(RequireId::clone(&reference.id), Arc::clone(&target.worker));
    }
    Ok(requires)
}

fn with_driver(error: WorkerError, driver: &str) -> WorkerError {
    match error {
        WorkerError::Decode { message, .. } => WorkerError::Decode {
            driver: driver.to_owned(),
            message,
        },
        other => other,
    }
}

fn extract_labels(body: &[u8], labels: &[String]) -> BTreeMap<String, String> {
    if labels.is_empty() {
        return BTreeMap::new();
    }
    let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(body) else {
        return BTreeMap::new();
    };
    labels
        .iter()
        .filter_map(|label| {
            let value = match fields.get(label)? {
                Value::Null => return None,
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            Some((label.clone(), value))
        })
        .collect()
}

fn restore_times(info: &mut WorkerInfo, record: &WorkerRecord) {
    if let Some(created) = parse_time(&record.create_time) {
        info.create_time = created;
    }
    if let Some(updated) = parse_time(&record.update_time) {
        info.update_time = updated;
    }
}

#[cfg(test)]
mod tests;
