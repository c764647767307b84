//! Executes admin commands against the worker registry.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
#[cfg(test)]
use std::sync::TryLockError;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use guild_extenders::{Bundle, ExtendsInfo, Plugin};
use guild_workers::{WorkerError, WorkerId, WorkerRecord, Workers};

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::extenders::ExtenderService;
use super::request::AdminRequest;

/// Admission control for registry mutations.
///
/// Mutations pass through the gate one at a time so snapshots reach disk in
/// order. A handoff freezes the gate while the successor starts from its
/// snapshot; once the successor owns the registry the gate is retired and
/// every later mutation is refused.
#[derive(Debug, Default)]
pub(crate) struct MutationGate {
    retired: Mutex<bool>,
}

impl MutationGate {
    fn enter(&self) -> Result<MutexGuard<'_, bool>, DispatchError> {
        let retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        if *retired {
            return Err(DispatchError::unavailable(
                "worker process handed over to its successor; retry the request",
            ));
        }
        Ok(retired)
    }

    /// Blocks mutations until the returned guard is dropped or retired.
    pub(crate) fn freeze(&self) -> FrozenGate<'_> {
        FrozenGate {
            retired: self.retired.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_frozen(&self) -> bool {
        matches!(self.retired.try_lock(), Err(TryLockError::WouldBlock))
    }

    #[cfg(test)]
    pub(crate) fn is_retired(&self) -> bool {
        *self.retired.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held by a handoff between its snapshot and its outcome.
#[must_use = "dropping the guard thaws the gate"]
pub(crate) struct FrozenGate<'a> {
    retired: MutexGuard<'a, bool>,
}

impl FrozenGate<'_> {
    /// Refuses every mutation from now on.
    pub(crate) fn retire(mut self) {
        *self.retired = true;
    }
}

/// Runs admin commands and persists successful mutations.
pub(crate) struct AdminService {
    workers: Arc<Workers>,
    store_path: PathBuf,
    extenders: Box<dyn ExtenderService>,
    gate: Arc<MutationGate>,
}

impl AdminService {
    pub(crate) fn new(
        workers: Arc<Workers>,
        store_path: impl Into<PathBuf>,
        extenders: Box<dyn ExtenderService>,
    ) -> Self {
        Self {
            workers,
            store_path: store_path.into(),
            extenders,
            gate: Arc::default(),
        }
    }

    /// Shares `gate` with the handoff so it can hold back mutations.
    pub(crate) fn with_gate(mut self, gate: Arc<MutationGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Executes `request` and returns the response payload.
    pub(crate) fn execute(&self, request: AdminRequest) -> Result<Value, DispatchError> {
        match request {
            AdminRequest::Set(worker) => {
                let spec = worker.into_spec()?;
                self.mutate(|workers| workers.set(&spec).map(|info| info.record()))
            }
            AdminRequest::Update(worker) => {
                let spec = worker.into_spec()?;
                self.mutate(|workers| workers.update(spec).map(|info| info.record()))
            }
            AdminRequest::Delete { profession, name } => {
                let id = WorkerId::new(&name, &profession)?;
                self.mutate(|workers| workers.delete(&id).map(|info| info.record()))
            }
            AdminRequest::List { profession } => {
                Ok(serde_json::to_value(self.workers.list_employees(&profession)?)?)
            }
            AdminRequest::Export => {
                let exported: BTreeMap<String, Vec<WorkerRecord>> = self
                    .workers
                    .export()
                    .into_iter()
                    .map(|(profession, infos)| {
                        (profession, infos.iter().map(|info| info.record()).collect())
                    })
                    .collect();
                Ok(serde_json::to_value(exported)?)
            }
            AdminRequest::Professions => {
                let views: Vec<_> = self
                    .workers
                    .professions()
                    .sorted()
                    .into_iter()
                    .map(|profession| profession.view())
                    .collect();
                Ok(serde_json::to_value(views)?)
            }
            AdminRequest::Variables { set } => self.variables(set),
            AdminRequest::Extenders => {
                let infos = self.extenders.introspect()?;
                let views: Vec<ExtenderView> = infos.iter().map(ExtenderView::from).collect();
                Ok(serde_json::to_value(views)?)
            }
            AdminRequest::Install { id } => {
                let bundle = self.extenders.install(&id)?;
                Ok(installed_view(&bundle))
            }
        }
    }

    fn mutate<T, F>(&self, apply: F) -> Result<Value, DispatchError>
    where
        T: Serialize,
        F: FnOnce(&Workers) -> Result<T, WorkerError>,
    {
        let _admitted = self.gate.enter()?;
        let outcome = apply(&self.workers)?;
        self.persist();
        Ok(serde_json::to_value(outcome)?)
    }

    fn variables(
        &self,
        assignments: BTreeMap<String, String>,
    ) -> Result<Value, DispatchError> {
        if assignments.is_empty() {
            return Ok(json!({ "variables": self.workers.variables(), "affected": [] }));
        }
        let _admitted = self.gate.enter()?;
        let mut affected: Vec<String> = Vec::new();
        for (name, value) in &assignments {
            for id in self.workers.set_variable(name, value) {
                let id = id.to_string();
                if !affected.contains(&id) {
                    affected.push(id);
                }
            }
        }
        affected.sort();
        self.persist();
        Ok(json!({ "variables": self.workers.variables(), "affected": affected }))
    }

    // The in-memory change stands even when the snapshot cannot be written.
    fn persist(&self) {
        match self.workers.store().save(&self.store_path) {
            Ok(()) => info!(
                target: DISPATCH_TARGET,
                path = %self.store_path.display(),
                "worker store saved"
            ),
            Err(error) => warn!(
                target: DISPATCH_TARGET,
                %error,
                path = %self.store_path.display(),
                "failed to save worker store"
            ),
        }
    }
}

/// Serialisable form of an introspection result.
#[derive(Debug, Serialize)]
struct ExtenderView {
    id: String,
    name: String,
    group: String,
    project: String,
    version: String,
    plugins: Vec<PluginView>,
}

#[derive(Debug, Serialize)]
struct PluginView {
    id: String,
    name: String,
}

impl From<&ExtendsInfo> for ExtenderView {
    fn from(info: &ExtendsInfo) -> Self {
        Self {
            id: info.id.clone(),
            name: info.name.clone(),
            group: info.group.clone(),
            project: info.project.clone(),
            version: info.version.clone(),
            plugins: info.plugins.iter().map(PluginView::from).collect(),
        }
    }
}

impl From<&Plugin> for PluginView {
    fn from(plugin: &Plugin) -> Self {
        Self {
            id: plugin.id.clone(),
            name: plugin.name.clone(),
        }
    }
}

fn installed_view(bundle: &Bundle) -> Value {
    json!({
        "id": bundle.id.to_string(),
        "path": bundle.path.as_str(),
        "drivers": bundle
            .manifest
            .drivers
            .iter()
            .map(|driver| driver.name.as_str())
            .collect::<Vec<_>>(),
    })
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
