//! Test doubles shared by the unit and behaviour tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::catalog::{
    ConfigChecker, Driver, DriverConfig, Profession, ProfessionMode, Professions, Requires, Worker,
};
use crate::error::DriverError;
use crate::id::WorkerId;
use crate::schema::ConfigSchema;

/// Worker that records its configuration and lifecycle calls.
#[derive(Debug)]
pub(crate) struct FakeWorker {
    pub(crate) id: WorkerId,
    pub(crate) config: Mutex<Value>,
    pub(crate) requires: Mutex<Vec<String>>,
    pub(crate) resets: AtomicUsize,
    pub(crate) stopped: AtomicBool,
    pub(crate) fail_stop: AtomicBool,
    skills: Vec<String>,
}

impl FakeWorker {
    fn apply(&self, config: &DriverConfig, requires: &Requires) -> Result<(), DriverError> {
        let value = config.expect_type::<Value>()?;
        if value.get("fail_reset").and_then(Value::as_bool) == Some(true) {
            return Err(DriverError::new("reset refused"));
        }
        *self.config.lock().map_err(|_| DriverError::new("poisoned"))? = value.clone();
        *self.requires.lock().map_err(|_| DriverError::new("poisoned"))? =
            requires.ids().map(ToString::to_string).collect();
        Ok(())
    }
}

impl Worker for FakeWorker {
    fn reset(&self, config: &DriverConfig, requires: &Requires) -> Result<(), DriverError> {
        self.apply(config, requires)?;
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), DriverError> {
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(DriverError::new("stop refused"));
        }
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn check_skill(&self, skill: &str) -> bool {
        self.skills.iter().any(|own| own == skill)
    }
}

/// Checker rejecting bodies with `"reject": true`.
pub(crate) struct RejectFlagChecker;

impl ConfigChecker for RejectFlagChecker {
    fn check(&self, config: &DriverConfig, _requires: &Requires) -> Result<(), DriverError> {
        let value = config.expect_type::<Value>()?;
        if value.get("reject").and_then(Value::as_bool) == Some(true) {
            return Err(DriverError::new("rejected by checker"));
        }
        Ok(())
    }
}

/// Driver producing [`FakeWorker`]s and remembering them.
pub(crate) struct FakeDriver {
    name: String,
    schema: ConfigSchema,
    skills: Vec<String>,
    checker: Option<RejectFlagChecker>,
    pub(crate) created: Mutex<Vec<Arc<FakeWorker>>>,
}

impl FakeDriver {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            schema: ConfigSchema::new(json!({ "title": format!("{name}Config"), "type": "object" })),
            skills: Vec::new(),
            checker: None,
            created: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_schema(mut self, schema: Value) -> Self {
        self.schema = ConfigSchema::new(schema);
        self
    }

    pub(crate) fn with_skill(mut self, skill: &str) -> Self {
        self.skills.push(skill.to_owned());
        self
    }

    pub(crate) fn with_checker(mut self) -> Self {
        self.checker = Some(RejectFlagChecker);
        self
    }

    pub(crate) fn worker(&self, id: &str) -> Option<Arc<FakeWorker>> {
        self.created
            .lock()
            .expect("created lock")
            .iter()
            .rev()
            .find(|worker| worker.id.as_str() == id)
            .cloned()
    }
}

impl Driver for FakeDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &ConfigSchema {
        &self.schema
    }

    fn decode(&self, body: &Value) -> Result<DriverConfig, DriverError> {
        if !body.is_object() {
            return Err(DriverError::new("expected an object"));
        }
        Ok(DriverConfig::new(body.clone()))
    }

    fn create(
        &self,
        id: &WorkerId,
        config: &DriverConfig,
        requires: &Requires,
    ) -> Result<Arc<dyn Worker>, DriverError> {
        let value = config.expect_type::<Value>()?;
        if value.get("fail_create").and_then(Value::as_bool) == Some(true) {
            return Err(DriverError::new("create refused"));
        }
        let worker = Arc::new(FakeWorker {
            id: id.clone(),
            config: Mutex::new(Value::Null),
            requires: Mutex::new(Vec::new()),
            resets: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            skills: self.skills.clone(),
        });
        worker.apply(config, requires)?;
        self.created.lock().expect("created lock").push(Arc::clone(&worker));
        Ok(worker)
    }

    fn checker(&self) -> Option<&dyn ConfigChecker> {
        self.checker
            .as_ref()
            .map(|checker| checker as &dyn ConfigChecker)
    }
}

/// Schema of a router configuration depending on an upstream.
pub(crate) fn router_schema() -> Value {
    json!({
        "title": "RouterConfig",
        "type": "object",
        "properties": {
            "upstream": { "type": "string", "eo:type": "require", "skill": "upstream" }
        }
    })
}

/// Drivers of the standard fixture catalog, kept for inspection.
pub(crate) struct Fixture {
    pub(crate) professions: Professions,
    pub(crate) upstream: Arc<FakeDriver>,
    pub(crate) router: Arc<FakeDriver>,
    pub(crate) singleton: Arc<FakeDriver>,
}

/// Catalog with `upstream` (multiple, driver `static`), `router` (multiple,
/// driver `http`, depends on `upstream`), and `P` (singleton, driver `d1`).
pub(crate) fn fixture_catalog() -> Fixture {
    let upstream = Arc::new(FakeDriver::new("static").with_skill("upstream"));
    let router = Arc::new(
        FakeDriver::new("http")
            .with_schema(router_schema())
            .with_checker(),
    );
    let singleton = Arc::new(FakeDriver::new("d1"));

    let mut professions = Professions::new();
    professions
        .register(
            Profession::new("router", ProfessionMode::Multiple)
                .with_driver(Arc::clone(&router) as Arc<dyn Driver>)
                .expect("router driver")
                .with_labels(["host"])
                .depends_on(["upstream"]),
        )
        .expect("router profession");
    professions
        .register(
            Profession::new("upstream", ProfessionMode::Multiple)
                .with_driver(Arc::clone(&upstream) as Arc<dyn Driver>)
                .expect("upstream driver")
                .with_labels(["scheme"]),
        )
        .expect("upstream profession");
    professions
        .register(
            Profession::new("P", ProfessionMode::Singleton)
                .with_driver(Arc::clone(&singleton) as Arc<dyn Driver>)
                .expect("singleton driver"),
        )
        .expect("singleton profession");

    Fixture {
        professions,
        upstream,
        router,
        singleton,
    }
}
