//! `router` profession: path prefixes mapped onto upstream workers.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use guild_workers::{
    ConfigChecker, ConfigSchema, Driver, DriverConfig, DriverError, Requires, Worker, WorkerId,
};

use super::{DRIVERS_TARGET, Gateway, Route, UPSTREAM_SKILL};

/// Profession name.
pub const ROUTER_PROFESSION: &str = "router";
/// Driver name.
pub const HTTP_DRIVER: &str = "http";

fn default_path() -> String {
    String::from("/")
}

/// Configuration of an `http` router.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpRouterConfig {
    /// Id of the upstream worker, `name@upstream`.
    pub upstream: String,
    /// Path prefix served by the route.
    #[serde(default = "default_path")]
    pub path: String,
}

struct PathChecker;

impl ConfigChecker for PathChecker {
    fn check(&self, config: &DriverConfig, requires: &Requires) -> Result<(), DriverError> {
        let config = config.expect_type::<HttpRouterConfig>()?;
        if !config.path.starts_with('/') {
            return Err(DriverError::new(format!(
                "path '{}' must start with '/'",
                config.path
            )));
        }
        if requires.get(&config.upstream).is_none() {
            return Err(DriverError::new(format!(
                "upstream '{}' was not resolved",
                config.upstream
            )));
        }
        Ok(())
    }
}

pub(super) struct HttpDriver {
    gateway: Arc<Gateway>,
    schema: ConfigSchema,
    checker: PathChecker,
}

impl HttpDriver {
    pub(super) fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            schema: ConfigSchema::new(json!({
                "title": "HttpRouterConfig",
                "type": "object",
                "properties": {
                    "upstream": {
                        "type": "string",
                        "eo:type": "require",
                        "skill": UPSTREAM_SKILL
                    },
                    "path": { "type": "string" }
                },
                "required": ["upstream"]
            })),
            checker: PathChecker,
        }
    }
}

impl Driver for HttpDriver {
    fn name(&self) -> &str {
        HTTP_DRIVER
    }

    fn title(&self) -> &str {
        "HTTP router"
    }

    fn schema(&self) -> &ConfigSchema {
        &self.schema
    }

    fn decode(&self, body: &Value) -> Result<DriverConfig, DriverError> {
        DriverConfig::decode::<HttpRouterConfig>(body)
    }

    fn create(
        &self,
        id: &WorkerId,
        config: &DriverConfig,
        requires: &Requires,
    ) -> Result<Arc<dyn Worker>, DriverError> {
        let worker = HttpRouter {
            id: id.to_string(),
            gateway: Arc::clone(&self.gateway),
        };
        worker.reset(config, requires)?;
        Ok(Arc::new(worker))
    }

    fn checker(&self) -> Option<&dyn ConfigChecker> {
        Some(&self.checker)
    }
}

struct HttpRouter {
    id: String,
    gateway: Arc<Gateway>,
}

impl Worker for HttpRouter {
    fn reset(&self, config: &DriverConfig, _requires: &Requires) -> Result<(), DriverError> {
        let config = config.expect_type::<HttpRouterConfig>()?;
        debug!(
            target: DRIVERS_TARGET,
            id = %self.id,
            path = %config.path,
            upstream = %config.upstream,
            "route published"
        );
        self.gateway.publish_route(
            &self.id,
            Route {
                path: config.path.clone(),
                upstream: config.upstream.clone(),
            },
        );
        Ok(())
    }

    fn stop(&self) -> Result<(), DriverError> {
        self.gateway.withdraw_route(&self.id);
        Ok(())
    }
}
