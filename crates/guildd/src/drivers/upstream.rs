//! `upstream` profession: static node pools.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use guild_workers::{ConfigSchema, Driver, DriverConfig, DriverError, Requires, Worker, WorkerId};

use super::{DRIVERS_TARGET, Gateway};

/// Profession name.
pub const UPSTREAM_PROFESSION: &str = "upstream";
/// Driver name.
pub const STATIC_DRIVER: &str = "static";
/// Capability reported by upstream workers.
pub const UPSTREAM_SKILL: &str = "upstream";

/// Configuration of a `static` upstream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticConfig {
    /// `host:port` nodes served in turn.
    pub nodes: Vec<String>,
}

impl StaticConfig {
    fn validate(&self) -> Result<(), DriverError> {
        if self.nodes.is_empty() {
            return Err(DriverError::new("an upstream needs at least one node"));
        }
        if let Some(node) = self.nodes.iter().find(|node| node.trim().is_empty()) {
            return Err(DriverError::new(format!("invalid node '{node}'")));
        }
        Ok(())
    }
}

pub(super) struct StaticDriver {
    gateway: Arc<Gateway>,
    schema: ConfigSchema,
}

impl StaticDriver {
    pub(super) fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            schema: ConfigSchema::new(json!({
                "title": "StaticConfig",
                "type": "object",
                "properties": {
                    "nodes": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["nodes"]
            })),
        }
    }
}

impl Driver for StaticDriver {
    fn name(&self) -> &str {
        STATIC_DRIVER
    }

    fn title(&self) -> &str {
        "Static upstream"
    }

    fn schema(&self) -> &ConfigSchema {
        &self.schema
    }

    fn decode(&self, body: &Value) -> Result<DriverConfig, DriverError> {
        DriverConfig::decode::<StaticConfig>(body)
    }

    fn create(
        &self,
        id: &WorkerId,
        config: &DriverConfig,
        requires: &Requires,
    ) -> Result<Arc<dyn Worker>, DriverError> {
        let worker = StaticUpstream {
            id: id.to_string(),
            gateway: Arc::clone(&self.gateway),
        };
        worker.reset(config, requires)?;
        Ok(Arc::new(worker))
    }
}

struct StaticUpstream {
    id: String,
    gateway: Arc<Gateway>,
}

impl Worker for StaticUpstream {
    fn reset(&self, config: &DriverConfig, _requires: &Requires) -> Result<(), DriverError> {
        let config = config.expect_type::<StaticConfig>()?;
        config.validate()?;
        debug!(target: DRIVERS_TARGET, id = %self.id, nodes = config.nodes.len(), "upstream published");
        self.gateway.publish_pool(&self.id, config.nodes.clone());
        Ok(())
    }

    fn stop(&self) -> Result<(), DriverError> {
        self.gateway.withdraw_pool(&self.id);
        Ok(())
    }

    fn check_skill(&self, skill: &str) -> bool {
        skill == UPSTREAM_SKILL
    }
}
