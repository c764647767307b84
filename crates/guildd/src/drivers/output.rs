//! `output` profession: the access log sink.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};

use guild_workers::{ConfigSchema, Driver, DriverConfig, DriverError, Requires, Worker, WorkerId};

use super::Gateway;

/// Profession name.
pub const OUTPUT_PROFESSION: &str = "output";
/// Driver name, which is also the singleton worker's name.
pub const STDOUT_DRIVER: &str = "stdout";

const fn enabled_by_default() -> bool {
    true
}

/// Configuration of the `stdout` sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdoutConfig {
    /// Whether access lines are written.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

pub(super) struct StdoutDriver {
    gateway: Arc<Gateway>,
    schema: ConfigSchema,
}

impl StdoutDriver {
    pub(super) fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            schema: ConfigSchema::new(json!({
                "title": "StdoutConfig",
                "type": "object",
                "properties": { "enabled": { "type": "boolean" } }
            })),
        }
    }
}

impl Driver for StdoutDriver {
    fn name(&self) -> &str {
        STDOUT_DRIVER
    }

    fn title(&self) -> &str {
        "Standard output access log"
    }

    fn schema(&self) -> &ConfigSchema {
        &self.schema
    }

    fn decode(&self, body: &Value) -> Result<DriverConfig, DriverError> {
        DriverConfig::decode::<StdoutConfig>(body)
    }

    fn create(
        &self,
        _id: &WorkerId,
        config: &DriverConfig,
        requires: &Requires,
    ) -> Result<Arc<dyn Worker>, DriverError> {
        let worker = StdoutSink {
            gateway: Arc::clone(&self.gateway),
        };
        worker.reset(config, requires)?;
        Ok(Arc::new(worker))
    }
}

struct StdoutSink {
    gateway: Arc<Gateway>,
}

impl Worker for StdoutSink {
    fn reset(&self, config: &DriverConfig, _requires: &Requires) -> Result<(), DriverError> {
        let config = config.expect_type::<StdoutConfig>()?;
        self.gateway.set_access_log(config.enabled);
        Ok(())
    }

    fn stop(&self) -> Result<(), DriverError> {
        self.gateway.set_access_log(false);
        Ok(())
    }
}
