//! Bundle operations reachable from the admin surface.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use guild_config::Config;
use guild_extenders::{
    Bundle, ExtenderError, ExtenderId, ExtendsInfo, HttpBundleSource, Introspector, ProcessHelperExecutor,
    Repository,
};

use super::DISPATCH_TARGET;
use super::errors::DispatchError;

/// Overrides the helper binary location.
pub(crate) const HELPER_BIN_ENV_VAR: &str = "GUILD_HELPER_BIN";
const HELPER_BIN_NAME: &str = "guild-helper";

/// Bundle introspection and installation.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait ExtenderService: Send + Sync {
    /// Drivers exported by every loadable installed bundle.
    fn introspect(&self) -> Result<Vec<ExtendsInfo>, DispatchError>;

    /// Downloads, verifies, and unpacks a bundle.
    fn install(&self, id: &ExtenderId) -> Result<Bundle, DispatchError>;
}

/// Works against the local bundle repository and the configured index.
#[derive(Debug)]
pub(crate) struct LocalExtenders {
    repository: Repository,
    helper: PathBuf,
    helper_timeout: Duration,
    index: Option<HttpBundleSource>,
}

impl LocalExtenders {
    pub(crate) fn from_config(config: &Config) -> Result<Self, ExtenderError> {
        let index = config
            .extender_index()
            .map(|url| HttpBundleSource::new(url.clone()))
            .transpose()?;
        Ok(Self {
            repository: Repository::new(config.extender_repository()),
            helper: helper_program(),
            helper_timeout: config.helper_timeout(),
            index,
        })
    }
}

impl ExtenderService for LocalExtenders {
    fn introspect(&self) -> Result<Vec<ExtendsInfo>, DispatchError> {
        let installed = self.repository.installed()?;
        let executor = ProcessHelperExecutor::new(&self.helper, self.helper_timeout).with_args([
            String::from("--extender-repository"),
            self.repository.root().to_string(),
        ]);
        Ok(Introspector::new(executor).introspect(&installed))
    }

    fn install(&self, id: &ExtenderId) -> Result<Bundle, DispatchError> {
        let Some(index) = &self.index else {
            return Err(DispatchError::unavailable(
                "no extender index is configured",
            ));
        };
        let bundle = self.repository.install(index, id)?;
        info!(
            target: DISPATCH_TARGET,
            id = %bundle.id,
            path = %bundle.path,
            drivers = bundle.manifest.drivers.len(),
            "extender installed"
        );
        Ok(bundle)
    }
}

fn helper_program() -> PathBuf {
    if let Some(program) = env::var_os(HELPER_BIN_ENV_VAR) {
        return PathBuf::from(program);
    }
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(HELPER_BIN_NAME)))
        .unwrap_or_else(|| PathBuf::from(HELPER_BIN_NAME))
}
