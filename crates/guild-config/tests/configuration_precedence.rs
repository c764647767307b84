//! Behaviour tests covering how configuration layers override each other.

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use guild_config::{Config, SocketEndpoint, default_admin_socket};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct Harness {
    _env_guard: MutexGuard<'static, ()>,
    temp_dir: TempDir,
    cli_args: RefCell<Vec<OsString>>,
    env_overrides: RefCell<Vec<(String, Option<OsString>)>>,
    loaded: RefCell<Option<Config>>,
    error: RefCell<Option<String>>,
}

impl Harness {
    fn new() -> Self {
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(error) => panic!("failed to create temporary directory: {error}"),
        };
        Self {
            _env_guard: ENV_MUTEX.lock().unwrap_or_else(PoisonError::into_inner),
            temp_dir,
            cli_args: RefCell::new(vec![OsString::from("guild")]),
            env_overrides: RefCell::new(Vec::new()),
            loaded: RefCell::new(None),
            error: RefCell::new(None),
        }
    }

    fn write_config(&self, handoff_secs: u64) {
        let path = self.temp_dir.path().join("guild.toml");
        let toml = format!(
            "handoff_timeout_secs = {handoff_secs}\n\
             admin_socket = {{ transport = \"tcp\", host = \"127.0.0.1\", port = 9911 }}\n"
        );
        if let Err(error) = fs::write(&path, toml) {
            panic!("failed to write configuration: {error}");
        }
        let mut args = self.cli_args.borrow_mut();
        args.push(OsString::from("--config-path"));
        args.push(path.into_os_string());
    }

    fn set_env(&self, key: &str, value: &str) {
        let previous = std::env::var_os(key);
        // Environment mutation is unsafe on edition 2024; `Drop` restores it.
        unsafe { std::env::set_var(key, value) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_owned(), previous));
    }

    fn push_cli_arg(&self, arg: impl Into<OsString>) {
        self.cli_args.borrow_mut().push(arg.into());
    }

    fn load(&self) {
        if self.loaded.borrow().is_some() || self.error.borrow().is_some() {
            return;
        }
        let args = self.cli_args.borrow().clone();
        match Config::load_from_iter(args) {
            Ok(config) => *self.loaded.borrow_mut() = Some(config),
            Err(error) => *self.error.borrow_mut() = Some(error.to_string()),
        }
    }

    fn config(&self) -> Config {
        self.load();
        match self.loaded.borrow().as_ref() {
            Some(config) => config.clone(),
            None => panic!(
                "configuration failed to load: {:?}",
                self.error.borrow().as_deref()
            ),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        for (key, previous) in self.env_overrides.borrow_mut().drain(..).rev() {
            match previous {
                Some(value) => unsafe { std::env::set_var(&key, value) },
                None => unsafe { std::env::remove_var(&key) },
            }
        }
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("a configuration file setting the handoff timeout to {secs}")]
fn given_file(harness: &Harness, secs: u64) {
    harness.write_config(secs);
}

#[given("the environment sets the handoff timeout to {secs}")]
fn given_env(harness: &Harness, secs: u64) {
    harness.set_env("GUILD_HANDOFF_TIMEOUT_SECS", &secs.to_string());
}

#[given("the command line sets the handoff timeout to {secs}")]
fn given_cli(harness: &Harness, secs: u64) {
    harness.push_cli_arg("--handoff-timeout-secs");
    harness.push_cli_arg(secs.to_string());
}

#[when("the configuration is loaded")]
fn when_loaded(harness: &Harness) {
    harness.load();
}

#[then("the handoff timeout is {secs}")]
fn then_timeout(harness: &Harness, secs: u64) {
    assert_eq!(harness.config().handoff_timeout_secs, secs);
}

#[then("the admin socket is {endpoint}")]
fn then_admin_socket(harness: &Harness, endpoint: String) {
    let expected: SocketEndpoint = match endpoint.trim_matches('"') {
        "default" => default_admin_socket(),
        other => other.parse().unwrap_or_else(|error| panic!("bad endpoint: {error}")),
    };
    assert_eq!(harness.config().admin_socket, expected);
}

#[scenario(path = "tests/features/configuration_precedence.feature", name = "Defaults apply without overrides")]
fn defaults_apply(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(path = "tests/features/configuration_precedence.feature", name = "Configuration files override defaults")]
fn files_override_defaults(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(path = "tests/features/configuration_precedence.feature", name = "Environment overrides configuration files")]
fn environment_overrides_files(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(path = "tests/features/configuration_precedence.feature", name = "Command line overrides every other layer")]
fn command_line_wins(#[from(harness)] harness: Harness) {
    let _ = harness;
}
