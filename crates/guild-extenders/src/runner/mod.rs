//! Parent-side half of the introspection protocol.
//!
//! [`ProcessHelperExecutor`] runs the helper as a child process with a hard
//! time bound. [`Introspector`] wraps any executor and turns every failure
//! into an empty answer so a broken bundle never blocks the caller.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::ExtenderError;
use crate::id::ExtenderId;
use crate::protocol::{self, ExtendsBasicInfo, ExtendsInfo, ExtendsRequest, ExtendsResponse};

const RUNNER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::runner");
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Executes one introspection exchange.
#[cfg_attr(test, mockall::automock)]
pub trait HelperExecutor {
    /// Sends `request` to a helper and returns its answer.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtenderError`] when the helper cannot be run, times out,
    /// fails, or answers with malformed output.
    fn execute(&self, request: &ExtendsRequest) -> Result<ExtendsResponse, ExtenderError>;
}

/// Runs the helper binary as a child process.
#[derive(Debug, Clone)]
pub struct ProcessHelperExecutor {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessHelperExecutor {
    /// Creates an executor for `program` bounded by `timeout`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    /// Appends arguments passed to every helper invocation.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn helper_error(&self, source: std::io::Error) -> ExtenderError {
        ExtenderError::Helper {
            program: self.program.clone(),
            source: Arc::new(source),
        }
    }

    fn wait_bounded(&self, child: &mut Child) -> Result<i32, ExtenderError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait().map_err(|error| self.helper_error(error))? {
                return Ok(status.code().unwrap_or(-1));
            }
            if Instant::now() >= deadline {
                child.kill().ok();
                child.wait().ok();
                return Err(ExtenderError::Timeout {
                    timeout_ms: self.timeout.as_millis(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl HelperExecutor for ProcessHelperExecutor {
    fn execute(&self, request: &ExtendsRequest) -> Result<ExtendsResponse, ExtenderError> {
        debug!(
            target: RUNNER_TARGET,
            program = %self.program.display(),
            bundles = request.extends.len(),
            "spawning helper"
        );
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|error| self.helper_error(error))?;

        let reader = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut bytes = Vec::new();
                stdout.read_to_end(&mut bytes).map(|_| bytes)
            })
        });

        // The deadline also covers a helper that never drains its stdin.
        if let Some(mut stdin) = child.stdin.take() {
            let payload = protocol::encode_request(request);
            thread::spawn(move || {
                // Early exits are reported through the exit status.
                if let Err(error) = stdin.write_all(&payload) {
                    debug!(target: RUNNER_TARGET, %error, "helper closed stdin early");
                }
            });
        }

        let status = self.wait_bounded(&mut child)?;
        let output = match reader.map(thread::JoinHandle::join) {
            Some(Ok(Ok(bytes))) => bytes,
            Some(Ok(Err(error))) => return Err(self.helper_error(error)),
            Some(Err(_)) | None => {
                return Err(self.helper_error(std::io::Error::other(
                    "helper stdout reader failed",
                )));
            }
        };
        if status != 0 {
            return Err(ExtenderError::NonZeroExit { status });
        }
        protocol::decode_response(&output)
    }
}

/// Resolves bundle ids to their exported drivers through a helper.
#[derive(Debug, Clone)]
pub struct Introspector<E> {
    executor: E,
}

impl<E: HelperExecutor> Introspector<E> {
    /// Wraps `executor`.
    #[must_use]
    pub const fn new(executor: E) -> Self {
        Self { executor }
    }

    /// Returns introspection results for the loadable subset of `ids`.
    ///
    /// Any helper failure is logged and yields an empty list.
    #[must_use]
    pub fn introspect(&self, ids: &[ExtenderId]) -> Vec<ExtendsInfo> {
        if ids.is_empty() {
            return Vec::new();
        }
        let request = ExtendsRequest {
            extends: ids
                .iter()
                .map(|id| ExtendsBasicInfo {
                    group: id.group().to_owned(),
                    project: id.project().to_owned(),
                    version: id.version().to_owned(),
                })
                .collect(),
        };
        match self.executor.execute(&request) {
            Ok(response) => response.extends,
            Err(error) => {
                warn!(
                    target: RUNNER_TARGET,
                    %error,
                    kind = error.kind().as_str(),
                    "extender introspection failed"
                );
                Vec::new()
            }
        }
    }
}
