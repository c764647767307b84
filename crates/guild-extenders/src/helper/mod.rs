//! Helper-side half of the introspection protocol.
//!
//! The helper runs in its own process so a misbehaving bundle cannot take
//! the supervisor down. It reads one request, loads each bundle from the
//! repository, and answers with the drivers of every bundle that loaded.

use std::io::{Read, Write};

use tracing::warn;

use crate::error::ExtenderError;
use crate::id::ExtenderId;
use crate::protocol::{self, ExtendsInfo, ExtendsResponse, Plugin};
use crate::repository::{Bundle, Repository};

const HELPER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::helper");

/// Serves one introspection exchange over `input` and `output`.
///
/// Bundles that fail to load are logged and omitted from the response.
///
/// # Errors
///
/// Returns [`ExtenderError::Decode`] for a malformed request and
/// [`ExtenderError::Helper`] when the streams fail.
pub fn run_helper(
    mut input: impl Read,
    mut output: impl Write,
    repository: &Repository,
) -> Result<ExtendsResponse, ExtenderError> {
    let mut bytes = Vec::new();
    input
        .read_to_end(&mut bytes)
        .map_err(|error| stream_error("stdin", error))?;
    let request = protocol::decode_request(&bytes)?;

    let extends = request
        .extends
        .iter()
        .filter_map(|basic| {
            let loaded = ExtenderId::new(&basic.group, &basic.project, &basic.version)
                .and_then(|id| repository.read_bundle(&id));
            match loaded {
                Ok(bundle) => Some(describe(&bundle)),
                Err(error) => {
                    warn!(
                        target: HELPER_TARGET,
                        group = %basic.group,
                        project = %basic.project,
                        version = %basic.version,
                        %error,
                        "skipping extender"
                    );
                    None
                }
            }
        })
        .collect();
    let response = ExtendsResponse { extends };

    output
        .write_all(&protocol::encode_response(&response))
        .and_then(|()| output.flush())
        .map_err(|error| stream_error("stdout", error))?;
    Ok(response)
}

/// Describes a loaded bundle in wire form.
#[must_use]
pub fn describe(bundle: &Bundle) -> ExtendsInfo {
    let id = &bundle.id;
    ExtendsInfo {
        id: id.to_string(),
        name: id.name(),
        group: id.group().to_owned(),
        project: id.project().to_owned(),
        version: id.version().to_owned(),
        plugins: bundle
            .manifest
            .drivers
            .iter()
            .map(|driver| Plugin {
                id: id.driver_id(&driver.name),
                name: driver.display_name().to_owned(),
                group: id.group().to_owned(),
                project: id.project().to_owned(),
            })
            .collect(),
    }
}

fn stream_error(stream: &str, source: std::io::Error) -> ExtenderError {
    ExtenderError::Helper {
        program: stream.into(),
        source: std::sync::Arc::new(source),
    }
}
