//! Connection handler for the admin socket.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::transport::{ConnectionHandler, ConnectionStream, read_request_line};

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::request::AdminRequest;
use super::response::ResponseWriter;
use super::service::AdminService;

/// Reads one admin request per connection and writes one response.
pub(crate) struct DispatchConnectionHandler {
    service: Arc<AdminService>,
}

impl DispatchConnectionHandler {
    pub(crate) fn new(service: Arc<AdminService>) -> Self {
        Self { service }
    }

    fn dispatch(&self, mut stream: ConnectionStream) {
        let line = match read_request_line(&mut stream) {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(target: DISPATCH_TARGET, "client disconnected without request");
                return;
            }
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "failed to read request");
                let written =
                    ResponseWriter::new(&mut stream).write_error(&DispatchError::Io(error));
                report_unwritten(written);
                return;
            }
        };

        let mut writer = ResponseWriter::new(&mut stream);
        let request = match AdminRequest::parse(&line) {
            Ok(request) => request,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "malformed request");
                report_unwritten(writer.write_error(&error));
                return;
            }
        };

        let command = request.name();
        debug!(target: DISPATCH_TARGET, command, "dispatching request");
        let written = match self.service.execute(request) {
            Ok(data) => writer.write_ok(data),
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    %error,
                    command,
                    kind = error.kind(),
                    "command failed"
                );
                writer.write_error(&error)
            }
        };
        report_unwritten(written);
    }
}

fn report_unwritten(written: Result<(), DispatchError>) {
    if let Err(error) = written {
        warn!(target: DISPATCH_TARGET, %error, "failed to write response");
    }
}

impl ConnectionHandler for DispatchConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        self.dispatch(stream);
    }
}
