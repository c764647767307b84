//! Service listener handler.
//!
//! Answers each HTTP request line with the route the gateway chose: the
//! router worker and the upstream node. Requests no router claims get a 404.
//! When the `output` worker enables it, an access line is printed to stdout.

use std::io::{self, Write};
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::drivers::Gateway;
use crate::transport::{ConnectionHandler, ConnectionStream, read_request_line};

const SERVICE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service");

/// Routes service connections through the gateway.
pub(crate) struct ServiceConnectionHandler {
    gateway: Arc<Gateway>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    BadRequest,
    NotFound,
}

impl Status {
    const fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
        }
    }

    const fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
        }
    }
}

impl ServiceConnectionHandler {
    pub(crate) fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    fn serve(&self, mut stream: ConnectionStream) {
        let line = match read_request_line(&mut stream) {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(error) => {
                debug!(target: SERVICE_TARGET, %error, "failed to read request line");
                return;
            }
        };
        let text = String::from_utf8_lossy(&line);
        let mut parts = text.split_whitespace();
        let method = parts.next().unwrap_or_default();
        let path = parts.next().unwrap_or_default();

        let (status, body) = self.route(path);
        if let Err(error) = write_response(&mut stream, status, &body) {
            warn!(target: SERVICE_TARGET, %error, "failed to write response");
        }
        if self.gateway.access_log_enabled()
            && let Err(error) = writeln!(io::stdout().lock(), "{method} {path} {}", status.code())
        {
            warn!(target: SERVICE_TARGET, %error, "failed to write access line");
        }
    }

    fn route(&self, path: &str) -> (Status, String) {
        if !path.starts_with('/') {
            return (
                Status::BadRequest,
                json!({ "error": "malformed request line" }).to_string(),
            );
        }
        match self.gateway.resolve(path) {
            Some(resolution) => (
                Status::Ok,
                json!({ "router": resolution.router, "node": resolution.node }).to_string(),
            ),
            None => (
                Status::NotFound,
                json!({ "error": format!("no route for {path}") }).to_string(),
            ),
        }
    }
}

impl ConnectionHandler for ServiceConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        self.serve(stream);
    }
}

fn write_response(stream: &mut impl Write, status: Status, body: &str) -> io::Result<()> {
    write!(
        stream,
        "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        status.code(),
        status.reason(),
        body.len()
    )?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use guild_workers::{WorkerSpec, Workers};

    use super::*;
    use crate::drivers::{
        HTTP_DRIVER, ROUTER_PROFESSION, STATIC_DRIVER, UPSTREAM_PROFESSION, builtin_professions,
    };

    struct Harness {
        handler: ServiceConnectionHandler,
        _workers: Workers,
    }

    #[fixture]
    fn harness() -> Harness {
        let gateway = Arc::new(Gateway::new());
        let workers = Workers::new(Arc::new(builtin_professions(&gateway).expect("catalog")));
        workers
            .set(&WorkerSpec::new(
                UPSTREAM_PROFESSION,
                "pool",
                STATIC_DRIVER,
                json!({ "nodes": ["10.0.0.1:80"] }).to_string(),
            ))
            .expect("upstream");
        workers
            .set(&WorkerSpec::new(
                ROUTER_PROFESSION,
                "api",
                HTTP_DRIVER,
                json!({ "upstream": "pool@upstream", "path": "/api" }).to_string(),
            ))
            .expect("router");
        Harness {
            handler: ServiceConnectionHandler::new(gateway),
            _workers: workers,
        }
    }

    #[rstest]
    #[case::routed("/api/users", Status::Ok, "10.0.0.1:80")]
    #[case::unrouted("/static/app.js", Status::NotFound, "no route")]
    #[case::missing_path("", Status::BadRequest, "malformed")]
    fn routes_request_paths(
        harness: Harness,
        #[case] path: &str,
        #[case] status: Status,
        #[case] fragment: &str,
    ) {
        let (actual, body) = harness.handler.route(path);
        assert_eq!(actual, status);
        assert!(body.contains(fragment), "body {body} lacks {fragment}");
    }

    #[test]
    fn responses_are_framed_with_content_length() {
        let mut buffer = Vec::new();
        write_response(&mut buffer, Status::NotFound, "{}").expect("write");
        let text = String::from_utf8(buffer).expect("utf-8");
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("content-length: 2\r\n"));
        assert!(text.ends_with("\r\n\r\n{}"));
    }
}
