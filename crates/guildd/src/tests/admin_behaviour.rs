//! Behavioural tests for the admin surface over a live socket.

use std::cell::RefCell;
use std::sync::Arc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};

use guild_workers::Workers;

use crate::bootstrap::ConfigLoader;
use crate::dispatch::{AdminService, DispatchConnectionHandler, LocalExtenders};
use crate::drivers::{Gateway, builtin_professions};
use crate::transport::{ListenerHandle, SocketListener};

use super::support::{TestConfigLoader, admin_request};

type StepResult = Result<(), String>;

struct AdminWorld {
    loader: TestConfigLoader,
    listener: Option<ListenerHandle>,
    response: Option<Value>,
}

impl AdminWorld {
    fn send(&mut self, request: &Value) -> StepResult {
        let response = admin_request(&self.loader.admin_path(), &request.to_string())?;
        self.response = Some(response);
        Ok(())
    }

    fn response(&self) -> &Value {
        self.response.as_ref().expect("admin response recorded")
    }
}

impl Drop for AdminWorld {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.shutdown();
            listener.join().ok();
        }
    }
}

#[fixture]
fn world() -> RefCell<AdminWorld> {
    RefCell::new(AdminWorld {
        loader: TestConfigLoader::new(),
        listener: None,
        response: None,
    })
}

fn unquote(value: &str) -> &str {
    value.trim_matches('"')
}

#[given("an admin surface over the built-in catalog")]
fn given_admin_surface(world: &RefCell<AdminWorld>) -> StepResult {
    let mut world = world.borrow_mut();
    let config = world.loader.load().map_err(|error| error.to_string())?;
    let gateway = Arc::new(Gateway::new());
    let professions = builtin_professions(&gateway).map_err(|error| error.to_string())?;
    let workers = Arc::new(Workers::new(Arc::new(professions)));
    let extenders = LocalExtenders::from_config(&config).map_err(|error| error.to_string())?;
    let service = AdminService::new(
        workers,
        config.worker_store().as_std_path(),
        Box::new(extenders),
    );
    let listener =
        SocketListener::bind(config.admin_socket()).map_err(|error| error.to_string())?;
    let handle = listener
        .start(Arc::new(DispatchConnectionHandler::new(Arc::new(service))))
        .map_err(|error| error.to_string())?;
    world.listener = Some(handle);
    Ok(())
}

#[when("the operator defines variable {name} as {value}")]
fn when_define_variable(world: &RefCell<AdminWorld>, name: String, value: String) -> StepResult {
    let mut assignments = serde_json::Map::new();
    assignments.insert(unquote(&name).to_owned(), Value::from(unquote(&value)));
    world.borrow_mut().send(&json!({
        "command": "variables",
        "set": assignments,
    }))
}

#[when("the operator sets upstream worker {name} with node {node}")]
fn when_set_upstream(world: &RefCell<AdminWorld>, name: String, node: String) -> StepResult {
    let body = json!({ "nodes": [unquote(&node)] }).to_string();
    world.borrow_mut().send(&json!({
        "command": "set",
        "profession": "upstream",
        "name": unquote(&name),
        "driver": "static",
        "body": body,
    }))
}

#[when("the operator routes {path} through {upstream} as {name}")]
fn when_set_router(
    world: &RefCell<AdminWorld>,
    path: String,
    upstream: String,
    name: String,
) -> StepResult {
    world.borrow_mut().send(&json!({
        "command": "set",
        "profession": "router",
        "name": unquote(&name),
        "driver": "http",
        "body": { "upstream": unquote(&upstream), "path": unquote(&path) },
    }))
}

#[when("the operator deletes upstream worker {name}")]
fn when_delete_upstream(world: &RefCell<AdminWorld>, name: String) -> StepResult {
    world.borrow_mut().send(&json!({
        "command": "delete",
        "profession": "upstream",
        "name": unquote(&name),
    }))
}

#[when("the operator installs {id}")]
fn when_install(world: &RefCell<AdminWorld>, id: String) -> StepResult {
    world.borrow_mut().send(&json!({
        "command": "install",
        "id": unquote(&id),
    }))
}

#[when("the operator sends {line}")]
fn when_send_raw(world: &RefCell<AdminWorld>, line: String) -> StepResult {
    let mut world = world.borrow_mut();
    let response = admin_request(&world.loader.admin_path(), unquote(&line))?;
    world.response = Some(response);
    Ok(())
}

#[then("the reply status is {status}")]
fn then_status(world: &RefCell<AdminWorld>, status: String) {
    let world = world.borrow();
    assert_eq!(world.response()["status"], unquote(&status), "{}", world.response());
}

#[then("the reply is an error of kind {kind}")]
fn then_error_kind(world: &RefCell<AdminWorld>, kind: String) {
    let world = world.borrow();
    let response = world.response();
    assert_eq!(response["status"], "error", "{response}");
    assert_eq!(response["kind"], unquote(&kind), "{response}");
}

#[then("the affected workers are {ids}")]
fn then_affected(world: &RefCell<AdminWorld>, ids: String) {
    let world = world.borrow();
    let expected: Vec<&str> = unquote(&ids).split(',').map(str::trim).collect();
    assert_eq!(world.response()["data"]["affected"], json!(expected));
}

#[scenario(
    path = "tests/features/admin.feature",
    name = "Variable changes report the workers that use them"
)]
fn variable_changes(#[from(world)] _: RefCell<AdminWorld>) {}

#[scenario(
    path = "tests/features/admin.feature",
    name = "Deleting a routed upstream is a conflict"
)]
fn routed_delete(#[from(world)] _: RefCell<AdminWorld>) {}

#[scenario(
    path = "tests/features/admin.feature",
    name = "Installing without an index is unavailable"
)]
fn install_without_index(#[from(world)] _: RefCell<AdminWorld>) {}

#[scenario(
    path = "tests/features/admin.feature",
    name = "Malformed requests are validation errors"
)]
fn malformed_request(#[from(world)] _: RefCell<AdminWorld>) {}
