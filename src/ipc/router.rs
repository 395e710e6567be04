use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    let resp = dispatch(state, &req);
    // Debounced autosave: persist the open editor grid once its quiet
    // window has elapsed. Runs opportunistically after every request.
    handlers::editor::poll_autosave(state);
    resp
}

fn dispatch(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::catalog::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::timetable::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::routine::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::editor::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::deploy::try_handle(state, req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
