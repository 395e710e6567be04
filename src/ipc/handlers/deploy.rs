use crate::deploy;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Build the static-page snapshot from the workspace and write it to
/// `deploy/routine_data.json`. An open editor session is flushed first so
/// the snapshot never trails unsaved edits.
fn handle_static_page(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(workspace), Some(conn)) = (state.workspace.as_ref(), state.db.as_ref()) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Some(session) = state.editor.as_mut() {
        if session.scheduler.is_dirty() {
            let rows = session.grid.flatten();
            if let Err(e) = crate::store::replace_class_routine(
                conn,
                session.grid.class_id(),
                &rows,
                session.room_no.as_deref(),
            ) {
                return err(&req.id, "save_failed", e.to_string(), None);
            }
            session.scheduler.flush();
        }
    }

    let snapshot = match deploy::build_snapshot(conn) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "deploy_failed", e.to_string(), None),
    };
    match deploy::write_snapshot(workspace, &snapshot) {
        Ok(path) => ok(
            &req.id,
            json!({
                "path": path.to_string_lossy(),
                "classCount": snapshot
                    .get("classes")
                    .and_then(|c| c.as_array())
                    .map(|c| c.len())
                    .unwrap_or(0),
            }),
        ),
        Err(e) => err(&req.id, "deploy_failed", e.to_string(), None),
    }
}

fn handle_status(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let modified = deploy::snapshot_modified(workspace);
    ok(
        &req.id,
        json!({
            "deployed": modified.is_some(),
            "path": deploy::snapshot_path(workspace).to_string_lossy(),
            "modified": modified,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    Some(match req.method.as_str() {
        "deploy.staticPage" => handle_static_page(state, req),
        "deploy.status" => handle_status(state, req),
        _ => return None,
    })
}
