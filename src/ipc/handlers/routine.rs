use crate::grid::RoutineRow;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::Connection;
use serde_json::json;
use std::collections::BTreeMap;

fn p_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

fn handle_save(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(class_id) = p_str(req, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };
    let Some(entries) = req.params.get("entries") else {
        return err(&req.id, "bad_params", "missing entries[]", None);
    };
    let rows: Vec<RoutineRow> = match serde_json::from_value(entries.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("bad entries: {e}"), None),
    };
    match store::replace_class_routine(conn, class_id, &rows, p_str(req, "roomNo")) {
        Ok(n) => ok(&req.id, json!({ "saved": n })),
        Err(e) => err(&req.id, "save_failed", e.to_string(), None),
    }
}

fn handle_get_by_class(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(class_id) = p_str(req, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };
    match store::class_routine_rows(conn, class_id) {
        Ok(rows) => match serde_json::to_value(&rows) {
            Ok(v) => ok(&req.id, json!({ "entries": v })),
            Err(e) => err(&req.id, "encode_failed", e.to_string(), None),
        },
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_get_all(conn: &Connection, req: &Request) -> serde_json::Value {
    let rows = match store::all_routine_rows(conn) {
        Ok(rows) => rows,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut by_class: BTreeMap<String, Vec<RoutineRow>> = BTreeMap::new();
    for (class_id, row) in rows {
        by_class.entry(class_id).or_default().push(row);
    }
    match serde_json::to_value(&by_class) {
        Ok(v) => ok(&req.id, json!({ "routines": v })),
        Err(e) => err(&req.id, "encode_failed", e.to_string(), None),
    }
}

fn handle_delete(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(class_id) = p_str(req, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };
    match store::delete_class_routine(conn, class_id) {
        Ok(n) => ok(&req.id, json!({ "deleted": n })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_check_teacher_conflict(conn: &Connection, req: &Request) -> serde_json::Value {
    let (Some(teacher_id), Some(day_id)) = (p_str(req, "teacherId"), p_str(req, "dayId")) else {
        return err(&req.id, "bad_params", "missing teacherId/dayId", None);
    };
    let Some(period_ids) = req.params.get("periodIds").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing periodIds[]", None);
    };
    let period_ids: Vec<String> = period_ids
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.to_string())
        .collect();

    match store::teacher_conflicts(
        conn,
        teacher_id,
        day_id,
        &period_ids,
        p_str(req, "excludeClassId"),
    ) {
        Ok(hits) => {
            let conflicts: Vec<_> = hits
                .iter()
                .map(|h| {
                    json!({
                        "class_name": h.class_name,
                        "subject_name": h.subject_name,
                        "period_order": h.period_order,
                    })
                })
                .collect();
            ok(
                &req.id,
                json!({
                    "has_conflict": !conflicts.is_empty(),
                    "conflicts": conflicts,
                }),
            )
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let needs_db = matches!(
        req.method.as_str(),
        "routine.save"
            | "routine.getByClass"
            | "routine.getAll"
            | "routine.delete"
            | "routine.checkTeacherConflict"
    );
    if !needs_db {
        return None;
    }
    if req.method == "routine.delete" {
        // An open editor for this class would resave the rows being deleted.
        let target = p_str(req, "classId");
        if let (Some(class_id), Some(session)) = (target, state.editor.as_ref()) {
            if session.grid.class_id() == class_id {
                state.editor = None;
            }
        }
    }
    let Some(conn) = state.db.as_ref() else {
        return Some(err(&req.id, "no_workspace", "select a workspace first", None));
    };

    Some(match req.method.as_str() {
        "routine.save" => handle_save(conn, req),
        "routine.getByClass" => handle_get_by_class(conn, req),
        "routine.getAll" => handle_get_all(conn, req),
        "routine.delete" => handle_delete(conn, req),
        "routine.checkTeacherConflict" => handle_check_teacher_conflict(conn, req),
        _ => unreachable!(),
    })
}
