use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn p_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

fn p_opt(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn p_i64(req: &Request, key: &str) -> Option<i64> {
    req.params.get(key).and_then(|v| v.as_i64())
}

fn handle_days_list(conn: &Connection, req: &Request) -> serde_json::Value {
    let mut stmt = match conn.prepare("SELECT id, name, sort_order FROM days ORDER BY sort_order")
    {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "sortOrder": row.get::<_, i64>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(v) => ok(&req.id, json!({ "days": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_days_create(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(name) = p_str(req, "name") else {
        return err(&req.id, "bad_params", "missing name", None);
    };
    let Some(sort_order) = p_i64(req, "sortOrder") else {
        return err(&req.id, "bad_params", "missing sortOrder", None);
    };
    let id = Uuid::new_v4().to_string();
    match conn.execute(
        "INSERT INTO days(id, name, sort_order) VALUES(?, ?, ?)",
        (&id, name, sort_order),
    ) {
        Ok(_) => ok(&req.id, json!({ "id": id })),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("UNIQUE") {
                err(&req.id, "conflict", msg, None)
            } else {
                err(&req.id, "db_insert_failed", msg, None)
            }
        }
    }
}

fn handle_days_update(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(id) = p_str(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    let res = conn.execute(
        "UPDATE days SET
            name = COALESCE(?2, name),
            sort_order = COALESCE(?3, sort_order)
         WHERE id = ?1",
        (id, p_opt(req, "name"), p_i64(req, "sortOrder")),
    );
    match res {
        Ok(0) => err(&req.id, "not_found", "day not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("UNIQUE") {
                err(&req.id, "conflict", msg, None)
            } else {
                err(&req.id, "db_update_failed", msg, None)
            }
        }
    }
}

fn handle_days_delete(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(id) = p_str(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    match store::routine_references(conn, "day_id", id) {
        Ok(0) => {}
        Ok(n) => {
            return err(
                &req.id,
                "in_use",
                "day is referenced by routine entries",
                Some(json!({ "entryCount": n })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    match conn.execute("DELETE FROM days WHERE id = ?", [id]) {
        Ok(0) => err(&req.id, "not_found", "day not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_periods_list(conn: &Connection, req: &Request) -> serde_json::Value {
    let mut stmt = match conn.prepare(
        "SELECT id, name, start_time, end_time, sort_order FROM periods ORDER BY sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "startTime": row.get::<_, String>(2)?,
                "endTime": row.get::<_, String>(3)?,
                "sortOrder": row.get::<_, i64>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(v) => ok(&req.id, json!({ "periods": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_periods_create(conn: &Connection, req: &Request) -> serde_json::Value {
    let (Some(name), Some(start), Some(end)) = (
        p_str(req, "name"),
        p_str(req, "startTime"),
        p_str(req, "endTime"),
    ) else {
        return err(&req.id, "bad_params", "missing name/startTime/endTime", None);
    };
    let Some(sort_order) = p_i64(req, "sortOrder") else {
        return err(&req.id, "bad_params", "missing sortOrder", None);
    };
    let id = Uuid::new_v4().to_string();
    match conn.execute(
        "INSERT INTO periods(id, name, start_time, end_time, sort_order)
         VALUES(?, ?, ?, ?, ?)",
        (&id, name, start, end, sort_order),
    ) {
        Ok(_) => ok(&req.id, json!({ "id": id })),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("UNIQUE") {
                err(&req.id, "conflict", msg, None)
            } else {
                err(&req.id, "db_insert_failed", msg, None)
            }
        }
    }
}

fn handle_periods_update(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(id) = p_str(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    let res = conn.execute(
        "UPDATE periods SET
            name = COALESCE(?2, name),
            start_time = COALESCE(?3, start_time),
            end_time = COALESCE(?4, end_time),
            sort_order = COALESCE(?5, sort_order)
         WHERE id = ?1",
        (
            id,
            p_opt(req, "name"),
            p_opt(req, "startTime"),
            p_opt(req, "endTime"),
            p_i64(req, "sortOrder"),
        ),
    );
    match res {
        Ok(0) => err(&req.id, "not_found", "period not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_periods_delete(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(id) = p_str(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    match store::routine_references(conn, "period_id", id) {
        Ok(0) => {}
        Ok(n) => {
            return err(
                &req.id,
                "in_use",
                "period is referenced by routine entries",
                Some(json!({ "entryCount": n })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    match conn.execute("DELETE FROM periods WHERE id = ?", [id]) {
        Ok(0) => err(&req.id, "not_found", "period not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let needs_db = matches!(
        req.method.as_str(),
        "days.list"
            | "days.create"
            | "days.update"
            | "days.delete"
            | "periods.list"
            | "periods.create"
            | "periods.update"
            | "periods.delete"
    );
    if !needs_db {
        return None;
    }
    let Some(conn) = state.db.as_ref() else {
        return Some(err(&req.id, "no_workspace", "select a workspace first", None));
    };

    Some(match req.method.as_str() {
        "days.list" => handle_days_list(conn, req),
        "days.create" => handle_days_create(conn, req),
        "days.update" => handle_days_update(conn, req),
        "days.delete" => handle_days_delete(conn, req),
        "periods.list" => handle_periods_list(conn, req),
        "periods.create" => handle_periods_create(conn, req),
        "periods.update" => handle_periods_update(conn, req),
        "periods.delete" => handle_periods_delete(conn, req),
        _ => unreachable!(),
    })
}
