//! The interactive routine-editor session: one class's grid held in memory,
//! mutated cell by cell, and persisted through the debounced scheduler.

use std::collections::HashMap;
use std::time::Instant;

use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::autosave::{SaveScheduler, AUTOSAVE_DELAY};
use crate::grid::{
    Assignment, GridError, LabSubject, MoveMode, PeriodSequence, PeriodSlot, RoutineGrid,
    SlotKey, SubjectRef, TeacherRef,
};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, EditorSession, Request};
use crate::store::{self, DbConflictLookup};

fn p_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

fn p_opt(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn p_usize(req: &Request, key: &str) -> Option<usize> {
    req.params
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
}

fn teacher_ref(v: &serde_json::Value) -> Option<TeacherRef> {
    let id = v.get("id")?.as_str()?;
    Some(TeacherRef {
        id: id.to_string(),
        name: v
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string(),
    })
}

fn teacher_list(v: Option<&serde_json::Value>) -> Vec<TeacherRef> {
    v.and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(teacher_ref).collect())
        .unwrap_or_default()
}

fn assignment_from_params(params: &serde_json::Value) -> Result<Assignment, String> {
    let subject_code = params
        .get("subjectId")
        .and_then(|v| v.as_str())
        .ok_or("missing subjectId")?;
    let subject = SubjectRef::from_wire(subject_code);
    let subject_name = params
        .get("subjectName")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| match &subject {
            SubjectRef::Break => "Break".to_string(),
            SubjectRef::LibraryConsultation => "Library Consultation".to_string(),
            SubjectRef::Subject(_) => String::new(),
        });
    Ok(Assignment {
        subject,
        subject_name,
        is_lab: params.get("isLab").and_then(|v| v.as_bool()).unwrap_or(false),
        is_half_lab: params
            .get("isHalfLab")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        span: params
            .get("numPeriods")
            .and_then(|v| v.as_u64())
            .unwrap_or(1) as usize,
        lead_teacher: params.get("leadTeacher").and_then(teacher_ref),
        assistants: teacher_list(params.get("assistants")),
        group: params
            .get("group")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        lab_room: params
            .get("labRoom")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        lab_group_id: None,
        lab_subjects: Vec::new(),
    })
}

fn lab_subject_from_params(v: &serde_json::Value) -> Result<LabSubject, String> {
    let subject_id = v
        .get("subjectId")
        .and_then(|x| x.as_str())
        .ok_or("lab subject missing subjectId")?;
    Ok(LabSubject {
        subject_id: subject_id.to_string(),
        subject_name: v
            .get("subjectName")
            .and_then(|x| x.as_str())
            .unwrap_or_default()
            .to_string(),
        is_half_lab: v
            .get("isHalfLab")
            .and_then(|x| x.as_bool())
            .unwrap_or(false),
        span: v.get("numPeriods").and_then(|x| x.as_u64()).unwrap_or(1) as usize,
        lead_teacher: v.get("leadTeacher").and_then(teacher_ref),
        assistants: teacher_list(v.get("assistants")),
        group: v.get("group").and_then(|x| x.as_str()).map(|s| s.to_string()),
        lab_room: v
            .get("labRoom")
            .and_then(|x| x.as_str())
            .map(|s| s.to_string()),
    })
}

fn grid_err(id: &str, e: GridError) -> serde_json::Value {
    match e {
        GridError::Validation(msg) => err(id, "bad_params", msg, None),
        GridError::SpanOverflow { span, remaining } => err(
            id,
            "span_overflow",
            format!("span of {span} exceeds the {remaining} period(s) remaining in the day"),
            Some(json!({ "span": span, "remaining": remaining })),
        ),
        GridError::TeacherBusy { conflicts } => {
            let details = serde_json::to_value(&conflicts).unwrap_or(serde_json::Value::Null);
            err(
                id,
                "teacher_conflict",
                "teacher is already assigned in the requested range",
                Some(json!({ "conflicts": details })),
            )
        }
        GridError::SlotOccupied => err(id, "slot_occupied", "target slot is already occupied", None),
        GridError::UnknownSlot => err(id, "not_found", "unknown period in slot key", None),
        GridError::Lookup(e) => err(id, "lookup_failed", e.to_string(), None),
    }
}

fn load_periods(conn: &Connection) -> anyhow::Result<PeriodSequence> {
    let mut stmt = conn.prepare(
        "SELECT id, name, start_time, end_time, sort_order FROM periods ORDER BY sort_order",
    )?;
    let slots = stmt
        .query_map([], |row| {
            Ok(PeriodSlot {
                id: row.get(0)?,
                name: row.get(1)?,
                start_time: row.get(2)?,
                end_time: row.get(3)?,
                sort_order: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PeriodSequence::new(slots))
}

fn grid_snapshot(session: &EditorSession) -> serde_json::Value {
    let entries = session.grid.flatten();
    json!({
        "classId": session.grid.class_id(),
        "className": session.grid.class_name(),
        "roomNo": session.room_no,
        "entries": serde_json::to_value(&entries).unwrap_or(serde_json::Value::Null),
        "dirty": session.scheduler.is_dirty(),
    })
}

fn persist_session(conn: &Connection, session: &mut EditorSession) -> anyhow::Result<usize> {
    let rows = session.grid.flatten();
    let n = store::replace_class_routine(
        conn,
        session.grid.class_id(),
        &rows,
        session.room_no.as_deref(),
    )?;
    session.scheduler.flush();
    Ok(n)
}

/// Run after every request: write the open session's grid once its quiet
/// window has elapsed. A failed save is logged and retried after another
/// window rather than dropped.
pub fn poll_autosave(state: &mut AppState) {
    let Some(conn) = state.db.as_ref() else {
        return;
    };
    let Some(session) = state.editor.as_mut() else {
        return;
    };
    let now = Instant::now();
    if !session.scheduler.due(now) {
        return;
    }
    if let Err(e) = persist_session(conn, session) {
        eprintln!("autosave failed for class {}: {e}", session.grid.class_id());
        session.scheduler.mark_dirty(now);
    }
}

fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(class_id) = p_str(req, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    // Re-opening replaces any previous session; flush it so edits survive.
    if let Some(mut old) = state.editor.take() {
        if old.scheduler.is_dirty() {
            if let Err(e) = persist_session(conn, &mut old) {
                eprintln!("flush of previous session failed: {e}");
            }
        }
    }

    let class = conn
        .query_row(
            "SELECT name, section, room_no FROM classes WHERE id = ?",
            [class_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional();
    let (name, section, room_no) = match class {
        Ok(Some(c)) => c,
        Ok(None) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let class_name = if section.is_empty() {
        name
    } else {
        format!("{name} {section}")
    };

    let periods = match load_periods(conn) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if periods.is_empty() {
        return err(&req.id, "bad_state", "no periods defined yet", None);
    }
    let rows = match store::class_routine_rows(conn, class_id) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let grid = RoutineGrid::rebuild(class_id, class_name, periods, &rows);
    let session = EditorSession {
        room_no,
        grid,
        scheduler: SaveScheduler::new(AUTOSAVE_DELAY),
        drop_cache: HashMap::new(),
    };
    let snapshot = grid_snapshot(&session);
    state.editor = Some(session);
    ok(&req.id, snapshot)
}

fn handle_place(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(conn), Some(session)) = (state.db.as_ref(), state.editor.as_mut()) else {
        return err(&req.id, "no_editor", "open an editor session first", None);
    };
    let (Some(day_id), Some(period_id)) = (p_str(req, "dayId"), p_str(req, "periodId")) else {
        return err(&req.id, "bad_params", "missing dayId/periodId", None);
    };
    let assignment = match assignment_from_params(&req.params) {
        Ok(a) => a,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    if let Some(room) = p_opt(req, "roomNo") {
        session.room_no = Some(room);
    }

    let lookup = DbConflictLookup::new(conn, session.grid.class_id());
    if let Err(e) = session.grid.place(day_id, period_id, assignment, &lookup) {
        return grid_err(&req.id, e);
    }
    session.scheduler.mark_dirty(Instant::now());
    session.drop_cache.clear();
    ok(
        &req.id,
        json!({
            "placed": true,
            "duplicateWarning": session.grid.has_duplicate_assignment(day_id, period_id),
        }),
    )
}

fn handle_place_lab(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(conn), Some(session)) = (state.db.as_ref(), state.editor.as_mut()) else {
        return err(&req.id, "no_editor", "open an editor session first", None);
    };
    let (Some(day_id), Some(period_id)) = (p_str(req, "dayId"), p_str(req, "periodId")) else {
        return err(&req.id, "bad_params", "missing dayId/periodId", None);
    };
    let Some(subject_params) = req.params.get("subjects").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing subjects[]", None);
    };
    let mut subs = Vec::with_capacity(subject_params.len());
    for v in subject_params {
        match lab_subject_from_params(v) {
            Ok(s) => subs.push(s),
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        }
    }

    let lab_group_id = Uuid::new_v4().to_string();
    let lookup = DbConflictLookup::new(conn, session.grid.class_id());
    if let Err(e) = session
        .grid
        .place_lab(day_id, period_id, subs, lab_group_id.clone(), &lookup)
    {
        return grid_err(&req.id, e);
    }
    session.scheduler.mark_dirty(Instant::now());
    session.drop_cache.clear();
    ok(&req.id, json!({ "placed": true, "labGroupId": lab_group_id }))
}

fn handle_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.editor.as_mut() else {
        return err(&req.id, "no_editor", "open an editor session first", None);
    };
    let (Some(day_id), Some(period_id)) = (p_str(req, "dayId"), p_str(req, "periodId")) else {
        return err(&req.id, "bad_params", "missing dayId/periodId", None);
    };
    let removed = session.grid.remove(day_id, period_id);
    if removed {
        session.scheduler.mark_dirty(Instant::now());
        session.drop_cache.clear();
    }
    ok(&req.id, json!({ "removed": removed }))
}

fn slot_pair(req: &Request) -> Option<(SlotKey, SlotKey)> {
    let source = SlotKey::new(p_str(req, "sourceDayId")?, p_str(req, "sourcePeriodId")?);
    let target = SlotKey::new(p_str(req, "targetDayId")?, p_str(req, "targetPeriodId")?);
    Some((source, target))
}

fn handle_move_or_copy(state: &mut AppState, req: &Request, mode: MoveMode) -> serde_json::Value {
    let (Some(conn), Some(session)) = (state.db.as_ref(), state.editor.as_mut()) else {
        return err(&req.id, "no_editor", "open an editor session first", None);
    };
    let Some((source, target)) = slot_pair(req) else {
        return err(&req.id, "bad_params", "missing source/target cell", None);
    };
    let lookup = DbConflictLookup::new(conn, session.grid.class_id());
    if let Err(e) = session.grid.move_or_copy(&source, &target, mode, &lookup) {
        return grid_err(&req.id, e);
    }
    session.scheduler.mark_dirty(Instant::now());
    session.drop_cache.clear();
    ok(&req.id, json!({ "moved": mode == MoveMode::Move, "copied": mode == MoveMode::Copy }))
}

fn handle_check_availability(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(conn), Some(session)) = (state.db.as_ref(), state.editor.as_ref()) else {
        return err(&req.id, "no_editor", "open an editor session first", None);
    };
    let (Some(teacher_id), Some(day_id), Some(period_id)) = (
        p_str(req, "teacherId"),
        p_str(req, "dayId"),
        p_str(req, "periodId"),
    ) else {
        return err(&req.id, "bad_params", "missing teacherId/dayId/periodId", None);
    };
    let teacher = TeacherRef {
        id: teacher_id.to_string(),
        name: p_opt(req, "teacherName").unwrap_or_default(),
    };
    let span = p_usize(req, "span").unwrap_or(1);
    // When re-assigning an occupied cell, that cell's own run is excluded.
    let exclude = match (p_str(req, "excludeDayId"), p_str(req, "excludePeriodId")) {
        (Some(d), Some(p)) => Some(SlotKey::new(d, p)),
        _ => None,
    };

    let lookup = DbConflictLookup::new(conn, session.grid.class_id());
    match session
        .grid
        .check_teacher(&teacher, day_id, period_id, span, exclude.as_ref(), &lookup)
    {
        Ok(conflicts) => {
            let details = serde_json::to_value(&conflicts).unwrap_or(serde_json::Value::Null);
            ok(
                &req.id,
                json!({ "available": conflicts.is_empty(), "conflicts": details }),
            )
        }
        Err(e) => grid_err(&req.id, e),
    }
}

fn handle_check_drop_target(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(conn), Some(session)) = (state.db.as_ref(), state.editor.as_mut()) else {
        return err(&req.id, "no_editor", "open an editor session first", None);
    };
    let Some((source, target)) = slot_pair(req) else {
        return err(&req.id, "bad_params", "missing source/target cell", None);
    };
    let mode = match p_str(req, "mode") {
        Some("copy") => MoveMode::Copy,
        _ => MoveMode::Move,
    };

    // Hover probes repeat for the same cell pair while dragging; cache the
    // move-mode verdicts until the next mutation.
    let cache_key = (source.clone(), target.clone());
    if mode == MoveMode::Move {
        if let Some(&can_drop) = session.drop_cache.get(&cache_key) {
            return ok(&req.id, json!({ "canDrop": can_drop, "cached": true }));
        }
    }

    let lookup = DbConflictLookup::new(conn, session.grid.class_id());
    let verdict = session.grid.check_move(&source, &target, mode, &lookup);
    let (can_drop, reason) = match verdict {
        Ok(()) => (true, None),
        Err(GridError::Lookup(e)) => return err(&req.id, "lookup_failed", e.to_string(), None),
        Err(e) => (false, Some(format!("{e}"))),
    };
    if mode == MoveMode::Move {
        session.drop_cache.insert(cache_key, can_drop);
    }
    ok(&req.id, json!({ "canDrop": can_drop, "reason": reason, "cached": false }))
}

fn handle_grid(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.editor.as_ref() else {
        return err(&req.id, "no_editor", "open an editor session first", None);
    };
    ok(&req.id, grid_snapshot(session))
}

fn handle_flush(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(conn), Some(session)) = (state.db.as_ref(), state.editor.as_mut()) else {
        return err(&req.id, "no_editor", "open an editor session first", None);
    };
    match persist_session(conn, session) {
        Ok(n) => ok(&req.id, json!({ "saved": n })),
        Err(e) => err(&req.id, "save_failed", e.to_string(), None),
    }
}

fn handle_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(mut session) = state.editor.take() else {
        return err(&req.id, "no_editor", "no editor session is open", None);
    };
    if session.scheduler.is_dirty() {
        let Some(conn) = state.db.as_ref() else {
            return err(&req.id, "no_workspace", "workspace closed mid-session", None);
        };
        if let Err(e) = persist_session(conn, &mut session) {
            // Keep the session alive so nothing is lost.
            state.editor = Some(session);
            return err(&req.id, "save_failed", e.to_string(), None);
        }
    }
    ok(&req.id, json!({ "closed": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    Some(match req.method.as_str() {
        "editor.open" => handle_open(state, req),
        "editor.place" => handle_place(state, req),
        "editor.placeLab" => handle_place_lab(state, req),
        "editor.remove" => handle_remove(state, req),
        "editor.move" => handle_move_or_copy(state, req, MoveMode::Move),
        "editor.copy" => handle_move_or_copy(state, req, MoveMode::Copy),
        "editor.checkAvailability" => handle_check_availability(state, req),
        "editor.checkDropTarget" => handle_check_drop_target(state, req),
        "editor.grid" => handle_grid(state, req),
        "editor.flush" => handle_flush(state, req),
        "editor.close" => handle_close(state, req),
        _ => return None,
    })
}
