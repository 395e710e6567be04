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

fn p_bool(req: &Request, key: &str) -> Option<bool> {
    req.params.get(key).and_then(|v| v.as_bool())
}

fn p_i64(req: &Request, key: &str) -> Option<i64> {
    req.params.get(key).and_then(|v| v.as_i64())
}

/// Map UNIQUE violations to a `conflict` response, everything else to a
/// generic db error.
fn insert_err(id: &str, e: rusqlite::Error) -> serde_json::Value {
    let msg = e.to_string();
    if msg.contains("UNIQUE") {
        err(id, "conflict", msg, None)
    } else {
        err(id, "db_insert_failed", msg, None)
    }
}

fn handle_departments_list(conn: &Connection, req: &Request) -> serde_json::Value {
    let mut stmt = match conn.prepare("SELECT id, name, code FROM departments ORDER BY name") {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "code": row.get::<_, String>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(v) => ok(&req.id, json!({ "departments": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_departments_create(conn: &Connection, req: &Request) -> serde_json::Value {
    let (Some(name), Some(code)) = (p_str(req, "name"), p_str(req, "code")) else {
        return err(&req.id, "bad_params", "missing name/code", None);
    };
    let id = Uuid::new_v4().to_string();
    match conn.execute(
        "INSERT INTO departments(id, name, code) VALUES(?, ?, ?)",
        (&id, name, code),
    ) {
        Ok(_) => ok(&req.id, json!({ "id": id })),
        Err(e) => insert_err(&req.id, e),
    }
}

fn handle_programmes_list(conn: &Connection, req: &Request) -> serde_json::Value {
    let mut stmt = match conn.prepare(
        "SELECT p.id, p.name, p.code, p.department_id, d.name
         FROM programmes p
         LEFT JOIN departments d ON d.id = p.department_id
         ORDER BY p.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "code": row.get::<_, String>(2)?,
                "departmentId": row.get::<_, Option<String>>(3)?,
                "departmentName": row.get::<_, Option<String>>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(v) => ok(&req.id, json!({ "programmes": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_programmes_create(conn: &Connection, req: &Request) -> serde_json::Value {
    let (Some(name), Some(code)) = (p_str(req, "name"), p_str(req, "code")) else {
        return err(&req.id, "bad_params", "missing name/code", None);
    };
    let id = Uuid::new_v4().to_string();
    match conn.execute(
        "INSERT INTO programmes(id, name, code, department_id) VALUES(?, ?, ?, ?)",
        (&id, name, code, p_opt(req, "departmentId")),
    ) {
        Ok(_) => ok(&req.id, json!({ "id": id })),
        Err(e) => insert_err(&req.id, e),
    }
}

fn handle_semesters_list(conn: &Connection, req: &Request) -> serde_json::Value {
    let mut stmt = match conn.prepare(
        "SELECT id, name, semester_number, programme_id, is_active
         FROM semesters ORDER BY semester_number",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "semesterNumber": row.get::<_, i64>(2)?,
                "programmeId": row.get::<_, Option<String>>(3)?,
                "isActive": row.get::<_, i64>(4)? != 0,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(v) => ok(&req.id, json!({ "semesters": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_semesters_create(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(name) = p_str(req, "name") else {
        return err(&req.id, "bad_params", "missing name", None);
    };
    let Some(number) = p_i64(req, "semesterNumber") else {
        return err(&req.id, "bad_params", "missing semesterNumber", None);
    };
    let id = Uuid::new_v4().to_string();
    match conn.execute(
        "INSERT INTO semesters(id, name, semester_number, programme_id, is_active)
         VALUES(?, ?, ?, ?, ?)",
        (
            &id,
            name,
            number,
            p_opt(req, "programmeId"),
            p_bool(req, "isActive").unwrap_or(true) as i64,
        ),
    ) {
        Ok(_) => ok(&req.id, json!({ "id": id })),
        Err(e) => insert_err(&req.id, e),
    }
}

fn handle_rooms_list(conn: &Connection, req: &Request) -> serde_json::Value {
    let mut stmt = match conn
        .prepare("SELECT id, room_number, building, capacity FROM rooms ORDER BY room_number")
    {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "roomNumber": row.get::<_, String>(1)?,
                "building": row.get::<_, Option<String>>(2)?,
                "capacity": row.get::<_, Option<i64>>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(v) => ok(&req.id, json!({ "rooms": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_rooms_create(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(room_number) = p_str(req, "roomNumber") else {
        return err(&req.id, "bad_params", "missing roomNumber", None);
    };
    let id = Uuid::new_v4().to_string();
    match conn.execute(
        "INSERT INTO rooms(id, room_number, building, capacity) VALUES(?, ?, ?, ?)",
        (
            &id,
            room_number,
            p_opt(req, "building"),
            p_i64(req, "capacity"),
        ),
    ) {
        Ok(_) => ok(&req.id, json!({ "id": id })),
        Err(e) => insert_err(&req.id, e),
    }
}

fn handle_classes_list(conn: &Connection, req: &Request) -> serde_json::Value {
    let mut stmt = match conn.prepare(
        "SELECT c.id, c.name, c.section, c.semester_id, c.department_id,
                c.room_no, c.effective_date,
                (SELECT COUNT(*) FROM routine_entries r
                 WHERE r.class_id = c.id AND r.is_continuation = 0) AS entry_count
         FROM classes c
         ORDER BY c.name, c.section",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "section": row.get::<_, String>(2)?,
                "semesterId": row.get::<_, Option<String>>(3)?,
                "departmentId": row.get::<_, Option<String>>(4)?,
                "roomNo": row.get::<_, Option<String>>(5)?,
                "effectiveDate": row.get::<_, Option<String>>(6)?,
                "entryCount": row.get::<_, i64>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(v) => ok(&req.id, json!({ "classes": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_create(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(name) = p_str(req, "name") else {
        return err(&req.id, "bad_params", "missing name", None);
    };
    let id = Uuid::new_v4().to_string();
    match conn.execute(
        "INSERT INTO classes(id, name, section, semester_id, department_id, room_no, effective_date)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            name,
            p_str(req, "section").unwrap_or(""),
            p_opt(req, "semesterId"),
            p_opt(req, "departmentId"),
            p_opt(req, "roomNo"),
            p_opt(req, "effectiveDate"),
        ),
    ) {
        Ok(_) => ok(&req.id, json!({ "id": id })),
        Err(e) => insert_err(&req.id, e),
    }
}

fn handle_classes_update(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(id) = p_str(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    let res = conn.execute(
        "UPDATE classes SET
            name = COALESCE(?2, name),
            section = COALESCE(?3, section),
            semester_id = COALESCE(?4, semester_id),
            department_id = COALESCE(?5, department_id),
            room_no = COALESCE(?6, room_no),
            effective_date = COALESCE(?7, effective_date)
         WHERE id = ?1",
        (
            id,
            p_opt(req, "name"),
            p_opt(req, "section"),
            p_opt(req, "semesterId"),
            p_opt(req, "departmentId"),
            p_opt(req, "roomNo"),
            p_opt(req, "effectiveDate"),
        ),
    );
    match res {
        Ok(0) => err(&req.id, "not_found", "class not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_classes_delete(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(id) = p_str(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    match store::routine_references(conn, "class_id", id) {
        Ok(0) => {}
        Ok(n) => {
            return err(
                &req.id,
                "in_use",
                "class still has routine entries; delete its routine first",
                Some(json!({ "entryCount": n })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    match conn.execute("DELETE FROM classes WHERE id = ?", [id]) {
        Ok(0) => err(&req.id, "not_found", "class not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_subjects_list(conn: &Connection, req: &Request) -> serde_json::Value {
    let mut stmt = match conn
        .prepare("SELECT id, name, code, is_lab, credit_hours FROM subjects ORDER BY name")
    {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "code": row.get::<_, String>(2)?,
                "isLab": row.get::<_, i64>(3)? != 0,
                "creditHours": row.get::<_, i64>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(v) => ok(&req.id, json!({ "subjects": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_subjects_create(conn: &Connection, req: &Request) -> serde_json::Value {
    let (Some(name), Some(code)) = (p_str(req, "name"), p_str(req, "code")) else {
        return err(&req.id, "bad_params", "missing name/code", None);
    };
    let id = Uuid::new_v4().to_string();
    match conn.execute(
        "INSERT INTO subjects(id, name, code, is_lab, credit_hours) VALUES(?, ?, ?, ?, ?)",
        (
            &id,
            name,
            code,
            p_bool(req, "isLab").unwrap_or(false) as i64,
            p_i64(req, "creditHours").unwrap_or(3),
        ),
    ) {
        Ok(_) => ok(&req.id, json!({ "id": id })),
        Err(e) => insert_err(&req.id, e),
    }
}

fn handle_subjects_update(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(id) = p_str(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    let res = conn.execute(
        "UPDATE subjects SET
            name = COALESCE(?2, name),
            code = COALESCE(?3, code),
            is_lab = COALESCE(?4, is_lab),
            credit_hours = COALESCE(?5, credit_hours)
         WHERE id = ?1",
        (
            id,
            p_opt(req, "name"),
            p_opt(req, "code"),
            p_bool(req, "isLab").map(|b| b as i64),
            p_i64(req, "creditHours"),
        ),
    );
    match res {
        Ok(0) => err(&req.id, "not_found", "subject not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_subjects_delete(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(id) = p_str(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    match store::routine_references(conn, "subject_id", id) {
        Ok(0) => {}
        Ok(n) => {
            return err(
                &req.id,
                "in_use",
                "subject is referenced by routine entries",
                Some(json!({ "entryCount": n })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    if let Err(e) = conn.execute("DELETE FROM semester_subjects WHERE subject_id = ?", [id]) {
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    if let Err(e) = conn.execute("DELETE FROM teacher_subjects WHERE subject_id = ?", [id]) {
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    match conn.execute("DELETE FROM subjects WHERE id = ?", [id]) {
        Ok(0) => err(&req.id, "not_found", "subject not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_teachers_list(conn: &Connection, req: &Request) -> serde_json::Value {
    let mut stmt = match conn.prepare(
        "SELECT t.id, t.name, t.abbreviation, t.email, t.phone, t.recruitment,
                t.department_id, d.name
         FROM teachers t
         LEFT JOIN departments d ON d.id = t.department_id
         ORDER BY t.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "abbreviation": row.get::<_, String>(2)?,
                "email": row.get::<_, Option<String>>(3)?,
                "phone": row.get::<_, Option<String>>(4)?,
                "recruitment": row.get::<_, String>(5)?,
                "departmentId": row.get::<_, Option<String>>(6)?,
                "departmentName": row.get::<_, Option<String>>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(v) => ok(&req.id, json!({ "teachers": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_teachers_create(conn: &Connection, req: &Request) -> serde_json::Value {
    let (Some(name), Some(abbreviation)) = (p_str(req, "name"), p_str(req, "abbreviation"))
    else {
        return err(&req.id, "bad_params", "missing name/abbreviation", None);
    };
    let id = Uuid::new_v4().to_string();
    match conn.execute(
        "INSERT INTO teachers(id, name, abbreviation, email, phone, recruitment, department_id)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            name,
            abbreviation,
            p_opt(req, "email"),
            p_opt(req, "phone"),
            p_str(req, "recruitment").unwrap_or("Full Time"),
            p_opt(req, "departmentId"),
        ),
    ) {
        Ok(_) => ok(&req.id, json!({ "id": id })),
        Err(e) => insert_err(&req.id, e),
    }
}

fn handle_teachers_update(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(id) = p_str(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    let res = conn.execute(
        "UPDATE teachers SET
            name = COALESCE(?2, name),
            abbreviation = COALESCE(?3, abbreviation),
            email = COALESCE(?4, email),
            phone = COALESCE(?5, phone),
            recruitment = COALESCE(?6, recruitment),
            department_id = COALESCE(?7, department_id)
         WHERE id = ?1",
        (
            id,
            p_opt(req, "name"),
            p_opt(req, "abbreviation"),
            p_opt(req, "email"),
            p_opt(req, "phone"),
            p_opt(req, "recruitment"),
            p_opt(req, "departmentId"),
        ),
    );
    match res {
        Ok(0) => err(&req.id, "not_found", "teacher not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_teachers_delete(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(id) = p_str(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    match store::routine_references(conn, "teacher_id", id) {
        Ok(0) => {}
        Ok(n) => {
            return err(
                &req.id,
                "in_use",
                "teacher is referenced by routine entries",
                Some(json!({ "entryCount": n })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    if let Err(e) = conn.execute("DELETE FROM teacher_subjects WHERE teacher_id = ?", [id]) {
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    match conn.execute("DELETE FROM teachers WHERE id = ?", [id]) {
        Ok(0) => err(&req.id, "not_found", "teacher not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_semester_subjects_list(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(semester_id) = p_str(req, "semesterId") else {
        return err(&req.id, "bad_params", "missing semesterId", None);
    };
    let mut stmt = match conn.prepare(
        "SELECT s.id, s.name, s.code, s.is_lab
         FROM semester_subjects ss
         JOIN subjects s ON s.id = ss.subject_id
         WHERE ss.semester_id = ?
         ORDER BY s.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([semester_id], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "code": row.get::<_, String>(2)?,
                "isLab": row.get::<_, i64>(3)? != 0,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(v) => ok(&req.id, json!({ "subjects": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_semester_subjects_set(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(semester_id) = p_str(req, "semesterId") else {
        return err(&req.id, "bad_params", "missing semesterId", None);
    };
    let Some(subject_ids) = req.params.get("subjectIds").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing subjectIds[]", None);
    };

    if let Err(e) = conn.execute(
        "DELETE FROM semester_subjects WHERE semester_id = ?",
        [semester_id],
    ) {
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    for sid in subject_ids.iter().filter_map(|v| v.as_str()) {
        if let Err(e) = conn.execute(
            "INSERT INTO semester_subjects(id, semester_id, subject_id) VALUES(?, ?, ?)",
            (Uuid::new_v4().to_string(), semester_id, sid),
        ) {
            return insert_err(&req.id, e);
        }
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_teacher_subjects_list(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(teacher_id) = p_str(req, "teacherId") else {
        return err(&req.id, "bad_params", "missing teacherId", None);
    };
    let mut stmt = match conn.prepare(
        "SELECT s.id, s.name, s.code, s.is_lab
         FROM teacher_subjects ts
         JOIN subjects s ON s.id = ts.subject_id
         WHERE ts.teacher_id = ?
         ORDER BY s.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([teacher_id], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "code": row.get::<_, String>(2)?,
                "isLab": row.get::<_, i64>(3)? != 0,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(v) => ok(&req.id, json!({ "subjects": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_teacher_subjects_set(conn: &Connection, req: &Request) -> serde_json::Value {
    let Some(teacher_id) = p_str(req, "teacherId") else {
        return err(&req.id, "bad_params", "missing teacherId", None);
    };
    let Some(subject_ids) = req.params.get("subjectIds").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing subjectIds[]", None);
    };

    if let Err(e) = conn.execute(
        "DELETE FROM teacher_subjects WHERE teacher_id = ?",
        [teacher_id],
    ) {
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    for sid in subject_ids.iter().filter_map(|v| v.as_str()) {
        if let Err(e) = conn.execute(
            "INSERT INTO teacher_subjects(id, teacher_id, subject_id) VALUES(?, ?, ?)",
            (Uuid::new_v4().to_string(), teacher_id, sid),
        ) {
            return insert_err(&req.id, e);
        }
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let needs_db = matches!(
        req.method.as_str(),
        "departments.list"
            | "departments.create"
            | "programmes.list"
            | "programmes.create"
            | "semesters.list"
            | "semesters.create"
            | "rooms.list"
            | "rooms.create"
            | "classes.list"
            | "classes.create"
            | "classes.update"
            | "classes.delete"
            | "subjects.list"
            | "subjects.create"
            | "subjects.update"
            | "subjects.delete"
            | "teachers.list"
            | "teachers.create"
            | "teachers.update"
            | "teachers.delete"
            | "semesterSubjects.list"
            | "semesterSubjects.set"
            | "teacherSubjects.list"
            | "teacherSubjects.set"
    );
    if !needs_db {
        return None;
    }
    let Some(conn) = state.db.as_ref() else {
        return Some(err(&req.id, "no_workspace", "select a workspace first", None));
    };

    Some(match req.method.as_str() {
        "departments.list" => handle_departments_list(conn, req),
        "departments.create" => handle_departments_create(conn, req),
        "programmes.list" => handle_programmes_list(conn, req),
        "programmes.create" => handle_programmes_create(conn, req),
        "semesters.list" => handle_semesters_list(conn, req),
        "semesters.create" => handle_semesters_create(conn, req),
        "rooms.list" => handle_rooms_list(conn, req),
        "rooms.create" => handle_rooms_create(conn, req),
        "classes.list" => handle_classes_list(conn, req),
        "classes.create" => handle_classes_create(conn, req),
        "classes.update" => handle_classes_update(conn, req),
        "classes.delete" => handle_classes_delete(conn, req),
        "subjects.list" => handle_subjects_list(conn, req),
        "subjects.create" => handle_subjects_create(conn, req),
        "subjects.update" => handle_subjects_update(conn, req),
        "subjects.delete" => handle_subjects_delete(conn, req),
        "teachers.list" => handle_teachers_list(conn, req),
        "teachers.create" => handle_teachers_create(conn, req),
        "teachers.update" => handle_teachers_update(conn, req),
        "teachers.delete" => handle_teachers_delete(conn, req),
        "semesterSubjects.list" => handle_semester_subjects_list(conn, req),
        "semesterSubjects.set" => handle_semester_subjects_set(conn, req),
        "teacherSubjects.list" => handle_teacher_subjects_list(conn, req),
        "teacherSubjects.set" => handle_teacher_subjects_set(conn, req),
        _ => unreachable!(),
    })
}
