//! Static-deploy snapshot: a denormalized, read-only dump of the whole
//! timetable written to `<workspace>/deploy/routine_data.json` for the
//! external static file server to publish.

use crate::store;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const SNAPSHOT_FILE: &str = "routine_data.json";

pub fn build_snapshot(conn: &Connection) -> anyhow::Result<Value> {
    let classes = query_list(
        conn,
        "SELECT c.id, c.name, c.section, c.room_no, c.effective_date,
                sm.name, p.name
         FROM classes c
         LEFT JOIN semesters sm ON sm.id = c.semester_id
         LEFT JOIN programmes p ON p.id = sm.programme_id
         ORDER BY c.name",
        |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "section": row.get::<_, String>(2)?,
                "roomNo": row.get::<_, Option<String>>(3)?,
                "effectiveDate": row.get::<_, Option<String>>(4)?,
                "semesterName": row.get::<_, Option<String>>(5)?,
                "programmeName": row.get::<_, Option<String>>(6)?,
            }))
        },
    )?;

    let subjects = query_list(
        conn,
        "SELECT id, name, code, is_lab, credit_hours FROM subjects ORDER BY name",
        |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "code": row.get::<_, String>(2)?,
                "isLab": row.get::<_, i64>(3)? != 0,
                "creditHours": row.get::<_, i64>(4)?,
            }))
        },
    )?;

    let teachers = query_list(
        conn,
        "SELECT id, name, abbreviation FROM teachers ORDER BY name",
        |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "abbreviation": row.get::<_, String>(2)?,
            }))
        },
    )?;

    let days = query_list(
        conn,
        "SELECT id, name, sort_order FROM days ORDER BY sort_order",
        |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "sortOrder": row.get::<_, i64>(2)?,
            }))
        },
    )?;

    let periods = query_list(
        conn,
        "SELECT id, name, start_time, end_time, sort_order FROM periods ORDER BY sort_order",
        |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "startTime": row.get::<_, String>(2)?,
                "endTime": row.get::<_, String>(3)?,
                "sortOrder": row.get::<_, i64>(4)?,
            }))
        },
    )?;

    let programmes = query_list(
        conn,
        "SELECT id, name, code FROM programmes ORDER BY name",
        |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "code": row.get::<_, String>(2)?,
            }))
        },
    )?;

    let semesters = query_list(
        conn,
        "SELECT id, name, semester_number, programme_id, is_active FROM semesters
         ORDER BY semester_number",
        |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "semesterNumber": row.get::<_, i64>(2)?,
                "programmeId": row.get::<_, Option<String>>(3)?,
                "isActive": row.get::<_, i64>(4)? != 0,
            }))
        },
    )?;

    Ok(json!({
        "classes": classes,
        "subjects": subjects,
        "teachers": teachers,
        "routines": grouped_routines(conn)?,
        "days": days,
        "periods": periods,
        "programmes": programmes,
        "semesters": semesters,
        "generated_at": Utc::now().to_rfc3339(),
    }))
}

/// One snapshot element per anchored slot: multi-subject labs fold into a
/// single element carrying their sub-subjects. Continuation markers are
/// omitted; readers derive merged cells from `numPeriods`.
fn grouped_routines(conn: &Connection) -> anyhow::Result<Vec<Value>> {
    let rows = store::all_routine_rows(conn)?;
    let mut out: Vec<Value> = Vec::new();
    let mut seen_groups: HashMap<String, usize> = HashMap::new();

    for (class_id, row) in rows {
        if row.is_continuation {
            continue;
        }
        let sub = json!({
            "subjectId": row.subject_id,
            "subjectName": row.subject_name,
            "isHalfLab": row.is_half_lab,
            "numPeriods": row.num_periods,
            "leadTeacherId": row.lead_teacher_id,
            "leadTeacherName": row.lead_teacher_name,
            "assistTeacher1Name": row.assist_teacher_1_name,
            "assistTeacher2Name": row.assist_teacher_2_name,
            "assistTeacher3Name": row.assist_teacher_3_name,
            "group": row.group,
            "labRoom": row.lab_room,
        });

        if let Some(gid) = row.lab_group_id.clone() {
            if let Some(&idx) = seen_groups.get(&gid) {
                if let Some(subs) = out[idx].get_mut("labSubjects").and_then(|v| v.as_array_mut())
                {
                    subs.push(sub);
                }
                // The merged cell spans the longest sub-subject.
                let span = out[idx]
                    .get("numPeriods")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(1)
                    .max(row.num_periods);
                out[idx]["numPeriods"] = json!(span);
                continue;
            }
            seen_groups.insert(gid.clone(), out.len());
            out.push(json!({
                "classId": class_id,
                "dayId": row.day_id,
                "periodId": row.period_id,
                "isLab": true,
                "numPeriods": row.num_periods,
                "labGroupId": gid,
                "labSubjects": [sub],
            }));
        } else {
            out.push(json!({
                "classId": class_id,
                "dayId": row.day_id,
                "periodId": row.period_id,
                "subjectId": row.subject_id,
                "subjectName": row.subject_name,
                "isLab": row.is_lab,
                "isHalfLab": row.is_half_lab,
                "numPeriods": row.num_periods,
                "leadTeacherName": row.lead_teacher_name,
                "assistTeacher1Name": row.assist_teacher_1_name,
                "assistTeacher2Name": row.assist_teacher_2_name,
                "assistTeacher3Name": row.assist_teacher_3_name,
                "group": row.group,
                "labRoom": row.lab_room,
            }));
        }
    }
    Ok(out)
}

fn query_list<F>(conn: &Connection, sql: &str, map: F) -> anyhow::Result<Vec<Value>>
where
    F: Fn(&rusqlite::Row<'_>) -> rusqlite::Result<Value>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn snapshot_path(workspace: &Path) -> PathBuf {
    workspace.join("deploy").join(SNAPSHOT_FILE)
}

/// Write the snapshot via a temp file and rename so the static server never
/// observes a half-written file.
pub fn write_snapshot(workspace: &Path, snapshot: &Value) -> anyhow::Result<PathBuf> {
    let dir = workspace.join("deploy");
    std::fs::create_dir_all(&dir)?;
    let final_path = dir.join(SNAPSHOT_FILE);
    let tmp_path = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
    std::fs::write(&tmp_path, serde_json::to_vec_pretty(snapshot)?)?;
    std::fs::rename(&tmp_path, &final_path)?;
    Ok(final_path)
}

/// When the current snapshot was written, if one exists.
pub fn snapshot_modified(workspace: &Path) -> Option<String> {
    let meta = std::fs::metadata(snapshot_path(workspace)).ok()?;
    let modified = meta.modified().ok()?;
    Some(DateTime::<Utc>::from(modified).to_rfc3339())
}
