//! SQL access for routine rows: replace-all saves, joined loads that carry
//! display names, and the cross-class teacher-conflict scan backing the
//! editor's `ConflictLookup`.

use crate::grid::{Conflict, ConflictLookup, RoutineRow, TeacherRef};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

const ROW_COLUMNS: &str = "r.day_id, r.period_id, r.subject_id,
       CASE r.subject_id
         WHEN 'BREAK' THEN 'Break'
         WHEN 'LC' THEN 'Library Consultation'
         ELSE s.name
       END AS subject_name,
       r.is_lab, r.is_half_lab, r.num_periods,
       r.lead_teacher_id, lt.abbreviation,
       r.assist_teacher_1_id, a1.abbreviation,
       r.assist_teacher_2_id, a2.abbreviation,
       r.assist_teacher_3_id, a3.abbreviation,
       r.room_no, r.grp, r.lab_room, r.lab_group_id, r.is_continuation";

const ROW_JOINS: &str = "LEFT JOIN subjects s ON s.id = r.subject_id
     LEFT JOIN teachers lt ON lt.id = r.lead_teacher_id
     LEFT JOIN teachers a1 ON a1.id = r.assist_teacher_1_id
     LEFT JOIN teachers a2 ON a2.id = r.assist_teacher_2_id
     LEFT JOIN teachers a3 ON a3.id = r.assist_teacher_3_id
     JOIN periods p ON p.id = r.period_id
     JOIN days d ON d.id = r.day_id";

fn row_from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoutineRow> {
    Ok(RoutineRow {
        day_id: row.get(0)?,
        period_id: row.get(1)?,
        subject_id: row.get(2)?,
        subject_name: row.get(3)?,
        is_lab: row.get::<_, i64>(4)? != 0,
        is_half_lab: row.get::<_, i64>(5)? != 0,
        num_periods: row.get(6)?,
        lead_teacher_id: row.get(7)?,
        lead_teacher_name: row.get(8)?,
        assist_teacher_1_id: row.get(9)?,
        assist_teacher_1_name: row.get(10)?,
        assist_teacher_2_id: row.get(11)?,
        assist_teacher_2_name: row.get(12)?,
        assist_teacher_3_id: row.get(13)?,
        assist_teacher_3_name: row.get(14)?,
        room_no: row.get(15)?,
        group: row.get(16)?,
        lab_room: row.get(17)?,
        lab_group_id: row.get(18)?,
        is_continuation: row.get::<_, i64>(19)? != 0,
    })
}

/// Replace a class's whole routine in one transaction (last write wins) and
/// update the class's room number. Returns the number of rows written.
pub fn replace_class_routine(
    conn: &Connection,
    class_id: &str,
    rows: &[RoutineRow],
    room_no: Option<&str>,
) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM routine_entries WHERE class_id = ?",
        [class_id],
    )?;
    for row in rows {
        tx.execute(
            "INSERT INTO routine_entries(
                id, class_id, day_id, period_id, subject_id,
                is_lab, is_half_lab, num_periods,
                lead_teacher_id, assist_teacher_1_id, assist_teacher_2_id,
                assist_teacher_3_id, room_no, grp, lab_room, lab_group_id,
                is_continuation
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                class_id,
                row.day_id,
                row.period_id,
                row.subject_id,
                row.is_lab as i64,
                row.is_half_lab as i64,
                row.num_periods.max(1),
                row.lead_teacher_id,
                row.assist_teacher_1_id,
                row.assist_teacher_2_id,
                row.assist_teacher_3_id,
                row.room_no,
                row.group,
                row.lab_room,
                row.lab_group_id,
                row.is_continuation as i64,
            ],
        )?;
    }
    if let Some(room) = room_no {
        tx.execute(
            "UPDATE classes SET room_no = ? WHERE id = ?",
            [room, class_id],
        )?;
    }
    tx.commit()?;
    Ok(rows.len())
}

pub fn class_routine_rows(conn: &Connection, class_id: &str) -> anyhow::Result<Vec<RoutineRow>> {
    let sql = format!(
        "SELECT {ROW_COLUMNS} FROM routine_entries r {ROW_JOINS}
         WHERE r.class_id = ?
         ORDER BY d.sort_order, p.sort_order"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([class_id], row_from_sql)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn all_routine_rows(conn: &Connection) -> anyhow::Result<Vec<(String, RoutineRow)>> {
    let sql = format!(
        "SELECT r.class_id, {ROW_COLUMNS} FROM routine_entries r {ROW_JOINS}
         ORDER BY r.class_id, d.sort_order, p.sort_order"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            let class_id: String = row.get(0)?;
            // Shift every column index by one for the leading class_id.
            Ok((
                class_id,
                RoutineRow {
                    day_id: row.get(1)?,
                    period_id: row.get(2)?,
                    subject_id: row.get(3)?,
                    subject_name: row.get(4)?,
                    is_lab: row.get::<_, i64>(5)? != 0,
                    is_half_lab: row.get::<_, i64>(6)? != 0,
                    num_periods: row.get(7)?,
                    lead_teacher_id: row.get(8)?,
                    lead_teacher_name: row.get(9)?,
                    assist_teacher_1_id: row.get(10)?,
                    assist_teacher_1_name: row.get(11)?,
                    assist_teacher_2_id: row.get(12)?,
                    assist_teacher_2_name: row.get(13)?,
                    assist_teacher_3_id: row.get(14)?,
                    assist_teacher_3_name: row.get(15)?,
                    room_no: row.get(16)?,
                    group: row.get(17)?,
                    lab_room: row.get(18)?,
                    lab_group_id: row.get(19)?,
                    is_continuation: row.get::<_, i64>(20)? != 0,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_class_routine(conn: &Connection, class_id: &str) -> anyhow::Result<usize> {
    let n = conn.execute(
        "DELETE FROM routine_entries WHERE class_id = ?",
        [class_id],
    )?;
    Ok(n)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeacherConflictHit {
    pub class_name: String,
    pub subject_name: String,
    pub period_order: i64,
}

/// Scan other classes' anchored rows for a teacher in any role on one day.
/// A row conflicts when its span range (anchor period order plus
/// `num_periods`) covers any of the queried periods.
pub fn teacher_conflicts(
    conn: &Connection,
    teacher_id: &str,
    day_id: &str,
    period_ids: &[String],
    exclude_class_id: Option<&str>,
) -> anyhow::Result<Vec<TeacherConflictHit>> {
    if period_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut queried_orders = Vec::with_capacity(period_ids.len());
    {
        let mut stmt = conn.prepare("SELECT sort_order FROM periods WHERE id = ?")?;
        for pid in period_ids {
            let order: Option<i64> = stmt
                .query_row([pid.as_str()], |r| r.get(0))
                .optional()?;
            if let Some(o) = order {
                queried_orders.push(o);
            }
        }
    }
    if queried_orders.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT c.name,
                CASE r.subject_id
                  WHEN 'BREAK' THEN 'Break'
                  WHEN 'LC' THEN 'Library Consultation'
                  ELSE COALESCE(s.name, '')
                END,
                p.sort_order,
                r.num_periods
         FROM routine_entries r
         JOIN classes c ON c.id = r.class_id
         JOIN periods p ON p.id = r.period_id
         LEFT JOIN subjects s ON s.id = r.subject_id
         WHERE r.day_id = ?1
           AND r.is_continuation = 0
           AND (?2 IS NULL OR r.class_id <> ?2)
           AND (r.lead_teacher_id = ?3
                OR r.assist_teacher_1_id = ?3
                OR r.assist_teacher_2_id = ?3
                OR r.assist_teacher_3_id = ?3)
         ORDER BY p.sort_order",
    )?;

    let candidates = stmt
        .query_map(
            rusqlite::params![day_id, exclude_class_id, teacher_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let mut hits = Vec::new();
    for (class_name, subject_name, start_order, num_periods) in candidates {
        let end_order = start_order + num_periods.max(1) - 1;
        if queried_orders
            .iter()
            .any(|&q| q >= start_order && q <= end_order)
        {
            hits.push(TeacherConflictHit {
                class_name,
                subject_name,
                period_order: start_order,
            });
        }
    }
    Ok(hits)
}

/// `ConflictLookup` over the workspace database, excluding the class whose
/// routine is being edited.
pub struct DbConflictLookup<'a> {
    conn: &'a Connection,
    exclude_class_id: String,
}

impl<'a> DbConflictLookup<'a> {
    pub fn new(conn: &'a Connection, exclude_class_id: impl Into<String>) -> Self {
        Self {
            conn,
            exclude_class_id: exclude_class_id.into(),
        }
    }
}

impl ConflictLookup for DbConflictLookup<'_> {
    fn teacher_conflicts(
        &self,
        teacher: &TeacherRef,
        day_id: &str,
        period_ids: &[String],
    ) -> anyhow::Result<Vec<Conflict>> {
        let hits = teacher_conflicts(
            self.conn,
            &teacher.id,
            day_id,
            period_ids,
            Some(self.exclude_class_id.as_str()),
        )?;
        Ok(hits
            .into_iter()
            .map(|h| Conflict {
                teacher_id: teacher.id.clone(),
                teacher_name: teacher.name.clone(),
                class_name: h.class_name,
                subject_name: h.subject_name,
                time_slot: format!("Period {}", h.period_order),
            })
            .collect())
    }
}

/// How many routine rows still reference `id` through `column`. Used to
/// refuse catalog deletes that would strand routine data.
pub fn routine_references(conn: &Connection, column: &str, id: &str) -> anyhow::Result<i64> {
    let sql = match column {
        "day_id" => "SELECT COUNT(*) FROM routine_entries WHERE day_id = ?",
        "period_id" => "SELECT COUNT(*) FROM routine_entries WHERE period_id = ?",
        "class_id" => "SELECT COUNT(*) FROM routine_entries WHERE class_id = ?",
        "subject_id" => "SELECT COUNT(*) FROM routine_entries WHERE subject_id = ?",
        "teacher_id" => {
            "SELECT COUNT(*) FROM routine_entries
             WHERE lead_teacher_id = ?1 OR assist_teacher_1_id = ?1
                OR assist_teacher_2_id = ?1 OR assist_teacher_3_id = ?1"
        }
        other => anyhow::bail!("unknown reference column: {other}"),
    };
    let count: i64 = conn.query_row(sql, [id], |r| r.get(0))?;
    Ok(count)
}
