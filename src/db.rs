use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("routine.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            code TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS programmes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL UNIQUE,
            department_id TEXT,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_programmes_department ON programmes(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS semesters(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            semester_number INTEGER NOT NULL,
            programme_id TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(programme_id) REFERENCES programmes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_semesters_programme ON semesters(programme_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            section TEXT NOT NULL DEFAULT '',
            semester_id TEXT,
            department_id TEXT,
            room_no TEXT,
            effective_date TEXT,
            FOREIGN KEY(semester_id) REFERENCES semesters(id),
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_semester ON classes(semester_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL UNIQUE,
            is_lab INTEGER NOT NULL DEFAULT 0,
            credit_hours INTEGER NOT NULL DEFAULT 3
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS semester_subjects(
            id TEXT PRIMARY KEY,
            semester_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            FOREIGN KEY(semester_id) REFERENCES semesters(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(semester_id, subject_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_semester_subjects_semester ON semester_subjects(semester_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            abbreviation TEXT NOT NULL UNIQUE,
            email TEXT,
            phone TEXT,
            recruitment TEXT NOT NULL DEFAULT 'Full Time',
            department_id TEXT,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_department ON teachers(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_subjects(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(teacher_id, subject_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rooms(
            id TEXT PRIMARY KEY,
            room_number TEXT NOT NULL UNIQUE,
            building TEXT,
            capacity INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS days(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            sort_order INTEGER NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS periods(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            sort_order INTEGER NOT NULL UNIQUE
        )",
        [],
    )?;

    // Routine rows are stored flattened: one row per anchored entry (one per
    // sub-subject for multi-subject labs, linked by lab_group_id) plus marker
    // rows for continuation cells. subject_id has no FK on purpose: the
    // sentinel codes BREAK and LC live in the same column.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS routine_entries(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            day_id TEXT NOT NULL,
            period_id TEXT NOT NULL,
            subject_id TEXT,
            is_lab INTEGER NOT NULL DEFAULT 0,
            is_half_lab INTEGER NOT NULL DEFAULT 0,
            num_periods INTEGER NOT NULL DEFAULT 1,
            lead_teacher_id TEXT,
            assist_teacher_1_id TEXT,
            assist_teacher_2_id TEXT,
            room_no TEXT,
            grp TEXT,
            lab_room TEXT,
            lab_group_id TEXT,
            is_continuation INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(day_id) REFERENCES days(id),
            FOREIGN KEY(period_id) REFERENCES periods(id)
        )",
        [],
    )?;
    ensure_routine_entries_assist_3(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_routine_entries_class ON routine_entries(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_routine_entries_day ON routine_entries(day_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_routine_entries_lead ON routine_entries(lead_teacher_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_routine_entries_assist_3(conn: &Connection) -> anyhow::Result<()> {
    // Early workspaces only had two assistant-teacher slots.
    if table_has_column(conn, "routine_entries", "assist_teacher_3_id")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE routine_entries ADD COLUMN assist_teacher_3_id TEXT",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
