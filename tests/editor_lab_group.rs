use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_routined");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn routined");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

struct Seed {
    day_id: String,
    period_ids: Vec<String>,
    teacher_ids: Vec<String>,
    subject_ids: Vec<String>,
    class_id: String,
}

fn seed_lab_world(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Seed {
    let day = request_ok(
        stdin,
        reader,
        "seed-day",
        "days.create",
        json!({ "name": "Sunday", "sortOrder": 1 }),
    );
    let day_id = day["id"].as_str().expect("day id").to_string();

    let times = [
        ("1st", "07:00", "07:50"),
        ("2nd", "07:50", "08:40"),
        ("3rd", "08:40", "09:30"),
        ("4th", "09:30", "10:20"),
    ];
    let mut period_ids = Vec::new();
    for (i, (name, start, end)) in times.iter().enumerate() {
        let p = request_ok(
            stdin,
            reader,
            &format!("seed-period-{i}"),
            "periods.create",
            json!({
                "name": name,
                "startTime": start,
                "endTime": end,
                "sortOrder": (i + 1) as i64,
            }),
        );
        period_ids.push(p["id"].as_str().expect("period id").to_string());
    }

    let mut teacher_ids = Vec::new();
    for (abbr, name) in [("AR", "A. Rahman"), ("SA", "S. Akter")] {
        let t = request_ok(
            stdin,
            reader,
            &format!("seed-teacher-{abbr}"),
            "teachers.create",
            json!({ "name": name, "abbreviation": abbr }),
        );
        teacher_ids.push(t["id"].as_str().expect("teacher id").to_string());
    }

    let mut subject_ids = Vec::new();
    for (code, name) in [("DBL-201", "Database Lab"), ("NWL-201", "Networks Lab")] {
        let s = request_ok(
            stdin,
            reader,
            &format!("seed-subject-{code}"),
            "subjects.create",
            json!({ "name": name, "code": code, "isLab": true }),
        );
        subject_ids.push(s["id"].as_str().expect("subject id").to_string());
    }

    let class = request_ok(
        stdin,
        reader,
        "seed-class",
        "classes.create",
        json!({ "name": "CSE 3rd Sem", "section": "B" }),
    );

    Seed {
        day_id,
        period_ids,
        teacher_ids,
        subject_ids,
        class_id: class["id"].as_str().expect("class id").to_string(),
    }
}

#[test]
fn multi_subject_lab_survives_a_save_and_reload() {
    let workspace = temp_dir("routined-lab-roundtrip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed_lab_world(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "editor.open",
        json!({ "classId": seed.class_id }),
    );
    let placed = request_ok(
        &mut stdin,
        &mut reader,
        "place-lab",
        "editor.placeLab",
        json!({
            "dayId": seed.day_id,
            "periodId": seed.period_ids[1],
            "subjects": [
                {
                    "subjectId": seed.subject_ids[0],
                    "subjectName": "Database Lab",
                    "isHalfLab": true,
                    "numPeriods": 2,
                    "leadTeacher": { "id": seed.teacher_ids[0], "name": "A. Rahman" },
                    "group": "Y",
                    "labRoom": "Lab-A",
                },
                {
                    "subjectId": seed.subject_ids[1],
                    "subjectName": "Networks Lab",
                    "isHalfLab": true,
                    "numPeriods": 1,
                    "leadTeacher": { "id": seed.teacher_ids[1], "name": "S. Akter" },
                    "group": "Z",
                    "labRoom": "Lab-B",
                },
            ],
        }),
    );
    let lab_group_id = placed["labGroupId"].as_str().expect("lab group id").to_string();

    let grid = request_ok(&mut stdin, &mut reader, "grid", "editor.grid", json!({}));
    let entries = grid["entries"].as_array().cloned().unwrap_or_default();
    // Two sub-subject rows at the anchor plus one continuation marker.
    assert_eq!(entries.len(), 3, "{grid}");
    let lab_rows: Vec<_> = entries
        .iter()
        .filter(|e| e["labGroupId"] == json!(lab_group_id))
        .collect();
    assert_eq!(lab_rows.len(), 2);
    assert!(lab_rows.iter().all(|r| r["periodId"] == json!(seed.period_ids[1])));
    // Each sub-subject keeps its own span.
    let spans: Vec<i64> = lab_rows
        .iter()
        .filter_map(|r| r["numPeriods"].as_i64())
        .collect();
    assert!(spans.contains(&2) && spans.contains(&1), "spans: {spans:?}");

    let flushed = request_ok(&mut stdin, &mut reader, "flush", "editor.flush", json!({}));
    assert_eq!(flushed["saved"], json!(3));

    let persisted = request_ok(
        &mut stdin,
        &mut reader,
        "load",
        "routine.getByClass",
        json!({ "classId": seed.class_id }),
    );
    let rows = persisted["entries"].as_array().expect("persisted rows");
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows.iter()
            .filter(|r| r["labGroupId"] == json!(lab_group_id))
            .count(),
        2
    );
    // Display names come back from the joins, not from stored text.
    assert!(rows
        .iter()
        .any(|r| r["subjectName"] == json!("Database Lab")));

    // Re-opening folds the group back into one anchored cell.
    request_ok(
        &mut stdin,
        &mut reader,
        "reopen",
        "editor.open",
        json!({ "classId": seed.class_id }),
    );
    let grid = request_ok(&mut stdin, &mut reader, "grid2", "editor.grid", json!({}));
    let entries = grid["entries"].as_array().cloned().unwrap_or_default();
    assert_eq!(entries.len(), 3);
    assert_eq!(
        entries
            .iter()
            .filter(|e| e["labGroupId"] == json!(lab_group_id))
            .count(),
        2
    );

    child.kill().ok();
}

#[test]
fn lab_subject_conflicts_check_each_sub_span() {
    let workspace = temp_dir("routined-lab-conflict");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed_lab_world(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "editor.open",
        json!({ "classId": seed.class_id }),
    );
    // A. Rahman teaches a plain class in period 3.
    request_ok(
        &mut stdin,
        &mut reader,
        "place-theory",
        "editor.place",
        json!({
            "dayId": seed.day_id,
            "periodId": seed.period_ids[2],
            "subjectId": seed.subject_ids[1],
            "subjectName": "Networks Lab",
            "leadTeacher": { "id": seed.teacher_ids[0], "name": "A. Rahman" },
        }),
    );

    // The lab anchors at period 2; only the span-2 sub reaches period 3.
    let resp = request(
        &mut stdin,
        &mut reader,
        "place-lab",
        "editor.placeLab",
        json!({
            "dayId": seed.day_id,
            "periodId": seed.period_ids[1],
            "subjects": [
                {
                    "subjectId": seed.subject_ids[0],
                    "subjectName": "Database Lab",
                    "numPeriods": 2,
                    "leadTeacher": { "id": seed.teacher_ids[0], "name": "A. Rahman" },
                },
            ],
        }),
    );
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("teacher_conflict"));

    // With a span of 1 the same lab fits.
    request_ok(
        &mut stdin,
        &mut reader,
        "place-lab-short",
        "editor.placeLab",
        json!({
            "dayId": seed.day_id,
            "periodId": seed.period_ids[1],
            "subjects": [
                {
                    "subjectId": seed.subject_ids[0],
                    "subjectName": "Database Lab",
                    "numPeriods": 1,
                    "leadTeacher": { "id": seed.teacher_ids[0], "name": "A. Rahman" },
                },
            ],
        }),
    );

    child.kill().ok();
}
