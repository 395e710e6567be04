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
    day_ids: Vec<String>,
    period_ids: Vec<String>,
    teacher_id: String,
    subject_id: String,
    class_id: String,
}

fn seed_two_days(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Seed {
    let mut day_ids = Vec::new();
    for (i, name) in ["Sunday", "Monday"].iter().enumerate() {
        let day = request_ok(
            stdin,
            reader,
            &format!("seed-day-{i}"),
            "days.create",
            json!({ "name": name, "sortOrder": (i + 1) as i64 }),
        );
        day_ids.push(day["id"].as_str().expect("day id").to_string());
    }

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

    let teacher = request_ok(
        stdin,
        reader,
        "seed-teacher",
        "teachers.create",
        json!({ "name": "A. Rahman", "abbreviation": "AR" }),
    );
    let subject = request_ok(
        stdin,
        reader,
        "seed-subject",
        "subjects.create",
        json!({ "name": "Physics", "code": "PHY-101" }),
    );
    let class = request_ok(
        stdin,
        reader,
        "seed-class",
        "classes.create",
        json!({ "name": "CSE 1st Sem", "section": "A" }),
    );

    Seed {
        day_ids,
        period_ids,
        teacher_id: teacher["id"].as_str().expect("teacher id").to_string(),
        subject_id: subject["id"].as_str().expect("subject id").to_string(),
        class_id: class["id"].as_str().expect("class id").to_string(),
    }
}

fn entry_at<'a>(
    entries: &'a [serde_json::Value],
    day_id: &str,
    period_id: &str,
) -> Option<&'a serde_json::Value> {
    entries
        .iter()
        .find(|e| e["dayId"] == json!(day_id) && e["periodId"] == json!(period_id))
}

#[test]
fn move_vacates_source_and_fills_target() {
    let workspace = temp_dir("routined-move");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed_two_days(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "editor.open",
        json!({ "classId": seed.class_id }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "place",
        "editor.place",
        json!({
            "dayId": seed.day_ids[0],
            "periodId": seed.period_ids[0],
            "subjectId": seed.subject_id,
            "subjectName": "Physics",
            "numPeriods": 2,
            "leadTeacher": { "id": seed.teacher_id, "name": "A. Rahman" },
        }),
    );

    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "move",
        "editor.move",
        json!({
            "sourceDayId": seed.day_ids[0],
            "sourcePeriodId": seed.period_ids[0],
            "targetDayId": seed.day_ids[0],
            "targetPeriodId": seed.period_ids[2],
        }),
    );
    assert_eq!(moved["moved"], json!(true));

    let grid = request_ok(&mut stdin, &mut reader, "grid", "editor.grid", json!({}));
    let entries = grid["entries"].as_array().cloned().unwrap_or_default();
    assert_eq!(entries.len(), 2, "anchor and continuation only: {grid}");
    assert!(entry_at(&entries, &seed.day_ids[0], &seed.period_ids[0]).is_none());
    assert!(entry_at(&entries, &seed.day_ids[0], &seed.period_ids[1]).is_none());

    let anchor =
        entry_at(&entries, &seed.day_ids[0], &seed.period_ids[2]).expect("anchor at target");
    assert_eq!(anchor["isContinuation"], json!(false));
    assert_eq!(anchor["numPeriods"], json!(2));
    let cont = entry_at(&entries, &seed.day_ids[0], &seed.period_ids[3])
        .expect("continuation at target+1");
    assert_eq!(cont["isContinuation"], json!(true));

    child.kill().ok();
}

#[test]
fn move_onto_an_occupied_range_is_rejected() {
    let workspace = temp_dir("routined-move-occupied");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed_two_days(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "editor.open",
        json!({ "classId": seed.class_id }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "place-src",
        "editor.place",
        json!({
            "dayId": seed.day_ids[0],
            "periodId": seed.period_ids[0],
            "subjectId": seed.subject_id,
            "subjectName": "Physics",
            "leadTeacher": { "id": seed.teacher_id, "name": "A. Rahman" },
        }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "place-blocker",
        "editor.place",
        json!({
            "dayId": seed.day_ids[0],
            "periodId": seed.period_ids[2],
            "subjectId": "BREAK",
        }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "move",
        "editor.move",
        json!({
            "sourceDayId": seed.day_ids[0],
            "sourcePeriodId": seed.period_ids[0],
            "targetDayId": seed.day_ids[0],
            "targetPeriodId": seed.period_ids[2],
        }),
    );
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("slot_occupied"));

    child.kill().ok();
}

#[test]
fn copy_leaves_the_source_in_place() {
    let workspace = temp_dir("routined-copy");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed_two_days(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "editor.open",
        json!({ "classId": seed.class_id }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "place",
        "editor.place",
        json!({
            "dayId": seed.day_ids[0],
            "periodId": seed.period_ids[0],
            "subjectId": seed.subject_id,
            "subjectName": "Physics",
            "leadTeacher": { "id": seed.teacher_id, "name": "A. Rahman" },
        }),
    );

    // Copying to the same period on another day keeps the source; the
    // teacher is only double-booked per day, never across days.
    let copied = request_ok(
        &mut stdin,
        &mut reader,
        "copy",
        "editor.copy",
        json!({
            "sourceDayId": seed.day_ids[0],
            "sourcePeriodId": seed.period_ids[0],
            "targetDayId": seed.day_ids[1],
            "targetPeriodId": seed.period_ids[0],
        }),
    );
    assert_eq!(copied["copied"], json!(true));

    let grid = request_ok(&mut stdin, &mut reader, "grid", "editor.grid", json!({}));
    let entries = grid["entries"].as_array().cloned().unwrap_or_default();
    assert!(entry_at(&entries, &seed.day_ids[0], &seed.period_ids[0]).is_some());
    assert!(entry_at(&entries, &seed.day_ids[1], &seed.period_ids[0]).is_some());

    child.kill().ok();
}

#[test]
fn drop_target_probe_is_cached_until_a_mutation() {
    let workspace = temp_dir("routined-drop-cache");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed_two_days(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "editor.open",
        json!({ "classId": seed.class_id }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "place",
        "editor.place",
        json!({
            "dayId": seed.day_ids[0],
            "periodId": seed.period_ids[0],
            "subjectId": seed.subject_id,
            "subjectName": "Physics",
            "leadTeacher": { "id": seed.teacher_id, "name": "A. Rahman" },
        }),
    );

    let probe = json!({
        "sourceDayId": seed.day_ids[0],
        "sourcePeriodId": seed.period_ids[0],
        "targetDayId": seed.day_ids[0],
        "targetPeriodId": seed.period_ids[2],
    });
    let first = request_ok(
        &mut stdin,
        &mut reader,
        "probe-1",
        "editor.checkDropTarget",
        probe.clone(),
    );
    assert_eq!(first["canDrop"], json!(true));
    assert_eq!(first["cached"], json!(false));

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "probe-2",
        "editor.checkDropTarget",
        probe.clone(),
    );
    assert_eq!(second["canDrop"], json!(true));
    assert_eq!(second["cached"], json!(true));

    // Occupying the probed target invalidates the cache and the verdict.
    request_ok(
        &mut stdin,
        &mut reader,
        "place-blocker",
        "editor.place",
        json!({
            "dayId": seed.day_ids[0],
            "periodId": seed.period_ids[2],
            "subjectId": "BREAK",
        }),
    );
    let third = request_ok(
        &mut stdin,
        &mut reader,
        "probe-3",
        "editor.checkDropTarget",
        probe,
    );
    assert_eq!(third["cached"], json!(false));
    assert_eq!(third["canDrop"], json!(false));

    child.kill().ok();
}
