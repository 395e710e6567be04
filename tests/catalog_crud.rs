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

#[test]
fn department_programme_semester_chain() {
    let workspace = temp_dir("routined-catalog-chain");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let dept = request_ok(
        &mut stdin,
        &mut reader,
        "dept",
        "departments.create",
        json!({ "name": "Computer Engineering", "code": "CT" }),
    );
    let dept_id = dept["id"].as_str().expect("dept id").to_string();

    let prog = request_ok(
        &mut stdin,
        &mut reader,
        "prog",
        "programmes.create",
        json!({ "name": "Diploma in Computer Engineering", "code": "DCT", "departmentId": dept_id }),
    );
    let prog_id = prog["id"].as_str().expect("prog id").to_string();

    request_ok(
        &mut stdin,
        &mut reader,
        "sem",
        "semesters.create",
        json!({ "name": "Third Semester", "semesterNumber": 3, "programmeId": prog_id }),
    );

    let progs = request_ok(&mut stdin, &mut reader, "progs", "programmes.list", json!({}));
    let listed = progs["programmes"].as_array().expect("programmes");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["departmentName"], json!("Computer Engineering"));

    let sems = request_ok(&mut stdin, &mut reader, "sems", "semesters.list", json!({}));
    assert_eq!(sems["semesters"][0]["semesterNumber"], json!(3));
    assert_eq!(sems["semesters"][0]["isActive"], json!(true));

    // Duplicate department code is a conflict, not a silent second row.
    let dup = request(
        &mut stdin,
        &mut reader,
        "dup",
        "departments.create",
        json!({ "name": "Civil Engineering", "code": "CT" }),
    );
    assert_eq!(dup["ok"], json!(false));
    assert_eq!(dup["error"]["code"], json!("conflict"));

    child.kill().ok();
}

#[test]
fn semester_subject_mapping_is_replaced_wholesale() {
    let workspace = temp_dir("routined-catalog-semsub");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let sem = request_ok(
        &mut stdin,
        &mut reader,
        "sem",
        "semesters.create",
        json!({ "name": "First Semester", "semesterNumber": 1 }),
    );
    let sem_id = sem["id"].as_str().expect("sem id").to_string();

    let mut subject_ids = Vec::new();
    for (code, name) in [("PHY-101", "Physics"), ("CHE-101", "Chemistry"), ("MAT-101", "Math")] {
        let s = request_ok(
            &mut stdin,
            &mut reader,
            code,
            "subjects.create",
            json!({ "name": name, "code": code }),
        );
        subject_ids.push(s["id"].as_str().expect("subject id").to_string());
    }

    request_ok(
        &mut stdin,
        &mut reader,
        "set-1",
        "semesterSubjects.set",
        json!({ "semesterId": sem_id, "subjectIds": [subject_ids[0], subject_ids[1]] }),
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "list-1",
        "semesterSubjects.list",
        json!({ "semesterId": sem_id }),
    );
    assert_eq!(listed["subjects"].as_array().map(|s| s.len()), Some(2));

    // A second set replaces the mapping instead of accumulating.
    request_ok(
        &mut stdin,
        &mut reader,
        "set-2",
        "semesterSubjects.set",
        json!({ "semesterId": sem_id, "subjectIds": [subject_ids[2]] }),
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "list-2",
        "semesterSubjects.list",
        json!({ "semesterId": sem_id }),
    );
    let subjects = listed["subjects"].as_array().expect("subjects");
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0]["name"], json!("Math"));

    // Teacher-subject assignment follows the same replace semantics.
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "teacher",
        "teachers.create",
        json!({ "name": "A. Rahman", "abbreviation": "AR" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "tset-1",
        "teacherSubjects.set",
        json!({ "teacherId": teacher["id"], "subjectIds": [subject_ids[0], subject_ids[2]] }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "tset-2",
        "teacherSubjects.set",
        json!({ "teacherId": teacher["id"], "subjectIds": [subject_ids[1]] }),
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "tlist",
        "teacherSubjects.list",
        json!({ "teacherId": teacher["id"] }),
    );
    let subjects = listed["subjects"].as_array().expect("teacher subjects");
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0]["name"], json!("Chemistry"));

    child.kill().ok();
}

#[test]
fn referenced_catalog_rows_refuse_deletion() {
    let workspace = temp_dir("routined-catalog-guards");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let day = request_ok(
        &mut stdin,
        &mut reader,
        "day",
        "days.create",
        json!({ "name": "Sunday", "sortOrder": 1 }),
    );
    let period = request_ok(
        &mut stdin,
        &mut reader,
        "period",
        "periods.create",
        json!({ "name": "1st", "startTime": "07:00", "endTime": "07:50", "sortOrder": 1 }),
    );
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "teacher",
        "teachers.create",
        json!({ "name": "A. Rahman", "abbreviation": "AR" }),
    );
    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "subject",
        "subjects.create",
        json!({ "name": "Physics", "code": "PHY-101" }),
    );
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "class",
        "classes.create",
        json!({ "name": "CSE 1st Sem" }),
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "save",
        "routine.save",
        json!({
            "classId": class["id"],
            "entries": [{
                "dayId": day["id"],
                "periodId": period["id"],
                "subjectId": subject["id"],
                "leadTeacherId": teacher["id"],
            }],
        }),
    );

    for (method, id_val) in [
        ("teachers.delete", &teacher["id"]),
        ("subjects.delete", &subject["id"]),
        ("days.delete", &day["id"]),
        ("periods.delete", &period["id"]),
        ("classes.delete", &class["id"]),
    ] {
        let resp = request(
            &mut stdin,
            &mut reader,
            method,
            method,
            json!({ "id": id_val }),
        );
        assert_eq!(resp["ok"], json!(false), "{method} should be refused");
        assert_eq!(resp["error"]["code"], json!("in_use"), "{method}");
        assert_eq!(resp["error"]["details"]["entryCount"], json!(1), "{method}");
    }

    // After the routine goes away the same deletes succeed.
    request_ok(
        &mut stdin,
        &mut reader,
        "del-routine",
        "routine.delete",
        json!({ "classId": class["id"] }),
    );
    for (method, id_val) in [
        ("teachers.delete", &teacher["id"]),
        ("subjects.delete", &subject["id"]),
        ("days.delete", &day["id"]),
        ("periods.delete", &period["id"]),
        ("classes.delete", &class["id"]),
    ] {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("retry-{method}"),
            method,
            json!({ "id": id_val }),
        );
    }

    child.kill().ok();
}

#[test]
fn updates_patch_only_the_given_fields() {
    let workspace = temp_dir("routined-catalog-update");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "teacher",
        "teachers.create",
        json!({ "name": "A. Rahman", "abbreviation": "AR", "email": "ar@example.edu" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "update",
        "teachers.update",
        json!({ "id": teacher["id"], "phone": "017000" }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "list", "teachers.list", json!({}));
    let row = &listed["teachers"][0];
    assert_eq!(row["phone"], json!("017000"));
    assert_eq!(row["email"], json!("ar@example.edu"));
    assert_eq!(row["name"], json!("A. Rahman"));
    assert_eq!(row["recruitment"], json!("Full Time"));

    let missing = request(
        &mut stdin,
        &mut reader,
        "missing",
        "teachers.update",
        json!({ "id": "no-such-id", "phone": "x" }),
    );
    assert_eq!(missing["ok"], json!(false));
    assert_eq!(missing["error"]["code"], json!("not_found"));

    let day = request_ok(
        &mut stdin,
        &mut reader,
        "day",
        "days.create",
        json!({ "name": "Sunday", "sortOrder": 1 }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "day-update",
        "days.update",
        json!({ "id": day["id"], "name": "Saturday" }),
    );
    let days = request_ok(&mut stdin, &mut reader, "days", "days.list", json!({}));
    assert_eq!(days["days"][0]["name"], json!("Saturday"));
    assert_eq!(days["days"][0]["sortOrder"], json!(1));

    child.kill().ok();
}
