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
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut child = Command::new(exe)
        .env("SCHOOLD_REMOTE_ENABLED", "0")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
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
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
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
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

#[test]
fn enrolled_students_can_be_edited_filtered_and_exported() {
    let workspace = temp_dir("schoold-roster");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let mut student_ids = Vec::new();
    for (i, (name, class)) in [("Aarav Sharma", "Class 5"), ("Diya Patel", "Class 6")]
        .iter()
        .enumerate()
    {
        let submitted = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "admissions.submit",
            json!({ "name": name, "age": 9, "class_applied": class, "parent_contact": "+91-9000000000" }),
        );
        let admission_id = submitted["admission"]["id"].as_i64().expect("admission id");
        let approved = request_ok(
            &mut stdin,
            &mut reader,
            &format!("a{}", i),
            "admissions.setStatus",
            json!({ "admissionId": admission_id, "status": "approved" }),
        );
        student_ids.push(approved["student"]["id"].as_i64().expect("student id"));
    }

    let rolls = request_ok(&mut stdin, &mut reader, "2", "students.list", json!({}));
    let rolls: Vec<String> = rolls["students"]
        .as_array()
        .expect("students")
        .iter()
        .map(|s| s["roll_number"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(rolls.len(), 2);
    assert_ne!(rolls[0], rolls[1]);
    assert!(rolls[1].ends_with("002"), "{:?}", rolls);

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.update",
        json!({
            "studentId": student_ids[1],
            "patch": { "status": "transferred", "parentEmail": "patel@example.com", "id": 1 }
        }),
    );
    assert_eq!(updated["student"]["id"], student_ids[1]);
    assert_eq!(updated["student"]["status"], "transferred");
    assert_eq!(updated["student"]["parent_email"], "patel@example.com");

    let invalid = request(
        &mut stdin,
        &mut reader,
        "4",
        "students.update",
        json!({ "studentId": student_ids[0], "patch": { "class": "", "parent_email": "nope" } }),
    );
    assert_eq!(invalid["error"]["code"], "validation_failed");
    let fields = &invalid["error"]["details"]["fields"];
    assert!(fields["class"].is_string());
    assert!(fields["parent_email"].is_string());

    let active = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.list",
        json!({ "status": "active" }),
    );
    assert_eq!(active["students"].as_array().map(|s| s.len()), Some(1));
    let class6 = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.list",
        json!({ "class": "Class 6" }),
    );
    assert_eq!(class6["students"][0]["name"], "Diya Patel");

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.exportCsv",
        json!({ "studentId": student_ids[0] }),
    );
    assert_eq!(exported["rowCount"], 1);
    let csv = exported["csv"].as_str().expect("csv");
    assert!(csv.starts_with("\"Name\",\"Roll Number\""));
    assert!(csv.contains("\"Aarav Sharma\""));

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.delete",
        json!({ "studentId": student_ids[0] }),
    );
    assert_eq!(deleted["deleted"], student_ids[0]);
    let gone = request(
        &mut stdin,
        &mut reader,
        "9",
        "students.exportCsv",
        json!({ "studentId": student_ids[0] }),
    );
    assert_eq!(gone["error"]["code"], "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn announcements_can_be_deactivated_and_deleted() {
    let workspace = temp_dir("schoold-announcements");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let invalid = request(
        &mut stdin,
        &mut reader,
        "2",
        "announcements.create",
        json!({ "title": "No body" }),
    );
    assert_eq!(invalid["error"]["code"], "validation_failed");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "announcements.create",
        json!({ "title": "Sports Day", "content": "Feb 14", "date": "2025-02-01" }),
    );
    assert_eq!(created["announcement"]["date"], "2025-02-01");
    assert_eq!(created["announcement"]["status"], "active");
    let id = created["announcement"]["id"].as_i64().expect("id");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "announcements.update",
        json!({ "announcementId": id, "patch": { "status": "inactive" } }),
    );
    assert_eq!(updated["announcement"]["status"], "inactive");
    assert_eq!(updated["announcement"]["title"], "Sports Day");

    let active = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "announcements.list",
        json!({ "activeOnly": true }),
    );
    assert_eq!(active["announcements"].as_array().map(|a| a.len()), Some(0));
    let all = request_ok(&mut stdin, &mut reader, "6", "announcements.list", json!({}));
    assert_eq!(all["announcements"].as_array().map(|a| a.len()), Some(1));

    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "announcements.delete",
        json!({ "announcementId": id }),
    );
    let missing = request(
        &mut stdin,
        &mut reader,
        "8",
        "announcements.update",
        json!({ "announcementId": id, "patch": { "title": "x" } }),
    );
    assert_eq!(missing["error"]["code"], "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
