use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
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
    let exe = env!("CARGO_BIN_EXE_meritd");
    let mut child = Command::new(exe)
        .env_remove("MERITD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn meritd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

struct Seeded {
    subject_id: String,
    a: String,
    b: String,
    c: String,
}

fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    name: &str,
    roll: &str,
    semester: &str,
    batch: &str,
) -> String {
    let res = request_ok(
        stdin,
        reader,
        &format!("create-{}", roll),
        "students.create",
        json!({ "name": name, "rollNumber": roll, "semester": semester, "batch": batch }),
    );
    res["studentId"].as_str().expect("studentId").to_string()
}

fn save_mark(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    student_id: &str,
    subject_id: &str,
    marks: i64,
) {
    let _ = request_ok(
        stdin,
        reader,
        &format!("save-{}", student_id),
        "marks.save",
        json!({ "studentId": student_id, "marks": [{ "subjectId": subject_id, "marks": marks }] }),
    );
}

/// A 60/100, B 90/100, C 45/100, all in S1.
fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &Path) -> Seeded {
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let subject = request_ok(
        stdin,
        reader,
        "subj",
        "subjects.create",
        json!({ "name": "Mathematics", "code": "MATH1", "maxMarks": 100, "semester": "S1" }),
    );
    let subject_id = subject["subjectId"].as_str().expect("subjectId").to_string();

    let a = create_student(stdin, reader, "Asha Rao", "R-001", "S1", "2024");
    let b = create_student(stdin, reader, "Bilal Khan", "R-002", "S1", "2024");
    let c = create_student(stdin, reader, "Chen Li", "R-003", "S1", "2025");
    save_mark(stdin, reader, &a, &subject_id, 60);
    save_mark(stdin, reader, &b, &subject_id, 90);
    save_mark(stdin, reader, &c, &subject_id, 45);

    Seeded {
        subject_id,
        a,
        b,
        c,
    }
}

fn ids_and_ranks(result: &serde_json::Value) -> Vec<(String, u64)> {
    result["entries"]
        .as_array()
        .expect("entries array")
        .iter()
        .map(|e| {
            (
                e["student"]["id"].as_str().expect("student id").to_string(),
                e["rank"].as_u64().expect("rank"),
            )
        })
        .collect()
}

#[test]
fn merit_list_orders_by_percentage_with_sequential_ranks() {
    let workspace = temp_dir("meritd-merit-order");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed(&mut stdin, &mut reader, &workspace);

    let res = request_ok(&mut stdin, &mut reader, "list", "merit.list", json!({}));
    assert_eq!(
        ids_and_ranks(&res),
        vec![(s.b.clone(), 1), (s.a.clone(), 2), (s.c.clone(), 3)]
    );

    let entries = res["entries"].as_array().expect("entries");
    let pct: Vec<f64> = entries
        .iter()
        .map(|e| e["percentage"].as_f64().expect("percentage"))
        .collect();
    assert!((pct[0] - 90.0).abs() < 1e-9);
    assert!((pct[1] - 60.0).abs() < 1e-9);
    assert!((pct[2] - 45.0).abs() < 1e-9);
    assert_eq!(entries[0]["totalMarks"], json!(90));
    assert_eq!(entries[0]["maxMarks"], json!(100));
    assert_eq!(
        entries[0]["subjects"][0]["subject"]["id"],
        json!(s.subject_id)
    );

    assert_eq!(res["totalRanked"], json!(3));
    assert_eq!(res["summary"]["count"], json!(3));
    assert_eq!(res["summary"]["averagePercentage"], json!(65.0));
    assert_eq!(res["summary"]["topPercentage"], json!(90.0));
    assert_eq!(res["semesters"], json!(["S1"]));
    assert_eq!(res["batches"], json!(["2024", "2025"]));
    assert_eq!(res["rankMode"], json!("preserve"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn filtered_entries_keep_original_rank_unless_reranked() {
    let workspace = temp_dir("meritd-merit-filter");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed(&mut stdin, &mut reader, &workspace);

    let by_batch = request_ok(
        &mut stdin,
        &mut reader,
        "batch",
        "merit.list",
        json!({ "filters": { "batch": "2025" } }),
    );
    assert_eq!(ids_and_ranks(&by_batch), vec![(s.c.clone(), 3)]);
    assert_eq!(by_batch["totalRanked"], json!(3));

    let reranked = request_ok(
        &mut stdin,
        &mut reader,
        "rerank",
        "merit.list",
        json!({ "filters": { "batch": "2025" }, "rankMode": "rerank" }),
    );
    assert_eq!(ids_and_ranks(&reranked), vec![(s.c.clone(), 1)]);

    let bounded = request_ok(
        &mut stdin,
        &mut reader,
        "bounds",
        "merit.list",
        json!({ "filters": { "minPercentage": 50, "maxPercentage": "89.5" } }),
    );
    assert_eq!(ids_and_ranks(&bounded), vec![(s.a.clone(), 2)]);

    let searched = request_ok(
        &mut stdin,
        &mut reader,
        "search",
        "merit.list",
        json!({ "filters": { "search": "  CHEN " } }),
    );
    assert_eq!(ids_and_ranks(&searched), vec![(s.c.clone(), 3)]);

    let by_roll = request_ok(
        &mut stdin,
        &mut reader,
        "roll",
        "merit.list",
        json!({ "filters": { "search": "r-002" } }),
    );
    assert_eq!(ids_and_ranks(&by_roll), vec![(s.b.clone(), 1)]);

    // "ALL" labels and unusable bounds leave the list untouched.
    let unfiltered = request_ok(
        &mut stdin,
        &mut reader,
        "all",
        "merit.list",
        json!({ "filters": { "semester": "ALL", "batch": "", "minPercentage": "abc" } }),
    );
    assert_eq!(ids_and_ranks(&unfiltered).len(), 3);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn invalid_filter_payloads_are_rejected() {
    let workspace = temp_dir("meritd-merit-bad-filter");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = seed(&mut stdin, &mut reader, &workspace);

    for (id, params) in [
        ("f1", json!({ "filters": ["S1"] })),
        ("f2", json!({ "rankMode": "dense" })),
        ("f3", json!({ "rankMode": 5 })),
        ("f4", json!({ "rankMode": true })),
    ] {
        let payload = json!({ "id": id, "method": "merit.list", "params": params });
        writeln!(stdin, "{}", payload).expect("write request");
        stdin.flush().expect("flush request");
        let mut line = String::new();
        reader.read_line(&mut line).expect("read response line");
        let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
        assert_eq!(value["ok"], json!(false), "{}", id);
        assert_eq!(value["error"]["code"], json!("bad_params"), "{}", id);
    }

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn semester_change_drops_marks_from_the_previous_semester() {
    let workspace = temp_dir("meritd-merit-semester");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "move",
        "students.update",
        json!({ "studentId": s.b, "patch": { "semester": "S2" } }),
    );
    let res = request_ok(&mut stdin, &mut reader, "after-move", "merit.list", json!({}));
    assert_eq!(
        ids_and_ranks(&res),
        vec![(s.a.clone(), 1), (s.c.clone(), 2)]
    );

    // The S1 mark is still stored; it just no longer counts.
    let marks = request_ok(
        &mut stdin,
        &mut reader,
        "marks",
        "marks.list",
        json!({ "studentId": s.b }),
    );
    assert_eq!(marks["marks"][0]["semester"], json!("S1"));

    save_mark(&mut stdin, &mut reader, &s.b, &s.subject_id, 100);
    let res = request_ok(&mut stdin, &mut reader, "after-save", "merit.list", json!({}));
    assert_eq!(ids_and_ranks(&res)[0], (s.b.clone(), 1));
    assert_eq!(res["entries"][0]["student"]["semester"], json!("S2"));
    assert_eq!(res["semesters"], json!(["S1", "S2"]));

    let s2_only = request_ok(
        &mut stdin,
        &mut reader,
        "s2",
        "merit.list",
        json!({ "filters": { "semester": "S2" } }),
    );
    assert_eq!(ids_and_ranks(&s2_only), vec![(s.b.clone(), 1)]);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn tied_students_keep_listing_order() {
    let workspace = temp_dir("meritd-merit-ties");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "subj",
        "subjects.create",
        json!({ "name": "History", "code": "HIS1", "maxMarks": 50, "semester": "S1" }),
    );
    let subject_id = subject["subjectId"].as_str().expect("subjectId").to_string();

    // Created out of name order; listing is by name.
    let zed = create_student(&mut stdin, &mut reader, "zed", "T-3", "S1", "");
    let amy = create_student(&mut stdin, &mut reader, "Amy", "T-1", "S1", "");
    let low = create_student(&mut stdin, &mut reader, "Moe", "T-2", "S1", "");
    save_mark(&mut stdin, &mut reader, &zed, &subject_id, 35);
    save_mark(&mut stdin, &mut reader, &amy, &subject_id, 35);
    save_mark(&mut stdin, &mut reader, &low, &subject_id, 20);

    let res = request_ok(&mut stdin, &mut reader, "list", "merit.list", json!({}));
    assert_eq!(
        ids_and_ranks(&res),
        vec![(amy, 1), (zed, 2), (low, 3)]
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn students_without_marks_are_not_ranked() {
    let workspace = temp_dir("meritd-merit-unmarked");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed(&mut stdin, &mut reader, &workspace);

    let _ = create_student(&mut stdin, &mut reader, "Dev Patel", "R-004", "S1", "2024");
    let res = request_ok(&mut stdin, &mut reader, "list", "merit.list", json!({}));
    assert_eq!(res["totalRanked"], json!(3));

    // Removing the only subject cascades its marks away, leaving nobody ranked.
    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "del",
        "subjects.delete",
        json!({ "subjectId": s.subject_id }),
    );
    assert_eq!(removed["marksRemoved"], json!(3));
    let res = request_ok(&mut stdin, &mut reader, "empty", "merit.list", json!({}));
    assert_eq!(res["entries"], json!([]));
    assert_eq!(res["summary"]["count"], json!(0));
    assert_eq!(res["summary"]["averagePercentage"], json!(0.0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
