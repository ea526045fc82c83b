mod test_support;

use serde_json::json;
use test_support::{exam_row, request_ok, spawn_sidecar, temp_dir};

fn import(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    id: &str,
    name: &str,
    date: &str,
    data: serde_json::Value,
) -> i64 {
    let summary = request_ok(
        stdin,
        reader,
        id,
        "import.exam",
        json!({ "examName": name, "examDate": date, "data": data }),
    );
    summary["exam_id"].as_i64().expect("exam id")
}

#[test]
fn dashboard_bundles_history_benchmark_and_insights() {
    let workspace = temp_dir("scorebook-dashboard");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let mut first_rows = vec![exam_row("me", "我", "1班", 200.0, 50, &[("数学", 100.0), ("物理", 100.0)])];
    let mut second_rows = vec![exam_row("me", "我", "1班", 210.0, 30, &[("数学", 110.0), ("物理", 100.0)])];
    for i in 1..=5_i64 {
        let id = format!("p{}", i);
        let total = 250.0 - i as f64;
        first_rows.push(exam_row(&id, "同学", "2班", total, i, &[("数学", total - 100.0), ("物理", 100.0)]));
        second_rows.push(exam_row(&id, "同学", "2班", total, i, &[("数学", total - 100.0), ("物理", 100.0)]));
    }
    let first = import(&mut stdin, &mut reader, "2", "九月月考", "2024-09-20", json!(first_rows));
    let second = import(&mut stdin, &mut reader, "3", "十月月考", "2024-10-20", json!(second_rows));

    let previous = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "scores.previousSubjects",
        json!({ "studentId": "me", "currentExamId": second, "currentExamDate": "2024-10-20" }),
    );
    assert_eq!(previous["subjects"].as_array().map(|a| a.len()), Some(2));

    let trend = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "scores.studentTrend",
        json!({ "studentId": "me" }),
    );
    let trend_ids: Vec<i64> = trend["trend"]
        .as_array()
        .expect("trend")
        .iter()
        .filter_map(|p| p["exam_id"].as_i64())
        .collect();
    assert_eq!(trend_ids, vec![first, second]);

    let target = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "scores.targetReference",
        json!({ "examId": second, "targetRank": 3 }),
    );
    // Ranks 1..=5 fall inside 3 +- 10; totals 245..=249 -> index 2 = 247.
    assert_eq!(target["sample_size"], json!(5));
    assert_eq!(target["used_fallback"], json!(false));
    assert_eq!(target["total_score"], json!(247.0));
    assert_eq!(target["subjects"]["数学"], json!(147.0));

    let dash = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "scores.dashboard",
        json!({ "studentId": "me", "targetRank": 3 }),
    );
    assert_eq!(dash["latest"]["exam_id"].as_i64(), Some(second));
    assert_eq!(dash["previous_exam"]["exam_id"].as_i64(), Some(first));
    assert_eq!(dash["insights"]["total_rank_change"]["delta"], json!(20));
    assert_eq!(
        dash["insights"]["total_rank_change"]["direction"],
        json!("improved")
    );
    let gaps = &dash["insights"]["target_gaps"];
    assert_eq!(gaps["goal_reached"], json!(false));
    assert_eq!(gaps["total_gap"], json!(37.0));
    assert_eq!(gaps["suggestions"][0]["subject"], json!("数学"));
    assert_eq!(dash["exams"].as_array().map(|a| a.len()), Some(2));

    let nobody = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "scores.dashboard",
        json!({ "studentId": "ghost" }),
    );
    assert!(nobody.is_null());

    let _ = std::fs::remove_dir_all(workspace);
}
