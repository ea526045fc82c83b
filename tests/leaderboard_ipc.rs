mod test_support;

use serde_json::json;
use test_support::{exam_row, request_ok, spawn_sidecar, temp_dir};

fn ids_and_ranks(result: &serde_json::Value) -> Vec<(String, Option<i64>, Option<i64>)> {
    result["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .map(|r| {
            (
                r["id"].as_str().unwrap_or_default().to_string(),
                r["rank"].as_i64(),
                r["class_rank"].as_i64(),
            )
        })
        .collect()
}

#[test]
fn leaderboard_modes_rank_ties_and_pass_stored_ranks() {
    let workspace = temp_dir("scorebook-leaderboard");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "import.exam",
        json!({
            "examName": "十月月考",
            "examDate": "2024-10-15",
            "data": [
                exam_row("a", "甲", "1班", 380.0, 2, &[("语文", 110.0), ("物理", 90.0), ("地理", 80.0)]),
                exam_row("b", "乙", "1班", 390.0, 1, &[("语文", 105.0), ("物理", 95.0), ("政治", 90.0)]),
                exam_row("c", "丙", "2班", 200.0, 3, &[("语文", 120.0), ("生物", 80.0)]),
            ]
        }),
    );
    let exam_id = summary["exam_id"].as_i64().expect("exam id");

    let total = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "leaderboard.get",
        json!({ "examId": exam_id }),
    );
    assert_eq!(total["subject"], json!("总分"));
    assert_eq!(total["exam"]["name"], json!("十月月考"));
    let ranks = ids_and_ranks(&total);
    assert_eq!(ranks[0], ("b".to_string(), Some(1), None));
    assert_eq!(ranks[1].0, "a");

    // 物化生: a = 200, b = 200, c = 200 -> everyone shares rank 1.
    let combo = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "leaderboard.get",
        json!({ "examId": exam_id, "subject": "物化生" }),
    );
    assert_eq!(
        ids_and_ranks(&combo),
        vec![
            ("a".to_string(), Some(1), Some(1)),
            ("b".to_string(), Some(1), Some(1)),
            ("c".to_string(), Some(1), Some(1)),
        ]
    );

    // 物化地: a = 280, b = 200, c = 120.
    let geo = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "leaderboard.get",
        json!({ "examId": exam_id, "subject": "物化地" }),
    );
    let scores: Vec<f64> = geo["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .filter_map(|r| r["score"].as_f64())
        .collect();
    assert_eq!(scores, vec![280.0, 200.0, 120.0]);
    assert_eq!(
        ids_and_ranks(&geo)[1],
        ("b".to_string(), Some(2), Some(2))
    );

    let physics = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "leaderboard.get",
        json!({ "examId": exam_id, "subject": "物理" }),
    );
    assert_eq!(physics["rows"].as_array().map(|a| a.len()), Some(2));

    let selectors = request_ok(&mut stdin, &mut reader, "7", "leaderboard.selectors", json!({}));
    let names: Vec<&str> = selectors["selectors"]
        .as_array()
        .expect("selectors")
        .iter()
        .filter_map(|s| s["name"].as_str())
        .collect();
    assert_eq!(&names[..5], &["总分", "物化生", "物化地", "物化政", "史政地"]);

    let _ = std::fs::remove_dir_all(workspace);
}
