use crate::config::TOTAL_SELECTOR;
use crate::ipc::error::{ok, score_err};
use crate::ipc::helpers::{db_conn, optional_str, required_i64};
use crate::ipc::types::{AppState, Request};
use crate::leaderboard;
use crate::store;
use serde_json::json;

fn handle_leaderboard_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let exam_id = match required_i64(req, "examId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let selector = optional_str(req, "subject").unwrap_or_else(|| TOTAL_SELECTOR.to_string());
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let exam = match store::find_exam(conn, exam_id) {
        Ok(v) => v,
        Err(e) => return score_err(&req.id, e),
    };
    match leaderboard::leaderboard(conn, &state.curriculum, exam_id, &selector) {
        Ok(rows) => ok(
            &req.id,
            json!({ "exam": exam, "subject": selector, "rows": rows }),
        ),
        Err(e) => score_err(&req.id, e),
    }
}

fn handle_leaderboard_selectors(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({ "selectors": leaderboard::selectors(&state.curriculum) }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "leaderboard.get" => Some(handle_leaderboard_get(state, req)),
        "leaderboard.selectors" => Some(handle_leaderboard_selectors(state, req)),
        _ => None,
    }
}
