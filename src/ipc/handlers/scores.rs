use crate::analytics::Analytics;
use crate::config::{DEFAULT_TARGET_RANK, DEFAULT_TREND_LIMIT};
use crate::insights;
use crate::ipc::error::{ok, score_err};
use crate::ipc::helpers::{db_conn, optional_i64, optional_str, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_student_result(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let exam_id = match optional_i64(req, "examId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match Analytics::new(conn, &state.curriculum).student_exam_result(&student_id, exam_id) {
        Ok(result) => ok(&req.id, json!(result)),
        Err(e) => score_err(&req.id, e),
    }
}

fn handle_student_trend(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let limit = match optional_i64(req, "limit") {
        Ok(v) => v.unwrap_or(DEFAULT_TREND_LIMIT),
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match Analytics::new(conn, &state.curriculum).student_trend(&student_id, limit) {
        Ok(trend) => ok(&req.id, json!({ "trend": trend })),
        Err(e) => score_err(&req.id, e),
    }
}

fn handle_student_exams(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match Analytics::new(conn, &state.curriculum).student_exams(&student_id) {
        Ok(exams) => ok(&req.id, json!({ "exams": exams })),
        Err(e) => score_err(&req.id, e),
    }
}

fn handle_previous_subjects(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let current_exam_id = match required_i64(req, "currentExamId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let current_date = optional_str(req, "currentExamDate");
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match Analytics::new(conn, &state.curriculum).previous_subjects(
        &student_id,
        current_date.as_deref(),
        current_exam_id,
    ) {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => score_err(&req.id, e),
    }
}

fn handle_target_reference(state: &mut AppState, req: &Request) -> serde_json::Value {
    let exam_id = match required_i64(req, "examId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let target_rank = match required_i64(req, "targetRank") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match Analytics::new(conn, &state.curriculum).target_reference(exam_id, target_rank) {
        Ok(reference) => ok(&req.id, json!(reference)),
        Err(e) => score_err(&req.id, e),
    }
}

fn handle_dashboard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let exam_id = match optional_i64(req, "examId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let target_rank = match optional_i64(req, "targetRank") {
        Ok(v) => v.unwrap_or(DEFAULT_TARGET_RANK),
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let analytics = Analytics::new(conn, &state.curriculum);
    match insights::dashboard(
        &analytics,
        &student_id,
        exam_id,
        target_rank,
        DEFAULT_TREND_LIMIT,
    ) {
        Ok(dashboard) => ok(&req.id, json!(dashboard)),
        Err(e) => score_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.studentResult" => Some(handle_student_result(state, req)),
        "scores.studentTrend" => Some(handle_student_trend(state, req)),
        "scores.studentExams" => Some(handle_student_exams(state, req)),
        "scores.previousSubjects" => Some(handle_previous_subjects(state, req)),
        "scores.targetReference" => Some(handle_target_reference(state, req)),
        "scores.dashboard" => Some(handle_dashboard(state, req)),
        _ => None,
    }
}
