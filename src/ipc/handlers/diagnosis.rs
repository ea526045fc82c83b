use crate::diagnosis::{self, DiagnosisKey};
use crate::ipc::error::{err, ok, score_err};
use crate::ipc::helpers::{db_conn, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

struct KeyParams {
    student_id: String,
    exam_id: i64,
    intent: String,
    model: String,
}

impl KeyParams {
    fn parse(req: &Request) -> Result<Self, serde_json::Value> {
        Ok(Self {
            student_id: required_str(req, "studentId")?,
            exam_id: required_i64(req, "examId")?,
            intent: required_str(req, "intent")?,
            model: required_str(req, "model")?,
        })
    }

    fn key(&self) -> DiagnosisKey<'_> {
        DiagnosisKey {
            student_id: &self.student_id,
            exam_id: self.exam_id,
            intent: &self.intent,
            model: &self.model,
        }
    }
}

fn handle_diagnosis_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = match KeyParams::parse(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match diagnosis::get(conn, &params.key()) {
        Ok(Some(hit)) => {
            // Entries written by older clients may be plain text.
            let decoded = serde_json::from_str::<serde_json::Value>(&hit.result)
                .unwrap_or_else(|_| json!({ "result": hit.result }));
            ok(
                &req.id,
                json!({ "diagnosis": decoded, "createdAt": hit.created_at }),
            )
        }
        Ok(None) => ok(&req.id, serde_json::Value::Null),
        Err(e) => score_err(&req.id, e),
    }
}

fn handle_diagnosis_put(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = match KeyParams::parse(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    // Strings are stored as given; anything else is stored as its JSON text.
    let result = match req.params.get("result") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(v) if !v.is_null() => v.to_string(),
        _ => return err(&req.id, "bad_params", "missing result", None),
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match diagnosis::put(conn, &params.key(), &result) {
        Ok(created_at) => ok(&req.id, json!({ "ok": true, "createdAt": created_at })),
        Err(e) => score_err(&req.id, e),
    }
}

fn handle_diagnosis_intents(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let exam_id = match required_i64(req, "examId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match diagnosis::intents(conn, &student_id, exam_id) {
        Ok(intents) => ok(&req.id, json!({ "intents": intents })),
        Err(e) => score_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "diagnosis.get" => Some(handle_diagnosis_get(state, req)),
        "diagnosis.put" => Some(handle_diagnosis_put(state, req)),
        "diagnosis.intents" => Some(handle_diagnosis_intents(state, req)),
        _ => None,
    }
}
