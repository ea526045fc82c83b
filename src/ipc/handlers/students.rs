use crate::ipc::error::{ok, score_err};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(s) = state.store.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };
    match store::list_students(s.conn()) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => score_err(&req.id, e),
    }
}

fn handle_exams_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(s) = state.store.as_ref() else {
        return ok(&req.id, json!({ "exams": [] }));
    };
    match store::list_exams(s.conn()) {
        Ok(exams) => ok(&req.id, json!({ "exams": exams })),
        Err(e) => score_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "exams.list" => Some(handle_exams_list(state, req)),
        _ => None,
    }
}
