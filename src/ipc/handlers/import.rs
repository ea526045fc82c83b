use crate::import;
use crate::ipc::error::{ok, score_err};
use crate::ipc::helpers::store;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_import_exam(state: &mut AppState, req: &Request) -> serde_json::Value {
    // Reject malformed payloads before checking for a workspace so callers
    // see the more specific error.
    let payload = match import::parse_payload(&req.params) {
        Ok(p) => p,
        Err(e) => return score_err(&req.id, e),
    };
    let s = match store(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match import::import_exam(s, &state.curriculum, &payload) {
        Ok(summary) => ok(&req.id, json!(summary)),
        Err(e) => score_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.exam" => Some(handle_import_exam(state, req)),
        _ => None,
    }
}
