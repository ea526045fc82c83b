use crate::config;
use crate::db::ScoreStore;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

/// Open the store under `path` and make it the active workspace. Shared with
/// the `--workspace` startup flag.
pub fn select_workspace(state: &mut AppState, path: PathBuf) -> anyhow::Result<()> {
    let store = ScoreStore::open(&path)?;
    if let Some(previous) = state.store.take() {
        if let Err(e) = previous.close() {
            tracing::warn!(error = %format!("{e:#}"), "closing previous workspace failed");
        }
    }
    state.curriculum = config::resolve_curriculum(&path, state.curriculum_override.as_ref());
    tracing::info!(workspace = %path.display(), "workspace opened");
    state.store = Some(store);
    state.workspace = Some(path);
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match select_workspace(state, path.clone()) {
        Ok(()) => ok(
            &req.id,
            json!({
                "workspacePath": path.to_string_lossy(),
                "subjects": state.curriculum.subject_names().collect::<Vec<_>>()
            }),
        ),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

fn handle_workspace_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.take() else {
        return ok(&req.id, json!({ "closed": false }));
    };
    let workspace = state.workspace.take();
    state.curriculum = config::Curriculum::default();
    if let Err(e) = store.close() {
        return err(&req.id, "db_close_failed", format!("{e:#}"), None);
    }
    if let Some(w) = workspace {
        tracing::info!(workspace = %w.display(), "workspace closed");
    }
    ok(&req.id, json!({ "closed": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "workspace.close" => Some(handle_workspace_close(state, req)),
        _ => None,
    }
}
