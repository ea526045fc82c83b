use crate::backup::{self, BACKUP_DIR};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_backup_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(workspace), Some(store)) = (state.workspace.as_ref(), state.store.as_ref()) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(db_path) = store.db_path() else {
        return err(&req.id, "backup_failed", "store has no database file", None);
    };
    match backup::backup_database(db_path, &workspace.join(BACKUP_DIR)) {
        Ok(path) => ok(
            &req.id,
            json!({ "path": path.map(|p| p.to_string_lossy().to_string()) }),
        ),
        Err(e) => err(&req.id, "backup_failed", format!("{e:#}"), None),
    }
}

fn handle_backup_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.as_ref() else {
        return ok(&req.id, json!({ "backups": [] }));
    };
    match backup::list_backups(&workspace.join(BACKUP_DIR)) {
        Ok(backups) => ok(&req.id, json!({ "backups": backups })),
        Err(e) => err(&req.id, "backup_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.create" => Some(handle_backup_create(state, req)),
        "backup.list" => Some(handle_backup_list(state, req)),
        _ => None,
    }
}
