mod analytics;
mod backup;
mod calc;
mod config;
mod db;
mod diagnosis;
mod error;
mod import;
mod insights;
mod ipc;
mod leaderboard;
mod store;

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scorebookd", version, about = "Exam score analytics sidecar")]
struct Cli {
    /// Workspace directory to open at startup.
    #[arg(long, value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// Curriculum JSON used instead of the workspace's curriculum.json.
    #[arg(long, value_name = "FILE")]
    curriculum: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    // stdout carries responses; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();
    let mut state = ipc::AppState::new(cli.curriculum);
    if let Some(workspace) = cli.workspace {
        ipc::select_workspace(&mut state, workspace)?;
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer to.
                tracing::warn!(error = %e, "unparseable request line");
                let body = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", body);
                let _ = stdout.flush();
                continue;
            }
        };

        tracing::debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    if let Some(store) = state.store.take() {
        store.close()?;
    }
    Ok(())
}
