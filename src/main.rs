mod backup;
mod config;
mod db;
mod grading;
mod ipc;
mod model;
mod reports;
mod telemetry;

use std::io::{self, BufRead, Write};

fn main() {
    let settings = config::Settings::from_env();
    if let Err(e) = telemetry::init_tracing(&settings) {
        eprintln!("gradebookd: logging disabled: {e:?}");
    }

    let mut state = ipc::AppState::default();
    if let Some(path) = settings.workspace.as_deref() {
        if let Err(e) = ipc::open_workspace(&mut state, path) {
            tracing::error!(workspace = %path.display(), error = ?e, "failed to open configured workspace");
        }
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gradebookd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                tracing::warn!(error = %e, "malformed request line");
                let _ = writeln!(stdout, "{}", ipc::malformed_request(e.to_string()));
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    tracing::info!("stdin closed; exiting");
}
