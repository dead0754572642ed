#![cfg(not(tarpaulin_include))]

use serde_json::Value;
use sheet_sync::config::state_dir;
use sheet_sync::{ConfirmPrompt, FileBackend, SyncClient, SystemClock};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Instant;

/// Asks on stdin before a reset.
struct StdinConfirm;

impl ConfirmPrompt for StdinConfirm {
    fn confirm(&self, message: &str) -> bool {
        print!("{} [y/N] ", message);
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "y" | "Y" | "yes")
    }
}

fn print_help() {
    println!("Commands:");
    println!("  q: Quit");
    println!("  show: Print the current state");
    println!("  <key>=<json>: Set a top-level field, e.g. activeTab=\"query\"");
    println!("  reset: Clear the workspace (asks first)");
    println!("  export <file.xlsx>: Write the workspace as a workbook");
    println!("  csv <sequence>: Print one sequence as CSV");
}

/// Local-only editor for the durable client state.
///
/// State lives in `$SHEET_SYNC_STATE_DIR` (default `.sheet-sync`) and is never
/// sent anywhere.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let backend = FileBackend::new(state_dir());
    let mut client = SyncClient::local_only(backend, Arc::new(SystemClock)).with_confirm(StdinConfirm);
    let session_id = client.start().await?;
    println!("Local workspace {}", session_id);

    let mut status = String::from("ok");
    let mut start_time = Instant::now();
    let stdin = io::stdin();

    loop {
        print!("[{:.1}] ({}) > ", start_time.elapsed().as_secs_f64(), status);
        io::stdout().flush()?;

        let mut command = String::new();
        if stdin.lock().read_line(&mut command)? == 0 {
            break;
        }
        let command = command.trim();
        start_time = Instant::now();
        status = String::from("ok");

        match command {
            "" => status = String::from("invalid command"),
            "q" => break,
            "help" => print_help(),
            "show" => println!("{}", serde_json::to_string_pretty(client.read())?),
            "reset" => {
                if let Err(e) = client.reset().await {
                    status = e.to_string();
                }
            }
            _ => {
                if let Some(path) = command.strip_prefix("export ") {
                    match client.export_xlsx() {
                        Ok(bytes) => std::fs::write(path.trim(), bytes)?,
                        Err(e) => status = e.to_string(),
                    }
                } else if let Some(sequence) = command.strip_prefix("csv ") {
                    match client.export_csv(sequence.trim()) {
                        Ok(csv) => print!("{}", csv),
                        Err(e) => status = e.to_string(),
                    }
                } else if let Some((key, raw)) = command.split_once('=') {
                    match serde_json::from_str::<Value>(raw.trim()) {
                        Ok(value) => {
                            client.set(key.trim(), value);
                        }
                        Err(_) => status = String::from("value must be JSON"),
                    }
                } else {
                    status = String::from("invalid command");
                }
            }
        }
    }

    Ok(())
}
