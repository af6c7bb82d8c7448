//! CLI entry point.
//!
//! # Responsibility
//! - Load settings from the environment and start logging.
//! - Open the content store and print status lines.
//! - Keep the change notification client running until Ctrl-C when a
//!   subscriber URL is configured.

use adhocracy_core::db::migrations::latest_version;
use adhocracy_core::{
    core_version, init_from_settings, open_db, open_db_in_memory, ping, ChangeNotificationClient,
    Settings,
};
use log::{error, info};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_exit module=cli status=error error={}", message);
            eprintln!("adhocracy: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    let settings = Settings::from_env().map_err(|err| err.to_string())?;
    init_from_settings(&settings)?;

    let conn = match settings.db_path.as_deref() {
        Some(path) => open_db(path),
        None => open_db_in_memory(),
    }
    .map_err(|err| err.to_string())?;
    let schema_version: u32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|err| err.to_string())?;

    println!("adhocracy_core ping={}", ping());
    println!("adhocracy_core version={}", core_version());
    println!("adhocracy_core schema={schema_version}/{}", latest_version());

    let Some(client) =
        ChangeNotificationClient::from_settings(&settings).map_err(|err| err.to_string())?
    else {
        println!("adhocracy_core notifier=disabled");
        return Ok(());
    };

    println!("adhocracy_core notifier={}", client.url());
    info!("event=cli_wait module=cli status=ok reason=notifier_running");
    tokio::signal::ctrl_c()
        .await
        .map_err(|err| format!("failed to wait for Ctrl-C: {err}"))?;
    client.stop().await.map_err(|err| err.to_string())
}
