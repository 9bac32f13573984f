use serde::Serialize;
use trueheart_core::sync::SyncStatus;

use crate::commands::common::{open_session, SessionSettings};
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutput {
    pub profile: String,
    pub remote: Option<String>,
    pub database: String,
    #[serde(flatten)]
    pub status: SyncStatus,
}

pub async fn collect_status(settings: &SessionSettings) -> Result<StatusOutput, CliError> {
    let session = open_session(settings).await?;
    let status = session.context.status().await?;
    session.finish().await;

    Ok(StatusOutput {
        profile: settings.profile_name.clone(),
        remote: settings.sync_config.remote_base_url().ok(),
        database: settings.db_path.display().to_string(),
        status,
    })
}

pub async fn run_status(settings: &SessionSettings, as_json: bool) -> Result<(), CliError> {
    let output = collect_status(settings).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let status = &output.status;
    println!("Profile:        {}", output.profile);
    println!("Database:       {}", output.database);
    println!(
        "Remote:         {}",
        output.remote.as_deref().unwrap_or("(local only)")
    );
    println!("Device:         {}", status.device_id);
    println!(
        "Signed in:      {}",
        if status.authenticated { "yes" } else { "no" }
    );
    println!("Sync version:   {}", status.sync_version);
    println!(
        "Last sync:      {}",
        status.last_sync_at.as_deref().unwrap_or("never")
    );
    println!("Pending deletes: {}", status.pending_deletions);
    println!(
        "Items:          {} bookmarks, {} notes, {} positions, {} settings",
        status.bookmarks, status.notes, status.reading_positions, status.settings
    );
    Ok(())
}
