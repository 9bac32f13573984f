use crate::commands::common::{open_session, print_sync_report, SessionSettings};
use crate::error::CliError;

pub async fn run_sync(settings: &SessionSettings) -> Result<(), CliError> {
    if !settings.is_remote_configured() {
        return Err(CliError::SyncNotConfigured);
    }
    if settings.token.is_none() {
        return Err(CliError::Auth(format!(
            "Profile '{}' is not signed in. Run `trueheart auth login --token <TOKEN>` first.",
            settings.profile_name
        )));
    }

    let session = open_session(settings).await?;
    let outcome = session.context.sync_now().await;
    session.finish().await;

    match outcome? {
        Some(report) => print_sync_report(&report),
        None => println!("A sync is already in progress."),
    }
    Ok(())
}
