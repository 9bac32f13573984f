use crate::commands::common::{open_session, SessionSettings};
use crate::error::CliError;

pub async fn run_device(settings: &SessionSettings) -> Result<(), CliError> {
    let session = open_session(settings).await?;
    let device_id = session.context.device_id().await?;
    session.finish().await;
    println!("{device_id}");
    Ok(())
}
