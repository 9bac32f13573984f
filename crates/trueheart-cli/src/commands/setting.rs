use serde_json::Value;

use crate::cli::SettingCommands;
use crate::commands::common::{open_session, SessionSettings};
use crate::error::CliError;

pub async fn run_setting(
    command: SettingCommands,
    settings: &SessionSettings,
) -> Result<(), CliError> {
    match command {
        SettingCommands::Set { key, value } => {
            let value = parse_setting_value(&value);
            let session = open_session(settings).await?;
            session.context.set_setting(&key, value.clone()).await?;
            session.finish().await;
            println!("{}={value}", key.trim());
            Ok(())
        }
        SettingCommands::List { json } => {
            let session = open_session(settings).await?;
            let snapshot = session.context.snapshot().await?;
            session.finish().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot.settings)?);
            } else if snapshot.settings.is_empty() {
                println!("No settings stored.");
            } else {
                for (key, value) in &snapshot.settings {
                    println!("{key}={value}");
                }
            }
            Ok(())
        }
    }
}

/// JSON when it parses, plain text otherwise (`dark` is stored as `"dark"`).
pub fn parse_setting_value(raw: &str) -> Value {
    serde_json::from_str(raw.trim()).unwrap_or_else(|_| Value::String(raw.to_string()))
}
