use trueheart_core::models::ReadingPosition;

use crate::cli::PositionCommands;
use crate::commands::common::{location, normalize_book, open_session, SessionSettings};
use crate::error::CliError;

pub async fn run_position(
    command: PositionCommands,
    settings: &SessionSettings,
) -> Result<(), CliError> {
    match command {
        PositionCommands::Set {
            book,
            location,
            scroll,
        } => {
            let book = normalize_book(&book)?;
            let scroll = scroll.map(validate_scroll).transpose()?;
            let mut position = ReadingPosition::new(location.chapter, location.verse);
            position.scroll = scroll;

            let session = open_session(settings).await?;
            session
                .context
                .set_reading_position(&book, position)
                .await?;
            session.finish().await;
            println!("{book}");
            Ok(())
        }
        PositionCommands::List { json } => {
            let session = open_session(settings).await?;
            let snapshot = session.context.snapshot().await?;
            session.finish().await;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&snapshot.reading_positions)?
                );
            } else if snapshot.reading_positions.is_empty() {
                println!("No reading positions recorded.");
            } else {
                for (book, position) in &snapshot.reading_positions {
                    let recorded = position
                        .timestamp
                        .as_ref()
                        .map_or_else(String::new, ToString::to_string);
                    println!(
                        "{book:<12}  {:<8}  {recorded}",
                        location(position.chapter, position.verse.as_deref())
                    );
                }
            }
            Ok(())
        }
    }
}

pub fn validate_scroll(scroll: f64) -> Result<f64, CliError> {
    if scroll.is_finite() && (0.0..=1.0).contains(&scroll) {
        Ok(scroll)
    } else {
        Err(CliError::InvalidInput(format!(
            "scroll must be between 0.0 and 1.0, got {scroll}"
        )))
    }
}
