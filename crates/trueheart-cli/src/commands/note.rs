use trueheart_core::{ItemKind, Note};

use crate::cli::NoteCommands;
use crate::commands::common::{
    format_note_lines, normalize_book, normalize_content, normalize_item_identifier, note_items,
    open_session, resolve_item_id, SessionSettings,
};
use crate::error::CliError;

pub async fn run_note(command: NoteCommands, settings: &SessionSettings) -> Result<(), CliError> {
    match command {
        NoteCommands::Add {
            book,
            text,
            location,
        } => {
            let book = normalize_book(&book)?;
            let text = normalize_content(&text.join(" ")).ok_or(CliError::EmptyContent)?;
            let note = Note::new(text).at(location.chapter, location.verse);

            let session = open_session(settings).await?;
            let id = session.context.add_note(&book, note).await?;
            session.finish().await;
            println!("{id}");
            Ok(())
        }
        NoteCommands::List { book, json } => {
            let session = open_session(settings).await?;
            let snapshot = session.context.snapshot().await?;
            session.finish().await;

            let items = note_items(&snapshot, book.as_deref().map(str::trim));
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if items.is_empty() {
                println!("No notes found.");
            } else {
                for line in format_note_lines(&items) {
                    println!("{line}");
                }
            }
            Ok(())
        }
        NoteCommands::Delete { id } => {
            let query = normalize_item_identifier(&id)?;
            let session = open_session(settings).await?;
            let snapshot = session.context.snapshot().await?;
            let id = resolve_item_id(&snapshot, ItemKind::Note, &query)?;

            session.context.delete_item(ItemKind::Note, &id).await?;
            session.finish().await;
            println!("{id}");
            Ok(())
        }
    }
}
