use trueheart_core::{Bookmark, ItemKind};

use crate::cli::BookmarkCommands;
use crate::commands::common::{
    bookmark_items, format_bookmark_lines, normalize_book, normalize_item_identifier,
    open_session, resolve_item_id, SessionSettings,
};
use crate::error::CliError;

pub async fn run_bookmark(
    command: BookmarkCommands,
    settings: &SessionSettings,
) -> Result<(), CliError> {
    match command {
        BookmarkCommands::Add {
            book,
            location,
            label,
        } => {
            let book = normalize_book(&book)?;
            let mut bookmark = Bookmark::new(location.chapter, location.verse);
            if let Some(label) = trueheart_core::util::normalize_text_option(label) {
                bookmark = bookmark.with_label(label);
            }

            let session = open_session(settings).await?;
            let id = session.context.add_bookmark(&book, bookmark).await?;
            session.finish().await;
            println!("{id}");
            Ok(())
        }
        BookmarkCommands::List { book, json } => {
            let session = open_session(settings).await?;
            let snapshot = session.context.snapshot().await?;
            session.finish().await;

            let book = book.as_deref().map(str::trim);
            let items = bookmark_items(&snapshot, book);
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if items.is_empty() {
                println!("No bookmarks found.");
            } else {
                for line in format_bookmark_lines(&items) {
                    println!("{line}");
                }
            }
            Ok(())
        }
        BookmarkCommands::Delete { id } => {
            let query = normalize_item_identifier(&id)?;
            let session = open_session(settings).await?;
            let snapshot = session.context.snapshot().await?;
            let id = resolve_item_id(&snapshot, ItemKind::Bookmark, &query)?;

            session.context.delete_item(ItemKind::Bookmark, &id).await?;
            session.finish().await;
            println!("{id}");
            Ok(())
        }
    }
}
