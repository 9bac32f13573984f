use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};
use trueheart_core::auth::{AuthState, CredentialProvider, SessionToken};
use trueheart_core::config::SyncConfig;
use trueheart_core::db::Database;
use trueheart_core::models::{Bookmark, Note, Timestamp};
use trueheart_core::remote::{HttpRemoteStore, InMemoryRemoteStore, RemoteStore};
use trueheart_core::storage::LibSqlKeyValueStore;
use trueheart_core::sync::SyncReport;
use trueheart_core::{ItemId, ItemKind, Snapshot, SyncContext, SyncEvent};

use crate::auth::resolve_session_token;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

const DB_PATH_ENV: &str = "TRUEHEART_DB_PATH";

/// Everything needed to open a session against one database and profile.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub db_path: PathBuf,
    pub profile_name: String,
    pub sync_config: SyncConfig,
    pub token: Option<SessionToken>,
}

impl SessionSettings {
    /// Resolve the profile config file and stored session for `profile`.
    pub fn resolve(db_path: PathBuf, profile: Option<&str>) -> Result<Self, CliError> {
        let config = CliProfilesConfig::load().map_err(CliError::Config)?;
        let profile_name = config.resolve_profile_name(profile);
        let sync_config = config
            .profile(&profile_name)
            .cloned()
            .unwrap_or_default()
            .sync_config()
            .map_err(CliError::Config)?;
        let token = resolve_session_token(&profile_name)?.map(|(token, _)| token);
        Ok(Self {
            db_path,
            profile_name,
            sync_config,
            token,
        })
    }

    pub fn is_remote_configured(&self) -> bool {
        self.sync_config.is_remote_configured()
    }
}

/// An open sync context plus the event stream used to report its outcome.
pub struct CliSession {
    pub context: SyncContext,
    remote_configured: bool,
    events: broadcast::Receiver<SyncEvent>,
}

pub async fn open_session(settings: &SessionSettings) -> Result<CliSession, CliError> {
    let db = Database::open(&settings.db_path).await?;
    let kv = Arc::new(LibSqlKeyValueStore::new(Arc::new(db)));
    let remote_configured = settings.is_remote_configured();
    // Local-only mode stays signed out, so no remote is ever contacted.
    let token = settings.token.clone().filter(|_| remote_configured);
    let credentials: Arc<dyn CredentialProvider> =
        Arc::new(token.map_or_else(AuthState::signed_out, AuthState::signed_in));

    let remote: Arc<dyn RemoteStore> = if remote_configured {
        Arc::new(HttpRemoteStore::new(
            &settings.sync_config,
            Arc::clone(&credentials),
        )?)
    } else {
        Arc::new(InMemoryRemoteStore::new())
    };

    let context = SyncContext::builder(kv, remote, credentials)
        .config(settings.sync_config.clone())
        .init()
        .await?;
    let events = context.subscribe();
    Ok(CliSession {
        context,
        remote_configured,
        events,
    })
}

impl CliSession {
    /// Run any debounced sync the command scheduled, then close the session.
    ///
    /// The local write already succeeded, so a failed sync is reported on
    /// stderr instead of failing the command.
    pub async fn finish(mut self) -> Option<SyncReport> {
        let outcome = self.context.shutdown().await;
        self.report_events();
        match outcome {
            Ok(report) => report,
            Err(error) => {
                tracing::warn!("Sync after local change failed: {}", error);
                None
            }
        }
    }

    fn report_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(SyncEvent::Notice { message } | SyncEvent::Failed { message })
                    if self.remote_configured =>
                {
                    eprintln!("{message}");
                }
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}

/// `--db-path`, then `TRUEHEART_DB_PATH`, then the platform data directory.
pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path {
        return Ok(path);
    }

    if let Ok(path) = env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    let data_dir = dirs::data_dir().ok_or_else(|| {
        CliError::Config(format!(
            "Could not determine a data directory; pass --db-path or set {DB_PATH_ENV}"
        ))
    })?;
    Ok(data_dir.join("trueheart").join("trueheart.db"))
}

pub fn normalize_book(book: &str) -> Result<String, CliError> {
    let trimmed = book.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyBook)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_item_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyItemId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn item_ids(snapshot: &Snapshot, kind: ItemKind) -> Vec<&ItemId> {
    match kind {
        ItemKind::Bookmark => snapshot
            .bookmarks
            .values()
            .flatten()
            .map(|bookmark| &bookmark.id)
            .collect(),
        ItemKind::Note => snapshot
            .notes
            .values()
            .flatten()
            .map(|note| &note.id)
            .collect(),
    }
}

/// Resolve an exact id or a unique id prefix among local items of `kind`.
pub fn resolve_item_id(snapshot: &Snapshot, kind: ItemKind, query: &str) -> Result<ItemId, CliError> {
    let ids = item_ids(snapshot, kind);
    if let Some(exact) = ids.iter().find(|id| id.as_str() == query) {
        return Ok((*exact).clone());
    }

    let mut matching = ids
        .into_iter()
        .filter(|id| id.as_str().starts_with(query))
        .collect::<Vec<_>>();
    matching.sort();
    matching.dedup();

    match matching.as_slice() {
        [] => Err(CliError::ItemNotFound(kind_label(kind), query.to_string())),
        [single] => Ok((*single).clone()),
        many => {
            let options = many
                .iter()
                .take(3)
                .map(|id| short_id(id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousItemId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

const fn kind_label(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Bookmark => "Bookmark",
        ItemKind::Note => "Note",
    }
}

pub fn short_id(id: &ItemId) -> String {
    id.as_str().chars().take(13).collect()
}

#[derive(Debug, Serialize)]
pub struct BookmarkListItem {
    pub id: String,
    pub book: String,
    pub location: String,
    pub label: Option<String>,
    pub timestamp: String,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub book: String,
    pub location: String,
    pub preview: String,
    pub text: String,
    pub timestamp: String,
    pub relative_time: String,
}

/// Bookmarks across books (or one book), most recent first.
pub fn bookmark_items(snapshot: &Snapshot, book: Option<&str>) -> Vec<BookmarkListItem> {
    let now = Utc::now();
    let mut entries = snapshot
        .bookmarks
        .iter()
        .filter(|(index, _)| book.is_none_or(|book| book == index.as_str()))
        .flat_map(|(index, bookmarks)| bookmarks.iter().map(move |bookmark| (index, bookmark)))
        .collect::<Vec<(&String, &Bookmark)>>();
    entries.sort_by(|left, right| right.1.timestamp.cmp(&left.1.timestamp));

    entries
        .into_iter()
        .map(|(index, bookmark)| BookmarkListItem {
            id: bookmark.id.to_string(),
            book: index.clone(),
            location: bookmark.location(),
            label: bookmark.label.clone(),
            timestamp: bookmark.timestamp.to_string(),
            relative_time: format_relative_time(&bookmark.timestamp, now),
        })
        .collect()
}

pub fn note_items(snapshot: &Snapshot, book: Option<&str>) -> Vec<NoteListItem> {
    let now = Utc::now();
    let mut entries = snapshot
        .notes
        .iter()
        .filter(|(index, _)| book.is_none_or(|book| book == index.as_str()))
        .flat_map(|(index, notes)| notes.iter().map(move |note| (index, note)))
        .collect::<Vec<(&String, &Note)>>();
    entries.sort_by(|left, right| right.1.timestamp.cmp(&left.1.timestamp));

    entries
        .into_iter()
        .map(|(index, note)| NoteListItem {
            id: note.id.to_string(),
            book: index.clone(),
            location: location(note.chapter, note.verse.as_deref()),
            preview: note_preview(note, 40),
            text: note.text.clone(),
            timestamp: note.timestamp.to_string(),
            relative_time: format_relative_time(&note.timestamp, now),
        })
        .collect()
}

pub fn format_bookmark_lines(items: &[BookmarkListItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let short: String = item.id.chars().take(13).collect();
            let label = item.label.as_deref().unwrap_or("");
            format!(
                "{short:<13}  {:<12}  {:<8}  {label:<24}  {}",
                item.book, item.location, item.relative_time
            )
        })
        .collect()
}

pub fn format_note_lines(items: &[NoteListItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let short: String = item.id.chars().take(13).collect();
            format!(
                "{short:<13}  {:<12}  {:<8}  {:<40}  {}",
                item.book, item.location, item.preview, item.relative_time
            )
        })
        .collect()
}

pub fn location(chapter: Option<u32>, verse: Option<&str>) -> String {
    match (chapter, verse) {
        (Some(chapter), Some(verse)) => format!("{chapter}.{verse}"),
        (Some(chapter), None) => chapter.to_string(),
        (None, Some(verse)) => verse.to_string(),
        (None, None) => "-".to_string(),
    }
}

pub fn note_preview(note: &Note, max_chars: usize) -> String {
    let first_line = note.text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

/// Coarse "time ago" label; unparseable timestamps are shown verbatim.
pub fn format_relative_time(timestamp: &Timestamp, now: DateTime<Utc>) -> String {
    let Some(instant) = timestamp.instant() else {
        return timestamp.to_string();
    };
    let diff = (now - instant).num_seconds().max(0);
    let minute = 60;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn print_sync_report(report: &SyncReport) {
    println!(
        "Synced ({}): version {}, uploaded={}, deletions sent={}, deletions received={}",
        report.action,
        report.sync_version,
        report.uploaded,
        report.events_uploaded,
        report.events_fetched
    );
    let removed = report.deleted_items.len();
    if removed > 0 {
        println!("Removed {removed} item(s) deleted on other devices");
    }
}
