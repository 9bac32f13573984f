//! Reconciliation: merge local, remote and tombstone state into one snapshot.
//!
//! Items merge last-writer-wins by timestamp. Tombstones are applied after the
//! merge and always win, whatever the item's timestamp. The merge is a pure
//! function; persisting and uploading the result is the engine's job.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use serde_json::Value;

use super::guard::{classify, Emptiness};
use crate::models::{
    BookIndex, CollectionItem, DeletedItems, DeletionEvent, ItemId, ReadingPosition, Snapshot,
    Timestamp,
};

/// Which branch of the merge produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeAction {
    /// Nothing stored remotely yet; local becomes the first upload.
    FirstUpload,
    /// Local was empty; the remote snapshot is adopted.
    AdoptRemote,
    /// Remote was empty; local is the source of truth.
    KeepLocal,
    /// Both sides had data and were merged item by item.
    Merged,
}

impl MergeAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstUpload => "first_upload",
            Self::AdoptRemote => "adopt_remote",
            Self::KeepLocal => "keep_local",
            Self::Merged => "merged",
        }
    }
}

impl std::fmt::Display for MergeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a reconcile pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub merged: Snapshot,
    /// Items removed by tombstones, with the book each one was removed from
    pub deleted_items: DeletedItems,
    pub action: MergeAction,
    /// False only when the remote snapshot was adopted untouched
    pub needs_upload: bool,
}

/// Reconcile using the current time for `lastModified`.
pub fn reconcile(
    local: &Snapshot,
    remote: Option<&Snapshot>,
    deletions: &[DeletionEvent],
) -> Reconciliation {
    reconcile_at(local, remote, deletions, &Timestamp::now())
}

/// Merge `local` with `remote`, then apply `deletions`.
///
/// `deletions` should already be unioned and pruned.
pub fn reconcile_at(
    local: &Snapshot,
    remote: Option<&Snapshot>,
    deletions: &[DeletionEvent],
    now: &Timestamp,
) -> Reconciliation {
    let Some(remote) = remote else {
        let mut merged = local.clone();
        let deleted_items = apply_tombstones(&mut merged, deletions);
        merged.sync_version = 1;
        merged.last_modified = Some(now.clone());
        return Reconciliation {
            merged,
            deleted_items,
            action: MergeAction::FirstUpload,
            needs_upload: true,
        };
    };

    let (mut merged, action) = match classify(local, remote) {
        Emptiness::LocalOnly => (remote.clone(), MergeAction::AdoptRemote),
        Emptiness::RemoteOnly => (local.clone(), MergeAction::KeepLocal),
        Emptiness::Both | Emptiness::Neither => (merge_contents(local, remote), MergeAction::Merged),
    };

    let deleted_items = apply_tombstones(&mut merged, deletions);
    if action == MergeAction::AdoptRemote && deleted_items.is_empty() {
        return Reconciliation {
            merged,
            deleted_items,
            action,
            needs_upload: false,
        };
    }

    merged.sync_version = local.sync_version.max(remote.sync_version) + 1;
    merged.last_modified = Some(now.clone());
    Reconciliation {
        merged,
        deleted_items,
        action,
        needs_upload: true,
    }
}

fn merge_contents(local: &Snapshot, remote: &Snapshot) -> Snapshot {
    let (settings, settings_updated_at) = merge_settings(local, remote);
    Snapshot {
        bookmarks: merge_books(&local.bookmarks, &remote.bookmarks),
        notes: merge_books(&local.notes, &remote.notes),
        reading_positions: merge_positions(&local.reading_positions, &remote.reading_positions),
        settings,
        settings_updated_at,
        sync_version: local.sync_version.max(remote.sync_version),
        last_modified: None,
    }
}

/// Per-book, per-id last-writer-wins merge.
fn merge_books<T: CollectionItem>(
    local: &BTreeMap<BookIndex, Vec<T>>,
    remote: &BTreeMap<BookIndex, Vec<T>>,
) -> BTreeMap<BookIndex, Vec<T>> {
    let books: BTreeSet<&BookIndex> = local.keys().chain(remote.keys()).collect();
    books
        .into_iter()
        .map(|book| {
            let mut by_id: HashMap<ItemId, T> = HashMap::new();
            for item in remote.get(book).into_iter().flatten() {
                overlay(&mut by_id, item);
            }
            for item in local.get(book).into_iter().flatten() {
                overlay(&mut by_id, item);
            }
            let mut items: Vec<T> = by_id.into_values().collect();
            items.sort_by(|a, b| {
                b.timestamp()
                    .cmp(a.timestamp())
                    .then_with(|| a.id().cmp(b.id()))
            });
            (book.clone(), items)
        })
        .collect()
}

/// Keep the newer copy. Equal stamps are settled by canonical JSON rather
/// than favoring local, since a local-wins tie would leave two devices each
/// keeping their own copy.
fn overlay<T: CollectionItem>(by_id: &mut HashMap<ItemId, T>, incoming: &T) {
    let replace = by_id.get(incoming.id()).is_none_or(|existing| {
        match incoming.timestamp().cmp(existing.timestamp()) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => canonical(incoming) >= canonical(existing),
        }
    });
    if replace {
        by_id.insert(incoming.id().clone(), incoming.clone());
    }
}

/// Local wins unless both positions are stamped and the remote one is newer.
fn merge_positions(
    local: &BTreeMap<BookIndex, ReadingPosition>,
    remote: &BTreeMap<BookIndex, ReadingPosition>,
) -> BTreeMap<BookIndex, ReadingPosition> {
    let mut merged = remote.clone();
    for (book, position) in local {
        let keep_local = match merged.get(book) {
            None => true,
            Some(existing) => match (&position.timestamp, &existing.timestamp) {
                (Some(mine), Some(theirs)) => match mine.cmp(theirs) {
                    Ordering::Greater => true,
                    Ordering::Less => false,
                    Ordering::Equal => canonical(position) >= canonical(existing),
                },
                _ => true,
            },
        };
        if keep_local {
            merged.insert(book.clone(), position.clone());
        }
    }
    merged
}

/// Key overlay with the fresher side on top.
///
/// Remote is the base and local overlays it, unless the remote settings were
/// changed strictly later. With equal stamps each key is decided by value so
/// both devices pick the same one.
fn merge_settings(
    local: &Snapshot,
    remote: &Snapshot,
) -> (BTreeMap<String, Value>, Option<Timestamp>) {
    let order = match (&local.settings_updated_at, &remote.settings_updated_at) {
        (Some(mine), Some(theirs)) => mine.cmp(theirs),
        _ => Ordering::Greater,
    };
    let updated_at = local
        .settings_updated_at
        .clone()
        .max(remote.settings_updated_at.clone());

    let (base, top) = match order {
        Ordering::Less => (&local.settings, &remote.settings),
        _ => (&remote.settings, &local.settings),
    };
    let mut merged = base.clone();
    for (key, value) in top {
        let take = order != Ordering::Equal
            || merged
                .get(key)
                .is_none_or(|existing| value.to_string() >= existing.to_string());
        if take {
            merged.insert(key.clone(), value.clone());
        }
    }
    (merged, updated_at)
}

/// Remove every tombstoned item from every book.
fn apply_tombstones(snapshot: &mut Snapshot, deletions: &[DeletionEvent]) -> DeletedItems {
    let mut deleted = DeletedItems::default();
    for event in deletions {
        for book in snapshot.remove_item(event.kind, &event.id) {
            deleted.record(event.kind, event.id.clone(), book);
        }
    }
    if !deleted.is_empty() {
        tracing::debug!("Tombstones removed {} items", deleted.len());
    }
    deleted
}

/// Stable textual form used to break exact timestamp ties.
fn canonical<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .map(|value| value.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::models::{Bookmark, DeletedItem, ItemKind, Note};

    const NOW: &str = "2024-06-01T00:00:00.000Z";

    fn now() -> Timestamp {
        Timestamp::new(NOW)
    }

    fn bookmark(id: &str, timestamp: &str) -> Bookmark {
        Bookmark {
            id: ItemId::new(id),
            timestamp: Timestamp::new(timestamp),
            ..Bookmark::new(Some(1), Some("1".to_string()))
        }
    }

    fn note(id: &str, timestamp: &str, text: &str) -> Note {
        Note {
            id: ItemId::new(id),
            timestamp: Timestamp::new(timestamp),
            ..Note::new(text)
        }
    }

    fn tombstone(id: &str, kind: ItemKind, deleted_at: &str) -> DeletionEvent {
        DeletionEvent::new(ItemId::new(id), kind, Timestamp::new(deleted_at), "device-b")
    }

    fn with_bookmarks(book: &str, items: Vec<Bookmark>) -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.bookmarks.insert(book.to_string(), items);
        snapshot
    }

    fn with_notes(book: &str, items: Vec<Note>) -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.notes.insert(book.to_string(), items);
        snapshot
    }

    #[test]
    fn absent_remote_uploads_local_as_version_one() {
        let local = Snapshot {
            sync_version: 7,
            ..with_bookmarks("3", vec![bookmark("b1", "2024-01-01T00:00:00Z")])
        };

        let result = reconcile_at(&local, None, &[], &now());
        assert_eq!(result.action, MergeAction::FirstUpload);
        assert!(result.needs_upload);
        assert_eq!(result.merged.sync_version, 1);
        assert_eq!(result.merged.last_modified, Some(now()));
        assert_eq!(result.merged.bookmarks["3"][0].id, ItemId::new("b1"));
    }

    #[test]
    fn local_bookmark_missing_remotely_is_kept_in_its_book() {
        let local = with_bookmarks("3", vec![bookmark("b1", "2024-01-01T00:00:00Z")]);
        let mut remote = Snapshot::default();
        remote.settings.insert("theme".to_string(), json!("dark"));

        let result = reconcile_at(&local, Some(&remote), &[], &now());
        assert_eq!(result.action, MergeAction::Merged);
        assert_eq!(result.merged.bookmarks["3"].len(), 1);
        assert_eq!(result.merged.bookmarks["3"][0].id, ItemId::new("b1"));
        assert_eq!(result.merged.settings["theme"], json!("dark"));
    }

    #[test]
    fn last_writer_wins_in_both_directions() {
        let newer = note("x", "10", "local edit");
        let older = note("x", "5", "remote edit");

        let result = reconcile_at(
            &with_notes("1", vec![newer.clone()]),
            Some(&with_notes("1", vec![older.clone()])),
            &[],
            &now(),
        );
        assert_eq!(result.merged.notes["1"], vec![newer.clone()]);

        let local_older = note("x", "5", "local edit");
        let remote_newer = note("x", "10", "remote edit");
        let result = reconcile_at(
            &with_notes("1", vec![local_older]),
            Some(&with_notes("1", vec![remote_newer.clone()])),
            &[],
            &now(),
        );
        assert_eq!(result.merged.notes["1"], vec![remote_newer]);
    }

    #[test]
    fn pending_deletion_removes_local_note() {
        let local = with_notes("2", vec![note("n1", "2024-01-02", "gone")]);
        let mut remote = Snapshot::default();
        remote.settings.insert("fontSize".to_string(), json!(16));

        let result = reconcile_at(
            &local,
            Some(&remote),
            &[tombstone("n1", ItemKind::Note, "2024-01-03T00:00:00Z")],
            &now(),
        );
        assert!(result.merged.notes["2"].is_empty());
        assert_eq!(
            result.deleted_items.notes,
            vec![DeletedItem {
                id: ItemId::new("n1"),
                book_index: "2".to_string()
            }]
        );
    }

    #[test]
    fn tombstone_beats_newer_edit() {
        let local = with_bookmarks("1", vec![bookmark("b1", "2024-05-01T00:00:00Z")]);
        let remote = with_bookmarks("1", vec![bookmark("b2", "2024-01-01T00:00:00Z")]);

        let result = reconcile_at(
            &local,
            Some(&remote),
            &[tombstone("b1", ItemKind::Bookmark, "2024-01-01T00:00:00Z")],
            &now(),
        );
        let ids: Vec<&str> = result.merged.bookmarks["1"]
            .iter()
            .map(|item| item.id.as_str())
            .collect();
        assert_eq!(ids, vec!["b2"]);
    }

    #[test]
    fn tombstone_matches_kind_as_well_as_id() {
        let mut local = with_bookmarks("1", vec![bookmark("same", "2024-01-01")]);
        local.notes.insert("1".to_string(), vec![note("same", "2024-01-01", "keep")]);

        let result = reconcile_at(
            &local,
            Some(&local.clone()),
            &[tombstone("same", ItemKind::Bookmark, "2024-02-01")],
            &now(),
        );
        assert!(result.merged.bookmarks["1"].is_empty());
        assert_eq!(result.merged.notes["1"].len(), 1);
    }

    #[test]
    fn applying_tombstones_twice_is_idempotent() {
        let local = with_notes("1", vec![note("a", "1", ""), note("b", "2", "")]);
        let events = [
            tombstone("a", ItemKind::Note, "3"),
            tombstone("a", ItemKind::Note, "3"),
        ];

        let once = reconcile_at(&local, Some(&local), &events[..1], &now());
        let twice = reconcile_at(&once.merged, Some(&once.merged), &events, &now());
        assert!(once.merged.same_contents(&twice.merged));
        assert_eq!(once.deleted_items.len(), 1);
        assert!(twice.deleted_items.is_empty());
    }

    #[test]
    fn empty_local_adopts_remote_unchanged() {
        let remote = Snapshot {
            sync_version: 9,
            last_modified: Some(Timestamp::new("2024-02-02T00:00:00Z")),
            ..with_notes("4", vec![note("n1", "2024-01-01", "kept")])
        };

        let result = reconcile_at(&Snapshot::default(), Some(&remote), &[], &now());
        assert_eq!(result.action, MergeAction::AdoptRemote);
        assert!(!result.needs_upload);
        assert_eq!(result.merged, remote);
    }

    #[test]
    fn empty_remote_keeps_local_with_version_bump() {
        let local = Snapshot {
            sync_version: 4,
            ..with_bookmarks("1", vec![bookmark("b1", "2024-01-01")])
        };
        let remote = Snapshot {
            sync_version: 6,
            ..Snapshot::default()
        };

        let result = reconcile_at(&local, Some(&remote), &[], &now());
        assert_eq!(result.action, MergeAction::KeepLocal);
        assert!(result.merged.same_contents(&local));
        assert_eq!(result.merged.sync_version, 7);
    }

    #[test]
    fn reconciling_with_itself_keeps_contents() {
        let mut snapshot = with_bookmarks(
            "1",
            vec![
                bookmark("b2", "2024-03-01T00:00:00Z"),
                bookmark("b1", "2024-01-01T00:00:00Z"),
            ],
        );
        snapshot
            .reading_positions
            .insert("1".to_string(), ReadingPosition::new(Some(3), None));
        snapshot.settings.insert("theme".to_string(), json!("sepia"));
        snapshot.sync_version = 5;

        let result = reconcile_at(&snapshot, Some(&snapshot), &[], &now());
        assert!(result.merged.same_contents(&snapshot));
        assert_eq!(result.merged.sync_version, 6);
    }

    #[test]
    fn merged_lists_are_most_recent_first() {
        let local = with_bookmarks("1", vec![bookmark("old", "2024-01-01")]);
        let remote = with_bookmarks(
            "1",
            vec![
                bookmark("mid", "2024-02-01"),
                bookmark("new", "2024-03-01T10:00:00Z"),
            ],
        );

        let result = reconcile_at(&local, Some(&remote), &[], &now());
        let ids: Vec<&str> = result.merged.bookmarks["1"]
            .iter()
            .map(|item| item.id.as_str())
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn version_is_max_plus_one() {
        let local = Snapshot {
            sync_version: 3,
            ..with_notes("1", vec![note("a", "1", "")])
        };
        let remote = Snapshot {
            sync_version: 11,
            ..with_notes("1", vec![note("b", "1", "")])
        };
        assert_eq!(
            reconcile_at(&local, Some(&remote), &[], &now())
                .merged
                .sync_version,
            12
        );
    }

    #[test]
    fn reading_position_prefers_newer_stamp() {
        let mut local = Snapshot::default();
        let mut remote = Snapshot::default();
        let mut mine = ReadingPosition::new(Some(1), None);
        mine.timestamp = Some(Timestamp::new("2024-01-01T00:00:00Z"));
        let mut theirs = ReadingPosition::new(Some(9), None);
        theirs.timestamp = Some(Timestamp::new("2024-02-01T00:00:00Z"));
        local.reading_positions.insert("5".to_string(), mine.clone());
        remote.reading_positions.insert("5".to_string(), theirs.clone());
        local
            .reading_positions
            .insert("6".to_string(), ReadingPosition::new(Some(2), None));

        let result = reconcile_at(&local, Some(&remote), &[], &now());
        assert_eq!(result.merged.reading_positions["5"], theirs);
        assert_eq!(result.merged.reading_positions["6"].chapter, Some(2));

        mine.timestamp = None;
        local.reading_positions.insert("5".to_string(), mine.clone());
        let result = reconcile_at(&local, Some(&remote), &[], &now());
        assert_eq!(result.merged.reading_positions["5"], mine);
    }

    #[test]
    fn settings_overlay_follows_updated_at() {
        let mut local = Snapshot::default();
        local.settings.insert("theme".to_string(), json!("light"));
        local.settings.insert("fontSize".to_string(), json!(14));
        local.settings_updated_at = Some(Timestamp::new("2024-01-01T00:00:00Z"));
        let mut remote = Snapshot::default();
        remote.settings.insert("theme".to_string(), json!("dark"));
        remote.settings.insert("lineHeight".to_string(), json!(1.5));
        remote.settings_updated_at = Some(Timestamp::new("2024-02-01T00:00:00Z"));

        let result = reconcile_at(&local, Some(&remote), &[], &now());
        assert_eq!(result.merged.settings["theme"], json!("dark"));
        assert_eq!(result.merged.settings["fontSize"], json!(14));
        assert_eq!(result.merged.settings["lineHeight"], json!(1.5));
        assert_eq!(
            result.merged.settings_updated_at,
            Some(Timestamp::new("2024-02-01T00:00:00Z"))
        );

        local.settings_updated_at = Some(Timestamp::new("2024-03-01T00:00:00Z"));
        let result = reconcile_at(&local, Some(&remote), &[], &now());
        assert_eq!(result.merged.settings["theme"], json!("light"));
    }

    #[test]
    fn two_devices_converge_after_exchanging_uploads() {
        let ancestor = with_notes(
            "1",
            vec![
                note("shared", "2024-01-01T00:00:00Z", "v1"),
                note("doomed", "2024-01-01T00:00:00Z", "bye"),
            ],
        );

        let mut device_a = ancestor.clone();
        device_a.notes.get_mut("1").unwrap()[0] = note("shared", "2024-01-05T00:00:00Z", "a");
        device_a
            .bookmarks
            .insert("2".to_string(), vec![bookmark("a-only", "2024-01-06T00:00:00Z")]);
        let a_deletes = vec![tombstone("doomed", ItemKind::Note, "2024-01-04T00:00:00Z")];
        device_a.remove_item(ItemKind::Note, &ItemId::new("doomed"));

        let mut device_b = ancestor;
        device_b.notes.get_mut("1").unwrap()[0] = note("shared", "2024-01-03T00:00:00Z", "b");
        device_b
            .notes
            .get_mut("1")
            .unwrap()
            .push(note("b-only", "2024-01-07T00:00:00Z", "new"));

        // A merges B's upload, B merges A's result, then A syncs once more.
        let a_first = reconcile_at(&device_a, Some(&device_b), &a_deletes, &now());
        let b_after = reconcile_at(&device_b, Some(&a_first.merged), &a_deletes, &now());
        let a_after = reconcile_at(&a_first.merged, Some(&b_after.merged), &a_deletes, &now());

        assert!(a_after.merged.same_contents(&b_after.merged));
        let texts: Vec<&str> = a_after.merged.notes["1"]
            .iter()
            .map(|item| item.text.as_str())
            .collect();
        assert_eq!(texts, vec!["new", "a"]);
    }

    #[test]
    fn equal_timestamps_resolve_identically_on_both_sides() {
        let mine = note("x", "2024-01-01T00:00:00Z", "alpha");
        let theirs = note("x", "2024-01-01T00:00:00Z", "beta");

        let on_a = reconcile_at(
            &with_notes("1", vec![mine.clone()]),
            Some(&with_notes("1", vec![theirs.clone()])),
            &[],
            &now(),
        );
        let on_b = reconcile_at(
            &with_notes("1", vec![theirs]),
            Some(&with_notes("1", vec![mine])),
            &[],
            &now(),
        );
        assert!(on_a.merged.same_contents(&on_b.merged));
    }
}
