use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "trueheart")]
#[command(about = "Bookmarks, notes and reading positions that follow you across devices")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for remote and auth configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage bookmarks
    Bookmark {
        #[command(subcommand)]
        command: BookmarkCommands,
    },
    /// Manage notes
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },
    /// Record or show reading positions
    Position {
        #[command(subcommand)]
        command: PositionCommands,
    },
    /// Change or show settings
    Setting {
        #[command(subcommand)]
        command: SettingCommands,
    },
    /// Sync now with the remote store
    Sync,
    /// Show sync status for this device
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print this device's identifier
    Device,
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Store or clear the session used for sync
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

/// Where in a book an item points.
#[derive(Args, Debug, Clone, Default)]
pub struct LocationArgs {
    /// Chapter number
    #[arg(long)]
    pub chapter: Option<u32>,
    /// Verse or verse range, e.g. 12 or 12-14
    #[arg(long)]
    pub verse: Option<String>,
}

#[derive(Subcommand)]
pub enum BookmarkCommands {
    /// Bookmark a passage
    Add {
        /// Book index the bookmark belongs to
        book: String,
        #[command(flatten)]
        location: LocationArgs,
        /// Optional label
        #[arg(long)]
        label: Option<String>,
    },
    /// List bookmarks, most recent first
    List {
        /// Only this book
        #[arg(long)]
        book: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a bookmark
    Delete {
        /// Bookmark ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum NoteCommands {
    /// Add a note to a book
    Add {
        /// Book index the note belongs to
        book: String,
        /// Note text
        #[arg(required = true)]
        text: Vec<String>,
        #[command(flatten)]
        location: LocationArgs,
    },
    /// List notes, most recent first
    List {
        /// Only this book
        #[arg(long)]
        book: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a note
    Delete {
        /// Note ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum PositionCommands {
    /// Record where you stopped reading in a book
    Set {
        /// Book index
        book: String,
        #[command(flatten)]
        location: LocationArgs,
        /// Scroll offset within the chapter (0.0 to 1.0)
        #[arg(long)]
        scroll: Option<f64>,
    },
    /// List reading positions
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum SettingCommands {
    /// Set a setting; values are parsed as JSON, falling back to plain text
    Set { key: String, value: String },
    /// List settings
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update a profile
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Remote store base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Application id the remote data is stored under
        #[arg(long, value_name = "ID")]
        app_id: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store a session token in the OS keychain
    Login {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Session token issued by the TrueHeart account service
        #[arg(long, value_name = "TOKEN")]
        token: String,
    },
    /// Show auth status for profile
    Status {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
    /// Clear the stored session
    Logout {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}
