use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "haven")]
#[command(about = "Inspect, sync, and back up Haven's on-device data")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the local store file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the value stored under a key
    Get {
        /// Key inside the app namespace
        key: String,
    },
    /// Store a value under a key
    Set {
        /// Key inside the app namespace
        key: String,
        /// JSON value (text that is not JSON is stored as a string)
        value: String,
    },
    /// Remove a key
    Rm {
        /// Key inside the app namespace
        key: String,
    },
    /// List stored keys
    Keys {
        /// Only keys starting with this prefix (inside the app namespace)
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Save a record and push it to the remote in the background
    Save {
        /// Collection name, e.g. `reminders`
        collection: String,
        /// `[KEY] JSON`: the key is generated when omitted
        #[arg(num_args = 1..=2, value_names = ["KEY", "JSON"])]
        args: Vec<String>,
    },
    /// Delete a record (kept as a tombstone until purged)
    Delete {
        collection: String,
        key: String,
    },
    /// List live records of a collection
    List {
        collection: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage reminders
    Reminder {
        #[command(subcommand)]
        command: ReminderCommands,
    },
    /// Manage push notification registrations
    Push {
        #[command(subcommand)]
        command: PushCommands,
    },
    /// Reconcile local records with the remote store
    Sync {
        /// Collections to sync (all configured collections when omitted)
        collections: Vec<String>,
        /// Forget the last sync time and re-scan everything
        #[arg(long)]
        reset: bool,
        /// Give records created while signed out to the current user first
        #[arg(long)]
        adopt_guest: bool,
        /// Output reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Purge old tombstones that every side has seen
    Gc {
        /// Collections to clean (all configured collections when omitted)
        collections: Vec<String>,
        /// Override the configured retention window
        #[arg(long, value_name = "DAYS")]
        retention_days: Option<u32>,
    },
    /// Write a backup of the whole local store
    Export {
        /// Output file or directory (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Restore a backup into the local store
    Import {
        /// Backup file to read
        path: PathBuf,
    },
    /// Authenticate with Supabase
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Manage the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
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

#[derive(Subcommand)]
pub enum ReminderCommands {
    /// Add a reminder
    Add {
        title: String,
        /// Due time (RFC 3339, e.g. 2024-03-01T18:00:00Z)
        #[arg(long, value_name = "TIME")]
        due: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List reminders
    List {
        /// Only reminders that are due now
        #[arg(long)]
        due: bool,
    },
}

#[derive(Subcommand)]
pub enum PushCommands {
    /// Register a device endpoint
    Register {
        #[arg(long, value_name = "URL")]
        endpoint: String,
        #[arg(long, value_name = "KEY")]
        p256dh: String,
        #[arg(long, value_name = "SECRET")]
        auth: String,
        #[arg(long)]
        user_agent: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Login with Supabase email/password and store the session in the keychain
    Login {
        /// Supabase account email
        #[arg(long, value_name = "EMAIL")]
        email: String,
        /// Supabase account password
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Show who is signed in
    Status,
    /// Sign out, clear the stored session, and reset sync state
    Logout,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create or update the config file
    Init {
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
        /// Application name stamped into backups
        #[arg(long, value_name = "NAME")]
        app_name: Option<String>,
    },
    /// Print the effective configuration
    Show,
}
