use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tabkeep")]
#[command(about = "Track tablet inventory offline and reconcile it with the shared store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name holding remote store configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a device
    #[command(alias = "new")]
    Add {
        #[command(flatten)]
        form: RecordForm,
    },
    /// Change fields of an existing device
    Edit {
        /// Record ID, unique ID prefix, or unique code
        id: String,
        #[command(flatten)]
        form: RecordForm,
    },
    /// Delete a device
    Delete {
        /// Record ID, unique ID prefix, or unique code
        id: String,
    },
    /// List devices
    List {
        /// Only show devices not yet confirmed by the remote store
        #[arg(long)]
        unsynced: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search devices by code, serial, model, product, site or notes
    Search {
        /// Search query
        query: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show inventory counters
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the pending operation log
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Drop operations the remote store already confirmed
        #[arg(long)]
        purge: bool,
    },
    /// Run one reconciliation pass against the remote store
    Sync,
    /// Show connectivity and recent sync passes
    Status {
        /// Number of recent passes to show
        #[arg(short, long, default_value = "5")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep reconciling in the foreground until Ctrl-C
    Watch,
    /// Manage the cached user profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Device form fields shared by `add` and `edit`
#[derive(Args, Debug, Clone, Default)]
pub struct RecordForm {
    /// Unique code (business key), e.g. TAB-2024-0001
    #[arg(long, value_name = "CODE")]
    pub code: Option<String>,
    /// Serial number
    #[arg(long, value_name = "SERIAL")]
    pub serial: Option<String>,
    /// Device model
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,
    /// Product name
    #[arg(long, value_name = "NAME")]
    pub product: Option<String>,
    /// Site the device came from
    #[arg(long, value_name = "SITE")]
    pub site: Option<String>,
    /// Screen condition (good, fair, damaged, broken)
    #[arg(long, value_name = "CONDITION")]
    pub screen: Option<String>,
    /// Body condition (good, fair, damaged, broken)
    #[arg(long, value_name = "CONDITION")]
    pub body: Option<String>,
    /// Battery level in percent
    #[arg(long, value_name = "PERCENT")]
    pub battery: Option<u8>,
    /// Whether the charger is present
    #[arg(long, value_name = "BOOL")]
    pub charger: Option<bool>,
    /// Whether the case is present
    #[arg(long, value_name = "BOOL")]
    pub case: Option<bool>,
    /// Free-form notes
    #[arg(long, value_name = "TEXT")]
    pub notes: Option<String>,
    /// Last maintenance date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub maintenance: Option<String>,
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Show the cached profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace the cached profile
    Set {
        /// User identifier
        #[arg(long, value_name = "ID")]
        id: String,
        /// User email
        #[arg(long, value_name = "EMAIL")]
        email: Option<String>,
        /// Role (admin, technician, viewer)
        #[arg(long, value_name = "ROLE", default_value = "technician")]
        role: String,
    },
    /// Remove the cached profile
    Clear,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
        /// User access token sent as bearer instead of the anon key
        #[arg(long, value_name = "TOKEN")]
        access_token: Option<String>,
        /// Remote table holding device records
        #[arg(long, value_name = "NAME")]
        table: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
}
