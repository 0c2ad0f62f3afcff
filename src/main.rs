//! diaryledger - Encrypted note ledger
//!
//! Usage:
//!   diaryledger init                    - Create keystore and genesis block
//!   diaryledger add <text>              - Append a note
//!   diaryledger list                    - Show current notes
//!   diaryledger show <index>            - Show one note (deleted ones too)
//!   diaryledger update <index> <text>   - Replace a note
//!   diaryledger delete <index>          - Hide a note
//!   diaryledger verify                  - Check chain integrity
//!   diaryledger status                  - Show ledger summary

use clap::{Parser, Subcommand};
use diaryledger::{config::Config, service::DiaryService, Error, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Environment variable holding the passphrase
const PASSWORD_ENV: &str = "DIARY_PASSWORD";

#[derive(Parser)]
#[command(name = "diaryledger")]
#[command(author = "diaryledger Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Encrypted, append-only note ledger")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "~/.config/diaryledger/config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Read the passphrase from a file
    #[arg(long, global = true)]
    password_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new ledger
    Init {
        /// Storage backend (sled or json-file)
        #[arg(long)]
        backend: Option<String>,

        /// Data directory
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Append a note
    Add {
        /// Note text (read from stdin if omitted)
        content: Option<String>,
    },

    /// List current notes
    List,

    /// Show one note by index
    Show {
        /// Block index
        index: u64,
    },

    /// Replace a note with new content
    Update {
        /// Block index of the note to replace
        index: u64,

        /// New text (read from stdin if omitted)
        content: Option<String>,
    },

    /// Hide a note from listings
    Delete {
        /// Block index
        index: u64,
    },

    /// Check chain integrity
    Verify,

    /// Show ledger summary
    Status,
}

fn main() {
    let cli = Cli::parse();

    // Expand ~ in config path
    let config_path = expand_tilde(&cli.config);

    let config = match Config::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        config.log_level()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set log subscriber: {}", e);
    }

    if let Err(e) = run_command(cli.command, config, &config_path, cli.password_file) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_command(
    command: Commands,
    config: Config,
    config_path: &Path,
    password_file: Option<PathBuf>,
) -> Result<()> {
    match command {
        Commands::Init { backend, data_dir } => {
            cmd_init(config, config_path, backend, data_dir, password_file)
        }

        Commands::Add { content } => {
            let mut diary = unlock(&config, password_file)?;
            let content = content_or_stdin(content)?;
            let index = diary.add_note(&content)?;
            println!("Added note {}", index);
            Ok(())
        }

        Commands::List => cmd_list(&unlock(&config, password_file)?),

        Commands::Show { index } => cmd_show(&unlock(&config, password_file)?, index),

        Commands::Update { index, content } => {
            let mut diary = unlock(&config, password_file)?;
            let content = content_or_stdin(content)?;
            let new_index = diary.update_note(index, &content)?;
            println!("Note {} replaced by note {}", index, new_index);
            Ok(())
        }

        Commands::Delete { index } => {
            let mut diary = unlock(&config, password_file)?;
            diary.delete_note(index)?;
            println!("Note {} deleted", index);
            Ok(())
        }

        Commands::Verify => cmd_verify(&unlock(&config, password_file)?),

        Commands::Status => cmd_status(&config, &unlock(&config, password_file)?),
    }
}

fn cmd_init(
    mut config: Config,
    config_path: &Path,
    backend: Option<String>,
    data_dir: Option<PathBuf>,
    password_file: Option<PathBuf>,
) -> Result<()> {
    info!("Initializing diaryledger...");

    if let Some(name) = backend {
        config.storage.backend = diaryledger::config::StorageBackend::parse(&name)
            .ok_or_else(|| Error::InvalidConfig(format!("Unknown storage backend: {}", name)))?;
    }
    if let Some(dir) = data_dir {
        config.data_dir = expand_tilde(&dir);
    }
    config.validate()?;

    if config.keystore_path().exists() {
        return Err(Error::Config(format!(
            "Ledger already initialized at {:?}",
            config.data_dir
        )));
    }

    let passphrase = read_passphrase(password_file.as_deref(), true)?;

    // Ensure config directory exists
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    config.save(config_path)?;

    let diary = DiaryService::open(&config, &passphrase)?;
    let status = diary.status()?;

    info!("Configuration saved to {:?}", config_path);
    info!("Data directory: {:?}", config.data_dir);
    info!("Genesis block: {}", status.tail_hash);

    Ok(())
}

fn cmd_list(diary: &DiaryService) -> Result<()> {
    let notes = diary.notes()?;
    if notes.is_empty() {
        println!("No notes.");
        return Ok(());
    }

    for note in notes {
        let first_line = note.content.lines().next().unwrap_or("");
        match note.updated_from {
            Some(from) => println!(
                "[{}] {}  {} (edit of {})",
                note.index, note.timestamp, first_line, from
            ),
            None => println!("[{}] {}  {}", note.index, note.timestamp, first_line),
        }
    }
    Ok(())
}

fn cmd_show(diary: &DiaryService, index: u64) -> Result<()> {
    let note = diary.note(index)?;

    println!("Note {}{}", note.index, if note.deleted { " (deleted)" } else { "" });
    println!("Written: {}", note.created_at);
    if let Some(from) = note.updated_from {
        println!("Replaces: {}", from);
    }
    println!();
    println!("{}", note.content);
    Ok(())
}

fn cmd_verify(diary: &DiaryService) -> Result<()> {
    let report = diary.verify();
    println!("Chain {}", report);

    if report.is_valid() {
        Ok(())
    } else {
        Err(Error::Corrupt(report.to_string()))
    }
}

fn cmd_status(config: &Config, diary: &DiaryService) -> Result<()> {
    let status = diary.status()?;

    println!("diaryledger Status");
    println!("==================");
    println!();
    println!("Data directory: {:?}", config.data_dir);
    println!("Storage: {} at {:?}", config.storage.backend.name(), config.ledger_path());
    println!("Blocks: {} (including genesis)", status.blocks);
    println!("Active notes: {}", status.active_notes);
    println!("Deleted notes: {}", status.deleted_notes);
    println!("Tail: block {} ({})", status.tail_index, status.tail_hash);
    Ok(())
}

fn unlock(config: &Config, password_file: Option<PathBuf>) -> Result<DiaryService> {
    let passphrase = read_passphrase(password_file.as_deref(), false)?;
    DiaryService::open(config, &passphrase)
}

/// Passphrase from file, environment, or prompt
fn read_passphrase(password_file: Option<&Path>, confirm: bool) -> Result<String> {
    if let Some(path) = password_file {
        return Ok(std::fs::read_to_string(path)
            .map_err(|e| Error::Internal(format!("Failed to read password file: {}", e)))?
            .trim()
            .to_string());
    }

    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }

    let password = rpassword::prompt_password("Enter diary passphrase: ")
        .map_err(|e| Error::Internal(e.to_string()))?;

    if confirm {
        let again = rpassword::prompt_password("Repeat passphrase: ")
            .map_err(|e| Error::Internal(e.to_string()))?;
        if again != password {
            return Err(Error::Config("Passphrases do not match".to_string()));
        }
    }

    Ok(password)
}

fn content_or_stdin(content: Option<String>) -> Result<String> {
    match content {
        Some(content) => Ok(content),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf.trim_end().to_string())
        }
    }
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
