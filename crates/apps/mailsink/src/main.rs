//! mailsink - a catch-all mail store
//!
//! Command-line front end: feeds submissions into the store and reads them
//! back out.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use mailsink::content_id::is_valid_id;
use mailsink::query::{self, MessageSummary};
use mailsink::storage::{MailStore, SqliteMailStore};
use mailsink::{Fault, IngestError, Ingestor, MessageId, SinkConfig};

#[derive(Parser, Debug)]
#[command(name = "mailsink", version, about = "Store every submitted message for later retrieval")]
struct Cli {
    /// Config file (defaults to ~/.config/mailsink/mailsink.json)
    #[arg(long, value_name = "FILE", env = "MAILSINK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the configuration
    #[arg(long, value_name = "FILE", global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store one message read from FILE or stdin
    Ingest {
        /// Sender, e.g. "Jane Doe" <jane@example.com>
        #[arg(long = "from", value_name = "SENDER")]
        sender: String,
        file: Option<PathBuf>,
    },
    /// List stored messages
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one message
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Write the raw message to stdout
    Raw { id: String },
    /// Write the header block to stdout
    Headers { id: String },
    /// Write the body to stdout
    Body { id: String },
    /// Delete messages
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Print the number of stored messages
    Count,
    /// Print the effective configuration
    Config {
        /// Save it as the default config file
        #[arg(long)]
        write: bool,
    },
}

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Map an error to the process exit code
///
/// Ingestion faults are distinguished: client 2, server 1, fatal 3.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<IngestError>().map(IngestError::fault) {
        Some(Fault::Client) => 2,
        Some(Fault::Fatal) => 3,
        Some(Fault::Server) | None => 1,
    }
}

fn load_config(cli: &Cli) -> Result<SinkConfig> {
    let mut cfg = match &cli.config {
        Some(path) => SinkConfig::from_file(path)?,
        None => SinkConfig::load()?,
    };
    if let Some(database) = &cli.database {
        cfg.database_path = database.clone();
    }
    Ok(cfg)
}

fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli)?;

    if let Commands::Config { write } = cli.command {
        return cmd_config(&cfg, write);
    }

    let store = Arc::new(SqliteMailStore::from_config(&cfg)?);
    let result = dispatch(&store, &cfg, cli.command);

    let closed = match Arc::try_unwrap(store) {
        Ok(store) => store.close(),
        Err(_) => {
            warn!("Mail store still in use, leaving it to be dropped");
            Ok(())
        }
    };
    result.and(closed)
}

fn dispatch(store: &Arc<SqliteMailStore>, cfg: &SinkConfig, command: Commands) -> Result<()> {
    match command {
        Commands::Ingest { sender, file } => cmd_ingest(store, &sender, file),
        Commands::List { json } => cmd_list(store.as_ref(), json),
        Commands::Show { id, json } => cmd_show(store.as_ref(), &parse_id(id)?, json),
        Commands::Raw { id } => {
            let id = parse_id(id)?;
            write_bytes(query::message_content(store.as_ref(), &id)?, &id)
        }
        Commands::Headers { id } => {
            let id = parse_id(id)?;
            write_bytes(query::message_headers(store.as_ref(), &id)?, &id)
        }
        Commands::Body { id } => {
            let id = parse_id(id)?;
            write_bytes(query::message_body(store.as_ref(), &id)?, &id)
        }
        Commands::Delete { ids } => {
            let ids = ids.into_iter().map(parse_id).collect::<Result<Vec<_>>>()?;
            query::remove(store.as_ref(), &ids)?;
            info!("Deleted {} message(s)", ids.len());
            Ok(())
        }
        Commands::Count => {
            println!("{}", store.count_messages()?);
            Ok(())
        }
        Commands::Config { write } => cmd_config(cfg, write),
    }
}

fn parse_id(id: String) -> Result<MessageId> {
    if !is_valid_id(&id) {
        bail!("{id:?} is not a message id");
    }
    Ok(MessageId::new(id))
}

fn cmd_ingest(store: &Arc<SqliteMailStore>, sender: &str, file: Option<PathBuf>) -> Result<()> {
    let reader: Box<dyn Read> = match file {
        Some(path) => Box::new(
            File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };

    let ingestor = Ingestor::new(store.clone());
    let id = ingestor.ingest(sender, reader)?;
    println!("{id}");
    Ok(())
}

fn cmd_list(store: &dyn MailStore, json: bool) -> Result<()> {
    let summaries = query::list_summaries(store)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }
    for summary in &summaries {
        println!("{}", format_summary(summary));
    }
    Ok(())
}

fn format_summary(summary: &MessageSummary) -> String {
    let mut line = format!(
        "{}  {}  {}  {} bytes",
        summary.id,
        summary.received_at.format("%Y-%m-%d %H:%M:%S"),
        summary.sender,
        summary.size
    );
    if !summary.title.is_empty() {
        line.push_str("\n    ");
        line.push_str(&summary.title);
    }
    line
}

fn cmd_show(store: &dyn MailStore, id: &MessageId, json: bool) -> Result<()> {
    let Some(detail) = query::get_message_detail(store, id)? else {
        bail!("Message {id} not found");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let message = &detail.message;
    println!("Id:       {}", message.id);
    println!("From:     {}", detail.sender.display());
    println!("Subject:  {}", message.subject_preview);
    println!("Received: {}", message.received_at.to_rfc3339());
    println!("Size:     {} bytes", message.size);
    println!();
    println!("{}", message.body_preview);
    Ok(())
}

fn write_bytes(bytes: Option<Vec<u8>>, id: &MessageId) -> Result<()> {
    let Some(bytes) = bytes else {
        bail!("Message {id} not found");
    };
    let mut stdout = io::stdout().lock();
    stdout.write_all(&bytes)?;
    stdout.flush()?;
    Ok(())
}

fn cmd_config(cfg: &SinkConfig, write: bool) -> Result<()> {
    if write {
        let path = cfg.save()?;
        info!("Wrote configuration to {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(cfg)?);
    Ok(())
}
