//! # mailbox
//!
//! Command line front end for the mailbox email record engine.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailbox_core::content::parse_message;
use mailbox_core::{
    Email, EmailType, FsBlobStore, ListParams, ListQuery, Mailbox, MailboxConfig, ReadAction,
    SqliteStore,
};

type Engine = Mailbox<SqliteStore, FsBlobStore>;

/// Manage stored email records.
#[derive(Debug, Parser)]
#[command(name = "mailbox", version, about)]
struct Cli {
    /// Config file (defaults to the user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List one page of emails.
    List {
        /// inbox, sent or draft; all types if omitted.
        #[arg(long = "type", default_value = "")]
        email_type: String,
        /// Four-digit year.
        #[arg(long, default_value = "")]
        year: String,
        /// Month (requires --year).
        #[arg(long, default_value = "")]
        month: String,
        /// asc or desc.
        #[arg(long, default_value = "")]
        order: String,
        /// Items per page.
        #[arg(long, default_value = "")]
        page_size: String,
        /// Cursor from a previous page.
        #[arg(long, default_value = "")]
        cursor: String,
        /// List the trash instead.
        #[arg(long)]
        trashed: bool,
    },
    /// Show one email.
    Get { id: String },
    /// Mark an email read.
    Read { id: String },
    /// Mark an email unread.
    Unread { id: String },
    /// Move an email to the trash.
    Trash { id: String },
    /// Restore an email from the trash.
    Untrash { id: String },
    /// Permanently delete a trashed email or a draft.
    Delete { id: String },
    /// Write the raw message to stdout.
    Raw { id: String },
    /// Show decoded bodies and the part listing.
    Body { id: String },
    /// Write one attachment, inline or other part to stdout.
    Part {
        id: String,
        /// attachments, inlines or others.
        disposition: String,
        /// Content-ID of the part.
        content_id: String,
    },
    /// Store a raw message file as a new email.
    Import {
        /// Path to an RFC 5322 message.
        file: PathBuf,
        /// inbox, sent or draft.
        #[arg(long = "type", default_value = "inbox")]
        email_type: String,
        /// Message ID (defaults to the Message-ID header).
        #[arg(long)]
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailbox=info,mailbox_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mailbox = open(cli.config.as_deref()).await?;
    run(&mailbox, cli.command).await
}

/// Loads configuration and opens the stores.
async fn open(config_path: Option<&Path>) -> anyhow::Result<Engine> {
    let config_path = config_path.map_or_else(
        || {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("mailbox")
                .join("config.json")
        },
        Path::to_path_buf,
    );
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailbox");

    let config = MailboxConfig::load(&config_path)
        .await
        .with_context(|| format!("loading {}", config_path.display()))?
        .resolve(&data_dir);
    debug!(config = ?config_path, data = ?data_dir, "configuration loaded");

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let database_path = config
        .database_path
        .to_str()
        .context("database path is not valid UTF-8")?;
    let store = SqliteStore::new(database_path)
        .await
        .with_context(|| format!("opening {database_path}"))?;
    let blobs = FsBlobStore::open(&config.blob_dir)
        .await
        .with_context(|| format!("opening {}", config.blob_dir.display()))?;

    let mailbox = Mailbox::new(store, blobs, config);
    debug!(
        database = %mailbox.config().database_path.display(),
        raw = %mailbox.blobs().root().display(),
        timeout = ?mailbox.config().operation_timeout(),
        "mailbox opened"
    );
    Ok(mailbox)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn write_stdout(bytes: &[u8]) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(bytes).await?;
    stdout.flush().await?;
    Ok(())
}

async fn run(mailbox: &Engine, command: Command) -> anyhow::Result<()> {
    match command {
        Command::List {
            email_type,
            year,
            month,
            order,
            page_size,
            cursor,
            trashed,
        } => {
            let query = ListQuery::from_params(ListParams {
                email_type: &email_type,
                year: &year,
                month: &month,
                order: &order,
                page_size: &page_size,
                cursor: &cursor,
                trashed,
            })?;
            print_json(&mailbox.list(&query).await?)
        }
        Command::Get { id } => print_json(&mailbox.get(&id).await?),
        Command::Read { id } => {
            mailbox.read(&id, ReadAction::Read).await?;
            print_json(&json!({ "messageID": id, "status": "read" }))
        }
        Command::Unread { id } => {
            mailbox.read(&id, ReadAction::Unread).await?;
            print_json(&json!({ "messageID": id, "status": "unread" }))
        }
        Command::Trash { id } => {
            mailbox.trash(&id).await?;
            print_json(&json!({ "messageID": id, "status": "trashed" }))
        }
        Command::Untrash { id } => {
            mailbox.untrash(&id).await?;
            print_json(&json!({ "messageID": id, "status": "untrashed" }))
        }
        Command::Delete { id } => {
            mailbox.delete(&id).await?;
            print_json(&json!({ "messageID": id, "status": "deleted" }))
        }
        Command::Raw { id } => write_stdout(&mailbox.raw(&id).await?).await,
        Command::Body { id } => print_json(&mailbox.body(&id).await?),
        Command::Part {
            id,
            disposition,
            content_id,
        } => {
            let part = mailbox.part(&id, &disposition, &content_id).await?;
            debug!(content_type = %part.info.content_type, filename = %part.info.filename, "writing part");
            write_stdout(&part.content).await
        }
        Command::Import {
            file,
            email_type,
            id,
        } => import(mailbox, &file, &email_type, id).await,
    }
}

async fn import(
    mailbox: &Engine,
    file: &Path,
    email_type: &str,
    id: Option<String>,
) -> anyhow::Result<()> {
    let email_type: EmailType = email_type.parse()?;
    let raw = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let parsed = parse_message(&raw)?;

    let Some(message_id) = id.or(parsed.message_id) else {
        bail!("{} has no Message-ID header; pass --id", file.display());
    };
    let at = parsed.date.unwrap_or_else(Utc::now);
    let email = match email_type {
        EmailType::Inbox => Email::inbox(message_id, at, parsed.content),
        EmailType::Sent => Email::sent(message_id, at, parsed.content),
        EmailType::Draft => Email::draft(message_id, at, parsed.content),
    };

    mailbox.create_with_raw(&email, &raw).await?;
    info!(message_id = %email.message_id, %email_type, "imported message");
    print_json(&mailbox_core::EmailSummary::from(email))
}
