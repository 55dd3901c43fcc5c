use clap::Parser;
use miette::{IntoDiagnostic, Result};
use paydesk::application::router::Router;
use paydesk::domain::chat::{
    CallbackEvent, CallbackId, ChatId, ChatInfo, Incoming, MessageId, MessageRef, Update, UserId,
    UserInfo,
};
use paydesk::domain::money::Balance;
use paydesk::domain::ports::{
    Directory, IdSet, QrRenderer, ReplyDirectory, SessionStore, SettingKey, Transport,
};
use paydesk::infrastructure::in_memory::{InMemoryDirectory, InMemoryReplyLinks, InMemorySessions};
use paydesk::infrastructure::recording::{PassthroughQr, RecordingTransport};
use paydesk::interfaces::script::transcript_writer::TranscriptWriter;
use paydesk::interfaces::script::update_reader::{ScriptEvent, UpdateReader};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

/// Replays a session script against the bot core and prints the outbound
/// transcript as JSON lines.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Session script (JSON lines)
    script: PathBuf,

    /// Path to a persistent directory database (requires the
    /// storage-rocksdb feature). Without it, state is in-memory.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Capacity of the reply-correlation map
    #[arg(long, default_value_t = 4096)]
    reply_links_cap: usize,
}

#[cfg(feature = "storage-rocksdb")]
fn open_database(path: PathBuf) -> Result<Arc<dyn Directory>> {
    let store =
        paydesk::infrastructure::rocksdb::RocksDbDirectory::open(path).into_diagnostic()?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_database(_path: PathBuf) -> Result<Arc<dyn Directory>> {
    Err(miette::miette!(
        "built without the storage-rocksdb feature; rebuild with --features storage-rocksdb"
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries only the transcript.
    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let directory: Arc<dyn Directory> = match cli.db_path {
        Some(path) => open_database(path)?,
        None => Arc::new(InMemoryDirectory::new()),
    };
    let transport = Arc::new(RecordingTransport::new());
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessions::new());
    let links: Arc<dyn ReplyDirectory> =
        Arc::new(InMemoryReplyLinks::with_capacity(cli.reply_links_cap));
    let qr: Arc<dyn QrRenderer> = Arc::new(PassthroughQr);

    let router = Router::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::clone(&directory),
        sessions,
        links,
        qr,
    );

    let file = File::open(&cli.script).into_diagnostic()?;
    let reader = UpdateReader::new(file);
    let mut synthetic_id = 1_000_000i64;

    for event in reader.events() {
        match event.into_diagnostic()? {
            ScriptEvent::Admin { id } => {
                directory
                    .add_member(IdSet::Admins, id)
                    .await
                    .into_diagnostic()?;
            }
            ScriptEvent::Setting { key, value } => {
                let key = match key.as_str() {
                    "welcome" => SettingKey::Welcome,
                    "stock" => SettingKey::Stock,
                    "upi_id" => SettingKey::UpiId,
                    other => return Err(miette::miette!("unknown setting key: {other}")),
                };
                directory.set_setting(key, &value).await.into_diagnostic()?;
            }
            ScriptEvent::Balance { user, amount } => {
                directory
                    .set_balance(UserId(user), Balance::new(amount))
                    .await
                    .into_diagnostic()?;
            }
            ScriptEvent::User {
                id,
                username,
                first_name,
                last_name,
            } => {
                directory
                    .upsert_user(UserId(id), username.as_deref())
                    .await
                    .into_diagnostic()?;
                transport
                    .register_user(UserInfo {
                        id: UserId(id),
                        username,
                        first_name: first_name.unwrap_or_else(|| "User".to_string()),
                        last_name,
                    })
                    .await;
            }
            ScriptEvent::Channel {
                id,
                title,
                username,
            } => {
                transport
                    .register_chat(ChatInfo {
                        id: ChatId(id),
                        title,
                        username,
                    })
                    .await;
            }
            ScriptEvent::Member { chat, user, status } => {
                transport
                    .set_member(ChatId(chat), UserId(user), status)
                    .await;
            }
            ScriptEvent::ForceSub { chat } => {
                directory
                    .add_member(IdSet::ForceSub, chat)
                    .await
                    .into_diagnostic()?;
            }
            ScriptEvent::Reply { user, text } => {
                synthetic_id += 1;
                transport
                    .queue_message(Incoming {
                        chat: ChatId(user),
                        from: UserId(user),
                        id: MessageId(synthetic_id),
                        text: Some(text),
                        reply_to: None,
                        reply_to_user: None,
                    })
                    .await;
            }
            ScriptEvent::Message {
                chat,
                from,
                id,
                text,
                reply_to,
                reply_to_user,
            } => {
                let id = id.unwrap_or_else(|| {
                    synthetic_id += 1;
                    synthetic_id
                });
                router
                    .handle(Update::Message(Incoming {
                        chat: ChatId(chat),
                        from: UserId(from),
                        id: MessageId(id),
                        text,
                        reply_to: reply_to.map(MessageId),
                        reply_to_user: reply_to_user.map(UserId),
                    }))
                    .await;
            }
            ScriptEvent::Callback {
                from,
                chat,
                message,
                data,
                id,
            } => {
                synthetic_id += 1;
                let id = id.unwrap_or_else(|| format!("cb{synthetic_id}"));
                router
                    .handle(Update::Callback(CallbackEvent {
                        id: CallbackId(id),
                        from: UserId(from),
                        message: MessageRef {
                            chat: ChatId(chat),
                            id: MessageId(message),
                        },
                        data,
                    }))
                    .await;
            }
        }
    }

    let stdout = io::stdout();
    let mut writer = TranscriptWriter::new(stdout.lock());
    writer
        .write_all(&transport.drain().await)
        .into_diagnostic()?;

    Ok(())
}
