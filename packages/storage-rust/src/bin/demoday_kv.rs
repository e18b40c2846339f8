//! `demoday-kv`: inspect and edit Demo Day storage from a terminal.
//!
//! Uses the same backend selection as the application: a host store given
//! with `--embedded-db`, else the remote document configured in the data
//! directory, else the data directory's local document.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use demoday_storage::config::{AdapterConfig, RemoteApiConfig};
use demoday_storage::local::FileLocalStorage;
use demoday_storage::{FlushOutcome, KvAdapter};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory holding the local storage area.
    #[arg(long, env = "DEMODAY_KV_DATA_DIR", default_value = ".demoday")]
    data_dir: PathBuf,

    /// Embedded database file offered as the host store.
    #[arg(long, env = "DEMODAY_KV_EMBEDDED_DB")]
    embedded_db: Option<PathBuf>,

    /// Remote document API root.
    #[arg(long, env = "DEMODAY_KV_API_URL", default_value = "https://api.github.com")]
    api_url: String,

    /// Log as JSON lines.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value stored under a key.
    Get { key: String },
    /// Store a value. Input that is not valid JSON is stored as a string.
    Set { key: String, value: String },
    /// Remove a key.
    Delete { key: String },
    /// List every key.
    Keys,
    /// Show the active backend and its sync state.
    Info,
    /// Connect to a remote document, creating one if needed.
    Configure {
        #[arg(long, env = "DEMODAY_KV_TOKEN", hide_env_values = true)]
        token: String,
        #[arg(long)]
        document_id: Option<String>,
    },
    /// Forget the remote document and fall back to local storage.
    Disconnect,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_adapter(args: &Args) -> anyhow::Result<KvAdapter> {
    let area = FileLocalStorage::open(args.data_dir.join("local-storage.json"))
        .with_context(|| format!("opening data directory {}", args.data_dir.display()))?;
    let config = AdapterConfig {
        remote: RemoteApiConfig {
            base_url: args.api_url.clone(),
            ..RemoteApiConfig::default()
        },
        ..AdapterConfig::default()
    };

    let mut builder = KvAdapter::builder()
        .with_config(config)
        .with_local_storage(Arc::new(area));

    if let Some(path) = &args.embedded_db {
        #[cfg(feature = "redb")]
        {
            let kv = demoday_storage::embedded::RedbEmbeddedKv::open(path)
                .with_context(|| format!("opening embedded database {}", path.display()))?;
            builder = builder.with_embedded(Arc::new(kv));
        }
        #[cfg(not(feature = "redb"))]
        anyhow::bail!(
            "--embedded-db {} needs the `redb` feature",
            path.display()
        );
    }

    Ok(builder.build()?)
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.log_json);
    let adapter = build_adapter(&args)?;

    let mut code = ExitCode::SUCCESS;
    match args.command {
        Command::Get { key } => match adapter.get_value(&key).await {
            Some(value) => print_json(&value)?,
            None => {
                eprintln!("{key}: not set");
                code = ExitCode::FAILURE;
            }
        },
        Command::Set { key, value } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            adapter.set_value(&key, value).await;
        }
        Command::Delete { key } => adapter.delete(&key).await,
        Command::Keys => {
            let mut keys = adapter.keys().await;
            keys.sort();
            for key in keys {
                println!("{key}");
            }
        }
        Command::Info => {
            let info = adapter.storage_info().await;
            print_json(&serde_json::to_value(&info)?)?;
            if let Some(status) = adapter.status() {
                println!("pending changes: {}", status.pending_changes);
                println!("failure streak:  {}", status.failure_streak);
                if let Some(error) = status.last_error {
                    println!("last error:      {error}");
                }
            }
        }
        Command::Configure { token, document_id } => {
            let id = adapter
                .configure_remote_storage(&token, document_id.as_deref())
                .await?;
            println!("{id}");
        }
        Command::Disconnect => adapter.clear_remote_storage().await?,
    }

    if let FlushOutcome::Requeued { changes, .. } = adapter.flush().await {
        let reason = adapter
            .status()
            .and_then(|s| s.last_error)
            .unwrap_or_else(|| "unknown error".to_string());
        eprintln!("{changes} change(s) not written to the remote document: {reason}");
        code = ExitCode::FAILURE;
    }
    Ok(code)
}
