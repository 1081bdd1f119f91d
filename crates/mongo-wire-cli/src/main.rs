//! Wire protocol diagnostic CLI
//!
//! Connects to a MongoDB-compatible server, optionally authenticates, and
//! runs `ping` and `buildInfo` to confirm the connection works end to end.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mongo_wire::{doc, MsgBody, OpMsg, Value};
use mongo_wire_client::{connect, Conn};

#[derive(Parser, Debug)]
#[command(name = "mongo-wire-cli")]
#[command(about = "Diagnostic client for MongoDB wire protocol servers")]
struct Args {
    /// Server URI (credentials must be passed separately)
    #[arg(long, default_value = "mongodb://127.0.0.1:27017/")]
    uri: String,

    /// Username to authenticate with
    #[arg(long)]
    username: Option<String>,

    /// Password to authenticate with
    #[arg(long, default_value = "")]
    password: String,

    /// Authentication database
    #[arg(long, default_value = "admin")]
    auth_source: String,

    /// Force an authentication mechanism instead of negotiating one
    #[arg(long)]
    mechanism: Option<String>,

    /// Per-operation timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut conn = connect(&args.uri)
        .await
        .with_context(|| format!("connecting to {}", args.uri))?;
    conn.set_timeout(Some(Duration::from_secs(args.timeout)));
    info!(uri = %args.uri, "connected");

    if let Some(username) = &args.username {
        conn.login(
            username,
            &args.password,
            &args.auth_source,
            args.mechanism.as_deref(),
        )
        .await
        .context("authentication failed")?;
        info!(username = %username, "authenticated");
    }

    conn.ping().await.context("ping failed")?;
    info!("ping ok");

    let build_info = build_info(&mut conn).await?;
    println!("server version: {build_info}");

    conn.close().await?;
    Ok(())
}

async fn build_info(conn: &mut Conn) -> anyhow::Result<String> {
    let cmd = doc! { "buildInfo" => 1_i32, "$db" => "admin" };
    let (_, body) = conn.request(&MsgBody::Msg(OpMsg::new(&cmd)?)).await?;

    let op_code = body.op_code();
    let MsgBody::Msg(msg) = body else {
        anyhow::bail!("unexpected {op_code} reply to buildInfo");
    };
    let doc = msg.document_deep()?;

    match doc.get("version") {
        Some(Value::String(version)) => Ok(version.clone()),
        other => anyhow::bail!("buildInfo returned no version: {other:?}"),
    }
}
