use anyhow::{Context, Result};
use clap::Parser;
use relaychat_proto::chat::v1::chat_server::ChatServer;
use relaychat_server::directory::SessionDirectory;
use relaychat_server::registry::UserRegistry;
use relaychat_server::service::ChatService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

#[derive(Parser, Debug)]
#[command(author, version, about = "relaychat broadcast relay server")]
struct Args {
    #[arg(long, default_value = "0.0.0.0:50200")]
    listen: String,
    /// Per-session delivery queue capacity; envelopes past it are dropped.
    #[arg(long, default_value = "256")]
    channel_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relaychat_server=info".into()),
        )
        .init();

    let args = Args::parse();
    let addr: SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("invalid --listen {}", args.listen))?;

    let registry = Arc::new(UserRegistry::new());
    let directory = Arc::new(SessionDirectory::new());
    let svc = ChatService::new(registry, directory, args.channel_capacity);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local_addr = listener.local_addr()?;
    tracing::info!(
        "relaychat listening addr={local_addr} channel_capacity={}",
        args.channel_capacity,
    );

    Server::builder()
        .add_service(ChatServer::new(svc))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("chat server failed")?;

    Ok(())
}
