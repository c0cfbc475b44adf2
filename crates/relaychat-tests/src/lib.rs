//! Integration test helpers: an in-process relaychat server plus stream
//! clients that speak the real gRPC surface over localhost.

use anyhow::{Context, Result};
use relaychat_proto::chat::v1 as pb;
use relaychat_proto::chat::v1::chat_client::ChatClient;
use relaychat_proto::chat::v1::chat_server::ChatServer;
use relaychat_server::directory::SessionDirectory;
use relaychat_server::registry::UserRegistry;
use relaychat_server::service::ChatService;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::transport::{Channel, Server};
use tonic::{Request, Streaming};

/// Initialize tracing for tests (only once per process).
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("relaychat_server=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// An in-process server on an ephemeral port, torn down on drop.
pub struct TestServer {
    pub addr: SocketAddr,
    pub directory: Arc<SessionDirectory>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with_capacity(64).await
    }

    pub async fn spawn_with_capacity(channel_capacity: usize) -> Result<Self> {
        init_tracing();
        let registry = Arc::new(UserRegistry::new());
        let directory = Arc::new(SessionDirectory::new());
        let svc = ChatService::new(registry, directory.clone(), channel_capacity);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = Server::builder()
                .add_service(ChatServer::new(svc))
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Ok(Self {
            addr,
            directory,
            shutdown: Some(shutdown_tx),
        })
    }

    pub async fn client(&self) -> Result<ChatClient<Channel>> {
        let channel = Channel::from_shared(format!("http://{}", self.addr))?
            .connect()
            .await
            .context("failed to connect to test server")?;
        Ok(ChatClient::new(channel))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// One connected chat session in a test.
#[derive(Debug)]
pub struct TestSession {
    pub identity: String,
    outbound: mpsc::Sender<pb::ClientMessage>,
    inbound: Streaming<pb::Envelope>,
}

impl TestSession {
    /// Register `name` and open a Communicate stream for it.
    pub async fn join(server: &TestServer, name: &str) -> Result<Self> {
        let mut client = server.client().await?;
        let identity = client
            .register(pb::RegisterRequest {
                name: name.to_string(),
            })
            .await?
            .into_inner()
            .session_id;
        Self::join_with_identity(server, &identity).await
    }

    /// Open a Communicate stream presenting an explicit identity.
    pub async fn join_with_identity(server: &TestServer, identity: &str) -> Result<Self> {
        let mut client = server.client().await?;
        let (tx, rx) = mpsc::channel(16);
        let mut request = Request::new(ReceiverStream::new(rx));
        request.metadata_mut().insert("uid", identity.parse()?);
        let inbound = client.communicate(request).await?.into_inner();
        Ok(Self {
            identity: identity.to_string(),
            outbound: tx,
            inbound,
        })
    }

    pub async fn send(&self, message: &str) -> Result<()> {
        self.outbound
            .send(pb::ClientMessage {
                message: message.to_string(),
            })
            .await
            .context("client stream closed")?;
        Ok(())
    }

    /// Next envelope, failing the test after a timeout rather than hanging.
    pub async fn recv(&mut self) -> Result<pb::Envelope> {
        let env = tokio::time::timeout(Duration::from_secs(5), self.inbound.message())
            .await
            .context("timed out waiting for envelope")??
            .context("server stream ended")?;
        Ok(env)
    }

    /// Assert that no envelope arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(res) = tokio::time::timeout(window, self.inbound.message()).await {
            panic!("expected no envelope, got {res:?}");
        }
    }

    /// Close the client half of the stream; the server sees a clean EOF.
    pub fn close(self) {
        drop(self.outbound);
    }
}
