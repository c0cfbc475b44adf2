use crate::directory::SessionDirectory;
use crate::engine;
use crate::gate::Gate;
use crate::registry::UserRegistry;
use relaychat_proto::chat::v1 as pb;
use relaychat_proto::chat::v1::chat_server::Chat;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tonic::{Request, Response, Status, Streaming};

type UserEntryStream = Pin<Box<dyn Stream<Item = Result<pb::UserEntry, Status>> + Send>>;

/// The Chat service: one-shot registration and listing, plus the gated
/// Communicate stream handled by the broadcast engine.
pub struct ChatService {
    registry: Arc<UserRegistry>,
    directory: Arc<SessionDirectory>,
    gate: Gate,
}

impl ChatService {
    pub fn new(
        registry: Arc<UserRegistry>,
        directory: Arc<SessionDirectory>,
        channel_capacity: usize,
    ) -> Self {
        let gate = Gate::new(registry.clone(), directory.clone(), channel_capacity);
        Self {
            registry,
            directory,
            gate,
        }
    }
}

#[tonic::async_trait]
impl Chat for ChatService {
    type CommunicateStream = engine::EnvelopeStream;
    type ListUsersStream = UserEntryStream;

    async fn register(
        &self,
        req: Request<pb::RegisterRequest>,
    ) -> Result<Response<pb::RegisterResponse>, Status> {
        let name = req.into_inner().name;
        let user = self.registry.register(&name).map_err(|e| {
            tracing::warn!(name = %name, error = %e, "registration rejected");
            Status::invalid_argument(e.to_string())
        })?;
        tracing::info!(identity = %user.id, name = %user.name, "user registered");
        Ok(Response::new(pb::RegisterResponse {
            session_id: user.id,
        }))
    }

    async fn communicate(
        &self,
        req: Request<Streaming<pb::ClientMessage>>,
    ) -> Result<Response<Self::CommunicateStream>, Status> {
        let admitted = self.gate.admit(req.metadata())?;
        let inbound = req.into_inner();
        Ok(Response::new(engine::run(
            admitted,
            self.directory.clone(),
            inbound,
        )))
    }

    async fn list_users(
        &self,
        _req: Request<pb::ListUsersRequest>,
    ) -> Result<Response<Self::ListUsersStream>, Status> {
        let entries: Vec<Result<pb::UserEntry, Status>> = self
            .registry
            .list()
            .into_iter()
            .map(|u| Ok(pb::UserEntry { name: u.name }))
            .collect();
        Ok(Response::new(Box::pin(tokio_stream::iter(entries))))
    }
}
