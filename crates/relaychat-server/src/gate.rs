use crate::directory::SessionDirectory;
use crate::envelope;
use crate::registry::UserRegistry;
use relaychat_proto::chat::v1 as pb;
use std::sync::Arc;
use tokio::sync::mpsc;
use tonic::Status;
use tonic::metadata::MetadataMap;

/// Metadata key carrying the session identity issued at registration.
pub const CREDENTIAL_KEY: &str = "uid";

/// A stream that passed admission: its delivery channel is registered and the
/// join notice has gone out. The broadcast engine takes it from here.
#[derive(Debug)]
pub struct AdmittedSession {
    pub identity: String,
    pub display_name: String,
    pub outbound: mpsc::Receiver<pb::Envelope>,
}

/// Admission check for streaming connections. Runs exactly once per stream,
/// before any inbound message is read; one-shot RPCs are not gated.
pub struct Gate {
    registry: Arc<UserRegistry>,
    directory: Arc<SessionDirectory>,
    channel_capacity: usize,
}

impl Gate {
    pub fn new(
        registry: Arc<UserRegistry>,
        directory: Arc<SessionDirectory>,
        channel_capacity: usize,
    ) -> Self {
        Self {
            registry,
            directory,
            channel_capacity,
        }
    }

    /// Validate the stream's credential, register its delivery channel, and
    /// announce the join to everyone else.
    pub fn admit(&self, metadata: &MetadataMap) -> Result<AdmittedSession, Status> {
        let identity = single_meta_value(metadata, CREDENTIAL_KEY)?;

        // Same status whether the identity never existed or went away; the
        // caller learns only that the credential is not accepted.
        let user = self.registry.resolve(&identity).map_err(|e| {
            tracing::warn!(identity = %identity, error = %e, "rejecting unauthorized stream");
            Status::permission_denied("session is not authorized")
        })?;

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        if !self.directory.register(&identity, tx) {
            tracing::warn!(identity = %identity, name = %user.name,
                "identity already has a live session");
            return Err(Status::failed_precondition(
                "identity already has a live session",
            ));
        }

        self.directory.broadcast(
            envelope::system_envelope(format!("User {} entered the chat", user.name)),
            &identity,
        );
        tracing::info!(identity = %identity, name = %user.name, "session admitted");

        Ok(AdmittedSession {
            identity,
            display_name: user.name,
            outbound: rx,
        })
    }
}

/// Fetch the single metadata value for `key`, rejecting absent or repeated
/// values before any session state is created.
fn single_meta_value(metadata: &MetadataMap, key: &str) -> Result<String, Status> {
    let mut values = metadata.get_all(key).iter();
    let first = values
        .next()
        .ok_or_else(|| Status::permission_denied(format!("missing {key} in metadata")))?;
    if values.next().is_some() {
        return Err(Status::invalid_argument(format!(
            "metadata value is not single for {key}"
        )));
    }
    first
        .to_str()
        .map(str::to_owned)
        .map_err(|_| Status::invalid_argument(format!("metadata value for {key} is not ascii")))
}
