use crate::directory::SessionDirectory;
use crate::envelope;
use crate::gate::AdmittedSession;
use relaychat_proto::chat::v1 as pb;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_stream::{Stream, StreamExt};
use tonic::{Status, Streaming};

pub type EnvelopeStream = Pin<Box<dyn Stream<Item = Result<pb::Envelope, Status>> + Send>>;

/// Session teardown, shared by every engine role.
///
/// Removing the directory entry and announcing the departure happen as one
/// step, triggered by whichever role observes termination first. The once-flag
/// makes later triggers no-ops, so a disconnect racing a stream close can
/// neither duplicate nor lose the notice.
pub struct SessionGuard {
    identity: String,
    display_name: String,
    directory: Arc<SessionDirectory>,
    departed: AtomicBool,
}

impl SessionGuard {
    pub fn new(identity: String, display_name: String, directory: Arc<SessionDirectory>) -> Self {
        Self {
            identity,
            display_name,
            directory,
            departed: AtomicBool::new(false),
        }
    }

    pub fn depart(&self) {
        if self.departed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.directory.remove(&self.identity);
        self.directory.broadcast(
            envelope::system_envelope(format!("User {} logged out", self.display_name)),
            &self.identity,
        );
        tracing::info!(identity = %self.identity, name = %self.display_name, "session departed");
    }
}

/// Fires departure if the transport tears the response stream down before the
/// inbound role noticed the client was gone.
struct DisconnectWatcher(Arc<SessionGuard>);

impl Drop for DisconnectWatcher {
    fn drop(&mut self) {
        self.0.depart();
    }
}

/// Run the per-session broadcast engine.
///
/// The inbound role fans client messages out to every other session; the
/// returned stream is the outbound role, draining this session's delivery
/// channel until the directory entry (and with it the channel) goes away.
pub fn run(
    admitted: AdmittedSession,
    directory: Arc<SessionDirectory>,
    mut inbound: Streaming<pb::ClientMessage>,
) -> EnvelopeStream {
    let AdmittedSession {
        identity,
        display_name,
        mut outbound,
    } = admitted;
    let guard = Arc::new(SessionGuard::new(
        identity.clone(),
        display_name.clone(),
        directory.clone(),
    ));

    let inbound_guard = guard.clone();
    tokio::spawn(async move {
        loop {
            match inbound.next().await {
                Some(Ok(msg)) => {
                    directory.broadcast(
                        envelope::user_envelope(&display_name, msg.message),
                        &identity,
                    );
                }
                Some(Err(status)) => {
                    tracing::warn!(identity = %identity, %status, "error receiving from client");
                    break;
                }
                None => {
                    tracing::debug!(identity = %identity, "client stopped streaming");
                    break;
                }
            }
        }
        inbound_guard.depart();
    });

    let watcher = DisconnectWatcher(guard);
    let stream = async_stream::stream! {
        let _watcher = watcher;
        while let Some(env) = outbound.recv().await {
            yield Ok(env);
        }
    };
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn departure_runs_exactly_once() {
        let directory = Arc::new(SessionDirectory::new());
        let (tx_a, _rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        directory.register("a", tx_a);
        directory.register("b", tx_b);

        let guard = SessionGuard::new("a".to_string(), "alice".to_string(), directory.clone());
        guard.depart();
        guard.depart();

        assert!(!directory.is_registered("a"));
        let notice = rx_b.try_recv().unwrap();
        assert_eq!(notice.message, "User alice logged out");
        assert_eq!(notice.sender, envelope::SYSTEM_SENDER);
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn concurrent_departure_is_single() {
        let directory = Arc::new(SessionDirectory::new());
        let (tx_a, _rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        directory.register("a", tx_a);
        directory.register("b", tx_b);

        let guard = Arc::new(SessionGuard::new(
            "a".to_string(),
            "alice".to_string(),
            directory,
        ));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || guard.depart())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(rx_b.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }
}
