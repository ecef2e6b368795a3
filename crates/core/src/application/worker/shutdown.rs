// Stop requests for running workers

use tokio::sync::watch;

/// Receiving side of a stop request, handed to `Worker::run`
///
/// Cheap to clone; every clone observes the same request. Losing every
/// `ShutdownSender` is treated as a request too.
#[derive(Clone)]
pub struct ShutdownToken {
    requested: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_shutdown(&self) -> bool {
        let sender_gone = self.requested.has_changed().is_err();
        sender_gone || *self.requested.borrow()
    }

    /// Resolves once a stop has been requested
    pub async fn wait(&mut self) {
        // Also resolves (with Err) once the sender is dropped
        let _ = self.requested.wait_for(|stop| *stop).await;
    }
}

/// Sending side, kept by whoever owns the worker's lifetime
pub struct ShutdownSender {
    requested: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Ask every worker holding a matching token to stop at its next safe point
    pub fn shutdown(&self) {
        self.requested.send_replace(true);
    }

    /// Another token for the same request (e.g. a second worker)
    pub fn subscribe(&self) -> ShutdownToken {
        ShutdownToken {
            requested: self.requested.subscribe(),
        }
    }
}

pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (requested, rx) = watch::channel(false);
    (ShutdownSender { requested }, ShutdownToken { requested: rx })
}
