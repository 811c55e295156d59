//! Event listeners decoupled onto a dedicated drain thread.

use tokio::sync::mpsc;

use crate::{Error, Result, TRACING_TARGET_PARALLEL};

/// Sending half of a drain thread.
///
/// Events sent here are handled in order on a dedicated thread, so a slow
/// handler never blocks the thread raising the event. The drain thread ends
/// once every clone of the sender is dropped and the queue is empty.
#[derive(Debug)]
pub struct Decoupled<E> {
    sender: mpsc::UnboundedSender<E>,
}

impl<E: Send + 'static> Decoupled<E> {
    /// Spawns a drain thread named `name` running `handler` for every event.
    pub fn spawn<F>(name: impl Into<String>, mut handler: F) -> Result<Self>
    where
        F: FnMut(E) + Send + 'static,
    {
        let name = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<E>();

        std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Some(event) = receiver.blocking_recv() {
                    handler(event);
                }
                tracing::debug!(
                    target: TRACING_TARGET_PARALLEL,
                    thread = %name,
                    "Drain thread finished"
                );
            })
            .map_err(|e| {
                Error::internal_error()
                    .with_message("failed to spawn drain thread")
                    .with_source(Box::new(e))
            })?;

        Ok(Self { sender })
    }

    /// Queues `event` for the drain thread.
    ///
    /// Returns `false` when the drain thread is gone.
    pub fn send(&self, event: E) -> bool {
        self.sender.send(event).is_ok()
    }
}

impl<E> Clone for Decoupled<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
