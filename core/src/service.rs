//! Background-task plumbing: a spawned task plus a cooperative stop signal.

use std::future::Future;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Handed to a background task so it can observe a stop request, typically
/// as one arm of a `select!`.
pub struct StopHandle {
    shutdown_rx: oneshot::Receiver<()>,
}

impl StopHandle {
    fn new(shutdown_rx: oneshot::Receiver<()>) -> Self {
        Self { shutdown_rx }
    }

    /// Resolves when shutdown is requested. Also resolves if the owning
    /// handle is dropped, so orphaned tasks wind down instead of leaking.
    pub async fn signaled(&mut self) {
        (&mut self.shutdown_rx).await.unwrap_or_default();
    }
}

/// Handle for a background service task supporting cooperative shutdown.
pub struct ServiceHandle {
    join: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ServiceHandle {
    /// Request shutdown without awaiting completion.
    pub fn request_shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Request shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<(), tokio::task::JoinError> {
        self.request_shutdown();
        self.join.await
    }

    /// Forcefully abort the underlying task.
    pub fn abort(self) {
        self.join.abort();
    }
}

/// Spawn a background task wired to a [`StopHandle`].
pub fn spawn_service<Fut, Func>(f: Func) -> ServiceHandle
where
    Fut: Future<Output = ()> + Send + 'static,
    Func: FnOnce(StopHandle) -> Fut + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let stop = StopHandle::new(shutdown_rx);
    let join = tokio::spawn(f(stop));
    ServiceHandle {
        join,
        shutdown_tx: Some(shutdown_tx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn shutdown_stops_the_task() {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();
        let handle = spawn_service(move |mut stop| async move {
            stop.signaled().await;
            flag.store(true, Ordering::SeqCst);
        });
        handle.shutdown().await.unwrap();
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dropped_handle_releases_the_task() {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();
        let mut handle = spawn_service(move |mut stop| async move {
            stop.signaled().await;
            flag.store(true, Ordering::SeqCst);
        });
        drop(handle.shutdown_tx.take());
        let _ = handle.join.await;
        assert!(stopped.load(Ordering::SeqCst));
    }
}
