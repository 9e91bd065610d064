//! Per-session task registry.
//!
//! Every timer a session starts is registered here so that tearing the
//! session down stops all of them at once.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct TaskRegistry {
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Run `fut` until it finishes or the registry shuts down.
    pub fn spawn_cancellable<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = fut => {}
            }
        });
        self.handles.lock().push(handle);
    }

    /// Sleep `interval`, run `f`, repeat while `f` returns true.
    pub fn spawn_interval_until<F, Fut>(&self, interval: Duration, f: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.spawn_adaptive_until(move || interval, f);
    }

    /// Like [`spawn_interval_until`](Self::spawn_interval_until) but asks
    /// `next_delay` for the interval before every sleep. `f` is awaited to
    /// completion before the next sleep starts, so ticks never overlap.
    pub fn spawn_adaptive_until<D, F, Fut>(&self, mut next_delay: D, mut f: F)
    where
        D: FnMut() -> Duration + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(next_delay()) => {}
                }

                if !f().await {
                    break;
                }
            }
        });
        self.handles.lock().push(handle);
    }

    /// Number of tasks still running.
    pub fn active(&self) -> usize {
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.len()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn interval_ticks_until_shutdown() {
        let registry = TaskRegistry::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        registry.spawn_interval_until(Duration::from_secs(15), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }
        });

        tokio::time::sleep(Duration::from_secs(46)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        registry.shutdown();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert_eq!(registry.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn task_stops_when_callback_returns_false() {
        let registry = TaskRegistry::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        registry.spawn_interval_until(Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move { counter.fetch_add(1, Ordering::SeqCst) < 1 }
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert_eq!(registry.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn adaptive_delay_is_read_every_iteration() {
        let registry = TaskRegistry::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let mut delays = vec![Duration::from_secs(60), Duration::from_secs(30)].into_iter();
        registry.spawn_adaptive_until(
            move || delays.next().unwrap_or(Duration::from_secs(3600)),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    true
                }
            },
        );

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }
}
