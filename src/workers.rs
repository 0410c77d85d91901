use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared stop signal. Work already started finishes; nothing new starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }
}

/// Runs `task` over `items` on up to `workers` threads and returns the results
/// in input order. Slots are `None` for items skipped after cancellation or
/// whose task panicked.
pub fn fan_out<T, R, F>(items: &[T], workers: usize, cancel: &CancelFlag, task: F) -> Vec<Option<R>>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Sync,
{
    let mut results = (0..items.len()).map(|_| None).collect::<Vec<Option<R>>>();
    if items.is_empty() {
        return results;
    }

    let workers = workers.clamp(1, items.len());
    let next_index = AtomicUsize::new(0);
    let (tx, rx) = bounded::<(usize, R)>(workers * 2);

    std::thread::scope(|scope| {
        let handles = (0..workers)
            .map(|_| {
                let tx = tx.clone();
                let next_index = &next_index;
                let task = &task;
                scope.spawn(move || loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let idx = next_index.fetch_add(1, Ordering::Relaxed);
                    if idx >= items.len() {
                        break;
                    }
                    let out = task(idx, &items[idx]);
                    if tx.send((idx, out)).is_err() {
                        break;
                    }
                })
            })
            .collect::<Vec<_>>();
        drop(tx);

        for (idx, out) in rx.iter() {
            results[idx] = Some(out);
        }

        for h in handles {
            if h.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    });

    results
}
