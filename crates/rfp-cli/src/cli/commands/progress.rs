//! Progress printer for `get` / `put`, fed by client events.

use std::collections::HashMap;
use std::time::Instant;

use rfp_core::{ClientEvent, TaskId, TransferProgress};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

const PROGRESS_INTERVAL_MS: u128 = 500;

pub struct ProgressPrinter {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ProgressPrinter {
    /// Starts printing progress lines for every transfer seen on `events`.
    pub fn spawn(mut events: broadcast::Receiver<ClientEvent>) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut lines = ProgressLines::default();
            loop {
                tokio::select! {
                    _ = &mut stopped => {
                        for line in lines.drain(&mut events) {
                            println!("\r  {}  ", line);
                        }
                        break;
                    }
                    event = events.recv() => match event {
                        Ok(event) => {
                            if let Some(line) = lines.line(&event, Instant::now()) {
                                println!("\r  {}  ", line);
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "progress printer lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });
        Self { stop, handle }
    }

    pub async fn finish(self) {
        let _ = self.stop.send(());
        let _ = self.handle.await;
    }
}

/// Throttles progress lines per transfer; a transfer's final chunk always prints.
#[derive(Default)]
struct ProgressLines {
    last_print: HashMap<TaskId, Instant>,
}

impl ProgressLines {
    fn line(&mut self, event: &ClientEvent, now: Instant) -> Option<String> {
        let ClientEvent::Progress { transfer, progress } = event else {
            return None;
        };
        let due = self
            .last_print
            .get(&transfer.id)
            .map(|t| now.duration_since(*t).as_millis() >= PROGRESS_INTERVAL_MS)
            .unwrap_or(true);
        let done = progress.total_bytes == Some(progress.bytes_done);
        if !(due || done) {
            return None;
        }
        self.last_print.insert(transfer.id, now);
        Some(format_progress(transfer.id, progress))
    }

    /// Lines for events still buffered once the transfers are over.
    fn drain(&mut self, events: &mut broadcast::Receiver<ClientEvent>) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            match events.try_recv() {
                Ok(event) => lines.extend(self.line(&event, Instant::now())),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        lines
    }
}

fn format_progress(id: TaskId, progress: &TransferProgress) -> String {
    let done_mib = progress.bytes_done as f64 / 1_048_576.0;
    let rate_mib = progress.bytes_per_sec() / 1_048_576.0;
    let eta = progress
        .eta_secs()
        .map(|s| format!("{:.0}s", s))
        .unwrap_or_else(|| "?".to_string());
    match (progress.total_bytes, progress.fraction()) {
        (Some(total), Some(fraction)) => format!(
            "[{}] {:.1} / {:.1} MiB ({:.1}%)  {:.2} MiB/s  ETA {}",
            id,
            done_mib,
            total as f64 / 1_048_576.0,
            fraction * 100.0,
            rate_mib,
            eta
        ),
        _ => format!("[{}] {:.1} MiB  {:.2} MiB/s", id, done_mib, rate_mib),
    }
}
