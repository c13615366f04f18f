//! Device session driver: one task owns the adapter and serializes cycles

use futures::{Stream, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{CommandSink, NotificationSource};
use crate::adapter::{CycleReport, DeviceAdapter, encode_frames, run_cycle};
use crate::config::SessionConfig;
use crate::types::Value;
use crate::{ProtocolError, Result};

/// Latest value of every property the device has reported.
pub type PropertySnapshot = BTreeMap<String, Value>;

/// Counters kept by the session task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Notifications received from the source
    pub notifications: u64,
    /// Notifications the adapter routed to a record
    pub cycles: u64,
    /// Notifications rejected at frame level
    pub dropped_frames: u64,
    /// Notifications that parsed but failed while routing
    pub record_errors: u64,
    /// Commands written to the sink
    pub commands: u64,
    /// Commands that failed to encode or write
    pub failed_commands: u64,
}

struct QueuedCommand<C> {
    command: C,
    reply: oneshot::Sender<Result<usize>>,
}

enum Event<C> {
    Notification(Result<Option<Vec<u8>>>),
    Command(Option<QueuedCommand<C>>),
}

/// Handle to a running device session.
///
/// The session task owns the adapter and handles exactly one notification
/// or one queued command at a time. Dropping the handle cancels the task.
pub struct DeviceSession<C> {
    commands: mpsc::Sender<QueuedCommand<C>>,
    reports: broadcast::Receiver<Arc<CycleReport>>,
    snapshot: watch::Receiver<Arc<PropertySnapshot>>,
    stats: watch::Receiver<SessionStats>,
    cancel: CancellationToken,
    task: Option<JoinHandle<SessionStats>>,
}

impl<C> fmt::Debug for DeviceSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("stats", &*self.stats.borrow())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<C> DeviceSession<C>
where
    C: fmt::Debug + Send + 'static,
{
    /// Spawn the session task for `adapter`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<A, S, K>(adapter: A, source: S, sink: K, config: SessionConfig) -> Self
    where
        A: DeviceAdapter<Command = C>,
        S: NotificationSource,
        K: CommandSink,
    {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (report_tx, report_rx) = broadcast::channel(config.change_capacity.max(1));
        let initial = Arc::new(adapter.projection().state().snapshot());
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);
        let (stats_tx, stats_rx) = watch::channel(SessionStats::default());
        let cancel = CancellationToken::new();

        let task = SessionTask {
            adapter,
            source,
            sink,
            commands: command_rx,
            reports: report_tx,
            snapshot: snapshot_tx,
            stats_tx,
            stats: SessionStats::default(),
            transport_errors: 0,
            config,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(task.run());

        Self {
            commands: command_tx,
            reports: report_rx,
            snapshot: snapshot_rx,
            stats: stats_rx,
            cancel,
            task: Some(task),
        }
    }

    /// Queue a command and wait until its frames are written.
    ///
    /// Returns the number of frames written. The command is encoded inside
    /// the session task, so argument clamping sees the current device state.
    pub async fn send_command(&self, command: C) -> Result<usize> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(QueuedCommand { command, reply })
            .await
            .map_err(|_| ProtocolError::SessionClosed)?;
        response.await.map_err(|_| ProtocolError::SessionClosed)?
    }

    /// Stream of cycle reports for notifications the adapter handled.
    ///
    /// The stream ends when the session stops. A subscriber that falls more
    /// than `change_capacity` reports behind skips the oldest ones.
    pub fn subscribe(&self) -> impl Stream<Item = Arc<CycleReport>> + 'static {
        BroadcastStream::new(self.reports.resubscribe()).filter_map(|item| async move {
            match item {
                Ok(report) => Some(report),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged behind cycle reports");
                    None
                }
            }
        })
    }

    /// Latest property snapshot.
    pub fn snapshot(&self) -> Arc<PropertySnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Property snapshots, starting with the current one.
    pub fn snapshots(&self) -> impl Stream<Item = Arc<PropertySnapshot>> + 'static {
        WatchStream::new(self.snapshot.clone())
    }

    pub fn stats(&self) -> SessionStats {
        *self.stats.borrow()
    }

    /// Whether the session task has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait until the session task stops on its own.
    pub async fn closed(&self) {
        let mut stats = self.stats.clone();
        while stats.changed().await.is_ok() {}
    }

    /// Cancel the session and wait for the task to finish.
    pub async fn shutdown(mut self) -> Result<SessionStats> {
        self.cancel.cancel();
        match self.task.take() {
            Some(task) => task.await.map_err(|err| {
                error!("Device session task failed: {}", err);
                ProtocolError::SessionClosed
            }),
            None => Err(ProtocolError::SessionClosed),
        }
    }
}

impl<C> Drop for DeviceSession<C> {
    fn drop(&mut self) {
        debug!("Dropping device session");
        self.cancel.cancel();
    }
}

struct SessionTask<A: DeviceAdapter, S, K> {
    adapter: A,
    source: S,
    sink: K,
    commands: mpsc::Receiver<QueuedCommand<A::Command>>,
    reports: broadcast::Sender<Arc<CycleReport>>,
    snapshot: watch::Sender<Arc<PropertySnapshot>>,
    stats_tx: watch::Sender<SessionStats>,
    stats: SessionStats,
    transport_errors: u32,
    config: SessionConfig,
    cancel: CancellationToken,
}

impl<A, S, K> SessionTask<A, S, K>
where
    A: DeviceAdapter,
    S: NotificationSource,
    K: CommandSink,
{
    async fn run(mut self) -> SessionStats {
        info!(device = self.adapter.name(), "Device session started");
        let mut commands_open = true;

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(device = self.adapter.name(), "Device session cancelled");
                    break;
                }
                queued = self.commands.recv(), if commands_open => Event::Command(queued),
                result = self.source.next_notification() => Event::Notification(result),
            };

            let keep_running = match event {
                Event::Command(Some(queued)) => self.handle_command(queued).await,
                Event::Command(None) => {
                    debug!(device = self.adapter.name(), "Command queue closed");
                    commands_open = false;
                    true
                }
                Event::Notification(Ok(Some(raw))) => {
                    self.transport_errors = 0;
                    self.handle_notification(&raw);
                    true
                }
                Event::Notification(Ok(None)) => {
                    info!(device = self.adapter.name(), "Notification source ended");
                    false
                }
                Event::Notification(Err(e)) => self.absorb_transport_error(&e).await,
            };

            self.stats_tx.send_replace(self.stats);
            if !keep_running {
                break;
            }
        }

        info!(
            device = self.adapter.name(),
            notifications = self.stats.notifications,
            cycles = self.stats.cycles,
            dropped = self.stats.dropped_frames,
            "Device session ended"
        );
        self.stats
    }

    fn handle_notification(&mut self, raw: &[u8]) {
        self.stats.notifications += 1;

        match run_cycle(&mut self.adapter, raw) {
            Ok(report) if report.processed => {
                self.stats.cycles += 1;
                if !report.changes.is_empty() {
                    let snapshot = self.adapter.projection().state().snapshot();
                    self.snapshot.send_replace(Arc::new(snapshot));
                }
                // The session handle keeps a receiver, so this only fails once it is gone
                let _ = self.reports.send(Arc::new(report));
            }
            Ok(report) => {
                trace!(device = self.adapter.name(), route = %report.route, "Unhandled route");
            }
            Err(e) if e.is_frame_level() => {
                self.stats.dropped_frames += 1;
                warn!(device = self.adapter.name(), len = raw.len(), "Dropped notification: {}", e);
            }
            Err(e) => {
                self.stats.record_errors += 1;
                warn!(device = self.adapter.name(), "Failed to apply notification: {}", e);
            }
        }
    }

    async fn handle_command(&mut self, queued: QueuedCommand<A::Command>) -> bool {
        let encoded = encode_frames(&self.adapter, &queued.command);
        let result = match encoded {
            Ok(frames) => self.write_frames(frames).await,
            Err(e) => Err(e),
        };
        let keep_running = match &result {
            Ok(frames) => {
                self.stats.commands += 1;
                self.transport_errors = 0;
                debug!(device = self.adapter.name(), command = ?queued.command, frames, "Command written");
                true
            }
            Err(e) => {
                self.stats.failed_commands += 1;
                warn!(device = self.adapter.name(), command = ?queued.command, "Command failed: {}", e);
                !matches!(e, ProtocolError::Transport { .. }) || self.absorb_transport_error(e).await
            }
        };

        // The caller may have stopped waiting
        let _ = queued.reply.send(result);
        keep_running
    }

    async fn write_frames(&mut self, frames: Vec<Vec<u8>>) -> Result<usize> {
        let count = frames.len();
        for frame in frames {
            self.sink.write_frame(frame).await?;
        }
        Ok(count)
    }

    /// Count a transport error and back off; `false` once the budget is spent.
    async fn absorb_transport_error(&mut self, e: &ProtocolError) -> bool {
        self.transport_errors += 1;
        let budget = self.config.max_transport_errors;
        error!(device = self.adapter.name(), "Transport error ({}/{}): {}", self.transport_errors, budget, e);

        if self.transport_errors >= budget {
            error!(device = self.adapter.name(), "Too many transport errors, stopping session");
            return false;
        }

        let backoff = self.config.backoff(self.transport_errors);
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(backoff) => true,
        }
    }
}
