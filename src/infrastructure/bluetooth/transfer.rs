//! DLC Content Transfer
//!
//! Drives one upload session against a [`Transport`]:
//!
//! ```text
//! Idle ──announce──▶ Announced ──▶ ReadyWaiting ──ready──▶ Sending
//!                                                            │
//!                      Complete ◀──ok── AwaitingConfirm ◀────┘
//!
//! any non-terminal state ──timeout / device error / write error──▶ Failed
//! ```
//!
//! The notification handler and the waiting task meet through two one-shot
//! signals created fresh for each session. The handler is the only writer;
//! the controller is the only reader.

use super::notification::StatusNotification;
use super::protocol::{self, Command, DLC_FILENAME_LEN, FILE_CHUNK_SIZE, MAX_DLC_SIZE};
use super::transport::{NotificationHandler, Transport};
use crate::domain::models::TransferProgress;
use crate::error::{DeviceFailure, TransferError, TransferPhase};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// How long the device gets to accept an announce
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the device gets to confirm a fully sent file
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(300);

/// Pause after each chunk. Tolerance varies between devices.
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(20);

/// Progress is reported every this many chunks
pub const PROGRESS_CHUNK_INTERVAL: usize = 50;

/// Knobs for a single upload
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub ready_timeout: Duration,
    pub confirm_timeout: Duration,
    pub chunk_delay: Duration,
    /// Send the Nordic packet-ack enable before announcing
    pub enable_link_ack: bool,
    /// Chunks between progress reports; 0 reports only at phase boundaries
    pub progress_interval: usize,
    pub progress: Option<mpsc::UnboundedSender<TransferProgress>>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            ready_timeout: DEFAULT_READY_TIMEOUT,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            chunk_delay: DEFAULT_CHUNK_DELAY,
            enable_link_ack: true,
            progress_interval: PROGRESS_CHUNK_INTERVAL,
            progress: None,
        }
    }
}

impl TransferOptions {
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<TransferProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    fn report(&self, bytes_sent: usize, total: usize, message: impl Into<String>) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(TransferProgress::new(bytes_sent, total, message));
        }
    }
}

/// Fixed waits after commands the device never acknowledges.
///
/// Delete, load and activate have no confirmation notification, so the flash
/// workflow can only sleep and hope the device has caught up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelays {
    pub after_delete: Duration,
    pub after_upload: Duration,
    pub after_load: Duration,
    pub after_activate: Duration,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            after_delete: Duration::from_secs(2),
            after_upload: Duration::from_secs(2),
            after_load: Duration::from_millis(500),
            after_activate: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Announced,
    ReadyWaiting,
    Sending,
    AwaitingConfirm,
    Complete,
    Failed,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Complete | TransferState::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            TransferState::Idle => 0,
            TransferState::Announced => 1,
            TransferState::ReadyWaiting => 2,
            TransferState::Sending => 3,
            TransferState::AwaitingConfirm => 4,
            TransferState::Complete => 5,
            TransferState::Failed => 6,
        }
    }

    /// Forward-only along the happy path; `Failed` from anything non-terminal.
    pub fn can_advance_to(self, next: TransferState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == TransferState::Failed || next.rank() == self.rank() + 1
    }
}

/// State of one upload. Owned by a single controller call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSession {
    pub total_size: usize,
    pub slot: u8,
    pub filename: String,
    pub wire_filename: [u8; DLC_FILENAME_LEN],
    pub chunk_size: usize,
    pub bytes_sent: usize,
    pub state: TransferState,
    pub failure: Option<String>,
}

impl TransferSession {
    pub fn new(total_size: usize, slot: u8, filename: &str) -> Self {
        Self {
            total_size,
            slot,
            filename: filename.to_string(),
            wire_filename: protocol::encode_filename(filename),
            chunk_size: FILE_CHUNK_SIZE,
            bytes_sent: 0,
            state: TransferState::Idle,
            failure: None,
        }
    }

    /// Number of data-channel writes this session needs
    pub fn chunk_count(&self) -> usize {
        self.total_size.div_ceil(self.chunk_size)
    }

    fn advance(&mut self, next: TransferState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transfer transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("Transfer state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn record_sent(&mut self, bytes: usize) {
        self.bytes_sent = (self.bytes_sent + bytes).min(self.total_size);
    }

    fn fail(&mut self, err: &TransferError) {
        if !self.state.is_terminal() {
            self.advance(TransferState::Failed);
        }
        self.failure = Some(err.to_string());
    }
}

type Verdict = Result<(), DeviceFailure>;

/// One-shot latches written by the notification handler
struct TransferSignals {
    ready: Mutex<Option<oneshot::Sender<()>>>,
    complete: Mutex<Option<oneshot::Sender<Verdict>>>,
}

struct SignalReceivers {
    ready: oneshot::Receiver<()>,
    complete: oneshot::Receiver<Verdict>,
}

impl TransferSignals {
    fn new() -> (Arc<Self>, SignalReceivers) {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (complete_tx, complete_rx) = oneshot::channel();
        let signals = Arc::new(Self {
            ready: Mutex::new(Some(ready_tx)),
            complete: Mutex::new(Some(complete_tx)),
        });
        (
            signals,
            SignalReceivers {
                ready: ready_rx,
                complete: complete_rx,
            },
        )
    }

    fn handle_frame(&self, frame: &[u8]) {
        let Some(status) = StatusNotification::classify(frame) else {
            return;
        };
        info!("File transfer status: {:?}", status);

        match status {
            StatusNotification::ReadyToReceive => {
                if let Some(tx) = self.ready.lock().unwrap_or_else(PoisonError::into_inner).take() {
                    let _ = tx.send(());
                }
            }
            StatusNotification::FileReceivedOk => self.finish(Ok(())),
            StatusNotification::FileReceivedError => {
                self.finish(Err(DeviceFailure::ExplicitError))
            }
            // Must still release the completion wait, or it would hang.
            StatusNotification::FileTransferTimeout => {
                self.finish(Err(DeviceFailure::TransferTimeout))
            }
            StatusNotification::FileAlreadyExists | StatusNotification::ReadyToAppend => {
                debug!("Status {:?} does not affect the upload", status);
            }
            StatusNotification::Unknown(code) => {
                warn!("Unknown file transfer status code: 0x{:02X}", code);
            }
        }
    }

    fn finish(&self, verdict: Verdict) {
        let sender = self
            .complete
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                let _ = tx.send(verdict);
            }
            None => debug!("Completion already signalled, ignoring {:?}", verdict),
        }
    }
}

/// Uploads DLC packages and runs the flash workflow.
///
/// Only one upload runs at a time per controller; a concurrent call gets
/// [`TransferError::Busy`].
pub struct ContentTransferController<T> {
    transport: Arc<T>,
    settle: SettleDelays,
    in_flight: tokio::sync::Mutex<()>,
    last_session: Mutex<Option<TransferSession>>,
}

impl<T: Transport> ContentTransferController<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            settle: SettleDelays::default(),
            in_flight: tokio::sync::Mutex::new(()),
            last_session: Mutex::new(None),
        }
    }

    pub fn with_settle_delays(mut self, settle: SettleDelays) -> Self {
        self.settle = settle;
        self
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn settle_delays(&self) -> SettleDelays {
        self.settle
    }

    /// Snapshot of the most recent session, finished or not
    pub fn last_session(&self) -> Option<TransferSession> {
        self.last_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Upload `content` into `slot` under `filename`.
    ///
    /// The notification handler registered for the session is released on
    /// every exit path, including when this future is dropped mid-flight.
    pub async fn upload(
        &self,
        content: &[u8],
        slot: u8,
        filename: &str,
        options: &TransferOptions,
    ) -> Result<(), TransferError> {
        let _in_flight = self.in_flight.try_lock().map_err(|_| TransferError::Busy)?;
        self.upload_locked(content, slot, filename, options).await
    }

    /// Caller must hold `in_flight`.
    async fn upload_locked(
        &self,
        content: &[u8],
        slot: u8,
        filename: &str,
        options: &TransferOptions,
    ) -> Result<(), TransferError> {
        if content.len() > MAX_DLC_SIZE {
            return Err(TransferError::ContentTooLarge {
                size: content.len(),
            });
        }

        let mut session = TransferSession::new(content.len(), slot, filename);
        info!(
            "Uploading DLC: {} ({} bytes) to slot {}",
            filename,
            content.len(),
            slot
        );

        let result = self.run_session(&mut session, content, options).await;
        if let Err(e) = &result {
            error!("DLC upload failed in state {:?}: {}", session.state, e);
            session.fail(e);
        }
        self.store_session(session);
        result
    }

    /// Read a DLC file and upload it under its own file name.
    pub async fn upload_file(
        &self,
        path: &Path,
        slot: u8,
        options: &TransferOptions,
    ) -> Result<(), TransferError> {
        let content = read_content(path).await?;
        self.upload(&content, slot, &file_label(path), options).await
    }

    /// Delete (optionally), upload, load and activate in one go.
    ///
    /// The first failing step ends the workflow; earlier steps are not undone.
    pub async fn flash_and_activate(
        &self,
        content: &[u8],
        slot: u8,
        filename: &str,
        delete_first: bool,
        options: &TransferOptions,
    ) -> Result<(), TransferError> {
        match self.run_flash(content, slot, filename, delete_first, options).await {
            Ok(()) => {
                info!("DLC flash and activate complete, slot {} is now active", slot);
                options.report(0, 0, format!("DLC activated in slot {}", slot));
                Ok(())
            }
            Err(e) => {
                error!("Flash and activate failed: {}", e);
                options.report(0, 0, format!("Error: {}", e));
                Err(e)
            }
        }
    }

    pub async fn flash_file(
        &self,
        path: &Path,
        slot: u8,
        delete_first: bool,
        options: &TransferOptions,
    ) -> Result<(), TransferError> {
        let content = match read_content(path).await {
            Ok(content) => content,
            Err(e) => {
                options.report(0, 0, format!("Error: {}", e));
                return Err(e);
            }
        };
        self.flash_and_activate(&content, slot, &file_label(path), delete_first, options)
            .await
    }

    async fn run_flash(
        &self,
        content: &[u8],
        slot: u8,
        filename: &str,
        delete_first: bool,
        options: &TransferOptions,
    ) -> Result<(), TransferError> {
        // Held for the whole workflow so a busy controller never sees the delete.
        let _in_flight = self.in_flight.try_lock().map_err(|_| TransferError::Busy)?;

        if delete_first {
            options.report(0, 0, format!("Deleting existing DLC in slot {}...", slot));
            self.send(Command::DeleteDlc(slot)).await?;
            tokio::time::sleep(self.settle.after_delete).await;
        }

        options.report(0, 0, "Starting DLC upload...");
        self.upload_locked(content, slot, filename, options).await?;
        tokio::time::sleep(self.settle.after_upload).await;

        options.report(0, 0, format!("Loading DLC from slot {}...", slot));
        self.send(Command::LoadDlc(slot)).await?;
        tokio::time::sleep(self.settle.after_load).await;

        options.report(0, 0, "Activating DLC...");
        self.send(Command::ActivateDlc).await?;
        tokio::time::sleep(self.settle.after_activate).await;

        Ok(())
    }

    async fn send(&self, command: Command) -> Result<(), TransferError> {
        let bytes = command.encode();
        self.transport.write_command(&bytes).await?;
        debug!("GP write: {}", protocol::hex(&bytes));
        Ok(())
    }

    async fn run_session(
        &self,
        session: &mut TransferSession,
        content: &[u8],
        options: &TransferOptions,
    ) -> Result<(), TransferError> {
        let total = session.total_size;
        options.report(0, total, format!("Starting upload: {}", session.filename));

        if options.enable_link_ack {
            let ack = Command::LinkAck(true).encode();
            self.transport.write_link_control(&ack).await?;
            info!("Nordic packet ACK enabled");
        }

        let (signals, mut receivers) = TransferSignals::new();
        let handler: NotificationHandler = {
            let signals = Arc::clone(&signals);
            Arc::new(move |frame: &[u8]| signals.handle_frame(frame))
        };
        let subscription = self.transport.subscribe_notifications(handler);

        let outcome = self
            .drive(session, content, options, &mut receivers)
            .await;

        subscription.cancel();
        outcome
    }

    async fn drive(
        &self,
        session: &mut TransferSession,
        content: &[u8],
        options: &TransferOptions,
        receivers: &mut SignalReceivers,
    ) -> Result<(), TransferError> {
        let total = session.total_size;

        let announce = Command::AnnounceDlc {
            size: total as u32,
            slot: session.slot,
            filename: session.wire_filename,
        }
        .encode();
        self.transport.write_command(&announce).await?;
        debug!("GP write: {}", protocol::hex(&announce));
        session.advance(TransferState::Announced);

        options.report(0, total, "Waiting for Furby to accept upload...");
        session.advance(TransferState::ReadyWaiting);
        wait_for(&mut receivers.ready, options.ready_timeout, TransferPhase::Ready).await?;

        info!("Furby ready, uploading data...");
        session.advance(TransferState::Sending);
        options.report(0, total, "Uploading data...");

        let mut chunk_count = 0usize;
        for chunk in content.chunks(session.chunk_size) {
            self.transport.write_data(chunk).await?;
            session.record_sent(chunk.len());
            chunk_count += 1;

            if !options.chunk_delay.is_zero() {
                tokio::time::sleep(options.chunk_delay).await;
            }

            if options.progress_interval > 0 && chunk_count % options.progress_interval == 0 {
                let percent = session.bytes_sent as f64 / total as f64 * 100.0;
                debug!("Upload progress: {:.1}%", percent);
                options.report(
                    session.bytes_sent,
                    total,
                    format!(
                        "Uploading: {:.1}% ({}/{} bytes)",
                        percent, session.bytes_sent, total
                    ),
                );
            }
        }

        info!("Uploaded {} chunks, waiting for confirmation...", chunk_count);
        session.advance(TransferState::AwaitingConfirm);
        options.report(total, total, "Waiting for Furby to confirm...");

        let verdict = wait_for(
            &mut receivers.complete,
            options.confirm_timeout,
            TransferPhase::Confirm,
        )
        .await?;
        verdict.map_err(|cause| TransferError::DeviceReportedError { cause })?;

        session.advance(TransferState::Complete);
        info!("DLC upload complete!");
        options.report(total, total, "Upload complete!");
        Ok(())
    }

    fn store_session(&self, session: TransferSession) {
        *self
            .last_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(session);
    }
}

/// Wait on a latch. A dropped sender is reported as such instead of as a timeout.
async fn wait_for<V>(
    latch: &mut oneshot::Receiver<V>,
    bound: Duration,
    phase: TransferPhase,
) -> Result<V, TransferError> {
    match tokio::time::timeout(bound, latch).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => {
            warn!("Transfer signal for the {} phase was dropped before firing", phase);
            Err(TransferError::SignalLost { phase })
        }
        Err(_) => Err(TransferError::ProtocolTimeout { phase }),
    }
}

async fn read_content(path: &Path) -> Result<Vec<u8>, TransferError> {
    match tokio::fs::read(path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(TransferError::InputNotFound(path.to_path_buf()))
        }
        Err(source) => Err(TransferError::InputRead {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::transport::mock::{MockTransport, Script};

    fn quiet_options() -> TransferOptions {
        TransferOptions {
            chunk_delay: Duration::from_millis(1),
            ..TransferOptions::default()
        }
    }

    fn controller(transport: MockTransport) -> ContentTransferController<MockTransport> {
        ContentTransferController::new(Arc::new(transport))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TransferProgress>) -> Vec<TransferProgress> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_state_transitions() {
        use TransferState::*;
        assert!(Idle.can_advance_to(Announced));
        assert!(Announced.can_advance_to(ReadyWaiting));
        assert!(AwaitingConfirm.can_advance_to(Complete));
        assert!(!Sending.can_advance_to(Announced));
        assert!(!Idle.can_advance_to(Sending));
        for state in [Idle, Announced, ReadyWaiting, Sending, AwaitingConfirm] {
            assert!(state.can_advance_to(Failed));
        }
        assert!(!Complete.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Complete));
    }

    #[test]
    fn test_chunk_count() {
        for (len, chunks) in [(0, 0), (1, 1), (20, 1), (21, 2), (100, 5), (12345, 618)] {
            assert_eq!(TransferSession::new(len, 0, "A").chunk_count(), chunks);
        }
    }

    #[test]
    fn test_signals_latch_once() {
        let (signals, mut rx) = TransferSignals::new();
        signals.handle_frame(&[0x24, 0x06]);
        signals.handle_frame(&[0x24, 0x05]);
        assert_eq!(rx.complete.try_recv(), Ok(Err(DeviceFailure::ExplicitError)));
        assert!(rx.ready.try_recv().is_err());
    }

    #[test]
    fn test_signals_ignore_foreign_and_unknown_frames() {
        let (signals, mut rx) = TransferSignals::new();
        signals.handle_frame(&[0x24]);
        signals.handle_frame(&[0x23, 0x02]);
        signals.handle_frame(&[0x24, 0xFF]);
        signals.handle_frame(&[0x24, 0x01]);
        assert!(rx.ready.try_recv().is_err());
        assert!(rx.complete.try_recv().is_err());

        signals.handle_frame(&[0x24, 0x03]);
        assert_eq!(rx.complete.try_recv(), Ok(Err(DeviceFailure::TransferTimeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_end_to_end() {
        let ctl = controller(MockTransport::new());
        let content = vec![0xAB; 100];

        ctl.upload(&content, 2, "TEST.DLC", &quiet_options())
            .await
            .unwrap();

        let transport = ctl.transport();
        assert_eq!(transport.link_writes(), vec![vec![0x09, 0x01, 0x00]]);

        let commands = transport.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(&commands[0][..6], &[0x50, 0x00, 0x00, 0x00, 100, 0x02]);
        assert_eq!(&commands[0][6..18], b"TEST.DLC\0\0\0\0");

        let data = transport.data_writes();
        assert_eq!(data.len(), 5);
        assert!(data.iter().all(|chunk| chunk.len() == FILE_CHUNK_SIZE));
        assert_eq!(data.concat(), content);

        assert_eq!(transport.subscriber_count(), 0);
        assert!(transport.subscribers_during_data().iter().all(|&n| n == 1));

        let session = ctl.last_session().unwrap();
        assert_eq!(session.state, TransferState::Complete);
        assert_eq!(session.bytes_sent, 100);
        assert_eq!(session.failure, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunking_covers_every_length() {
        for len in [0usize, 1, 19, 20, 21, 59, 60, 61, 1001] {
            let ctl = controller(MockTransport::new());
            let content: Vec<u8> = (0..len).map(|i| i as u8).collect();
            ctl.upload(&content, 0, "X.DLC", &quiet_options())
                .await
                .unwrap();

            let data = ctl.transport().data_writes();
            assert_eq!(data.len(), len.div_ceil(FILE_CHUNK_SIZE), "len {}", len);
            assert!(data.iter().all(|c| !c.is_empty() && c.len() <= FILE_CHUNK_SIZE));
            assert_eq!(data.iter().map(Vec::len).sum::<usize>(), len);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_can_skip_link_ack() {
        let ctl = controller(MockTransport::new());
        let options = TransferOptions {
            enable_link_ack: false,
            ..quiet_options()
        };
        ctl.upload(&[1; 40], 2, "test.dlc", &options).await.unwrap();
        assert!(ctl.transport().link_writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_timeout() {
        let ctl = controller(MockTransport::silent());
        let started = tokio::time::Instant::now();

        let err = ctl
            .upload(&[0; 40], 2, "test.dlc", &quiet_options())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransferError::ProtocolTimeout {
                phase: TransferPhase::Ready
            }
        ));
        assert!(started.elapsed() >= DEFAULT_READY_TIMEOUT);
        assert!(ctl.transport().data_writes().is_empty());
        assert_eq!(ctl.transport().subscriber_count(), 0);

        let session = ctl.last_session().unwrap();
        assert_eq!(session.state, TransferState::Failed);
        assert!(session.failure.unwrap().contains("ready"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_timeout() {
        let ctl = controller(MockTransport::with_script(Script {
            completion: None,
            ..Script::default()
        }));
        let options = TransferOptions {
            confirm_timeout: Duration::from_secs(1),
            ..quiet_options()
        };

        let err = ctl.upload(&[0; 45], 1, "a.dlc", &options).await.unwrap_err();

        assert!(matches!(
            err,
            TransferError::ProtocolTimeout {
                phase: TransferPhase::Confirm
            }
        ));
        assert_eq!(ctl.transport().data_writes().len(), 3);
        assert_eq!(ctl.transport().subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_error_after_send() {
        let ctl = controller(MockTransport::with_script(Script {
            completion: Some(StatusNotification::FileReceivedError),
            ..Script::default()
        }));

        let err = ctl
            .upload(&[7; 40], 2, "test.dlc", &quiet_options())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransferError::DeviceReportedError {
                cause: DeviceFailure::ExplicitError
            }
        ));
        assert_eq!(ctl.transport().subscriber_count(), 0);
        let session = ctl.last_session().unwrap();
        assert_eq!(session.state, TransferState::Failed);
        assert_eq!(session.bytes_sent, 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_transfer_timeout_status() {
        let ctl = controller(MockTransport::with_script(Script {
            completion: Some(StatusNotification::FileTransferTimeout),
            ..Script::default()
        }));

        let err = ctl
            .upload(&[7; 10], 2, "test.dlc", &quiet_options())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransferError::DeviceReportedError {
                cause: DeviceFailure::TransferTimeout
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_status_does_not_disturb_upload() {
        let ctl = controller(MockTransport::with_script(Script {
            on_announce: vec![vec![0x24, 0xFF], vec![0x20, 0x06], vec![0x24]],
            ..Script::default()
        }));

        ctl.upload(&[3; 30], 2, "test.dlc", &quiet_options())
            .await
            .unwrap();
        assert_eq!(ctl.last_session().unwrap().state, TransferState::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_write_failure_releases_subscription() {
        let ctl = controller(MockTransport::with_script(Script {
            fail_data_write: Some(2),
            ..Script::default()
        }));

        let err = ctl
            .upload(&[3; 100], 2, "test.dlc", &quiet_options())
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Transport(_)));
        assert_eq!(ctl.transport().subscriber_count(), 0);
        let session = ctl.last_session().unwrap();
        assert_eq!(session.bytes_sent, 40);
        assert_eq!(session.state, TransferState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_upload_releases_subscription() {
        let ctl = controller(MockTransport::silent());
        let options = quiet_options();

        let cancelled = tokio::time::timeout(
            Duration::from_secs(1),
            ctl.upload(&[0; 40], 2, "test.dlc", &options),
        )
        .await;

        assert!(cancelled.is_err());
        assert_eq!(ctl.transport().subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_upload_is_rejected() {
        let ctl = controller(MockTransport::silent());
        let options = quiet_options();

        let (first, second) = tokio::join!(
            ctl.upload(&[0; 40], 2, "a.dlc", &options),
            ctl.upload(&[0; 40], 2, "b.dlc", &options),
        );

        let busy = [&first, &second]
            .iter()
            .filter(|r| matches!(r, Err(TransferError::Busy)))
            .count();
        let timed_out = [&first, &second]
            .iter()
            .filter(|r| matches!(r, Err(TransferError::ProtocolTimeout { .. })))
            .count();
        assert_eq!((busy, timed_out), (1, 1));
        assert_eq!(ctl.transport().commands().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flash_during_upload_is_rejected_before_delete() {
        let ctl = controller(MockTransport::silent());
        let options = quiet_options();

        let (running, flash) = tokio::join!(
            ctl.upload(&[0; 40], 2, "a.dlc", &options),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                ctl.flash_and_activate(&[0; 40], 2, "b.dlc", true, &options)
                    .await
            },
        );

        assert!(matches!(
            running,
            Err(TransferError::ProtocolTimeout {
                phase: TransferPhase::Ready
            })
        ));
        assert!(matches!(flash, Err(TransferError::Busy)));
        assert_eq!(ctl.transport().opcodes(), vec![0x50]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_during_flash_is_rejected() {
        let ctl = controller(MockTransport::new());
        let options = quiet_options();

        let (flash, upload) = tokio::join!(
            ctl.flash_and_activate(&[0; 40], 2, "a.dlc", true, &options),
            async {
                // Still inside the post-delete settle wait.
                tokio::time::sleep(Duration::from_millis(100)).await;
                ctl.upload(&[0; 40], 3, "b.dlc", &options).await
            },
        );

        flash.unwrap();
        assert!(matches!(upload, Err(TransferError::Busy)));
        assert_eq!(ctl.transport().opcodes(), vec![0x74, 0x50, 0x60, 0x61]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_latch_is_not_a_timeout() {
        let (tx, mut rx) = oneshot::channel::<()>();
        drop(tx);
        let started = tokio::time::Instant::now();

        let err = wait_for(&mut rx, DEFAULT_READY_TIMEOUT, TransferPhase::Ready)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransferError::SignalLost {
                phase: TransferPhase::Ready
            }
        ));
        assert!(!err.is_timeout());
        assert!(started.elapsed() < DEFAULT_READY_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latch_wait_times_out_at_bound() {
        let (_tx, mut rx) = oneshot::channel::<()>();
        let started = tokio::time::Instant::now();

        let err = wait_for(&mut rx, Duration::from_secs(3), TransferPhase::Confirm)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_content_is_rejected_up_front() {
        let ctl = controller(MockTransport::new());
        let content = vec![0u8; MAX_DLC_SIZE + 1];

        let err = ctl
            .upload(&content, 2, "big.dlc", &quiet_options())
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::ContentTooLarge { .. }));
        assert!(ctl.transport().commands().is_empty());
        assert!(ctl.transport().link_writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reports() {
        let ctl = controller(MockTransport::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let options = quiet_options().with_progress(tx);
        let content = vec![0u8; 20 * 120];

        ctl.upload(&content, 2, "p.dlc", &options).await.unwrap();

        let events = drain(&mut rx);
        let total = content.len();
        assert_eq!(events.first().unwrap().message, "Starting upload: p.dlc");
        assert_eq!(events.first().unwrap().bytes_sent, 0);

        let mid: Vec<usize> = events
            .iter()
            .filter(|e| e.message.starts_with("Uploading:"))
            .map(|e| e.bytes_sent)
            .collect();
        assert_eq!(mid, vec![1000, 2000]);

        let last = events.last().unwrap();
        assert_eq!((last.bytes_sent, last.total), (total, total));
        assert_eq!(last.message, "Upload complete!");
    }

    #[tokio::test(start_paused = true)]
    async fn test_flash_and_activate_sequence() {
        let ctl = controller(MockTransport::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let options = quiet_options().with_progress(tx);
        let started = tokio::time::Instant::now();

        ctl.flash_and_activate(&[9; 55], 2, "custom.dlc", true, &options)
            .await
            .unwrap();

        assert_eq!(ctl.transport().opcodes(), vec![0x74, 0x50, 0x60, 0x61]);
        assert_eq!(ctl.transport().commands()[2], vec![0x60, 2]);
        assert!(started.elapsed() >= Duration::from_secs(5));

        let messages: Vec<String> = drain(&mut rx).into_iter().map(|e| e.message).collect();
        assert_eq!(messages.first().unwrap(), "Deleting existing DLC in slot 2...");
        assert_eq!(messages.last().unwrap(), "DLC activated in slot 2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_flash_without_delete() {
        let ctl = controller(MockTransport::new());
        ctl.flash_and_activate(&[9; 5], 3, "x.dlc", false, &quiet_options())
            .await
            .unwrap();
        assert_eq!(ctl.transport().opcodes(), vec![0x50, 0x60, 0x61]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flash_stops_at_failed_upload() {
        let ctl = controller(MockTransport::with_script(Script {
            completion: Some(StatusNotification::FileReceivedError),
            ..Script::default()
        }));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let options = quiet_options().with_progress(tx);

        let err = ctl
            .flash_and_activate(&[9; 55], 2, "custom.dlc", true, &options)
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::DeviceReportedError { .. }));
        // The delete stays done; load and activate never go out.
        assert_eq!(ctl.transport().opcodes(), vec![0x74, 0x50]);
        let last = drain(&mut rx).pop().unwrap();
        assert!(last.message.starts_with("Error: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flash_stops_at_failed_command() {
        let ctl = controller(MockTransport::with_script(Script {
            fail_opcode: Some(0x60),
            ..Script::default()
        }));

        let err = ctl
            .flash_and_activate(&[9; 5], 2, "x.dlc", false, &quiet_options())
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Transport(_)));
        assert_eq!(ctl.transport().opcodes(), vec![0x50]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_settle_delays() {
        let zero = SettleDelays {
            after_delete: Duration::ZERO,
            after_upload: Duration::ZERO,
            after_load: Duration::ZERO,
            after_activate: Duration::ZERO,
        };
        let ctl = controller(MockTransport::new()).with_settle_delays(zero);
        let started = tokio::time::Instant::now();
        let options = TransferOptions {
            chunk_delay: Duration::ZERO,
            ..TransferOptions::default()
        };

        ctl.flash_and_activate(&[1; 5], 2, "x.dlc", true, &options)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_upload_file_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.dlc");
        std::fs::write(&path, b"DLC_CONTENT".repeat(5)).unwrap();

        let ctl = controller(MockTransport::new());
        let options = TransferOptions {
            chunk_delay: Duration::ZERO,
            ..TransferOptions::default()
        };
        ctl.upload_file(&path, 2, &options).await.unwrap();

        let announce = &ctl.transport().commands()[0];
        assert_eq!(&announce[2..5], &[0, 0, 55]);
        assert_eq!(&announce[6..18], b"custom.dlc\0\0");
    }

    #[tokio::test]
    async fn test_missing_file_fails_before_any_traffic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.dlc");
        let ctl = controller(MockTransport::new());

        let err = ctl
            .upload_file(&path, 2, &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InputNotFound(ref p) if p == &path));

        let err = ctl
            .flash_file(&path, 2, true, &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InputNotFound(_)));

        assert!(ctl.transport().commands().is_empty());
        assert!(ctl.transport().link_writes().is_empty());
    }
}
