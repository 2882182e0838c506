//! PTY session management using portable-pty.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::engine::queue::KeystrokeSink;

/// Terminal size in columns and rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TermSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl From<TermSize> for PtySize {
    fn from(size: TermSize) -> Self {
        PtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

/// A PTY session wrapping a master PTY and child process.
pub struct PtySession {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    size: TermSize,
}

impl PtySession {
    /// Spawn a command in a new PTY session.
    ///
    /// The child inherits the current working directory and environment.
    pub fn spawn(command: &[String], size: TermSize) -> Result<Self> {
        let Some((program, args)) = command.split_first() else {
            anyhow::bail!("Command cannot be empty");
        };

        let pair = native_pty_system()
            .openpty(size.into())
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn '{}'", command.join(" ")))?;

        Ok(Self {
            master: pair.master,
            child,
            size,
        })
    }

    /// Get a reader for the PTY output.
    pub fn reader(&self) -> Result<Box<dyn Read + Send>> {
        self.master
            .try_clone_reader()
            .context("Failed to clone PTY reader")
    }

    /// Get a writer for the PTY input.
    pub fn writer(&self) -> Result<Box<dyn Write + Send>> {
        self.master
            .take_writer()
            .context("Failed to take PTY writer")
    }

    pub fn size(&self) -> TermSize {
        self.size
    }

    /// Consume the session and return the master PTY and child process.
    pub fn into_parts(self) -> (Box<dyn MasterPty + Send>, Box<dyn Child + Send + Sync>) {
        (self.master, self.child)
    }
}

/// Buffer size for reading from PTY.
const READ_BUFFER_SIZE: usize = 4096;

/// Capacity of the input and output channels.
const CHANNEL_CAPACITY: usize = 64;

/// Handle for async PTY I/O operations.
///
/// Blocking PTY reads and writes run on two background threads; the async
/// side only ever talks to channels.
pub struct AsyncPtyHandle {
    /// Sender for writing to PTY stdin.
    write_tx: mpsc::Sender<Vec<u8>>,
    /// Receiver for reading from PTY stdout.
    read_rx: mpsc::Receiver<Vec<u8>>,
    shutdown: Arc<AtomicBool>,
    /// Master PTY for resize operations (sends SIGWINCH).
    master: std::sync::Mutex<Box<dyn MasterPty + Send>>,
    /// Child process handle for exit status and cleanup.
    child: std::sync::Mutex<Box<dyn Child + Send + Sync>>,
    size: TermSize,
    reader_thread: Option<std::thread::JoinHandle<()>>,
    writer_thread: Option<std::thread::JoinHandle<()>>,
}

impl AsyncPtyHandle {
    /// Create async I/O channels for a PTY session.
    ///
    /// This spawns background threads for reading and writing to the PTY.
    pub fn new(session: PtySession) -> Result<Self> {
        let reader = session.reader()?;
        let writer = session.writer()?;
        let size = session.size();
        let (master, child) = session.into_parts();

        let shutdown = Arc::new(AtomicBool::new(false));

        let (write_tx, write_rx) = mpsc::channel::<Vec<u8>>(CHANNEL_CAPACITY);
        let (read_tx, read_rx) = mpsc::channel::<Vec<u8>>(CHANNEL_CAPACITY);

        let reader_shutdown = shutdown.clone();
        let reader_thread = std::thread::spawn(move || {
            Self::reader_loop(reader, read_tx, reader_shutdown);
        });

        let writer_thread = std::thread::spawn(move || {
            Self::writer_loop(writer, write_rx);
        });

        Ok(Self {
            write_tx,
            read_rx,
            shutdown,
            master: std::sync::Mutex::new(master),
            child: std::sync::Mutex::new(child),
            size,
            reader_thread: Some(reader_thread),
            writer_thread: Some(writer_thread),
        })
    }

    /// Resize the PTY and send SIGWINCH to the child process.
    pub fn resize(&mut self, size: TermSize) -> Result<()> {
        self.master
            .lock()
            .map_err(|_| anyhow::anyhow!("Master PTY mutex poisoned"))?
            .resize(size.into())
            .context("Failed to resize PTY")?;
        self.size = size;
        Ok(())
    }

    pub fn size(&self) -> TermSize {
        self.size
    }

    /// Send bytes to the PTY stdin.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        self.write_tx
            .send(data.to_vec())
            .await
            .context("Failed to send to PTY input channel")
    }

    /// A cloneable keystroke sink feeding the same input channel.
    pub fn input(&self) -> PtyInput {
        PtyInput {
            tx: self.write_tx.clone(),
        }
    }

    /// Receive bytes from the PTY stdout.
    ///
    /// Returns None once the PTY has closed.
    pub async fn read(&mut self) -> Option<Vec<u8>> {
        self.read_rx.recv().await
    }

    /// Exit code of the child, if it has exited.
    pub fn exit_code(&self) -> Option<u32> {
        self.child
            .lock()
            .ok()
            .and_then(|mut child| child.try_wait().ok().flatten())
            .map(|status| status.exit_code())
    }

    /// Terminate the child process and stop the I/O threads.
    pub fn shutdown(&mut self) {
        if let Ok(mut child) = self.child.lock() {
            if let Err(e) = child.kill() {
                debug!(
                    "Failed to kill child process (may have already exited): {}",
                    e
                );
            }
            if let Err(e) = child.try_wait() {
                debug!("Failed to collect child exit status: {}", e);
            }
        }
        self.shutdown.store(true, Ordering::SeqCst);
        self.read_rx.close();
    }

    fn reader_loop(
        mut reader: Box<dyn Read + Send>,
        read_tx: mpsc::Sender<Vec<u8>>,
        shutdown: Arc<AtomicBool>,
    ) {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            if shutdown.load(Ordering::SeqCst) {
                debug!("PTY reader shutdown");
                break;
            }

            match reader.read(&mut buf) {
                Ok(0) => {
                    debug!("PTY reader EOF");
                    break;
                }
                Ok(n) => {
                    if read_tx.blocking_send(buf[..n].to_vec()).is_err() {
                        debug!("PTY read channel closed");
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
                Err(e) => {
                    // EIO is how Linux reports that the child side closed.
                    debug!("PTY read error: {}", e);
                    break;
                }
            }
        }
    }

    fn writer_loop(mut writer: Box<dyn Write + Send>, mut write_rx: mpsc::Receiver<Vec<u8>>) {
        while let Some(data) = write_rx.blocking_recv() {
            if let Err(e) = writer.write_all(&data) {
                error!("PTY write error: {}", e);
                break;
            }
            if let Err(e) = writer.flush() {
                error!("PTY flush error: {}", e);
                break;
            }
        }
        debug!("PTY writer exiting");
    }
}

impl Drop for AsyncPtyHandle {
    fn drop(&mut self) {
        if let Ok(mut child) = self.child.lock() {
            if let Err(e) = child.kill() {
                debug!(
                    "Failed to kill child on drop (may have already exited): {}",
                    e
                );
            }
            if let Err(e) = child.try_wait() {
                debug!("Failed to collect child exit status on drop: {}", e);
            }
        }

        self.shutdown.store(true, Ordering::SeqCst);

        // The reader may be blocked in read(); it ends when the PTY closes.
        if let Some(ref handle) = self.reader_thread {
            if !handle.is_finished() {
                debug!("PTY reader thread still running on drop, will terminate on PTY close");
            }
        }
        if let Some(ref handle) = self.writer_thread {
            if !handle.is_finished() {
                debug!("PTY writer thread still running on drop, will terminate on channel close");
            }
        }
    }
}

/// Keystroke sink writing into the PTY input channel.
#[derive(Clone)]
pub struct PtyInput {
    tx: mpsc::Sender<Vec<u8>>,
}

impl KeystrokeSink for PtyInput {
    fn send_keys(&self, bytes: &[u8]) -> Result<()> {
        self.tx.try_send(bytes.to_vec()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                warn!("PTY input channel full, dropping {} bytes", bytes.len());
                anyhow::anyhow!("PTY input channel is full")
            }
            mpsc::error::TrySendError::Closed(_) => {
                anyhow::anyhow!("PTY input channel closed (child exited?)")
            }
        })
    }
}
