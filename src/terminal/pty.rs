//! Process spawn facility
//!
//! [`ProcessSpawner`] is the seam between the terminal session and the OS.
//! A spawned process is handed back as channels (input, output, exit) plus a
//! [`PtyControl`] for resize and kill, so the session never touches blocking
//! PTY I/O directly.

use crate::codec::TerminalSize;
use crate::config::TerminalConfig;
use crate::error::{Error, Result};
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

/// Depth of the input channel feeding the process
const INPUT_BUFFER: usize = 256;

/// Read size for process output
const READ_CHUNK: usize = 8192;

/// errno for "no such process"
const ESRCH: i32 = 3;

/// How to start an interactive shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOptions {
    pub shell: String,
    pub cwd: PathBuf,
    pub size: TerminalSize,
    /// Extra variables on top of the inherited environment
    pub env: Vec<(String, String)>,
    pub output_buffer: usize,
}

impl SpawnOptions {
    /// Options from configuration, filling in the default shell and cwd
    pub fn from_config(config: &TerminalConfig) -> Self {
        let cwd = config.cwd.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
        });
        Self {
            shell: config.shell.clone().unwrap_or_else(default_shell),
            cwd,
            size: TerminalSize::new(config.cols, config.rows).unwrap_or_default(),
            env: vec![("TERM".to_string(), "xterm-256color".to_string())],
            output_buffer: config.output_buffer.max(1),
        }
    }
}

/// Out-of-band control over a running process
pub trait PtyControl: Send {
    /// Resize the controlling terminal
    fn resize(&mut self, size: TerminalSize) -> Result<()>;

    /// Current terminal geometry
    fn size(&self) -> TerminalSize;

    /// Kill the process; repeated calls are no-ops
    fn kill(&mut self) -> Result<()>;

    /// OS process id, when known
    fn pid(&self) -> Option<u32>;
}

/// A running process as seen by the session
pub struct SpawnedProcess {
    pub control: Box<dyn PtyControl>,
    /// Bytes written here reach the process's stdin
    pub input: mpsc::Sender<Vec<u8>>,
    /// Process output; closes at EOF
    pub output: mpsc::Receiver<Vec<u8>>,
    /// Fires once with the exit code (if any) when the process ends
    pub exit: oneshot::Receiver<Option<u32>>,
}

/// Starts interactive shells
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, options: &SpawnOptions) -> Result<SpawnedProcess>;
}

/// Spawner backed by the platform's native PTY
#[derive(Debug, Default, Clone)]
pub struct NativePtySpawner;

impl NativePtySpawner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessSpawner for NativePtySpawner {
    fn spawn(&self, options: &SpawnOptions) -> Result<SpawnedProcess> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(pty_size(options.size))
            .map_err(|e| Error::Pty(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(&options.shell);
        cmd.cwd(&options.cwd);
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| Error::Pty(format!("failed to spawn {}: {e}", options.shell)))?;
        // The child holds its own slave handle; ours would keep the reader from seeing EOF
        drop(pair.slave);

        let pid = child.process_id();
        // From here on, dropping `control` kills the child
        let mut control = NativeControl {
            master: pair.master,
            killer: child.clone_killer(),
            size: options.size,
            pid,
            killed: false,
        };

        let reader = control
            .master
            .try_clone_reader()
            .map_err(|e| Error::Pty(format!("failed to clone reader: {e}")))?;
        let writer = control
            .master
            .take_writer()
            .map_err(|e| Error::Pty(format!("failed to take writer: {e}")))?;

        let (output_tx, output_rx) = mpsc::channel(options.output_buffer.max(1));
        let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
        let (exit_tx, exit_rx) = oneshot::channel();

        if let Err(e) = spawn_reader(reader, output_tx) {
            let _ = control.kill();
            return Err(e);
        }
        if let Err(e) = spawn_writer(writer, input_rx) {
            let _ = control.kill();
            return Err(e);
        }
        let waiter = std::thread::Builder::new()
            .name("pty-waiter".to_string())
            .spawn(move || {
                let code = child.wait().ok().map(|status| status.exit_code());
                let _ = exit_tx.send(code);
            });
        if let Err(e) = waiter {
            let _ = control.kill();
            return Err(Error::Pty(format!("failed to start waiter thread: {e}")));
        }

        tracing::debug!(shell = %options.shell, pid = ?pid, "Spawned PTY process");

        Ok(SpawnedProcess {
            control: Box::new(control),
            input: input_tx,
            output: output_rx,
            exit: exit_rx,
        })
    }
}

/// Native PTY control: owns the master side and a killer for the child
struct NativeControl {
    master: Box<dyn MasterPty + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    size: TerminalSize,
    pid: Option<u32>,
    killed: bool,
}

impl PtyControl for NativeControl {
    fn resize(&mut self, size: TerminalSize) -> Result<()> {
        self.master
            .resize(pty_size(size))
            .map_err(|e| Error::Pty(format!("resize failed: {e}")))?;
        self.size = size;
        Ok(())
    }

    fn size(&self) -> TerminalSize {
        self.size
    }

    fn kill(&mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }
        self.killed = true;
        match self.killer.kill() {
            Ok(()) => Ok(()),
            // Already gone
            Err(e) if e.raw_os_error() == Some(ESRCH) => Ok(()),
            Err(e) => Err(Error::Pty(format!("kill failed: {e}"))),
        }
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for NativeControl {
    fn drop(&mut self) {
        if !self.killed {
            let _ = self.kill();
        }
    }
}

fn spawn_reader(
    mut reader: Box<dyn Read + Send>,
    output_tx: mpsc::Sender<Vec<u8>>,
) -> Result<()> {
    std::thread::Builder::new()
        .name("pty-reader".to_string())
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if output_tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        })
        .map(|_| ())
        .map_err(|e| Error::Pty(format!("failed to start reader thread: {e}")))
}

fn spawn_writer(
    mut writer: Box<dyn Write + Send>,
    mut input_rx: mpsc::Receiver<Vec<u8>>,
) -> Result<()> {
    std::thread::Builder::new()
        .name("pty-writer".to_string())
        .spawn(move || {
            while let Some(data) = input_rx.blocking_recv() {
                if writer.write_all(&data).and_then(|_| writer.flush()).is_err() {
                    break;
                }
            }
        })
        .map(|_| ())
        .map_err(|e| Error::Pty(format!("failed to start writer thread: {e}")))
}

fn pty_size(size: TerminalSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Returns the user's default shell, falling back to `/bin/sh`.
pub fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}
