//! Caller terminal handling.
//!
//! Provides:
//! - Raw terminal mode setup/restore
//! - Terminal size detection
//! - OS signals as a control event source

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Mutex;

use tokio::signal::unix::{SignalKind as OsSignal, signal};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use rexec_core::error::{Error, Result};
use rexec_core::events::{EventSink, EventSource};
use rexec_core::protocol::{ControlFrame, SignalKind, TermSize};

/// Whether `fd` refers to a terminal.
pub fn is_tty(fd: RawFd) -> bool {
    // SAFETY: isatty only inspects the descriptor.
    unsafe { libc::isatty(fd) == 1 }
}

/// Whether this process's stdin is a terminal.
pub fn stdin_is_tty() -> bool {
    is_tty(io::stdin().as_raw_fd())
}

/// Size of the terminal on stdout, or 80x24 when there is none.
pub fn terminal_size() -> TermSize {
    terminal_size_of(io::stdout().as_raw_fd()).unwrap_or_default()
}

fn terminal_size_of(fd: RawFd) -> Option<TermSize> {
    let mut winsize = std::mem::MaybeUninit::<libc::winsize>::uninit();
    // SAFETY: TIOCGWINSZ writes a winsize into the provided buffer.
    let result = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, winsize.as_mut_ptr()) };
    if result != 0 {
        return None;
    }
    // SAFETY: ioctl succeeded and initialised the struct.
    let winsize = unsafe { winsize.assume_init() };
    if winsize.ws_col == 0 || winsize.ws_row == 0 {
        return None;
    }
    Some(TermSize {
        cols: winsize.ws_col,
        rows: winsize.ws_row,
    })
}

/// Puts a terminal in raw mode until restored.
///
/// Restoring is idempotent and also happens on drop.
pub struct RawModeGuard {
    fd: RawFd,
    original: Mutex<Option<libc::termios>>,
}

impl RawModeGuard {
    /// Enter raw mode on stdin.
    pub fn enter() -> Result<Self> {
        Self::enter_fd(io::stdin().as_raw_fd())
    }

    /// Enter raw mode on `fd`.
    pub fn enter_fd(fd: RawFd) -> Result<Self> {
        let mut termios = std::mem::MaybeUninit::<libc::termios>::uninit();
        // SAFETY: tcgetattr fills the termios on success.
        if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        // SAFETY: tcgetattr succeeded.
        let original = unsafe { termios.assume_init() };

        let mut raw = original;
        raw.c_iflag &= !(libc::BRKINT | libc::ICRNL | libc::INPCK | libc::ISTRIP | libc::IXON);
        raw.c_oflag &= !libc::OPOST;
        raw.c_cflag |= libc::CS8;
        // Keystrokes like ^C travel to the remote pty as bytes.
        raw.c_lflag &= !(libc::ECHO | libc::ICANON | libc::IEXTEN | libc::ISIG);
        raw.c_cc[libc::VMIN] = 1;
        raw.c_cc[libc::VTIME] = 0;

        // SAFETY: raw is a valid termios derived from the current settings.
        if unsafe { libc::tcsetattr(fd, libc::TCSAFLUSH, &raw) } != 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        debug!(fd, "Entered raw terminal mode");

        Ok(Self {
            fd,
            original: Mutex::new(Some(original)),
        })
    }

    pub fn is_active(&self) -> bool {
        self.original.lock().map(|o| o.is_some()).unwrap_or(false)
    }

    /// Restore the saved terminal settings.
    pub fn restore(&self) {
        let original = match self.original.lock() {
            Ok(mut original) => original.take(),
            Err(_) => None,
        };
        let Some(original) = original else {
            return;
        };
        // SAFETY: original came from tcgetattr on the same fd.
        if unsafe { libc::tcsetattr(self.fd, libc::TCSAFLUSH, &original) } != 0 {
            warn!("Failed to restore terminal settings");
        } else {
            debug!(fd = self.fd, "Restored terminal settings");
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

/// OS signals delivered to this process, as control events.
///
/// SIGWINCH becomes `Resize` with the current terminal size; the forwarded
/// signals become `Signal`. tokio keeps its handlers registered for the rest
/// of the process, so after uninstall the signals are swallowed.
pub struct SignalSource {
    resize: bool,
    signals: Vec<SignalKind>,
    tasks: Vec<JoinHandle<()>>,
}

impl SignalSource {
    pub fn new(resize: bool, signals: Vec<SignalKind>) -> Self {
        Self {
            resize,
            signals,
            tasks: Vec::new(),
        }
    }

    /// Resize only under a pty; every forwardable signal always.
    pub fn for_session(terminal: bool) -> Self {
        Self::new(terminal, SignalKind::ALL.to_vec())
    }
}

impl EventSource<ControlFrame> for SignalSource {
    fn name(&self) -> &'static str {
        "os-signals"
    }

    fn install(&mut self, sink: EventSink<ControlFrame>) -> Result<()> {
        if self.resize {
            let mut winch = signal(OsSignal::window_change())?;
            let sink = sink.clone();
            self.tasks.push(tokio::spawn(async move {
                while winch.recv().await.is_some() {
                    sink.push(ControlFrame::Resize(terminal_size()));
                }
            }));
        }

        for &kind in &self.signals {
            let mut stream = signal(OsSignal::from_raw(kind.as_raw()))?;
            let sink = sink.clone();
            self.tasks.push(tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    debug!(signal = %kind, "Caught signal");
                    sink.push(ControlFrame::Signal(kind));
                }
            }));
        }
        debug!(tasks = self.tasks.len(), "Signal handlers installed");
        Ok(())
    }

    fn uninstall(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!("Signal handlers removed");
    }
}
