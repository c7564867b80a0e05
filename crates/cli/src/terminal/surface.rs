//! Terminal surfaces
//!
//! The local end of a terminal bridge. A surface renders remote bytes and
//! reports its size; once disposed it is gone for good.

use crossterm::event::{DisableBracketedPaste, EnableBracketedPaste};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use parking_lot::Mutex;
use std::io::{self, Stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Something a terminal bridge can render into
pub trait TerminalSurface: Send + 'static {
    /// Render bytes exactly as received
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn write_line(&mut self, text: &str) -> io::Result<()> {
        self.write(text.as_bytes())?;
        self.write(b"\r\n")
    }

    /// Re-measure the viewport; returns `(cols, rows)`
    fn fit(&mut self) -> (u16, u16);

    /// Release the surface. Idempotent.
    fn dispose(&mut self);
}

/// The user's own terminal, switched to raw mode for the lifetime of the
/// surface
pub struct RawTerminal {
    out: Stdout,
    raw: bool,
    disposed: bool,
}

impl RawTerminal {
    pub fn new() -> Self {
        let raw = match enable_raw_mode() {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to enable raw mode: {}", e);
                false
            }
        };
        let mut out = io::stdout();
        if raw {
            let _ = execute!(out, EnableBracketedPaste);
        }
        Self { out, raw, disposed: false }
    }
}

impl Default for RawTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalSurface for RawTerminal {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.out.write_all(bytes)?;
        self.out.flush()
    }

    fn fit(&mut self) -> (u16, u16) {
        crossterm::terminal::size().unwrap_or((80, 24))
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if self.raw {
            let _ = execute!(self.out, DisableBracketedPaste);
            let _ = disable_raw_mode();
        }
        let _ = self.out.write_all(b"\r\n");
        let _ = self.out.flush();
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// In-memory surface. Clones share the same buffer, so a caller can keep a
/// handle after moving one into a bridge.
#[derive(Clone)]
pub struct BufferSurface {
    buffer: Arc<Mutex<Vec<u8>>>,
    disposed: Arc<AtomicBool>,
    size: (u16, u16),
}

impl BufferSurface {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            disposed: Arc::new(AtomicBool::new(false)),
            size: (cols, rows),
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }

    /// Contents decoded lossily as UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Default for BufferSurface {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

impl TerminalSurface for BufferSurface {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.is_disposed() {
            self.buffer.lock().extend_from_slice(bytes);
        }
        Ok(())
    }

    fn fit(&mut self) -> (u16, u16) {
        self.size
    }

    fn dispose(&mut self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}
