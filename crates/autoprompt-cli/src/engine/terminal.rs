//! Virtual screen mirror using vt100 for ANSI parsing.
//!
//! Redrawing programs overwrite earlier lines with cursor movement instead of
//! reprinting them, so searching the raw byte stream can find lines that were
//! never on screen together. The mirror is fed exactly the bytes the real
//! terminal receives and serializes what is actually rendered.

use crate::engine::pty::TermSize;

/// Narrow capability the engine needs from a terminal emulator.
pub trait VirtualScreen {
    /// Feed raw child output.
    fn write(&mut self, bytes: &[u8]);

    /// Track the child's PTY geometry.
    fn resize(&mut self, size: TermSize);

    /// Scrollback plus visible screen as plain text.
    ///
    /// Returns `None` when no emulator is available.
    fn serialize(&mut self) -> Option<String>;
}

/// Default number of scrollback rows kept by the mirror.
pub const DEFAULT_SCROLLBACK: usize = 1000;

/// vt100-backed screen mirror.
pub struct TerminalEmulator {
    parser: Option<vt100::Parser>,
}

impl TerminalEmulator {
    /// Create a new mirror with the given size and scrollback depth.
    pub fn new(size: TermSize, scrollback: usize) -> Self {
        Self {
            parser: Some(vt100::Parser::new(size.rows, size.cols, scrollback)),
        }
    }

    /// A mirror without an emulator; `serialize` always returns `None`.
    pub fn headless() -> Self {
        Self { parser: None }
    }

    /// Drop the emulator state. Later writes are ignored.
    pub fn teardown(&mut self) {
        self.parser = None;
    }

    /// Get the terminal size (cols, rows).
    pub fn size(&self) -> Option<TermSize> {
        self.parser.as_ref().map(|p| {
            let (rows, cols) = p.screen().size();
            TermSize { cols, rows }
        })
    }
}

impl VirtualScreen for TerminalEmulator {
    fn write(&mut self, bytes: &[u8]) {
        if let Some(parser) = self.parser.as_mut() {
            parser.process(bytes);
        }
    }

    fn resize(&mut self, size: TermSize) {
        if let Some(parser) = self.parser.as_mut() {
            parser.screen_mut().set_size(size.rows, size.cols);
        }
    }

    fn serialize(&mut self) -> Option<String> {
        let parser = self.parser.as_mut()?;
        let screen = parser.screen_mut();
        let (rows, cols) = screen.size();
        let rows = usize::from(rows);

        // vt100 only exposes scrollback through the viewport offset, which
        // clamps to the number of rows actually stored.
        screen.set_scrollback(usize::MAX);
        let stored = screen.scrollback();

        let total = stored + rows;
        let mut lines: Vec<String> = Vec::with_capacity(total);
        while lines.len() < total {
            let start = lines.len();
            let offset = stored.saturating_sub(start);
            screen.set_scrollback(offset);
            let view_start = stored - offset;
            for (r, line) in screen.rows(0, cols).enumerate() {
                if view_start + r == lines.len() && lines.len() < total {
                    lines.push(line.trim_end().to_string());
                }
            }
            if lines.len() == start {
                break;
            }
        }
        screen.set_scrollback(0);

        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        Some(lines.join("\n"))
    }
}
