//! Headless terminal emulation.
//!
//! Wraps a vt100 parser so that "what is on the screen right now" is a plain
//! synchronous query over state built from the byte stream. The session actor
//! is the only owner, so updates are applied strictly in arrival order.

use shellbridge_protocol::{CursorPosition, Screenshot};
use vt100::{Callbacks, Parser};

/// Default number of scrollback lines kept by the emulator.
pub const DEFAULT_SCROLLBACK: usize = 10_000;

/// Keeps the last window title set via OSC 0/2.
#[derive(Default)]
struct WindowTitle(String);

impl Callbacks for WindowTitle {
    fn set_window_title(&mut self, _: &mut vt100::Screen, title: &[u8]) {
        self.0 = String::from_utf8_lossy(title).into_owned();
    }
}

/// Screen buffer fed from the PTY output stream.
pub struct Screen {
    parser: Parser<WindowTitle>,
}

impl Screen {
    /// Create an emulator of the given size.
    pub fn new(cols: u16, rows: u16, scrollback: usize) -> Self {
        Self {
            parser: Parser::new_with_callbacks(
                rows.max(1),
                cols.max(1),
                scrollback,
                WindowTitle::default(),
            ),
        }
    }

    /// Feed raw output bytes through the emulator.
    pub fn process(&mut self, bytes: &[u8]) {
        self.parser.process(bytes);
    }

    /// Current size as `(cols, rows)`.
    pub fn size(&self) -> (u16, u16) {
        let (rows, cols) = self.parser.screen().size();
        (cols, rows)
    }

    /// Resize the grid.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.parser.screen_mut().set_size(rows.max(1), cols.max(1));
    }

    /// Cursor position within the viewport.
    pub fn cursor(&self) -> CursorPosition {
        let (row, col) = self.parser.screen().cursor_position();
        CursorPosition { x: col, y: row }
    }

    /// The current viewport as newline-joined text.
    ///
    /// Trailing blank rows are kept so line numbers match screen rows.
    pub fn visible_content(&self) -> String {
        let (cols, _) = self.size();
        self.parser
            .screen()
            .rows(0, cols)
            .map(|row| row.trim_end().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Scrollback plus viewport as newline-joined text, trailing blank lines trimmed.
    pub fn content(&mut self) -> String {
        let mut lines = self.all_lines();
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        lines.join("\n")
    }

    /// Escape sequences that redraw the current screen on a fresh terminal.
    pub fn formatted(&self) -> Vec<u8> {
        self.parser.screen().contents_formatted()
    }

    /// Flat snapshot of the viewport.
    pub fn screenshot(&self) -> Screenshot {
        let (cols, rows) = self.size();
        Screenshot {
            content: self.visible_content(),
            cursor: self.cursor(),
            cols,
            rows,
        }
    }

    /// Title set by the application via OSC 0/2.
    pub fn title(&self) -> String {
        self.parser.callbacks().0.clone()
    }

    /// Every line from the oldest scrollback row to the bottom of the viewport.
    ///
    /// vt100 only exposes a viewport-sized window at a scrollback offset, so
    /// this slides the window from the top down and restores the live view.
    /// A window at offset `n` always starts `n` lines above the live screen,
    /// even when `n` exceeds the viewport height.
    fn all_lines(&mut self) -> Vec<String> {
        let (cols, rows) = self.size();
        let rows = usize::from(rows);

        self.parser.screen_mut().set_scrollback(usize::MAX);
        let history = self.parser.screen().scrollback();
        let total = history + rows;

        let mut lines = Vec::with_capacity(total);
        while lines.len() < total {
            let start = lines.len();
            let offset = history.saturating_sub(start);
            self.parser.screen_mut().set_scrollback(offset);
            let window_start = history - offset;
            let skip = start - window_start;
            lines.extend(
                self.parser
                    .screen()
                    .rows(0, cols)
                    .skip(skip)
                    .map(|row| row.trim_end().to_string()),
            );
        }
        self.parser.screen_mut().set_scrollback(0);
        lines
    }
}
