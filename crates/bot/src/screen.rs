//! Terminal emulator (C2): decodes CP437 to Unicode, interprets a subset
//! of ANSI via `avt`, and renders an 80x25 character grid. Pure function
//! of its input byte history — it never blocks and owns no clock.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// CP437 code points for bytes 0x80..=0xFF. Bytes below 0x80 map 1:1 to
/// ASCII, which CP437 shares with Unicode in that range.
#[rustfmt::skip]
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç',
    'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù',
    'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º',
    '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖',
    '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟',
    '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫',
    '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ',
    'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈',
    '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{00A0}',
];

pub fn decode_cp437(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b < 0x80 { b as char } else { CP437_HIGH[(b - 0x80) as usize] })
        .collect()
}

/// Row/column position of the terminal cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub row: u16,
    pub col: u16,
}

/// The rendered grid and cursor at a point in time; no timing information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedGrid {
    pub lines: Vec<String>,
    pub cols: u16,
    pub rows: u16,
    pub cursor: CursorPosition,
}

impl RenderedGrid {
    /// Stable hash over the visible text after stripping trailing spaces
    /// per row, so two renders with only whitespace differences hash equal.
    pub fn text_hash(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for line in &self.lines {
            line.trim_end_matches(' ').hash(&mut hasher);
            0u8.hash(&mut hasher); // row separator, stable regardless of row content
        }
        hasher.finish()
    }

    /// True iff the cursor sits immediately after the last non-space
    /// character of its row and that row is the last non-blank row.
    pub fn cursor_at_end(&self) -> bool {
        let Some(row) = self.lines.get(self.cursor.row as usize) else { return false };
        let trimmed_len = row.trim_end_matches(' ').chars().count() as u16;
        if self.cursor.col != trimmed_len {
            return false;
        }
        let last_non_blank = self
            .lines
            .iter()
            .enumerate()
            .rev()
            .find(|(_, l)| !l.trim_end_matches(' ').is_empty())
            .map(|(i, _)| i as u16);
        last_non_blank == Some(self.cursor.row)
    }

    pub fn joined(&self, last_n_rows: usize) -> String {
        let start = self.lines.len().saturating_sub(last_n_rows);
        self.lines[start..].join("\n")
    }
}

/// Terminal emulator wrapping an `avt` virtual terminal fed with
/// CP437-decoded text.
pub struct TerminalEmulator {
    vt: avt::Vt,
}

impl TerminalEmulator {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { vt: avt::Vt::new(cols as usize, rows as usize) }
    }

    /// Feed raw transport bytes (already telnet-unescaped, CP437-encoded)
    /// into the emulator.
    pub fn feed(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let decoded = decode_cp437(bytes);
        let _ = self.vt.feed_str(&decoded);
    }

    pub fn render(&self) -> RenderedGrid {
        let (cols, rows) = self.vt.size();
        let cursor = self.vt.cursor();
        let lines: Vec<String> = self.vt.view().map(|line| line.text()).collect();
        RenderedGrid {
            lines,
            cols: cols as u16,
            rows: rows as u16,
            cursor: CursorPosition { row: cursor.row as u16, col: cursor.col as u16 },
        }
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        let _ = self.vt.resize(cols as usize, rows as usize);
    }
}

#[cfg(test)]
#[path = "screen_tests.rs"]
mod tests;
