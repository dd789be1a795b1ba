//! Indentation and line wrapping for colorized text.
//!
//! Column accounting: escape sequences are zero width, ASCII and control
//! characters are one column, half-width katakana is one column, and every
//! other non-ASCII character is treated as two columns.

/// Cursor-forward escape used as the left margin.
pub fn cursor_forward(columns: usize) -> String {
    format!("\x1b[{columns}C")
}

fn is_halfwidth_kana(c: char) -> bool {
    ('\u{FF61}'..='\u{FF9F}').contains(&c)
}

/// Indent every line of `text` by `indent_unit * (depth + 1)` columns and wrap
/// it to `columns`. A column count of zero means the width is unknown: margins
/// are still emitted but nothing is wrapped.
pub fn indent(text: &str, columns: usize, indent_unit: usize, depth: usize) -> String {
    let left = indent_unit * (depth + 1);
    let margin = cursor_forward(left);
    let wrap = columns > 0;

    let mut out = String::with_capacity(text.len() + margin.len() * 2);
    out.push_str(&margin);
    let mut x = left;
    let mut in_escape = false;

    let newline = |out: &mut String, x: &mut usize| {
        out.push('\n');
        out.push_str(&margin);
        *x = left;
    };

    for c in text.chars() {
        if in_escape {
            out.push(c);
            if c.is_ascii_alphabetic() {
                in_escape = false;
            }
            continue;
        }

        match c {
            '\x1b' => {
                in_escape = true;
                out.push(c);
                continue;
            }
            '\n' => {
                newline(&mut out, &mut x);
                continue;
            }
            c if c.is_ascii() || is_halfwidth_kana(c) => {
                out.push(c);
                x += 1;
            }
            c => {
                // Wide characters are never split across the edge.
                if wrap && x > columns.saturating_sub(2) {
                    newline(&mut out, &mut x);
                }
                out.push(c);
                x += 2;
            }
        }

        if wrap && x > columns.saturating_sub(1) {
            newline(&mut out, &mut x);
        }
    }
    out
}

/// Images under one tweet, laid side by side until the row is full.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImageRow {
    count: usize,
    next_cols: usize,
    max_rows: usize,
}

impl ImageRow {
    /// Cursor motion before drawing an image `cols` cells wide, starting from
    /// the left margin below the previous image. A new row starts at `indent`
    /// when the image would reach the right edge or the row already holds
    /// `max_count` images. Zero `columns` or `max_count` means no limit.
    pub fn place(&mut self, cols: usize, indent: usize, columns: usize, max_count: usize) -> String {
        let full = max_count > 0 && self.count >= max_count;
        let too_wide = columns > 0 && indent + self.next_cols + cols >= columns;
        if full || too_wide {
            *self = ImageRow::default();
            return format!("\r{}", cursor_forward(indent));
        }

        let mut motion = String::new();
        if self.count > 0 {
            if self.max_rows > 0 {
                motion.push_str(&format!("\x1b[{}A", self.max_rows));
            }
            if self.next_cols > 0 {
                motion.push_str(&cursor_forward(self.next_cols));
            }
        }
        motion
    }

    /// Record an image of `cols` by `rows` cells that was just drawn. The
    /// returned motion leaves the cursor under the tallest image in the row.
    pub fn drawn(&mut self, cols: usize, rows: usize) -> String {
        self.count += 1;
        self.next_cols += cols;
        if self.max_rows > rows {
            format!("\x1b[{}B", self.max_rows - rows)
        } else {
            self.max_rows = rows;
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Visible characters of one output line, escapes removed.
    fn visible(line: &str) -> String {
        let mut out = String::new();
        let mut in_escape = false;
        for c in line.chars() {
            if in_escape {
                in_escape = !c.is_ascii_alphabetic();
            } else if c == '\x1b' {
                in_escape = true;
            } else {
                out.push(c);
            }
        }
        out
    }

    #[test]
    fn test_short_line_gets_margin() {
        assert_eq!(indent("hello", 80, 6, 0), "\x1b[6Chello");
        assert_eq!(indent("hello", 80, 6, 2), "\x1b[18Chello");
    }

    #[test]
    fn test_ascii_wraps_with_margin_on_every_line() {
        let text = "a".repeat(30);
        let out = indent(&text, 20, 6, 0);
        let lines: Vec<&str> = out.split('\n').collect();

        assert_eq!(lines.len(), 3);
        for line in &lines {
            assert!(line.starts_with("\x1b[6C"));
            assert!(visible(line).chars().count() <= 19);
        }
        assert_eq!(visible(lines[0]), "a".repeat(14));
        assert_eq!(visible(lines[1]), "a".repeat(14));
        assert_eq!(visible(lines[2]), "aa");
    }

    #[test]
    fn test_escapes_take_no_columns() {
        let text = format!("\x1b[1;32m{}\x1b[0m", "b".repeat(14));
        let out = indent(&text, 20, 6, 0);
        // 14 visible characters fill the line exactly; the break comes after them.
        assert_eq!(out, format!("\x1b[6C\x1b[1;32m{}\n\x1b[6C\x1b[0m", "b".repeat(14)));
    }

    #[test]
    fn test_wide_chars_break_before_edge() {
        // left=6, columns=12: after "aあい" the cursor sits at 11, so "う" moves down.
        let out = indent("aあいう", 12, 6, 0);
        assert_eq!(out, "\x1b[6Caあい\n\x1b[6Cう");
    }

    #[test]
    fn test_wide_char_filling_line_breaks_after() {
        let out = indent("あいう", 12, 6, 0);
        assert_eq!(out, "\x1b[6Cあいう\n\x1b[6C");
    }

    #[test]
    fn test_halfwidth_kana_is_single_column() {
        let kana = "ｱ".repeat(14);
        let out = indent(&kana, 20, 6, 0);
        assert_eq!(out, format!("\x1b[6C{kana}\n\x1b[6C"));
    }

    #[test]
    fn test_explicit_newline_reindents() {
        assert_eq!(indent("a\nb", 80, 4, 1), "\x1b[8Ca\n\x1b[8Cb");
    }

    #[test]
    fn test_image_row_tiles_and_aligns_bottom() {
        let mut row = ImageRow::default();
        assert_eq!(row.place(10, 7, 80, 0), "");
        assert_eq!(row.drawn(10, 2), "");

        assert_eq!(row.place(10, 7, 80, 0), "\x1b[2A\x1b[10C");
        assert_eq!(row.drawn(10, 4), "");

        assert_eq!(row.place(10, 7, 80, 0), "\x1b[4A\x1b[20C");
        assert_eq!(row.drawn(10, 1), "\x1b[3B");
    }

    #[test]
    fn test_image_row_wraps_at_edge_and_count() {
        let mut row = ImageRow::default();
        row.place(30, 7, 80, 0);
        row.drawn(30, 2);
        row.place(30, 7, 80, 0);
        row.drawn(30, 2);
        // 7 + 60 + 30 reaches the edge.
        assert_eq!(row.place(30, 7, 80, 0), "\r\x1b[7C");
        row.drawn(30, 2);
        assert_eq!(row.place(5, 7, 80, 0), "\x1b[2A\x1b[30C");

        let mut row = ImageRow::default();
        row.place(5, 7, 0, 1);
        row.drawn(5, 1);
        assert_eq!(row.place(5, 7, 0, 1), "\r\x1b[7C");
    }

    #[test]
    fn test_unknown_width_disables_wrapping() {
        let text = format!("{}\nnext", "x".repeat(200));
        let out = indent(&text, 0, 6, 0);
        assert_eq!(out, format!("\x1b[6C{}\n\x1b[6Cnext", "x".repeat(200)));
    }
}
