use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const DEFAULT_FONT_WIDTH: u32 = 7;
pub const DEFAULT_FONT_HEIGHT: u32 = 14;

/// Layout constants derived from the terminal and font size. Copied by value,
/// so a render always sees one consistent snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Zero when the terminal width is unknown.
    pub columns: usize,
    pub font_width: u32,
    pub font_height: u32,
    pub icon_size: u32,
    pub image_size: u32,
    pub indent_unit: usize,
}

impl Geometry {
    pub fn derive(columns: usize, font_width: u32, font_height: u32) -> Self {
        let font_width = font_width.max(1);
        // Avatars stay within three text rows; sixel bands are six pixels tall.
        let icon_size = font_height * 3 / 6 * 6;
        let image_size = font_height * 9 / 6 * 6;
        let indent_unit = (icon_size / font_width) as usize + 1;
        Self {
            columns,
            font_width,
            font_height,
            icon_size,
            image_size,
            indent_unit,
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::derive(0, DEFAULT_FONT_WIDTH, DEFAULT_FONT_HEIGHT)
    }
}

/// What the terminal reports about itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub columns: usize,
    pub cell_width: Option<u32>,
    pub cell_height: Option<u32>,
}

pub trait MetricsProbe {
    fn probe(&self) -> Option<Metrics>;
}

/// Asks the controlling terminal for its size in cells and pixels.
pub struct TerminalProbe;

impl MetricsProbe for TerminalProbe {
    fn probe(&self) -> Option<Metrics> {
        match crossterm::terminal::window_size() {
            Ok(size) => {
                let per_cell = |pixels: u16, cells: u16| {
                    (pixels > 0 && cells > 0).then(|| u32::from(pixels / cells))
                };
                Some(Metrics {
                    columns: usize::from(size.columns),
                    cell_width: per_cell(size.width, size.columns).filter(|w| *w > 0),
                    cell_height: per_cell(size.height, size.rows).filter(|h| *h > 0),
                })
            }
            Err(e) => {
                tracing::debug!("window size query failed: {e}");
                crossterm::terminal::size().ok().map(|(columns, _)| Metrics {
                    columns: usize::from(columns),
                    ..Metrics::default()
                })
            }
        }
    }
}

/// Font size given on the command line; takes priority over the probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FontOverride {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl FontOverride {
    /// Parse `WxH`, e.g. `7x14`.
    pub fn parse(text: &str) -> Option<Self> {
        let (w, h) = text.split_once('x')?;
        let width: u32 = w.trim().parse().ok().filter(|w| *w > 0)?;
        let height: u32 = h.trim().parse().ok().filter(|h| *h > 0)?;
        Some(Self {
            width: Some(width),
            height: Some(height),
        })
    }
}

/// Owns the current geometry snapshot and refreshes it when a resize is
/// pending. The flag may be set from anywhere; it is only consumed between
/// events by [`GeometryMonitor::poll`].
pub struct GeometryMonitor {
    probe: Box<dyn MetricsProbe>,
    font: FontOverride,
    pending: Arc<AtomicBool>,
    current: Geometry,
    default_notice_shown: bool,
}

impl GeometryMonitor {
    pub fn new(probe: Box<dyn MetricsProbe>, font: FontOverride) -> Self {
        let mut monitor = Self {
            probe,
            font,
            pending: Arc::new(AtomicBool::new(false)),
            current: Geometry::default(),
            default_notice_shown: false,
        };
        monitor.refresh();
        monitor
    }

    /// Flag to raise when the terminal size may have changed.
    pub fn resize_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.pending)
    }

    /// Subscribe to SIGWINCH. Best effort: without it the snapshot just stays put.
    pub fn watch_resize(&self) {
        #[cfg(unix)]
        {
            let flag = self.resize_flag();
            if let Err(e) =
                signal_hook::flag::register(signal_hook::consts::SIGWINCH, flag)
            {
                tracing::debug!("resize notifications unavailable: {e}");
            }
        }
    }

    /// Apply a pending resize, if any, and return the snapshot to render with.
    pub fn poll(&mut self) -> Geometry {
        if self.pending.swap(false, Ordering::AcqRel) {
            self.refresh();
        }
        self.current
    }

    pub fn current(&self) -> Geometry {
        self.current
    }

    fn refresh(&mut self) {
        let metrics = self.probe.probe().unwrap_or_default();

        let mut defaulted = false;
        let mut pick = |given: Option<u32>, probed: Option<u32>, fallback: u32| {
            given.or(probed).unwrap_or_else(|| {
                defaulted = true;
                fallback
            })
        };
        let font_width = pick(self.font.width, metrics.cell_width, DEFAULT_FONT_WIDTH);
        let font_height = pick(self.font.height, metrics.cell_height, DEFAULT_FONT_HEIGHT);

        if defaulted && !self.default_notice_shown {
            tracing::info!(
                "font size not detected, using default {font_width}x{font_height}"
            );
            self.default_notice_shown = true;
        }

        self.current = Geometry::derive(metrics.columns, font_width, font_height);
        tracing::debug!(geometry = ?self.current, "geometry updated");
    }
}
