pub mod mutes;
pub mod playback;
pub mod record;

use anyhow::Result;

/// One page of the remote mute list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutePage {
    pub ids: Vec<String>,
    /// `"0"` marks the last page.
    pub next_cursor: String,
}

/// Paginated source of muted user ids.
pub trait MuteSource {
    fn fetch_page(&self, cursor: Option<&str>) -> Result<MutePage>;
}
