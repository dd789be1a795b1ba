use crate::feeds::MuteSource;
use crate::twitter_message::Tweet;
use anyhow::{Context, Result};
use std::collections::HashSet;

/// User ids whose content is never shown.
#[derive(Debug, Default)]
pub struct MuteRegistry {
    ids: HashSet<String>,
}

impl MuteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set with the full remote list, following cursors until `"0"`.
    pub fn refresh(&mut self, source: &dyn MuteSource) -> Result<()> {
        let mut ids = HashSet::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = source
                .fetch_page(cursor.as_deref())
                .context("fetching mute list")?;
            ids.extend(page.ids);

            if page.next_cursor == "0" || page.next_cursor.is_empty() {
                break;
            }
            cursor = Some(page.next_cursor);
        }

        tracing::info!(count = ids.len(), "mute list loaded");
        self.ids = ids;
        Ok(())
    }

    pub fn add(&mut self, id: &str) {
        self.ids.insert(id.to_string());
    }

    pub fn remove(&mut self, id: &str) {
        self.ids.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// True when the author, or the author of the retweeted tweet, is muted.
    pub fn suppresses(&self, tweet: &Tweet) -> bool {
        if self.contains(&tweet.user.id_str) {
            return true;
        }
        tweet
            .retweeted_status
            .as_ref()
            .is_some_and(|rt| self.contains(&rt.user.id_str))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
