pub mod color;
pub mod format;
pub mod geometry;
pub mod image_cache;
pub mod layout;
pub mod output;
pub mod sixel;

use crate::clock::Zone;
use crate::filter::ngword::NgMatch;
use crate::twitter_message::{EventEnvelope, Timestamped, Tweet, User};
use chrono::{DateTime, Utc};
use color::{Palette, Role};
use format::{format_id, format_message, format_name, format_source, unescape};
use geometry::Geometry;
use image_cache::{avatar_key, media_key, ImageCache, RenderOutcome};
use layout::ImageRow;
use output::Output;
use std::io::{self, Write};

const NOTICE_SOURCE: &str = "tweetsixel notice";

/// Writes tweets and notifications to the terminal.
pub struct Renderer<W: Write> {
    out: Output<W>,
    palette: Palette,
    zone: Zone,
    images: Option<ImageCache>,
    protect: bool,
    max_image_count: usize,
    image_row: ImageRow,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: Output<W>, palette: Palette, zone: Zone) -> Self {
        Self {
            out,
            palette,
            zone,
            images: None,
            protect: false,
            max_image_count: 0,
            image_row: ImageRow::default(),
        }
    }

    pub fn with_images(mut self, cache: ImageCache) -> Self {
        self.images = Some(cache);
        self
    }

    /// Replace tweets from protected accounts with a one-line placeholder.
    pub fn with_protect(mut self, protect: bool) -> Self {
        self.protect = protect;
        self
    }

    /// Most images placed side by side before wrapping; zero means as many
    /// as fit the terminal width.
    pub fn with_max_image_count(mut self, count: usize) -> Self {
        self.max_image_count = count;
        self
    }

    pub fn output(&self) -> &Output<W> {
        &self.out
    }

    pub fn into_output(self) -> Output<W> {
        self.out
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// Render one tweet. `favorite` is the notification that carried it, if
    /// any; `depth` is the quote nesting level.
    pub fn show_status(
        &mut self,
        status: &Tweet,
        favorite: Option<&EventEnvelope>,
        geom: &Geometry,
        now: DateTime<Utc>,
        depth: usize,
    ) -> io::Result<()> {
        let s = status.retweeted_status.as_deref().unwrap_or(status);

        let userid = self.paint(&format_id(&s.user.screen_name), Role::UserId);
        let name = self.paint(&format_name(&s.user.name), Role::UserName);
        let src = self.paint(&format!("via {}", format_source(&s.source)), Role::Source);
        let time = self.paint(&self.time_of(s, now), Role::Time);
        let verified = if s.user.verified {
            self.paint(" ●", Role::Verified)
        } else {
            String::new()
        };
        let protected = if s.user.protected {
            self.paint(" ■", Role::Protected)
        } else {
            String::new()
        };

        if self.protect && s.user.protected {
            let label = self.paint("protected account", Role::Ng);
            self.print(&format!("{label}\n{time}"), geom, depth)?;
            return self.newline();
        }

        let formatted = format_message(s, &self.palette, geom.image_size);

        self.show_icon(&s.user, geom, depth)?;
        self.print(&format!("{name} {userid}{verified}{protected}"), geom, depth)?;
        self.newline()?;
        self.print(&formatted.text, geom, depth)?;
        self.newline()?;

        self.image_row = ImageRow::default();
        let indent = geom.indent_unit * (depth + 1);
        for m in &formatted.media {
            self.out.raw(layout::cursor_forward(indent).as_bytes())?;
            self.show_photo(&m.target_url, m.width, geom, indent)?;
            self.out.raw(b"\r")?;
        }

        if let Some(quoted) = s.quoted_status.as_deref() {
            self.newline()?;
            self.show_status(quoted, None, geom, now, depth + 1)?;
        }

        let mut counts = String::new();
        if s.retweet_count > 0 {
            counts.push_str(&self.paint(&format!(" {}RT", s.retweet_count), Role::Retweet));
        }
        if s.favorite_count > 0 {
            counts.push_str(&self.paint(&format!(" {}Fav", s.favorite_count), Role::Favorite));
        }
        self.print(&format!("{time} {src}{counts}"), geom, depth)?;
        self.newline()?;

        if status.retweeted_status.is_some() {
            let line = self.activity_line(status, &status.user, "retweeted", now);
            let line = self.paint(&line, Role::Retweet);
            self.print(&line, geom, depth)?;
            self.newline()?;
        }

        if let Some(event) = favorite {
            let line = self.activity_line(event, &event.source, "favorited", now);
            let line = self.paint(&line, Role::Favorite);
            self.print(&line, geom, depth)?;
            self.newline()?;
        }
        Ok(())
    }

    /// Struck-through placeholder for a tweet suppressed by an NG rule.
    pub fn show_ng(
        &mut self,
        status: &Tweet,
        ng: &NgMatch,
        geom: &Geometry,
        now: DateTime<Utc>,
    ) -> io::Result<()> {
        let userid = self.paint(&format_id(&ng.user.screen_name), Role::Ng);
        let name = self.paint(&format_name(&ng.user.name), Role::Ng);
        let time = self.paint(&self.time_of(status, now), Role::Ng);
        let msg = self.paint(&format!("NG:{}", ng.pattern), Role::Ng);

        self.print(&format!("{name} {userid}\n{time} {msg}"), geom, 0)?;
        self.newline()?;
        self.newline()
    }

    pub fn show_follow(
        &mut self,
        event: &EventEnvelope,
        geom: &Geometry,
        now: DateTime<Utc>,
    ) -> io::Result<()> {
        let time = self.paint(&self.time_of(event, now), Role::Time);
        let src_userid = self.paint(&format_id(&event.source.screen_name), Role::UserId);
        let src_name = self.paint(&format_name(&event.source.name), Role::UserName);
        let dst_userid = self.paint(&format_id(&event.target.screen_name), Role::UserId);
        let dst_name = self.paint(&format_name(&event.target.name), Role::UserName);
        let notice = self.paint(NOTICE_SOURCE, Role::Source);

        self.show_icon(&event.source, geom, 0)?;
        self.print(
            &format!("{src_name} {src_userid} followed {dst_name} {dst_userid}"),
            geom,
            0,
        )?;
        self.newline()?;
        self.print(&format!("{time} {notice}"), geom, 0)?;
        self.newline()?;
        self.newline()
    }

    /// Separator written after each top-level tweet.
    pub fn end_status(&mut self) -> io::Result<()> {
        self.newline()?;
        self.flush()
    }

    /// Draw the avatar left of the header and put the cursor back where it was.
    fn show_icon(&mut self, user: &User, geom: &Geometry, depth: usize) -> io::Result<()> {
        // Scroll first so that restoring the saved cursor lands on the right row.
        self.out.raw(b"\n\n\n\x1b[3A\x1b7")?;

        let key = avatar_key(
            &unescape(&user.screen_name),
            geom.icon_size,
            &user.profile_image_url,
        );
        let shown = !user.profile_image_url.is_empty()
            && self.show_image(&key, &user.profile_image_url, Some(geom.icon_size), geom, depth)?;
        if !shown {
            self.out.raw(b"\n\n\n")?;
        }

        // Move up before restoring for terminals without save/restore.
        self.out.raw(b"\r\x1b[3A\x1b8")
    }

    fn show_image(
        &mut self,
        key: &str,
        url: &str,
        width: Option<u32>,
        geom: &Geometry,
        depth: usize,
    ) -> io::Result<bool> {
        if depth > 0 {
            let left = geom.indent_unit * depth;
            self.out.raw(layout::cursor_forward(left).as_bytes())?;
        }
        let Some(cache) = &self.images else {
            return Ok(false);
        };
        let outcome = cache.render(self.out.raw_writer(), key, url, width)?;
        Ok(matches!(outcome, RenderOutcome::Rendered(_)))
    }

    /// Draw an attached image next to the previous one when it fits.
    fn show_photo(
        &mut self,
        url: &str,
        width: Option<u32>,
        geom: &Geometry,
        indent: usize,
    ) -> io::Result<()> {
        let Some(cache) = &self.images else {
            return Ok(());
        };
        let Some(image) = cache.open(&media_key(url), url, width) else {
            return Ok(());
        };
        let Some((px_width, px_height)) = image.size else {
            tracing::debug!("image {url} has no raster size, not placing it");
            return Ok(());
        };
        let cols = (px_width as usize).div_ceil(geom.font_width.max(1) as usize);
        let rows = (px_height as usize).div_ceil(geom.font_height.max(1) as usize);

        let motion = self.image_row.place(cols, indent, geom.columns, self.max_image_count);
        self.out.raw(motion.as_bytes())?;
        image.stream_to(self.out.raw_writer())?;
        let motion = self.image_row.drawn(cols, rows);
        self.out.raw(motion.as_bytes())
    }

    fn activity_line(
        &self,
        item: &impl Timestamped,
        user: &User,
        verb: &str,
        now: DateTime<Utc>,
    ) -> String {
        format!(
            "{} {} {} {verb}",
            self.time_of(item, now),
            format_name(&user.name),
            format_id(&user.screen_name)
        )
    }

    fn time_of(&self, item: &impl Timestamped, now: DateTime<Utc>) -> String {
        item.posted_at()
            .map(|t| self.zone.format(t, now))
            .unwrap_or_default()
    }

    fn paint(&self, text: &str, role: Role) -> String {
        self.palette.paint(text, role)
    }

    /// Indented, wrapped text. Newlines inside `msg` keep the indent.
    fn print(&mut self, msg: &str, geom: &Geometry, depth: usize) -> io::Result<()> {
        let text = layout::indent(msg, geom.columns, geom.indent_unit, depth);
        self.out.text(&text)
    }

    fn newline(&mut self) -> io::Result<()> {
        self.out.raw(b"\n")
    }
}
