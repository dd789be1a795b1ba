use crate::feeds::record::Recorder;
use crate::filter::{MuteRegistry, NgWords};
use crate::twitter_message::{EventEnvelope, Tweet};
use crate::twitter_parser::{classify, StreamEvent};
use crate::ui::geometry::{Geometry, GeometryMonitor};
use crate::ui::Renderer;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::io::Write;

/// Everything one event needs on its way from a raw line to the terminal.
/// Events are handled strictly one after another, in arrival order.
pub struct Pipeline<W: Write> {
    mutes: MuteRegistry,
    ngwords: NgWords,
    monitor: GeometryMonitor,
    renderer: Renderer<W>,
    recorder: Option<Recorder>,
    fixed_now: Option<DateTime<Utc>>,
}

impl<W: Write> Pipeline<W> {
    pub fn new(renderer: Renderer<W>, monitor: GeometryMonitor) -> Self {
        Self {
            mutes: MuteRegistry::new(),
            ngwords: NgWords::default(),
            monitor,
            renderer,
            recorder: None,
            fixed_now: None,
        }
    }

    pub fn with_mutes(mut self, mutes: MuteRegistry) -> Self {
        self.mutes = mutes;
        self
    }

    pub fn with_ngwords(mut self, ngwords: NgWords) -> Self {
        self.ngwords = ngwords;
        self
    }

    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Pin "now" instead of reading the system clock.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    pub fn mutes(&self) -> &MuteRegistry {
        &self.mutes
    }

    pub fn renderer(&self) -> &Renderer<W> {
        &self.renderer
    }

    pub fn into_renderer(self) -> Renderer<W> {
        self.renderer
    }

    fn now(&self) -> DateTime<Utc> {
        self.fixed_now.unwrap_or_else(Utc::now)
    }

    /// Feed every line through the pipeline. Only output failures stop it.
    pub fn run(&mut self, lines: impl Iterator<Item = String>) -> Result<()> {
        for line in lines {
            self.process_line(&line)?;
        }
        self.renderer.flush().context("flushing output")
    }

    pub fn process_line(&mut self, line: &str) -> Result<()> {
        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.record(line) {
                tracing::warn!("{e:#}");
            }
        }

        let object: serde_json::Value = match serde_json::from_str(line) {
            Ok(object) => object,
            Err(e) => {
                tracing::debug!("skipping undecodable line: {e}");
                return Ok(());
            }
        };

        // A pending resize takes effect here, never in the middle of a render.
        let geom = self.monitor.poll();
        self.handle(classify(object), &geom)
            .context("writing to terminal")
    }

    fn handle(&mut self, event: StreamEvent, geom: &Geometry) -> std::io::Result<()> {
        match event {
            StreamEvent::Tweet(tweet) => self.show(&tweet, None, geom),
            StreamEvent::Favorite(fav) => self.show(&fav.tweet, Some(&fav.event), geom),
            StreamEvent::Follow(event) => {
                let now = self.now();
                self.renderer.show_follow(&event, geom, now)?;
                self.renderer.flush()
            }
            StreamEvent::Mute(user) => {
                tracing::debug!(id = %user.id_str, "muted");
                self.mutes.add(&user.id_str);
                Ok(())
            }
            StreamEvent::Unmute(user) => {
                tracing::debug!(id = %user.id_str, "unmuted");
                self.mutes.remove(&user.id_str);
                Ok(())
            }
            StreamEvent::FriendsSnapshot | StreamEvent::Unrecognized => Ok(()),
        }
    }

    fn show(
        &mut self,
        tweet: &Tweet,
        favorite: Option<&EventEnvelope>,
        geom: &Geometry,
    ) -> std::io::Result<()> {
        // Muted authors are dropped before NG rules are consulted.
        if self.mutes.suppresses(tweet) {
            return Ok(());
        }

        let now = self.now();
        if let Some(ng) = self.ngwords.match_tweet(tweet, now) {
            tracing::debug!(pattern = %ng.pattern, "NG word matched");
            self.renderer.show_ng(tweet, &ng, geom, now)?;
            return self.renderer.flush();
        }

        self.renderer.show_status(tweet, favorite, geom, now, 0)?;
        self.renderer.end_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Zone;
    use crate::feeds::playback;
    use crate::filter::ngword::NgWordEntry;
    use crate::ui::color::{ColorMode, Palette};
    use crate::ui::geometry::{FontOverride, Metrics, MetricsProbe};
    use crate::ui::output::{Output, OutputEncoding};
    use chrono::TimeZone;

    struct FixedProbe;

    impl MetricsProbe for FixedProbe {
        fn probe(&self) -> Option<Metrics> {
            Some(Metrics {
                columns: 40,
                cell_width: Some(7),
                cell_height: Some(14),
            })
        }
    }

    fn pipeline() -> Pipeline<Vec<u8>> {
        let renderer = Renderer::new(
            Output::new(Vec::new(), OutputEncoding::Utf8),
            Palette::new(ColorMode::Ansi256, false),
            Zone::utc(),
        );
        let monitor = GeometryMonitor::new(Box::new(FixedProbe), FontOverride::default());
        Pipeline::new(renderer, monitor)
            .with_clock(Utc.with_ymd_and_hms(2016, 2, 24, 12, 0, 0).unwrap())
    }

    fn output(p: Pipeline<Vec<u8>>) -> String {
        String::from_utf8(p.into_renderer().into_output().into_inner()).unwrap()
    }

    fn ngwords(pattern: &str) -> NgWords {
        NgWords::from_entries(&[NgWordEntry {
            pattern: pattern.to_string(),
            user: String::new(),
        }])
        .with_zone(Zone::utc())
    }

    const STREAM: &[&str] = &[
        r#"{"friends":[1,2,3]}"#,
        r#"{"text":"first post with a fairly long body that has to wrap","user":{"id_str":"1","screen_name":"ann","name":"Ann"},"timestamp_ms":"1456308000000"}"#,
        "not json at all",
        r#"{"event":"follow","source":{"screen_name":"cat","name":"Cat"},"target":{"screen_name":"ann","name":"Ann"},"timestamp_ms":"1456308060000"}"#,
        r#"{"event":"favorite","source":{"screen_name":"cat","name":"Cat"},"target":{"screen_name":"ann"},"target_object":{"text":"liked","user":{"id_str":"1","screen_name":"ann","name":"Ann"}},"timestamp_ms":"1456308120000"}"#,
        r#"{"text":"spoiler alert","user":{"id_str":"2","screen_name":"bob","name":"Bob"}}"#,
    ];

    #[test]
    fn test_replay_matches_live_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.json");

        let mut live = pipeline()
            .with_ngwords(ngwords("spoiler"))
            .with_recorder(Recorder::open(&path).unwrap());
        live.run(STREAM.iter().map(|s| s.to_string())).unwrap();
        let live_out = output(live);

        let mut replay = pipeline().with_ngwords(ngwords("spoiler"));
        replay
            .run(playback::lines(playback::open(&path).unwrap()))
            .unwrap();
        let replay_out = output(replay);

        assert!(!live_out.is_empty());
        assert_eq!(live_out, replay_out);
        assert!(live_out.contains("NG:spoiler"));
        assert!(live_out.contains("followed"));
        assert!(live_out.contains("Cat @cat favorited"));
    }

    #[test]
    fn test_mute_takes_priority_over_ng() {
        let mut mutes = MuteRegistry::new();
        mutes.add("2");
        let mut p = pipeline().with_mutes(mutes).with_ngwords(ngwords("spoiler"));

        p.process_line(r#"{"text":"spoiler","user":{"id_str":"2","screen_name":"bob"}}"#)
            .unwrap();
        p.process_line(
            r#"{"text":"RT spoiler","user":{"id_str":"9","screen_name":"eve"},
                "retweeted_status":{"text":"spoiler","user":{"id_str":"2","screen_name":"bob"}}}"#,
        )
        .unwrap();

        assert_eq!(output(p), "");
    }

    #[test]
    fn test_mute_events_update_registry() {
        let mut p = pipeline();
        p.process_line(r#"{"event":"mute","target":{"id_str":"7"}}"#).unwrap();
        assert!(p.mutes().contains("7"));

        p.process_line(r#"{"text":"hidden","user":{"id_str":"7"}}"#).unwrap();
        assert!(p.renderer().output().get_ref().is_empty());

        p.process_line(r#"{"event":"unmute","target":{"id_str":"7"}}"#).unwrap();
        p.process_line(r#"{"text":"visible","user":{"id_str":"7"}}"#).unwrap();
        assert!(output(p).contains("visible"));
    }

    #[test]
    fn test_unrecognized_input_produces_nothing() {
        let mut p = pipeline();
        for line in ["[1,2]", "{}", r#"{"event":"unfollow"}"#, r#"{"delete":{}}"#, "{"] {
            p.process_line(line).unwrap();
        }
        assert_eq!(output(p), "");
    }

    #[test]
    fn test_status_is_wrapped_to_terminal_width() {
        let mut p = pipeline();
        p.process_line(&format!(
            r#"{{"text":"{}","user":{{"id_str":"1"}}}}"#,
            "x".repeat(60)
        ))
        .unwrap();
        let out = output(p);
        // 40 columns minus a 7-column margin leaves 33 per line.
        assert!(out.contains(&format!("\x1b[7C{}\n\x1b[7C", "x".repeat(33))));
    }
}
