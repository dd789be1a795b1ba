use crate::clock::Zone;
use crate::twitter_message::{Timestamped, Tweet, User};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc, Weekday};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid regex in NG word {pattern:?}: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("malformed %LIVE rule {0:?}, expected %LIVE,<weekday>,<HH:MM>,<HH:MM>")]
    Live(String),
    #[error("malformed %DELAY rule {0:?}, expected %DELAY,<hours>[d],<pattern>")]
    Delay(String),
    #[error("invalid user scope {0:?}, expected \"\", \"id:<digits>\" or \"@<handle>\"")]
    Scope(String),
}

#[derive(Debug, Deserialize)]
struct NgWordFile {
    #[serde(default)]
    ngword_list: Vec<NgWordEntry>,
}

/// One entry of the rule store as written on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct NgWordEntry {
    #[serde(alias = "ngword")]
    pub pattern: String,
    #[serde(default)]
    pub user: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserScope {
    Any,
    Id(String),
    Handle(String),
}

impl UserScope {
    fn parse(text: &str) -> Result<Self, RuleError> {
        if text.is_empty() {
            return Ok(UserScope::Any);
        }
        if let Some(id) = text.strip_prefix("id:") {
            if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
                return Ok(UserScope::Id(id.to_string()));
            }
        } else if let Some(handle) = text.strip_prefix('@') {
            if let Some(handle) = handle.split_whitespace().next() {
                return Ok(UserScope::Handle(handle.to_string()));
            }
        }
        Err(RuleError::Scope(text.to_string()))
    }

    fn is_any(&self) -> bool {
        matches!(self, UserScope::Any)
    }

    fn matches(&self, user: &User) -> bool {
        match self {
            UserScope::Any => true,
            UserScope::Id(id) => *id == user.id_str,
            UserScope::Handle(handle) => *handle == user.screen_name,
        }
    }
}

impl fmt::Display for UserScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserScope::Any => f.write_str("*"),
            UserScope::Id(id) => write!(f, "id:{id}"),
            UserScope::Handle(handle) => write!(f, "@{handle}"),
        }
    }
}

/// A weekly window. An end past 24:00 spills into the following day as a
/// second window starting at 00:00.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    weekday: Weekday,
    start: u32,
    end: u32,
    spill_end: Option<u32>,
}

impl TimeWindow {
    fn parse(directive: &str) -> Result<Self, RuleError> {
        let err = || RuleError::Live(directive.to_string());
        let mut fields = directive.splitn(5, ',').skip(1);
        let weekday: Weekday = fields
            .next()
            .and_then(|w| w.trim().parse().ok())
            .ok_or_else(err)?;
        let start = fields.next().and_then(parse_clock).ok_or_else(err)?;
        let end = fields.next().and_then(parse_clock).ok_or_else(err)?;
        if start >= MINUTES_PER_DAY || end > 2 * MINUTES_PER_DAY {
            return Err(err());
        }

        let (end, spill_end) = if end > MINUTES_PER_DAY {
            (MINUTES_PER_DAY, Some(end - MINUTES_PER_DAY))
        } else {
            (end, None)
        };
        Ok(TimeWindow {
            weekday,
            start,
            end,
            spill_end,
        })
    }

    pub fn contains(&self, weekday: Weekday, minute: u32) -> bool {
        if weekday == self.weekday && self.start <= minute && minute < self.end {
            return true;
        }
        self.spill_end
            .is_some_and(|end| weekday == self.weekday.succ() && minute < end)
    }
}

/// `HH:MM` as minutes since midnight; hours may exceed 23.
fn parse_clock(text: &str) -> Option<u32> {
    let (h, m) = text.trim().split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    (m < 60).then_some(h * 60 + m)
}

#[derive(Debug, Clone)]
pub enum RuleKind {
    /// Case-insensitive regex over the tweet body.
    Plain(Regex),
    /// Regex over the client label. Unlike body rules this match is
    /// case-sensitive.
    Source(Regex),
    TimeWindow(TimeWindow),
    /// Body regex that only applies while the tweet is younger than `window`.
    Delay { window: Duration, body: Regex },
}

impl RuleKind {
    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::Plain(_) => "plain",
            RuleKind::Source(_) => "source",
            RuleKind::TimeWindow(_) => "live",
            RuleKind::Delay { .. } => "delay",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NgRule {
    pub pattern: String,
    pub scope: UserScope,
    pub kind: RuleKind,
}

fn body_regex(pattern: &str) -> Result<Regex, RuleError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|source| RuleError::Regex {
            pattern: pattern.to_string(),
            source,
        })
}

/// `%DELAY` span: hours, or days with a `d` suffix. Negative spans and spans
/// longer than the representable calendar are rejected.
fn delay_window(span: &str) -> Option<Duration> {
    let hours = match span.strip_suffix('d') {
        Some(days) => days.parse::<i64>().ok()?.checked_mul(24)?,
        None => span.parse::<i64>().ok()?,
    };
    let window = Duration::try_hours(hours).filter(|w| *w >= Duration::zero())?;
    DateTime::<Utc>::MIN_UTC.checked_add_signed(window)?;
    Some(window)
}

impl NgRule {
    /// Decode an entry once; the directive prefix picks the rule kind.
    pub fn parse(entry: &NgWordEntry) -> Result<Self, RuleError> {
        let pattern = entry.pattern.as_str();
        let scope = UserScope::parse(&entry.user)?;

        let kind = if pattern.starts_with("%LIVE,") {
            RuleKind::TimeWindow(TimeWindow::parse(pattern)?)
        } else if let Some(source) = pattern.strip_prefix("%SOURCE,") {
            RuleKind::Source(Regex::new(source).map_err(|source_err| RuleError::Regex {
                pattern: pattern.to_string(),
                source: source_err,
            })?)
        } else if let Some(rest) = pattern.strip_prefix("%DELAY,") {
            let (span, body) = rest
                .split_once(',')
                .ok_or_else(|| RuleError::Delay(pattern.to_string()))?;
            let window = delay_window(span).ok_or_else(|| RuleError::Delay(pattern.to_string()))?;
            RuleKind::Delay {
                window,
                body: body_regex(body)?,
            }
        } else {
            RuleKind::Plain(body_regex(pattern)?)
        };

        Ok(NgRule {
            pattern: pattern.to_string(),
            scope,
            kind,
        })
    }

    fn matches_body(&self, status: &Tweet, zone: Zone, now: DateTime<Utc>) -> bool {
        match &self.kind {
            RuleKind::Plain(re) => re.is_match(&status.text),
            RuleKind::Source(re) => re.is_match(&status.source),
            RuleKind::TimeWindow(window) => status.posted_at().is_some_and(|t| {
                let (weekday, minute) = zone.weekday_minute(t);
                window.contains(weekday, minute)
            }),
            RuleKind::Delay { window, body } => {
                body.is_match(&status.text)
                    && status.posted_at().is_some_and(|t| {
                        // A deadline past the end of the calendar never arrives.
                        t.checked_add_signed(*window).map_or(true, |end| now < end)
                    })
            }
        }
    }

    /// Retweets scoped to the retweeting account also expose its name and handle.
    fn matches_retweet(
        &self,
        retweeted: &Tweet,
        retweeter: &User,
        zone: Zone,
        now: DateTime<Utc>,
    ) -> bool {
        if self.matches_body(retweeted, zone, now) {
            return true;
        }
        match &self.kind {
            RuleKind::Plain(re) => {
                re.is_match(&retweeter.screen_name) || re.is_match(&retweeter.name)
            }
            _ => false,
        }
    }

    /// The user the hit is attributed to, if this rule matches `status`.
    fn evaluate<'a>(&self, status: &'a Tweet, zone: Zone, now: DateTime<Utc>) -> Option<&'a User> {
        if let Some(rt) = status.retweeted_status.as_deref() {
            if self.scope.is_any() {
                if self.matches_body(rt, zone, now) {
                    return Some(&rt.user);
                }
            } else {
                if self.scope.matches(&status.user)
                    && self.matches_retweet(rt, &status.user, zone, now)
                {
                    return Some(&status.user);
                }
                if self.scope.matches(&rt.user) && self.matches_body(rt, zone, now) {
                    return Some(&rt.user);
                }
            }
        } else if self.scope.matches(&status.user) && self.matches_body(status, zone, now) {
            return Some(&status.user);
        }

        let quoted = status.quoted_status.as_deref()?;
        (self.scope.matches(&status.user) && self.matches_body(quoted, zone, now))
            .then_some(&status.user)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NgMatch {
    pub user: User,
    pub pattern: String,
}

/// The loaded rule list, immutable for the rest of the run.
#[derive(Debug, Clone, Default)]
pub struct NgWords {
    rules: Vec<NgRule>,
    zone: Zone,
}

impl NgWords {
    /// Load the rule store. A missing file means no rules; entries that fail to
    /// decode are skipped with a warning.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("no NG word file at {}", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading NG word file {}", path.display()))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let file: NgWordFile = serde_json::from_str(&text)
            .with_context(|| format!("parsing NG word file {}", path.display()))?;
        Ok(Self::from_entries(&file.ngword_list))
    }

    pub fn from_entries(entries: &[NgWordEntry]) -> Self {
        let rules = entries
            .iter()
            .filter_map(|entry| match NgRule::parse(entry) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::warn!("ignoring NG word: {e}");
                    None
                }
            })
            .collect();
        Self {
            rules,
            zone: Zone::default(),
        }
    }

    pub fn with_zone(mut self, zone: Zone) -> Self {
        self.zone = zone;
        self
    }

    pub fn rules(&self) -> &[NgRule] {
        &self.rules
    }

    /// First rule in declaration order that matches wins.
    pub fn match_tweet(&self, status: &Tweet, now: DateTime<Utc>) -> Option<NgMatch> {
        self.rules.iter().find_map(|rule| {
            rule.evaluate(status, self.zone, now).map(|user| NgMatch {
                user: user.clone(),
                pattern: rule.pattern.clone(),
            })
        })
    }
}
