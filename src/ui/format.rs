use super::color::{Palette, Role};
use crate::twitter_message::{Tweet, UrlEntity};
use regex::{Captures, Regex};
use std::sync::LazyLock;

// Pattern statics hold `None` only if a literal fails to compile; callers
// then skip that step.
static MENTION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(^|[^A-Za-z0-9])(@[A-Za-z0-9_]+)").ok());
static TAGS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]*>").ok());

/// External image hosts we know how to turn into a thumbnail URL.
static IMAGE_HOSTS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"twitpic\.com/(\w+)", "http://twitpic.com/show/mini/$1"),
        (
            r"movapic\.com/(?:pic/)?(\w+)",
            "http://image.movapic.com/pic/t_$1.jpeg",
        ),
        (r"p\.twipple\.jp/(\w+)", "http://p.twpl.jp/show/thumb/$1"),
        (r"(.*instagram\.com/p/[\w\-]+)/?", "$1/media/?size=t"),
    ]
    .into_iter()
    .filter_map(|(pattern, target)| Some((Regex::new(pattern).ok()?, target)))
    .collect()
});
static IMAGE_FILE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\.(jpg|jpeg|png|gif)$").ok());

/// An image to render below the tweet text.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaDescriptor {
    pub short_url: String,
    pub display_url: String,
    pub target_url: String,
    /// Requested pixel width; `None` leaves the encoder's native size.
    pub width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormattedText {
    pub text: String,
    pub media: Vec<MediaDescriptor>,
}

/// Build the colorized body of `status` and collect its images.
///
/// Hashtag offsets refer to the untouched text, so hashtags are colored
/// before anything else rewrites it.
pub fn format_message(status: &Tweet, palette: &Palette, image_size: u32) -> FormattedText {
    let mut media = Vec::new();

    let mut text = color_hashtags(status, palette);
    text = unescape(&text).replace("\r\n", "\n").replace('\r', "\n");

    if let Some(mention) = MENTION.as_ref() {
        text = mention
            .replace_all(&text, |caps: &Captures| {
                format!("{}{}", &caps[1], palette.paint(&caps[2], Role::UserId))
            })
            .into_owned();
    }

    for url in &status.entities.urls {
        if url.url.is_empty() {
            continue;
        }
        if is_quote_link(status, url, &text) {
            text = text.replace(&url.url, "");
        } else {
            text = text.replace(&url.url, &palette.paint(&url.display_url, Role::Url));
        }

        if let Some(descriptor) = image_host_media(url, image_size) {
            media.push(descriptor);
        }
    }

    for m in status.media() {
        text = text.replace(&m.url, &palette.paint(&m.display_url, Role::Url));

        let size = m.sizes.small;
        let width = if size.h > size.w {
            (u64::from(size.w) * u64::from(image_size) / u64::from(size.h)) as u32
        } else {
            image_size
        };
        media.push(MediaDescriptor {
            short_url: m.url.clone(),
            display_url: m.display_url.clone(),
            target_url: format!("{}:small", m.media_url),
            width: Some(width),
        });
    }

    FormattedText { text, media }
}

fn color_hashtags(status: &Tweet, palette: &Palette) -> String {
    let text = status.text.as_str();
    let mut spans: Vec<(usize, usize)> = status
        .entities
        .hashtags
        .iter()
        .map(|h| (h.indices[0], h.indices[1]))
        .filter(|(start, end)| start < end)
        .collect();
    if spans.is_empty() {
        return text.to_string();
    }
    spans.sort_unstable();

    // Byte position of every scalar, plus the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let byte_at = |scalar: usize| bounds[scalar.min(bounds.len() - 1)];

    let mut out = String::with_capacity(text.len() + spans.len() * 16);
    let mut cursor = 0;
    for (start, end) in spans {
        let (start, end) = (byte_at(start), byte_at(end));
        if start < cursor {
            continue;
        }
        out.push_str(&text[cursor..start]);
        out.push_str(&palette.paint(&text[start..end], Role::Tag));
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// The trailing link the platform appends when a tweet quotes another.
fn is_quote_link(status: &Tweet, url: &UrlEntity, text: &str) -> bool {
    let Some(quoted) = status.quoted_status.as_deref() else {
        return false;
    };
    let quoted_id = status
        .quoted_status_id_str
        .as_deref()
        .unwrap_or(&quoted.id_str);
    !quoted_id.is_empty()
        && url.expanded_url.ends_with(&format!("/{quoted_id}"))
        && text.trim_end().ends_with(&url.url)
}

fn image_host_media(url: &UrlEntity, image_size: u32) -> Option<MediaDescriptor> {
    let expanded = url.expanded_url.as_str();

    let (target_url, width) = if let Some((re, target)) =
        IMAGE_HOSTS.iter().find(|(re, _)| re.is_match(expanded))
    {
        let caps = re.captures(expanded)?;
        let mut out = String::new();
        caps.expand(target, &mut out);
        (out, None)
    } else if IMAGE_FILE.as_ref().is_some_and(|re| re.is_match(expanded)) {
        (expanded.to_string(), Some(image_size))
    } else {
        return None;
    };

    Some(MediaDescriptor {
        short_url: url.url.clone(),
        display_url: url.display_url.clone(),
        target_url,
        width,
    })
}

/// Decode the entities the platform escapes in text (quotes are left alone).
pub fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

pub fn format_name(name: &str) -> String {
    unescape(name).replace(['\r', '\n'], " ")
}

pub fn format_id(screen_name: &str) -> String {
    format!("@{screen_name}")
}

/// The client label with its anchor markup removed.
pub fn format_source(source: &str) -> String {
    match TAGS.as_ref() {
        Some(tags) => unescape(&tags.replace_all(source, "")),
        None => unescape(source),
    }
}
