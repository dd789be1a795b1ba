use super::color::ColorMode;
use super::image_cache::ImageEncoder;
use anyhow::{Context, Result};
use image::{imageops::FilterType, Rgb, RgbImage};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::time::Duration;

const DCS_START: &str = "\x1bPq";
const DCS_END: &str = "\x1b\\";

/// The sixteen colors of a typical terminal, in SGR order.
const ANSI16: [[u8; 3]; 16] = [
    [0, 0, 0],
    [205, 0, 0],
    [0, 205, 0],
    [205, 205, 0],
    [0, 0, 238],
    [205, 0, 205],
    [0, 205, 205],
    [229, 229, 229],
    [127, 127, 127],
    [255, 0, 0],
    [0, 255, 0],
    [255, 255, 0],
    [92, 92, 255],
    [255, 0, 255],
    [0, 255, 255],
    [255, 255, 255],
];

/// Downloads an image and turns it into a sixel stream.
pub struct SixelEncoder {
    client: reqwest::blocking::Client,
    mode: ColorMode,
}

impl SixelEncoder {
    pub fn new(mode: ColorMode, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tweetsixel/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self { client, mode }
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("failed to fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("bad response for {url}"))?;
        Ok(response.bytes()?.to_vec())
    }
}

impl ImageEncoder for SixelEncoder {
    fn encode(&self, url: &str, width: Option<u32>) -> Result<Vec<u8>> {
        let bytes = self.fetch(url)?;
        let img = image::load_from_memory(&bytes)
            .with_context(|| format!("failed to decode image from {url}"))?;

        let img = match width {
            Some(w) if w > 0 && w != img.width() && img.width() > 0 => {
                let h = (u64::from(img.height()) * u64::from(w) / u64::from(img.width())).max(1);
                img.resize_exact(w, h as u32, FilterType::Triangle)
            }
            _ => img,
        };

        Ok(encode_sixel(&img.to_rgb8(), self.mode).into_bytes())
    }
}

/// Palette entry for `pixel` in the given mode.
fn quantize(pixel: &Rgb<u8>, mode: ColorMode) -> usize {
    let [r, g, b] = pixel.0;
    match mode {
        ColorMode::Mono => {
            let luma = (299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b)) / 1000;
            usize::from(luma >= 128)
        }
        ColorMode::Ansi16 => ANSI16
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| {
                let d = |a: u8, b: u8| (i32::from(a) - i32::from(b)).pow(2);
                d(c[0], r) + d(c[1], g) + d(c[2], b)
            })
            .map(|(i, _)| i)
            .unwrap_or(0),
        ColorMode::Ansi256 => {
            let level = |v: u8| (usize::from(v) * 5 + 127) / 255;
            level(r) * 36 + level(g) * 6 + level(b)
        }
    }
}

/// Palette entry as sixel RGB percentages.
fn palette_rgb(index: usize, mode: ColorMode) -> [u32; 3] {
    let percent = |v: u8| u32::from(v) * 100 / 255;
    match mode {
        ColorMode::Mono => {
            let v = if index == 0 { 0 } else { 100 };
            [v; 3]
        }
        ColorMode::Ansi16 => {
            let [r, g, b] = ANSI16[index.min(15)];
            [percent(r), percent(g), percent(b)]
        }
        ColorMode::Ansi256 => {
            let level = |n: usize| (n as u32) * 100 / 5;
            [level(index / 36), level(index / 6 % 6), level(index % 6)]
        }
    }
}

/// Encode `img` as a sixel stream using the mode's fixed palette.
pub fn encode_sixel(img: &RgbImage, mode: ColorMode) -> String {
    let (width, height) = img.dimensions();
    let mut out = String::new();
    if width == 0 || height == 0 {
        return out;
    }

    let indices: Vec<usize> = img.pixels().map(|p| quantize(p, mode)).collect();
    let at = |x: u32, y: u32| indices[(y * width + x) as usize];

    let _ = write!(out, "{DCS_START}\"1;1;{width};{height}");
    let used: BTreeSet<usize> = indices.iter().copied().collect();
    for &color in &used {
        let [r, g, b] = palette_rgb(color, mode);
        let _ = write!(out, "#{color};2;{r};{g};{b}");
    }

    for top in (0..height).step_by(6) {
        let rows = (height - top).min(6);
        let band_colors: BTreeSet<usize> = (0..rows)
            .flat_map(|dy| (0..width).map(move |x| (x, top + dy)))
            .map(|(x, y)| at(x, y))
            .collect();

        for color in band_colors {
            let line: Vec<u8> = (0..width)
                .map(|x| {
                    let bits = (0..rows)
                        .filter(|&dy| at(x, top + dy) == color)
                        .fold(0u8, |acc, dy| acc | (1u8 << dy));
                    b'?' + bits
                })
                .collect();
            let _ = write!(out, "#{color}");
            push_run_length(&mut out, &line);
            out.push('$');
        }
        out.push('-');
    }

    out.push_str(DCS_END);
    out
}

/// Pixel width and height from the `"Pan;Pad;Ph;Pv` raster attributes near
/// the start of a sixel stream.
pub fn raster_size(data: &[u8]) -> Option<(u32, u32)> {
    let start = data.iter().position(|&b| b == b'"')? + 1;
    let mut fields = data[start..].split(|&b| b == b';').skip(2);
    let width = leading_number(fields.next()?)?;
    let height = leading_number(fields.next()?)?;
    (width > 0 && height > 0).then_some((width, height))
}

fn leading_number(field: &[u8]) -> Option<u32> {
    let digits = field.iter().take_while(|b| b.is_ascii_digit()).count();
    std::str::from_utf8(&field[..digits]).ok()?.parse().ok()
}

fn push_run_length(out: &mut String, line: &[u8]) {
    // Blank columns at the end of a color row draw nothing.
    let end = line.iter().rposition(|&c| c != b'?').map_or(0, |i| i + 1);
    let line = &line[..end];

    let mut i = 0;
    while i < line.len() {
        let c = line[i];
        let run = line[i..].iter().take_while(|&&d| d == c).count();
        if run > 3 {
            let _ = write!(out, "!{run}{}", c as char);
        } else {
            for _ in 0..run {
                out.push(c as char);
            }
        }
        i += run;
    }
}
