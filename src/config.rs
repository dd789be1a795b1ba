//! Runtime configuration.
//!
//! Values are layered, later layers winning:
//! 1. Built-in defaults
//! 2. Config file (`<config_dir>/tweetsixel/config.toml`)
//! 3. Command-line flags

use crate::ui::color::ColorMode;
use crate::ui::geometry::FontOverride;
use crate::ui::output::OutputEncoding;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.twitter.com/1.1";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Config file layout. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub display: FileDisplay,
    pub paths: FilePaths,
    pub api: FileApi,
    pub log_level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileDisplay {
    pub color_mode: Option<u32>,
    pub white_background: Option<bool>,
    pub font: Option<String>,
    pub protect: Option<bool>,
    pub no_image: Option<bool>,
    pub encoding: Option<OutputEncoding>,
    pub max_image_count: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FilePaths {
    pub base_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub ngword_file: Option<PathBuf>,
    pub token_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileApi {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Settings given on the command line. Flags that are off leave the file
/// value alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub color_mode: Option<u32>,
    pub font: Option<String>,
    pub white_background: bool,
    pub no_image: bool,
    pub protect: bool,
    pub encoding: Option<OutputEncoding>,
    pub max_image_count: Option<usize>,
    pub token_file: Option<PathBuf>,
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub color_mode: ColorMode,
    pub white_background: bool,
    pub font: FontOverride,
    pub protect: bool,
    pub no_image: bool,
    pub encoding: OutputEncoding,
    /// Images per row before wrapping; zero fills the terminal width.
    pub max_image_count: usize,
    pub cache_dir: PathBuf,
    pub ngword_file: PathBuf,
    pub token_file: PathBuf,
    pub api_url: String,
    pub timeout: Duration,
    pub log_level: Option<String>,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tweetsixel").join("config.toml"))
    }

    fn default_base_dir() -> PathBuf {
        dirs::data_dir()
            .map(|p| p.join("tweetsixel"))
            .unwrap_or_else(|| PathBuf::from(".tweetsixel"))
    }

    /// Load `path`, or the default location when none is given. An explicitly
    /// named file must exist; the default one is optional.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let file = match path {
            Some(path) => Self::read_file(path)?,
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::read_file(&path)?,
                _ => FileConfig::default(),
            },
        };
        Self::resolve(file, overrides)
    }

    fn read_file(path: &Path) -> Result<FileConfig> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn resolve(file: FileConfig, overrides: &Overrides) -> Result<Self> {
        let depth = overrides.color_mode.or(file.display.color_mode);
        let color_mode = match depth {
            None => ColorMode::default(),
            Some(depth) => match ColorMode::from_depth(depth) {
                Some(mode) => mode,
                None => bail!("color mode must be 2, 16 or 256, got {depth}"),
            },
        };

        let font = match overrides.font.as_deref().or(file.display.font.as_deref()) {
            None => FontOverride::default(),
            Some(text) => match FontOverride::parse(text) {
                Some(font) => font,
                None => bail!("font size must look like WxH, got {text:?}"),
            },
        };

        let base_dir = file.paths.base_dir.unwrap_or_else(Self::default_base_dir);
        let cache_dir = file
            .paths
            .cache_dir
            .unwrap_or_else(|| base_dir.join("cache"));
        let ngword_file = file
            .paths
            .ngword_file
            .unwrap_or_else(|| base_dir.join("ngword.json"));
        let token_file = overrides
            .token_file
            .clone()
            .or(file.paths.token_file)
            .unwrap_or_else(|| base_dir.join("token.json"));

        Ok(Self {
            color_mode,
            white_background: overrides.white_background
                || file.display.white_background.unwrap_or(false),
            font,
            protect: overrides.protect || file.display.protect.unwrap_or(false),
            no_image: overrides.no_image || file.display.no_image.unwrap_or(false),
            encoding: overrides
                .encoding
                .or(file.display.encoding)
                .unwrap_or_default(),
            max_image_count: overrides
                .max_image_count
                .or(file.display.max_image_count)
                .unwrap_or(0),
            cache_dir,
            ngword_file,
            token_file,
            api_url: file
                .api
                .base_url
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            timeout: Duration::from_secs(file.api.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            log_level: file.log_level,
        })
    }
}

/// Access token pair for the remote API.
#[derive(Debug, Clone, Deserialize)]
pub struct Token {
    pub token: String,
    #[serde(default)]
    pub secret: String,
}

impl Token {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading token file {}", path.display()))?;
        let token: Token = serde_json::from_str(&text)
            .with_context(|| format!("parsing token file {}", path.display()))?;
        if token.token.is_empty() {
            bail!("token file {} has an empty token", path.display());
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> FileConfig {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(FileConfig::default(), &Overrides::default()).unwrap();
        assert_eq!(config.color_mode, ColorMode::Ansi256);
        assert_eq!(config.encoding, OutputEncoding::Utf8);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.cache_dir.ends_with("cache"));
        assert!(!config.protect);
        assert_eq!(config.max_image_count, 0);
    }

    #[test]
    fn test_file_values() {
        let file = parse(
            r#"
            log_level = "debug"

            [display]
            color_mode = 16
            white_background = true
            font = "8x16"
            encoding = "euc-jp"
            max_image_count = 2

            [paths]
            base_dir = "/srv/ts"
            ngword_file = "/etc/ng.json"

            [api]
            timeout_secs = 3
            "#,
        );
        let config = Config::resolve(file, &Overrides::default()).unwrap();
        assert_eq!(config.color_mode, ColorMode::Ansi16);
        assert!(config.white_background);
        assert_eq!(config.font.height, Some(16));
        assert_eq!(config.encoding, OutputEncoding::EucJp);
        assert_eq!(config.max_image_count, 2);
        assert_eq!(config.cache_dir, PathBuf::from("/srv/ts/cache"));
        assert_eq!(config.ngword_file, PathBuf::from("/etc/ng.json"));
        assert_eq!(config.token_file, PathBuf::from("/srv/ts/token.json"));
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_flags_override_file() {
        let file = parse(
            "[display]\ncolor_mode = 16\nencoding = \"euc-jp\"\nmax_image_count = 4\n",
        );
        let overrides = Overrides {
            color_mode: Some(2),
            encoding: Some(OutputEncoding::Iso2022Jp),
            max_image_count: Some(1),
            protect: true,
            token_file: Some(PathBuf::from("/tmp/t.json")),
            ..Overrides::default()
        };
        let config = Config::resolve(file, &overrides).unwrap();
        assert_eq!(config.color_mode, ColorMode::Mono);
        assert_eq!(config.encoding, OutputEncoding::Iso2022Jp);
        assert_eq!(config.max_image_count, 1);
        assert!(config.protect);
        assert_eq!(config.token_file, PathBuf::from("/tmp/t.json"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_color = Overrides {
            color_mode: Some(8),
            ..Overrides::default()
        };
        assert!(Config::resolve(FileConfig::default(), &bad_color).is_err());

        let bad_font = parse("[display]\nfont = \"big\"\n");
        assert!(Config::resolve(bad_font, &Overrides::default()).is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load(Some(&missing), &Overrides::default()).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[display]\nno_image = true\n").unwrap();
        let config = Config::load(Some(&path), &Overrides::default()).unwrap();
        assert!(config.no_image);
    }

    #[test]
    fn test_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"token":"abc","secret":"xyz"}"#).unwrap();
        let token = Token::load(&path).unwrap();
        assert_eq!(token.token, "abc");
        assert_eq!(token.secret, "xyz");

        std::fs::write(&path, r#"{"token":""}"#).unwrap();
        assert!(Token::load(&path).is_err());
        assert!(Token::load(&dir.path().join("missing.json")).is_err());
    }
}
