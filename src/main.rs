use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::io::{self, BufWriter, StdoutLock, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tweetsixel::clock::Zone;
use tweetsixel::config::{Config, Overrides, Token};
use tweetsixel::feeds::mutes::HttpMuteSource;
use tweetsixel::feeds::playback;
use tweetsixel::feeds::record::Recorder;
use tweetsixel::filter::{MuteRegistry, NgWords};
use tweetsixel::pipeline::Pipeline;
use tweetsixel::ui::color::Palette;
use tweetsixel::ui::geometry::{GeometryMonitor, TerminalProbe};
use tweetsixel::ui::image_cache::{evict_expired, ImageCache};
use tweetsixel::ui::output::{Output, OutputEncoding};
use tweetsixel::ui::sixel::SixelEncoder;
use tweetsixel::ui::Renderer;

/// Render a tweet stream in the terminal with inline sixel images
#[derive(Parser)]
#[command(name = "tweetsixel", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: <config_dir>/tweetsixel/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Color depth: 2, 16 or 256
    #[arg(long, global = true)]
    color: Option<u32>,

    /// Font cell size in pixels, e.g. 7x14
    #[arg(long, global = true, value_name = "WxH")]
    font: Option<String>,

    /// Use colors suited to a white background
    #[arg(long, global = true)]
    white: bool,

    /// Do not show images
    #[arg(long, global = true)]
    noimg: bool,

    /// Hide tweets from protected accounts
    #[arg(long, global = true)]
    protect: bool,

    /// Append every received event to this file
    #[arg(long, global = true, value_name = "FILE")]
    record: Option<PathBuf>,

    /// Most images shown side by side in one row (0: as many as fit)
    #[arg(long, global = true, value_name = "N")]
    max_image_count: Option<usize>,

    /// Write output as EUC-JP
    #[arg(long, global = true, conflicts_with = "jis")]
    eucjp: bool,

    /// Write output as ISO-2022-JP
    #[arg(long, global = true)]
    jis: bool,

    /// Token file for the remote API
    #[arg(long, global = true, value_name = "FILE")]
    token: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Render live events read from stdin, one JSON object per line
    Stream,
    /// Replay a recorded stream
    Play {
        /// Recording to replay, or - for stdin
        file: PathBuf,
    },
    /// Print the ids of muted users
    Mutelist,
    /// Print the NG word rules as they were understood
    Ngword,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        let encoding = if self.jis {
            Some(OutputEncoding::Iso2022Jp)
        } else if self.eucjp {
            Some(OutputEncoding::EucJp)
        } else {
            None
        };
        Overrides {
            color_mode: self.color,
            font: self.font.clone(),
            white_background: self.white,
            no_image: self.noimg,
            protect: self.protect,
            encoding,
            max_image_count: self.max_image_count,
            token_file: self.token.clone(),
        }
    }
}

fn init_logging(verbose: u8, configured: Option<&str>) {
    let default_filter = match verbose {
        0 => configured.unwrap_or("warn"),
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // stdout carries the rendered stream, so logs go to stderr.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref(), &cli.overrides())?;
    init_logging(cli.verbose, config.log_level.as_deref());
    tracing::debug!(?config, "configuration loaded");

    match &cli.command {
        Command::Stream => stream(&config, cli.record.as_deref()),
        Command::Play { file } => play(&config, file, cli.record.as_deref()),
        Command::Mutelist => mutelist(&config),
        Command::Ngword => ngword(&config),
    }
}

fn load_mutes(config: &Config) -> Result<MuteRegistry> {
    let token = Token::load(&config.token_file)?;
    let source = HttpMuteSource::new(config.api_url.clone(), token.token, config.timeout);
    let mut mutes = MuteRegistry::new();
    mutes.refresh(&source)?;
    Ok(mutes)
}

fn prepare_cache(dir: &Path) {
    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::warn!("cannot create cache directory {}: {e}", dir.display());
        return;
    }
    match evict_expired(dir, SystemTime::now()) {
        Ok(0) => {}
        Ok(n) => tracing::info!("evicted {n} cached images"),
        Err(e) => tracing::warn!("cache eviction failed: {e}"),
    }
}

fn build_pipeline(
    config: &Config,
    record: Option<&Path>,
) -> Result<Pipeline<BufWriter<StdoutLock<'static>>>> {
    let out = Output::new(BufWriter::new(io::stdout().lock()), config.encoding);
    let palette = Palette::new(config.color_mode, config.white_background);
    let mut renderer = Renderer::new(out, palette, Zone::Local)
        .with_protect(config.protect)
        .with_max_image_count(config.max_image_count);
    if !config.no_image {
        let encoder = SixelEncoder::new(config.color_mode, config.timeout);
        renderer = renderer.with_images(ImageCache::new(config.cache_dir.clone(), Box::new(encoder)));
    }

    let monitor = GeometryMonitor::new(Box::new(TerminalProbe), config.font);
    monitor.watch_resize();

    let ngwords = NgWords::load(&config.ngword_file)?;
    tracing::info!(rules = ngwords.rules().len(), "NG words loaded");

    let mut pipeline = Pipeline::new(renderer, monitor).with_ngwords(ngwords);
    if let Some(path) = record {
        pipeline = pipeline.with_recorder(Recorder::open(path)?);
    }
    Ok(pipeline)
}

fn stream(config: &Config, record: Option<&Path>) -> Result<()> {
    prepare_cache(&config.cache_dir);
    let mutes = load_mutes(config)?;
    let mut pipeline = build_pipeline(config, record)?.with_mutes(mutes);
    pipeline.run(playback::lines(io::stdin().lock()))
}

fn play(config: &Config, file: &Path, record: Option<&Path>) -> Result<()> {
    let source = playback::open(file)?;
    let mut pipeline = build_pipeline(config, record)?;
    pipeline.run(playback::lines(source))
}

fn mutelist(config: &Config) -> Result<()> {
    let mutes = load_mutes(config)?;
    let mut ids: Vec<&str> = mutes.ids().collect();
    ids.sort_unstable();

    let mut out = io::stdout().lock();
    for id in ids {
        writeln!(out, "{id}").context("writing mute list")?;
    }
    Ok(())
}

fn ngword(config: &Config) -> Result<()> {
    let ngwords = NgWords::load(&config.ngword_file)?;
    let mut out = io::stdout().lock();
    for rule in ngwords.rules() {
        writeln!(out, "{}\t{}\t{}", rule.kind.name(), rule.scope, rule.pattern)
            .context("writing NG word list")?;
    }
    Ok(())
}
