use super::sixel::raster_size;
use anyhow::Result;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const ICON_PREFIX: &str = "icon-";
const MEDIA_PREFIX: &str = "http";
const ICON_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const MEDIA_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
/// Bytes read up front to find the raster attributes.
const HEADER_PEEK: u64 = 4096;

/// Turns an image URL into terminal-ready bytes. An empty result means the
/// image could not be rendered.
pub trait ImageEncoder {
    fn encode(&self, url: &str, width: Option<u32>) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
    pub len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered(CacheEntry),
    NotRenderable,
}

/// A cached image opened for streaming.
pub struct CachedImage {
    pub entry: CacheEntry,
    /// Pixel width and height from the sixel raster attributes, if present.
    pub size: Option<(u32, u32)>,
    head: Vec<u8>,
    file: File,
}

impl CachedImage {
    /// Copy the whole image to `out`.
    pub fn stream_to(mut self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(&self.head)?;
        io::copy(&mut self.file, out)?;
        out.flush()
    }
}

/// Cache key for an avatar: handle, requested size and the URL's file name.
pub fn avatar_key(screen_name: &str, size: u32, url: &str) -> String {
    let filename = url.rsplit('/').next().unwrap_or(url);
    format!("{ICON_PREFIX}{size}x{size}-{screen_name}-{filename}")
}

/// Cache key for inline media: the whole URL with path-hostile characters replaced.
pub fn media_key(url: &str) -> String {
    url.chars()
        .map(|c| match c {
            ':' | '/' | '(' | ')' | '?' | ' ' => '_',
            c => c,
        })
        .collect()
}

/// Encoded images on disk, one file per key. Writers in other processes may
/// race on a key; each write replaces the file atomically and the content is
/// the same either way.
pub struct ImageCache {
    dir: PathBuf,
    encoder: Box<dyn ImageEncoder>,
}

impl ImageCache {
    pub fn new(dir: PathBuf, encoder: Box<dyn ImageEncoder>) -> Self {
        Self { dir, encoder }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.sixel"))
    }

    /// Stream the image for `key` to `out`, encoding and storing it on a miss.
    pub fn render(
        &self,
        out: &mut dyn Write,
        key: &str,
        url: &str,
        width: Option<u32>,
    ) -> io::Result<RenderOutcome> {
        let Some(image) = self.open(key, url, width) else {
            return Ok(RenderOutcome::NotRenderable);
        };
        let entry = image.entry.clone();
        image.stream_to(out)?;
        Ok(RenderOutcome::Rendered(entry))
    }

    /// The image for `key`, encoding and storing it on a miss. `None` when
    /// it cannot be rendered or the cached file cannot be read.
    pub fn open(&self, key: &str, url: &str, width: Option<u32>) -> Option<CachedImage> {
        let entry = self.lookup(key, url, width)?;
        let opened = File::open(&entry.path).and_then(|mut file| {
            let mut head = Vec::new();
            (&mut file).take(HEADER_PEEK).read_to_end(&mut head)?;
            Ok((file, head))
        });
        match opened {
            Ok((file, head)) => Some(CachedImage {
                size: raster_size(&head),
                entry,
                head,
                file,
            }),
            Err(e) => {
                tracing::debug!("cached image {} unreadable: {e}", entry.path.display());
                None
            }
        }
    }

    fn lookup(&self, key: &str, url: &str, width: Option<u32>) -> Option<CacheEntry> {
        let path = self.path_for(key);

        if let Ok(meta) = fs::metadata(&path) {
            if meta.len() > 0 {
                return Some(CacheEntry {
                    key: key.to_string(),
                    path,
                    len: meta.len(),
                });
            }
            // Empty artifacts are never reused.
            let _ = fs::remove_file(&path);
        }

        let bytes = match self.encoder.encode(url, width) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("image {url} not renderable: {e:#}");
                return None;
            }
        };
        if bytes.is_empty() {
            tracing::debug!("image {url} encoded to nothing");
            return None;
        }

        if let Err(e) = self.store(&path, &bytes) {
            tracing::warn!("could not cache {}: {e}", path.display());
            return None;
        }
        Some(CacheEntry {
            key: key.to_string(),
            path,
            len: bytes.len() as u64,
        })
    }

    fn store(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Remove avatars unused for a week and media unused for a day.
/// Returns how many files were deleted.
pub fn evict_expired(dir: &Path, now: SystemTime) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        let max_age = if name.starts_with(ICON_PREFIX) {
            ICON_MAX_AGE
        } else if name.starts_with(MEDIA_PREFIX) {
            MEDIA_MAX_AGE
        } else {
            continue;
        };

        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let Ok(used) = meta.accessed().or_else(|_| meta.modified()) else {
            continue;
        };
        let age = now.duration_since(used).unwrap_or_default();
        if age > max_age && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct ScriptedEncoder {
        results: RefCell<Vec<Vec<u8>>>,
        calls: Rc<RefCell<Vec<(String, Option<u32>)>>>,
    }

    impl ImageEncoder for ScriptedEncoder {
        fn encode(&self, url: &str, width: Option<u32>) -> Result<Vec<u8>> {
            self.calls.borrow_mut().push((url.to_string(), width));
            let mut results = self.results.borrow_mut();
            if results.is_empty() {
                anyhow::bail!("fetch failed");
            }
            Ok(results.remove(0))
        }
    }

    fn cache(dir: &Path, results: Vec<Vec<u8>>) -> (ImageCache, Rc<RefCell<Vec<(String, Option<u32>)>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let encoder = ScriptedEncoder {
            results: RefCell::new(results),
            calls: Rc::clone(&calls),
        };
        (ImageCache::new(dir.to_path_buf(), Box::new(encoder)), calls)
    }

    #[test]
    fn test_keys() {
        assert_eq!(
            avatar_key("alice", 42, "http://pbs.twimg.com/profile_images/1/me_normal.jpg"),
            "icon-42x42-alice-me_normal.jpg"
        );
        assert_eq!(
            media_key("http://x.com/a (1)?s=t"),
            "http___x.com_a__1__s=t"
        );
    }

    #[test]
    fn test_miss_encodes_stores_and_streams() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, calls) = cache(dir.path(), vec![b"SIXEL".to_vec()]);

        let mut out = Vec::new();
        let outcome = cache.render(&mut out, "k", "http://img", Some(60)).unwrap();

        assert_eq!(out, b"SIXEL");
        assert!(matches!(outcome, RenderOutcome::Rendered(ref e) if e.len == 5));
        assert_eq!(fs::read(cache.path_for("k")).unwrap(), b"SIXEL");
        assert_eq!(*calls.borrow(), vec![("http://img".to_string(), Some(60))]);
    }

    #[test]
    fn test_hit_skips_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, calls) = cache(dir.path(), vec![]);
        fs::write(cache.path_for("k"), b"CACHED").unwrap();

        let mut out = Vec::new();
        cache.render(&mut out, "k", "http://img", None).unwrap();
        assert_eq!(out, b"CACHED");
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_hit_larger_than_header_is_streamed_whole() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = cache(dir.path(), vec![]);
        let mut data = b"\x1bPq\"1;1;70;28".to_vec();
        data.resize(3 * HEADER_PEEK as usize + 17, b'~');
        fs::write(cache.path_for("k"), &data).unwrap();

        let image = cache.open("k", "http://img", None).unwrap();
        assert_eq!(image.size, Some((70, 28)));
        assert_eq!(image.entry.len, data.len() as u64);

        let mut out = Vec::new();
        image.stream_to(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_unreadable_hit_is_soft() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = cache(dir.path(), vec![]);
        fs::create_dir(cache.path_for("k")).unwrap();
        fs::write(cache.path_for("k").join("inner"), b"x").unwrap();

        let mut out = Vec::new();
        assert_eq!(
            cache.render(&mut out, "k", "http://img", None).unwrap(),
            RenderOutcome::NotRenderable
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_empty_result_is_not_cached_and_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, calls) = cache(dir.path(), vec![Vec::new(), b"OK".to_vec()]);

        let mut out = Vec::new();
        let first = cache.render(&mut out, "k", "http://img", None).unwrap();
        assert_eq!(first, RenderOutcome::NotRenderable);
        assert!(out.is_empty());
        assert!(!cache.path_for("k").exists());

        let second = cache.render(&mut out, "k", "http://img", None).unwrap();
        assert!(matches!(second, RenderOutcome::Rendered(_)));
        assert_eq!(out, b"OK");
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn test_empty_artifact_on_disk_is_deleted_and_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, calls) = cache(dir.path(), vec![b"NEW".to_vec()]);
        fs::write(cache.path_for("k"), b"").unwrap();

        let mut out = Vec::new();
        cache.render(&mut out, "k", "http://img", None).unwrap();
        assert_eq!(out, b"NEW");
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn test_encoder_failure_is_soft() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = cache(dir.path(), vec![]);
        let mut out = Vec::new();
        assert_eq!(
            cache.render(&mut out, "k", "http://img", None).unwrap(),
            RenderOutcome::NotRenderable
        );
        assert!(!cache.path_for("k").exists());
    }

    #[test]
    fn test_evict_expired_by_age_and_kind() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["icon-a.sixel", "http_b.sixel", "other.sixel"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let soon = SystemTime::now() + Duration::from_secs(2 * 24 * 60 * 60);
        assert_eq!(evict_expired(dir.path(), soon).unwrap(), 1);
        assert!(dir.path().join("icon-a.sixel").exists());
        assert!(!dir.path().join("http_b.sixel").exists());

        let later = SystemTime::now() + Duration::from_secs(8 * 24 * 60 * 60);
        assert_eq!(evict_expired(dir.path(), later).unwrap(), 1);
        assert!(dir.path().join("other.sixel").exists());
    }
}
