use encoding_rs::{Encoding, EUC_JP, ISO_2022_JP};
use serde::Deserialize;
use std::borrow::Cow;
use std::io::{self, Write};

/// Character set of the bytes written to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum OutputEncoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "euc-jp", alias = "eucjp")]
    EucJp,
    #[serde(rename = "iso-2022-jp", alias = "jis")]
    Iso2022Jp,
}

impl OutputEncoding {
    fn encoding(self) -> Option<&'static Encoding> {
        match self {
            OutputEncoding::Utf8 => None,
            OutputEncoding::EucJp => Some(EUC_JP),
            OutputEncoding::Iso2022Jp => Some(ISO_2022_JP),
        }
    }
}

/// Swap characters the target charset renders badly or cannot represent.
///
/// UTF-8 terminals get the wave dash and minus sign in place of their
/// fullwidth forms. The legacy encoders map JIS 0x2141 to U+FF5E and have no
/// slot for U+301C, so for them the wave dash goes the other way.
pub fn substitute_chars(text: &str, encoding: OutputEncoding) -> Cow<'_, str> {
    match encoding {
        OutputEncoding::Utf8 if text.contains(['\u{FF5E}', '\u{FF0D}']) => {
            Cow::Owned(text.replace('\u{FF5E}', "\u{301C}").replace('\u{FF0D}', "\u{2212}"))
        }
        OutputEncoding::EucJp | OutputEncoding::Iso2022Jp if text.contains('\u{301C}') => {
            Cow::Owned(text.replace('\u{301C}', "\u{FF5E}"))
        }
        _ => Cow::Borrowed(text),
    }
}

/// Terminal output. Text goes through character substitution and the
/// configured encoding; image bytes are written untouched.
pub struct Output<W: Write> {
    inner: W,
    encoding: OutputEncoding,
}

impl<W: Write> Output<W> {
    pub fn new(inner: W, encoding: OutputEncoding) -> Self {
        Self { inner, encoding }
    }

    pub fn text(&mut self, text: &str) -> io::Result<()> {
        let text = substitute_chars(text, self.encoding);
        match self.encoding.encoding() {
            None => self.inner.write_all(text.as_bytes()),
            Some(encoding) => {
                // ISO-2022-JP cannot carry ESC, so control sequences are written
                // between separately encoded runs, each ending in ASCII state.
                for (i, run) in text.split('\x1b').enumerate() {
                    if i > 0 {
                        self.inner.write_all(b"\x1b")?;
                    }
                    let (bytes, _, _) = encoding.encode(run);
                    self.inner.write_all(&bytes)?;
                }
                Ok(())
            }
        }
    }

    /// Bytes written verbatim; escape sequences and sixel data go here.
    pub fn raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }

    /// Writer for streaming raw image data.
    pub fn raw_writer(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
