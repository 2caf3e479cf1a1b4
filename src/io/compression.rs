//! Transparent decompression of input files.
//!
//! Delimited inputs frequently arrive compressed. [`open_input`] wraps a file in
//! the matching decoder so the CSV reader always sees plain text.
//!
//! Detection strategy:
//! 1. File extension (`.gz`, `.gzip`, `.zst`, `.zstd`), case-insensitive.
//! 2. Magic bytes at the start of the stream.
//! 3. Otherwise the stream is read as-is.
//!
//! Built-in codecs are enabled by feature flags:
//! - **Gzip** via `flate2` (feature: `compression-gzip`)
//! - **Zstd** via `zstd` (feature: `compression-zstd`)

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

/// A decompressor for one input format.
pub trait InputCodec: Send + Sync {
    /// Human-readable codec name.
    fn name(&self) -> &'static str;

    /// Lowercase file extensions including the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Leading bytes that identify the format.
    fn magic_bytes(&self) -> &'static [u8];

    /// Wrap `reader` so that it yields decompressed bytes.
    ///
    /// # Errors
    /// Returns an error if the decoder cannot be initialised.
    fn wrap(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>>;
}

#[cfg(feature = "compression-gzip")]
struct Gzip;

#[cfg(feature = "compression-gzip")]
impl InputCodec for Gzip {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> &'static [u8] {
        &[0x1f, 0x8b]
    }

    fn wrap(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-zstd")]
struct Zstd;

#[cfg(feature = "compression-zstd")]
impl InputCodec for Zstd {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> &'static [u8] {
        &[0x28, 0xb5, 0x2f, 0xfd]
    }

    fn wrap(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }
}

static CODECS: &[&dyn InputCodec] = &[
    #[cfg(feature = "compression-gzip")]
    &Gzip,
    #[cfg(feature = "compression-zstd")]
    &Zstd,
];

fn codec_for_extension(path: &Path) -> Option<&'static dyn InputCodec> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    CODECS
        .iter()
        .copied()
        .find(|c| c.extensions().iter().any(|ext| name.ends_with(ext)))
}

fn codec_for_magic<R: BufRead>(reader: &mut R) -> std::io::Result<Option<&'static dyn InputCodec>> {
    let head = reader.fill_buf()?;
    Ok(CODECS
        .iter()
        .copied()
        .find(|c| head.starts_with(c.magic_bytes())))
}

/// Open `path` for reading, decompressing it if it is a known compressed
/// format.
///
/// # Errors
/// Returns an error if the file cannot be opened or read, or if a decoder
/// fails to initialise.
pub fn open_input(path: impl AsRef<Path>) -> std::io::Result<Box<dyn Read>> {
    let path = path.as_ref();
    let file = File::open(path)?;

    if let Some(codec) = codec_for_extension(path) {
        return codec.wrap(Box::new(BufReader::new(file)));
    }

    let mut reader = BufReader::new(file);
    if let Some(codec) = codec_for_magic(&mut reader)? {
        return codec.wrap(Box::new(reader));
    }
    Ok(Box::new(reader))
}

/// `path` with a trailing compression extension removed, if it has one.
///
/// `data/trades.csv.gz` becomes `data/trades.csv`; paths without a known
/// compression extension are returned unchanged.
#[must_use]
pub fn strip_compression_extension(path: &Path) -> PathBuf {
    match codec_for_extension(path) {
        Some(_) => path.with_extension(""),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plain_files_pass_through() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("plain.csv");
        std::fs::write(&path, "a,b\n1,2\n")?;
        let mut text = String::new();
        open_input(&path)?.read_to_string(&mut text)?;
        assert_eq!(text, "a,b\n1,2\n");
        Ok(())
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn gzip_detected_by_extension_and_magic() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"a,b\n1,2\n")?;
        let bytes = enc.finish()?;

        for name in ["data.csv.gz", "data.csv"] {
            let path = dir.path().join(name);
            std::fs::write(&path, &bytes)?;
            let mut text = String::new();
            open_input(&path)?.read_to_string(&mut text)?;
            assert_eq!(text, "a,b\n1,2\n", "{name}");
        }
        Ok(())
    }

    #[cfg(feature = "compression-zstd")]
    #[test]
    fn zstd_detected_by_extension() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data.csv.zst");
        let bytes = zstd::stream::encode_all(&b"x\n1\n"[..], 3)?;
        std::fs::File::create(&path)?.write_all(&bytes)?;
        let mut text = String::new();
        open_input(&path)?.read_to_string(&mut text)?;
        assert_eq!(text, "x\n1\n");
        Ok(())
    }

    #[test]
    fn strips_only_known_extensions() {
        #[cfg(feature = "compression-gzip")]
        assert_eq!(
            strip_compression_extension(Path::new("in/a.csv.gz")),
            PathBuf::from("in/a.csv")
        );
        assert_eq!(
            strip_compression_extension(Path::new("in/a.csv")),
            PathBuf::from("in/a.csv")
        );
    }
}
