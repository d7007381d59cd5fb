//! Compression algorithms for archive formats.

use std::{
    fmt::Debug,
    io::{self, BufRead, BufReader, Read, Write},
};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The leading bytes of every gzip stream.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// The gzip algorithm.
pub static GZIP: Gzip = Gzip;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Gzip compression.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gzip;

struct GzipCompressor(GzEncoder<Box<dyn Write + Send>>);

struct Uncompressed(Box<dyn Write + Send>);

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// A compression algorithm usable for archive files.
pub trait CompressionAlgorithm: Debug + Send + Sync {
    /// Returns the name of the algorithm.
    fn name(&self) -> &'static str;

    /// Wraps `writer` so that everything written is compressed.
    fn compressor(&self, writer: Box<dyn Write + Send>) -> Box<dyn Compressor>;

    /// Wraps `reader` so that reads return decompressed content.
    fn decompressor(&self, reader: Box<dyn Read + Send>) -> Box<dyn Read + Send>;
}

/// A writer that has to be finished explicitly to produce a complete stream.
pub trait Compressor: Write + Send {
    /// Writes any trailing data and flushes the underlying writer.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Wraps `writer` in a compressor that passes everything through unchanged.
pub fn uncompressed(writer: Box<dyn Write + Send>) -> Box<dyn Compressor> {
    Box::new(Uncompressed(writer))
}

/// Wraps `writer` with the compressor of `algorithm`, or passes it through if there is none.
pub fn compressor_for(
    algorithm: Option<&dyn CompressionAlgorithm>,
    writer: Box<dyn Write + Send>,
) -> Box<dyn Compressor> {
    match algorithm {
        Some(algorithm) => algorithm.compressor(writer),
        None => uncompressed(writer),
    }
}

/// Detects a gzip stream by its magic bytes and decompresses it if found.
///
/// Returns whether the stream was compressed along with a reader yielding the plain content.
pub fn auto_decompress(reader: Box<dyn Read + Send>) -> io::Result<(bool, Box<dyn Read + Send>)> {
    let mut buffered = BufReader::new(reader);
    let compressed = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);
    if compressed {
        tracing::trace!("detected {} compressed stream", GZIP.name());
        Ok((true, GZIP.decompressor(Box::new(buffered))))
    } else {
        Ok((false, Box::new(buffered)))
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl CompressionAlgorithm for Gzip {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compressor(&self, writer: Box<dyn Write + Send>) -> Box<dyn Compressor> {
        Box::new(GzipCompressor(GzEncoder::new(writer, Compression::default())))
    }

    fn decompressor(&self, reader: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
        Box::new(GzDecoder::new(reader))
    }
}

impl Write for GzipCompressor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Compressor for GzipCompressor {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut inner = self.0.finish()?;
        inner.flush()
    }
}

impl Write for Uncompressed {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Compressor for Uncompressed {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.0.flush()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
