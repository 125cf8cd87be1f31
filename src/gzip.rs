use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

/// Gzip `src` into `dst`.
///
/// # Example
///
/// ```rust, no_run
/// gemflow::gzip::compress(
///     std::path::Path::new("A.xml"),
///     std::path::Path::new("A.xml.gz"),
/// ).unwrap();
/// ```
pub fn compress(src: &Path, dst: &Path) -> std::io::Result<()> {
    let mut reader = BufReader::new(File::open(src)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(dst)?), Compression::default());

    std::io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?.flush()?;

    Ok(())
}

/// Read and decompress a gzip file fully into memory.
pub fn decompress(src: &Path) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(src)?));
    let mut bytes = Vec::new();
    decoder.read_to_end(&mut bytes)?;

    Ok(bytes)
}

/// Gzip an in-memory buffer into `dst`.
pub fn write(bytes: &[u8], dst: &Path) -> std::io::Result<()> {
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(dst)?), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()?.flush()?;

    Ok(())
}
