//! Module image decoding
//!
//! Kernel modules ship either as raw ELF images (`.ko`) or compressed with
//! xz, gzip or zstd (`.ko.xz`, `.ko.gz`, `.ko.zst`). This module maps a
//! file's name suffix to a byte stream positioned at the start of the
//! uncompressed image.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::errors::{LoadError, Result};

/// A module image ready for loading.
pub enum ModuleReader {
    /// Uncompressed module. The file is passed through untouched so the
    /// caller can hand its descriptor straight to the kernel.
    Raw(File),
    /// Compressed module, decoded on the fly while reading.
    Stream(Box<dyn Read>),
}

impl std::fmt::Debug for ModuleReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleReader::Raw(file) => f.debug_tuple("Raw").field(file).finish(),
            ModuleReader::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}

impl ModuleReader {
    /// Read the full uncompressed image into memory.
    ///
    /// # Errors
    /// I/O failure on the underlying file, or [`LoadError::DecodeFailed`]
    /// when the compressed container is malformed.
    pub fn read_image(self) -> Result<Vec<u8>> {
        let mut image = Vec::new();
        match self {
            ModuleReader::Raw(mut f) => {
                f.read_to_end(&mut image)?;
            }
            ModuleReader::Stream(mut r) => {
                r.read_to_end(&mut image).map_err(LoadError::DecodeFailed)?;
            }
        }
        Ok(image)
    }
}

/// Select a decoder for `file` based on the suffix of `path`.
///
/// # Errors
/// Returns [`LoadError::UnsupportedFormat`] for suffixes other than `.ko`,
/// `.xz`, `.gz` and `.zst`.
pub fn module_reader(file: File, path: &Path) -> Result<ModuleReader> {
    match path.extension().and_then(|e| e.to_str()) {
        None | Some("ko") => Ok(ModuleReader::Raw(file)),
        Some("xz") => Ok(ModuleReader::Stream(Box::new(xz2::read::XzDecoder::new(file)))),
        // MultiGzDecoder handles concatenated gzip members, matching what
        // gzip itself produces for large inputs.
        Some("gz") => Ok(ModuleReader::Stream(Box::new(flate2::read::MultiGzDecoder::new(file)))),
        Some("zst") => {
            let decoder = zstd::stream::read::Decoder::new(file).map_err(LoadError::DecodeFailed)?;
            Ok(ModuleReader::Stream(Box::new(decoder)))
        }
        Some(other) => Err(LoadError::UnsupportedFormat(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    const SAMPLE: &[u8] = b"\x7fELF not really a module, but bytes are bytes\n";

    fn open(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> (File, std::path::PathBuf) {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        (File::open(&path).unwrap(), path)
    }

    #[test]
    fn test_raw_module_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let (file, path) = open(&dir, "mod.ko", SAMPLE);
        let image = module_reader(file, &path).unwrap().read_image().unwrap();
        assert_eq!(image, SAMPLE);
    }

    #[test]
    fn test_unrecognized_suffix_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (file, path) = open(&dir, "mod.ko.bz2", SAMPLE);
        let err = module_reader(file, &path).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat(ref s) if s == "bz2"));
    }

    #[test]
    fn test_gzip_output_matches_input() {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(SAMPLE).unwrap();
        let compressed = enc.finish().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let (file, path) = open(&dir, "mod.ko.gz", &compressed);
        let image = module_reader(file, &path).unwrap().read_image().unwrap();
        assert_eq!(image, SAMPLE);
    }

    #[test]
    fn test_xz_output_matches_input() {
        let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
        enc.write_all(SAMPLE).unwrap();
        let compressed = enc.finish().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let (file, path) = open(&dir, "mod.ko.xz", &compressed);
        let image = module_reader(file, &path).unwrap().read_image().unwrap();
        assert_eq!(image, SAMPLE);
    }

    #[test]
    fn test_zstd_output_matches_input() {
        let compressed = zstd::stream::encode_all(SAMPLE, 0).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let (file, path) = open(&dir, "mod.ko.zst", &compressed);
        let image = module_reader(file, &path).unwrap().read_image().unwrap();
        assert_eq!(image, SAMPLE);
    }

    #[test]
    fn test_truncated_gzip_is_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A gzip magic header with nothing behind it.
        let (file, path) = open(&dir, "mod.ko.gz", &[0x1f, 0x8b, 0x08]);
        let err = module_reader(file, &path).unwrap().read_image().unwrap_err();
        assert!(matches!(err, LoadError::DecodeFailed(_)));
    }
}
