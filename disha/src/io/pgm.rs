//! Binary PGM (P5) codec for map rasters.
//!
//! Only 8-bit rasters (max gray value <= 255) are supported. Header comments
//! (`# ...`) are accepted on read.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::core::types::{MapImageData, PGM_IMAGE_TYPE};
use crate::error::{Error, Result};

/// Serialize a raster as binary PGM.
pub fn encode(image: &MapImageData) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(image.image().len() + 32);
    writeln!(out, "P5")?;
    writeln!(out, "{} {}", image.width(), image.height())?;
    writeln!(out, "{}", image.max_gray_value())?;
    out.extend_from_slice(image.image());
    Ok(out)
}

/// Parse a binary PGM buffer.
pub fn decode(data: &[u8]) -> Result<MapImageData> {
    let mut cursor = HeaderCursor { data, pos: 0 };

    let magic = cursor.token()?;
    if magic != "P5" {
        return Err(Error::InvalidArgument(format!(
            "unsupported PGM magic {:?}, expected P5",
            magic
        )));
    }
    let width = cursor.number("width")?;
    let height = cursor.number("height")?;
    let max_gray = cursor.number("max gray value")?;

    // Exactly one whitespace byte separates the header from the raster.
    if cursor.pos >= data.len() || !data[cursor.pos].is_ascii_whitespace() {
        return Err(Error::InvalidArgument("truncated PGM header".into()));
    }
    let start = cursor.pos + 1;
    let expected = width as usize * height as usize;
    let raster = data.get(start..start + expected).ok_or_else(|| {
        Error::InvalidArgument(format!(
            "PGM raster truncated: {} bytes, expected {}",
            data.len().saturating_sub(start),
            expected
        ))
    })?;

    MapImageData::new(width, height, max_gray, PGM_IMAGE_TYPE, raster.to_vec())
}

/// Write a raster to `path`.
pub fn write_file(path: &Path, image: &MapImageData) -> Result<()> {
    fs::write(path, encode(image)?)?;
    Ok(())
}

/// Read a raster from `path`.
pub fn read_file(path: &Path) -> Result<MapImageData> {
    decode(&fs::read(path)?)
}

struct HeaderCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl HeaderCursor<'_> {
    fn skip_whitespace_and_comments(&mut self) {
        while self.pos < self.data.len() {
            let b = self.data[self.pos];
            if b == b'#' {
                while self.pos < self.data.len() && self.data[self.pos] != b'\n' {
                    self.pos += 1;
                }
            } else if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn token(&mut self) -> Result<String> {
        self.skip_whitespace_and_comments();
        let start = self.pos;
        while self.pos < self.data.len() && !self.data[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(Error::InvalidArgument("truncated PGM header".into()));
        }
        Ok(String::from_utf8_lossy(&self.data[start..self.pos]).into_owned())
    }

    fn number(&mut self, what: &str) -> Result<u32> {
        let token = self.token()?;
        token
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("invalid PGM {}: {:?}", what, token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{FREE_GRAY, OCCUPIED_GRAY};

    #[test]
    fn test_encode_header() {
        let img = MapImageData::pgm(3, 2, vec![0, 1, 2, 3, 4, 5]).unwrap();
        let bytes = encode(&img).unwrap();
        assert!(bytes.starts_with(b"P5\n3 2\n255\n"));
        assert_eq!(&bytes[bytes.len() - 6..], &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_decode_with_comment() {
        let mut data = b"P5\n# saved by disha\n2 2\n255\n".to_vec();
        data.extend_from_slice(&[OCCUPIED_GRAY, FREE_GRAY, FREE_GRAY, OCCUPIED_GRAY]);
        let img = decode(&data).unwrap();
        assert_eq!(img.width(), 2);
        assert_eq!(img.pixel(1, 0), Some(FREE_GRAY));
        assert_eq!(img.image_type(), "pgm");
    }

    #[test]
    fn test_raster_byte_that_looks_like_whitespace() {
        // Raster starting with '\n' (10) must not be eaten by the header parser.
        let img = MapImageData::pgm(2, 1, vec![10, 32]).unwrap();
        let back = decode(&encode(&img).unwrap()).unwrap();
        assert_eq!(back.image(), &[10, 32]);
    }

    #[test]
    fn test_rejects_ascii_pgm() {
        assert!(decode(b"P2\n1 1\n255\n0").is_err());
    }

    #[test]
    fn test_rejects_truncated_raster() {
        assert!(decode(b"P5\n4 4\n255\n\x00\x00").is_err());
    }
}
