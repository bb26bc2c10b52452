//! Delimited-text image and mask readers.
//!
//! One image row per line, values separated by whitespace or commas. Blank
//! lines and everything after `#` are ignored.

use crate::{Error, Result};
use ndarray::Array2;
use std::fs;
use std::path::Path;

/// Parses a text matrix.
///
/// # Errors
/// Returns [`Error::InvalidFormat`] for unparsable values, ragged rows or an
/// empty matrix.
pub fn parse_text_image(text: &str) -> Result<Array2<f64>> {
    let mut values = Vec::new();
    let mut columns = None;
    let mut rows = 0usize;
    for (number, line) in text.lines().enumerate() {
        let content = line.split('#').next().unwrap_or_default();
        let start = values.len();
        for token in content
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let value = token.parse::<f64>().map_err(|e| {
                Error::InvalidFormat(format!("line {}: {token:?}: {e}", number + 1))
            })?;
            values.push(value);
        }
        let width = values.len() - start;
        if width == 0 {
            continue;
        }
        match columns {
            None => columns = Some(width),
            Some(expected) if expected != width => {
                return Err(Error::InvalidFormat(format!(
                    "line {}: expected {expected} values, found {width}",
                    number + 1
                )));
            }
            Some(_) => {}
        }
        rows += 1;
    }
    let columns = columns.ok_or_else(|| Error::InvalidFormat("no image data".to_string()))?;
    Array2::from_shape_vec((rows, columns), values)
        .map_err(|e| Error::InvalidFormat(e.to_string()))
}

/// Reads a text image file.
///
/// # Errors
/// Returns I/O errors and those of [`parse_text_image`].
pub fn read_text_image<P: AsRef<Path>>(path: P) -> Result<Array2<f64>> {
    let path = path.as_ref();
    let image = parse_text_image(&fs::read_to_string(path)?)?;
    log::debug!("read {:?} image from {}", image.dim(), path.display());
    Ok(image)
}

/// Reads a text mask file; non-zero entries keep their pixel.
///
/// # Errors
/// Returns I/O errors and those of [`parse_text_image`].
pub fn read_text_mask<P: AsRef<Path>>(path: P) -> Result<Array2<bool>> {
    Ok(read_text_image(path)?.mapv(|v| v != 0.0))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use ndarray::array;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_mixed_separators() {
        let text = "# detector frame\n1 2 3\n4,5,6   # trailing\n\n7.5\t8 , 9\n";
        let image = parse_text_image(text).unwrap();
        assert_eq!(image, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.5, 8.0, 9.0]]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = parse_text_image("1 2\n3\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(matches!(parse_text_image("# nothing\n"), Err(Error::InvalidFormat(_))));
        assert!(matches!(parse_text_image("1 x\n"), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_read_mask() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "1 0").unwrap();
        writeln!(file, "0 2").unwrap();
        let mask = read_text_mask(file.path()).unwrap();
        assert_eq!(mask, array![[true, false], [false, true]]);
    }
}
