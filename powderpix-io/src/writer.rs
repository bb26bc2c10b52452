//! File writers for integration results.

use crate::Result;
use ndarray::Array2;
use powderpix_core::{Axis, Map2D, Profile1D};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writer for reduced diffraction data.
///
/// Profiles are written as CSV, maps and masks as whitespace-separated text
/// matrices that [`crate::read_text_image`] reads back.
pub struct DataFileWriter<W: Write = BufWriter<File>> {
    writer: W,
}

impl DataFileWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> DataFileWriter<W> {
    /// Wraps any writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a profile as `<axis label>,intensity[,error]` CSV.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_profile_csv(&mut self, profile: &Profile1D) -> Result<()> {
        match &profile.error {
            Some(error) => {
                writeln!(self.writer, "{},intensity,error", profile.axis.label())?;
                for ((x, value), sigma) in profile
                    .axis
                    .values
                    .iter()
                    .zip(&profile.intensity)
                    .zip(error)
                {
                    writeln!(self.writer, "{x},{value},{sigma}")?;
                }
            }
            None => {
                writeln!(self.writer, "{},intensity", profile.axis.label())?;
                for (x, value) in profile.axis.values.iter().zip(&profile.intensity) {
                    writeln!(self.writer, "{x},{value}")?;
                }
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes one axis as a single labelled CSV column.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_axis_csv(&mut self, axis: &Axis) -> Result<()> {
        writeln!(self.writer, "{}", axis.label())?;
        for value in &axis.values {
            writeln!(self.writer, "{value}")?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes a matrix, one row per line.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_matrix(&mut self, matrix: &Array2<f64>) -> Result<()> {
        for row in matrix.rows() {
            let line: Vec<String> = row.iter().map(ToString::to_string).collect();
            writeln!(self.writer, "{}", line.join(" "))?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes a map's intensity matrix, rows along its y axis.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_map_text(&mut self, map: &Map2D) -> Result<()> {
        writeln!(
            self.writer,
            "# rows: {}, columns: {}",
            map.y_axis.label(),
            map.x_axis.label()
        )?;
        self.write_matrix(&map.intensity)
    }

    /// Writes a mask as `1` (keep) and `0` (reject).
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_mask(&mut self, mask: &Array2<bool>) -> Result<()> {
        for row in mask.rows() {
            let line: Vec<&str> = row.iter().map(|&keep| if keep { "1" } else { "0" }).collect();
            writeln!(self.writer, "{}", line.join(" "))?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
