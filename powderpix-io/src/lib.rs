//! powderpix-io: File I/O for powderpix.
//!
//! This crate reads JSON detector calibrations and delimited-text images and
//! masks, and writes profiles, maps and masks as CSV or text matrices.
//!

mod calibration;
mod error;
mod reader;
mod writer;

pub use calibration::{
    load_calibration, load_integration_config, load_metadata, save_calibration, CalibrationFile,
    Tilt,
};
pub use error::{Error, Result};
pub use reader::{parse_text_image, read_text_image, read_text_mask};
pub use writer::DataFileWriter;
