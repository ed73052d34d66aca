//! Fixed-precision row encoding
//!
//! ```text
//! Timestamp,Accelerometer_X,Accelerometer_Y,Accelerometer_Z,Gyroscope_X,Gyroscope_Y,Gyroscope_Z,L2_Norm,Platform
//! 1700000000.123,0.12,-0.03,9.81,0.01,0.02,0.00,0.02,0
//! ```
//!
//! Timestamp is seconds since the epoch with three decimals, every axis and
//! the norm carry two decimals, and the trailing platform marker tells
//! downstream consumers which device family produced the file.

use crate::types::Sample;
use std::fmt::Write;

/// Header line written once at the top of every session file
pub const HEADER: &str = "Timestamp,Accelerometer_X,Accelerometer_Y,Accelerometer_Z,Gyroscope_X,Gyroscope_Y,Gyroscope_Z,L2_Norm,Platform\n";

/// Platform marker appended to every row
pub const PLATFORM_MARKER: &str = "0";

/// Number of comma-separated fields per line
pub const FIELD_COUNT: usize = 9;

/// One encoded, newline-terminated line ready for the sink
pub type Row = String;

/// Typical encoded row length, used to pre-size buffers
pub const TYPICAL_ROW_LEN: usize = 64;

/// Encode a sample into `out`, appending
pub fn encode_into(sample: &Sample, out: &mut String) {
    // Writing to a String cannot fail
    let _ = writeln!(
        out,
        "{:.3},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{}",
        sample.timestamp,
        sample.accel[0],
        sample.accel[1],
        sample.accel[2],
        sample.gyro[0],
        sample.gyro[1],
        sample.gyro[2],
        sample.gyro_norm,
        PLATFORM_MARKER,
    );
}

/// Encode a sample as a fresh row
pub fn encode(sample: &Sample) -> Row {
    let mut row = String::with_capacity(TYPICAL_ROW_LEN);
    encode_into(sample, &mut row);
    row
}
