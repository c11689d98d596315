use std::path::Path;

use crate::error::{AcquisitionError, Result};
use crate::sample::Sample;

pub const PROCESSED_HEADER: [&str; 3] = ["timestamp", "value1", "value2"];

/// Writes `timestamp,value1,value2` rows (time, voltage, channel).
pub fn write_processed(path: impl AsRef<Path>, samples: &[Sample]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    writer.write_record(PROCESSED_HEADER)?;
    for sample in samples {
        writer.write_record(&[
            format!("{:.4}", sample.time),
            format!("{:.4}", sample.voltage),
            sample.channel.to_string(),
        ])?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Loads a processed series for review. A header row is optional and rows
/// with fewer than three fields are skipped.
pub fn load_processed(path: impl AsRef<Path>) -> Result<Vec<Sample>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path.as_ref())?;

    let mut samples = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() < 3 {
            continue;
        }
        let line = index + 1;
        let time = record[0].trim().parse::<f64>();
        if index == 0 && time.is_err() {
            // header
            continue;
        }

        let time = time.map_err(|_| {
            AcquisitionError::parse_failure(line, format!("invalid timestamp {:?}", &record[0]))
        })?;
        let voltage = record[1].trim().parse::<f64>().map_err(|_| {
            AcquisitionError::parse_failure(line, format!("invalid voltage {:?}", &record[1]))
        })?;
        let channel = record[2].trim().parse::<u32>().map_err(|_| {
            AcquisitionError::parse_failure(line, format!("invalid channel {:?}", &record[2]))
        })?;
        samples.push(Sample::new(time, voltage, channel));
    }
    Ok(samples)
}
