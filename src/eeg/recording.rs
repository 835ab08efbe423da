use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use super::ring::Sample;
use crate::error::{Error, Result};

/// A finished multi-channel table of readings at a fixed sample rate.
#[derive(Clone, Debug)]
pub struct Recording {
    pub channel_names: Vec<String>,
    pub samples: Vec<Sample>,
    pub sample_rate: f64,
}

impl Recording {
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate
    }
}

/// Column layout of a sample table: an optional time column plus channels.
#[derive(Clone, Debug)]
pub struct Schema {
    pub channel_names: Vec<String>,
    time_index: Option<usize>,
    channel_indices: Vec<usize>,
}

impl Schema {
    pub fn from_headers(headers: &StringRecord, time_column: &str) -> Self {
        let mut time_index = None;
        let mut channel_names = Vec::new();
        let mut channel_indices = Vec::new();

        for (i, name) in headers.iter().enumerate() {
            if time_index.is_none() && name.eq_ignore_ascii_case(time_column) {
                time_index = Some(i);
            } else {
                channel_names.push(name.to_string());
                channel_indices.push(i);
            }
        }

        Self {
            channel_names,
            time_index,
            channel_indices,
        }
    }

    pub fn has_time(&self) -> bool {
        self.time_index.is_some()
    }

    /// Parse one data row into its timestamp (if any) and channel readings.
    /// `row` is the 1-based data row number used in error messages.
    pub fn parse_row(&self, record: &StringRecord, row: usize) -> Result<(Option<f64>, Sample)> {
        let time = match self.time_index {
            Some(i) => Some(parse_cell(record, i, row, "time")?),
            None => None,
        };

        let sample = self
            .channel_indices
            .iter()
            .zip(&self.channel_names)
            .map(|(&i, name)| parse_cell(record, i, row, name))
            .collect::<Result<Sample>>()?;

        Ok((time, sample))
    }
}

fn parse_cell(record: &StringRecord, index: usize, row: usize, column: &str) -> Result<f64> {
    let raw = record.get(index).unwrap_or("");
    raw.parse::<f64>().map_err(|_| Error::InvalidRow {
        row,
        column: column.to_string(),
        value: raw.to_string(),
    })
}

/// Map requested channel names to column positions. An empty request
/// selects every channel. A request that is not a column name but parses as
/// an in-range index is taken as a position.
pub fn resolve_channels(available: &[String], requested: &[String]) -> Result<Vec<usize>> {
    if requested.is_empty() {
        return Ok((0..available.len()).collect());
    }

    let mut indices = Vec::with_capacity(requested.len());
    let mut missing = Vec::new();

    for name in requested {
        if let Some(i) = available.iter().position(|c| c == name) {
            indices.push(i);
        } else if let Some(i) = name.parse::<usize>().ok().filter(|&i| i < available.len()) {
            indices.push(i);
        } else {
            missing.push(name.clone());
        }
    }

    if missing.is_empty() {
        Ok(indices)
    } else {
        Err(Error::MissingChannels(missing))
    }
}

pub fn load_recording(path: &Path, sample_rate: f64, time_column: &str) -> Result<Recording> {
    let file = std::fs::File::open(path)?;
    let recording = read_recording(file, sample_rate, time_column)?;

    log::info!(
        "Loaded recording: {} samples x {} channels, {}Hz, {:.1}s",
        recording.samples.len(),
        recording.channel_names.len(),
        sample_rate,
        recording.duration()
    );

    Ok(recording)
}

pub fn read_recording<R: Read>(reader: R, sample_rate: f64, time_column: &str) -> Result<Recording> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let schema = Schema::from_headers(rdr.headers()?, time_column);
    if schema.channel_names.is_empty() {
        return Err(Error::NoSource("table has no channel columns".into()));
    }

    let mut samples = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let (_, sample) = schema.parse_row(&record, i + 1)?;
        samples.push(sample);
    }

    if samples.is_empty() {
        return Err(Error::NoSource("table has no rows".into()));
    }

    Ok(Recording {
        channel_names: schema.channel_names,
        samples,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "Time,TP9,AF7,AF8,TP10\n\
                         0.000,1.0,2.0,3.0,4.0\n\
                         0.004,5.0,6.0,7.0,8.0\n";

    #[test]
    fn drops_time_column() {
        let rec = read_recording(TABLE.as_bytes(), 256.0, "Time").unwrap();
        assert_eq!(rec.channel_names, vec!["TP9", "AF7", "AF8", "TP10"]);
        assert_eq!(rec.samples, vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]);
    }

    #[test]
    fn time_column_is_optional_and_case_insensitive() {
        let rec = read_recording("time,A\n0,1\n1,2\n".as_bytes(), 256.0, "Time").unwrap();
        assert_eq!(rec.channel_names, vec!["A"]);

        let rec = read_recording("A,B\n1,2\n".as_bytes(), 256.0, "Time").unwrap();
        assert_eq!(rec.channel_names, vec!["A", "B"]);
        assert_eq!(rec.samples[0], vec![1.0, 2.0]);
    }

    #[test]
    fn header_only_table_is_rejected() {
        let err = read_recording("Time,AF7\n".as_bytes(), 256.0, "Time").unwrap_err();
        assert!(matches!(err, Error::NoSource(_)));
    }

    #[test]
    fn bad_cell_reports_row_and_column() {
        let err = read_recording("AF7,AF8\n1,2\n3,oops\n".as_bytes(), 256.0, "Time").unwrap_err();
        match err {
            Error::InvalidRow { row, column, value } => {
                assert_eq!(row, 2);
                assert_eq!(column, "AF8");
                assert_eq!(value, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolves_names_and_indices() {
        let names: Vec<String> = ["TP9", "AF7", "AF8", "TP10"].iter().map(|s| s.to_string()).collect();
        assert_eq!(resolve_channels(&names, &[]).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(
            resolve_channels(&names, &["AF8".into(), "0".into()]).unwrap(),
            vec![2, 0]
        );
    }

    #[test]
    fn reports_every_missing_channel() {
        let names: Vec<String> = vec!["AF7".into()];
        let err = resolve_channels(&names, &["AF8".into(), "AF7".into(), "Fz".into()]).unwrap_err();
        match err {
            Error::MissingChannels(missing) => assert_eq!(missing, vec!["AF8", "Fz"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duration_uses_sample_rate() {
        let rec = read_recording(TABLE.as_bytes(), 2.0, "Time").unwrap();
        assert_eq!(rec.duration(), 1.0);
    }
}
