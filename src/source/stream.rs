use std::io::Read;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::Duration;

use super::{Chunk, SampleSource};
use crate::eeg::recording::Schema;
use crate::eeg::ring::Sample;
use crate::error::{Error, Result};

type Row = Result<(Option<f64>, Sample)>;

/// Live CSV rows, read on a helper thread and handed over a channel.
pub struct StreamSource {
    channel_names: Vec<String>,
    sample_rate: f64,
    rx: Receiver<Row>,
    index: usize,
    finished: bool,
}

impl StreamSource {
    /// Read the header synchronously, then stream rows in the background.
    pub fn spawn<R: Read + Send + 'static>(reader: R, sample_rate: f64, time_column: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let schema = Schema::from_headers(rdr.headers()?, time_column);
        if schema.channel_names.is_empty() {
            return Err(Error::NoSource("stream header has no channel columns".into()));
        }

        log::info!(
            "Streaming {} channels at {}Hz: {:?}{}",
            schema.channel_names.len(),
            sample_rate,
            schema.channel_names,
            if schema.has_time() { " (timestamped)" } else { "" }
        );

        let channel_names = schema.channel_names.clone();
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("eegmidi-stream".into())
            .spawn(move || {
                for (i, record) in rdr.records().enumerate() {
                    let row = record
                        .map_err(Error::from)
                        .and_then(|r| schema.parse_row(&r, i + 1));
                    let failed = row.is_err();
                    if tx.send(row).is_err() || failed {
                        break;
                    }
                }
            })?;

        Ok(Self {
            channel_names,
            sample_rate,
            rx,
            index: 0,
            finished: false,
        })
    }

    fn push(&mut self, chunk: &mut Chunk, row: Row) -> Result<()> {
        let (time, sample) = row?;
        chunk.timestamps.push(time.unwrap_or(self.index as f64 / self.sample_rate));
        chunk.samples.push(sample);
        self.index += 1;
        Ok(())
    }
}

impl SampleSource for StreamSource {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    fn pull_chunk(&mut self, timeout: Duration, max_samples: usize) -> Result<Option<Chunk>> {
        if self.finished {
            return Ok(None);
        }

        let mut chunk = Chunk::default();
        match self.rx.recv_timeout(timeout) {
            Ok(row) => self.push(&mut chunk, row)?,
            Err(RecvTimeoutError::Timeout) => return Ok(Some(chunk)),
            Err(RecvTimeoutError::Disconnected) => {
                self.finished = true;
                log::info!("Stream ended after {} samples", self.index);
                return Ok(None);
            }
        }

        while chunk.len() < max_samples.max(1) {
            match self.rx.try_recv() {
                Ok(row) => self.push(&mut chunk, row)?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.finished = true;
                    break;
                }
            }
        }

        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn source(text: &str) -> Result<StreamSource> {
        StreamSource::spawn(Cursor::new(text.as_bytes().to_vec()), 4.0, "Time")
    }

    fn collect(src: &mut StreamSource) -> Result<Chunk> {
        let mut all = Chunk::default();
        while let Some(chunk) = src.pull_chunk(Duration::from_secs(2), 2)? {
            all.samples.extend(chunk.samples);
            all.timestamps.extend(chunk.timestamps);
        }
        Ok(all)
    }

    #[test]
    fn reads_rows_with_their_timestamps() {
        let mut src = source("timestamp,ch0,ch1\n").unwrap();
        assert_eq!(src.channel_names(), &["timestamp", "ch0", "ch1"]);

        let mut src = source("Time,a,b\n10.0,1,2\n10.5,3,4\n11.0,5,6\n").unwrap();
        assert_eq!(src.channel_count(), 2);
        let all = collect(&mut src).unwrap();
        assert_eq!(all.samples, vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]);
        assert_eq!(all.timestamps, vec![10.0, 10.5, 11.0]);
    }

    #[test]
    fn untimed_rows_use_sample_index() {
        let mut src = source("a\n1\n2\n3\n").unwrap();
        let all = collect(&mut src).unwrap();
        assert_eq!(all.timestamps, vec![0.0, 0.25, 0.5]);
    }

    #[test]
    fn missing_header_is_fatal() {
        assert!(matches!(source(""), Err(Error::NoSource(_))));
        assert!(matches!(source("Time\n1.0\n"), Err(Error::NoSource(_))));
    }

    #[test]
    fn bad_row_is_reported() {
        let mut src = source("a,b\n1,2\n3,oops\n").unwrap();
        let err = collect(&mut src).unwrap_err();
        assert!(matches!(err, Error::InvalidRow { row: 2, .. }));
    }
}
