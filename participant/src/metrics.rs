use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
    time::Duration,
};

use machine_learning::training::Evaluation;

/// What is recorded for every completed round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundMetrics {
    pub round: u64,
    pub evaluation: Option<Evaluation>,
    pub delay: Option<Duration>,
}

/// A sink for per-round metrics.
pub trait MetricsRecorder {
    fn record(&mut self, metrics: &RoundMetrics) -> io::Result<()>;
}

/// Discards every record.
impl MetricsRecorder for () {
    fn record(&mut self, _metrics: &RoundMetrics) -> io::Result<()> {
        Ok(())
    }
}

/// Keeps every record in memory.
impl MetricsRecorder for Vec<RoundMetrics> {
    fn record(&mut self, metrics: &RoundMetrics) -> io::Result<()> {
        self.push(*metrics);
        Ok(())
    }
}

const CSV_HEADER: &str = "round,cost,accuracy,delay";

/// Appends one CSV line per round to a file that is truncated when created.
pub struct CsvMetrics<W: Write = BufWriter<File>> {
    out: W,
}

impl CsvMetrics {
    /// Creates (or truncates) the metrics file at `path` and writes its header.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> CsvMetrics<W> {
    /// Wraps a writer, writing the header right away.
    pub fn new(mut out: W) -> io::Result<Self> {
        writeln!(out, "{CSV_HEADER}")?;
        out.flush()?;
        Ok(Self { out })
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> MetricsRecorder for CsvMetrics<W> {
    fn record(&mut self, metrics: &RoundMetrics) -> io::Result<()> {
        let (cost, accuracy) = match metrics.evaluation {
            Some(eval) => (eval.loss.to_string(), eval.accuracy.to_string()),
            None => Default::default(),
        };

        let delay = metrics
            .delay
            .map(|delay| delay.as_secs_f64().to_string())
            .unwrap_or_default();

        writeln!(self.out, "{},{cost},{accuracy},{delay}", metrics.round)?;
        self.out.flush()
    }
}
