use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;

use crate::proto::Result;

/// A significant sample, converted to engineering units.
#[serde_with::serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emission {
    pub name: String,
    pub engineering_value: f64,
    pub raw_index: u32,
    pub asset_name: Option<String>,
    pub out_station: Option<i64>,
    #[serde_as(as = "Option<serde_with::TimestampMilliSeconds<i64>>")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl fmt::Display for Emission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "[{}] {} : {:.6}",
            self.raw_index, self.name, self.engineering_value
        ))?;
        if f.alternate() {
            if let Some(asset) = &self.asset_name {
                f.write_fmt(format_args!("  ({})", asset))?;
            }
            if let Some(ts) = &self.timestamp {
                f.write_fmt(format_args!("  {}", ts.format("%Y-%m-%d %H:%M:%S%.3f")))?;
            }
        }
        Ok(())
    }
}

/// Output collaborator receiving every significant sample.
pub trait Sink {
    fn emit(&mut self, emission: &Emission) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn emit(&mut self, emission: &Emission) -> Result<()> {
        (**self).emit(emission)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Fan out to every contained sink, in order.
impl<S: Sink> Sink for Vec<S> {
    fn emit(&mut self, emission: &Emission) -> Result<()> {
        for sink in self.iter_mut() {
            sink.emit(emission)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        for sink in self.iter_mut() {
            sink.flush()?;
        }
        Ok(())
    }
}

/// One human readable line per emission.
pub struct TextSink<W: Write> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Sink for TextSink<W> {
    fn emit(&mut self, emission: &Emission) -> Result<()> {
        self.out.write_fmt(format_args!("{:#}\n", emission))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// One JSON object per line.
pub struct JsonSink<W: Write> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Sink for JsonSink<W> {
    fn emit(&mut self, emission: &Emission) -> Result<()> {
        serde_json::to_writer(&mut self.out, emission)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// CSV rows, header written with the first row.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(out),
        }
    }
}

impl<W: Write> Sink for CsvSink<W> {
    fn emit(&mut self, emission: &Emission) -> Result<()> {
        self.writer.serialize(emission)?;
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Engineering values as raw f64 (LE), for plotting tools reading a FIFO.
pub struct FifoSink<W: Write> {
    out: W,
}

impl<W: Write> FifoSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Sink for FifoSink<W> {
    fn emit(&mut self, emission: &Emission) -> Result<()> {
        self.out
            .write_f64::<LittleEndian>(emission.engineering_value)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Keeps every emission in memory.
#[derive(Debug, Default)]
pub struct Collector {
    pub emissions: Vec<Emission>,
}

impl Sink for Collector {
    fn emit(&mut self, emission: &Emission) -> Result<()> {
        self.emissions.push(emission.clone());
        Ok(())
    }
}
