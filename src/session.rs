use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::FramedRead;

use crate::dispatch::Dispatcher;
use crate::proto::codec::FeedCodec;
use crate::proto::point::{Indexed, Point};
use crate::proto::{BridgeError, Result};
use crate::sink::Sink;

/// Most points handed to the dispatcher in one delivery.
pub const MAX_BATCH: usize = 64;

/// Per-session settings, passed explicitly instead of living in globals.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Log every decoded point at debug level
    pub log_points: bool,
    pub max_batch: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            log_points: false,
            max_batch: MAX_BATCH,
        }
    }
}

/// Totals reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub batches: u64,
    pub points: u64,
    pub samples: u64,
    pub emitted: u64,
}

type PointStream = Pin<Box<dyn Stream<Item = std::io::Result<Indexed<Point>>> + Send>>;

/// A feed of indexed points from an outstation or a recording.
pub struct Session {
    stream: PointStream,
    config: SessionConfig,
}

impl Session {
    /// Connect to an outstation feed over TCP.
    pub async fn connect_tcp(host: &str, port: u16, config: SessionConfig) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        log::info!("Connected to {}:{}", host, port);
        Ok(Self::from_reader(stream, config))
    }

    /// Open a serial line carrying the feed.
    pub fn open_serial(com: impl AsRef<str>, baudrate: u32, config: SessionConfig) -> Result<Self> {
        #[allow(unused_mut)]
        let mut port = tokio_serial::new(com.as_ref(), baudrate).open_native_async()?;

        #[cfg(unix)]
        port.set_exclusive(false)?;

        log::info!("Opened {} at {} baud", com.as_ref(), baudrate);
        Ok(Self::from_reader(port, config))
    }

    /// Read the feed from any byte source, e.g. stdin or a recorded file.
    pub fn from_reader<R>(reader: R, config: SessionConfig) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        let stream = FramedRead::new(reader, FeedCodec::default());
        Self {
            stream: Box::pin(stream),
            config,
        }
    }

    #[cfg(test)]
    pub fn new_faked(feed: &str) -> Self {
        Self::from_reader(
            super::proto::fake::FakeBuffer::new(feed.as_bytes().to_vec()),
            SessionConfig::default(),
        )
    }

    /// Deliver every point to `dispatcher` until the feed ends.
    ///
    /// Points already buffered are delivered together as one batch, in
    /// arrival order. The dispatcher is stopped when the feed closes, and
    /// also when it fails; points decoded ahead of a feed error are
    /// delivered before the error is returned.
    pub async fn run<S: Sink>(self, dispatcher: &mut Dispatcher<S>) -> Result<SessionSummary> {
        let Session { stream, config } = self;
        let mut batches = stream.ready_chunks(config.max_batch.max(1));
        let mut summary = SessionSummary::default();
        let start = dispatcher.samples_seen();
        let mut failure: Option<BridgeError> = None;

        while let Some(batch) = batches.next().await {
            let mut points = Vec::with_capacity(batch.len());
            for item in batch {
                match item {
                    Ok(point) => points.push(point),
                    Err(err) => {
                        failure = Some(err.into());
                        break;
                    }
                }
            }
            if config.log_points {
                for point in &points {
                    log::debug!("[{}] {:?}", point.index, point.value);
                }
            }
            summary.batches += 1;
            summary.points += points.len() as u64;
            match dispatcher.process_batch(&points) {
                Ok(emitted) => summary.emitted += emitted as u64,
                // Earlier in the stream than any feed error in this batch
                Err(err) => failure = Some(err),
            }
            if failure.is_some() {
                break;
            }
        }

        summary.samples = dispatcher.samples_seen() - start;
        let stopped = dispatcher.stop();
        if let Some(err) = failure {
            log::warn!(
                "Feed failed after {} points, {} analog samples: {}",
                summary.points,
                summary.samples,
                err
            );
            return Err(err);
        }
        stopped?;
        log::info!(
            "Feed closed after {} points, {} analog samples, {} emitted",
            summary.points,
            summary.samples,
            summary.emitted
        );
        if summary.points == 0 {
            return Err(BridgeError::Abort);
        }
        Ok(summary)
    }
}
