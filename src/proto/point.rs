use chrono::{DateTime, Utc};
use num_enum::TryFromPrimitive;
use std::fmt;

/// Object group numbers as they appear on the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum Group {
    Binary = 1,
    DoubleBitBinary = 3,
    BinaryOutputStatus = 10,
    BinaryCommandEvent = 13,
    Counter = 20,
    FrozenCounter = 21,
    Analog = 30,
    AnalogOutputStatus = 40,
    AnalogCommandEvent = 43,
    TimeAndInterval = 50,
    OctetString = 110,
}

/// A value of any point type delivered by the outstation.
///
/// Only [`Point::Analog`] carries business logic; the dispatcher
/// acknowledges every other kind and drops it.
#[derive(Debug, Clone, PartialEq)]
pub enum Point {
    Binary(bool),
    DoubleBitBinary(u8),
    Analog(f64),
    Counter(u32),
    FrozenCounter(u32),
    BinaryOutputStatus(bool),
    AnalogOutputStatus(f64),
    OctetString(Vec<u8>),
    /// Milliseconds since the unix epoch
    TimeAndInterval(u64),
    BinaryCommandEvent(bool),
    AnalogCommandEvent(f64),
}

impl Point {
    pub fn group(&self) -> Group {
        match self {
            Point::Binary(_) => Group::Binary,
            Point::DoubleBitBinary(_) => Group::DoubleBitBinary,
            Point::Analog(_) => Group::Analog,
            Point::Counter(_) => Group::Counter,
            Point::FrozenCounter(_) => Group::FrozenCounter,
            Point::BinaryOutputStatus(_) => Group::BinaryOutputStatus,
            Point::AnalogOutputStatus(_) => Group::AnalogOutputStatus,
            Point::OctetString(_) => Group::OctetString,
            Point::TimeAndInterval(_) => Group::TimeAndInterval,
            Point::BinaryCommandEvent(_) => Group::BinaryCommandEvent,
            Point::AnalogCommandEvent(_) => Group::AnalogCommandEvent,
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Group::Binary => f.write_str("Binary"),
            Group::DoubleBitBinary => f.write_str("DoubleBitBinary"),
            Group::BinaryOutputStatus => f.write_str("BinaryOutputStatus"),
            Group::BinaryCommandEvent => f.write_str("BinaryCommandEvent"),
            Group::Counter => f.write_str("Counter"),
            Group::FrozenCounter => f.write_str("FrozenCounter"),
            Group::Analog => f.write_str("Analog"),
            Group::AnalogOutputStatus => f.write_str("AnalogOutputStatus"),
            Group::AnalogCommandEvent => f.write_str("AnalogCommandEvent"),
            Group::TimeAndInterval => f.write_str("TimeAndInterval"),
            Group::OctetString => f.write_str("OctetString"),
        }
    }
}

/// A value tagged with the index it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Indexed<T> {
    pub index: u32,
    pub value: T,
    pub timestamp: Option<DateTime<Utc>>,
}

impl<T> Indexed<T> {
    pub fn new(index: u32, value: T) -> Self {
        Self {
            index,
            value,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// One analog observation.
pub type IndexedSample = Indexed<f64>;

impl Indexed<Point> {
    /// View as an analog sample, `None` for every other point kind.
    pub fn as_analog(&self) -> Option<IndexedSample> {
        match self.value {
            Point::Analog(value) => Some(Indexed {
                index: self.index,
                value,
                timestamp: self.timestamp,
            }),
            _ => None,
        }
    }
}
