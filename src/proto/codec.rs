use bytes::BytesMut;
use chrono::{TimeZone, Utc};
use std::io;
use tokio_util::codec::Decoder;

use super::point::{Group, Indexed, Point};

/// Longest accepted feed line, excluding the terminator.
pub const MAX_LINE_LEN: usize = 4096;

/// Decoder for the text sample feed.
///
/// Each line reads `<group>,<index>,<value>[,<unix-ms>]`. Blank lines and
/// lines starting with `#` are skipped. Lines that fail to decode are
/// logged and dropped so a single bad record never ends the stream.
#[derive(Debug, Default)]
pub struct FeedCodec {
    skipped: u64,
}

impl FeedCodec {
    /// Number of malformed lines dropped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<Indexed<Point>> {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line.trim(),
            Err(_) => {
                self.skipped += 1;
                log::warn!("Skipping non UTF-8 feed line");
                return None;
            }
        };
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        match parse_line(line) {
            Ok(point) => Some(point),
            Err(reason) => {
                self.skipped += 1;
                log::warn!("Skipping feed line {:?}: {}", line, reason);
                None
            }
        }
    }
}

impl Decoder for FeedCodec {
    type Item = Indexed<Point>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(pos) = src.iter().position(|b| *b == b'\n') {
            let line = src.split_to(pos + 1);
            if let Some(point) = self.decode_line(&line[..pos]) {
                return Ok(Some(point));
            }
        }
        if src.len() > MAX_LINE_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Feed line exceeds {} bytes", MAX_LINE_LEN),
            ));
        }
        Ok(None) // Not enough bytes yet
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(point) = self.decode(src)? {
            return Ok(Some(point));
        }
        // Last line without terminator
        if src.is_empty() {
            Ok(None)
        } else {
            let line = src.split_to(src.len());
            Ok(self.decode_line(&line))
        }
    }
}

pub(crate) fn parse_line(line: &str) -> Result<Indexed<Point>, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if !(3..=4).contains(&fields.len()) {
        return Err(format!("expected 3 or 4 fields, got {}", fields.len()));
    }
    let group = fields[0]
        .parse::<u8>()
        .ok()
        .and_then(|g| Group::try_from(g).ok())
        .ok_or_else(|| format!("unknown group {:?}", fields[0]))?;
    let index = fields[1]
        .parse::<u32>()
        .map_err(|e| format!("invalid index {:?}: {}", fields[1], e))?;
    let value = parse_value(group, fields[2])?;

    let mut point = Indexed::new(index, value);
    if let Some(ms) = fields.get(3) {
        let ms = ms
            .parse::<i64>()
            .map_err(|e| format!("invalid timestamp {:?}: {}", ms, e))?;
        let ts = Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| format!("timestamp out of range: {}", ms))?;
        point = point.with_timestamp(ts);
    }
    Ok(point)
}

fn parse_value(group: Group, raw: &str) -> Result<Point, String> {
    let invalid = |e: &dyn std::fmt::Display| format!("invalid {} value {:?}: {}", group, raw, e);
    Ok(match group {
        Group::Binary => Point::Binary(parse_bool(raw)?),
        Group::BinaryOutputStatus => Point::BinaryOutputStatus(parse_bool(raw)?),
        Group::BinaryCommandEvent => Point::BinaryCommandEvent(parse_bool(raw)?),
        Group::DoubleBitBinary => match raw.parse::<u8>() {
            Ok(state) if state <= 3 => Point::DoubleBitBinary(state),
            Ok(state) => return Err(invalid(&format_args!("state {} out of range", state))),
            Err(e) => return Err(invalid(&e)),
        },
        Group::Counter => Point::Counter(raw.parse::<u32>().map_err(|e| invalid(&e))?),
        Group::FrozenCounter => {
            Point::FrozenCounter(raw.parse::<u32>().map_err(|e| invalid(&e))?)
        }
        Group::Analog => Point::Analog(raw.parse::<f64>().map_err(|e| invalid(&e))?),
        Group::AnalogOutputStatus => {
            Point::AnalogOutputStatus(raw.parse::<f64>().map_err(|e| invalid(&e))?)
        }
        Group::AnalogCommandEvent => {
            Point::AnalogCommandEvent(raw.parse::<f64>().map_err(|e| invalid(&e))?)
        }
        Group::TimeAndInterval => {
            Point::TimeAndInterval(raw.parse::<u64>().map_err(|e| invalid(&e))?)
        }
        Group::OctetString => Point::OctetString(parse_hex(raw).map_err(|e| invalid(&e))?),
    })
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(format!("invalid binary state {:?}", raw)),
    }
}

fn parse_hex(raw: &str) -> Result<Vec<u8>, String> {
    if raw.len() % 2 != 0 {
        return Err("odd number of hex digits".into());
    }
    (0..raw.len())
        .step_by(2)
        .map(|i| {
            raw.get(i..i + 2)
                .and_then(|byte| u8::from_str_radix(byte, 16).ok())
                .ok_or_else(|| format!("invalid hex at offset {}", i))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &str) -> (Vec<Indexed<Point>>, u64) {
        let mut codec = FeedCodec::default();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(point) = codec.decode_eof(&mut buf).unwrap() {
            out.push(point);
        }
        (out, codec.skipped())
    }

    #[test]
    fn test_decode_analog() {
        let (points, skipped) = decode_all("30,102,250\r\n30,5,99.5,1700000000000\n");
        assert_eq!(skipped, 0);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], Indexed::new(102, Point::Analog(250.0)));
        assert_eq!(points[1].value, Point::Analog(99.5));
        assert_eq!(
            points[1].timestamp.unwrap().timestamp_millis(),
            1_700_000_000_000
        );
    }

    #[test]
    fn test_decode_kinds() {
        let (points, skipped) = decode_all(
            "1,0,1\n3,1,2\n20,2,77\n21,3,78\n10,4,false\n40,5,1.5\n110,6,48690a\n50,7,1000\n13,8,0\n43,9,-2\n",
        );
        assert_eq!(skipped, 0);
        let values: Vec<Point> = points.into_iter().map(|p| p.value).collect();
        assert_eq!(
            values,
            vec![
                Point::Binary(true),
                Point::DoubleBitBinary(2),
                Point::Counter(77),
                Point::FrozenCounter(78),
                Point::BinaryOutputStatus(false),
                Point::AnalogOutputStatus(1.5),
                Point::OctetString(vec![0x48, 0x69, 0x0a]),
                Point::TimeAndInterval(1000),
                Point::BinaryCommandEvent(false),
                Point::AnalogCommandEvent(-2.0),
            ]
        );
    }

    #[test]
    fn test_skip_comments_and_garbage() {
        let (points, skipped) =
            decode_all("# recorded feed\n\n30,x,1\n99,1,1\n3,1,7\n30,1\n30,1,2.0\n");
        assert_eq!(points, vec![Indexed::new(1, Point::Analog(2.0))]);
        assert_eq!(skipped, 4);
    }

    #[test]
    fn test_partial_line_waits() {
        let mut codec = FeedCodec::default();
        let mut buf = BytesMut::from("30,1,");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"4.0\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Indexed::new(1, Point::Analog(4.0)))
        );
    }

    #[test]
    fn test_last_line_without_newline() {
        let (points, _) = decode_all("30,1,1.0\n30,2,2.0");
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].index, 2);
    }

    #[test]
    fn test_overlong_line() {
        let mut codec = FeedCodec::default();
        let mut buf = BytesMut::from(vec![b'1'; MAX_LINE_LEN + 1].as_slice());
        assert!(codec.decode(&mut buf).is_err());
    }
}
