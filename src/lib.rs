//!
//! This library bridges indexed analog samples from an outstation feed to
//! named, unit-converted points described by a register map.
//!
//! <br>
//!
//! # Details
//!
//! - The register map is a JSON document embedded as a string inside the
//!   configuration, under `{"map": {"default": "..."}}`.
//!
//! - Basic setup
//!
//!   ```
//!   use std::sync::Arc;
//!   use regbridge::{Dispatcher, RegisterMap};
//!   use regbridge::proto::point::Indexed;
//!   use regbridge::sink::Collector;
//!
//!   fn main() -> regbridge::Result<()> {
//!       let config = r#"{"map": {"default": "{\"values\": [{\"name\": \"temperature\", \"register\": 102, \"scale\": 0.1}]}"}}"#;
//!       let map = Arc::new(RegisterMap::parse(config)?);
//!       let mut dispatcher = Dispatcher::with_map(map, Collector::default());
//!       dispatcher.on_sample(&Indexed::new(102, 250.0))?;
//!       assert_eq!(dispatcher.sink().emissions[0].name, "temperature");
//!       Ok(())
//!   }
//!   ```
//!
//! # Feed format
//!
//! One point per line: `<group>,<index>,<value>[,<unix-ms>]`, where group is
//! the object group number (30 for analog inputs).
//!

pub mod dispatch;
pub mod proto;
pub mod regmap;
pub mod session;
pub mod sink;

pub use dispatch::{DispatchOutcome, Dispatcher, Policy};
pub use proto::Result;
pub use regmap::{ConfigError, RegisterMap, RegisterMapEntry};
pub use session::{Session, SessionConfig};

/// Default outstation address and port.
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 20000;

/// Default baudrate for serial feeds.
pub const DEFAULT_BAUDRATE: u32 = 9600;
