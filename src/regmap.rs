use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Key holding the register map in the outer configuration document.
pub const DEFAULT_MAP_KEY: &str = "map";

/// Register map loading failures.
///
/// Loading is all-or-nothing, every variant aborts the whole parse.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration is not valid JSON: {0}")]
    MalformedOuterJson(#[source] serde_json::Error),
    #[error("map key {0:?} not found in configuration")]
    MissingMapKey(String),
    #[error("map key {0:?} is not an object")]
    MapNotObject(String),
    #[error("map {0:?} has no \"default\" string")]
    MissingDefaultKey(String),
    #[error("\"default\" of map is not valid JSON: {0}")]
    MalformedInnerJson(#[source] serde_json::Error),
    #[error("map document has no \"values\" key")]
    MissingValuesArray,
    #[error("\"values\" of map document is not an array")]
    ValuesNotArray,
    #[error("invalid entry at values[{index}]: {reason}")]
    InvalidEntry { index: usize, reason: String },
    #[error("duplicate point name {0:?}")]
    DuplicateName(String),
}

fn default_scale() -> f64 {
    1.0
}

/// One configured point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterMapEntry {
    pub name: String,
    pub register: u32,
    /// Source device when several outstations are multiplexed on one feed.
    #[serde(
        default,
        rename = "out-station",
        alias = "outStationId",
        skip_serializing_if = "Option::is_none"
    )]
    pub out_station: Option<i64>,
    #[serde(
        default,
        rename = "assetName",
        skip_serializing_if = "Option::is_none"
    )]
    pub asset_name: Option<String>,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

impl RegisterMapEntry {
    pub fn new(name: impl Into<String>, register: u32) -> Self {
        Self {
            name: name.into(),
            register,
            out_station: None,
            asset_name: None,
            scale: 1.0,
            offset: 0.0,
        }
    }

    /// Convert a raw register value into engineering units.
    pub fn to_engineering(&self, raw: f64) -> f64 {
        raw * self.scale + self.offset
    }
}

impl fmt::Display for RegisterMapEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{:<20} register: {:>5}  scale: {}  offset: {}",
            self.name, self.register, self.scale, self.offset
        ))?;
        if let Some(station) = self.out_station {
            f.write_fmt(format_args!("  out-station: {}", station))?;
        }
        if let Some(asset) = &self.asset_name {
            f.write_fmt(format_args!("  asset: {}", asset))?;
        }
        Ok(())
    }
}

/// Immutable set of configured points, kept in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterMap {
    entries: Vec<RegisterMapEntry>,
}

impl RegisterMap {
    /// Parse configuration text using the default `"map"` key.
    pub fn parse(config: &str) -> Result<Self, ConfigError> {
        Self::parse_with_key(config, DEFAULT_MAP_KEY)
    }

    /// Parse configuration text, reading the map from `key`.
    ///
    /// The map object carries its document as a JSON string under
    /// `"default"`, so parsing runs in two stages: the outer configuration
    /// first, then the embedded map document.
    pub fn parse_with_key(config: &str, key: &str) -> Result<Self, ConfigError> {
        let inner = extract_map_document(config, key)?;
        let map = Self::from_map_document(&inner)?;
        log::info!("Loaded register map {:?} with {} points", key, map.len());
        Ok(map)
    }

    /// Parse an already extracted map document (`{"values": [...]}`).
    pub fn from_map_document(document: &str) -> Result<Self, ConfigError> {
        let doc: Value =
            serde_json::from_str(document).map_err(ConfigError::MalformedInnerJson)?;
        let values = match doc.get("values") {
            Some(Value::Array(values)) => values,
            Some(_) => return Err(ConfigError::ValuesNotArray),
            None => return Err(ConfigError::MissingValuesArray),
        };

        let mut entries = Vec::with_capacity(values.len());
        for (index, value) in values.iter().enumerate() {
            entries.push(parse_entry(index, value)?);
        }
        Self::from_entries(entries)
    }

    /// Build a map from entries, rejecting duplicate names.
    pub fn from_entries(entries: Vec<RegisterMapEntry>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        if let Some(dup) = entries.iter().find(|e| !seen.insert(e.name.as_str())) {
            return Err(ConfigError::DuplicateName(dup.name.clone()));
        }
        Ok(Self { entries })
    }

    /// First entry (in source order) bound to `register`.
    pub fn lookup(&self, register: u32) -> Option<&RegisterMapEntry> {
        self.entries.iter().find(|e| e.register == register)
    }

    pub fn get(&self, name: &str) -> Option<&RegisterMapEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RegisterMapEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a RegisterMap {
    type Item = &'a RegisterMapEntry;
    type IntoIter = std::slice::Iter<'a, RegisterMapEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl TryFrom<&str> for RegisterMap {
    type Error = ConfigError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

fn extract_map_document(config: &str, key: &str) -> Result<String, ConfigError> {
    let outer: Value = serde_json::from_str(config).map_err(ConfigError::MalformedOuterJson)?;
    let map = match outer.get(key) {
        Some(Value::Object(map)) => map,
        Some(_) => return Err(ConfigError::MapNotObject(key.to_string())),
        None => return Err(ConfigError::MissingMapKey(key.to_string())),
    };
    match map.get("default") {
        Some(Value::String(document)) => Ok(document.clone()),
        _ => Err(ConfigError::MissingDefaultKey(key.to_string())),
    }
}

fn parse_entry(index: usize, value: &Value) -> Result<RegisterMapEntry, ConfigError> {
    if !value.is_object() {
        return Err(ConfigError::InvalidEntry {
            index,
            reason: "entry is not an object".into(),
        });
    }
    let entry = RegisterMapEntry::deserialize(value).map_err(|e| ConfigError::InvalidEntry {
        index,
        reason: e.to_string(),
    })?;
    if entry.name.is_empty() {
        return Err(ConfigError::InvalidEntry {
            index,
            reason: "empty name".into(),
        });
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(inner: &str) -> String {
        serde_json::json!({ "map": { "description": "points", "default": inner } }).to_string()
    }

    const SCENARIO: &str = r#"{"values": [
        {"name": "temperature", "register": 102, "scale": 0.1, "offset": 0.0},
        {"name": "humidity", "register": 109, "scale": 0.1, "offset": 0.0}
    ]}"#;

    #[test]
    fn test_parse_source_order() {
        let map = RegisterMap::parse(&wrap(
            r#"{"values": [
                {"name": "temperature", "out-station": 1, "assetName": "Booth1",
                 "register": 0, "scale": 0.1, "offset": 0.0},
                {"name": "humidity", "register": 1},
                {"name": "pressure", "register": 7, "scale": 2.5, "offset": -3.0}
            ]}"#,
        ))
        .unwrap();

        assert_eq!(map.len(), 3);
        let names: Vec<&str> = map.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["temperature", "humidity", "pressure"]);

        let temp = map.get("temperature").unwrap();
        assert_eq!(temp.register, 0);
        assert_eq!(temp.out_station, Some(1));
        assert_eq!(temp.asset_name.as_deref(), Some("Booth1"));
        assert_eq!(temp.scale, 0.1);

        let pressure = map.get("pressure").unwrap();
        assert_eq!(pressure.scale, 2.5);
        assert_eq!(pressure.offset, -3.0);
    }

    #[test]
    fn test_default_coefficients() {
        let map = RegisterMap::parse(&wrap(r#"{"values": [{"name": "humidity", "register": 1}]}"#))
            .unwrap();
        let humidity = map.get("humidity").unwrap();
        assert_eq!(humidity.scale, 1.0);
        assert_eq!(humidity.offset, 0.0);
        assert_eq!(humidity.to_engineering(42.5), 42.5);
    }

    #[test]
    fn test_out_station_alias() {
        let map = RegisterMap::parse(&wrap(
            r#"{"values": [{"name": "t", "register": 1, "outStationId": 4}]}"#,
        ))
        .unwrap();
        assert_eq!(map.get("t").unwrap().out_station, Some(4));
    }

    #[test]
    fn test_empty_values_is_valid() {
        let map = RegisterMap::parse(&wrap(r#"{"values": []}"#)).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_custom_key() {
        let config = serde_json::json!({
            "map": { "default": SCENARIO },
            "control": { "default": r#"{"values": []}"# }
        })
        .to_string();
        assert_eq!(RegisterMap::parse(&config).unwrap().len(), 2);
        assert!(RegisterMap::parse_with_key(&config, "control")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_lookup_by_register() {
        let map = RegisterMap::parse(&wrap(SCENARIO)).unwrap();
        assert_eq!(map.lookup(109).unwrap().name, "humidity");
        assert!(map.lookup(5).is_none());
    }

    #[test]
    fn test_malformed_outer() {
        assert!(matches!(
            RegisterMap::parse("{ \"map\": "),
            Err(ConfigError::MalformedOuterJson(_))
        ));
    }

    #[test]
    fn test_missing_map_key() {
        let err = RegisterMap::parse(r#"{"other": {}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingMapKey(ref k) if k == "map"));
    }

    #[test]
    fn test_map_not_object() {
        assert!(matches!(
            RegisterMap::parse(r#"{"map": "{\"values\": []}"}"#),
            Err(ConfigError::MapNotObject(_))
        ));
    }

    #[test]
    fn test_missing_default() {
        assert!(matches!(
            RegisterMap::parse(r#"{"map": {"type": "JSON"}}"#),
            Err(ConfigError::MissingDefaultKey(_))
        ));
        // An object under "default" is not the double-encoded form
        assert!(matches!(
            RegisterMap::parse(r#"{"map": {"default": {"values": []}}}"#),
            Err(ConfigError::MissingDefaultKey(_))
        ));
    }

    #[test]
    fn test_malformed_inner() {
        assert!(matches!(
            RegisterMap::parse(&wrap("{\"values\": [")),
            Err(ConfigError::MalformedInnerJson(_))
        ));
    }

    #[test]
    fn test_values_missing_or_wrong_type() {
        assert!(matches!(
            RegisterMap::parse(&wrap(r#"{"points": []}"#)),
            Err(ConfigError::MissingValuesArray)
        ));
        assert!(matches!(
            RegisterMap::parse(&wrap(r#"{"values": {"name": "t"}}"#)),
            Err(ConfigError::ValuesNotArray)
        ));
    }

    #[test]
    fn test_missing_register_fails_whole_map() {
        let err = RegisterMap::parse(&wrap(
            r#"{"values": [{"name": "temperature", "register": 0}, {"name": "humidity"}]}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEntry { index: 1, .. }));
    }

    #[test]
    fn test_invalid_entries() {
        for values in [
            r#"[{"register": 3}]"#,
            r#"[{"name": "", "register": 3}]"#,
            r#"[{"name": "t", "register": -1}]"#,
            r#"[{"name": "t", "register": 1.5}]"#,
            r#"[{"name": 12, "register": 3}]"#,
            r#"[{"name": "t", "register": 3, "scale": "x"}]"#,
            r#"[7]"#,
        ] {
            let err = RegisterMap::parse(&wrap(&format!("{{\"values\": {}}}", values))).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidEntry { index: 0, .. }),
                "{}: {:?}",
                values,
                err
            );
        }
    }

    #[test]
    fn test_duplicate_name() {
        let err = RegisterMap::parse(&wrap(
            r#"{"values": [
                {"name": "temperature", "register": 0},
                {"name": "humidity", "register": 1},
                {"name": "temperature", "register": 2}
            ]}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName(ref n) if n == "temperature"));
        assert_eq!(err.to_string(), "duplicate point name \"temperature\"");
    }

    #[test]
    fn test_shared_register_allowed() {
        let map = RegisterMap::parse(&wrap(
            r#"{"values": [{"name": "a", "register": 4}, {"name": "b", "register": 4}]}"#,
        ))
        .unwrap();
        assert_eq!(map.lookup(4).unwrap().name, "a");
    }
}
