//! Object key decomposition
//!
//! Statistics files are stored under keys of the form
//!
//! ```text
//! <prefix>/<msec><sep><table>[<marker><version>[<sep><subtable>]].<suffix>
//! ```
//!
//! e.g. `dar5/AccessPointDetails/2021/03/30/1617107308322_AccessPointDetailsv4.csv.gz`.
//! The separator and version marker come from [`KeyConvention`]. Only keys
//! that recompose to exactly the same string are accepted, so
//! `recompose(decompose(k)) == k` holds for every key `decompose` accepts.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path::DELIMITER;

/// Separator between the fields of a file name
const DEFAULT_SEPARATOR: char = '_';

/// Marker that introduces the version number after the table name
const DEFAULT_VERSION_MARKER: &str = "v";

/// Naming convention for statistics file keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyConvention {
    /// Separator between timestamp, table name and subtable
    #[serde(default = "default_separator")]
    pub separator: char,

    /// Text that precedes the version number
    #[serde(default = "default_version_marker")]
    pub version_marker: String,
}

fn default_separator() -> char {
    DEFAULT_SEPARATOR
}

fn default_version_marker() -> String {
    DEFAULT_VERSION_MARKER.to_string()
}

impl Default for KeyConvention {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            version_marker: default_version_marker(),
        }
    }
}

/// The fields of a decomposed key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyParts {
    /// Everything before the final `/`
    pub prefix: String,
    /// Epoch milliseconds embedded in the file name
    pub msec: u64,
    /// Logical table name; subtable keys yield `<base><sep><subtable>`
    pub tablename: String,
    /// Schema version, `None` when the file name carries no version marker
    pub version: Option<u32>,
    /// Everything after the first `.` of the file name, e.g. `csv.gz`
    pub suffix: String,
}

impl KeyParts {
    /// The embedded timestamp
    pub fn timestamp(&self) -> Option<jiff::Timestamp> {
        let msec = i64::try_from(self.msec).ok()?;
        jiff::Timestamp::from_millisecond(msec).ok()
    }
}

/// Parses and rebuilds object keys under a [`KeyConvention`]
#[derive(Debug, Clone)]
pub struct KeyCodec {
    convention: KeyConvention,
    split: Regex,
    subtable: Regex,
    versioned: Regex,
}

impl KeyCodec {
    /// Compile the patterns for a convention
    pub fn new(convention: KeyConvention) -> Result<Self> {
        let sep = convention.separator;
        if sep == DELIMITER || sep == '.' || sep.is_ascii_digit() {
            return Err(Error::Config(format!(
                "key separator '{sep}' must not be '/', '.' or a digit"
            )));
        }
        let marker = &convention.version_marker;
        if marker.is_empty()
            || marker.contains(sep)
            || marker.contains(['/', '.'])
            || marker.ends_with(|c: char| c.is_ascii_digit())
        {
            return Err(Error::Config(format!(
                "invalid version marker '{marker}'"
            )));
        }

        let sep = regex::escape(&sep.to_string());
        let marker = regex::escape(marker);
        let split = Regex::new(&format!(r"^(.*)/([0-9]+){sep}([^./]*)\.([^/]*)$"))?;
        let subtable = Regex::new(&format!(r"^([^{sep}]+){marker}([0-9]+)({sep}.+)$"))?;
        let versioned = Regex::new(&format!(r"^(.+){marker}([0-9]+)$"))?;

        Ok(Self {
            convention,
            split,
            subtable,
            versioned,
        })
    }

    /// The convention this codec was built for
    pub fn convention(&self) -> &KeyConvention {
        &self.convention
    }

    /// Split a key into its fields
    pub fn decompose(&self, key: &str) -> Result<KeyParts> {
        let caps = self.split.captures(key).ok_or_else(|| {
            Error::malformed(
                key,
                format!(
                    "expected <prefix>/<msec>{}<table>.<suffix>",
                    self.convention.separator
                ),
            )
        })?;

        let msec = parse_canonical::<u64>(key, "timestamp", &caps[2])?;
        let table = &caps[3];
        if table.is_empty() {
            return Err(Error::malformed(key, "empty table name"));
        }

        let (tablename, version) = if let Some(m) = self.subtable.captures(table) {
            let version = parse_canonical::<u32>(key, "version", &m[2])?;
            (format!("{}{}", &m[1], &m[3]), Some(version))
        } else if let Some(m) = self.versioned.captures(table) {
            let version = parse_canonical::<u32>(key, "version", &m[2])?;
            (m[1].to_string(), Some(version))
        } else {
            (table.to_string(), None)
        };

        let parts = KeyParts {
            prefix: caps[1].to_string(),
            msec,
            tablename,
            version,
            suffix: caps[4].to_string(),
        };

        if self.render(&parts) != key {
            return Err(Error::malformed(
                key,
                "table name is ambiguous under the key convention",
            ));
        }
        Ok(parts)
    }

    /// Rebuild a key from its fields
    ///
    /// Fails when the fields would produce a key that decomposes differently,
    /// e.g. an unversioned table name that itself ends in a version marker.
    pub fn recompose(&self, parts: &KeyParts) -> Result<String> {
        let key = self.render(parts);
        match self.decompose(&key) {
            Ok(decoded) if decoded == *parts => Ok(key),
            Ok(_) => Err(Error::malformed(
                key,
                "fields do not survive a round trip under the key convention",
            )),
            Err(e) => Err(e),
        }
    }

    fn render(&self, parts: &KeyParts) -> String {
        let sep = self.convention.separator;
        let table = match parts.version {
            Some(version) => match parts.tablename.split_once(sep) {
                Some((base, sub)) => format!(
                    "{base}{}{version}{sep}{sub}",
                    self.convention.version_marker
                ),
                None => format!(
                    "{}{}{version}",
                    parts.tablename, self.convention.version_marker
                ),
            },
            None => parts.tablename.clone(),
        };
        format!(
            "{}/{}{sep}{table}.{}",
            parts.prefix, parts.msec, parts.suffix
        )
    }
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self::new(KeyConvention::default()).expect("default key convention compiles")
    }
}

/// Parse a decimal field, rejecting leading zeros and overflow
fn parse_canonical<T>(key: &str, field: &str, digits: &str) -> Result<T>
where
    T: std::str::FromStr + ToString,
{
    let value: T = digits
        .parse()
        .map_err(|_| Error::malformed(key, format!("{field} '{digits}' is out of range")))?;
    if value.to_string() != digits {
        return Err(Error::malformed(
            key,
            format!("{field} '{digits}' has leading zeros"),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const APD: &str =
        "dar5/AccessPointDetails/2021/03/30/1617107308322_AccessPointDetailsv4.csv.gz";

    fn codec() -> KeyCodec {
        KeyCodec::default()
    }

    #[test]
    fn test_decompose_versioned() {
        let parts = codec().decompose(APD).unwrap();
        assert_eq!(parts.prefix, "dar5/AccessPointDetails/2021/03/30");
        assert_eq!(parts.msec, 1_617_107_308_322);
        assert_eq!(parts.tablename, "AccessPointDetails");
        assert_eq!(parts.version, Some(4));
        assert_eq!(parts.suffix, "csv.gz");
    }

    #[test]
    fn test_decompose_subtable() {
        let parts = codec()
            .decompose("p/1618105577372_ClientCountsv4_Radio.csv")
            .unwrap();
        assert_eq!(parts.tablename, "ClientCounts_Radio");
        assert_eq!(parts.version, Some(4));
        assert_eq!(parts.suffix, "csv");
    }

    #[test]
    fn test_decompose_unversioned() {
        let parts = codec().decompose("p/q/42_Summary.json").unwrap();
        assert_eq!(parts.prefix, "p/q");
        assert_eq!(parts.tablename, "Summary");
        assert_eq!(parts.version, None);
    }

    #[test]
    fn test_round_trip_well_formed_keys() {
        let codec = codec();
        for key in [
            APD,
            "p/1618105577372_ClientCountsv4_Radio.csv",
            "p/q/42_Summary.json",
            "/0_Tv0.csv",
            "a/b/c/1_Foov2v3_x.tar.gz",
            "a/7_Tablev12.",
        ] {
            let parts = codec.decompose(key).unwrap();
            assert_eq!(codec.recompose(&parts).unwrap(), key, "key {key}");
        }
    }

    #[test]
    fn test_malformed_keys_rejected() {
        let codec = codec();
        for key in [
            "",
            "no-slash_1_Tv1.csv",
            "p/Tv1.csv",
            "p/abc_Tv1.csv",
            "p/123_Tv1",
            "p/123_.csv",
            "p/0123_Tv1.csv",
            "p/123_Tv01.csv",
            "p/99999999999999999999999_Tv1.csv",
            "p/123_Tv99999999999.csv",
            "p/123_T.csv/extra",
            "p/123_Foo_barv3.csv",
        ] {
            let err = codec.decompose(key).unwrap_err();
            assert!(
                matches!(err, Error::MalformedKey { .. }),
                "expected MalformedKey for {key:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_recompose_rejects_ambiguous_fields() {
        let parts = KeyParts {
            prefix: "p".into(),
            msec: 1,
            tablename: "Foov2".into(),
            version: None,
            suffix: "csv".into(),
        };
        assert!(matches!(
            codec().recompose(&parts).unwrap_err(),
            Error::MalformedKey { .. }
        ));
    }

    #[test]
    fn test_custom_convention() {
        let codec = KeyCodec::new(KeyConvention {
            separator: '-',
            version_marker: "_v".into(),
        })
        .unwrap();
        let key = "stats/1617107308322-Radio_v7.csv";
        let parts = codec.decompose(key).unwrap();
        assert_eq!(parts.tablename, "Radio");
        assert_eq!(parts.version, Some(7));
        assert_eq!(codec.recompose(&parts).unwrap(), key);
    }

    #[test]
    fn test_invalid_convention() {
        assert!(KeyCodec::new(KeyConvention {
            separator: '/',
            ..Default::default()
        })
        .is_err());
        assert!(KeyCodec::new(KeyConvention {
            version_marker: String::new(),
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn test_timestamp() {
        let parts = codec().decompose(APD).unwrap();
        let ts = parts.timestamp().unwrap();
        assert_eq!(ts.as_millisecond(), 1_617_107_308_322);
    }
}
