use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const ADDRESS_BITS: u32 = u64::BITS;

/// Cache parameters as supplied by the user, either as JSON or from flags.
/// Any of them may be absent until the sources are merged.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub set_bits: Option<u32>,
    pub associativity: Option<usize>,
    pub block_bits: Option<u32>,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Config, ConfigError> {
        serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Values present in `overrides` win over the ones in `self`.
    pub fn merge(self, overrides: Config) -> Config {
        Config {
            set_bits: overrides.set_bits.or(self.set_bits),
            associativity: overrides.associativity.or(self.associativity),
            block_bits: overrides.block_bits.or(self.block_bits),
        }
    }

    pub fn to_geometry(&self) -> Result<Geometry, ConfigError> {
        let set_bits = self.set_bits.ok_or(ConfigError::Missing("set bits (-s)"))?;
        let ways = self
            .associativity
            .ok_or(ConfigError::Missing("associativity (-E)"))?;
        let block_bits = self
            .block_bits
            .ok_or(ConfigError::Missing("block bits (-b)"))?;
        Geometry::new(set_bits, ways, block_bits)
    }
}

/// A validated `(s, E, b)` triple. Fixed for the lifetime of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Geometry {
    set_bits: u32,
    ways: usize,
    block_bits: u32,
}

impl Geometry {
    pub fn new(set_bits: u32, ways: usize, block_bits: u32) -> Result<Self, ConfigError> {
        if ways == 0 {
            return Err(ConfigError::ZeroAssociativity);
        }
        match set_bits.checked_add(block_bits) {
            Some(bits) if bits <= ADDRESS_BITS => {}
            _ => {
                return Err(ConfigError::AddressBitsExceeded {
                    set_bits,
                    block_bits,
                })
            }
        }
        Ok(Geometry {
            set_bits,
            ways,
            block_bits,
        })
    }

    pub fn set_bits(&self) -> u32 {
        self.set_bits
    }

    pub fn ways(&self) -> usize {
        self.ways
    }

    pub fn block_bits(&self) -> u32 {
        self.block_bits
    }

    /// `S = 2^s`, or `None` when it does not fit in a `usize`.
    pub fn n_sets(&self) -> Option<usize> {
        1usize.checked_shl(self.set_bits)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn json_config_parses() {
        let config =
            Config::from_json(r#"{"set_bits": 4, "associativity": 2, "block_bits": 5}"#).unwrap();
        let geometry = config.to_geometry().unwrap();
        assert_eq!(geometry, Geometry::new(4, 2, 5).unwrap());
        assert_eq!(geometry.n_sets(), Some(16));
    }

    #[test]
    fn json_config_rejects_unknown_keys() {
        let err = Config::from_json(r#"{"sets": 4}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn flags_override_json() {
        let file = Config::from_json(r#"{"set_bits": 4, "associativity": 2, "block_bits": 5}"#)
            .unwrap();
        let flags = Config {
            associativity: Some(8),
            ..Config::default()
        };
        let geometry = file.merge(flags).to_geometry().unwrap();
        assert_eq!(geometry.set_bits(), 4);
        assert_eq!(geometry.ways(), 8);
        assert_eq!(geometry.block_bits(), 5);
    }

    #[test]
    fn missing_parameter_is_reported() {
        let config = Config {
            set_bits: Some(1),
            associativity: Some(1),
            block_bits: None,
        };
        assert_eq!(
            config.to_geometry(),
            Err(ConfigError::Missing("block bits (-b)"))
        );
    }

    #[test]
    fn zero_associativity_is_rejected() {
        assert_eq!(Geometry::new(2, 0, 2), Err(ConfigError::ZeroAssociativity));
    }

    #[rstest]
    #[case(0, 0)]
    #[case(0, 64)]
    #[case(64, 0)]
    #[case(32, 32)]
    fn address_bits_up_to_64_are_accepted(#[case] s: u32, #[case] b: u32) {
        assert!(Geometry::new(s, 1, b).is_ok());
    }

    #[rstest]
    #[case(1, 64)]
    #[case(60, 5)]
    #[case(u32::MAX, 1)]
    fn address_bits_over_64_are_rejected(#[case] s: u32, #[case] b: u32) {
        assert_eq!(
            Geometry::new(s, 1, b),
            Err(ConfigError::AddressBitsExceeded {
                set_bits: s,
                block_bits: b
            })
        );
    }

    #[test]
    fn huge_set_count_does_not_fit() {
        let geometry = Geometry::new(64, 1, 0).unwrap();
        assert_eq!(geometry.n_sets(), None);
    }
}
