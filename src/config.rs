// src/config.rs
//
// Codec configuration. Every field has a default, so an empty or partial
// TOML file is valid:
//
//   crc_polynomial = 0x4599
//   stuff_trigger = 5
//   resync_recessive_bits = 10
//   data_byte_order = "big"
//   round_trip_check = true

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::crc::{polynomial_width, CAN_CRC_POLYNOMIAL};
use crate::error::{CodecError, CodecResult};
use crate::frame::CRC_BITS;
use crate::stuffing::DEFAULT_STUFF_TRIGGER;

/// Order the data bytes are listed in when a frame is displayed.
/// Never affects the bits on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    #[serde(default = "default_crc_polynomial")]
    pub crc_polynomial: u32,
    #[serde(default = "default_stuff_trigger")]
    pub stuff_trigger: u8,
    /// Consecutive recessive bits that end a failed frame
    #[serde(default = "default_resync_recessive_bits")]
    pub resync_recessive_bits: u32,
    #[serde(default)]
    pub data_byte_order: ByteOrder,
    /// Re-encode every successfully decoded frame and compare
    #[serde(default = "default_round_trip_check")]
    pub round_trip_check: bool,
}

fn default_crc_polynomial() -> u32 {
    CAN_CRC_POLYNOMIAL
}

fn default_stuff_trigger() -> u8 {
    DEFAULT_STUFF_TRIGGER
}

fn default_resync_recessive_bits() -> u32 {
    10
}

fn default_round_trip_check() -> bool {
    true
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            crc_polynomial: default_crc_polynomial(),
            stuff_trigger: default_stuff_trigger(),
            resync_recessive_bits: default_resync_recessive_bits(),
            data_byte_order: ByteOrder::default(),
            round_trip_check: default_round_trip_check(),
        }
    }
}

impl CodecConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> CodecResult<Self> {
        let config: CodecConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> CodecResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Load the per-user config file if there is one, otherwise defaults.
    pub fn load_or_default() -> CodecResult<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(CodecConfig::default()),
        }
    }

    pub fn validate(&self) -> CodecResult<()> {
        let width = polynomial_width(self.crc_polynomial);
        if width != CRC_BITS {
            return Err(CodecError::Config(format!(
                "crc_polynomial 0x{:x} is {} bits wide, the CRC field holds {}",
                self.crc_polynomial, width, CRC_BITS
            )));
        }
        if !(2..=8).contains(&self.stuff_trigger) {
            return Err(CodecError::Config(format!(
                "stuff_trigger must be between 2 and 8 (got {})",
                self.stuff_trigger
            )));
        }
        if !(1..=64).contains(&self.resync_recessive_bits) {
            return Err(CodecError::Config(format!(
                "resync_recessive_bits must be between 1 and 64 (got {})",
                self.resync_recessive_bits
            )));
        }
        Ok(())
    }
}

/// `<config dir>/canbits/canbits.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("canbits").join("canbits.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CodecConfig::default();
        assert_eq!(config.crc_polynomial, 0x4599);
        assert_eq!(config.stuff_trigger, 5);
        assert_eq!(config.resync_recessive_bits, 10);
        assert_eq!(config.data_byte_order, ByteOrder::Big);
        assert!(config.round_trip_check);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        assert_eq!(CodecConfig::from_toml_str("").unwrap(), CodecConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = CodecConfig::from_toml_str(
            "data_byte_order = \"little\"\nround_trip_check = false\n",
        )
        .unwrap();
        assert_eq!(config.data_byte_order, ByteOrder::Little);
        assert!(!config.round_trip_check);
        assert_eq!(config.stuff_trigger, 5);
    }

    #[test]
    fn test_rejects_wrong_polynomial_width() {
        let err = CodecConfig::from_toml_str("crc_polynomial = 0x8005").unwrap_err();
        assert!(matches!(err, CodecError::Config(_)));
        assert!(err.to_string().contains("16 bits"));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(CodecConfig::from_toml_str("stuff_trigger = 1").is_err());
        assert!(CodecConfig::from_toml_str("stuff_trigger = 9").is_err());
        assert!(CodecConfig::from_toml_str("resync_recessive_bits = 0").is_err());
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = CodecConfig::from_toml_str("stuff_trigger = \"five\"").unwrap_err();
        assert!(matches!(err, CodecError::Toml(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "resync_recessive_bits = 11").unwrap();
        let config = CodecConfig::load(file.path()).unwrap();
        assert_eq!(config.resync_recessive_bits, 11);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CodecConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, CodecError::Io(_)));
    }
}
