//! Configuration management for header codecs
//!
//! Values are layered: built-in defaults, then an optional file (format taken
//! from the extension), then `SPDYHC_*` environment variables.

use crate::codec::DEFAULT_MAX_UNCOMPRESSED;
use crate::error::{CodecError, Result};
use crate::version::SpdyVersion;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest accepted decompression ceiling
pub const MIN_MAX_UNCOMPRESSED: usize = 1024;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "SPDYHC";

/// Header codec configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Protocol version selecting the dictionary and size field width
    pub version: SpdyVersion,
    /// zlib level, 0 disables compression
    pub compression_level: u32,
    /// Largest accepted decompressed header block in bytes
    pub max_uncompressed: usize,
    /// Zeroed bytes reserved at the front of each encoded block
    pub encode_headroom: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            version: SpdyVersion::Spdy3_1,
            compression_level: Compression::default().level(),
            max_uncompressed: DEFAULT_MAX_UNCOMPRESSED,
            encode_headroom: 0,
        }
    }
}

impl CodecConfig {
    pub fn builder() -> CodecConfigBuilder {
        CodecConfigBuilder::new()
    }

    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let loaded: Self = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| CodecError::Config(format!("Failed to load codec config: {}", e)))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.compression_level > 9 {
            return Err(CodecError::Config(format!(
                "compression_level must be between 0 and 9, got {}",
                self.compression_level
            )));
        }

        if self.max_uncompressed < MIN_MAX_UNCOMPRESSED {
            return Err(CodecError::Config(format!(
                "max_uncompressed must be at least {} bytes",
                MIN_MAX_UNCOMPRESSED
            )));
        }

        Ok(())
    }

    pub fn compression(&self) -> Compression {
        Compression::new(self.compression_level)
    }
}

/// Configuration builder for easier setup
#[derive(Debug, Default)]
pub struct CodecConfigBuilder {
    config: CodecConfig,
}

impl CodecConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: SpdyVersion) -> Self {
        self.config.version = version;
        self
    }

    pub fn compression_level(mut self, level: u32) -> Self {
        self.config.compression_level = level;
        self
    }

    pub fn max_uncompressed(mut self, max: usize) -> Self {
        self.config.max_uncompressed = max;
        self
    }

    pub fn encode_headroom(mut self, headroom: usize) -> Self {
        self.config.encode_headroom = headroom;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<CodecConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
