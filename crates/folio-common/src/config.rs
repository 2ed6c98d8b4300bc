use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Delimiters used when math is written back as source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MathDelimiters {
    /// `\( .. \)` inline, `\[ .. \]` display
    #[default]
    Brackets,
    /// `$ .. $` inline, `$$ .. $$` display
    Dollars,
}

impl MathDelimiters {
    /// Opening and closing delimiter.
    pub fn pair(self, display: bool) -> (&'static str, &'static str) {
        match (self, display) {
            (Self::Brackets, true) => ("\\[", "\\]"),
            (Self::Brackets, false) => ("\\(", "\\)"),
            (Self::Dollars, true) => ("$$", "$$"),
            (Self::Dollars, false) => ("$", "$"),
        }
    }

    pub fn wrap(self, source: &str, display: bool) -> String {
        let (left, right) = self.pair(display);
        format!("{left}{source}{right}")
    }
}

/// What the export does with math once it has been converted back to source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MathOutput {
    /// Delimited TeX, left for a client-side typesetter
    #[default]
    Source,
    /// Static MathML carrying the TeX as a semantic annotation
    Mathml,
}

/// Typesetting assets linked into the exported document head.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Retypeset {
    None,
    #[default]
    KatexCdn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExportConfig {
    /// Quality used for the lossy candidate encoding, 1-100.
    pub jpeg_quality: u8,
    pub math_delimiters: MathDelimiters,
    pub math_output: MathOutput,
    /// Remove typesetting-engine scripts and styles after math conversion.
    pub strip_engine_assets: bool,
    /// Summary text of the long description disclosure.
    pub long_description_label: String,
    pub retypeset: Retypeset,
    /// Title used when a rendered fragment is wrapped into a full document.
    pub title: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 92,
            math_delimiters: MathDelimiters::default(),
            math_output: MathOutput::default(),
            strip_engine_assets: true,
            long_description_label: "Image description".to_owned(),
            retypeset: Retypeset::default(),
            title: None,
        }
    }
}

impl ExportConfig {
    /// Loads and validates the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = FileStore::new(path).load()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid {
                key: "jpeg-quality",
                message: format!("{} is outside 1..=100", self.jpeg_quality),
            });
        }
        Ok(())
    }
}

/// Reads and writes an [`ExportConfig`] file.
///
/// The format is picked from the file extension; `.json` and `.toml` are supported.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<ExportConfig, ConfigError> {
        let read = || {
            std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
                path: self.path.clone(),
                source,
            })
        };
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(serde_json::from_str(&read()?)?),
            Some("toml") => Ok(toml::from_str(&read()?)?),
            _ => Err(ConfigError::UnsupportedFormat(self.path.clone())),
        }
    }

    pub fn save(&self, config: &ExportConfig) -> Result<(), ConfigError> {
        let contents = match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(config)?,
            Some("toml") => toml::to_string_pretty(config).map_err(|e| ConfigError::Invalid {
                key: "config",
                message: e.to_string(),
            })?,
            _ => return Err(ConfigError::UnsupportedFormat(self.path.clone())),
        };
        std::fs::write(&self.path, contents).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })
    }
}
