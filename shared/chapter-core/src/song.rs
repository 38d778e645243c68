//! Recognized song record

use serde::{Deserialize, Serialize};

/// First-ranked catalog match for a chapter sample
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub name: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub translated_name: Option<String>,
    #[serde(default)]
    pub popularity: Option<f64>,
}

impl RecognitionResult {
    pub fn new(name: impl Into<String>, artists: Vec<String>) -> Self {
        Self {
            name: name.into(),
            artists,
            ..Self::default()
        }
    }

    /// Artist names joined with `", "`
    pub fn artists_joined(&self) -> String {
        self.artists.join(", ")
    }

    pub fn first_artist(&self) -> &str {
        self.artists.first().map(|a| a.trim()).unwrap_or("")
    }

    /// Translated name, or `""` when absent
    pub fn translated(&self) -> &str {
        self.translated_name.as_deref().unwrap_or("")
    }
}
