use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::BackupError;

/// Resolution tier served under `/images/<size>/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum ImageSize {
    #[serde(rename = "480")]
    #[value(name = "480")]
    Px480,
    #[serde(rename = "640")]
    #[value(name = "640")]
    Px640,
    #[serde(rename = "1280")]
    #[value(name = "1280")]
    Px1280,
    #[serde(rename = "orig")]
    #[value(name = "orig")]
    Orig,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::Px480 => "480",
            ImageSize::Px640 => "640",
            ImageSize::Px1280 => "1280",
            ImageSize::Orig => "orig",
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageSize {
    type Err = BackupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "480" => Ok(ImageSize::Px480),
            "640" => Ok(ImageSize::Px640),
            "1280" => Ok(ImageSize::Px1280),
            "orig" => Ok(ImageSize::Orig),
            _ => Err(BackupError::InvalidImageSize(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationId(u64);

impl ObservationId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// Prefix shared by every archive entry of this observation.
    pub fn entry_prefix(&self) -> String {
        format!("{}/", self.0)
    }
}

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObservationId {
    type Err = BackupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| BackupError::InvalidObservationId(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(u64);

impl ImageId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Login name or numeric id of a Mushroom Observer user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserRef(String);

impl UserRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserRef {
    type Err = BackupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && !normalized
                .chars()
                .any(|ch| ch.is_control() || ch == '/' || ch == '&');
        if !is_valid {
            return Err(BackupError::InvalidUser(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Per-observation entries plus photos, skipping what is already archived.
    Sync,
    /// One `<user>.json` entry with every observation's detail, no photos.
    Snapshot,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_image_size() {
        assert_eq!("640".parse::<ImageSize>().unwrap(), ImageSize::Px640);
        assert_eq!("ORIG".parse::<ImageSize>().unwrap(), ImageSize::Orig);
        assert_eq!(ImageSize::Px1280.to_string(), "1280");
    }

    #[test]
    fn parse_image_size_invalid() {
        let err = "320".parse::<ImageSize>().unwrap_err();
        assert_matches!(err, BackupError::InvalidImageSize(_));
        assert_matches!(
            "original".parse::<ImageSize>(),
            Err(BackupError::InvalidImageSize(_))
        );
        assert!(serde_json::from_str::<ImageSize>("\"original\"").is_err());
    }

    #[test]
    fn image_size_serde_uses_tier_names() {
        let json = serde_json::to_string(&ImageSize::Px480).unwrap();
        assert_eq!(json, "\"480\"");
        let size: ImageSize = serde_json::from_str("\"orig\"").unwrap();
        assert_eq!(size, ImageSize::Orig);
    }

    #[test]
    fn parse_observation_id() {
        let id: ObservationId = " 12345 ".parse().unwrap();
        assert_eq!(id.get(), 12345);
        assert_eq!(id.entry_prefix(), "12345/");
        assert_matches!(
            "12a".parse::<ObservationId>(),
            Err(BackupError::InvalidObservationId(_))
        );
    }

    #[test]
    fn parse_user_ref() {
        let user: UserRef = " dwilderness ".parse().unwrap();
        assert_eq!(user.as_str(), "dwilderness");
        assert_matches!("  ".parse::<UserRef>(), Err(BackupError::InvalidUser(_)));
        assert_matches!("a&b=1".parse::<UserRef>(), Err(BackupError::InvalidUser(_)));
    }
}
