//! Configuration enum types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Directory organization scheme under the save root.
///
/// Controls where a new screenshot lands relative to `storage.save_dir`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OrganizeMode {
    /// Nested `YYYY/MM/DD` directories from the capture timestamp
    ByDate,
    /// One directory per application name (sanitized)
    ByApplication,
    /// Everything directly under the save root
    Flat,
}

impl fmt::Display for OrganizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrganizeMode::ByDate => "by-date",
            OrganizeMode::ByApplication => "by-application",
            OrganizeMode::Flat => "flat",
        };
        write!(f, "{name}")
    }
}

impl FromStr for OrganizeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "by-date" | "date" => Ok(OrganizeMode::ByDate),
            "by-application" | "application" | "app" => Ok(OrganizeMode::ByApplication),
            "flat" | "none" => Ok(OrganizeMode::Flat),
            other => Err(format!(
                "unknown organize mode '{other}' (expected by-date, by-application, or flat)"
            )),
        }
    }
}

/// On-disk image encoding for archived screenshots.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            other => Err(format!("unknown image format '{other}' (expected png or jpeg)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn organize_mode_parses_aliases() {
        assert_eq!("date".parse::<OrganizeMode>().unwrap(), OrganizeMode::ByDate);
        assert_eq!(
            "by-application".parse::<OrganizeMode>().unwrap(),
            OrganizeMode::ByApplication
        );
        assert_eq!("none".parse::<OrganizeMode>().unwrap(), OrganizeMode::Flat);
        assert!("tree".parse::<OrganizeMode>().is_err());
    }

    #[test]
    fn image_format_maps_jpg_alias() {
        assert_eq!("jpg".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::Png.extension(), "png");
        assert!("webp".parse::<ImageFormat>().is_err());
    }
}
