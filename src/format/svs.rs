//! Aperio SVS metadata.
//!
//! Aperio writes its properties into the first ImageDescription:
//!
//! ```text
//! Aperio Image Library v12.0.5
//! 46000x32914 [0,100 46000x32814] (256x256) JPEG/RGB Q=30|AppMag = 20|MPP = 0.4990|...
//! ```
//!
//! The first `|`-separated chunk is free text; the rest are `key = value`.

use std::collections::BTreeMap;

/// Parsed metadata from an SVS ImageDescription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SvsMetadata {
    /// Microns per pixel at level 0
    pub mpp: Option<f64>,

    /// Objective magnification (e.g. 20, 40)
    pub magnification: Option<f64>,

    /// First line of the description (library and version)
    pub software: Option<String>,

    /// Every `key = value` pair, in key order
    pub properties: BTreeMap<String, String>,
}

impl SvsMetadata {
    pub fn parse(description: &str) -> Self {
        let mut metadata = SvsMetadata {
            software: description
                .lines()
                .next()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.contains('|'))
                .map(str::to_string),
            ..Default::default()
        };

        for part in description.split('|').skip(1) {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "MPP" => metadata.mpp = value.parse().ok().filter(|v: &f64| *v > 0.0),
                "AppMag" => metadata.magnification = value.parse().ok(),
                _ => {}
            }
            metadata
                .properties
                .insert(key.to_string(), value.to_string());
        }

        metadata
    }
}
