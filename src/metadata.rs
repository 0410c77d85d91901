use std::collections::BTreeMap;

/// Flat probe output. Sorted so manifests serialize identically run to run.
pub type ClipMetadata = BTreeMap<String, String>;

pub const ASPECT_RATIO_KEY: &str = "Display aspect ratio";
const STANDARD_DEFINITION_ASPECT: &str = "4:3";

/// Splits each line at its first colon into a trimmed key and value. Lines
/// without a colon (section headers, blanks) are dropped. mediainfo repeats
/// keys across its General/Video/Audio sections; the last one wins.
pub fn parse_probe_output(text: &str) -> ClipMetadata {
    let mut out = ClipMetadata::new();
    for line in text.lines() {
        if let Some((key, value)) = line.split_once(':') {
            out.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    out
}

/// Output size token handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailPreset {
    Hd720,
    Vga,
}

impl ThumbnailPreset {
    pub fn for_metadata(metadata: &ClipMetadata) -> Self {
        match metadata.get(ASPECT_RATIO_KEY).map(String::as_str) {
            Some(STANDARD_DEFINITION_ASPECT) => ThumbnailPreset::Vga,
            _ => ThumbnailPreset::Hd720,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            ThumbnailPreset::Hd720 => "hd720",
            ThumbnailPreset::Vga => "vga",
        }
    }
}
