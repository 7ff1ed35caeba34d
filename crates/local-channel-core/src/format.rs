//! Media formats and format capability sets

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A media format a channel can read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Format {
    Ulaw,
    Alaw,
    G722,
    G726,
    Gsm,
    Slin16,
    Slin,
    Speex,
    Ilbc,
    G729,
    Opus,
    H263,
    H264,
    Vp8,
}

impl Format {
    /// Audio formats in the order `best()` prefers them
    const AUDIO_PREFERENCE: [Format; 11] = [
        Format::Ulaw,
        Format::Alaw,
        Format::G722,
        Format::Slin16,
        Format::Slin,
        Format::G726,
        Format::Gsm,
        Format::Opus,
        Format::Speex,
        Format::Ilbc,
        Format::G729,
    ];

    pub const ALL: [Format; 14] = [
        Format::Ulaw,
        Format::Alaw,
        Format::G722,
        Format::G726,
        Format::Gsm,
        Format::Slin16,
        Format::Slin,
        Format::Speex,
        Format::Ilbc,
        Format::G729,
        Format::Opus,
        Format::H263,
        Format::H264,
        Format::Vp8,
    ];

    pub fn is_video(&self) -> bool {
        matches!(self, Format::H263 | Format::H264 | Format::Vp8)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Format::Ulaw => "ulaw",
            Format::Alaw => "alaw",
            Format::G722 => "g722",
            Format::G726 => "g726",
            Format::Gsm => "gsm",
            Format::Slin16 => "slin16",
            Format::Slin => "slin",
            Format::Speex => "speex",
            Format::Ilbc => "ilbc",
            Format::G729 => "g729",
            Format::Opus => "opus",
            Format::H263 => "h263",
            Format::H264 => "h264",
            Format::Vp8 => "vp8",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of formats
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatCapabilities {
    formats: BTreeSet<Format>,
}

impl FormatCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every known format
    pub fn all() -> Self {
        Format::ALL.iter().copied().collect()
    }

    pub fn add(&mut self, format: Format) {
        self.formats.insert(format);
    }

    pub fn contains(&self, format: Format) -> bool {
        self.formats.contains(&format)
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Format> + '_ {
        self.formats.iter().copied()
    }

    /// Pick the preferred audio format, falling back to any format present
    pub fn best(&self) -> Option<Format> {
        Format::AUDIO_PREFERENCE
            .iter()
            .copied()
            .find(|f| self.contains(*f))
            .or_else(|| self.formats.iter().next().copied())
    }
}

impl FromIterator<Format> for FormatCapabilities {
    fn from_iter<I: IntoIterator<Item = Format>>(iter: I) -> Self {
        Self {
            formats: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_prefers_ulaw() {
        let caps: FormatCapabilities = [Format::Gsm, Format::Ulaw, Format::H264].into_iter().collect();
        assert_eq!(caps.best(), Some(Format::Ulaw));
    }

    #[test]
    fn test_best_falls_back_to_video() {
        let caps: FormatCapabilities = [Format::H264].into_iter().collect();
        assert_eq!(caps.best(), Some(Format::H264));
        assert_eq!(FormatCapabilities::new().best(), None);
    }

    #[test]
    fn test_all() {
        let caps = FormatCapabilities::all();
        assert_eq!(caps.len(), Format::ALL.len());
        assert!(caps.contains(Format::Vp8));
        assert!(Format::Vp8.is_video());
    }
}
