//! Render quality presets

use serde::{Deserialize, Serialize};

/// Renderer quality preset, fixed by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderQuality {
    Low,
    Medium,
    #[default]
    High,
    Production,
    #[serde(rename = "4k")]
    FourK,
}

impl RenderQuality {
    /// Command-line flag selecting this preset
    #[inline]
    #[must_use]
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Low => "-ql",
            Self::Medium => "-qm",
            Self::High => "-qh",
            Self::Production => "-qp",
            Self::FourK => "-qk",
        }
    }

    /// Resolution directory the renderer writes into
    #[inline]
    #[must_use]
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Low => "480p15",
            Self::Medium => "720p30",
            Self::High => "1080p60",
            Self::Production => "1440p60",
            Self::FourK => "2160p60",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_k_round_trips_through_config_name() {
        let q: RenderQuality = serde_json::from_str("\"4k\"").unwrap();
        assert_eq!(q, RenderQuality::FourK);
        assert_eq!(q.flag(), "-qk");
        assert_eq!(q.dir_name(), "2160p60");
    }
}
