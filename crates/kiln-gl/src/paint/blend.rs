use std::fmt;
use std::str::FromStr;

use crate::gl::BlendFactor;

/// Composite operation applied to subsequent draws.
///
/// Colors are premultiplied, so every mode is expressed as a
/// `blendFunc(src, dst)` pair.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum BlendMode {
    #[default]
    SourceOver,
    Lighter,
    LighterIn,
    DestinationOut,
    DestinationIn,
}

impl BlendMode {
    pub const fn factors(self) -> (BlendFactor, BlendFactor) {
        match self {
            BlendMode::SourceOver => (BlendFactor::One, BlendFactor::OneMinusSrcAlpha),
            BlendMode::Lighter => (BlendFactor::One, BlendFactor::One),
            BlendMode::LighterIn => (BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha),
            BlendMode::DestinationOut => (BlendFactor::Zero, BlendFactor::OneMinusSrcAlpha),
            BlendMode::DestinationIn => (BlendFactor::Zero, BlendFactor::SrcAlpha),
        }
    }

    /// Canvas `globalCompositeOperation` name.
    pub const fn as_str(self) -> &'static str {
        match self {
            BlendMode::SourceOver => "source-over",
            BlendMode::Lighter => "lighter",
            BlendMode::LighterIn => "lighter-in",
            BlendMode::DestinationOut => "destination-out",
            BlendMode::DestinationIn => "destination-in",
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown composite operation name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBlendMode(pub String);

impl fmt::Display for UnknownBlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown composite operation: {:?}", self.0)
    }
}

impl std::error::Error for UnknownBlendMode {}

impl FromStr for BlendMode {
    type Err = UnknownBlendMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source-over" => Ok(BlendMode::SourceOver),
            "lighter" => Ok(BlendMode::Lighter),
            "lighter-in" => Ok(BlendMode::LighterIn),
            "destination-out" => Ok(BlendMode::DestinationOut),
            "destination-in" => Ok(BlendMode::DestinationIn),
            other => Err(UnknownBlendMode(other.to_string())),
        }
    }
}
