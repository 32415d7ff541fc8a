use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier of the codec a depot payload is stored with.
///
/// Only the identifier is part of the format; codecs are supplied at runtime
/// and looked up by this byte. Values without a registered codec are carried
/// through unchanged so newer writers do not break older readers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompressType(pub u8);

impl CompressType {
    /// Payload is stored as-is.
    pub const NONE: Self = Self(0);

    pub const fn id(&self) -> u8 {
        self.0
    }

    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for CompressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "codec-{}", self.0)
        }
    }
}

impl std::str::FromStr for CompressType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("none") {
            return Ok(Self::NONE);
        }
        let digits = s.strip_prefix("codec-").unwrap_or(s);
        digits
            .parse::<u8>()
            .map(Self)
            .map_err(|_| TypeError::UnknownCompressType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        assert_eq!("none".parse::<CompressType>().unwrap(), CompressType::NONE);
        assert_eq!("codec-7".parse::<CompressType>().unwrap(), CompressType(7));
        assert_eq!("3".parse::<CompressType>().unwrap(), CompressType(3));
        assert_eq!(CompressType(7).to_string(), "codec-7");
        assert!("zip".parse::<CompressType>().is_err());
    }
}
