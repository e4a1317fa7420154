use std::{fmt, str::FromStr};

use rootcause::{report, Report};

/// Stop bits on the RS-485 link.
///
/// The Modbus spec asks for two stop bits when parity is off, but most
/// field masters ship 8N1 regardless, so the default line settings use
/// one and the operator can override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    One,
    Two,
}

impl StopBits {
    /// Digit used in 8N1-style line shorthand.
    pub fn bits(&self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl FromStr for StopBits {
    type Err = Report;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one" | "One" | "1" => Ok(Self::One),
            "two" | "Two" | "2" => Ok(Self::Two),
            _ => Err(report!("unknown stop bits: {}", s)),
        }
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::One => "one",
            Self::Two => "two",
        };
        f.write_str(s)
    }
}
