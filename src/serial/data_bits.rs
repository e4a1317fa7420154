use std::{fmt, str::FromStr};

use rootcause::{report, Report};

/// Character width on the RS-485 link. Modbus RTU is always eight data
/// bits; the narrower widths exist only so an operator can mis-configure
/// the line on purpose when testing a master's error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    /// Digit used in 8N1-style line shorthand.
    pub fn bits(&self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

impl FromStr for DataBits {
    type Err = Report;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "five" | "Five" | "5" => Ok(Self::Five),
            "six" | "Six" | "6" => Ok(Self::Six),
            "seven" | "Seven" | "7" => Ok(Self::Seven),
            "eight" | "Eight" | "8" => Ok(Self::Eight),
            _ => Err(report!("unknown data bits: {}", s)),
        }
    }
}

impl fmt::Display for DataBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Five => "five",
            Self::Six => "six",
            Self::Seven => "seven",
            Self::Eight => "eight",
        };
        f.write_str(s)
    }
}
