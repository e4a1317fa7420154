pub mod data_bits;
pub mod parity;
pub mod stop_bits;

use std::fmt;

pub use data_bits::DataBits;
pub use parity::Parity;
pub use stop_bits::StopBits;

/// Line parameters for the RS-485 link. Modbus RTU is conventionally
/// 8 data bits, no parity, 1 stop bit; masters under test occasionally
/// run even parity, so the operator may override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LineSettings {
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl fmt::Display for LineSettings {
    /// Conventional shorthand, e.g. `8N1`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.data_bits.bits(),
            self.parity.letter(),
            self.stop_bits.bits()
        )
    }
}

impl From<DataBits> for tokio_serial::DataBits {
    fn from(value: DataBits) -> Self {
        match value {
            DataBits::Five => Self::Five,
            DataBits::Six => Self::Six,
            DataBits::Seven => Self::Seven,
            DataBits::Eight => Self::Eight,
        }
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(value: Parity) -> Self {
        match value {
            Parity::Odd => Self::Odd,
            Parity::Even => Self::Even,
            Parity::None => Self::None,
        }
    }
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(value: StopBits) -> Self {
        match value {
            StopBits::One => Self::One,
            StopBits::Two => Self::Two,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_line_is_8n1() {
        let line = LineSettings::default();
        assert_eq!(line.data_bits, DataBits::Eight);
        assert_eq!(line.parity, Parity::None);
        assert_eq!(line.stop_bits, StopBits::One);
    }

    #[test]
    fn parses_word_and_shorthand_spellings() {
        assert_eq!("eight".parse::<DataBits>().unwrap(), DataBits::Eight);
        assert_eq!("8".parse::<DataBits>().unwrap(), DataBits::Eight);
        assert_eq!("none".parse::<Parity>().unwrap(), Parity::None);
        assert_eq!("E".parse::<Parity>().unwrap(), Parity::Even);
        assert_eq!("two".parse::<StopBits>().unwrap(), StopBits::Two);
        assert_eq!("1".parse::<StopBits>().unwrap(), StopBits::One);
        assert!("three".parse::<StopBits>().is_err());
    }

    #[test]
    fn line_displays_as_shorthand() {
        assert_eq!(LineSettings::default().to_string(), "8N1");
        let line = LineSettings {
            data_bits: DataBits::Seven,
            parity: Parity::Even,
            stop_bits: StopBits::Two,
        };
        assert_eq!(line.to_string(), "7E2");
    }
}
