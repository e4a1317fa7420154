//! Modbus RTU wire protocol: function codes, request decoding and response
//! framing.
//!
//! Only the request shapes a slave bank needs are modelled: FC 03/04 reads,
//! FC 06 single writes and FC 16 multi writes. Responses and exception
//! replies are sealed with the trailing little-endian CRC by the builders
//! here; stream reassembly lives in [`parser`].

pub mod crc;
pub mod parser;

pub use crc::crc16;

/// Modbus function codes handled by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read Holding Registers (0x03)
    ReadHoldingRegisters = 0x03,
    /// Read Input Registers (0x04)
    ReadInputRegisters = 0x04,
    /// Write Single Register (0x06)
    WriteSingleRegister = 0x06,
    /// Write Multiple Registers (0x10)
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    /// Map a raw function code byte; `None` for codes the simulator does
    /// not speak, which the parser treats as bus noise.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x03 => Some(Self::ReadHoldingRegisters),
            0x04 => Some(Self::ReadInputRegisters),
            0x06 => Some(Self::WriteSingleRegister),
            0x10 => Some(Self::WriteMultipleRegisters),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadHoldingRegisters => "Read Holding Registers",
            Self::ReadInputRegisters => "Read Input Registers",
            Self::WriteSingleRegister => "Write Single Register",
            Self::WriteMultipleRegisters => "Write Multiple Registers",
        }
    }
}

/// Modbus exception codes used in error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    /// Also used for "write rejected, device locked": Modbus has no
    /// dedicated code for parameter protection.
    SlaveDeviceFailure = 0x04,
}

/// A CRC-validated request frame addressed to some slave.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// FC 03 / FC 04. Both read the same flat bank in this simulator.
    ReadRegisters {
        unit_id: u8,
        function: FunctionCode,
        start: u16,
        count: u16,
    },
    /// FC 06.
    WriteSingle { unit_id: u8, addr: u16, value: u16 },
    /// FC 16. `count` is the declared register quantity; `values` holds
    /// whatever the data section carried, which the dispatcher checks
    /// against `count`.
    WriteMultiple {
        unit_id: u8,
        start: u16,
        count: u16,
        values: Vec<u16>,
    },
}

impl Request {
    pub fn unit_id(&self) -> u8 {
        match self {
            Self::ReadRegisters { unit_id, .. }
            | Self::WriteSingle { unit_id, .. }
            | Self::WriteMultiple { unit_id, .. } => *unit_id,
        }
    }

    pub fn function(&self) -> FunctionCode {
        match self {
            Self::ReadRegisters { function, .. } => *function,
            Self::WriteSingle { .. } => FunctionCode::WriteSingleRegister,
            Self::WriteMultiple { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }
}

/// Decode one complete frame (CRC already verified, CRC bytes excluded).
///
/// Returns `None` when the byte layout does not match the function code;
/// the parser then resumes its byte-shift resync.
pub(crate) fn decode(frame: &[u8]) -> Option<Request> {
    if frame.len() < 2 {
        return None;
    }
    let unit_id = frame[0];
    let function = FunctionCode::from_u8(frame[1])?;
    match function {
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            if frame.len() != 6 {
                return None;
            }
            Some(Request::ReadRegisters {
                unit_id,
                function,
                start: u16::from_be_bytes([frame[2], frame[3]]),
                count: u16::from_be_bytes([frame[4], frame[5]]),
            })
        }
        FunctionCode::WriteSingleRegister => {
            if frame.len() != 6 {
                return None;
            }
            Some(Request::WriteSingle {
                unit_id,
                addr: u16::from_be_bytes([frame[2], frame[3]]),
                value: u16::from_be_bytes([frame[4], frame[5]]),
            })
        }
        FunctionCode::WriteMultipleRegisters => {
            if frame.len() < 7 {
                return None;
            }
            let byte_count = frame[6] as usize;
            if frame.len() != 7 + byte_count {
                return None;
            }
            let values = frame[7..]
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            Some(Request::WriteMultiple {
                unit_id,
                start: u16::from_be_bytes([frame[2], frame[3]]),
                count: u16::from_be_bytes([frame[4], frame[5]]),
                values,
            })
        }
    }
}

/// Append the little-endian CRC to a PDU, producing a wire-ready frame.
pub fn seal(mut frame: Vec<u8>) -> Vec<u8> {
    let crc = crc16(&frame);
    frame.push((crc & 0xFF) as u8);
    frame.push((crc >> 8) as u8);
    frame
}

/// Build an FC 03/04 read response carrying register values.
pub fn read_response(unit_id: u8, function: FunctionCode, values: &[u16]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(5 + values.len() * 2);
    frame.push(unit_id);
    frame.push(function as u8);
    frame.push((values.len() * 2) as u8);
    for value in values {
        frame.extend_from_slice(&value.to_be_bytes());
    }
    seal(frame)
}

/// Build an FC 06 response, which echoes the request on the wire.
pub fn write_single_response(unit_id: u8, addr: u16, value: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8);
    frame.push(unit_id);
    frame.push(FunctionCode::WriteSingleRegister as u8);
    frame.extend_from_slice(&addr.to_be_bytes());
    frame.extend_from_slice(&value.to_be_bytes());
    seal(frame)
}

/// Build an FC 16 response acknowledging the written range.
pub fn write_multiple_response(unit_id: u8, start: u16, count: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8);
    frame.push(unit_id);
    frame.push(FunctionCode::WriteMultipleRegisters as u8);
    frame.extend_from_slice(&start.to_be_bytes());
    frame.extend_from_slice(&count.to_be_bytes());
    seal(frame)
}

/// Build an exception response: function code with the high bit set,
/// followed by the reason code.
pub fn exception_response(unit_id: u8, function: FunctionCode, code: ExceptionCode) -> Vec<u8> {
    seal(vec![unit_id, function as u8 | 0x80, code as u8])
}

/// Split an `f32` across two registers, most significant word at the base
/// address (inverter mirror fields and energy meter floats).
pub fn f32_to_words(value: f32) -> [u16; 2] {
    let bits = value.to_bits();
    [(bits >> 16) as u16, bits as u16]
}

/// Split an `f32` across two registers in CDAB order: low-order word at the
/// lower address (flow meter quirk, preserved bit-for-bit).
pub fn f32_to_words_cdab(value: f32) -> [u16; 2] {
    let bits = value.to_bits();
    [bits as u16, (bits >> 16) as u16]
}

/// Reassemble an `f32` from two registers, most significant word first.
pub fn words_to_f32(words: [u16; 2]) -> f32 {
    f32::from_bits((u32::from(words[0]) << 16) | u32::from(words[1]))
}
