//! Fixed message templates
//!
//! Message format: `## <opcode> <payload> \r \n`. Outgoing templates are
//! sent verbatim (or with a few digit positions filled in); response
//! templates are compared with `0x00` as a wildcard.

use super::ProtocolError;

/// An immutable byte template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolMessage {
    /// Name used in diagnostics and errors
    pub name: &'static str,
    /// Template bytes
    pub bytes: &'static [u8],
}

impl ProtocolMessage {
    /// Template length in bytes
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Zero-length template
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Opcode byte following the `##` marker
    pub const fn opcode(&self) -> u8 {
        self.bytes[2]
    }
}

/// Returns the device to its power-up speed
pub const RESET: ProtocolMessage = ProtocolMessage {
    name: "reset",
    bytes: b"##\xf0RS\r\n",
};

/// The device echoes the reset command
pub const RESET_RESPONSE: ProtocolMessage = ProtocolMessage {
    name: "reset",
    bytes: b"##\xf0RS\r\n",
};

/// Announces the switch to high speed
pub const SPEED_PHASE_ONE: ProtocolMessage = ProtocolMessage {
    name: "speed phase 1",
    bytes: b"##\xf1HS\r\n",
};

/// Bytes 3-4 carry a firmware-dependent speed code
pub const SPEED_PHASE_ONE_RESPONSE: ProtocolMessage = ProtocolMessage {
    name: "speed phase 1",
    bytes: b"##\xf1\x00\x00\r\n",
};

/// Confirms high speed once the line has been retuned
pub const SPEED_PHASE_TWO: ProtocolMessage = ProtocolMessage {
    name: "speed phase 2",
    bytes: b"##\xf2HS\r\n",
};

/// Byte 5 is a status digit
pub const SPEED_PHASE_TWO_RESPONSE: ProtocolMessage = ProtocolMessage {
    name: "speed phase 2",
    bytes: b"##\xf2OK\x00\r\n",
};

/// Asks for the sampling interval
pub const QUERY_SAMPLING: ProtocolMessage = ProtocolMessage {
    name: "query sampling",
    bytes: b"##\xf3SR\r\n",
};

/// Prefix only; ASCII digits and a comma follow
pub const QUERY_SAMPLING_RESPONSE: ProtocolMessage = ProtocolMessage {
    name: "query sampling",
    bytes: b"##\xf3",
};

/// Digits at offsets 3 and 4 are replaced with the requested rate
pub const SET_SAMPLING: ProtocolMessage = ProtocolMessage {
    name: "set sampling",
    bytes: b"##\xf400,SET\r\n",
};

/// Prefix only; the device echoes the rate after it
pub const SET_SAMPLING_RESPONSE: ProtocolMessage = ProtocolMessage {
    name: "set sampling",
    bytes: b"##\xf4",
};

/// Erases every stored point; not acknowledged
pub const CLEAR: ProtocolMessage = ProtocolMessage {
    name: "clear",
    bytes: b"##\xf5CL\r\n",
};

/// Asks for the stored point count
pub const DOWNLOAD_START: ProtocolMessage = ProtocolMessage {
    name: "download start",
    bytes: b"##\xf6DL\r\n",
};

/// Prefix only; `<count>,<count+1>*\r\n` follows
pub const DOWNLOAD_START_RESPONSE: ProtocolMessage = ProtocolMessage {
    name: "download start",
    bytes: b"##\xf6",
};

/// Per-point request prefix; also the echo at the start of each record
pub const DOWNLOAD_ENTRY: ProtocolMessage = ProtocolMessage {
    name: "download entry",
    bytes: b"##\xf7",
};

/// Exact read length of the reset echo
pub const RESET_RESPONSE_LEN: usize = 7;
/// Exact read length of the speed phase 1 answer
pub const SPEED_PHASE_ONE_RESPONSE_LEN: usize = 7;
/// Exact read length of the speed phase 2 answer
pub const SPEED_PHASE_TWO_RESPONSE_LEN: usize = 8;
/// Exact read length of the set-sampling answer
pub const SET_SAMPLING_RESPONSE_LEN: usize = 7;
/// Compared prefix of variable-length answers
pub const RESPONSE_PREFIX_LEN: usize = 3;

/// Offsets of the tens and units digits in [`SET_SAMPLING`]
pub const SET_SAMPLING_DIGITS: (usize, usize) = (3, 4);

/// Largest sample rate the two digit field can carry
pub const MAX_SAMPLE_RATE: u32 = 99;

/// Fill the set-sampling template with `rate` as two ASCII digits
pub fn sample_set_message(rate: u32) -> Result<[u8; 11], ProtocolError> {
    if rate > MAX_SAMPLE_RATE {
        return Err(ProtocolError::InvalidSampleRate(rate));
    }
    let mut message = [0u8; 11];
    message.copy_from_slice(SET_SAMPLING.bytes);

    let (tens_at, units_at) = SET_SAMPLING_DIGITS;
    message[tens_at] = b'0' + (rate / 10) as u8;
    message[units_at] = b'0' + (rate % 10) as u8;
    Ok(message)
}

/// Check byte of a per-point request: ASCII index digits summed, minus 9
pub fn download_entry_check(index: usize) -> u8 {
    index
        .to_string()
        .bytes()
        .fold(0u8, |sum, digit| sum.wrapping_add(digit))
        .wrapping_sub(9)
}

/// `## 0xF7 <decimal index> * <check> \r \n`
pub fn download_entry_message(index: usize) -> Vec<u8> {
    let digits = index.to_string();
    let mut message = Vec::with_capacity(DOWNLOAD_ENTRY.len() + digits.len() + 4);
    message.extend_from_slice(DOWNLOAD_ENTRY.bytes);
    message.extend_from_slice(digits.as_bytes());
    message.push(b'*');
    message.push(download_entry_check(index));
    message.extend_from_slice(b"\r\n");
    message
}
