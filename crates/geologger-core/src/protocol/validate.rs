//! Response validation against fixed templates
//!
//! A template byte of `0x00` is a wildcard: the device varies those
//! positions (digits, status letters) and they are not compared.

use std::fmt;

use super::messages::ProtocolMessage;
use super::ProtocolError;
use crate::logging::{LogConfig, LEVEL_DETAIL, LEVEL_MESSAGES};

/// Template byte that matches anything
pub const WILDCARD: u8 = 0x00;

/// Why a response did not match its template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Divergence {
    /// Fewer bytes than the comparison needs
    TooShort {
        /// Bytes the comparison covers
        needed: usize,
        /// Bytes available
        received: usize,
    },
    /// The template cannot cover the requested comparison width
    TemplateTooShort {
        /// Bytes the comparison covers
        needed: usize,
        /// Template length
        template: usize,
    },
    /// At least one fixed byte differs; the first difference is reported
    Mismatch {
        /// Position of the first difference
        offset: usize,
        /// Byte received there
        received: u8,
        /// Byte the template holds there
        expected: u8,
        /// Total differing positions
        count: usize,
    },
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::TooShort { needed, received } => {
                write!(f, "too short message: {} vs {}", needed, received)
            }
            Divergence::TemplateTooShort { needed, template } => {
                write!(f, "template shorter than compared length: {} vs {}", needed, template)
            }
            Divergence::Mismatch {
                offset,
                received,
                expected,
                count,
            } => write!(
                f,
                "response differs at byte {}: {:#04x} vs {:#04x} ({} differences)",
                offset, received, expected, count
            ),
        }
    }
}

/// Compare the first `compare_len` bytes of `received` against `template`
pub fn check(received: &[u8], template: &[u8], compare_len: usize) -> Result<(), Divergence> {
    if received.len() < compare_len {
        return Err(Divergence::TooShort {
            needed: compare_len,
            received: received.len(),
        });
    }
    if template.len() < compare_len {
        return Err(Divergence::TemplateTooShort {
            needed: compare_len,
            template: template.len(),
        });
    }

    let mut first = None;
    let mut count = 0;
    for (offset, (&got, &want)) in received.iter().zip(template).take(compare_len).enumerate() {
        if want != WILDCARD && got != want {
            count += 1;
            first.get_or_insert((offset, got, want));
        }
    }

    match first {
        None => Ok(()),
        Some((offset, received, expected)) => Err(Divergence::Mismatch {
            offset,
            received,
            expected,
            count,
        }),
    }
}

/// `true` when the response matches the template with zero divergences
pub fn matches(received: &[u8], template: &[u8], compare_len: usize, log: &LogConfig) -> bool {
    match check(received, template, compare_len) {
        Ok(()) => {
            if log.enabled(LEVEL_DETAIL) {
                tracing::debug!("received OK response");
            }
            true
        }
        Err(
            divergence @ (Divergence::TooShort { .. } | Divergence::TemplateTooShort { .. }),
        ) => {
            if log.enabled(LEVEL_DETAIL) {
                tracing::debug!("{}", divergence);
            }
            false
        }
        Err(divergence) => {
            if log.enabled(LEVEL_MESSAGES) {
                tracing::trace!("{}", divergence);
            }
            false
        }
    }
}

/// Validate a response prefix, turning a divergence into a protocol error
pub fn expect(
    received: &[u8],
    template: &ProtocolMessage,
    compare_len: usize,
    log: &LogConfig,
) -> Result<(), ProtocolError> {
    if matches(received, template.bytes, compare_len, log) {
        return Ok(());
    }
    let detail = check(received, template.bytes, compare_len)
        .err()
        .map(|d| d.to_string())
        .unwrap_or_default();
    Err(ProtocolError::ResponseMismatch {
        command: template.name,
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert_eq!(check(b"##\xf2OK!\r\n", b"##\xf2OK!\r\n", 8), Ok(()));
    }

    #[test]
    fn test_wildcards_match_anything() {
        let template = b"##\xf1\x00\x00\r\n";
        assert_eq!(check(b"##\xf1AB\r\n", template, 7), Ok(()));
        assert_eq!(check(b"##\xf1\xff\x01\r\n", template, 7), Ok(()));
    }

    #[test]
    fn test_first_divergence_reported() {
        let result = check(b"##\xf1XY\n\r", b"##\xf1\x00\x00\r\n", 7);
        assert_eq!(
            result,
            Err(Divergence::Mismatch {
                offset: 5,
                received: b'\n',
                expected: b'\r',
                count: 2,
            })
        );
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            check(b"##", b"##\xf0", 3),
            Err(Divergence::TooShort {
                needed: 3,
                received: 2
            })
        );
    }

    #[test]
    fn test_short_response_fails_even_when_template_is_shorter() {
        let log = LogConfig::new(5);
        assert!(!matches(b"##\xf6", b"##\xf6", 7, &log));
        assert_eq!(
            check(b"##\xf6", b"##\xf6", 7),
            Err(Divergence::TooShort {
                needed: 7,
                received: 3
            })
        );
    }

    #[test]
    fn test_template_shorter_than_compare_len() {
        assert_eq!(
            check(b"##\xf612,13*\r\n", b"##\xf6", 7),
            Err(Divergence::TemplateTooShort {
                needed: 7,
                template: 3
            })
        );
        assert!(!matches(b"##\xf612,13*\r\n", b"##\xf6", 7, &LogConfig::default()));
    }

    #[test]
    fn test_prefix_only_comparison() {
        // Trailing device data beyond compare_len is not inspected
        assert!(matches(b"##\xf312,0*\r\n", b"##\xf3??\r\n", 3, &LogConfig::new(5)));
    }

    #[test]
    fn test_expect_builds_mismatch_error() {
        let template = ProtocolMessage {
            name: "test",
            bytes: b"##\xf0",
        };
        let err = expect(b"#!\xf0", &template, 3, &LogConfig::default()).unwrap_err();
        match err {
            ProtocolError::ResponseMismatch { command, detail } => {
                assert_eq!(command, "test");
                assert!(detail.contains("byte 1"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
