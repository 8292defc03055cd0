//! Lazy decoding of captured bytes.
//!
//! Capture stores raw bytes; text is produced only when a caller asks for
//! it, so an encoding problem never fails the pipeline itself.

use encoding_rs::{DecoderResult, Encoding};
use pipesh_types::EncodingErrors;

use crate::error::{ConfigError, DecodeError};

/// Encoding plus error policy, resolved once from config.
#[derive(Debug, Clone, Copy)]
pub struct TextDecoder {
    encoding: &'static Encoding,
    errors: EncodingErrors,
}

impl TextDecoder {
    pub fn new(label: &str, errors: EncodingErrors) -> Result<Self, ConfigError> {
        let encoding = Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| ConfigError::UnknownEncoding(label.to_string()))?;
        Ok(Self { encoding, errors })
    }

    pub fn utf8() -> Self {
        Self {
            encoding: encoding_rs::UTF_8,
            errors: EncodingErrors::Replace,
        }
    }

    pub fn encoding_name(&self) -> &'static str {
        self.encoding.name()
    }

    pub fn errors(&self) -> EncodingErrors {
        self.errors
    }

    /// Decode under the configured policy.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        match self.errors {
            EncodingErrors::Replace => {
                let (text, _had_errors) = self.encoding.decode_without_bom_handling(bytes);
                Ok(text.into_owned())
            }
            EncodingErrors::Strict => self.decode_skipping(bytes, true),
            EncodingErrors::Ignore => self.decode_skipping(bytes, false),
        }
    }

    /// Decode, replacing bad sequences regardless of policy.
    pub fn decode_lossy(&self, bytes: &[u8]) -> String {
        self.encoding.decode_without_bom_handling(bytes).0.into_owned()
    }

    fn decode_skipping(&self, bytes: &[u8], strict: bool) -> Result<String, DecodeError> {
        let mut decoder = self.encoding.new_decoder_without_bom_handling();
        let capacity = decoder
            .max_utf8_buffer_length_without_replacement(bytes.len())
            .unwrap_or(bytes.len().saturating_mul(3));
        let mut out = String::with_capacity(capacity);
        let mut consumed = 0;

        loop {
            let (result, read) =
                decoder.decode_to_string_without_replacement(&bytes[consumed..], &mut out, true);
            consumed += read;
            match result {
                DecoderResult::InputEmpty => return Ok(out),
                DecoderResult::Malformed(bad, extra) => {
                    if strict {
                        return Err(DecodeError {
                            encoding: self.encoding.name(),
                            offset: consumed.saturating_sub(bad as usize + extra as usize),
                        });
                    }
                }
                DecoderResult::OutputFull => {
                    let more = decoder
                        .max_utf8_buffer_length_without_replacement(bytes.len() - consumed)
                        .unwrap_or(16);
                    out.reserve(more.max(16));
                }
            }
        }
    }
}

impl Default for TextDecoder {
    fn default() -> Self {
        Self::utf8()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BAD: &[u8] = b"ok\xffdone";

    #[test]
    fn replace_inserts_replacement_char() {
        let d = TextDecoder::new("utf-8", EncodingErrors::Replace).unwrap();
        assert_eq!(d.decode(BAD).unwrap(), "ok\u{FFFD}done");
    }

    #[test]
    fn ignore_drops_bad_bytes() {
        let d = TextDecoder::new("utf-8", EncodingErrors::Ignore).unwrap();
        assert_eq!(d.decode(BAD).unwrap(), "okdone");
    }

    #[test]
    fn strict_reports_offset() {
        let d = TextDecoder::new("utf-8", EncodingErrors::Strict).unwrap();
        let err = d.decode(BAD).unwrap_err();
        assert_eq!(err.offset, 2);
        assert_eq!(d.decode(b"fine").unwrap(), "fine");
    }

    #[test]
    fn latin1_decodes_high_bytes() {
        let d = TextDecoder::new("latin1", EncodingErrors::Strict).unwrap();
        assert_eq!(d.decode(b"caf\xe9").unwrap(), "café");
    }

    #[test]
    fn unknown_label_is_config_error() {
        assert_eq!(
            TextDecoder::new("klingon", EncodingErrors::Replace).unwrap_err(),
            ConfigError::UnknownEncoding("klingon".into())
        );
    }
}
