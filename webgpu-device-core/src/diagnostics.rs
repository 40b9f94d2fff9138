//! Shader compilation diagnostics and the UTF-8→UTF-16 offset conversion.
//!
//! `compile_wgsl` itself is an external collaborator, treated as an opaque
//! `compile(source) -> module + diagnostics` service; this module defines
//! the diagnostic shape that service must hand back and the byte→UTF-16
//! conversion the device applies to every diagnostic's source range before
//! handing it to the application (the C API's strings are UTF-16 on some
//! platforms, UTF-8 internally).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Diagnostics are independent of which backend ultimately renders the
/// module IR.
#[derive(Debug, Clone)]
pub struct CompilationMessage {
    pub severity: Severity,
    pub message: String,
    /// 1-based line/column, already converted to UTF-16 code units.
    pub line: u32,
    pub column_utf16: u32,
    pub end_line: u32,
    pub end_column_utf16: u32,
}

#[derive(Debug, Default, Clone)]
pub struct CompilationInfo {
    pub messages: Vec<CompilationMessage>,
}

impl CompilationInfo {
    /// Byproduct of the message list, used by devtools-facing surfaces that
    /// just want a severity count without walking every message.
    pub fn count(&self, severity: Severity) -> usize {
        self.messages.iter().filter(|m| m.severity == severity).count()
    }

    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OffsetConversionError {
    #[error("source contains an unpaired UTF-16 surrogate code point at byte offset {0}")]
    IllegalSurrogate(usize),
}

/// Converts a UTF-8 byte offset within `source` into the equivalent UTF-16
/// code-unit offset:
///
/// - code points `<= 0xD7FF` or in `0xE000..=0xFFFF` contribute 1 unit,
/// - code points `>= 0x10000` contribute 2 units,
/// - code points in `0xD800..=0xDFFF` are illegal (unpaired surrogates can't
///   occur in valid UTF-8, but a `char` iterator never yields them anyway —
///   this guards against future representations where it could).
pub fn utf8_byte_offset_to_utf16(source: &str, byte_offset: usize) -> Result<u32, OffsetConversionError> {
    let mut units: u32 = 0;
    let mut consumed_bytes = 0usize;

    for ch in source.chars() {
        if consumed_bytes >= byte_offset {
            break;
        }
        let cp = ch as u32;
        if (0xD800..=0xDFFF).contains(&cp) {
            return Err(OffsetConversionError::IllegalSurrogate(consumed_bytes));
        }
        units += if cp >= 0x10000 { 2 } else { 1 };
        consumed_bytes += ch.len_utf8();
    }

    Ok(units)
}

/// Converts a `{line, byte-offset-within-line, byte-length}` diagnostic
/// range into UTF-16 line/column/end-line/end-column, addressed (1-based)
/// for both the start and end.
pub fn convert_diagnostic_range(
    source: &str,
    line_1based: u32,
    byte_column_1based: u32,
    byte_length: u32,
) -> Result<(u32, u32, u32, u32), OffsetConversionError> {
    let line_text = source
        .lines()
        .nth(line_1based.saturating_sub(1) as usize)
        .unwrap_or("");

    let start_byte = (byte_column_1based.saturating_sub(1)) as usize;
    let end_byte = start_byte + byte_length as usize;

    let start_col = utf8_byte_offset_to_utf16(line_text, start_byte)? + 1;
    let end_col = utf8_byte_offset_to_utf16(line_text, end_byte.min(line_text.len()))? + 1;

    Ok((line_1based, start_col, line_1based, end_col))
}

/// Severity mapping: `Note -> Info`, `Warning -> Warning`, otherwise `Error`.
pub fn map_naga_severity(label: &str) -> Severity {
    match label {
        "note" | "Note" => Severity::Info,
        "warning" | "Warning" => Severity::Warning,
        _ => Severity::Error,
    }
}

/// Renders one compilation message the way a terminal log line should read,
/// colored by severity and annotated with its source location.
pub fn render_compilation_message(source_name: &str, message: &CompilationMessage) -> String {
    use codespan_reporting::diagnostic::{Diagnostic, Severity as CsSeverity};
    use codespan_reporting::files::SimpleFiles;
    use codespan_reporting::term::{self, termcolor::Buffer};

    let mut files = SimpleFiles::new();
    files.add(source_name, "");

    let severity = match message.severity {
        Severity::Info => CsSeverity::Note,
        Severity::Warning => CsSeverity::Warning,
        Severity::Error => CsSeverity::Error,
    };
    let diagnostic = Diagnostic::new(severity).with_message(format!(
        "{} ({}:{})",
        message.message, message.line, message.column_utf16
    ));

    let mut buffer = Buffer::no_color();
    let _ = term::emit(&mut buffer, &term::Config::default(), &files, &diagnostic);
    String::from_utf8_lossy(buffer.as_slice()).into_owned()
}

/// Rate-limits compilation-log emissions: the first 20 pass through, the
/// 20th is a final "limit reached" notice, and anything past that is
/// dropped.
pub struct CompilationLogRateLimiter {
    emitted: u32,
}

pub enum RateLimitDecision {
    Emit,
    EmitFinalNotice,
    Drop,
}

impl Default for CompilationLogRateLimiter {
    fn default() -> Self {
        Self { emitted: 0 }
    }
}

impl CompilationLogRateLimiter {
    pub const LIMIT: u32 = 20;

    pub fn next(&mut self) -> RateLimitDecision {
        self.emitted += 1;
        match self.emitted.cmp(&Self::LIMIT) {
            std::cmp::Ordering::Less => RateLimitDecision::Emit,
            std::cmp::Ordering::Equal => RateLimitDecision::EmitFinalNotice,
            std::cmp::Ordering::Greater => RateLimitDecision::Drop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_offsets_are_identity() {
        let s = "hello world";
        assert_eq!(utf8_byte_offset_to_utf16(s, 5).unwrap(), 5);
    }

    #[test]
    fn astral_plane_characters_count_as_two_units() {
        // U+1F600 is 4 UTF-8 bytes and 2 UTF-16 code units.
        let s = "a\u{1F600}b";
        // offset 1 is right after 'a': 1 utf16 unit consumed so far.
        assert_eq!(utf8_byte_offset_to_utf16(s, 1).unwrap(), 1);
        // offset 5 is right after the emoji (1 + 4 bytes): 1 + 2 = 3 units.
        assert_eq!(utf8_byte_offset_to_utf16(s, 5).unwrap(), 3);
    }

    #[test]
    fn bmp_characters_outside_surrogate_range_count_as_one_unit() {
        let s = "\u{FFFF}x";
        assert_eq!(utf8_byte_offset_to_utf16(s, s.len()).unwrap(), 2);
    }

    #[test]
    fn rate_limiter_emits_twenty_then_one_final_notice_then_drops() {
        let mut limiter = CompilationLogRateLimiter::default();
        let mut emitted = 0;
        let mut final_notices = 0;
        let mut dropped = 0;
        for _ in 0..25 {
            match limiter.next() {
                RateLimitDecision::Emit => emitted += 1,
                RateLimitDecision::EmitFinalNotice => final_notices += 1,
                RateLimitDecision::Drop => dropped += 1,
            }
        }
        assert_eq!(emitted, 19);
        assert_eq!(final_notices, 1);
        assert_eq!(dropped, 5);
    }

    #[test]
    fn render_compilation_message_includes_text_and_location() {
        let message = CompilationMessage {
            severity: Severity::Error,
            message: "unresolved identifier `foo`".into(),
            line: 4,
            column_utf16: 9,
            end_line: 4,
            end_column_utf16: 12,
        };
        let rendered = render_compilation_message("clear.wgsl", &message);
        assert!(rendered.contains("unresolved identifier"));
        assert!(rendered.contains("4:9"));
    }

    #[test]
    fn compilation_info_counts_by_severity() {
        let info = CompilationInfo {
            messages: vec![
                CompilationMessage {
                    severity: Severity::Warning,
                    message: "w".into(),
                    line: 1,
                    column_utf16: 1,
                    end_line: 1,
                    end_column_utf16: 2,
                },
                CompilationMessage {
                    severity: Severity::Error,
                    message: "e".into(),
                    line: 2,
                    column_utf16: 1,
                    end_line: 2,
                    end_column_utf16: 2,
                },
            ],
        };
        assert_eq!(info.count(Severity::Warning), 1);
        assert_eq!(info.count(Severity::Error), 1);
        assert!(info.has_errors());
    }
}
