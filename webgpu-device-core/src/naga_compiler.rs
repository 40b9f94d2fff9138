//! A real `ShaderCompiler`: parses WGSL with `naga::front::wgsl`, validates
//! the resulting module, and turns any parse or validation failure into a
//! [`CompilationInfo`] diagnostic via the UTF-8->UTF-16 conversion in
//! [`crate::diagnostics`]. Every other `ShaderCompiler` in this crate is a
//! test double that never actually parses the WGSL it's handed; this is the
//! one that does.

use crate::backend::{ModuleIr, ShaderCompiler};
use crate::diagnostics::{convert_diagnostic_range, CompilationInfo, CompilationMessage, Severity};
use crate::error::DeviceError;

impl ModuleIr for naga::Module {}

#[derive(Default)]
pub struct NagaCompiler {
    capabilities: naga::valid::Capabilities,
}

impl NagaCompiler {
    pub fn new() -> Self {
        Self { capabilities: naga::valid::Capabilities::empty() }
    }
}

impl ShaderCompiler for NagaCompiler {
    type Module = naga::Module;

    fn compile_wgsl(
        &self,
        source: &str,
        _allowed_extensions: &[&str],
    ) -> Result<(Self::Module, CompilationInfo), DeviceError> {
        let module = match naga::front::wgsl::parse_str(source) {
            Ok(module) => module,
            Err(err) => {
                let message = parse_error_to_message(source, &err);
                return Ok((naga::Module::default(), CompilationInfo { messages: vec![message] }));
            }
        };

        let mut validator = naga::valid::Validator::new(naga::valid::ValidationFlags::all(), self.capabilities);
        let messages = match validator.validate(&module) {
            Ok(_) => Vec::new(),
            Err(err) => vec![validation_error_to_message(source, &err)],
        };
        Ok((module, CompilationInfo { messages }))
    }
}

fn parse_error_to_message(source: &str, err: &naga::front::wgsl::ParseError) -> CompilationMessage {
    let (line, column, end_line, end_column) = err
        .labels()
        .next()
        .and_then(|(span, _)| span.to_range())
        .and_then(|range| byte_range_to_diagnostic_range(source, range))
        .unwrap_or((1, 1, 1, 1));
    CompilationMessage {
        severity: Severity::Error,
        message: err.to_string(),
        line,
        column_utf16: column,
        end_line,
        end_column_utf16: end_column,
    }
}

fn validation_error_to_message(
    source: &str,
    err: &naga::WithSpan<naga::valid::ValidationError>,
) -> CompilationMessage {
    let (line, column, end_line, end_column) = err
        .spans()
        .next()
        .and_then(|(span, _)| span.to_range())
        .and_then(|range| byte_range_to_diagnostic_range(source, range))
        .unwrap_or((1, 1, 1, 1));
    CompilationMessage {
        severity: Severity::Error,
        message: err.to_string(),
        line,
        column_utf16: column,
        end_line,
        end_column_utf16: end_column,
    }
}

fn byte_range_to_diagnostic_range(source: &str, range: std::ops::Range<usize>) -> Option<(u32, u32, u32, u32)> {
    let start = range.start.min(source.len());
    let line_number = source[..start].matches('\n').count() as u32 + 1;
    let line_start = source[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let byte_column = (start - line_start) as u32 + 1;
    let byte_length = range.end.saturating_sub(range.start) as u32;
    convert_diagnostic_range(source, line_number, byte_column, byte_length).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_wgsl_compiles_with_no_diagnostics() {
        let compiler = NagaCompiler::new();
        let source = "\
            @vertex\nfn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {\n\
            \u{20}   return vec4<f32>(0.0, 0.0, 0.0, 1.0);\n}\n";
        let (_module, info) = compiler.compile_wgsl(source, &[]).unwrap();
        assert!(!info.has_errors());
    }

    #[test]
    fn malformed_wgsl_produces_an_error_diagnostic() {
        let compiler = NagaCompiler::new();
        let (_module, info) = compiler.compile_wgsl("fn broken( {{{", &[]).unwrap();
        assert!(info.has_errors());
    }

    #[test]
    fn ill_typed_wgsl_fails_validation_not_just_parsing() {
        let compiler = NagaCompiler::new();
        let source = "\
            @vertex\nfn vs_main() -> @builtin(position) vec4<f32> {\n\
            \u{20}   return 1.0;\n}\n";
        let (_module, info) = compiler.compile_wgsl(source, &[]).unwrap();
        assert!(info.has_errors());
    }

    #[test]
    fn the_indirect_draw_validation_shader_is_valid_wgsl() {
        let compiler = NagaCompiler::new();
        let source = crate::indirect_draw::validator::generate_shader_source(false);
        let (_module, info) = compiler.compile_wgsl(&source, &[]).unwrap();
        assert!(!info.has_errors(), "{:?}", info.messages);
    }

    #[test]
    fn the_multi_draw_validation_shader_is_valid_wgsl() {
        let compiler = NagaCompiler::new();
        let source = crate::indirect_draw::validator::generate_shader_source(true);
        let (_module, info) = compiler.compile_wgsl(&source, &[]).unwrap();
        assert!(!info.has_errors(), "{:?}", info.messages);
    }
}
