// ABOUTME: Ambient error type for the compilation boundary (I/O, fatal lex/parse failures)

use thiserror::Error;

/// Failures that abort compilation outright, as opposed to the non-fatal
/// a..m diagnostics collected in `diagnostic::Diagnostics`. Everything a
/// user's program can do wrong surfaces as a diagnostic instead; this enum
/// is reserved for I/O and for lexical input so malformed it cannot be
/// recovered from at all (an unterminated string, character, or block
/// comment running off the end of the file).
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("failed to read source file {path}: {source}")]
    ReadSource {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),

    #[error("{line}: unterminated {what}")]
    UnterminatedLexeme { line: u32, what: &'static str },
}

impl CompileError {
    pub fn read_source(path: impl Into<String>, source: std::io::Error) -> Self {
        CompileError::ReadSource {
            path: path.into(),
            source,
        }
    }

    pub fn unterminated(line: u32, what: &'static str) -> Self {
        CompileError::UnterminatedLexeme { line, what }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unterminated_message_names_the_line_and_kind() {
        let err = CompileError::unterminated(4, "string literal");
        assert_eq!(err.to_string(), "4: unterminated string literal");
    }
}
