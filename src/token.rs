// ABOUTME: Token kinds and the diagnostic code enumeration shared across the pipeline

use std::fmt;

/// A lexical token: a kind tag, the literal source text, and a 1-based line.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: u32,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: u32) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            line,
        }
    }
}

/// Closed token kind enumeration. Keyword vs. identifier is distinguished only
/// after the full word has been read; the lexer never pre-splits on a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // type keywords
    Int,
    Char,
    Void,
    // other keywords
    Const,
    If,
    Else,
    For,
    Break,
    Continue,
    Return,
    Printf,
    GetInt,
    GetChar,
    Main,
    // literals / identifiers
    Ident,
    IntConst,
    CharConst,
    StringConst,
    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    // operators
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The 13 non-fatal diagnostic kinds (rules a..m), each rendering to a single
/// lowercase letter in the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    LogicalAnd,                 // a
    IdentRedef,                 // b
    IdentUndef,                 // c
    FuncParamCountNotMatch,     // d
    FuncParamTypeNotMatch,      // e
    VoidFuncReturn,             // f
    FuncNoReturn,               // g
    ConstModify,                // h
    MissingSemicolon,           // i
    MissingBrace,               // j
    MissingSquare,              // k
    PrintfParamCountNotMatch,   // l
    IterIdentMisuse,            // m
    LogicalOr,                  // also surfaces under rule a's family
}

impl DiagnosticCode {
    pub fn letter(self) -> char {
        match self {
            DiagnosticCode::LogicalAnd | DiagnosticCode::LogicalOr => 'a',
            DiagnosticCode::IdentRedef => 'b',
            DiagnosticCode::IdentUndef => 'c',
            DiagnosticCode::FuncParamCountNotMatch => 'd',
            DiagnosticCode::FuncParamTypeNotMatch => 'e',
            DiagnosticCode::VoidFuncReturn => 'f',
            DiagnosticCode::FuncNoReturn => 'g',
            DiagnosticCode::ConstModify => 'h',
            DiagnosticCode::MissingSemicolon => 'i',
            DiagnosticCode::MissingBrace => 'j',
            DiagnosticCode::MissingSquare => 'k',
            DiagnosticCode::PrintfParamCountNotMatch => 'l',
            DiagnosticCode::IterIdentMisuse => 'm',
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_mapping_matches_rule_table() {
        assert_eq!(DiagnosticCode::LogicalAnd.letter(), 'a');
        assert_eq!(DiagnosticCode::LogicalOr.letter(), 'a');
        assert_eq!(DiagnosticCode::IdentRedef.letter(), 'b');
        assert_eq!(DiagnosticCode::IterIdentMisuse.letter(), 'm');
    }

    #[test]
    fn token_construction_preserves_line() {
        let tok = Token::new(TokenKind::Ident, "x", 7);
        assert_eq!(tok.line, 7);
        assert_eq!(tok.lexeme, "x");
    }
}
