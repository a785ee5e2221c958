// ABOUTME: Byte stream to token stream, with comment/whitespace elision and lexical diagnostics

use crate::diagnostic::Diagnostics;
use crate::error::CompileError;
use crate::token::{DiagnosticCode, Token, TokenKind};

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "int" => TokenKind::Int,
        "char" => TokenKind::Char,
        "void" => TokenKind::Void,
        "const" => TokenKind::Const,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "for" => TokenKind::For,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "return" => TokenKind::Return,
        "printf" => TokenKind::Printf,
        "getint" => TokenKind::GetInt,
        "getchar" => TokenKind::GetChar,
        "main" => TokenKind::Main,
        _ => return None,
    })
}

struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer {
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn current(&self) -> u8 {
        if self.at_end() {
            0
        } else {
            self.bytes[self.pos]
        }
    }

    fn peek(&self, offset: usize) -> u8 {
        let idx = self.pos + offset;
        if idx >= self.bytes.len() {
            0
        } else {
            self.bytes[idx]
        }
    }

    fn step(&mut self) -> u8 {
        let c = self.current();
        if !self.at_end() {
            self.pos += 1;
        }
        c
    }

    fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            match self.current() {
                b' ' | b'\t' | 0x08 | b'\r' => {
                    self.step();
                }
                b'\n' => {
                    self.step();
                    self.line += 1;
                }
                b'/' if self.peek(1) == b'/' => {
                    while !self.at_end() && self.current() != b'\n' {
                        self.step();
                    }
                }
                b'/' if self.peek(1) == b'*' => {
                    let line = self.line;
                    self.step();
                    self.step();
                    while !self.at_end() && !(self.current() == b'*' && self.peek(1) == b'/') {
                        if self.current() == b'\n' {
                            self.line += 1;
                        }
                        self.step();
                    }
                    if self.at_end() {
                        return Err(CompileError::unterminated(line, "block comment"));
                    }
                    self.step();
                    self.step();
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn lex_ident_or_keyword(&mut self) -> Token {
        let line = self.line;
        let start = self.pos;
        while matches!(self.current(), b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_') {
            self.step();
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .unwrap()
            .to_string();
        let kind = keyword(&text).unwrap_or(TokenKind::Ident);
        Token::new(kind, text, line)
    }

    fn lex_number(&mut self) -> Token {
        let line = self.line;
        let start = self.pos;
        while self.current().is_ascii_digit() {
            self.step();
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .unwrap()
            .to_string();
        Token::new(TokenKind::IntConst, text, line)
    }

    fn lex_char(&mut self) -> Result<Token, CompileError> {
        let line = self.line;
        self.step(); // opening '
        let start = self.pos;
        if self.current() == b'\\' {
            self.step();
            self.step();
        } else if !self.at_end() && self.current() != b'\'' {
            self.step();
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .unwrap()
            .to_string();
        if self.current() != b'\'' {
            return Err(CompileError::unterminated(line, "character literal"));
        }
        self.step(); // closing '
        Ok(Token::new(TokenKind::CharConst, text, line))
    }

    fn lex_string(&mut self) -> Result<Token, CompileError> {
        let line = self.line;
        self.step(); // opening "
        let start = self.pos;
        while !self.at_end() && self.current() != b'"' {
            if self.current() == b'\\' {
                self.step();
            }
            if self.current() == b'\n' {
                return Err(CompileError::unterminated(line, "string literal"));
            }
            self.step();
        }
        if self.at_end() {
            return Err(CompileError::unterminated(line, "string literal"));
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .unwrap()
            .to_string();
        self.step(); // closing "
        Ok(Token::new(TokenKind::StringConst, text, line))
    }
}

/// Consumes `src`, producing a token stream ending in `TokenKind::Eof`. The
/// only fatal conditions are a string/character literal or a block comment
/// left unterminated at end of file (or, for string/char, end of line);
/// everything else (malformed `&`/`|`) is reported as a diagnostic and
/// lexing continues.
pub fn lex(src: &str, diags: &mut Diagnostics) -> Result<Vec<Token>, CompileError> {
    let mut lexer = Lexer::new(src);
    let mut tokens = Vec::new();
    loop {
        lexer.skip_trivia()?;
        if lexer.at_end() {
            tokens.push(Token::new(TokenKind::Eof, "", lexer.line));
            break;
        }
        let line = lexer.line;
        let c = lexer.current();
        let tok = match c {
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => lexer.lex_ident_or_keyword(),
            b'0'..=b'9' => lexer.lex_number(),
            b'\'' => lexer.lex_char()?,
            b'"' => lexer.lex_string()?,
            b'(' => {
                lexer.step();
                Token::new(TokenKind::LParen, "(", line)
            }
            b')' => {
                lexer.step();
                Token::new(TokenKind::RParen, ")", line)
            }
            b'{' => {
                lexer.step();
                Token::new(TokenKind::LBrace, "{", line)
            }
            b'}' => {
                lexer.step();
                Token::new(TokenKind::RBrace, "}", line)
            }
            b'[' => {
                lexer.step();
                Token::new(TokenKind::LBracket, "[", line)
            }
            b']' => {
                lexer.step();
                Token::new(TokenKind::RBracket, "]", line)
            }
            b',' => {
                lexer.step();
                Token::new(TokenKind::Comma, ",", line)
            }
            b';' => {
                lexer.step();
                Token::new(TokenKind::Semicolon, ";", line)
            }
            b'+' => {
                lexer.step();
                Token::new(TokenKind::Plus, "+", line)
            }
            b'-' => {
                lexer.step();
                Token::new(TokenKind::Minus, "-", line)
            }
            b'*' => {
                lexer.step();
                Token::new(TokenKind::Star, "*", line)
            }
            b'/' => {
                lexer.step();
                Token::new(TokenKind::Slash, "/", line)
            }
            b'%' => {
                lexer.step();
                Token::new(TokenKind::Percent, "%", line)
            }
            b'!' => {
                lexer.step();
                if lexer.current() == b'=' {
                    lexer.step();
                    Token::new(TokenKind::Ne, "!=", line)
                } else {
                    Token::new(TokenKind::Not, "!", line)
                }
            }
            b'<' => {
                lexer.step();
                if lexer.current() == b'=' {
                    lexer.step();
                    Token::new(TokenKind::Le, "<=", line)
                } else {
                    Token::new(TokenKind::Lt, "<", line)
                }
            }
            b'>' => {
                lexer.step();
                if lexer.current() == b'=' {
                    lexer.step();
                    Token::new(TokenKind::Ge, ">=", line)
                } else {
                    Token::new(TokenKind::Gt, ">", line)
                }
            }
            b'=' => {
                lexer.step();
                if lexer.current() == b'=' {
                    lexer.step();
                    Token::new(TokenKind::Eq, "==", line)
                } else {
                    Token::new(TokenKind::Assign, "=", line)
                }
            }
            b'&' => {
                lexer.step();
                if lexer.current() == b'&' {
                    lexer.step();
                } else {
                    diags.push(line, DiagnosticCode::LogicalAnd);
                }
                Token::new(TokenKind::And, "&&", line)
            }
            b'|' => {
                lexer.step();
                if lexer.current() == b'|' {
                    lexer.step();
                } else {
                    diags.push(line, DiagnosticCode::LogicalOr);
                }
                Token::new(TokenKind::Or, "||", line)
            }
            other => {
                // An unrecognized byte has no diagnostic of its own in the
                // rule table; skip it rather than crash so a stray character
                // elsewhere in the file does not halt the whole compilation.
                lexer.step();
                let _ = other;
                continue;
            }
        };
        tokens.push(tok);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut diags = Diagnostics::new();
        lex(src, &mut diags).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_keywords_distinctly_from_identifiers() {
        assert_eq!(
            kinds("int main"),
            vec![TokenKind::Int, TokenKind::Main, TokenKind::Eof]
        );
        assert_eq!(kinds("integer"), vec![TokenKind::Ident, TokenKind::Eof]);
    }

    #[test]
    fn strips_line_and_block_comments() {
        assert_eq!(
            kinds("int /* c */ x; // trailing\n"),
            vec![
                TokenKind::Int,
                TokenKind::Ident,
                TokenKind::Semicolon,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn lone_ampersand_emits_logical_and_diagnostic_but_still_lexes_doubled() {
        let mut diags = Diagnostics::new();
        let tokens = lex("a & b", &mut diags).unwrap();
        assert_eq!(tokens[1].kind, TokenKind::And);
        assert_eq!(diags.sorted().len(), 1);
        assert_eq!(diags.sorted()[0].code, DiagnosticCode::LogicalAnd);
    }

    #[test]
    fn doubled_ampersand_emits_no_diagnostic() {
        let mut diags = Diagnostics::new();
        lex("a && b", &mut diags).unwrap();
        assert!(diags.is_empty());
    }

    #[test]
    fn crlf_advances_line_counter_only_once() {
        let mut diags = Diagnostics::new();
        let tokens = lex("a\r\nb", &mut diags).unwrap();
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn unterminated_string_is_a_fatal_error() {
        let mut diags = Diagnostics::new();
        assert!(lex("\"abc", &mut diags).is_err());
    }

    #[test]
    fn unterminated_block_comment_is_a_fatal_error() {
        let mut diags = Diagnostics::new();
        assert!(lex("int x; /* never closed", &mut diags).is_err());
    }

    #[test]
    fn integer_literal_lexeme_is_not_normalized() {
        let mut diags = Diagnostics::new();
        let tokens = lex("007", &mut diags).unwrap();
        assert_eq!(tokens[0].lexeme, "007");
    }
}
