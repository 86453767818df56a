//! Tokenizer for the query language.
//!
//! Words are not split into identifiers and keywords here: a [`TokenKind::Word`]
//! carries its keyword classification and the parser decides by context
//! whether a keyword may act as a name (record field names, method names).

use crate::diagnostics::{DiagnosticCode, Span};
use crate::error::SyntaxError;
use std::fmt;

macro_rules! keywords {
    ($($variant:ident => $text:literal, $reserved:literal;)*) => {
        /// Keywords recognized case-insensitively.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum Keyword {
            $($variant,)*
        }

        impl Keyword {
            /// Classifies a word.
            pub fn from_word(word: &str) -> Option<Keyword> {
                $(if word.eq_ignore_ascii_case($text) {
                    return Some(Keyword::$variant);
                })*
                None
            }

            /// Returns the keyword text in upper case.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Keyword::$variant => $text,)*
                }
            }

            /// Returns true if the keyword cannot be used as an identifier.
            pub fn is_reserved(&self) -> bool {
                match self {
                    $(Keyword::$variant => $reserved,)*
                }
            }
        }
    };
}

keywords! {
    All => "ALL", true;
    And => "AND", true;
    Apply => "APPLY", true;
    As => "AS", true;
    Asc => "ASC", true;
    Between => "BETWEEN", true;
    Binary => "BINARY", false;
    By => "BY", true;
    Case => "CASE", true;
    Contains => "CONTAINS", true;
    Couple => "COUPLE", false;
    Cross => "CROSS", true;
    Desc => "DESC", true;
    Distinct => "DISTINCT", true;
    Else => "ELSE", true;
    End => "END", true;
    Except => "EXCEPT", true;
    False => "FALSE", true;
    Fetch => "FETCH", false;
    From => "FROM", true;
    Group => "GROUP", true;
    Having => "HAVING", true;
    In => "IN", true;
    Inner => "INNER", true;
    Intersect => "INTERSECT", true;
    Is => "IS", true;
    Join => "JOIN", true;
    Left => "LEFT", true;
    Like => "LIKE", true;
    Limit => "LIMIT", true;
    Not => "NOT", true;
    Null => "NULL", true;
    Offset => "OFFSET", true;
    On => "ON", true;
    Or => "OR", true;
    Order => "ORDER", true;
    Outer => "OUTER", true;
    Recursive => "RECURSIVE", false;
    Right => "RIGHT", true;
    Rlike => "RLIKE", true;
    Select => "SELECT", true;
    Skip => "SKIP", true;
    Table => "TABLE", false;
    Take => "TAKE", true;
    Text => "TEXT", false;
    Then => "THEN", true;
    Top => "TOP", false;
    True => "TRUE", true;
    Union => "UNION", true;
    When => "WHEN", true;
    Where => "WHERE", true;
    With => "WITH", true;
}

impl Keyword {
    /// Keywords of other SQL dialects that fail with a dedicated diagnostic.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Keyword::Limit | Keyword::Offset | Keyword::Top | Keyword::Fetch)
    }

    /// The supported replacement for an unsupported keyword.
    pub fn replacement(&self) -> &'static str {
        match self {
            Keyword::Offset => "use SKIP n",
            Keyword::Limit | Keyword::Top | Keyword::Fetch => "use TAKE n",
            _ => "",
        }
    }
}

/// Token kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword.
    Word {
        text: String,
        keyword: Option<Keyword>,
    },
    Integer(i64),
    Decimal(f64),
    String(String),
    Hash,
    Dot,
    Comma,
    Semicolon,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Star,
    Plus,
    Minus,
    Slash,
    Percent,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Word { text, .. } => write!(f, "'{}'", text),
            TokenKind::Integer(v) => write!(f, "'{}'", v),
            TokenKind::Decimal(v) => write!(f, "'{}'", v),
            TokenKind::String(s) => write!(f, "string '{}'", s),
            TokenKind::Hash => f.write_str("'#'"),
            TokenKind::Dot => f.write_str("'.'"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Semicolon => f.write_str("';'"),
            TokenKind::Colon => f.write_str("':'"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::LBrace => f.write_str("'{'"),
            TokenKind::RBrace => f.write_str("'}'"),
            TokenKind::LBracket => f.write_str("'['"),
            TokenKind::RBracket => f.write_str("']'"),
            TokenKind::Star => f.write_str("'*'"),
            TokenKind::Plus => f.write_str("'+'"),
            TokenKind::Minus => f.write_str("'-'"),
            TokenKind::Slash => f.write_str("'/'"),
            TokenKind::Percent => f.write_str("'%'"),
            TokenKind::Eq => f.write_str("'='"),
            TokenKind::NotEq => f.write_str("'<>'"),
            TokenKind::Lt => f.write_str("'<'"),
            TokenKind::LtEq => f.write_str("'<='"),
            TokenKind::Gt => f.write_str("'>'"),
            TokenKind::GtEq => f.write_str("'>='"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

/// A token with its position.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    /// Returns the keyword if this token is one.
    pub fn keyword(&self) -> Option<Keyword> {
        match &self.kind {
            TokenKind::Word { keyword, .. } => *keyword,
            _ => None,
        }
    }
}

/// Lexer state.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer over the query text.
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Tokenizes the whole input. The last token is always [`TokenKind::Eof`].
    pub fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let start = self.pos;
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    span: Span::new(start, start),
                });
                return Ok(tokens);
            };

            let kind = if c.is_alphabetic() || c == '_' {
                self.lex_word()
            } else if c.is_ascii_digit() {
                self.lex_number()?
            } else if c == '\'' {
                self.lex_string()?
            } else {
                self.lex_symbol(c)?
            };
            tokens.push(Token {
                kind,
                span: Span::new(start, self.pos),
            });
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Skips whitespace, `-- line` and `/* block */` comments.
    fn skip_trivia(&mut self) -> Result<(), SyntaxError> {
        loop {
            match (self.peek(), self.peek_second()) {
                (Some(c), _) if c.is_whitespace() => {
                    self.advance();
                }
                (Some('-'), Some('-')) => {
                    while let Some(c) = self.advance() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.pos;
                    self.pos += 2;
                    match self.input[self.pos..].find("*/") {
                        Some(end) => self.pos += end + 2,
                        None => {
                            return Err(SyntaxError::new(
                                DiagnosticCode::UnexpectedEndOfInput,
                                Span::new(start, self.input.len()),
                                "unterminated block comment",
                            ))
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_word(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        TokenKind::Word {
            text: text.to_string(),
            keyword: Keyword::from_word(text),
        }
    }

    fn lex_number(&mut self) -> Result<TokenKind, SyntaxError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let is_decimal =
            self.peek() == Some('.') && matches!(self.peek_second(), Some(c) if c.is_ascii_digit());
        if is_decimal {
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some(c) if c.is_alphabetic() || c == '_') {
            while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
                self.advance();
            }
            return Err(SyntaxError::new(
                DiagnosticCode::InvalidNumber,
                Span::new(start, self.pos),
                format!("invalid numeric literal '{}'", &self.input[start..self.pos]),
            ));
        }

        let text = &self.input[start..self.pos];
        let invalid = || {
            SyntaxError::new(
                DiagnosticCode::InvalidNumber,
                Span::new(start, self.pos),
                format!("numeric literal '{}' is out of range", text),
            )
        };
        if is_decimal {
            text.parse::<f64>().map(TokenKind::Decimal).map_err(|_| invalid())
        } else {
            text.parse::<i64>().map(TokenKind::Integer).map_err(|_| invalid())
        }
    }

    /// Lexes a single-quoted string. `''` and backslash escapes are accepted.
    fn lex_string(&mut self) -> Result<TokenKind, SyntaxError> {
        let start = self.pos;
        self.advance();
        let mut value = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(SyntaxError::new(
                        DiagnosticCode::UnterminatedString,
                        Span::new(start, self.pos),
                        "unterminated string literal",
                    ))
                }
                Some('\'') if self.peek() == Some('\'') => {
                    self.advance();
                    value.push('\'');
                }
                Some('\'') => return Ok(TokenKind::String(value)),
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('0') => value.push('\0'),
                    Some(other) => value.push(other),
                    None => {
                        return Err(SyntaxError::new(
                            DiagnosticCode::UnterminatedString,
                            Span::new(start, self.pos),
                            "unterminated string literal",
                        ))
                    }
                },
                Some(c) => value.push(c),
            }
        }
    }

    fn lex_symbol(&mut self, c: char) -> Result<TokenKind, SyntaxError> {
        let start = self.pos;
        self.advance();
        let kind = match c {
            '#' => TokenKind::Hash,
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '*' => TokenKind::Star,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => TokenKind::Eq,
            '!' if self.peek() == Some('=') => {
                self.advance();
                TokenKind::NotEq
            }
            '<' => match self.peek() {
                Some('=') => {
                    self.advance();
                    TokenKind::LtEq
                }
                Some('>') => {
                    self.advance();
                    TokenKind::NotEq
                }
                _ => TokenKind::Lt,
            },
            '>' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            other => {
                return Err(SyntaxError::new(
                    DiagnosticCode::UnknownCharacter,
                    Span::new(start, self.pos),
                    format!("unexpected character '{}'", other),
                ))
            }
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let tokens = Lexer::new("SeLeCt name").tokenize().unwrap();
        assert_eq!(tokens[0].keyword(), Some(Keyword::Select));
        assert_eq!(tokens[1].keyword(), None);
        assert_eq!(tokens[2].kind, TokenKind::Eof);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("12 3.5 7.x"),
            vec![
                TokenKind::Integer(12),
                TokenKind::Decimal(3.5),
                TokenKind::Integer(7),
                TokenKind::Dot,
                TokenKind::Word { text: "x".into(), keyword: None },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_number_errors() {
        let err = Lexer::new("99999999999999999999").tokenize().unwrap_err();
        assert_eq!(err.code(), DiagnosticCode::InvalidNumber);
        let err = Lexer::new("select 12abc").tokenize().unwrap_err();
        assert_eq!(err.code(), DiagnosticCode::InvalidNumber);
        assert_eq!(err.span(), Span::new(7, 12));
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            kinds(r"'it''s' 'a\'b' 'x\ny'"),
            vec![
                TokenKind::String("it's".into()),
                TokenKind::String("a'b".into()),
                TokenKind::String("x\ny".into()),
                TokenKind::Eof,
            ]
        );
        let err = Lexer::new("'open").tokenize().unwrap_err();
        assert_eq!(err.code(), DiagnosticCode::UnterminatedString);
    }

    #[test]
    fn test_operators_and_comments() {
        assert_eq!(
            kinds("a <> b != c <= d -- trailing\n/* block */ >= #"),
            vec![
                TokenKind::Word { text: "a".into(), keyword: None },
                TokenKind::NotEq,
                TokenKind::Word { text: "b".into(), keyword: None },
                TokenKind::NotEq,
                TokenKind::Word { text: "c".into(), keyword: None },
                TokenKind::LtEq,
                TokenKind::Word { text: "d".into(), keyword: None },
                TokenKind::GtEq,
                TokenKind::Hash,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unknown_character() {
        let err = Lexer::new("select @x").tokenize().unwrap_err();
        assert_eq!(err.code(), DiagnosticCode::UnknownCharacter);
        assert_eq!(err.span(), Span::new(7, 8));
    }

    #[test]
    fn test_unsupported_keywords() {
        assert!(Keyword::Limit.is_unsupported());
        assert!(Keyword::Offset.is_unsupported());
        assert!(!Keyword::Take.is_unsupported());
        assert_eq!(Keyword::Offset.replacement(), "use SKIP n");
    }
}
