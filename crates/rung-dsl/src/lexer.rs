//! Lexer for Rung source lines.
//!
//! Uses logos for tokenization. The parser is line-oriented, so each source
//! line is lexed on its own; token spans are byte offsets into that line,
//! which is exactly what the editor-facing span table needs.

use logos::{Logos, Span};

/// Token type for one line of Rung source.
///
/// Keywords (`IN`, `AND`, `NOT`, ...) are not distinguished here; the parser
/// matches them case-sensitively on the `Ident` slice, which keeps gate kinds
/// and signal names in one namespace the way the language defines them.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token<'src> {
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token(",")]
    Comma,
    #[token("->")]
    Arrow,

    /// Quoted literal, quotes stripped: `"2s"`, `"0xFF"`
    #[regex(r#""[^"]*""#, |lex| { let s = lex.slice(); &s[1..s.len() - 1] })]
    Quoted(&'src str),

    /// Numeric-leading literal: `42`, `0xFF`, `2.5`, `500ms`, `.5s`, `-3`
    #[regex(r"-?[0-9][0-9A-Za-z_.]*", |lex| lex.slice())]
    #[regex(r"\.[0-9][0-9A-Za-z_.]*", |lex| lex.slice())]
    Number(&'src str),

    /// Identifier: signal names, gate kinds, declaration keywords
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice())]
    Ident(&'src str),
}

/// A token with its byte span in the source line
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub token: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(token: T, span: Span) -> Self {
        Self { token, span }
    }
}

/// Tokenize one source line into spanned tokens.
///
/// Blank and comment-only lines produce an empty vector.
pub fn lex(line: &str) -> Result<Vec<Spanned<Token<'_>>>, LexError> {
    let mut lexer = Token::lexer(line);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push(Spanned::new(token, lexer.span())),
            Err(()) => {
                return Err(LexError {
                    span: lexer.span(),
                    slice: lexer.slice().to_string(),
                });
            }
        }
    }

    Ok(tokens)
}

/// Error during lexing
#[derive(Debug, Clone)]
pub struct LexError {
    pub span: Span,
    pub slice: String,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unexpected character(s) '{}'", self.slice)
    }
}

impl std::error::Error for LexError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_line() {
        let tokens = lex("AND g1(A, B) -> Y").unwrap();
        assert_eq!(tokens.len(), 9);
        assert_eq!(tokens[0].token, Token::Ident("AND"));
        assert_eq!(tokens[1].token, Token::Ident("g1"));
        assert_eq!(tokens[2].token, Token::ParenOpen);
        assert_eq!(tokens[3].token, Token::Ident("A"));
        assert_eq!(tokens[4].token, Token::Comma);
        assert_eq!(tokens[5].token, Token::Ident("B"));
        assert_eq!(tokens[6].token, Token::ParenClose);
        assert_eq!(tokens[7].token, Token::Arrow);
        assert_eq!(tokens[8].token, Token::Ident("Y"));
    }

    #[test]
    fn test_spans_are_exact() {
        let line = "OUT LAMP, VALVE";
        let tokens = lex(line).unwrap();
        assert_eq!(tokens[1].token, Token::Ident("LAMP"));
        assert_eq!(&line[tokens[1].span.clone()], "LAMP");
        assert_eq!(tokens[3].token, Token::Ident("VALVE"));
        assert_eq!(&line[tokens[3].span.clone()], "VALVE");
    }

    #[test]
    fn test_literals() {
        let tokens = lex(r#"TON t1("500ms", X) -> Q"#).unwrap();
        assert_eq!(tokens[3].token, Token::Quoted("500ms"));

        let tokens = lex("CTU c1(3, CU, R) -> Q, CV").unwrap();
        assert_eq!(tokens[3].token, Token::Number("3"));

        let tokens = lex("LT cmp(LEVEL, 0xFF) -> LOW").unwrap();
        assert_eq!(tokens[5].token, Token::Number("0xFF"));
    }

    #[test]
    fn test_comment_and_blank() {
        assert!(lex("# just a comment").unwrap().is_empty());
        assert!(lex("   ").unwrap().is_empty());
        let tokens = lex("IN A # trailing comment").unwrap();
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_unexpected_character() {
        let err = lex("AND g;(A) -> Y").unwrap_err();
        assert_eq!(err.slice, ";");
    }
}
