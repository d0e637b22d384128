//! Source text -> tokens.
//!
//! The whole input is tokenized up front; comments are returned separately so the parser can
//! attach METADATA blocks.

mod cursor;
mod token;

pub use cursor::Cursor;
pub use token::{Token, TokenKind};

use crate::annotations::Comment;
use cursor::{is_ident_continue, is_ident_start};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub row: u32,
    pub col: u32,
}

pub struct Lexed {
    pub tokens: Vec<Token>,
    pub comments: Vec<Comment>,
}

pub fn tokenize(source: &str) -> Result<Lexed, LexError> {
    let mut cursor = Cursor::new(source.strip_prefix('\u{FEFF}').unwrap_or(source));
    let mut tokens = Vec::new();
    let mut comments = Vec::new();
    let mut newline_before = false;
    let mut space_before = false;

    loop {
        // Whitespace and comments.
        while let Some(c) = cursor.peek() {
            if c == '\n' {
                newline_before = true;
                space_before = true;
                cursor.advance();
            } else if c.is_whitespace() {
                space_before = true;
                cursor.advance();
            } else if c == '#' {
                let (row, col) = (cursor.line(), cursor.column());
                cursor.advance();
                let start = cursor.offset();
                cursor.eat_while(|ch| ch != '\n');
                comments.push(Comment {
                    text: cursor.slice_from(start).trim_end_matches('\r').to_string(),
                    row,
                    col,
                });
                space_before = true;
            } else {
                break;
            }
        }

        let (row, col) = (cursor.line(), cursor.column());
        let Some(c) = cursor.peek() else {
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                row,
                col,
                newline_before: true,
                space_before: true,
            });
            break;
        };

        let err = |message: String| LexError { message, row, col };
        let start = cursor.offset();
        let (kind, text) = if is_ident_start(c) {
            cursor.eat_while(is_ident_continue);
            (TokenKind::Ident, cursor.slice_from(start).to_string())
        } else if c.is_ascii_digit() {
            scan_number(&mut cursor);
            (TokenKind::Number, cursor.slice_from(start).to_string())
        } else if c == '"' {
            (TokenKind::String, scan_string(&mut cursor).map_err(err)?)
        } else if c == '`' {
            cursor.advance();
            let body_start = cursor.offset();
            cursor.eat_while(|ch| ch != '`');
            if cursor.is_eof() {
                return Err(err("non-terminated raw string".to_string()));
            }
            let body = cursor.slice_from(body_start).to_string();
            cursor.advance();
            (TokenKind::String, body)
        } else {
            let kind = scan_operator(&mut cursor)
                .ok_or_else(|| err(format!("illegal token {c:?}")))?;
            (kind, cursor.slice_from(start).to_string())
        };

        tokens.push(Token {
            kind,
            text,
            row,
            col,
            newline_before,
            space_before,
        });
        newline_before = false;
        space_before = false;
    }

    Ok(Lexed { tokens, comments })
}

fn scan_number(cursor: &mut Cursor<'_>) {
    cursor.eat_while(|c| c.is_ascii_digit());
    if cursor.peek() == Some('.') && cursor.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
        cursor.advance();
        cursor.eat_while(|c| c.is_ascii_digit());
    }
    if matches!(cursor.peek(), Some('e') | Some('E')) {
        let sign = matches!(cursor.peek_nth(1), Some('+') | Some('-'));
        let digit_at = if sign { 2 } else { 1 };
        if cursor.peek_nth(digit_at).is_some_and(|c| c.is_ascii_digit()) {
            for _ in 0..digit_at {
                cursor.advance();
            }
            cursor.eat_while(|c| c.is_ascii_digit());
        }
    }
}

/// Scan a double-quoted string and decode its escapes (JSON escape rules).
fn scan_string(cursor: &mut Cursor<'_>) -> Result<String, String> {
    let start = cursor.offset();
    cursor.advance();
    loop {
        match cursor.advance() {
            None | Some('\n') => return Err("non-terminated string".to_string()),
            Some('\\') => {
                if cursor.advance().is_none() {
                    return Err("non-terminated string".to_string());
                }
            }
            Some('"') => break,
            Some(_) => {}
        }
    }
    let raw = cursor.slice_from(start);
    serde_json::from_str::<String>(raw).map_err(|_| format!("illegal escape sequence in {raw}"))
}

fn scan_operator(cursor: &mut Cursor<'_>) -> Option<TokenKind> {
    let c = cursor.advance()?;
    let next = cursor.peek();
    let two = |cursor: &mut Cursor<'_>, kind: TokenKind| {
        cursor.advance();
        Some(kind)
    };
    match (c, next) {
        (':', Some('=')) => two(cursor, TokenKind::Assign),
        ('=', Some('=')) => two(cursor, TokenKind::Eq),
        ('!', Some('=')) => two(cursor, TokenKind::Neq),
        ('<', Some('=')) => two(cursor, TokenKind::Lte),
        ('>', Some('=')) => two(cursor, TokenKind::Gte),
        ('{', _) => Some(TokenKind::LBrace),
        ('}', _) => Some(TokenKind::RBrace),
        ('[', _) => Some(TokenKind::LBracket),
        (']', _) => Some(TokenKind::RBracket),
        ('(', _) => Some(TokenKind::LParen),
        (')', _) => Some(TokenKind::RParen),
        ('.', _) => Some(TokenKind::Dot),
        (',', _) => Some(TokenKind::Comma),
        (';', _) => Some(TokenKind::Semicolon),
        (':', _) => Some(TokenKind::Colon),
        ('=', _) => Some(TokenKind::Unify),
        ('<', _) => Some(TokenKind::Lt),
        ('>', _) => Some(TokenKind::Gt),
        ('+', _) => Some(TokenKind::Plus),
        ('-', _) => Some(TokenKind::Minus),
        ('*', _) => Some(TokenKind::Star),
        ('/', _) => Some(TokenKind::Slash),
        ('%', _) => Some(TokenKind::Percent),
        ('|', _) => Some(TokenKind::Pipe),
        ('&', _) => Some(TokenKind::Amp),
        _ => None,
    }
}
