use std::io;

use super::Generator;

// -----------------------------------------------------------------------------
// Token

/// One recorded token-sink event.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    StartObject,
    EndObject,
    FieldName(String),
    StartArray,
    EndArray,
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
}

// -----------------------------------------------------------------------------
// TokenBuffer

/// A [`Generator`] that records every event into a flat token list.
///
/// Useful in tests and for callers that want to replay or inspect a
/// serialization without committing to a wire format.
///
/// # Examples
///
/// ```
/// use tokenbind::generator::{Generator, Token, TokenBuffer};
///
/// let mut buffer = TokenBuffer::new();
/// buffer.write_start_object().unwrap();
/// buffer.write_field_name("x").unwrap();
/// buffer.write_i64(3).unwrap();
/// buffer.write_end_object().unwrap();
///
/// assert_eq!(
///     buffer.tokens(),
///     &[
///         Token::StartObject,
///         Token::FieldName("x".into()),
///         Token::I64(3),
///         Token::EndObject,
///     ],
/// );
/// ```
#[derive(Default, Debug)]
pub struct TokenBuffer {
    tokens: Vec<Token>,
}

impl TokenBuffer {
    /// Creates an empty buffer.
    #[inline]
    pub const fn new() -> Self {
        Self { tokens: Vec::new() }
    }

    /// The recorded tokens, in emission order.
    #[inline]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Consumes the buffer and returns the recorded tokens.
    #[inline]
    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    #[inline]
    fn push(&mut self, token: Token) -> io::Result<()> {
        self.tokens.push(token);
        Ok(())
    }
}

impl Generator for TokenBuffer {
    fn write_start_object(&mut self) -> io::Result<()> {
        self.push(Token::StartObject)
    }

    fn write_end_object(&mut self) -> io::Result<()> {
        self.push(Token::EndObject)
    }

    fn write_field_name(&mut self, name: &str) -> io::Result<()> {
        self.push(Token::FieldName(name.to_owned()))
    }

    fn write_start_array(&mut self) -> io::Result<()> {
        self.push(Token::StartArray)
    }

    fn write_end_array(&mut self) -> io::Result<()> {
        self.push(Token::EndArray)
    }

    fn write_null(&mut self) -> io::Result<()> {
        self.push(Token::Null)
    }

    fn write_bool(&mut self, value: bool) -> io::Result<()> {
        self.push(Token::Bool(value))
    }

    fn write_i64(&mut self, value: i64) -> io::Result<()> {
        self.push(Token::I64(value))
    }

    fn write_u64(&mut self, value: u64) -> io::Result<()> {
        self.push(Token::U64(value))
    }

    fn write_f64(&mut self, value: f64) -> io::Result<()> {
        self.push(Token::F64(value))
    }

    fn write_str(&mut self, value: &str) -> io::Result<()> {
        self.push(Token::Str(value.to_owned()))
    }
}
