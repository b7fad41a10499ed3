//! Tokenizer for operation documents
//!
//! Commas, whitespace, byte-order marks and `#` comments are insignificant.
//! Every token carries the 1-based line/column where it starts.

use crate::parser::ParseError;
use gazette_core::Location;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Bang,
    Dollar,
    Amp,
    LParen,
    RParen,
    Spread,
    Colon,
    Equals,
    At,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Pipe,
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Bang => "\"!\"".into(),
            Token::Dollar => "\"$\"".into(),
            Token::Amp => "\"&\"".into(),
            Token::LParen => "\"(\"".into(),
            Token::RParen => "\")\"".into(),
            Token::Spread => "\"...\"".into(),
            Token::Colon => "\":\"".into(),
            Token::Equals => "\"=\"".into(),
            Token::At => "\"@\"".into(),
            Token::LBracket => "\"[\"".into(),
            Token::RBracket => "\"]\"".into(),
            Token::LBrace => "\"{\"".into(),
            Token::RBrace => "\"}\"".into(),
            Token::Pipe => "\"|\"".into(),
            Token::Name(name) => format!("Name \"{name}\""),
            Token::Int(v) => format!("Int \"{v}\""),
            Token::Float(v) => format!("Float \"{v}\""),
            Token::Str(_) => "String".into(),
            Token::Eof => "<EOF>".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub location: Location,
}

/// Split `source` into tokens, ending with [`Token::Eof`]
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();
    loop {
        let spanned = lexer.next_token()?;
        let done = spanned.token == Token::Eof;
        tokens.push(spanned);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn location(&self) -> Location {
        Location {
            line: self.line,
            column: self.column,
        }
    }

    fn skip_ignored(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | ',' | '\n' | '\r' | '\u{feff}' => {
                    self.bump();
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' || c == '\r' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Spanned, ParseError> {
        self.skip_ignored();
        let location = self.location();
        let Some(c) = self.peek() else {
            return Ok(Spanned {
                token: Token::Eof,
                location,
            });
        };

        let single = match c {
            '!' => Some(Token::Bang),
            '$' => Some(Token::Dollar),
            '&' => Some(Token::Amp),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ':' => Some(Token::Colon),
            '=' => Some(Token::Equals),
            '@' => Some(Token::At),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            '|' => Some(Token::Pipe),
            _ => None,
        };
        if let Some(token) = single {
            self.bump();
            return Ok(Spanned { token, location });
        }

        let token = match c {
            '.' => {
                if self.peek_at(1) == Some('.') && self.peek_at(2) == Some('.') {
                    self.bump();
                    self.bump();
                    self.bump();
                    Token::Spread
                } else {
                    return Err(ParseError::new("Unexpected \".\"; did you mean \"...\"?", location));
                }
            }
            '"' => {
                if self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"') {
                    self.block_string(location)?
                } else {
                    self.string(location)?
                }
            }
            c if c == '-' || c.is_ascii_digit() => self.number(location)?,
            c if c == '_' || c.is_ascii_alphabetic() => self.name(),
            other => {
                return Err(ParseError::new(
                    format!("Unexpected character {other:?}"),
                    location,
                ))
            }
        };
        Ok(Spanned { token, location })
    }

    fn name(&mut self) -> Token {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_ascii_alphanumeric() {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Token::Name(name)
    }

    fn digits(&mut self, into: &mut String) -> usize {
        let mut count = 0;
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            into.push(c);
            self.bump();
            count += 1;
        }
        count
    }

    fn number(&mut self, location: Location) -> Result<Token, ParseError> {
        let mut text = String::new();
        if self.peek() == Some('-') {
            text.push('-');
            self.bump();
        }

        let integer_start = self.pos;
        if self.digits(&mut text) == 0 {
            return Err(ParseError::new("Invalid number, expected digit", location));
        }
        if self.chars[integer_start] == '0' && self.pos - integer_start > 1 {
            return Err(ParseError::new(
                "Invalid number, unexpected digit after 0",
                location,
            ));
        }

        let mut is_float = false;
        if self.peek() == Some('.') {
            is_float = true;
            text.push('.');
            self.bump();
            if self.digits(&mut text) == 0 {
                return Err(ParseError::new("Invalid number, expected digit after \".\"", location));
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            text.push('e');
            self.bump();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.bump();
            }
            if self.digits(&mut text) == 0 {
                return Err(ParseError::new("Invalid number, expected exponent digit", location));
            }
        }

        if let Some(c) = self.peek() {
            if c == '.' || c == '_' || c.is_ascii_alphabetic() {
                return Err(ParseError::new(
                    format!("Invalid number, unexpected character {c:?}"),
                    location,
                ));
            }
        }

        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| ParseError::new(format!("Invalid float {text}"), location))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| ParseError::new(format!("Int {text} is out of range"), location))
        }
    }

    fn string(&mut self, location: Location) -> Result<Token, ParseError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n') | Some('\r') => {
                    return Err(ParseError::new("Unterminated string", location))
                }
                Some('"') => return Ok(Token::Str(value)),
                Some('\\') => {
                    let escape_at = self.location();
                    let escaped = match self.bump() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('/') => '/',
                        Some('b') => '\u{0008}',
                        Some('f') => '\u{000c}',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some('u') => self.unicode_escape(escape_at)?,
                        other => {
                            return Err(ParseError::new(
                                format!("Invalid escape sequence \\{}", other.unwrap_or(' ')),
                                escape_at,
                            ))
                        }
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn unicode_escape(&mut self, location: Location) -> Result<char, ParseError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| ParseError::new("Invalid unicode escape", location))?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| ParseError::new("Invalid unicode code point", location))
    }

    fn block_string(&mut self, location: Location) -> Result<Token, ParseError> {
        for _ in 0..3 {
            self.bump();
        }
        let mut raw = String::new();
        loop {
            match self.peek() {
                None => return Err(ParseError::new("Unterminated block string", location)),
                Some('"') if self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"') => {
                    for _ in 0..3 {
                        self.bump();
                    }
                    return Ok(Token::Str(dedent_block(&raw)));
                }
                Some('\\')
                    if self.peek_at(1) == Some('"')
                        && self.peek_at(2) == Some('"')
                        && self.peek_at(3) == Some('"') =>
                {
                    for _ in 0..4 {
                        self.bump();
                    }
                    raw.push_str("\"\"\"");
                }
                Some(c) => {
                    raw.push(c);
                    self.bump();
                }
            }
        }
    }
}

/// Strip the common indentation and blank edge lines of a block string
fn dedent_block(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();

    let common = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    let mut out: Vec<String> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 || line.len() < common {
                line.to_string()
            } else {
                line[common..].to_string()
            }
        })
        .collect();

    while out.first().is_some_and(|l| l.trim().is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|l| l.trim().is_empty()) {
        out.pop();
    }
    out.join("\n")
}
