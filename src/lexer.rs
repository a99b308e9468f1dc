use std::fmt;

/// Every kind of token the [`Tokenizer`] can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Raw text: template text outside tags, comment bodies and the two
    /// literals of a delimiter redefinition.
    Text,

    // Tag markers
    Open,      // {{
    OpenTrim,  // {{-
    Close,     // }}
    CloseTrim, // -}}

    // Sigils
    Block,       // #
    Inverted,    // ^
    Section,     // %
    Define,      // <
    Exec,        // @
    Partial,     // >
    Delim,       // =
    End,         // /
    Comment,     // !
    EscapeVar,   // no sigil
    UnescapeVar, // &
    Assign,      // :

    // Operators
    Pipe,   // |
    And,    // &&
    Or,     // ||
    Not,    // !
    Minus,  // -
    LParen, // (
    RParen, // )

    // Values
    Ident,
    Integer,
    Float,
    Bool,
    String,

    Eof,
    Invalid,
}

/// Location of a token in the source. `line` and `column` are 1-based,
/// `offset` is the byte offset of the first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, literal: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            literal: literal.into(),
            position,
        }
    }

    /// Tokens usable as a key operand or a filter argument.
    pub fn is_value(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Ident
                | TokenKind::Integer
                | TokenKind::Float
                | TokenKind::Bool
                | TokenKind::String
        )
    }

    pub fn is_open(&self) -> bool {
        matches!(self.kind, TokenKind::Open | TokenKind::OpenTrim)
    }

    pub fn is_close(&self) -> bool {
        matches!(self.kind, TokenKind::Close | TokenKind::CloseTrim)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            TokenKind::Eof => return f.write_str("<eof>"),
            TokenKind::Open => return f.write_str("<open>"),
            TokenKind::OpenTrim => return f.write_str("<open-trim>"),
            TokenKind::Close => return f.write_str("<close>"),
            TokenKind::CloseTrim => return f.write_str("<close-trim>"),
            TokenKind::Block => return f.write_str("<block>"),
            TokenKind::Inverted => return f.write_str("<inverted>"),
            TokenKind::Section => return f.write_str("<section>"),
            TokenKind::Define => return f.write_str("<define>"),
            TokenKind::Exec => return f.write_str("<exec>"),
            TokenKind::Partial => return f.write_str("<partial>"),
            TokenKind::Delim => return f.write_str("<delimiter>"),
            TokenKind::End => return f.write_str("<end>"),
            TokenKind::Comment => return f.write_str("<comment>"),
            TokenKind::EscapeVar | TokenKind::UnescapeVar => return f.write_str("<variable>"),
            TokenKind::Assign => return f.write_str("<assignment>"),
            TokenKind::Pipe => return f.write_str("<pipe>"),
            TokenKind::And => return f.write_str("<and>"),
            TokenKind::Or => return f.write_str("<or>"),
            TokenKind::Not => return f.write_str("<not>"),
            TokenKind::Minus => return f.write_str("<minus>"),
            TokenKind::LParen => return f.write_str("<begin-group>"),
            TokenKind::RParen => return f.write_str("<end-group>"),
            TokenKind::Text => "text",
            TokenKind::Ident => "identifier",
            TokenKind::Integer => "integer",
            TokenKind::Float => "float",
            TokenKind::Bool => "boolean",
            TokenKind::String => "literal",
            TokenKind::Invalid => "invalid",
        };
        write!(f, "{}({})", prefix, self.literal)
    }
}

pub const DEFAULT_OPEN: &str = "{{";
pub const DEFAULT_CLOSE: &str = "}}";

const TRIM: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Outside tags.
    Text,
    /// Right after an open delimiter, where the tag sigil lives.
    Sigil,
    /// Inside a tag.
    Tag,
    /// Inside a comment tag; the body is not tokenized.
    Comment,
    /// First literal of `{{=<open> <close>=}}`.
    OpenDelim,
    /// Second literal of `{{=<open> <close>=}}`.
    CloseDelim,
}

/// Forward-only scanner over an in-memory template.
///
/// The open/close delimiter pair is part of the tokenizer state; a call to
/// [`Tokenizer::set_delimiters`] affects every token scanned afterwards.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
    line: usize,
    column: usize,
    mode: Mode,
    open: String,
    close: String,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::with_delimiters(input, DEFAULT_OPEN, DEFAULT_CLOSE)
    }

    pub fn with_delimiters(input: &'a str, open: &str, close: &str) -> Self {
        Self {
            input,
            cursor: 0,
            line: 1,
            column: 1,
            mode: Mode::Text,
            open: open.to_owned(),
            close: close.to_owned(),
        }
    }

    pub fn set_delimiters(&mut self, open: &str, close: &str) {
        if !open.is_empty() {
            self.open = open.to_owned();
        }
        if !close.is_empty() {
            self.close = close.to_owned();
        }
    }

    pub fn delimiters(&self) -> (&str, &str) {
        (&self.open, &self.close)
    }

    pub fn current_position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
            offset: self.cursor,
        }
    }

    pub fn source(&self) -> &'a str {
        self.input
    }

    /// The trimmed source line at `line` (1-based), for diagnostics.
    pub fn line_text(&self, line: usize) -> &'a str {
        self.input
            .lines()
            .nth(line.saturating_sub(1))
            .unwrap_or("")
            .trim()
    }

    pub fn next_token(&mut self) -> Token {
        if self.mode == Mode::Tag {
            self.skip_blank();
        }
        let position = self.current_position();
        if self.remaining().is_empty() {
            return Token::new(TokenKind::Eof, "", position);
        }
        match self.mode {
            Mode::Text if self.at_open() => self.scan_open(position),
            Mode::Text => self.scan_text(position),
            Mode::Sigil => self.scan_sigil(position),
            Mode::Comment => self.scan_comment(position),
            Mode::OpenDelim => self.scan_open_delimiter(position),
            Mode::CloseDelim => self.scan_close_delimiter(position),
            Mode::Tag if self.at_close() => self.scan_close(position),
            Mode::Tag => self.scan_operand(position),
        }
    }

    fn scan_text(&mut self, position: Position) -> Token {
        let rest = self.remaining();
        let len = rest.find(self.open.as_str()).unwrap_or(rest.len());
        let text = &rest[..len];
        self.advance(len);
        Token::new(TokenKind::Text, text, position)
    }

    fn scan_open(&mut self, position: Position) -> Token {
        let start = self.cursor;
        self.advance(self.open.len());
        let mut kind = TokenKind::Open;
        if self.peek_char() == Some(TRIM) {
            self.bump();
            self.skip_blank();
            kind = TokenKind::OpenTrim;
        }
        self.mode = Mode::Sigil;
        Token::new(kind, self.input[start..self.cursor].trim_end(), position)
    }

    fn scan_close(&mut self, position: Position) -> Token {
        let mut kind = TokenKind::Close;
        let mut literal = String::new();
        if self.peek_char() == Some(TRIM) {
            self.bump();
            kind = TokenKind::CloseTrim;
            literal.push(TRIM);
        }
        literal.push_str(&self.close);
        self.advance(self.close.len());
        self.mode = Mode::Text;
        Token::new(kind, literal, position)
    }

    fn scan_sigil(&mut self, position: Position) -> Token {
        let Some(c) = self.peek_char() else {
            return Token::new(TokenKind::Eof, "", position);
        };
        let (kind, mode) = match c {
            '#' => (TokenKind::Block, Mode::Tag),
            '^' => (TokenKind::Inverted, Mode::Tag),
            '%' => (TokenKind::Section, Mode::Tag),
            '<' => (TokenKind::Define, Mode::Tag),
            '@' => (TokenKind::Exec, Mode::Tag),
            '>' => (TokenKind::Partial, Mode::Tag),
            '/' => (TokenKind::End, Mode::Tag),
            '&' => (TokenKind::UnescapeVar, Mode::Tag),
            ':' => (TokenKind::Assign, Mode::Tag),
            '!' => (TokenKind::Comment, Mode::Comment),
            '=' => (TokenKind::Delim, Mode::OpenDelim),
            _ => {
                // no sigil: plain escaped variable, nothing consumed
                self.mode = Mode::Tag;
                return Token::new(TokenKind::EscapeVar, "", position);
            }
        };
        self.bump();
        self.skip_blank();
        self.mode = mode;
        Token::new(kind, c.to_string(), position)
    }

    fn scan_comment(&mut self, position: Position) -> Token {
        self.mode = Mode::Tag;
        let start = self.cursor;
        while !self.remaining().is_empty() && !self.at_close() {
            self.bump();
        }
        let body = self.input[start..self.cursor].trim();
        if self.remaining().is_empty() {
            return Token::new(TokenKind::Invalid, body, position);
        }
        Token::new(TokenKind::Text, body, position)
    }

    fn scan_open_delimiter(&mut self, position: Position) -> Token {
        self.mode = Mode::CloseDelim;
        let (literal, mut valid) = self.scan_delimiter(|c| !is_blank(c));
        if !self.peek_char().is_some_and(is_blank) {
            valid = false;
        }
        self.skip_blank();
        let kind = if valid { TokenKind::Text } else { TokenKind::Invalid };
        Token::new(kind, literal, position)
    }

    fn scan_close_delimiter(&mut self, position: Position) -> Token {
        self.mode = Mode::Tag;
        let (literal, mut valid) = self.scan_delimiter(|c| c != '=' && !is_blank(c));
        self.skip_blank();
        if self.peek_char() == Some('=') {
            self.bump();
        } else {
            valid = false;
        }
        let kind = if valid { TokenKind::Text } else { TokenKind::Invalid };
        Token::new(kind, literal, position)
    }

    fn scan_delimiter(&mut self, accept: impl Fn(char) -> bool) -> (&'a str, bool) {
        let start = self.cursor;
        let mut valid = true;
        while let Some(c) = self.peek_char() {
            if !accept(c) {
                break;
            }
            if c.is_ascii_alphanumeric() {
                valid = false;
            }
            self.bump();
        }
        let literal = &self.input[start..self.cursor];
        (literal, valid && !literal.is_empty())
    }

    fn scan_operand(&mut self, position: Position) -> Token {
        let Some(c) = self.peek_char() else {
            return Token::new(TokenKind::Eof, "", position);
        };
        let next = self.remaining().chars().nth(1);
        let kind = match (c, next) {
            ('|', Some('|')) => TokenKind::Or,
            ('&', Some('&')) => TokenKind::And,
            ('|', _) => TokenKind::Pipe,
            ('!', _) => TokenKind::Not,
            ('-', _) => TokenKind::Minus,
            ('(', _) => TokenKind::LParen,
            (')', _) => TokenKind::RParen,
            ('\'' | '"', _) => return self.scan_string(position),
            (c, _) if c.is_ascii_digit() => return self.scan_number(position),
            (c, _) if c.is_ascii_alphabetic() => return self.scan_ident(position),
            _ => TokenKind::Invalid,
        };
        let start = self.cursor;
        self.bump();
        if matches!(kind, TokenKind::Or | TokenKind::And) {
            self.bump();
        }
        Token::new(kind, &self.input[start..self.cursor], position)
    }

    fn scan_string(&mut self, position: Position) -> Token {
        let Some(quote) = self.bump() else {
            return Token::new(TokenKind::Eof, "", position);
        };
        let input = self.input;
        let start = self.cursor;
        while let Some(c) = self.peek_char() {
            if c == quote {
                let literal = &input[start..self.cursor];
                self.bump();
                return Token::new(TokenKind::String, literal, position);
            }
            self.bump();
        }
        Token::new(TokenKind::Invalid, &input[start..self.cursor], position)
    }

    fn scan_number(&mut self, position: Position) -> Token {
        let start = self.cursor;
        self.skip_while(|c| c.is_ascii_digit());
        let mut kind = TokenKind::Integer;
        if self.peek_char() == Some('.') {
            self.bump();
            self.skip_while(|c| c.is_ascii_digit());
            kind = TokenKind::Float;
        }
        Token::new(kind, &self.input[start..self.cursor], position)
    }

    fn scan_ident(&mut self, position: Position) -> Token {
        let start = self.cursor;
        self.skip_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let ident = &self.input[start..self.cursor];
        let kind = match ident {
            "true" | "false" => TokenKind::Bool,
            _ => TokenKind::Ident,
        };
        Token::new(kind, ident, position)
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn at_open(&self) -> bool {
        self.remaining().starts_with(self.open.as_str())
    }

    fn at_close(&self) -> bool {
        let rest = self.remaining();
        rest.starts_with(self.close.as_str())
            || rest
                .strip_prefix(TRIM)
                .is_some_and(|rest| rest.starts_with(self.close.as_str()))
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.cursor += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Advance `len` bytes; `len` must end on a char boundary.
    fn advance(&mut self, len: usize) {
        let target = self.cursor + len;
        while self.cursor < target {
            if self.bump().is_none() {
                break;
            }
        }
    }

    fn skip_while(&mut self, accept: impl Fn(char) -> bool) {
        while self.peek_char().is_some_and(&accept) {
            self.bump();
        }
    }

    fn skip_blank(&mut self) {
        self.skip_while(is_blank);
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let token = self.next_token();
        (!token.is_eof()).then_some(token)
    }
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}
