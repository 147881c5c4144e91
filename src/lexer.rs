use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Eof,
    Def,
    Extern,
    If,
    Then,
    Else,
    For,
    In,
    Ident(String),
    Number(f64),
    /// Any character that isn't a keyword, identifier, or number: operators
    /// and punctuation reach the parser as themselves.
    Char(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => write!(f, "end of input"),
            Token::Def => write!(f, "'def'"),
            Token::Extern => write!(f, "'extern'"),
            Token::If => write!(f, "'if'"),
            Token::Then => write!(f, "'then'"),
            Token::Else => write!(f, "'else'"),
            Token::For => write!(f, "'for'"),
            Token::In => write!(f, "'in'"),
            Token::Ident(name) => write!(f, "identifier '{}'", name),
            Token::Number(num) => write!(f, "number {}", num),
            Token::Char(c) => write!(f, "'{}'", c),
        }
    }
}

/// Pull-based tokenizer over a character stream. Never reads more than one
/// character past the current token, and never fails: malformed input
/// degrades to `Token::Char` or the numeric leniency below.
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            chars: input.chars().peekable(),
        }
    }

    pub fn next_token(&mut self) -> Token {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }

        match self.chars.peek() {
            None => Token::Eof,
            Some(c) if c.is_ascii_alphabetic() => self.lex_word(),
            Some(c) if c.is_ascii_digit() || *c == '.' => self.lex_number(),
            Some('#') => {
                while !matches!(self.chars.peek(), None | Some('\n') | Some('\r')) {
                    self.chars.next();
                }
                self.next_token()
            }
            Some(&c) => {
                self.chars.next();
                Token::Char(c)
            }
        }
    }

    fn lex_word(&mut self) -> Token {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if !c.is_ascii_alphanumeric() {
                break;
            }
            word.push(c);
            self.chars.next();
        }

        match word.as_str() {
            "def" => Token::Def,
            "extern" => Token::Extern,
            "if" => Token::If,
            "then" => Token::Then,
            "else" => Token::Else,
            "for" => Token::For,
            "in" => Token::In,
            _ => Token::Ident(word),
        }
    }

    fn lex_number(&mut self) -> Token {
        let mut text = String::new();
        let mut dot_seen = false;

        // A lone '.' with no digit after it lexes as 0.0 and leaves the
        // following character for the next call.
        if self.chars.peek() == Some(&'.') {
            self.chars.next();
            match self.chars.peek() {
                Some(c) if c.is_ascii_digit() => {
                    text.push('.');
                    dot_seen = true;
                }
                _ => return Token::Number(0.0),
            }
        }

        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c == '.' && !dot_seen {
                dot_seen = true;
                text.push(c);
            } else {
                break;
            }
            self.chars.next();
        }

        Token::Number(text.parse().unwrap_or(0.0))
    }
}
