//! UTF-8 safe tokenizer with one-character lookahead for multi-character
//! operators.
//!
//! The lexer holds the source as a random-access sequence of code points (a
//! `Vec<char>`, not a byte slice) so that identifiers and strings containing
//! non-ASCII letters scan correctly; `position`/`read_position` index into
//! that vector rather than into raw UTF-8 bytes.

use log::trace;

use crate::token::{lookup_ident, Token, TokenKind};

pub struct Lexer {
    input: Vec<char>,
    /// Index of `ch` in `input`.
    position: usize,
    /// Index of the next code point to read.
    read_position: usize,
    /// Code point currently under examination; `'\0'` at end of input.
    ch: char,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let mut lexer = Self {
            input: input.chars().collect(),
            position: 0,
            read_position: 0,
            ch: '\0',
        };
        lexer.read_char();
        lexer
    }

    fn read_char(&mut self) {
        self.ch = self.input.get(self.read_position).copied().unwrap_or('\0');
        self.position = self.read_position;
        self.read_position += 1;
    }

    fn peek_char(&self) -> char {
        self.input.get(self.read_position).copied().unwrap_or('\0')
    }

    fn skip_whitespace(&mut self) {
        while self.ch.is_whitespace() {
            self.read_char();
        }
    }

    /// Produces the next token. Past end-of-input every call returns `Eof`.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let token = match self.ch {
            '=' => {
                if self.peek_char() == '=' {
                    self.read_char();
                    Token::new(TokenKind::Eq, "==")
                } else {
                    Token::new(TokenKind::Assign, "=")
                }
            }
            '!' => {
                if self.peek_char() == '=' {
                    self.read_char();
                    Token::new(TokenKind::NotEq, "!=")
                } else {
                    Token::new(TokenKind::Bang, "!")
                }
            }
            '+' => Token::new(TokenKind::Plus, "+"),
            '-' => Token::new(TokenKind::Minus, "-"),
            '*' => Token::new(TokenKind::Asterisk, "*"),
            '/' => Token::new(TokenKind::Slash, "/"),
            '<' => Token::new(TokenKind::Lt, "<"),
            '>' => Token::new(TokenKind::Gt, ">"),
            ';' => Token::new(TokenKind::Semicolon, ";"),
            ':' => Token::new(TokenKind::Colon, ":"),
            ',' => Token::new(TokenKind::Comma, ","),
            '(' => Token::new(TokenKind::LParen, "("),
            ')' => Token::new(TokenKind::RParen, ")"),
            '{' => Token::new(TokenKind::LBrace, "{"),
            '}' => Token::new(TokenKind::RBrace, "}"),
            '[' => Token::new(TokenKind::LBracket, "["),
            ']' => Token::new(TokenKind::RBracket, "]"),
            '"' => return self.read_string(),
            '\0' => {
                trace!("lexer reached end of input at position {}", self.position);
                Token::eof()
            }
            c if c.is_alphabetic() => return self.read_identifier(),
            c if c.is_ascii_digit() => return self.read_number(),
            c => Token::new(TokenKind::Illegal, c.to_string()),
        };

        self.read_char();
        token
    }

    /// Consumes a run of Unicode letters and resolves it against the
    /// keyword table.
    fn read_identifier(&mut self) -> Token {
        let start = self.position;
        while self.ch.is_alphabetic() {
            self.read_char();
        }
        let literal: String = self.input[start..self.position].iter().collect();
        let kind = lookup_ident(&literal);
        Token::new(kind, literal)
    }

    /// Consumes a run of Unicode digits. No sign, no floating point.
    fn read_number(&mut self) -> Token {
        let start = self.position;
        while self.ch.is_ascii_digit() {
            self.read_char();
        }
        let literal: String = self.input[start..self.position].iter().collect();
        Token::new(TokenKind::Int, literal)
    }

    /// Consumes until the matching `"` or end-of-input. No escape
    /// processing: the literal is the raw inner text. An unterminated
    /// string's literal runs to end-of-input rather than failing the lexer.
    fn read_string(&mut self) -> Token {
        self.read_char(); // consume opening quote
        let start = self.position;
        while self.ch != '"' && self.ch != '\0' {
            self.read_char();
        }
        let literal: String = self.input[start..self.position].iter().collect();
        if self.ch == '"' {
            self.read_char(); // consume closing quote
        }
        Token::new(TokenKind::String, literal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_token_covers_all_punctuation_and_keywords() {
        let input = r#"let five = 5;
let ten = 10;

let add = fn(x, y) {
  x + y;
};

let result = add(five, ten);
!-/*5;
5 < 10 > 5;

if (5 < 10) {
    return true;
} else {
    return false;
}

10 == 10;
10 != 9;
"foobar"
"foo bar"
[1, 2];
{"foo": "bar"}
"#;

        let expected = vec![
            (TokenKind::Let, "let"),
            (TokenKind::Ident, "five"),
            (TokenKind::Assign, "="),
            (TokenKind::Int, "5"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::Let, "let"),
            (TokenKind::Ident, "ten"),
            (TokenKind::Assign, "="),
            (TokenKind::Int, "10"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::Let, "let"),
            (TokenKind::Ident, "add"),
            (TokenKind::Assign, "="),
            (TokenKind::Function, "fn"),
            (TokenKind::LParen, "("),
            (TokenKind::Ident, "x"),
            (TokenKind::Comma, ","),
            (TokenKind::Ident, "y"),
            (TokenKind::RParen, ")"),
            (TokenKind::LBrace, "{"),
            (TokenKind::Ident, "x"),
            (TokenKind::Plus, "+"),
            (TokenKind::Ident, "y"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::RBrace, "}"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::Let, "let"),
            (TokenKind::Ident, "result"),
            (TokenKind::Assign, "="),
            (TokenKind::Ident, "add"),
            (TokenKind::LParen, "("),
            (TokenKind::Ident, "five"),
            (TokenKind::Comma, ","),
            (TokenKind::Ident, "ten"),
            (TokenKind::RParen, ")"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::Bang, "!"),
            (TokenKind::Minus, "-"),
            (TokenKind::Slash, "/"),
            (TokenKind::Asterisk, "*"),
            (TokenKind::Int, "5"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::Int, "5"),
            (TokenKind::Lt, "<"),
            (TokenKind::Int, "10"),
            (TokenKind::Gt, ">"),
            (TokenKind::Int, "5"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::If, "if"),
            (TokenKind::LParen, "("),
            (TokenKind::Int, "5"),
            (TokenKind::Lt, "<"),
            (TokenKind::Int, "10"),
            (TokenKind::RParen, ")"),
            (TokenKind::LBrace, "{"),
            (TokenKind::Return, "return"),
            (TokenKind::True, "true"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::RBrace, "}"),
            (TokenKind::Else, "else"),
            (TokenKind::LBrace, "{"),
            (TokenKind::Return, "return"),
            (TokenKind::False, "false"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::RBrace, "}"),
            (TokenKind::Int, "10"),
            (TokenKind::Eq, "=="),
            (TokenKind::Int, "10"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::Int, "10"),
            (TokenKind::NotEq, "!="),
            (TokenKind::Int, "9"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::String, "foobar"),
            (TokenKind::String, "foo bar"),
            (TokenKind::LBracket, "["),
            (TokenKind::Int, "1"),
            (TokenKind::Comma, ","),
            (TokenKind::Int, "2"),
            (TokenKind::RBracket, "]"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::LBrace, "{"),
            (TokenKind::String, "foo"),
            (TokenKind::Colon, ":"),
            (TokenKind::String, "bar"),
            (TokenKind::RBrace, "}"),
            (TokenKind::Eof, ""),
        ];

        let mut lexer = Lexer::new(input);
        for (kind, literal) in expected {
            let tok = lexer.next_token();
            assert_eq!(tok.kind, kind);
            assert_eq!(tok.literal, literal);
        }
    }

    #[test]
    fn eof_is_returned_indefinitely() {
        let mut lexer = Lexer::new("");
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    }

    #[test]
    fn unknown_character_is_illegal() {
        let mut lexer = Lexer::new("@");
        assert_eq!(lexer.next_token().kind, TokenKind::Illegal);
    }

    #[test]
    fn unterminated_string_runs_to_end_of_input() {
        let mut lexer = Lexer::new(r#""unterminated"#);
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::String);
        assert_eq!(tok.literal, "unterminated");
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    }

    #[test]
    fn identifiers_accept_unicode_letters() {
        let mut lexer = Lexer::new("let café = 1;");
        assert_eq!(lexer.next_token().kind, TokenKind::Let);
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Ident);
        assert_eq!(tok.literal, "café");
    }

    #[test]
    fn non_whitespace_literals_reconstruct_the_source() {
        let input = "let x=fn(a,b){a+b;};x(1,2)";
        let mut lexer = Lexer::new(input);
        let mut rebuilt = String::new();
        loop {
            let tok = lexer.next_token();
            if tok.kind == TokenKind::Eof {
                break;
            }
            rebuilt.push_str(&tok.literal);
        }
        let non_whitespace: String = input.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(rebuilt, non_whitespace);
    }
}
