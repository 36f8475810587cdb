mod token;

pub use token::{lookup_ident, Token, TokenKind, KEYWORDS};
