//! Tokenizer for the QubecTalk front-end (`spec.md` §A supplemental
//! front-end). Deliberately simple: this is the one concrete
//! implementation of "any parser producing [the `Program`] structure",
//! not a faithful reproduction of the reference ANTLR grammar.

use crate::error::{CoreResult, ParseError};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Number(String),
    /// `%`, `/`, punctuation kept as single-char symbols.
    Symbol(char),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
        }
    }

    pub fn tokenize(mut self) -> CoreResult<Vec<Spanned>> {
        let mut tokens = Vec::new();
        loop {
            let next = self.next_token()?;
            let is_eof = matches!(next.token, Token::Eof);
            tokens.push(next);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> CoreResult<Spanned> {
        self.skip_whitespace_and_comments();
        let line = self.line;
        let Some(&c) = self.chars.peek() else {
            return Ok(Spanned { token: Token::Eof, line });
        };

        if c == '"' {
            return self.lex_string(line);
        }
        if c.is_ascii_digit() {
            return self.lex_number(line);
        }
        if c.is_alphabetic() || c == '_' {
            return self.lex_ident(line);
        }
        if c == '-' {
            // Could be a negative number literal or a bare symbol.
            let mut clone = self.chars.clone();
            clone.next();
            if clone.peek().is_some_and(|d| d.is_ascii_digit()) {
                return self.lex_number(line);
            }
        }

        self.chars.next();
        Ok(Spanned {
            token: Token::Symbol(c),
            line,
        })
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.chars.peek() {
                Some('\n') => {
                    self.line += 1;
                    self.chars.next();
                }
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some('#') => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_string(&mut self, line: usize) -> CoreResult<Spanned> {
        self.chars.next(); // opening quote
        let mut s = String::new();
        loop {
            match self.chars.next() {
                Some('"') => break,
                Some(c) => s.push(c),
                None => {
                    return Err(ParseError::new(format!("line {line}"), "unterminated string literal").into());
                }
            }
        }
        Ok(Spanned {
            token: Token::Str(s),
            line,
        })
    }

    fn lex_number(&mut self, line: usize) -> CoreResult<Spanned> {
        let mut s = String::new();
        if self.chars.peek() == Some(&'-') {
            s.push(self.chars.next().unwrap());
        }
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' || c == ',' {
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        Ok(Spanned {
            token: Token::Number(s),
            line,
        })
    }

    fn lex_ident(&mut self, line: usize) -> CoreResult<Spanned> {
        let mut s = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        Ok(Spanned {
            token: Token::Ident(s),
            line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_keywords_strings_and_numbers() {
        let tokens = Lexer::new(r#"set domestic to 100.5 kg # comment"#).tokenize().unwrap();
        let kinds: Vec<_> = tokens.iter().map(|s| s.token.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Ident("set".into()),
                Token::Ident("domestic".into()),
                Token::Ident("to".into()),
                Token::Number("100.5".into()),
                Token::Ident("kg".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn lexes_quoted_strings() {
        let tokens = Lexer::new(r#"policy "My Policy""#).tokenize().unwrap();
        assert_eq!(tokens[1].token, Token::Str("My Policy".into()));
    }
}
