use crate::token::{lookup_ident, Token, Type};

/// Single-pass lexer with one byte of lookahead. Bad input is reported
/// in-band as `Type::Illegal` tokens; after the end of input every call
/// to [`Lexer::next_token`] yields `Type::Eof`.
pub struct Lexer<'a> {
    input: &'a str,
    // current position in input (points to current byte)
    position: usize,
    // current reading position in input (after current byte)
    read_position: usize,
    // current byte under examination
    ch: u8,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut l = Lexer {
            input,
            position: 0,
            read_position: 0,
            ch: 0,
        };
        l.read_char();
        l
    }

    fn read_char(&mut self) {
        if self.read_position >= self.input.len() {
            self.ch = 0;
        } else {
            self.ch = self.input.as_bytes()[self.read_position];
        }
        self.position = self.read_position;
        self.read_position += 1;
    }

    fn peek_char(&self) -> u8 {
        if self.read_position >= self.input.len() {
            0
        } else {
            self.input.as_bytes()[self.read_position]
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let tok = match self.ch {
            b'=' => self.one_or_eq(Type::Assign, Type::Eq),
            b'+' => self.one_or_eq(Type::Plus, Type::PlusEq),
            b'-' => self.one_or_eq(Type::Minus, Type::MinusEq),
            b'*' => self.one_or_eq(Type::Asterisk, Type::AsteriskEq),
            b'/' => self.one_or_eq(Type::Slash, Type::SlashEq),
            b'%' => self.one_or_eq(Type::Percent, Type::PercentEq),
            b'!' => self.one_or_eq(Type::Bang, Type::NotEq),
            b'<' => self.one_or_eq(Type::Lt, Type::LtEq),
            b'>' => self.one_or_eq(Type::Gt, Type::GtEq),

            b';' => Token::new(Type::Semicolon, ";"),
            b':' => Token::new(Type::Colon, ":"),
            b',' => Token::new(Type::Comma, ","),
            b'(' => Token::new(Type::LParen, "("),
            b')' => Token::new(Type::RParen, ")"),
            b'{' => Token::new(Type::LBrace, "{"),
            b'}' => Token::new(Type::RBrace, "}"),
            b'[' => Token::new(Type::LBracket, "["),
            b']' => Token::new(Type::RBracket, "]"),

            b'.' => {
                if self.peek_char().is_ascii_digit() {
                    return Token::new(Type::Number, self.read_number());
                }
                Token::new(Type::Dot, ".")
            }
            b'"' => return Token::new(Type::Str, self.read_quoted(b'"')),
            b'\'' => return Token::new(Type::Character, self.read_quoted(b'\'')),
            b'&' => {
                if is_ident_start(self.peek_char()) {
                    let literal = self.read_identifier();
                    return Token::new(Type::Ident, literal);
                }
                Token::new(Type::Illegal, "&")
            }
            0 => Token::eof(),
            ch => {
                if is_ident_start(ch) {
                    let literal = self.read_identifier();
                    return Token::new(lookup_ident(&literal), literal);
                } else if ch.is_ascii_digit() {
                    return Token::new(Type::Number, self.read_number());
                } else {
                    return Token::new(Type::Illegal, self.read_illegal());
                }
            }
        };

        self.read_char();
        tok
    }

    fn one_or_eq(&mut self, single: Type, with_eq: Type) -> Token {
        let ch = self.ch;
        if self.peek_char() == b'=' {
            self.read_char();
            let mut literal = String::with_capacity(2);
            literal.push(ch as char);
            literal.push('=');
            Token::new(with_eq, literal)
        } else {
            Token::new(single, (ch as char).to_string())
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.ch, b' ' | b'\t' | b'\n' | b'\r') {
            self.read_char();
        }
    }

    fn read_identifier(&mut self) -> String {
        let position = self.position;
        if self.ch == b'&' {
            self.read_char();
        }
        while is_ident_continue(self.ch) {
            self.read_char();
        }
        self.input[position..self.position].to_string()
    }

    fn read_number(&mut self) -> String {
        let position = self.position;
        let mut dot_seen = false;
        let mut e_seen = false;
        loop {
            let ch = self.ch;
            let more = ch.is_ascii_digit()
                || (ch == b'.' && !dot_seen && !e_seen)
                || (ch == b'e' && !e_seen)
                || (matches!(ch, b'+' | b'-')
                    && e_seen
                    && matches!(self.input.as_bytes()[self.position - 1], b'e'));
            if !more {
                break;
            }
            if ch == b'.' {
                dot_seen = true;
            }
            if ch == b'e' {
                e_seen = true;
            }
            self.read_char();
        }
        self.input[position..self.position].to_string()
    }

    // Reads a quoted literal including both delimiters; a backslash
    // escapes the next byte so quotes can appear inside. Unescaping is
    // left to the parser. An unterminated literal keeps whatever was
    // read; the parser rejects it for the missing closing quote.
    fn read_quoted(&mut self, quote: u8) -> String {
        let position = self.position;
        self.read_char();
        loop {
            match self.ch {
                0 => break,
                b'\\' => {
                    self.read_char();
                    if self.ch != 0 {
                        self.read_char();
                    }
                }
                ch if ch == quote => {
                    self.read_char();
                    break;
                }
                _ => self.read_char(),
            }
        }
        self.input[position..self.position].to_string()
    }

    // Consumes one full character so Illegal tokens never split a
    // multi-byte UTF-8 sequence.
    fn read_illegal(&mut self) -> String {
        let position = self.position;
        let ch = self.input[position..].chars().next().unwrap_or('\u{fffd}');
        for _ in 0..ch.len_utf8() {
            self.read_char();
        }
        self.input[position..self.position].to_string()
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || matches!(ch, b'_' | b'$' | b'@' | b'#')
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, b'_' | b'$' | b'@' | b'#' | b'&')
}

#[cfg(test)]
mod tests {
    use super::Lexer;
    use crate::token::Type;

    fn lex_all(input: &str) -> Vec<(Type, String)> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token();
            let done = tok.ty == Type::Eof;
            out.push((tok.ty, tok.literal));
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn test_punctuation_and_operators() {
        let input = "=+-*/%!.<>==!=<=>=+=-=*=/=%=,;:(){}[]";
        let expected = [
            (Type::Assign, "="),
            (Type::Plus, "+"),
            (Type::Minus, "-"),
            (Type::Asterisk, "*"),
            (Type::Slash, "/"),
            (Type::Percent, "%"),
            (Type::Bang, "!"),
            (Type::Dot, "."),
            (Type::Lt, "<"),
            (Type::GtEq, ">="),
            (Type::Eq, "=="),
            (Type::NotEq, "!="),
            (Type::LtEq, "<="),
            (Type::GtEq, ">="),
            (Type::PlusEq, "+="),
            (Type::MinusEq, "-="),
            (Type::AsteriskEq, "*="),
            (Type::SlashEq, "/="),
            (Type::PercentEq, "%="),
            (Type::Comma, ","),
            (Type::Semicolon, ";"),
            (Type::Colon, ":"),
            (Type::LParen, "("),
            (Type::RParen, ")"),
            (Type::LBrace, "{"),
            (Type::RBrace, "}"),
            (Type::LBracket, "["),
            (Type::RBracket, "]"),
            (Type::Eof, ""),
        ];

        let tokens = lex_all(input);
        assert_eq!(tokens.len(), expected.len());
        for (got, want) in tokens.iter().zip(expected.iter()) {
            assert_eq!(got.0, want.0, "literal {:?}", got.1);
            assert_eq!(got.1, want.1);
        }
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let input = "func let ref true false void if else loop in out jump ret del and or _ foobar $tmp @class #";
        let expected = [
            (Type::Function, "func"),
            (Type::Let, "let"),
            (Type::Ref, "ref"),
            (Type::True, "true"),
            (Type::False, "false"),
            (Type::Void, "void"),
            (Type::If, "if"),
            (Type::Else, "else"),
            (Type::Loop, "loop"),
            (Type::In, "in"),
            (Type::Out, "out"),
            (Type::Jump, "jump"),
            (Type::Ret, "ret"),
            (Type::Del, "del"),
            (Type::And, "and"),
            (Type::Or, "or"),
            (Type::Underline, "_"),
            (Type::Ident, "foobar"),
            (Type::Ident, "$tmp"),
            (Type::Ident, "@class"),
            (Type::Ident, "#"),
            (Type::Eof, ""),
        ];

        let tokens = lex_all(input);
        assert_eq!(tokens.len(), expected.len());
        for (got, want) in tokens.iter().zip(expected.iter()) {
            assert_eq!((got.0, got.1.as_str()), *want);
        }
    }

    #[test]
    fn test_reference_identifiers() {
        let tokens = lex_all("let &b = a; type&(b);");
        let expected = [
            (Type::Let, "let"),
            (Type::Ident, "&b"),
            (Type::Assign, "="),
            (Type::Ident, "a"),
            (Type::Semicolon, ";"),
            (Type::Ident, "type&"),
            (Type::LParen, "("),
            (Type::Ident, "b"),
            (Type::RParen, ")"),
            (Type::Semicolon, ";"),
            (Type::Eof, ""),
        ];
        assert_eq!(tokens.len(), expected.len());
        for (got, want) in tokens.iter().zip(expected.iter()) {
            assert_eq!((got.0, got.1.as_str()), *want);
        }
    }

    #[test]
    fn test_numbers() {
        let tests = [
            ("5", "5"),
            ("10.5", "10.5"),
            (".5", ".5"),
            ("5.", "5."),
            ("10e2", "10e2"),
            ("1e-3", "1e-3"),
            ("2.5e+10", "2.5e+10"),
        ];
        for (input, want) in tests {
            let tokens = lex_all(input);
            assert_eq!(tokens[0], (Type::Number, want.to_string()), "input {input}");
            assert_eq!(tokens[1].0, Type::Eof);
        }
    }

    #[test]
    fn test_number_followed_by_operator() {
        // A sign belongs to the number only directly after the exponent
        // marker, so `1e2+3` is an addition.
        let tokens = lex_all("1e2+3;");
        let expected = [
            (Type::Number, "1e2"),
            (Type::Plus, "+"),
            (Type::Number, "3"),
            (Type::Semicolon, ";"),
            (Type::Eof, ""),
        ];
        assert_eq!(tokens.len(), expected.len());
        for (got, want) in tokens.iter().zip(expected.iter()) {
            assert_eq!((got.0, got.1.as_str()), *want);
        }
    }

    #[test]
    fn test_strings_and_characters() {
        let tokens = lex_all(r#"let s = "hello \"world\""; let c = 'x';"#);
        let expected = [
            (Type::Let, "let"),
            (Type::Ident, "s"),
            (Type::Assign, "="),
            (Type::Str, r#""hello \"world\"""#),
            (Type::Semicolon, ";"),
            (Type::Let, "let"),
            (Type::Ident, "c"),
            (Type::Assign, "="),
            (Type::Character, "'x'"),
            (Type::Semicolon, ";"),
            (Type::Eof, ""),
        ];
        assert_eq!(tokens.len(), expected.len());
        for (got, want) in tokens.iter().zip(expected.iter()) {
            assert_eq!((got.0, got.1.as_str()), *want);
        }
    }

    #[test]
    fn test_illegal_bytes() {
        let tokens = lex_all("a ^ b");
        assert_eq!(tokens[1], (Type::Illegal, "^".to_string()));

        let tokens = lex_all("a & b");
        assert_eq!(tokens[1], (Type::Illegal, "&".to_string()));
    }

    #[test]
    fn test_eof_forever() {
        let mut lexer = Lexer::new("");
        for _ in 0..3 {
            assert_eq!(lexer.next_token().ty, Type::Eof);
        }
    }

    #[test]
    fn test_roundtrip_preserves_source() {
        let source = "let add = func(x, y) { ret x + y; }; add(1, 2.5);";
        let mut lexer = Lexer::new(source);
        let mut rebuilt = String::new();
        loop {
            let tok = lexer.next_token();
            if tok.ty == Type::Eof {
                break;
            }
            rebuilt.push_str(&tok.literal);
        }
        let stripped: String = source.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(rebuilt, stripped);
    }
}
