use phf::{phf_map, Map};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Type {
    Illegal,
    Eof,

    Ident,
    Number,
    Str,
    Character,

    Assign,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Bang,
    Dot,

    Lt,
    Gt,
    Eq,
    NotEq,
    LtEq,
    GtEq,

    PlusEq,
    MinusEq,
    AsteriskEq,
    SlashEq,
    PercentEq,

    Comma,
    Semicolon,
    Colon,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Function,
    Let,
    Ref,
    True,
    False,
    Void,
    If,
    Else,
    Loop,
    In,
    Out,
    Jump,
    Ret,
    Del,
    And,
    Or,
    Underline,
}

pub const KEYWORDS: Map<&'static str, Type> = phf_map! {
    "func" => Type::Function,
    "let" => Type::Let,
    "ref" => Type::Ref,
    "true" => Type::True,
    "false" => Type::False,
    "void" => Type::Void,
    "if" => Type::If,
    "else" => Type::Else,
    "loop" => Type::Loop,
    "in" => Type::In,
    "out" => Type::Out,
    "jump" => Type::Jump,
    "ret" => Type::Ret,
    "del" => Type::Del,
    "and" => Type::And,
    "or" => Type::Or,
    "_" => Type::Underline,
};

pub fn lookup_ident(ident: &str) -> Type {
    match KEYWORDS.get(ident) {
        Some(ty) => *ty,
        None => Type::Ident,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub ty: Type,
    pub literal: String,
}

impl Token {
    pub fn new(ty: Type, literal: impl Into<String>) -> Self {
        Token {
            ty,
            literal: literal.into(),
        }
    }

    pub fn eof() -> Self {
        Token {
            ty: Type::Eof,
            literal: String::new(),
        }
    }
}
