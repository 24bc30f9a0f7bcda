use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

// Nodes own their children outright; function and underline bodies are
// Rc-shared so function values can outlive the program that defined
// them (a REPL line, an eval() string) without cloning statements.

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    Let {
        name: String,
        value: Option<Expr>,
    },
    Ref {
        name: String,
        value: Expr,
    },
    Ret(Option<Expr>),
    Out(Option<Expr>),
    Jump,
    Del(Expr),
    Expression(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Integer(i64),
    Float(f64),
    Str(String),
    Character(char),
    Boolean(bool),
    Void,
    Identifier(String),
    Prefix {
        op: String,
        right: Box<Expr>,
    },
    Infix {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: String,
        left: Box<Expr>,
        value: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        consequence: Vec<Stmt>,
        alternative: Option<Vec<Stmt>>,
    },
    Loop {
        cond: Box<Expr>,
        body: Vec<Stmt>,
    },
    LoopIn {
        name: String,
        range: Box<Expr>,
        body: Vec<Stmt>,
    },
    Function {
        parameters: Vec<String>,
        body: Rc<Vec<Stmt>>,
    },
    Underline {
        body: Rc<Vec<Stmt>>,
    },
    Call {
        function: Box<Expr>,
        arguments: Vec<Expr>,
    },
    Index {
        left: Box<Expr>,
        indexes: Vec<Expr>,
    },
    Dot {
        left: Box<Expr>,
        name: String,
    },
    Array(Vec<Expr>),
    Hash(Vec<(Expr, Expr)>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct Program {
    pub(crate) statements: Vec<Stmt>,
}

fn write_block(f: &mut Formatter<'_>, stmts: &[Stmt]) -> fmt::Result {
    write!(f, "{{ ")?;
    for stmt in stmts {
        write!(f, "{} ", stmt)?;
    }
    write!(f, "}}")
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Let { name, value: None } => write!(f, "let {};", name),
            Stmt::Let {
                name,
                value: Some(value),
            } => write!(f, "let {} = {};", name, value),
            Stmt::Ref { name, value } => write!(f, "ref {} = {};", name, value),
            Stmt::Ret(None) => write!(f, "ret;"),
            Stmt::Ret(Some(value)) => write!(f, "ret {};", value),
            Stmt::Out(None) => write!(f, "out;"),
            Stmt::Out(Some(value)) => write!(f, "out {};", value),
            Stmt::Jump => write!(f, "jump;"),
            Stmt::Del(target) => write!(f, "del {};", target),
            Stmt::Expression(expr) => write!(f, "{};", expr),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Integer(value) => write!(f, "{}", value),
            Expr::Float(value) => write!(f, "{}", value),
            Expr::Str(value) => write!(f, "\"{}\"", value),
            Expr::Character(value) => write!(f, "'{}'", value),
            Expr::Boolean(value) => write!(f, "{}", value),
            Expr::Void => write!(f, "void"),
            Expr::Identifier(name) => write!(f, "{}", name),
            Expr::Prefix { op, right } => write!(f, "({}{})", op, right),
            Expr::Infix { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Assign { op, left, value } => write!(f, "({} {} {})", left, op, value),
            Expr::If {
                cond,
                consequence,
                alternative,
            } => {
                write!(f, "if ({}) ", cond)?;
                write_block(f, consequence)?;
                if let Some(alternative) = alternative {
                    write!(f, " else ")?;
                    write_block(f, alternative)?;
                }
                Ok(())
            }
            Expr::Loop { cond, body } => {
                write!(f, "loop ({}) ", cond)?;
                write_block(f, body)
            }
            Expr::LoopIn { name, range, body } => {
                write!(f, "loop {} in {} ", name, range)?;
                write_block(f, body)
            }
            Expr::Function { parameters, body } => {
                write!(f, "func({}) ", parameters.join(", "))?;
                write_block(f, body)
            }
            Expr::Underline { body } => {
                write!(f, "_ ")?;
                write_block(f, body)
            }
            Expr::Call {
                function,
                arguments,
            } => {
                let args: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", function, args.join(", "))
            }
            Expr::Index { left, indexes } => {
                let idx: Vec<String> = indexes.iter().map(|i| i.to_string()).collect();
                write!(f, "({}[{}])", left, idx.join(", "))
            }
            Expr::Dot { left, name } => write!(f, "({}.{})", left, name),
            Expr::Array(elements) => {
                let elems: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", elems.join(", "))
            }
            Expr::Hash(pairs) => {
                let pairs: Vec<String> =
                    pairs.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", pairs.join(", "))
            }
        }
    }
}
