//! Expression engine for histogram coordinates and cuts.
//!
//! Expressions are parsed once into an [`Expression`] that refers to branches
//! by name, then bound to the job-wide [`BranchTable`] to produce a
//! [`BoundExpression`] that evaluates against one record at a time.
//!
//! Supports arithmetic (`+ - * / %`), comparisons (`== != < <= > >=`),
//! boolean operators (`&& || !`) and the built-in functions `abs`, `sqrt`,
//! `exp`, `log`, `log10`, `sin`, `cos`, `tan`, `atan2`, `pow`, `min` and `max`.
//! Boolean results are `1.0` or `0.0`; a value is truthy when it is neither
//! zero nor NaN.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use thiserror::Error;

/// Errors raised while tokenizing or parsing an expression.
///
/// Offsets are byte positions within the expression text.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ExpressionError {
    /// The expression is blank.
    #[error("expression is empty")]
    Empty,
    /// A character that starts no token.
    #[error("unexpected character `{character}` at offset {offset}")]
    UnexpectedCharacter {
        /// Offending character.
        character: char,
        /// Byte offset.
        offset: usize,
    },
    /// A numeric literal that does not parse as `f64`.
    #[error("invalid number `{literal}` at offset {offset}")]
    InvalidNumber {
        /// Literal text.
        literal: String,
        /// Byte offset.
        offset: usize,
    },
    /// A token that does not fit the grammar at this point.
    #[error("unexpected `{found}` at offset {offset}, expected {expected}")]
    UnexpectedToken {
        /// Rendered token.
        found: String,
        /// What the parser wanted.
        expected: &'static str,
        /// Byte offset.
        offset: usize,
    },
    /// Input ended while more was required.
    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd {
        /// What the parser wanted.
        expected: &'static str,
    },
    /// A call to a function that does not exist.
    #[error("unknown function `{name}` at offset {offset}")]
    UnknownFunction {
        /// Function name.
        name: String,
        /// Byte offset.
        offset: usize,
    },
    /// Parentheses, unary operators or calls nest too deeply.
    #[error("expression nests deeper than {limit} levels at offset {offset}")]
    TooDeep {
        /// Maximum nesting depth.
        limit: usize,
        /// Byte offset of the token that exceeded it.
        offset: usize,
    },
    /// A call with the wrong number of arguments.
    #[error("function `{name}` takes {expected} argument(s) but {found} were given")]
    WrongArity {
        /// Function name.
        name: &'static str,
        /// Required argument count.
        expected: usize,
        /// Supplied argument count.
        found: usize,
    },
}

// ── AST ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Function {
    Abs,
    Sqrt,
    Exp,
    Log,
    Log10,
    Sin,
    Cos,
    Tan,
    Atan2,
    Pow,
    Min,
    Max,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        let function = match name {
            "abs" => Self::Abs,
            "sqrt" => Self::Sqrt,
            "exp" => Self::Exp,
            "log" => Self::Log,
            "log10" => Self::Log10,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "atan2" => Self::Atan2,
            "pow" => Self::Pow,
            "min" => Self::Min,
            "max" => Self::Max,
            _ => return None,
        };
        Some(function)
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Log10 => "log10",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Atan2 => "atan2",
            Self::Pow => "pow",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    const fn arity(self) -> usize {
        match self {
            Self::Atan2 | Self::Pow | Self::Min | Self::Max => 2,
            _ => 1,
        }
    }

    fn apply(self, args: &[f64]) -> f64 {
        let a = args.first().copied().unwrap_or(f64::NAN);
        let b = args.get(1).copied().unwrap_or(f64::NAN);
        match self {
            Self::Abs => a.abs(),
            Self::Sqrt => a.sqrt(),
            Self::Exp => a.exp(),
            Self::Log => a.ln(),
            Self::Log10 => a.log10(),
            Self::Sin => a.sin(),
            Self::Cos => a.cos(),
            Self::Tan => a.tan(),
            Self::Atan2 => a.atan2(b),
            Self::Pow => a.powf(b),
            Self::Min => a.min(b),
            Self::Max => a.max(b),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Node<V> {
    Number(f64),
    Var(V),
    Neg(Box<Node<V>>),
    Not(Box<Node<V>>),
    Binary(BinaryOp, Box<Node<V>>, Box<Node<V>>),
    Call(Function, Vec<Node<V>>),
}

impl<V> Node<V> {
    fn try_map<W, E>(self, f: &mut impl FnMut(V) -> Result<W, E>) -> Result<Node<W>, E> {
        Ok(match self {
            Self::Number(value) => Node::Number(value),
            Self::Var(var) => Node::Var(f(var)?),
            Self::Neg(inner) => Node::Neg(Box::new(inner.try_map(f)?)),
            Self::Not(inner) => Node::Not(Box::new(inner.try_map(f)?)),
            Self::Binary(op, lhs, rhs) => {
                Node::Binary(op, Box::new(lhs.try_map(f)?), Box::new(rhs.try_map(f)?))
            }
            Self::Call(function, args) => Node::Call(
                function,
                args.into_iter()
                    .map(|arg| arg.try_map(f))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    fn visit_vars<'a>(&'a self, f: &mut impl FnMut(&'a V)) {
        match self {
            Self::Number(_) => {}
            Self::Var(var) => f(var),
            Self::Neg(inner) | Self::Not(inner) => inner.visit_vars(f),
            Self::Binary(_, lhs, rhs) => {
                lhs.visit_vars(f);
                rhs.visit_vars(f);
            }
            Self::Call(_, args) => args.iter().for_each(|arg| arg.visit_vars(f)),
        }
    }
}

const fn truth(flag: bool) -> f64 {
    if flag { 1.0 } else { 0.0 }
}

/// Returns whether `value` counts as true: neither zero nor NaN.
#[must_use]
pub fn is_truthy(value: f64) -> bool {
    value != 0.0 && !value.is_nan()
}

fn eval_node(node: &Node<usize>, record: &[Option<f64>]) -> Option<f64> {
    Some(match node {
        Node::Number(value) => *value,
        Node::Var(slot) => record.get(*slot).copied().flatten()?,
        Node::Neg(inner) => -eval_node(inner, record)?,
        Node::Not(inner) => truth(!is_truthy(eval_node(inner, record)?)),
        Node::Binary(op, lhs, rhs) => {
            let a = eval_node(lhs, record)?;
            let b = eval_node(rhs, record)?;
            match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Rem => a % b,
                BinaryOp::Eq => truth(a == b),
                BinaryOp::Ne => truth(a != b),
                BinaryOp::Lt => truth(a < b),
                BinaryOp::Le => truth(a <= b),
                BinaryOp::Gt => truth(a > b),
                BinaryOp::Ge => truth(a >= b),
                BinaryOp::And => truth(is_truthy(a) && is_truthy(b)),
                BinaryOp::Or => truth(is_truthy(a) || is_truthy(b)),
            }
        }
        Node::Call(function, args) => {
            let mut values = [0.0_f64; 2];
            for (value, arg) in values.iter_mut().zip(args) {
                *value = eval_node(arg, record)?;
            }
            function.apply(values.get(..args.len()).unwrap_or(&values[..]))
        }
    })
}

// ── Public types ───────────────────────────────────────────────

/// A parsed expression referring to branches by name.
///
/// # Examples
/// ```
/// use treedraw_core::expr::Expression;
///
/// let expr = Expression::parse("sqrt(px*px + py*py) > 1")?;
/// assert_eq!(expr.branches(), ["px", "py"]);
/// assert_eq!(expr.source(), "sqrt(px*px + py*py) > 1");
/// # Ok::<(), treedraw_core::expr::ExpressionError>(())
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    source: String,
    root: Node<String>,
}

impl Expression {
    /// Parses `input` into an expression tree.
    ///
    /// # Errors
    /// Returns [`ExpressionError`] for lexical or grammatical errors.
    pub fn parse(input: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(ExpressionError::Empty);
        }
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            depth: 0,
        };
        let root = parser.parse_or()?;
        if let Some(extra) = parser.peek() {
            return Err(ExpressionError::UnexpectedToken {
                found: extra.token.to_string(),
                expected: "end of expression",
                offset: extra.offset,
            });
        }
        Ok(Self {
            source: input.trim().to_owned(),
            root,
        })
    }

    /// Returns the trimmed source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the distinct branch names in order of first use.
    #[must_use]
    pub fn branches(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        self.root.visit_vars(&mut |name| {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        });
        names
    }

    /// Resolves branch names to slots in `table`, registering new names.
    #[must_use]
    pub fn bind(&self, table: &mut BranchTable) -> BoundExpression {
        let root = self
            .root
            .clone()
            .try_map(&mut |name: String| Ok::<_, std::convert::Infallible>(table.slot(&name)));
        match root {
            Ok(root) => BoundExpression { root },
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Ordered set of branch names shared by every expression of a job.
///
/// A record handed to [`BoundExpression::eval`] holds one value per slot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BranchTable {
    names: Vec<String>,
}

impl BranchTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self { names: Vec::new() }
    }

    /// Returns the slot for `name`, appending it if unseen.
    pub fn slot(&mut self, name: &str) -> usize {
        if let Some(index) = self.names.iter().position(|known| known == name) {
            return index;
        }
        self.names.push(name.to_owned());
        self.names.len() - 1
    }

    /// Returns the branch names in slot order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns whether no branch has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// An expression whose branches are resolved to record slots.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundExpression {
    root: Node<usize>,
}

impl BoundExpression {
    /// Evaluates the expression against one record.
    ///
    /// Returns `None` when a referenced branch is null in `record`.
    ///
    /// # Examples
    /// ```
    /// use treedraw_core::expr::{BranchTable, Expression};
    ///
    /// let mut table = BranchTable::new();
    /// let bound = Expression::parse("px > 2")?.bind(&mut table);
    /// assert_eq!(bound.eval(&[Some(3.0)]), Some(1.0));
    /// assert_eq!(bound.eval(&[None]), None);
    /// # Ok::<(), treedraw_core::expr::ExpressionError>(())
    /// ```
    #[must_use]
    pub fn eval(&self, record: &[Option<f64>]) -> Option<f64> {
        eval_node(&self.root, record)
    }
}

// ── Tokenizer ──────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(value) => write!(f, "{value}"),
            Self::Ident(name) => f.write_str(name),
            Self::Plus => f.write_str("+"),
            Self::Minus => f.write_str("-"),
            Self::Star => f.write_str("*"),
            Self::Slash => f.write_str("/"),
            Self::Percent => f.write_str("%"),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
            Self::Comma => f.write_str(","),
            Self::EqEq => f.write_str("=="),
            Self::Ne => f.write_str("!="),
            Self::Lt => f.write_str("<"),
            Self::Le => f.write_str("<="),
            Self::Gt => f.write_str(">"),
            Self::Ge => f.write_str(">="),
            Self::AndAnd => f.write_str("&&"),
            Self::OrOr => f.write_str("||"),
            Self::Bang => f.write_str("!"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Spanned {
    token: Token,
    offset: usize,
}

fn tokenize(input: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let token = if c.is_ascii_digit() || c == '.' {
            lex_number(input, &mut chars)?
        } else if c.is_ascii_alphabetic() || c == '_' {
            lex_ident(input, &mut chars)
        } else {
            chars.next();
            lex_operator(c, offset, &mut chars)?
        };
        tokens.push(Spanned { token, offset });
    }

    Ok(tokens)
}

fn lex_number(
    input: &str,
    chars: &mut Peekable<CharIndices<'_>>,
) -> Result<Token, ExpressionError> {
    let start = chars.peek().map_or(input.len(), |&(offset, _)| offset);
    let mut end = start;
    let mut previous = '\0';
    while let Some(&(offset, c)) = chars.peek() {
        let exponent_sign = (c == '+' || c == '-') && (previous == 'e' || previous == 'E');
        if !(c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || exponent_sign) {
            break;
        }
        previous = c;
        end = offset + c.len_utf8();
        chars.next();
    }
    let literal = input.get(start..end).unwrap_or_default();
    literal
        .parse::<f64>()
        .map(Token::Num)
        .map_err(|_| ExpressionError::InvalidNumber {
            literal: literal.to_owned(),
            offset: start,
        })
}

fn lex_ident(input: &str, chars: &mut Peekable<CharIndices<'_>>) -> Token {
    let start = chars.peek().map_or(input.len(), |&(offset, _)| offset);
    let mut end = start;
    while let Some(&(offset, c)) = chars.peek() {
        if !(c.is_ascii_alphanumeric() || c == '_' || c == '.') {
            break;
        }
        end = offset + c.len_utf8();
        chars.next();
    }
    Token::Ident(input.get(start..end).unwrap_or_default().to_owned())
}

fn lex_operator(
    c: char,
    offset: usize,
    chars: &mut Peekable<CharIndices<'_>>,
) -> Result<Token, ExpressionError> {
    let next = chars.peek().map(|&(_, next)| next);
    let (token, pair) = match (c, next) {
        ('&', Some('&')) => (Token::AndAnd, true),
        ('|', Some('|')) => (Token::OrOr, true),
        ('=', Some('=')) => (Token::EqEq, true),
        ('!', Some('=')) => (Token::Ne, true),
        ('<', Some('=')) => (Token::Le, true),
        ('>', Some('=')) => (Token::Ge, true),
        ('+', _) => (Token::Plus, false),
        ('-', _) => (Token::Minus, false),
        ('*', _) => (Token::Star, false),
        ('/', _) => (Token::Slash, false),
        ('%', _) => (Token::Percent, false),
        ('(', _) => (Token::LParen, false),
        (')', _) => (Token::RParen, false),
        (',', _) => (Token::Comma, false),
        ('<', _) => (Token::Lt, false),
        ('>', _) => (Token::Gt, false),
        ('!', _) => (Token::Bang, false),
        _ => {
            return Err(ExpressionError::UnexpectedCharacter {
                character: c,
                offset,
            });
        }
    };
    if pair {
        chars.next();
    }
    Ok(token)
}

// ── Parser (recursive descent) ─────────────────────────────────

/// Deepest nesting of parentheses, unary operators and calls.
pub const MAX_NESTING: usize = 256;

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn nested<T>(
        &mut self,
        offset: usize,
        parse: impl FnOnce(&mut Self) -> Result<T, ExpressionError>,
    ) -> Result<T, ExpressionError> {
        if self.depth >= MAX_NESTING {
            return Err(ExpressionError::TooDeep {
                limit: MAX_NESTING,
                offset,
            });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|spanned| &spanned.token)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.pos).cloned();
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    fn expect(&mut self, wanted: &Token, expected: &'static str) -> Result<(), ExpressionError> {
        match self.advance() {
            Some(spanned) if &spanned.token == wanted => Ok(()),
            Some(spanned) => Err(ExpressionError::UnexpectedToken {
                found: spanned.token.to_string(),
                expected,
                offset: spanned.offset,
            }),
            None => Err(ExpressionError::UnexpectedEnd { expected }),
        }
    }

    fn parse_or(&mut self) -> Result<Node<String>, ExpressionError> {
        let mut lhs = self.parse_and()?;
        while self.peek_token() == Some(&Token::OrOr) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Node::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Node<String>, ExpressionError> {
        let mut lhs = self.parse_cmp()?;
        while self.peek_token() == Some(&Token::AndAnd) {
            self.advance();
            let rhs = self.parse_cmp()?;
            lhs = Node::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Node<String>, ExpressionError> {
        let lhs = self.parse_add()?;
        let op = match self.peek_token() {
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_add()?;
        Ok(Node::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_add(&mut self) -> Result<Node<String>, ExpressionError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Node<String>, ExpressionError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Node<String>, ExpressionError> {
        let Some(Spanned { token, offset }) = self.peek().cloned() else {
            return self.parse_atom();
        };
        match token {
            Token::Minus => {
                self.advance();
                let operand = self.nested(offset, Self::parse_unary)?;
                Ok(Node::Neg(Box::new(operand)))
            }
            Token::Plus => {
                self.advance();
                self.nested(offset, Self::parse_unary)
            }
            Token::Bang => {
                self.advance();
                let operand = self.nested(offset, Self::parse_unary)?;
                Ok(Node::Not(Box::new(operand)))
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> Result<Node<String>, ExpressionError> {
        const EXPECTED: &str = "number, branch, function or `(`";
        let Some(Spanned { token, offset }) = self.advance() else {
            return Err(ExpressionError::UnexpectedEnd { expected: EXPECTED });
        };
        match token {
            Token::Num(value) => Ok(Node::Number(value)),
            Token::LParen => self.nested(offset, |parser| {
                let inner = parser.parse_or()?;
                parser.expect(&Token::RParen, "`)`")?;
                Ok(inner)
            }),
            Token::Ident(name) if self.peek_token() == Some(&Token::LParen) => {
                self.advance();
                self.nested(offset, |parser| parser.parse_call(&name, offset))
            }
            Token::Ident(name) => Ok(Node::Var(name)),
            other => Err(ExpressionError::UnexpectedToken {
                found: other.to_string(),
                expected: EXPECTED,
                offset,
            }),
        }
    }

    fn parse_call(&mut self, name: &str, offset: usize) -> Result<Node<String>, ExpressionError> {
        let function = Function::lookup(name).ok_or_else(|| ExpressionError::UnknownFunction {
            name: name.to_owned(),
            offset,
        })?;
        let mut args = Vec::new();
        if self.peek_token() != Some(&Token::RParen) {
            args.push(self.parse_or()?);
            while self.peek_token() == Some(&Token::Comma) {
                self.advance();
                args.push(self.parse_or()?);
            }
        }
        self.expect(&Token::RParen, "`,` or `)`")?;
        if args.len() != function.arity() {
            return Err(ExpressionError::WrongArity {
                name: function.name(),
                expected: function.arity(),
                found: args.len(),
            });
        }
        Ok(Node::Call(function, args))
    }
}
