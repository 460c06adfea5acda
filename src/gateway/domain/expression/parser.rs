//! Tokenizer and recursive-descent parser for the expression grammar.
//!
//! ```text
//! or         := and ("||" and)*
//! and        := unary ("&&" unary)*
//! unary      := "!" unary | comparison
//! comparison := primary (("==" | "!=" | "<" | "<=" | ">" | ">=") primary)?
//! primary    := literal | "(" or ")" | ident "(" args ")" | path
//! path       := ident ("." ident | "[" integer "]")*
//! ```

use super::{
    ExpressionError,
    ast::{BinaryOp, CompiledTemplate, FieldPath, Function, Node, PathSegment},
};
use serde_json::{Number, Value};

/// Longest accepted expression source, in bytes.
pub(super) const MAX_SOURCE_LEN: usize = 4_096;
const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(Number),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Bang,
    AndAnd,
    OrOr,
    Cmp(BinaryOp),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Number(number) => format!("number {number}"),
            Self::Str(_) => "string literal".to_owned(),
            Self::LParen => "'('".to_owned(),
            Self::RParen => "')'".to_owned(),
            Self::LBracket => "'['".to_owned(),
            Self::RBracket => "']'".to_owned(),
            Self::Comma => "','".to_owned(),
            Self::Dot => "'.'".to_owned(),
            Self::Bang => "'!'".to_owned(),
            Self::AndAnd => "'&&'".to_owned(),
            Self::OrOr => "'||'".to_owned(),
            Self::Cmp(op) => format!("'{}'", op.symbol()),
        }
    }
}

struct Lexer<'src> {
    source: &'src str,
    chars: std::iter::Peekable<std::str::CharIndices<'src>>,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<(usize, Token)>, ExpressionError> {
        let mut tokens = Vec::new();
        while let Some(&(position, current)) = self.chars.peek() {
            if current.is_whitespace() {
                self.chars.next();
                continue;
            }
            let token = match current {
                '(' => self.single(Token::LParen),
                ')' => self.single(Token::RParen),
                '[' => self.single(Token::LBracket),
                ']' => self.single(Token::RBracket),
                ',' => self.single(Token::Comma),
                '.' => self.single(Token::Dot),
                '"' => self.string(position)?,
                '&' => self.pair('&', Token::AndAnd, position)?,
                '|' => self.pair('|', Token::OrOr, position)?,
                '=' => self.pair('=', Token::Cmp(BinaryOp::Eq), position)?,
                '!' => self.with_optional_eq(Token::Bang, Token::Cmp(BinaryOp::Ne)),
                '<' => self.with_optional_eq(Token::Cmp(BinaryOp::Lt), Token::Cmp(BinaryOp::Le)),
                '>' => self.with_optional_eq(Token::Cmp(BinaryOp::Gt), Token::Cmp(BinaryOp::Ge)),
                '-' | '0'..='9' => self.number(position)?,
                c if c.is_ascii_alphabetic() || c == '_' => self.ident(),
                found => return Err(ExpressionError::UnexpectedCharacter { position, found }),
            };
            tokens.push((position, token));
        }
        Ok(tokens)
    }

    fn single(&mut self, token: Token) -> Token {
        self.chars.next();
        token
    }

    fn pair(
        &mut self,
        second: char,
        token: Token,
        position: usize,
    ) -> Result<Token, ExpressionError> {
        self.chars.next();
        match self.chars.next() {
            Some((_, next)) if next == second => Ok(token),
            Some((at, found)) => Err(ExpressionError::UnexpectedCharacter { position: at, found }),
            None => Err(ExpressionError::UnexpectedEnd {
                expected: format!("'{second}' after position {position}"),
            }),
        }
    }

    fn with_optional_eq(&mut self, bare: Token, with_eq: Token) -> Token {
        self.chars.next();
        if self.chars.next_if(|&(_, next)| next == '=').is_some() {
            with_eq
        } else {
            bare
        }
    }

    fn take_while(&mut self, start: usize, mut accept: impl FnMut(char) -> bool) -> &'src str {
        let mut end = start;
        while let Some((at, current)) = self.chars.next_if(|&(_, c)| accept(c)) {
            end = at + current.len_utf8();
        }
        self.source.get(start..end).unwrap_or_default()
    }

    fn ident(&mut self) -> Token {
        let start = self.chars.peek().map_or(0, |&(at, _)| at);
        let name = self.take_while(start, |c| c.is_ascii_alphanumeric() || c == '_');
        Token::Ident(name.to_owned())
    }

    fn number(&mut self, position: usize) -> Result<Token, ExpressionError> {
        let mut previous: Option<char> = None;
        let text = self.take_while(position, |c| {
            let accepted = c.is_ascii_digit()
                || matches!(c, '.' | 'e' | 'E')
                || (matches!(c, '-' | '+') && previous.is_none_or(|p| matches!(p, 'e' | 'E')));
            previous = Some(c);
            accepted
        });
        serde_json::from_str::<Number>(text)
            .map(Token::Number)
            .map_err(|_| ExpressionError::InvalidNumber {
                position,
                text: text.to_owned(),
            })
    }

    fn string(&mut self, position: usize) -> Result<Token, ExpressionError> {
        self.chars.next();
        let mut escaped = false;
        let mut end = None;
        for (at, current) in self.chars.by_ref() {
            if escaped {
                escaped = false;
            } else if current == '\\' {
                escaped = true;
            } else if current == '"' {
                end = Some(at + 1);
                break;
            }
        }
        let raw = end
            .and_then(|stop| self.source.get(position..stop))
            .ok_or(ExpressionError::UnterminatedString { position })?;
        serde_json::from_str::<String>(raw)
            .map(Token::Str)
            .map_err(|_| ExpressionError::UnterminatedString { position })
    }
}

/// Parses expression source into a syntax tree.
pub(super) fn parse(source: &str) -> Result<Node, ExpressionError> {
    if source.trim().is_empty() {
        return Err(ExpressionError::Empty);
    }
    if source.len() > MAX_SOURCE_LEN {
        return Err(ExpressionError::TooLong {
            max: MAX_SOURCE_LEN,
        });
    }
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        cursor: 0,
        depth: 0,
    };
    let node = parser.or()?;
    match parser.peek() {
        None => Ok(node),
        Some((position, token)) => Err(ExpressionError::UnexpectedToken {
            position,
            found: token.describe(),
            expected: "end of expression".to_owned(),
        }),
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<(usize, &Token)> {
        self.tokens
            .get(self.cursor)
            .map(|(position, token)| (*position, token))
    }

    fn advance(&mut self) -> Option<(usize, Token)> {
        let next = self.tokens.get(self.cursor).cloned();
        if next.is_some() {
            self.cursor += 1;
        }
        next
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().is_some_and(|(_, token)| token == expected) {
            self.cursor += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExpressionError> {
        match self.advance() {
            Some((_, token)) if &token == expected => Ok(()),
            Some((position, token)) => Err(ExpressionError::UnexpectedToken {
                position,
                found: token.describe(),
                expected: expected.describe(),
            }),
            None => Err(ExpressionError::UnexpectedEnd {
                expected: expected.describe(),
            }),
        }
    }

    fn descend(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::NestingTooDeep { max: MAX_DEPTH });
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Node, ExpressionError> {
        self.descend()?;
        let mut node = self.and()?;
        while self.eat(&Token::OrOr) {
            let right = self.and()?;
            node = binary(BinaryOp::Or, node, right);
        }
        self.depth -= 1;
        Ok(node)
    }

    fn and(&mut self) -> Result<Node, ExpressionError> {
        let mut node = self.unary()?;
        while self.eat(&Token::AndAnd) {
            let right = self.unary()?;
            node = binary(BinaryOp::And, node, right);
        }
        Ok(node)
    }

    fn unary(&mut self) -> Result<Node, ExpressionError> {
        if self.eat(&Token::Bang) {
            self.descend()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Node, ExpressionError> {
        let left = self.primary()?;
        if let Some((_, Token::Cmp(op))) = self.peek() {
            let op = *op;
            self.cursor += 1;
            let right = self.primary()?;
            return Ok(binary(op, left, right));
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Node, ExpressionError> {
        match self.advance() {
            Some((_, Token::Number(number))) => Ok(Node::Literal(Value::Number(number))),
            Some((_, Token::Str(text))) => Ok(Node::Literal(Value::String(text))),
            Some((_, Token::LParen)) => {
                let inner = self.or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some((position, Token::Ident(name))) => match name.as_str() {
                "true" => Ok(Node::Literal(Value::Bool(true))),
                "false" => Ok(Node::Literal(Value::Bool(false))),
                "null" => Ok(Node::Literal(Value::Null)),
                _ if self.eat(&Token::LParen) => self.call(position, name),
                _ => self.path(name),
            },
            Some((position, token)) => Err(ExpressionError::UnexpectedToken {
                position,
                found: token.describe(),
                expected: "a value, path or function call".to_owned(),
            }),
            None => Err(ExpressionError::UnexpectedEnd {
                expected: "a value, path or function call".to_owned(),
            }),
        }
    }

    fn path(&mut self, root: String) -> Result<Node, ExpressionError> {
        let mut rest = Vec::new();
        loop {
            if self.eat(&Token::Dot) {
                match self.advance() {
                    Some((_, Token::Ident(key))) => rest.push(PathSegment::Key(key)),
                    Some((position, token)) => {
                        return Err(ExpressionError::UnexpectedToken {
                            position,
                            found: token.describe(),
                            expected: "a field name".to_owned(),
                        });
                    }
                    None => {
                        return Err(ExpressionError::UnexpectedEnd {
                            expected: "a field name".to_owned(),
                        });
                    }
                }
            } else if self.eat(&Token::LBracket) {
                let index = match self.advance() {
                    Some((position, Token::Number(number))) => number
                        .as_u64()
                        .and_then(|value| usize::try_from(value).ok())
                        .ok_or(ExpressionError::InvalidNumber {
                            position,
                            text: number.to_string(),
                        })?,
                    Some((position, token)) => {
                        return Err(ExpressionError::UnexpectedToken {
                            position,
                            found: token.describe(),
                            expected: "an array index".to_owned(),
                        });
                    }
                    None => {
                        return Err(ExpressionError::UnexpectedEnd {
                            expected: "an array index".to_owned(),
                        });
                    }
                };
                self.expect(&Token::RBracket)?;
                rest.push(PathSegment::Index(index));
            } else {
                return Ok(Node::Path(FieldPath::new(root, rest)));
            }
        }
    }

    fn call(&mut self, position: usize, name: String) -> Result<Node, ExpressionError> {
        let function =
            Function::from_name(&name).ok_or(ExpressionError::UnknownFunction(name))?;
        self.descend()?;
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.or()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma)?;
            }
        }
        self.depth -= 1;

        let (min, max) = function.arity();
        if args.len() < min || max.is_some_and(|limit| args.len() > limit) {
            return Err(ExpressionError::Arity {
                function: function.name().to_owned(),
                found: args.len(),
            });
        }

        match function {
            Function::Exists if !matches!(args.first(), Some(Node::Path(_))) => {
                Err(ExpressionError::ExistsRequiresPath { position })
            }
            Function::Template => template(position, args),
            _ => Ok(Node::Call { function, args }),
        }
    }
}

fn binary(op: BinaryOp, left: Node, right: Node) -> Node {
    Node::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn template(position: usize, args: Vec<Node>) -> Result<Node, ExpressionError> {
    let Some(Node::Literal(Value::String(source))) = args.into_iter().next() else {
        return Err(ExpressionError::TemplateRequiresLiteral { position });
    };
    let template = CompiledTemplate::compile(source)
        .map_err(|err| ExpressionError::Template(err.to_string()))?;
    let variables = template
        .variables()
        .map_err(|err| ExpressionError::Template(err.to_string()))?;
    Ok(Node::Template {
        template,
        variables,
    })
}
