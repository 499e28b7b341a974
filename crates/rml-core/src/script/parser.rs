//! Recursive-descent parser producing the [`ast`](super::ast) tree.
//!
//! Semicolons are optional. A statement-level `{` opens a block, never an
//! object literal. `for` loops are desugared onto `while` here so the
//! evaluator only sees one loop form.

use super::ast::{BinOp, Expr, ObjectProp, Stmt, UnaryOp};
use super::error::ScriptError;
use super::lexer::{tokenize, Token, TokenKind};

pub fn parse_program(source: &str) -> Result<Vec<Stmt>, ScriptError> {
    let tokens = tokenize(source)?;
    Parser { tokens, pos: 0 }.program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_token(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if *self.peek() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ScriptError> {
        if *self.peek() == kind {
            Ok(self.bump())
        } else {
            Err(self.err_here(format!("expected {}, found {:?}", what, self.peek())))
        }
    }

    fn err_here(&self, message: impl Into<String>) -> ScriptError {
        let token = self.peek_token();
        ScriptError::Parse {
            line: token.line,
            col: token.col,
            message: message.into(),
        }
    }

    fn program(mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut stmts = Vec::new();
        while *self.peek() != TokenKind::Eof {
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        match self.peek() {
            TokenKind::LBrace => {
                self.bump();
                let mut body = Vec::new();
                while !self.eat(TokenKind::RBrace) {
                    if *self.peek() == TokenKind::Eof {
                        return Err(self.err_here("unclosed block"));
                    }
                    body.push(self.statement()?);
                }
                Ok(Stmt::Block(body))
            }
            TokenKind::Var => self.var_statement(),
            TokenKind::Return => {
                let line = self.bump().line;
                let value = if matches!(
                    self.peek(),
                    TokenKind::Semi | TokenKind::RBrace | TokenKind::Eof
                ) || self.peek_token().line > line
                {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.eat(TokenKind::Semi);
                Ok(Stmt::Return(value))
            }
            TokenKind::If => self.if_statement(),
            TokenKind::While => {
                self.bump();
                self.expect(TokenKind::LParen, "( after while")?;
                let cond = self.expression()?;
                self.expect(TokenKind::RParen, ") after condition")?;
                let body = self.branch()?;
                Ok(Stmt::While {
                    cond,
                    body,
                    step: None,
                })
            }
            TokenKind::For => self.for_statement(),
            TokenKind::Break => {
                self.bump();
                self.eat(TokenKind::Semi);
                Ok(Stmt::Break)
            }
            TokenKind::Continue => {
                self.bump();
                self.eat(TokenKind::Semi);
                Ok(Stmt::Continue)
            }
            TokenKind::Function => {
                self.bump();
                let name = self.ident("function name")?;
                let (params, body) = self.function_rest()?;
                Ok(Stmt::FunctionDecl { name, params, body })
            }
            TokenKind::Semi => {
                self.bump();
                Ok(Stmt::Block(Vec::new()))
            }
            _ => {
                let expr = self.expression()?;
                self.eat(TokenKind::Semi);
                Ok(Stmt::Expr(expr))
            }
        }
    }

    /// One or more declarators; several become a block, which does not open a
    /// scope in the evaluator.
    fn var_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.bump();
        let mut decls = Vec::new();
        loop {
            let name = self.ident("variable name")?;
            let init = if self.eat(TokenKind::Assign) {
                Some(self.assignment()?)
            } else {
                None
            };
            decls.push(Stmt::Var(name, init));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.eat(TokenKind::Semi);
        if decls.len() == 1 {
            Ok(decls.pop().unwrap())
        } else {
            Ok(Stmt::Block(decls))
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.bump();
        self.expect(TokenKind::LParen, "( after if")?;
        let cond = self.expression()?;
        self.expect(TokenKind::RParen, ") after condition")?;
        let then_branch = self.branch()?;
        let else_branch = if self.eat(TokenKind::Else) {
            Some(self.branch()?)
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn for_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.bump();
        self.expect(TokenKind::LParen, "( after for")?;
        let init = if self.eat(TokenKind::Semi) {
            None
        } else if *self.peek() == TokenKind::Var {
            let decl = self.var_statement()?;
            Some(decl)
        } else {
            let expr = self.expression()?;
            self.expect(TokenKind::Semi, "; after for initializer")?;
            Some(Stmt::Expr(expr))
        };
        let cond = if *self.peek() == TokenKind::Semi {
            Expr::Bool(true)
        } else {
            self.expression()?
        };
        self.expect(TokenKind::Semi, "; after for condition")?;
        let step = if *self.peek() == TokenKind::RParen {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::RParen, ") after for clauses")?;
        let body = self.branch()?;
        let mut block = Vec::new();
        if let Some(init) = init {
            block.push(init);
        }
        block.push(Stmt::While { cond, body, step });
        Ok(Stmt::Block(block))
    }

    /// A loop or conditional body: either a braced block or a single statement.
    fn branch(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        match self.statement()? {
            Stmt::Block(body) => Ok(body),
            single => Ok(vec![single]),
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, ScriptError> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(name)
            }
            other => Err(self.err_here(format!("expected {}, found {:?}", what, other))),
        }
    }

    fn function_rest(&mut self) -> Result<(Vec<String>, Vec<Stmt>), ScriptError> {
        self.expect(TokenKind::LParen, "( after function")?;
        let mut params = Vec::new();
        if *self.peek() != TokenKind::RParen {
            loop {
                params.push(self.ident("parameter name")?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, ") after parameters")?;
        self.expect(TokenKind::LBrace, "{ before function body")?;
        let mut body = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            if *self.peek() == TokenKind::Eof {
                return Err(self.err_here("unclosed function body"));
            }
            body.push(self.statement()?);
        }
        Ok((params, body))
    }

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ScriptError> {
        let target = self.ternary()?;
        if *self.peek() == TokenKind::Assign {
            if !matches!(
                target,
                Expr::Ident(_) | Expr::Member(_, _) | Expr::Index(_, _)
            ) {
                return Err(self.err_here("invalid assignment target"));
            }
            self.bump();
            let value = self.assignment()?;
            return Ok(Expr::Assign(Box::new(target), Box::new(value)));
        }
        Ok(target)
    }

    fn ternary(&mut self) -> Result<Expr, ScriptError> {
        let cond = self.binary(0)?;
        if self.eat(TokenKind::Question) {
            let then_expr = self.assignment()?;
            self.expect(TokenKind::Colon, ": in conditional expression")?;
            let else_expr = self.assignment()?;
            return Ok(Expr::Ternary(
                Box::new(cond),
                Box::new(then_expr),
                Box::new(else_expr),
            ));
        }
        Ok(cond)
    }

    /// Precedence-climbing over the binary operator tiers.
    fn binary(&mut self, min_level: u8) -> Result<Expr, ScriptError> {
        let mut left = if min_level >= LEVELS {
            self.unary()?
        } else {
            self.binary(min_level + 1)?
        };
        loop {
            let Some(op) = op_at_level(self.peek(), min_level) else {
                return Ok(left);
            };
            self.bump();
            let right = if min_level >= LEVELS {
                self.unary()?
            } else {
                self.binary(min_level + 1)?
            };
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek() {
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::TypeOf => Some(UnaryOp::TypeOf),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.unary()?;
            return Ok(Expr::Unary(op, Box::new(operand)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.bump();
                    let name = self.ident("property name")?;
                    expr = Expr::Member(Box::new(expr), name);
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.expression()?;
                    self.expect(TokenKind::RBracket, "] after index")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                TokenKind::LParen => {
                    self.bump();
                    let mut args = Vec::new();
                    if *self.peek() != TokenKind::RParen {
                        loop {
                            args.push(self.assignment()?);
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, ") after arguments")?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        match self.peek().clone() {
            TokenKind::Number(n) => {
                self.bump();
                Ok(Expr::Number(n))
            }
            TokenKind::Str(s) => {
                self.bump();
                Ok(Expr::Str(s))
            }
            TokenKind::True => {
                self.bump();
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.bump();
                Ok(Expr::Bool(false))
            }
            TokenKind::Null | TokenKind::Undefined => {
                self.bump();
                Ok(Expr::Null)
            }
            TokenKind::Ident(name) => {
                self.bump();
                Ok(Expr::Ident(name))
            }
            TokenKind::LParen => {
                self.bump();
                let expr = self.expression()?;
                self.expect(TokenKind::RParen, ") after expression")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.bump();
                let mut items = Vec::new();
                if *self.peek() != TokenKind::RBracket {
                    loop {
                        items.push(self.assignment()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                        if *self.peek() == TokenKind::RBracket {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket, "] after array literal")?;
                Ok(Expr::Array(items))
            }
            TokenKind::LBrace => self.object_literal(),
            TokenKind::Function => {
                self.bump();
                let name = match self.peek().clone() {
                    TokenKind::Ident(name) => {
                        self.bump();
                        Some(name)
                    }
                    _ => None,
                };
                let (params, body) = self.function_rest()?;
                Ok(Expr::Function { name, params, body })
            }
            other => Err(self.err_here(format!("unexpected token {:?}", other))),
        }
    }

    fn object_literal(&mut self) -> Result<Expr, ScriptError> {
        self.bump();
        let mut props = Vec::new();
        if *self.peek() != TokenKind::RBrace {
            loop {
                let key = match self.peek().clone() {
                    TokenKind::Ident(name) => {
                        self.bump();
                        name
                    }
                    TokenKind::Str(s) => {
                        self.bump();
                        s
                    }
                    TokenKind::Number(n) => {
                        self.bump();
                        super::value::format_number(n)
                    }
                    other => {
                        return Err(
                            self.err_here(format!("expected property key, found {:?}", other))
                        )
                    }
                };
                self.expect(TokenKind::Colon, ": after property key")?;
                let value = self.assignment()?;
                props.push(ObjectProp { key, value });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                if *self.peek() == TokenKind::RBrace {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace, "} after object literal")?;
        Ok(Expr::Object(props))
    }
}

const LEVELS: u8 = 6;

fn op_at_level(kind: &TokenKind, level: u8) -> Option<BinOp> {
    let op = match (level, kind) {
        (0, TokenKind::OrOr) => BinOp::Or,
        (1, TokenKind::AndAnd) => BinOp::And,
        (2, TokenKind::EqEq) => BinOp::Eq,
        (2, TokenKind::NotEq) => BinOp::Ne,
        (3, TokenKind::Lt) => BinOp::Lt,
        (3, TokenKind::Le) => BinOp::Le,
        (3, TokenKind::Gt) => BinOp::Gt,
        (3, TokenKind::Ge) => BinOp::Ge,
        (4, TokenKind::Plus) => BinOp::Add,
        (4, TokenKind::Minus) => BinOp::Sub,
        (5, TokenKind::Star) => BinOp::Mul,
        (5, TokenKind::Slash) => BinOp::Div,
        (5, TokenKind::Percent) => BinOp::Rem,
        _ => return None,
    };
    Some(op)
}
