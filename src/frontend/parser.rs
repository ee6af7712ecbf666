//! Parser for Quasicode
//!
//! Recursive descent for statements, precedence climbing for binary
//! expressions. Errors are collected and the parser resynchronizes at the
//! next line, so one bad statement does not hide the rest of the file.

use crate::frontend::ast::*;
use crate::frontend::token::{Token, TokenKind};
use crate::utils::{Error, Result, Span};
use std::collections::HashSet;

/// The parser
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<Error>,
    /// Every class name in the file plus the builtin ones
    class_names: HashSet<String>,
    /// Template parameters of the class being parsed
    template_params: Vec<String>,
    current_class: Option<String>,
    /// Number of enclosing blocks or function bodies
    nesting: usize,
    /// Blocks parsed so far; tells a failed header from a failed body
    blocks_opened: usize,
    /// Block headers that failed before their body; their `end` lines are skipped
    orphaned_ends: usize,
}

impl Parser {
    /// Create a parser over a token stream that ends with `Eof`
    pub fn new(tokens: Vec<Token>, builtin_classes: &[&str]) -> Self {
        debug_assert!(matches!(tokens.last(), Some(t) if t.kind == TokenKind::Eof));
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
            class_names: builtin_classes.iter().map(|name| name.to_string()).collect(),
            template_params: Vec::new(),
            current_class: None,
            nesting: 0,
            blocks_opened: 0,
            orphaned_ends: 0,
        }
    }

    // ==================== Helper Methods ====================

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.current_kind()) == std::mem::discriminant(kind)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    fn expect(&mut self, expected: TokenKind, message: &str) -> Result<Token> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            Err(Error::syntax(message, self.current().span))
        }
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Span from `start` through the last consumed token
    fn span_from(&self, start: Span) -> Span {
        start.merge(&self.previous().span)
    }

    fn expect_ident(&mut self, message: &str) -> Result<Ident> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Ident::new(name, token.span))
            }
            _ => Err(Error::syntax(message, token.span)),
        }
    }

    fn expect_eol(&mut self, after: &str) -> Result<()> {
        self.expect(TokenKind::Eol, &format!("Expect end-of-line after {}", after))?;
        Ok(())
    }

    /// Skip past the next end-of-line
    fn skip_line(&mut self) {
        while !self.is_at_end() && self.advance().kind != TokenKind::Eol {}
    }

    /// Skip to the start of the next statement
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Eol {
                return;
            }
            match self.current_kind() {
                TokenKind::If
                | TokenKind::Output
                | TokenKind::Input
                | TokenKind::Return
                | TokenKind::Loop
                | TokenKind::Continue
                | TokenKind::Break
                | TokenKind::Exit => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ==================== Parsing Methods ====================

    /// Parse a complete program
    pub fn parse_program(mut self) -> (Program, Vec<Error>) {
        self.scan_class_names();

        let mut stmts = Vec::new();
        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                stmts.push(stmt);
            }
        }

        log::debug!("parsed {} top-level statements, {} errors", stmts.len(), self.errors.len());
        (Program { stmts }, self.errors)
    }

    /// Collect class names up front so types can be told apart from variables
    fn scan_class_names(&mut self) {
        for window in self.tokens.windows(2) {
            if let (TokenKind::Class, TokenKind::Ident(name)) = (&window[0].kind, &window[1].kind) {
                self.class_names.insert(name.clone());
            }
        }
    }

    fn declaration(&mut self) -> Option<Stmt> {
        if self.consume(&TokenKind::Eol) {
            return None;
        }
        if self.orphaned_ends > 0 && matches!(self.current_kind(), TokenKind::End | TokenKind::Else) {
            if self.check(&TokenKind::End) {
                self.orphaned_ends -= 1;
            }
            self.skip_line();
            return None;
        }

        let opens_block =
            matches!(self.current_kind(), TokenKind::If | TokenKind::Loop | TokenKind::Function | TokenKind::Class);
        let blocks_before = self.blocks_opened;
        let result = match self.current_kind() {
            TokenKind::Class => self.parse_class(),
            TokenKind::Function => {
                if self.nesting > 0 {
                    Err(Error::syntax(
                        "Function declaration must be in global scope or within a class",
                        self.current().span,
                    ))
                } else {
                    self.parse_function().map(Stmt::Function)
                }
            }
            _ => self.parse_stmt(),
        };
        match result {
            Ok(stmt) => Some(stmt),
            Err(err) => {
                self.errors.push(err);
                if opens_block && self.blocks_opened == blocks_before {
                    self.orphaned_ends += 1;
                }
                self.synchronize();
                None
            }
        }
    }

    /// Statements up to `end` (or one of `extra_end` at this level)
    fn parse_block(&mut self, extra_end: &[TokenKind]) -> Block {
        let start = self.current().span;
        self.nesting += 1;
        self.blocks_opened += 1;
        let mut stmts = Vec::new();
        while !self.is_at_end() {
            let at_end = self.check(&TokenKind::End) || extra_end.iter().any(|kind| self.check(kind));
            if at_end && self.orphaned_ends == 0 {
                break;
            }
            if let Some(stmt) = self.declaration() {
                stmts.push(stmt);
            }
        }
        self.nesting -= 1;
        Block::new(stmts, self.span_from(start))
    }

    fn expect_end(&mut self, keyword: TokenKind, message: &str) -> Result<Token> {
        let end = self.expect(TokenKind::End, message)?;
        self.expect(keyword, message)?;
        Ok(end)
    }

    // ==================== Declarations ====================

    fn parse_class(&mut self) -> Result<Stmt> {
        let keyword = self.advance();
        if self.nesting > 0 {
            return Err(Error::syntax("Class declaration must be global", keyword.span));
        }
        let name = self.expect_ident("Expect class name.")?;

        let mut template_params = Vec::new();
        if self.consume(&TokenKind::Lt) {
            loop {
                template_params.push(self.expect_ident("Expect template parameter")?);
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Gt, "Expect '>' following template parameters")?;
        }

        self.template_params = template_params.iter().map(|param| param.name.clone()).collect();
        self.current_class = Some(name.name.clone());
        let result = self.parse_class_rest(keyword.span, name, template_params);
        self.template_params.clear();
        self.current_class = None;
        result
    }

    fn parse_class_rest(&mut self, start: Span, name: Ident, template_params: Vec<Ident>) -> Result<Stmt> {
        let superclass = if self.consume(&TokenKind::Extends) {
            let extends = self.previous().span;
            match self.parse_type(false)? {
                Some(ty @ AstType::Class { .. }) => Some(ty),
                Some(other) => return Err(Error::syntax("Only classes can be extended", other.span())),
                None => return Err(Error::syntax("Expect class name", extends)),
            }
        } else {
            None
        };
        let header_span = self.span_from(start);
        self.expect_eol("class signature")?;

        let mut methods = Vec::new();
        let mut fields = Vec::new();

        while !self.check(&TokenKind::End) && !self.is_at_end() {
            if self.consume(&TokenKind::Eol) {
                continue;
            }

            let mut visibility = None;
            let mut static_span = None;
            loop {
                match self.current_kind() {
                    TokenKind::Public | TokenKind::Private => {
                        let token = self.advance();
                        if visibility.is_some() {
                            return Err(Error::syntax("Repeated visibility modifier", token.span));
                        }
                        visibility = Some(if token.kind == TokenKind::Public {
                            Visibility::Public
                        } else {
                            Visibility::Private
                        });
                    }
                    TokenKind::Static => {
                        let token = self.advance();
                        if static_span.is_some() {
                            return Err(Error::syntax("Repeated static modifier", token.span));
                        }
                        static_span = Some(token.span);
                    }
                    _ => break,
                }
            }
            let visibility = visibility.unwrap_or(Visibility::Public);

            match self.current_kind() {
                TokenKind::Function => {
                    let function = self.parse_function()?;
                    methods.push(MethodStmt {
                        is_static: static_span.is_some(),
                        static_span,
                        visibility,
                        function,
                    });
                }
                TokenKind::Ident(_) => match self.parse_field(static_span.is_some(), visibility) {
                    Ok(field) => fields.push(field),
                    Err(err) => {
                        self.errors.push(err);
                        self.synchronize();
                    }
                },
                _ => {
                    return Err(Error::syntax("Expect method or field declaration", self.current().span));
                }
            }
        }

        self.expect_end(TokenKind::Class, "Expect 'end class' after class declaration")?;
        self.expect_eol("'end class'")?;

        Ok(Stmt::Class(ClassStmt {
            name,
            template_params,
            superclass,
            methods,
            fields,
            symbol: Slot::Unresolved,
            instance_this: Slot::Unresolved,
            static_this: Slot::Unresolved,
            scope: Slot::Unresolved,
            span: header_span,
        }))
    }

    fn parse_field(&mut self, is_static: bool, visibility: Visibility) -> Result<ClassField> {
        let name = self.expect_ident("Expect field name")?;
        self.expect(TokenKind::Colon, "Expect type annotation for field declaration")?;
        let annotation = self.require_type()?;
        let initializer = if self.consume(&TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        if is_static && initializer.is_none() {
            self.errors.push(Error::syntax("Static field requires an initial value", name.span));
        }
        self.expect_eol("field declaration")?;
        Ok(ClassField {
            name,
            is_static,
            visibility,
            annotation,
            initializer,
            symbol: Slot::Unresolved,
        })
    }

    /// Parse a function definition
    fn parse_function(&mut self) -> Result<FunctionStmt> {
        let start = self.advance().span;
        let name = self.expect_ident("Expect function name")?;
        self.expect(TokenKind::LParen, "Expect '(' after function declaration")?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let param_name = self.expect_ident("Expect parameter name")?;
                let annotation = if self.consume(&TokenKind::Colon) {
                    Some(self.require_type()?)
                } else {
                    None
                };
                let initializer = if self.consume(&TokenKind::Eq) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                params.push(FunctionParam {
                    name: param_name,
                    annotation,
                    initializer,
                    symbol: Slot::Unresolved,
                });
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "Expect ')' after parameters")?;

        let annotation = if self.consume(&TokenKind::Colon) {
            Some(self.require_type()?)
        } else {
            None
        };
        let span = self.span_from(start);
        self.expect_eol("function signature")?;

        let body = self.parse_block(&[]);
        let end = self.expect_end(TokenKind::Function, "Expect 'end function' after function declaration")?;
        let end_span = self.span_from(end.span);
        self.expect_eol("'end function'")?;

        Ok(FunctionStmt {
            name,
            params,
            annotation,
            body: body.stmts,
            end_span,
            symbol: Slot::Unresolved,
            name_symbol: Slot::Unresolved,
            scope: Slot::Unresolved,
            span,
        })
    }

    // ==================== Statements ====================

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let start = self.current().span;
        match self.current_kind() {
            TokenKind::If => self.parse_if(),
            TokenKind::Output | TokenKind::Input => {
                let is_output = self.advance().kind == TokenKind::Output;
                let mut exprs = Vec::new();
                loop {
                    exprs.push(if is_output { self.parse_expr()? } else { self.parse_writable()? });
                    if !self.consume(&TokenKind::Comma) {
                        break;
                    }
                }
                let span = self.span_from(start);
                if is_output {
                    self.expect_eol("output statement")?;
                    Ok(Stmt::Output { exprs, span })
                } else {
                    self.expect_eol("input statement")?;
                    Ok(Stmt::Input { exprs, span })
                }
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Eol) { None } else { Some(self.parse_expr()?) };
                let span = self.span_from(start);
                self.expect_eol("return statement")?;
                Ok(Stmt::Return { value, span })
            }
            TokenKind::Loop => self.parse_loop(),
            TokenKind::Break | TokenKind::Continue | TokenKind::Exit => {
                let keyword = self.advance();
                self.expect_eol(&format!("'{}'", keyword.lexeme))?;
                Ok(match keyword.kind {
                    TokenKind::Break => Stmt::Break { span: keyword.span },
                    TokenKind::Continue => Stmt::Continue { span: keyword.span },
                    _ => Stmt::Exit { span: keyword.span },
                })
            }
            _ => self.parse_expr_or_set(),
        }
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let start = self.advance().span;
        let condition = self.parse_expr()?;
        self.expect(TokenKind::Then, "Expect 'then' after if condition")?;
        let span = self.span_from(start);
        self.expect_eol("if condition")?;
        let then_branch = self.parse_block(&[TokenKind::Else]);

        let mut else_ifs = Vec::new();
        let mut else_branch = None;
        while self.consume(&TokenKind::Else) {
            if self.consume(&TokenKind::If) {
                let condition = self.parse_expr()?;
                self.expect(TokenKind::Then, "Expect 'then' after if condition")?;
                self.expect_eol("if condition")?;
                let block = self.parse_block(&[TokenKind::Else]);
                else_ifs.push(ElseIf { condition, block });
            } else {
                self.expect_eol("else")?;
                else_branch = Some(self.parse_block(&[TokenKind::Else]));
                break;
            }
        }

        self.expect_end(TokenKind::If, "Expect 'end if' after if statement")?;
        self.expect_eol("'end if'")?;
        Ok(Stmt::If(IfStmt { condition, then_branch, else_ifs, else_branch, span }))
    }

    fn parse_loop(&mut self) -> Result<Stmt> {
        let start = self.advance().span;
        let stmt = if matches!(self.current_kind(), TokenKind::While | TokenKind::Until) {
            let keyword = self.advance();
            let mut condition = self.parse_expr()?;
            if keyword.kind == TokenKind::Until {
                // loop until c == loop while not c
                let span = keyword.span.merge(&condition.span);
                condition = Expr::new(ExprKind::Unary { op: UnaryOp::Not, operand: Box::new(condition) }, span);
            }
            let span = self.span_from(start);
            self.expect_eol("loop condition")?;
            let body = self.parse_block(&[]);
            Stmt::While { condition, body, span }
        } else {
            let name = self.expect_ident("Expect looping variable")?;
            if self.class_names.contains(&name.name) {
                return Err(Error::syntax("Expect looping variable", name.span));
            }
            self.expect(TokenKind::From, "Expect 'from' after looping variable")?;
            let from = self.parse_expr()?;
            self.expect(TokenKind::To, "Expect 'to' after lower looping range")?;
            let to = self.parse_expr()?;
            let span = self.span_from(start);
            self.expect_eol("upper looping range")?;
            let body = self.parse_block(&[]);
            Stmt::LoopFrom {
                variable: LoopVariable { name, symbol: Slot::Unresolved },
                from,
                to,
                body,
                span,
            }
        };
        self.expect_end(TokenKind::Loop, "Expect 'end loop' after loop statement")?;
        self.expect_eol("'end loop'")?;
        Ok(stmt)
    }

    fn parse_expr_or_set(&mut self) -> Result<Stmt> {
        let expr = self.parse_expr()?;
        if matches!(self.current_kind(), TokenKind::Colon | TokenKind::Eq) {
            let start = expr.span;
            let first = self.parse_set(expr)?;
            let stmt = if self.check(&TokenKind::Comma) {
                let mut sets = vec![first];
                while self.consume(&TokenKind::Comma) {
                    let left = self.parse_writable()?;
                    sets.push(self.parse_set(left)?);
                }
                Stmt::MultiSet { sets, span: self.span_from(start) }
            } else {
                Stmt::Set(first)
            };
            self.expect_eol("set statement")?;
            return Ok(stmt);
        }
        self.expect_eol("expression")?;
        Ok(Stmt::Expression(expr))
    }

    /// `left[: type] = [target =]* value`
    fn parse_set(&mut self, left: Expr) -> Result<SetStmt> {
        let annotation = if self.consume(&TokenKind::Colon) {
            let colon = self.previous().span;
            let ty = self.require_type()?;
            if !matches!(left.kind, ExprKind::Variable { .. }) {
                self.errors.push(Error::syntax("Cannot retype expression", colon));
            }
            Some(ty)
        } else {
            None
        };
        self.expect(TokenKind::Eq, "Expect '='")?;

        let mut chained = Vec::new();
        let mut value = self.parse_expr()?;
        while self.consume(&TokenKind::Eq) {
            let next = self.parse_expr()?;
            chained.push(std::mem::replace(&mut value, next));
        }

        let left = match left.kind {
            ExprKind::Variable { name, .. } => {
                let span = match &annotation {
                    Some(ty) => left.span.merge(&ty.span()),
                    None => left.span,
                };
                Expr::new(
                    ExprKind::VariableToSet { name, annotation, symbol: Slot::Unresolved, first: Slot::Unresolved },
                    span,
                )
            }
            _ => left,
        };
        let span = left.span.merge(&value.span);
        Ok(SetStmt { left, chained, value, span })
    }

    // ==================== Expression Parsing ====================

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_expr_bp(0)
    }

    /// Only postfix expressions can be written to
    fn parse_writable(&mut self) -> Result<Expr> {
        let primary = self.parse_primary()?;
        self.parse_postfix(primary)
    }

    /// Parse expression with binding power (precedence climbing)
    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        const IS_BP: u8 = 5;
        let mut left = self.parse_unary()?;

        loop {
            if self.check(&TokenKind::Is) {
                if IS_BP < min_bp {
                    break;
                }
                self.advance();
                let right = self.require_type()?;
                let span = left.span.merge(&right.span());
                left = Expr::new(
                    ExprKind::IsType { left: Box::new(left), right, right_type: Slot::Unresolved },
                    span,
                );
                continue;
            }

            let op_kind = self.current_kind().clone();
            let Some(bp) = op_kind.binary_precedence() else {
                break;
            };
            if bp < min_bp {
                break;
            }
            self.advance();

            let right = self.parse_expr_bp(bp + 1)?;
            let span = left.span.merge(&right.span);
            let (left_box, right_box) = (Box::new(left), Box::new(right));
            let kind = match op_kind {
                TokenKind::And => ExprKind::Logical { left: left_box, op: LogicalOp::And, right: right_box },
                TokenKind::Or => ExprKind::Logical { left: left_box, op: LogicalOp::Or, right: right_box },
                other => ExprKind::Binary { left: left_box, op: Self::token_to_binop(&other), right: right_box },
            };
            left = Expr::new(kind, span);
        }

        Ok(left)
    }

    fn token_to_binop(kind: &TokenKind) -> BinaryOp {
        match kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Div => BinaryOp::IntDiv,
            TokenKind::Mod => BinaryOp::Mod,
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::Ne => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            other => {
                debug_assert!(false, "{:?} is not a binary operator", other);
                BinaryOp::Add
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let start = self.current().span;
        match self.current_kind() {
            TokenKind::New => self.parse_allocation(),
            TokenKind::Minus | TokenKind::Not => {
                let op = if self.advance().kind == TokenKind::Minus { UnaryOp::Neg } else { UnaryOp::Not };
                let operand = self.parse_unary()?;
                let span = start.merge(&operand.span);
                Ok(Expr::new(ExprKind::Unary { op, operand: Box::new(operand) }, span))
            }
            TokenKind::LParen => {
                // `(type) value` is a cast, anything else is a group
                let saved = self.pos;
                self.advance();
                if let Ok(Some(target)) = self.parse_type(true) {
                    if self.consume(&TokenKind::RParen) {
                        let value = self.parse_unary()?;
                        let span = start.merge(&value.span);
                        return Ok(Expr::new(ExprKind::Cast { target, value: Box::new(value) }, span));
                    }
                }
                self.pos = saved;
                self.parse_writable()
            }
            _ => self.parse_writable(),
        }
    }

    fn parse_allocation(&mut self) -> Result<Expr> {
        let start = self.advance().span;
        let base = self.current().span;
        let Some(mut ty) = self.parse_type(false)? else {
            return Err(Error::syntax("Expect type after 'new'", base));
        };

        if self.check(&TokenKind::LBracket) {
            let mut capacities = Vec::new();
            while self.consume(&TokenKind::LBracket) {
                capacities.push(self.parse_expr()?);
                self.expect(TokenKind::RBracket, "Expect ']' after '['")?;
                ty = AstType::Array { elem: Box::new(ty), span: self.span_from(base) };
            }
            return Ok(Expr::new(ExprKind::ArrayAllocation { array_type: ty, capacities }, self.span_from(start)));
        }

        if self.consume(&TokenKind::LParen) {
            if !matches!(ty, AstType::Class { .. }) {
                return Err(Error::syntax("Expect class", base));
            }
            let args = self.parse_args()?;
            self.expect(TokenKind::RParen, "Expect ')' after '('")?;
            return Ok(Expr::new(
                ExprKind::ClassAllocation { class: ty, args, target: Slot::Unresolved },
                self.span_from(start),
            ));
        }

        Err(Error::ExpectedExpr { span: self.current().span })
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }
        Ok(args)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr> {
        let args = self.parse_args()?;
        self.expect(TokenKind::RParen, "Expect ')' after arguments.")?;
        let span = self.span_from(callee.span);
        let (callee, name) = match callee.kind {
            ExprKind::Variable { name, .. } => (Callee::Free, name),
            ExprKind::Get { object, property, .. } => (Callee::Object(object), property),
            ExprKind::Super { property, .. } => (Callee::Super, property),
            _ => return Err(Error::syntax("Expression cannot be called", callee.span)),
        };
        Ok(Expr::new(ExprKind::Call(CallExpr { callee, name, args, target: Slot::Unresolved }), span))
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr> {
        loop {
            if self.consume(&TokenKind::LParen) {
                expr = self.finish_call(expr)?;
            } else if self.consume(&TokenKind::Dot) {
                let property = self.expect_ident("Expect property name after '.'.")?;
                let span = expr.span.merge(&property.span);
                expr = Expr::new(
                    ExprKind::Get { object: Box::new(expr), property, property_id: Slot::Unresolved },
                    span,
                );
            } else if self.consume(&TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.expect(TokenKind::RBracket, "Expect ']' after '['")?;
                let span = self.span_from(expr.span);
                expr = Expr::new(ExprKind::Subscript { expr: Box::new(expr), index: Box::new(index) }, span);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.current().clone();

        let literal = match &token.kind {
            TokenKind::IntLit(n) => Some(LiteralValue::Int(*n)),
            TokenKind::FloatLit(n) => Some(LiteralValue::Double(*n)),
            TokenKind::StringLit(s) => Some(LiteralValue::String(s.clone())),
            TokenKind::True => Some(LiteralValue::Bool(true)),
            TokenKind::False => Some(LiteralValue::Bool(false)),
            _ => None,
        };
        if let Some(value) = literal {
            self.advance();
            return Ok(Expr::new(ExprKind::Literal(value), token.span));
        }

        match &token.kind {
            TokenKind::This => {
                self.advance();
                Ok(Expr::new(ExprKind::This { symbol: Slot::Unresolved }, token.span))
            }
            TokenKind::Ident(name) if self.class_names.contains(name) => {
                // A class name can only start `Class.member`
                let Some(class) = self.parse_type(false)? else {
                    return Err(Error::ExpectedType { span: token.span });
                };
                let class_span = class.span();
                self.expect(TokenKind::Dot, "Expected member name or constructor call after type name")?;
                let property = self.expect_ident("Expect member name following '.'")?;
                let object = Expr::new(ExprKind::StaticClassRef { class, class_id: Slot::Unresolved }, class_span);
                let span = class_span.merge(&property.span);
                Ok(Expr::new(
                    ExprKind::Get { object: Box::new(object), property, property_id: Slot::Unresolved },
                    span,
                ))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Variable { name: Ident::new(name.clone(), token.span), symbol: Slot::Unresolved },
                    token.span,
                ))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut values = Vec::new();
                if !self.consume(&TokenKind::RBrace) {
                    loop {
                        values.push(self.parse_expr()?);
                        if !self.consume(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RBrace, "Expect '}' after '{'")?;
                }
                Ok(Expr::new(ExprKind::ArrayLiteral(values), self.span_from(token.span)))
            }
            TokenKind::Super => {
                self.advance();
                if self.consume(&TokenKind::Dot) {
                    let property = self.expect_ident("Expect member name following '.'")?;
                    let span = token.span.merge(&property.span);
                    Ok(Expr::new(
                        ExprKind::Super { property, super_class: Slot::Unresolved, property_id: Slot::Unresolved },
                        span,
                    ))
                } else if self.consume(&TokenKind::LParen) {
                    let args = self.parse_args()?;
                    self.expect(TokenKind::RParen, "Expect ')' after arguments.")?;
                    Ok(Expr::new(
                        ExprKind::Call(CallExpr {
                            callee: Callee::SuperConstructor,
                            name: Ident::new("super", token.span),
                            args,
                            target: Slot::Unresolved,
                        }),
                        self.span_from(token.span),
                    ))
                } else {
                    Err(Error::syntax("Expect property name or call after 'super'.", self.current().span))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "Expect ')' after expression.")?;
                if matches!(inner.kind, ExprKind::Variable { .. }) {
                    return Ok(inner);
                }
                Ok(Expr::new(ExprKind::Grouping(Box::new(inner)), self.span_from(token.span)))
            }
            _ => Err(Error::ExpectedExpr { span: token.span }),
        }
    }

    // ==================== Types ====================

    fn require_type(&mut self) -> Result<AstType> {
        match self.parse_type(true)? {
            Some(ty) => Ok(ty),
            None => Err(Error::ExpectedType { span: self.current().span }),
        }
    }

    /// Parse a type if one starts here; `with_arrays` also takes `[]` suffixes
    fn parse_type(&mut self, with_arrays: bool) -> Result<Option<AstType>> {
        let token = self.current().clone();
        let span = token.span;
        let mut ty = match &token.kind {
            TokenKind::Int => AstType::Int(span),
            TokenKind::Double => AstType::Double(span),
            TokenKind::Boolean => AstType::Boolean(span),
            TokenKind::Any => AstType::Any(span),
            TokenKind::Ident(name) if self.class_names.contains(name) => {
                AstType::Class { name: name.clone(), args: Vec::new(), span }
            }
            TokenKind::Ident(name) if self.template_params.contains(name) => AstType::TemplateParam {
                name: name.clone(),
                class: self.current_class.clone().unwrap_or_default(),
                span,
            },
            _ => return Ok(None),
        };
        self.advance();

        if self.check(&TokenKind::Lt) && self.class_type_follows() {
            self.advance();
            let AstType::Class { name, .. } = &ty else {
                return Err(Error::syntax("Non-classes cannot be templated", self.current().span));
            };
            let name = name.clone();
            let mut args = Vec::new();
            loop {
                args.push(self.require_type()?);
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Gt, "Expect '>' after template")?;
            ty = AstType::Class { name, args, span: self.span_from(span) };
        }

        if with_arrays {
            while self.check(&TokenKind::LBracket)
                && matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RBracket))
            {
                self.advance();
                self.advance();
                ty = AstType::Array { elem: Box::new(ty), span: self.span_from(span) };
            }
        }

        Ok(Some(ty))
    }

    /// After a type name, `<` opens template arguments only if a type follows
    fn class_type_follows(&self) -> bool {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Int | TokenKind::Double | TokenKind::Boolean | TokenKind::Any) => true,
            Some(TokenKind::Ident(name)) => {
                self.class_names.contains(name) || self.template_params.contains(name)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> (Program, Vec<Error>) {
        let (tokens, lex_errors) = Lexer::new(source, 0).tokenize();
        assert!(lex_errors.is_empty(), "{:?}", lex_errors);
        Parser::new(tokens, &["String"]).parse_program()
    }

    fn parse_ok(source: &str) -> Program {
        let (program, errors) = parse(source);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        program
    }

    fn messages(source: &str) -> Vec<String> {
        parse(source).1.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_function_with_return() {
        let program = parse_ok("function add(a: int, b = 2): int\n  return a + b\nend function\n");
        let Stmt::Function(function) = &program.stmts[0] else {
            panic!("expected function");
        };
        assert_eq!(function.name.name, "add");
        assert_eq!(function.params.len(), 2);
        assert!(function.params[0].annotation.is_some());
        assert!(function.params[1].initializer.is_some());
        assert!(matches!(function.annotation, Some(AstType::Int(_))));
        assert!(matches!(function.body[0], Stmt::Return { value: Some(_), .. }));
    }

    #[test]
    fn test_class_declaration() {
        let source = "\
class Dog extends Animal
  private name: String = \"rex\"
  static count: int = 0
  function Dog()
  end function
  public static function make(): Dog
    return new Dog()
  end function
end class
class Animal
end class
";
        let program = parse_ok(source);
        let Stmt::Class(class) = &program.stmts[0] else {
            panic!("expected class");
        };
        assert_eq!(class.name.name, "Dog");
        assert!(matches!(&class.superclass, Some(AstType::Class { name, .. }) if name == "Animal"));
        assert_eq!(class.fields.len(), 2);
        assert_eq!(class.fields[0].visibility, Visibility::Private);
        assert!(class.fields[1].is_static);
        assert_eq!(class.methods.len(), 2);
        assert!(class.methods[1].is_static);
    }

    #[test]
    fn test_precedence() {
        let program = parse_ok("x = 1 + 2 * 3 > 4 and not b or c is int\n");
        let Stmt::Set(set) = &program.stmts[0] else {
            panic!("expected set");
        };
        let ExprKind::Logical { op: LogicalOp::Or, left, right } = &set.value.kind else {
            panic!("expected or at the root");
        };
        assert!(matches!(right.kind, ExprKind::IsType { .. }));
        let ExprKind::Logical { op: LogicalOp::And, left: cmp, .. } = &left.kind else {
            panic!("expected and");
        };
        let ExprKind::Binary { op: BinaryOp::Gt, left: sum, .. } = &cmp.kind else {
            panic!("expected comparison");
        };
        assert!(matches!(&sum.kind, ExprKind::Binary { op: BinaryOp::Add, right, .. }
            if matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. })));
    }

    #[test]
    fn test_set_statements() {
        let program = parse_ok("a: double = b = 3\nx = 1, y[0] = 2\n");
        let Stmt::Set(set) = &program.stmts[0] else {
            panic!("expected set");
        };
        assert!(matches!(&set.left.kind, ExprKind::VariableToSet { name, annotation: Some(AstType::Double(_)), .. } if name.name == "a"));
        assert_eq!(set.chained.len(), 1);
        assert!(matches!(set.value.kind, ExprKind::Literal(LiteralValue::Int(3))));

        let Stmt::MultiSet { sets, .. } = &program.stmts[1] else {
            panic!("expected multi-set");
        };
        assert_eq!(sets.len(), 2);
        assert!(matches!(sets[1].left.kind, ExprKind::Subscript { .. }));
    }

    #[test]
    fn test_calls_and_casts() {
        let program = parse_ok("output String.valueOf((int) 2.5), a.b(1)[2], {1, 2}\n");
        let Stmt::Output { exprs, .. } = &program.stmts[0] else {
            panic!("expected output");
        };
        let ExprKind::Call(call) = &exprs[0].kind else {
            panic!("expected call");
        };
        assert!(matches!(&call.callee, Callee::Object(obj) if matches!(obj.kind, ExprKind::StaticClassRef { .. })));
        assert!(matches!(call.args[0].kind, ExprKind::Cast { target: AstType::Int(_), .. }));
        assert!(matches!(exprs[1].kind, ExprKind::Subscript { .. }));
        assert!(matches!(&exprs[2].kind, ExprKind::ArrayLiteral(values) if values.len() == 2));
    }

    #[test]
    fn test_control_flow() {
        let source = "\
loop i from 1 to 10
  if i mod 2 == 0 then
    continue
  else if i > 8 then
    break
  else
    output i
  end if
end loop
loop until done
  exit
end loop
";
        let program = parse_ok(source);
        assert!(matches!(program.stmts[0], Stmt::LoopFrom { .. }));
        let Stmt::LoopFrom { body, .. } = &program.stmts[0] else { unreachable!() };
        let Stmt::If(if_stmt) = &body.stmts[0] else {
            panic!("expected if");
        };
        assert_eq!(if_stmt.else_ifs.len(), 1);
        assert!(if_stmt.else_branch.is_some());
        let Stmt::While { condition, .. } = &program.stmts[1] else {
            panic!("expected while");
        };
        assert!(matches!(condition.kind, ExprKind::Unary { op: UnaryOp::Not, .. }));
    }

    #[test]
    fn test_allocation() {
        let program = parse_ok("a = new int[3][4]\n");
        let Stmt::Set(set) = &program.stmts[0] else {
            panic!("expected set");
        };
        let ExprKind::ArrayAllocation { array_type, capacities } = &set.value.kind else {
            panic!("expected allocation");
        };
        assert_eq!(capacities.len(), 2);
        assert_eq!(array_type.to_string(), "[[int]]");
    }

    #[test]
    fn test_error_recovery() {
        let (program, errors) = parse("x = 1 +\noutput 2\ny = 3 then\n");
        let errors: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(errors, vec!["Expect expression", "Expect end-of-line after set statement"]);
        assert_eq!(program.stmts.len(), 1);
        assert!(matches!(program.stmts[0], Stmt::Output { .. }));

        assert_eq!(messages("if x\nend if\n"), vec!["Expect 'then' after if condition"]);
        assert_eq!(
            messages("function f()\n  if x\n    output 1\n  else\n    output 2\n  end if\nend function\n"),
            vec!["Expect 'then' after if condition"]
        );
        assert_eq!(
            messages("function f()\n  class B\n  end class\nend function\n"),
            vec!["Class declaration must be global"]
        );
        assert_eq!(messages("class A\n  x\nend class\n"), vec!["Expect type annotation for field declaration"]);
        assert_eq!(messages("class A\n  static x: int\nend class\n"), vec!["Static field requires an initial value"]);
    }
}
