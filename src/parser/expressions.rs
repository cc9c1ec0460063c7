//! Expression parsing.

use crate::ast::{Expr, ExprKind, InfixOp, PrefixOp};
use crate::error::ParserError;
use crate::lexer::TokenKind;
use crate::parser::{Parser, Precedence};

impl Parser {
    pub(crate) fn parse_expression(&mut self, precedence: Precedence) -> Option<Expr> {
        let mut left = self.parse_prefix()?;

        while !self.peek_is(&TokenKind::Semicolon)
            && precedence < Precedence::of(&self.peek().kind)
        {
            if !is_infix_start(&self.peek().kind) {
                return Some(left);
            }
            self.advance();
            left = self.parse_infix(left)?;
        }

        Some(left)
    }

    fn parse_prefix(&mut self) -> Option<Expr> {
        let span = self.cur_span();
        match &self.cur().kind {
            TokenKind::Identifier(name) => {
                Some(Expr::new(ExprKind::Identifier(name.clone()), span))
            }
            TokenKind::IntLiteral(n) => Some(Expr::new(ExprKind::IntLiteral(*n), span)),
            TokenKind::FloatLiteral(n) => Some(Expr::new(ExprKind::FloatLiteral(*n), span)),
            TokenKind::StringLiteral(s) => {
                Some(Expr::new(ExprKind::StringLiteral(s.clone()), span))
            }
            TokenKind::True => Some(Expr::new(ExprKind::BoolLiteral(true), span)),
            TokenKind::False => Some(Expr::new(ExprKind::BoolLiteral(false), span)),
            TokenKind::Bang => self.parse_prefix_operator(PrefixOp::Bang),
            TokenKind::Minus => self.parse_prefix_operator(PrefixOp::Minus),
            TokenKind::LeftParen => self.parse_grouped_expression(),
            TokenKind::If => self.parse_if_expression(),
            other => {
                let err = ParserError::NoPrefixRule(other.to_string(), span);
                self.errors.push(err);
                None
            }
        }
    }

    fn parse_prefix_operator(&mut self, op: PrefixOp) -> Option<Expr> {
        let span = self.cur_span();
        self.advance();
        let right = self.parse_expression(Precedence::Prefix)?;
        Some(Expr::new(
            ExprKind::Prefix {
                op,
                right: Box::new(right),
            },
            span,
        ))
    }

    fn parse_grouped_expression(&mut self) -> Option<Expr> {
        self.advance();
        let expr = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(&TokenKind::RightParen, "')'") {
            return None;
        }
        Some(expr)
    }

    fn parse_if_expression(&mut self) -> Option<Expr> {
        let span = self.cur_span();
        if !self.expect_peek(&TokenKind::LeftParen, "'('") {
            return None;
        }
        self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(&TokenKind::RightParen, "')'") {
            return None;
        }
        if !self.expect_peek(&TokenKind::LeftBrace, "'{'") {
            return None;
        }
        let consequence = self.parse_block();

        let alternative = if self.peek_is(&TokenKind::Else) {
            self.advance();
            if !self.expect_peek(&TokenKind::LeftBrace, "'{'") {
                return None;
            }
            Some(self.parse_block())
        } else {
            None
        };

        Some(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                consequence,
                alternative,
            },
            span,
        ))
    }

    fn parse_infix(&mut self, left: Expr) -> Option<Expr> {
        match &self.cur().kind {
            TokenKind::LeftParen => self.parse_call_expression(left),
            TokenKind::LeftBracket => self.parse_index_expression(left),
            TokenKind::Dot => self.parse_accessor_expression(left),
            other => {
                let op = infix_op(other)?;
                let span = self.cur_span();
                let precedence = Precedence::of(other);
                self.advance();
                let right = self.parse_expression(precedence)?;
                Some(Expr::new(
                    ExprKind::Infix {
                        left: Box::new(left),
                        op,
                        right: Box::new(right),
                    },
                    span,
                ))
            }
        }
    }

    fn parse_call_expression(&mut self, callee: Expr) -> Option<Expr> {
        let span = self.cur_span();
        let arguments = self.parse_call_arguments()?;
        Some(Expr::new(
            ExprKind::Call {
                callee: Box::new(callee),
                arguments,
            },
            span,
        ))
    }

    fn parse_call_arguments(&mut self) -> Option<Vec<Expr>> {
        let mut arguments = Vec::new();

        if self.peek_is(&TokenKind::RightParen) {
            self.advance();
            return Some(arguments);
        }

        self.advance();
        arguments.push(self.parse_expression(Precedence::Lowest)?);
        while self.peek_is(&TokenKind::Comma) {
            self.advance();
            self.advance();
            arguments.push(self.parse_expression(Precedence::Lowest)?);
        }

        if !self.expect_peek(&TokenKind::RightParen, "')'") {
            return None;
        }
        Some(arguments)
    }

    fn parse_index_expression(&mut self, left: Expr) -> Option<Expr> {
        let span = self.cur_span();
        self.advance();
        let index = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(&TokenKind::RightBracket, "']'") {
            return None;
        }
        Some(Expr::new(
            ExprKind::Index {
                left: Box::new(left),
                index: Box::new(index),
            },
            span,
        ))
    }

    /// `a.b` and chained `a.b.c`, collected into a single accessor node.
    fn parse_accessor_expression(&mut self, left: Expr) -> Option<Expr> {
        let span = self.cur_span();
        let mut fields = vec![self.expect_peek_identifier("attribute name")?];
        while self.peek_is(&TokenKind::Dot) {
            self.advance();
            fields.push(self.expect_peek_identifier("attribute name")?);
        }
        Some(Expr::new(
            ExprKind::Accessor {
                left: Box::new(left),
                fields,
            },
            span,
        ))
    }
}

fn is_infix_start(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::EqualEqual
            | TokenKind::BangEqual
            | TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::And
            | TokenKind::Or
            | TokenKind::LeftParen
            | TokenKind::LeftBracket
            | TokenKind::Dot
    )
}

fn infix_op(kind: &TokenKind) -> Option<InfixOp> {
    match kind {
        TokenKind::Plus => Some(InfixOp::Add),
        TokenKind::Minus => Some(InfixOp::Sub),
        TokenKind::Star => Some(InfixOp::Mul),
        TokenKind::Slash => Some(InfixOp::Div),
        TokenKind::EqualEqual => Some(InfixOp::Eq),
        TokenKind::BangEqual => Some(InfixOp::NotEq),
        TokenKind::Less => Some(InfixOp::Lt),
        TokenKind::LessEqual => Some(InfixOp::Lte),
        TokenKind::Greater => Some(InfixOp::Gt),
        TokenKind::GreaterEqual => Some(InfixOp::Gte),
        TokenKind::And => Some(InfixOp::And),
        TokenKind::Or => Some(InfixOp::Or),
        _ => None,
    }
}
