//! Statement parsing.

use crate::ast::{
    AttributeDecl, Expr, ExprKind, FunctionDecl, Parameter, ReturnType, Stmt, StmtKind, StructDecl,
};
use crate::lexer::TokenKind;
use crate::parser::{Parser, Precedence};

impl Parser {
    pub(crate) fn parse_statement(&mut self) -> Option<Stmt> {
        match &self.cur().kind {
            TokenKind::Global => self.parse_declaration_block(BlockKeyword::Global),
            TokenKind::Const => self.parse_declaration_block(BlockKeyword::Const),
            TokenKind::Local => self.parse_declaration_block(BlockKeyword::Local),
            TokenKind::Structs => self.parse_structs_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Identifier(_) => {
                if self.peek_is(&TokenKind::LeftParen) && self.is_function_definition() {
                    self.parse_function_statement()
                } else if self.peek().is_identifier() {
                    self.parse_declaration()
                } else {
                    self.parse_expression_like_statement()
                }
            }
            _ => self.parse_expression_like_statement(),
        }
    }

    /// `global { ... }`, `const { ... }`, `local { ... }`. The block body is
    /// parsed generically; the compiler rejects anything that is not a
    /// declaration so the error carries the runtime taxonomy.
    fn parse_declaration_block(&mut self, keyword: BlockKeyword) -> Option<Stmt> {
        let span = self.cur_span();

        if !self.expect_peek(&TokenKind::LeftBrace, "'{'") {
            return None;
        }
        let body = self.parse_block();

        let kind = match keyword {
            BlockKeyword::Global => StmtKind::Global(body),
            BlockKeyword::Const => StmtKind::Const(body),
            BlockKeyword::Local => StmtKind::Local(body),
        };
        Some(Stmt::new(kind, span))
    }

    /// Scalar or array declaration: the cursor is on the type name and the
    /// next token is the variable name.
    fn parse_declaration(&mut self) -> Option<Stmt> {
        let span = self.cur_span();
        let type_name = self.cur_identifier_name();
        let name = self.expect_peek_identifier("variable name")?;

        if self.peek_is(&TokenKind::LeftBracket) {
            return self.parse_array_declaration(type_name, name, span);
        }

        let value = if self.peek_is(&TokenKind::Assign) {
            self.advance();
            if self.peek_is(&TokenKind::LeftBrace) {
                // `int v = {1, 2};` declares an array despite the missing [].
                self.advance();
                let values = self.parse_brace_list()?;
                self.skip_optional_semicolon();
                return Some(Stmt::new(
                    StmtKind::ArrayDecl {
                        type_name,
                        name,
                        size: Some(Expr::int(values.len() as i64)),
                        values,
                    },
                    span,
                ));
            }
            self.advance();
            Some(self.parse_expression(Precedence::Lowest)?)
        } else {
            self.default_value_for_type(&type_name)
        };

        self.skip_optional_semicolon();
        Some(Stmt::new(
            StmtKind::Variable {
                type_name,
                name,
                value,
            },
            span,
        ))
    }

    /// `name[size] = {...}` / `name[size];` / `name[] = {...}` / `name[];`
    /// with the cursor on the variable name.
    fn parse_array_declaration(
        &mut self,
        type_name: String,
        name: String,
        span: crate::span::Span,
    ) -> Option<Stmt> {
        self.advance(); // '['

        let mut size = if self.peek_is(&TokenKind::RightBracket) {
            None
        } else {
            self.advance();
            Some(self.parse_expression(Precedence::Lowest)?)
        };
        if !self.expect_peek(&TokenKind::RightBracket, "']'") {
            return None;
        }

        let values = if self.peek_is(&TokenKind::Assign) {
            self.advance();
            if !self.expect_peek(&TokenKind::LeftBrace, "'{'") {
                return None;
            }
            let values = self.parse_brace_list()?;
            if size.is_none() {
                size = Some(Expr::int(values.len() as i64));
            }
            values
        } else {
            // No initializer: fill with typed defaults. A literal size gives
            // the element count, anything else defaults to one element.
            let count = match &size {
                Some(Expr {
                    kind: ExprKind::IntLiteral(n),
                    ..
                }) => (*n).max(0) as usize,
                Some(_) => 1,
                None => 1,
            };
            if size.is_none() {
                size = Some(Expr::int(1));
            }
            let default = self
                .default_value_for_type(&type_name)
                .unwrap_or_else(|| Expr::int(0));
            vec![default; count]
        };

        self.skip_optional_semicolon();
        Some(Stmt::new(
            StmtKind::ArrayDecl {
                type_name,
                name,
                size,
                values,
            },
            span,
        ))
    }

    /// `{ e1, e2, ... }` with the cursor on `{`; ends on the closing `}`.
    fn parse_brace_list(&mut self) -> Option<Vec<Expr>> {
        let mut values = Vec::new();

        if self.peek_is(&TokenKind::RightBrace) {
            self.advance();
            return Some(values);
        }

        self.advance();
        values.push(self.parse_expression(Precedence::Lowest)?);
        while self.peek_is(&TokenKind::Comma) {
            self.advance();
            self.advance();
            values.push(self.parse_expression(Precedence::Lowest)?);
        }

        if !self.expect_peek(&TokenKind::RightBrace, "'}'") {
            return None;
        }
        Some(values)
    }

    /// `name(params) returnType { body }` with the cursor on the name.
    fn parse_function_statement(&mut self) -> Option<Stmt> {
        let span = self.cur_span();
        let name = self.cur_identifier_name();

        if !self.expect_peek(&TokenKind::LeftParen, "'('") {
            return None;
        }
        let parameters = self.parse_function_parameters()?;

        let return_type_name = self.expect_peek_identifier("return type")?;
        let return_span = self.cur_span();
        let mut is_array = false;
        if self.peek_is(&TokenKind::LeftBracket) {
            self.advance();
            if !self.peek_is(&TokenKind::RightBracket) {
                self.advance();
                self.parse_expression(Precedence::Lowest)?;
            }
            if !self.expect_peek(&TokenKind::RightBracket, "']'") {
                return None;
            }
            is_array = true;
        }

        if !self.expect_peek(&TokenKind::LeftBrace, "'{'") {
            return None;
        }
        let body = self.parse_block();

        Some(Stmt::new(
            StmtKind::Function(FunctionDecl {
                name,
                parameters,
                return_type: ReturnType {
                    type_name: return_type_name,
                    is_array,
                    span: return_span,
                },
                body,
                span,
            }),
            span,
        ))
    }

    /// Parameter list with the cursor on `(`; ends on `)`. A parameter
    /// without its own type inherits the first parameter's type:
    /// `add(int a, b, c)` declares three ints.
    fn parse_function_parameters(&mut self) -> Option<Vec<Parameter>> {
        let mut parameters = Vec::new();

        if self.peek_is(&TokenKind::RightParen) {
            self.advance();
            return Some(parameters);
        }

        self.advance();
        let first_type = self.cur_identifier_name();
        let first = self.parse_parameter_tail(first_type.clone())?;
        parameters.push(first);

        while self.peek_is(&TokenKind::Comma) {
            self.advance();
            self.advance();
            let parameter = if self.peek().is_identifier() {
                let type_name = self.cur_identifier_name();
                self.parse_parameter_tail(type_name)?
            } else {
                self.parse_untyped_parameter(first_type.clone())?
            };
            parameters.push(parameter);
        }

        if !self.expect_peek(&TokenKind::RightParen, "')'") {
            return None;
        }
        Some(parameters)
    }

    /// Cursor on the type name; consumes the name and optional `[size]`.
    fn parse_parameter_tail(&mut self, type_name: String) -> Option<Parameter> {
        let name = self.expect_peek_identifier("parameter name")?;
        let span = self.cur_span();
        let (is_array, size) = self.parse_optional_array_suffix()?;
        Some(Parameter {
            name,
            type_name,
            is_array,
            size,
            span,
        })
    }

    /// Cursor on the parameter name itself (type inherited).
    fn parse_untyped_parameter(&mut self, type_name: String) -> Option<Parameter> {
        let name = self.cur_identifier_name();
        let span = self.cur_span();
        let (is_array, size) = self.parse_optional_array_suffix()?;
        Some(Parameter {
            name,
            type_name,
            is_array,
            size,
            span,
        })
    }

    /// `[size]` or `[]` after a name; cursor ends on `]`.
    fn parse_optional_array_suffix(&mut self) -> Option<(bool, Option<Expr>)> {
        if !self.peek_is(&TokenKind::LeftBracket) {
            return Some((false, None));
        }
        self.advance();
        let size = if self.peek_is(&TokenKind::RightBracket) {
            Some(Expr::int(1))
        } else {
            self.advance();
            Some(self.parse_expression(Precedence::Lowest)?)
        };
        if !self.expect_peek(&TokenKind::RightBracket, "']'") {
            return None;
        }
        Some((true, size))
    }

    /// `structs { name { attrs }; ... }` with the cursor on `structs`.
    fn parse_structs_statement(&mut self) -> Option<Stmt> {
        let span = self.cur_span();
        if !self.expect_peek(&TokenKind::LeftBrace, "'{'") {
            return None;
        }

        let mut structs = Vec::new();
        while !self.peek_is(&TokenKind::RightBrace) && !self.peek_is(&TokenKind::Eof) {
            let name = self.expect_peek_identifier("struct name")?;
            let struct_span = self.cur_span();
            if !self.expect_peek(&TokenKind::LeftBrace, "'{'") {
                return None;
            }
            let attributes = self.parse_struct_attributes()?;
            if self.peek_is(&TokenKind::Semicolon) {
                self.advance();
            }
            structs.push(StructDecl {
                name,
                attributes,
                span: struct_span,
            });
        }

        if !self.expect_peek(&TokenKind::RightBrace, "'}'") {
            return None;
        }
        Some(Stmt::new(StmtKind::Structs(structs), span))
    }

    /// Attribute list with the cursor on `{`; ends on the closing `}`.
    /// Same type-inheritance rule as parameters: `float x, y, z;`.
    fn parse_struct_attributes(&mut self) -> Option<Vec<AttributeDecl>> {
        let mut attributes = Vec::new();

        if self.peek_is(&TokenKind::RightBrace) {
            self.advance();
            return Some(attributes);
        }

        self.advance();
        let first_type = self.cur_identifier_name();
        attributes.push(self.parse_attribute_tail(first_type.clone())?);

        while self.peek_is(&TokenKind::Comma) {
            self.advance();
            self.advance();
            let attribute = if self.peek().is_identifier() {
                let type_name = self.cur_identifier_name();
                self.parse_attribute_tail(type_name)?
            } else {
                let name = self.cur_identifier_name();
                let span = self.cur_span();
                let (is_array, size) = self.parse_optional_array_suffix()?;
                AttributeDecl {
                    name,
                    type_name: first_type.clone(),
                    is_array,
                    size,
                    span,
                }
            };
            attributes.push(attribute);
        }

        if !self.expect_peek(&TokenKind::Semicolon, "';'") {
            return None;
        }
        if !self.expect_peek(&TokenKind::RightBrace, "'}'") {
            return None;
        }
        Some(attributes)
    }

    fn parse_attribute_tail(&mut self, type_name: String) -> Option<AttributeDecl> {
        let name = self.expect_peek_identifier("attribute name")?;
        let span = self.cur_span();
        let (is_array, size) = self.parse_optional_array_suffix()?;
        Some(AttributeDecl {
            name,
            type_name,
            is_array,
            size,
            span,
        })
    }

    fn parse_while_statement(&mut self) -> Option<Stmt> {
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
        let body = self.parse_block();
        Some(Stmt::new(StmtKind::While { condition, body }, span))
    }

    fn parse_for_statement(&mut self) -> Option<Stmt> {
        let span = self.cur_span();
        if !self.expect_peek(&TokenKind::LeftParen, "'('") {
            return None;
        }
        let variable = self.expect_peek_identifier("loop variable")?;
        if !self.expect_peek(&TokenKind::Comma, "','") {
            return None;
        }
        self.advance();
        let start = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(&TokenKind::Comma, "','") {
            return None;
        }
        self.advance();
        let end = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(&TokenKind::Comma, "','") {
            return None;
        }
        self.advance();
        let increment = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(&TokenKind::RightParen, "')'") {
            return None;
        }
        if !self.expect_peek(&TokenKind::LeftBrace, "'{'") {
            return None;
        }
        let body = self.parse_block();

        Some(Stmt::new(
            StmtKind::For {
                variable,
                start,
                end,
                increment,
                body,
            },
            span,
        ))
    }

    /// An expression followed by an optional statement suffix:
    /// `++`, `--`, `+=`, `-=`, `*=` or `=`.
    fn parse_expression_like_statement(&mut self) -> Option<Stmt> {
        let span = self.cur_span();
        let target = self.parse_expression(Precedence::Lowest)?;

        let stmt = match &self.peek().kind {
            TokenKind::PlusPlus => {
                self.advance();
                Stmt::new(StmtKind::Increment(target), span)
            }
            TokenKind::MinusMinus => {
                self.advance();
                Stmt::new(StmtKind::Decrement(target), span)
            }
            TokenKind::PlusEqual => {
                self.advance();
                self.advance();
                let amount = self.parse_expression(Precedence::Lowest)?;
                Stmt::new(StmtKind::PlusEquals { target, amount }, span)
            }
            TokenKind::MinusEqual => {
                self.advance();
                self.advance();
                let amount = self.parse_expression(Precedence::Lowest)?;
                Stmt::new(StmtKind::MinusEquals { target, amount }, span)
            }
            TokenKind::StarEqual => {
                self.advance();
                self.advance();
                let amount = self.parse_expression(Precedence::Lowest)?;
                Stmt::new(StmtKind::StarEquals { target, amount }, span)
            }
            TokenKind::Assign => {
                self.advance();
                self.advance();
                let value = self.parse_expression(Precedence::Lowest)?;
                Stmt::new(StmtKind::Assignment { target, value }, span)
            }
            _ => Stmt::new(StmtKind::Expression(target), span),
        };

        self.skip_optional_semicolon();
        Some(stmt)
    }

    /// The current token's identifier name. Only called after the dispatch
    /// has already established the token is an identifier.
    fn cur_identifier_name(&mut self) -> String {
        match &self.cur().kind {
            TokenKind::Identifier(name) => name.clone(),
            other => {
                let found = other.to_string();
                let span = self.cur_span();
                self.error(format!("expected identifier, got '{}'", found), span);
                String::new()
            }
        }
    }

    fn default_value_for_type(&self, type_name: &str) -> Option<Expr> {
        match type_name {
            "int" => Some(Expr::int(0)),
            "float" => Some(Expr::float(0.0)),
            "bool" => Some(Expr::bool(false)),
            "string" => Some(Expr::string("")),
            _ => None,
        }
    }
}

enum BlockKeyword {
    Global,
    Const,
    Local,
}
