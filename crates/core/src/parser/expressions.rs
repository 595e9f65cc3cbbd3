use super::constructs::is_word_token;
use super::Parser;
use crate::ast::{ArithOp, CompareOp, Condition, Expr, Value};
use crate::error::SyntaxError;
use crate::lexer::{unescape, TokenKind};

/// Tokens that continue an expression after a closing parenthesis, so
/// `(a + b) > 3` is read as a comparison rather than a grouped condition.
fn continues_expression(kind: TokenKind) -> bool {
    kind.is_comparison()
        || matches!(
            kind,
            TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Slash
                | TokenKind::In
                | TokenKind::Contains
        )
}

impl<'a> Parser<'a> {
    // -- Conditions ------------------------------------------------

    pub(super) fn parse_condition(&mut self) -> Result<Condition, SyntaxError> {
        self.parse_or_condition()
    }

    fn parse_or_condition(&mut self) -> Result<Condition, SyntaxError> {
        let base = self.depth;
        let mut left = self.parse_and_condition()?;
        while self.eat(TokenKind::Or) {
            self.descend()?;
            let right = self.parse_and_condition()?;
            left = Condition::Or {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_and_condition(&mut self) -> Result<Condition, SyntaxError> {
        let base = self.depth;
        let mut left = self.parse_not_condition()?;
        while self.eat(TokenKind::And) {
            self.descend()?;
            let right = self.parse_not_condition()?;
            left = Condition::And {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_not_condition(&mut self) -> Result<Condition, SyntaxError> {
        if self.eat(TokenKind::Not) {
            self.descend()?;
            let operand = self.parse_not_condition()?;
            self.depth -= 1;
            return Ok(Condition::Not {
                operand: Box::new(operand),
            });
        }
        self.parse_primary_condition()
    }

    fn parse_primary_condition(&mut self) -> Result<Condition, SyntaxError> {
        if self.peek() != TokenKind::LParen {
            return self.parse_comparison();
        }

        // Try `( condition )` first; fall back to a comparison whose left
        // operand is a parenthesized expression.
        let (save, base) = (self.pos, self.depth);
        self.descend()?;
        self.advance();
        let grouped = match self.parse_condition() {
            Ok(cond) if self.peek() == TokenKind::RParen => {
                self.advance();
                if continues_expression(self.peek()) {
                    None
                } else {
                    self.depth = base;
                    return Ok(cond);
                }
            }
            Ok(_) => Some(self.err(format!("expected ')', found {}", self.cur().describe()))),
            Err(e) => Some(e),
        };

        self.pos = save;
        self.depth = base;
        match self.parse_comparison() {
            Ok(cond) => Ok(cond),
            Err(fallback) => match grouped {
                // Report whichever attempt got further into the input.
                Some(first)
                    if (first.line, first.column.unwrap_or(0))
                        > (fallback.line, fallback.column.unwrap_or(0)) =>
                {
                    Err(first)
                }
                _ => Err(fallback),
            },
        }
    }

    fn parse_comparison(&mut self) -> Result<Condition, SyntaxError> {
        let left = self.parse_expr()?;
        let kind = self.peek();
        let op = match kind {
            TokenKind::Eq => Some(CompareOp::Eq),
            TokenKind::Neq => Some(CompareOp::Neq),
            TokenKind::Lt => Some(CompareOp::Lt),
            TokenKind::Gt => Some(CompareOp::Gt),
            TokenKind::Lte => Some(CompareOp::Lte),
            TokenKind::Gte => Some(CompareOp::Gte),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.parse_expr()?;
            return Ok(Condition::Compare { left, op, right });
        }
        match kind {
            TokenKind::In => {
                self.advance();
                self.expect(TokenKind::LBracket, "'[' after IN")?;
                let values = self.parse_value_list()?;
                self.expect(TokenKind::RBracket, "',' or ']'")?;
                Ok(Condition::In { expr: left, values })
            }
            TokenKind::Contains => {
                self.advance();
                let value = self.parse_value()?;
                Ok(Condition::Contains { expr: left, value })
            }
            _ => Err(self.err(format!(
                "expected a comparison operator, IN or CONTAINS, found {}",
                self.cur().describe()
            ))),
        }
    }

    // -- Expressions -----------------------------------------------

    pub(super) fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.depth;
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Minus => ArithOp::Sub,
                _ => break,
            };
            self.descend()?;
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => ArithOp::Mul,
                TokenKind::Slash => ArithOp::Div,
                _ => break,
            };
            self.descend()?;
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        let negate = match self.peek() {
            TokenKind::Minus => true,
            TokenKind::Plus => false,
            _ => return self.parse_primary_expr(),
        };
        self.descend()?;
        self.advance();
        let operand = self.parse_unary()?;
        self.depth -= 1;
        Ok(Expr::Unary {
            negate,
            operand: Box::new(operand),
        })
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, SyntaxError> {
        if self.peek() == TokenKind::LParen {
            self.descend()?;
            self.advance();
            let inner = self.parse_expr()?;
            self.expect(TokenKind::RParen, "')'")?;
            self.depth -= 1;
            return Ok(inner);
        }
        let value = match self.peek() {
            TokenKind::IntLit => Value::Int(self.advance().text),
            TokenKind::RealLit => Value::Real(self.advance().text),
            TokenKind::StringLit => Value::Str(unescape(&self.advance().text)),
            TokenKind::BoolLit => Value::Bool(self.advance().text == "true"),
            _ => {
                return self
                    .parse_qualified_name()
                    .map(|path| Expr::Name { path })
            }
        };
        Ok(Expr::Literal { value })
    }

    /// `ID ('.' ID)*`. A keyword may lead the name when a dot follows it
    /// (`user.department`) and may appear anywhere after a dot.
    fn parse_qualified_name(&mut self) -> Result<Vec<String>, SyntaxError> {
        let first = self.peek();
        let leads = first == TokenKind::Ident
            || (first.is_keyword() && self.peek_at(1) == TokenKind::Dot);
        if !leads {
            return Err(self.err(format!(
                "expected an expression, found {}",
                self.cur().describe()
            )));
        }
        let mut path = vec![self.advance().text];
        while self.peek() == TokenKind::Dot {
            self.advance();
            if is_word_token(self.peek()) {
                path.push(self.advance().text);
            } else {
                return Err(self.err(format!(
                    "expected a name after '.', found {}",
                    self.cur().describe()
                )));
            }
        }
        Ok(path)
    }

    // -- Values ----------------------------------------------------

    pub(super) fn parse_value(&mut self) -> Result<Value, SyntaxError> {
        let value = match self.peek() {
            TokenKind::StringLit => Value::Str(unescape(&self.advance().text)),
            TokenKind::CharLit => {
                Value::Char(unescape(&self.advance().text).chars().next().unwrap_or_default())
            }
            TokenKind::IntLit => Value::Int(self.advance().text),
            TokenKind::RealLit => Value::Real(self.advance().text),
            TokenKind::Ident => Value::Ident(self.advance().text),
            TokenKind::BoolLit => Value::Bool(self.advance().text == "true"),
            TokenKind::LBracket => {
                self.descend()?;
                self.advance();
                let items = self.parse_value_list()?;
                self.expect(TokenKind::RBracket, "',' or ']'")?;
                self.depth -= 1;
                Value::List(items)
            }
            _ => {
                return Err(self.err(format!("expected a value, found {}", self.cur().describe())))
            }
        };
        Ok(value)
    }

    /// Comma-separated values up to (not including) `]`; may be empty.
    fn parse_value_list(&mut self) -> Result<Vec<Value>, SyntaxError> {
        let mut values = Vec::new();
        if self.peek() == TokenKind::RBracket {
            return Ok(values);
        }
        values.push(self.parse_value()?);
        while self.eat(TokenKind::Comma) {
            values.push(self.parse_value()?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    /// Parse `src` as the condition of a one-block role and return it.
    fn condition(src: &str) -> Condition {
        let program = format!(
            "ROLE R {{ permissions: [{{ actions: [read], resources: [x], conditions: {} }}] }}",
            src
        );
        let (tokens, lex_errors) = tokenize(&program);
        assert!(lex_errors.is_empty(), "{:?}", lex_errors);
        let (program, errors) = parse(&tokens);
        assert!(errors.is_empty(), "{:?}", errors);
        let Some(Statement::Role(role)) = program.and_then(|p| p.statements.into_iter().next())
        else {
            panic!("expected a role");
        };
        match role.body.into_iter().next() {
            Some(RolePermissions::Blocks { blocks, .. }) => blocks
                .into_iter()
                .next()
                .and_then(|b| b.condition)
                .expect("condition"),
            other => panic!("expected blocks, got {:?}", other),
        }
    }

    #[test]
    fn or_binds_looser_than_and() {
        let c = condition("a == 1 OR b == 2 AND c == 3");
        let Condition::Or { right, .. } = c else {
            panic!("expected OR at the root");
        };
        assert!(matches!(*right, Condition::And { .. }));
    }

    #[test]
    fn not_applies_to_the_nearest_operand() {
        let c = condition("NOT a == 1 AND b == 2");
        let Condition::And { left, .. } = c else {
            panic!("expected AND at the root");
        };
        assert!(matches!(*left, Condition::Not { .. }));
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let c = condition("x + y * 2 > 10");
        let Condition::Compare { left, op, .. } = c else {
            panic!("expected comparison");
        };
        assert_eq!(op, CompareOp::Gt);
        let Expr::Binary { op, right, .. } = left else {
            panic!("expected binary expression");
        };
        assert_eq!(op, ArithOp::Add);
        assert!(matches!(*right, Expr::Binary { op: ArithOp::Mul, .. }));
    }

    #[test]
    fn parenthesized_condition_and_parenthesized_expression() {
        let grouped = condition("(a > 1 OR b > 2) AND c == 3");
        assert_eq!(grouped.to_string(), "(a > 1 OR b > 2) AND c == 3");

        let arithmetic = condition("(a + b) * 2 >= 10");
        let Condition::Compare { left, .. } = arithmetic else {
            panic!("expected comparison");
        };
        assert_eq!(left.to_string(), "(a + b) * 2");
    }

    #[test]
    fn unary_minus_and_literals() {
        let c = condition("balance > -5.5");
        let Condition::Compare { right, .. } = c else {
            panic!("expected comparison");
        };
        assert_eq!(
            right,
            Expr::Unary {
                negate: true,
                operand: Box::new(Expr::Literal {
                    value: Value::Real("5.5".into())
                })
            }
        );
    }

    #[test]
    fn in_and_contains() {
        let c = condition(r#"user.role IN [admin, "ops", 3] AND user.tags CONTAINS 'x'"#);
        let Condition::And { left, right } = c else {
            panic!("expected AND");
        };
        let Condition::In { values, .. } = *left else {
            panic!("expected IN");
        };
        assert_eq!(values.len(), 3);
        assert_eq!(values[0], Value::Ident("admin".into()));
        assert!(matches!(*right, Condition::Contains { value: Value::Char('x'), .. }));
    }

    #[test]
    fn missing_operator_is_reported_at_the_offending_token() {
        let (tokens, _) = tokenize(
            "ROLE R { permissions: [{ actions: [read], resources: [x], conditions: user.level }] }",
        );
        let (_, errors) = parse(&tokens);
        assert_eq!(errors.len(), 1);
        assert!(
            errors[0].message.contains("comparison operator"),
            "{}",
            errors[0].message
        );
    }
}
