//! Recursive descent parser producing the [`Script`] AST.
//!
//! The parser stops at the first syntax error. Names that look like keywords
//! are accepted wherever the grammar cannot confuse them with clauses: record
//! field names and the schema/method parts of a schema call.

mod lexer;

pub use lexer::{Keyword, Lexer, Token, TokenKind};

use crate::ast::{
    ApplyType, BinaryOp, ColumnDefinition, CoupleDefinition, Cte, Definition, Endianness, Expr,
    ExprKind, FieldDefinition, FromItem, FromSource, Ident, JoinClause, JoinType, Literal,
    OrderByExpr, Query, RecordDefinition, RecordKind, Script, Select, SelectItem, SetExpr,
    SetOperator, SortOrder, TableDefinition, UnaryOp,
};
use crate::diagnostics::{DiagnosticCode, Span};
use crate::error::SyntaxError;
use quarry_core::DataType;

type ParseResult<T> = Result<T, SyntaxError>;

/// Deepest expression tree the parser builds. Parentheses, `NOT`, unary
/// minus and every chained binary operator each add one level.
pub const MAX_EXPR_DEPTH: usize = 128;

/// Parses a complete script.
pub fn parse(text: &str) -> ParseResult<Script> {
    let tokens = Lexer::new(text).tokenize()?;
    Parser::new(tokens).parse_script()
}

/// Parses a single expression. Used by hosts that evaluate standalone filters.
pub fn parse_expression(text: &str) -> ParseResult<Expr> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    parser.expect_end("end of expression")?;
    Ok(expr)
}

/// Parser state over a token stream.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Creates a parser. `tokens` must end with [`TokenKind::Eof`].
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0, depth: 0 }
    }

    // ---- token helpers ----

    fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    /// End offset of the last consumed token.
    fn prev_end(&self) -> usize {
        match self.pos.checked_sub(1) {
            Some(idx) => self.tokens[idx].span.end,
            None => 0,
        }
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.prev_end().max(start))
    }

    fn peek_keyword(&self) -> Option<Keyword> {
        self.peek().keyword()
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        self.peek_keyword() == Some(keyword)
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> ParseResult<Span> {
        if self.at_keyword(keyword) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(keyword.as_str()))
        }
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Span> {
        if self.at(&kind) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    fn expect_end(&mut self, expected: &str) -> ParseResult<()> {
        if self.at(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    /// Builds the error for the current token.
    fn unexpected(&self, expected: &str) -> SyntaxError {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            return SyntaxError::new(
                DiagnosticCode::UnexpectedEndOfInput,
                token.span,
                format!("expected {}, found end of input", expected),
            );
        }
        if let Some(keyword) = token.keyword().filter(Keyword::is_unsupported) {
            return SyntaxError::new(
                DiagnosticCode::UnsupportedKeyword,
                token.span,
                format!("{} is not supported", keyword.as_str()),
            )
            .with_hint(keyword.replacement());
        }
        SyntaxError::new(
            DiagnosticCode::UnexpectedToken,
            token.span,
            format!("expected {}, found {}", expected, token.kind),
        )
    }

    /// Adds one level to the expression being built.
    fn descend(&mut self) -> ParseResult<()> {
        if self.depth >= MAX_EXPR_DEPTH {
            return Err(SyntaxError::new(
                DiagnosticCode::NestingTooDeep,
                self.peek().span,
                format!("expression nested deeper than {} levels", MAX_EXPR_DEPTH),
            )
            .with_hint("split the expression or use IN (...) instead of long OR chains"));
        }
        self.depth += 1;
        Ok(())
    }

    /// A word usable as an identifier (not a reserved keyword).
    fn at_ident(&self) -> bool {
        self.peek_nth_is_ident(0)
    }

    fn peek_nth_is_ident(&self, n: usize) -> bool {
        match &self.peek_nth(n).kind {
            TokenKind::Word { keyword, .. } => !keyword.is_some_and(|k| k.is_reserved()),
            _ => false,
        }
    }

    fn expect_ident(&mut self) -> ParseResult<Ident> {
        if self.at_ident() {
            self.expect_word()
        } else {
            Err(self.unexpected("identifier"))
        }
    }

    /// Accepts any word, keywords included.
    fn expect_word(&mut self) -> ParseResult<Ident> {
        match &self.peek().kind {
            TokenKind::Word { text, .. } => {
                let ident = Ident::new(text.clone(), self.peek().span);
                self.advance();
                Ok(ident)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn at_word(&self, word: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Word { text, .. } if text.eq_ignore_ascii_case(word))
    }

    fn expect_integer(&mut self, clause: &str) -> ParseResult<i64> {
        match self.peek().kind {
            TokenKind::Integer(v) => {
                self.advance();
                Ok(v)
            }
            _ => Err(self.unexpected(&format!("integer after {}", clause))),
        }
    }

    fn subquery_error(&self, open: Span) -> SyntaxError {
        SyntaxError::new(
            DiagnosticCode::SubqueryNotSupported,
            open.merge(self.peek().span),
            "subqueries are not supported in expressions",
        )
        .with_hint("move the subquery into a WITH clause and join it")
    }

    // ---- script and declarations ----

    /// Parses declarations followed by one query.
    pub fn parse_script(&mut self) -> ParseResult<Script> {
        let mut definitions = Vec::new();
        while let Some(definition) = self.parse_definition()? {
            definitions.push(definition);
            self.expect(TokenKind::Semicolon)?;
        }
        let query = self.parse_query()?;
        self.consume(&TokenKind::Semicolon);
        self.expect_end("end of query")?;
        Ok(Script { definitions, query })
    }

    fn parse_definition(&mut self) -> ParseResult<Option<Definition>> {
        let definition = match self.peek_keyword() {
            Some(Keyword::Table) => Definition::Table(self.parse_table_definition()?),
            Some(Keyword::Couple) => Definition::Couple(self.parse_couple_definition()?),
            Some(Keyword::Binary) => Definition::Record(self.parse_record_definition(RecordKind::Binary)?),
            Some(Keyword::Text) => Definition::Record(self.parse_record_definition(RecordKind::Text)?),
            _ => return Ok(None),
        };
        Ok(Some(definition))
    }

    fn parse_table_definition(&mut self) -> ParseResult<TableDefinition> {
        let start = self.expect_keyword(Keyword::Table)?.start;
        let name = self.expect_ident()?;
        self.expect(TokenKind::LBrace)?;
        let mut columns = Vec::new();
        loop {
            let column = self.expect_word()?;
            let type_name = self.expect_word()?;
            if DataType::from_name(type_name.as_str()).is_none() {
                return Err(SyntaxError::new(
                    DiagnosticCode::InvalidTypeName,
                    type_name.span,
                    format!("unknown type '{}'", type_name),
                ));
            }
            columns.push(ColumnDefinition { name: column, type_name });
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(TableDefinition {
            name,
            columns,
            span: self.span_from(start),
        })
    }

    fn parse_couple_definition(&mut self) -> ParseResult<CoupleDefinition> {
        let start = self.expect_keyword(Keyword::Couple)?.start;
        self.consume(&TokenKind::Hash);
        let schema = self.expect_word()?;
        self.expect(TokenKind::Dot)?;
        let method = self.expect_word()?;
        self.expect_keyword(Keyword::With)?;
        self.expect_keyword(Keyword::Table)?;
        let table = self.expect_ident()?;
        self.expect_keyword(Keyword::As)?;
        let alias = self.expect_ident()?;
        Ok(CoupleDefinition {
            schema,
            method,
            table,
            alias,
            span: self.span_from(start),
        })
    }

    fn parse_record_definition(&mut self, kind: RecordKind) -> ParseResult<RecordDefinition> {
        let start = self.advance().span.start;
        let name = self.expect_word()?;
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            fields.push(self.parse_field_definition()?);
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(RecordDefinition {
            kind,
            name,
            fields,
            span: self.span_from(start),
        })
    }

    fn parse_field_definition(&mut self) -> ParseResult<FieldDefinition> {
        let name = self.expect_word()?;
        self.expect(TokenKind::Colon)?;
        let type_name = self.expect_word()?;
        let mut field = FieldDefinition {
            name,
            type_name,
            length: None,
            endianness: None,
            offset: None,
            until: None,
            condition: None,
        };

        if self.consume(&TokenKind::LBracket) {
            field.length = Some(self.parse_expr()?);
            self.expect(TokenKind::RBracket)?;
        }
        if self.at_word("le") {
            self.advance();
            field.endianness = Some(Endianness::Little);
        } else if self.at_word("be") {
            self.advance();
            field.endianness = Some(Endianness::Big);
        }
        if self.at_word("at") {
            self.advance();
            field.offset = Some(self.parse_expr()?);
        }
        if self.at_word("until") {
            self.advance();
            match &self.peek().kind {
                TokenKind::String(s) => {
                    field.until = Some(s.clone());
                    self.advance();
                }
                _ => return Err(self.unexpected("delimiter string")),
            }
        }
        if self.consume_keyword(Keyword::When) {
            field.condition = Some(self.parse_expr()?);
        }
        Ok(field)
    }

    // ---- queries ----

    fn parse_query(&mut self) -> ParseResult<Query> {
        let start = self.peek().span.start;
        let mut ctes: Vec<Cte> = Vec::new();
        if self.consume_keyword(Keyword::With) {
            if self.at_keyword(Keyword::Recursive) {
                return Err(SyntaxError::new(
                    DiagnosticCode::RecursiveCte,
                    self.peek().span,
                    "recursive common table expressions are not supported",
                ));
            }
            loop {
                let cte_start = self.peek().span.start;
                let name = self.expect_ident()?;
                self.expect_keyword(Keyword::As)?;
                self.expect(TokenKind::LParen)?;
                let body = self.parse_set_expr()?;
                self.expect(TokenKind::RParen)?;
                ctes.push(Cte {
                    name,
                    body,
                    span: self.span_from(cte_start),
                });
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let body = self.parse_set_expr()?;
        Ok(Query {
            ctes,
            body,
            span: self.span_from(start),
        })
    }

    fn parse_set_operator(&mut self) -> Option<(SetOperator, Span)> {
        let span = self.peek().span;
        let op = match self.peek_keyword()? {
            Keyword::Union => {
                self.advance();
                if self.consume_keyword(Keyword::All) {
                    SetOperator::UnionAll
                } else {
                    SetOperator::Union
                }
            }
            Keyword::Except => {
                self.advance();
                SetOperator::Except
            }
            Keyword::Intersect => {
                self.advance();
                SetOperator::Intersect
            }
            _ => return None,
        };
        Some((op, self.span_from(span.start)))
    }

    fn parse_set_expr(&mut self) -> ParseResult<SetExpr> {
        let start = self.peek().span.start;
        let mut left = SetExpr::Select(Box::new(self.parse_select()?));
        while let Some((op, op_span)) = self.parse_set_operator() {
            if !self.at(&TokenKind::LParen) {
                return Err(SyntaxError::new(
                    DiagnosticCode::SetOperatorMissingKeys,
                    op_span,
                    format!("{} requires a parenthesized key column list", op.name()),
                )
                .with_hint(format!("write {} (Key1, Key2) SELECT ...", op.name())));
            }
            self.advance();
            let mut keys = Vec::new();
            if !self.at(&TokenKind::RParen) {
                loop {
                    keys.push(self.expect_ident()?);
                    if !self.consume(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen)?;
            let right = SetExpr::Select(Box::new(self.parse_select()?));
            left = SetExpr::SetOperation {
                op,
                keys,
                left: Box::new(left),
                right: Box::new(right),
                span: self.span_from(start),
            };
        }
        Ok(left)
    }

    fn parse_select(&mut self) -> ParseResult<Select> {
        let start = self.expect_keyword(Keyword::Select)?.start;
        let distinct = self.consume_keyword(Keyword::Distinct);
        if self.at_keyword(Keyword::Top) && matches!(self.peek_nth(1).kind, TokenKind::Integer(_)) {
            return Err(self.unexpected("select item"));
        }

        let mut items = Vec::new();
        loop {
            items.push(self.parse_select_item()?);
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }

        self.expect_keyword(Keyword::From)?;
        let from = self.parse_from_item()?;
        let mut joins = Vec::new();
        while let Some(join) = self.parse_join()? {
            joins.push(join);
        }

        let selection = if self.consume_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut group_by = Vec::new();
        if self.consume_keyword(Keyword::Group) {
            self.expect_keyword(Keyword::By)?;
            loop {
                group_by.push(self.parse_expr()?);
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let having = if self.consume_keyword(Keyword::Having) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut order_by = Vec::new();
        if self.consume_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            loop {
                let expr = self.parse_expr()?;
                let order = if self.consume_keyword(Keyword::Desc) {
                    SortOrder::Desc
                } else {
                    self.consume_keyword(Keyword::Asc);
                    SortOrder::Asc
                };
                order_by.push(OrderByExpr { expr, order });
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let skip = if self.consume_keyword(Keyword::Skip) {
            Some(self.expect_integer("SKIP")?)
        } else {
            None
        };
        let take = if self.consume_keyword(Keyword::Take) {
            Some(self.expect_integer("TAKE")?)
        } else {
            None
        };

        Ok(Select {
            distinct,
            items,
            from,
            joins,
            selection,
            group_by,
            having,
            order_by,
            skip,
            take,
            span: self.span_from(start),
        })
    }

    fn parse_select_item(&mut self) -> ParseResult<SelectItem> {
        if self.at(&TokenKind::Star) {
            return Ok(SelectItem::Wildcard(self.advance().span));
        }
        if self.at_ident()
            && self.peek_nth(1).kind == TokenKind::Dot
            && self.peek_nth(2).kind == TokenKind::Star
        {
            let qualifier = self.expect_ident()?;
            self.advance();
            self.advance();
            return Ok(SelectItem::QualifiedWildcard(qualifier));
        }

        let expr = self.parse_expr()?;
        let alias = if self.consume_keyword(Keyword::As) {
            Some(self.expect_ident()?)
        } else if self.at_ident() {
            Some(self.expect_ident()?)
        } else {
            None
        };
        Ok(SelectItem::Expr { expr, alias })
    }

    fn parse_args(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_from_item(&mut self) -> ParseResult<FromItem> {
        let start = self.peek().span.start;
        let source = if self.consume(&TokenKind::Hash) {
            let schema = self.expect_word()?;
            self.expect(TokenKind::Dot)?;
            let method = self.expect_word()?;
            let args = self.parse_args()?;
            FromSource::SchemaCall { schema, method, args }
        } else if self.peek_nth(1).kind == TokenKind::Dot {
            let schema = self.expect_ident()?;
            self.advance();
            let method = self.expect_word()?;
            let args = self.parse_args()?;
            FromSource::SchemaCall { schema, method, args }
        } else if self.peek_nth(1).kind == TokenKind::LParen {
            let name = self.expect_ident()?;
            let args = self.parse_args()?;
            FromSource::Coupled { name, args }
        } else {
            FromSource::Reference {
                name: self.expect_ident()?,
            }
        };

        let alias = if self.consume_keyword(Keyword::As) || self.at_ident() {
            Some(self.expect_ident()?)
        } else {
            None
        };
        Ok(FromItem {
            source,
            alias,
            span: self.span_from(start),
        })
    }

    fn parse_join(&mut self) -> ParseResult<Option<JoinClause>> {
        let start = self.peek().span.start;
        let join_type = match self.peek_keyword() {
            Some(Keyword::Join) => JoinType::Inner,
            Some(Keyword::Inner) => {
                self.advance();
                JoinType::Inner
            }
            Some(Keyword::Left) => {
                self.advance();
                self.consume_keyword(Keyword::Outer);
                JoinType::LeftOuter
            }
            Some(Keyword::Right) => {
                self.advance();
                self.consume_keyword(Keyword::Outer);
                JoinType::RightOuter
            }
            Some(Keyword::Cross) => {
                self.advance();
                self.expect_keyword(Keyword::Apply)?;
                let item = self.parse_from_item()?;
                return Ok(Some(JoinClause::Apply {
                    apply_type: ApplyType::Cross,
                    item,
                }));
            }
            Some(Keyword::Outer) => {
                self.advance();
                self.expect_keyword(Keyword::Apply)?;
                let item = self.parse_from_item()?;
                return Ok(Some(JoinClause::Apply {
                    apply_type: ApplyType::Outer,
                    item,
                }));
            }
            _ => return Ok(None),
        };
        self.expect_keyword(Keyword::Join)?;
        let item = self.parse_from_item()?;
        if !self.consume_keyword(Keyword::On) {
            return Err(SyntaxError::new(
                DiagnosticCode::MissingJoinCondition,
                self.span_from(start),
                "JOIN requires an ON condition",
            )
            .with_hint("use CROSS APPLY to combine sources without a condition"));
        }
        let on = self.parse_expr()?;
        Ok(Some(JoinClause::Join { join_type, item, on }))
    }

    // ---- expressions ----

    /// Parses an expression.
    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        let depth = self.depth;
        self.descend()?;
        let expr = self.parse_or()?;
        self.depth = depth;
        Ok(expr)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let depth = self.depth;
        let mut left = self.parse_and()?;
        while self.consume_keyword(Keyword::Or) {
            self.descend()?;
            let right = self.parse_and()?;
            left = Expr::binary(left, BinaryOp::Or, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let depth = self.depth;
        let mut left = self.parse_not()?;
        while self.consume_keyword(Keyword::And) {
            self.descend()?;
            let right = self.parse_not()?;
            left = Expr::binary(left, BinaryOp::And, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        if self.at_keyword(Keyword::Not) {
            let depth = self.depth;
            self.descend()?;
            let start = self.advance().span.start;
            let inner = self.parse_not()?;
            self.depth = depth;
            let span = Span::new(start, inner.span.end);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(inner),
                },
                span,
            ));
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> ParseResult<Expr> {
        let left = self.parse_additive()?;
        let start = left.span.start;

        let comparison = match self.peek().kind {
            TokenKind::Eq => Some(BinaryOp::Eq),
            TokenKind::NotEq => Some(BinaryOp::Ne),
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::LtEq => Some(BinaryOp::Le),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::GtEq => Some(BinaryOp::Ge),
            _ => None,
        };
        if let Some(op) = comparison {
            self.advance();
            let right = self.parse_additive()?;
            return Ok(Expr::binary(left, op, right));
        }

        let negated = self.at_keyword(Keyword::Not)
            && matches!(
                self.peek_nth(1).keyword(),
                Some(Keyword::Between | Keyword::Like | Keyword::Rlike | Keyword::In)
            );
        if negated {
            self.advance();
        }

        match self.peek_keyword() {
            Some(Keyword::Between) => {
                self.advance();
                let low = self.parse_additive()?;
                self.expect_keyword(Keyword::And)?;
                let high = self.parse_additive()?;
                Ok(Expr::new(
                    ExprKind::Between {
                        expr: Box::new(left),
                        low: Box::new(low),
                        high: Box::new(high),
                        negated,
                    },
                    self.span_from(start),
                ))
            }
            Some(Keyword::Like) => {
                self.advance();
                let op = if negated { BinaryOp::NotLike } else { BinaryOp::Like };
                let right = self.parse_additive()?;
                Ok(Expr::binary(left, op, right))
            }
            Some(Keyword::Rlike) => {
                self.advance();
                let op = if negated { BinaryOp::NotRlike } else { BinaryOp::Rlike };
                let right = self.parse_additive()?;
                Ok(Expr::binary(left, op, right))
            }
            Some(Keyword::Contains) if !negated => {
                self.advance();
                let right = self.parse_additive()?;
                Ok(Expr::binary(left, BinaryOp::Contains, right))
            }
            Some(Keyword::In) => {
                self.advance();
                let open = self.expect(TokenKind::LParen)?;
                if self.at_keyword(Keyword::Select) {
                    return Err(self.subquery_error(open));
                }
                let mut list = Vec::new();
                loop {
                    list.push(self.parse_expr()?);
                    if !self.consume(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen)?;
                Ok(Expr::new(
                    ExprKind::InList {
                        expr: Box::new(left),
                        list,
                        negated,
                    },
                    self.span_from(start),
                ))
            }
            Some(Keyword::Is) if !negated => {
                self.advance();
                let negated = self.consume_keyword(Keyword::Not);
                self.expect_keyword(Keyword::Null)?;
                Ok(Expr::new(
                    ExprKind::IsNull {
                        expr: Box::new(left),
                        negated,
                    },
                    self.span_from(start),
                ))
            }
            _ => Ok(left),
        }
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let depth = self.depth;
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.descend()?;
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::binary(left, op, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let depth = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.descend()?;
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::binary(left, op, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if !self.at(&TokenKind::Minus) {
            return self.parse_primary();
        }
        let start = self.advance().span.start;
        let literal = match self.peek().kind {
            TokenKind::Integer(v) => Some(integer_literal(-v)),
            TokenKind::Decimal(v) => Some(Literal::Decimal(-v)),
            _ => None,
        };
        if let Some(literal) = literal {
            self.advance();
            return Ok(Expr::new(ExprKind::Literal(literal), self.span_from(start)));
        }
        let depth = self.depth;
        self.descend()?;
        let inner = self.parse_unary()?;
        self.depth = depth;
        let span = Span::new(start, inner.span.end);
        Ok(Expr::new(
            ExprKind::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(inner),
            },
            span,
        ))
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        let literal = match &token.kind {
            TokenKind::Integer(v) => Some(integer_literal(*v)),
            TokenKind::Decimal(v) => Some(Literal::Decimal(*v)),
            TokenKind::String(s) => Some(Literal::String(s.clone())),
            TokenKind::Word {
                keyword: Some(Keyword::True),
                ..
            } => Some(Literal::Boolean(true)),
            TokenKind::Word {
                keyword: Some(Keyword::False),
                ..
            } => Some(Literal::Boolean(false)),
            TokenKind::Word {
                keyword: Some(Keyword::Null),
                ..
            } => Some(Literal::Null),
            _ => None,
        };
        if let Some(literal) = literal {
            self.advance();
            return Ok(Expr::new(ExprKind::Literal(literal), token.span));
        }

        match &token.kind {
            TokenKind::LParen => {
                self.advance();
                if self.at_keyword(Keyword::Select) {
                    return Err(self.subquery_error(token.span));
                }
                let mut inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                inner.span = self.span_from(token.span.start);
                Ok(inner)
            }
            TokenKind::Word {
                keyword: Some(Keyword::Case),
                ..
            } => self.parse_case(),
            TokenKind::Word { .. } if self.at_ident() => {
                let name = self.expect_ident()?;
                if self.at(&TokenKind::LParen) {
                    return self.parse_function(name);
                }
                if self.consume(&TokenKind::Dot) {
                    let column = self.expect_word()?;
                    let span = name.span.merge(column.span);
                    return Ok(Expr::new(
                        ExprKind::Column {
                            qualifier: Some(name),
                            name: column,
                        },
                        span,
                    ));
                }
                let span = name.span;
                Ok(Expr::new(ExprKind::Column { qualifier: None, name }, span))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_function(&mut self, name: Ident) -> ParseResult<Expr> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        let mut star = false;
        let distinct = self.consume_keyword(Keyword::Distinct);
        if !distinct && self.at(&TokenKind::Star) {
            self.advance();
            star = true;
        } else if !self.at(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let span = self.span_from(name.span.start);
        Ok(Expr::new(
            ExprKind::Function {
                name,
                args,
                star,
                distinct,
            },
            span,
        ))
    }

    fn parse_case(&mut self) -> ParseResult<Expr> {
        let start = self.expect_keyword(Keyword::Case)?.start;
        let mut branches = Vec::new();
        while self.consume_keyword(Keyword::When) {
            let condition = self.parse_expr()?;
            self.expect_keyword(Keyword::Then)?;
            let result = self.parse_expr()?;
            branches.push((condition, result));
        }
        if branches.is_empty() {
            return Err(self.unexpected("WHEN"));
        }
        let else_expr = if self.consume_keyword(Keyword::Else) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_keyword(Keyword::End)?;
        Ok(Expr::new(
            ExprKind::Case { branches, else_expr },
            self.span_from(start),
        ))
    }
}

fn integer_literal(v: i64) -> Literal {
    match i32::try_from(v) {
        Ok(small) => Literal::Int32(small),
        Err(_) => Literal::Int64(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select_of(text: &str) -> Select {
        match parse(text).unwrap().query.body {
            SetExpr::Select(select) => *select,
            other => panic!("expected select, got {:?}", other),
        }
    }

    fn error_of(text: &str) -> SyntaxError {
        parse(text).unwrap_err()
    }

    #[test]
    fn test_parse_simple_select() {
        let select = select_of("select e.Name, Count(*) as Total from #os.entities('/tmp') e where e.Size > 10");
        assert_eq!(select.items.len(), 2);
        match &select.from.source {
            FromSource::SchemaCall { schema, method, args } => {
                assert_eq!(schema.as_str(), "os");
                assert_eq!(method.as_str(), "entities");
                assert_eq!(args.len(), 1);
            }
            other => panic!("unexpected source {:?}", other),
        }
        assert_eq!(select.from.alias.as_ref().map(Ident::as_str), Some("e"));
        match &select.items[1] {
            SelectItem::Expr { expr, alias } => {
                assert!(matches!(expr.kind, ExprKind::Function { star: true, .. }));
                assert_eq!(alias.as_ref().map(Ident::as_str), Some("Total"));
            }
            other => panic!("unexpected item {:?}", other),
        }
        assert!(select.selection.is_some());
    }

    #[test]
    fn test_between_binds_tighter_than_and() {
        let select = select_of("select x from #a.b() where x between 1 and 5 and y > 1");
        let Some(Expr {
            kind: ExprKind::Binary { left, op, right },
            ..
        }) = select.selection
        else {
            panic!("expected AND");
        };
        assert_eq!(op, BinaryOp::And);
        assert!(matches!(left.kind, ExprKind::Between { negated: false, .. }));
        assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Gt, .. }));
    }

    #[test]
    fn test_negated_predicates() {
        let select = select_of(
            "select x from #a.b() where x not between 1 and 2 or x not in (3, 4) or s not like 'a%' or s is not null",
        );
        let mut found = Vec::new();
        let mut stack = vec![select.selection.unwrap()];
        while let Some(expr) = stack.pop() {
            match &expr.kind {
                ExprKind::Between { negated, .. } => found.push(("between", *negated)),
                ExprKind::InList { negated, .. } => found.push(("in", *negated)),
                ExprKind::IsNull { negated, .. } => found.push(("is null", *negated)),
                ExprKind::Binary { op: BinaryOp::NotLike, .. } => found.push(("like", true)),
                _ => {}
            }
            stack.extend(expr.children().into_iter().cloned());
        }
        assert_eq!(found.len(), 4);
        assert!(found.iter().all(|(_, negated)| *negated));
    }

    #[test]
    fn test_precedence_of_arithmetic() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        let ExprKind::Binary { op, right, .. } = expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
        assert_eq!(expr.span, Span::new(0, 9));
    }

    #[test]
    fn test_negative_literals_fold() {
        let expr = parse_expression("-5").unwrap();
        assert_eq!(expr.kind, ExprKind::Literal(Literal::Int32(-5)));
        let expr = parse_expression("3000000000").unwrap();
        assert_eq!(expr.kind, ExprKind::Literal(Literal::Int64(3_000_000_000)));
        let expr = parse_expression("-x").unwrap();
        assert!(matches!(expr.kind, ExprKind::Unary { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn test_joins_and_applies() {
        let select = select_of(
            "select a.x from #s.t() a inner join #s.u() b on a.x = b.x \
             left outer join c on c.y = a.x right join d on d.y = a.x \
             cross apply #s.v(a.x) v outer apply #s.w() w",
        );
        assert_eq!(select.joins.len(), 5);
        assert!(matches!(select.joins[0], JoinClause::Join { join_type: JoinType::Inner, .. }));
        assert!(matches!(select.joins[1], JoinClause::Join { join_type: JoinType::LeftOuter, .. }));
        assert!(matches!(select.joins[2], JoinClause::Join { join_type: JoinType::RightOuter, .. }));
        assert!(matches!(select.joins[3], JoinClause::Apply { apply_type: ApplyType::Cross, .. }));
        assert!(matches!(select.joins[4], JoinClause::Apply { apply_type: ApplyType::Outer, .. }));
    }

    #[test]
    fn test_schema_call_accepts_keyword_names() {
        let select = select_of("select x from #select.where() s");
        match select.from.source {
            FromSource::SchemaCall { schema, method, .. } => {
                assert_eq!(schema.as_str(), "select");
                assert_eq!(method.as_str(), "where");
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_unprefixed_schema_call_and_references() {
        let select = select_of("select x from os.files() join cte c on c.x = files.x");
        assert!(matches!(select.from.source, FromSource::SchemaCall { .. }));
        let JoinClause::Join { item, .. } = &select.joins[0] else {
            panic!("expected join");
        };
        assert!(matches!(item.source, FromSource::Reference { .. }));
        assert_eq!(item.alias.as_ref().map(Ident::as_str), Some("c"));
    }

    #[test]
    fn test_ctes_and_set_operations() {
        let script = parse(
            "with a as (select x from #s.t()), b as (select x from a) \
             select x from a union all (x) select x from b except () select x from b",
        )
        .unwrap();
        assert_eq!(script.query.ctes.len(), 2);
        let SetExpr::SetOperation { op, keys, left, .. } = script.query.body else {
            panic!("expected set operation");
        };
        assert_eq!(op, SetOperator::Except);
        assert!(keys.is_empty());
        assert!(matches!(*left, SetExpr::SetOperation { op: SetOperator::UnionAll, .. }));
    }

    #[test]
    fn test_clauses() {
        let select = select_of(
            "select distinct City, Count(Name) from #s.t() group by City having Count(Name) > 1 \
             order by City desc, 2 skip 1 take 10",
        );
        assert!(select.distinct);
        assert_eq!(select.group_by.len(), 1);
        assert!(select.having.is_some());
        assert_eq!(select.order_by[0].order, SortOrder::Desc);
        assert_eq!(select.order_by[1].order, SortOrder::Asc);
        assert_eq!(select.skip, Some(1));
        assert_eq!(select.take, Some(10));
    }

    #[test]
    fn test_wildcards() {
        let select = select_of("select *, a.* from #s.t() a");
        assert!(matches!(select.items[0], SelectItem::Wildcard(_)));
        assert!(matches!(&select.items[1], SelectItem::QualifiedWildcard(q) if q.as_str() == "a"));
    }

    #[test]
    fn test_definitions() {
        let script = parse(
            "table People { Name string, Age int };\
             couple #csv.file with table People as SourceOfPeople;\
             binary Header { select: int le, where: byte[4] at 2, data: string[Length] when Flag > 0 };\
             text Line { name: string until ',', rest: string };\
             select Name from SourceOfPeople('people.csv')",
        )
        .unwrap();
        assert_eq!(script.definitions.len(), 4);
        let Definition::Record(header) = &script.definitions[2] else {
            panic!("expected record");
        };
        assert_eq!(header.kind, RecordKind::Binary);
        assert_eq!(header.fields[0].name.as_str(), "select");
        assert_eq!(header.fields[0].endianness, Some(Endianness::Little));
        assert!(header.fields[1].length.is_some());
        assert!(header.fields[1].offset.is_some());
        assert!(header.fields[2].condition.is_some());
        let Definition::Record(line) = &script.definitions[3] else {
            panic!("expected record");
        };
        assert_eq!(line.fields[0].until.as_deref(), Some(","));
        assert!(matches!(script.query.body, SetExpr::Select(ref s) if matches!(s.from.source, FromSource::Coupled { .. })));
    }

    #[test]
    fn test_unknown_type_in_table_definition() {
        let err = error_of("table T { Name strang }; select Name from T()");
        assert_eq!(err.code(), DiagnosticCode::InvalidTypeName);
        assert_eq!(err.span(), Span::new(15, 21));
    }

    #[test]
    fn test_join_without_on() {
        let err = error_of("select a.x from #s.t() a inner join #s.u() b where a.x = 1");
        assert_eq!(err.code(), DiagnosticCode::MissingJoinCondition);
    }

    #[test]
    fn test_union_without_keys() {
        let err = error_of("select x from #s.t() union all select x from #s.u()");
        assert_eq!(err.code(), DiagnosticCode::SetOperatorMissingKeys);
        assert_eq!(err.span(), Span::new(21, 30));
    }

    #[test]
    fn test_unsupported_keywords() {
        let err = error_of("select x from #s.t() limit 5");
        assert_eq!(err.code(), DiagnosticCode::UnsupportedKeyword);
        assert!(err.diagnostic().message.contains("LIMIT"));
        assert_eq!(err.diagnostic().hint.as_deref(), Some("use TAKE n"));

        let err = error_of("select x from #s.t() order by x offset 5");
        assert_eq!(err.code(), DiagnosticCode::UnsupportedKeyword);

        let err = error_of("select top 5 x from #s.t()");
        assert_eq!(err.code(), DiagnosticCode::UnsupportedKeyword);

        let err = error_of("with c as (select x from #s.t() limit 1) select x from c");
        assert_eq!(err.code(), DiagnosticCode::UnsupportedKeyword);
    }

    #[test]
    fn test_subqueries_rejected() {
        let err = error_of("select x from #s.t() where x = (select y from #s.u())");
        assert_eq!(err.code(), DiagnosticCode::SubqueryNotSupported);
        let err = error_of("select x from #s.t() where x in (select y from #s.u())");
        assert_eq!(err.code(), DiagnosticCode::SubqueryNotSupported);
    }

    #[test]
    fn test_recursive_cte_rejected() {
        let err = error_of("with recursive c as (select x from #s.t()) select x from c");
        assert_eq!(err.code(), DiagnosticCode::RecursiveCte);
    }

    #[test]
    fn test_end_of_input() {
        let err = error_of("select x from");
        assert_eq!(err.code(), DiagnosticCode::UnexpectedEndOfInput);
        let err = error_of("select x from #s.t() where");
        assert_eq!(err.code(), DiagnosticCode::UnexpectedEndOfInput);
    }

    #[test]
    fn test_trailing_tokens() {
        let err = error_of("select x from #s.t() t u");
        assert_eq!(err.code(), DiagnosticCode::UnexpectedToken);
        assert_eq!(err.span(), Span::new(23, 24));
    }

    #[test]
    fn test_record_name_may_be_keyword() {
        let script = parse("binary Select { where: int };select x from #s.t()").unwrap();
        let Definition::Record(record) = &script.definitions[0] else {
            panic!("expected record");
        };
        assert_eq!(record.name.as_str(), "Select");
    }

    #[test]
    fn test_deep_parentheses_rejected() {
        let depth = 100_000;
        let text = format!("select {}1{} from #s.t()", "(".repeat(depth), ")".repeat(depth));
        let err = error_of(&text);
        assert_eq!(err.code(), DiagnosticCode::NestingTooDeep);

        // Reasonable nesting still parses
        let text = format!("select {}1{} from #s.t()", "(".repeat(50), ")".repeat(50));
        assert!(parse(&text).is_ok());
    }

    #[test]
    fn test_deep_not_and_negation_rejected() {
        let err = error_of(&format!("select x from #s.t() where {}true", "not ".repeat(100_000)));
        assert_eq!(err.code(), DiagnosticCode::NestingTooDeep);

        let err = error_of(&format!("select {}1 from #s.t()", "-(".repeat(100_000)));
        assert_eq!(err.code(), DiagnosticCode::NestingTooDeep);
    }

    #[test]
    fn test_long_operator_chain_rejected() {
        let chain = vec!["x = 1"; 10_000].join(" or ");
        let err = error_of(&format!("select x from #s.t() where {}", chain));
        assert_eq!(err.code(), DiagnosticCode::NestingTooDeep);

        let chain = vec!["x"; 10_000].join(" + ");
        assert_eq!(error_of(&format!("select {} from #s.t()", chain)).code(), DiagnosticCode::NestingTooDeep);

        let chain = vec!["x = 1"; 20].join(" or ");
        assert!(parse(&format!("select x from #s.t() where {}", chain)).is_ok());
    }
}
