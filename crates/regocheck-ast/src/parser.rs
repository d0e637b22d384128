//! Recursive-descent parser: tokens -> [`Module`].
//!
//! Newlines are significant only where they separate body literals (and rules). Inside
//! parentheses, brackets and collection literals they are ignored.

use crate::annotations::{self, AnnotationScope};
use crate::ast::{
    Expr, Import, Literal, Module, Package, Ref, RefSegment, Rule, RuleHead, Term, Value,
    WithModifier,
};
use crate::builtins;
use crate::capabilities::{Capabilities, FEATURE_REGO_V1_IMPORT, FUTURE_KEYWORDS};
use crate::error::{Error, ErrorDetails, Errors};
use crate::lexer::{self, Cursor, Token, TokenKind};
use crate::version::RegoVersion;
use regocheck_types::Location;

const BASE_KEYWORDS: [&str; 11] = [
    "package", "import", "default", "not", "some", "with", "as", "else", "true", "false", "null",
];

#[derive(Clone, Debug)]
pub struct ParserOptions<'a> {
    pub rego_version: RegoVersion,
    /// Restricts which future keywords and features may be imported.
    pub capabilities: Option<&'a Capabilities>,
    pub process_annotations: bool,
}

impl Default for ParserOptions<'_> {
    fn default() -> Self {
        Self {
            rego_version: RegoVersion::DEFAULT,
            capabilities: None,
            process_annotations: true,
        }
    }
}

/// Parse one source file. The first syntax error aborts parsing.
pub fn parse_module(file: &str, source: &str, opts: &ParserOptions<'_>) -> Result<Module, Errors> {
    let mut parser = Parser::new(file, source, opts)?;
    let mut module = parser.module().map_err(Errors::from)?;

    if opts.process_annotations {
        attach_annotations(&mut module, &parser.comments).map_err(Errors::from)?;
    }
    Ok(module)
}

fn attach_annotations(
    module: &mut Module,
    comments: &[annotations::Comment],
) -> Result<(), Error> {
    for block in annotations::metadata_blocks(&module.file, comments) {
        let target_row = block.end_row + 1;
        let parse = |scope| {
            annotations::parse_block(&block, scope)
                .map_err(|msg| Error::parse(block.start.clone(), format!("invalid metadata: {msg}")))
        };
        if module.package.location.row == target_row {
            module.annotations = Some(parse(AnnotationScope::Package)?);
        } else if let Some(rule) = module
            .rules
            .iter_mut()
            .find(|r| r.location.row == target_row)
        {
            rule.annotations = Some(parse(AnnotationScope::Rule)?);
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Default)]
struct Keywords {
    if_: bool,
    contains: bool,
    in_: bool,
    every: bool,
}

impl Keywords {
    fn all() -> Self {
        Keywords {
            if_: true,
            contains: true,
            in_: true,
            every: true,
        }
    }

    fn enable(&mut self, kw: &str) {
        match kw {
            "if" => self.if_ = true,
            "contains" => self.contains = true,
            "in" => self.in_ = true,
            "every" => self.every = true,
            _ => {}
        }
    }

    fn is_enabled(&self, kw: &str) -> bool {
        match kw {
            "if" => self.if_,
            "contains" => self.contains,
            "in" => self.in_,
            "every" => self.every,
            _ => false,
        }
    }
}

/// Parsing context for the innermost enclosing construct.
#[derive(Clone, Copy, Debug)]
struct Ctx {
    /// A line break ends the current expression.
    newline: bool,
    /// `|` may be read as set union (false at the head of a collection literal).
    pipe: bool,
}

type PResult<T> = Result<T, Error>;

struct Parser<'s> {
    file: String,
    source: &'s str,
    tokens: Vec<Token>,
    comments: Vec<annotations::Comment>,
    pos: usize,
    version: RegoVersion,
    capabilities: Option<&'s Capabilities>,
    keywords: Keywords,
    ctx: Vec<Ctx>,
}

impl<'s> Parser<'s> {
    fn new(file: &str, source: &'s str, opts: &ParserOptions<'s>) -> Result<Self, Errors> {
        let lexed = lexer::tokenize(source).map_err(|e| {
            Errors::from(
                Error::parse(Location::new(file, e.row, e.col), e.message).with_details(
                    ErrorDetails {
                        line: Cursor::line_text(source, e.row).to_string(),
                        idx: e.col.saturating_sub(1) as usize,
                    },
                ),
            )
        })?;
        let keywords = if opts.rego_version.keywords_reserved() {
            Keywords::all()
        } else {
            Keywords::default()
        };
        Ok(Self {
            file: file.to_string(),
            source,
            tokens: lexed.tokens,
            comments: lexed.comments,
            pos: 0,
            version: opts.rego_version,
            capabilities: opts.capabilities,
            keywords,
            ctx: vec![Ctx {
                newline: true,
                pipe: true,
            }],
        })
    }

    // =========================================
    // Token helpers
    // =========================================

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn at_ident(&self, text: &str) -> bool {
        self.peek().is_ident(text)
    }

    /// The next token sits on a new line and line breaks are significant here.
    fn newline_ends(&self) -> bool {
        self.ctx.last().is_some_and(|c| c.newline) && self.peek().newline_before
    }

    fn pipe_allowed(&self) -> bool {
        self.ctx.last().is_none_or(|c| c.pipe)
    }

    fn with_ctx<T>(
        &mut self,
        newline: bool,
        pipe: bool,
        f: impl FnOnce(&mut Self) -> PResult<T>,
    ) -> PResult<T> {
        self.ctx.push(Ctx { newline, pipe });
        let out = f(self);
        self.ctx.pop();
        out
    }

    fn loc(&self, tok: &Token) -> Location {
        Location::new(self.file.as_str(), tok.row, tok.col)
    }

    fn error_at(&self, tok: &Token, message: impl Into<String>) -> Error {
        Error::parse(self.loc(tok), message).with_details(ErrorDetails {
            line: Cursor::line_text(self.source, tok.row).to_string(),
            idx: tok.col.saturating_sub(1) as usize,
        })
    }

    fn unexpected(&self, expected: &str) -> Error {
        let tok = self.peek();
        self.error_at(tok, format!("unexpected {}: expected {expected}", tok.describe()))
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    fn is_reserved(&self, text: &str) -> bool {
        BASE_KEYWORDS.contains(&text) || self.keywords.is_enabled(text)
    }

    /// An identifier usable as a name (rule, variable, alias).
    fn expect_name(&mut self) -> PResult<Token> {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Ident {
            return Err(self.unexpected("identifier"));
        }
        if self.is_reserved(&tok.text) {
            return Err(self.error_at(&tok, format!("unexpected {} keyword", tok.text)));
        }
        Ok(self.advance())
    }

    // =========================================
    // Module structure
    // =========================================

    fn module(&mut self) -> PResult<Module> {
        if !self.at_ident("package") {
            return Err(self.unexpected("package"));
        }
        let pkg_tok = self.advance();
        let path = self.dotted_path()?;
        let package = Package {
            path,
            location: self.loc(&pkg_tok),
        };
        self.expect_statement_end()?;

        let mut imports = Vec::new();
        while self.at_ident("import") {
            let imp = self.import()?;
            self.expect_statement_end()?;
            imports.push(imp);
        }

        let mut rules = Vec::new();
        while !self.at(TokenKind::Eof) {
            rules.push(self.rule()?);
            self.expect_statement_end()?;
        }

        Ok(Module {
            file: self.file.clone(),
            package,
            imports,
            rules,
            annotations: None,
            rego_version: self.version,
        })
    }

    fn expect_statement_end(&self) -> PResult<()> {
        if self.at(TokenKind::Eof) || self.peek().newline_before {
            Ok(())
        } else {
            Err(self.unexpected("new line"))
        }
    }

    /// `a.b["c"]` as plain segments.
    fn dotted_path(&mut self) -> PResult<Vec<String>> {
        let first = self.peek().clone();
        if first.kind != TokenKind::Ident {
            return Err(self.unexpected("identifier"));
        }
        self.advance();
        let mut path = vec![first.text];
        loop {
            if self.at(TokenKind::Dot) && !self.peek().space_before {
                self.advance();
                let seg = self.peek().clone();
                if seg.kind != TokenKind::Ident {
                    return Err(self.unexpected("identifier"));
                }
                self.advance();
                path.push(seg.text);
            } else if self.at(TokenKind::LBracket) && !self.peek().space_before {
                self.advance();
                let seg = self.expect(TokenKind::String)?;
                self.expect(TokenKind::RBracket)?;
                path.push(seg.text);
            } else {
                return Ok(path);
            }
        }
    }

    fn import(&mut self) -> PResult<Import> {
        let import_tok = self.advance();
        let path_tok = self.peek().clone();
        let path = self.dotted_path()?;
        let root = path[0].as_str();
        if !matches!(root, "input" | "data" | "future" | "rego") {
            return Err(self.error_at(
                &path_tok,
                format!("invalid import path {}: path must begin with input or data", path.join(".")),
            ));
        }

        let alias = if self.at_ident("as") {
            self.advance();
            Some(self.expect_name()?.text)
        } else {
            None
        };

        let imp = Import {
            path,
            alias,
            location: self.loc(&import_tok),
        };
        if imp.is_keyword_import() {
            self.keyword_import(&imp, &path_tok)?;
        }
        Ok(imp)
    }

    fn keyword_import(&mut self, imp: &Import, tok: &Token) -> PResult<()> {
        if imp.alias.is_some() {
            return Err(self.error_at(tok, format!("{} imports cannot be aliased", imp.path[0])));
        }
        let segs: Vec<&str> = imp.path.iter().map(String::as_str).collect();
        match segs.as_slice() {
            ["rego", "v1"] => {
                let supported = self.version == RegoVersion::V1
                    || self
                        .capabilities
                        .is_none_or(|c| c.has_feature(FEATURE_REGO_V1_IMPORT));
                if !supported {
                    return Err(self.error_at(
                        tok,
                        "invalid import, `rego.v1` is not supported by current capabilities",
                    ));
                }
                self.keywords = Keywords::all();
            }
            ["future", "keywords"] => {
                for kw in FUTURE_KEYWORDS {
                    if self.capabilities.is_none_or(|c| c.allows_future_keyword(kw)) {
                        self.keywords.enable(kw);
                    }
                }
            }
            ["future", "keywords", kw] => {
                let allowed = FUTURE_KEYWORDS.contains(kw)
                    && self.capabilities.is_none_or(|c| c.allows_future_keyword(kw));
                if !allowed {
                    return Err(self.error_at(
                        tok,
                        format!(
                            "unexpected keyword, must be one of [{}]",
                            FUTURE_KEYWORDS.join(" ")
                        ),
                    ));
                }
                self.keywords.enable(kw);
            }
            _ => {
                return Err(self.error_at(
                    tok,
                    format!("invalid import {}", imp.path_string()),
                ));
            }
        }
        Ok(())
    }

    // =========================================
    // Rules
    // =========================================

    fn rule(&mut self) -> PResult<Rule> {
        let start = self.peek().clone();
        let default = if self.at_ident("default") {
            self.advance();
            true
        } else {
            false
        };

        let name_tok = self.expect_name()?;
        let name = self.rule_name(name_tok.text.clone())?;
        let mut head = RuleHead {
            name,
            args: None,
            key: None,
            value: None,
            assign: false,
            contains: false,
            location: self.loc(&name_tok),
        };

        if self.at(TokenKind::LParen) && !self.peek().space_before {
            self.advance();
            let args = self.with_ctx(false, true, |p| p.term_list(TokenKind::RParen))?;
            head.args = Some(args);
        } else if self.at(TokenKind::LBracket) && !self.peek().space_before {
            self.advance();
            let key = self.with_ctx(false, true, |p| p.expr_term())?;
            self.expect(TokenKind::RBracket)?;
            head.key = Some(key);
        }

        if self.keywords.contains && self.at_ident("contains") {
            let tok = self.advance();
            if head.args.is_some() || head.key.is_some() {
                return Err(self.error_at(&tok, "unexpected contains keyword"));
            }
            head.key = Some(self.expr_term()?);
            head.contains = true;
        }

        if self.at(TokenKind::Assign) || self.at(TokenKind::Unify) {
            head.assign = self.advance().kind == TokenKind::Assign;
            head.value = Some(self.expr_term()?);
        }

        if default {
            if head.value.is_none() {
                return Err(self.error_at(&start, "default rule must have a value"));
            }
            if self.at(TokenKind::LBrace) || (self.keywords.if_ && self.at_ident("if")) {
                return Err(self.unexpected("new line (default rules cannot have a body)"));
            }
        }

        let body_tok = self.peek().clone();
        let (body, uses_if) = self.rule_body()?;

        if !default && head.value.is_none() && head.key.is_none() && body.is_empty() {
            return Err(self.error_at(&start, "rule must have value assignment and/or body"));
        }
        self.check_v1_rule(&head, &body, uses_if, &body_tok)?;

        let mut else_rules = Vec::new();
        while self.at_ident("else") {
            let else_tok = self.advance();
            let mut else_head = head.clone();
            else_head.location = self.loc(&else_tok);
            else_head.value = None;
            if self.at(TokenKind::Assign) || self.at(TokenKind::Unify) {
                else_head.assign = self.advance().kind == TokenKind::Assign;
                else_head.value = Some(self.expr_term()?);
            }
            let else_body_tok = self.peek().clone();
            let (else_body, else_if) = self.rule_body()?;
            if else_head.value.is_none() && else_body.is_empty() {
                return Err(self.error_at(&else_tok, "else clause must have a value and/or body"));
            }
            self.check_v1_rule(&else_head, &else_body, else_if, &else_body_tok)?;
            else_rules.push(Rule {
                default: false,
                head: else_head,
                body: else_body,
                uses_if: else_if,
                else_rule: None,
                annotations: None,
                location: self.loc(&else_tok),
            });
        }
        if !else_rules.is_empty() && body.is_empty() {
            return Err(self.error_at(&start, "else keyword cannot be used on rules without a body"));
        }

        let else_rule = else_rules.into_iter().rev().fold(None, |next, mut r: Rule| {
            r.else_rule = next;
            Some(Box::new(r))
        });

        Ok(Rule {
            default,
            head,
            body,
            uses_if,
            else_rule,
            annotations: None,
            location: self.loc(&start),
        })
    }

    /// Extend a rule name with `.field` segments: `a.b.c := 1`.
    fn rule_name(&mut self, mut name: String) -> PResult<String> {
        while self.at(TokenKind::Dot) && !self.peek().space_before {
            self.advance();
            let seg = self.peek().clone();
            if seg.kind != TokenKind::Ident {
                return Err(self.unexpected("identifier"));
            }
            self.advance();
            name.push('.');
            name.push_str(&seg.text);
        }
        Ok(name)
    }

    fn rule_body(&mut self) -> PResult<(Vec<Literal>, bool)> {
        if self.keywords.if_ && self.at_ident("if") {
            self.advance();
            if self.at(TokenKind::LBrace) {
                return Ok((self.query_block()?, true));
            }
            let lit = self.literal()?;
            return Ok((vec![lit], true));
        }
        if self.at(TokenKind::LBrace) {
            return Ok((self.query_block()?, false));
        }
        Ok((Vec::new(), false))
    }

    fn check_v1_rule(
        &self,
        head: &RuleHead,
        body: &[Literal],
        uses_if: bool,
        body_tok: &Token,
    ) -> PResult<()> {
        if !self.version.enforces_v1() {
            return Ok(());
        }
        if !body.is_empty() && !uses_if {
            return Err(self.error_at(body_tok, "`if` keyword is required before rule body"));
        }
        if head.key.is_some() && head.value.is_none() && !head.contains && head.args.is_none() {
            return Err(Error::parse(
                head.location.clone(),
                "`contains` keyword is required for partial set rules",
            ));
        }
        Ok(())
    }

    // =========================================
    // Bodies and literals
    // =========================================

    fn query_block(&mut self) -> PResult<Vec<Literal>> {
        let open = self.expect(TokenKind::LBrace)?;
        let body = self.with_ctx(true, true, |p| p.query(TokenKind::RBrace))?;
        self.expect(TokenKind::RBrace)?;
        if body.is_empty() {
            return Err(self.error_at(&open, "found empty body"));
        }
        Ok(body)
    }

    fn query(&mut self, close: TokenKind) -> PResult<Vec<Literal>> {
        let mut literals = Vec::new();
        loop {
            if self.at(close) {
                return Ok(literals);
            }
            literals.push(self.literal()?);
            if self.at(TokenKind::Semicolon) {
                self.advance();
                continue;
            }
            if self.at(close) || self.peek().newline_before {
                continue;
            }
            return Err(self.unexpected(&format!("\\n or ; or {close}")));
        }
    }

    fn literal(&mut self) -> PResult<Literal> {
        let start = self.peek().clone();
        if self.at_ident("some") {
            return self.some_decl();
        }
        if self.keywords.every && self.at_ident("every") {
            return self.every();
        }

        let negated = if self.at_ident("not") {
            self.advance();
            true
        } else {
            false
        };

        let lhs = self.expr_term()?;
        let expr = if self.at(TokenKind::Assign) && !self.newline_ends() {
            self.advance();
            Expr::Assign {
                lhs,
                rhs: self.expr_term()?,
            }
        } else if self.at(TokenKind::Unify) && !self.newline_ends() {
            self.advance();
            Expr::Unify {
                lhs,
                rhs: self.expr_term()?,
            }
        } else {
            Expr::Term(lhs)
        };

        let mut with = Vec::new();
        while self.at_ident("with") && !self.newline_ends() {
            self.advance();
            let target = self.postfix()?;
            if !self.at_ident("as") {
                return Err(self.unexpected("as"));
            }
            self.advance();
            let value = self.expr_term()?;
            with.push(WithModifier { target, value });
        }

        Ok(Literal {
            negated,
            expr,
            with,
            location: self.loc(&start),
        })
    }

    /// Comma-separated terms up to (not including) an `in` keyword.
    fn binding_terms(&mut self) -> PResult<Vec<Term>> {
        let mut terms = vec![self.relational()?];
        while self.at(TokenKind::Comma) {
            self.advance();
            terms.push(self.relational()?);
        }
        Ok(terms)
    }

    fn split_key_value(&self, mut terms: Vec<Term>, tok: &Token) -> PResult<(Option<Term>, Term)> {
        match terms.len() {
            1 => Ok((None, terms.remove(0))),
            2 => {
                let value = terms.remove(1);
                Ok((Some(terms.remove(0)), value))
            }
            _ => Err(self.error_at(tok, "unexpected term count: expected value or key, value")),
        }
    }

    fn some_decl(&mut self) -> PResult<Literal> {
        let some_tok = self.advance();
        let terms = self.binding_terms()?;

        let expr = if self.keywords.in_ && self.at_ident("in") {
            self.advance();
            let collection = self.relational()?;
            let (key, value) = self.split_key_value(terms, &some_tok)?;
            Expr::SomeIn {
                key,
                value,
                collection,
            }
        } else {
            let mut vars = Vec::new();
            for t in terms {
                match t.as_var() {
                    Some(name) => vars.push((name.to_string(), t.location.clone())),
                    None => {
                        return Err(Error::parse(t.location, "expected var in some declaration"));
                    }
                }
            }
            Expr::SomeDecl { vars }
        };

        Ok(Literal {
            negated: false,
            expr,
            with: Vec::new(),
            location: self.loc(&some_tok),
        })
    }

    fn every(&mut self) -> PResult<Literal> {
        let every_tok = self.advance();
        let terms = self.binding_terms()?;
        if !self.at_ident("in") {
            return Err(self.unexpected("in"));
        }
        self.advance();
        let domain = self.relational()?;
        let (key, value) = self.split_key_value(terms, &every_tok)?;
        let body = self.query_block()?;
        Ok(Literal {
            negated: false,
            expr: Expr::Every {
                key,
                value,
                domain,
                body,
            },
            with: Vec::new(),
            location: self.loc(&every_tok),
        })
    }

    // =========================================
    // Expressions (lowest to highest precedence)
    // =========================================

    fn expr_term(&mut self) -> PResult<Term> {
        let mut lhs = self.relational()?;
        while self.keywords.in_ && self.at_ident("in") && !self.newline_ends() {
            self.advance();
            let rhs = self.relational()?;
            lhs = call(builtins::MEMBER, lhs, rhs);
        }
        Ok(lhs)
    }

    fn relational(&mut self) -> PResult<Term> {
        let mut lhs = self.union()?;
        loop {
            let func = match self.peek().kind {
                TokenKind::Eq => builtins::EQUAL,
                TokenKind::Neq => builtins::NEQ,
                TokenKind::Lt => builtins::LT,
                TokenKind::Lte => builtins::LTE,
                TokenKind::Gt => builtins::GT,
                TokenKind::Gte => builtins::GTE,
                _ => return Ok(lhs),
            };
            if self.newline_ends() {
                return Ok(lhs);
            }
            self.advance();
            let rhs = self.union()?;
            lhs = call(func, lhs, rhs);
        }
    }

    fn union(&mut self) -> PResult<Term> {
        let mut lhs = self.intersection()?;
        while self.at(TokenKind::Pipe) && self.pipe_allowed() && !self.newline_ends() {
            self.advance();
            let rhs = self.intersection()?;
            lhs = call(builtins::OR, lhs, rhs);
        }
        Ok(lhs)
    }

    fn intersection(&mut self) -> PResult<Term> {
        let mut lhs = self.additive()?;
        while self.at(TokenKind::Amp) && !self.newline_ends() {
            self.advance();
            let rhs = self.additive()?;
            lhs = call(builtins::AND, lhs, rhs);
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> PResult<Term> {
        let mut lhs = self.multiplicative()?;
        loop {
            let func = match self.peek().kind {
                TokenKind::Plus => builtins::PLUS,
                TokenKind::Minus => builtins::MINUS,
                _ => return Ok(lhs),
            };
            if self.newline_ends() {
                return Ok(lhs);
            }
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = call(func, lhs, rhs);
        }
    }

    fn multiplicative(&mut self) -> PResult<Term> {
        let mut lhs = self.unary()?;
        loop {
            let func = match self.peek().kind {
                TokenKind::Star => builtins::MUL,
                TokenKind::Slash => builtins::DIV,
                TokenKind::Percent => builtins::REM,
                _ => return Ok(lhs),
            };
            if self.newline_ends() {
                return Ok(lhs);
            }
            self.advance();
            let rhs = self.unary()?;
            lhs = call(func, lhs, rhs);
        }
    }

    fn unary(&mut self) -> PResult<Term> {
        if self.at(TokenKind::Minus) {
            let minus = self.advance();
            if self.at(TokenKind::Number) && !self.peek().space_before {
                let num = self.advance();
                return Ok(Term::new(
                    Value::Number(format!("-{}", num.text)),
                    self.loc(&minus),
                ));
            }
            return Err(self.unexpected("number"));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> PResult<Term> {
        let tok = self.peek().clone();
        let location = self.loc(&tok);
        match tok.kind {
            TokenKind::Number => {
                self.advance();
                Ok(Term::new(Value::Number(tok.text), location))
            }
            TokenKind::String => {
                self.advance();
                Ok(Term::new(Value::String(tok.text), location))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.with_ctx(false, true, |p| p.expr_term())?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => self.array(),
            TokenKind::LBrace => self.object_or_set(),
            TokenKind::Ident => match tok.text.as_str() {
                "true" | "false" => {
                    self.advance();
                    Ok(Term::new(Value::Bool(tok.text == "true"), location))
                }
                "null" => {
                    self.advance();
                    Ok(Term::new(Value::Null, location))
                }
                text if self.is_reserved(text) => {
                    Err(self.error_at(&tok, format!("unexpected {text} keyword")))
                }
                _ => self.ref_or_call(),
            },
            _ => Err(self.unexpected("term")),
        }
    }

    fn ref_or_call(&mut self) -> PResult<Term> {
        let root_tok = self.advance();
        let location = self.loc(&root_tok);
        let mut path = Vec::new();
        loop {
            if self.at(TokenKind::Dot) && !self.peek().space_before {
                self.advance();
                let field = self.peek().clone();
                if field.kind != TokenKind::Ident {
                    return Err(self.unexpected("identifier"));
                }
                self.advance();
                path.push(RefSegment::Field(field.text));
            } else if self.at(TokenKind::LBracket) && !self.peek().space_before {
                self.advance();
                let index = self.with_ctx(false, true, |p| p.expr_term())?;
                self.expect(TokenKind::RBracket)?;
                path.push(RefSegment::Index(index));
            } else if self.at(TokenKind::LParen) && !self.peek().space_before {
                let paren = self.advance();
                let mut func = root_tok.text.clone();
                for seg in &path {
                    match seg {
                        RefSegment::Field(name) => {
                            func.push('.');
                            func.push_str(name);
                        }
                        RefSegment::Index(_) => {
                            return Err(self.error_at(&paren, "unexpected ( token: function names must be static"));
                        }
                    }
                }
                let args = self.with_ctx(false, true, |p| p.term_list(TokenKind::RParen))?;
                let call = if func == "set" && args.is_empty() {
                    Term::new(Value::Set(Vec::new()), location.clone())
                } else {
                    Term::new(Value::Call { func, args }, location.clone())
                };
                let path = self.ref_segments()?;
                if path.is_empty() {
                    return Ok(call);
                }
                return Ok(Term::new(
                    Value::CallRef {
                        call: Box::new(call),
                        path,
                    },
                    location,
                ));
            } else {
                break;
            }
        }

        let value = if path.is_empty() {
            Value::Var(root_tok.text)
        } else {
            Value::Ref(Ref {
                root: root_tok.text,
                path,
            })
        };
        Ok(Term::new(value, location))
    }

    /// `.field` and `[index]` segments directly following a term: `split(s, ".")[0]`.
    fn ref_segments(&mut self) -> PResult<Vec<RefSegment>> {
        let mut path = Vec::new();
        loop {
            if self.at(TokenKind::Dot) && !self.peek().space_before {
                self.advance();
                let field = self.peek().clone();
                if field.kind != TokenKind::Ident {
                    return Err(self.unexpected("identifier"));
                }
                self.advance();
                path.push(RefSegment::Field(field.text));
            } else if self.at(TokenKind::LBracket) && !self.peek().space_before {
                self.advance();
                let index = self.with_ctx(false, true, |p| p.expr_term())?;
                self.expect(TokenKind::RBracket)?;
                path.push(RefSegment::Index(index));
            } else {
                return Ok(path);
            }
        }
    }

    /// Terms separated by commas, then the closing token (consumed). Trailing comma allowed.
    fn term_list(&mut self, close: TokenKind) -> PResult<Vec<Term>> {
        let mut out = Vec::new();
        while !self.at(close) {
            out.push(self.expr_term()?);
            if self.at(TokenKind::Comma) {
                self.advance();
            } else if !self.at(close) {
                return Err(self.unexpected(&format!(", or {close}")));
            }
        }
        self.advance();
        Ok(out)
    }

    fn collection_elem(&mut self) -> PResult<Term> {
        self.with_ctx(false, false, |p| p.expr_term())
    }

    fn compr_body(&mut self, close: TokenKind) -> PResult<Vec<Literal>> {
        let bar = self.advance();
        let body = self.with_ctx(true, true, |p| p.query(close))?;
        self.expect(close)?;
        if body.is_empty() {
            return Err(self.error_at(&bar, "found empty body"));
        }
        Ok(body)
    }

    fn array(&mut self) -> PResult<Term> {
        let open = self.advance();
        let location = self.loc(&open);
        if self.at(TokenKind::RBracket) {
            self.advance();
            return Ok(Term::new(Value::Array(Vec::new()), location));
        }
        let first = self.collection_elem()?;
        if self.at(TokenKind::Pipe) {
            let body = self.compr_body(TokenKind::RBracket)?;
            return Ok(Term::new(
                Value::ArrayCompr {
                    head: Box::new(first),
                    body,
                },
                location,
            ));
        }
        let mut items = vec![first];
        while self.at(TokenKind::Comma) {
            self.advance();
            if self.at(TokenKind::RBracket) {
                break;
            }
            items.push(self.collection_elem()?);
        }
        self.expect(TokenKind::RBracket)?;
        Ok(Term::new(Value::Array(items), location))
    }

    fn object_or_set(&mut self) -> PResult<Term> {
        let open = self.advance();
        let location = self.loc(&open);
        if self.at(TokenKind::RBrace) {
            self.advance();
            return Ok(Term::new(Value::Object(Vec::new()), location));
        }

        let first = self.collection_elem()?;
        if self.at(TokenKind::Colon) {
            self.advance();
            let value = self.collection_elem()?;
            if self.at(TokenKind::Pipe) {
                let body = self.compr_body(TokenKind::RBrace)?;
                return Ok(Term::new(
                    Value::ObjectCompr {
                        key: Box::new(first),
                        value: Box::new(value),
                        body,
                    },
                    location,
                ));
            }
            let mut pairs = vec![(first, value)];
            while self.at(TokenKind::Comma) {
                self.advance();
                if self.at(TokenKind::RBrace) {
                    break;
                }
                let k = self.collection_elem()?;
                self.expect(TokenKind::Colon)?;
                let v = self.collection_elem()?;
                pairs.push((k, v));
            }
            self.expect(TokenKind::RBrace)?;
            return Ok(Term::new(Value::Object(pairs), location));
        }

        if self.at(TokenKind::Pipe) {
            let body = self.compr_body(TokenKind::RBrace)?;
            return Ok(Term::new(
                Value::SetCompr {
                    head: Box::new(first),
                    body,
                },
                location,
            ));
        }
        let mut items = vec![first];
        while self.at(TokenKind::Comma) {
            self.advance();
            if self.at(TokenKind::RBrace) {
                break;
            }
            items.push(self.collection_elem()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Term::new(Value::Set(items), location))
    }
}

fn call(func: &str, lhs: Term, rhs: Term) -> Term {
    let location = lhs.location.clone();
    Term::new(
        Value::Call {
            func: func.to_string(),
            args: vec![lhs, rhs],
        },
        location,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RuleKind;
    use proptest::prelude::*;

    fn parse(src: &str, version: RegoVersion) -> Result<Module, Errors> {
        let opts = ParserOptions {
            rego_version: version,
            ..ParserOptions::default()
        };
        parse_module("test.rego", src, &opts)
    }

    fn parse_v1(src: &str) -> Module {
        parse(src, RegoVersion::V1).expect("parse")
    }

    fn first_error(src: &str, version: RegoVersion) -> String {
        let errs = parse(src, version).err().expect("expected parse error");
        errs.iter().next().expect("one error").message.clone()
    }

    #[test]
    fn package_imports_and_rules() {
        let m = parse_v1(
            r#"package authz.users

import data.lib.roles
import input.user as u

default allow := false

allow if {
    some r in roles.granted[u.name]
    r == "admin"
}

names contains n if {
    n := input.users[_].name
}

double(x) := y if y := x * 2
"#,
        );
        assert_eq!(m.name(), "data.authz.users");
        assert_eq!(m.imports.len(), 2);
        assert_eq!(m.imports[1].name(), Some("u"));
        let kinds: Vec<RuleKind> = m.rules.iter().map(Rule::kind).collect();
        assert_eq!(
            kinds,
            vec![
                RuleKind::Complete,
                RuleKind::Complete,
                RuleKind::MultiValue,
                RuleKind::Function(1)
            ]
        );
        assert!(m.rules[0].default);
        assert_eq!(m.rules[1].body.len(), 2);
        assert!(m.rules[1].uses_if);
        assert_eq!(m.rules[3].body.len(), 1);
    }

    #[test]
    fn v1_requires_if_before_body() {
        let msg = first_error("package a\n\np {\n  true\n}\n", RegoVersion::V1);
        assert_eq!(msg, "`if` keyword is required before rule body");
    }

    #[test]
    fn v0_accepts_legacy_rules() {
        let m = parse("package a\n\np[x] {\n  x := input.xs[_]\n}\n", RegoVersion::V0)
            .expect("parse");
        assert_eq!(m.rules[0].kind(), RuleKind::MultiValue);
        assert!(!m.rules[0].uses_if);
    }

    #[test]
    fn v0_treats_future_keywords_as_identifiers_without_import() {
        let m = parse("package a\n\nq := contains\ncontains := 1\n", RegoVersion::V0)
            .expect("parse");
        assert_eq!(m.rules.len(), 2);
    }

    #[test]
    fn compat_mode_needs_imported_keywords_and_if() {
        let msg = first_error("package a\n\np {\n  true\n}\n", RegoVersion::V0CompatV1);
        assert_eq!(msg, "`if` keyword is required before rule body");

        parse(
            "package a\n\nimport rego.v1\n\np if {\n  true\n}\n",
            RegoVersion::V0CompatV1,
        )
        .expect("rego.v1 import enables keywords");
    }

    #[test]
    fn v1_requires_contains_for_partial_sets() {
        let msg = first_error("package a\n\np[x] if {\n  x := 1\n}\n", RegoVersion::V1);
        assert_eq!(msg, "`contains` keyword is required for partial set rules");
    }

    #[test]
    fn comprehensions_and_collections() {
        let m = parse_v1(
            r#"package a

evens := [x | some x in input.xs; x % 2 == 0]
ids := {id | id := input.items[_].id}
by_id := {k: v | some k, v in input.m}
obj := {"a": 1, "b": [1, 2, 3], "c": {1, 2}}
empty := set()
"#,
        );
        let values: Vec<&Value> = m
            .rules
            .iter()
            .map(|r| &r.head.value.as_ref().expect("value").value)
            .collect();
        assert!(matches!(values[0], Value::ArrayCompr { .. }));
        assert!(matches!(values[1], Value::SetCompr { .. }));
        assert!(matches!(values[2], Value::ObjectCompr { .. }));
        assert!(matches!(values[3], Value::Object(pairs) if pairs.len() == 3));
        assert!(matches!(values[4], Value::Set(items) if items.is_empty()));
    }

    #[test]
    fn operators_become_builtin_calls() {
        let m = parse_v1("package a\n\np := 1 + 2 * 3\n");
        let Value::Call { func, args } = &m.rules[0].head.value.as_ref().expect("value").value
        else {
            panic!("expected call");
        };
        assert_eq!(func, builtins::PLUS);
        assert!(matches!(&args[1].value, Value::Call { func, .. } if func == builtins::MUL));
    }

    #[test]
    fn newline_separates_literals_but_not_inside_parens() {
        let m = parse_v1("package a\n\np if {\n  x := (1 +\n    2)\n  x > 2\n}\n");
        assert_eq!(m.rules[0].body.len(), 2);
    }

    #[test]
    fn else_chains_and_with() {
        let m = parse_v1(
            "package a\n\nf(x) := 1 if x > 10\nelse := 2 if x > 5\nelse := 3 if true\n\nt if {\n  f(1) == 3 with input as {}\n}\n",
        );
        assert_eq!(m.rules[0].chain().count(), 3);
        assert_eq!(m.rules[1].body[0].with.len(), 1);
    }

    #[test]
    fn final_else_may_omit_the_body() {
        let m = parse_v1("package a\n\nx := 1 if {\n\tinput.a\n} else := 2\n");
        assert_eq!(m.rules[0].chain().count(), 2);
        let last = m.rules[0].chain().last().expect("else clause");
        assert!(last.body.is_empty());
        assert!(last.head.value.is_some());

        let m = parse_v1(
            "package a\n\nx := 1 if input.a\nelse := 2 if input.b\nelse := 3\n\ny := x\n",
        );
        assert_eq!(m.rules.len(), 2);
        assert_eq!(m.rules[0].chain().count(), 3);

        let msg = first_error(
            "package a\n\nx := 1 if {\n\tinput.a\n} else\n",
            RegoVersion::V1,
        );
        assert_eq!(msg, "else clause must have a value and/or body");
    }

    #[test]
    fn dotted_heads_and_call_refs() {
        let m = parse_v1(
            "package a\n\nlimits.cpu.max := 4\n\nroles.admin contains \"root\"\n\nfirst := split(\"a.b\", \".\")[0]\n",
        );
        assert_eq!(m.rules[0].head.name, "limits.cpu.max");
        assert_eq!(m.rules[0].kind(), RuleKind::Complete);
        assert_eq!(m.rules[1].head.name, "roles.admin");
        assert_eq!(m.rules[1].kind(), RuleKind::MultiValue);
        let value = &m.rules[2].head.value.as_ref().expect("value").value;
        let Value::CallRef { call, path } = value else {
            panic!("expected call ref, got {value:?}");
        };
        assert!(matches!(&call.value, Value::Call { func, .. } if func == "split"));
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn metadata_attaches_to_following_rule() {
        let m = parse_v1(
            "# METADATA\n# title: pkg\npackage a\n\n# METADATA\n# schemas:\n#   - input: schema.input\nallow if input.user == \"bob\"\n",
        );
        assert_eq!(
            m.annotations.as_ref().and_then(|a| a.title.as_deref()),
            Some("pkg")
        );
        let ann = m.rules[0].annotations.as_ref().expect("rule annotations");
        assert_eq!(ann.schemas.len(), 1);
    }

    #[test]
    fn annotations_skipped_when_disabled() {
        let opts = ParserOptions {
            process_annotations: false,
            ..ParserOptions::default()
        };
        let m = parse_module("t.rego", "# METADATA\n# bogus: [\npackage a\n", &opts)
            .expect("parse without annotations");
        assert!(m.annotations.is_none());
    }

    #[test]
    fn malformed_metadata_is_a_parse_error() {
        let msg = first_error("# METADATA\n# colour: red\npackage a\n", RegoVersion::V1);
        assert!(msg.starts_with("invalid metadata"));
    }

    #[test]
    fn errors_carry_location_and_source_line() {
        let errs = parse("package a\n\np := }\n", RegoVersion::V1).err().expect("error");
        let err = errs.iter().next().expect("error");
        let loc = err.location.as_ref().expect("location");
        assert_eq!((loc.file.as_str(), loc.row, loc.col), ("test.rego", 3, 6));
        assert_eq!(err.details.as_ref().map(|d| d.line.as_str()), Some("p := }"));
        assert_eq!(err.message, "unexpected } token: expected term");
    }

    #[test]
    fn missing_package_is_an_error() {
        let msg = first_error("p := 1\n", RegoVersion::V1);
        assert_eq!(msg, "unexpected ident p: expected package");
    }

    #[test]
    fn capabilities_restrict_future_keyword_imports() {
        let caps = Capabilities {
            future_keywords: vec!["in".to_string()],
            ..Capabilities::default()
        };
        let opts = ParserOptions {
            rego_version: RegoVersion::V0,
            capabilities: Some(&caps),
            process_annotations: true,
        };
        assert!(parse_module("t.rego", "package a\nimport future.keywords.in\n", &opts).is_ok());
        let errs = parse_module("t.rego", "package a\nimport future.keywords.if\n", &opts)
            .err()
            .expect("error");
        assert!(errs.to_string().contains("unexpected keyword"));
        let errs = parse_module("t.rego", "package a\nimport rego.v1\n", &opts)
            .err()
            .expect("error");
        assert!(errs.to_string().contains("not supported by current capabilities"));
    }

    #[test]
    fn two_rules_on_one_line_are_rejected() {
        let msg = first_error("package a\n\np := 1 q := 2\n", RegoVersion::V1);
        assert_eq!(msg, "unexpected ident q: expected new line");
    }

    proptest! {
        #[test]
        fn parse_never_panics(input in ".*") {
            let _ = parse(&input, RegoVersion::V1);
            let _ = parse(&format!("package p\n{input}"), RegoVersion::V0);
        }
    }
}
