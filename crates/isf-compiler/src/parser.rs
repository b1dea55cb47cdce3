//! Recursive-descent parser from preprocessed GLSL text to [`ast`](crate::ast).
//!
//! Covers the GLSL ES subset ISF effects are written in: structs, globals,
//! functions with `in`/`out`/`inout` parameters, the usual statements and the
//! full C-style expression grammar. Precision statements and qualifiers are
//! consumed and forgotten; prototypes are dropped since WGSL needs none.
use std::collections::HashSet;

use tracing::debug;

use crate::ast::{
    BinOp, Case, CaseLabel, Expr, Function, Item, Param, ParamQualifier, Stmt, Storage,
    StructDef, StructField, TranslationUnit, UnaryOp, VarDecl,
};
use crate::error::CompileError;
use crate::lexer::{self, Token, TokenKind};
use crate::types::{ArrayLen, GlslType};

type PResult<T> = Result<T, CompileError>;

const PRECISION: &[&str] = &["highp", "mediump", "lowp"];
const INTERPOLATION: &[&str] = &[
    "flat",
    "smooth",
    "noperspective",
    "invariant",
    "centroid",
];
const ASSIGN_OPS: &[(&str, Option<BinOp>)] = &[
    ("=", None),
    ("+=", Some(BinOp::Add)),
    ("-=", Some(BinOp::Sub)),
    ("*=", Some(BinOp::Mul)),
    ("/=", Some(BinOp::Div)),
    ("%=", Some(BinOp::Rem)),
    ("<<=", Some(BinOp::Shl)),
    (">>=", Some(BinOp::Shr)),
    ("&=", Some(BinOp::BitAnd)),
    ("|=", Some(BinOp::BitOr)),
    ("^=", Some(BinOp::BitXor)),
];

pub fn parse(source: &str) -> Result<TranslationUnit, CompileError> {
    let tokens: Vec<Token> = lexer::tokenize(source)
        .into_iter()
        .filter(|t| !t.is_trivia())
        .collect();
    let mut parser = Parser {
        tokens,
        pos: 0,
        structs: HashSet::new(),
        prototypes: 0,
    };
    let unit = parser.unit()?;
    debug!(
        items = unit.items.len(),
        prototypes = parser.prototypes,
        "parsed code body"
    );
    Ok(unit)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    structs: HashSet<String>,
    prototypes: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_punct(&self, text: &str) -> bool {
        self.peek().is_some_and(|t| t.is_punct(text))
    }

    fn at_ident(&self, text: &str) -> bool {
        self.peek().is_some_and(|t| t.is_ident(text))
    }

    fn eat_punct(&mut self, text: &str) -> bool {
        if self.at_punct(text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, text: &str) -> bool {
        if self.at_ident(text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        let (line, column) = self
            .peek()
            .or_else(|| self.tokens.last())
            .map_or((0, 0), |t| (t.line, t.column));
        CompileError::syntax(line, column, message)
    }

    fn describe_current(&self) -> String {
        self.peek()
            .map_or_else(|| "end of input".to_string(), |t| format!("`{}`", t.text))
    }

    fn expect_punct(&mut self, text: &str) -> PResult<()> {
        if self.eat_punct(text) {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected `{text}` but found {}",
                self.describe_current()
            )))
        }
    }

    fn expect_ident(&mut self) -> PResult<String> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Ident => {
                let name = t.text.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error(format!(
                "expected an identifier but found {}",
                self.describe_current()
            ))),
        }
    }

    fn is_type_name(&self, token: Option<&Token>) -> bool {
        token.is_some_and(|t| {
            t.kind == TokenKind::Ident
                && (GlslType::from_name(&t.text).is_some() || self.structs.contains(&t.text))
        })
    }

    fn skip_until_semicolon(&mut self) {
        while let Some(token) = self.advance() {
            if token.is_punct(";") {
                break;
            }
        }
    }

    fn unit(&mut self) -> PResult<TranslationUnit> {
        let mut unit = TranslationUnit::default();
        while self.peek().is_some() {
            if let Some(item) = self.item()? {
                unit.items.extend(item);
            }
        }
        Ok(unit)
    }

    fn item(&mut self) -> PResult<Option<Vec<Item>>> {
        if self.eat_punct(";") {
            return Ok(None);
        }
        if self.eat_ident("precision") {
            self.skip_until_semicolon();
            return Ok(None);
        }
        if self.at_ident("struct") {
            return self.struct_item().map(Some);
        }

        let storage = self.global_qualifiers()?;
        let ty = self.type_spec()?;
        let name = self.expect_ident()?;

        if self.at_punct("(") {
            let params = self.params()?;
            if self.eat_punct(";") {
                self.prototypes += 1;
                return Ok(None);
            }
            let body = self.block()?;
            return Ok(Some(vec![Item::Function(Function {
                name,
                ret: ty,
                params,
                body,
                entry: false,
            })]));
        }

        let decls = self.declarators(storage, ty, name)?;
        Ok(Some(vec![Item::Global(decls)]))
    }

    fn struct_item(&mut self) -> PResult<Vec<Item>> {
        self.pos += 1;
        let name = self.expect_ident()?;
        self.expect_punct("{")?;
        let mut fields = Vec::new();
        while !self.eat_punct("}") {
            while self.peek().is_some_and(|t| PRECISION.contains(&t.text.as_str())) {
                self.pos += 1;
            }
            let ty = self.type_spec()?;
            loop {
                let field = self.expect_ident()?;
                let ty = self.array_suffix(ty.clone())?;
                fields.push(StructField { name: field, ty });
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.expect_punct(";")?;
        }
        self.structs.insert(name.clone());
        let mut items = vec![Item::Struct(StructDef {
            name: name.clone(),
            fields,
        })];
        if self.eat_punct(";") {
            return Ok(items);
        }
        let first = self.expect_ident()?;
        let decls = self.declarators(Storage::Var, GlslType::Struct(name), first)?;
        items.push(Item::Global(decls));
        Ok(items)
    }

    fn global_qualifiers(&mut self) -> PResult<Storage> {
        let mut storage = Storage::Var;
        loop {
            let Some(token) = self.peek() else {
                return Err(self.error("unexpected end of input"));
            };
            let text = token.text.clone();
            match text.as_str() {
                "const" => storage = Storage::Const,
                "uniform" => storage = Storage::Uniform,
                "varying" | "attribute" | "in" => storage = Storage::Input,
                "out" => storage = Storage::Output,
                "layout" => {
                    self.pos += 1;
                    self.skip_parens()?;
                    continue;
                }
                t if PRECISION.contains(&t) || INTERPOLATION.contains(&t) => {}
                _ => return Ok(storage),
            }
            self.pos += 1;
        }
    }

    fn skip_parens(&mut self) -> PResult<()> {
        self.expect_punct("(")?;
        let mut depth = 1usize;
        while depth > 0 {
            let token = self
                .advance()
                .ok_or_else(|| self.error("unterminated parenthesis"))?;
            if token.is_punct("(") {
                depth += 1;
            } else if token.is_punct(")") {
                depth -= 1;
            }
        }
        Ok(())
    }

    fn type_spec(&mut self) -> PResult<GlslType> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| self.error("expected a type but found end of input"))?;
        let ty = if token.kind != TokenKind::Ident {
            None
        } else if self.structs.contains(&token.text) {
            Some(GlslType::Struct(token.text.clone()))
        } else {
            GlslType::from_name(&token.text)
        };
        let Some(ty) = ty else {
            return Err(self.error(format!("expected a type but found `{}`", token.text)));
        };
        self.pos += 1;
        self.array_suffix(ty)
    }

    fn array_suffix(&mut self, ty: GlslType) -> PResult<GlslType> {
        if !self.eat_punct("[") {
            return Ok(ty);
        }
        if self.eat_punct("]") {
            return Ok(GlslType::Array(Box::new(ty), ArrayLen::Unsized));
        }
        let len = match self.conditional()? {
            Expr::Int(text) => text
                .trim_end_matches(['u', 'U'])
                .parse::<u32>()
                .map(ArrayLen::Fixed)
                .map_err(|_| self.error(format!("unsupported array length `{text}`")))?,
            Expr::Ident(name) => ArrayLen::Named(name),
            _ => return Err(self.error("array lengths must be literals or named constants")),
        };
        self.expect_punct("]")?;
        Ok(GlslType::Array(Box::new(ty), len))
    }

    fn params(&mut self) -> PResult<Vec<Param>> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        if self.at_ident("void") && self.peek_at(1).is_some_and(|t| t.is_punct(")")) {
            self.pos += 1;
        }
        if self.eat_punct(")") {
            return Ok(params);
        }
        loop {
            let mut qualifier = ParamQualifier::In;
            loop {
                match self.peek().map(|t| t.text.as_str()) {
                    Some("in") | Some("const") => {}
                    Some("out") => qualifier = ParamQualifier::Out,
                    Some("inout") => qualifier = ParamQualifier::InOut,
                    Some(t) if PRECISION.contains(&t) => {}
                    _ => break,
                }
                self.pos += 1;
            }
            let ty = self.type_spec()?;
            let named = self.peek().is_some_and(|t| t.kind == TokenKind::Ident);
            let name = if named {
                self.expect_ident()?
            } else {
                format!("isf_unnamed{}", params.len())
            };
            let ty = self.array_suffix(ty)?;
            params.push(Param {
                name,
                ty,
                qualifier,
            });
            if self.eat_punct(")") {
                return Ok(params);
            }
            self.expect_punct(",")?;
        }
    }

    /// Declarators after the type, starting at an already consumed name.
    fn declarators(
        &mut self,
        storage: Storage,
        base: GlslType,
        first: String,
    ) -> PResult<Vec<VarDecl>> {
        let mut decls = Vec::new();
        let mut name = first;
        loop {
            let mut ty = self.array_suffix(base.clone())?;
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            let sized = match (&ty, &init) {
                (GlslType::Array(elem, ArrayLen::Unsized), Some(Expr::Construct { args, .. })) => {
                    Some(GlslType::Array(elem.clone(), ArrayLen::Fixed(args.len() as u32)))
                }
                _ => None,
            };
            if let Some(sized) = sized {
                ty = sized;
            }
            decls.push(VarDecl {
                storage,
                ty,
                name,
                init,
            });
            if self.eat_punct(";") {
                return Ok(decls);
            }
            self.expect_punct(",")?;
            name = self.expect_ident()?;
        }
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut stmts = Vec::new();
        while !self.eat_punct("}") {
            if self.peek().is_none() {
                return Err(self.error("expected `}` but found end of input"));
            }
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn starts_declaration(&self) -> bool {
        let Some(token) = self.peek() else {
            return false;
        };
        if token.kind != TokenKind::Ident {
            return false;
        }
        if token.text == "const" || PRECISION.contains(&token.text.as_str()) {
            return true;
        }
        if !self.is_type_name(Some(token)) {
            return false;
        }
        match self.peek_at(1) {
            Some(next) if next.kind == TokenKind::Ident => true,
            Some(next) if next.is_punct("[") => {
                // `float[3] a` declares, `float[3](..)` constructs.
                let close = (self.pos + 2..self.tokens.len()).find(|&i| self.tokens[i].is_punct("]"));
                close
                    .and_then(|i| self.tokens.get(i + 1))
                    .is_some_and(|t| t.kind == TokenKind::Ident)
            }
            _ => false,
        }
    }

    fn local_declaration(&mut self) -> PResult<Stmt> {
        let mut storage = Storage::Var;
        while let Some(text) = self.peek().map(|t| t.text.clone()) {
            if text == "const" {
                storage = Storage::Const;
            } else if !PRECISION.contains(&text.as_str()) {
                break;
            }
            self.pos += 1;
        }
        let ty = self.type_spec()?;
        let name = self.expect_ident()?;
        Ok(Stmt::Decl(self.declarators(storage, ty, name)?))
    }

    fn statement(&mut self) -> PResult<Stmt> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error("expected a statement but found end of input"));
        };
        if token.is_punct("{") {
            return Ok(Stmt::Block(self.block()?));
        }
        if token.is_punct(";") {
            self.pos += 1;
            return Ok(Stmt::Empty);
        }
        if token.kind == TokenKind::Ident {
            match token.text.as_str() {
                "if" => return self.if_statement(),
                "for" => return self.for_statement(),
                "while" => {
                    self.pos += 1;
                    self.expect_punct("(")?;
                    let cond = self.expression()?;
                    self.expect_punct(")")?;
                    let body = Box::new(self.statement()?);
                    return Ok(Stmt::While { cond, body });
                }
                "do" => {
                    self.pos += 1;
                    let body = Box::new(self.statement()?);
                    if !self.eat_ident("while") {
                        return Err(self.error("expected `while` after `do` body"));
                    }
                    self.expect_punct("(")?;
                    let cond = self.expression()?;
                    self.expect_punct(")")?;
                    self.expect_punct(";")?;
                    return Ok(Stmt::DoWhile { body, cond });
                }
                "switch" => return self.switch_statement(),
                "return" => {
                    self.pos += 1;
                    if self.eat_punct(";") {
                        return Ok(Stmt::Return(None));
                    }
                    let value = self.expression()?;
                    self.expect_punct(";")?;
                    return Ok(Stmt::Return(Some(value)));
                }
                "break" | "continue" | "discard" => {
                    self.pos += 1;
                    self.expect_punct(";")?;
                    return Ok(match token.text.as_str() {
                        "break" => Stmt::Break,
                        "continue" => Stmt::Continue,
                        _ => Stmt::Discard,
                    });
                }
                "precision" => {
                    self.skip_until_semicolon();
                    return Ok(Stmt::Empty);
                }
                _ => {}
            }
        }
        if self.starts_declaration() {
            return self.local_declaration();
        }
        let expr = self.expression()?;
        self.expect_punct(";")?;
        Ok(Stmt::Expr(expr))
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        self.pos += 1;
        self.expect_punct("(")?;
        let cond = self.expression()?;
        self.expect_punct(")")?;
        let then = Box::new(self.statement()?);
        let otherwise = if self.eat_ident("else") {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then,
            otherwise,
        })
    }

    fn for_statement(&mut self) -> PResult<Stmt> {
        self.pos += 1;
        self.expect_punct("(")?;
        let init = if self.eat_punct(";") {
            None
        } else if self.starts_declaration() {
            Some(Box::new(self.local_declaration()?))
        } else {
            let expr = self.expression()?;
            self.expect_punct(";")?;
            Some(Box::new(Stmt::Expr(expr)))
        };
        let cond = if self.at_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let step = if self.at_punct(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    fn switch_statement(&mut self) -> PResult<Stmt> {
        self.pos += 1;
        self.expect_punct("(")?;
        let selector = self.expression()?;
        self.expect_punct(")")?;
        self.expect_punct("{")?;
        let mut cases: Vec<Case> = Vec::new();
        while !self.eat_punct("}") {
            let label = if self.eat_ident("case") {
                let value = self.conditional()?;
                self.expect_punct(":")?;
                Some(CaseLabel::Value(value))
            } else if self.eat_ident("default") {
                self.expect_punct(":")?;
                Some(CaseLabel::Default)
            } else {
                None
            };
            match (label, cases.last_mut()) {
                (Some(label), Some(last)) if last.body.is_empty() => last.labels.push(label),
                (Some(label), _) => cases.push(Case {
                    labels: vec![label],
                    body: Vec::new(),
                }),
                (None, Some(last)) => {
                    let stmt = self.statement()?;
                    last.body.push(stmt);
                }
                (None, None) => return Err(self.error("statement before first `case` label")),
            }
        }
        Ok(Stmt::Switch { selector, cases })
    }

    /// Comma expression.
    fn expression(&mut self) -> PResult<Expr> {
        let first = self.assignment()?;
        if !self.at_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            items.push(self.assignment()?);
        }
        Ok(Expr::Comma(items))
    }

    fn assignment(&mut self) -> PResult<Expr> {
        let lhs = self.conditional()?;
        let op = self.peek().and_then(|t| {
            (t.kind == TokenKind::Punct)
                .then(|| ASSIGN_OPS.iter().find(|(sym, _)| *sym == t.text))
                .flatten()
                .map(|(_, op)| *op)
        });
        let Some(op) = op else {
            return Ok(lhs);
        };
        self.pos += 1;
        let rhs = self.assignment()?;
        Ok(Expr::Assign {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn conditional(&mut self) -> PResult<Expr> {
        let cond = self.binary(1)?;
        if !self.eat_punct("?") {
            return Ok(cond);
        }
        let then = self.expression()?;
        self.expect_punct(":")?;
        let otherwise = self.assignment()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = self
                .peek()
                .filter(|t| t.kind == TokenKind::Punct)
                .and_then(|t| BinOp::from_symbol(&t.text));
            let Some(op) = op.filter(|op| op.precedence() >= min_prec) else {
                return Ok(lhs);
            };
            self.pos += 1;
            let rhs = self.binary(op.precedence() + 1)?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> PResult<Expr> {
        let op = match self.peek() {
            Some(t) if t.is_punct("-") => Some(UnaryOp::Neg),
            Some(t) if t.is_punct("+") => Some(UnaryOp::Plus),
            Some(t) if t.is_punct("!") => Some(UnaryOp::Not),
            Some(t) if t.is_punct("~") => Some(UnaryOp::BitNot),
            Some(t) if t.is_punct("++") => Some(UnaryOp::PreInc),
            Some(t) if t.is_punct("--") => Some(UnaryOp::PreDec),
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                let expr = self.unary()?;
                Ok(Expr::Unary {
                    op,
                    expr: Box::new(expr),
                })
            }
            None => self.postfix(),
        }
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat_punct(".") {
                let name = self.expect_ident()?;
                if name == "length" && self.at_punct("(") {
                    self.skip_parens()?;
                    expr = Expr::call("isf_array_length", vec![expr]);
                } else {
                    expr = Expr::field(expr, name);
                }
            } else if self.eat_punct("++") {
                expr = Expr::Unary {
                    op: UnaryOp::PostInc,
                    expr: Box::new(expr),
                };
            } else if self.eat_punct("--") {
                expr = Expr::Unary {
                    op: UnaryOp::PostDec,
                    expr: Box::new(expr),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> PResult<Expr> {
        let token = self
            .advance()
            .ok_or_else(|| self.error("expected an expression but found end of input"))?;
        match token.kind {
            TokenKind::Int => Ok(Expr::Int(normalise_int(&token.text))),
            TokenKind::Float => Ok(Expr::Float(normalise_float(&token.text))),
            TokenKind::Ident if token.text == "true" => Ok(Expr::Bool(true)),
            TokenKind::Ident if token.text == "false" => Ok(Expr::Bool(false)),
            TokenKind::Ident => {
                let ty = if self.structs.contains(&token.text) {
                    Some(GlslType::Struct(token.text.clone()))
                } else {
                    GlslType::from_name(&token.text)
                };
                if let Some(ty) = ty {
                    let ty = self.array_suffix(ty)?;
                    let args = self.call_args()?;
                    let ty = match ty {
                        GlslType::Array(elem, ArrayLen::Unsized) => {
                            GlslType::Array(elem, ArrayLen::Fixed(args.len() as u32))
                        }
                        other => other,
                    };
                    return Ok(Expr::Construct { ty, args });
                }
                if self.at_punct("(") {
                    let args = self.call_args()?;
                    return Ok(Expr::Call {
                        name: token.text,
                        args,
                    });
                }
                Ok(Expr::Ident(token.text))
            }
            TokenKind::Punct if token.text == "(" => {
                let inner = self.expression()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            _ => {
                self.pos -= 1;
                Err(self.error(format!("unexpected `{}` in expression", token.text)))
            }
        }
    }

    fn call_args(&mut self) -> PResult<Vec<Expr>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        if self.at_ident("void") && self.peek_at(1).is_some_and(|t| t.is_punct(")")) {
            self.pos += 1;
        }
        if self.eat_punct(")") {
            return Ok(args);
        }
        loop {
            args.push(self.assignment()?);
            if self.eat_punct(")") {
                return Ok(args);
            }
            self.expect_punct(",")?;
        }
    }
}

/// Decimal or hex text; octal literals are rewritten to decimal.
fn normalise_int(text: &str) -> String {
    let (digits, suffix) = match text.strip_suffix(['u', 'U']) {
        Some(digits) => (digits, "u"),
        None => (text, ""),
    };
    if digits.len() > 1
        && digits.starts_with('0')
        && digits.bytes().all(|b| (b'0'..=b'7').contains(&b))
    {
        if let Ok(value) = u64::from_str_radix(&digits[1..], 8) {
            return format!("{value}{suffix}");
        }
    }
    format!("{digits}{suffix}")
}

/// Strips GLSL suffixes and guarantees a decimal point or exponent.
fn normalise_float(text: &str) -> String {
    let trimmed = text
        .strip_suffix("lf")
        .or_else(|| text.strip_suffix("LF"))
        .or_else(|| text.strip_suffix(['f', 'F']))
        .unwrap_or(text);
    if trimmed.contains(['.', 'e', 'E']) {
        trimmed.to_string()
    } else {
        format!("{trimmed}.0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(unit: &TranslationUnit, name: &str) -> Vec<Stmt> {
        unit.functions()
            .find(|f| f.name == name)
            .map(|f| f.body.clone())
            .unwrap()
    }

    #[test]
    fn parses_functions_and_globals() {
        let unit = parse(
            "precision mediump float;\nconst float PI = 3.14159;\nvec2 rot(vec2 p, float a);\nvec2 rot(vec2 p, float a) { return p * a; }\nvoid main(void) { gl_FragColor = vec4(1.0); }",
        )
        .unwrap();
        assert_eq!(unit.items.len(), 3);
        let main = unit.functions().find(|f| f.name == "main").unwrap();
        assert!(main.params.is_empty());
        assert_eq!(main.ret, GlslType::Void);
        let Item::Global(globals) = &unit.items[0] else {
            panic!("expected the PI constant first, got {:?}", unit.items[0]);
        };
        assert_eq!(globals[0].storage, Storage::Const);
        assert_eq!(globals[0].ty, GlslType::FLOAT);
    }

    #[test]
    fn keeps_multi_declarators_together() {
        let unit = parse("void main() { float a = 1.0, b, c[2]; }").unwrap();
        let body = body_of(&unit, "main");
        let Stmt::Decl(decls) = &body[0] else {
            panic!("expected declaration, got {:?}", body[0]);
        };
        assert_eq!(decls.len(), 3);
        assert_eq!(
            decls[2].ty,
            GlslType::Array(Box::new(GlslType::FLOAT), ArrayLen::Fixed(2))
        );
    }

    #[test]
    fn respects_operator_precedence() {
        let unit = parse("void main() { x = a + b * c << 1 == d && e; }").unwrap();
        let body = body_of(&unit, "main");
        let Stmt::Expr(Expr::Assign { rhs, .. }) = &body[0] else {
            panic!("expected assignment");
        };
        let Expr::Binary { op, lhs, .. } = rhs.as_ref() else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinOp::And);
        assert!(matches!(lhs.as_ref(), Expr::Binary { op: BinOp::Eq, .. }));
    }

    #[test]
    fn parses_nested_ternaries_right_associatively() {
        let unit = parse("void main() { float v = a ? 1.0 : b ? 2.0 : 3.0; }").unwrap();
        let body = body_of(&unit, "main");
        let Stmt::Decl(decls) = &body[0] else {
            panic!("expected declaration");
        };
        let Some(Expr::Ternary { otherwise, .. }) = &decls[0].init else {
            panic!("expected ternary");
        };
        assert!(matches!(otherwise.as_ref(), Expr::Ternary { .. }));
    }

    #[test]
    fn parses_control_flow() {
        let source = "void main() {\n for (int i = 0; i < 4; i++) if (i == 2) break; else continue;\n do { x += 1.0; } while (x < 2.0);\n switch (n) { case 0: case 1: y = 1.0; break; default: y = 0.0; }\n}";
        let unit = parse(source).unwrap();
        let body = body_of(&unit, "main");
        assert!(matches!(body[0], Stmt::For { .. }));
        assert!(matches!(body[1], Stmt::DoWhile { .. }));
        let Stmt::Switch { cases, .. } = &body[2] else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].labels.len(), 2);
        assert_eq!(cases[0].body.len(), 2);
    }

    #[test]
    fn parses_structs_and_constructors() {
        let unit = parse(
            "struct Light { vec3 pos; float power; };\nvoid main() { Light l = Light(vec3(0.0), 1.0); float w[] = float[](1.0, 2.0); }",
        )
        .unwrap();
        let body = body_of(&unit, "main");
        let Stmt::Decl(decls) = &body[1] else {
            panic!("expected declaration");
        };
        assert_eq!(
            decls[0].ty,
            GlslType::Array(Box::new(GlslType::FLOAT), ArrayLen::Fixed(2))
        );
    }

    #[test]
    fn normalises_literals() {
        assert_eq!(normalise_int("017"), "15");
        assert_eq!(normalise_int("0"), "0");
        assert_eq!(normalise_int("0x1F"), "0x1F");
        assert_eq!(normalise_int("3u"), "3u");
        assert_eq!(normalise_float("1.5f"), "1.5");
        assert_eq!(normalise_float("2."), "2.");
        assert_eq!(normalise_float("1e3"), "1e3");
        assert_eq!(normalise_float("4lf"), "4.0");
    }

    #[test]
    fn reports_syntax_errors_with_position() {
        let err = parse("void main() {\n  float x = ;\n}").unwrap_err();
        match err {
            CompileError::Syntax { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
