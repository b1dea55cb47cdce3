//! Macro preprocessor for ISF code bodies.
//!
//! Works on the lossless token stream from [`crate::lexer`], so comments and
//! layout survive untouched and macro names are only ever matched as whole
//! identifier tokens, never inside comments.
//!
//! Behaviour:
//!
//! - backslash-continued lines are joined (blank lines are appended so later
//!   diagnostics keep their line numbers);
//! - `#define` registers object-like or function-like macros, except that an
//!   object-like macro named after a declared input is discarded (the input
//!   wins);
//! - `#undef` removes a macro; `#if`/`#ifdef`/`#ifndef`/`#elif`/`#else`/`#endif`
//!   keep only the active branch;
//! - `#version` and `#extension` vanish silently, every other directive is
//!   deleted with a warning;
//! - expansion runs in passes until nothing changes or the configured cap is
//!   hit. Each expanded token remembers which macros produced it so a
//!   self-referential macro stops instead of growing forever.
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::diagnostics::{Stage, Warning};
use crate::lexer::{self, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacroDef {
    pub name: String,
    /// `None` for object-like macros.
    pub params: Option<Vec<String>>,
    pub body: String,
    #[serde(skip)]
    body_tokens: Vec<Token>,
}

impl MacroDef {
    pub fn is_function_like(&self) -> bool {
        self.params.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub text: String,
    /// Macros still defined at the end of the unit, sorted by name.
    pub macros: Vec<MacroDef>,
}

pub fn preprocess(
    body: &str,
    input_names: &HashSet<String>,
    max_passes: usize,
    warnings: &mut Vec<Warning>,
) -> Preprocessed {
    let mut pre = Preprocessor {
        macros: BTreeMap::new(),
        inputs: input_names,
        max_passes: max_passes.max(1),
        warnings,
    };
    let text = pre.run(body);
    debug!(macros = pre.macros.len(), "preprocessed code body");
    Preprocessed {
        text,
        macros: pre.macros.into_values().collect(),
    }
}

type HideSet = Rc<BTreeSet<String>>;

#[derive(Debug, Clone)]
struct Tok {
    token: Token,
    hide: HideSet,
}

#[derive(Debug, Clone, Copy)]
struct CondFrame {
    parent_active: bool,
    taking: bool,
    taken_any: bool,
}

struct Preprocessor<'a> {
    macros: BTreeMap<String, MacroDef>,
    inputs: &'a HashSet<String>,
    max_passes: usize,
    warnings: &'a mut Vec<Warning>,
}

impl Preprocessor<'_> {
    fn run(&mut self, body: &str) -> String {
        let joined = join_continuations(body);
        let tokens = lexer::tokenize(&joined);
        let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
        let mut chunk: Vec<Token> = Vec::new();
        let mut stack: Vec<CondFrame> = Vec::new();

        for line in split_lines(tokens) {
            let active = stack.iter().all(|frame| frame.taking);
            if let Some(directive) = directive_tokens(&line) {
                let expanded = self.expand(std::mem::take(&mut chunk));
                out.extend(expanded);
                self.directive(&directive, active, &mut stack);
                out.extend(line_breaks(&line));
            } else if active {
                chunk.extend(line);
            } else {
                out.extend(line_breaks(&line));
            }
        }
        let expanded = self.expand(chunk);
        out.extend(expanded);

        if !stack.is_empty() {
            self.warn(format!("{} conditional block(s) left unterminated", stack.len()));
        }
        lexer::render(&out)
    }

    fn directive(&mut self, tokens: &[Token], active: bool, stack: &mut Vec<CondFrame>) {
        let name = tokens.first().map(|t| t.text.as_str()).unwrap_or("");
        let rest = tokens.get(1..).unwrap_or(&[]);
        match name {
            "if" | "ifdef" | "ifndef" => {
                let taking = active && self.condition(name, rest);
                stack.push(CondFrame {
                    parent_active: active,
                    taking,
                    taken_any: taking,
                });
            }
            "elif" => match stack.last().copied() {
                Some(frame) => {
                    let taking =
                        frame.parent_active && !frame.taken_any && self.condition("if", rest);
                    if let Some(top) = stack.last_mut() {
                        top.taking = taking;
                        top.taken_any |= taking;
                    }
                }
                None => self.warn("#elif without matching #if ignored"),
            },
            "else" => match stack.last_mut() {
                Some(top) => {
                    top.taking = top.parent_active && !top.taken_any;
                    top.taken_any = true;
                }
                None => self.warn("#else without matching #if ignored"),
            },
            "endif" => {
                if stack.pop().is_none() {
                    self.warn("#endif without matching #if ignored");
                }
            }
            _ if !active => {}
            "define" => self.define(rest),
            "undef" => {
                if let Some(target) = rest.iter().find(|t| !t.is_trivia()) {
                    self.macros.remove(&target.text);
                }
            }
            "version" | "extension" | "" => {}
            other => {
                let text: String = tokens
                    .iter()
                    .map(|t| if t.is_trivia() { " " } else { t.text.as_str() })
                    .collect::<Vec<_>>()
                    .join("");
                self.warn(format!("removed unsupported directive `#{}`", text.trim()));
                debug!(directive = other, "directive deleted");
            }
        }
    }

    fn define(&mut self, rest: &[Token]) {
        let mut iter = rest.iter().enumerate().skip_while(|(_, t)| t.is_trivia());
        let Some((name_at, name_tok)) = iter.next() else {
            self.warn("#define without a macro name ignored");
            return;
        };
        if name_tok.kind != TokenKind::Ident {
            self.warn(format!("#define with invalid name `{}` ignored", name_tok.text));
            return;
        }
        let name = name_tok.text.clone();
        let after_name = &rest[name_at + 1..];

        let (params, body_tokens) = if after_name.first().is_some_and(|t| t.is_punct("(")) {
            let Some(close) = after_name.iter().position(|t| t.is_punct(")")) else {
                self.warn(format!("function-like macro `{name}` has no closing parenthesis"));
                return;
            };
            let params = after_name[1..close]
                .iter()
                .filter(|t| t.kind == TokenKind::Ident)
                .map(|t| t.text.clone())
                .collect::<Vec<_>>();
            (Some(params), &after_name[close + 1..])
        } else {
            (None, after_name)
        };

        if params.is_none() && self.inputs.contains(&name) {
            self.warn(format!(
                "macro `{name}` shadows the declared input of the same name; keeping the input"
            ));
            return;
        }

        let body_tokens = trim_trivia(
            body_tokens
                .iter()
                .filter(|t| t.kind != TokenKind::Comment && t.kind != TokenKind::Newline)
                .cloned()
                .collect(),
        );
        let body = lexer::render(&body_tokens);
        self.macros.insert(
            name.clone(),
            MacroDef {
                name,
                params,
                body,
                body_tokens,
            },
        );
    }

    fn condition(&mut self, kind: &str, rest: &[Token]) -> bool {
        let significant: Vec<Token> = rest.iter().filter(|t| !t.is_trivia()).cloned().collect();
        match kind {
            "ifdef" | "ifndef" => {
                let defined = significant
                    .first()
                    .is_some_and(|t| self.macros.contains_key(&t.text));
                defined == (kind == "ifdef")
            }
            _ => {
                let resolved = self.resolve_defined(&significant);
                let expanded: Vec<Token> = self
                    .expand(resolved)
                    .into_iter()
                    .filter(|t| !t.is_trivia())
                    .collect();
                match CondEval::new(&expanded).evaluate() {
                    Some(value) => value != 0,
                    None => {
                        let text = lexer::render(rest);
                        self.warn(format!(
                            "could not evaluate `#if {}`; keeping the branch",
                            text.trim()
                        ));
                        true
                    }
                }
            }
        }
    }

    fn resolve_defined(&self, tokens: &[Token]) -> Vec<Token> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            if tokens[i].is_ident("defined") {
                let (name, consumed) = match tokens.get(i + 1) {
                    Some(open) if open.is_punct("(") => {
                        (tokens.get(i + 2).map(|t| t.text.as_str()), 4)
                    }
                    Some(name) => (Some(name.text.as_str()), 2),
                    None => (None, 1),
                };
                let value = name.is_some_and(|n| self.macros.contains_key(n));
                out.push(Token::new(TokenKind::Int, if value { "1" } else { "0" }));
                i += consumed;
            } else {
                out.push(tokens[i].clone());
                i += 1;
            }
        }
        out
    }

    /// Expands macros in `tokens` to a fixed point, bounded by `max_passes`.
    fn expand(&mut self, tokens: Vec<Token>) -> Vec<Token> {
        if tokens.is_empty() || self.macros.is_empty() {
            return tokens;
        }
        let empty: HideSet = Rc::new(BTreeSet::new());
        let mut current: Vec<Tok> = tokens
            .into_iter()
            .map(|token| Tok {
                token,
                hide: empty.clone(),
            })
            .collect();

        for _ in 0..self.max_passes {
            let (next, changed) = self.expand_once(current);
            current = next;
            if !changed {
                return current.into_iter().map(|t| t.token).collect();
            }
        }
        self.warn(format!(
            "macro expansion did not settle after {} passes",
            self.max_passes
        ));
        current.into_iter().map(|t| t.token).collect()
    }

    fn expand_once(&mut self, tokens: Vec<Tok>) -> (Vec<Tok>, bool) {
        let mut out = Vec::with_capacity(tokens.len());
        let mut changed = false;
        let mut i = 0;
        while i < tokens.len() {
            let tok = &tokens[i];
            let candidate = (tok.token.kind == TokenKind::Ident)
                .then(|| self.macros.get(&tok.token.text))
                .flatten()
                .filter(|def| !tok.hide.contains(&def.name));
            let Some(def) = candidate else {
                out.push(tok.clone());
                i += 1;
                continue;
            };

            let mut hide = (*tok.hide).clone();
            hide.insert(def.name.clone());
            let hide: HideSet = Rc::new(hide);

            match &def.params {
                None => {
                    out.extend(def.body_tokens.iter().map(|token| Tok {
                        token: token.clone(),
                        hide: hide.clone(),
                    }));
                    changed = true;
                    i += 1;
                }
                Some(params) => {
                    let open = (i + 1..tokens.len()).find(|&j| !tokens[j].token.is_trivia());
                    let Some(open) = open.filter(|&j| tokens[j].token.is_punct("(")) else {
                        out.push(tok.clone());
                        i += 1;
                        continue;
                    };
                    let Some((args, close)) = collect_args(&tokens, open) else {
                        let message = format!("unterminated call to macro `{}`", def.name);
                        out.push(tok.clone());
                        i += 1;
                        self.warn(message);
                        continue;
                    };
                    let arity_ok = args.len() == params.len()
                        || (params.is_empty()
                            && args.len() == 1
                            && args[0].iter().all(|t| t.token.is_trivia()));
                    if !arity_ok {
                        let message = format!(
                            "macro `{}` expects {} argument(s) but got {}; call left unexpanded",
                            def.name,
                            params.len(),
                            args.len()
                        );
                        out.extend(tokens[i..=close].iter().cloned());
                        i = close + 1;
                        self.warn(message);
                        continue;
                    }
                    out.extend(substitute(def, params, &args, &hide));
                    changed = true;
                    i = close + 1;
                }
            }
        }
        (out, changed)
    }

    fn warn(&mut self, message: impl Into<String>) {
        let warning = Warning::new(Stage::Preprocessor, message);
        warn!(%warning, "preprocessor");
        self.warnings.push(warning);
    }
}

/// Substitutes call arguments into a function-like macro body and applies
/// `##` pasting. Argument tokens keep their own hide sets so nested calls
/// of the same macro inside arguments still expand.
fn substitute(def: &MacroDef, params: &[String], args: &[Vec<Tok>], hide: &HideSet) -> Vec<Tok> {
    let mut out: Vec<Tok> = Vec::new();
    let mut paste_next = false;
    for token in &def.body_tokens {
        if token.is_punct("##") {
            while out.last().is_some_and(|t| t.token.is_trivia()) {
                out.pop();
            }
            paste_next = true;
            continue;
        }
        if paste_next && token.is_trivia() {
            continue;
        }

        let mut piece: Vec<Tok> = match params.iter().position(|p| token.is_ident(p)) {
            Some(index) => trim_tok_trivia(args[index].clone()),
            None => vec![Tok {
                token: token.clone(),
                hide: hide.clone(),
            }],
        };

        if paste_next {
            paste_next = false;
            if let (Some(left), false) = (out.last_mut(), piece.is_empty()) {
                let right = piece.remove(0);
                let merged = format!("{}{}", left.token.text, right.token.text);
                let kind = lexer::tokenize(&merged)
                    .first()
                    .map_or(TokenKind::Other, |t| t.kind);
                left.token = Token::new(kind, merged);
                left.hide = hide.clone();
            }
        }
        out.extend(piece);
    }
    out
}

fn collect_args(tokens: &[Tok], open: usize) -> Option<(Vec<Vec<Tok>>, usize)> {
    let mut depth = 0usize;
    let mut args: Vec<Vec<Tok>> = vec![Vec::new()];
    for (j, tok) in tokens.iter().enumerate().skip(open) {
        let t = &tok.token;
        if t.is_punct("(") || t.is_punct("[") || t.is_punct("{") {
            depth += 1;
            if depth == 1 {
                continue;
            }
        } else if t.is_punct(")") || t.is_punct("]") || t.is_punct("}") {
            depth -= 1;
            if depth == 0 {
                return Some((args, j));
            }
        } else if depth == 1 && t.is_punct(",") {
            args.push(Vec::new());
            continue;
        }
        if t.kind == TokenKind::Comment {
            continue;
        }
        if let Some(current) = args.last_mut() {
            current.push(tok.clone());
        }
    }
    None
}

fn trim_trivia(mut tokens: Vec<Token>) -> Vec<Token> {
    while tokens.last().is_some_and(Token::is_trivia) {
        tokens.pop();
    }
    let lead = tokens.iter().take_while(|t| t.is_trivia()).count();
    tokens.drain(..lead);
    tokens
}

fn trim_tok_trivia(mut tokens: Vec<Tok>) -> Vec<Tok> {
    while tokens.last().is_some_and(|t| t.token.is_trivia()) {
        tokens.pop();
    }
    let lead = tokens.iter().take_while(|t| t.token.is_trivia()).count();
    tokens.drain(..lead);
    tokens
}

/// Joins backslash-continued lines, padding with newlines afterwards so the
/// total line count is unchanged.
fn join_continuations(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut pending_breaks = 0usize;
    for line in body.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        if let Some(stripped) = content.strip_suffix('\\') {
            out.push_str(stripped);
            out.push(' ');
            pending_breaks += 1;
            continue;
        }
        out.push_str(line);
        for _ in 0..pending_breaks {
            out.push('\n');
        }
        pending_breaks = 0;
    }
    out
}

fn split_lines(tokens: Vec<Token>) -> Vec<Vec<Token>> {
    let mut lines = Vec::new();
    let mut current = Vec::new();
    for token in tokens {
        let is_break = token.kind == TokenKind::Newline;
        current.push(token);
        if is_break {
            lines.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Returns the tokens after `#` when the line is a directive.
fn directive_tokens(line: &[Token]) -> Option<Vec<Token>> {
    let mut iter = line.iter().skip_while(|t| t.kind == TokenKind::Whitespace);
    let hash = iter.next()?;
    if !hash.is_punct("#") {
        return None;
    }
    let rest: Vec<Token> = iter
        .filter(|t| t.kind != TokenKind::Newline)
        .cloned()
        .collect();
    Some(trim_trivia(rest))
}

fn line_breaks(line: &[Token]) -> Vec<Token> {
    let count: usize = line
        .iter()
        .map(|t| match t.kind {
            TokenKind::Newline => 1,
            TokenKind::Comment => t.text.matches('\n').count(),
            _ => 0,
        })
        .sum();
    (0..count).map(|_| Token::new(TokenKind::Newline, "\n")).collect()
}

/// Integer evaluator for `#if` expressions after `defined` and macro
/// expansion. Unknown identifiers evaluate to zero, as in C.
struct CondEval<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> CondEval<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn evaluate(mut self) -> Option<i64> {
        let value = self.binary(0)?;
        (self.pos == self.tokens.len()).then_some(value)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn binary(&mut self, min_prec: u8) -> Option<i64> {
        let mut lhs = self.unary()?;
        loop {
            let Some(op) = self.peek().filter(|t| t.kind == TokenKind::Punct) else {
                break;
            };
            let prec = match op.text.as_str() {
                "||" => 1,
                "&&" => 2,
                "|" => 3,
                "^" => 4,
                "&" => 5,
                "==" | "!=" => 6,
                "<" | ">" | "<=" | ">=" => 7,
                "<<" | ">>" => 8,
                "+" | "-" => 9,
                "*" | "/" | "%" => 10,
                _ => break,
            };
            if prec < min_prec {
                break;
            }
            let op = op.text.clone();
            self.pos += 1;
            let rhs = self.binary(prec + 1)?;
            lhs = match op.as_str() {
                "||" => i64::from(lhs != 0 || rhs != 0),
                "&&" => i64::from(lhs != 0 && rhs != 0),
                "|" => lhs | rhs,
                "^" => lhs ^ rhs,
                "&" => lhs & rhs,
                "==" => i64::from(lhs == rhs),
                "!=" => i64::from(lhs != rhs),
                "<" => i64::from(lhs < rhs),
                ">" => i64::from(lhs > rhs),
                "<=" => i64::from(lhs <= rhs),
                ">=" => i64::from(lhs >= rhs),
                "<<" => lhs.checked_shl(u32::try_from(rhs).ok()?)?,
                ">>" => lhs.checked_shr(u32::try_from(rhs).ok()?)?,
                "+" => lhs.checked_add(rhs)?,
                "-" => lhs.checked_sub(rhs)?,
                "*" => lhs.checked_mul(rhs)?,
                "/" => lhs.checked_div(rhs)?,
                "%" => lhs.checked_rem(rhs)?,
                _ => return None,
            };
        }
        Some(lhs)
    }

    fn unary(&mut self) -> Option<i64> {
        let token = self.peek()?.clone();
        self.pos += 1;
        match token.kind {
            TokenKind::Int => parse_int(&token.text),
            TokenKind::Ident => Some(0),
            TokenKind::Punct => match token.text.as_str() {
                "!" => Some(i64::from(self.unary()? == 0)),
                "-" => self.unary()?.checked_neg(),
                "+" => self.unary(),
                "~" => Some(!self.unary()?),
                "(" => {
                    let value = self.binary(0)?;
                    if self.peek()?.is_punct(")") {
                        self.pos += 1;
                        Some(value)
                    } else {
                        None
                    }
                }
                _ => None,
            },
            _ => None,
        }
    }
}

fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim_end_matches(['u', 'U']);
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if text.len() > 1 && text.starts_with('0') {
        i64::from_str_radix(&text[1..], 8).ok()
    } else {
        text.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with_inputs(source: &str, inputs: &[&str]) -> (Preprocessed, Vec<Warning>) {
        let inputs: HashSet<String> = inputs.iter().map(|s| s.to_string()).collect();
        let mut warnings = Vec::new();
        let out = preprocess(source, &inputs, 32, &mut warnings);
        (out, warnings)
    }

    fn run(source: &str) -> (String, Vec<Warning>) {
        let (out, warnings) = run_with_inputs(source, &[]);
        (out.text, warnings)
    }

    fn squash(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn expands_object_and_function_macros() {
        let (text, warnings) = run("#define PI 3.14159\n#define SQ(x) ((x)*(x))\nfloat a = SQ(PI * 2.0);\n");
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(squash(&text), "float a = ((3.14159 * 2.0)*(3.14159 * 2.0));");
    }

    #[test]
    fn expands_nested_calls_of_the_same_macro() {
        let (text, _) = run("#define MAX2(a, b) max(a, b)\nfloat m = MAX2(MAX2(x, y), z);\n");
        assert_eq!(squash(&text), "float m = max(max(x, y), z);");
    }

    #[test]
    fn joins_continuation_lines_and_keeps_line_count() {
        let source = "#define ROT(a) mat2(cos(a), -sin(a), \\\n  sin(a), cos(a))\nmat2 r = ROT(t);\n";
        let (text, _) = run(source);
        assert_eq!(text.lines().count(), source.lines().count());
        assert!(squash(&text).contains("mat2 r = mat2(cos(t), -sin(t), sin(t), cos(t));"));
    }

    #[test]
    fn input_shadows_object_macro() {
        let (out, warnings) =
            run_with_inputs("#define amount 0.5\nfloat a = amount;\n", &["amount"]);
        assert!(squash(&out.text).contains("float a = amount;"));
        assert!(out.macros.is_empty());
        assert!(warnings.iter().any(|w| w.message.contains("amount")));
    }

    #[test]
    fn macro_names_inside_comments_are_left_alone() {
        let (text, _) = run("#define N 4\nint a = N; // N stays\n");
        assert!(text.contains("int a = 4; // N stays"));
    }

    #[test]
    fn self_reference_terminates() {
        let (text, warnings) = run("#define X X + 1\nfloat a = X;\n");
        assert_eq!(squash(&text), "float a = X + 1;");
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn evaluates_conditionals() {
        let source = "#define QUALITY 2\n#ifdef GL_ES\nprecision mediump float;\n#endif\n#if QUALITY > 1 && defined(QUALITY)\nint q = 2;\n#elif QUALITY == 1\nint q = 1;\n#else\nint q = 0;\n#endif\n";
        let (text, warnings) = run(source);
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(squash(&text), "int q = 2;");
        assert_eq!(text.lines().count(), source.lines().count());
    }

    #[test]
    fn removes_directives_with_warnings() {
        let (text, warnings) = run("#version 120\n#extension GL_OES_standard_derivatives : enable\n#pragma optimize(on)\nvoid main() {}\n");
        assert_eq!(squash(&text), "void main() {}");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("#pragma"));
    }

    #[test]
    fn malformed_calls_are_left_in_place() {
        let (text, warnings) = run("#define F(a, b) a + b\nfloat x = F(1.0);\n");
        assert!(squash(&text).contains("F(1.0)"));
        assert!(warnings.iter().any(|w| w.message.contains("expects 2")));
    }

    #[test]
    fn token_pasting() {
        let (text, _) = run("#define SWZ(v, c) v.c##c\nfloat a = SWZ(p, x);\n");
        assert_eq!(squash(&text), "float a = p.xx;");
    }

    #[test]
    fn undef_stops_expansion() {
        let (text, _) = run("#define A 1\nint a = A;\n#undef A\nint b = A;\n");
        assert_eq!(squash(&text), "int a = 1; int b = A;");
    }

    #[test]
    fn expansion_is_idempotent() {
        let source = "#define S(x) sin(x * 2.0)\n#define K 3.0\nfloat f = S(K) + S(S(1.0));\n";
        let (once, _) = run(source);
        let (twice, _) = run(&once);
        assert_eq!(once, twice);
    }
}
