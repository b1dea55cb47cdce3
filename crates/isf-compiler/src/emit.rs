//! Prints a lowered [`TranslationUnit`] as WGSL source.
//!
//! The printer assumes the rewrite pipeline already did its job: it maps
//! each node to its WGSL spelling and inserts the parentheses WGSL's stricter
//! operator grammar demands, but it never changes meaning.
use std::collections::HashSet;

use crate::ast::{
    BinOp, Case, CaseLabel, Expr, Function, Item, Stmt, Storage, StructDef, TranslationUnit,
    UnaryOp, VarDecl,
};
use crate::passes::entry::{POSITION, UV};
use crate::types::GlslType;

const INDENT: &str = "    ";

pub fn emit_unit(unit: &TranslationUnit) -> String {
    let mut printer = Printer::new(unit.functions().map(|f| f.name.clone()).collect());
    let mut previous: Option<&Item> = None;
    for item in &unit.items {
        let separate = match (previous, item) {
            (None, _) => false,
            (Some(Item::Global(_)), Item::Global(_)) => false,
            _ => true,
        };
        if separate {
            printer.out.push('\n');
        }
        printer.item(item);
        previous = Some(item);
    }
    printer.out
}

/// Prints loose statements at the top level.
#[cfg(test)]
pub fn emit_stmts(stmts: &[Stmt]) -> String {
    let mut printer = Printer::new(HashSet::new());
    for stmt in stmts {
        printer.stmt(stmt);
    }
    printer.out
}

pub fn emit_expr(expr: &Expr) -> String {
    let mut printer = Printer::new(HashSet::new());
    printer.expr(expr);
    printer.out
}

struct Printer {
    out: String,
    depth: usize,
    /// User functions may be called as statements; built-ins are
    /// `@must_use` and need a phony assignment.
    functions: HashSet<String>,
}

impl Printer {
    fn new(functions: HashSet<String>) -> Self {
        Self {
            out: String::new(),
            depth: 0,
            functions,
        }
    }

    fn line_start(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }

    fn item(&mut self, item: &Item) {
        match item {
            Item::Struct(def) => self.struct_def(def),
            Item::Global(decls) => {
                for decl in decls {
                    self.global(decl);
                }
            }
            Item::Function(function) => self.function(function),
        }
    }

    fn struct_def(&mut self, def: &StructDef) {
        self.out.push_str(&format!("struct {} {{\n", def.name));
        for field in &def.fields {
            self.out
                .push_str(&format!("{INDENT}{}: {},\n", field.name, field.ty.wgsl()));
        }
        self.out.push_str("}\n");
    }

    fn global(&mut self, decl: &VarDecl) {
        let keyword = match decl.storage {
            Storage::Const if decl.init.is_some() => "const",
            _ => "var<private>",
        };
        self.out
            .push_str(&format!("{keyword} {}: {}", decl.name, decl.ty.wgsl()));
        if let Some(init) = &decl.init {
            self.out.push_str(" = ");
            self.expr(init);
        }
        self.out.push_str(";\n");
    }

    fn function(&mut self, function: &Function) {
        if function.entry {
            self.out.push_str(&format!(
                "@fragment\nfn {}(@builtin(position) {POSITION}: vec4<f32>, @location(0) {UV}: vec2<f32>) -> @location(0) vec4<f32> ",
                function.name
            ));
        } else {
            let params = function
                .params
                .iter()
                .map(|p| {
                    if p.is_by_ref() {
                        format!("{}: ptr<function, {}>", p.name, p.ty.wgsl())
                    } else {
                        format!("{}: {}", p.name, p.ty.wgsl())
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            self.out.push_str(&format!("fn {}({params})", function.name));
            if function.ret != GlslType::Void {
                self.out.push_str(&format!(" -> {}", function.ret.wgsl()));
            }
            self.out.push(' ');
        }
        self.block(&function.body);
        self.out.push('\n');
    }

    /// `{ ... }` without a trailing newline.
    fn block(&mut self, stmts: &[Stmt]) {
        self.out.push_str("{\n");
        self.depth += 1;
        for stmt in stmts {
            self.stmt(stmt);
        }
        self.depth -= 1;
        self.line_start();
        self.out.push('}');
    }

    /// A statement in a position that takes a braced body.
    fn body(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(stmts) => self.block(stmts),
            other => self.block(std::slice::from_ref(other)),
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        if matches!(stmt, Stmt::Empty) {
            return;
        }
        self.line_start();
        match stmt {
            Stmt::Decl(decls) => {
                for (index, decl) in decls.iter().enumerate() {
                    if index > 0 {
                        self.out.push('\n');
                        self.line_start();
                    }
                    self.local(decl);
                    self.out.push(';');
                }
            }
            Stmt::Expr(expr) => {
                self.expr_stmt(expr);
                self.out.push(';');
            }
            Stmt::Block(stmts) => self.block(stmts),
            Stmt::If { .. } => self.if_chain(stmt),
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                self.out.push_str("for (");
                match init.as_deref() {
                    Some(Stmt::Decl(decls)) if decls.len() == 1 => self.local(&decls[0]),
                    Some(Stmt::Expr(expr)) => self.expr_stmt(expr),
                    _ => {}
                }
                self.out.push_str("; ");
                if let Some(cond) = cond {
                    self.expr(cond);
                }
                self.out.push_str("; ");
                if let Some(step) = step {
                    self.expr_stmt(step);
                }
                self.out.push_str(") ");
                self.body(body);
            }
            Stmt::While { cond, body } => {
                self.out.push_str("while (");
                self.expr(cond);
                self.out.push_str(") ");
                self.body(body);
            }
            Stmt::DoWhile { body, cond } => {
                let exit = Expr::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(cond.clone()),
                };
                self.loop_stmt(std::slice::from_ref(body.as_ref()), &[], Some(&exit));
            }
            Stmt::Loop {
                body,
                continuing,
                break_if,
            } => self.loop_stmt(body, continuing, break_if.as_ref()),
            Stmt::Switch { selector, cases } => {
                self.out.push_str("switch (");
                self.expr(selector);
                self.out.push_str(") {\n");
                self.depth += 1;
                for case in cases {
                    self.case(case);
                }
                self.depth -= 1;
                self.line_start();
                self.out.push('}');
            }
            Stmt::Return(value) => {
                self.out.push_str("return");
                if let Some(value) = value {
                    self.out.push(' ');
                    self.expr(value);
                }
                self.out.push(';');
            }
            Stmt::Break => self.out.push_str("break;"),
            Stmt::Continue => self.out.push_str("continue;"),
            Stmt::Discard => self.out.push_str("discard;"),
            Stmt::Empty => {}
        }
        self.out.push('\n');
    }

    fn local(&mut self, decl: &VarDecl) {
        let keyword = match (decl.storage, &decl.init) {
            (Storage::Const, Some(_)) => "let",
            _ => "var",
        };
        self.out
            .push_str(&format!("{keyword} {}: {}", decl.name, decl.ty.wgsl()));
        if let Some(init) = &decl.init {
            self.out.push_str(" = ");
            self.expr(init);
        }
    }

    fn expr_stmt(&mut self, expr: &Expr) {
        let bare = match expr {
            Expr::Assign { .. } => true,
            Expr::Unary { op, .. } => op.is_step(),
            Expr::Call { name, .. } => self.functions.contains(name),
            _ => false,
        };
        if !bare {
            self.out.push_str("_ = ");
        }
        self.expr(expr);
    }

    fn if_chain(&mut self, stmt: &Stmt) {
        let Stmt::If {
            cond,
            then,
            otherwise,
        } = stmt
        else {
            return;
        };
        self.out.push_str("if (");
        self.expr(cond);
        self.out.push_str(") ");
        self.body(then);
        match otherwise.as_deref() {
            Some(nested @ Stmt::If { .. }) => {
                self.out.push_str(" else ");
                self.if_chain(nested);
            }
            Some(other) => {
                self.out.push_str(" else ");
                self.body(other);
            }
            None => {}
        }
    }

    fn loop_stmt(&mut self, body: &[Stmt], continuing: &[Stmt], break_if: Option<&Expr>) {
        self.out.push_str("loop {\n");
        self.depth += 1;
        for stmt in body {
            self.stmt(stmt);
        }
        if !continuing.is_empty() || break_if.is_some() {
            self.line_start();
            self.out.push_str("continuing {\n");
            self.depth += 1;
            for stmt in continuing {
                self.stmt(stmt);
            }
            if let Some(cond) = break_if {
                self.line_start();
                self.out.push_str("break if ");
                self.expr(cond);
                self.out.push_str(";\n");
            }
            self.depth -= 1;
            self.line_start();
            self.out.push_str("}\n");
        }
        self.depth -= 1;
        self.line_start();
        self.out.push('}');
    }

    fn case(&mut self, case: &Case) {
        self.line_start();
        let values: Vec<&Expr> = case
            .labels
            .iter()
            .filter_map(|label| match label {
                CaseLabel::Value(expr) => Some(expr),
                CaseLabel::Default => None,
            })
            .collect();
        let default = case.labels.contains(&CaseLabel::Default);
        if values.is_empty() {
            self.out.push_str("default");
        } else {
            self.out.push_str("case ");
            for (index, value) in values.iter().enumerate() {
                if index > 0 {
                    self.out.push_str(", ");
                }
                self.expr(value);
            }
            if default {
                self.out.push_str(", default");
            }
        }
        self.out.push_str(": ");
        self.block(&case.body);
        self.out.push('\n');
    }

    fn exprs(&mut self, exprs: &[Expr]) {
        for (index, expr) in exprs.iter().enumerate() {
            if index > 0 {
                self.out.push_str(", ");
            }
            self.expr(expr);
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Int(text) | Expr::Float(text) => self.out.push_str(text),
            Expr::Bool(value) => self.out.push_str(if *value { "true" } else { "false" }),
            Expr::Ident(name) => self.out.push_str(name),
            Expr::Unary { op, expr: operand } => match op {
                UnaryOp::PreInc | UnaryOp::PostInc => {
                    self.postfix_operand(operand);
                    self.out.push_str("++");
                }
                UnaryOp::PreDec | UnaryOp::PostDec => {
                    self.postfix_operand(operand);
                    self.out.push_str("--");
                }
                UnaryOp::Plus => self.unary_operand(operand),
                UnaryOp::Neg | UnaryOp::Not | UnaryOp::BitNot => {
                    self.out.push_str(match op {
                        UnaryOp::Neg => "-",
                        UnaryOp::Not => "!",
                        _ => "~",
                    });
                    self.unary_operand(operand);
                }
            },
            Expr::Binary { op, lhs, rhs } => {
                self.operand(lhs, |child| needs_parens(*op, child, Side::Left));
                // `^^` survives only when semantics lowering was skipped.
                let symbol = if *op == BinOp::Xor { "!=" } else { op.symbol() };
                self.out.push_str(&format!(" {symbol} "));
                self.operand(rhs, |child| needs_parens(*op, child, Side::Right));
            }
            Expr::Assign { op, lhs, rhs } => {
                self.expr(lhs);
                match op {
                    Some(op) => self.out.push_str(&format!(" {}= ", op.symbol())),
                    None => self.out.push_str(" = "),
                }
                self.expr(rhs);
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                self.out.push_str("select(");
                self.expr(otherwise);
                self.out.push_str(", ");
                self.expr(then);
                self.out.push_str(", ");
                self.expr(cond);
                self.out.push(')');
            }
            Expr::Call { name, args } => {
                self.out.push_str(name);
                self.out.push('(');
                self.exprs(args);
                self.out.push(')');
            }
            Expr::Construct { ty, args } => {
                self.out.push_str(&ty.wgsl());
                self.out.push('(');
                self.exprs(args);
                self.out.push(')');
            }
            Expr::Field { base, name } => {
                self.postfix_operand(base);
                self.out.push('.');
                self.out.push_str(name);
            }
            Expr::Index { base, index } => {
                self.postfix_operand(base);
                self.out.push('[');
                self.expr(index);
                self.out.push(']');
            }
            Expr::Comma(exprs) => {
                self.out.push('(');
                self.exprs(exprs);
                self.out.push(')');
            }
            Expr::Deref(inner) => {
                self.out.push_str("(*");
                self.expr(inner);
                self.out.push(')');
            }
            Expr::AddrOf(inner) => {
                self.out.push('&');
                self.postfix_operand(inner);
            }
        }
    }

    fn operand(&mut self, expr: &Expr, parens: impl Fn(&Expr) -> bool) {
        if parens(expr) {
            self.out.push('(');
            self.expr(expr);
            self.out.push(')');
        } else {
            self.expr(expr);
        }
    }

    fn unary_operand(&mut self, expr: &Expr) {
        self.operand(expr, |e| {
            !is_primary(e) || matches!(e, Expr::Unary { op, .. } if !op.is_step())
        });
    }

    fn postfix_operand(&mut self, expr: &Expr) {
        self.operand(expr, |e| !is_primary(e));
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Literals, names, calls and postfix chains never need wrapping.
fn is_primary(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Int(_)
            | Expr::Float(_)
            | Expr::Bool(_)
            | Expr::Ident(_)
            | Expr::Call { .. }
            | Expr::Construct { .. }
            | Expr::Field { .. }
            | Expr::Index { .. }
            | Expr::Deref(_)
            | Expr::Ternary { .. }
    )
}

/// WGSL has no total precedence order: bitwise and shift operands must be
/// unary expressions, logical operands may not be bitwise, and comparisons
/// do not chain.
fn needs_parens(parent: BinOp, child: &Expr, side: Side) -> bool {
    let Expr::Binary { op: child, .. } = child else {
        return matches!(child, Expr::Assign { .. } | Expr::Comma(_));
    };
    let child = *child;
    if parent.is_bitwise() {
        return !(child == parent && side == Side::Left);
    }
    if parent.is_shift() {
        return true;
    }
    if parent.is_logical() {
        if child.is_logical() {
            return !(child == parent && side == Side::Left);
        }
        return child.is_bitwise();
    }
    if parent.is_comparison() {
        return child.is_comparison() || child.is_logical() || child.is_bitwise();
    }
    // Arithmetic.
    if !child.is_arithmetic() {
        return true;
    }
    match side {
        Side::Left => child.precedence() < parent.precedence(),
        Side::Right => child.precedence() <= parent.precedence(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn round_trip(source: &str) -> String {
        emit_unit(&parser::parse(source).unwrap())
    }

    #[test]
    fn prints_functions_and_locals() {
        let out = round_trip("float f(float a, int b) { const float k = 2.0; float x; return a * k; }");
        assert_eq!(
            out,
            "fn f(a: f32, b: i32) -> f32 {\n    let k: f32 = 2.0;\n    var x: f32;\n    return a * k;\n}\n"
        );
    }

    #[test]
    fn keeps_grouping_parentheses() {
        let out = round_trip("void g() { float x = (a + b) * (c - d) - (e - f); }");
        assert!(out.contains("var x: f32 = (a + b) * (c - d) - (e - f);"), "{out}");
        let out = round_trip("void g() { float y = a - b - c; float z = a / (b * c); }");
        assert!(out.contains("var y: f32 = a - b - c;"), "{out}");
        assert!(out.contains("var z: f32 = a / (b * c);"), "{out}");
    }

    #[test]
    fn wraps_operands_wgsl_refuses_to_mix() {
        let out = round_trip("void g() { int x = a & b + 1; bool y = a < b && c | d; int z = a << b + 1; }");
        assert!(out.contains("var x: i32 = a & (b + 1);"), "{out}");
        assert!(out.contains("var y: bool = a < b && (c | d);"), "{out}");
        assert!(out.contains("var z: i32 = a << (b + 1);"), "{out}");
    }

    #[test]
    fn builtin_calls_as_statements_are_phony_assignments() {
        let out = round_trip("void h() {}\nvoid g() { h(); sin(1.0); x; }");
        assert!(out.contains("    h();\n"), "{out}");
        assert!(out.contains("_ = sin(1.0);"), "{out}");
        assert!(out.contains("_ = x;"), "{out}");
    }

    #[test]
    fn globals_group_together() {
        let out = round_trip("const float A = 1.0;\nfloat b;\nvoid g() {}");
        assert_eq!(
            out,
            "const A: f32 = 1.0;\nvar<private> b: f32;\n\nfn g() {\n}\n"
        );
    }

    #[test]
    fn negation_of_negation_is_parenthesised() {
        let expr = Expr::Unary {
            op: UnaryOp::Neg,
            expr: Box::new(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(Expr::ident("x")),
            }),
        };
        assert_eq!(emit_expr(&expr), "-(-x)");
    }
}
