//! The rewrite pipeline.
//!
//! Each pass is a tree transformation over [`TranslationUnit`]. Most are
//! written against the [`Rewrite`] hooks and driven by [`rewrite`], which
//! walks the tree in post-order while keeping a scoped [`Env`] in sync, so a
//! hook always sees already-rewritten children and the types of everything
//! declared so far.
//!
//! Order matters: each pass relies on the shape earlier passes leave behind
//! (brace lowering expects ternaries to be gone, parameter lowering expects
//! overloads to have unique names, and so on). [`run`] fixes that order.
use tracing::debug;

use crate::ast::{Expr, Function, Item, Stmt, TranslationUnit, VarDecl};
use crate::context::CompilationContext;
use crate::error::CompileError;
use crate::types::Env;

pub mod braces;
pub mod builtins;
pub mod declarations;
pub mod entry;
pub mod globals;
pub mod overloads;
pub mod params;
pub mod promotion;
pub mod reserved;
pub mod semantics;
pub mod swizzle;
pub mod ternary;
pub mod textures;

/// Hooks for one pass. Every hook runs after the node's children.
pub(crate) trait Rewrite {
    fn enter_function(&mut self, _function: &mut Function, _env: &Env) {}

    fn exit_function(&mut self, _function: &mut Function, _env: &Env) {}

    fn expr(&mut self, _expr: &mut Expr, _env: &Env) {}

    /// May replace one statement with any number of statements.
    fn stmt(&mut self, stmt: Stmt, _env: &Env) -> Vec<Stmt> {
        vec![stmt]
    }

    fn global(&mut self, _decl: &mut VarDecl, _env: &Env) {}
}

/// Every pass, in the order [`run`] applies them. Each one leaves its own
/// output unchanged when applied again.
const PIPELINE: &[(&str, fn(&mut TranslationUnit, &mut CompilationContext))] = &[
    ("declarations", declarations::run),
    ("swizzle-aliases", swizzle::expand_aliases),
    ("ternary", ternary::run),
    ("braces", braces::run),
    ("swizzle-assignment", swizzle::lower_assignments),
    ("promotion", promotion::run),
    ("semantics", semantics::run),
    ("textures", textures::run),
    ("overloads", overloads::run),
    ("params", params::run),
    ("builtins", builtins::run),
    ("reserved", reserved::run),
    ("globals", globals::run),
    ("entry", entry::run),
];

/// Runs every pass in order.
pub fn run(unit: &mut TranslationUnit, cx: &mut CompilationContext) -> Result<(), CompileError> {
    for (name, pass) in PIPELINE {
        let before = cx.warnings.len();
        pass(unit, cx);
        debug!(
            pass = *name,
            warnings = cx.warnings.len() - before,
            "rewrite pass done"
        );
    }
    check_lowered(unit)
}

/// Rejects trees that still hold source-only constructs. Reaching this is a
/// bug in a pass, not in the input.
fn check_lowered(unit: &TranslationUnit) -> Result<(), CompileError> {
    let mut leftover: Option<&'static str> = None;
    let mut check_expr = |expr: &Expr| {
        if matches!(expr, Expr::Ternary { .. }) {
            leftover = Some("conditional expression");
        }
    };
    let mut do_while = false;
    for item in &unit.items {
        match item {
            Item::Global(decls) => {
                for init in decls.iter().filter_map(|d| d.init.as_ref()) {
                    init.visit(&mut check_expr);
                }
            }
            Item::Function(function) => {
                for stmt in &function.body {
                    stmt.visit_exprs(&mut check_expr);
                    do_while |= contains_do_while(stmt);
                }
            }
            Item::Struct(_) => {}
        }
    }
    if do_while {
        leftover = Some("do-while loop");
    }
    if !unit.functions().any(|f| f.entry) {
        leftover = Some("missing entry point");
    }
    match leftover {
        Some(what) => Err(CompileError::Internal(format!(
            "{what} survived the rewrite pipeline"
        ))),
        None => Ok(()),
    }
}

fn contains_do_while(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::DoWhile { .. }) || stmt.children().into_iter().any(contains_do_while)
}

/// Drives `r` over the whole unit.
pub(crate) fn rewrite<R: Rewrite>(unit: &mut TranslationUnit, env: &mut Env, r: &mut R) {
    for item in &mut unit.items {
        match item {
            Item::Global(decls) => {
                for decl in decls.iter_mut() {
                    if let Some(init) = decl.init.as_mut() {
                        walk_expr(init, env, r);
                    }
                    r.global(decl, env);
                }
            }
            Item::Function(function) => {
                env.push();
                for param in &function.params {
                    env.declare(&param.name, param.ty.clone());
                }
                r.enter_function(function, env);
                let body = std::mem::take(&mut function.body);
                function.body = walk_block(body, env, r);
                r.exit_function(function, env);
                env.pop();
            }
            Item::Struct(_) => {}
        }
    }
}

fn walk_block<R: Rewrite>(stmts: Vec<Stmt>, env: &mut Env, r: &mut R) -> Vec<Stmt> {
    env.push();
    let out = walk_stmts(stmts, env, r);
    env.pop();
    out
}

fn walk_stmts<R: Rewrite>(stmts: Vec<Stmt>, env: &mut Env, r: &mut R) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        for rewritten in walk_stmt(stmt, env, r) {
            declare(&rewritten, env);
            out.push(rewritten);
        }
    }
    out
}

fn declare(stmt: &Stmt, env: &mut Env) {
    if let Stmt::Decl(decls) = stmt {
        for decl in decls {
            env.declare(&decl.name, decl.ty.clone());
        }
    }
}

/// A nested statement position that must stay a single statement.
fn walk_branch<R: Rewrite>(stmt: Stmt, env: &mut Env, r: &mut R) -> Stmt {
    let mut out = walk_stmt(stmt, env, r);
    if out.len() == 1 {
        out.remove(0)
    } else {
        Stmt::Block(out)
    }
}

/// Statement bodies are rewritten before the statement's own expressions, so
/// anything a hook queues while visiting those expressions belongs to this
/// statement and not to one nested inside it.
fn walk_stmt<R: Rewrite>(stmt: Stmt, env: &mut Env, r: &mut R) -> Vec<Stmt> {
    let mut prefix = Vec::new();
    let stmt = match stmt {
        Stmt::Block(stmts) => Stmt::Block(walk_block(stmts, env, r)),
        Stmt::If {
            mut cond,
            then,
            otherwise,
        } => {
            let then = Box::new(walk_branch(*then, env, r));
            let otherwise = otherwise.map(|o| Box::new(walk_branch(*o, env, r)));
            walk_expr(&mut cond, env, r);
            Stmt::If {
                cond,
                then,
                otherwise,
            }
        }
        Stmt::For {
            init,
            mut cond,
            mut step,
            body,
        } => {
            env.push();
            let init = match init {
                Some(init) => {
                    let mut stmts = walk_stmt(*init, env, r);
                    for s in &stmts {
                        declare(s, env);
                    }
                    let last = stmts.pop();
                    prefix = stmts;
                    last.map(Box::new)
                }
                None => None,
            };
            let body = Box::new(walk_branch(*body, env, r));
            if let Some(cond) = cond.as_mut() {
                walk_expr(cond, env, r);
            }
            if let Some(step) = step.as_mut() {
                walk_expr(step, env, r);
            }
            env.pop();
            Stmt::For {
                init,
                cond,
                step,
                body,
            }
        }
        Stmt::While { mut cond, body } => {
            let body = Box::new(walk_branch(*body, env, r));
            walk_expr(&mut cond, env, r);
            Stmt::While { cond, body }
        }
        Stmt::DoWhile { body, mut cond } => {
            let body = Box::new(walk_branch(*body, env, r));
            walk_expr(&mut cond, env, r);
            Stmt::DoWhile { body, cond }
        }
        Stmt::Loop {
            body,
            continuing,
            mut break_if,
        } => {
            env.push();
            let body = walk_stmts(body, env, r);
            let continuing = walk_stmts(continuing, env, r);
            if let Some(cond) = break_if.as_mut() {
                walk_expr(cond, env, r);
            }
            env.pop();
            Stmt::Loop {
                body,
                continuing,
                break_if,
            }
        }
        Stmt::Switch {
            mut selector,
            cases,
        } => {
            let cases = cases
                .into_iter()
                .map(|mut case| {
                    case.body = walk_block(case.body, env, r);
                    case
                })
                .collect::<Vec<_>>();
            walk_expr(&mut selector, env, r);
            Stmt::Switch { selector, cases }
        }
        mut other => {
            for expr in other.exprs_mut() {
                walk_expr(expr, env, r);
            }
            other
        }
    };

    let rewritten = r.stmt(stmt, env);
    if prefix.is_empty() {
        return rewritten;
    }
    prefix.extend(rewritten);
    vec![Stmt::Block(prefix)]
}

fn walk_expr<R: Rewrite>(expr: &mut Expr, env: &mut Env, r: &mut R) {
    for child in expr.children_mut() {
        walk_expr(child, env, r);
    }
    r.expr(expr, env);
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers shared by the pass tests: parse a body, run selected passes
    //! and print the result as WGSL.
    use crate::context::CompilationContext;
    use crate::emit;
    use crate::layout;
    use crate::metadata::{InputDecl, InputKind, IsfMetadata};
    use crate::options::CompilerOptions;
    use crate::parser;
    use crate::ast::TranslationUnit;

    pub type Pass = fn(&mut TranslationUnit, &mut CompilationContext);

    pub struct Fixture {
        pub options: CompilerOptions,
        pub metadata: IsfMetadata,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self {
                options: CompilerOptions::default(),
                metadata: IsfMetadata::default(),
            }
        }

        pub fn input(mut self, name: &str, kind: InputKind) -> Self {
            self.metadata.inputs.push(InputDecl::new(name, kind));
            self
        }

        /// Runs `passes` over `source` and returns the printed unit plus any
        /// warning messages.
        pub fn run(&self, source: &str, passes: &[Pass]) -> (String, Vec<String>) {
            let mut warnings = Vec::new();
            let layout = layout::analyze(&self.metadata, &self.options.rename_prefix, &mut warnings);
            let mut cx = CompilationContext::new(&self.options, &self.metadata, layout, warnings);
            let mut unit = parser::parse(source).unwrap();
            for pass in passes {
                pass(&mut unit, &mut cx);
            }
            let text = emit::emit_unit(&unit);
            let messages = cx.warnings.iter().map(|w| w.message.clone()).collect();
            (text, messages)
        }
    }

    /// Collapses runs of whitespace so assertions ignore indentation.
    pub fn squash(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
