//! Parameter passing: `out`/`inout` parameters become function-space
//! pointers, and by-value parameters the body writes to get a local copy.
//!
//! Call sites pass `&local` when the argument is a whole local variable and
//! route anything else (globals, components, built-ins) through a temporary
//! that is written back after the call, since WGSL only accepts pointers to
//! whole function-scope variables.
use std::collections::{HashMap, HashSet};

use crate::ast::{Expr, Function, ParamQualifier, Stmt, TranslationUnit, UnaryOp, VarDecl};
use crate::context::CompilationContext;
use crate::diagnostics::Stage;
use crate::emit::emit_expr;
use crate::passes::{rewrite, Rewrite};
use crate::types::{Env, GlslType};

/// Scope depth of parameters in the rewrite walk.
const PARAM_DEPTH: usize = 1;

pub fn run(unit: &mut TranslationUnit, cx: &mut CompilationContext) {
    let by_ref = unit
        .functions()
        .map(|f| (f.name.clone(), f.params.iter().map(|p| p.is_by_ref()).collect()))
        .collect();
    let mut env = cx.env_for(unit);
    rewrite(
        unit,
        &mut env,
        &mut Params {
            cx,
            by_ref,
            pointers: HashSet::new(),
            lowered: HashSet::new(),
            ret: GlslType::Void,
            before: Vec::new(),
            after: Vec::new(),
        },
    );
}

struct Params<'c, 'a> {
    cx: &'c mut CompilationContext<'a>,
    by_ref: HashMap<String, Vec<bool>>,
    /// `out`/`inout` parameters of the function being rewritten.
    pointers: HashSet<String>,
    /// Parameters a previous run already turned into pointers.
    lowered: HashSet<String>,
    ret: GlslType,
    /// Temporaries for the statement being rewritten.
    before: Vec<Stmt>,
    after: Vec<Stmt>,
}

impl Rewrite for Params<'_, '_> {
    fn enter_function(&mut self, function: &mut Function, _env: &Env) {
        self.ret = function.ret.clone();
        self.pointers = params_with(function, |q| {
            matches!(q, ParamQualifier::Out | ParamQualifier::InOut)
        });
        self.lowered = params_with(function, |q| q == ParamQualifier::Pointer);

        let written = written_roots(&function.body, &self.by_ref);
        let mut shadows = Vec::new();
        for param in &mut function.params {
            if param.is_by_ref() || !written.contains(&param.name) {
                continue;
            }
            let incoming = format!("{}in_{}", self.cx.options.rename_prefix, param.name);
            let local = std::mem::replace(&mut param.name, incoming.clone());
            shadows.push(Stmt::decl(VarDecl::var(
                local,
                param.ty.clone(),
                Some(Expr::ident(incoming)),
            )));
        }
        if !shadows.is_empty() {
            shadows.append(&mut function.body);
            function.body = shadows;
        }
    }

    fn exit_function(&mut self, function: &mut Function, _env: &Env) {
        for param in function.params.iter_mut().filter(|p| p.is_by_ref()) {
            param.qualifier = ParamQualifier::Pointer;
        }
        self.pointers.clear();
        self.lowered.clear();
    }

    fn expr(&mut self, expr: &mut Expr, env: &Env) {
        match expr {
            Expr::Ident(name)
                if self.pointers.contains(name.as_str())
                    && env.resolve_depth(name) == Some(PARAM_DEPTH) =>
            {
                expr.replace_with(|old| Expr::Deref(Box::new(old)));
            }
            Expr::Call { name, args } => {
                let Some(flags) = self.by_ref.get(name.as_str()) else {
                    return;
                };
                let positions: Vec<usize> = flags
                    .iter()
                    .enumerate()
                    .filter(|(_, by_ref)| **by_ref)
                    .map(|(index, _)| index)
                    .collect();
                for index in positions {
                    if let Some(arg) = args.get_mut(index) {
                        self.pass_by_ref(arg, env);
                    }
                }
            }
            _ => {}
        }
    }

    fn stmt(&mut self, stmt: Stmt, _env: &Env) -> Vec<Stmt> {
        if self.before.is_empty() && self.after.is_empty() {
            return vec![stmt];
        }
        if matches!(stmt, Stmt::For { .. } | Stmt::While { .. } | Stmt::Loop { .. }) {
            self.cx.warn(
                Stage::Rewrite,
                "out argument in a loop header is copied back once, outside the loop",
            );
        }
        let mut out = std::mem::take(&mut self.before);
        let after = std::mem::take(&mut self.after);
        match stmt {
            Stmt::Return(Some(value)) if !after.is_empty() && self.ret != GlslType::Void => {
                let result = self.cx.temp("ret");
                out.push(Stmt::decl(VarDecl::var(
                    result.clone(),
                    self.ret.clone(),
                    Some(value),
                )));
                out.extend(after);
                out.push(Stmt::Return(Some(Expr::ident(result))));
            }
            stmt => {
                out.push(stmt);
                out.extend(after);
            }
        }
        out
    }
}

impl Params<'_, '_> {
    fn pass_by_ref(&mut self, arg: &mut Expr, env: &Env) {
        match arg {
            // Already a pointer parameter of the caller.
            Expr::Deref(inner) if inner.as_ident().is_some_and(|n| self.pointers.contains(n)) => {
                let pointer = std::mem::replace(inner.as_mut(), Expr::Bool(false));
                *arg = pointer;
            }
            Expr::Ident(name)
                if self.lowered.contains(name.as_str())
                    && env.resolve_depth(name) == Some(PARAM_DEPTH) => {}
            Expr::Ident(name) if env.is_local(name) => {
                arg.replace_with(|old| Expr::AddrOf(Box::new(old)));
            }
            Expr::AddrOf(_) => {}
            _ => {
                if arg.root_ident().is_none() {
                    let message = format!(
                        "out argument `{}` is not assignable; passed through a discarded temporary",
                        emit_expr(arg)
                    );
                    self.cx.warn(Stage::Rewrite, message);
                }
                let Some(ty) = env.type_of(arg) else {
                    let message = format!(
                        "cannot infer the type of out argument `{}`; passed by address as written",
                        emit_expr(arg)
                    );
                    self.cx.warn(Stage::Rewrite, message);
                    arg.replace_with(|old| Expr::AddrOf(Box::new(old)));
                    return;
                };
                let temp = self.cx.temp("arg");
                let original = std::mem::replace(arg, Expr::AddrOf(Box::new(Expr::ident(&temp))));
                if original.root_ident().is_some() {
                    self.after
                        .push(Stmt::Expr(Expr::assign(original.clone(), Expr::ident(&temp))));
                }
                self.before
                    .push(Stmt::decl(VarDecl::var(temp, ty, Some(original))));
            }
        }
    }
}

fn params_with(function: &Function, keep: impl Fn(ParamQualifier) -> bool) -> HashSet<String> {
    function
        .params
        .iter()
        .filter(|p| keep(p.qualifier))
        .map(|p| p.name.clone())
        .collect()
}

/// Root variables a function body assigns, steps or passes by reference.
fn written_roots(body: &[Stmt], by_ref: &HashMap<String, Vec<bool>>) -> HashSet<String> {
    let mut written = HashSet::new();
    let mut note = |expr: &Expr| {
        let target = match expr {
            Expr::Assign { lhs, .. } => lhs.root_ident(),
            Expr::Unary { op, expr } if op.is_step() => expr.root_ident(),
            Expr::Unary {
                op: UnaryOp::Not, ..
            } => None,
            Expr::Call { name, args } => {
                if let Some(flags) = by_ref.get(name) {
                    for (arg, flag) in args.iter().zip(flags) {
                        if *flag {
                            if let Some(root) = arg.root_ident() {
                                written.insert(root.to_string());
                            }
                        }
                    }
                }
                None
            }
            _ => None,
        };
        if let Some(root) = target {
            written.insert(root.to_string());
        }
    };
    for stmt in body {
        stmt.visit_exprs(&mut note);
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::testing::{squash, Fixture};

    const SOURCE: &str = "void tint(inout vec4 c, float v) { c.r = v; v = 2.0; c *= v; }\n\
        void split(vec4 c, out float a) { a = c.a; }\n\
        void main() { vec4 col = vec4(0.0); float alpha;\n\
        tint(col, 1.0); tint(gl_FragColor, 0.5); split(col, alpha); split(col, col.w); }";

    fn lower() -> String {
        squash(&Fixture::new().run(SOURCE, &[run]).0)
    }

    #[test]
    fn out_parameters_become_pointers() {
        let out = lower();
        assert!(out.contains("fn tint(c: ptr<function, vec4<f32>>, isf_in_v: f32)"), "{out}");
        assert!(out.contains("(*c).r = v;"), "{out}");
        assert!(out.contains("(*c) *= v;"), "{out}");
        assert!(out.contains("fn split(c: vec4<f32>, a: ptr<function, f32>)"), "{out}");
        assert!(out.contains("(*a) = c.a;"), "{out}");
    }

    #[test]
    fn reassigned_parameters_get_a_local_copy() {
        let out = lower();
        assert!(out.contains("{ var v: f32 = isf_in_v; (*c).r = v; v = 2.0;"), "{out}");
    }

    #[test]
    fn call_sites_pass_addresses_or_temporaries() {
        let out = lower();
        assert!(out.contains("tint(&col, 1.0);"), "{out}");
        assert!(
            out.contains("var isf_arg0: vec4<f32> = gl_FragColor; tint(&isf_arg0, 0.5); gl_FragColor = isf_arg0;"),
            "{out}"
        );
        assert!(out.contains("split(col, &alpha);"), "{out}");
        assert!(
            out.contains("var isf_arg1: f32 = col.w; split(col, &isf_arg1); col.w = isf_arg1;"),
            "{out}"
        );
    }

    #[test]
    fn lowering_twice_changes_nothing() {
        let passes: &[crate::passes::testing::Pass] = &[run];
        let (once, _) = Fixture::new().run(SOURCE, passes);
        let (twice, _) = Fixture::new().run(SOURCE, &[run, run]);
        assert_eq!(once, twice);
        assert!(!twice.contains("(*(*"), "{twice}");
    }

    #[test]
    fn writeback_happens_before_return() {
        let (out, _) = Fixture::new().run(
            "float grab(out float x) { x = 1.0; return x; }\n\
             float g;\n\
             float use_it() { return grab(g) * 2.0; }",
            &[run],
        );
        let out = squash(&out);
        assert!(
            out.contains("var isf_arg0: f32 = g; var isf_ret1: f32 = grab(&isf_arg0) * 2.0; g = isf_arg0; return isf_ret1;"),
            "{out}"
        );
    }
}
