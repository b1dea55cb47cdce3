//! One declarator per declaration, and removal of interface declarations
//! the host provides itself.
use crate::ast::{Item, Stmt, Storage, TranslationUnit, VarDecl};
use crate::context::CompilationContext;
use crate::diagnostics::Stage;
use crate::passes::{rewrite, Rewrite};
use crate::types::Env;

pub fn run(unit: &mut TranslationUnit, cx: &mut CompilationContext) {
    let items = std::mem::take(&mut unit.items);
    for item in items {
        match item {
            Item::Global(decls) => {
                for decl in decls {
                    if keep_global(&decl, cx) {
                        unit.items.push(Item::Global(vec![decl]));
                    }
                }
            }
            other => unit.items.push(other),
        }
    }

    let mut env = cx.env_for(unit);
    rewrite(unit, &mut env, &mut Split);
}

fn keep_global(decl: &VarDecl, cx: &mut CompilationContext) -> bool {
    match decl.storage {
        Storage::Var | Storage::Const => true,
        Storage::Uniform => {
            let message = if cx.metadata.input(&decl.name).is_some()
                || cx.pass_index(&decl.name).is_some()
                || cx.layout.field(&decl.name).is_some()
            {
                format!("removed `uniform {}`; the header already provides it", decl.name)
            } else {
                format!(
                    "removed `uniform {}` which no header input declares; uses will not resolve",
                    decl.name
                )
            };
            cx.warn(Stage::Rewrite, message);
            false
        }
        Storage::Input => {
            if decl.name != "isf_FragNormCoord" {
                cx.warn(
                    Stage::Rewrite,
                    format!("removed interface input `{}`", decl.name),
                );
            }
            false
        }
        Storage::Output => {
            match &cx.output_alias {
                None => cx.output_alias = Some(decl.name.clone()),
                Some(first) => {
                    let message = format!(
                        "second output `{}` ignored; only `{first}` reaches the target",
                        decl.name
                    );
                    cx.warn(Stage::Rewrite, message);
                }
            }
            false
        }
    }
}

struct Split;

impl Rewrite for Split {
    fn stmt(&mut self, stmt: Stmt, _env: &Env) -> Vec<Stmt> {
        match stmt {
            Stmt::Decl(decls) if decls.len() > 1 => decls.into_iter().map(Stmt::decl).collect(),
            other => vec![other],
        }
    }
}
