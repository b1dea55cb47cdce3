//! Renames user identifiers that WGSL reserves.
//!
//! Only names the unit actually declares (variables, parameters, functions,
//! structs and struct members) are considered, so a coincidental match with
//! a built-in call or a host name is never touched.
use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ast::{Expr, Item, Stmt, TranslationUnit};
use crate::context::CompilationContext;
use crate::types::{is_swizzle, GlslType};

const KEYWORDS: &[&str] = &[
    "alias", "break", "case", "const", "const_assert", "continue", "continuing", "default",
    "diagnostic", "discard", "else", "enable", "false", "fn", "for", "if", "let", "loop",
    "override", "requires", "return", "struct", "switch", "true", "var", "while",
];

const RESERVED: &[&str] = &[
    "NULL", "Self", "abstract", "active", "alignas", "alignof", "as", "asm", "asm_fragment",
    "async", "attribute", "auto", "await", "become", "binding_array", "cast", "catch", "class",
    "co_await", "co_return", "co_yield", "coherent", "column_major", "common", "compile",
    "compile_fragment", "concept", "const_cast", "consteval", "constexpr", "constinit", "crate",
    "debugger", "decltype", "delete", "demote", "demote_to_helper", "do", "dynamic_cast",
    "enum", "explicit", "export", "extends", "extern", "external", "fallthrough", "filter",
    "final", "finally", "friend", "from", "fxgroup", "get", "goto", "groupshared", "highp",
    "impl", "implements", "import", "inline", "instanceof", "interface", "layout", "lowp",
    "macro", "macro_rules", "match", "mediump", "meta", "mod", "module", "move", "mut",
    "mutable", "namespace", "new", "nil", "noexcept", "noinline", "nointerpolation",
    "noperspective", "null", "nullptr", "of", "operator", "package", "packoffset", "partition",
    "pass", "patch", "pixelfragment", "precise", "precision", "premerge", "priv", "protected",
    "pub", "public", "readonly", "ref", "regardless", "register", "reinterpret_cast",
    "require", "resource", "restrict", "self", "set", "shared", "sizeof", "smooth", "snorm",
    "static", "static_assert", "static_cast", "std", "subroutine", "super", "target",
    "template", "this", "thread_local", "throw", "trait", "try", "type", "typedef", "typeid",
    "typename", "typeof", "union", "unless", "unorm", "unsafe", "unsized", "use", "using",
    "varying", "virtual", "volatile", "wgsl", "where", "with", "writeonly", "yield",
];

/// Predeclared WGSL names the emitted code calls or spells; a user
/// declaration with one of these names would shadow them.
const PREDECLARED: &[&str] = &[
    "all", "any", "array", "atan2", "bitcast", "dpdx", "dpdy", "f16", "f32", "faceForward",
    "floor", "function", "i32", "inverseSqrt", "mat2x2", "mat2x3", "mat2x4", "mat3x2",
    "mat3x3", "mat3x4", "mat4x2", "mat4x3", "mat4x4", "private", "ptr", "read", "read_write",
    "sampler", "select", "storage", "textureDimensions", "textureLoad", "textureSampleLevel",
    "texture_2d", "u32", "uniform", "vec2", "vec3", "vec4", "workgroup", "write",
];

pub fn is_reserved(name: &str) -> bool {
    name.starts_with("__")
        || KEYWORDS.contains(&name)
        || RESERVED.contains(&name)
        || PREDECLARED.contains(&name)
}

pub fn run(unit: &mut TranslationUnit, cx: &mut CompilationContext) {
    let declared = declared_names(unit);
    let taken: HashSet<&String> = declared.values.iter().chain(&declared.functions).collect();
    let mut renames: HashMap<String, String> = HashMap::new();
    for name in declared
        .values
        .iter()
        .chain(&declared.functions)
        .chain(&declared.structs)
    {
        if is_reserved(name) && !renames.contains_key(name) {
            let mut renamed = format!("{}{name}", cx.options.rename_prefix);
            while taken.contains(&renamed) {
                renamed.push('_');
            }
            renames.insert(name.clone(), renamed);
        }
    }
    let fields: HashMap<String, String> = declared
        .fields
        .iter()
        .filter(|name| is_reserved(name))
        .map(|name| (name.clone(), format!("{}{name}", cx.options.rename_prefix)))
        .collect();
    if renames.is_empty() && fields.is_empty() {
        return;
    }
    debug!(identifiers = renames.len(), members = fields.len(), "renaming reserved words");

    let functions: HashSet<&String> = declared.functions.iter().collect();
    let rename = |name: &mut String| {
        if let Some(new) = renames.get(name.as_str()) {
            *name = new.clone();
        }
    };
    let rename_type = |ty: &mut GlslType| retype(ty, &renames);

    for item in &mut unit.items {
        match item {
            Item::Struct(def) => {
                rename(&mut def.name);
                for field in &mut def.fields {
                    if let Some(new) = fields.get(&field.name) {
                        field.name = new.clone();
                    }
                    rename_type(&mut field.ty);
                }
            }
            Item::Global(decls) => {
                for decl in decls {
                    rename(&mut decl.name);
                    rename_type(&mut decl.ty);
                }
            }
            Item::Function(function) => {
                if !function.entry && function.name != "main" {
                    rename(&mut function.name);
                }
                rename_type(&mut function.ret);
                for param in &mut function.params {
                    rename(&mut param.name);
                    rename_type(&mut param.ty);
                }
                for stmt in &mut function.body {
                    stmt.visit_stmts_mut(&mut |s| {
                        if let Stmt::Decl(decls) = s {
                            for decl in decls {
                                rename(&mut decl.name);
                                rename_type(&mut decl.ty);
                            }
                        }
                    });
                }
            }
        }
    }

    unit.visit_exprs_mut(&mut |expr| match expr {
        Expr::Ident(name) => {
            if declared.values.contains(name) {
                rename(name);
            }
        }
        Expr::Call { name, .. } => {
            if functions.contains(name) {
                rename(name);
            }
        }
        Expr::Construct { ty, .. } => rename_type(ty),
        Expr::Field { name, .. } => {
            if !is_swizzle(name) {
                if let Some(new) = fields.get(name.as_str()) {
                    *name = new.clone();
                }
            }
        }
        _ => {}
    });

    cx.renamed.extend(renames);
    cx.renamed.extend(fields);
}

fn retype(ty: &mut GlslType, renames: &HashMap<String, String>) {
    match ty {
        GlslType::Struct(name) => {
            if let Some(new) = renames.get(name.as_str()) {
                *name = new.clone();
            }
        }
        GlslType::Array(elem, _) => retype(elem, renames),
        _ => {}
    }
}

#[derive(Default)]
struct Declared {
    values: HashSet<String>,
    functions: Vec<String>,
    structs: Vec<String>,
    fields: HashSet<String>,
}

fn declared_names(unit: &TranslationUnit) -> Declared {
    let mut declared = Declared::default();
    for item in &unit.items {
        match item {
            Item::Struct(def) => {
                declared.structs.push(def.name.clone());
                declared
                    .fields
                    .extend(def.fields.iter().map(|f| f.name.clone()));
            }
            Item::Global(decls) => {
                declared.values.extend(decls.iter().map(|d| d.name.clone()));
            }
            Item::Function(function) => {
                if !function.entry && function.name != "main" {
                    declared.functions.push(function.name.clone());
                }
                declared
                    .values
                    .extend(function.params.iter().map(|p| p.name.clone()));
                for stmt in &function.body {
                    collect_locals(stmt, &mut declared.values);
                }
            }
        }
    }
    declared.functions.sort();
    declared.functions.dedup();
    declared
}

fn collect_locals(stmt: &Stmt, out: &mut HashSet<String>) {
    if let Stmt::Decl(decls) = stmt {
        out.extend(decls.iter().map(|d| d.name.clone()));
    }
    for child in stmt.children() {
        collect_locals(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::testing::{squash, Fixture};

    #[test]
    fn recognises_reserved_words() {
        assert!(is_reserved("filter"));
        assert!(is_reserved("loop"));
        assert!(is_reserved("select"));
        assert!(is_reserved("__hidden"));
        assert!(!is_reserved("color"));
        assert!(!is_reserved("uv"));
    }

    #[test]
    fn renames_declarations_and_uses() {
        let (out, _) = Fixture::new().run(
            "float target(float filter) { return filter * 2.0; }\n\
             void main() { float ref = target(1.0); gl_FragColor = vec4(ref); }",
            &[run],
        );
        let out = squash(&out);
        assert!(out.contains("fn isf_target(isf_filter: f32) -> f32"), "{out}");
        assert!(out.contains("return isf_filter * 2.0;"), "{out}");
        assert!(out.contains("isf_ref: f32 = isf_target(1.0);"), "{out}");
        assert!(out.contains("vec4<f32>(isf_ref)"), "{out}");
    }

    #[test]
    fn leaves_undeclared_matches_alone() {
        let (out, _) = Fixture::new().run(
            "void main() { float m = mod(1.0, 2.0); float x = select(m); }",
            &[run],
        );
        // Neither `mod` nor `select` is declared here, so calls keep their names.
        assert!(out.contains("mod(1.0, 2.0)"), "{out}");
        assert!(out.contains("select(m)"), "{out}");
    }

    #[test]
    fn renames_struct_members() {
        let (out, _) = Fixture::new().run(
            "struct Light { vec3 color; float type; };\n\
             void main() { Light l; l.type = 1.0; }",
            &[run],
        );
        let out = squash(&out);
        assert!(out.contains("isf_type: f32"), "{out}");
        assert!(out.contains("l.isf_type = 1.0;"), "{out}");
    }
}
