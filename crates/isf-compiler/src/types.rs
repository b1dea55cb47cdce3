//! Source-side types and the lightweight inference the rewrite passes lean on.
//!
//! Inference is deliberately partial: `Env::type_of` answers `None` whenever
//! it cannot be sure, and every pass treats `None` as "leave this alone".
use std::collections::HashMap;

use crate::ast::{BinOp, Expr, Item, TranslationUnit, UnaryOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    Float,
    Int,
    Uint,
    Bool,
}

impl Scalar {
    pub fn wgsl(self) -> &'static str {
        match self {
            Self::Float => "f32",
            Self::Int => "i32",
            Self::Uint => "u32",
            Self::Bool => "bool",
        }
    }

    fn short(self) -> &'static str {
        match self {
            Self::Float => "f",
            Self::Int => "i",
            Self::Uint => "u",
            Self::Bool => "b",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrayLen {
    Fixed(u32),
    /// Sized by a named constant.
    Named(String),
    Unsized,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GlslType {
    Void,
    Scalar(Scalar),
    Vector(Scalar, u8),
    /// Columns, rows.
    Matrix(u8, u8),
    Sampler,
    Struct(String),
    Array(Box<GlslType>, ArrayLen),
}

impl GlslType {
    pub const FLOAT: GlslType = GlslType::Scalar(Scalar::Float);
    pub const INT: GlslType = GlslType::Scalar(Scalar::Int);
    pub const BOOL: GlslType = GlslType::Scalar(Scalar::Bool);

    pub fn vec(n: u8) -> Self {
        Self::Vector(Scalar::Float, n)
    }

    /// Scalar for one component, vector otherwise.
    pub fn with_components(scalar: Scalar, n: u8) -> Self {
        if n <= 1 {
            Self::Scalar(scalar)
        } else {
            Self::Vector(scalar, n)
        }
    }

    /// Resolves a built-in GLSL type keyword.
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "void" => Self::Void,
            "float" => Self::FLOAT,
            "int" => Self::INT,
            "uint" => Self::Scalar(Scalar::Uint),
            "bool" => Self::BOOL,
            "sampler2D" | "sampler2DRect" | "samplerCube" | "sampler3D" => Self::Sampler,
            _ => return Self::vector_or_matrix(name),
        };
        Some(ty)
    }

    fn vector_or_matrix(name: &str) -> Option<Self> {
        let digit = |c: u8| (b'2'..=b'4').contains(&c).then(|| c - b'0');
        if let Some(rest) = name.strip_prefix("mat") {
            return match rest.as_bytes() {
                [n] => digit(*n).map(|n| Self::Matrix(n, n)),
                [c, b'x', r] => Some(Self::Matrix(digit(*c)?, digit(*r)?)),
                _ => None,
            };
        }
        let (scalar, rest) = if let Some(rest) = name.strip_prefix("vec") {
            (Scalar::Float, rest)
        } else if let Some(rest) = name.strip_prefix("ivec") {
            (Scalar::Int, rest)
        } else if let Some(rest) = name.strip_prefix("uvec") {
            (Scalar::Uint, rest)
        } else if let Some(rest) = name.strip_prefix("bvec") {
            (Scalar::Bool, rest)
        } else {
            return None;
        };
        match rest.as_bytes() {
            [n] => digit(*n).map(|n| Self::Vector(scalar, n)),
            _ => None,
        }
    }

    /// Number of components for scalars and vectors.
    pub fn components(&self) -> Option<u8> {
        match self {
            Self::Scalar(_) => Some(1),
            Self::Vector(_, n) => Some(*n),
            _ => None,
        }
    }

    pub fn scalar(&self) -> Option<Scalar> {
        match self {
            Self::Scalar(s) | Self::Vector(s, _) => Some(*s),
            Self::Matrix(..) => Some(Scalar::Float),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector(..))
    }

    pub fn is_float_based(&self) -> bool {
        self.scalar() == Some(Scalar::Float)
    }

    pub fn is_integer_based(&self) -> bool {
        matches!(self.scalar(), Some(Scalar::Int | Scalar::Uint))
    }

    pub fn is_bool_based(&self) -> bool {
        self.scalar() == Some(Scalar::Bool)
    }

    /// WGSL spelling of the type.
    pub fn wgsl(&self) -> String {
        match self {
            Self::Void => "void".to_string(),
            Self::Scalar(s) => s.wgsl().to_string(),
            Self::Vector(s, n) => format!("vec{n}<{}>", s.wgsl()),
            Self::Matrix(c, r) => format!("mat{c}x{r}<f32>"),
            Self::Sampler => "texture_2d<f32>".to_string(),
            Self::Struct(name) => name.clone(),
            Self::Array(elem, len) => match len {
                ArrayLen::Fixed(n) => format!("array<{}, {n}>", elem.wgsl()),
                ArrayLen::Named(name) => format!("array<{}, {name}>", elem.wgsl()),
                ArrayLen::Unsized => format!("array<{}>", elem.wgsl()),
            },
        }
    }

    /// Identifier-safe tag used when disambiguating overloads.
    pub fn suffix(&self) -> String {
        match self {
            Self::Void => "void".to_string(),
            Self::Scalar(s) => s.wgsl().to_string(),
            Self::Vector(s, n) => format!("vec{n}{}", s.short()),
            Self::Matrix(c, r) => format!("mat{c}x{r}f"),
            Self::Sampler => "tex".to_string(),
            Self::Struct(name) => name.clone(),
            Self::Array(elem, _) => format!("arr_{}", elem.suffix()),
        }
    }
}

/// Signature of a user-defined function.
#[derive(Debug, Clone, PartialEq)]
pub struct FnSig {
    pub name: String,
    pub params: Vec<GlslType>,
    pub ret: GlslType,
}

/// Scoped symbol table. Scope zero holds user globals; names the host
/// provides (uniforms, built-ins) live in `implicit` so passes can tell them
/// apart from user declarations.
#[derive(Debug, Clone, Default)]
pub struct Env {
    scopes: Vec<HashMap<String, GlslType>>,
    implicit: HashMap<String, GlslType>,
    functions: HashMap<String, Vec<FnSig>>,
    structs: HashMap<String, Vec<(String, GlslType)>>,
}

impl Env {
    pub fn new(implicit: HashMap<String, GlslType>) -> Self {
        Self {
            scopes: vec![HashMap::new()],
            implicit,
            ..Self::default()
        }
    }

    /// Environment holding every global, struct and function of `unit`.
    pub fn for_unit(unit: &TranslationUnit, implicit: HashMap<String, GlslType>) -> Self {
        let mut env = Self::new(implicit);
        for item in &unit.items {
            match item {
                Item::Struct(def) => {
                    env.declare_struct(
                        &def.name,
                        def.fields
                            .iter()
                            .map(|f| (f.name.clone(), f.ty.clone()))
                            .collect(),
                    );
                }
                Item::Global(decls) => {
                    for decl in decls {
                        env.declare(&decl.name, decl.ty.clone());
                    }
                }
                Item::Function(function) => env.declare_function(FnSig {
                    name: function.name.clone(),
                    params: function.param_types(),
                    ret: function.ret.clone(),
                }),
            }
        }
        env
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn declare(&mut self, name: &str, ty: GlslType) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }

    pub fn declare_function(&mut self, sig: FnSig) {
        self.functions.entry(sig.name.clone()).or_default().push(sig);
    }

    pub fn declare_struct(&mut self, name: &str, fields: Vec<(String, GlslType)>) {
        self.structs.insert(name.to_string(), fields);
    }

    /// Scope depth at which `name` is declared by user code, innermost first.
    pub fn resolve_depth(&self, name: &str) -> Option<usize> {
        self.scopes.iter().rposition(|scope| scope.contains_key(name))
    }

    /// Declared by user code in a function-level scope.
    pub fn is_local(&self, name: &str) -> bool {
        self.resolve_depth(name).is_some_and(|depth| depth > 0)
    }

    /// Declared by user code anywhere in scope, globals included.
    pub fn is_declared(&self, name: &str) -> bool {
        self.resolve_depth(name).is_some()
    }

    pub fn lookup(&self, name: &str) -> Option<&GlslType> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.implicit.get(name))
    }

    pub fn functions(&self, name: &str) -> &[FnSig] {
        self.functions.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_user_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn struct_field(&self, name: &str, field: &str) -> Option<&GlslType> {
        self.structs
            .get(name)?
            .iter()
            .find(|(n, _)| n == field)
            .map(|(_, ty)| ty)
    }

    pub fn type_of(&self, expr: &Expr) -> Option<GlslType> {
        match expr {
            Expr::Int(text) => Some(if text.ends_with(['u', 'U']) {
                GlslType::Scalar(Scalar::Uint)
            } else {
                GlslType::INT
            }),
            Expr::Float(_) => Some(GlslType::FLOAT),
            Expr::Bool(_) => Some(GlslType::BOOL),
            Expr::Ident(name) => self.lookup(name).cloned(),
            Expr::Unary { op, expr } => match op {
                UnaryOp::Not => Some(GlslType::BOOL),
                _ => self.type_of(expr),
            },
            Expr::Binary { op, lhs, rhs } => self.binary_type(*op, lhs, rhs),
            Expr::Assign { lhs, .. } => self.type_of(lhs),
            Expr::Ternary {
                then, otherwise, ..
            } => self.type_of(then).or_else(|| self.type_of(otherwise)),
            Expr::Call { name, args } => self.call_type(name, args),
            Expr::Construct { ty, args } => Some(match ty {
                GlslType::Array(elem, ArrayLen::Unsized) => {
                    GlslType::Array(elem.clone(), ArrayLen::Fixed(args.len() as u32))
                }
                other => other.clone(),
            }),
            Expr::Field { base, name } => match self.type_of(base)? {
                GlslType::Vector(scalar, _) if is_swizzle(name) => {
                    Some(GlslType::with_components(scalar, name.len() as u8))
                }
                GlslType::Struct(struct_name) => self.struct_field(&struct_name, name).cloned(),
                _ => None,
            },
            Expr::Index { base, .. } => match self.type_of(base)? {
                GlslType::Vector(scalar, _) => Some(GlslType::Scalar(scalar)),
                GlslType::Matrix(_, rows) => Some(GlslType::vec(rows)),
                GlslType::Array(elem, _) => Some(*elem),
                _ => None,
            },
            Expr::Comma(items) => items.last().and_then(|e| self.type_of(e)),
            Expr::Deref(inner) | Expr::AddrOf(inner) => self.type_of(inner),
        }
    }

    fn binary_type(&self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Option<GlslType> {
        if op.is_comparison() || op.is_logical() {
            return Some(GlslType::BOOL);
        }
        if op.is_bitwise() || op.is_shift() {
            return self.type_of(lhs);
        }
        let l = self.type_of(lhs);
        let r = self.type_of(rhs);
        match (l, r) {
            (Some(l), Some(r)) => Some(arithmetic_result(op, &l, &r)),
            (Some(t), None) | (None, Some(t)) if !t.is_scalar() => Some(t),
            _ => None,
        }
    }

    fn call_type(&self, name: &str, args: &[Expr]) -> Option<GlslType> {
        if let Some(sig) = self
            .functions(name)
            .iter()
            .find(|sig| sig.params.len() == args.len())
        {
            return Some(sig.ret.clone());
        }
        let arg = |i: usize| args.get(i).and_then(|a| self.type_of(a));
        match name {
            "length" | "distance" | "dot" | "determinant" => Some(GlslType::FLOAT),
            "cross" => Some(GlslType::vec(3)),
            "all" | "any" => Some(GlslType::BOOL),
            "not" => arg(0),
            "lessThan" | "lessThanEqual" | "greaterThan" | "greaterThanEqual" | "equal"
            | "notEqual" => arg(0)
                .and_then(|t| t.components())
                .map(|n| GlslType::with_components(Scalar::Bool, n)),
            "texture2D" | "texture2DRect" | "texture2DProj" | "texture2DLod" | "texture"
            | "textureLod" | "texelFetch" | "textureSampleLevel" | "textureLoad"
            | "IMG_PIXEL" | "IMG_NORM_PIXEL" | "IMG_THIS_PIXEL" | "IMG_THIS_NORM_PIXEL" => {
                Some(GlslType::vec(4))
            }
            "IMG_SIZE" => Some(GlslType::vec(2)),
            "textureDimensions" => Some(GlslType::Vector(Scalar::Uint, 2)),
            "transpose" => match arg(0)? {
                GlslType::Matrix(c, r) => Some(GlslType::Matrix(r, c)),
                _ => None,
            },
            "select" => arg(0).or_else(|| arg(1)),
            "floatBitsToInt" => arg(0).map(|t| retag(&t, Scalar::Int)),
            "floatBitsToUint" => arg(0).map(|t| retag(&t, Scalar::Uint)),
            "intBitsToFloat" | "uintBitsToFloat" => arg(0).map(|t| retag(&t, Scalar::Float)),
            _ if is_componentwise(name) => widest(args.iter().filter_map(|a| self.type_of(a))),
            _ => None,
        }
    }
}

/// Built-ins whose result has the shape of their widest argument.
pub fn is_componentwise(name: &str) -> bool {
    matches!(
        name,
        "sin" | "cos" | "tan" | "asin" | "acos" | "atan" | "atan2" | "sinh" | "cosh" | "tanh"
            | "asinh" | "acosh" | "atanh" | "pow" | "exp" | "log" | "exp2" | "log2" | "sqrt"
            | "inversesqrt" | "inverseSqrt" | "abs" | "sign" | "floor" | "ceil" | "fract"
            | "mod" | "min" | "max" | "clamp" | "mix" | "step" | "smoothstep" | "radians"
            | "degrees" | "normalize" | "reflect" | "refract" | "faceforward" | "faceForward"
            | "dFdx" | "dFdy" | "dpdx" | "dpdy" | "fwidth" | "round" | "roundEven" | "trunc"
            | "saturate" | "isf_mod_f32" | "isf_mod_vec2" | "isf_mod_vec3" | "isf_mod_vec4"
    )
}

pub fn is_swizzle(name: &str) -> bool {
    let sets = ["xyzw", "rgba", "stpq"];
    !name.is_empty()
        && name.len() <= 4
        && sets
            .iter()
            .any(|set| name.chars().all(|c| set.contains(c)))
}

/// Widest scalar or vector among `types`; float wins over integer kinds.
pub fn widest(types: impl Iterator<Item = GlslType>) -> Option<GlslType> {
    let mut best: Option<GlslType> = None;
    for ty in types {
        best = Some(match best {
            None => ty,
            Some(current) => {
                let have = current.components().unwrap_or(0);
                let next = ty.components().unwrap_or(0);
                let scalar = if current.is_float_based() || ty.is_float_based() {
                    Scalar::Float
                } else {
                    current.scalar().unwrap_or(Scalar::Float)
                };
                if next > have || (next == have && next > 0) {
                    GlslType::with_components(scalar, next)
                } else {
                    current
                }
            }
        });
    }
    best
}

fn retag(ty: &GlslType, scalar: Scalar) -> GlslType {
    match ty {
        GlslType::Vector(_, n) => GlslType::Vector(scalar, *n),
        _ => GlslType::Scalar(scalar),
    }
}

fn arithmetic_result(op: BinOp, l: &GlslType, r: &GlslType) -> GlslType {
    match (l, r) {
        (GlslType::Matrix(_, rows), GlslType::Vector(s, _)) if op == BinOp::Mul => {
            GlslType::Vector(*s, *rows)
        }
        (GlslType::Vector(s, _), GlslType::Matrix(cols, _)) if op == BinOp::Mul => {
            GlslType::Vector(*s, *cols)
        }
        (GlslType::Matrix(..), _) => l.clone(),
        (_, GlslType::Matrix(..)) => r.clone(),
        (GlslType::Vector(..), _) => l.clone(),
        (_, GlslType::Vector(..)) => r.clone(),
        (GlslType::Scalar(Scalar::Float), _) | (_, GlslType::Scalar(Scalar::Float)) => {
            GlslType::FLOAT
        }
        _ => l.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_keywords() {
        assert_eq!(GlslType::from_name("vec3"), Some(GlslType::vec(3)));
        assert_eq!(
            GlslType::from_name("ivec2"),
            Some(GlslType::Vector(Scalar::Int, 2))
        );
        assert_eq!(GlslType::from_name("mat3"), Some(GlslType::Matrix(3, 3)));
        assert_eq!(GlslType::from_name("mat2x4"), Some(GlslType::Matrix(2, 4)));
        assert_eq!(GlslType::from_name("vec5"), None);
        assert_eq!(GlslType::from_name("color"), None);
    }

    #[test]
    fn wgsl_spelling_and_suffixes() {
        assert_eq!(GlslType::vec(4).wgsl(), "vec4<f32>");
        assert_eq!(GlslType::Matrix(2, 2).wgsl(), "mat2x2<f32>");
        assert_eq!(
            GlslType::Array(Box::new(GlslType::FLOAT), ArrayLen::Fixed(3)).wgsl(),
            "array<f32, 3>"
        );
        assert_eq!(GlslType::Vector(Scalar::Int, 3).suffix(), "vec3i");
        assert_eq!(GlslType::FLOAT.suffix(), "f32");
    }

    #[test]
    fn infers_swizzles_and_arithmetic() {
        let mut env = Env::new(HashMap::new());
        env.declare("color", GlslType::vec(4));
        env.declare("m", GlslType::Matrix(3, 3));
        env.declare("i", GlslType::INT);

        let rgb = Expr::field(Expr::ident("color"), "rgb");
        assert_eq!(env.type_of(&rgb), Some(GlslType::vec(3)));

        let scaled = Expr::binary(BinOp::Mul, Expr::float("2.0"), rgb.clone());
        assert_eq!(env.type_of(&scaled), Some(GlslType::vec(3)));

        let transformed = Expr::binary(BinOp::Mul, Expr::ident("m"), rgb);
        assert_eq!(env.type_of(&transformed), Some(GlslType::vec(3)));

        let mixed = Expr::binary(BinOp::Add, Expr::ident("i"), Expr::float("0.5"));
        assert_eq!(env.type_of(&mixed), Some(GlslType::FLOAT));
    }

    #[test]
    fn componentwise_builtins_take_widest_argument() {
        let mut env = Env::new(HashMap::new());
        env.declare("uv", GlslType::vec(2));
        let call = Expr::call("step", vec![Expr::float("0.5"), Expr::ident("uv")]);
        assert_eq!(env.type_of(&call), Some(GlslType::vec(2)));
    }

    #[test]
    fn scopes_shadow_and_pop() {
        let mut env = Env::new(HashMap::from([("TIME".to_string(), GlslType::FLOAT)]));
        assert!(!env.is_declared("TIME"));
        env.push();
        env.declare("TIME", GlslType::INT);
        assert!(env.is_local("TIME"));
        assert_eq!(env.lookup("TIME"), Some(&GlslType::INT));
        env.pop();
        assert_eq!(env.lookup("TIME"), Some(&GlslType::FLOAT));
    }
}
