//! Statement and expression tree for the GLSL subset found in ISF bodies.
//!
//! The parser builds it, every rewrite pass transforms it in place and the
//! emitter prints it as WGSL. A few variants (`Loop`, `Deref`, `AddrOf`) only
//! exist on the target side and are introduced by passes.
use crate::types::GlslType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    /// GLSL `^^`.
    Xor,
}

impl BinOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Rem,
            "<<" => Self::Shl,
            ">>" => Self::Shr,
            "<" => Self::Lt,
            ">" => Self::Gt,
            "<=" => Self::Le,
            ">=" => Self::Ge,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "&" => Self::BitAnd,
            "|" => Self::BitOr,
            "^" => Self::BitXor,
            "&&" => Self::And,
            "||" => Self::Or,
            "^^" => Self::Xor,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::And => "&&",
            Self::Or => "||",
            Self::Xor => "^^",
        }
    }

    /// Binding strength in the source grammar, higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::Xor => 2,
            Self::And => 3,
            Self::BitOr => 4,
            Self::BitXor => 5,
            Self::BitAnd => 6,
            Self::Eq | Self::Ne => 7,
            Self::Lt | Self::Gt | Self::Le | Self::Ge => 8,
            Self::Shl | Self::Shr => 9,
            Self::Add | Self::Sub => 10,
            Self::Mul | Self::Div | Self::Rem => 11,
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Rem)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Lt | Self::Gt | Self::Le | Self::Ge | Self::Eq | Self::Ne
        )
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, Self::BitAnd | Self::BitOr | Self::BitXor)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, Self::Shl | Self::Shr)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Xor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl UnaryOp {
    pub fn is_step(self) -> bool {
        matches!(
            self,
            Self::PreInc | Self::PreDec | Self::PostInc | Self::PostDec
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Integer literal, normalised to decimal or hex text with an optional `u`.
    Int(String),
    /// Float literal, normalised to text WGSL accepts.
    Float(String),
    Bool(bool),
    Ident(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `op` is `Some` for compound assignment (`+=` and friends).
    Assign {
        op: Option<BinOp>,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// Type constructor or conversion: `vec3(..)`, `float(..)`, `Light(..)`.
    Construct {
        ty: GlslType,
        args: Vec<Expr>,
    },
    /// Swizzle or struct member access.
    Field {
        base: Box<Expr>,
        name: String,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Comma(Vec<Expr>),
    Deref(Box<Expr>),
    AddrOf(Box<Expr>),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Self::Ident(name.into())
    }

    pub fn int(text: impl Into<String>) -> Self {
        Self::Int(text.into())
    }

    pub fn float(text: impl Into<String>) -> Self {
        Self::Float(text.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            name: name.into(),
            args,
        }
    }

    pub fn construct(ty: GlslType, args: Vec<Expr>) -> Self {
        Self::Construct { ty, args }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn field(base: Expr, name: impl Into<String>) -> Self {
        Self::Field {
            base: Box::new(base),
            name: name.into(),
        }
    }

    pub fn assign(lhs: Expr, rhs: Expr) -> Self {
        Self::Assign {
            op: None,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Self::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// The variable an lvalue-shaped expression ultimately names.
    pub fn root_ident(&self) -> Option<&str> {
        match self {
            Self::Ident(name) => Some(name),
            Self::Field { base, .. } | Self::Index { base, .. } => base.root_ident(),
            Self::Deref(inner) => inner.root_ident(),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_) | Self::Bool(_))
    }

    /// Cheap, side-effect free expressions that may be duplicated.
    pub fn is_simple(&self) -> bool {
        match self {
            Self::Int(_) | Self::Float(_) | Self::Bool(_) | Self::Ident(_) => true,
            Self::Field { base, .. } | Self::Deref(base) => base.is_simple(),
            Self::Index { base, index } => base.is_simple() && index.is_literal(),
            Self::Unary {
                op: UnaryOp::Neg,
                expr,
            } => expr.is_literal(),
            _ => false,
        }
    }

    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Self::Int(_) | Self::Float(_) | Self::Bool(_) | Self::Ident(_) => Vec::new(),
            Self::Unary { expr, .. } => vec![expr.as_ref()],
            Self::Binary { lhs, rhs, .. } | Self::Assign { lhs, rhs, .. } => {
                vec![lhs.as_ref(), rhs.as_ref()]
            }
            Self::Ternary {
                cond,
                then,
                otherwise,
            } => vec![cond.as_ref(), then.as_ref(), otherwise.as_ref()],
            Self::Call { args, .. } | Self::Construct { args, .. } | Self::Comma(args) => {
                args.iter().collect()
            }
            Self::Field { base, .. } | Self::Deref(base) | Self::AddrOf(base) => {
                vec![base.as_ref()]
            }
            Self::Index { base, index } => vec![base.as_ref(), index.as_ref()],
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Self::Int(_) | Self::Float(_) | Self::Bool(_) | Self::Ident(_) => Vec::new(),
            Self::Unary { expr, .. } => vec![expr.as_mut()],
            Self::Binary { lhs, rhs, .. } | Self::Assign { lhs, rhs, .. } => {
                vec![lhs.as_mut(), rhs.as_mut()]
            }
            Self::Ternary {
                cond,
                then,
                otherwise,
            } => vec![cond.as_mut(), then.as_mut(), otherwise.as_mut()],
            Self::Call { args, .. } | Self::Construct { args, .. } | Self::Comma(args) => {
                args.iter_mut().collect()
            }
            Self::Field { base, .. } | Self::Deref(base) | Self::AddrOf(base) => {
                vec![base.as_mut()]
            }
            Self::Index { base, index } => vec![base.as_mut(), index.as_mut()],
        }
    }

    /// Pre-order walk over this expression and every sub-expression.
    pub fn visit(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    /// Post-order mutable walk.
    pub fn visit_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        for child in self.children_mut() {
            child.visit_mut(f);
        }
        f(self);
    }

    /// Replaces `self` with whatever `f` builds from the old value.
    pub fn replace_with(&mut self, f: impl FnOnce(Expr) -> Expr) {
        let old = std::mem::replace(self, Expr::Bool(false));
        *self = f(old);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Var,
    Const,
    Uniform,
    /// `varying`, `attribute` or a global `in`.
    Input,
    /// A global `out` declaration.
    Output,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub storage: Storage,
    pub ty: GlslType,
    pub name: String,
    pub init: Option<Expr>,
}

impl VarDecl {
    pub fn var(name: impl Into<String>, ty: GlslType, init: Option<Expr>) -> Self {
        Self {
            storage: Storage::Var,
            ty,
            name: name.into(),
            init,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaseLabel {
    Value(Expr),
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub labels: Vec<CaseLabel>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// One declaration statement; several declarators until split.
    Decl(Vec<VarDecl>),
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    Loop {
        body: Vec<Stmt>,
        continuing: Vec<Stmt>,
        break_if: Option<Expr>,
    },
    Switch {
        selector: Expr,
        cases: Vec<Case>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Discard,
    Empty,
}

impl Stmt {
    pub fn decl(decl: VarDecl) -> Self {
        Self::Decl(vec![decl])
    }

    /// Ends control flow of the enclosing block.
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Self::Return(_) | Self::Break | Self::Continue | Self::Discard
        )
    }

    /// Expressions owned directly by this statement, not by nested ones.
    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Self::Decl(decls) => decls.iter_mut().filter_map(|d| d.init.as_mut()).collect(),
            Self::Expr(expr) => vec![expr],
            Self::If { cond, .. } | Self::While { cond, .. } | Self::DoWhile { cond, .. } => {
                vec![cond]
            }
            Self::For { cond, step, .. } => cond.iter_mut().chain(step.iter_mut()).collect(),
            Self::Loop { break_if, .. } => break_if.iter_mut().collect(),
            Self::Switch { selector, cases } => {
                let mut out = vec![selector];
                for case in cases {
                    for label in &mut case.labels {
                        if let CaseLabel::Value(expr) = label {
                            out.push(expr);
                        }
                    }
                }
                out
            }
            Self::Return(value) => value.iter_mut().collect(),
            Self::Block(_) | Self::Break | Self::Continue | Self::Discard | Self::Empty => {
                Vec::new()
            }
        }
    }

    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Self::Decl(decls) => decls.iter().filter_map(|d| d.init.as_ref()).collect(),
            Self::Expr(expr) => vec![expr],
            Self::If { cond, .. } | Self::While { cond, .. } | Self::DoWhile { cond, .. } => {
                vec![cond]
            }
            Self::For { cond, step, .. } => cond.iter().chain(step.iter()).collect(),
            Self::Loop { break_if, .. } => break_if.iter().collect(),
            Self::Switch { selector, cases } => {
                let mut out = vec![selector];
                for case in cases {
                    for label in &case.labels {
                        if let CaseLabel::Value(expr) = label {
                            out.push(expr);
                        }
                    }
                }
                out
            }
            Self::Return(value) => value.iter().collect(),
            Self::Block(_) | Self::Break | Self::Continue | Self::Discard | Self::Empty => {
                Vec::new()
            }
        }
    }

    /// Statements nested directly inside this one.
    pub fn children(&self) -> Vec<&Stmt> {
        match self {
            Self::Block(stmts) => stmts.iter().collect(),
            Self::If {
                then, otherwise, ..
            } => std::iter::once(then.as_ref())
                .chain(otherwise.as_deref())
                .collect(),
            Self::For { init, body, .. } => init
                .as_deref()
                .into_iter()
                .chain(std::iter::once(body.as_ref()))
                .collect(),
            Self::While { body, .. } | Self::DoWhile { body, .. } => vec![body.as_ref()],
            Self::Loop {
                body, continuing, ..
            } => body.iter().chain(continuing.iter()).collect(),
            Self::Switch { cases, .. } => cases.iter().flat_map(|c| c.body.iter()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Stmt> {
        match self {
            Self::Block(stmts) => stmts.iter_mut().collect(),
            Self::If {
                then, otherwise, ..
            } => std::iter::once(then.as_mut())
                .chain(otherwise.as_deref_mut())
                .collect(),
            Self::For { init, body, .. } => init
                .as_deref_mut()
                .into_iter()
                .chain(std::iter::once(body.as_mut()))
                .collect(),
            Self::While { body, .. } | Self::DoWhile { body, .. } => vec![body.as_mut()],
            Self::Loop {
                body, continuing, ..
            } => body.iter_mut().chain(continuing.iter_mut()).collect(),
            Self::Switch { cases, .. } => {
                cases.iter_mut().flat_map(|c| c.body.iter_mut()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Pre-order walk over every expression in this statement tree.
    pub fn visit_exprs(&self, f: &mut dyn FnMut(&Expr)) {
        for expr in self.exprs() {
            expr.visit(f);
        }
        for child in self.children() {
            child.visit_exprs(f);
        }
    }

    /// Post-order mutable walk over every expression in this statement tree.
    pub fn visit_exprs_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        for expr in self.exprs_mut() {
            expr.visit_mut(f);
        }
        for child in self.children_mut() {
            child.visit_exprs_mut(f);
        }
    }

    /// Visits this statement and every nested one, outermost first.
    pub fn visit_stmts_mut(&mut self, f: &mut dyn FnMut(&mut Stmt)) {
        f(self);
        for child in self.children_mut() {
            child.visit_stmts_mut(f);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamQualifier {
    In,
    Out,
    InOut,
    /// An `out`/`inout` parameter already rewritten to a pointer.
    Pointer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: GlslType,
    pub qualifier: ParamQualifier,
}

impl Param {
    /// Written back to the caller, so lowered to a pointer parameter.
    pub fn is_by_ref(&self) -> bool {
        self.qualifier != ParamQualifier::In
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub ret: GlslType,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    /// Set once the function has been turned into the fragment entry point.
    pub entry: bool,
}

impl Function {
    pub fn param_types(&self) -> Vec<GlslType> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub ty: GlslType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Struct(StructDef),
    Global(Vec<VarDecl>),
    Function(Function),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationUnit {
    pub items: Vec<Item>,
}

impl TranslationUnit {
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut Function> {
        self.items.iter_mut().filter_map(|item| match item {
            Item::Function(f) => Some(f),
            _ => None,
        })
    }

    /// Post-order mutable walk over every expression in the unit, global
    /// initialisers included.
    pub fn visit_exprs_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        for item in &mut self.items {
            match item {
                Item::Global(decls) => {
                    for init in decls.iter_mut().filter_map(|d| d.init.as_mut()) {
                        init.visit_mut(f);
                    }
                }
                Item::Function(function) => {
                    for stmt in &mut function.body {
                        stmt.visit_exprs_mut(f);
                    }
                }
                Item::Struct(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_ident_follows_lvalue_chains() {
        let expr = Expr::field(
            Expr::Index {
                base: Box::new(Expr::ident("lights")),
                index: Box::new(Expr::int("2")),
            },
            "rgb",
        );
        assert_eq!(expr.root_ident(), Some("lights"));
        assert!(expr.is_simple());
    }

    #[test]
    fn visit_mut_is_post_order() {
        let mut expr = Expr::binary(BinOp::Add, Expr::ident("a"), Expr::ident("b"));
        let mut seen = Vec::new();
        expr.visit_mut(&mut |e| {
            seen.push(match e {
                Expr::Ident(name) => name.clone(),
                Expr::Binary { op, .. } => op.symbol().to_string(),
                _ => String::new(),
            })
        });
        assert_eq!(seen, vec!["a", "b", "+"]);
    }

    #[test]
    fn statement_walk_reaches_nested_bodies() {
        let stmt = Stmt::If {
            cond: Expr::ident("c"),
            then: Box::new(Stmt::Block(vec![Stmt::Expr(Expr::ident("x"))])),
            otherwise: Some(Box::new(Stmt::Return(Some(Expr::ident("y"))))),
        };
        let mut names = Vec::new();
        stmt.visit_exprs(&mut |e| {
            if let Some(name) = e.as_ident() {
                names.push(name.to_string());
            }
        });
        assert_eq!(names, vec!["c", "x", "y"]);
    }
}
