//! Typed syntax trees handed over by the front end.
//!
//! Statement and expression kinds are closed enums so every pass matches them
//! exhaustively. Trees arrive already type checked; the code generator only
//! reports inconsistencies it cannot lower.

/// Source-level types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Pointer-sized signed integer.
    Int,
    Int32,
    Bool,
    /// Untyped byte pointer.
    Pointer,
    /// `{data, len}` view over elements of the inner type.
    Slice(Box<Type>),
    /// First-class function value.
    Func(Box<Signature>),
}

/// Function signature. A variadic signature's last parameter is a slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Signature {
    pub params: Vec<Type>,
    pub results: Vec<Type>,
    pub variadic: bool,
}

impl Signature {
    pub fn new(params: Vec<Type>, results: Vec<Type>) -> Self {
        Self {
            params,
            results,
            variadic: false,
        }
    }

    /// Signature of a function taking and returning nothing.
    pub fn niladic() -> Self {
        Self::default()
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }
}

/// Named parameter or result. Unnamed results use an empty name.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }
}

/// Function body with its parameter and result lists.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FuncLit {
    pub params: Vec<Param>,
    pub results: Vec<Param>,
    pub variadic: bool,
    pub body: Block,
}

impl FuncLit {
    pub fn new(params: Vec<Param>, results: Vec<Param>, body: Block) -> Self {
        Self {
            params,
            results,
            variadic: false,
            body,
        }
    }

    pub fn signature(&self) -> Signature {
        Signature {
            params: self.params.iter().map(|p| p.ty.clone()).collect(),
            results: self.results.iter().map(|r| r.ty.clone()).collect(),
            variadic: self.variadic,
        }
    }
}

/// Package-level function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub func: FuncLit,
}

impl FuncDecl {
    pub fn new(name: impl Into<String>, func: FuncLit) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }

    /// Niladic function with no results.
    pub fn procedure(name: impl Into<String>, stmts: Vec<Stmt>) -> Self {
        Self::new(name, FuncLit::new(vec![], vec![], Block::new(stmts)))
    }

    /// Package initializers run before the entry function.
    pub fn is_init(&self) -> bool {
        self.name == "init"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let {
        name: String,
        ty: Type,
        init: Option<Expr>,
    },
    Assign {
        name: String,
        value: Expr,
    },
    Expr(Expr),
    Return(Vec<Expr>),
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    Block(Block),
    /// Call registered to run when the enclosing activation ends.
    Defer(CallExpr),
    /// Call started on a separate execution unit.
    Go(CallExpr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Lt,
    Eq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Bool(bool),
    /// Parameter, result or `let` binding of the current function.
    Local(String),
    /// Package-level function, by unqualified name.
    Func(String),
    Call(CallExpr),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    FuncLit(Box<FuncLit>),
}

impl Expr {
    pub fn local(name: impl Into<String>) -> Self {
        Expr::Local(name.into())
    }

    pub fn func(name: impl Into<String>) -> Self {
        Expr::Func(name.into())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Call of a package-level function.
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call(CallExpr::named(name, args))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub callee: Box<Expr>,
    pub args: Vec<Expr>,
    /// `f(xs...)`: the last argument is passed as the variadic slice itself.
    pub spread: bool,
}

impl CallExpr {
    pub fn new(callee: Expr, args: Vec<Expr>) -> Self {
        Self {
            callee: Box::new(callee),
            args,
            spread: false,
        }
    }

    pub fn named(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::new(Expr::Func(name.into()), args)
    }

    pub fn spread(mut self) -> Self {
        self.spread = true;
        self
    }
}

/// One parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub name: String,
    pub package: String,
    pub funcs: Vec<FuncDecl>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, package: impl Into<String>, funcs: Vec<FuncDecl>) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            funcs,
        }
    }
}

/// Type-checked package ready for lowering.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub name: String,
    pub path: String,
    /// Names of the source files the package was checked from, in order.
    pub files: Vec<String>,
    pub funcs: Vec<FuncDecl>,
}

impl Package {
    pub fn func(&self, name: &str) -> Option<&FuncDecl> {
        self.funcs.iter().find(|f| f.name == name && !f.is_init())
    }
}
