//! Program-level tables: locals, parameters, globals, functions, statements.

use std::fmt;

use crate::{ExprArena, ExprId, ExprKind, Name, StringInterner, TypeId, TypePool};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

define_id!(
    /// Index into [`Program::locals`].
    LocalId
);
define_id!(
    /// Index into [`Program::params`].
    ParamId
);
define_id!(
    /// Index into [`Program::globals`].
    GlobalId
);
define_id!(
    /// Index into [`Program::functions`].
    FunctionId
);

/// A named, typed binding (local, parameter or global).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Binding {
    pub name: Name,
    pub ty: TypeId,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Stmt {
    DeclareLocal { local: LocalId, value: ExprId },
    AssignLocal { local: LocalId, value: ExprId },
    AssignGlobal { global: GlobalId, value: ExprId },
    Expression(ExprId),
    If {
        cond: ExprId,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    /// Return `value`, or nothing when it is `ExprId::INVALID`.
    Return(ExprId),
    /// Leave a subroutine with a non-success error code.
    Abort { code: u32 },
}

/// A function or subroutine.
///
/// Subroutines return a `{ error, value }` pair and may fail; plain
/// functions return their value directly.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Function {
    pub name: Name,
    pub params: Vec<ParamId>,
    pub return_type: TypeId,
    pub subroutine: bool,
    pub body: Vec<Stmt>,
}

/// The type-checked semantic graph handed to the code generator.
#[derive(Default)]
pub struct Program {
    pub interner: StringInterner,
    pub types: TypePool,
    pub exprs: ExprArena,
    pub locals: Vec<Binding>,
    pub params: Vec<Binding>,
    pub globals: Vec<Binding>,
    pub functions: Vec<Function>,
}

fn next_id(len: usize) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| panic!("table size exceeds u32::MAX"))
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self, s: &str) -> Name {
        self.interner.intern(s)
    }

    pub fn expr(&mut self, kind: ExprKind, ty: TypeId) -> ExprId {
        self.exprs.alloc(kind, ty)
    }

    pub fn add_local(&mut self, name: &str, ty: TypeId) -> LocalId {
        let id = LocalId(next_id(self.locals.len()));
        let name = self.name(name);
        self.locals.push(Binding { name, ty });
        id
    }

    pub fn add_param(&mut self, name: &str, ty: TypeId) -> ParamId {
        let id = ParamId(next_id(self.params.len()));
        let name = self.name(name);
        self.params.push(Binding { name, ty });
        id
    }

    pub fn add_global(&mut self, name: &str, ty: TypeId) -> GlobalId {
        let id = GlobalId(next_id(self.globals.len()));
        let name = self.name(name);
        self.globals.push(Binding { name, ty });
        id
    }

    /// Declare a function with an empty body so calls to it can be built
    /// before the body exists.
    pub fn declare_function(
        &mut self,
        name: &str,
        params: Vec<ParamId>,
        return_type: TypeId,
        subroutine: bool,
    ) -> FunctionId {
        let id = FunctionId(next_id(self.functions.len()));
        let name = self.name(name);
        self.functions.push(Function {
            name,
            params,
            return_type,
            subroutine,
            body: Vec::new(),
        });
        id
    }

    pub fn set_body(&mut self, function: FunctionId, body: Vec<Stmt>) {
        self.functions[function.index()].body = body;
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| self.interner.lookup(f.name) == name)
            .map(|i| FunctionId(next_id(i)))
    }

    pub fn local(&self, id: LocalId) -> Option<&Binding> {
        self.locals.get(id.index())
    }

    pub fn param(&self, id: ParamId) -> Option<&Binding> {
        self.params.get(id.index())
    }

    pub fn global(&self, id: GlobalId) -> Option<&Binding> {
        self.globals.get(id.index())
    }
}
