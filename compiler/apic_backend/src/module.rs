//! Compilation unit: types, functions, and read-only data.

use rustc_hash::FxHashMap;

use crate::ir::{Callee, DataId, FuncId, Function};
use crate::runtime::RuntimeTypes;
use crate::ty::{TyId, TyTable};

/// Signature of a declared function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<TyId>,
    pub return_type: TyId,
}

/// A module under construction or finished.
///
/// Functions are declared first (so calls, including recursive ones, can
/// refer to them) and defined once their body is built.
pub struct Module {
    pub tys: TyTable,
    pub rt: RuntimeTypes,
    decls: Vec<FunctionDecl>,
    bodies: Vec<Option<Function>>,
    by_name: FxHashMap<String, FuncId>,
    data: Vec<Box<[u8]>>,
    data_index: FxHashMap<Box<[u8]>, DataId>,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    pub fn new() -> Self {
        let mut tys = TyTable::new();
        let rt = RuntimeTypes::declare(&mut tys);
        Self {
            tys,
            rt,
            decls: Vec::new(),
            bodies: Vec::new(),
            by_name: FxHashMap::default(),
            data: Vec::new(),
            data_index: FxHashMap::default(),
        }
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "function indices never exceed u32"
    )]
    pub fn declare_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<TyId>,
        return_type: TyId,
    ) -> FuncId {
        let id = FuncId::new(self.decls.len() as u32);
        let name = name.into();
        self.by_name.insert(name.clone(), id);
        self.decls.push(FunctionDecl {
            name,
            params,
            return_type,
        });
        self.bodies.push(None);
        id
    }

    pub fn define_function(&mut self, id: FuncId, body: Function) {
        debug_assert_eq!(
            body.params, self.decls[id.index()].params,
            "body of {} does not match its declaration",
            body.name
        );
        self.bodies[id.index()] = Some(body);
    }

    pub fn decl(&self, id: FuncId) -> &FunctionDecl {
        &self.decls[id.index()]
    }

    /// The body of a function, if it has been defined.
    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.bodies.get(id.index()).and_then(Option::as_ref)
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.by_name.get(name).copied()
    }

    pub fn function_count(&self) -> usize {
        self.decls.len()
    }

    /// Iterate defined functions.
    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.bodies.iter().enumerate().filter_map(|(i, body)| {
            body.as_ref()
                .map(|f| (FuncId::new(u32::try_from(i).unwrap_or(u32::MAX)), f))
        })
    }

    /// Add a read-only blob. Identical blobs share one id.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "data indices never exceed u32"
    )]
    pub fn add_data(&mut self, bytes: &[u8]) -> DataId {
        if let Some(&id) = self.data_index.get(bytes) {
            return id;
        }
        let id = DataId::new(self.data.len() as u32);
        let blob: Box<[u8]> = bytes.into();
        self.data.push(blob.clone());
        self.data_index.insert(blob, id);
        id
    }

    pub fn data(&self, id: DataId) -> &[u8] {
        &self.data[id.index()]
    }

    pub fn data_count(&self) -> usize {
        self.data.len()
    }

    pub fn return_type(&self, callee: Callee) -> TyId {
        match callee {
            Callee::Function(f) => self.decl(f).return_type,
            Callee::Runtime(r) => r.return_type(&self.rt),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::runtime::RuntimeFn;

    #[test]
    fn declare_then_define() {
        let mut m = Module::new();
        let f = m.declare_function("answer", vec![], TyId::U32);
        assert!(m.function(f).is_none());
        let mut b = FunctionBuilder::new("answer", &[], TyId::U32);
        let v = b.const_u32(42);
        b.ret(Some(v));
        m.define_function(f, b.finish());
        assert_eq!(m.function(f).map(|f| f.instr_count()), Some(1));
        assert_eq!(m.function_by_name("answer"), Some(f));
        assert_eq!(m.functions().count(), 1);
    }

    #[test]
    fn data_is_deduplicated() {
        let mut m = Module::new();
        let a = m.add_data(b"hello");
        let b = m.add_data(b"hello");
        let c = m.add_data(b"world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(m.data(c), b"world");
        assert_eq!(m.data_count(), 2);
    }

    #[test]
    fn callee_return_types() {
        let mut m = Module::new();
        let f = m.declare_function("f", vec![], TyId::I64);
        assert_eq!(m.return_type(Callee::Function(f)), TyId::I64);
        assert_eq!(
            m.return_type(Callee::Runtime(RuntimeFn::MakeString)),
            m.rt.string_ptr
        );
    }
}
