//! Ownership tracking for reference-counted values.
//!
//! Operations either return a *new* owned handle (string literals and
//! concatenation, allocations, plain calls returning counted types,
//! initializers, selections, map lookups) and register exactly one release
//! for it, or return a *borrowed* handle (member access, indexing, bindings)
//! and register nothing. Storing a value into a new owning location
//! (a field, a local, a select result, a return) references it first.

use apic_backend::runtime::field;
use apic_backend::{FunctionBuilder, Value};
use apic_ir::{Builtin, TypePool, TypeId, TypeKind};
use rustc_hash::FxHashMap;

use crate::compiler::Compiler;
use crate::error::CodegenError;
use crate::scope::{Obligation, Scope};

/// How a semantic type participates in reference counting.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ownership {
    /// Holds no counted references.
    Scalar,
    /// A pointer to a counted object: string, reference, or map.
    Counted,
    /// A slice value; owns one count of its pool.
    Slice,
    /// A class or static array holding owned values inline.
    Aggregate,
}

impl Ownership {
    pub fn is_owned(self) -> bool {
        self != Ownership::Scalar
    }
}

/// Memoized ownership classification.
#[derive(Default)]
pub struct Classifier {
    cache: FxHashMap<TypeId, Ownership>,
}

impl Classifier {
    pub fn classify(&mut self, types: &TypePool, ty: TypeId) -> Ownership {
        if let Some(&class) = self.cache.get(&ty) {
            return class;
        }
        // Provisional entry; only reachable again through a malformed
        // by-value cycle.
        self.cache.insert(ty, Ownership::Scalar);
        let class = match types.kind(ty) {
            TypeKind::Builtin(Builtin::String)
            | TypeKind::Reference { .. }
            | TypeKind::Map { .. } => Ownership::Counted,
            TypeKind::Slice { .. } => Ownership::Slice,
            TypeKind::Class { fields, .. } => {
                if fields.iter().any(|f| self.classify(types, f.ty).is_owned()) {
                    Ownership::Aggregate
                } else {
                    Ownership::Scalar
                }
            }
            TypeKind::StaticArray { of, .. } => {
                if self.classify(types, *of).is_owned() {
                    Ownership::Aggregate
                } else {
                    Ownership::Scalar
                }
            }
            TypeKind::Pseudonym { to, .. } => self.classify(types, *to),
            TypeKind::Builtin(_) | TypeKind::Enum { .. } | TypeKind::Pointer { .. } => {
                Ownership::Scalar
            }
        };
        self.cache.insert(ty, class);
        class
    }
}

#[derive(Copy, Clone)]
enum Adjust {
    Inc,
    Dec,
}

impl Compiler<'_> {
    pub(crate) fn ownership_of(&mut self, ty: TypeId) -> Ownership {
        self.ownership.classify(&self.program.types, ty)
    }

    /// Add one count to every counted object `value` refers to.
    pub(crate) fn reference(&mut self, b: &mut FunctionBuilder, value: Value, ty: TypeId) {
        self.adjust(b, value, ty, Adjust::Inc);
    }

    /// Drop one count of every counted object `value` refers to.
    ///
    /// Works on both the target and the storage form of `value`: only
    /// pointer fields are touched and those are identical in both.
    pub(crate) fn release(&mut self, b: &mut FunctionBuilder, value: Value, ty: TypeId) {
        self.adjust(b, value, ty, Adjust::Dec);
    }

    fn adjust(&mut self, b: &mut FunctionBuilder, value: Value, ty: TypeId, how: Adjust) {
        match self.ownership_of(ty) {
            Ownership::Scalar => {}
            Ownership::Counted => match how {
                Adjust::Inc => b.rc_inc(value),
                Adjust::Dec => {
                    let glue = self.drop_glue(ty);
                    b.rc_dec(value, glue);
                }
            },
            Ownership::Slice => {
                let pool = b.extract(&self.module.tys, value, field::SLICE_POOL);
                match how {
                    Adjust::Inc => b.rc_inc(pool),
                    Adjust::Dec => {
                        let glue = self.pool_glue();
                        b.rc_dec(pool, glue);
                    }
                }
            }
            Ownership::Aggregate => {
                let program = self.program;
                match program.types.kind(program.types.underlying(ty)) {
                    TypeKind::Class { fields, .. } => {
                        for (i, f) in (0u32..).zip(fields) {
                            if self.ownership_of(f.ty).is_owned() {
                                let v = b.extract(&self.module.tys, value, i);
                                self.adjust(b, v, f.ty, how);
                            }
                        }
                    }
                    TypeKind::StaticArray { of, len } => {
                        for i in 0..*len {
                            let v = b.extract(&self.module.tys, value, i);
                            self.adjust(b, v, *of, how);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Register a release of `value` at the end of the innermost frame.
    pub(crate) fn defer_release(&mut self, s: &mut Scope, value: Value, ty: TypeId) {
        if self.ownership_of(ty).is_owned() {
            s.defer(Obligation::Value(value, ty));
        }
    }

    fn discharge(&mut self, b: &mut FunctionBuilder, obligation: Obligation) {
        match obligation {
            Obligation::Value(value, ty) => self.release(b, value, ty),
            Obligation::Slot(slot, ty) => {
                let value = b.load(&self.module.tys, slot);
                self.release(b, value, ty);
            }
        }
    }

    /// Close the innermost frame, releasing its obligations unless the
    /// current block already left the function.
    pub(crate) fn close_frame(&mut self, s: &mut Scope) {
        let obligations = s.pop_frame();
        if s.b.is_terminated() {
            return;
        }
        for obligation in obligations {
            self.discharge(&mut s.b, obligation);
        }
    }

    /// Emit the releases of every open frame, for an early return.
    pub(crate) fn release_all(&mut self, s: &mut Scope) {
        for obligation in s.unwind() {
            self.discharge(&mut s.b, obligation);
        }
    }

    /// Run `body` inside a fresh frame.
    pub(crate) fn nested<R>(
        &mut self,
        s: &mut Scope,
        body: impl FnOnce(&mut Self, &mut Scope) -> Result<R, CodegenError>,
    ) -> Result<R, CodegenError> {
        s.push_frame();
        let result = body(self, s);
        // On failure the frame is abandoned along with the whole function.
        if result.is_ok() {
            self.close_frame(s);
        }
        result
    }
}
