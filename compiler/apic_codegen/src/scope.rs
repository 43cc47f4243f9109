//! Emission context of the function being compiled.
//!
//! A [`Scope`] owns the [`FunctionBuilder`], the parameter and local
//! bindings, and a stack of release frames. Every owned value an
//! expression produces is registered in the innermost frame; a frame is
//! drained (releases emitted, last registered first) when the region that
//! opened it ends. Early returns emit the releases of every open frame
//! without draining them, since the fall-through path still needs them.

use apic_backend::{FunctionBuilder, TyId, Value};
use apic_ir::{FunctionId, LocalId, ParamId, TypeId};
use rustc_hash::FxHashMap;

/// Return protocol of the function being compiled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Protocol {
    /// The value is returned directly.
    Plain,
    /// `{ error, value }` is returned; `result` is its representation.
    Subroutine { result: TyId },
}

/// One pending release.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Obligation {
    /// Release this value.
    Value(Value, TypeId),
    /// Release whatever the slot holds when the frame closes.
    Slot(Value, TypeId),
}

pub struct Scope {
    pub(crate) b: FunctionBuilder,
    pub(crate) function: FunctionId,
    pub(crate) name: String,
    pub(crate) protocol: Protocol,
    /// The context argument.
    pub(crate) ctx: Value,
    pub(crate) params: FxHashMap<ParamId, Value>,
    /// Stack slot of each declared local.
    pub(crate) locals: FxHashMap<LocalId, Value>,
    frames: Vec<Vec<Obligation>>,
}

impl Scope {
    pub(crate) fn new(
        b: FunctionBuilder,
        function: FunctionId,
        protocol: Protocol,
    ) -> Self {
        let name = b.name().to_owned();
        let ctx = b.param(0);
        Self {
            b,
            function,
            name,
            protocol,
            ctx,
            params: FxHashMap::default(),
            locals: FxHashMap::default(),
            frames: vec![Vec::new()],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self) -> FunctionId {
        self.function
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn builder(&self) -> &FunctionBuilder {
        &self.b
    }

    /// Number of open frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Obligations registered in the innermost frame.
    pub fn pending(&self) -> usize {
        self.frames.last().map_or(0, Vec::len)
    }

    pub(crate) fn defer(&mut self, obligation: Obligation) {
        if let Some(frame) = self.frames.last_mut() {
            frame.push(obligation);
        }
    }

    pub(crate) fn push_frame(&mut self) {
        self.frames.push(Vec::new());
    }

    /// Remove the innermost frame, returning its obligations in release
    /// order.
    pub(crate) fn pop_frame(&mut self) -> Vec<Obligation> {
        let mut frame = self.frames.pop().unwrap_or_default();
        frame.reverse();
        frame
    }

    /// Every open obligation in release order, innermost frame first.
    pub(crate) fn unwind(&self) -> Vec<Obligation> {
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev().copied())
            .collect()
    }
}
