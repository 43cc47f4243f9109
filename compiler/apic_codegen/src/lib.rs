//! Expression compiler for the apic backend.
//!
//! Lowers the type-checked semantic graph ([`apic_ir::Program`]) into the
//! block/register IR of [`apic_backend`], inserting reference-count
//! operations so every counted object a function produces is released
//! exactly once.
//!
//! # Debug Environment Variables
//!
//! - `RUST_LOG=apic_codegen=debug`: one event per compiled function.
//! - `RUST_LOG=apic_codegen=trace`: every expression and drop function.
//!
//! # Architecture
//!
//! ```text
//! Compiler
//!   ├── function.rs         declaration, on-demand compilation, globals init
//!   ├── stmt.rs             statements, early returns
//!   ├── expr/mod.rs         exhaustive dispatch over ExprKind
//!   │     ├── literals.rs   constants, strings, bindings
//!   │     ├── operators.rs  binary, unary, bit tests, casts
//!   │     ├── calls.rs      plain calls, subroutine error propagation
//!   │     ├── containers.rs arrays, slices, maps, length
//!   │     ├── classes.rs    initializers, create, member access
//!   │     └── select.rs     case chains
//!   ├── ownership.rs        classification, reference/release, frames
//!   ├── drop_glue.rs        per-type drop functions
//!   └── types.rs            semantic → representation types
//! ```

// Crate-level lint configuration for codegen-specific patterns
#![allow(
    // Field and element indices are u32 in the backend, lengths are usize here
    clippy::cast_possible_truncation,
    // Signed literals are emitted as their two's complement bits
    clippy::cast_sign_loss,
)]

mod cast;
mod compiler;
mod drop_glue;
mod error;
mod expr;
mod function;
mod ownership;
mod scope;
mod stack;
mod stmt;
mod types;

#[cfg(test)]
mod tests;

use std::sync::Once;

use apic_ir::{FunctionId, Program};

pub use cast::{cast_op, convert};
pub use compiler::{CompiledProgram, Compiler, ContextTypes};
pub use error::{CodegenError, ErrorKind};
pub use function::GLOBALS_INIT;
pub use ownership::{Classifier, Ownership};
pub use scope::{Protocol, Scope};
pub use types::{
    TypeMapper, CTX_ARENA, CTX_GLOBALS, ERR_SUCCESS, REF_VALUE, RESULT_ERROR, RESULT_VALUE,
};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing subscriber for debugging.
///
/// Call this at the start of tests or the driver to enable tracing output.
/// Controlled by `RUST_LOG`, e.g. `RUST_LOG=apic_codegen=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

/// Compile every function of `program`.
///
/// The first error aborts the whole compilation.
pub fn compile_program(program: &Program) -> Result<CompiledProgram, CodegenError> {
    let mut compiler = Compiler::new(program);
    for index in 0..program.functions.len() {
        let id = FunctionId::new(index as u32);
        compiler.compile_function(id)?;
    }
    compiler.define_globals_init()?;
    tracing::debug!(
        functions = program.functions.len(),
        backend_functions = compiler.module().function_count(),
        "compiled program"
    );
    Ok(compiler.finish())
}
