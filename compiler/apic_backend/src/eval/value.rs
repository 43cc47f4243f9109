//! Raw value encoding and scalar semantics.
//!
//! Every run-time value is its little-endian in-memory image, exactly
//! `size_of(ty)` bytes long. Aggregates are therefore moved, loaded and
//! stored without any per-type code; only the operations that interpret
//! bits (arithmetic, comparison, casts) look at the type.

use std::cmp::Ordering;

use smallvec::SmallVec;

use super::error::{ExecError, ExecResult};
use crate::ir::{BinOp, CastOp, CmpPred};
use crate::ty::{TyId, TyKind, TyTable};

/// In-memory image of a value.
pub type Raw = SmallVec<[u8; 16]>;

pub fn zeros(size: u64) -> Raw {
    SmallVec::from_elem(0, usize::try_from(size).unwrap_or(0))
}

/// Encode the low `size` bytes of `bits`.
pub fn from_uint(bits: u64, size: u64) -> Raw {
    let bytes = bits.to_le_bytes();
    let n = usize::try_from(size).unwrap_or(8).min(8);
    let mut raw = Raw::from_slice(&bytes[..n]);
    raw.resize(usize::try_from(size).unwrap_or(n), 0);
    raw
}

/// Decode up to eight bytes as an unsigned integer.
pub fn to_uint(raw: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    let n = raw.len().min(8);
    bytes[..n].copy_from_slice(&raw[..n]);
    u64::from_le_bytes(bytes)
}

pub fn from_bool(value: bool) -> Raw {
    Raw::from_slice(&[u8::from(value)])
}

pub fn to_bool(raw: &[u8]) -> bool {
    raw.first().is_some_and(|&b| b != 0)
}

fn mask(bits: u8) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Sign-extend the low `bits` bits of `value`.
#[expect(
    clippy::cast_possible_wrap,
    reason = "reinterpreting two's-complement bits is the point"
)]
fn sext(value: u64, bits: u8) -> i64 {
    let shift = 64 - u32::from(bits);
    ((value << shift) as i64) >> shift
}

#[expect(clippy::cast_sign_loss, reason = "two's-complement reinterpretation")]
fn from_i64(value: i64, bits: u8) -> u64 {
    (value as u64) & mask(bits)
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "f32 images are four bytes"
)]
fn to_float(raw: &[u8], ty: &TyKind) -> f64 {
    match ty {
        TyKind::F32 => f64::from(f32::from_bits(to_uint(raw) as u32)),
        _ => f64::from_bits(to_uint(raw)),
    }
}

#[expect(clippy::cast_possible_truncation, reason = "rounding to f32 is intended")]
fn from_float(value: f64, ty: &TyKind) -> Raw {
    match ty {
        TyKind::F32 => from_uint(u64::from((value as f32).to_bits()), 4),
        _ => from_uint(value.to_bits(), 8),
    }
}

fn invalid(op: impl std::fmt::Debug, tys: &TyTable, ty: TyId) -> ExecError {
    ExecError::InvalidOperation {
        op: format!("{op:?}"),
        ty: tys.display(ty),
    }
}

pub fn binary(tys: &TyTable, op: BinOp, ty: TyId, lhs: &[u8], rhs: &[u8]) -> ExecResult<Raw> {
    let kind = tys.kind(ty);
    match kind {
        TyKind::Int { bits, signed } => {
            let (bits, signed) = (*bits, *signed);
            let (a, b) = (to_uint(lhs), to_uint(rhs));
            let shift = u32::try_from(b % u64::from(bits)).unwrap_or(0);
            let result = match op {
                BinOp::Add => a.wrapping_add(b),
                BinOp::Sub => a.wrapping_sub(b),
                BinOp::Mul => a.wrapping_mul(b),
                BinOp::Div if b == 0 => return Err(ExecError::DivisionByZero),
                BinOp::Div if signed => from_i64(sext(a, bits).wrapping_div(sext(b, bits)), bits),
                BinOp::Div => a / b,
                BinOp::And => a & b,
                BinOp::Or => a | b,
                BinOp::Xor => a ^ b,
                BinOp::Shl => a << shift,
                BinOp::Shr if signed => from_i64(sext(a, bits) >> shift, bits),
                BinOp::Shr => a >> shift,
            };
            Ok(from_uint(result & mask(bits), u64::from(bits / 8)))
        }
        TyKind::Bool => {
            let (a, b) = (to_bool(lhs), to_bool(rhs));
            match op {
                BinOp::And => Ok(from_bool(a & b)),
                BinOp::Or => Ok(from_bool(a | b)),
                BinOp::Xor => Ok(from_bool(a ^ b)),
                _ => Err(invalid(op, tys, ty)),
            }
        }
        TyKind::F32 | TyKind::F64 => {
            let (a, b) = (to_float(lhs, kind), to_float(rhs, kind));
            let result = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                _ => return Err(invalid(op, tys, ty)),
            };
            Ok(from_float(result, kind))
        }
        _ => Err(invalid(op, tys, ty)),
    }
}

pub fn compare(tys: &TyTable, pred: CmpPred, ty: TyId, lhs: &[u8], rhs: &[u8]) -> ExecResult<bool> {
    let kind = tys.kind(ty);
    let ordering = match kind {
        TyKind::Int { bits, signed: true } => Some(sext(to_uint(lhs), *bits).cmp(&sext(to_uint(rhs), *bits))),
        TyKind::Int { .. } | TyKind::Bool | TyKind::Pointer(_) => Some(to_uint(lhs).cmp(&to_uint(rhs))),
        TyKind::F32 | TyKind::F64 => to_float(lhs, kind).partial_cmp(&to_float(rhs, kind)),
        _ => return Err(invalid(pred, tys, ty)),
    };
    // Unordered (NaN) compares false for everything but `Ne`.
    let Some(ordering) = ordering else {
        return Ok(pred == CmpPred::Ne);
    };
    Ok(match pred {
        CmpPred::Eq => ordering == Ordering::Equal,
        CmpPred::Ne => ordering != Ordering::Equal,
        CmpPred::Lt => ordering == Ordering::Less,
        CmpPred::Le => ordering != Ordering::Greater,
        CmpPred::Gt => ordering == Ordering::Greater,
        CmpPred::Ge => ordering != Ordering::Less,
    })
}

pub fn not(tys: &TyTable, ty: TyId, operand: &[u8]) -> ExecResult<Raw> {
    match tys.kind(ty) {
        TyKind::Bool => Ok(from_bool(!to_bool(operand))),
        TyKind::Int { bits, .. } => Ok(from_uint(!to_uint(operand) & mask(*bits), u64::from(bits / 8))),
        _ => Err(invalid("Not", tys, ty)),
    }
}

/// Saturating float-to-int conversion with Rust `as` semantics.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "`as` saturation is the defined semantics"
)]
fn float_to_int(value: f64, bits: u8, signed: bool) -> u64 {
    match (bits, signed) {
        (8, true) => from_i64(i64::from(value as i8), 8),
        (16, true) => from_i64(i64::from(value as i16), 16),
        (32, true) => from_i64(i64::from(value as i32), 32),
        (64, true) => from_i64(value as i64, 64),
        (8, false) => u64::from(value as u8),
        (16, false) => u64::from(value as u16),
        (32, false) => u64::from(value as u32),
        _ => value as u64,
    }
}

#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    reason = "int-to-float rounding follows `as`"
)]
pub fn cast(tys: &TyTable, op: CastOp, src: TyId, dst: TyId, value: &[u8]) -> ExecResult<Raw> {
    let dst_kind = tys.kind(dst);
    let src_kind = tys.kind(src);
    let dst_size = tys.size_of(dst);
    let src_bits = tys.int_info(src).map_or(8, |(bits, _)| bits);
    let raw = match op {
        CastOp::Nop | CastOp::PtrToPtr => {
            let mut raw = Raw::from_slice(value);
            raw.resize(usize::try_from(dst_size).unwrap_or(0), 0);
            raw
        }
        CastOp::Trunc
        | CastOp::ZExt
        | CastOp::PtrToInt
        | CastOp::IntToPtr
        | CastOp::BoolToInt => from_uint(to_uint(value), dst_size),
        CastOp::SExt => {
            let (bits, _) = tys.int_info(dst).ok_or_else(|| invalid(op, tys, dst))?;
            from_uint(from_i64(sext(to_uint(value), src_bits), bits), dst_size)
        }
        CastOp::SIToFP => {
            let v = sext(to_uint(value), src_bits);
            // Go through f32 directly so rounding matches a single `as`.
            match dst_kind {
                TyKind::F32 => from_uint(u64::from((v as f32).to_bits()), 4),
                _ => from_float(v as f64, dst_kind),
            }
        }
        CastOp::UIToFP => {
            let v = to_uint(value);
            match dst_kind {
                TyKind::F32 => from_uint(u64::from((v as f32).to_bits()), 4),
                _ => from_float(v as f64, dst_kind),
            }
        }
        CastOp::FPToSI | CastOp::FPToUI => {
            let (bits, signed) = tys.int_info(dst).ok_or_else(|| invalid(op, tys, dst))?;
            from_uint(float_to_int(to_float(value, src_kind), bits, signed), dst_size)
        }
        CastOp::FPExt | CastOp::FPTrunc => from_float(to_float(value, src_kind), dst_kind),
        CastOp::IntToBool => from_bool(to_uint(value) != 0),
    };
    Ok(raw)
}
