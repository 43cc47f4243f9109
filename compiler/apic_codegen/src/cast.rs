//! Conversions between representation types.
//!
//! Numeric conversions follow Rust `as`: integer narrowing truncates,
//! widening sign- or zero-extends by the *source* signedness, float to int
//! saturates (NaN becomes zero), and int to bool tests against zero.

use apic_backend::{CastOp, CmpPred, FunctionBuilder, TyId, TyKind, TyTable, Value};

/// The single cast instruction converting `src` to `dst`.
///
/// Returns `None` only for float to bool, which needs a comparison
/// instead (see [`convert`]).
pub fn cast_op(tys: &TyTable, src: TyId, dst: TyId) -> Option<CastOp> {
    if src == dst {
        return Some(CastOp::Nop);
    }
    let op = match (tys.kind(src), tys.kind(dst)) {
        (
            TyKind::Int {
                bits: from,
                signed,
            },
            TyKind::Int { bits: to, .. },
        ) => match from.cmp(to) {
            std::cmp::Ordering::Equal => CastOp::Nop,
            std::cmp::Ordering::Greater => CastOp::Trunc,
            std::cmp::Ordering::Less if *signed => CastOp::SExt,
            std::cmp::Ordering::Less => CastOp::ZExt,
        },
        (TyKind::Int { signed: true, .. }, TyKind::F32 | TyKind::F64) => CastOp::SIToFP,
        (TyKind::Int { .. } | TyKind::Bool, TyKind::F32 | TyKind::F64) => CastOp::UIToFP,
        (TyKind::F32 | TyKind::F64, TyKind::Int { signed: true, .. }) => CastOp::FPToSI,
        (TyKind::F32 | TyKind::F64, TyKind::Int { .. }) => CastOp::FPToUI,
        (TyKind::F32, TyKind::F64) => CastOp::FPExt,
        (TyKind::F64, TyKind::F32) => CastOp::FPTrunc,
        (TyKind::F32 | TyKind::F64, TyKind::Bool) => return None,
        (TyKind::Bool, TyKind::Int { .. }) => CastOp::BoolToInt,
        (TyKind::Int { .. }, TyKind::Bool) => CastOp::IntToBool,
        (TyKind::Pointer(_), TyKind::Pointer(_)) => CastOp::PtrToPtr,
        (TyKind::Pointer(_), TyKind::Int { .. }) => CastOp::PtrToInt,
        (TyKind::Int { .. }, TyKind::Pointer(_)) => CastOp::IntToPtr,
        // Aggregates of the same layout; the image is reinterpreted.
        _ => CastOp::Nop,
    };
    Some(op)
}

/// Emit the conversion of `value` to `dst`.
pub fn convert(b: &mut FunctionBuilder, tys: &TyTable, value: Value, dst: TyId) -> Value {
    match cast_op(tys, value.ty, dst) {
        Some(op) => b.cast(op, value, dst),
        None => {
            let zero = b.zero(value.ty);
            b.cmp(CmpPred::Ne, value, zero)
        }
    }
}

#[cfg(test)]
mod tests {
    use apic_backend::eval::value::{cast, from_uint, to_uint};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    const NUMERIC: [TyId; 10] = [
        TyId::I8,
        TyId::I16,
        TyId::I32,
        TyId::I64,
        TyId::U8,
        TyId::U16,
        TyId::U32,
        TyId::U64,
        TyId::F32,
        TyId::F64,
    ];

    macro_rules! as_dst {
        ($v:expr, $dst:expr) => {
            match $dst {
                TyId::I8 => u64::from($v as i8 as u8),
                TyId::I16 => u64::from($v as i16 as u16),
                TyId::I32 => u64::from($v as i32 as u32),
                TyId::I64 => $v as i64 as u64,
                TyId::U8 => u64::from($v as u8),
                TyId::U16 => u64::from($v as u16),
                TyId::U32 => u64::from($v as u32),
                TyId::U64 => $v as u64,
                TyId::F32 => u64::from(($v as f32).to_bits()),
                _ => ($v as f64).to_bits(),
            }
        };
    }

    /// `bits` reinterpreted as `src`, converted with `as`, as raw bits.
    fn oracle(src: TyId, dst: TyId, bits: u64) -> u64 {
        match src {
            TyId::I8 => as_dst!(bits as u8 as i8, dst),
            TyId::I16 => as_dst!(bits as u16 as i16, dst),
            TyId::I32 => as_dst!(bits as u32 as i32, dst),
            TyId::I64 => as_dst!(bits as i64, dst),
            TyId::U8 => as_dst!(bits as u8, dst),
            TyId::U16 => as_dst!(bits as u16, dst),
            TyId::U32 => as_dst!(bits as u32, dst),
            TyId::U64 => as_dst!(bits, dst),
            TyId::F32 => as_dst!(f32::from_bits(bits as u32), dst),
            _ => as_dst!(f64::from_bits(bits), dst),
        }
    }

    fn finite(src: TyId, bits: u64) -> bool {
        match src {
            TyId::F32 => f32::from_bits(bits as u32).is_finite(),
            TyId::F64 => f64::from_bits(bits).is_finite(),
            _ => true,
        }
    }

    #[test]
    fn integer_widths_pick_extension_by_source_sign() {
        let tys = TyTable::new();
        assert_eq!(cast_op(&tys, TyId::I8, TyId::I32), Some(CastOp::SExt));
        assert_eq!(cast_op(&tys, TyId::U8, TyId::I32), Some(CastOp::ZExt));
        assert_eq!(cast_op(&tys, TyId::I64, TyId::U16), Some(CastOp::Trunc));
        assert_eq!(cast_op(&tys, TyId::I32, TyId::U32), Some(CastOp::Nop));
        assert_eq!(cast_op(&tys, TyId::BOOL, TyId::U8), Some(CastOp::BoolToInt));
        assert_eq!(cast_op(&tys, TyId::U32, TyId::BOOL), Some(CastOp::IntToBool));
        assert_eq!(cast_op(&tys, TyId::F64, TyId::BOOL), None);
        assert_eq!(
            cast_op(&tys, TyId::BYTE_PTR, TyId::U64),
            Some(CastOp::PtrToInt)
        );
    }

    #[test]
    fn float_to_bool_compares_against_zero() {
        let tys = TyTable::new();
        let mut b = FunctionBuilder::new("nz", &[TyId::F64], TyId::BOOL);
        let x = b.param(0);
        let r = convert(&mut b, &tys, x, TyId::BOOL);
        assert_eq!(r.ty, TyId::BOOL);
        b.ret(Some(r));
        let f = b.finish();
        assert_eq!(f.instr_count(), 2);
    }

    proptest! {
        #[test]
        fn numeric_casts_match_as(bits in any::<u64>(), from in 0..NUMERIC.len(), to in 0..NUMERIC.len()) {
            let (src, dst) = (NUMERIC[from], NUMERIC[to]);
            prop_assume!(finite(src, bits));
            let tys = TyTable::new();
            let op = cast_op(&tys, src, dst).unwrap_or(CastOp::Nop);
            let input = from_uint(bits, tys.size_of(src));
            let out = cast(&tys, op, src, dst, &input).map(|raw| to_uint(&raw));
            prop_assert_eq!(out, Ok(oracle(src, dst, bits)));
        }
    }
}
