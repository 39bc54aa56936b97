//! Struct/union layout and bit-field packing (§4.5 "Struct member layout").

use super::{
    align_member_offset, compute_type_size, round_up, type_alignment, AggregateKind, StructuralMember,
    TypeFactory, TypeId, TypeRef, UNKNOWN_SIZE,
};

/// One not-yet-laid-out member, as the parser builds it: bit-field members
/// carry a declared width, ordinary members don't. `offset` is filled in
/// by [`layout_struct_members`].
#[derive(Debug, Clone)]
pub struct RawMember {
    pub name: String,
    pub ty: TypeRef,
    pub bit_width: Option<u32>,
    /// `Some(parent_index)` when this member was lifted out of the
    /// anonymous aggregate member at `parent_index` in the *output* list.
    pub parent: Option<usize>,
    pub is_flexible: bool,
    pub offset: i64,
}

impl RawMember {
    #[must_use]
    pub fn field(name: impl Into<String>, ty: TypeRef) -> Self {
        RawMember { name: name.into(), ty, bit_width: None, parent: None, is_flexible: false, offset: 0 }
    }
    #[must_use]
    pub fn bitfield(name: impl Into<String>, ty: TypeRef, width: u32) -> Self {
        RawMember { name: name.into(), ty, bit_width: Some(width), parent: None, is_flexible: false, offset: 0 }
    }
}

/// A run of adjacent bit-field members sharing one storage slot
/// (§3 "Bit-field chain").
#[derive(Debug, Default)]
pub struct BitfieldChain {
    pub total_width: u32,
}

const MAX_CHAIN_WIDTH: u32 = 64;

/// Pick the smallest power-of-two byte width in `{1,2,4,8}` covering `width`
/// bits, uniform across the whole chain (§3 invariant on bit-field chains).
#[must_use]
fn storage_size_for_width(width: u32) -> u32 {
    for candidate in [1u32, 2, 4, 8] {
        if width <= candidate * 8 {
            return candidate;
        }
    }
    8
}

/// `adjustBitfieldStorage`: picks a storage size covering `chain`, aligns
/// `offset` to it, and back-patches every member in `raw[chain_start..chain_end]`'s
/// `(offset, type)` in place. Returns the byte offset immediately past the
/// storage slot.
pub fn adjust_bitfield_storage(
    raw: &mut [RawMember],
    chain_start: usize,
    chain_end: usize,
    chain: &BitfieldChain,
    offset: i64,
    unsigned_storage: bool,
) -> i64 {
    let storage_bytes = storage_size_for_width(chain.total_width);
    let aligned_offset = round_up(offset, i64::from(storage_bytes));
    let storage_id = match storage_bytes {
        1 => if unsigned_storage { TypeId::U1 } else { TypeId::S1 },
        2 => if unsigned_storage { TypeId::U2 } else { TypeId::S2 },
        4 => if unsigned_storage { TypeId::U4 } else { TypeId::S4 },
        _ => if unsigned_storage { TypeId::U8 } else { TypeId::S8 },
    };
    let storage_ty = TypeFactory::primitive(storage_id, Default::default());
    let mut bit_offset = 0u32;
    for m in &mut raw[chain_start..chain_end] {
        let width = match m.bit_width {
            Some(w) => w,
            None => continue,
        };
        m.ty = TypeFactory::bitfield(storage_ty.clone(), bit_offset, width);
        m.offset = aligned_offset;
        bit_offset += width;
    }
    aligned_offset + i64::from(storage_bytes)
}

/// Lay out a struct or union body in declaration order (§4.5).
///
/// Returns the finished `members`, overall `size`, `align`, and whether the
/// body ends in a flexible array member.
#[must_use]
pub fn layout_struct_members(
    kind: AggregateKind,
    mut raw: Vec<RawMember>,
) -> (Vec<StructuralMember>, i64, u32, bool) {
    let is_union = kind == AggregateKind::Union;
    let mut offset: i64 = 0;
    let mut max_align: u32 = 1;
    let mut max_size: i64 = 0;
    let mut is_flexible = false;

    let mut i = 0;
    while i < raw.len() {
        if raw[i].bit_width.is_some() {
            let chain_start = i;
            let mut chain = BitfieldChain::default();
            while i < raw.len() {
                match raw[i].bit_width {
                    Some(0) => {
                        // A zero-width bit-field closes the chain without
                        // itself becoming a member.
                        i += 1;
                        break;
                    }
                    Some(w) if chain.total_width + w <= MAX_CHAIN_WIDTH => {
                        chain.total_width += w;
                        i += 1;
                    }
                    _ => break,
                }
            }
            let chain_end = i;
            if chain_end > chain_start {
                let unsigned = raw[chain_start..chain_end]
                    .iter()
                    .find_map(|m| match m.ty.kind() {
                        super::TypeKind::Value(d) => Some(d.type_id.is_unsigned_integer()),
                        _ => None,
                    })
                    .unwrap_or(true);
                let start_offset = if is_union { 0 } else { offset };
                let storage_bytes = storage_size_for_width(chain.total_width);
                let storage_end =
                    adjust_bitfield_storage(&mut raw, chain_start, chain_end, &chain, start_offset, unsigned);
                if !is_union {
                    offset = storage_end;
                }
                max_size = max_size.max(storage_end);
                max_align = max_align.max(storage_bytes);
            }
            continue;
        }

        // Ordinary (non bit-field) member.
        let aligned = if is_union { 0 } else { align_member_offset(&raw[i].ty, offset) };
        let member_size = compute_type_size(&raw[i].ty);
        raw[i].offset = aligned;
        let align = type_alignment(&raw[i].ty);
        max_align = max_align.max(align.max(1));
        if member_size == UNKNOWN_SIZE {
            // Flexible array member: only legal as the trailing member.
            is_flexible = true;
            raw[i].is_flexible = true;
        } else {
            max_size = max_size.max(aligned + member_size);
            if !is_union {
                offset = aligned + member_size;
            }
        }
        i += 1;
    }

    let members: Vec<StructuralMember> = raw
        .into_iter()
        .filter(|m| m.bit_width != Some(0))
        .map(|m| StructuralMember {
            name: m.name,
            offset: m.offset,
            ty: m.ty,
            parent: m.parent,
            is_flexible: m.is_flexible,
        })
        .collect();

    let size = round_up(max_size, i64::from(max_align));
    (members, size, max_align, is_flexible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Qualifiers, TypeId};

    fn prim(id: TypeId) -> TypeRef {
        TypeFactory::primitive(id, Qualifiers::empty())
    }

    /// S1: `struct S { char a; int b; char c; }` -> offsets 0, 4, 8; size 12; align 4.
    #[test]
    fn struct_layout_s1() {
        let raw = vec![
            RawMember::field("a", prim(TypeId::S1)),
            RawMember::field("b", prim(TypeId::S4)),
            RawMember::field("c", prim(TypeId::S1)),
        ];
        let (members, size, align, flexible) = layout_struct_members(AggregateKind::Struct, raw);
        assert_eq!(members[0].offset, 0);
        assert_eq!(members[1].offset, 4);
        assert_eq!(members[2].offset, 8);
        assert_eq!(size, 12);
        assert_eq!(align, 4);
        assert!(!flexible);
    }

    /// S2: `struct B { unsigned x:3; unsigned y:5; unsigned z:8; }` packs into
    /// one 2-byte storage slot: x at bit 0, y at bit 3, z at bit 8; size 2.
    #[test]
    fn bitfield_packing_s2() {
        let u4 = prim(TypeId::U4);
        let raw = vec![
            RawMember::bitfield("x", u4.clone(), 3),
            RawMember::bitfield("y", u4.clone(), 5),
            RawMember::bitfield("z", u4, 8),
        ];
        let (members, size, _align, _flexible) = layout_struct_members(AggregateKind::Struct, raw);
        assert_eq!(members.len(), 3);
        for m in &members {
            assert_eq!(m.offset, 0);
        }
        let widths_and_offsets: Vec<(u32, u32)> = members
            .iter()
            .map(|m| match m.ty.kind() {
                super::super::TypeKind::Bitfield(_, bit_offset, width) => (*bit_offset, *width),
                _ => panic!("expected bitfield"),
            })
            .collect();
        assert_eq!(widths_and_offsets, vec![(0, 3), (3, 5), (8, 8)]);
        assert_eq!(size, 2);
    }

    #[test]
    fn union_members_all_at_offset_zero() {
        let raw = vec![
            RawMember::field("a", prim(TypeId::S1)),
            RawMember::field("b", prim(TypeId::S4)),
        ];
        let (members, size, align, _) = layout_struct_members(AggregateKind::Union, raw);
        assert!(members.iter().all(|m| m.offset == 0));
        assert_eq!(size, 4);
        assert_eq!(align, 4);
    }

    #[test]
    fn zero_width_bitfield_closes_chain() {
        let u4 = prim(TypeId::U4);
        let raw = vec![
            RawMember::bitfield("x", u4.clone(), 3),
            RawMember::bitfield("", u4.clone(), 0),
            RawMember::bitfield("y", u4, 3),
        ];
        let (members, _size, _align, _) = layout_struct_members(AggregateKind::Struct, raw);
        assert_eq!(members.len(), 2);
        match members[1].ty.kind() {
            super::super::TypeKind::Bitfield(_, bit_offset, _) => assert_eq!(*bit_offset, 0),
            _ => panic!("expected bitfield"),
        }
    }
}
