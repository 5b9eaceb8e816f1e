//! Immediate data: the small block of per-draw constants a backend passes
//! alongside a pipeline. One variable may be declared by the user; backends
//! then append their own internal ranges after it.

use std::fmt;

use stria_ir::{AddressSpace, InstKind, Module, round_up};

use crate::validation::Failure;

/// A byte range of internal immediate data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImmediateRange {
    pub offset: u32,
    pub size: u32,
}

impl ImmediateRange {
    pub const fn new(offset: u32, size: u32) -> Self {
        Self { offset, size }
    }

    /// One past the last byte, widened so it cannot wrap.
    fn end(self) -> u64 {
        u64::from(self.offset) + u64::from(self.size)
    }

    fn overlaps(self, other: Self) -> bool {
        u64::from(self.offset) < other.end() && u64::from(other.offset) < self.end()
    }
}

impl fmt::Display for ImmediateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

/// Checks that `module` declares at most one `immediate` variable and
/// returns its size in bytes, rounded up to a multiple of 4. A module with
/// no immediate variable reserves nothing.
pub fn validate_single_user_immediate(module: &Module) -> Result<u32, Failure> {
    let mut size = None;
    for &inst in module.block(module.root_block()).instructions() {
        let instruction = module.instruction(inst);
        if !matches!(instruction.kind, InstKind::Var(_)) {
            continue;
        }
        let Some((store, AddressSpace::Immediate, _)) = instruction
            .result()
            .and_then(|v| module.value_type(v))
            .and_then(|ty| module.types.pointer(ty))
        else {
            continue;
        };
        if size.is_some() {
            return Err(Failure::message(
                "module contains multiple user-declared immediate data variables",
            ));
        }
        size = Some(round_up(4, module.types.size(store)));
    }
    Ok(size.unwrap_or(0))
}

/// Checks the internal immediate data `ranges` a backend wants to append
/// after `user_bytes` of user-declared data, within `max_bytes` in total.
pub fn validate_internal_immediate_offset(
    max_bytes: u32,
    user_bytes: u32,
    ranges: &[ImmediateRange],
) -> Result<(), Failure> {
    let user = ImmediateRange::new(0, user_bytes);
    for (i, &range) in ranges.iter().enumerate() {
        if range.size == 0 {
            return Err(Failure::message(format!(
                "internal immediate data at offset {} has zero size",
                range.offset
            )));
        }
        if range.offset % 4 != 0 || range.size % 4 != 0 {
            return Err(Failure::message(format!(
                "internal immediate data {range} is not 4-byte aligned"
            )));
        }
        if range.end() > u64::from(max_bytes) {
            return Err(Failure::message(format!(
                "internal immediate data {range} exceeds the maximum of {max_bytes} bytes"
            )));
        }
        if user_bytes > 0 && range.overlaps(user) {
            return Err(Failure::message(format!(
                "internal immediate data {range} overlaps user-declared immediate data {user}"
            )));
        }
        if let Some(other) = ranges[..i].iter().find(|other| other.overlaps(range)) {
            return Err(Failure::message(format!(
                "internal immediate data {range} overlaps internal immediate data {other}"
            )));
        }
    }
    Ok(())
}
