//! Operators, checksum stages, and the ordered chain that applies them to a
//! matched frame.
//!
//! A kernel-style C implementation of this would typically encode operators
//! as a fixed table of function pointers invoked in the hot path. This
//! reimplements that as a tagged `Operator` plus a single `apply`
//! dispatcher; the compiler is free to lower the match in `Operator::apply`
//! to a jump table on hot targets on its own.

use bitflags::bitflags;

use crate::error::GwError;
use crate::frame::Frame;
use crate::{INDEX_DOMAIN, MAX_OPERATORS};

bitflags! {
    /// Which fields of a frame an [`Operator`] touches.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldSelector: u8 {
        const ID   = 0b001;
        const DLC  = 0b010;
        const DATA = 0b100;
    }
}

/// The bitwise relationship an [`Operator`] imposes between a frame field
/// and the operator's operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    And,
    Or,
    Xor,
    Set,
}

impl OperatorKind {
    fn combine_u32(self, field: u32, operand: u32) -> u32 {
        match self {
            OperatorKind::And => field & operand,
            OperatorKind::Or => field | operand,
            OperatorKind::Xor => field ^ operand,
            OperatorKind::Set => operand,
        }
    }

    fn combine_u8(self, field: u8, operand: u8) -> u8 {
        match self {
            OperatorKind::And => field & operand,
            OperatorKind::Or => field | operand,
            OperatorKind::Xor => field ^ operand,
            OperatorKind::Set => operand,
        }
    }

    fn combine_u64(self, field: u64, operand: u64) -> u64 {
        match self {
            OperatorKind::And => field & operand,
            OperatorKind::Or => field | operand,
            OperatorKind::Xor => field ^ operand,
            OperatorKind::Set => operand,
        }
    }
}

/// A single modification step: apply `kind`'s bitwise relationship between
/// each field named in `selector` and the same field of `operand`. Total at
/// apply time — never fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Operator {
    pub kind: OperatorKind,
    pub selector: FieldSelector,
    pub operand: Frame,
}

impl Operator {
    pub fn new(kind: OperatorKind, selector: FieldSelector, operand: Frame) -> Self {
        Operator { kind, selector, operand }
    }

    /// Applies this operator's effect to `frame`, field by field. The data
    /// field is combined as a single 64-bit word.
    pub fn apply(&self, frame: &mut Frame) {
        if self.selector.contains(FieldSelector::ID) {
            frame.id = self.kind.combine_u32(frame.id, self.operand.id);
        }
        if self.selector.contains(FieldSelector::DLC) {
            frame.dlc = self.kind.combine_u8(frame.dlc, self.operand.dlc).min(crate::PAYLOAD_LEN as u8);
        }
        if self.selector.contains(FieldSelector::DATA) {
            let combined = self.kind.combine_u64(frame.data_word(), self.operand.data_word());
            frame.set_data_word(combined);
        }
    }
}

/// Opaque byte carried through add/list round-trips on a CRC8 stage.
/// Nothing in this crate reads it to select a polynomial or table; it
/// exists purely so a caller can tag a checksum stage with a profile
/// identifier of its own choosing and get it back unchanged on `LIST`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChecksumProfile(pub u8);

/// `result_idx = init_xor_val XOR data[from_idx] XOR ... XOR data[to_idx]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct XorChecksum {
    pub from_idx: i8,
    pub to_idx: i8,
    pub result_idx: i8,
    pub init_xor_val: u8,
}

/// `result_idx = final_xor_val XOR CRC8(table, init_crc_val, data[from..=to])`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrcChecksum {
    pub from_idx: i8,
    pub to_idx: i8,
    pub result_idx: i8,
    pub init_crc_val: u8,
    pub final_xor_val: u8,
    pub profile: ChecksumProfile,
    pub table: [u8; 256],
}

impl std::fmt::Debug for CrcChecksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrcChecksum")
            .field("from_idx", &self.from_idx)
            .field("to_idx", &self.to_idx)
            .field("result_idx", &self.result_idx)
            .field("init_crc_val", &self.init_crc_val)
            .field("final_xor_val", &self.final_xor_val)
            .field("profile", &self.profile)
            .field("table", &"[u8; 256]")
            .finish()
    }
}

fn validate_index_domain(from: i8, to: i8, result: i8) -> Result<(), GwError> {
    let domain = INDEX_DOMAIN;
    if domain.contains(&from) && domain.contains(&to) && domain.contains(&result) {
        Ok(())
    } else {
        Err(GwError::InvalidArg)
    }
}

impl XorChecksum {
    pub fn validate(&self) -> Result<(), GwError> {
        validate_index_domain(self.from_idx, self.to_idx, self.result_idx)
    }

    /// Silently a no-op if any resolved index falls outside `[0, dlc)` for
    /// this particular frame, or if the resolved range is reversed.
    fn apply(&self, frame: &mut Frame) {
        let (Some(from), Some(to), Some(result)) = (
            frame.resolve_index(self.from_idx),
            frame.resolve_index(self.to_idx),
            frame.resolve_index(self.result_idx),
        ) else {
            return;
        };
        if from > to {
            return;
        }
        let mut acc = self.init_xor_val;
        for &b in &frame.data[from..=to] {
            acc ^= b;
        }
        frame.data[result] = acc;
    }
}

impl CrcChecksum {
    pub fn validate(&self) -> Result<(), GwError> {
        validate_index_domain(self.from_idx, self.to_idx, self.result_idx)
    }

    fn apply(&self, frame: &mut Frame) {
        let (Some(from), Some(to), Some(result)) = (
            frame.resolve_index(self.from_idx),
            frame.resolve_index(self.to_idx),
            frame.resolve_index(self.result_idx),
        ) else {
            return;
        };
        if from > to {
            return;
        }
        let mut crc = self.init_crc_val;
        for &b in &frame.data[from..=to] {
            crc = self.table[(crc ^ b) as usize];
        }
        frame.data[result] = self.final_xor_val ^ crc;
    }
}

/// An ordered sequence of operators plus the two optional post-modification
/// checksum stages.
///
/// Canonical equality: two chains are equal iff their operator sequences are
/// equal and their checksum stages are equal. A fixed-size struct compared
/// field-by-field via a raw byte comparison would need explicit zeroing of
/// unused slots and padding to avoid comparing uninitialized bytes; this
/// representation has no unused slots or padding to begin with —
/// `operators` holds exactly the active operators and a disabled checksum
/// stage is `None` — so `#[derive(PartialEq)]` already gives byte-equal
/// comparison semantics for free.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModChain {
    operators: Vec<Operator>,
    xor_checksum: Option<XorChecksum>,
    crc8_checksum: Option<CrcChecksum>,
}

impl ModChain {
    pub fn build(
        operators: Vec<Operator>,
        xor_checksum: Option<XorChecksum>,
        crc8_checksum: Option<CrcChecksum>,
    ) -> Result<Self, GwError> {
        if operators.len() > MAX_OPERATORS {
            return Err(GwError::InvalidArg);
        }
        for op in &operators {
            if op.selector.is_empty() {
                return Err(GwError::InvalidArg);
            }
        }
        if let Some(xor) = &xor_checksum {
            xor.validate()?;
        }
        if let Some(crc8) = &crc8_checksum {
            crc8.validate()?;
        }
        // Checksum stages fire only when at least one modification has
        // happened; an empty operator list silently drops them.
        let (xor_checksum, crc8_checksum) = if operators.is_empty() {
            (None, None)
        } else {
            (xor_checksum, crc8_checksum)
        };
        Ok(ModChain { operators, xor_checksum, crc8_checksum })
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    pub fn xor_checksum(&self) -> Option<&XorChecksum> {
        self.xor_checksum.as_ref()
    }

    pub fn crc8_checksum(&self) -> Option<&CrcChecksum> {
        self.crc8_checksum.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Applies every operator in order, then the XOR checksum stage, then
    /// the CRC8 checksum stage — but only if at least one operator ran.
    pub fn apply(&self, frame: &mut Frame) {
        for op in &self.operators {
            op.apply(frame);
        }
        if self.operators.is_empty() {
            return;
        }
        if let Some(xor) = &self.xor_checksum {
            xor.apply(frame);
        }
        if let Some(crc8) = &self.crc8_checksum {
            crc8.apply(frame);
        }
    }
}
