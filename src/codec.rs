//! Parsing and serializing the attribute-tagged wire encoding a management
//! channel uses to describe a job. The transport itself (how these bytes
//! travel between a userspace client and this gateway) is out of scope;
//! this module only knows how to turn a byte slice into a [`JobSpec`] and
//! back.
//!
//! The wire shape — a small header followed by a stream of tag/length/value
//! attributes — is the same general shape a netlink attribute stream has.
//! This keeps the TLV idea without pulling in an actual netlink client,
//! since the transport is explicitly a host concern.

use crate::error::GwError;
use crate::frame::{Filter, Frame};
use crate::job::{Job, JobFlags, JobSpec};
use crate::modchain::{ChecksumProfile, CrcChecksum, FieldSelector, ModChain, Operator, OperatorKind, XorChecksum};
use crate::PAYLOAD_LEN;

pub const FAMILY_CAN: u8 = 29;
pub const GWTYPE_CAN_CAN: u8 = 1;

const TAG_MOD_AND: u8 = 1;
const TAG_MOD_OR: u8 = 2;
const TAG_MOD_XOR: u8 = 3;
const TAG_MOD_SET: u8 = 4;
const TAG_CS_XOR: u8 = 5;
const TAG_CS_CRC8: u8 = 6;
const TAG_FILTER: u8 = 7;
const TAG_SRC_IF: u8 = 8;
const TAG_DST_IF: u8 = 9;
const TAG_HANDLED: u8 = 10;
const TAG_DROPPED: u8 = 11;

const FRAME_LEN: usize = 4 + 1 + PAYLOAD_LEN; // id + dlc + data
const MOD_ATTR_LEN: usize = 1 + FRAME_LEN; // selector byte + operand frame
const CS_XOR_LEN: usize = 4;
const CS_CRC8_LEN: usize = 3 + 1 + 1 + 1 + 256;

/// `{family, gwtype, flags}` request/response header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub family: u8,
    pub gwtype: u8,
    pub flags: u16,
}

impl Header {
    const LEN: usize = 4;

    fn encode(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.family;
        out[1] = self.gwtype;
        out[2..4].copy_from_slice(&self.flags.to_be_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, GwError> {
        if bytes.len() < Self::LEN {
            return Err(GwError::InvalidArg);
        }
        Ok(Header {
            family: bytes[0],
            gwtype: bytes[1],
            flags: u16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }
}

/// A fully parsed `ADD`/`DEL` request: the header plus the job spec it
/// described.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedJob {
    pub header: Header,
    pub spec: JobSpec,
}

/// A parsed `DEL` request: either the `(0, 0)` sentinel ("remove every
/// job") or a spec to byte-match against the registry.
#[derive(Clone, Debug, PartialEq)]
pub enum DelRequest {
    All,
    Match(JobSpec),
}

fn encode_frame(frame: &Frame) -> [u8; FRAME_LEN] {
    let mut out = [0u8; FRAME_LEN];
    out[0..4].copy_from_slice(&frame.id.to_be_bytes());
    out[4] = frame.dlc;
    out[5..5 + PAYLOAD_LEN].copy_from_slice(&frame.data);
    out
}

fn decode_frame(bytes: &[u8]) -> Frame {
    let id = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let dlc = bytes[4];
    let mut data = [0u8; PAYLOAD_LEN];
    data.copy_from_slice(&bytes[5..5 + PAYLOAD_LEN]);
    Frame::new(id, dlc, data)
}

/// Walks a TLV attribute stream, returning `(tag, payload)` pairs in
/// encounter order. A truncated tag/length header or a length that runs
/// past the end of `body` is rejected as a malformed attribute length.
fn parse_attrs(body: &[u8]) -> Result<Vec<(u8, &[u8])>, GwError> {
    let mut attrs = Vec::new();
    let mut i = 0;
    while i < body.len() {
        if i + 3 > body.len() {
            return Err(GwError::InvalidArg);
        }
        let tag = body[i];
        let len = u16::from_be_bytes([body[i + 1], body[i + 2]]) as usize;
        let start = i + 3;
        let end = start.checked_add(len).ok_or(GwError::InvalidArg)?;
        if end > body.len() {
            return Err(GwError::InvalidArg);
        }
        attrs.push((tag, &body[start..end]));
        i = end;
    }
    Ok(attrs)
}

fn find_attr<'a>(attrs: &[(u8, &'a [u8])], tag: u8) -> Option<&'a [u8]> {
    attrs.iter().find(|(t, _)| *t == tag).map(|(_, v)| *v)
}

fn parse_mod_attr(payload: &[u8], kind: OperatorKind) -> Result<Option<Operator>, GwError> {
    if payload.len() != MOD_ATTR_LEN {
        return Err(GwError::InvalidArg);
    }
    let selector = FieldSelector::from_bits_truncate(payload[0]);
    if selector.is_empty() {
        return Ok(None);
    }
    let operand = decode_frame(&payload[1..]);
    Ok(Some(Operator::new(kind, selector, operand)))
}

fn parse_xor_checksum(payload: &[u8]) -> Result<XorChecksum, GwError> {
    if payload.len() != CS_XOR_LEN {
        return Err(GwError::InvalidArg);
    }
    Ok(XorChecksum {
        from_idx: payload[0] as i8,
        to_idx: payload[1] as i8,
        result_idx: payload[2] as i8,
        init_xor_val: payload[3],
    })
}

fn parse_crc8_checksum(payload: &[u8]) -> Result<CrcChecksum, GwError> {
    if payload.len() != CS_CRC8_LEN {
        return Err(GwError::InvalidArg);
    }
    let mut table = [0u8; 256];
    table.copy_from_slice(&payload[6..262]);
    Ok(CrcChecksum {
        from_idx: payload[0] as i8,
        to_idx: payload[1] as i8,
        result_idx: payload[2] as i8,
        init_crc_val: payload[3],
        final_xor_val: payload[4],
        profile: ChecksumProfile(payload[5]),
        table,
    })
}

fn parse_job(bytes: &[u8], allow_zero_sentinel: bool) -> Result<ParsedJob, GwError> {
    let header = Header::decode(bytes)?;
    if header.family != FAMILY_CAN {
        return Err(GwError::FamilyUnsupported);
    }
    if header.gwtype != GWTYPE_CAN_CAN {
        return Err(GwError::InvalidArg);
    }
    let attrs = parse_attrs(&bytes[Header::LEN..])?;

    let mut operators = Vec::new();
    for (tag, kind) in [
        (TAG_MOD_AND, OperatorKind::And),
        (TAG_MOD_OR, OperatorKind::Or),
        (TAG_MOD_XOR, OperatorKind::Xor),
        (TAG_MOD_SET, OperatorKind::Set),
    ] {
        if let Some(payload) = find_attr(&attrs, tag) {
            if let Some(op) = parse_mod_attr(payload, kind)? {
                operators.push(op);
            }
        }
    }

    let (xor_checksum, crc8_checksum) = if operators.is_empty() {
        (None, None)
    } else {
        let xor = find_attr(&attrs, TAG_CS_XOR).map(parse_xor_checksum).transpose()?;
        let crc8 = find_attr(&attrs, TAG_CS_CRC8).map(parse_crc8_checksum).transpose()?;
        (xor, crc8)
    };

    let filter = match find_attr(&attrs, TAG_FILTER) {
        Some(payload) if payload.len() == 8 => Filter {
            id: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
            mask: u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
        },
        Some(_) => return Err(GwError::InvalidArg),
        None => Filter::MATCH_ALL,
    };

    let src_idx = match find_attr(&attrs, TAG_SRC_IF) {
        Some(p) if p.len() == 4 => u32::from_be_bytes([p[0], p[1], p[2], p[3]]),
        Some(_) => return Err(GwError::InvalidArg),
        None => return Err(GwError::NoDev),
    };
    let dst_idx = match find_attr(&attrs, TAG_DST_IF) {
        Some(p) if p.len() == 4 => u32::from_be_bytes([p[0], p[1], p[2], p[3]]),
        Some(_) => return Err(GwError::InvalidArg),
        None => return Err(GwError::NoDev),
    };

    if src_idx == 0 && dst_idx == 0 {
        if !allow_zero_sentinel {
            return Err(GwError::InvalidArg);
        }
    } else if src_idx == 0 || dst_idx == 0 {
        return Err(GwError::NoDev);
    }

    let mod_chain = ModChain::build(operators, xor_checksum, crc8_checksum)?;
    let flags = JobFlags::from_bits_truncate(header.flags);

    Ok(ParsedJob { header, spec: JobSpec { flags, filter, src_idx, dst_idx, mod_chain } })
}

/// Parses an `ADD` request. `(src_idx=0, dst_idx=0)` is rejected outright:
/// the remove-all sentinel only has meaning on `DEL`.
pub fn parse_add_request(bytes: &[u8]) -> Result<ParsedJob, GwError> {
    parse_job(bytes, false)
}

/// Parses a `DEL` request, recognizing the `(0, 0)` remove-all sentinel.
pub fn parse_del_request(bytes: &[u8]) -> Result<DelRequest, GwError> {
    let parsed = parse_job(bytes, true)?;
    if parsed.spec.is_remove_all_sentinel() {
        Ok(DelRequest::All)
    } else {
        Ok(DelRequest::Match(parsed.spec))
    }
}

fn write_attr(buf: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    buf.push(tag);
    buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    buf.extend_from_slice(payload);
}

/// Serializes a job's spec and (if non-zero) its statistics into a `LIST`
/// response entry: only non-default fields are emitted.
pub fn serialize_job(job: &Job) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&Header { family: FAMILY_CAN, gwtype: GWTYPE_CAN_CAN, flags: job.spec.flags.bits() }.encode());

    for op in job.spec.mod_chain.operators() {
        let tag = match op.kind {
            OperatorKind::And => TAG_MOD_AND,
            OperatorKind::Or => TAG_MOD_OR,
            OperatorKind::Xor => TAG_MOD_XOR,
            OperatorKind::Set => TAG_MOD_SET,
        };
        let mut payload = Vec::with_capacity(MOD_ATTR_LEN);
        payload.push(op.selector.bits());
        payload.extend_from_slice(&encode_frame(&op.operand));
        write_attr(&mut out, tag, &payload);
    }

    if let Some(xor) = job.spec.mod_chain.xor_checksum() {
        let payload = [xor.from_idx as u8, xor.to_idx as u8, xor.result_idx as u8, xor.init_xor_val];
        write_attr(&mut out, TAG_CS_XOR, &payload);
    }

    if let Some(crc8) = job.spec.mod_chain.crc8_checksum() {
        let mut payload = Vec::with_capacity(CS_CRC8_LEN);
        payload.push(crc8.from_idx as u8);
        payload.push(crc8.to_idx as u8);
        payload.push(crc8.result_idx as u8);
        payload.push(crc8.init_crc_val);
        payload.push(crc8.final_xor_val);
        payload.push(crc8.profile.0);
        payload.extend_from_slice(&crc8.table);
        write_attr(&mut out, TAG_CS_CRC8, &payload);
    }

    if job.spec.filter.id != 0 || job.spec.filter.mask != 0 {
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&job.spec.filter.id.to_be_bytes());
        payload.extend_from_slice(&job.spec.filter.mask.to_be_bytes());
        write_attr(&mut out, TAG_FILTER, &payload);
    }

    write_attr(&mut out, TAG_SRC_IF, &job.spec.src_idx.to_be_bytes());
    write_attr(&mut out, TAG_DST_IF, &job.spec.dst_idx.to_be_bytes());

    if job.handled() != 0 {
        write_attr(&mut out, TAG_HANDLED, &job.handled().to_be_bytes());
    }
    if job.dropped() != 0 {
        write_attr(&mut out, TAG_DROPPED, &job.dropped().to_be_bytes());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::substrate::InterfaceHandle;

    fn add_bytes(src: u32, dst: u32, extra: &[(u8, Vec<u8>)]) -> Vec<u8> {
        let mut out = Header { family: FAMILY_CAN, gwtype: GWTYPE_CAN_CAN, flags: 0 }.encode().to_vec();
        for (tag, payload) in extra {
            write_attr(&mut out, *tag, payload);
        }
        write_attr(&mut out, TAG_SRC_IF, &src.to_be_bytes());
        write_attr(&mut out, TAG_DST_IF, &dst.to_be_bytes());
        out
    }

    #[test]
    fn parse_minimal_add() {
        let bytes = add_bytes(1, 2, &[]);
        let parsed = parse_add_request(&bytes).unwrap();
        assert_eq!(parsed.spec.src_idx, 1);
        assert_eq!(parsed.spec.dst_idx, 2);
        assert_eq!(parsed.spec.filter, Filter::MATCH_ALL);
        assert!(parsed.spec.mod_chain.is_empty());
    }

    #[test]
    fn add_zero_zero_rejected() {
        let bytes = add_bytes(0, 0, &[]);
        assert_eq!(parse_add_request(&bytes), Err(GwError::InvalidArg));
    }

    #[test]
    fn add_half_zero_is_no_dev() {
        let bytes = add_bytes(0, 2, &[]);
        assert_eq!(parse_add_request(&bytes), Err(GwError::NoDev));
    }

    #[test]
    fn del_zero_zero_is_remove_all() {
        let bytes = add_bytes(0, 0, &[]);
        assert_eq!(parse_del_request(&bytes).unwrap(), DelRequest::All);
    }

    #[test]
    fn missing_family_is_unsupported() {
        let mut bytes = add_bytes(1, 2, &[]);
        bytes[0] = 99;
        assert_eq!(parse_add_request(&bytes), Err(GwError::FamilyUnsupported));
    }

    #[test]
    fn unknown_gwtype_is_invalid_arg() {
        let mut bytes = add_bytes(1, 2, &[]);
        bytes[1] = 7;
        assert_eq!(parse_add_request(&bytes), Err(GwError::InvalidArg));
    }

    #[test]
    fn mod_or_id_round_trips_through_apply() {
        let operand = encode_frame(&Frame::new(0x400, 0, [0; 8]));
        let mut payload = vec![FieldSelector::ID.bits()];
        payload.extend_from_slice(&operand);
        let bytes = add_bytes(1, 2, &[(TAG_MOD_OR, payload)]);
        let parsed = parse_add_request(&bytes).unwrap();
        assert_eq!(parsed.spec.mod_chain.operators().len(), 1);
        let mut f = Frame::new(0x123, 8, [0; 8]);
        parsed.spec.mod_chain.apply(&mut f);
        assert_eq!(f.id, 0x523);
    }

    #[test]
    fn checksum_out_of_domain_is_invalid_arg() {
        let op_payload = {
            let mut p = vec![FieldSelector::ID.bits()];
            p.extend_from_slice(&encode_frame(&Frame::new(1, 0, [0; 8])));
            p
        };
        let out_of_domain = vec![8u8, 0, 0, 0]; // from_idx=8, outside -8..=7
        let bytes = add_bytes(1, 2, &[(TAG_MOD_OR, op_payload), (TAG_CS_XOR, out_of_domain)]);
        assert_eq!(parse_add_request(&bytes), Err(GwError::InvalidArg));
    }

    #[test]
    fn checksum_ignored_without_any_operator() {
        let bytes = add_bytes(1, 2, &[(TAG_CS_XOR, vec![0, 0, 1, 0])]);
        let parsed = parse_add_request(&bytes).unwrap();
        assert!(parsed.spec.mod_chain.xor_checksum().is_none());
    }

    #[test]
    fn serialize_then_matches_handled_dropped_presence() {
        let spec = JobSpec {
            flags: JobFlags::empty(),
            filter: Filter::MATCH_ALL,
            src_idx: 1,
            dst_idx: 2,
            mod_chain: ModChain::build(vec![], None, None).unwrap(),
        };
        let job = Job::new(1, spec, InterfaceHandle(1), InterfaceHandle(2));
        let bytes = serialize_job(&job);
        let attrs = parse_attrs(&bytes[Header::LEN..]).unwrap();
        assert!(find_attr(&attrs, TAG_HANDLED).is_none());
        assert!(find_attr(&attrs, TAG_DROPPED).is_none());
        assert!(find_attr(&attrs, TAG_FILTER).is_none());
    }

    #[test]
    fn truncated_attribute_is_invalid_arg() {
        let mut bytes = add_bytes(1, 2, &[]);
        bytes.truncate(bytes.len() - 1);
        assert_eq!(parse_add_request(&bytes), Err(GwError::InvalidArg));
    }
}
