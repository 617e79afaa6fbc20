//! Schema blob codec: the one-time, per-connection description of every
//! variable a producer has defined, sent right after the handshake so a
//! consumer knows the shape of the frames that follow. Every integer
//! header in this blob is network byte order (unlike the per-value frame
//! messages in `wire::frame`, which keep their name length native - see
//! the module doc on `wire::frame` for why that asymmetry is preserved).
//!
//! Layout per variable, back to back with no variable-count header (the
//! decoder reads until the blob is exhausted): `name` (len-prefixed), `dims`
//! (u32), `type` (u8 tag), `element_size` (u32), `length` (i64, the
//! explicit network-order swap from `wire::endian`, always 0 for an
//! array at definition time since no dimension is resolved yet), then,
//! only when `dims > 0`: `dims` many `gs_name`s, then `dims` many
//! `ls_name`s, then `dims` many `lo_name`s.

use crate::error::{Result, StreamError};
use crate::util::cursor::{ReadCursor, WriteCursor};
use crate::wire::endian::i64_to_net_bytes;
use crate::wire::types::{BaseType, Variable};

pub fn encode_schema(vars: &[Variable]) -> Vec<u8> {
    let mut w = WriteCursor::with_capacity(128 * vars.len().max(1));
    for v in vars {
        w.write_prefixed_name_net(&v.name);
        w.write_u32_be(v.dims);
        w.write_u8(v.base_type.to_wire_tag());
        w.write_u32_be(v.element_size() as u32);
        w.write_bytes(&i64_to_net_bytes(v.length as i64));
        if v.dims > 0 {
            for name in &v.gs_names {
                w.write_prefixed_name_net(name);
            }
            for name in &v.ls_names {
                w.write_prefixed_name_net(name);
            }
            for name in &v.lo_names {
                w.write_prefixed_name_net(name);
            }
        }
    }
    w.into_vec()
}

/// Decodes a schema blob produced by [`encode_schema`] back into variable
/// definitions. Rejects a truncated blob and a `dims` field outside
/// `0..=3` (spec-mandated array rank ceiling).
pub fn decode_schema(bytes: &[u8]) -> Result<Vec<Variable>> {
    let mut r = ReadCursor::new(bytes);
    let mut vars = Vec::new();
    while !r.is_empty() {
        let name = r.read_prefixed_name_net()?;
        let dims = r.read_u32_be()?;
        if dims > 3 {
            return Err(StreamError::InvalidSelectionDims(dims));
        }
        let base_type = BaseType::from_wire_tag(r.read_u8()?)?;
        let _element_size = r.read_u32_be()?;
        let _length = r.read_i64_netbytes()?;
        if dims == 0 {
            vars.push(Variable::new_scalar(name, base_type));
            continue;
        }
        let mut gs_names = Vec::with_capacity(dims as usize);
        let mut ls_names = Vec::with_capacity(dims as usize);
        let mut lo_names = Vec::with_capacity(dims as usize);
        for _ in 0..dims {
            gs_names.push(r.read_prefixed_name_net()?);
        }
        for _ in 0..dims {
            ls_names.push(r.read_prefixed_name_net()?);
        }
        for _ in 0..dims {
            lo_names.push(r.read_prefixed_name_net()?);
        }
        vars.push(Variable::new_array(
            name, base_type, gs_names, ls_names, lo_names,
        )?);
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_mixed_scalar_and_array_schema() {
        let vars = vec![
            Variable::new_scalar("time_step", BaseType::U32),
            Variable::new_array(
                "pixels",
                BaseType::U8,
                vec!["global_width".into(), "global_height".into()],
                vec!["local_width".into(), "local_height".into()],
                vec!["local_offsetx".into(), "local_offsety".into()],
            )
            .unwrap(),
        ];
        let blob = encode_schema(&vars);
        let decoded = decode_schema(&blob).unwrap();

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].name, "time_step");
        assert_eq!(decoded[0].dims, 0);
        assert_eq!(decoded[1].name, "pixels");
        assert_eq!(decoded[1].dims, 2);
        assert_eq!(decoded[1].gs_names, vec!["global_width", "global_height"]);
        assert_eq!(decoded[1].ls_names, vec!["local_width", "local_height"]);
        assert_eq!(decoded[1].lo_names, vec!["local_offsetx", "local_offsety"]);
    }

    #[test]
    fn rejects_truncated_blob() {
        let vars = vec![Variable::new_scalar("x", BaseType::F32)];
        let mut blob = encode_schema(&vars);
        blob.truncate(blob.len() - 2);
        assert!(decode_schema(&blob).is_err());
    }

    #[test]
    fn empty_schema_round_trips() {
        let blob = encode_schema(&[]);
        assert_eq!(decode_schema(&blob).unwrap().len(), 0);
    }

    #[test]
    fn rejects_dims_over_three() {
        let mut blob = WriteCursor::new();
        blob.write_prefixed_name_net("bad");
        blob.write_u32_be(9);
        let bytes = blob.into_vec();
        assert!(decode_schema(&bytes).is_err());
    }
}
