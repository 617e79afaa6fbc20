//! Endianness probing and the explicit 64-bit network/host byte swap.
//!
//! Both the integer byte order and the IEEE-754 float layout are probed
//! once per process and exchanged during the handshake so each side knows
//! whether the other matches its own representation, but neither is used
//! to auto-convert payload bytes — only the schema blob's header fields
//! get network-order treatment.

use tracing::warn;

/// A process's observed byte order, probed once and carried in the
/// handshake record so both ends know whether a conversion would even be
/// meaningful. Payload conversion itself is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// Probes the host's native byte order: write a known multi-byte
    /// integer, look at its first byte.
    pub fn probe() -> Self {
        let probe: u32 = 0x0001_0203;
        let bytes = probe.to_ne_bytes();
        if bytes[0] == 0x03 {
            Endianness::Little
        } else {
            Endianness::Big
        }
    }

    pub fn is_big(self) -> bool {
        matches!(self, Endianness::Big)
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Endianness::Little => 0,
            Endianness::Big => 1,
        }
    }

    pub fn from_byte(b: u8) -> Self {
        if b == 0 {
            Endianness::Little
        } else {
            Endianness::Big
        }
    }
}

/// Confirms the host uses IEEE-754 single precision floats. This is an
/// environment sanity check, not a protocol requirement, so a mismatch is
/// only logged - never treated as a fatal error.
pub fn check_ieee754_float() {
    let probe: f32 = 1.0;
    let bits = probe.to_bits();
    if bits != 0x3F80_0000 {
        warn!("host floating point representation is not IEEE-754 single precision; array values of type F32 may not interoperate with other hosts");
    }
}

/// Writes `v` as 8 bytes in network (big-endian) byte order via an
/// explicit per-byte swap, independent of whatever byte-swap intrinsic
/// the platform might otherwise pick.
pub fn i64_to_net_bytes(v: i64) -> [u8; 8] {
    let native = v.to_ne_bytes();
    if Endianness::probe().is_big() {
        native
    } else {
        let mut swapped = [0u8; 8];
        for i in 0..8 {
            swapped[i] = native[7 - i];
        }
        swapped
    }
}

/// Inverse of [`i64_to_net_bytes`].
pub fn i64_from_net_bytes(bytes: [u8; 8]) -> i64 {
    let native = if Endianness::probe().is_big() {
        bytes
    } else {
        let mut swapped = [0u8; 8];
        for i in 0..8 {
            swapped[i] = bytes[7 - i];
        }
        swapped
    };
    i64::from_ne_bytes(native)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_matches_std_target_endian() {
        let e = Endianness::probe();
        if cfg!(target_endian = "big") {
            assert_eq!(e, Endianness::Big);
        } else {
            assert_eq!(e, Endianness::Little);
        }
    }

    #[test]
    fn byte_round_trips_through_wire_form() {
        for v in [0i64, 1, -1, i64::MAX, i64::MIN, 42_000_000_000] {
            let wire = i64_to_net_bytes(v);
            assert_eq!(i64_from_net_bytes(wire), v);
        }
    }

    #[test]
    fn wire_form_is_big_endian() {
        let wire = i64_to_net_bytes(1);
        assert_eq!(wire, 1i64.to_be_bytes());
    }

    #[test]
    fn endianness_byte_round_trips() {
        assert_eq!(Endianness::from_byte(Endianness::Little.as_byte()), Endianness::Little);
        assert_eq!(Endianness::from_byte(Endianness::Big.as_byte()), Endianness::Big);
    }
}
