//! Reserved packet identifiers.
//!
//! Identifiers below [`USER_PACKET_START`] are reserved for built-in use.

use crate::codec::PacketId;

/// Liveness probe. Carries no body.
pub const HEARTBEAT: PacketId = 0;

/// First application-defined packet identifier.
pub const USER_PACKET_START: PacketId = 256;

/// Returns a human-readable name for a packet identifier.
pub fn packet_name(id: PacketId) -> &'static str {
    match id {
        HEARTBEAT => "HEARTBEAT",
        1..=255 => "RESERVED",
        _ => "USER",
    }
}

/// Returns true if the identifier is in the reserved range.
pub fn is_reserved(id: PacketId) -> bool {
    id < USER_PACKET_START
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_cover_ranges() {
        assert_eq!(packet_name(HEARTBEAT), "HEARTBEAT");
        assert_eq!(packet_name(7), "RESERVED");
        assert_eq!(packet_name(USER_PACKET_START), "USER");
        assert!(is_reserved(255));
        assert!(!is_reserved(USER_PACKET_START));
    }
}
