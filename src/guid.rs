//! GUID parsing and formatting.
//!
//! A GUID is 16 bytes: four little-endian fields (`u32`, `u16`, `u16`)
//! followed by 8 big-endian-ordered bytes. `uuid::Uuid`'s `from_fields`/
//! `as_fields` constructors already encode exactly this mixed-endian
//! layout, so the canonical 8-4-4-4-12 string rendering comes for free
//! from `Uuid`'s own `Display` impl.

use uuid::Uuid;

/// Read a 16-byte mixed-endian GUID from a byte slice.
pub(crate) fn read_guid(bytes: &[u8; 16]) -> Uuid {
    let d1 = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let d2 = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
    let d3 = u16::from_le_bytes(bytes[6..8].try_into().unwrap());
    Uuid::from_fields(d1, d2, d3, bytes[8..16].try_into().unwrap())
}

/// Serialize a GUID to its 16-byte mixed-endian on-medium layout.
pub(crate) fn guid_to_bytes(guid: &Uuid) -> [u8; 16] {
    let (d1, d2, d3, d4) = guid.as_fields();
    let mut out = [0u8; 16];
    out[0..4].copy_from_slice(&d1.to_le_bytes());
    out[4..6].copy_from_slice(&d2.to_le_bytes());
    out[6..8].copy_from_slice(&d3.to_le_bytes());
    out[8..16].copy_from_slice(d4);
    out
}

/// Render a GUID as the canonical 8-4-4-4-12 hex string.
pub fn guid_to_string(guid: &Uuid) -> String {
    guid.hyphenated().to_string().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let guid: Uuid = "1B6A2BFA-E92B-184C-A8A7-ED0610D54821".parse().unwrap();
        let bytes = guid_to_bytes(&guid);
        let parsed = read_guid(&bytes);
        assert_eq!(guid, parsed);
    }

    #[test]
    fn canonical_string_is_uppercase() {
        let guid: Uuid = "1b6a2bfa-e92b-184c-a8a7-ed0610d54821".parse().unwrap();
        assert_eq!(guid_to_string(&guid), "1B6A2BFA-E92B-184C-A8A7-ED0610D54821");
    }
}
