//! EMV payment-code checksum validation
//!
//! PIX copy-and-paste codes carry a trailing CRC-16/CCITT-FALSE checksum
//! introduced by the `6304` field marker. The gateway occasionally returns
//! half-assembled codes while the recurrence converges, so the polling loop
//! only accepts a code once this check passes.

/// Field marker that precedes the 4-hex-digit checksum in an EMV string.
const CRC_MARKER: &str = "6304";

/// CRC-16/CCITT-FALSE over the input bytes (poly 0x1021, init 0xFFFF,
/// MSB-first), formatted as 4 uppercase zero-padded hex digits.
pub fn compute_checksum(data: &str) -> String {
    let mut crc: u16 = 0xFFFF;
    for byte in data.as_bytes() {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    format!("{crc:04X}")
}

/// Validates the embedded checksum of an EMV payment code.
///
/// Returns `false` for empty input or input without the `6304` marker.
/// Recomputes the checksum over everything up to and including the marker
/// and compares it, case-insensitively, to the 4 characters that follow.
/// Total function: malformed input yields `false`, never a panic.
pub fn is_valid_payment_code(code: &str) -> bool {
    if code.is_empty() {
        return false;
    }
    let Some(idx) = code.find(CRC_MARKER) else {
        return false;
    };
    let crc_start = idx + CRC_MARKER.len();
    let Some(informed) = code.get(crc_start..crc_start + 4) else {
        return false;
    };
    let computed = compute_checksum(&code[..crc_start]);
    computed.eq_ignore_ascii_case(informed)
}

#[cfg(test)]
mod tests {
    use super::*;

    // br.gov.bcb.pix sample payload with a correct trailing CRC
    const VALID_EMV: &str = "00020126580014br.gov.bcb.pix0136123e4567-e12b-12d1-a456-42665544000052040000530398654041.005802BR5913Fulano de Tal6008BRASILIA62070503***6304B836";

    #[test]
    fn checksum_matches_ccitt_false_check_value() {
        // standard check value for CRC-16/CCITT-FALSE
        assert_eq!(compute_checksum("123456789"), "29B1");
    }

    #[test]
    fn checksum_is_deterministic() {
        let payload = "recorrencia-pix-jornada-3";
        assert_eq!(compute_checksum(payload), compute_checksum(payload));
    }

    #[test]
    fn rejects_empty_and_markerless_input() {
        assert!(!is_valid_payment_code(""));
        assert!(!is_valid_payment_code("000201no-marker-here"));
        // marker present but checksum truncated
        assert!(!is_valid_payment_code("000201630429"));
    }

    #[test]
    fn accepts_known_good_code() {
        assert!(is_valid_payment_code(VALID_EMV));
    }

    #[test]
    fn accepts_lowercase_informed_checksum() {
        let lowered = VALID_EMV.replace("B836", "b836");
        assert!(is_valid_payment_code(&lowered));
    }

    #[test]
    fn flipping_any_checksum_digit_invalidates() {
        let base = &VALID_EMV[..VALID_EMV.len() - 4];
        for (i, original) in "B836".chars().enumerate() {
            let flipped: String = "B836"
                .chars()
                .enumerate()
                .map(|(j, c)| if i == j { if original == '0' { '1' } else { '0' } } else { c })
                .collect();
            assert!(
                !is_valid_payment_code(&format!("{base}{flipped}")),
                "digit {i} flip should invalidate"
            );
        }
    }
}
