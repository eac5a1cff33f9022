//! G.711 A-law encoding for media frames sent to the recorder.

const SEG_END: [i16; 8] = [0x1F, 0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF];

/// Encode a single 16-bit linear PCM sample to A-law.
pub fn linear_to_alaw(sample: i16) -> u8 {
    let mut pcm = sample >> 3; // 13-bit magnitude

    let mask: u8 = if pcm >= 0 {
        0xD5
    } else {
        pcm = -pcm - 1;
        0x55
    };

    let seg = SEG_END.iter().position(|&end| pcm <= end);

    match seg {
        None => 0x7F ^ mask,
        Some(seg) => {
            let mut aval = (seg as u8) << 4;
            if seg < 2 {
                aval |= ((pcm >> 1) & 0x0F) as u8;
            } else {
                aval |= ((pcm >> seg) & 0x0F) as u8;
            }
            aval ^ mask
        }
    }
}

/// Encode a PCM buffer to A-law bytes.
pub fn encode(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| linear_to_alaw(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_values() {
        // Standard G.711 reference points
        assert_eq!(linear_to_alaw(0), 0xD5);
        assert_eq!(linear_to_alaw(-1), 0x55);
        assert_eq!(linear_to_alaw(i16::MAX), 0xAA);
        assert_eq!(linear_to_alaw(i16::MIN), 0x2A);
    }

    #[test]
    fn test_sign_symmetry() {
        // Positive samples carry the sign bit, negatives do not
        for s in [100i16, 1000, 8000, 30000] {
            assert_eq!(linear_to_alaw(s) & 0x80, 0x80);
            assert_eq!(linear_to_alaw(-s) & 0x80, 0x00);
        }
    }

    #[test]
    fn test_encode_buffer() {
        let out = encode(&[0, -1, i16::MAX]);
        assert_eq!(out, vec![0xD5, 0x55, 0xAA]);
    }
}
