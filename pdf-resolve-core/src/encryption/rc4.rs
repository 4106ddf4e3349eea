//! RC4 stream cipher
//!
//! RC4 is obsolete as a general cipher but remains required for reading
//! documents encrypted with the V1/V2 security handlers.

/// RC4 cipher state
pub struct Rc4 {
    state: [u8; 256],
}

impl Rc4 {
    /// Key-schedule a new cipher. Key length 1-256 bytes.
    pub fn new(key: &[u8]) -> Self {
        let mut state = [0u8; 256];
        for (i, slot) in state.iter_mut().enumerate() {
            *slot = i as u8;
        }

        let mut j: u8 = 0;
        for i in 0..256 {
            j = j
                .wrapping_add(state[i])
                .wrapping_add(key[i % key.len()]);
            state.swap(i, j as usize);
        }

        Self { state }
    }

    /// Apply the keystream. Encryption and decryption are the same
    /// operation.
    pub fn process(&mut self, data: &[u8]) -> Vec<u8> {
        let mut i: u8 = 0;
        let mut j: u8 = 0;
        let mut out = Vec::with_capacity(data.len());

        for &byte in data {
            i = i.wrapping_add(1);
            j = j.wrapping_add(self.state[i as usize]);
            self.state.swap(i as usize, j as usize);
            let k = self.state
                [(self.state[i as usize].wrapping_add(self.state[j as usize])) as usize];
            out.push(byte ^ k);
        }

        out
    }
}

/// One-shot RC4 over `data` with a fresh key schedule.
pub fn rc4_apply(key: &[u8], data: &[u8]) -> Vec<u8> {
    Rc4::new(key).process(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        // Classic published test vectors
        assert_eq!(
            rc4_apply(b"Key", b"Plaintext"),
            hex::decode("BBF316E8D940AF0AD3").unwrap()
        );
        assert_eq!(
            rc4_apply(b"Wiki", b"pedia"),
            hex::decode("1021BF0420").unwrap()
        );
        assert_eq!(
            rc4_apply(b"Secret", b"Attack at dawn"),
            hex::decode("45A01F645FC35B383552544B9BF5").unwrap()
        );
    }

    #[test]
    fn test_symmetric() {
        let key = b"\x01\x02\x03\x04\x05";
        let plaintext = b"round trip payload";
        let ciphertext = rc4_apply(key, plaintext);
        assert_ne!(&ciphertext, plaintext);
        assert_eq!(rc4_apply(key, &ciphertext), plaintext);
    }

    #[test]
    fn test_single_byte_key() {
        let out = rc4_apply(&[0x42], b"data");
        assert_eq!(rc4_apply(&[0x42], &out), b"data");
    }
}
