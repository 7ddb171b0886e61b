//! SLIP-39 share mnemonic codec.
//!
//! ```text
//! | id (15) | iteration exp (5) | group idx (4) | group thr-1 (4) | group cnt-1 (4) |
//! | member idx (4) | member thr-1 (4) | padded share value | RS1024 checksum (30) |
//! ```
//!
//! Every field is packed into 10-bit words. The share value is left-padded
//! with zero bits to a whole number of words: a 16-byte value takes 13 words
//! (20-word mnemonic), a 32-byte value 26 words (33-word mnemonic).
//!
//! Words come from the SLIP-39 wordlist, so a word's index is its 10-bit value.

use zeroize::Zeroizing;

use keyward_core::{share_word_count, KeywardError, KeywardResult, SHARE_LENGTHS};

use crate::secret::SecretBytes;

use super::wordlist::WORDLIST;

const RADIX_BITS: usize = 10;
const RADIX: usize = 1 << RADIX_BITS;
const ID_LENGTH_BITS: u32 = 15;
const ITERATION_EXP_LENGTH_BITS: u32 = 5;
const CHECKSUM_LENGTH_WORDS: usize = 3;
const METADATA_LENGTH_WORDS: usize = 4 + CHECKSUM_LENGTH_WORDS;
const CUSTOMIZATION: &[u8] = b"shamir";

const GEN: [u32; 10] = [
    0x00E0_E040,
    0x01C1_C080,
    0x0383_8100,
    0x0707_0200,
    0x0E0E_0009,
    0x1C0C_2412,
    0x3808_6C24,
    0x3090_FC48,
    0x21B1_F890,
    0x03F3_F120,
];

/// One parsed member share of a single-group split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    /// Random identifier shared by every share of one split (15 bits)
    pub identifier: u16,
    /// Passphrase-encryption iteration exponent (5 bits)
    pub iteration_exponent: u8,
    pub group_index: u8,
    pub group_threshold: u8,
    pub group_count: u8,
    /// Member index, the share's x coordinate (0..16)
    pub index: u8,
    /// Member threshold (1..=16)
    pub threshold: u8,
    pub value: SecretBytes,
}

impl Share {
    /// Parse and checksum-verify a share mnemonic.
    pub fn parse(mnemonic: &str) -> KeywardResult<Self> {
        let words: Vec<&str> = mnemonic.split_whitespace().collect();
        if !SHARE_LENGTHS.contains(&words.len()) {
            return Err(KeywardError::InvalidShare(format!(
                "share mnemonic must have {} or {} words, got {}",
                SHARE_LENGTHS[0],
                SHARE_LENGTHS[1],
                words.len()
            )));
        }

        let indices = Zeroizing::new(
            words
                .iter()
                .map(|w| {
                    word_index(w)
                        .ok_or_else(|| KeywardError::InvalidShare(format!("unknown word '{w}'")))
                })
                .collect::<KeywardResult<Vec<u16>>>()?,
        );

        if !rs1024_verify(&indices) {
            return Err(KeywardError::InvalidShare("invalid mnemonic checksum".into()));
        }

        let id_exp = ((indices[0] as u32) << RADIX_BITS) | indices[1] as u32;
        let identifier = (id_exp >> ITERATION_EXP_LENGTH_BITS) as u16;
        let iteration_exponent = (id_exp & ((1 << ITERATION_EXP_LENGTH_BITS) - 1)) as u8;

        let params = ((indices[2] as u32) << RADIX_BITS) | indices[3] as u32;
        let nibble = |shift: u32| ((params >> shift) & 0xF) as u8;
        let group_index = nibble(16);
        let group_threshold = nibble(12) + 1;
        let group_count = nibble(8) + 1;
        let index = nibble(4);
        let threshold = nibble(0) + 1;

        if group_threshold > group_count {
            return Err(KeywardError::InvalidShare(format!(
                "group threshold {group_threshold} exceeds group count {group_count}"
            )));
        }
        if group_count != 1 {
            return Err(KeywardError::InvalidShare(
                "multi-group share sets are not supported".into(),
            ));
        }

        let value_words = &indices[4..indices.len() - CHECKSUM_LENGTH_WORDS];
        let padding = (RADIX_BITS * value_words.len()) % 16;
        if padding > 8 {
            return Err(KeywardError::InvalidShare("invalid share value padding".into()));
        }
        let value_len = (RADIX_BITS * value_words.len() - padding) / 8;
        let value = words_to_value(value_words, value_len)?;

        Ok(Self {
            identifier,
            iteration_exponent,
            group_index,
            group_threshold,
            group_count,
            index,
            threshold,
            value,
        })
    }

    /// Encode as a space-separated mnemonic.
    pub fn to_mnemonic(&self) -> KeywardResult<String> {
        if self.identifier >> ID_LENGTH_BITS != 0 {
            return Err(KeywardError::InvalidArgument(format!(
                "identifier {} exceeds 15 bits",
                self.identifier
            )));
        }
        if self.iteration_exponent >> ITERATION_EXP_LENGTH_BITS != 0 {
            return Err(KeywardError::InvalidArgument(format!(
                "iteration exponent {} exceeds 5 bits",
                self.iteration_exponent
            )));
        }
        let in_nibble = |v: u8| v < 16;
        let in_count = |v: u8| (1..=16).contains(&v);
        if !in_nibble(self.group_index)
            || !in_count(self.group_threshold)
            || !in_count(self.group_count)
            || !in_nibble(self.index)
            || !in_count(self.threshold)
        {
            return Err(KeywardError::InvalidArgument("share parameter out of range".into()));
        }
        if share_word_count(self.value.len()).is_none() {
            return Err(KeywardError::InvalidArgument(format!(
                "share value must be 16 or 32 bytes, got {}",
                self.value.len()
            )));
        }

        let id_exp = ((self.identifier as u32) << ITERATION_EXP_LENGTH_BITS)
            | self.iteration_exponent as u32;
        let params = ((self.group_index as u32) << 16)
            | (((self.group_threshold - 1) as u32) << 12)
            | (((self.group_count - 1) as u32) << 8)
            | ((self.index as u32) << 4)
            | (self.threshold - 1) as u32;

        let mut data = Zeroizing::new(vec![
            (id_exp >> RADIX_BITS) as u16,
            (id_exp & (RADIX as u32 - 1)) as u16,
            (params >> RADIX_BITS) as u16,
            (params & (RADIX as u32 - 1)) as u16,
        ]);
        data.extend(value_to_words(self.value.as_bytes()));
        let checksum = rs1024_create_checksum(&data);
        data.extend_from_slice(&checksum);

        Ok(data
            .iter()
            .map(|&i| WORDLIST[i as usize])
            .collect::<Vec<_>>()
            .join(" "))
    }
}

fn word_index(word: &str) -> Option<u16> {
    WORDLIST.binary_search(&word).ok().map(|i| i as u16)
}

fn value_to_words(value: &[u8]) -> Vec<u16> {
    let bits = value.len() * 8;
    let word_count = bits.div_ceil(RADIX_BITS);
    let mut words = Vec::with_capacity(word_count);

    // leading zero padding is implicit in the accumulator
    let mut acc: u32 = 0;
    let mut acc_bits = word_count * RADIX_BITS - bits;
    for &byte in value {
        acc = (acc << 8) | byte as u32;
        acc_bits += 8;
        while acc_bits >= RADIX_BITS {
            acc_bits -= RADIX_BITS;
            words.push(((acc >> acc_bits) as usize & (RADIX - 1)) as u16);
        }
        acc &= (1 << acc_bits) - 1;
    }
    words
}

fn words_to_value(words: &[u16], value_len: usize) -> KeywardResult<SecretBytes> {
    let mut bits = Zeroizing::new(Vec::with_capacity(words.len() * RADIX_BITS));
    for &w in words {
        for shift in (0..RADIX_BITS).rev() {
            bits.push(((w >> shift) & 1) as u8);
        }
    }

    let padding = bits.len() - value_len * 8;
    if bits[..padding].iter().any(|&b| b != 0) {
        return Err(KeywardError::InvalidShare("invalid share value padding".into()));
    }

    let value = bits[padding..]
        .chunks(8)
        .map(|byte| byte.iter().fold(0u8, |acc, &b| (acc << 1) | b))
        .collect();
    Ok(SecretBytes::from_vec(value))
}

fn rs1024_polymod(values: impl Iterator<Item = u32>) -> u32 {
    let mut chk: u32 = 1;
    for v in values {
        let b = chk >> 20;
        chk = ((chk & 0xF_FFFF) << 10) ^ v;
        for (i, g) in GEN.iter().enumerate() {
            if (b >> i) & 1 == 1 {
                chk ^= g;
            }
        }
    }
    chk
}

fn rs1024_create_checksum(data: &[u16]) -> [u16; CHECKSUM_LENGTH_WORDS] {
    let values = CUSTOMIZATION
        .iter()
        .map(|&c| c as u32)
        .chain(data.iter().map(|&w| w as u32))
        .chain(std::iter::repeat(0).take(CHECKSUM_LENGTH_WORDS));
    let polymod = rs1024_polymod(values) ^ 1;
    let mut out = [0u16; CHECKSUM_LENGTH_WORDS];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = ((polymod >> (10 * (CHECKSUM_LENGTH_WORDS - 1 - i))) & 1023) as u16;
    }
    out
}

fn rs1024_verify(data: &[u16]) -> bool {
    let values = CUSTOMIZATION
        .iter()
        .map(|&c| c as u32)
        .chain(data.iter().map(|&w| w as u32));
    rs1024_polymod(values) == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: Vec<u8>) -> Share {
        Share {
            identifier: 0x5A5A & 0x7FFF,
            iteration_exponent: 3,
            group_index: 0,
            group_threshold: 1,
            group_count: 1,
            index: 4,
            threshold: 3,
            value: SecretBytes::from_vec(value),
        }
    }

    #[test]
    fn test_word_counts_by_value_length() {
        let short = sample(vec![0xA5; 16]).to_mnemonic().unwrap();
        assert_eq!(short.split_whitespace().count(), 20);

        let long = sample(vec![0x3C; 32]).to_mnemonic().unwrap();
        assert_eq!(long.split_whitespace().count(), 33);
    }

    #[test]
    fn test_parse_recovers_fields() {
        let share = sample((0u8..32).collect());
        let parsed = Share::parse(&share.to_mnemonic().unwrap()).unwrap();
        assert_eq!(parsed, share);
        assert_eq!(parsed.index, 4);
        assert_eq!(parsed.threshold, 3);
        assert_eq!(parsed.iteration_exponent, 3);
    }

    #[test]
    fn test_parse_published_share() {
        let share = Share::parse(
            "duckling enlarge academic academic agency result length solution fridge kidney \
             coal piece deal husband erode duke ajar critical decision keyboard",
        )
        .unwrap();
        assert_eq!(share.identifier, 7945);
        assert_eq!(share.iteration_exponent, 0);
        assert_eq!(share.index, 0);
        assert_eq!(share.threshold, 1);
        assert_eq!(share.value.len(), 16);
    }

    #[test]
    fn test_single_word_change_breaks_checksum() {
        let mnemonic = sample(vec![7u8; 16]).to_mnemonic().unwrap();
        let mut words: Vec<&str> = mnemonic.split_whitespace().collect();
        words[6] = if words[6] == "academic" { "acid" } else { "academic" };
        let err = Share::parse(&words.join(" ")).unwrap_err();
        assert!(matches!(err, KeywardError::InvalidShare(_)));
    }

    #[test]
    fn test_rejects_wrong_length_and_unknown_words() {
        assert!(Share::parse("abandon ability able").is_err());
        let mnemonic = sample(vec![1u8; 16]).to_mnemonic().unwrap();
        let replaced = mnemonic.replacen(mnemonic.split_whitespace().next().unwrap(), "zoo", 1);
        // "zoo" is not a SLIP-39 word
        assert!(matches!(Share::parse(&replaced), Err(KeywardError::InvalidShare(_))));
    }

    #[test]
    fn test_rejects_out_of_range_fields() {
        let mut share = sample(vec![0u8; 16]);
        share.identifier = 0x8000;
        assert!(share.to_mnemonic().is_err());

        let mut share = sample(vec![0u8; 16]);
        share.threshold = 17;
        assert!(share.to_mnemonic().is_err());

        assert!(sample(vec![0u8; 20]).to_mnemonic().is_err());
    }

    #[test]
    fn test_share_word_count() {
        assert_eq!(share_word_count(16), Some(20));
        assert_eq!(share_word_count(32), Some(33));
        assert_eq!(share_word_count(24), None);
    }

    #[test]
    fn test_value_words_padding() {
        let words = value_to_words(&[0xFF; 16]);
        assert_eq!(words.len(), 13);
        // two padding bits lead the first word
        assert_eq!(words[0], 0xFF);
        let back = words_to_value(&words, 16).unwrap();
        assert_eq!(back.as_bytes(), &[0xFF; 16]);

        let mut bad = words.clone();
        bad[0] |= 0x200;
        assert!(words_to_value(&bad, 16).is_err());
    }
}
