//! Cairo calldata encoding for the handful of types the pipelines pass around.

use anyhow::Context;
use starknet::core::types::Felt;

/// Bytes per full word of a Cairo `ByteArray`.
const BYTES_PER_WORD: usize = 31;

/// Decimals of the WBTC token (real and mock).
pub const WBTC_DECIMALS: u32 = 8;

/// Serialize a string as a Cairo `ByteArray`.
///
/// Layout: `[full_words_len, full_words..., pending_word, pending_word_len]`.
pub fn encode_byte_array(value: &str) -> Vec<Felt> {
    let mut full_words = Vec::new();
    let mut pending: &[u8] = &[];

    // Only the last chunk can be shorter than a full word.
    for chunk in value.as_bytes().chunks(BYTES_PER_WORD) {
        if chunk.len() == BYTES_PER_WORD {
            full_words.push(Felt::from_bytes_be_slice(chunk));
        } else {
            pending = chunk;
        }
    }

    let mut out = Vec::with_capacity(full_words.len() + 3);
    out.push(Felt::from(full_words.len()));
    out.extend(full_words);
    out.push(Felt::from_bytes_be_slice(pending));
    out.push(Felt::from(pending.len()));
    out
}

/// Decode a Cairo `ByteArray` from the start of `felts`.
pub fn decode_byte_array(felts: &[Felt]) -> anyhow::Result<String> {
    let len_felt = felts.first().context("Empty ByteArray")?;
    let full_len = usize::try_from(felt_to_u128(len_felt)?).ok();
    let required = full_len.and_then(|len| len.checked_add(3));

    let (Some(full_len), Some(required)) = (full_len, required) else {
        anyhow::bail!("Truncated ByteArray: word count {:#x} is out of range", len_felt);
    };
    if felts.len() < required {
        anyhow::bail!(
            "Truncated ByteArray: expected at least {} felts, got {}",
            required,
            felts.len()
        );
    }

    let mut bytes = Vec::with_capacity(full_len * BYTES_PER_WORD);
    for word in &felts[1..=full_len] {
        bytes.extend_from_slice(&word_bytes(word, BYTES_PER_WORD)?);
    }

    let pending_len = felt_to_u128(&felts[full_len + 2])?;
    let pending_len = match usize::try_from(pending_len) {
        Ok(len) if len < BYTES_PER_WORD => len,
        _ => anyhow::bail!("Invalid ByteArray pending word length: {}", pending_len),
    };
    bytes.extend_from_slice(&word_bytes(&felts[full_len + 1], pending_len)?);

    String::from_utf8(bytes).context("ByteArray is not valid UTF-8")
}

/// Decode a string returned by a view: a `ByteArray`, or a legacy short string felt.
pub fn decode_string(felts: &[Felt]) -> anyhow::Result<String> {
    match felts {
        [single] => {
            let bytes = single.to_bytes_be();
            let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
            String::from_utf8(bytes[start..].to_vec()).context("Short string is not valid UTF-8")
        }
        _ => decode_byte_array(felts),
    }
}

/// The last `len` bytes of a felt, which must not carry anything above them.
fn word_bytes(word: &Felt, len: usize) -> anyhow::Result<Vec<u8>> {
    let bytes = word.to_bytes_be();
    let split = bytes.len() - len;
    if bytes[..split].iter().any(|b| *b != 0) {
        anyhow::bail!("ByteArray word {:#x} exceeds {} bytes", word, len);
    }
    Ok(bytes[split..].to_vec())
}

/// Serialize a `u256` as `[low, high]`.
pub fn encode_u256(value: u128) -> [Felt; 2] {
    [Felt::from(value), Felt::ZERO]
}

/// Decode a `u256` that fits in 128 bits.
pub fn decode_u256(felts: &[Felt]) -> anyhow::Result<u128> {
    let [low, high, ..] = felts else {
        anyhow::bail!("Expected 2 felts for u256, got {}", felts.len());
    };

    if *high != Felt::ZERO {
        anyhow::bail!("u256 value exceeds 128 bits (high = {:#x})", high);
    }
    felt_to_u128(low)
}

/// Convert a felt to `u128`, failing if it does not fit.
pub fn felt_to_u128(value: &Felt) -> anyhow::Result<u128> {
    let bytes = value.to_bytes_be();
    let (high, low) = bytes.split_at(16);
    if high.iter().any(|b| *b != 0) {
        anyhow::bail!("Value {:#x} does not fit in 128 bits", value);
    }

    let mut buf = [0u8; 16];
    buf.copy_from_slice(low);
    Ok(u128::from_be_bytes(buf))
}

/// Render base units as a decimal amount with `decimals` fractional digits.
pub fn format_units(amount: u128, decimals: u32) -> String {
    let scale = 10u128.pow(decimals);
    format!(
        "{}.{:0width$}",
        amount / scale,
        amount % scale,
        width = decimals as usize
    )
}
