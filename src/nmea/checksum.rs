use super::NmeaError;

/// XOR of all bytes between `$` and `*`.
pub fn compute_checksum(body: &str) -> u8 { body.bytes().fold(0u8, |acc, b| acc ^ b) }

/// Wraps a sentence body as `$body*HH`.
pub fn append_checksum(body: &str) -> String {
    format!("${body}*{:02X}", compute_checksum(body))
}

/// Checks the `*HH` suffix of a complete sentence and returns the body between
/// `$` (or `!`) and `*`.
///
/// With `ignore_checksum` set, a missing or wrong checksum is accepted.
pub fn verify_checksum(line: &str, ignore_checksum: bool) -> Result<&str, NmeaError> {
    let Some(rest) = line.strip_prefix('$').or_else(|| line.strip_prefix('!')) else {
        return Err(NmeaError::MissingStart);
    };
    match rest.rsplit_once('*') {
        Some((body, hex)) => {
            let Ok(expected) = u8::from_str_radix(hex.trim(), 16) else {
                return Err(NmeaError::BadChecksum { expected: 0, actual: compute_checksum(body) });
            };
            let actual = compute_checksum(body);
            if expected == actual || ignore_checksum {
                Ok(body)
            } else {
                Err(NmeaError::BadChecksum { expected, actual })
            }
        }
        None if ignore_checksum => Ok(rest),
        None => Err(NmeaError::MissingChecksum),
    }
}
