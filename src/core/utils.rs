use hex::FromHexError;

use crate::core::error::ParseError;

/// Split the first whitespace-delimited token off an argument string.
///
/// Returns the token and the trimmed remainder, or `None` when nothing but
/// whitespace is left.
pub fn read_token(args: &str) -> Option<(&str, &str)> {
    let args = args.trim_start();
    if args.is_empty() {
        return None;
    }

    match args.find(char::is_whitespace) {
        Some(end) => Some((&args[..end], args[end..].trim())),
        None => Some((args, "")),
    }
}

/// Parse a decimal, optionally signed, integer
pub fn parse_int(token: &str) -> Result<i64, ParseError> {
    let cleaned = token.trim();
    if cleaned.is_empty() {
        return Err(ParseError::Empty);
    }

    cleaned
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidInt(cleaned.to_string()))
}

/// Parse a hex string into bytes, two hex digits per byte.
///
/// Unlike a general purpose hex reader no separators are accepted: the
/// output is always exactly half as long as the trimmed input.
pub fn parse_hex(token: &str) -> Result<Vec<u8>, ParseError> {
    let cleaned = token.trim();

    if cleaned.is_empty() {
        return Err(ParseError::Empty);
    }

    if cleaned.len() % 2 != 0 {
        return Err(ParseError::OddLength(cleaned.len()));
    }

    hex::decode(cleaned).map_err(|e| match e {
        FromHexError::InvalidHexCharacter { c, index } => ParseError::InvalidHex { c, index },
        FromHexError::OddLength | FromHexError::InvalidStringLength => {
            ParseError::OddLength(cleaned.len())
        }
    })
}

/// Number of bytes `token` decodes to
pub fn hex_byte_len(token: &str) -> usize {
    token.trim().len() / 2
}

/// Parse a hex string into a caller-sized buffer.
///
/// `dest` must be exactly [`hex_byte_len`] bytes long. On any failure
/// `dest` is left untouched.
pub fn parse_hex_into(token: &str, dest: &mut [u8]) -> Result<usize, ParseError> {
    let needed = hex_byte_len(token);
    if dest.len() != needed {
        return Err(ParseError::BufferSize {
            needed,
            capacity: dest.len(),
        });
    }

    let bytes = parse_hex(token)?;
    dest.copy_from_slice(&bytes);
    Ok(bytes.len())
}

/// Format bytes as an upper-case hex string
pub fn format_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Format bytes as a hex string with spaces
pub fn format_hex_spaced(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_token() {
        assert_eq!(read_token("send 1 AABB"), Some(("send", "1 AABB")));
        assert_eq!(read_token("  reqa  "), Some(("reqa", "")));
        assert_eq!(read_token("1\tAABB \r"), Some(("1", "AABB")));
        assert_eq!(read_token(""), None);
        assert_eq!(read_token(" \t "), None);
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("0").unwrap(), 0);
        assert_eq!(parse_int(" 1 ").unwrap(), 1);
        assert_eq!(parse_int("-42").unwrap(), -42);

        assert_eq!(parse_int(""), Err(ParseError::Empty));
        assert!(matches!(parse_int("0x1"), Err(ParseError::InvalidInt(_))));
        assert!(matches!(parse_int("one"), Err(ParseError::InvalidInt(_))));
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("AABBCCDD").unwrap(), vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(parse_hex("aabbccdd").unwrap(), vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(parse_hex("  3000 ").unwrap(), vec![0x30, 0x00]);
    }

    #[test]
    fn test_parse_hex_invalid() {
        assert_eq!(parse_hex(""), Err(ParseError::Empty));
        assert_eq!(parse_hex("   "), Err(ParseError::Empty));
        assert_eq!(parse_hex("ABC"), Err(ParseError::OddLength(3)));
        assert_eq!(
            parse_hex("AG"),
            Err(ParseError::InvalidHex { c: 'G', index: 1 })
        );
        // Separators are not hex digits here
        assert!(parse_hex("AA BB").is_err());
    }

    #[test]
    fn test_parse_hex_into_exact_size() {
        let mut dest = [0u8; 2];
        assert_eq!(parse_hex_into("1234", &mut dest).unwrap(), 2);
        assert_eq!(dest, [0x12, 0x34]);
    }

    #[test]
    fn test_parse_hex_into_leaves_dest_untouched() {
        let mut dest = [0x55u8; 2];
        assert!(parse_hex_into("12ZZ", &mut dest).is_err());
        assert_eq!(dest, [0x55, 0x55]);

        let mut odd = [0x55u8; 1];
        assert!(parse_hex_into("123", &mut odd).is_err());
        assert_eq!(odd, [0x55]);

        let mut small = [0x55u8; 1];
        assert_eq!(
            parse_hex_into("1234", &mut small),
            Err(ParseError::BufferSize {
                needed: 2,
                capacity: 1
            })
        );
        assert_eq!(small, [0x55]);
    }

    #[test]
    fn test_hex_round_trip() {
        for s in ["00", "FF", "0102030A", "DEADBEEF00", "AABBCCDDEEFF0011"] {
            assert_eq!(format_hex(&parse_hex(s).unwrap()), s);
        }
    }

    #[test]
    fn test_format_functions() {
        let bytes = vec![0x01, 0x02, 0x03, 0x0A];
        assert_eq!(format_hex(&bytes), "0102030A");
        assert_eq!(format_hex_spaced(&bytes), "01 02 03 0A");
        assert_eq!(format_hex(&[]), "");
        assert_eq!(format_hex_spaced(&[]), "");
    }
}
