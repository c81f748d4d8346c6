/// Splits `haystack` around the first `needle`, e.g. `MaxTime=1-00:00:00` at
/// `=`. Returns None if `needle` does not occur.
pub fn split_first(haystack: &[u8], needle: u8) -> Option<(&[u8], &[u8])> {
    let index = haystack.iter().position(|&c| c == needle)?;

    Some((&haystack[..index], &haystack[index + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_first() {
        assert_eq!(split_first(b"", b'='), None);
        assert_eq!(split_first(b"State=UP", b'='), Some((&b"State"[..], &b"UP"[..])));
        assert_eq!(split_first(b"Default=", b'='), Some((&b"Default"[..], &b""[..])));
        assert_eq!(
            split_first(b"TRES=cpu=4,mem=1G", b'='),
            Some((&b"TRES"[..], &b"cpu=4,mem=1G"[..]))
        );
        assert_eq!(split_first(b"Nodes", b'='), None);
    }
}
