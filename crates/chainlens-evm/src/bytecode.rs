//! Bytecode patterns for identifying contracts by their code.
//!
//! Artifacts carry hex bytecode that may contain unresolved library link
//! placeholders (`__$…$__` or `__LibName____…`, 40 hex characters). Those
//! 20-byte regions become wildcards. The trailing CBOR metadata blob, whose
//! length is stored in the final two bytes, differs between otherwise
//! identical builds and is ignored when matching.

/// Parsed bytecode with wildcard positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodePattern {
    bytes: Vec<u8>,
    wildcard: Vec<bool>,
}

impl BytecodePattern {
    /// Parse artifact hex. `None` for empty code (interfaces, abstract
    /// contracts) and for text that is not bytecode.
    pub fn parse(hex_code: &str) -> Option<Self> {
        let s = hex_code.trim();
        let s = s.strip_prefix("0x").unwrap_or(s).as_bytes();
        let mut bytes = Vec::with_capacity(s.len() / 2);
        let mut wildcard = Vec::with_capacity(s.len() / 2);
        let mut i = 0;
        while i < s.len() {
            if s[i] == b'_' {
                if i + 40 > s.len() {
                    return None;
                }
                bytes.extend_from_slice(&[0u8; 20]);
                wildcard.extend_from_slice(&[true; 20]);
                i += 40;
                continue;
            }
            let pair = s.get(i..i + 2)?;
            let byte = u8::from_str_radix(std::str::from_utf8(pair).ok()?, 16).ok()?;
            bytes.push(byte);
            wildcard.push(false);
            i += 2;
        }
        if bytes.is_empty() {
            return None;
        }
        Some(Self { bytes, wildcard })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn has_link_references(&self) -> bool {
        self.wildcard.iter().any(|w| *w)
    }

    fn matches_at(&self, range: std::ops::Range<usize>, code: &[u8]) -> bool {
        range.len() == code.len()
            && range
                .zip(code)
                .all(|(i, b)| self.wildcard[i] || self.bytes[i] == *b)
    }

    /// Whether `code` is this runtime bytecode, metadata aside.
    pub fn matches(&self, code: &[u8]) -> bool {
        let ours = code_len_without_metadata(&self.bytes);
        let theirs = code_len_without_metadata(code);
        ours == theirs && self.matches_at(0..ours, &code[..theirs])
    }

    /// Whether `runtime` appears inside this creation bytecode, metadata aside.
    ///
    /// Creation code embeds the runtime code after the constructor, which is
    /// how an instance is recognised when the artifact lacks runtime bytecode.
    pub fn contains_runtime(&self, runtime: &[u8]) -> bool {
        let needle = &runtime[..code_len_without_metadata(runtime)];
        if needle.is_empty() || needle.len() > self.bytes.len() {
            return false;
        }
        (0..=self.bytes.len() - needle.len())
            .any(|start| self.matches_at(start..start + needle.len(), needle))
    }

    /// If `input` starts with this creation bytecode, the offset where the
    /// constructor arguments begin.
    pub fn strip_prefix_of(&self, input: &[u8]) -> Option<usize> {
        let n = self.bytes.len();
        (input.len() >= n && self.matches_at(0..n, &input[..n])).then_some(n)
    }
}

/// Length of `code` with its trailing CBOR metadata removed, or the full
/// length when none is recognised.
pub fn code_len_without_metadata(code: &[u8]) -> usize {
    if code.len() < 2 {
        return code.len();
    }
    let meta = u16::from_be_bytes([code[code.len() - 2], code[code.len() - 1]]) as usize;
    let Some(start) = code.len().checked_sub(meta + 2) else {
        return code.len();
    };
    // metadata is a CBOR map (major type 5)
    match code.get(start) {
        Some(b) if meta > 0 && (0xa0..=0xbf).contains(b) => start,
        _ => code.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 0x6080 6040 | a1 65 "bzzr0" .. ; meta length 0x0008
    const RUNTIME: &str = "0x60806040a165627a7a7230000008";

    #[test]
    fn metadata_is_ignored() {
        let p = BytecodePattern::parse(RUNTIME).unwrap();
        let other_build = hex::decode("60806040a165627a7a7231000008").unwrap();
        assert!(p.matches(&other_build));
        let different = hex::decode("60806041a165627a7a7230000008").unwrap();
        assert!(!p.matches(&different));
    }

    #[test]
    fn link_placeholders_are_wildcards() {
        let code = format!("0x73{}3014", "__$f6a8b1c9d0e2f3a4b5c6d7e8f9a0b1c2d3$__");
        let p = BytecodePattern::parse(&code).unwrap();
        assert!(p.has_link_references());
        let mut linked = vec![0x73];
        linked.extend_from_slice(&[0xab; 20]);
        linked.extend_from_slice(&[0x30, 0x14]);
        assert!(p.matches(&linked));
    }

    #[test]
    fn creation_code_contains_runtime_and_prefixes_constructor_args() {
        let creation = BytecodePattern::parse("0x600a600c6000396000f3fe60806040").unwrap();
        let runtime = hex::decode("60806040").unwrap();
        assert!(creation.contains_runtime(&runtime));

        let mut input = hex::decode("600a600c6000396000f3fe60806040").unwrap();
        input.extend_from_slice(&[0u8; 32]);
        assert_eq!(creation.strip_prefix_of(&input), Some(15));
        assert_eq!(creation.strip_prefix_of(&runtime), None);
    }

    #[test]
    fn empty_code_has_no_pattern() {
        assert!(BytecodePattern::parse("0x").is_none());
        assert!(BytecodePattern::parse("").is_none());
        assert!(BytecodePattern::parse("0xzz").is_none());
    }
}
