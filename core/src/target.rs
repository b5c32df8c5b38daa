//! Host list line parsing.

/// How the TLS handshake treats the peer's certificate chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    /// Chain must validate against the default trust store.
    Verified,
    /// Any presented chain is accepted (self-signed endpoints).
    InsecureAccepted,
}

/// One scan target: a `host:port` address plus its verification mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub address: String,
    pub mode: VerificationMode,
}

impl TargetDescriptor {
    pub fn verified(address: impl Into<String>) -> Self {
        TargetDescriptor { address: address.into(), mode: VerificationMode::Verified }
    }

    pub fn insecure(address: impl Into<String>) -> Self {
        TargetDescriptor { address: address.into(), mode: VerificationMode::InsecureAccepted }
    }
}

const INSECURE_PREFIX: &str = "i ";

/// Parse one host list line. Blank lines and `#` comments yield `None`.
///
/// A line starting with `i ` selects insecure mode for the remainder. The
/// address itself is not validated here; bad addresses fail at connect time.
pub fn parse_line(line: &str) -> Option<TargetDescriptor> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match line.strip_prefix(INSECURE_PREFIX) {
        Some(rest) => Some(TargetDescriptor::insecure(rest)),
        None => Some(TargetDescriptor::verified(line)),
    }
}

/// Parse every line of a host list, dropping blanks and comments.
pub fn parse_lines<I, S>(lines: I) -> Vec<TargetDescriptor>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines.into_iter().filter_map(|l| parse_line(l.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_blanks() {
        let parsed = parse_lines(["# note", "", "  ", "example.com:443"]);
        assert_eq!(parsed, vec![TargetDescriptor::verified("example.com:443")]);
    }

    #[test]
    fn insecure_prefix() {
        let t = parse_line("i self-signed.example.com:443").unwrap();
        assert_eq!(t.address, "self-signed.example.com:443");
        assert_eq!(t.mode, VerificationMode::InsecureAccepted);
    }

    #[test]
    fn trims_before_matching() {
        let t = parse_line("   i internal:8443  ").unwrap();
        assert_eq!(t, TargetDescriptor::insecure("internal:8443"));
        let t = parse_line("\thost.example:443\r").unwrap();
        assert_eq!(t, TargetDescriptor::verified("host.example:443"));
    }

    #[test]
    fn prefix_needs_the_space() {
        // "ihost" is a hostname, not the insecure marker
        let t = parse_line("ihost:443").unwrap();
        assert_eq!(t.mode, VerificationMode::Verified);
        assert_eq!(t.address, "ihost:443");
        let t = parse_line("   # indented comment");
        assert!(t.is_none());
    }
}
