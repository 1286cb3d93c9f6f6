use crate::storage::FeedType;

const ATOM_SIGNATURE: &[u8] = b"<feed";

/// Classify a fetched document as RSS or Atom.
///
/// Looks for the Atom root element signature (`<feed`) anywhere in the raw
/// bytes; everything else is treated as RSS. This never fails: a document
/// that is neither format is rejected later by the parser.
pub fn detect_format(body: &[u8]) -> FeedType {
    if body
        .windows(ATOM_SIGNATURE.len())
        .any(|window| window == ATOM_SIGNATURE)
    {
        FeedType::Atom
    } else {
        FeedType::Rss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_atom_root_detected() {
        let body = br#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"><title>x</title></feed>"#;
        assert_eq!(detect_format(body), FeedType::Atom);
    }

    #[test]
    fn test_rss_root_detected() {
        let body = br#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#;
        assert_eq!(detect_format(body), FeedType::Rss);
    }

    #[test]
    fn test_empty_and_garbage_default_to_rss() {
        assert_eq!(detect_format(b""), FeedType::Rss);
        assert_eq!(detect_format(b"<fee"), FeedType::Rss);
        assert_eq!(detect_format(b"not xml at all"), FeedType::Rss);
    }

    #[test]
    fn test_signature_at_end_of_body() {
        assert_eq!(detect_format(b"<feed"), FeedType::Atom);
    }

    proptest! {
        #[test]
        fn prop_any_body_with_signature_is_atom(
            prefix in proptest::collection::vec(any::<u8>(), 0..64),
            suffix in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut body = prefix;
            body.extend_from_slice(b"<feed");
            body.extend_from_slice(&suffix);
            prop_assert_eq!(detect_format(&body), FeedType::Atom);
        }

        #[test]
        fn prop_body_without_angle_bracket_is_rss(body in "[^<]{0,128}") {
            prop_assert_eq!(detect_format(body.as_bytes()), FeedType::Rss);
        }
    }
}
