//! Lookup key canonicalization.

use std::borrow::Cow;

/// Strip a plus-address tag: `local+tag@domain` becomes `local@domain`.
///
/// The span from the first `+` up to (not including) the first `@` is
/// removed. Keys without both characters, or whose first `+` comes after the
/// first `@`, are returned unchanged and borrowed.
#[must_use]
pub fn normalize(raw_key: &str) -> Cow<'_, str> {
    match (raw_key.find('+'), raw_key.find('@')) {
        (Some(plus), Some(at)) if plus < at => {
            let mut key = String::with_capacity(raw_key.len() - (at - plus));
            key.push_str(&raw_key[..plus]);
            key.push_str(&raw_key[at..]);
            Cow::Owned(key)
        }
        _ => Cow::Borrowed(raw_key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("alice+promo@example.com", "alice@example.com")]
    #[case("bob@example.com", "bob@example.com")]
    #[case("a+b+c@example.com", "a@example.com")]
    #[case("+tag@example.com", "@example.com")]
    #[case("alice+@example.com", "alice@example.com")]
    #[case("alice+tag@sub@example.com", "alice@sub@example.com")]
    #[case("alice+tag", "alice+tag")]
    #[case("postmaster", "postmaster")]
    #[case("a@b+c", "a@b+c")]
    #[case("", "")]
    fn normalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input), expected);
    }

    #[test]
    fn unchanged_keys_are_borrowed() {
        assert!(matches!(normalize("bob@example.com"), Cow::Borrowed(_)));
        assert!(matches!(normalize("a+b@c"), Cow::Owned(_)));
    }

    proptest! {
        #[test]
        fn removes_tag_span(
            local in "[a-z0-9._-]{0,12}",
            tag in "[a-z0-9.+_-]{0,12}",
            domain in "[a-z0-9.@-]{0,16}",
        ) {
            let raw = format!("{local}+{tag}@{domain}");
            prop_assert_eq!(normalize(&raw).into_owned(), format!("{local}@{domain}"));
        }

        #[test]
        fn identity_without_plus(key in "[^+]{0,32}") {
            prop_assert_eq!(normalize(&key), key.as_str());
        }

        #[test]
        fn identity_without_at(key in "[^@]{0,32}") {
            prop_assert_eq!(normalize(&key), key.as_str());
        }

        #[test]
        fn idempotent(key in "\\PC{0,32}") {
            let once = normalize(&key).into_owned();
            prop_assert_eq!(normalize(&once).into_owned(), once.clone());
        }
    }
}
