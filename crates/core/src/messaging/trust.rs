//! Origin trust for inbound cross-frame messages.
//!
//! One policy decides whether a message is processed: [`TrustPolicy::is_trusted_origin`]. The
//! shipped implementation is an explicit allow-list compared on serialised origins
//! (`scheme://host[:port]`, lowercase host, default port elided). There is no substring or
//! "same domain" matching: `https://app.example.org.evil.com` contains `app.example.org` but is
//! a different origin.

use crate::{CoreError, CoreResult};
use std::collections::BTreeSet;
use url::Url;

/// Decides whether messages from `origin` may be processed.
pub trait TrustPolicy: Send + Sync {
    fn is_trusted_origin(&self, origin: &str) -> bool;
}

impl<F> TrustPolicy for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_trusted_origin(&self, origin: &str) -> bool {
        self(origin)
    }
}

/// Trusts exactly the listed origins. An empty list trusts nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OriginAllowList {
    origins: BTreeSet<String>,
}

impl OriginAllowList {
    /// Builds the list, normalising every entry. Fails on the first entry that is not an
    /// absolute tuple origin.
    pub fn new<I, S>(origins: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let origins = origins
            .into_iter()
            .map(|o| normalise_origin(o.as_ref()))
            .collect::<CoreResult<BTreeSet<_>>>()?;
        Ok(Self { origins })
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

impl TrustPolicy for OriginAllowList {
    fn is_trusted_origin(&self, origin: &str) -> bool {
        match normalise_origin(origin) {
            Ok(origin) => self.origins.contains(&origin),
            Err(_) => false,
        }
    }
}

/// Serialises `input` as an origin.
///
/// Accepts `scheme://host[:port]` with an optional trailing `/`. Anything carrying a path,
/// query, fragment or credentials is rejected, as are opaque origins (`null`, `file:`,
/// `data:`).
pub fn normalise_origin(input: &str) -> CoreResult<String> {
    let invalid = |reason: &str| CoreError::InvalidOrigin {
        origin: input.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(input.trim()).map_err(|e| invalid(&e.to_string()))?;
    if url.path() != "/" && !url.path().is_empty() {
        return Err(invalid("origin must not have a path"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("origin must not have a query or fragment"));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(invalid("origin must not carry credentials"));
    }

    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(invalid("opaque origins cannot be trusted"));
    }
    Ok(origin.ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow(origins: &[&str]) -> OriginAllowList {
        OriginAllowList::new(origins.iter().copied()).expect("valid origins")
    }

    #[test]
    fn exact_origin_is_trusted() {
        let policy = allow(&["https://app.example.org"]);
        assert!(policy.is_trusted_origin("https://app.example.org"));
        assert!(policy.is_trusted_origin("https://APP.example.org:443"));
    }

    #[test]
    fn look_alike_origins_are_not_trusted() {
        let policy = allow(&["https://app.example.org"]);
        for origin in [
            "https://evil.example.com",
            "https://app.example.org.evil.com",
            "https://evil-app.example.org",
            "http://app.example.org",
            "https://app.example.org:8443",
            "null",
            "",
        ] {
            assert!(!policy.is_trusted_origin(origin), "{origin}");
        }
    }

    #[test]
    fn empty_list_trusts_nothing() {
        let policy = OriginAllowList::default();
        assert!(policy.is_empty());
        assert!(!policy.is_trusted_origin("http://localhost:3000"));
    }

    #[test]
    fn rejects_non_origin_entries() {
        for entry in [
            "https://app.example.org/path",
            "https://app.example.org?x=1",
            "https://user:pw@app.example.org",
            "file:///tmp",
            "app.example.org",
        ] {
            assert!(
                matches!(OriginAllowList::new([entry]), Err(CoreError::InvalidOrigin { .. })),
                "{entry}"
            );
        }
    }

    #[test]
    fn closures_are_policies() {
        let policy = |origin: &str| origin == "http://localhost:8000";
        assert!(policy.is_trusted_origin("http://localhost:8000"));
        assert!(!policy.is_trusted_origin("http://localhost:9000"));
    }

    #[test]
    fn normalise_elides_default_port_and_slash() {
        assert_eq!(
            normalise_origin("http://LOCALHOST:80/").expect("valid"),
            "http://localhost"
        );
        assert_eq!(
            normalise_origin("http://localhost:8000").expect("valid"),
            "http://localhost:8000"
        );
    }
}
