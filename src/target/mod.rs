//! Target URL handling: repairing the request path, classifying it against
//! the supported GitHub URL shapes, and turning it into the upstream URL.
//!
//! The URL that is classified and checked against the access policy is
//! derived from the parsed upstream URL, so the two can never disagree about
//! host, path segments or dot segments.

pub mod grammar;
pub mod normalize;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::Url;

pub use grammar::classify;

/// Characters of a decoded target that would otherwise end the path or
/// start a new escape when it is parsed again.
const REENCODE: &AsciiSet = &CONTROLS.add(b'%').add(b'?').add(b'#');

/// Upstream location of a proxied request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
}

impl Target {
    /// Parse a percent-decoded target into the URL that will be requested
    /// upstream.  A target without a scheme is assumed to be `https`.
    ///
    /// Dot segments are resolved here, before classification.
    pub fn parse(decoded: &str) -> Option<Self> {
        let (scheme, rest) = if let Some(rest) = decoded.strip_prefix("https://") {
            ("https", rest)
        } else if let Some(rest) = decoded.strip_prefix("http://") {
            ("http", rest)
        } else {
            ("https", decoded)
        };
        let encoded = utf8_percent_encode(rest, REENCODE);
        let url = Url::parse(&format!("{scheme}://{encoded}")).ok()?;
        url.host_str().filter(|host| !host.is_empty())?;
        Some(Self { url })
    }

    /// The upstream URL with its path decoded, in the form the grammar
    /// rules match against.
    pub fn classification_url(&self) -> String {
        let path = percent_decode_str(self.url.path()).decode_utf8_lossy();
        format!("{}://{}{}", self.url.scheme(), self.url.authority(), path)
    }

    /// `scheme://host[:port]`
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    /// Full upstream URL, with the inbound query string appended.
    pub fn url(&self, query: Option<&str>) -> Url {
        let mut url = self.url.clone();
        url.set_query(query.filter(|q| !q.is_empty()));
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_scheme() {
        let url = "https://github.com/a/b/releases/download/v1/file.zip";
        let t = Target::parse(url).unwrap();
        assert_eq!(t.origin(), "https://github.com");
        assert_eq!(t.classification_url(), url);
        assert_eq!(t.url(None).as_str(), url);
    }

    #[test]
    fn parse_keeps_plain_http() {
        let t = Target::parse("http://raw.githubusercontent.com/a/b/main/x").unwrap();
        assert_eq!(t.origin(), "http://raw.githubusercontent.com");
    }

    #[test]
    fn schemeless_defaults_to_https() {
        let t = Target::parse("github.com/a/b/archive/main.zip").unwrap();
        assert_eq!(
            t.url(None).as_str(),
            "https://github.com/a/b/archive/main.zip"
        );
    }

    #[test]
    fn special_characters_are_reencoded() {
        let t = Target::parse("https://github.com/a/b/releases/download/v1/my file?#%.zip")
            .unwrap();
        assert_eq!(
            t.url(None).path(),
            "/a/b/releases/download/v1/my%20file%3F%23%25.zip"
        );
        assert_eq!(
            t.classification_url(),
            "https://github.com/a/b/releases/download/v1/my file?#%.zip"
        );
    }

    #[test]
    fn decoded_slashes_split_the_path() {
        // `github.com%2Fgood%2Frepo` arrives here already decoded.
        let t = Target::parse("http://github.com/good/repo/releases/x/evil/repo/y").unwrap();
        assert_eq!(t.origin(), "http://github.com");
        assert_eq!(t.url(None).path(), "/good/repo/releases/x/evil/repo/y");
    }

    #[test]
    fn dot_segments_are_resolved_before_classification() {
        let t = Target::parse(
            "http://github.com/good/repo/releases/../../../evil/repo/releases/download/v1/x",
        )
        .unwrap();
        assert_eq!(
            t.classification_url(),
            "http://github.com/evil/repo/releases/download/v1/x"
        );
        assert_eq!(
            t.url(None).path(),
            "/evil/repo/releases/download/v1/x"
        );
    }

    #[test]
    fn userinfo_stays_in_classification_url() {
        let t = Target::parse("https://evil.com@github.com/a/b/releases/x").unwrap();
        assert!(classify(&t.classification_url()).is_none());
    }

    #[test]
    fn query_is_appended() {
        let url = "https://github.com/a/b.git/info/refs";
        let t = Target::parse(url).unwrap();
        assert_eq!(
            t.url(Some("service=git-upload-pack")).as_str(),
            "https://github.com/a/b.git/info/refs?service=git-upload-pack"
        );
        assert_eq!(t.url(Some("")).as_str(), url);
    }

    #[test]
    fn missing_host_is_rejected() {
        assert!(Target::parse("https://").is_none());
        assert!(Target::parse("").is_none());
        assert!(Target::parse("https://exa mple.com/a").is_none());
    }
}
