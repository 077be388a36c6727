//! Recognised GitHub URL shapes.
//!
//! Each shape is a separate [`Rule`] so that a rejection or an acceptance can
//! be traced back to a single pattern.  Rules are tried in [`RULES`] order and
//! the first one that matches wins.

use std::sync::LazyLock;

use regex::Regex;

// ---------------------------------------------------------------------------
// Match result
// ---------------------------------------------------------------------------

/// The `(author, repo)` identity extracted from a GitHub URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub author: String,
    pub repo: String,
}

impl RepoRef {
    /// Drop a trailing `.git` from the repository name, as used by clone URLs.
    pub fn without_git_suffix(self) -> Self {
        let repo = match self.repo.strip_suffix(".git") {
            Some(stripped) => stripped.to_owned(),
            None => self.repo,
        };
        Self {
            author: self.author,
            repo,
        }
    }

    /// `author/repo`, the form used by policy entries.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.author, self.repo)
    }
}

/// A successful classification: which rule matched and what it extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub rule: &'static str,
    pub repo: RepoRef,
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// One URL grammar.  The pattern must define `author` and `repo` groups.
pub struct Rule {
    pub name: &'static str,
    pattern: Regex,
}

impl Rule {
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid regex; every rule is a literal
    /// compiled once on first use.
    fn new(name: &'static str, pattern: &str) -> Self {
        let pattern = Regex::new(pattern).expect("built-in URL rule must compile");
        Self { name, pattern }
    }

    /// Apply this rule to `url`, returning the captured identity.
    pub fn capture(&self, url: &str) -> Option<RepoRef> {
        let caps = self.pattern.captures(url)?;
        let author = caps.name("author")?.as_str();
        let repo = caps.name("repo")?.as_str();
        Some(RepoRef {
            author: author.to_owned(),
            repo: repo.to_owned(),
        })
    }
}

/// All recognised shapes, in priority order.
pub static RULES: LazyLock<[Rule; 5]> = LazyLock::new(|| {
    [
        Rule::new(
            "release-archive",
            r"^(?:https?://)?github\.com/(?P<author>.+?)/(?P<repo>.+?)/(?:releases|archive)/.*$",
        ),
        Rule::new(
            "blob-raw",
            r"^(?:https?://)?github\.com/(?P<author>.+?)/(?P<repo>.+?)/(?:blob|raw)/.*$",
        ),
        Rule::new(
            "git-info",
            r"^(?:https?://)?github\.com/(?P<author>.+?)/(?P<repo>.+?)/(?:info|git-).*$",
        ),
        Rule::new(
            "raw-content",
            r"^(?:https?://)?raw\.(?:githubusercontent|github)\.com/(?P<author>.+?)/(?P<repo>.+?)/.+?/.+$",
        ),
        // The second gist segment is the gist id; it stands in for `repo`.
        Rule::new(
            "gist",
            r"^(?:https?://)?gist\.(?:githubusercontent|github)\.com/(?P<author>.+?)/(?P<repo>.+?)/.+$",
        ),
    ]
});

/// Classify `url` against [`RULES`].  `None` means the URL is not a
/// supported GitHub resource.
pub fn classify(url: &str) -> Option<Classified> {
    RULES.iter().find_map(|rule| {
        rule.capture(url).map(|repo| Classified {
            rule: rule.name,
            repo,
        })
    })
}
