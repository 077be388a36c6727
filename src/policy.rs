//! Author/repository access policy.
//!
//! Entries are either a bare author (covering every repository of that
//! author) or an exact `author/repo` pair.  Matching is exact and
//! case-sensitive; the blacklist always wins over the whitelist.

use crate::config::Config;

/// Outcome of a policy check, naming the rule that decided it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Listed on the blacklist.
    Blacklisted,
    /// A whitelist is configured and the repository is not on it.
    NotWhitelisted,
    /// Listed on the whitelist.
    Whitelisted,
    /// No whitelist configured and not blacklisted.
    Open,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Whitelisted | Self::Open)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    whitelist: Vec<String>,
    blacklist: Vec<String>,
}

impl AccessPolicy {
    pub fn new(whitelist: Vec<String>, blacklist: Vec<String>) -> Self {
        Self {
            whitelist,
            blacklist,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.whitelist.clone(), config.blacklist.clone())
    }

    pub fn whitelist_len(&self) -> usize {
        self.whitelist.len()
    }

    pub fn blacklist_len(&self) -> usize {
        self.blacklist.len()
    }

    /// Decide whether `author/repo` may be downloaded.
    pub fn evaluate(&self, author: &str, repo: &str) -> Decision {
        if contains(&self.blacklist, author, repo) {
            return Decision::Blacklisted;
        }
        if self.whitelist.is_empty() {
            return Decision::Open;
        }
        if contains(&self.whitelist, author, repo) {
            Decision::Whitelisted
        } else {
            Decision::NotWhitelisted
        }
    }
}

fn contains(list: &[String], author: &str, repo: &str) -> bool {
    list.iter().any(|entry| {
        entry == author
            || entry
                .split_once('/')
                .is_some_and(|(a, r)| a == author && r == repo)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(whitelist: &[&str], blacklist: &[&str]) -> AccessPolicy {
        AccessPolicy::new(
            whitelist.iter().map(|s| s.to_string()).collect(),
            blacklist.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn empty_policy_allows_everything() {
        assert_eq!(policy(&[], &[]).evaluate("anyone", "x"), Decision::Open);
    }

    #[test]
    fn blacklisted_author() {
        let p = policy(&[], &["evilcorp"]);
        assert_eq!(p.evaluate("evilcorp", "anything"), Decision::Blacklisted);
        assert_eq!(p.evaluate("anyone-else", "anything"), Decision::Open);
    }

    #[test]
    fn blacklisted_repo_only() {
        let p = policy(&[], &["a/secret"]);
        assert!(!p.evaluate("a", "secret").is_allowed());
        assert!(p.evaluate("a", "public").is_allowed());
    }

    #[test]
    fn whitelisted_repo() {
        let p = policy(&["good/repo"], &[]);
        assert_eq!(p.evaluate("good", "repo"), Decision::Whitelisted);
        assert_eq!(p.evaluate("good", "otherrepo"), Decision::NotWhitelisted);
        assert_eq!(p.evaluate("anyone-else", "x"), Decision::NotWhitelisted);
    }

    #[test]
    fn whitelisted_author_covers_all_repos() {
        let p = policy(&["good"], &[]);
        assert!(p.evaluate("good", "one").is_allowed());
        assert!(p.evaluate("good", "two").is_allowed());
        assert!(!p.evaluate("bad", "one").is_allowed());
    }

    #[test]
    fn blacklist_takes_precedence() {
        let p = policy(&["good"], &["good"]);
        assert_eq!(p.evaluate("good", "repo"), Decision::Blacklisted);

        let p = policy(&["good"], &["good/repo"]);
        assert_eq!(p.evaluate("good", "repo"), Decision::Blacklisted);
        assert_eq!(p.evaluate("good", "other"), Decision::Whitelisted);
    }

    #[test]
    fn matching_is_exact_and_case_sensitive() {
        let p = policy(&["Good"], &[]);
        assert!(!p.evaluate("good", "repo").is_allowed());

        let p = policy(&["goo"], &[]);
        assert!(!p.evaluate("good", "repo").is_allowed());

        let p = policy(&[], &["evil/re"]);
        assert!(p.evaluate("evil", "repo").is_allowed());
    }

    #[test]
    fn nested_repo_names_match_full_slug() {
        let p = policy(&["a/b/c"], &[]);
        assert!(p.evaluate("a", "b/c").is_allowed());
        assert!(!p.evaluate("a", "b").is_allowed());
    }
}
