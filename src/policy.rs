//! Access policy model
//!
//! A policy is an ordered list of terms. Each term names the peers it applies
//! to and the rules those peers are granted. Policies are built fresh for
//! every claim and handed to the transport as-is.

use serde::{Deserialize, Serialize};

use crate::types::{Guid, Guild};

/// Version stamped on generated policies.
pub const DEFAULT_POLICY_VERSION: u32 = 1;

/// Rule pattern that matches every member and action.
pub const WILDCARD: &str = "*";

/// Which principals a term applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "guid")]
pub enum PeerType {
    /// Any peer, authenticated or not
    All,
    /// Any authenticated peer
    AnyTrusted,
    /// Any member of the guild
    GuildMember(Guid),
    /// One specific identity
    Identity(Guid),
}

/// Principal selector within a term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub peer_type: PeerType,
}

impl Peer {
    pub fn new(peer_type: PeerType) -> Self {
        Self { peer_type }
    }

    pub fn guild_member(guild: &Guild) -> Self {
        Self::new(PeerType::GuildMember(guild.guid()))
    }
}

/// Resource/action matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rule {
    pattern: String,
}

impl Rule {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn allow_all() -> Self {
        Self::new(WILDCARD)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_wildcard(&self) -> bool {
        self.pattern == WILDCARD
    }

    /// Wildcard matches anything; everything else is an exact match.
    pub fn matches(&self, resource: &str) -> bool {
        self.is_wildcard() || self.pattern == resource
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub peers: Vec<Peer>,
    pub rules: Vec<Rule>,
}

impl Term {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_peer(&mut self, peer: Peer) {
        self.peers.push(peer);
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn with_peer(mut self, peer: Peer) -> Self {
        self.add_peer(peer);
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.add_rule(rule);
        self
    }
}

/// Ordered collection of terms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub version: u32,
    pub terms: Vec<Term>,
}

impl Policy {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            terms: Vec::new(),
        }
    }

    pub fn add_term(&mut self, term: Term) {
        self.terms.push(term);
    }
}

/// Builds the policy installed on claim: one term per guild, granting its
/// members the wildcard rule.
pub fn default_policy(guilds: &[Guild]) -> Policy {
    let mut policy = Policy::new(DEFAULT_POLICY_VERSION);
    for guild in guilds {
        policy.add_term(
            Term::new()
                .with_peer(Peer::guild_member(guild))
                .with_rule(Rule::allow_all()),
        );
    }
    policy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_single_guild() {
        let guild = Guild::default_guild();
        let policy = default_policy(std::slice::from_ref(&guild));

        assert_eq!(policy.version, 1);
        assert_eq!(policy.terms.len(), 1);
        let term = &policy.terms[0];
        assert_eq!(term.peers, vec![Peer::new(PeerType::GuildMember(Guid::DEFAULT))]);
        assert_eq!(term.rules.len(), 1);
        assert!(term.rules[0].is_wildcard());
    }

    #[test]
    fn test_rule_exact_match() {
        let rule = Rule::new("org.example.Lamp");
        assert!(rule.matches("org.example.Lamp"));
        assert!(!rule.matches("org.example.Lamp2"));
        assert!(Rule::allow_all().matches("anything"));
    }

    #[test]
    fn test_default_policy_one_term_per_guild() {
        let a = Guild::default_guild();
        let b = Guild::new("kitchen", "Kitchen devices", Guid::from_bytes([2; 16]));
        let policy = default_policy(&[a, b]);
        assert_eq!(policy.terms.len(), 2);
        assert_eq!(
            policy.terms[1].peers,
            vec![Peer::new(PeerType::GuildMember(Guid::from_bytes([2; 16])))]
        );
    }
}
