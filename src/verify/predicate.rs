//! Conditions attached to expected-file entries and install groups.
//!
//! Grammar: `term ("," term)*` where `term = literal ("&" literal)*` and
//! `literal = "!"? word`. A word is a platform (`linux`, `mac`, `win`), a
//! toolchain (`newlib`, `glibc`, `arm`, `pnacl`, `host`) or `experimental`.
//! `,` is OR and binds looser than `&` (AND).

use std::fmt;

use crate::config::{BuildConfig, Platform, Toolchain};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Atom {
    Platform(Platform),
    Toolchain(Toolchain),
    Experimental,
}

impl Atom {
    fn parse(word: &str) -> Result<Self, String> {
        if word == "experimental" {
            return Ok(Atom::Experimental);
        }
        if let Some(platform) = Platform::ALL.iter().find(|p| p.as_str() == word) {
            return Ok(Atom::Platform(*platform));
        }
        if let Some(tc) = Toolchain::ALL.iter().find(|t| t.as_str() == word) {
            return Ok(Atom::Toolchain(*tc));
        }
        Err(format!("unknown condition '{word}'"))
    }

    fn eval(self, config: &BuildConfig) -> bool {
        match self {
            Atom::Platform(p) => config.platform == p,
            Atom::Toolchain(tc) => config.has_toolchain(tc),
            Atom::Experimental => config.build_experimental,
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Platform(p) => write!(f, "{p}"),
            Atom::Toolchain(tc) => write!(f, "{tc}"),
            Atom::Experimental => f.write_str("experimental"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Literal {
    pub negated: bool,
    pub atom: Atom,
}

/// A condition in disjunctive normal form. No terms means "always".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    any_of: Vec<Vec<Literal>>,
}

impl Predicate {
    pub fn always() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("empty condition".to_string());
        }

        let mut any_of = Vec::new();
        for term in text.split(',') {
            let mut all_of = Vec::new();
            for literal in term.split('&') {
                let literal = literal.trim();
                let (negated, word) = match literal.strip_prefix('!') {
                    Some(rest) => (true, rest.trim()),
                    None => (false, literal),
                };
                if word.is_empty() {
                    return Err(format!("empty term in condition '{text}'"));
                }
                all_of.push(Literal {
                    negated,
                    atom: Atom::parse(&word.to_ascii_lowercase())?,
                });
            }
            any_of.push(all_of);
        }
        Ok(Self { any_of })
    }

    pub fn eval(&self, config: &BuildConfig) -> bool {
        if self.any_of.is_empty() {
            return true;
        }
        self.any_of.iter().any(|all_of| {
            all_of
                .iter()
                .all(|lit| lit.atom.eval(config) != lit.negated)
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self
            .any_of
            .iter()
            .map(|all_of| {
                all_of
                    .iter()
                    .map(|lit| {
                        if lit.negated {
                            format!("!{}", lit.atom)
                        } else {
                            lit.atom.to_string()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("&")
            })
            .collect();
        f.write_str(&terms.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux_newlib_only() -> BuildConfig {
        BuildConfig::new(Platform::Linux, "27", 1).with_toolchains([Toolchain::Newlib])
    }

    #[test]
    fn platform_list_is_or() {
        let pred = Predicate::parse("linux,mac").unwrap();
        assert!(pred.eval(&linux_newlib_only()));
        assert!(!pred.eval(&BuildConfig::new(Platform::Win, "27", 1)));
    }

    #[test]
    fn toolchain_condition_follows_enabled_set() {
        let config = linux_newlib_only();
        assert!(Predicate::parse("newlib").unwrap().eval(&config));
        assert!(!Predicate::parse("glibc").unwrap().eval(&config));
    }

    #[test]
    fn negation_and_conjunction() {
        let config = linux_newlib_only();
        assert!(Predicate::parse("!win").unwrap().eval(&config));
        assert!(Predicate::parse("linux & newlib").unwrap().eval(&config));
        assert!(!Predicate::parse("linux&glibc").unwrap().eval(&config));
        assert!(Predicate::parse("linux&glibc, !mac&newlib").unwrap().eval(&config));
    }

    #[test]
    fn experimental_follows_flag() {
        let mut config = linux_newlib_only();
        let pred = Predicate::parse("experimental").unwrap();
        assert!(!pred.eval(&config));
        config.build_experimental = true;
        assert!(pred.eval(&config));
    }

    #[test]
    fn unknown_words_and_empty_terms_rejected() {
        assert!(Predicate::parse("solaris").is_err());
        assert!(Predicate::parse("linux,,mac").is_err());
        assert!(Predicate::parse("!").is_err());
        assert!(Predicate::parse("  ").is_err());
    }

    #[test]
    fn always_matches_everything() {
        assert!(Predicate::always().eval(&BuildConfig::new(Platform::Win, "27", 1)));
    }

    #[test]
    fn display_round_trips_normalised_form() {
        let pred = Predicate::parse(" Linux & !glibc ,mac").unwrap();
        assert_eq!(pred.to_string(), "linux&!glibc,mac");
    }
}
