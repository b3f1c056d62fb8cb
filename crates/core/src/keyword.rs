//! Keyword Matcher
//!
//! Pure decision logic for the proof-of-compliance check. The matcher
//! takes raw typed text, optional raw spoken text, and the active policy,
//! and classifies the attempt as `Fail`, `SpokenOnlyOk`, or `FullOk`.
//! Normalization is pluggable through the `Normalizer` trait so a fuzzy
//! front-end (useful for noisy speech-to-text output) can be swapped in
//! without touching any caller.

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use std::collections::HashSet;

/// Result of evaluating one validation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Neither channel (or not enough of them) verified.
    Fail,
    /// The spoken phrase matched but the typed half did not; the caller
    /// is expected to finish the proof with a typed follow-up.
    SpokenOnlyOk,
    /// The attempt satisfies the active policy in full.
    FullOk,
}

/// Whether both channels are required or a single typed keyword suffices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordMode {
    /// One unified keyword set; typed membership alone passes.
    Single,
    /// Spoken phrase and typed token must both match their own sets.
    Dual,
}

/// Active keyword configuration. Both modes run through the same matcher
/// code path; the mode only changes which sets participate.
#[derive(Debug, Clone)]
pub struct KeywordPolicy {
    pub mode: KeywordMode,
    /// Canonical spoken phrases, already in normalized form.
    pub spoken_phrases: HashSet<String>,
    /// Accepted typed tokens (unified set in `Single` mode).
    pub typed_keywords: HashSet<String>,
}

impl Default for KeywordPolicy {
    /// The stock wake vocabulary: say a variant of "I'm awake" / "I'm up",
    /// then type yes/ok.
    fn default() -> Self {
        let spoken = [
            "i'm awake",
            "i am awake",
            "awake",
            "im awake",
            "i'm up",
            "i am up",
            "up",
            "im up",
            "wake up",
            "get up",
            "a wake",
            "awaken",
            "wake",
        ];
        let typed = ["yes", "ok", "okay"];
        Self {
            mode: KeywordMode::Dual,
            spoken_phrases: spoken.iter().map(|s| s.to_string()).collect(),
            typed_keywords: typed.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl KeywordPolicy {
    /// Single-mode policy over one unified keyword set.
    pub fn single(keywords: impl IntoIterator<Item = String>) -> Self {
        Self {
            mode: KeywordMode::Single,
            spoken_phrases: HashSet::new(),
            typed_keywords: keywords.into_iter().collect(),
        }
    }
}

/// Maps raw caller input onto canonical form before set membership.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, raw: &str) -> String;
}

/// Lowercases, trims, collapses whitespace, strips edge punctuation,
/// straightens curly apostrophes, and rewrites the bare token `im` to
/// `i'm` so common speech-to-text spellings land on canonical phrases.
pub struct DefaultNormalizer;

impl Normalizer for DefaultNormalizer {
    fn normalize(&self, raw: &str) -> String {
        let lowered = raw.trim().to_lowercase().replace('\u{2019}', "'");
        let stripped = lowered
            .trim_matches(|c: char| ".!?,;:".contains(c) || c.is_whitespace())
            .to_string();
        stripped
            .split_whitespace()
            .map(|token| if token == "im" { "i'm" } else { token })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A lenient normalizer that snaps near-miss input onto the closest
/// canonical phrase when the fuzzy score clears `min_score`. Falls back
/// to plain normalization when nothing is close enough, so it never
/// widens the accepted set beyond the configured phrases.
pub struct FuzzyNormalizer {
    inner: DefaultNormalizer,
    candidates: Vec<String>,
    matcher: SkimMatcherV2,
    min_score: i64,
}

impl FuzzyNormalizer {
    pub fn new(candidates: impl IntoIterator<Item = String>, min_score: i64) -> Self {
        Self {
            inner: DefaultNormalizer,
            candidates: candidates.into_iter().collect(),
            matcher: SkimMatcherV2::default(),
            min_score,
        }
    }
}

impl Normalizer for FuzzyNormalizer {
    fn normalize(&self, raw: &str) -> String {
        let base = self.inner.normalize(raw);
        if base.is_empty() || self.candidates.contains(&base) {
            return base;
        }
        let best = self
            .candidates
            .iter()
            .filter_map(|c| self.matcher.fuzzy_match(c, &base).map(|score| (score, c)))
            .max_by_key(|(score, _)| *score);
        match best {
            Some((score, canonical)) if score >= self.min_score => canonical.clone(),
            _ => base,
        }
    }
}

/// The pure pass/fail decision function over one validation attempt.
pub struct KeywordMatcher {
    policy: KeywordPolicy,
    normalizer: Box<dyn Normalizer>,
}

impl KeywordMatcher {
    pub fn new(policy: KeywordPolicy) -> Self {
        Self::with_normalizer(policy, Box::new(DefaultNormalizer))
    }

    pub fn with_normalizer(policy: KeywordPolicy, normalizer: Box<dyn Normalizer>) -> Self {
        Self { policy, normalizer }
    }

    pub fn policy(&self) -> &KeywordPolicy {
        &self.policy
    }

    /// Classifies one attempt. Empty typed and empty spoken input is
    /// always `Fail`. In dual mode a correct typed token paired with an
    /// incorrect spoken phrase also fails: both asserted channels must
    /// verify.
    pub fn evaluate(&self, typed: &str, spoken: Option<&str>) -> MatchOutcome {
        let typed_ok = self.typed_matches(typed);
        let spoken_ok = spoken.is_some_and(|s| self.spoken_matches(s));

        match self.policy.mode {
            KeywordMode::Single => {
                if typed_ok {
                    MatchOutcome::FullOk
                } else {
                    MatchOutcome::Fail
                }
            }
            KeywordMode::Dual => match (spoken_ok, typed_ok) {
                (true, true) => MatchOutcome::FullOk,
                (true, false) => MatchOutcome::SpokenOnlyOk,
                _ => MatchOutcome::Fail,
            },
        }
    }

    /// Membership check for the typed half alone, used once the spoken
    /// half has already been verified in an earlier call.
    pub fn typed_matches(&self, typed: &str) -> bool {
        let canonical = self.normalizer.normalize(typed);
        !canonical.is_empty() && self.policy.typed_keywords.contains(&canonical)
    }

    pub fn spoken_matches(&self, spoken: &str) -> bool {
        let canonical = self.normalizer.normalize(spoken);
        !canonical.is_empty() && self.policy.spoken_phrases.contains(&canonical)
    }
}
