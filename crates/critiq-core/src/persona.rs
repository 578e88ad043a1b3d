//! Persona resolution and usage tracking.
//!
//! A persona is a named system-prompt profile that conditions the critique
//! voice. The built-in catalog covers the common reviewer angles; callers
//! with user-defined personas implement [`PersonaResolver`] themselves or
//! extend the catalog.

use std::collections::BTreeMap;

use dashmap::DashMap;

/// Resolves a persona name to its system prompt.
pub trait PersonaResolver: Send + Sync {
    /// The system prompt for `name`, or `None` if unknown. Lookup is
    /// case-insensitive.
    fn resolve(&self, name: &str) -> Option<String>;

    /// All resolvable persona names, sorted.
    fn names(&self) -> Vec<String>;
}

/// The built-in persona catalog, optionally extended with custom entries.
pub struct StaticPersonaCatalog {
    personas: BTreeMap<String, String>,
}

impl StaticPersonaCatalog {
    pub fn new() -> Self {
        let mut personas = BTreeMap::new();
        personas.insert(
            "methodologist".to_string(),
            "You are a research methodologist reviewing an academic paper. \
             Critique the study design, sampling, controls, and threats to \
             validity. Be specific: point to the passages that concern you \
             and say what a stronger design would look like."
                .to_string(),
        );
        personas.insert(
            "statistician".to_string(),
            "You are a statistician reviewing an academic paper. Critique \
             the statistical methods, reported effect sizes, uncertainty \
             quantification, and any inference the data cannot support. \
             Flag missing corrections and underpowered comparisons."
                .to_string(),
        );
        personas.insert(
            "domain-reviewer".to_string(),
            "You are a senior researcher in this paper's field. Assess \
             novelty against prior work, whether the related-work coverage \
             is fair, and whether the claims are positioned honestly within \
             the literature."
                .to_string(),
        );
        personas.insert(
            "clarity-editor".to_string(),
            "You are an academic editor. Critique the paper's structure, \
             argument flow, and writing clarity. Identify sections a \
             first-time reader would stumble over and suggest reorderings \
             or rewrites."
                .to_string(),
        );
        Self { personas }
    }

    /// Add or replace a persona.
    pub fn with_persona(mut self, name: &str, prompt: &str) -> Self {
        self.personas
            .insert(name.to_lowercase(), prompt.to_string());
        self
    }
}

impl Default for StaticPersonaCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PersonaResolver for StaticPersonaCatalog {
    fn resolve(&self, name: &str) -> Option<String> {
        self.personas.get(&name.to_lowercase()).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.personas.keys().cloned().collect()
    }
}

/// Where a persona sits in the usage lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageState {
    /// Never used in this tracker's lifetime.
    Unseen,
    /// Used this many times, below the persistence threshold.
    Counting(u32),
    /// Just crossed the threshold; the caller should persist the persona
    /// now. The count resets, so the next use starts a fresh cycle.
    Persisted,
}

/// Counts persona uses and signals when one has been used often enough to
/// be worth persisting. State is explicit and injectable rather than
/// process-global; one tracker per deployment scope.
pub struct PersonaUsageTracker {
    counts: DashMap<String, u32>,
    threshold: u32,
}

impl PersonaUsageTracker {
    /// `threshold` uses promote a persona to [`UsageState::Persisted`].
    pub fn new(threshold: u32) -> Self {
        Self {
            counts: DashMap::new(),
            threshold: threshold.max(1),
        }
    }

    /// Record one use of `name` and return the resulting state.
    ///
    /// The reset happens under the same map entry that was incremented, so
    /// a concurrent use cannot land between the increment and the reset
    /// and be lost.
    pub fn record_use(&self, name: &str) -> UsageState {
        let mut entry = self.counts.entry(name.to_lowercase()).or_insert(0);
        *entry += 1;
        if *entry >= self.threshold {
            *entry = 0;
            UsageState::Persisted
        } else {
            UsageState::Counting(*entry)
        }
    }

    /// The current state of `name` without recording a use.
    pub fn state(&self, name: &str) -> UsageState {
        match self.counts.get(&name.to_lowercase()) {
            Some(count) if *count > 0 => UsageState::Counting(*count),
            _ => UsageState::Unseen,
        }
    }
}
