//! Reference-to-file matching strategies
//!
//! Export versions write the route reference differently: a relative path
//! (`/workout-routes/route_2024-01-15_8.30am.gpx`), a bare file name with a
//! different extension, or only a key embedded in the file name. Each shape
//! gets its own strategy and the index tries them in order.

use serde::{Deserialize, Serialize};

use super::catalog::RouteFile;
use crate::models::RouteReference;

/// One way of deciding whether a catalog file is the target of a reference
pub trait MatchStrategy: Send + Sync {
    /// Short name used in logs and diagnostics
    fn name(&self) -> &'static str;

    /// Whether `file` is a candidate for `reference`
    fn matches(&self, reference: &RouteReference, file: &RouteFile) -> bool;
}

/// The reference's last path component equals the file name exactly
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactFileName;

impl MatchStrategy for ExactFileName {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn matches(&self, reference: &RouteReference, file: &RouteFile) -> bool {
        file.name == reference.file_name()
    }
}

/// Same file name once extensions are ignored, for files with a known track extension
#[derive(Debug, Clone)]
pub struct ExtensionSubstitution {
    extensions: Vec<String>,
}

impl ExtensionSubstitution {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }
}

impl Default for ExtensionSubstitution {
    fn default() -> Self {
        Self::new(["gpx"])
    }
}

impl MatchStrategy for ExtensionSubstitution {
    fn name(&self) -> &'static str {
        "extension"
    }

    fn matches(&self, reference: &RouteReference, file: &RouteFile) -> bool {
        if !self.extensions.iter().any(|e| *e == file.extension_lower) {
            return false;
        }
        // `route_8.30am` has no extension but contains a dot, so try the whole name too
        file.stem_lower == reference.file_name().to_lowercase()
            || file.stem_lower == reference.file_stem().to_lowercase()
    }
}

/// Extensions a route reference or file may carry; any other dot is part of the name
const TRACK_EXTENSIONS: &[&str] = &["gpx", "xml"];

/// Lowercased name with a known track extension removed. Route names embed a
/// clock time (`route_2024-01-12_7.00am`), so the last dot is not always an extension.
fn track_key(name: &str) -> String {
    let lower = name.to_lowercase();
    if let Some((stem, ext)) = lower.rsplit_once('.') {
        if !stem.is_empty() && TRACK_EXTENSIONS.contains(&ext) {
            return stem.to_string();
        }
    }
    lower
}

/// The reference key appears inside the file name, or the file name inside the reference
#[derive(Debug, Clone, Copy)]
pub struct SubstringMatch {
    min_len: usize,
}

impl SubstringMatch {
    /// Keys shorter than `min_len` never match
    pub fn new(min_len: usize) -> Self {
        Self { min_len: min_len.max(1) }
    }
}

impl Default for SubstringMatch {
    fn default() -> Self {
        Self::new(3)
    }
}

impl MatchStrategy for SubstringMatch {
    fn name(&self) -> &'static str {
        "substring"
    }

    fn matches(&self, reference: &RouteReference, file: &RouteFile) -> bool {
        let key = track_key(reference.file_name());
        let candidate = track_key(&file.name);
        if key.len() < self.min_len || candidate.len() < self.min_len {
            return false;
        }
        candidate.contains(&key) || key.contains(&candidate)
    }
}

/// Selectable strategy names, in the form used by configuration and the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategyKind {
    /// Exact file name match
    Exact,
    /// File name match ignoring the extension (.gpx)
    Extension,
    /// Reference key contained in the file name
    Substring,
}

impl MatchStrategyKind {
    pub const ALL: [MatchStrategyKind; 3] = [
        MatchStrategyKind::Exact,
        MatchStrategyKind::Extension,
        MatchStrategyKind::Substring,
    ];

    pub fn build(&self) -> Box<dyn MatchStrategy> {
        match self {
            MatchStrategyKind::Exact => Box::new(ExactFileName),
            MatchStrategyKind::Extension => Box::new(ExtensionSubstitution::default()),
            MatchStrategyKind::Substring => Box::new(SubstringMatch::default()),
        }
    }
}

/// The full ordered fallback chain: exact, then extension, then substring
pub fn default_strategies() -> Vec<Box<dyn MatchStrategy>> {
    MatchStrategyKind::ALL.iter().map(|k| k.build()).collect()
}
