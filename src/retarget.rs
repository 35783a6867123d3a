//! Path retargeting for build-target manifests
//!
//! Absolute Windows-style paths baked into a manifest on another machine are
//! rewritten so they point into the current project root. Classification is
//! plain text matching, so the same rules apply on every host.

use serde::{Deserialize, Serialize};

/// Note attached to an absolute path whose tail could not be located.
pub const UNRESOLVED_TAIL: &str = "could not determine project-relative tail; left as-is";

/// Directory names that start the project-relative portion of a path.
pub const DEFAULT_ANCHORS: &[&str] = &["plugins"];

/// Result of classifying a path string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Absolute,
    NotAbsolute,
}

/// Decides whether a manifest value is an absolute path that needs retargeting.
pub trait PathClassifier: Send + Sync {
    fn classify(&self, value: &str) -> PathKind;
}

/// Drive-letter (`C:\`, `C:/`) and network-share (`\\server`) paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsClassifier;

impl PathClassifier for WindowsClassifier {
    fn classify(&self, value: &str) -> PathKind {
        let bytes = value.as_bytes();

        let drive = bytes.len() >= 3
            && bytes[0].is_ascii_alphabetic()
            && bytes[1] == b':'
            && is_separator(bytes[2]);
        let share = bytes.len() >= 2 && is_separator(bytes[0]) && is_separator(bytes[1]);

        if drive || share {
            PathKind::Absolute
        } else {
            PathKind::NotAbsolute
        }
    }
}

fn is_separator(b: u8) -> bool {
    b == b'\\' || b == b'/'
}

/// Separator used for matching and for rewritten output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Separator {
    Backslash,
    Slash,
}

impl Separator {
    /// Host convention
    pub fn native() -> Self {
        if cfg!(windows) {
            Self::Backslash
        } else {
            Self::Slash
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Backslash => '\\',
            Self::Slash => '/',
        }
    }

    /// Rewrite every `\` and `/` in `value` to this separator
    pub fn normalize(self, value: &str) -> String {
        let sep = self.as_char();
        value
            .chars()
            .map(|c| if c == '\\' || c == '/' { sep } else { c })
            .collect()
    }
}

/// Everything one rewrite needs; fixed for the duration of the operation.
pub struct RetargetOptions {
    pub project_root: String,
    pub anchors: Vec<String>,
    pub separator: Separator,
    pub classifier: Box<dyn PathClassifier>,
}

impl RetargetOptions {
    pub fn new(project_root: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into(),
            anchors: DEFAULT_ANCHORS.iter().map(|a| a.to_string()).collect(),
            separator: Separator::native(),
            classifier: Box::new(WindowsClassifier),
        }
    }

    pub fn with_anchors(mut self, anchors: Vec<String>) -> Self {
        self.anchors = anchors;
        self
    }

    pub fn with_separator(mut self, separator: Separator) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn PathClassifier>) -> Self {
        self.classifier = classifier;
        self
    }
}

impl std::fmt::Debug for RetargetOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetargetOptions")
            .field("project_root", &self.project_root)
            .field("anchors", &self.anchors)
            .field("separator", &self.separator)
            .finish_non_exhaustive()
    }
}

/// Outcome of retargeting a single value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retargeted {
    pub value: String,
    pub changed: bool,
    pub note: Option<&'static str>,
}

/// Locate the project-relative tail of `value`.
///
/// Each anchor must match a whole directory segment, case-insensitively, and
/// be followed by a separator. Anchors are tried in order; the first one found
/// wins at its first occurrence. The returned tail keeps the original casing
/// and uses `sep` throughout.
pub fn find_relative_tail(value: &str, anchors: &[String], sep: Separator) -> Option<String> {
    let normalized = sep.normalize(value);
    // ASCII lowering keeps byte offsets aligned with `normalized`
    let lowered = normalized.to_ascii_lowercase();
    let sep_char = sep.as_char();

    for anchor in anchors {
        let anchor = sep.normalize(anchor).to_ascii_lowercase();
        let anchor = anchor.trim_matches(sep_char);
        if anchor.is_empty() {
            continue;
        }
        let needle = format!("{anchor}{sep_char}");

        let mut from = 0;
        while let Some(pos) = lowered[from..].find(&needle) {
            let idx = from + pos;
            let at_boundary = idx == 0 || lowered[..idx].ends_with(sep_char);
            if at_boundary {
                return Some(normalized[idx..].to_string());
            }
            from = idx + needle.len();
        }
    }

    None
}

/// Rewrite one value relative to the configured project root.
pub fn retarget(value: &str, options: &RetargetOptions) -> Retargeted {
    if options.classifier.classify(value) == PathKind::NotAbsolute {
        return Retargeted {
            value: value.to_string(),
            changed: false,
            note: None,
        };
    }

    if is_under_root(value, &options.project_root, options.separator) {
        return Retargeted {
            value: value.to_string(),
            changed: false,
            note: None,
        };
    }

    let Some(tail) = find_relative_tail(value, &options.anchors, options.separator) else {
        return Retargeted {
            value: value.to_string(),
            changed: false,
            note: Some(UNRESOLVED_TAIL),
        };
    };

    let new_value = join(&options.project_root, &tail, options.separator);
    let changed = new_value != value;

    Retargeted {
        value: new_value,
        changed,
        note: None,
    }
}

/// Already rooted at the project root (ASCII case-insensitive, any separator)
fn is_under_root(value: &str, root: &str, sep: Separator) -> bool {
    let sep_char = sep.as_char();
    let root = sep.normalize(root);
    let root = root.trim_end_matches(sep_char);
    if root.is_empty() {
        return false;
    }
    let value = sep.normalize(value);

    value.len() > root.len()
        && value.is_char_boundary(root.len())
        && value[..root.len()].eq_ignore_ascii_case(root)
        && value[root.len()..].starts_with(sep_char)
}

fn join(root: &str, tail: &str, sep: Separator) -> String {
    let sep_char = sep.as_char();
    let root = sep.normalize(root);
    let root = root.trim_end_matches(sep_char);
    format!("{root}{sep_char}{tail}")
}
