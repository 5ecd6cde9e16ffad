//! Error classification: raw compiler/runtime failure text to a typed
//! taxonomy via an ordered pattern library.
//!
//! Rules are evaluated top to bottom; the first match wins, so precedence
//! is documented by the order of [`ErrorClassifier::rules`]. Unmatched
//! text classifies as `UnclassifiedError` but is never dropped: the full
//! raw text always travels with the record.

use regex::Regex;

use crate::domain::diagnostics::{ErrorKind, ErrorRecord};

/// Ordered matcher/kind pairs plus signature normalizers.
pub struct ErrorClassifier {
    rules: Vec<(Regex, ErrorKind)>,
    line_numbers: Regex,
    windows_paths: Regex,
    unix_paths: Regex,
    timestamps: Regex,
    quoted: Regex,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    pub fn new() -> Self {
        // Precedence: deprecated API names are the most specific signals
        // and must win over the generic TypeError/NameError text that
        // usually accompanies them.
        let rules = vec![
            (
                Regex::new(
                    r"(?i)ShowCreation|DrawBorderThenFill|ShowIncreasingSubsets|TextMobject|TexMobject|get_graph|is deprecated|DeprecationWarning",
                )
                .unwrap(),
                ErrorKind::DeprecatedApiError,
            ),
            (
                Regex::new(
                    r"(?i)unexpected keyword argument|takes \d+ positional arguments?|missing \d+ required positional|got multiple values for argument",
                )
                .unwrap(),
                ErrorKind::ParameterError,
            ),
            (
                Regex::new(r"(?i)SyntaxError|IndentationError|invalid syntax|unexpected EOF")
                    .unwrap(),
                ErrorKind::SyntaxError,
            ),
            (
                Regex::new(r"(?i)ModuleNotFoundError|ImportError|No module named|cannot import")
                    .unwrap(),
                ErrorKind::MissingDependencyError,
            ),
            (
                Regex::new(
                    r"(?i)ffmpeg|rendering failed|RuntimeError|RecursionError|AttributeError|NameError|no valid scene",
                )
                .unwrap(),
                ErrorKind::RuntimeRenderError,
            ),
        ];

        Self {
            rules,
            line_numbers: Regex::new(r"line \d+").unwrap(),
            windows_paths: Regex::new(r"[A-Za-z]:\\[^\s:'\x22]+").unwrap(),
            unix_paths: Regex::new(r"(/[\w.\-]+){2,}").unwrap(),
            timestamps: Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?").unwrap(),
            quoted: Regex::new(r#"'[^']*'|"[^"]*""#).unwrap(),
        }
    }

    /// Map failure text to a typed record with a normalized signature.
    pub fn classify(&self, raw_text: &str) -> ErrorRecord {
        let kind = self
            .rules
            .iter()
            .find(|(pattern, _)| pattern.is_match(raw_text))
            .map(|(_, kind)| *kind)
            .unwrap_or(ErrorKind::UnclassifiedError);

        ErrorRecord {
            raw_text: raw_text.to_string(),
            kind,
            signature: self.signature(kind, raw_text),
        }
    }

    /// Normalized fingerprint: the most telling line with paths, line
    /// numbers, timestamps, and literals masked out, so repeated
    /// occurrences of the same fault collapse to one signature.
    fn signature(&self, kind: ErrorKind, raw_text: &str) -> String {
        let line = self.pick_signature_line(raw_text);

        let masked = self.line_numbers.replace_all(&line, "line N");
        let masked = self.windows_paths.replace_all(&masked, "<path>");
        let masked = self.unix_paths.replace_all(&masked, "<path>");
        let masked = self.timestamps.replace_all(&masked, "<time>");
        let masked = self.quoted.replace_all(&masked, "'…'");

        let mut signature = format!("{:?}:{}", kind, masked.trim());
        signature.truncate(200);
        signature
    }

    /// The last line that mentions an error, or the last non-empty line.
    fn pick_signature_line(&self, raw_text: &str) -> String {
        let mut fallback = "";
        for line in raw_text.lines().rev() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if fallback.is_empty() {
                fallback = line;
            }
            if line.contains("Error") || line.contains("Warning") || line.contains("error") {
                return line.to_string();
            }
        }
        fallback.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deprecated_call_wins_over_name_error() {
        let classifier = ErrorClassifier::new();
        let record = classifier.classify(
            "Traceback (most recent call last):\n  File \"/tmp/scene.py\", line 12\nNameError: name 'ShowCreation' is not defined",
        );
        assert_eq!(record.kind, ErrorKind::DeprecatedApiError);
    }

    #[test]
    fn test_parameter_error_classification() {
        let classifier = ErrorClassifier::new();
        let record = classifier
            .classify("TypeError: __init__() got an unexpected keyword argument 'size'");
        assert_eq!(record.kind, ErrorKind::ParameterError);
    }

    #[test]
    fn test_missing_dependency_classification() {
        let classifier = ErrorClassifier::new();
        let record = classifier.classify("ModuleNotFoundError: No module named 'manim'");
        assert_eq!(record.kind, ErrorKind::MissingDependencyError);
    }

    #[test]
    fn test_unmatched_text_preserved_in_full() {
        let classifier = ErrorClassifier::new();
        let raw = "x".repeat(4000);
        let record = classifier.classify(&raw);

        assert_eq!(record.kind, ErrorKind::UnclassifiedError);
        assert_eq!(record.raw_text.len(), 4000);
    }

    #[test]
    fn test_signature_collapses_paths_and_line_numbers() {
        let classifier = ErrorClassifier::new();
        let a = classifier.classify(
            "File \"/home/alice/work/scene.py\", line 42\nSyntaxError: invalid syntax",
        );
        let b = classifier.classify(
            "File \"/var/tmp/build/scene.py\", line 7\nSyntaxError: invalid syntax",
        );

        assert_eq!(a.signature, b.signature);
        assert!(!a.signature.contains("alice"));
        assert!(!a.signature.contains("42"));
    }

    #[test]
    fn test_distinct_faults_get_distinct_signatures() {
        let classifier = ErrorClassifier::new();
        let a = classifier.classify("SyntaxError: invalid syntax");
        let b = classifier.classify("IndentationError: unexpected indent");
        assert_ne!(a.signature, b.signature);
    }
}
