use std::collections::BTreeSet;

/// Marker the bundled PPE model uses for non-compliance classes ("NO-Hardhat", "NO-Mask").
pub const DEFAULT_VIOLATION_MARKER: &str = "NO";

/// Decides whether a resolved class name denotes a compliance violation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViolationRule {
    /// Violation when the upper-cased class name contains the upper-cased marker.
    ///
    /// Note that this also matches labels such as "Snowboard" or "NOSE".
    Substring(String),
    /// Violation when the class name is exactly one of the declared labels.
    Labels(BTreeSet<String>),
}

impl ViolationRule {
    pub fn substring(marker: impl Into<String>) -> Self {
        Self::Substring(marker.into())
    }

    pub fn labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Labels(labels.into_iter().map(Into::into).collect())
    }

    pub fn is_violation(&self, class_name: &str) -> bool {
        match self {
            Self::Substring(marker) => class_name
                .to_uppercase()
                .contains(&marker.to_uppercase()),
            Self::Labels(labels) => labels.contains(class_name),
        }
    }
}

impl Default for ViolationRule {
    fn default() -> Self {
        Self::Substring(DEFAULT_VIOLATION_MARKER.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rule_matches_no_prefix_case_insensitively() {
        let rule = ViolationRule::default();
        assert!(rule.is_violation("NO-Helmet"));
        assert!(rule.is_violation("no-mask"));
        assert!(rule.is_violation("No Safety Vest"));
        assert!(!rule.is_violation("Helmet"));
        assert!(!rule.is_violation("Person"));
        assert!(!rule.is_violation(""));
    }

    #[test]
    fn default_rule_matches_substring_anywhere() {
        let rule = ViolationRule::default();
        assert!(rule.is_violation("Snowboard"));
        assert!(rule.is_violation("vest-none"));
    }

    #[test]
    fn default_rule_agrees_with_uppercase_contains() {
        let rule = ViolationRule::default();
        for name in [
            "Hardhat", "Mask", "NO-Hardhat", "NO-Mask", "NO-Safety Vest", "Person",
            "Safety Cone", "Safety Vest", "machinery", "vehicle", "Nose", "nO", "N O",
        ] {
            assert_eq!(
                rule.is_violation(name),
                name.to_uppercase().contains("NO"),
                "{name}"
            );
        }
    }

    #[test]
    fn label_rule_requires_exact_match() {
        let rule = ViolationRule::labels(["NO-Hardhat", "NO-Mask"]);
        assert!(rule.is_violation("NO-Mask"));
        assert!(!rule.is_violation("no-mask"));
        assert!(!rule.is_violation("NO-Safety Vest"));
        assert!(!rule.is_violation("Snowboard"));
    }
}
