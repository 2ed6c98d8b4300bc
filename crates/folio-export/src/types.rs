use serde::Serialize;

/// Quality classification of the accessibility metadata of one image occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessibilityLevel {
    Optimal,
    Good,
    Fallback,
    Poor,
}

impl AccessibilityLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessibilityLevel::Optimal => "optimal",
            AccessibilityLevel::Good => "good",
            AccessibilityLevel::Fallback => "fallback",
            AccessibilityLevel::Poor => "poor",
        }
    }
}

impl std::fmt::Display for AccessibilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessibilityStatus {
    pub level: AccessibilityLevel,
    pub message: String,
    pub warnings: Vec<String>,
}

/// Comment directives found directly above one `\includegraphics` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    pub alt_text: Option<String>,
    pub is_decorative: bool,
    pub long_description: Option<String>,
}

/// Accessibility and caption metadata tied to one image-inclusion occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotationFragment {
    /// Reference key exactly as written in the source; not unique.
    pub filename: String,
    pub alt_text: Option<String>,
    pub is_decorative: bool,
    pub long_description: Option<String>,
    /// Caption of the figure enclosing this exact occurrence.
    pub caption_text: Option<String>,
    /// Byte offset of the command in the source.
    pub position: usize,
    /// 1-based line of the command.
    pub line: usize,
    pub accessibility_status: AccessibilityStatus,
}

/// One row of [`crate::session::ExportSession::accessibility_report`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessibilityReportRow {
    pub filename: String,
    pub line: usize,
    pub level: AccessibilityLevel,
    pub message: String,
    pub warnings: Vec<String>,
}

impl From<&AnnotationFragment> for AccessibilityReportRow {
    fn from(fragment: &AnnotationFragment) -> Self {
        Self {
            filename: fragment.filename.clone(),
            line: fragment.line,
            level: fragment.accessibility_status.level,
            message: fragment.accessibility_status.message.clone(),
            warnings: fragment.accessibility_status.warnings.clone(),
        }
    }
}
