//! Accessibility classification and alt text selection for image occurrences.

use crate::types::{AccessibilityLevel, AccessibilityStatus, AnnotationFragment, Annotations};
use crate::utils::basename;

/// Classifies the metadata available for one occurrence.
///
/// Decorative beats alt text, alt text beats caption, caption beats nothing.
pub fn assess_accessibility(
    annotations: &Annotations,
    caption: Option<&str>,
) -> AccessibilityStatus {
    let alt = annotations.alt_text.as_deref().filter(|alt| !alt.trim().is_empty());
    let caption = caption.filter(|caption| !caption.trim().is_empty());
    let mut warnings = Vec::new();

    if annotations.is_decorative {
        if alt.is_some() {
            warnings.push(
                "image is marked @decorative, so its @alt text will be ignored".to_owned(),
            );
        }
        return AccessibilityStatus {
            level: AccessibilityLevel::Optimal,
            message: "decorative image, hidden from assistive technology".to_owned(),
            warnings,
        };
    }

    if let Some(alt) = alt {
        if caption.is_some_and(|caption| same_text(alt, caption)) {
            warnings.push(
                "alt text repeats the caption; describe what the image shows instead".to_owned(),
            );
        }
        let (level, message) = if annotations.long_description.is_some() {
            (
                AccessibilityLevel::Optimal,
                "alt text and long description provided",
            )
        } else {
            (AccessibilityLevel::Good, "alt text provided")
        };
        return AccessibilityStatus {
            level,
            message: message.to_owned(),
            warnings,
        };
    }

    if caption.is_some() {
        warnings.push("no @alt text; the figure caption is reused as alt text".to_owned());
        return AccessibilityStatus {
            level: AccessibilityLevel::Fallback,
            message: "caption used as alt text".to_owned(),
            warnings,
        };
    }

    warnings.push(
        "no @alt text or caption; screen readers will announce the image without distinguishing text"
            .to_owned(),
    );
    AccessibilityStatus {
        level: AccessibilityLevel::Poor,
        message: "no alt text, decorative marker or caption".to_owned(),
        warnings,
    }
}

/// The alt text an occurrence ends up with after export.
pub fn effective_alt_text(fragment: &AnnotationFragment) -> String {
    if fragment.is_decorative {
        return String::new();
    }
    if let Some(alt) = fragment.alt_text.as_deref().filter(|alt| !alt.trim().is_empty()) {
        return alt.trim().to_owned();
    }
    if let Some(caption) = fragment
        .caption_text
        .as_deref()
        .filter(|caption| !caption.trim().is_empty())
    {
        return caption.trim().to_owned();
    }
    generic_alt_text(&fragment.filename)
}

/// Filename-derived alt text, e.g. `figures/red_triangle.png` -> `Image: red triangle`.
pub fn generic_alt_text(filename: &str) -> String {
    let name = basename(filename);
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    let words = stem
        .split(['_', '-', ' '])
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if words.is_empty() {
        "Image".to_owned()
    } else {
        format!("Image: {words}")
    }
}

fn same_text(a: &str, b: &str) -> bool {
    let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    normalize(a) == normalize(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(alt: Option<&str>, decorative: bool, long: Option<&str>) -> Annotations {
        Annotations {
            alt_text: alt.map(str::to_owned),
            is_decorative: decorative,
            long_description: long.map(str::to_owned),
        }
    }

    #[test]
    fn every_combination_has_a_level() {
        for decorative in [false, true] {
            for alt in [None, Some("A red triangle")] {
                for long in [None, Some("Three equal sides.")] {
                    for caption in [None, Some("Figure 1")] {
                        let status =
                            assess_accessibility(&annotations(alt, decorative, long), caption);
                        assert!(!status.message.is_empty());
                        let expected = match (decorative, alt, long, caption) {
                            (true, ..) => AccessibilityLevel::Optimal,
                            (false, Some(_), Some(_), _) => AccessibilityLevel::Optimal,
                            (false, Some(_), None, _) => AccessibilityLevel::Good,
                            (false, None, _, Some(_)) => AccessibilityLevel::Fallback,
                            (false, None, _, None) => AccessibilityLevel::Poor,
                        };
                        assert_eq!(status.level, expected);
                    }
                }
            }
        }
    }

    #[test]
    fn decorative_with_alt_warns() {
        let status = assess_accessibility(&annotations(Some("ignored"), true, None), None);
        assert_eq!(status.level, AccessibilityLevel::Optimal);
        assert_eq!(status.warnings.len(), 1);
    }

    #[test]
    fn alt_equal_to_caption_warns() {
        let status = assess_accessibility(
            &annotations(Some("Sales  by region"), false, None),
            Some("sales by Region"),
        );
        assert_eq!(status.level, AccessibilityLevel::Good);
        assert!(status.warnings[0].contains("repeats the caption"));
    }

    #[test]
    fn fallback_and_poor_warn() {
        let fallback = assess_accessibility(&Annotations::default(), Some("Figure 2"));
        assert_eq!(fallback.level, AccessibilityLevel::Fallback);
        assert_eq!(fallback.warnings.len(), 1);

        let poor = assess_accessibility(&Annotations::default(), None);
        assert_eq!(poor.level, AccessibilityLevel::Poor);
        assert_eq!(poor.warnings.len(), 1);
    }

    #[test]
    fn generic_alt_from_filename() {
        assert_eq!(generic_alt_text("figures/red_triangle.png"), "Image: red triangle");
        assert_eq!(generic_alt_text("plot-2024.final.jpg"), "Image: plot 2024.final");
        assert_eq!(generic_alt_text(".png"), "Image");
    }
}
