// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// User-facing failure notifications.
//
// Every technical error is mapped to a short title and description that the
// notification collaborator can show as-is. Render failures are the only
// recoverable class: the preview shows a placeholder and editing continues.

use crate::error::PagesmithError;

/// How the front end should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// One preview failed; keep going and show a placeholder.
    Recoverable,
    /// The current operation failed; the user has to act (pick another file,
    /// try again).
    ActionRequired,
    /// A programming or UI contract was violated.
    Internal,
}

/// A failure notification with a heading and body text.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

/// Convert a `PagesmithError` into a notification.
pub fn humanize_error(err: &PagesmithError) -> HumanError {
    match err {
        PagesmithError::Parse(_) => HumanError {
            title: "Error loading PDF".into(),
            description: "Could not read or render the selected PDF file.".into(),
            severity: Severity::ActionRequired,
        },

        PagesmithError::Render { page_index, .. } => HumanError {
            title: "Preview unavailable".into(),
            description: format!(
                "Page {} could not be displayed. It will still be included when you save.",
                page_index + 1
            ),
            severity: Severity::Recoverable,
        },

        PagesmithError::Range { .. }
        | PagesmithError::NotFound(_)
        | PagesmithError::AnnotationNotFound(_)
        | PagesmithError::InvalidRotation(_)
        | PagesmithError::InvalidGeometry(_)
        | PagesmithError::Zoom(_) => HumanError {
            title: "That edit could not be applied".into(),
            description: format!("The editor rejected the change ({err})."),
            severity: Severity::Internal,
        },

        PagesmithError::NoDocument => HumanError {
            title: "No PDF loaded".into(),
            description: "Choose a PDF file to start editing.".into(),
            severity: Severity::ActionRequired,
        },

        PagesmithError::Busy => HumanError {
            title: "Still saving".into(),
            description: "Wait for the current save to finish.".into(),
            severity: Severity::Recoverable,
        },

        PagesmithError::Rebuild { page_index, .. } => HumanError {
            title: "Save failed".into(),
            description: format!(
                "Page {} of the original file could not be copied. Nothing was saved.",
                page_index + 1
            ),
            severity: Severity::ActionRequired,
        },

        PagesmithError::Annotation(_) => HumanError {
            title: "Save failed".into(),
            description: "An image placed on a page could not be read. Remove it or replace it with a PNG or JPEG, then save again.".into(),
            severity: Severity::ActionRequired,
        },

        PagesmithError::Pdf(_) => HumanError {
            title: "Save failed".into(),
            description: "Could not save the edited PDF.".into(),
            severity: Severity::ActionRequired,
        },

        PagesmithError::Image(_) => HumanError {
            title: "Image problem".into(),
            description: "The image may be damaged or in an unusual format. Try saving it as a JPEG or PNG first.".into(),
            severity: Severity::ActionRequired,
        },

        PagesmithError::Archive(_) => HumanError {
            title: "Download failed".into(),
            description: "The files could not be bundled into a ZIP archive.".into(),
            severity: Severity::ActionRequired,
        },

        PagesmithError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanError {
                    title: "File not found".into(),
                    description: "It may have been moved or deleted. Try choosing the file again.".into(),
                    severity: Severity::ActionRequired,
                }
            } else {
                HumanError {
                    title: "File error".into(),
                    description: "There was a problem reading or writing a file. Try again.".into(),
                    severity: Severity::ActionRequired,
                }
            }
        }

        PagesmithError::Serialization(_) => HumanError {
            title: "Editor state problem".into(),
            description: "Placed objects on this page could not be restored.".into(),
            severity: Severity::Internal,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageId;

    #[test]
    fn parse_failure_matches_load_toast() {
        let human = humanize_error(&PagesmithError::Parse("bad xref".into()));
        assert_eq!(human.title, "Error loading PDF");
        assert_eq!(human.severity, Severity::ActionRequired);
    }

    #[test]
    fn render_failure_is_recoverable() {
        let human = humanize_error(&PagesmithError::Render {
            page_index: 2,
            reason: "corrupt stream".into(),
        });
        assert_eq!(human.severity, Severity::Recoverable);
        assert!(human.description.contains("Page 3"));
    }

    #[test]
    fn rebuild_failure_names_one_based_page() {
        let human = humanize_error(&PagesmithError::Rebuild {
            page_index: 0,
            reason: "missing object".into(),
        });
        assert_eq!(human.title, "Save failed");
        assert!(human.description.contains("Page 1"));
    }

    #[test]
    fn concurrent_save_is_recoverable() {
        let human = humanize_error(&PagesmithError::Busy);
        assert_eq!(human.severity, Severity::Recoverable);
    }

    #[test]
    fn edit_contract_violations_are_internal() {
        let human = humanize_error(&PagesmithError::NotFound(PageId::new()));
        assert_eq!(human.severity, Severity::Internal);
    }
}
