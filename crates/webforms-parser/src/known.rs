//! Built-in name tables.

/// HTML tags that map to a dedicated HTML server control when marked
/// `runat="server"`. Types live in `ParserOptions::html_controls_namespace`;
/// other tags fall back to `ParserOptions::generic_html_control`.
pub const HTML_CONTROLS: &[(&str, &str)] = &[
    ("a", "HtmlAnchor"),
    ("body", "HtmlBody"),
    ("button", "HtmlButton"),
    ("form", "HtmlForm"),
    ("head", "HtmlHead"),
    ("img", "HtmlImage"),
    ("link", "HtmlLink"),
    ("select", "HtmlSelect"),
    ("table", "HtmlTable"),
    ("textarea", "HtmlTextArea"),
    ("title", "HtmlTitle"),
];

/// Page/Control directive attributes consumed by the compiler itself
/// rather than assigned to the page.
pub const PAGE_DIRECTIVE_IGNORED: &[&str] = &[
    "Inherits",
    "Language",
    "CodeBehind",
    "CodeFile",
    "Description",
    "LinePragmas",
    "MasterPageFile",
    "Src",
    "Strict",
];

pub fn html_control_for(tag: &str) -> Option<&'static str> {
    HTML_CONTROLS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(tag))
        .map(|(_, control)| *control)
}

pub fn is_ignored_page_attribute(name: &str) -> bool {
    PAGE_DIRECTIVE_IGNORED
        .iter()
        .any(|ignored| ignored.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_control_lookup() {
        assert_eq!(html_control_for("FORM"), Some("HtmlForm"));
        assert_eq!(html_control_for("div"), None);
    }

    #[test]
    fn test_ignored_attributes() {
        assert!(is_ignored_page_attribute("codebehind"));
        assert!(!is_ignored_page_attribute("Title"));
    }
}
