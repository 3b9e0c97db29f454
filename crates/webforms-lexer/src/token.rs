use crate::position::{Position, Range};
use serde::Serialize;
use std::fmt;

/// Token classification for server-side markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    /// Literal markup or character data.
    Text,
    /// `<!-- ... -->`, text holds the whole comment.
    Comment,
    /// `<%-- ... --%>`, text holds the content between the delimiters.
    ServerComment,
    /// `<!DOCTYPE ...>`, text holds the whole declaration.
    DocType,

    // Tags
    TagOpen,       // <
    TagOpenSlash,  // </
    TagClose,      // >
    TagSlashClose, // />
    ElementNamespace,
    ElementName,
    Attribute,
    AttributeValue,

    // Code blocks
    Statement,        // <% %>
    Expression,       // <%= %>
    EvalExpression,   // <%# %>
    EncodeExpression, // <%: %>

    // Directives
    StartDirective, // <%@
    EndDirective,   // %>
}

/// A string value paired with the source range it was read from.
///
/// The value is always the verbatim source text of `range`, so sub-slices
/// can recompute exact positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TokenString {
    pub value: String,
    pub range: Range,
}

impl TokenString {
    pub fn new(value: impl Into<String>, range: Range) -> Self {
        Self {
            value: value.into(),
            range,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Case-insensitive (ASCII) comparison with `other`.
    pub fn eq_ignore_case(&self, other: &str) -> bool {
        self.value.eq_ignore_ascii_case(other)
    }

    /// The characters `start..end` with their own range.
    pub fn slice(&self, start: usize, end: usize) -> TokenString {
        let chars: Vec<char> = self.value.chars().collect();
        let end = end.min(chars.len());
        let start = start.min(end);
        let position_at = |index: usize| -> Position {
            (0..index).fold(self.range.start, |pos, i| {
                pos.advance(chars[i], chars.get(i + 1).copied())
            })
        };
        let begin = position_at(start);
        let finish = position_at(end);
        TokenString::new(
            chars[start..end].iter().collect::<String>(),
            Range::new(self.range.file.clone(), begin, finish),
        )
    }

    /// Split before the character at `index`.
    pub fn split_at(&self, index: usize) -> (TokenString, TokenString) {
        let len = self.value.chars().count();
        (self.slice(0, index), self.slice(index, len))
    }

    /// Strip leading and trailing whitespace, narrowing the range to match.
    pub fn trim(&self) -> TokenString {
        let chars: Vec<char> = self.value.chars().collect();
        let start = chars
            .iter()
            .position(|c| !c.is_whitespace())
            .unwrap_or(chars.len());
        let end = chars
            .iter()
            .rposition(|c| !c.is_whitespace())
            .map_or(start, |i| i + 1);
        self.slice(start, end)
    }
}

impl fmt::Display for TokenString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// A token produced by the lexer.
///
/// `range` covers the whole token including delimiters such as `<%=` and
/// `%>`; `text.range` covers only the text value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub range: Range,
    pub text: TokenString,
}

impl Token {
    pub fn new(kind: TokenKind, range: Range, text: TokenString) -> Self {
        Self { kind, range, text }
    }

    pub fn is_code(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Statement
                | TokenKind::Expression
                | TokenKind::EvalExpression
                | TokenKind::EncodeExpression
        )
    }
}

/// HTML5 void elements (never closed).
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta",
    "param", "source", "track", "wbr",
];

/// Lower-case tags always lexed as structured elements, even without `runat`.
pub const STRUCTURED_HTML_TAGS: &[&str] = &["html", "body", "head", "script", "style", "link", "img"];

/// Elements whose body is raw text.
pub const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Check if a tag name is an HTML5 void element.
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

pub fn is_raw_text_element(tag: &str) -> bool {
    RAW_TEXT_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

pub fn is_structured_html_tag(tag: &str) -> bool {
    STRUCTURED_HTML_TAGS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

/// Server control names are capitalized by convention, so an unmarked tag
/// whose local name starts with an upper-case letter is treated as a
/// server element. The prefix of `prefix:Name` is ignored.
pub fn looks_like_server_tag_name(tag: &str) -> bool {
    let local = tag.rsplit(':').next().unwrap_or(tag);
    local.chars().next().is_some_and(char::is_uppercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn string(value: &str) -> TokenString {
        let chars: Vec<char> = value.chars().collect();
        let start = Position::new(10, 2, 5);
        TokenString::new(
            value,
            Range::new(Arc::from("a.aspx"), start, start.advance_over(&chars)),
        )
    }

    #[test]
    fn test_split_namespace_prefix() {
        let name = string("asp:Label");
        let (prefix, rest) = name.split_at(3);
        let local = rest.slice(1, rest.value.chars().count());
        assert_eq!(prefix.value, "asp");
        assert_eq!(local.value, "Label");
        assert_eq!(local.range.start, Position::new(14, 2, 9));
        assert_eq!(local.range.end, name.range.end);
    }

    #[test]
    fn test_trim_narrows_range() {
        let code = string("  Name \n");
        let trimmed = code.trim();
        assert_eq!(trimmed.value, "Name");
        assert_eq!(trimmed.range.start, Position::new(12, 2, 7));
        assert_eq!(trimmed.range.end, Position::new(16, 2, 11));
    }

    #[test]
    fn test_trim_all_whitespace() {
        let trimmed = string(" \t ").trim();
        assert!(trimmed.is_empty());
        assert!(trimmed.range.is_empty());
    }

    #[test]
    fn test_slice_across_lines() {
        let text = string("a\r\nbc");
        let tail = text.slice(3, 5);
        assert_eq!(tail.value, "bc");
        assert_eq!(tail.range.start, Position::new(13, 3, 1));
    }

    #[test]
    fn test_void_elements_ignore_case() {
        assert!(is_void_element("br"));
        assert!(is_void_element("IMG"));
        assert!(!is_void_element("div"));
    }

    #[test]
    fn test_server_tag_name_heuristic() {
        assert!(looks_like_server_tag_name("Panel"));
        assert!(looks_like_server_tag_name("asp:Label"));
        assert!(!looks_like_server_tag_name("div"));
        assert!(!looks_like_server_tag_name("my:item"));
    }
}
