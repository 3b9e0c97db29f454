//! Web Forms markup lexer
//!
//! Tokenizes `.aspx`/`.ascx` templates: HTML interleaved with server
//! directives (`<%@ %>`), code blocks (`<% %>`, `<%= %>`, `<%: %>`, `<%# %>`),
//! server comments and `runat="server"` elements. Every token carries its
//! exact source range.
//!
//! Plain HTML passes through as `Text`; only server elements, a few
//! structural HTML tags and code blocks are broken into tokens.
//!
//! # Example
//!
//! ```
//! use webforms_lexer::{Lexer, TokenKind};
//!
//! let tokens = Lexer::tokenize("Default.aspx", "<p>Hi <%= Name %></p>");
//! assert_eq!(tokens.len(), 3);
//! assert_eq!(tokens[1].kind, TokenKind::Expression);
//! assert_eq!(tokens[1].text.value, "Name");
//! ```

pub mod lexer;
pub mod position;
pub mod token;

pub use lexer::Lexer;
pub use position::{Position, Range};
pub use token::{
    is_raw_text_element, is_structured_html_tag, is_void_element, looks_like_server_tag_name,
    Token, TokenKind, TokenString,
};
