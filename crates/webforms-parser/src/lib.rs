//! Web Forms markup parser
//!
//! Builds a typed control tree from `.aspx`/`.ascx` markup tokenized by
//! `webforms-lexer`. Server tags are resolved to types through a
//! [`TypeResolver`], attributes are bound to properties, events and IDs,
//! and directives, includes and tag registrations are applied along the
//! way. Problems become [`Diagnostic`]s; a parse always yields a tree.
//!
//! # Example
//!
//! ```
//! use webforms_parser::{MemoryFileResolver, ParseContext, ParserOptions, TypeCatalog};
//!
//! let options = ParserOptions::default();
//! let ctx = ParseContext::new(TypeCatalog::builtin(&options), MemoryFileResolver::new());
//! let output = ctx.parse(
//!     "Default.aspx",
//!     r#"<asp:Label runat="server" ID="Greeting" Text="Hi" />"#,
//! );
//! assert!(output.diagnostics.is_empty());
//! assert_eq!(output.root.fields[0].name, "Greeting");
//! ```

pub mod ast;
pub mod catalog;
pub mod diagnostics;
pub mod files;
pub mod known;
pub mod options;
mod parser;
pub mod registry;
pub mod resolver;

pub use ast::{
    AttributeNode, AttributeValue, CollectionNode, ControlNode, DirectiveKind, DirectiveNode,
    ElementNode, ExpressionNode, Node, RootNode, TemplateNode, TextNode, ValuePart,
};
pub use catalog::{TypeCatalog, TypeDef};
pub use diagnostics::{Diagnostic, DiagnosticCode, Severity};
pub use files::{FileResolver, FsFileResolver, MemoryFileResolver};
pub use options::ParserOptions;
pub use registry::ControlRegistry;
pub use resolver::{Member, TypeRef, TypeResolver};

use parser::{Outer, Parser, Session};
use rayon::prelude::*;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use webforms_lexer::{Position, Range};

/// Failure that aborts the parse of one file.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Result of parsing one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseOutput {
    pub root: RootNode,
    pub diagnostics: Vec<Diagnostic>,
    /// Registrations in effect at the end of the file.
    pub registry: ControlRegistry,
}

/// A file queued for [`ParseContext::parse_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub text: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// Resolvers and options shared by every parse.
#[derive(Clone)]
pub struct ParseContext {
    pub resolver: Arc<dyn TypeResolver>,
    pub files: Arc<dyn FileResolver>,
    pub options: ParserOptions,
}

impl ParseContext {
    pub fn new(resolver: impl TypeResolver + 'static, files: impl FileResolver + 'static) -> Self {
        Self {
            resolver: Arc::new(resolver),
            files: Arc::new(files),
            options: ParserOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    /// Parse `text` as the project file `path`.
    pub fn parse(&self, path: &str, text: &str) -> ParseOutput {
        self.parse_with_registry(path, text, ControlRegistry::with_defaults(&self.options))
    }

    /// Parse with registrations already in effect, e.g. project-wide ones.
    /// The built-in web controls prefix is always registered.
    pub fn parse_with_registry(
        &self,
        path: &str,
        text: &str,
        mut registry: ControlRegistry,
    ) -> ParseOutput {
        let file = files::resolve_reference("", path);
        registry.add_defaults(&self.options);
        log::debug!("parsing {file}");

        let mut session = Session::new(&file, text, registry, self);
        let parser = Parser::new(self, &file, text, ast::ROOT_VAR.to_string(), Outer::default());
        let result = panic::catch_unwind(AssertUnwindSafe(|| parser.run(&mut session)))
            .unwrap_or_else(|payload| {
                Err(CompileError::Internal {
                    message: panic_message(payload.as_ref()),
                })
            });

        match result {
            Ok((children, _)) => session.root.children = children,
            Err(error) => {
                log::warn!("{file}: {error}");
                session.root.discard_tree();
                let range = Range::empty(session.root.range.file.clone(), Position::start());
                session.diagnostics.report(
                    DiagnosticCode::SourceGeneratorException,
                    &range,
                    &[&error.to_string()],
                );
            }
        }

        ParseOutput {
            root: session.root,
            diagnostics: session.diagnostics.into_vec(),
            registry: session.registry,
        }
    }

    /// Parse independent files in parallel. Outputs are in input order.
    pub fn parse_batch(&self, sources: &[SourceFile]) -> Vec<ParseOutput> {
        sources
            .par_iter()
            .map(|source| self.parse(&source.path, &source.text))
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{GenericType, Member};
    use pretty_assertions::assert_eq;
    use std::io;

    /// Resolver whose lookups panic.
    struct Exploding;

    impl TypeResolver for Exploding {
        fn resolve(&self, _namespace: &str, name: &str) -> Option<TypeRef> {
            panic!("cannot resolve {name}")
        }

        fn resolve_generic(&self, _namespace: &str, _name: &str, _arity: usize) -> Option<GenericType> {
            None
        }

        fn member_of(&self, _ty: &TypeRef, _name: &str) -> Option<Member> {
            None
        }

        fn is_assignable_to(&self, _ty: &TypeRef, _interface: &str) -> bool {
            false
        }
    }

    /// Files that exist but cannot be read.
    struct Unreadable;

    impl FileResolver for Unreadable {
        fn exists(&self, _path: &str) -> bool {
            true
        }

        fn read_all_text(&self, path: &str) -> io::Result<String> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, path.to_string()))
        }
    }

    fn builtin() -> TypeCatalog {
        TypeCatalog::builtin(&ParserOptions::default())
    }

    #[test]
    fn test_panics_become_diagnostics() {
        let ctx = ParseContext::new(Exploding, MemoryFileResolver::new());
        let output = ctx.parse("a.aspx", "<%@ Page Inherits=\"X\" %>");
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].code, DiagnosticCode::SourceGeneratorException);
        assert!(output.diagnostics[0].args[0].contains("cannot resolve X"));
    }

    #[test]
    fn test_io_errors_become_diagnostics() {
        let ctx = ParseContext::new(builtin(), Unreadable);
        let output = ctx.parse("a.aspx", "<p>x</p><%-- #include file=\"b.inc\" --%>");
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].code, DiagnosticCode::SourceGeneratorException);
        assert!(output.diagnostics[0].args[0].starts_with("failed to read b.inc"));
    }

    #[test]
    fn test_failed_parse_keeps_no_partial_tree() {
        let ctx = ParseContext::new(builtin(), Unreadable);
        let output = ctx.parse(
            "a.aspx",
            "<%@ Page Language=\"C#\" %>\
             <asp:Repeater runat=\"server\" ID=\"R\"><ItemTemplate>x</ItemTemplate></asp:Repeater>\
             <%-- #include file=\"b.inc\" --%>",
        );
        assert_eq!(output.diagnostics.len(), 1);
        assert!(output.root.children.is_empty());
        assert!(output.root.fields.is_empty());
        assert!(output.root.templates.is_empty());
        assert!(output.root.includes.is_empty());
        assert_eq!(output.root.language.as_deref(), Some("C#"));
    }

    #[test]
    fn test_idempotent() {
        let ctx = ParseContext::new(builtin(), MemoryFileResolver::new());
        let text = "<%@ Page Colour=\"red\" %><asp:Label runat=\"server\" Text=\"<%# Item %>\" />";
        assert_eq!(ctx.parse("a.aspx", text), ctx.parse("a.aspx", text));
    }

    #[test]
    fn test_seeded_registry() {
        let ctx = ParseContext::new(builtin(), MemoryFileResolver::new());
        let mut registry = ControlRegistry::new();
        registry
            .add_control("uc", "Nav", TypeRef::new("WebForms.UI", "UserControl"))
            .unwrap();
        let output = ctx.parse_with_registry("a.aspx", "<uc:Nav runat=\"server\" />", registry);
        assert!(output.diagnostics.is_empty());
        assert!(output.registry.has_prefix("asp"));
    }

    #[test]
    fn test_batch_keeps_order() {
        let ctx = ParseContext::new(builtin(), MemoryFileResolver::new());
        let sources: Vec<SourceFile> = (0..8)
            .map(|i| SourceFile::new(format!("p{i}.aspx"), format!("<%@ Page Language=\"L{i}\" %>")))
            .collect();
        let outputs = ctx.parse_batch(&sources);
        let languages: Vec<String> = outputs
            .iter()
            .filter_map(|o| o.root.language.clone())
            .collect();
        let expected: Vec<String> = (0..8).map(|i| format!("L{i}")).collect();
        assert_eq!(languages, expected);
    }

    #[test]
    fn test_default_namespace_option() {
        let options = ParserOptions::from_json(r#"{ "defaultNamespace": "Site" }"#).unwrap();
        let ctx = ParseContext::new(builtin(), MemoryFileResolver::new()).with_options(options);
        let output = ctx.parse("a.aspx", "<%@ Page %>");
        assert_eq!(output.root.namespace.as_deref(), Some("Site"));
    }
}
