//! Syntax tree for Web Forms markup.
//!
//! The parser produces one [`RootNode`] per file. Every node keeps its
//! source [`Range`] and a variable name that is unique within the file,
//! built from the enclosing container's name and a per-container counter
//! (`ctrl_0`, `ctrl_0_1`, ...), so generated identifiers stay stable.

use crate::resolver::{Converter, TypeRef};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use webforms_lexer::{Range, TokenString};

/// Variable name of the root container.
pub const ROOT_VAR: &str = "ctrl";

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Node {
    /// Literal markup, including passthrough HTML, comments and doctypes.
    Text(TextNode),
    /// `<%= %>`, `<%: %>` or `<%# %>`.
    Expression(ExpressionNode),
    /// `<% %>`
    Statement(StatementNode),
    Directive(DirectiveNode),
    /// A structured tag that is not a server control.
    Element(ElementNode),
    Control(ControlNode),
    Collection(CollectionNode),
}

impl Node {
    pub fn range(&self) -> &Range {
        match self {
            Node::Text(n) => &n.range,
            Node::Expression(n) => &n.range,
            Node::Statement(n) => &n.range,
            Node::Directive(n) => &n.range,
            Node::Element(n) => &n.range,
            Node::Control(n) => &n.range,
            Node::Collection(n) => &n.range,
        }
    }

    pub fn var_name(&self) -> &str {
        match self {
            Node::Text(n) => &n.var_name,
            Node::Expression(n) => &n.var_name,
            Node::Statement(n) => &n.var_name,
            Node::Directive(n) => &n.var_name,
            Node::Element(n) => &n.var_name,
            Node::Control(n) => &n.var_name,
            Node::Collection(n) => &n.var_name,
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element(n) => &n.children,
            Node::Control(n) => &n.children,
            Node::Collection(n) => &n.children,
            _ => &[],
        }
    }

    /// Visit this node and everything below it, template bodies included,
    /// in document order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        visit(self);
        let templates = match self {
            Node::Control(n) => n.members.templates.as_slice(),
            Node::Collection(n) => n.members.templates.as_slice(),
            _ => &[],
        };
        for template in templates {
            for child in &template.children {
                child.walk(visit);
            }
        }
        for child in self.children() {
            child.walk(visit);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextNode {
    pub range: Range,
    pub var_name: String,
    pub text: TokenString,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpressionNode {
    pub range: Range,
    pub var_name: String,
    /// Code between the delimiters, trimmed.
    pub text: TokenString,
    /// `<%# %>` data-binding expression.
    pub eval: bool,
    /// `<%: %>` HTML-encoded output.
    pub encode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementNode {
    pub range: Range,
    pub var_name: String,
    pub text: TokenString,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum DirectiveKind {
    Page,
    Control,
    Master,
    Register,
    Import,
    Other(String),
}

impl DirectiveKind {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "page" => Self::Page,
            "control" => Self::Control,
            "master" => Self::Master,
            "register" => Self::Register,
            "import" => Self::Import,
            _ => Self::Other(name.to_string()),
        }
    }

    /// Page, Control or Master: the directives that describe the file itself.
    pub fn is_main(&self) -> bool {
        matches!(self, Self::Page | Self::Control | Self::Master)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectiveNode {
    pub range: Range,
    pub var_name: String,
    pub kind: DirectiveKind,
    /// Attributes keyed by lower-case name, in source order.
    pub attributes: IndexMap<String, TokenString>,
}

impl DirectiveNode {
    pub fn attribute(&self, name: &str) -> Option<&TokenString> {
        self.attributes.get(&name.to_ascii_lowercase())
    }
}

/// `prefix:name` or `name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TagName {
    pub namespace: Option<TokenString>,
    pub name: TokenString,
}

impl TagName {
    pub fn prefix(&self) -> Option<&str> {
        self.namespace.as_ref().map(TokenString::as_str)
    }

    pub fn local(&self) -> &str {
        self.name.as_str()
    }

    /// Case-insensitive match of prefix and local name.
    pub fn matches(&self, other: &TagName) -> bool {
        let same_prefix = match (self.prefix(), other.prefix()) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            (None, None) => true,
            _ => false,
        };
        same_prefix && self.local().eq_ignore_ascii_case(other.local())
    }

    /// Range of the whole name, prefix included.
    pub fn range(&self) -> Range {
        match &self.namespace {
            Some(ns) => ns.range.to(&self.name.range),
            None => self.name.range.clone(),
        }
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.namespace {
            write!(f, "{prefix}:")?;
        }
        f.write_str(self.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementNode {
    pub range: Range,
    pub var_name: String,
    pub tag: TagName,
    pub attributes: Vec<AttributeNode>,
    pub self_closing: bool,
    pub children: Vec<Node>,
}

/// A server control with a resolved type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlNode {
    pub range: Range,
    pub var_name: String,
    pub tag: TagName,
    pub ty: TypeRef,
    /// Name of the generated page field, set for IDs outside templates.
    pub field_name: Option<String>,
    pub id: Option<TokenString>,
    pub members: Members,
    pub children: Vec<Node>,
}

/// A collection property filled by nested markup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionNode {
    pub range: Range,
    pub var_name: String,
    /// Member name as declared on the owning type.
    pub property: String,
    pub ty: TypeRef,
    pub members: Members,
    pub children: Vec<Node>,
}

/// A template property filled by an inline sub-tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateNode {
    pub range: Range,
    pub var_name: String,
    pub property: String,
    pub class_name: String,
    pub children: Vec<Node>,
}

/// Attribute bindings of a typed node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Members {
    pub properties: Vec<PropertyNode>,
    pub events: Vec<EventNode>,
    /// Raw attributes kept for types accepting arbitrary attributes.
    pub attributes: Vec<AttributeNode>,
    pub templates: Vec<TemplateNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyNode {
    /// Member name as declared on the type.
    pub name: String,
    pub ty: TypeRef,
    pub value: AttributeValue,
    pub converter: Option<Converter>,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventNode {
    pub name: String,
    pub handler: TokenString,
    pub range: Range,
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeNode {
    pub name: TokenString,
    pub value: Option<AttributeValue>,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ValuePart {
    Text(TokenString),
    Expression {
        text: TokenString,
        eval: bool,
        encode: bool,
    },
    Statement(TokenString),
}

impl ValuePart {
    pub fn token(&self) -> &TokenString {
        match self {
            ValuePart::Text(text) | ValuePart::Statement(text) => text,
            ValuePart::Expression { text, .. } => text,
        }
    }
}

/// An attribute value, split around embedded code blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttributeValue {
    pub parts: Vec<ValuePart>,
}

impl AttributeValue {
    pub fn text(text: TokenString) -> Self {
        Self {
            parts: vec![ValuePart::Text(text)],
        }
    }

    /// The literal value, or `None` if it contains code.
    pub fn as_text(&self) -> Option<String> {
        self.parts
            .iter()
            .map(|part| match part {
                ValuePart::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Option<Vec<&str>>>()
            .map(|parts| parts.concat())
    }

    /// The value's token when it is a single literal run.
    pub fn as_token(&self) -> Option<&TokenString> {
        match self.parts.as_slice() {
            [ValuePart::Text(text)] => Some(text),
            _ => None,
        }
    }

    pub fn has_code(&self) -> bool {
        self.parts.iter().any(|p| !matches!(p, ValuePart::Text(_)))
    }

    /// Range from the first part to the last.
    pub fn range(&self) -> Option<Range> {
        let first = self.parts.first()?.token();
        let last = self.parts.last()?.token();
        Some(first.range.to(&last.range))
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

/// `(path, content hash)` of an included file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IncludeFingerprint {
    pub path: String,
    pub hash: String,
}

/// A page field generated for a control with an `ID`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclaredField {
    pub name: String,
    pub ty: TypeRef,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateRef {
    pub class_name: String,
    pub property: String,
    pub range: Range,
}

/// Body of a `<script runat="server">` block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptBlock {
    pub range: Range,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RootNode {
    pub range: Range,
    pub language: Option<String>,
    /// Base type from the Page/Control directive; `None` if unresolved.
    pub inherits: Option<TypeRef>,
    pub namespace: Option<String>,
    pub imports: Vec<String>,
    pub includes: Vec<IncludeFingerprint>,
    pub fields: Vec<DeclaredField>,
    pub templates: Vec<TemplateRef>,
    pub scripts: Vec<ScriptBlock>,
    /// Property assignments from the Page/Control directive.
    pub properties: Vec<PropertyNode>,
    pub children: Vec<Node>,
}

impl RootNode {
    pub fn new(range: Range) -> Self {
        Self {
            range,
            language: None,
            inherits: None,
            namespace: None,
            imports: Vec::new(),
            includes: Vec::new(),
            fields: Vec::new(),
            templates: Vec::new(),
            scripts: Vec::new(),
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn add_import(&mut self, namespace: &str) {
        if !self.imports.iter().any(|i| i == namespace) {
            self.imports.push(namespace.to_string());
        }
    }

    /// Record an include; returns false if `path` was already recorded.
    pub fn add_include(&mut self, path: &str, hash: String) -> bool {
        if self.includes.iter().any(|i| i.path == path) {
            return false;
        }
        self.includes.push(IncludeFingerprint {
            path: path.to_string(),
            hash,
        });
        true
    }

    /// Forget everything that came from the node tree, keeping what the
    /// directives established.
    pub fn discard_tree(&mut self) {
        self.children.clear();
        self.fields.clear();
        self.templates.clear();
        self.scripts.clear();
        self.includes.clear();
    }

    pub fn field(&self, name: &str) -> Option<&DeclaredField> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Visit every node in document order, template bodies included.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// The control declared with `id`, wherever it is.
    pub fn find_control(&self, id: &str) -> Option<&ControlNode> {
        let mut found = None;
        self.walk(&mut |node| {
            if let Node::Control(control) = node {
                let matches = control
                    .id
                    .as_ref()
                    .is_some_and(|i| i.eq_ignore_case(id));
                if matches && found.is_none() {
                    found = Some(control);
                }
            }
        });
        found
    }
}
