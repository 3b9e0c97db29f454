//! Tree builder for Web Forms markup.
//!
//! Pulls tokens from a [`Lexer`] and maintains a stack of open
//! containers. Tags are classified as templates, collections, server
//! controls or plain elements; attributes of typed nodes are bound to
//! members through the [`TypeResolver`](crate::resolver::TypeResolver).
//! Problems are reported to the shared `Session` and never stop the pass.
//!
//! Included files are parsed by a nested `Parser` over a fresh lexer that
//! shares the same `Session`, and their nodes are spliced into the
//! container that was open at the include point.

use crate::ast::{
    AttributeNode, AttributeValue, CollectionNode, ControlNode, DeclaredField, DirectiveKind,
    DirectiveNode, ElementNode, EventNode, ExpressionNode, Members, Node, PropertyNode, RootNode,
    ScriptBlock, StatementNode, TagName, TemplateNode, TemplateRef, TextNode, ValuePart,
};
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::files::{content_hash, resolve_reference};
use crate::known::{html_control_for, is_ignored_page_attribute};
use crate::registry::ControlRegistry;
use crate::resolver::{MemberKind, TypeRef, ATTRIBUTE_ACCESSOR};
use crate::{CompileError, ParseContext};
use indexmap::IndexMap;
use webforms_lexer::{is_void_element, Lexer, Position, Range, Token, TokenKind, TokenString};

/// State shared by a top-level parse and all of its includes.
#[derive(Debug)]
pub(crate) struct Session {
    pub root: RootNode,
    pub diagnostics: Diagnostics,
    pub registry: ControlRegistry,
    /// Files currently being parsed, outermost first.
    include_stack: Vec<String>,
    main_directive_seen: bool,
}

impl Session {
    pub fn new(file: &str, text: &str, registry: ControlRegistry, ctx: &ParseContext) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let range = Range::new(
            file.into(),
            Position::start(),
            Position::start().advance_over(&chars),
        );
        let mut root = RootNode::new(range);
        for namespace in &ctx.options.default_imports {
            root.add_import(namespace);
        }
        root.namespace = ctx.options.default_namespace.clone();
        Self {
            root,
            diagnostics: Diagnostics::new(),
            registry,
            include_stack: vec![file.to_string()],
            main_directive_seen: false,
        }
    }
}

/// Context inherited by the root container of an included file.
#[derive(Debug, Clone, Default)]
pub(crate) struct Outer {
    ty: Option<TypeRef>,
    collection: bool,
    template: bool,
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

enum Open {
    Root {
        children: Vec<Node>,
        templates: Vec<TemplateNode>,
    },
    Element(ElementNode),
    Control(ControlNode),
    Collection(CollectionNode),
    Template(TemplateNode),
}

impl Open {
    fn push(&mut self, node: Node) {
        match self {
            Open::Root { children, .. } => children.push(node),
            Open::Element(n) => n.children.push(node),
            Open::Control(n) => n.children.push(node),
            Open::Collection(n) => n.children.push(node),
            Open::Template(n) => n.children.push(node),
        }
    }

    fn add_template(&mut self, template: TemplateNode) {
        match self {
            Open::Root { templates, .. } => templates.push(template),
            Open::Control(n) => n.members.templates.push(template),
            Open::Collection(n) => n.members.templates.push(template),
            Open::Element(n) => n.children.extend(template.children),
            Open::Template(n) => n.children.extend(template.children),
        }
    }

    fn set_end(&mut self, end: Position) {
        match self {
            Open::Root { .. } => {}
            Open::Element(n) => n.range.end = end,
            Open::Control(n) => n.range.end = end,
            Open::Collection(n) => n.range.end = end,
            Open::Template(n) => n.range.end = end,
        }
    }
}

struct Container {
    open: Open,
    tag: Option<TagName>,
    var_name: String,
    next_id: usize,
}

impl Container {
    fn new(open: Open, tag: Option<TagName>, var_name: String) -> Self {
        Self {
            open,
            tag,
            var_name,
            next_id: 0,
        }
    }
}

/// How a start tag ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagEnd {
    Open,
    SelfClosing,
    Unterminated,
}

struct StartTag {
    tag: TagName,
    attributes: Vec<AttributeNode>,
    end: TagEnd,
    range: Range,
}

impl StartTag {
    fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name.eq_ignore_case(name))
    }
}

// ---------------------------------------------------------------------------
// Binding targets
// ---------------------------------------------------------------------------

/// A typed node whose attributes bind to members of its type.
trait Bindable {
    fn ty(&self) -> &TypeRef;
    fn var_name(&self) -> &str;
    fn members_mut(&mut self) -> &mut Members;
    fn children_mut(&mut self) -> &mut Vec<Node>;
    fn can_declare_id(&self) -> bool;
    fn set_id(&mut self, id: TokenString, field_name: Option<String>);
}

impl Bindable for ControlNode {
    fn ty(&self) -> &TypeRef {
        &self.ty
    }

    fn var_name(&self) -> &str {
        &self.var_name
    }

    fn members_mut(&mut self) -> &mut Members {
        &mut self.members
    }

    fn children_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    fn can_declare_id(&self) -> bool {
        true
    }

    fn set_id(&mut self, id: TokenString, field_name: Option<String>) {
        self.id = Some(id);
        self.field_name = field_name;
    }
}

impl Bindable for CollectionNode {
    fn ty(&self) -> &TypeRef {
        &self.ty
    }

    fn var_name(&self) -> &str {
        &self.var_name
    }

    fn members_mut(&mut self) -> &mut Members {
        &mut self.members
    }

    fn children_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    fn can_declare_id(&self) -> bool {
        false
    }

    fn set_id(&mut self, _id: TokenString, _field_name: Option<String>) {}
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

pub(crate) struct Parser<'a> {
    ctx: &'a ParseContext,
    lexer: Lexer,
    root: Container,
    stack: Vec<Container>,
    outer: Outer,
    last_end: Position,
}

impl<'a> Parser<'a> {
    pub fn new(ctx: &'a ParseContext, file: &str, text: &str, root_var: String, outer: Outer) -> Self {
        let root = Open::Root {
            children: Vec::new(),
            templates: Vec::new(),
        };
        Self {
            ctx,
            lexer: Lexer::new(file, text),
            root: Container::new(root, None, root_var),
            stack: Vec::new(),
            outer,
            last_end: Position::start(),
        }
    }

    /// Parse the whole file. Returns the top-level nodes and any templates
    /// opened directly at the top level of an included file.
    pub fn run(mut self, session: &mut Session) -> Result<(Vec<Node>, Vec<TemplateNode>), CompileError> {
        while let Some(token) = self.next() {
            match token.kind {
                TokenKind::Text | TokenKind::Comment | TokenKind::DocType => {
                    self.push_text(token.text);
                }
                TokenKind::ServerComment => self.server_comment(&token, session)?,
                TokenKind::Statement
                | TokenKind::Expression
                | TokenKind::EvalExpression
                | TokenKind::EncodeExpression => {
                    let var_name = self.new_var();
                    self.current_mut().open.push(code_node(token, var_name));
                }
                TokenKind::StartDirective => self.directive(&token, session)?,
                TokenKind::TagOpen => self.open_tag(&token, session),
                TokenKind::TagOpenSlash => self.close_tag(&token, session),
                kind => log::trace!("{}: skipping stray {kind:?}", token.range),
            }
        }

        // Unclosed containers end with the input.
        while !self.stack.is_empty() {
            self.close_container(self.last_end, session);
        }

        match self.root.open {
            Open::Root {
                children,
                templates,
            } => Ok((children, templates)),
            _ => Err(CompileError::Internal {
                message: "root container replaced".into(),
            }),
        }
    }

    // =========================================================================
    // Token access and containers
    // =========================================================================

    fn next(&mut self) -> Option<Token> {
        let token = self.lexer.next_token()?;
        self.last_end = token.range.end;
        Some(token)
    }

    fn peek_kind(&mut self) -> Option<TokenKind> {
        self.lexer.peek_kind(0)
    }

    fn peek_is_code(&mut self) -> bool {
        self.lexer.peek(0).is_some_and(Token::is_code)
    }

    fn file(&self) -> &str {
        self.lexer.file()
    }

    fn range(&self, start: Position, end: Position) -> Range {
        Range::new(self.lexer.file().clone(), start, end)
    }

    fn current(&self) -> &Container {
        self.stack.last().unwrap_or(&self.root)
    }

    fn current_mut(&mut self) -> &mut Container {
        self.stack.last_mut().unwrap_or(&mut self.root)
    }

    /// Next variable name in the current container.
    fn new_var(&mut self) -> String {
        let container = self.current_mut();
        let name = format!("{}_{}", container.var_name, container.next_id);
        container.next_id += 1;
        name
    }

    /// Type of the immediately enclosing typed node, and whether it is a
    /// collection.
    fn enclosing(&self) -> (Option<TypeRef>, bool) {
        match &self.current().open {
            Open::Control(n) => (Some(n.ty.clone()), false),
            Open::Collection(n) => (Some(n.ty.clone()), true),
            Open::Root { .. } if self.stack.is_empty() => {
                (self.outer.ty.clone(), self.outer.collection)
            }
            _ => (None, false),
        }
    }

    fn in_template(&self) -> bool {
        self.outer.template
            || self
                .stack
                .iter()
                .any(|c| matches!(c.open, Open::Template(_)))
    }

    fn push_text(&mut self, text: TokenString) {
        let var_name = self.new_var();
        self.current_mut().open.push(Node::Text(TextNode {
            range: text.range.clone(),
            var_name,
            text,
        }));
    }

    /// Either push `open` as the new current container or, when the tag
    /// has no body, attach it to the current one right away.
    fn enter(&mut self, open: Open, start: StartTag, has_body: bool, session: &mut Session) {
        let var_name = match &open {
            Open::Element(n) => n.var_name.clone(),
            Open::Control(n) => n.var_name.clone(),
            Open::Collection(n) => n.var_name.clone(),
            Open::Template(n) => n.var_name.clone(),
            Open::Root { .. } => String::new(),
        };
        let container = Container::new(open, Some(start.tag), var_name);
        if has_body {
            self.stack.push(container);
        } else {
            self.attach(container, session);
        }
    }

    fn close_container(&mut self, end: Position, session: &mut Session) {
        if let Some(mut container) = self.stack.pop() {
            container.open.set_end(end);
            self.attach(container, session);
        }
    }

    fn attach(&mut self, container: Container, session: &mut Session) {
        let node = match container.open {
            Open::Element(n) => Node::Element(n),
            Open::Control(n) => Node::Control(n),
            Open::Collection(n) => Node::Collection(n),
            Open::Template(template) => {
                session.root.templates.push(TemplateRef {
                    class_name: template.class_name.clone(),
                    property: template.property.clone(),
                    range: template.range.clone(),
                });
                self.current_mut().open.add_template(template);
                return;
            }
            Open::Root { children, .. } => {
                for child in children {
                    self.current_mut().open.push(child);
                }
                return;
            }
        };
        self.current_mut().open.push(node);
    }

    // =========================================================================
    // Tags
    // =========================================================================

    fn read_tag_name(&mut self) -> Option<TagName> {
        let namespace = if self.peek_kind() == Some(TokenKind::ElementNamespace) {
            self.next().map(|t| t.text)
        } else {
            None
        };
        if self.peek_kind() != Some(TokenKind::ElementName) {
            return None;
        }
        let name = self.next()?.text;
        Some(TagName { namespace, name })
    }

    fn read_start_tag(&mut self, open: &Token) -> Option<StartTag> {
        let tag = self.read_tag_name()?;
        let mut attributes = Vec::new();
        let end = loop {
            if self.peek_is_code() {
                // Code between attributes has nowhere to go.
                if let Some(token) = self.next() {
                    log::trace!("{}: dropping code inside tag {}", token.range, tag);
                }
                continue;
            }
            match self.peek_kind() {
                Some(TokenKind::Attribute) => {
                    let Some(name) = self.next().map(|t| t.text) else {
                        break TagEnd::Unterminated;
                    };
                    let value = self.read_attribute_value();
                    let range = match value.as_ref().and_then(AttributeValue::range) {
                        Some(value_range) => name.range.to(&value_range),
                        None => name.range.clone(),
                    };
                    attributes.push(AttributeNode { name, value, range });
                }
                Some(TokenKind::TagClose) => {
                    self.next();
                    break TagEnd::Open;
                }
                Some(TokenKind::TagSlashClose) => {
                    self.next();
                    break TagEnd::SelfClosing;
                }
                _ => break TagEnd::Unterminated,
            }
        };
        let range = self.range(open.range.start, self.last_end);
        Some(StartTag {
            tag,
            attributes,
            end,
            range,
        })
    }

    fn read_attribute_value(&mut self) -> Option<AttributeValue> {
        let mut parts = Vec::new();
        loop {
            if self.peek_kind() == Some(TokenKind::AttributeValue) {
                if let Some(token) = self.next() {
                    parts.push(ValuePart::Text(token.text));
                }
            } else if self.peek_is_code() {
                if let Some(token) = self.next() {
                    parts.push(value_part(token));
                }
            } else {
                break;
            }
        }
        (!parts.is_empty()).then_some(AttributeValue { parts })
    }

    fn open_tag(&mut self, open: &Token, session: &mut Session) {
        let Some(start) = self.read_start_tag(open) else {
            return;
        };
        let local = start.tag.local().to_string();
        let has_body =
            start.end == TagEnd::Open && (start.tag.namespace.is_some() || !is_void_element(&local));
        let runat = start.has_attribute("runat");
        let (enclosing, in_collection) = self.enclosing();

        if start.tag.namespace.is_none() {
            let member = enclosing
                .as_ref()
                .and_then(|owner| self.ctx.resolver.member_of(owner, &local));
            if let Some(member) = member {
                if member.is_template() {
                    let var_name = self.new_var();
                    let template = TemplateNode {
                        range: start.range.clone(),
                        class_name: format!("Template_{var_name}"),
                        var_name,
                        property: member.name,
                        children: Vec::new(),
                    };
                    self.enter(Open::Template(template), start, has_body, session);
                    return;
                }
                if member.is_collection() {
                    let mut collection = CollectionNode {
                        range: start.range.clone(),
                        var_name: self.new_var(),
                        property: member.name,
                        ty: member.ty,
                        members: Default::default(),
                        children: Vec::new(),
                    };
                    let attributes = start.attributes.clone();
                    self.bind_attributes(&mut collection, attributes, session);
                    self.enter(Open::Collection(collection), start, has_body, session);
                    return;
                }
            }

            if runat && local.eq_ignore_ascii_case("script") {
                self.script_block(start, session);
                return;
            }
        }

        if runat || (start.tag.namespace.is_some() && in_collection) {
            let mut attributes = start.attributes.clone();
            let ty = self.resolve_control_type(&start.tag, &mut attributes, session);
            let mut control = ControlNode {
                range: start.range.clone(),
                var_name: self.new_var(),
                tag: start.tag.clone(),
                ty,
                field_name: None,
                id: None,
                members: Default::default(),
                children: Vec::new(),
            };
            self.bind_attributes(&mut control, attributes, session);
            self.enter(Open::Control(control), start, has_body, session);
            return;
        }

        let element = ElementNode {
            range: start.range.clone(),
            var_name: self.new_var(),
            tag: start.tag.clone(),
            attributes: start.attributes.clone(),
            self_closing: start.end == TagEnd::SelfClosing,
            children: Vec::new(),
        };
        self.enter(Open::Element(element), start, has_body, session);
    }

    fn close_tag(&mut self, open: &Token, session: &mut Session) {
        let Some(tag) = self.read_tag_name() else {
            return;
        };
        if self.peek_kind() == Some(TokenKind::TagClose) {
            self.next();
        }
        let end = self.last_end;

        let Some(expected) = self.stack.last().and_then(|c| c.tag.clone()) else {
            log::trace!("{}: closing tag {tag} with nothing open", open.range);
            return;
        };
        if !expected.matches(&tag) {
            session.diagnostics.report(
                DiagnosticCode::UnexpectedClosingTag,
                &tag.range(),
                &[&tag.to_string(), &expected.to_string()],
            );
        }
        self.close_container(end, session);
    }

    /// `<script runat="server">`: the body goes to the root's script
    /// blocks instead of the tree.
    fn script_block(&mut self, start: StartTag, session: &mut Session) {
        let mut children = Vec::new();
        let base = self.new_var();
        let mut end = start.range.end;

        if start.end == TagEnd::Open {
            while let Some(kind) = self.peek_kind() {
                let Some(token) = self.next() else {
                    break;
                };
                let var_name = format!("{base}_{}", children.len());
                match kind {
                    TokenKind::TagOpenSlash => {
                        self.read_tag_name();
                        if self.peek_kind() == Some(TokenKind::TagClose) {
                            self.next();
                        }
                        break;
                    }
                    TokenKind::Text => children.push(Node::Text(TextNode {
                        range: token.text.range.clone(),
                        var_name,
                        text: token.text,
                    })),
                    _ if token.is_code() => children.push(code_node(token, var_name)),
                    _ => log::trace!("{}: skipping {kind:?} in script block", token.range),
                }
            }
            end = self.last_end;
        }

        session.root.scripts.push(ScriptBlock {
            range: self.range(start.range.start, end),
            children,
        });
    }

    // =========================================================================
    // Type resolution
    // =========================================================================

    /// Resolve a possibly unqualified type name against the global
    /// namespace and then each import.
    fn resolve_type_name(&self, name: &str, session: &Session) -> Option<TypeRef> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        std::iter::once(name.to_string())
            .chain(session.root.imports.iter().map(|ns| format!("{ns}.{name}")))
            .find_map(|candidate| {
                let ty = TypeRef::parse(&candidate);
                self.ctx.resolver.resolve(&ty.namespace, &ty.name)
            })
    }

    fn generic_html_control(&self) -> TypeRef {
        let options = &self.ctx.options;
        self.ctx
            .resolver
            .resolve(&options.html_controls_namespace, &options.generic_html_control)
            .unwrap_or_else(|| {
                TypeRef::new(&options.html_controls_namespace, &options.generic_html_control)
            })
    }

    /// Type of a server control tag. Registered user controls win, then a
    /// generic type constructed from `ItemType`, then the namespaces
    /// registered for the prefix. Unresolved tags fall back to the generic
    /// HTML control. A consumed `ItemType` attribute is removed.
    fn resolve_control_type(
        &self,
        tag: &TagName,
        attributes: &mut Vec<AttributeNode>,
        session: &mut Session,
    ) -> TypeRef {
        let local = tag.local();
        let Some(prefix) = tag.prefix() else {
            let options = &self.ctx.options;
            return html_control_for(local)
                .and_then(|name| {
                    self.ctx
                        .resolver
                        .resolve(&options.html_controls_namespace, name)
                })
                .unwrap_or_else(|| self.generic_html_control());
        };

        if let Some(ty) = session.registry.control(prefix, local) {
            return ty.clone();
        }

        let namespaces = session.registry.namespaces(prefix).to_vec();
        if namespaces.is_empty() {
            session.diagnostics.report(
                DiagnosticCode::ControlNotFound,
                &tag.range(),
                &[&tag.to_string()],
            );
            log::debug!("{}: using generic control for {tag}", tag.range());
            return self.generic_html_control();
        }

        if let Some(index) = attributes
            .iter()
            .position(|a| a.name.eq_ignore_case("itemtype"))
        {
            let item = attributes[index]
                .value
                .as_ref()
                .and_then(AttributeValue::as_text)
                .and_then(|name| self.resolve_type_name(&name, session));
            if let Some(item) = item {
                let generic = namespaces
                    .iter()
                    .find_map(|ns| self.ctx.resolver.resolve_generic(ns, local, 1));
                if let Some(generic) = generic {
                    attributes.remove(index);
                    return self.ctx.resolver.construct_generic(&generic, vec![item]);
                }
            }
        }

        if let Some(ty) = namespaces
            .iter()
            .find_map(|ns| self.ctx.resolver.resolve(ns, local))
        {
            return ty;
        }

        session.diagnostics.report(
            DiagnosticCode::TypeNotFoundInNamespace,
            &tag.range(),
            &[local, &namespaces.join(", ")],
        );
        log::debug!("{}: using generic control for {tag}", tag.range());
        self.generic_html_control()
    }

    // =========================================================================
    // Attribute binding
    // =========================================================================

    fn bind_attributes(
        &self,
        node: &mut impl Bindable,
        attributes: Vec<AttributeNode>,
        session: &mut Session,
    ) {
        for attribute in attributes {
            let key = attribute.name.as_str();
            if key.eq_ignore_ascii_case("runat") {
                continue;
            }
            if key.contains('-') && self.is_collection_chain(node.ty(), key) {
                let segments: Vec<String> = key.split('-').map(str::to_string).collect();
                self.bind_chain(node, &segments, attribute, session);
                continue;
            }
            if self.bind_event(node, &attribute, session) {
                continue;
            }
            if key.eq_ignore_ascii_case("id") && self.bind_id(node, &attribute, session) {
                continue;
            }
            self.bind_property(node, attribute, session);
        }
    }

    /// Whether every segment of `a-b-c` but the last names a collection
    /// property, starting from `ty`.
    fn is_collection_chain(&self, ty: &TypeRef, key: &str) -> bool {
        let segments: Vec<&str> = key.split('-').collect();
        let Some((_, path)) = segments.split_last() else {
            return false;
        };
        let mut ty = ty.clone();
        for segment in path {
            match self.ctx.resolver.member_of(&ty, segment) {
                Some(member) if member.is_collection() => ty = member.ty,
                _ => return false,
            }
        }
        true
    }

    /// Bind the last segment of a hyphenated key through nested
    /// collection nodes, reusing ones created by earlier attributes.
    fn bind_chain(
        &self,
        node: &mut impl Bindable,
        segments: &[String],
        attribute: AttributeNode,
        session: &mut Session,
    ) {
        let [head, rest @ ..] = segments else {
            return;
        };
        if rest.is_empty() {
            let total = attribute.name.value.chars().count();
            let leaf_start = total - head.chars().count();
            let leaf = AttributeNode {
                name: attribute.name.slice(leaf_start, total),
                ..attribute
            };
            self.bind_property(node, leaf, session);
            return;
        }

        let Some(member) = self.ctx.resolver.member_of(node.ty(), head) else {
            return;
        };
        let var_name = format!("{}_{}", node.var_name(), member.name);
        let children = node.children_mut();
        let existing = children
            .iter()
            .position(|c| matches!(c, Node::Collection(c) if c.property == member.name));
        let index = match existing {
            Some(index) => index,
            None => {
                children.push(Node::Collection(CollectionNode {
                    range: attribute.range.clone(),
                    var_name,
                    property: member.name,
                    ty: member.ty,
                    members: Default::default(),
                    children: Vec::new(),
                }));
                children.len() - 1
            }
        };
        if let Some(Node::Collection(collection)) = children.get_mut(index) {
            self.bind_chain(collection, rest, attribute, session);
        }
    }

    /// `OnEvent="Handler"`. Only binds when the page can have the handler;
    /// otherwise the key is left to regular binding.
    fn bind_event(&self, node: &mut impl Bindable, attribute: &AttributeNode, session: &Session) -> bool {
        let key = attribute.name.as_str();
        let Some(event) = key
            .get(..2)
            .filter(|p| p.eq_ignore_ascii_case("on"))
            .and_then(|_| key.get(2..))
            .filter(|e| !e.is_empty())
        else {
            return false;
        };
        let Some(member) = self
            .ctx
            .resolver
            .member_of(node.ty(), event)
            .filter(|m| m.kind == MemberKind::Event)
        else {
            return false;
        };
        let Some(handler) = attribute.value.as_ref().and_then(AttributeValue::as_token) else {
            return false;
        };
        if !self.handler_exists(handler.as_str(), session) {
            return false;
        }
        node.members_mut().events.push(EventNode {
            name: member.name,
            handler: handler.trim(),
            range: attribute.range.clone(),
        });
        true
    }

    fn handler_exists(&self, handler: &str, session: &Session) -> bool {
        let root = &session.root;
        match &root.inherits {
            None => true,
            Some(_) if !root.scripts.is_empty() => true,
            Some(page) => self
                .ctx
                .resolver
                .member_of(page, handler.trim())
                .is_some_and(|m| m.kind == MemberKind::Method),
        }
    }

    fn bind_id(&self, node: &mut impl Bindable, attribute: &AttributeNode, session: &mut Session) -> bool {
        let writable = self
            .ctx
            .resolver
            .member_of(node.ty(), "ID")
            .is_some_and(|m| m.is_writable_property());
        if !writable || !node.can_declare_id() {
            return false;
        }
        let Some(id) = attribute.value.as_ref().and_then(AttributeValue::as_token) else {
            return false;
        };
        let id = id.trim();
        if id.value.is_empty() {
            return false;
        }

        let mut field_name = None;
        if !self.in_template() {
            if session.root.field(id.as_str()).is_some() {
                session.diagnostics.report(
                    DiagnosticCode::DuplicateControlId,
                    &id.range,
                    &[id.as_str()],
                );
            } else {
                field_name = Some(id.value.clone());
                session.root.fields.push(DeclaredField {
                    name: id.value.clone(),
                    ty: node.ty().clone(),
                    range: id.range.clone(),
                });
            }
        }
        node.set_id(id, field_name);
        true
    }

    fn bind_property(&self, node: &mut impl Bindable, attribute: AttributeNode, session: &mut Session) {
        let ty = node.ty().clone();
        let member = self
            .ctx
            .resolver
            .member_of(&ty, attribute.name.as_str())
            .filter(|m| m.is_writable_property());
        if let Some(member) = member {
            node.members_mut().properties.push(PropertyNode {
                name: member.name,
                ty: member.ty,
                value: attribute.value.unwrap_or_default(),
                converter: member.converter,
                range: attribute.range,
            });
        } else if self.ctx.resolver.is_assignable_to(&ty, ATTRIBUTE_ACCESSOR) {
            node.members_mut().attributes.push(attribute);
        } else {
            session.diagnostics.report(
                DiagnosticCode::PropertyNotFound,
                &attribute.name.range,
                &[&ty.full_name(), attribute.name.as_str()],
            );
        }
    }

    // =========================================================================
    // Directives
    // =========================================================================

    fn directive(&mut self, start: &Token, session: &mut Session) -> Result<(), CompileError> {
        let mut kind = None;
        let mut attributes: Vec<(TokenString, TokenString)> = Vec::new();

        loop {
            match self.peek_kind() {
                Some(TokenKind::Attribute) => {
                    let Some(name) = self.next().map(|t| t.text) else {
                        break;
                    };
                    let value = self.read_attribute_value();
                    match value {
                        None if kind.is_none() && attributes.is_empty() => {
                            kind = Some(DirectiveKind::from_name(name.as_str()));
                        }
                        value => {
                            let value = directive_value(&name, value);
                            attributes.push((name, value));
                        }
                    }
                }
                Some(TokenKind::EndDirective) => {
                    self.next();
                    break;
                }
                _ => break,
            }
        }

        let kind = kind.unwrap_or(DirectiveKind::Page);
        let range = self.range(start.range.start, self.last_end);
        let node = DirectiveNode {
            range: range.clone(),
            var_name: self.new_var(),
            kind: kind.clone(),
            attributes: attributes
                .iter()
                .map(|(name, value)| (name.value.to_ascii_lowercase(), value.clone()))
                .collect::<IndexMap<_, _>>(),
        };
        self.current_mut().open.push(Node::Directive(node));

        match kind {
            kind if kind.is_main() && !session.main_directive_seen => {
                self.main_directive(&kind, &attributes, session);
            }
            DirectiveKind::Register => self.register(&attributes, &range, session)?,
            DirectiveKind::Import => {
                if let Some(namespace) = find_attribute(&attributes, "namespace") {
                    session.root.add_import(namespace.as_str().trim());
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// The first Page, Control or Master directive.
    fn main_directive(
        &self,
        kind: &DirectiveKind,
        attributes: &[(TokenString, TokenString)],
        session: &mut Session,
    ) {
        session.main_directive_seen = true;
        let options = &self.ctx.options;

        if let Some(language) = find_attribute(attributes, "language") {
            session.root.language = Some(language.value.clone());
        }

        let base = match find_attribute(attributes, "inherits") {
            Some(inherits) => {
                let resolved = self.resolve_type_name(inherits.as_str(), session);
                match resolved {
                    Some(ty) => {
                        if !ty.namespace.is_empty() {
                            session.root.namespace = Some(ty.namespace.clone());
                        }
                        Some(ty)
                    }
                    None => {
                        session.diagnostics.report(
                            DiagnosticCode::InheritNotFound,
                            &inherits.range,
                            &[inherits.as_str()],
                        );
                        None
                    }
                }
            }
            None if *kind == DirectiveKind::Control => Some(TypeRef::parse(&options.control_base_type)),
            None => Some(TypeRef::parse(&options.page_base_type)),
        };

        if let Some(base) = &base {
            for (name, value) in attributes {
                if is_ignored_page_attribute(name.as_str()) {
                    continue;
                }
                let member = self
                    .ctx
                    .resolver
                    .member_of(base, name.as_str())
                    .filter(|m| m.is_writable_property());
                match member {
                    Some(member) => session.root.properties.push(PropertyNode {
                        name: member.name,
                        ty: member.ty,
                        value: AttributeValue::text(value.clone()),
                        converter: member.converter,
                        range: name.range.to(&value.range),
                    }),
                    None => session.diagnostics.report(
                        DiagnosticCode::PropertyNotFound,
                        &name.range,
                        &[&base.full_name(), name.as_str()],
                    ),
                }
            }
        }
        session.root.inherits = base;
    }

    fn register(
        &self,
        attributes: &[(TokenString, TokenString)],
        range: &Range,
        session: &mut Session,
    ) -> Result<(), CompileError> {
        let Some(prefix) = find_attribute(attributes, "tagprefix") else {
            return Ok(());
        };
        let prefix = prefix.as_str().trim();

        if let Some(namespace) = find_attribute(attributes, "namespace") {
            log::debug!("{range}: registering prefix {prefix} for {namespace}");
            session.registry.add_namespace(prefix, namespace.as_str().trim());
            return Ok(());
        }

        let (Some(name), Some(src)) = (
            find_attribute(attributes, "tagname"),
            find_attribute(attributes, "src"),
        ) else {
            return Ok(());
        };
        let name = name.as_str().trim();
        let tag = format!("{prefix}:{name}");
        let path = resolve_reference(self.file(), src.as_str());

        let ty = if self.ctx.files.exists(&path) {
            let text = self
                .ctx
                .files
                .read_all_text(&path)
                .map_err(|source| CompileError::Io {
                    path: path.clone(),
                    source,
                })?;
            Some(self.declared_base_type(&path, &text, session))
        } else {
            self.ctx.resolver.resolve_view(&path)
        };

        let Some(ty) = ty else {
            session
                .diagnostics
                .report(DiagnosticCode::ControlNotFound, &src.range, &[&tag]);
            return Ok(());
        };
        log::debug!("{range}: registering {tag} as {ty} from {path}");
        if let Err(existing) = session.registry.add_control(prefix, name, ty.clone()) {
            session.diagnostics.report(
                DiagnosticCode::DuplicateControlRegister,
                range,
                &[&tag, &existing.full_name(), &ty.full_name()],
            );
        }
        Ok(())
    }

    /// Base type declared by a user control file's Control directive,
    /// defaulting to the user control base type.
    fn declared_base_type(&self, path: &str, text: &str, session: &Session) -> TypeRef {
        let mut lexer = Lexer::new(path, text);
        while let Some(token) = lexer.next_token() {
            if token.kind != TokenKind::StartDirective {
                continue;
            }
            let mut kind = None;
            let mut inherits = None;
            while let Some(token) = lexer.next_token() {
                match token.kind {
                    TokenKind::Attribute if kind.is_none() => {
                        let bare = lexer.peek_kind(0) != Some(TokenKind::AttributeValue);
                        kind = Some(if bare {
                            DirectiveKind::from_name(token.text.as_str())
                        } else {
                            DirectiveKind::Page
                        });
                        if !bare && token.text.eq_ignore_case("inherits") {
                            inherits = lexer.next_token().map(|t| t.text);
                        }
                    }
                    TokenKind::Attribute if token.text.eq_ignore_case("inherits") => {
                        if lexer.peek_kind(0) == Some(TokenKind::AttributeValue) {
                            inherits = lexer.next_token().map(|t| t.text);
                        }
                    }
                    TokenKind::EndDirective => break,
                    _ => {}
                }
            }
            if kind.as_ref().is_some_and(DirectiveKind::is_main) {
                if let Some(ty) = inherits.and_then(|i| self.resolve_type_name(i.as_str(), session)) {
                    return ty;
                }
                break;
            }
        }
        TypeRef::parse(&self.ctx.options.control_base_type)
    }

    // =========================================================================
    // Includes
    // =========================================================================

    fn server_comment(&mut self, token: &Token, session: &mut Session) -> Result<(), CompileError> {
        let Some(reference) = include_reference(token.text.as_str()) else {
            return Ok(());
        };
        let path = resolve_reference(self.file(), reference);

        if session
            .include_stack
            .iter()
            .any(|p| p.eq_ignore_ascii_case(&path))
        {
            session
                .diagnostics
                .report(DiagnosticCode::RecursiveInclude, &token.range, &[&path]);
            return Ok(());
        }
        if !self.ctx.files.exists(&path) {
            session
                .diagnostics
                .report(DiagnosticCode::IncludeNotFound, &token.range, &[&path]);
            return Ok(());
        }
        let text = self
            .ctx
            .files
            .read_all_text(&path)
            .map_err(|source| CompileError::Io {
                path: path.clone(),
                source,
            })?;
        session.root.add_include(&path, content_hash(&text));
        log::debug!("{}: including {path}", token.range);

        let (ty, collection) = self.enclosing();
        let outer = Outer {
            ty,
            collection,
            template: self.in_template(),
        };
        let var_name = self.new_var();
        session.include_stack.push(path.clone());
        let result = Parser::new(self.ctx, &path, &text, var_name, outer).run(session);
        session.include_stack.pop();

        let (children, templates) = result?;
        let current = self.current_mut();
        for child in children {
            current.open.push(child);
        }
        for template in templates {
            current.open.add_template(template);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn code_node(token: Token, var_name: String) -> Node {
    match token.kind {
        TokenKind::Statement => Node::Statement(StatementNode {
            range: token.range,
            var_name,
            text: token.text,
        }),
        kind => Node::Expression(ExpressionNode {
            range: token.range,
            var_name,
            text: token.text,
            eval: kind == TokenKind::EvalExpression,
            encode: kind == TokenKind::EncodeExpression,
        }),
    }
}

fn value_part(token: Token) -> ValuePart {
    match token.kind {
        TokenKind::Statement => ValuePart::Statement(token.text),
        kind => ValuePart::Expression {
            text: token.text,
            eval: kind == TokenKind::EvalExpression,
            encode: kind == TokenKind::EncodeExpression,
        },
    }
}

/// A directive attribute's value as one string. Code blocks are kept
/// verbatim; a bare attribute gets an empty value at the end of its name.
fn directive_value(name: &TokenString, value: Option<AttributeValue>) -> TokenString {
    let Some(value) = value else {
        return TokenString::new("", Range::empty(name.range.file.clone(), name.range.end));
    };
    if let Some(token) = value.as_token() {
        return token.clone();
    }
    let text: String = value.parts.iter().map(|p| p.token().as_str()).collect();
    let range = value
        .range()
        .unwrap_or_else(|| Range::empty(name.range.file.clone(), name.range.end));
    TokenString::new(text, range)
}

fn find_attribute<'t>(attributes: &'t [(TokenString, TokenString)], name: &str) -> Option<&'t TokenString> {
    attributes
        .iter()
        .find(|(key, _)| key.eq_ignore_case(name))
        .map(|(_, value)| value)
}

/// The path of `#include file="..."` or `#include virtual="..."`.
fn include_reference(comment: &str) -> Option<&str> {
    let rest = comment.trim_start();
    let rest = rest
        .get(..8)
        .filter(|p| p.eq_ignore_ascii_case("#include"))
        .and_then(|_| rest.get(8..))?
        .trim_start();
    let (kind, value) = rest.split_once('=')?;
    let kind = kind.trim();
    if !kind.eq_ignore_ascii_case("file") && !kind.eq_ignore_ascii_case("virtual") {
        return None;
    }
    let value = value.trim_start();
    match value.chars().next()? {
        quote @ ('"' | '\'') => {
            let inner = &value[1..];
            inner.find(quote).map(|end| &inner[..end])
        }
        _ => value.split_whitespace().next(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ROOT_VAR;
    use crate::catalog::{TypeCatalog, TypeDef};
    use crate::diagnostics::Diagnostic;
    use crate::files::MemoryFileResolver;
    use crate::resolver::{Converter, Member};
    use crate::{ParseOutput, ParserOptions};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn catalog() -> TypeCatalog {
        let options = ParserOptions::default();
        TypeCatalog::builtin(&options)
            .with(
                TypeDef::new("", "MyBase")
                    .base("WebForms.UI.Page")
                    .method("Save_Click"),
            )
            .with(TypeDef::new("Site", "Item"))
            .with(
                TypeDef::new("Site.Controls", "Chart")
                    .base("WebForms.UI.Control")
                    .collection("Data", "Site.Controls.DataCollection")
                    .collection("Series", "Site.Controls.SeriesCollection")
                    .member(
                        Member::property("Width", TypeRef::new("WebForms.UI", "Unit"))
                            .with_converter(Converter::Named("UnitConverter".into())),
                    ),
            )
            .with(
                TypeDef::new("Site.Controls", "DataCollection")
                    .collection("Foo", "Site.Controls.FooCollection"),
            )
            .with(TypeDef::new("Site.Controls", "FooCollection").property("Bar", "System.String"))
            .with(TypeDef::new("Site.Controls", "SeriesCollection"))
            .with(TypeDef::new("Site.Controls", "Series").base("WebForms.UI.Control").property("Name", "System.String"))
    }

    fn parse_with(files: MemoryFileResolver, path: &str, text: &str) -> ParseOutput {
        ParseContext::new(catalog(), files).parse(path, text)
    }

    fn parse(text: &str) -> ParseOutput {
        parse_with(MemoryFileResolver::new(), "Default.aspx", text)
    }

    fn codes(diagnostics: &[Diagnostic]) -> Vec<DiagnosticCode> {
        diagnostics.iter().map(|d| d.code).collect()
    }

    fn control(node: &Node) -> &ControlNode {
        match node {
            Node::Control(control) => control,
            other => panic!("expected control, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_html_is_one_text_node() {
        let output = parse("<p class=\"x\">Hello</p>");
        assert_eq!(output.root.children.len(), 1);
        match &output.root.children[0] {
            Node::Text(text) => assert_eq!(text.text.value, "<p class=\"x\">Hello</p>"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn test_var_names_follow_containers() {
        let output = parse("a<div runat=\"server\">b<%= c %></div>");
        let names: Vec<&str> = output.root.children.iter().map(Node::var_name).collect();
        assert_eq!(names, vec!["ctrl_0", "ctrl_1"]);
        let div = control(&output.root.children[1]);
        let inner: Vec<&str> = div.children.iter().map(Node::var_name).collect();
        assert_eq!(inner, vec!["ctrl_1_0", "ctrl_1_1"]);
        assert_eq!(div.var_name, format!("{ROOT_VAR}_1"));
    }

    #[test]
    fn test_page_directive() {
        let output = parse("<%@ Page Language=\"C#\" Inherits=\"MyBase\" Title=\"Home\" CodeBehind=\"x.cs\" %>");
        let root = &output.root;
        assert_eq!(root.language.as_deref(), Some("C#"));
        assert_eq!(root.inherits, Some(TypeRef::new("", "MyBase")));
        assert_eq!(root.properties.len(), 1);
        assert_eq!(root.properties[0].name, "Title");
        assert_eq!(root.properties[0].value.as_text().as_deref(), Some("Home"));
        assert!(output.diagnostics.is_empty());
        match &root.children[0] {
            Node::Directive(directive) => {
                assert_eq!(directive.kind, DirectiveKind::Page);
                assert_eq!(directive.attribute("INHERITS").map(|v| v.as_str()), Some("MyBase"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_page_directive_without_kind_word() {
        let output = parse("<%@ Inherits=\"MyBase\" %>");
        assert_eq!(output.root.inherits, Some(TypeRef::new("", "MyBase")));
    }

    #[test]
    fn test_missing_inherits() {
        let output = parse("<%@ Page Inherits=\"Nope\" Title=\"x\" %>");
        assert_eq!(output.root.inherits, None);
        assert_eq!(codes(&output.diagnostics), vec![DiagnosticCode::InheritNotFound]);
    }

    #[test]
    fn test_unknown_page_property() {
        let output = parse("<%@ Page Colour=\"red\" %>");
        assert_eq!(output.root.inherits, Some(TypeRef::new("WebForms.UI", "Page")));
        assert_eq!(codes(&output.diagnostics), vec![DiagnosticCode::PropertyNotFound]);
        assert_eq!(output.diagnostics[0].args[1], "Colour");
    }

    #[test]
    fn test_control_directive_defaults_to_user_control() {
        let output = parse("<%@ Control Language=\"C#\" %>");
        assert_eq!(output.root.inherits, Some(TypeRef::new("WebForms.UI", "UserControl")));
    }

    #[test]
    fn test_only_first_main_directive_counts() {
        let output = parse("<%@ Page Language=\"C#\" %><%@ Page Language=\"VB\" %>");
        assert_eq!(output.root.language.as_deref(), Some("C#"));
    }

    #[test]
    fn test_imports_are_deduplicated_and_resolve_names() {
        let output = parse(
            "<%@ Import Namespace=\"Site\" %><%@ Import Namespace=\"Site\" %>\
             <asp:Repeater runat=\"server\" ItemType=\"Item\"></asp:Repeater>",
        );
        assert_eq!(output.root.imports, vec!["System".to_string(), "Site".to_string()]);
        let repeater = output
            .root
            .children
            .iter()
            .find_map(|n| match n {
                Node::Control(c) => Some(c),
                _ => None,
            })
            .unwrap();
        assert_eq!(repeater.ty.to_string(), "WebForms.UI.WebControls.Repeater<Site.Item>");
        assert!(repeater.members.properties.is_empty());
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn test_web_control_properties_and_events() {
        let output = parse(
            "<%@ Page Inherits=\"MyBase\" %>\
             <asp:Button runat=\"server\" ID=\"Save\" Text=\"Go\" OnClick=\"Save_Click\" data-x=\"1\" />",
        );
        let button = control(&output.root.children[1]);
        assert_eq!(button.ty, TypeRef::new("WebForms.UI.WebControls", "Button"));
        assert_eq!(button.id.as_ref().map(|i| i.as_str()), Some("Save"));
        assert_eq!(button.field_name.as_deref(), Some("Save"));
        assert_eq!(button.members.properties[0].name, "Text");
        assert_eq!(button.members.events[0].name, "Click");
        assert_eq!(button.members.events[0].handler.value, "Save_Click");
        assert_eq!(button.members.attributes[0].name.value, "data-x");
        assert_eq!(output.root.fields[0].name, "Save");
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn test_unknown_handler_stays_attribute() {
        let output = parse(
            "<%@ Page Inherits=\"MyBase\" %>\
             <asp:Button runat=\"server\" OnClick=\"Missing_Click\" />",
        );
        let button = control(&output.root.children[1]);
        assert!(button.members.events.is_empty());
        assert_eq!(button.members.attributes[0].name.value, "OnClick");
    }

    #[test]
    fn test_unknown_prefix() {
        let output = parse("<uc:Thing runat=\"server\" />");
        assert_eq!(codes(&output.diagnostics), vec![DiagnosticCode::ControlNotFound]);
        let thing = control(&output.root.children[0]);
        assert_eq!(thing.ty.name, "HtmlGenericControl");
    }

    #[test]
    fn test_type_not_in_namespace() {
        let output = parse("<asp:Missing runat=\"server\" />");
        assert_eq!(codes(&output.diagnostics), vec![DiagnosticCode::TypeNotFoundInNamespace]);
        assert_eq!(output.diagnostics[0].args, vec!["Missing", "WebForms.UI.WebControls"]);
    }

    #[test]
    fn test_property_not_found() {
        let output = parse("<asp:Literal runat=\"server\" Colour=\"red\" />");
        assert_eq!(codes(&output.diagnostics), vec![DiagnosticCode::PropertyNotFound]);
    }

    #[test]
    fn test_html_control_table() {
        let output = parse("<form runat=\"server\" action=\"/post\"></form>");
        let form = control(&output.root.children[0]);
        assert_eq!(form.ty, TypeRef::new("WebForms.UI.HtmlControls", "HtmlForm"));
        assert_eq!(form.members.properties[0].name, "Action");
    }

    #[test]
    fn test_mismatched_closing_tag() {
        let output = parse("<Foo runat=\"server\">bar</Baz>after");
        assert_eq!(codes(&output.diagnostics), vec![DiagnosticCode::UnexpectedClosingTag]);
        let foo = control(&output.root.children[0]);
        assert_eq!(foo.children.len(), 1);
        assert_eq!(output.root.children.len(), 2);
    }

    #[test]
    fn test_void_control() {
        let output = parse("<img src=\"a.png\" runat=\"server\">text");
        let img = control(&output.root.children[0]);
        assert_eq!(img.ty.name, "HtmlImage");
        assert!(img.children.is_empty());
        assert_eq!(output.root.children.len(), 2);
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn test_unclosed_container_closes_silently() {
        let output = parse("<asp:Panel runat=\"server\"><asp:Literal runat=\"server\" Text=\"x\" />");
        assert_eq!(output.root.children.len(), 1);
        assert_eq!(
            codes(&output.diagnostics),
            vec![DiagnosticCode::TypeNotFoundInNamespace]
        );
    }

    #[test]
    fn test_plain_element() {
        let output = parse("<html><body>x</body></html>");
        match &output.root.children[0] {
            Node::Element(html) => {
                assert_eq!(html.tag.local(), "html");
                assert_eq!(html.children.len(), 1);
                assert_eq!(html.range.end.offset, 27);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unclosed_head_is_not_reported() {
        let output = parse("<html><head><title>t</title><body>x</body></html>");
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        let Node::Element(html) = &output.root.children[0] else {
            panic!("expected html element");
        };
        assert_eq!(html.range.end.offset, 49);
    }

    #[test]
    fn test_templates() {
        let output = parse(
            "<asp:Repeater runat=\"server\"><ItemTemplate><asp:Label runat=\"server\" ID=\"Name\" /></ItemTemplate></asp:Repeater>",
        );
        let repeater = control(&output.root.children[0]);
        let template = &repeater.members.templates[0];
        assert_eq!(template.property, "ItemTemplate");
        assert_eq!(template.class_name, "Template_ctrl_0_0");
        let label = control(&template.children[0]);
        assert_eq!(label.id.as_ref().map(|i| i.as_str()), Some("Name"));
        assert_eq!(label.field_name, None);
        assert!(output.root.fields.is_empty());
        assert_eq!(output.root.templates[0].class_name, "Template_ctrl_0_0");
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn test_collections_and_items() {
        let output = parse(
            "<%@ Register TagPrefix=\"site\" Namespace=\"Site.Controls\" %>\
             <site:Chart runat=\"server\" Width=\"10px\"><Series><site:Series Name=\"a\" /></Series></site:Chart>",
        );
        let chart = control(&output.root.children[1]);
        assert_eq!(chart.members.properties[0].converter, Some(Converter::Named("UnitConverter".into())));
        match &chart.children[0] {
            Node::Collection(series) => {
                assert_eq!(series.property, "Series");
                let item = control(&series.children[0]);
                assert_eq!(item.ty, TypeRef::new("Site.Controls", "Series"));
                assert_eq!(item.members.properties[0].name, "Name");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn test_hyphenated_attribute_chain() {
        let output = parse(
            "<%@ Register TagPrefix=\"site\" Namespace=\"Site.Controls\" %>\
             <site:Chart runat=\"server\" data-foo-bar=\"x\" />",
        );
        let chart = control(&output.root.children[1]);
        assert!(chart.members.attributes.is_empty());
        let Node::Collection(data) = &chart.children[0] else {
            panic!("expected Data collection");
        };
        let Node::Collection(foo) = &data.children[0] else {
            panic!("expected Foo collection");
        };
        assert_eq!((data.property.as_str(), foo.property.as_str()), ("Data", "Foo"));
        assert_eq!(foo.members.properties[0].name, "Bar");
        assert_eq!(foo.members.properties[0].range.start.offset, 85);
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn test_script_block() {
        let output = parse("<script runat=\"server\">var x = <%= 1+1 %>;</script><p>after</p>");
        let script = &output.root.scripts[0];
        let kinds: Vec<&str> = script
            .children
            .iter()
            .map(|n| match n {
                Node::Text(_) => "text",
                Node::Expression(_) => "expr",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["text", "expr", "text"]);
        assert_eq!(output.root.children.len(), 1);
    }

    #[test]
    fn test_include_and_recursion() {
        let files = MemoryFileResolver::new()
            .with("Shared/a.inc", "<b>a</b><%-- #include file=\"a.inc\" --%>")
            .with("Shared/b.inc", "<%-- #include virtual=\"~/Default.aspx\" --%>");
        let output = parse_with(
            files,
            "Default.aspx",
            "<%-- #include file=\"Shared/a.inc\" --%><%-- #include file=\"Shared/b.inc\" --%>",
        );
        assert_eq!(
            codes(&output.diagnostics),
            vec![DiagnosticCode::RecursiveInclude, DiagnosticCode::RecursiveInclude]
        );
        let paths: Vec<&str> = output.root.includes.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["Shared/a.inc", "Shared/b.inc"]);
        assert_eq!(output.root.children.len(), 1);
    }

    #[test]
    fn test_missing_include() {
        let output = parse("<%-- #include file=\"nope.inc\" --%>");
        assert_eq!(codes(&output.diagnostics), vec![DiagnosticCode::IncludeNotFound]);
    }

    #[test]
    fn test_register_user_control() {
        let files = MemoryFileResolver::new()
            .with("Controls/Header.ascx", "<%@ Control Inherits=\"MyBase\" %><h1>hi</h1>");
        let output = parse_with(
            files,
            "Default.aspx",
            "<%@ Register TagPrefix=\"uc\" TagName=\"Header\" Src=\"~/Controls/Header.ascx\" %>\
             <uc:Header runat=\"server\" ID=\"Top\" />",
        );
        let header = control(&output.root.children[1]);
        assert_eq!(header.ty, TypeRef::new("", "MyBase"));
        assert_eq!(output.registry.control("uc", "header"), Some(&TypeRef::new("", "MyBase")));
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn test_register_view_and_conflicts() {
        let mut catalog = catalog();
        catalog.add_view("Controls/Footer.ascx", TypeRef::new("Site", "Footer"));
        let ctx = ParseContext::new(catalog, MemoryFileResolver::new());
        let output = ctx.parse(
            "Default.aspx",
            "<%@ Register TagPrefix=\"uc\" TagName=\"Footer\" Src=\"Controls/Footer.ascx\" %>\
             <%@ Register TagPrefix=\"uc\" TagName=\"Footer\" Src=\"Controls/Other.ascx\" %>",
        );
        assert_eq!(output.registry.control("uc", "Footer"), Some(&TypeRef::new("Site", "Footer")));
        assert_eq!(codes(&output.diagnostics), vec![DiagnosticCode::ControlNotFound]);

        let mut catalog = self::catalog();
        catalog.add_view("Controls/Footer.ascx", TypeRef::new("Site", "Footer"));
        let files = MemoryFileResolver::new().with("Controls/Other.ascx", "<%@ Control %>");
        let ctx = ParseContext::new(catalog, files);
        let output = ctx.parse(
            "Default.aspx",
            "<%@ Register TagPrefix=\"uc\" TagName=\"Footer\" Src=\"Controls/Footer.ascx\" %>\
             <%@ Register TagPrefix=\"uc\" TagName=\"Footer\" Src=\"Controls/Other.ascx\" %>",
        );
        assert_eq!(codes(&output.diagnostics), vec![DiagnosticCode::DuplicateControlRegister]);
    }

    #[test]
    fn test_duplicate_ids() {
        let output = parse("<div runat=\"server\" id=\"a\"></div><span runat=\"server\" id=\"A\"></span>");
        assert_eq!(codes(&output.diagnostics), vec![DiagnosticCode::DuplicateControlId]);
        assert_eq!(output.root.fields.len(), 1);
    }

    #[test]
    fn test_blank_ids_declare_no_field() {
        let output = parse("<div runat=\"server\" id=\"\"></div><span runat=\"server\" id=\" \"></span>");
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        assert!(output.root.fields.is_empty());
        let span = control(&output.root.children[1]);
        assert!(span.id.is_none());
        assert_eq!(span.field_name, None);
        assert_eq!(span.members.properties[0].name, "ID");
    }

    #[test]
    fn test_attribute_with_expression() {
        let output = parse("<a runat=\"server\" href=\"/u/<%= Id %>\">x</a>");
        let anchor = control(&output.root.children[0]);
        let href = &anchor.members.properties[0];
        assert_eq!(href.name, "HRef");
        assert_eq!(href.value.parts.len(), 2);
        assert!(href.value.has_code());
    }

    #[test]
    fn test_include_reference_syntax() {
        assert_eq!(include_reference(" #include file=\"a.inc\" "), Some("a.inc"));
        assert_eq!(include_reference("#INCLUDE virtual='~/b.inc'"), Some("~/b.inc"));
        assert_eq!(include_reference("#include file=c.inc"), Some("c.inc"));
        assert_eq!(include_reference("#include other=\"x\""), None);
        assert_eq!(include_reference("just a comment"), None);
    }

    #[test]
    fn test_directive_value_for_bare_attribute() {
        let name = TokenString::new(
            "Strict",
            Range::new(Arc::from("a"), Position::start(), Position::new(6, 1, 7)),
        );
        let value = directive_value(&name, None);
        assert!(value.is_empty());
        assert_eq!(value.range.start.offset, 6);
    }
}
