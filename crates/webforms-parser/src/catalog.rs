//! In-memory type catalog.
//!
//! A hand-written symbol table implementing [`TypeResolver`]: types are
//! registered with a small builder, members are inherited along base
//! types, and every lookup ignores case.

use crate::known::HTML_CONTROLS;
use crate::options::ParserOptions;
use crate::resolver::{
    GenericType, Member, MemberCapability, TypeRef, TypeResolver, ATTRIBUTE_ACCESSOR,
};
use std::collections::HashMap;

/// Base chains longer than this are assumed to be cyclic.
const MAX_BASE_DEPTH: usize = 64;

const UI_NAMESPACE: &str = "WebForms.UI";

/// Definition of one type in a [`TypeCatalog`].
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    ty: TypeRef,
    arity: usize,
    base: Option<TypeRef>,
    interfaces: Vec<String>,
    members: Vec<Member>,
}

impl TypeDef {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            ty: TypeRef::new(namespace, name),
            arity: 0,
            base: None,
            interfaces: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Create from a dotted full name.
    pub fn parse(full_name: &str) -> Self {
        let ty = TypeRef::parse(full_name);
        Self::new(&ty.namespace, &ty.name)
    }

    /// Make this a generic definition taking `arity` type arguments.
    pub fn generic(mut self, arity: usize) -> Self {
        self.arity = arity;
        self
    }

    pub fn base(mut self, full_name: &str) -> Self {
        self.base = Some(TypeRef::parse(full_name));
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    pub fn member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    pub fn property(self, name: &str, ty: &str) -> Self {
        self.member(Member::property(name, TypeRef::parse(ty)))
    }

    pub fn event(self, name: &str) -> Self {
        self.member(Member::event(name))
    }

    pub fn method(self, name: &str) -> Self {
        self.member(Member::method(name))
    }

    pub fn template(self, name: &str) -> Self {
        self.member(
            Member::property(name, TypeRef::new(UI_NAMESPACE, "ITemplate"))
                .with_capability(MemberCapability::Template),
        )
    }

    pub fn collection(self, name: &str, ty: &str) -> Self {
        self.member(
            Member::property(name, TypeRef::parse(ty))
                .read_only()
                .with_capability(MemberCapability::Collection),
        )
    }
}

type Key = (String, String, usize);

fn key(namespace: &str, name: &str, arity: usize) -> Key {
    (namespace.to_ascii_lowercase(), name.to_ascii_lowercase(), arity)
}

fn view_key(path: &str) -> String {
    path.trim_start_matches("~/")
        .trim_start_matches('/')
        .replace('\\', "/")
        .to_ascii_lowercase()
}

/// A static [`TypeResolver`].
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    types: HashMap<Key, TypeDef>,
    views: HashMap<String, TypeRef>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The base page and control types, HTML server controls and a few
    /// common web controls, laid out according to `options`.
    pub fn builtin(options: &ParserOptions) -> Self {
        let control = format!("{UI_NAMESPACE}.Control");
        let html = options.html_controls_namespace.as_str();
        let web = options.web_controls_namespace.as_str();
        let html_control = format!("{html}.HtmlControl");
        let web_control = format!("{web}.WebControl");

        let mut catalog = Self::new()
            .with(
                TypeDef::new(UI_NAMESPACE, "Control")
                    .property("ID", "System.String")
                    .property("Visible", "System.Boolean")
                    .property("EnableViewState", "System.Boolean"),
            )
            .with(TypeDef::new(UI_NAMESPACE, "ITemplate"))
            .with(
                TypeDef::parse(&options.page_base_type)
                    .base(&control)
                    .property("Title", "System.String"),
            )
            .with(TypeDef::parse(&options.control_base_type).base(&control))
            .with(
                TypeDef::new(html, "HtmlControl")
                    .base(&control)
                    .implements(ATTRIBUTE_ACCESSOR),
            )
            .with(
                TypeDef::new(html, &options.generic_html_control)
                    .base(&html_control)
                    .property("InnerText", "System.String")
                    .property("InnerHtml", "System.String"),
            )
            .with(
                TypeDef::new(web, "WebControl")
                    .base(&control)
                    .implements(ATTRIBUTE_ACCESSOR)
                    .property("CssClass", "System.String"),
            )
            .with(TypeDef::new(web, "Literal").base(&control).property("Text", "System.String"))
            .with(TypeDef::new(web, "PlaceHolder").base(&control))
            .with(TypeDef::new(web, "Label").base(&web_control).property("Text", "System.String"))
            .with(
                TypeDef::new(web, "HyperLink")
                    .base(&web_control)
                    .property("Text", "System.String")
                    .property("NavigateUrl", "System.String"),
            )
            .with(
                TypeDef::new(web, "Button")
                    .base(&web_control)
                    .property("Text", "System.String")
                    .property("CommandName", "System.String")
                    .event("Click")
                    .event("Command"),
            );

        for arity in [0, 1] {
            catalog.add(
                TypeDef::new(web, "Repeater")
                    .generic(arity)
                    .base(&control)
                    .property("DataSource", "System.Object")
                    .template("HeaderTemplate")
                    .template("ItemTemplate")
                    .template("SeparatorTemplate")
                    .template("FooterTemplate"),
            );
        }

        for (_, name) in HTML_CONTROLS {
            let def = TypeDef::new(html, name).base(&html_control);
            let def = match *name {
                "HtmlAnchor" => def.property("HRef", "System.String").event("ServerClick"),
                "HtmlButton" => def.event("ServerClick"),
                "HtmlImage" => def.property("Src", "System.String").property("Alt", "System.String"),
                "HtmlLink" => def.property("Href", "System.String"),
                "HtmlForm" => def.property("Action", "System.String"),
                _ => def,
            };
            catalog.add(def);
        }

        catalog
    }

    pub fn add(&mut self, def: TypeDef) -> &mut Self {
        self.types
            .insert(key(&def.ty.namespace, &def.ty.name, def.arity), def);
        self
    }

    pub fn with(mut self, def: TypeDef) -> Self {
        self.add(def);
        self
    }

    /// Register a precompiled view by its project-relative path.
    pub fn add_view(&mut self, path: &str, ty: TypeRef) -> &mut Self {
        self.views.insert(view_key(path), ty);
        self
    }

    fn get(&self, namespace: &str, name: &str, arity: usize) -> Option<&TypeDef> {
        self.types.get(&key(namespace, name, arity))
    }

    fn definition(&self, ty: &TypeRef) -> Option<&TypeDef> {
        self.get(&ty.namespace, &ty.name, ty.type_args.len())
    }

    /// `ty`'s definition followed by its base definitions.
    fn ancestors(&self, ty: &TypeRef) -> Vec<&TypeDef> {
        let mut chain = Vec::new();
        let mut current = self.definition(ty);
        while let Some(def) = current {
            if chain.len() >= MAX_BASE_DEPTH {
                break;
            }
            chain.push(def);
            current = def.base.as_ref().and_then(|base| self.definition(base));
        }
        chain
    }
}

fn names_match(candidate: &str, wanted: &str) -> bool {
    if wanted.contains('.') {
        candidate.eq_ignore_ascii_case(wanted)
    } else {
        let simple = candidate.rsplit('.').next().unwrap_or(candidate);
        simple.eq_ignore_ascii_case(wanted)
    }
}

impl TypeResolver for TypeCatalog {
    fn resolve(&self, namespace: &str, name: &str) -> Option<TypeRef> {
        self.get(namespace, name, 0).map(|def| def.ty.clone())
    }

    fn resolve_generic(&self, namespace: &str, name: &str, arity: usize) -> Option<GenericType> {
        if arity == 0 {
            return None;
        }
        self.get(namespace, name, arity).map(|def| GenericType {
            namespace: def.ty.namespace.clone(),
            name: def.ty.name.clone(),
            arity,
        })
    }

    fn member_of(&self, ty: &TypeRef, name: &str) -> Option<Member> {
        self.ancestors(ty).into_iter().find_map(|def| {
            def.members
                .iter()
                .find(|m| m.name.eq_ignore_ascii_case(name))
                .cloned()
        })
    }

    fn is_assignable_to(&self, ty: &TypeRef, interface: &str) -> bool {
        self.ancestors(ty).into_iter().any(|def| {
            names_match(&def.ty.full_name(), interface)
                || def.interfaces.iter().any(|i| names_match(i, interface))
        })
    }

    fn resolve_view(&self, path: &str) -> Option<TypeRef> {
        self.views.get(&view_key(path)).cloned()
    }
}
