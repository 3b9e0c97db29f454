use serde::{Deserialize, Serialize};

/// Parser configuration.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use webforms_parser::ParserOptions;
///
/// let options = ParserOptions::from_json(r#"{ "defaultNamespace": "Site" }"#).unwrap();
/// assert_eq!(options.default_namespace.as_deref(), Some("Site"));
/// assert_eq!(options.web_controls_prefix, "asp");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParserOptions {
    /// Namespace for generated types when the page does not inherit one.
    pub default_namespace: Option<String>,
    /// Base type of pages without `Inherits`.
    pub page_base_type: String,
    /// Base type of user controls without `Inherits`.
    pub control_base_type: String,
    /// Namespace holding the HTML server controls (`HtmlForm`, ...).
    pub html_controls_namespace: String,
    /// Control used for `runat="server"` tags with no dedicated type.
    pub generic_html_control: String,
    /// Tag prefix registered for the built-in web controls.
    pub web_controls_prefix: String,
    pub web_controls_namespace: String,
    /// Namespaces imported into every page.
    pub default_imports: Vec<String>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            default_namespace: None,
            page_base_type: "WebForms.UI.Page".into(),
            control_base_type: "WebForms.UI.UserControl".into(),
            html_controls_namespace: "WebForms.UI.HtmlControls".into(),
            generic_html_control: "HtmlGenericControl".into(),
            web_controls_prefix: "asp".into(),
            web_controls_namespace: "WebForms.UI.WebControls".into(),
            default_imports: vec!["System".into()],
        }
    }
}

impl ParserOptions {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
