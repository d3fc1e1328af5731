use std::borrow::Cow;
use std::sync::LazyLock;

use handlebars::Handlebars;
use regex::Regex;
use serde::Serialize;

use crate::error::EvaluationError;

// Rule files are written with `{{.Field}}` placeholders, `{{- ... -}}`
// trim markers and `{{/* ... */}}` comments; handlebars spells these
// `{{Field}}`, `{{~ ... ~}}` and `{{!-- ... --}}`. Handlebars comments take
// no trim markers, so those are dropped.
static COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{\{-?\s*/\*(.*?)\*/\s*-?\}\}").expect("valid regex")
});
static TRIM_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{-(\s)").expect("valid regex"));
static TRIM_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\s)-\}\}").expect("valid regex"));
static DOT_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(~?)(\s*)\.([A-Za-z_])").expect("valid regex"));

/// Rewrite `{{.Field}}` style placeholders into handlebars syntax.
pub fn normalize(template: &str) -> Cow<'_, str> {
    if !template.contains("{{") {
        return Cow::Borrowed(template);
    }
    let step = COMMENT.replace_all(template, "{{!--${1}--}}");
    let step = TRIM_OPEN.replace_all(&step, "{{~$1");
    let step = TRIM_CLOSE.replace_all(&step, "$1~}}").into_owned();
    Cow::Owned(DOT_FIELD.replace_all(&step, "{{$1$2$3").into_owned())
}

/// Context for rendering a rule's metric query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryContext<'a> {
    pub instance_id: &'a str,
}

/// Context for rendering notification subject and body.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageContext {
    pub alert_name: String,
    pub instance_id: String,
    pub instance_name: String,
    pub environment_name: String,
    pub space_name: String,
    pub org_name: String,
    /// Spelling used by existing rule files.
    pub treshold: String,
    pub threshold: String,
    pub metric_value: String,
}

/// Renders rule templates. Output is plain text: nothing is HTML-escaped and
/// referencing a field that does not exist is an error.
pub struct TemplateRenderer {
    registry: Handlebars<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.set_strict_mode(true);
        Self { registry }
    }

    pub fn render<T: Serialize>(
        &self,
        what: &'static str,
        template: &str,
        context: &T,
    ) -> Result<String, EvaluationError> {
        self.registry
            .render_template(&normalize(template), context)
            .map_err(|e| EvaluationError::Template {
                what,
                reason: e.to_string(),
            })
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRenderer").finish_non_exhaustive()
    }
}
