//! Template rendering.
//!
//! `{{ identifier }}` placeholders are substituted in one regex pass over the
//! subject and the content. Placeholders without data stay in the output
//! verbatim so missing data is visible. Email content can additionally have
//! its links routed through click tracking.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::models::ChannelType;
use crate::tracking;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([a-zA-Z0-9_]+)\s*\}\}").expect("placeholder pattern is a valid regex")
    })
}

/// Template fields the renderer needs.
#[derive(Debug, Clone, Copy)]
pub struct TemplateSource<'a> {
    pub id: Option<Uuid>,
    pub name: &'a str,
    pub subject: &'a str,
    pub content: &'a str,
}

impl<'a> From<&'a crate::models::template::Model> for TemplateSource<'a> {
    fn from(model: &'a crate::models::template::Model) -> Self {
        Self {
            id: Some(model.id),
            name: &model.name,
            subject: &model.subject,
            content: &model.content,
        }
    }
}

/// Per-call rendering switches.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub channel: Option<ChannelType>,
    /// Token for link rewriting; rewriting only happens for email
    pub tracking_token: Option<String>,
    pub click_tracking: bool,
    pub log_unreplaced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    app_name: String,
    app_url: String,
}

impl TemplateRenderer {
    pub fn new(app_name: impl Into<String>, app_url: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            app_url: app_url.into(),
        }
    }

    pub fn render(
        &self,
        template: TemplateSource<'_>,
        data: &JsonValue,
        options: &RenderOptions,
    ) -> RenderedMessage {
        let variables = self.prepare_data(data);

        let subject = substitute(template.subject, &variables);
        let mut content = substitute(template.content, &variables);

        if options.log_unreplaced {
            let missing = unreplaced(&subject, &content, &variables);
            if !missing.is_empty() {
                tracing::warn!(
                    template_id = ?template.id,
                    template_name = template.name,
                    missing = %missing.into_iter().collect::<Vec<_>>().join(", "),
                    "Unreplaced template variables"
                );
            }
        }

        if options.channel == Some(ChannelType::Email)
            && options.click_tracking
            && let Some(token) = options.tracking_token.as_deref()
        {
            content = tracking::rewrite_links(&content, &self.app_url, token);
        }

        RenderedMessage { subject, content }
    }

    /// Call data merged over `app_name`/`app_url`, with user-derived fallbacks.
    fn prepare_data(&self, data: &JsonValue) -> Map<String, JsonValue> {
        let mut merged = Map::new();
        merged.insert("app_name".into(), JsonValue::String(self.app_name.clone()));
        merged.insert("app_url".into(), JsonValue::String(self.app_url.clone()));

        if let JsonValue::Object(entries) = data {
            for (key, value) in entries {
                merged.insert(key.clone(), value.clone());
            }
        }

        let user = match data.get("user") {
            Some(JsonValue::Object(user)) => user.clone(),
            _ => return merged,
        };
        let field = |name: &str| {
            user.get(name)
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let user_name = field("name");
        let user_email = field("email");
        merged.insert("user_name".into(), JsonValue::String(user_name.clone()));
        merged.insert("user_email".into(), JsonValue::String(user_email.clone()));
        if is_missing(merged.get("name")) {
            merged.insert("name".into(), JsonValue::String(user_name));
        }
        if is_missing(merged.get("email")) {
            merged.insert("email".into(), JsonValue::String(user_email));
        }

        merged
    }
}

fn is_missing(value: Option<&JsonValue>) -> bool {
    matches!(value, None | Some(JsonValue::Null))
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn substitute(text: &str, variables: &Map<String, JsonValue>) -> String {
    placeholder_pattern()
        .replace_all(text, |caps: &Captures| {
            variables
                .get(&caps[1])
                .and_then(scalar_text)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn unreplaced(subject: &str, content: &str, variables: &Map<String, JsonValue>) -> BTreeSet<String> {
    [subject, content]
        .iter()
        .flat_map(|text| placeholder_pattern().captures_iter(text))
        .map(|caps| caps[1].to_string())
        .filter(|name| variables.get(name).and_then(scalar_text).is_none())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source<'a>(subject: &'a str, content: &'a str) -> TemplateSource<'a> {
        TemplateSource {
            id: None,
            name: "test",
            subject,
            content,
        }
    }

    fn renderer() -> TemplateRenderer {
        TemplateRenderer::new("Notifier", "https://app.test")
    }

    #[test]
    fn substitutes_known_variables() {
        let rendered = renderer().render(
            source("Hi {{name}}, welcome to {{app_name}}!", "{{ name }}"),
            &json!({"name": "John Doe", "app_name": "Test App"}),
            &RenderOptions::default(),
        );
        assert_eq!(rendered.subject, "Hi John Doe, welcome to Test App!");
        assert_eq!(rendered.content, "John Doe");
    }

    #[test]
    fn leaves_missing_placeholders_verbatim() {
        let rendered = renderer().render(
            source("{{missing_key}}", "Value: {{missing_key}} / {{ spaced }}"),
            &json!({}),
            &RenderOptions {
                log_unreplaced: true,
                ..Default::default()
            },
        );
        assert_eq!(rendered.subject, "{{missing_key}}");
        assert_eq!(rendered.content, "Value: {{missing_key}} / {{ spaced }}");
    }

    #[test]
    fn defaults_and_user_fallbacks_apply() {
        let rendered = renderer().render(
            source(
                "{{app_name}} {{app_url}}",
                "{{user_name}} <{{user_email}}> {{name}} {{email}} {{count}} {{flag}}",
            ),
            &json!({
                "user": {"id": 1, "name": "Ada", "email": "ada@example.com"},
                "name": "Countess",
                "count": 3,
                "flag": true,
            }),
            &RenderOptions::default(),
        );
        assert_eq!(rendered.subject, "Notifier https://app.test");
        assert_eq!(
            rendered.content,
            "Ada <ada@example.com> Countess ada@example.com 3 true"
        );
    }

    #[test]
    fn rewrites_links_only_for_email_with_click_tracking() {
        let template = source("s", r#"<a href="https://example.com">x</a>"#);
        let data = json!({});

        let email = renderer().render(
            template,
            &data,
            &RenderOptions {
                channel: Some(ChannelType::Email),
                tracking_token: Some("tok".into()),
                click_tracking: true,
                log_unreplaced: false,
            },
        );
        assert!(
            email
                .content
                .contains("/track/click/tok?url=https%3A%2F%2Fexample.com")
        );

        let slack = renderer().render(
            template,
            &data,
            &RenderOptions {
                channel: Some(ChannelType::Slack),
                tracking_token: Some("tok".into()),
                click_tracking: true,
                log_unreplaced: false,
            },
        );
        assert_eq!(slack.content, template.content);

        let disabled = renderer().render(
            template,
            &data,
            &RenderOptions {
                channel: Some(ChannelType::Email),
                tracking_token: Some("tok".into()),
                click_tracking: false,
                log_unreplaced: false,
            },
        );
        assert_eq!(disabled.content, template.content);
    }
}
