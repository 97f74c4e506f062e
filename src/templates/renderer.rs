//! Template resolution and `{{ path }}` interpolation.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;

use crate::error::TemplateError;
use crate::model::{Channel, CommunicationType, TemplatePart};
use crate::store::Database;
use crate::templates::builtin::builtin;
use crate::templates::{RenderRequest, Renderer, names, template_key};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").expect("placeholder regex is valid")
});

/// Replace every `{{ a.b.c }}` with the value at that path in `context`.
///
/// Strings are inserted verbatim, other scalars in their JSON form.
/// Missing paths and nulls render as empty.
pub fn interpolate(template: &str, context: &Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| lookup(context, &caps[1]))
        .into_owned()
}

/// Like [`interpolate`], but every inserted value is HTML-escaped.
///
/// Used for email bodies, where submitter text must not become markup.
pub fn interpolate_html(template: &str, context: &Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| escape_html(&lookup(context, &caps[1])))
        .into_owned()
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn lookup(context: &Value, path: &str) -> String {
    let mut current = context;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    match current {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Database-backed renderer with an optional template directory.
///
/// The directory mirrors the builtin layout: `{dir}/{channel}/{name}.{part}.tmpl`.
pub struct TemplateRenderer {
    db: Arc<dyn Database>,
    template_dir: Option<PathBuf>,
}

impl TemplateRenderer {
    pub fn new(db: Arc<dyn Database>, template_dir: Option<PathBuf>) -> Self {
        Self { db, template_dir }
    }

    /// Resolve raw content for one template part.
    async fn resolve(
        &self,
        jurisdiction_id: &str,
        channel: Channel,
        comm_type: CommunicationType,
        name: &str,
        part: TemplatePart,
    ) -> Result<String, TemplateError> {
        let key = template_key(channel, name, part);

        if let Some(t) = self
            .db
            .get_template(jurisdiction_id, channel, &key, comm_type)
            .await?
        {
            debug!(template = %key, jurisdiction_id, "Using tenant template override");
            return Ok(t.content);
        }

        if let Some(dir) = &self.template_dir {
            let path = dir
                .join(channel.as_str())
                .join(format!("{name}.{}.tmpl", part.as_str()));
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => return Ok(content),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(TemplateError::Unreadable {
                        name: key,
                        reason: format!("{}: {e}", path.display()),
                    });
                }
            }
        }

        builtin(&key)
            .map(str::to_string)
            .ok_or(TemplateError::NotFound(key))
    }

    async fn render_part(
        &self,
        request: &RenderRequest<'_>,
        name: &str,
    ) -> Result<String, TemplateError> {
        let raw = self
            .resolve(
                request.jurisdiction_id,
                request.channel,
                request.comm_type,
                name,
                request.part,
            )
            .await?;
        let raw = raw.trim_end();
        if request.channel == Channel::Email && request.part == TemplatePart::Body {
            Ok(interpolate_html(raw, request.context))
        } else {
            Ok(interpolate(raw, request.context))
        }
    }
}

#[async_trait]
impl Renderer for TemplateRenderer {
    async fn render(&self, request: RenderRequest<'_>) -> Result<String, TemplateError> {
        let main = self.render_part(&request, request.name).await?;
        if request.part == TemplatePart::Subject {
            return Ok(main);
        }

        let powered_by = self.render_part(&request, names::POWERED_BY).await?;
        let unsubscribe = self.render_part(&request, names::UNSUBSCRIBE).await?;
        Ok([main, powered_by, unsubscribe].join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Jurisdiction, Template};
    use crate::store::LibSqlBackend;
    use serde_json::json;

    async fn renderer(dir: Option<PathBuf>) -> (TemplateRenderer, Arc<LibSqlBackend>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.insert_jurisdiction(&Jurisdiction::new("j1", "Springfield"))
            .await
            .unwrap();
        (TemplateRenderer::new(db.clone(), dir), db)
    }

    fn context() -> Value {
        json!({
            "appName": "Civic Dispatch",
            "jurisdiction": {"name": "Springfield"},
            "serviceRequest": {"publicId": 42, "status": "done"},
            "submitterName": "Marge",
            "surveyUrl": "https://survey.example.com",
        })
    }

    fn request<'a>(name: &'a str, part: TemplatePart, ctx: &'a Value) -> RenderRequest<'a> {
        RenderRequest {
            jurisdiction_id: "j1",
            channel: Channel::Email,
            comm_type: CommunicationType::Workflow,
            name,
            part,
            context: ctx,
        }
    }

    // ── interpolate tests ───────────────────────────────────────────

    #[test]
    fn interpolates_nested_paths() {
        let out = interpolate("Request #{{ serviceRequest.publicId }}: {{submitterName}}", &context());
        assert_eq!(out, "Request #42: Marge");
    }

    #[test]
    fn missing_path_renders_empty() {
        assert_eq!(interpolate("[{{ nope.deeper }}]", &context()), "[]");
        assert_eq!(interpolate("[{{ x }}]", &json!({"x": null})), "[]");
    }

    #[test]
    fn text_without_placeholders_is_untouched() {
        assert_eq!(interpolate("plain { text }", &context()), "plain { text }");
    }

    #[test]
    fn html_interpolation_escapes_values_only() {
        let ctx = json!({"d": "<a href=\"x\">Tom & 'Jerry'</a>"});
        assert_eq!(
            interpolate_html("<p>{{ d }}</p>", &ctx),
            "<p>&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;</p>"
        );
    }

    // ── renderer tests ──────────────────────────────────────────────

    #[tokio::test]
    async fn subject_has_no_boilerplate() {
        let (r, _) = renderer(None).await;
        let ctx = context();
        let subject = r
            .render(request(names::CX_SURVEY_PUBLIC_USER, TemplatePart::Subject, &ctx))
            .await
            .unwrap();
        assert_eq!(subject, "Request #42: How did we do?");
    }

    #[tokio::test]
    async fn body_appends_powered_by_then_unsubscribe() {
        let (r, _) = renderer(None).await;
        let ctx = context();
        let body = r
            .render(request(names::CX_SURVEY_PUBLIC_USER, TemplatePart::Body, &ctx))
            .await
            .unwrap();

        let lines: Vec<&str> = body.lines().collect();
        assert!(body.contains("https://survey.example.com"));
        assert!(lines[lines.len() - 2].contains("Powered by Civic Dispatch"));
        assert!(lines[lines.len() - 1].contains("Springfield"));
    }

    #[tokio::test]
    async fn email_body_escapes_submitter_markup() {
        let (r, _) = renderer(None).await;
        let link = r#"<a href="https://evil.example">Reset your password</a>"#;
        let mut ctx = context();
        ctx["serviceRequest"]["description"] = json!(link);
        ctx["submitterName"] = json!("<b>Marge</b>");

        let body = r
            .render(request(names::NEW_STAFF_USER, TemplatePart::Body, &ctx))
            .await
            .unwrap();
        assert!(!body.contains(link));
        assert!(body.contains("&lt;a href=&quot;https://evil.example&quot;&gt;"));

        // Subjects and SMS bodies are plain text and stay raw.
        ctx["serviceRequest"]["publicId"] = json!("<42>");
        let subject = r
            .render(request(names::NEW_STAFF_USER, TemplatePart::Subject, &ctx))
            .await
            .unwrap();
        assert!(subject.contains("<42>"));

        let mut sms = request(names::NEW_PUBLIC_USER, TemplatePart::Body, &ctx);
        sms.channel = Channel::Sms;
        assert!(r.render(sms).await.unwrap().contains("<42>"));
    }

    #[tokio::test]
    async fn tenant_override_takes_precedence() {
        let (r, db) = renderer(None).await;
        db.upsert_template(&Template {
            jurisdiction_id: "j1".into(),
            channel: Channel::Email,
            name: "email.cx-survey-public-user.subject".into(),
            comm_type: CommunicationType::Workflow,
            content: "Request #{{ serviceRequest.publicId }}: Tell us!".into(),
        })
        .await
        .unwrap();

        let ctx = context();
        let subject = r
            .render(request(names::CX_SURVEY_PUBLIC_USER, TemplatePart::Subject, &ctx))
            .await
            .unwrap();
        assert_eq!(subject, "Request #42: Tell us!");
    }

    #[tokio::test]
    async fn template_dir_overrides_builtin_and_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("email")).unwrap();
        std::fs::write(
            dir.path().join("email/cx-survey-public-user.subject.tmpl"),
            "From disk #{{ serviceRequest.publicId }}\n",
        )
        .unwrap();

        let (r, _) = renderer(Some(dir.path().to_path_buf())).await;
        let ctx = context();
        let subject = r
            .render(request(names::CX_SURVEY_PUBLIC_USER, TemplatePart::Subject, &ctx))
            .await
            .unwrap();
        assert_eq!(subject, "From disk #42");

        // Not on disk, so the builtin is used.
        let other = r
            .render(request(names::CLOSED_PUBLIC_USER, TemplatePart::Subject, &ctx))
            .await
            .unwrap();
        assert!(other.starts_with("Request #42:"));
    }

    #[tokio::test]
    async fn unreadable_template_propagates() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where a file is expected cannot be read as text.
        std::fs::create_dir_all(dir.path().join("email/cx-survey-public-user.subject.tmpl"))
            .unwrap();

        let (r, _) = renderer(Some(dir.path().to_path_buf())).await;
        let ctx = context();
        let err = r
            .render(request(names::CX_SURVEY_PUBLIC_USER, TemplatePart::Subject, &ctx))
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::Unreadable { .. }));
    }

    #[tokio::test]
    async fn unknown_template_is_not_found() {
        let (r, _) = renderer(None).await;
        let ctx = context();
        let err = r
            .render(request("no-such-template", TemplatePart::Body, &ctx))
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(key) if key == "email.no-such-template.body"));
    }
}
