//! `email` channel - delivers outputs as mail messages
//!
//! File outputs go out as attachments. Inline outputs are either staged to a
//! temp file and attached (`attachOutput`) or rendered into the message
//! body. The body comes from `emailTemplate` (inline), else the
//! `emailTemplateName` template, else a built-in default; `passThrough`
//! sends the rendered output as the body unchanged.
//!
//! Sending is delegated to a `Mailer`; the transport is not part of this
//! crate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::ast::{Manifest, Report};
use crate::context::RunContext;
use crate::error::{ReportError, Result};
use crate::output::{stage_output, Output, StagedOutput};
use crate::template::render_str;

use super::{Channel, ChannelFormat, ResolvedChannel};

pub const EMAIL_CHANNEL: &str = "email";

/// Body of an inline output message; `result` is the rendered output
pub const DEFAULT_EMAIL_TEMPLATE: &str = "{{ result }}";

/// Body of a message carrying attachments
pub const DEFAULT_ATTACHMENTS_TEMPLATE: &str = "The report output is attached.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    /// `Html` or `Text` body
    pub format: ChannelFormat,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

/// Mail transport
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

pub struct EmailChannel {
    mailer: Arc<dyn Mailer>,
}

impl EmailChannel {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    /// Envelope and subject from the channel context
    fn envelope(ctx: &RunContext, format: ChannelFormat) -> Result<EmailMessage> {
        let from = ctx
            .get_str("from", Some("EMAIL_FROM"))
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ReportError::MissingSetting {
                key: "from".to_string(),
            })?;
        let to = addresses(ctx.get_str("to", Some("EMAIL_TO")));
        if to.is_empty() {
            return Err(ReportError::MissingSetting {
                key: "to".to_string(),
            });
        }
        let subject = ctx
            .get_str("subject", Some("EMAIL_SUBJECT"))
            .map(|s| render_str(&s, ctx))
            .unwrap_or_default();

        Ok(EmailMessage {
            from: from.trim().to_string(),
            to,
            cc: addresses(ctx.get_str("cc", Some("EMAIL_CC"))),
            subject,
            format,
            body: String::new(),
            attachments: Vec::new(),
        })
    }

    fn body(ctx: &RunContext, default: &str) -> Result<String> {
        if let Some(inline) = ctx.get_str("emailTemplate", None) {
            return Ok(render_str(&inline, ctx));
        }
        match ctx.get_str("emailTemplateName", Some("EMAIL_TEMPLATE")) {
            Some(name) => {
                let templates = ctx.templates();
                templates.init(ctx);
                templates.render(&name, ctx)
            }
            None => Ok(render_str(default, ctx)),
        }
    }
}

impl std::fmt::Debug for EmailChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailChannel").finish_non_exhaustive()
    }
}

#[async_trait]
impl Channel for EmailChannel {
    fn kind(&self) -> &str {
        EMAIL_CHANNEL
    }

    fn defaults(&self) -> Map<String, Value> {
        let mut defaults = Map::new();
        defaults.insert("format".to_string(), Value::String("html".to_string()));
        defaults
    }

    #[instrument(skip_all, fields(channel = EMAIL_CHANNEL))]
    async fn publish(
        &self,
        ctx: &RunContext,
        _manifest: &Manifest,
        report: &Report,
        output: &Output,
        channel: &ResolvedChannel,
        workspace: &Path,
    ) -> Result<()> {
        let mut message = Self::envelope(ctx, channel.format)?;

        // A staged temp file lives until the message is sent
        let staged: Option<StagedOutput> = match output {
            Output::File(paths) => {
                message.attachments = read_attachments(paths, None).await?;
                message.body = Self::body(ctx, DEFAULT_ATTACHMENTS_TEMPLATE)?;
                None
            }
            Output::Inline(_) if channel.attach_output() => {
                let staged = stage_output(ctx, report, output, channel, workspace).await?;
                let name = output.output_file_name(ctx, report, channel);
                message.attachments = read_attachments(staged.paths(), Some(&name)).await?;
                message.body = Self::body(ctx, DEFAULT_ATTACHMENTS_TEMPLATE)?;
                Some(staged)
            }
            Output::Inline(_) => {
                let text = output.render(ctx, report, channel).await?;
                message.body = if channel.pass_through() {
                    text
                } else {
                    let with_result = ctx.with_value("result", Value::String(text));
                    Self::body(&with_result, DEFAULT_EMAIL_TEMPLATE)?
                };
                None
            }
        };

        debug!(
            attachments = message.attachments.len(),
            recipients = message.to.len() + message.cc.len(),
            format = %message.format,
            "sending report email"
        );
        let sent = self
            .mailer
            .send(&message)
            .await
            .map_err(|e| ReportError::ChannelFailed {
                channel: EMAIL_CHANNEL.to_string(),
                reason: e.to_string(),
            });
        drop(staged);
        sent
    }
}

/// Comma-separated address list
fn addresses(raw: Option<String>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

/// Attachment per path, named after the file unless `name` is given
async fn read_attachments(paths: &[PathBuf], name: Option<&str>) -> Result<Vec<Attachment>> {
    let mut attachments = Vec::with_capacity(paths.len());
    for path in paths {
        let name = match name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| ReportError::ChannelFailed {
                    channel: EMAIL_CHANNEL.to_string(),
                    reason: format!("not a file path: {}", path.display()),
                })?,
        };
        let content = tokio::fs::read(path).await?;
        attachments.push(Attachment { name, content });
    }
    Ok(attachments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ChannelEntry;
    use crate::context::{MapEnv, Services};
    use crate::output::QueryData;
    use crate::template::TemplateEngine;
    use crate::testing::RecordingMailer;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        mailer: Arc<RecordingMailer>,
        channel: EmailChannel,
        workspace: TempDir,
        templates: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let mailer = Arc::new(RecordingMailer::new());
            Self {
                channel: EmailChannel::new(mailer.clone()),
                mailer,
                workspace: TempDir::new().unwrap(),
                templates: TempDir::new().unwrap(),
            }
        }

        fn report(&self) -> Report {
            Report::from_value(json!({ "id": "weekly", "name": "Weekly", "query": "q" }))
        }

        async fn publish(&self, output: &Output, entry: ChannelEntry) -> Result<()> {
            let report = self.report();
            let entry = entry.with("from", "reports@example.com").with("to", "a@example.com, b@example.com");
            let resolved = ResolvedChannel::resolve(self.channel.defaults(), &report, &entry).unwrap();

            let services = Services::new("r", "0")
                .with_env(Arc::new(MapEnv::new()))
                .with_templates(Arc::new(TemplateEngine::with_search_path(vec![
                    self.templates.path().to_path_buf(),
                ])));
            let ctx = RunContext::new(services, Map::new())
                .derive_namespace("weekly", report.fields.clone())
                .derive(resolved.settings.clone());

            self.channel
                .publish(&ctx, &Manifest::default(), &report, output, &resolved, self.workspace.path())
                .await
        }

        fn sent(&self) -> EmailMessage {
            let messages = self.mailer.messages();
            assert_eq!(messages.len(), 1);
            messages[0].clone()
        }
    }

    fn table() -> Output {
        Output::from(QueryData::table(vec![json!({ "app": "api", "count": 3 })], None))
    }

    #[tokio::test]
    async fn file_outputs_are_attached() {
        let f = Fixture::new();
        let pdf = f.workspace.path().join("dashboard-g1.pdf");
        std::fs::write(&pdf, b"%PDF-g1").unwrap();

        f.publish(&Output::files(vec![pdf]), ChannelEntry::new("email").with("subject", "{{ name }} report"))
            .await
            .unwrap();

        let sent = f.sent();
        assert_eq!(sent.to, vec!["a@example.com", "b@example.com"]);
        assert_eq!(sent.subject, "Weekly report");
        assert_eq!(sent.format, ChannelFormat::Html);
        assert_eq!(sent.body, DEFAULT_ATTACHMENTS_TEMPLATE);
        assert_eq!(
            sent.attachments,
            vec![Attachment {
                name: "dashboard-g1.pdf".into(),
                content: b"%PDF-g1".to_vec()
            }]
        );
    }

    #[tokio::test]
    async fn attach_output_stages_inline_results() {
        let f = Fixture::new();
        f.publish(&table(), ChannelEntry::new("email").with("attachOutput", true))
            .await
            .unwrap();

        let sent = f.sent();
        assert_eq!(sent.attachments.len(), 1);
        assert_eq!(sent.attachments[0].name, "weekly.csv");
        assert_eq!(sent.attachments[0].content, b"app,count\napi,3\n".to_vec());
        let left: Vec<_> = std::fs::read_dir(f.workspace.path()).unwrap().collect();
        assert!(left.is_empty(), "staged file was not removed");
    }

    #[tokio::test]
    async fn inline_output_goes_through_body_template() {
        let f = Fixture::new();
        f.publish(
            &Output::text("3 deploys"),
            ChannelEntry::new("email")
                .with("emailTemplate", "<p>{{ result }}</p>")
                .with("cc", "c@example.com"),
        )
        .await
        .unwrap();

        let sent = f.sent();
        assert_eq!(sent.body, "<p>3 deploys</p>");
        assert_eq!(sent.cc, vec!["c@example.com"]);
        assert!(sent.attachments.is_empty());
    }

    #[tokio::test]
    async fn pass_through_skips_body_template() {
        let f = Fixture::new();
        f.publish(
            &Output::text("3 deploys"),
            ChannelEntry::new("email")
                .with("emailTemplate", "<p>{{ result }}</p>")
                .with("passThrough", true)
                .with("format", "text"),
        )
        .await
        .unwrap();

        let sent = f.sent();
        assert_eq!(sent.body, "3 deploys");
        assert_eq!(sent.format, ChannelFormat::Text);
    }

    #[tokio::test]
    async fn named_body_template_is_loaded() {
        let f = Fixture::new();
        std::fs::write(f.templates.path().join("mail.html"), "Results:\n{{ result }}").unwrap();
        f.publish(&table(), ChannelEntry::new("email").with("emailTemplateName", "mail.html"))
            .await
            .unwrap();

        assert_eq!(f.sent().body, "Results:\napp,count\napi,3\n");
    }

    #[tokio::test]
    async fn default_body_is_the_rendered_output() {
        let f = Fixture::new();
        f.publish(&Output::text("plain"), ChannelEntry::new("email")).await.unwrap();
        assert_eq!(f.sent().body, "plain");
    }

    #[tokio::test]
    async fn missing_recipients_is_a_setting_error() {
        let f = Fixture::new();
        let report = f.report();
        let entry = ChannelEntry::new("email").with("from", "reports@example.com");
        let resolved = ResolvedChannel::resolve(Map::new(), &report, &entry).unwrap();
        let ctx = RunContext::new(
            Services::new("r", "0").with_env(Arc::new(MapEnv::new())),
            resolved.settings.clone(),
        );

        let err = f
            .channel
            .publish(&ctx, &Manifest::default(), &report, &Output::text("x"), &resolved, f.workspace.path())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NR-012");
        assert!(f.mailer.messages().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_a_channel_error() {
        let mailer = Arc::new(RecordingMailer::failing());
        let f = Fixture {
            channel: EmailChannel::new(mailer.clone()),
            mailer,
            workspace: TempDir::new().unwrap(),
            templates: TempDir::new().unwrap(),
        };
        let err = f.publish(&Output::text("x"), ChannelEntry::new("email")).await.unwrap_err();
        assert_eq!(err.code(), "NR-040");
    }

    #[test]
    fn address_lists_are_trimmed() {
        assert_eq!(
            addresses(Some(" a@x.com ,, b@x.com".into())),
            vec!["a@x.com", "b@x.com"]
        );
        assert!(addresses(None).is_empty());
    }
}
