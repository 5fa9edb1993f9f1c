//! Template generator

use std::path::Path;

use async_trait::async_trait;
use tracing::{instrument, trace};

use crate::ast::{Manifest, Report, ReportKind};
use crate::context::RunContext;
use crate::error::Result;
use crate::output::Output;
use crate::template::markdown_to_html;

use super::{kind_mismatch, Generator};

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

#[async_trait]
impl Generator for TemplateGenerator {
    fn name(&self) -> &'static str {
        "template"
    }

    fn init(&self, ctx: &RunContext) -> Result<()> {
        ctx.templates().init(ctx);
        Ok(())
    }

    #[instrument(skip_all, fields(report = ?report.id))]
    async fn generate(
        &self,
        ctx: &RunContext,
        _manifest: &Manifest,
        report: &Report,
        workspace: &Path,
    ) -> Result<Option<Output>> {
        let ReportKind::Template(params) = &report.kind else {
            return Err(kind_mismatch(self.name(), report));
        };

        let content = ctx.templates().render(&params.template_name, ctx)?;

        if !params.render {
            return Ok(Some(Output::text(content)));
        }

        let html = if params.is_markdown() {
            trace!("template is markdown");
            markdown_to_html(&content)
        } else {
            content
        };

        let stem = report.file_stem();
        let html_path = workspace.join(format!("{}.html", stem));
        tokio::fs::write(&html_path, html).await?;
        trace!(path = %html_path.display(), "saved HTML");

        match ctx.browser() {
            Some(browser) => {
                let pdf_path = workspace.join(format!("{}.pdf", stem));
                browser.render_pdf(&html_path, &pdf_path).await?;
                Ok(Some(Output::files(vec![pdf_path])))
            }
            None => Ok(Some(Output::files(vec![html_path]))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{MapEnv, Services};
    use crate::template::TemplateEngine;
    use crate::testing::FakeBrowser;
    use serde_json::{json, Map, Value};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _templates: TempDir,
        workspace: TempDir,
        ctx: RunContext,
    }

    fn fixture(file: &str, body: &str) -> Fixture {
        let templates = TempDir::new().unwrap();
        std::fs::write(templates.path().join(file), body).unwrap();
        let engine = TemplateEngine::with_search_path(vec![templates.path().to_path_buf()]);
        let services = Services::new("r", "0")
            .with_env(Arc::new(MapEnv::new()))
            .with_templates(Arc::new(engine));
        let mut values = Map::new();
        values.insert("team".into(), json!("core"));
        Fixture {
            _templates: templates,
            workspace: TempDir::new().unwrap(),
            ctx: RunContext::new(services, values),
        }
    }

    fn report(value: Value) -> Report {
        Report::from_value(value)
    }

    #[tokio::test]
    async fn unrendered_template_is_inline_text() {
        let fx = fixture("t.txt", "Team {{ team }}");
        let r = report(json!({ "id": "t", "templateName": "t.txt", "render": false }));
        let out = TemplateGenerator
            .generate(&fx.ctx, &Manifest::default(), &r, fx.workspace.path())
            .await
            .unwrap();
        assert_eq!(out, Some(Output::text("Team core")));
    }

    #[tokio::test]
    async fn markdown_is_written_as_html_file_without_browser() {
        let fx = fixture("t.md", "# Team {{ team }}");
        let r = report(json!({ "id": "weekly", "templateName": "t.md" }));
        let out = TemplateGenerator
            .generate(&fx.ctx, &Manifest::default(), &r, fx.workspace.path())
            .await
            .unwrap()
            .unwrap();

        let path = &out.paths()[0];
        assert_eq!(path.file_name().unwrap(), "weekly.html");
        let html = std::fs::read_to_string(path).unwrap();
        assert!(html.contains("<h1>Team core</h1>"));
    }

    #[tokio::test]
    async fn attached_browser_prints_pdf() {
        let fx = fixture("t.html", "<p>{{ team }}</p>");
        let browser = Arc::new(FakeBrowser::default());
        let ctx = fx.ctx.with_browser(browser.clone());
        let r = report(json!({ "id": "page", "templateName": "t.html" }));

        let out = TemplateGenerator
            .generate(&ctx, &Manifest::default(), &r, fx.workspace.path())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(out.paths()[0].file_name().unwrap(), "page.pdf");
        assert_eq!(browser.renders(), 1);
    }

    #[tokio::test]
    async fn missing_template_propagates() {
        let fx = fixture("t.html", "x");
        let r = report(json!({ "templateName": "nope.html" }));
        let err = TemplateGenerator
            .generate(&fx.ctx, &Manifest::default(), &r, fx.workspace.path())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NR-020");
    }
}
