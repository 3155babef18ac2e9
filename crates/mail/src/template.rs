//! Template rendering backed by the `email_templates` table.

use std::collections::BTreeMap;

use async_trait::async_trait;
use clinic_core::mail::{replace_variables, RenderError, RenderedEmail, TemplateRenderer};
use clinic_db::models::template::EmailTemplate;
use clinic_db::repositories::TemplateRepo;
use clinic_db::DbPool;

/// Loads a template by `(slug, locale)`, falling back to any locale of the
/// same slug, and substitutes `{{variables}}` into subject and body.
#[derive(Clone)]
pub struct DbTemplateRenderer {
    pool: DbPool,
}

impl DbTemplateRenderer {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load(&self, slug: &str, locale: &str) -> Result<EmailTemplate, RenderError> {
        let exact = TemplateRepo::find(&self.pool, slug, locale)
            .await
            .map_err(|e| RenderError::Unavailable(e.to_string()))?;
        if let Some(template) = exact {
            return Ok(template);
        }

        let fallback = TemplateRepo::find_any_locale(&self.pool, slug)
            .await
            .map_err(|e| RenderError::Unavailable(e.to_string()))?;
        match fallback {
            Some(template) => {
                tracing::debug!(slug, locale, used = %template.locale, "Template locale fallback");
                Ok(template)
            }
            None => Err(RenderError::TemplateNotFound(slug.to_string())),
        }
    }
}

#[async_trait]
impl TemplateRenderer for DbTemplateRenderer {
    async fn render(
        &self,
        template_slug: &str,
        variables: &BTreeMap<String, String>,
        locale: &str,
    ) -> Result<RenderedEmail, RenderError> {
        let template = self.load(template_slug, locale).await?;
        render_template(&template, variables)
    }
}

/// Substitute variables into a stored template.
pub fn render_template(
    template: &EmailTemplate,
    variables: &BTreeMap<String, String>,
) -> Result<RenderedEmail, RenderError> {
    if template.html_body.trim().is_empty() {
        return Err(RenderError::Invalid(format!(
            "Template {} ({}) has an empty body",
            template.slug, template.locale
        )));
    }
    Ok(RenderedEmail {
        subject: replace_variables(&template.subject, variables),
        html: replace_variables(&template.html_body, variables),
    })
}
