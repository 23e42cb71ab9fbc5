//! Batch certificate generation.
//!
//! A batch stamps one template for a set of participants. Problems that make
//! the whole batch pointless (unknown template, unreadable template file, no
//! participants) fail before anything is written. After that, each participant
//! is an independent unit: a failure is recorded on their certificate row and
//! in the summary, and the batch moves on.

pub mod export;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::future::Future;
use thiserror::Error;

use crate::config::RenderDefaults;
use crate::db::{self, Certificate, Participant, Template};
use crate::mail::{CertificateEmail, CertificateMailer, EmailOptions};
use crate::pdf::{PdfError, TemplateSource};
use crate::placement::{resolve, Placement};
use crate::storage::{certificate_stem, Area, Storage, StorageError};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("template {0} not found")]
    TemplateNotFound(i64),
    #[error("template file path is missing; please re-upload the template")]
    MissingSource,
    #[error("template file could not be read: {0}")]
    SourceUnavailable(#[source] StorageError),
    #[error("template file could not be loaded: {0}")]
    InvalidTemplate(#[source] PdfError),
    #[error("no participants found to generate certificates")]
    NoParticipants,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Body of `POST /api/certificates/generate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub template_id: i64,
    /// Empty selects every participant.
    #[serde(default)]
    pub participant_ids: Vec<i64>,
    #[serde(default)]
    pub send_email: bool,
    pub event_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub participant_id: i64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub generated: usize,
    pub emailed: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchSummary {
    fn fail(&mut self, participant_id: i64, message: String) {
        tracing::error!(participant_id, error = %message, "certificate failed");
        self.failures.push(BatchFailure {
            participant_id,
            message,
        });
    }
}

/// Persistence used by a batch.
pub trait CertificateLedger: Send + Sync {
    fn template(&self, template_id: i64) -> impl Future<Output = Result<Option<Template>, sqlx::Error>> + Send;

    /// Participants in processing order; empty `ids` means all of them.
    fn participants(&self, ids: &[i64]) -> impl Future<Output = Result<Vec<Participant>, sqlx::Error>> + Send;

    fn ensure_certificate(
        &self,
        participant_id: i64,
        template_id: i64,
    ) -> impl Future<Output = Result<Certificate, sqlx::Error>> + Send;

    fn mark_generated(&self, certificate_id: i64, pdf_path: &str) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn mark_failed(&self, certificate_id: i64, message: &str) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn mark_sent(&self, certificate_id: i64) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn mark_delivery_failed(
        &self,
        certificate_id: i64,
        message: &str,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

impl CertificateLedger for PgPool {
    async fn template(&self, template_id: i64) -> Result<Option<Template>, sqlx::Error> {
        db::get_template(self, template_id).await
    }

    async fn participants(&self, ids: &[i64]) -> Result<Vec<Participant>, sqlx::Error> {
        db::participants_for_batch(self, ids).await
    }

    async fn ensure_certificate(&self, participant_id: i64, template_id: i64) -> Result<Certificate, sqlx::Error> {
        db::ensure_certificate(self, participant_id, template_id).await
    }

    async fn mark_generated(&self, certificate_id: i64, pdf_path: &str) -> Result<(), sqlx::Error> {
        db::mark_generated(self, certificate_id, pdf_path).await
    }

    async fn mark_failed(&self, certificate_id: i64, message: &str) -> Result<(), sqlx::Error> {
        db::mark_failed(self, certificate_id, message).await
    }

    async fn mark_sent(&self, certificate_id: i64) -> Result<(), sqlx::Error> {
        db::mark_sent(self, certificate_id).await
    }

    async fn mark_delivery_failed(&self, certificate_id: i64, message: &str) -> Result<(), sqlx::Error> {
        db::mark_delivery_failed(self, certificate_id, message).await
    }
}

/// Runs one generation batch.
pub struct Generator<'a, L, M> {
    pub ledger: &'a L,
    pub mailer: &'a M,
    pub storage: &'a Storage,
    pub defaults: &'a RenderDefaults,
}

/// What the batch needs about the template, loaded once.
struct Prepared {
    template: Template,
    placement: Placement,
    source: TemplateSource,
}

impl<L: CertificateLedger, M: CertificateMailer> Generator<'_, L, M> {
    pub async fn run(&self, request: &BatchRequest) -> Result<BatchSummary, GenerationError> {
        let prepared = self.prepare(request.template_id).await?;

        let participants = self.ledger.participants(&request.participant_ids).await?;
        if participants.is_empty() {
            return Err(GenerationError::NoParticipants);
        }

        tracing::info!(
            template_id = request.template_id,
            participants = participants.len(),
            send_email = request.send_email,
            page_width = prepared.source.page_size().width,
            page_height = prepared.source.page_size().height,
            "starting certificate batch"
        );

        let mut summary = BatchSummary {
            total: participants.len(),
            ..BatchSummary::default()
        };
        for participant in &participants {
            self.process(&prepared, participant, request, &mut summary).await;
        }

        tracing::info!(
            template_id = request.template_id,
            generated = summary.generated,
            emailed = summary.emailed,
            failed = summary.failures.len(),
            "certificate batch finished"
        );
        Ok(summary)
    }

    async fn prepare(&self, template_id: i64) -> Result<Prepared, GenerationError> {
        let template = self
            .ledger
            .template(template_id)
            .await?
            .ok_or(GenerationError::TemplateNotFound(template_id))?;
        if template.stored_path.trim().is_empty() {
            return Err(GenerationError::MissingSource);
        }
        let bytes = self
            .storage
            .read(&template.stored_path)
            .await
            .map_err(GenerationError::SourceUnavailable)?;
        let source = TemplateSource::load(bytes).map_err(GenerationError::InvalidTemplate)?;

        Ok(Prepared {
            placement: template.placement(),
            template,
            source,
        })
    }

    async fn process(
        &self,
        prepared: &Prepared,
        participant: &Participant,
        request: &BatchRequest,
        summary: &mut BatchSummary,
    ) {
        let certificate = match self
            .ledger
            .ensure_certificate(participant.id, prepared.template.id)
            .await
        {
            Ok(certificate) => certificate,
            Err(e) => return summary.fail(participant.id, e.to_string()),
        };

        let (pdf_path, pdf) = match self.render(prepared, participant, request).await {
            Ok(rendered) => rendered,
            Err(message) => {
                if let Err(e) = self.ledger.mark_failed(certificate.id, &message).await {
                    tracing::warn!(certificate_id = certificate.id, error = %e, "could not record failure");
                }
                return summary.fail(participant.id, message);
            }
        };

        if let Err(e) = self.ledger.mark_generated(certificate.id, &pdf_path).await {
            return summary.fail(participant.id, e.to_string());
        }
        summary.generated += 1;

        if !request.send_email {
            return;
        }

        let options = EmailOptions {
            event_name: request.event_name.clone(),
            ..EmailOptions::default()
        };
        let sent = match CertificateEmail::compose(
            participant.id,
            &participant.display_name(),
            Some(&participant.email),
            Some(&pdf_path),
            pdf,
            &options,
        ) {
            Ok(email) => self.mailer.send(email).await,
            Err(e) => Err(e),
        };

        match sent {
            Ok(()) => {
                if let Err(e) = self.ledger.mark_sent(certificate.id).await {
                    tracing::warn!(certificate_id = certificate.id, error = %e, "could not record delivery");
                }
                summary.emailed += 1;
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(e) = self.ledger.mark_delivery_failed(certificate.id, &message).await {
                    tracing::warn!(certificate_id = certificate.id, error = %e, "could not record delivery failure");
                }
                summary.fail(participant.id, message);
            }
        }
    }

    /// Stamps and stores one certificate; returns its stored path and bytes.
    async fn render(
        &self,
        prepared: &Prepared,
        participant: &Participant,
        request: &BatchRequest,
    ) -> Result<(String, Vec<u8>), String> {
        let name = participant.display_name();
        let font = prepared.source.font();
        let draw = resolve(
            &prepared.placement,
            self.defaults,
            prepared.source.page_size(),
            &name,
            &font,
        );
        tracing::debug!(
            participant_id = participant.id,
            draw_x = draw.draw_x,
            draw_y = draw.draw_y_baseline,
            text_width = draw.text_width,
            font_size = draw.font_size,
            alignment = %draw.alignment,
            "resolved name placement"
        );

        let pdf = prepared.source.stamp(&name, &draw).map_err(|e| e.to_string())?;

        let event = request
            .event_name
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or(prepared.template.original_name.as_str());
        let stem = certificate_stem(participant.id, &name, Some(event));
        let stored = self
            .storage
            .save(Area::Generated, &pdf, ".pdf", Some(&stem))
            .await
            .map_err(|e| e.to_string())?;

        Ok((stored.relative_path, pdf))
    }
}
