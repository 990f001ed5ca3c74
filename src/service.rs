//! Wires configured providers into a [`QaService`].

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use drive_qa_core::completion::CompletionProvider;
use drive_qa_core::service::QaService;

use crate::completion::create_completion_provider;
use crate::config::Config;
use crate::drive::GoogleDriveSource;
use crate::embedding::create_provider;
use crate::tokenizer::create_tokenizer;

/// Build the service and the completion provider shared with intent routing.
pub fn build_service(config: &Config) -> Result<(Arc<QaService>, Arc<dyn CompletionProvider>)> {
    let source = GoogleDriveSource::from_config(&config.drive).context("Google Drive source")?;
    let embedder = create_provider(&config.embedding).context("embedding provider")?;
    let completer =
        create_completion_provider(&config.completion).context("completion provider")?;
    let tokenizer = create_tokenizer(&config.answer).context("tokenizer")?;

    info!(
        embedding = embedder.model_name(),
        completion = completer.model_name(),
        tokenizer = %config.answer.tokenizer,
        "providers ready"
    );

    let service = QaService::new(
        Arc::new(source),
        embedder,
        completer.clone(),
        tokenizer,
        config.service_settings(),
    );
    Ok((Arc::new(service), completer))
}
