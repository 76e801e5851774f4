//! Messages API gateway over a chat-completions upstream.
//!
//! [`MessagesGateway`] prepares a request (URL images inlined, `max_tokens`
//! filled from the catalog), translates it, calls the upstream and translates
//! the answer back. Streaming answers are driven through a fresh
//! [`StreamTranslator`] per call.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::config::{Config, TranslatorConfig};
use crate::messages::{
    ContentBlock, ImageSource, MessageContent, MessagesRequest, MessagesResponse, StreamEvent,
    ToolResultContent,
};
use crate::providers::transform::{
    StreamTranslator, normalize_model_name, parse_data_uri, translate_request, translate_response,
};
use crate::providers::types::{ChatChunk, ChatRequest};
use crate::providers::{
    ImageResolver, ModelCatalog, ProviderError, RecordStream, UpstreamClient, UpstreamRecord,
};

/// Messages events of one translated stream.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MessagesGateway {
    upstream: Arc<dyn UpstreamClient>,
    catalog: Option<Arc<dyn ModelCatalog>>,
    images: Option<Arc<dyn ImageResolver>>,
    config: Arc<TranslatorConfig>,
    log_content: bool,
}

impl MessagesGateway {
    pub fn new(upstream: Arc<dyn UpstreamClient>, config: Arc<TranslatorConfig>) -> Self {
        Self {
            upstream,
            catalog: None,
            images: None,
            config,
            log_content: false,
        }
    }

    /// Gateway using the translator settings and content logging flag of a
    /// loaded configuration.
    pub fn from_config(upstream: Arc<dyn UpstreamClient>, config: &Config) -> Self {
        Self::new(upstream, Arc::new(config.translator.clone()))
            .with_content_logging(config.logging.log_content)
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ModelCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_image_resolver(mut self, images: Arc<dyn ImageResolver>) -> Self {
        self.images = Some(images);
        self
    }

    /// Log translated request bodies at debug level.
    pub fn with_content_logging(mut self, enabled: bool) -> Self {
        self.log_content = enabled;
        self
    }

    /// Build the upstream request without sending it.
    pub async fn prepare(&self, request: &MessagesRequest) -> Result<ChatRequest, ProviderError> {
        let mut request = request.clone();

        if let Some(images) = &self.images {
            inline_images(images.as_ref(), &mut request).await;
        }

        if request.max_tokens.is_none() {
            let normalized = normalize_model_name(&request.model);
            let limit = self
                .catalog
                .as_ref()
                .and_then(|catalog| catalog.max_output_tokens(&normalized))
                .unwrap_or(self.config.default_max_tokens);
            debug!(model = %normalized, max_tokens = limit, "Filled missing max_tokens");
            request.max_tokens = Some(limit);
        }

        let translated = translate_request(&request, &self.config)?;
        if self.log_content {
            match serde_json::to_string(&translated) {
                Ok(body) => debug!(body = %body, "Translated upstream request"),
                Err(err) => debug!(error = %err, "Could not serialize translated request"),
            }
        }
        Ok(translated)
    }

    /// Non-streaming round trip.
    pub async fn messages(
        &self,
        request: &MessagesRequest,
    ) -> Result<MessagesResponse, ProviderError> {
        let mut upstream_request = self.prepare(request).await?;
        upstream_request.stream = false;

        info!(
            model = %request.model,
            upstream_model = %upstream_request.model,
            messages = upstream_request.messages.len(),
            "Forwarding messages request"
        );

        let response = self.upstream.chat(&upstream_request).await?;
        translate_response(response, &request.model)
    }

    /// Streaming round trip. Fails only if the upstream refuses the request;
    /// later failures arrive as a terminal `error` event.
    pub async fn stream_messages(
        &self,
        request: &MessagesRequest,
    ) -> Result<EventStream, ProviderError> {
        let mut upstream_request = self.prepare(request).await?;
        upstream_request.stream = true;

        info!(
            model = %request.model,
            upstream_model = %upstream_request.model,
            messages = upstream_request.messages.len(),
            "Forwarding streaming messages request"
        );

        let records = self.upstream.stream_chat(&upstream_request).await?;
        Ok(translate_stream(records, request.model.clone()))
    }
}

// ---------------------------------------------------------------------------
// Stream driver
// ---------------------------------------------------------------------------

struct DriverState {
    records: RecordStream,
    translator: StreamTranslator,
    pending: VecDeque<StreamEvent>,
}

/// Drive upstream records through a [`StreamTranslator`].
///
/// The stream starts with `ping` and ends after `message_stop` or `error`.
/// Once a finish reason has been translated the upstream is not polled
/// again. An upstream that ends before both the finish reason and the
/// terminator ends the stream with an `error` event.
pub fn translate_stream(records: RecordStream, model: String) -> EventStream {
    let translator = StreamTranslator::new(model);
    let pending = VecDeque::from([translator.start()]);
    let state = DriverState {
        records,
        translator,
        pending,
    };

    let events = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.translator.is_finished() {
                return None;
            }

            match state.records.next().await {
                Some(Ok(UpstreamRecord::Fragment(payload))) => {
                    let result = serde_json::from_str::<ChatChunk>(&payload)
                        .map_err(|err| ProviderError::MalformedFragment(err.to_string()))
                        .and_then(|chunk| state.translator.process_fragment(&chunk));
                    match result {
                        Ok(events) => state.pending.extend(events),
                        Err(err) => {
                            let event = state.translator.fail(err);
                            state.pending.push_back(event);
                        }
                    }
                }
                Some(Ok(UpstreamRecord::Done)) => {
                    let events = state.translator.finish();
                    state.pending.extend(events);
                }
                Some(Err(err)) => {
                    let event = state.translator.fail(err);
                    state.pending.push_back(event);
                }
                None => {
                    // Only reachable before a finish reason: the reply was cut off.
                    let event = state.translator.fail(ProviderError::Stream(
                        "upstream ended before [DONE]".to_string(),
                    ));
                    state.pending.push_back(event);
                }
            }
        }
    });

    Box::pin(events)
}

// ---------------------------------------------------------------------------
// Image inlining
// ---------------------------------------------------------------------------

async fn inline_images(resolver: &dyn ImageResolver, request: &mut MessagesRequest) {
    for message in &mut request.messages {
        let MessageContent::Blocks(blocks) = &mut message.content else {
            continue;
        };
        for block in blocks.iter_mut() {
            match block {
                ContentBlock::Image { source } => inline_source(resolver, source).await,
                ContentBlock::ToolResult {
                    content: ToolResultContent::Blocks(inner),
                    ..
                } => {
                    for inner_block in inner.iter_mut() {
                        if let ContentBlock::Image { source } = inner_block {
                            inline_source(resolver, source).await;
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

async fn inline_source(resolver: &dyn ImageResolver, source: &mut ImageSource) {
    let ImageSource::Url { url } = source else {
        return;
    };
    let url = url.clone();

    match resolver.resolve(&url).await {
        Ok(data_uri) => match parse_data_uri(&data_uri) {
            Some(inlined) => {
                debug!(url = %url, "Inlined image");
                *source = inlined;
            }
            None => warn!(
                url = %url,
                "Image resolver returned an unusable data URI, passing URL through"
            ),
        },
        Err(err) => warn!(
            url = %url,
            error = %err,
            "Image resolution failed, passing URL through"
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
