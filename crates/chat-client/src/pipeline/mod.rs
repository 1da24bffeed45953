use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::Url;
use shared::calendar::NormalizedEventTable;
use shared::config::{CalendarPipelineConfig, ClientConfig};
use shared::llm::parameter_intelligence_messages;
use shared::models::{ContentResponse, FinalAnswerRequest, IntelligenceRequest, PromptMessage};
use shared::timezone::parse_time_zone_or_default;
use tracing::{info, warn};

use crate::auth::TokenSource;
use crate::error::{PipelineError, TransportError};
use crate::transport::{
    build_http_client, join_path, parse_base_url, post_json, require_session_token,
};

pub mod google;
pub mod normalize;
pub mod params;

pub use google::{RawCalendarEvent, RawEventTime};
pub use normalize::normalize_events;
pub use params::{
    ParameterParseError, ParameterSource, ParsedParams, TimeWindow, default_window,
    parse_parameters, resolve_window, strip_code_fences,
};

pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Pipeline position. Runs only move forward; any failure ends in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Start,
    ParameterIntelligence,
    RawFetch,
    Normalize,
    FinalAnswer,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ParameterIntelligence => "parameter_intelligence",
            Self::RawFetch => "raw_fetch",
            Self::Normalize => "normalize",
            Self::FinalAnswer => "final_answer",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::Start => Self::ParameterIntelligence,
            Self::ParameterIntelligence => Self::RawFetch,
            Self::RawFetch => Self::Normalize,
            Self::Normalize => Self::FinalAnswer,
            Self::FinalAnswer | Self::Done => Self::Done,
            Self::Failed => Self::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network collaborators of the pipeline, one per remote stage.
pub trait PipelineServices: Send + Sync {
    /// Returns the parameter model's raw text.
    fn infer_parameters<'a>(&'a self, messages: Vec<PromptMessage>) -> ServiceFuture<'a, String>;

    fn fetch_events<'a>(
        &'a self,
        window: &'a TimeWindow,
        provider_token: &'a str,
    ) -> ServiceFuture<'a, Vec<RawCalendarEvent>>;

    fn final_answer<'a>(
        &'a self,
        user_query: &'a str,
        table: &'a NormalizedEventTable,
    ) -> ServiceFuture<'a, String>;
}

/// Jarvis API for the two model stages, the calendar provider for the fetch.
#[derive(Clone)]
pub struct HttpPipelineServices {
    client: reqwest::Client,
    api_base_url: Url,
    calendar_api_base_url: Url,
    calendar_id: String,
    tokens: Arc<dyn TokenSource>,
}

impl HttpPipelineServices {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenSource>) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_http_client(config.request_timeout_ms)?,
            api_base_url: parse_base_url(&config.api_base_url)?,
            calendar_api_base_url: parse_base_url(&config.calendar_api_base_url)?,
            calendar_id: config.calendar_id.clone(),
            tokens,
        })
    }
}

impl PipelineServices for HttpPipelineServices {
    fn infer_parameters<'a>(&'a self, messages: Vec<PromptMessage>) -> ServiceFuture<'a, String> {
        Box::pin(async move {
            let url = join_path(&self.api_base_url, &["v1", "calendar", "parameters"])?;
            let token = require_session_token(self.tokens.as_ref()).await?;
            let response: ContentResponse = post_json(
                &self.client,
                url,
                &token,
                &IntelligenceRequest { messages },
            )
            .await?;
            Ok(response.content)
        })
    }

    fn fetch_events<'a>(
        &'a self,
        window: &'a TimeWindow,
        provider_token: &'a str,
    ) -> ServiceFuture<'a, Vec<RawCalendarEvent>> {
        Box::pin(google::fetch_calendar_events(
            &self.client,
            &self.calendar_api_base_url,
            &self.calendar_id,
            provider_token,
            window,
        ))
    }

    fn final_answer<'a>(
        &'a self,
        user_query: &'a str,
        table: &'a NormalizedEventTable,
    ) -> ServiceFuture<'a, String> {
        Box::pin(async move {
            let url = join_path(&self.api_base_url, &["v1", "calendar", "answer"])?;
            let token = require_session_token(self.tokens.as_ref()).await?;
            let response: ContentResponse = post_json(
                &self.client,
                url,
                &token,
                &FinalAnswerRequest {
                    user_query: user_query.to_string(),
                    json_table_data: table.clone(),
                },
            )
            .await?;
            Ok(response.content)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    pub answer: String,
    pub table: NormalizedEventTable,
    pub window: TimeWindow,
    pub parameter_source: ParameterSource,
}

/// Calendar question answering: parameters, fetch, normalize, answer.
///
/// Stages run strictly in order with a fixed deadline each. A failed or slow
/// parameter stage degrades to the default window; any later failure aborts
/// the run without touching the remaining stages.
#[derive(Clone)]
pub struct CalendarQueryPipeline {
    services: Arc<dyn PipelineServices>,
    config: CalendarPipelineConfig,
    time_zone: Tz,
    stage_timeout: Duration,
}

impl CalendarQueryPipeline {
    pub fn new(
        services: Arc<dyn PipelineServices>,
        config: CalendarPipelineConfig,
        time_zone: Tz,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            services,
            config,
            time_zone,
            stage_timeout,
        }
    }

    pub fn from_client_config(services: Arc<dyn PipelineServices>, config: &ClientConfig) -> Self {
        Self::new(
            services,
            config.calendar.clone(),
            parse_time_zone_or_default(&config.time_zone),
            Duration::from_millis(config.stage_timeout_ms),
        )
    }

    pub async fn execute(
        &self,
        query: &str,
        provider_token: &str,
    ) -> Result<PipelineOutput, PipelineError> {
        self.execute_at(query, provider_token, Utc::now()).await
    }

    pub async fn execute_at(
        &self,
        query: &str,
        provider_token: &str,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutput, PipelineError> {
        let pipeline_started = Instant::now();
        let mut stage = PipelineStage::Start.next();

        let parameter_started = Instant::now();
        let (window, parameter_source) = self.parameter_stage(query, now).await;
        let parameter_stage_ms = parameter_started.elapsed().as_millis() as u64;
        stage = stage.next();

        let fetch_started = Instant::now();
        let raw_events = match self
            .run_stage(stage, self.services.fetch_events(&window, provider_token))
            .await
        {
            Ok(events) => events,
            Err(err) => return Err(self.fail(err, pipeline_started)),
        };
        let fetch_stage_ms = fetch_started.elapsed().as_millis() as u64;
        stage = stage.next();

        let normalize_started = Instant::now();
        let table = normalize_events(&raw_events, &window, self.time_zone);
        let normalize_stage_ms = normalize_started.elapsed().as_millis() as u64;
        stage = stage.next();

        let answer_started = Instant::now();
        let answer = match self
            .run_stage(stage, self.services.final_answer(query, &table))
            .await
        {
            Ok(answer) => answer,
            Err(err) => return Err(self.fail(err, pipeline_started)),
        };
        let answer_stage_ms = answer_started.elapsed().as_millis() as u64;
        stage = stage.next();
        debug_assert_eq!(stage, PipelineStage::Done);

        info!(
            parameter_source = parameter_source.as_str(),
            window_days = (window.end - window.start).num_days(),
            max_results = window.max_results,
            events_count = table.total_events,
            has_more_events = table.has_more_events,
            parameter_stage_ms,
            fetch_stage_ms,
            normalize_stage_ms,
            answer_stage_ms,
            total_pipeline_ms = pipeline_started.elapsed().as_millis() as u64,
            "calendar pipeline latency breakdown"
        );

        Ok(PipelineOutput {
            answer,
            table,
            window,
            parameter_source,
        })
    }

    async fn parameter_stage(
        &self,
        query: &str,
        now: DateTime<Utc>,
    ) -> (TimeWindow, ParameterSource) {
        let messages = parameter_intelligence_messages(
            query,
            now.with_timezone(&self.time_zone),
            &self.config.day_buckets,
        );

        let raw = match self
            .run_stage(
                PipelineStage::ParameterIntelligence,
                self.services.infer_parameters(messages),
            )
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "parameter stage failed, using default window");
                return (default_window(now, &self.config), ParameterSource::Default);
            }
        };

        let parsed = parse_parameters(&raw, &self.config.day_buckets);
        if let Err(err) = &parsed {
            warn!(error = %err, "parameter response rejected, using default window");
        }
        resolve_window(&parsed, now, &self.config)
    }

    async fn run_stage<T>(
        &self,
        stage: PipelineStage,
        call: ServiceFuture<'_, T>,
    ) -> Result<T, PipelineError> {
        match tokio::time::timeout(self.stage_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(PipelineError::Stage { stage, source }),
            Err(_) => Err(PipelineError::Timeout { stage }),
        }
    }

    fn fail(&self, err: PipelineError, pipeline_started: Instant) -> PipelineError {
        warn!(
            failed_stage = err.stage().as_str(),
            error = %err,
            total_pipeline_ms = pipeline_started.elapsed().as_millis() as u64,
            "calendar pipeline failed"
        );
        err
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineStage;

    #[test]
    fn stages_advance_in_fixed_order() {
        let mut stage = PipelineStage::Start;
        let mut visited = Vec::new();
        while !stage.is_terminal() {
            stage = stage.next();
            visited.push(stage.as_str());
        }

        assert_eq!(
            visited,
            vec![
                "parameter_intelligence",
                "raw_fetch",
                "normalize",
                "final_answer",
                "done"
            ]
        );
        assert_eq!(PipelineStage::Failed.next(), PipelineStage::Failed);
    }
}
