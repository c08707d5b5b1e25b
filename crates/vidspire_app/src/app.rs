//! Command sessions. Each session feeds engine events through the pure
//! `update` function, runs the resulting effects and renders dirty views.

use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use engine_logging::{engine_debug, engine_info, engine_warn};
use vidspire_core::{
    job_id_from_link, update, AppState, Feature, IdeaRequest, IdeaState, Msg,
    RateLimitHeaders, RateLimitSnapshot, SearchQuery, UiState, ANALYZER_FEATURE,
};
use vidspire_engine::{EngineEvent, EngineHandle};

use crate::effects::{analyzer_msg, EffectRunner};
use crate::persistence::Store;
use crate::render::Renderer;

const EVENT_WAIT: Duration = Duration::from_millis(250);
const USAGE_WAIT: Duration = Duration::from_secs(60);
const FIRST_USAGE_WAIT: Duration = Duration::from_secs(10);

pub use vidspire_engine::now_millis;

pub struct App<W: Write> {
    runner: EffectRunner,
    renderer: Renderer<W>,
}

impl<W: Write> App<W> {
    pub fn new(engine: EngineHandle, store: Store, out: W) -> Self {
        Self {
            runner: EffectRunner::new(engine, store),
            renderer: Renderer::new(out),
        }
    }

    pub fn into_output(self) -> W {
        self.renderer.into_inner()
    }

    /// Submits `video_url` and follows the job to its end. Returns whether the
    /// analysis completed.
    pub fn analyze(&mut self, video_url: &str) -> Result<bool> {
        let state = self.mount()?;
        let state = self.dispatch(state, Msg::InputChanged(video_url.to_string()))?;
        let state = self.dispatch(state, Msg::Submitted { now: now_millis() })?;
        self.follow(state)
    }

    /// Opens an existing job from a shared link or a bare job id.
    pub fn resume(&mut self, link: &str) -> Result<bool> {
        let job_id =
            job_id_from_link(link).ok_or_else(|| anyhow!("no job id found in `{link}`"))?;
        engine_info!("Resuming job {job_id}");
        let state = self.mount()?;
        let state = self.dispatch(state, Msg::ResumeRequested { job_id })?;
        self.follow(state)
    }

    /// Lists the ledger after dropping expired jobs.
    pub fn jobs(&mut self) -> Result<()> {
        let store = self.runner.store();
        let mut ledger = store.load_ledger();
        let removed = ledger.cleanup(now_millis());
        if removed > 0 {
            engine_debug!("Dropped {removed} expired job(s)");
            store.save_ledger(&ledger);
        }
        self.renderer.ledger(&ledger)?;
        Ok(())
    }

    /// Fetches the usage window of each feature. A feature whose refresh
    /// fails falls back to its stored snapshot.
    pub fn usage(&mut self, features: &[Feature]) -> Result<()> {
        for &feature in features {
            self.runner.engine().refresh_usage(feature);
        }

        let mut outstanding = features.len();
        while outstanding > 0 {
            let event = self
                .runner
                .engine()
                .recv_timeout(USAGE_WAIT)?
                .context("timed out waiting for usage")?;
            let EngineEvent::UsageRefreshed { feature, result } = event else {
                continue;
            };
            outstanding -= 1;
            let snapshot = match result {
                Ok(snapshot) => {
                    self.runner.store().save_rate_limit(feature, &snapshot);
                    snapshot
                }
                Err(err) => {
                    engine_warn!("Usage refresh for {feature} failed: {err}");
                    self.runner
                        .store()
                        .load_rate_limit(feature)
                        .unwrap_or_default()
                }
            };
            self.renderer.usage(feature, &snapshot, now_millis())?;
        }
        Ok(())
    }

    /// Runs one idea validation and renders the stream as it arrives.
    pub fn validate(&mut self, request: IdeaRequest) -> Result<bool> {
        if let Err(message) = request.validate() {
            self.renderer.message(message)?;
            return Ok(false);
        }
        if let Some(message) = self.limit_message(Feature::IdeaValidator) {
            self.renderer.message(&message)?;
            return Ok(false);
        }

        self.runner.engine().validate_idea(request);
        let mut state = IdeaState::start();
        loop {
            let Some(event) = self.runner.engine().recv_timeout(EVENT_WAIT)? else {
                continue;
            };
            match event {
                EngineEvent::Idea(message) => {
                    let next = state.clone().apply(message);
                    if next != state {
                        self.renderer.idea(&next)?;
                    }
                    state = next;
                }
                EngineEvent::IdeaFinished { result } => {
                    let next = match result {
                        Ok(headers) => {
                            self.record_headers(Feature::IdeaValidator, &headers);
                            state.clone().stream_ended()
                        }
                        Err(err) => {
                            self.record_headers(Feature::IdeaValidator, &err.rate_limit);
                            if state.is_terminal() {
                                state.clone()
                            } else {
                                IdeaState::Failed {
                                    retryable: err.is_retryable(),
                                    error: err.message,
                                }
                            }
                        }
                    };
                    if next != state {
                        self.renderer.idea(&next)?;
                    }
                    return Ok(matches!(next, IdeaState::Completed { .. }));
                }
                _ => {}
            }
        }
    }

    /// Runs one viral search.
    pub fn search(&mut self, query: SearchQuery) -> Result<bool> {
        if query.is_blank() {
            self.renderer.message("Please enter a search query")?;
            return Ok(false);
        }
        if let Some(message) = self.limit_message(Feature::ViralSearch) {
            self.renderer.message(&message)?;
            return Ok(false);
        }

        self.runner.engine().search(query);
        loop {
            let Some(event) = self.runner.engine().recv_timeout(EVENT_WAIT)? else {
                continue;
            };
            let EngineEvent::SearchCompleted { result } = event else {
                continue;
            };
            return match result {
                Ok(response) => {
                    self.record_headers(Feature::ViralSearch, &response.rate_limit);
                    self.renderer.search_results(&response.data)?;
                    Ok(true)
                }
                Err(err) => {
                    self.record_headers(Feature::ViralSearch, &err.rate_limit);
                    self.renderer.message(&format!("Search failed: {err}"))?;
                    Ok(false)
                }
            };
        }
    }

    fn mount(&mut self) -> Result<AppState> {
        let store = self.runner.store();
        let ledger = store.load_ledger();
        let snapshot = store.load_rate_limit(ANALYZER_FEATURE);

        let mut state = self.dispatch(AppState::new(), Msg::LedgerRestored(ledger))?;
        if let Some(snapshot) = snapshot {
            state = self.dispatch(state, Msg::RateLimitRestored(snapshot))?;
        }
        let state = self.dispatch(state, Msg::Mounted { now: now_millis() })?;
        let state = self.await_first_usage(state)?;
        self.renderer.pending_jobs(&state.view().pending_jobs)?;
        Ok(state)
    }

    /// Waits for the first report of the usage watch started by `Mounted`.
    /// A failed refresh or a silent server leaves the stored snapshot in charge.
    fn await_first_usage(&mut self, mut state: AppState) -> Result<AppState> {
        let deadline = Instant::now() + FIRST_USAGE_WAIT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                engine_warn!("No usage report within {FIRST_USAGE_WAIT:?}; using stored window");
                return Ok(state);
            }
            let Some(event) = self.runner.engine().recv_timeout(remaining)? else {
                continue;
            };
            match event {
                EngineEvent::UsageRefreshed { feature, .. } if feature != ANALYZER_FEATURE => {}
                EngineEvent::UsageRefreshed { result: Err(err), .. } => {
                    engine_debug!("First usage refresh failed: {err}");
                    return Ok(state);
                }
                event @ EngineEvent::UsageRefreshed { .. } => {
                    if let Some(msg) = analyzer_msg(event, now_millis()) {
                        state = self.dispatch(state, msg)?;
                    }
                    return Ok(state);
                }
                _ => {}
            }
        }
    }

    fn follow(&mut self, mut state: AppState) -> Result<bool> {
        while !state.ui().is_terminal() {
            let msg = match self.runner.engine().recv_timeout(EVENT_WAIT)? {
                Some(event) => analyzer_msg(event, now_millis()),
                None => Some(Msg::Tick),
            };
            if let Some(msg) = msg {
                state = self.dispatch(state, msg)?;
            }
        }
        let completed = matches!(state.ui(), UiState::Completed { .. });
        self.dispatch(state, Msg::Unmounted)?;
        Ok(completed)
    }

    fn dispatch(&mut self, state: AppState, msg: Msg) -> Result<AppState> {
        let (mut state, effects) = update(state, msg);
        self.runner.run(effects, &state);
        if state.consume_dirty() {
            self.renderer.analyzer(&state.view())?;
        }
        Ok(state)
    }

    fn limit_message(&self, feature: Feature) -> Option<String> {
        let now = now_millis();
        self.runner
            .store()
            .load_rate_limit(feature)
            .filter(|snapshot| snapshot.is_limited_at(now))
            .map(|snapshot| snapshot.limit_message(now))
    }

    fn record_headers(&self, feature: Feature, headers: &RateLimitHeaders) {
        let store = self.runner.store();
        let mut snapshot: RateLimitSnapshot = store.load_rate_limit(feature).unwrap_or_default();
        if snapshot.apply_headers(headers, now_millis()) {
            store.save_rate_limit(feature, &snapshot);
        }
    }
}
