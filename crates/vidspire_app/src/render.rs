//! Line-oriented terminal output.
//!
//! The renderer only prints what changed since its last call, so it can be
//! handed every dirty view without flooding the terminal.

use std::io::{self, Write};

use vidspire_core::{
    format_reset_time, AgentPhase, AnalysisResult, AppViewModel, Feature, IdeaState, JobRowView,
    JobStatus, Ledger, LogLevel, Millis, RateLimitSnapshot, Transport, UiState,
    ValidationResult, VideoResult,
};

pub struct Renderer<W: Write> {
    out: W,
    last_line: Option<String>,
    last_transport: Option<Transport>,
    printed_logs: usize,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_line: None,
            last_transport: None,
            printed_logs: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn analyzer(&mut self, view: &AppViewModel) -> io::Result<()> {
        if view.transport != self.last_transport {
            if let (Some(transport), Some(job_id)) = (view.transport, &view.current_job) {
                let via = match transport {
                    Transport::Push => "live updates",
                    Transport::Poll => "polling",
                };
                writeln!(self.out, "Tracking job {job_id} via {via}")?;
            }
            self.last_transport = view.transport;
        }

        match &view.ui {
            UiState::Idle => Ok(()),
            UiState::Processing { progress, message } => {
                let line = format!("[{progress:>5.1}%] {message}");
                self.print_once(line)
            }
            UiState::Completed { result } => {
                self.last_line = None;
                self.analysis(result)
            }
            UiState::Failed { error, retryable } => {
                self.last_line = None;
                writeln!(self.out, "Analysis failed: {error}")?;
                if *retryable {
                    writeln!(self.out, "Run the command again to retry.")?;
                }
                Ok(())
            }
        }
    }

    pub fn analysis(&mut self, result: &AnalysisResult) -> io::Result<()> {
        writeln!(self.out, "Analysis complete")?;
        if let Some(video_id) = &result.video_id {
            writeln!(self.out, "  Video:      {video_id}")?;
        }
        if let Some(total) = result.total_processed {
            writeln!(self.out, "  Comments:   {total}")?;
        }
        if let Some(summary) = &result.summary {
            for (label, bucket) in [
                ("Positive", &summary.positive),
                ("Neutral", &summary.neutral),
                ("Negative", &summary.negative),
            ] {
                writeln!(
                    self.out,
                    "  {label:<10}  {:>5.1}%  ({})",
                    bucket.percentage, bucket.count
                )?;
            }
        }
        if let Some(time) = &result.processing_time {
            writeln!(self.out, "  Took:       {time}")?;
        }
        Ok(())
    }

    pub fn pending_jobs(&mut self, jobs: &[JobRowView]) -> io::Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "Pending jobs:")?;
        for job in jobs {
            self.job_row(job)?;
        }
        Ok(())
    }

    pub fn ledger(&mut self, ledger: &Ledger) -> io::Result<()> {
        let active: Vec<JobRowView> = ledger.active().iter().map(JobRowView::from).collect();
        let completed: Vec<JobRowView> =
            ledger.completed().iter().map(JobRowView::from).collect();

        writeln!(self.out, "Active jobs ({}):", active.len())?;
        for job in &active {
            self.job_row(job)?;
        }
        writeln!(self.out, "Completed jobs ({}):", completed.len())?;
        for job in &completed {
            self.job_row(job)?;
        }
        writeln!(self.out, "History ({}):", ledger.history().len())?;
        for entry in ledger.history() {
            writeln!(self.out, "  {}  {}", entry.job_id, entry.video_url)?;
        }
        Ok(())
    }

    fn job_row(&mut self, job: &JobRowView) -> io::Result<()> {
        let status = match job.status {
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(self.out, "  {}  {:<9}  {}", job.job_id, status, job.video_url)?;
        if let (JobStatus::Active, Some(progress)) = (job.status, job.progress) {
            write!(self.out, "  {progress:.0}%")?;
        }
        if let Some(stage) = &job.stage {
            write!(self.out, "  {stage}")?;
        }
        if let Some(error) = &job.error {
            write!(self.out, "  ({error})")?;
        }
        writeln!(self.out)
    }

    pub fn usage(
        &mut self,
        feature: Feature,
        snapshot: &RateLimitSnapshot,
        now: Millis,
    ) -> io::Result<()> {
        let reset = format_reset_time(snapshot.reset_in_at(now));
        write!(
            self.out,
            "{feature}: {}/{} remaining, resets in {reset}",
            snapshot.remaining, snapshot.limit
        )?;
        if snapshot.is_limited_at(now) {
            write!(self.out, " (exhausted)")?;
        }
        writeln!(self.out)
    }

    pub fn idea(&mut self, state: &IdeaState) -> io::Result<()> {
        match state {
            IdeaState::Idle => Ok(()),
            IdeaState::Processing {
                progress,
                logs,
                agents,
            } => {
                for line in logs.iter().skip(self.printed_logs) {
                    let tag = match line.level {
                        LogLevel::Info | LogLevel::Other => "info",
                        LogLevel::Success => " ok ",
                        LogLevel::Warning => "warn",
                        LogLevel::Error => "fail",
                    };
                    writeln!(self.out, "[{tag}] {}", line.message)?;
                }
                self.printed_logs = logs.len();

                let board = [
                    ("competition", agents.competition),
                    ("audience", agents.audience),
                    ("trend", agents.trend),
                    ("strategy", agents.strategy),
                ]
                .iter()
                .map(|(name, phase)| format!("{name}:{}", phase_label(*phase)))
                .collect::<Vec<_>>()
                .join(" ");
                self.print_once(format!("[{progress:>5.1}%] {board}"))
            }
            IdeaState::Completed { result } => self.validation(result),
            IdeaState::Failed { error, retryable } => {
                writeln!(self.out, "Validation failed: {error}")?;
                if *retryable {
                    writeln!(self.out, "Run the command again to retry.")?;
                }
                Ok(())
            }
        }
    }

    fn validation(&mut self, result: &ValidationResult) -> io::Result<()> {
        writeln!(self.out, "Verdict: {} (score {:.0})", result.verdict, result.score)?;
        let strategy = &result.strategy_recommendations.content_strategy;
        writeln!(self.out, "  Length: {}", strategy.optimal_video_length)?;
        writeln!(self.out, "  Hook:   {}", strategy.hook_strategy)?;
        self.bullets("Structure", &strategy.content_structure)?;
        self.bullets("Titles", &result.titles)?;
        self.bullets("Angles", &result.angles)?;
        self.bullets("Improvements", &result.improvements)
    }

    fn bullets(&mut self, heading: &str, items: &[String]) -> io::Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "  {heading}:")?;
        for item in items {
            writeln!(self.out, "    - {item}")?;
        }
        Ok(())
    }

    pub fn search_results(&mut self, videos: &[VideoResult]) -> io::Result<()> {
        if videos.is_empty() {
            return writeln!(self.out, "No videos found.");
        }
        for video in videos {
            writeln!(
                self.out,
                "{:>6.1}x  {:>12} views  {}",
                video.outlier_score,
                format_count(video.views),
                video.title
            )?;
            writeln!(self.out, "         {}  {}", video.channel, video.video_url)?;
        }
        Ok(())
    }

    pub fn message(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")
    }

    fn print_once(&mut self, line: String) -> io::Result<()> {
        if self.last_line.as_deref() == Some(line.as_str()) {
            return Ok(());
        }
        writeln!(self.out, "{line}")?;
        self.last_line = Some(line);
        Ok(())
    }
}

fn phase_label(phase: AgentPhase) -> &'static str {
    match phase {
        AgentPhase::Idle => "waiting",
        AgentPhase::Running => "running",
        AgentPhase::Completed => "done",
    }
}

/// Formats a count with thousands separators.
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
