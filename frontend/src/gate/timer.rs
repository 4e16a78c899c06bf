//! Per-step verification countdowns.
//!
//! A run samples page visibility and window focus while the visitor is on
//! the external site. When its countdown expires the step's [`PassPolicy`]
//! decides whether the visitor plausibly left and came back. Remaining time
//! is always derived from the monotonic clock, so throttled or skipped
//! browser ticks do not stretch the countdown.

use std::collections::HashMap;

use log::debug;

use crate::gate::ledger::StepIndex;

/// Page-level presence events. Visibility and focus are tracked as two
/// separate detectors of the same "left and came back" pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageSignal {
    Hidden,
    Visible,
    Blurred,
    Focused,
}

impl PageSignal {
    fn is_departure(self) -> bool {
        matches!(self, PageSignal::Hidden | PageSignal::Blurred)
    }
}

/// Last known visibility and focus of the page, kept whether or not a run
/// is in progress. The external window usually takes focus before the
/// countdown starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PagePresence {
    hidden: bool,
    blurred: bool,
}

impl PagePresence {
    pub fn observe(&mut self, signal: PageSignal) {
        match signal {
            PageSignal::Hidden => self.hidden = true,
            PageSignal::Visible => self.hidden = false,
            PageSignal::Blurred => self.blurred = true,
            PageSignal::Focused => self.blurred = false,
        }
    }

    pub fn is_away(self) -> bool {
        self.hidden || self.blurred
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PresenceTrace {
    pub left: bool,
    pub returned: bool,
    pub window_opened: bool,
    away_since: Option<u64>,
    away_ms: u64,
}

impl PresenceTrace {
    pub fn new(window_opened: bool) -> Self {
        PresenceTrace {
            window_opened,
            ..PresenceTrace::default()
        }
    }

    /// A trace for a run that starts while the page is already hidden or
    /// unfocused; the departure counts from `now_ms`.
    pub fn departed(window_opened: bool, now_ms: u64) -> Self {
        PresenceTrace {
            left: true,
            away_since: Some(now_ms),
            ..PresenceTrace::new(window_opened)
        }
    }

    pub fn observe(&mut self, signal: PageSignal, now_ms: u64) {
        if signal.is_departure() {
            self.left = true;
            if self.away_since.is_none() {
                self.away_since = Some(now_ms);
            }
        } else if let Some(since) = self.away_since.take() {
            self.returned = true;
            self.away_ms += now_ms.saturating_sub(since);
        }
    }

    /// Total time spent away, including a departure still open at `now_ms`.
    pub fn away_ms(&self, now_ms: u64) -> u64 {
        let open = self.away_since.map_or(0, |since| now_ms.saturating_sub(since));
        self.away_ms + open
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassPolicy {
    /// The page must have been left and then shown again.
    ReturnToTab,
    /// Like `ReturnToTab`, and the visitor spent at least this long away.
    Interaction { min_interaction_ms: u64 },
    /// Coming back or merely having opened the external window is enough.
    Lenient,
    /// Passes as soon as the countdown runs out.
    Immediate,
}

impl PassPolicy {
    pub fn evaluate(&self, trace: &PresenceTrace, now_ms: u64) -> Verdict {
        let passed = match self {
            PassPolicy::ReturnToTab => trace.returned,
            PassPolicy::Interaction { min_interaction_ms } => {
                trace.returned && trace.away_ms(now_ms) >= *min_interaction_ms
            }
            PassPolicy::Lenient => trace.returned || trace.window_opened,
            PassPolicy::Immediate => true,
        };
        if passed {
            Verdict::Passed
        } else {
            Verdict::Failed
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerPhase {
    Idle,
    Running,
    Passed,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    Remaining(u32),
    Finished(Verdict),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

#[derive(Clone, Debug)]
pub struct VerificationRun {
    id: RunId,
    step: StepIndex,
    duration_ms: u64,
    policy: PassPolicy,
    started_at: u64,
    trace: PresenceTrace,
    phase: TimerPhase,
}

impl VerificationRun {
    pub fn new(id: RunId, step: StepIndex, duration_secs: u32, policy: PassPolicy) -> Self {
        VerificationRun {
            id,
            step,
            duration_ms: u64::from(duration_secs) * 1000,
            policy,
            started_at: 0,
            trace: PresenceTrace::default(),
            phase: TimerPhase::Idle,
        }
    }

    pub fn start(&mut self, now_ms: u64, window_opened: bool, away: bool) {
        if self.phase != TimerPhase::Idle {
            return;
        }
        self.started_at = now_ms;
        self.trace = if away {
            PresenceTrace::departed(window_opened, now_ms)
        } else {
            PresenceTrace::new(window_opened)
        };
        self.phase = TimerPhase::Running;
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn observe(&mut self, signal: PageSignal, now_ms: u64) {
        if self.phase == TimerPhase::Running {
            self.trace.observe(signal, now_ms);
        }
    }

    pub fn remaining_secs(&self, now_ms: u64) -> u32 {
        let elapsed = now_ms.saturating_sub(self.started_at);
        let left = self.duration_ms.saturating_sub(elapsed);
        ((left + 999) / 1000) as u32
    }

    /// Returns `None` once the run is no longer running.
    pub fn tick(&mut self, now_ms: u64) -> Option<Tick> {
        if self.phase != TimerPhase::Running {
            return None;
        }
        let elapsed = now_ms.saturating_sub(self.started_at);
        if elapsed < self.duration_ms {
            return Some(Tick::Remaining(self.remaining_secs(now_ms)));
        }
        let verdict = self.policy.evaluate(&self.trace, now_ms);
        self.phase = match verdict {
            Verdict::Passed => TimerPhase::Passed,
            Verdict::Failed => TimerPhase::Failed,
        };
        debug!("Verification {:?} of step {} finished: {:?}", self.id, self.step, verdict);
        Some(Tick::Finished(verdict))
    }
}

/// At most one running verification per step.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    next_id: u64,
    runs: HashMap<StepIndex, VerificationRun>,
}

impl TimerRegistry {
    /// Starts a run for `step`, cancelling any run it already had.
    pub fn start(
        &mut self,
        step: StepIndex,
        duration_secs: u32,
        policy: PassPolicy,
        window_opened: bool,
        away: bool,
        now_ms: u64,
    ) -> RunId {
        self.next_id += 1;
        let id = RunId(self.next_id);
        let mut run = VerificationRun::new(id, step, duration_secs, policy);
        run.start(now_ms, window_opened, away);
        if let Some(previous) = self.runs.insert(step, run) {
            debug!("Cancelled verification {:?} for step {}", previous.id(), step);
        }
        id
    }

    pub fn observe_all(&mut self, signal: PageSignal, now_ms: u64) {
        for run in self.runs.values_mut() {
            run.observe(signal, now_ms);
        }
    }

    /// Advances the run `id` of `step`. Ticks for cancelled or replaced runs
    /// return `None`; a finished run is dropped from the registry.
    pub fn tick(&mut self, step: StepIndex, id: RunId, now_ms: u64) -> Option<Tick> {
        let run = self.runs.get_mut(&step).filter(|run| run.id() == id)?;
        let tick = run.tick(now_ms)?;
        if let Tick::Finished(_) = tick {
            self.runs.remove(&step);
        }
        Some(tick)
    }

    pub fn is_running(&self, step: StepIndex) -> bool {
        self.runs.contains_key(&step)
    }

    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.runs.len();
        self.runs.clear();
        cancelled
    }

    #[cfg(test)]
    pub fn running_count(&self) -> usize {
        self.runs.len()
    }
}
