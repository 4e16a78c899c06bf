use std::collections::BTreeSet;

use log::{debug, info, warn};

use crate::config::GateConfig;
use crate::gate::codec::{SlotStorage, Snapshot, SnapshotStore};
use crate::gate::completion::{CompletionValidator, TokenCheck};
use crate::gate::error::{GateError, Notice};
use crate::gate::ledger::{StepIndex, StepLedger};
use crate::gate::timer::{PagePresence, PageSignal, RunId, Tick, TimerRegistry, Verdict};
use crate::gate::token::SessionToken;

/// How a step card should currently look.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepVisual {
    Locked,
    Active,
    Verifying,
    Retry,
    Completed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub completed: u8,
    pub total: u8,
}

impl Progress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((u32::from(self.completed) * 100 + u32::from(self.total) / 2) / u32::from(self.total)) as u8
    }

    pub fn remaining(&self) -> u8 {
        self.total.saturating_sub(self.completed)
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

/// Rendering side of the page.
pub trait GateView {
    fn countdown(&mut self, step: StepIndex, remaining_secs: u32);
    fn step_state(&mut self, step: StepIndex, state: StepVisual);
    fn progress(&mut self, progress: Progress);
    fn notify(&mut self, notice: Notice);
}

pub trait ExternalNavigator {
    /// Opens `url` in a new browsing context; `false` if it was blocked.
    fn open_external(&self, url: &str) -> bool;
    fn redirect(&self, url: &str);
}

pub trait Clock {
    /// Milliseconds since the unix epoch.
    fn wall_ms(&self) -> i64;
    /// Milliseconds from an arbitrary origin, never goes backwards.
    fn monotonic_ms(&self) -> u64;
}

pub struct Collaborators {
    pub storage: Box<dyn SlotStorage>,
    pub view: Box<dyn GateView>,
    pub navigator: Box<dyn ExternalNavigator>,
    pub clock: Box<dyn Clock>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Activation {
    pub step: StepIndex,
    /// Wait this long before calling `start_verification`.
    pub grace_ms: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redirect {
    pub url: String,
    pub delay_ms: u32,
}

pub struct GateController {
    config: GateConfig,
    ledger: StepLedger,
    token: SessionToken,
    store: SnapshotStore,
    timers: TimerRegistry,
    presence: PagePresence,
    retry: BTreeSet<StepIndex>,
    view: Box<dyn GateView>,
    navigator: Box<dyn ExternalNavigator>,
    clock: Box<dyn Clock>,
}

impl GateController {
    /// Restores progress from storage, or starts a fresh session.
    pub fn new(config: GateConfig, parts: Collaborators) -> Self {
        let Collaborators { storage, view, navigator, clock } = parts;
        let store = SnapshotStore::new(storage, config.storage_key.clone(), config.snapshot_ttl_ms);
        let now = clock.wall_ms();

        let restored = store.load(now).and_then(|snapshot| {
            let ledger = StepLedger::from_steps(config.total_steps(), config.ordering, snapshot.steps)?;
            Some((ledger, snapshot.session_token))
        });

        let (ledger, token, welcome_back) = match restored {
            Some((mut ledger, token)) => {
                let abandoned = ledger.abandon_in_flight();
                if !abandoned.is_empty() {
                    debug!("Dropped unfinished attempts for steps {:?}", abandoned);
                }
                info!("Restored progress: {} of {} steps", ledger.completed_count(), ledger.total());
                (ledger, token, true)
            }
            None => {
                let ledger = StepLedger::new(config.total_steps(), config.ordering);
                let token = SessionToken::mint(&config.secret, now, &mut rand::thread_rng());
                info!("Starting a new unlock session");
                (ledger, token, false)
            }
        };

        let mut controller = GateController {
            config,
            ledger,
            token,
            store,
            timers: TimerRegistry::default(),
            presence: PagePresence::default(),
            retry: BTreeSet::new(),
            view,
            navigator,
            clock,
        };
        controller.persist();
        controller.refresh_view();

        let progress = controller.progress();
        if welcome_back && progress.completed > 0 && !progress.is_complete() {
            controller.view.notify(Notice::success(
                "Welcome Back!",
                format!(
                    "You have {} step(s) completed. Continue to unlock.",
                    progress.completed
                ),
            ));
        }
        controller
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn ledger(&self) -> &StepLedger {
        &self.ledger
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.ledger.completed_count(),
            total: self.ledger.total(),
        }
    }

    pub fn is_running(&self, step: StepIndex) -> bool {
        self.timers.is_running(step)
    }

    pub fn visual_for(&self, step: StepIndex) -> StepVisual {
        match self.ledger.get(step) {
            Some(s) if s.verified => StepVisual::Completed,
            Some(s) if s.clicked => StepVisual::Verifying,
            Some(_) if !self.ledger.is_unlocked(step) => StepVisual::Locked,
            Some(_) if self.retry.contains(&step) => StepVisual::Retry,
            Some(_) => StepVisual::Active,
            None => StepVisual::Locked,
        }
    }

    pub fn refresh_view(&mut self) {
        for step in 1..=self.ledger.total() {
            let visual = self.visual_for(step);
            self.view.step_state(step, visual);
        }
        let progress = self.progress();
        self.view.progress(progress);
    }

    pub fn persist(&self) {
        let snapshot = Snapshot::capture(&self.ledger, &self.token, self.clock.wall_ms());
        self.store.save(&snapshot);
    }

    /// Opens the step's external action. Refusals are also shown to the
    /// visitor as notices.
    pub fn activate(&mut self, step: StepIndex) -> Result<Activation, GateError> {
        let result = self.try_activate(step);
        if let Err(e) = &result {
            warn!("Step {} not started: {}", step, e);
            self.view.notify(e.notice());
        }
        result
    }

    fn try_activate(&mut self, step: StepIndex) -> Result<Activation, GateError> {
        self.ledger.check_activation(step)?;
        let url = self
            .config
            .step(step)
            .map(|s| s.action_url.clone())
            .ok_or(GateError::UnknownStep(step))?;

        self.retry.remove(&step);
        self.ledger.mark_clicked(step, self.clock.wall_ms(), true)?;
        self.persist();

        if !self.navigator.open_external(&url) {
            self.ledger.reset_attempt(step);
            self.persist();
            let visual = self.visual_for(step);
            self.view.step_state(step, visual);
            return Err(GateError::PopupBlocked(step));
        }

        self.view.step_state(step, StepVisual::Verifying);
        Ok(Activation {
            step,
            grace_ms: self.config.launch_grace_ms,
        })
    }

    /// Starts the countdown for a step that was activated. Returns `None`
    /// if the step is no longer waiting for verification.
    pub fn start_verification(&mut self, step: StepIndex) -> Option<RunId> {
        if !self.ledger.is_in_progress(step) {
            debug!("Step {} is not waiting for verification", step);
            return None;
        }
        let wait_secs = self.config.step(step)?.wait_secs;
        let policy = self.config.effective_policy(step)?;
        let window_opened = self.ledger.get(step).map_or(false, |s| s.window_opened);

        let away = self.presence.is_away();
        let id = self.timers.start(
            step,
            wait_secs,
            policy,
            window_opened,
            away,
            self.clock.monotonic_ms(),
        );
        self.view.step_state(step, StepVisual::Verifying);
        Some(id)
    }

    pub fn tick(&mut self, step: StepIndex, run: RunId) -> Option<Tick> {
        let tick = self.timers.tick(step, run, self.clock.monotonic_ms())?;
        match tick {
            Tick::Remaining(secs) => self.view.countdown(step, secs),
            Tick::Finished(Verdict::Passed) => self.on_passed(step),
            Tick::Finished(Verdict::Failed) => self.on_failed(step),
        }
        Some(tick)
    }

    pub fn observe(&mut self, signal: PageSignal) {
        self.presence.observe(signal);
        self.timers.observe_all(signal, self.clock.monotonic_ms());
        if matches!(signal, PageSignal::Hidden | PageSignal::Visible) {
            self.persist();
        }
    }

    fn on_passed(&mut self, step: StepIndex) {
        if let Err(e) = self.ledger.mark_verified(step, self.clock.wall_ms()) {
            warn!("Discarding verification of step {}: {}", step, e);
            self.ledger.reset_attempt(step);
            self.persist();
            self.refresh_view();
            self.view.notify(e.notice());
            return;
        }
        info!("Step {} verified", step);

        self.view.step_state(step, StepVisual::Completed);
        let next = step + 1;
        if next <= self.ledger.total() {
            let visual = self.visual_for(next);
            self.view.step_state(next, visual);
        }
        let progress = self.progress();
        self.view.progress(progress);
        self.persist();
        self.view.notify(Notice::success(
            "Step Completed!",
            format!("Step {} has been verified successfully.", step),
        ));
    }

    fn on_failed(&mut self, step: StepIndex) {
        info!("Step {} failed verification", step);
        self.ledger.reset_attempt(step);
        self.retry.insert(step);
        self.view.step_state(step, StepVisual::Retry);
        self.persist();
        self.view.notify(GateError::VerificationFailed(step).notice());
    }

    /// Final checks before handing out the destination.
    pub fn attempt_completion(&mut self) -> Result<Redirect, GateError> {
        let validator = CompletionValidator {
            secret: &self.config.secret,
            min_spread_ms: self.config.min_spread_ms,
        };
        let now = self.clock.wall_ms();
        match validator.validate(&self.ledger, &mut self.token, now, &mut rand::thread_rng()) {
            Ok(check) => {
                if check == TokenCheck::Replaced {
                    self.persist();
                }
                info!("Gate completed, redirecting");
                self.view.notify(Notice::success("Unlocking Script...", "Redirecting you now!"));
                Ok(Redirect {
                    url: self.config.destination_url.clone(),
                    delay_ms: self.config.redirect_delay_ms,
                })
            }
            Err(e) => {
                warn!("Completion refused: {}", e);
                self.view.notify(e.notice());
                Err(e)
            }
        }
    }

    pub fn follow(&self, redirect: &Redirect) {
        self.navigator.redirect(&redirect.url);
    }

    /// Forgets all progress. The slot stays empty until the next mutation.
    pub fn reset(&mut self) {
        let cancelled = self.timers.cancel_all();
        self.store.clear();
        self.ledger = StepLedger::new(self.config.total_steps(), self.config.ordering);
        self.token = SessionToken::mint(&self.config.secret, self.clock.wall_ms(), &mut rand::thread_rng());
        self.retry.clear();
        info!("Progress reset, {} verification(s) cancelled", cancelled);
        self.refresh_view();
    }
}
