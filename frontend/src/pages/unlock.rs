use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use gloo_timers::callback::{Interval, Timeout};
use log::info;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys::window;
use yew::prelude::*;

use crate::browser::{BrowserClock, BrowserNavigator, BrowserSlot};
use crate::components::notification::{show_toast, ToastQueue, ToastStack};
use crate::config::{GateConfig, Variant};
use crate::gate::{
    Collaborators, GateController, GateView, Notice, PageSignal, Progress, RunId, StepIndex,
    StepVisual, Tick,
};

/// What the page currently shows, written by the controller through
/// [`PageView`] and read during render.
#[derive(Default)]
struct PageModel {
    steps: BTreeMap<StepIndex, StepVisual>,
    countdowns: BTreeMap<StepIndex, u32>,
    progress: Progress,
}

struct PageView {
    model: Rc<RefCell<PageModel>>,
    toasts: Rc<RefCell<ToastQueue>>,
    redraw: Callback<()>,
}

impl GateView for PageView {
    fn countdown(&mut self, step: StepIndex, remaining_secs: u32) {
        self.model.borrow_mut().countdowns.insert(step, remaining_secs);
        self.redraw.emit(());
    }

    fn step_state(&mut self, step: StepIndex, state: StepVisual) {
        {
            let mut model = self.model.borrow_mut();
            model.steps.insert(step, state);
            if state != StepVisual::Verifying {
                model.countdowns.remove(&step);
            }
        }
        self.redraw.emit(());
    }

    fn progress(&mut self, progress: Progress) {
        self.model.borrow_mut().progress = progress;
        self.redraw.emit(());
    }

    fn notify(&mut self, notice: Notice) {
        show_toast(self.toasts.clone(), notice, self.redraw.clone());
    }
}

/// Browser intervals driving each step's countdown.
#[derive(Default)]
struct Tickers {
    running: HashMap<StepIndex, (RunId, Interval)>,
}

impl Tickers {
    fn replace(&mut self, step: StepIndex, run: RunId, interval: Interval) {
        // dropping the old interval cancels it
        self.running.insert(step, (run, interval));
    }

    fn finish(&mut self, step: StepIndex, run: RunId) {
        if matches!(self.running.get(&step), Some((current, _)) if *current == run) {
            self.running.remove(&step);
        }
    }

    fn clear(&mut self) {
        self.running.clear();
    }
}

fn requested_variant() -> Variant {
    window()
        .and_then(|w| w.location().search().ok())
        .and_then(|search| {
            search
                .trim_start_matches('?')
                .split('&')
                .find_map(|pair| pair.strip_prefix("variant=").and_then(Variant::from_query))
        })
        .unwrap_or(Variant::Classic)
}

fn launch_step(gate: Rc<RefCell<GateController>>, tickers: Rc<RefCell<Tickers>>, step: StepIndex) {
    let activation = match gate.borrow_mut().activate(step) {
        Ok(activation) => activation,
        Err(_) => return,
    };

    // give the new tab a moment to take focus before sampling
    let timeout = Timeout::new(activation.grace_ms, move || {
        let Some(run) = gate.borrow_mut().start_verification(step) else {
            return;
        };
        gate.borrow_mut().tick(step, run);

        let interval = {
            let gate = gate.clone();
            let tickers = tickers.clone();
            Interval::new(1000, move || {
                let tick = gate.borrow_mut().tick(step, run);
                if !matches!(tick, Some(Tick::Remaining(_))) {
                    // can't drop the interval from inside its own callback
                    let tickers = tickers.clone();
                    Timeout::new(0, move || {
                        tickers.borrow_mut().finish(step, run);
                    })
                    .forget();
                }
            })
        };
        tickers.borrow_mut().replace(step, run, interval);
    });
    timeout.forget();
}

fn button_label(visual: StepVisual, action: &str) -> String {
    match visual {
        StepVisual::Locked => "Locked".to_string(),
        StepVisual::Active => action.to_string(),
        StepVisual::Verifying => "Verifying...".to_string(),
        StepVisual::Retry => "Try Again".to_string(),
        StepVisual::Completed => "Completed".to_string(),
    }
}

fn card_class(visual: StepVisual) -> &'static str {
    match visual {
        StepVisual::Locked => "locked",
        StepVisual::Active | StepVisual::Retry => "active",
        StepVisual::Verifying => "verifying",
        StepVisual::Completed => "completed",
    }
}

#[function_component(Unlock)]
pub fn unlock() -> Html {
    let config = use_memo(|_| GateConfig::preset(requested_variant()), ());
    let model = use_mut_ref(PageModel::default);
    let toasts = use_mut_ref(ToastQueue::default);
    let tickers = use_mut_ref(Tickers::default);
    let show_info = use_state(|| false);
    let force_update = use_force_update();

    let redraw = {
        let force_update = force_update.clone();
        Callback::from(move |_: ()| force_update.force_update())
    };

    let gate = {
        let config = (*config).clone();
        let view = PageView {
            model: model.clone(),
            toasts: toasts.clone(),
            redraw: redraw.clone(),
        };
        use_mut_ref(move || {
            info!("Loading unlock gate ({:?})", config.variant);
            GateController::new(
                config,
                Collaborators {
                    storage: Box::new(BrowserSlot::default()),
                    view: Box::new(view),
                    navigator: Box::new(BrowserNavigator),
                    clock: Box::new(BrowserClock),
                },
            )
        })
    };

    // Presence signals and save-on-leave
    {
        let gate = gate.clone();
        let tickers = tickers.clone();
        use_effect_with_deps(move |_| {
            let window = web_sys::window().expect("no window");
            let document = window.document().expect("no document");

            let on_visibility = {
                let gate = gate.clone();
                let document = document.clone();
                Closure::wrap(Box::new(move || {
                    let signal = if document.hidden() {
                        PageSignal::Hidden
                    } else {
                        PageSignal::Visible
                    };
                    gate.borrow_mut().observe(signal);
                }) as Box<dyn FnMut()>)
            };
            let on_blur = {
                let gate = gate.clone();
                Closure::wrap(Box::new(move || {
                    gate.borrow_mut().observe(PageSignal::Blurred);
                }) as Box<dyn FnMut()>)
            };
            let on_focus = {
                let gate = gate.clone();
                Closure::wrap(Box::new(move || {
                    gate.borrow_mut().observe(PageSignal::Focused);
                }) as Box<dyn FnMut()>)
            };
            let on_unload = {
                let gate = gate.clone();
                Closure::wrap(Box::new(move || {
                    gate.borrow().persist();
                }) as Box<dyn FnMut()>)
            };

            let _ = document.add_event_listener_with_callback(
                "visibilitychange",
                on_visibility.as_ref().unchecked_ref(),
            );
            let _ = window.add_event_listener_with_callback("blur", on_blur.as_ref().unchecked_ref());
            let _ = window.add_event_listener_with_callback("focus", on_focus.as_ref().unchecked_ref());
            let _ = window.add_event_listener_with_callback(
                "beforeunload",
                on_unload.as_ref().unchecked_ref(),
            );

            move || {
                let _ = document.remove_event_listener_with_callback(
                    "visibilitychange",
                    on_visibility.as_ref().unchecked_ref(),
                );
                let _ = window.remove_event_listener_with_callback("blur", on_blur.as_ref().unchecked_ref());
                let _ = window.remove_event_listener_with_callback("focus", on_focus.as_ref().unchecked_ref());
                let _ = window.remove_event_listener_with_callback(
                    "beforeunload",
                    on_unload.as_ref().unchecked_ref(),
                );
                tickers.borrow_mut().clear();
                gate.borrow().persist();
            }
        }, ());
    }

    let on_get_destination = {
        let gate = gate.clone();
        Callback::from(move |_: MouseEvent| {
            let result = gate.borrow_mut().attempt_completion();
            if let Ok(redirect) = result {
                let gate = gate.clone();
                Timeout::new(redirect.delay_ms, move || {
                    gate.borrow().follow(&redirect);
                })
                .forget();
            }
        })
    };

    let on_reset = {
        let gate = gate.clone();
        let tickers = tickers.clone();
        Callback::from(move |_: MouseEvent| {
            let confirmed = window()
                .and_then(|w| {
                    w.confirm_with_message(
                        "Are you sure you want to reset all progress? This action cannot be undone.",
                    )
                    .ok()
                })
                .unwrap_or(false);
            if confirmed {
                tickers.borrow_mut().clear();
                gate.borrow_mut().reset();
            }
        })
    };

    let toggle_info = {
        let show_info = show_info.clone();
        Callback::from(move |_: MouseEvent| show_info.set(!*show_info))
    };

    let model = model.borrow();
    let progress = model.progress;
    let unlock_ready = progress.is_complete();

    html! {
        <div class="unlock-page">
            <style>
                {r#"
                    .unlock-page {
                        max-width: 640px;
                        margin: 0 auto;
                        padding: 3rem 1.5rem;
                        color: #fff;
                        font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif;
                    }
                    .progress-bar {
                        height: 8px;
                        background: rgba(255, 255, 255, 0.1);
                        border-radius: 4px;
                        overflow: hidden;
                    }
                    .progress-fill {
                        height: 100%;
                        background: #1e90ff;
                        transition: width 0.4s ease;
                    }
                    .step-card {
                        margin: 1rem 0;
                        padding: 1.25rem;
                        border-radius: 12px;
                        background: rgba(30, 30, 30, 0.7);
                        border: 1px solid rgba(30, 144, 255, 0.1);
                    }
                    .step-card.locked { opacity: 0.5; }
                    .step-card.completed { border-color: #2ecc71; }
                    .timer { color: #aaa; font-size: 0.9rem; margin-top: 0.5rem; }
                    .unlock-button.disabled { opacity: 0.4; cursor: not-allowed; }
                    .toast-container { position: fixed; top: 1rem; right: 1rem; z-index: 100; }
                    .toast { display: flex; gap: 0.75rem; padding: 0.75rem 1rem; margin-bottom: 0.5rem; border-radius: 8px; background: #1a1a1a; }
                    .toast.success { border-left: 4px solid #2ecc71; }
                    .toast.error { border-left: 4px solid #e74c3c; }
                    .toast.warning { border-left: 4px solid #f1c40f; }
                    .modal { position: fixed; inset: 0; background: rgba(0, 0, 0, 0.7); display: flex; align-items: center; justify-content: center; }
                    .modal-content { background: #1a1a1a; padding: 2rem; border-radius: 12px; max-width: 480px; }
                "#}
            </style>
            <ToastStack toasts={toasts.borrow().visible()} />

            <h1>{"Unlock the Script"}</h1>
            <p>{"Complete each step below to get your link."}</p>

            <div class="progress">
                <div class="progress-bar">
                    <div class="progress-fill" style={format!("width: {}%;", progress.percent())}></div>
                </div>
                <div class="progress-text">
                    <span>{format!("{} of {} completed", progress.completed, progress.total)}</span>
                    <span>{format!("{}%", progress.percent())}</span>
                </div>
            </div>

            { for config.steps.iter().enumerate().map(|(i, step)| {
                let index = i as StepIndex + 1;
                let visual = model.steps.get(&index).copied().unwrap_or(StepVisual::Locked);
                let onclick = {
                    let gate = gate.clone();
                    let tickers = tickers.clone();
                    Callback::from(move |_: MouseEvent| launch_step(gate.clone(), tickers.clone(), index))
                };
                let busy = matches!(visual, StepVisual::Verifying | StepVisual::Completed);
                html! {
                    <div key={index.to_string()} class={classes!("step-card", card_class(visual))}>
                        <h3>{format!("Step {}: {}", index, step.title)}</h3>
                        <p>{step.description.clone()}</p>
                        <button class="step-button" disabled={busy} onclick={onclick}>
                            {button_label(visual, &step.action_label)}
                        </button>
                        {
                            if let Some(secs) = model.countdowns.get(&index) {
                                html! { <div class="timer active">{format!("Verifying... {}s remaining", secs)}</div> }
                            } else {
                                html! {}
                            }
                        }
                    </div>
                }
            }) }

            <button
                class={classes!("unlock-button", if unlock_ready { "active" } else { "disabled" })}
                onclick={on_get_destination}
            >
                <span>{"Get Script"}</span>
                <small>
                    {
                        if unlock_ready {
                            "Click to get your script!".to_string()
                        } else {
                            format!("Complete all steps to unlock ({} remaining)", progress.remaining())
                        }
                    }
                </small>
            </button>

            <div class="footer-actions">
                <button class="link-button" onclick={toggle_info.clone()}>{"How does this work?"}</button>
                <button class="link-button" onclick={on_reset}>{"Reset progress"}</button>
            </div>

            {
                if *show_info {
                    html! {
                        <div class="modal" onclick={toggle_info.clone()}>
                            <div class="modal-content">
                                <h2>{"How it works"}</h2>
                                <p>{"Each step opens a page in a new tab. Do the action there, then come back to this tab. After a short countdown the step is checked and the next one unlocks."}</p>
                                <p>{"Progress is kept in this browser for 24 hours."}</p>
                            </div>
                        </div>
                    }
                } else {
                    html! {}
                }
            }
        </div>
    }
}
