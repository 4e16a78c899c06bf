use std::cell::RefCell;
use std::rc::Rc;

use gloo_timers::callback::Timeout;
use yew::prelude::*;

use crate::gate::Notice;
use crate::gate::NoticeKind;

/// How long a toast stays on screen.
const TOAST_LIFETIME_MS: u32 = 4000;

#[derive(Clone, Debug, PartialEq)]
pub struct Toast {
    pub id: u64,
    pub notice: Notice,
}

#[derive(Default)]
pub struct ToastQueue {
    next_id: u64,
    toasts: Vec<Toast>,
}

impl ToastQueue {
    pub fn push(&mut self, notice: Notice) -> u64 {
        self.next_id += 1;
        self.toasts.push(Toast { id: self.next_id, notice });
        self.next_id
    }

    pub fn dismiss(&mut self, id: u64) {
        self.toasts.retain(|t| t.id != id);
    }

    pub fn visible(&self) -> Vec<Toast> {
        self.toasts.clone()
    }
}

/// Queues `notice` and schedules its removal. `redraw` is called after
/// both changes.
pub fn show_toast(queue: Rc<RefCell<ToastQueue>>, notice: Notice, redraw: Callback<()>) {
    let id = queue.borrow_mut().push(notice);
    redraw.emit(());
    let timeout = Timeout::new(TOAST_LIFETIME_MS, move || {
        queue.borrow_mut().dismiss(id);
        redraw.emit(());
    });
    timeout.forget();
}

fn icon(kind: NoticeKind) -> &'static str {
    match kind {
        NoticeKind::Success => "✓",
        NoticeKind::Error => "✕",
        NoticeKind::Warning => "!",
    }
}

#[derive(Properties, PartialEq)]
pub struct ToastStackProps {
    pub toasts: Vec<Toast>,
}

#[function_component(ToastStack)]
pub fn toast_stack(props: &ToastStackProps) -> Html {
    html! {
        <div class="toast-container">
            { for props.toasts.iter().map(|toast| html! {
                <div key={toast.id.to_string()} class={classes!("toast", toast.notice.kind.css_class())}>
                    <div class="toast-icon">{icon(toast.notice.kind)}</div>
                    <div class="toast-content">
                        <h4>{toast.notice.title.clone()}</h4>
                        <p>{toast.notice.message.clone()}</p>
                    </div>
                </div>
            }) }
        </div>
    }
}
