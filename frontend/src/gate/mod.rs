//! Step-gating state machine: ordered steps, timed presence checks,
//! obfuscated persistence and the final completion checks.

pub mod codec;
pub mod completion;
pub mod controller;
pub mod error;
pub mod ledger;
pub mod timer;
pub mod token;

pub use controller::{
    Activation, Clock, Collaborators, ExternalNavigator, GateController, GateView, Progress,
    Redirect, StepVisual,
};
pub use error::{GateError, Notice, NoticeKind};
pub use ledger::StepIndex;
pub use timer::{PageSignal, RunId, Tick};
