use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Warning,
}

impl NoticeKind {
    pub fn css_class(self) -> &'static str {
        match self {
            NoticeKind::Success => "success",
            NoticeKind::Error => "error",
            NoticeKind::Warning => "warning",
        }
    }
}

/// A transient message for the toast area.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Notice {
            kind,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Notice::new(NoticeKind::Success, title, message)
    }
}

/// Every way a gate operation can be refused. None of these are fatal,
/// the page always falls back to a state the visitor can retry from.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("step {0} does not exist")]
    UnknownStep(u8),
    #[error("step {step} is locked until step {requires} is completed")]
    LockedStep { step: u8, requires: u8 },
    #[error("verification of step {0} is already running")]
    InProgress(u8),
    #[error("step {0} is already completed")]
    AlreadyCompleted(u8),
    #[error("the window for step {0} was blocked")]
    PopupBlocked(u8),
    #[error("step {0} could not be verified")]
    VerificationFailed(u8),
    #[error("{completed} of {total} steps completed")]
    IncompleteGate { completed: u8, total: u8 },
    #[error("step timestamps are too close together (spread {spread_ms:?} ms)")]
    TimingAnomaly { spread_ms: Option<i64> },
}

impl GateError {
    pub fn notice(&self) -> Notice {
        match self {
            GateError::UnknownStep(_) => Notice::new(
                NoticeKind::Error,
                "Unknown Step",
                "That step is not part of this page.",
            ),
            GateError::LockedStep { requires, .. } => Notice::new(
                NoticeKind::Error,
                "Step Locked",
                format!("Please complete step {} first.", requires),
            ),
            GateError::InProgress(_) => Notice::new(
                NoticeKind::Warning,
                "Please Wait",
                "Verification is already in progress.",
            ),
            GateError::AlreadyCompleted(step) => Notice::new(
                NoticeKind::Warning,
                "Already Done",
                format!("Step {} is already completed.", step),
            ),
            GateError::PopupBlocked(_) => Notice::new(
                NoticeKind::Error,
                "Popup Blocked",
                "Please allow popups for this site and try again.",
            ),
            GateError::VerificationFailed(_) => Notice::new(
                NoticeKind::Warning,
                "Verification Failed",
                "Please complete the action on the external site.",
            ),
            GateError::IncompleteGate { .. } => Notice::new(
                NoticeKind::Error,
                "Not Completed",
                "Please complete all verification steps first.",
            ),
            GateError::TimingAnomaly { .. } => Notice::new(
                NoticeKind::Error,
                "Verification Error",
                "Please complete each step properly.",
            ),
        }
    }
}
