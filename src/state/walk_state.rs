/// Walk state definitions for one account's paginated history traversal
///
/// A walk moves `Init -> FetchingPage -> Filtering -> (FetchingPage | Done)`.
use std::fmt;

/// Terminal result of a walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The walk reached a natural stop condition
    Success,

    /// The walk stopped on an unrecoverable failure or cancellation
    Aborted,
}

impl Outcome {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Aborted => "aborted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// The state of a walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalkState {
    /// Inputs are being validated and the account resolved
    Init,

    /// One page request is in flight
    FetchingPage,

    /// Page results are being filtered and stored
    Filtering,

    /// The walk is over
    Done(Outcome),
}

impl WalkState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// Returns true if the walk may move from `self` to `next`
    ///
    /// Any non-terminal state may abort; success is only reachable from
    /// `Filtering` (or directly after `FetchingPage` for an empty page).
    pub fn can_transition_to(&self, next: WalkState) -> bool {
        match (self, next) {
            (Self::Done(_), _) => false,
            (_, Self::Done(Outcome::Aborted)) => true,
            (Self::Init, Self::FetchingPage) => true,
            (Self::Init, Self::Done(Outcome::Success)) => true,
            (Self::FetchingPage, Self::Filtering) => true,
            (Self::FetchingPage, Self::Done(Outcome::Success)) => true,
            (Self::Filtering, Self::FetchingPage) => true,
            (Self::Filtering, Self::Done(Outcome::Success)) => true,
            _ => false,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::FetchingPage => "fetching_page",
            Self::Filtering => "filtering",
            Self::Done(Outcome::Success) => "done_success",
            Self::Done(Outcome::Aborted) => "done_aborted",
        }
    }
}

impl fmt::Display for WalkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Why a walk stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// `max_pages` pages were walked
    MaxPages,

    /// The counterparty returned an empty page
    Exhausted,

    /// A page reached articles older than the date cutoff
    DateCutoff,

    /// An unrecoverable failure aborted the walk
    Failed,

    /// The batch was cancelled
    Cancelled,
}

impl StopReason {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::MaxPages => "max_pages",
            Self::Exhausted => "exhausted",
            Self::DateCutoff => "date_cutoff",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "max_pages" => Some(Self::MaxPages),
            "exhausted" => Some(Self::Exhausted),
            "date_cutoff" => Some(Self::DateCutoff),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// The outcome a walk stopping for this reason ends with
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::MaxPages | Self::Exhausted | Self::DateCutoff => Outcome::Success,
            Self::Failed | Self::Cancelled => Outcome::Aborted,
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Self::MaxPages,
            Self::Exhausted,
            Self::DateCutoff,
            Self::Failed,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
