//! Per-submission rating interaction.
//!
//! The widget tracks whether the user's vote is unsent, in progress,
//! confirmed, waiting offline or failed. Hover previews only change what is
//! drawn, never the committed rating.

use serde::{Deserialize, Serialize};

use crate::coordinator::SyncCoordinator;
use crate::error::{Error, Result};
use crate::models::{DrainReport, LocalVote, LocalVoteStatus, Rating, VoteOutcome};
use crate::remote::RemoteAuthority;

const LABEL_UNVOTED: &str = "Rate this submission:";
const LABEL_VOTED: &str = "Your Rating:";
const NOTICE_OFFLINE: &str =
    "You're offline. Your vote will be saved and submitted when you're back online.";
const NOTICE_QUEUED: &str =
    "Your vote has been saved offline and will be submitted when you're back online.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetState {
    Unvoted,
    Submitting,
    ConfirmedOnline,
    QueuedOffline,
    Failed,
}

impl WidgetState {
    /// States in which a new selection is accepted
    pub const fn accepts_selection(self) -> bool {
        matches!(self, Self::Unvoted | Self::ConfirmedOnline | Self::Failed)
    }
}

/// Rating widget for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingWidget {
    submission_id: String,
    state: WidgetState,
    rating: Option<Rating>,
    committed: Option<Rating>,
    hovered: Option<Rating>,
    error: Option<String>,
}

impl RatingWidget {
    pub fn new(submission_id: impl Into<String>) -> Self {
        Self {
            submission_id: submission_id.into(),
            state: WidgetState::Unvoted,
            rating: None,
            committed: None,
            hovered: None,
            error: None,
        }
    }

    /// Restore the widget from the vote recorded locally.
    pub fn from_local(submission_id: impl Into<String>, vote: Option<LocalVote>) -> Self {
        let mut widget = Self::new(submission_id);
        if let Some(vote) = vote {
            widget.rating = Some(vote.rating);
            widget.committed = Some(vote.rating);
            widget.state = match vote.status {
                LocalVoteStatus::Queued => WidgetState::QueuedOffline,
                LocalVoteStatus::Confirmed => WidgetState::ConfirmedOnline,
                LocalVoteStatus::Failed { reason } => {
                    widget.error = Some(format!("Could not be submitted: {reason}"));
                    WidgetState::Failed
                }
            };
        }
        widget
    }

    pub fn submission_id(&self) -> &str {
        &self.submission_id
    }

    pub const fn state(&self) -> WidgetState {
        self.state
    }

    /// Rating shown as selected
    pub const fn rating(&self) -> Option<Rating> {
        self.rating
    }

    pub const fn hovered(&self) -> Option<Rating> {
        self.hovered
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Enter `Submitting` with the user's selection.
    pub fn begin(&mut self, value: i64) -> Result<Rating> {
        if !self.state.accepts_selection() {
            return Err(Error::InvalidInput(format!(
                "selection not accepted while {:?}",
                self.state
            )));
        }
        let rating = Rating::new(value)?;
        self.state = WidgetState::Submitting;
        self.rating = Some(rating);
        self.hovered = None;
        self.error = None;
        Ok(rating)
    }

    /// Apply the result of the cast started by [`Self::begin`].
    pub fn resolve(&mut self, result: &Result<VoteOutcome>) {
        if self.state != WidgetState::Submitting {
            return;
        }
        match result {
            Ok(VoteOutcome::Confirmed) => {
                self.state = WidgetState::ConfirmedOnline;
                self.committed = self.rating;
            }
            Ok(VoteOutcome::QueuedOffline) => {
                self.state = WidgetState::QueuedOffline;
                self.committed = self.rating;
            }
            Err(error) => {
                self.state = WidgetState::Failed;
                self.rating = self.committed;
                self.error = Some(error.to_string());
            }
        }
    }

    /// Select a value and cast it through the coordinator.
    pub async fn select<R: RemoteAuthority>(
        &mut self,
        value: i64,
        coordinator: &SyncCoordinator<R>,
    ) -> Result<VoteOutcome> {
        let rating = self.begin(value)?;
        let result = coordinator
            .cast_vote(&self.submission_id, i64::from(rating.value()))
            .await;
        self.resolve(&result);
        result
    }

    /// Follow a drain report; returns whether the state changed.
    pub fn apply_report(&mut self, report: &DrainReport) -> bool {
        if self.state != WidgetState::QueuedOffline {
            return false;
        }
        if report.confirms(&self.submission_id) {
            self.state = WidgetState::ConfirmedOnline;
            true
        } else if report.fails(&self.submission_id) {
            self.state = WidgetState::Failed;
            self.error = Some("Your vote could not be submitted".to_string());
            true
        } else {
            false
        }
    }

    /// Preview a value under the pointer; invalid values clear the preview.
    pub fn hover(&mut self, value: i64) {
        self.hovered = Rating::new(value).ok();
    }

    pub fn clear_hover(&mut self) {
        self.hovered = None;
    }

    /// Whether star `position` (1-10) is drawn filled.
    pub fn is_filled(&self, position: u8) -> bool {
        self.hovered
            .or(self.rating)
            .is_some_and(|rating| position <= rating.value())
    }

    pub const fn label(&self) -> &'static str {
        if self.rating.is_some() {
            LABEL_VOTED
        } else {
            LABEL_UNVOTED
        }
    }

    /// Selected value as `n/10`
    pub fn display_value(&self) -> Option<String> {
        self.rating
            .map(|rating| format!("{}/{}", rating.value(), Rating::MAX))
    }

    /// Notice rendered under the stars, if any
    pub fn notice(&self, online: bool) -> Option<String> {
        match self.state {
            WidgetState::QueuedOffline => Some(NOTICE_QUEUED.to_string()),
            WidgetState::Failed => self.error.clone(),
            WidgetState::Unvoted if !online => Some(NOTICE_OFFLINE.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureReason, Rejection};
    use pretty_assertions::assert_eq;

    fn rating(value: i64) -> Rating {
        Rating::new(value).unwrap()
    }

    #[test]
    fn test_confirmed_flow() {
        let mut widget = RatingWidget::new("sub-1");
        assert_eq!(widget.label(), "Rate this submission:");
        assert_eq!(widget.begin(7).unwrap(), rating(7));
        assert_eq!(widget.state(), WidgetState::Submitting);

        widget.resolve(&Ok(VoteOutcome::Confirmed));
        assert_eq!(widget.state(), WidgetState::ConfirmedOnline);
        assert_eq!(widget.label(), "Your Rating:");
        assert_eq!(widget.display_value().as_deref(), Some("7/10"));
    }

    #[test]
    fn test_queued_until_report_confirms() {
        let mut widget = RatingWidget::new("sub-1");
        widget.begin(4).unwrap();
        widget.resolve(&Ok(VoteOutcome::QueuedOffline));
        assert_eq!(widget.state(), WidgetState::QueuedOffline);
        assert!(widget.notice(false).unwrap().contains("saved offline"));

        // New selections wait for the queued vote
        assert!(widget.begin(5).is_err());

        let unrelated = DrainReport {
            synced: 1,
            synced_submissions: vec!["sub-2".to_string()],
            ..DrainReport::default()
        };
        assert!(!widget.apply_report(&unrelated));

        let report = DrainReport {
            synced: 1,
            synced_submissions: vec!["sub-1".to_string()],
            ..DrainReport::default()
        };
        assert!(widget.apply_report(&report));
        assert_eq!(widget.state(), WidgetState::ConfirmedOnline);
        assert_eq!(widget.rating(), Some(rating(4)));
    }

    #[test]
    fn test_failed_drain_marks_failed() {
        let mut widget = RatingWidget::new("sub-1");
        widget.begin(2).unwrap();
        widget.resolve(&Ok(VoteOutcome::QueuedOffline));

        let report = DrainReport {
            failed: 1,
            failed_submissions: vec!["sub-1".to_string()],
            ..DrainReport::default()
        };
        assert!(widget.apply_report(&report));
        assert_eq!(widget.state(), WidgetState::Failed);
        assert!(widget.notice(true).is_some());
    }

    #[test]
    fn test_rejection_restores_committed_rating() {
        let mut widget = RatingWidget::from_local(
            "sub-1",
            Some(LocalVote {
                rating: rating(6),
                status: LocalVoteStatus::Confirmed,
            }),
        );
        widget.begin(9).unwrap();
        widget.resolve(&Err(Error::LocalDuplicateVote("sub-1".to_string())));

        assert_eq!(widget.state(), WidgetState::Failed);
        assert_eq!(widget.rating(), Some(rating(6)));
        assert_eq!(widget.notice(true).as_deref(), Some("Already voted on submission sub-1"));

        let mut fresh = RatingWidget::new("sub-2");
        fresh.begin(3).unwrap();
        fresh.resolve(&Err(Error::PermanentRejection(Rejection::CompetitionEnded)));
        assert_eq!(fresh.state(), WidgetState::Failed);
        assert_eq!(fresh.rating(), None);
        assert!(fresh.begin(3).is_ok());
    }

    #[test]
    fn test_hover_does_not_change_rating() {
        let mut widget = RatingWidget::new("sub-1");
        widget.begin(3).unwrap();
        widget.resolve(&Ok(VoteOutcome::Confirmed));

        widget.hover(8);
        assert!(widget.is_filled(8));
        assert!(!widget.is_filled(9));
        assert_eq!(widget.rating(), Some(rating(3)));

        widget.clear_hover();
        assert!(widget.is_filled(3));
        assert!(!widget.is_filled(4));

        widget.hover(42);
        assert_eq!(widget.hovered(), None);
    }

    #[test]
    fn test_from_local_status() {
        let queued = RatingWidget::from_local(
            "a",
            Some(LocalVote {
                rating: rating(5),
                status: LocalVoteStatus::Queued,
            }),
        );
        assert_eq!(queued.state(), WidgetState::QueuedOffline);

        let failed = RatingWidget::from_local(
            "b",
            Some(LocalVote {
                rating: rating(5),
                status: LocalVoteStatus::Failed {
                    reason: FailureReason::RetriesExhausted,
                },
            }),
        );
        assert_eq!(failed.state(), WidgetState::Failed);
        assert!(failed.error().is_some());

        let unvoted = RatingWidget::from_local("c", None);
        assert_eq!(unvoted.state(), WidgetState::Unvoted);
        assert!(unvoted.notice(false).unwrap().contains("You're offline"));
        assert_eq!(unvoted.notice(true), None);
    }

    #[test]
    fn test_begin_rejects_out_of_range() {
        let mut widget = RatingWidget::new("sub-1");
        assert!(widget.begin(0).is_err());
        assert_eq!(widget.state(), WidgetState::Unvoted);
    }
}
