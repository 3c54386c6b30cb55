//! Approval gate
//!
//! Validates an incoming comment against the approval policy:
//! - Command grammar (exact match, case-sensitive, trimmed)
//! - PR eligibility (base branch, open, not draft)
//! - Actor authorization (no self-approval, team allow-list)
//!
//! A comment that is not a recognized command is *ignored*, not rejected.
//! The caller must treat ignored events as silent no-ops; only rejections
//! are reported back to the PR.

use crate::error::HostError;
use crate::event::{PrInfo, TriggerEvent};
use crate::github::PrHost;

/// Execution mode requested by a recognized command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Migrations are committed to the target databases
    Apply,
    /// Pending migrations are computed and reported but not committed
    DryRun,
}

impl Mode {
    /// True when this mode commits changes.
    #[inline]
    #[must_use]
    pub fn is_apply(self) -> bool {
        matches!(self, Self::Apply)
    }
}

/// Gate verdict for a recognized command.
///
/// `Rejected` always carries a non-empty reason; `Proceed` never does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// All checks passed; run in the given mode. Carries the allow-list
    /// teams the actor was found in, for the approval record.
    Proceed {
        /// Requested execution mode
        mode: Mode,
        /// Matching allow-list teams, lowercased
        teams: Vec<String>,
    },
    /// A policy rule failed; the reason is reported on the PR
    Rejected {
        /// Human-readable rejection reason (markdown)
        reason: String,
    },
}

/// Parses the command grammar. Exact match after trimming; anything else is
/// ignored (`None`), which the caller must distinguish from rejection.
#[must_use]
pub fn parse_command(body: &str) -> Option<Mode> {
    match body.trim() {
        "/migrate approved" => Some(Mode::Apply),
        "/migrate dry-run" => Some(Mode::DryRun),
        _ => None,
    }
}

/// Approval policy, derived from the static config.
#[derive(Debug, Clone)]
pub struct GatePolicy {
    /// Branch a PR must target
    pub base_branch: String,
    /// Allow-list of team names, lowercased
    pub approval_teams: Vec<String>,
    /// Organization the teams belong to
    pub organization: String,
}

/// Validates a recognized command against policy and PR state.
#[derive(Debug, Clone)]
pub struct ApprovalGate {
    policy: GatePolicy,
}

impl ApprovalGate {
    /// Creates a gate for the given policy.
    #[inline]
    #[must_use]
    pub fn new(policy: GatePolicy) -> Self {
        Self { policy }
    }

    /// Runs the ordered policy checks. The first failing check wins and the
    /// remaining checks are not evaluated.
    ///
    /// Order: base branch, self-approval (apply mode only), PR open, not a
    /// draft, then team membership (the only check that needs the host).
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] only when the team-membership lookup itself
    /// fails; policy violations are `Ok(Decision::Rejected { .. })`.
    pub async fn decide(
        &self,
        event: &TriggerEvent,
        pr: &PrInfo,
        mode: Mode,
        host: &dyn PrHost,
    ) -> Result<Decision, HostError> {
        if pr.base_branch != self.policy.base_branch {
            return Ok(Decision::Rejected {
                reason: format!("Base branch should be **{}**", self.policy.base_branch),
            });
        }

        // Dry-run is exempt: it commits nothing, so the author may request it.
        if mode.is_apply() && pr.author == event.comment_author {
            return Ok(Decision::Rejected {
                reason: format!("PR author @{} cannot approve their own PR", pr.author),
            });
        }

        if !pr.is_open() {
            return Ok(Decision::Rejected {
                reason: format!("PR is in **{}** state", pr.state),
            });
        }

        if pr.is_draft {
            return Ok(Decision::Rejected {
                reason: "PR is in **draft** state".to_string(),
            });
        }

        let teams = host
            .matching_teams(
                &self.policy.organization,
                &event.comment_author,
                &self.policy.approval_teams,
            )
            .await?;
        if teams.is_empty() {
            return Ok(Decision::Rejected {
                reason: format!(
                    "User @{} is not a member of any approval team ({})",
                    event.comment_author,
                    self.policy.approval_teams.join(", ")
                ),
            });
        }

        Ok(Decision::Proceed { mode, teams })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PrState;
    use async_trait::async_trait;

    struct TeamsHost(Vec<String>);

    #[async_trait]
    impl PrHost for TeamsHost {
        async fn pr_info(
            &self,
            _owner: &str,
            _repo: &str,
            _number: u64,
        ) -> Result<PrInfo, HostError> {
            unimplemented!("not used by gate tests")
        }

        async fn update_comment(
            &self,
            _owner: &str,
            _repo: &str,
            _comment_id: u64,
            _body: &str,
        ) -> Result<(), HostError> {
            unimplemented!("not used by gate tests")
        }

        async fn create_comment(
            &self,
            _owner: &str,
            _repo: &str,
            _number: u64,
            _body: &str,
        ) -> Result<(), HostError> {
            unimplemented!("not used by gate tests")
        }

        async fn add_label(
            &self,
            _owner: &str,
            _repo: &str,
            _number: u64,
            _label: &str,
            _current: &[String],
        ) -> Result<bool, HostError> {
            unimplemented!("not used by gate tests")
        }

        async fn matching_teams(
            &self,
            _organization: &str,
            _username: &str,
            _allow_list: &[String],
        ) -> Result<Vec<String>, HostError> {
            Ok(self.0.clone())
        }
    }

    fn event(author: &str) -> TriggerEvent {
        TriggerEvent {
            organization: "acme".to_string(),
            repo_owner: "acme".to_string(),
            repo_name: "billing".to_string(),
            repo_html_url: "https://github.com/acme/billing".to_string(),
            pr_number: 42,
            comment_id: 7,
            comment_body: "/migrate approved".to_string(),
            comment_author: author.to_string(),
            run_id: "1".to_string(),
        }
    }

    fn open_pr(author: &str) -> PrInfo {
        PrInfo {
            author: author.to_string(),
            base_branch: "main".to_string(),
            is_draft: false,
            state: PrState::Open,
            labels: vec![],
        }
    }

    fn gate() -> ApprovalGate {
        ApprovalGate::new(GatePolicy {
            base_branch: "main".to_string(),
            approval_teams: vec!["dba".to_string()],
            organization: "acme".to_string(),
        })
    }

    #[test]
    fn command_grammar_is_exact() {
        assert_eq!(parse_command("/migrate approved"), Some(Mode::Apply));
        assert_eq!(parse_command("  /migrate dry-run \n"), Some(Mode::DryRun));
        assert_eq!(parse_command("/migrate APPROVED"), None);
        assert_eq!(parse_command("please /migrate approved"), None);
        assert_eq!(parse_command("lgtm"), None);
    }

    #[tokio::test]
    async fn branch_mismatch_wins_over_everything() {
        let mut pr = open_pr("author");
        pr.base_branch = "develop".to_string();
        // The author self-approving would also fail, but branch is checked first.
        let decision = gate()
            .decide(&event("author"), &pr, Mode::Apply, &TeamsHost(vec![]))
            .await
            .unwrap();
        assert_eq!(
            decision,
            Decision::Rejected {
                reason: "Base branch should be **main**".to_string()
            }
        );
    }

    #[tokio::test]
    async fn self_approval_rejected_in_apply_mode() {
        let decision = gate()
            .decide(
                &event("author"),
                &open_pr("author"),
                Mode::Apply,
                &TeamsHost(vec!["dba".to_string()]),
            )
            .await
            .unwrap();
        assert!(matches!(
            decision,
            Decision::Rejected { reason } if reason.contains("cannot approve their own PR")
        ));
    }

    #[tokio::test]
    async fn self_approval_allowed_in_dry_run_mode() {
        let decision = gate()
            .decide(
                &event("author"),
                &open_pr("author"),
                Mode::DryRun,
                &TeamsHost(vec!["dba".to_string()]),
            )
            .await
            .unwrap();
        assert!(matches!(decision, Decision::Proceed { mode: Mode::DryRun, .. }));
    }

    #[tokio::test]
    async fn closed_and_draft_prs_rejected() {
        let mut closed = open_pr("author");
        closed.state = PrState::Closed;
        let decision = gate()
            .decide(&event("reviewer"), &closed, Mode::Apply, &TeamsHost(vec![]))
            .await
            .unwrap();
        assert!(matches!(
            decision,
            Decision::Rejected { reason } if reason.contains("**CLOSED**")
        ));

        let mut draft = open_pr("author");
        draft.is_draft = true;
        let decision = gate()
            .decide(&event("reviewer"), &draft, Mode::Apply, &TeamsHost(vec![]))
            .await
            .unwrap();
        assert!(matches!(
            decision,
            Decision::Rejected { reason } if reason.contains("draft")
        ));
    }

    #[tokio::test]
    async fn zero_matching_teams_rejected_in_both_modes() {
        for mode in [Mode::Apply, Mode::DryRun] {
            let decision = gate()
                .decide(
                    &event("reviewer"),
                    &open_pr("author"),
                    mode,
                    &TeamsHost(vec![]),
                )
                .await
                .unwrap();
            assert!(matches!(
                decision,
                Decision::Rejected { reason } if reason.contains("not a member")
            ));
        }
    }

    #[tokio::test]
    async fn matching_team_proceeds_and_is_recorded() {
        let decision = gate()
            .decide(
                &event("reviewer"),
                &open_pr("author"),
                Mode::Apply,
                &TeamsHost(vec!["dba".to_string()]),
            )
            .await
            .unwrap();
        assert_eq!(
            decision,
            Decision::Proceed {
                mode: Mode::Apply,
                teams: vec!["dba".to_string()]
            }
        );
    }
}
