use super::github::{IssueComment, IssueComments, PullRequest};
use crate::error::CliError;

/// Identifies the one comment `lstn` manages on a pull request.
pub const STICKY_MARKER: &str = "<!--@lstn-sticky-review-comment-->";

pub fn sticky_body(body: &str) -> String {
    format!("{STICKY_MARKER}\n\n{body}")
}

/// Updates the marked comment of `pull`, or creates it when missing.
pub async fn upsert(
    comments: &dyn IssueComments,
    pull: &PullRequest,
    body: &str,
) -> Result<IssueComment, CliError> {
    let body = sticky_body(body);
    let existing = comments
        .list(pull)
        .await?
        .into_iter()
        .find(|comment| comment.body.starts_with(STICKY_MARKER));

    match existing {
        Some(comment) => {
            tracing::debug!(comment_id = comment.id, "updating the sticky comment");
            comments.update(pull, comment.id, &body).await
        }
        None => {
            tracing::debug!(pull = pull.number, "creating the sticky comment");
            comments.create(pull, &body).await
        }
    }
}
