use crate::cleaner::TextCleaner;
use etl_core::{CleanedComment, CleanedDataset, DocumentSet};
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoPosts,
    NoComments,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoPosts => f.write_str("no posts extracted"),
            SkipReason::NoComments => f.write_str("no comments found"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    Skipped(SkipReason),
    Cleaned(CleanedDataset),
}

impl TransformOutcome {
    pub fn dataset(&self) -> Option<&CleanedDataset> {
        match self {
            TransformOutcome::Cleaned(dataset) => Some(dataset),
            TransformOutcome::Skipped(_) => None,
        }
    }
}

/// Cleans every comment of the document set. The dataset is built from
/// comment rows, so posts without comments are dropped.
pub fn transform(documents: &DocumentSet, cleaner: &TextCleaner) -> TransformOutcome {
    if documents.is_empty() {
        info!("Sector {}: no posts to transform", documents.sector);
        return TransformOutcome::Skipped(SkipReason::NoPosts);
    }

    if documents.comment_count() == 0 {
        info!(
            "Sector {}: {} posts but no comments to transform",
            documents.sector,
            documents.posts.len()
        );
        return TransformOutcome::Skipped(SkipReason::NoComments);
    }

    let posts = documents
        .posts
        .iter()
        .filter(|post| !post.comments.is_empty())
        .cloned()
        .map(|post| {
            post.map_comments(|comment| CleanedComment {
                cleaned_comment_text: cleaner.clean(comment.comment_text.as_deref()),
                comment,
            })
        })
        .collect();

    let dataset = CleanedDataset {
        sector: documents.sector.clone(),
        posts,
    };
    info!(
        "Sector {}: cleaned {} comments across {} posts ({} posts without comments dropped)",
        dataset.sector,
        dataset.comment_count(),
        dataset.posts.len(),
        documents.posts.len() - dataset.posts.len()
    );
    TransformOutcome::Cleaned(dataset)
}
