use chrono::NaiveDate;
use etl_core::{Comment, DocumentSet, Post, Sector};
use transform::{transform, ArtifactWriter, SkipReason, TextCleaner, TransformOutcome};

fn comment(order: u32, text: Option<&str>) -> Comment {
    Comment {
        comment_order: order,
        comment_date: NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap(),
        comment_text: text.map(str::to_string),
        comment_likes: 1,
    }
}

fn post(id: &str, comments: Vec<Comment>) -> Post {
    Post {
        post_id: id.to_string(),
        post_title: format!("Post {}", id),
        post_text: "RT @inwi: réseau".to_string(),
        post_date: NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap(),
        nbr_likes: 3,
        nbr_reposts: 0,
        nbr_characters: Post::character_count("RT @inwi: réseau"),
        author_id: "N/A".to_string(),
        comments,
    }
}

fn sector() -> Sector {
    Sector::new("inwi").unwrap()
}

#[test]
fn test_empty_document_set_is_skipped() {
    let outcome = transform(&DocumentSet::new(sector(), vec![]), &TextCleaner::default());
    assert_eq!(outcome, TransformOutcome::Skipped(SkipReason::NoPosts));
    assert!(outcome.dataset().is_none());
}

#[test]
fn test_posts_without_comments_are_skipped() {
    let documents = DocumentSet::new(sector(), vec![post("a", vec![]), post("b", vec![])]);
    let outcome = transform(&documents, &TextCleaner::default());
    assert_eq!(outcome, TransformOutcome::Skipped(SkipReason::NoComments));
}

#[test]
fn test_cleaning_keeps_raw_text_and_order() {
    let documents = DocumentSet::new(
        sector(),
        vec![
            post(
                "a",
                vec![
                    comment(1, Some("#inwi down :(")),
                    comment(2, None),
                    comment(3, Some("see https://inwi.ma")),
                ],
            ),
            post("b", vec![]),
        ],
    );

    let outcome = transform(&documents, &TextCleaner::default());
    let dataset = outcome.dataset().expect("dataset");

    // "b" has no comment rows
    assert_eq!(dataset.posts.len(), 1);
    assert_eq!(dataset.rows().count(), 3);
    assert_eq!(dataset.comment_count(), 3);

    let first = &dataset.posts[0];
    assert_eq!(first.post_text, "RT @inwi: réseau");
    assert_eq!(first.nbr_characters, 16);

    let cleaned: Vec<&str> = first
        .comments
        .iter()
        .map(|c| c.cleaned_comment_text.as_str())
        .collect();
    assert_eq!(cleaned, vec!["inwi down (", "", "see "]);

    let raw: Vec<Option<&str>> = first
        .comments
        .iter()
        .map(|c| c.comment.comment_text.as_deref())
        .collect();
    assert_eq!(
        raw,
        vec![Some("#inwi down :("), None, Some("see https://inwi.ma")]
    );

    let orders: Vec<u32> = first.comments.iter().map(|c| c.comment.comment_order).collect();
    assert_eq!(orders, vec![1, 2, 3]);
}

#[test]
fn test_transform_then_write_artifact() {
    let documents = DocumentSet::new(sector(), vec![post("a", vec![comment(1, Some("@x hi"))])]);
    let outcome = transform(&documents, &TextCleaner::default());

    let dir = tempfile::tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path());
    let path = writer.write(outcome.dataset().unwrap()).unwrap();

    assert!(path.ends_with("cleaned_comments_inwi.csv"));
    let contents = std::fs::read_to_string(path).unwrap();
    assert!(contents.lines().nth(1).unwrap().ends_with(",@x hi,1, hi"));
}
