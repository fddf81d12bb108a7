#[cfg(test)]
mod tests {
    use crate::{PipelineDefinition, SectorOutcome, SectorPipeline, Stage};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use database::MemoryPostRepository;
    use etl_core::{
        Comment, CoreError, LoadReport, Post, RedditApiError, Sector, SectorState,
    };
    use reddit_client::PostSource;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use transform::ArtifactWriter;

    enum Fixture {
        Posts(Vec<Post>),
        Fails,
    }

    /// Serves canned posts per sector.
    struct FixtureSource {
        fixtures: HashMap<String, Fixture>,
        calls: AtomicUsize,
    }

    impl FixtureSource {
        fn new() -> Self {
            Self {
                fixtures: HashMap::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn with(mut self, sector: &str, fixture: Fixture) -> Self {
            self.fixtures.insert(sector.to_string(), fixture);
            self
        }
    }

    #[async_trait]
    impl PostSource for FixtureSource {
        async fn fetch_posts_with_comments(
            &self,
            sector: &Sector,
            _limit: u32,
        ) -> Result<Vec<Post>, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fixtures.get(sector.as_str()) {
                Some(Fixture::Posts(posts)) => Ok(posts.clone()),
                Some(Fixture::Fails) => Err(CoreError::RedditApi(RedditApiError::ServerError {
                    status_code: 503,
                })),
                None => Ok(Vec::new()),
            }
        }
    }

    fn sector(label: &str) -> Sector {
        Sector::new(label).unwrap()
    }

    fn post(id: &str, comment_texts: &[&str]) -> Post {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap();
        Post {
            post_id: id.to_string(),
            post_title: format!("Post {}", id),
            post_text: String::new(),
            post_date: date,
            nbr_likes: 0,
            nbr_reposts: 0,
            nbr_characters: 0,
            author_id: "N/A".to_string(),
            comments: comment_texts
                .iter()
                .enumerate()
                .map(|(i, text)| Comment {
                    comment_order: i as u32 + 1,
                    comment_date: date,
                    comment_text: Some(text.to_string()),
                    comment_likes: 0,
                })
                .collect(),
        }
    }

    fn pipeline(
        source: FixtureSource,
        repository: MemoryPostRepository,
        dir: &std::path::Path,
    ) -> SectorPipeline<FixtureSource, MemoryPostRepository> {
        SectorPipeline::new(source, repository, ArtifactWriter::new(dir), 50)
    }

    #[tokio::test]
    async fn test_sector_runs_all_stages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixtureSource::new().with(
            "inwi",
            Fixture::Posts(vec![post("a", &["#hello :)"]), post("b", &[])]),
        );
        let pipeline = pipeline(source, MemoryPostRepository::new(), dir.path());

        let report = pipeline.run_sector(&sector("inwi")).await;

        assert_eq!(
            report.outcome,
            SectorOutcome::Loaded(LoadReport { inserted: 1, skipped: 0 })
        );
        assert_eq!(report.final_state, SectorState::Loaded);
        assert!(report.artifact.as_ref().unwrap().exists());

        // "b" has no comment rows, so it is never loaded
        let stored = pipeline.repository().stored_posts(&sector("inwi")).await;
        let ids: Vec<&str> = stored.iter().map(|p| p.post_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(stored[0].comments[0].cleaned_comment_text, "hello )");
        assert_eq!(stored[0].comments[0].comment.comment_text.as_deref(), Some("#hello :)"));
    }

    #[tokio::test]
    async fn test_stored_character_count_matches_raw_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut raw = post("a", &["@inwi ok"]);
        raw.post_text = "RT @inwi: réseau".to_string();
        raw.nbr_characters = Post::character_count(&raw.post_text);
        let source = FixtureSource::new().with("inwi", Fixture::Posts(vec![raw]));
        let pipeline = pipeline(source, MemoryPostRepository::new(), dir.path());

        pipeline.run_sector(&sector("inwi")).await;

        let stored = pipeline.repository().stored_posts(&sector("inwi")).await;
        assert_eq!(stored[0].post_text, "RT @inwi: réseau");
        assert_eq!(stored[0].nbr_characters, 16);
    }

    #[tokio::test]
    async fn test_rerun_skips_existing_posts() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixtureSource::new().with("inwi", Fixture::Posts(vec![post("a", &["x"])]));
        let pipeline = pipeline(source, MemoryPostRepository::new(), dir.path());

        pipeline.run_sector(&sector("inwi")).await;
        let second = pipeline.run_sector(&sector("inwi")).await;

        assert_eq!(
            second.outcome,
            SectorOutcome::Loaded(LoadReport { inserted: 0, skipped: 1 })
        );
    }

    #[tokio::test]
    async fn test_empty_extraction_writes_and_inserts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(FixtureSource::new(), MemoryPostRepository::new(), dir.path());

        let report = pipeline.run_sector(&sector("inwi")).await;

        assert_eq!(report.outcome, SectorOutcome::Skipped);
        assert_eq!(report.final_state, SectorState::Loaded);
        assert!(report.artifact.is_none());
        assert!(!dir.path().join("cleaned_comments_inwi.csv").exists());
        assert!(pipeline.repository().stored_posts(&sector("inwi")).await.is_empty());
        // The schema stage still runs
        assert!(pipeline.repository().schema_ready(&sector("inwi")).await);
    }

    #[tokio::test]
    async fn test_posts_without_any_comment_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let source =
            FixtureSource::new().with("inwi", Fixture::Posts(vec![post("a", &[]), post("b", &[])]));
        let pipeline = pipeline(source, MemoryPostRepository::new(), dir.path());

        let report = pipeline.run_sector(&sector("inwi")).await;
        assert_eq!(report.outcome, SectorOutcome::Skipped);
        assert!(pipeline.repository().stored_posts(&sector("inwi")).await.is_empty());
    }

    #[tokio::test]
    async fn test_extraction_failure_aborts_sector() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixtureSource::new().with("inwi", Fixture::Fails);
        let pipeline = pipeline(source, MemoryPostRepository::new(), dir.path());

        let report = pipeline.run_sector(&sector("inwi")).await;

        assert!(matches!(
            report.outcome,
            SectorOutcome::Aborted {
                stage: Stage::Extract,
                ..
            }
        ));
        assert_eq!(report.final_state, SectorState::Pending);
        assert!(!pipeline.repository().schema_ready(&sector("inwi")).await);
    }

    #[tokio::test]
    async fn test_artifact_failure_aborts_in_transform() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("artifacts");
        std::fs::write(&not_a_dir, "occupied").unwrap();
        let source = FixtureSource::new().with("inwi", Fixture::Posts(vec![post("a", &["one"])]));
        let pipeline = pipeline(source, MemoryPostRepository::new(), &not_a_dir);

        let report = pipeline.run_sector(&sector("inwi")).await;

        assert!(matches!(
            report.outcome,
            SectorOutcome::Aborted {
                stage: Stage::Transform,
                ..
            }
        ));
        assert_eq!(report.final_state, SectorState::SchemaReady);
        assert!(report.artifact.is_none());
        assert!(pipeline.repository().stored_posts(&sector("inwi")).await.is_empty());
    }

    #[tokio::test]
    async fn test_load_failure_is_isolated_to_its_sector() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixtureSource::new()
            .with("inwi", Fixture::Posts(vec![post("a", &["one"])]))
            .with("InternetMaroc", Fixture::Posts(vec![post("b", &["two"])]));
        let repository = MemoryPostRepository::new().fail_upserts_for(sector("inwi"));
        let pipeline = pipeline(source, repository, dir.path());

        let summary = pipeline
            .run_all(&[sector("inwi"), sector("InternetMaroc")])
            .await;

        assert_eq!(summary.reports.len(), 2);
        assert!(matches!(
            summary.reports[0].outcome,
            SectorOutcome::LoadFailed { .. }
        ));
        assert_eq!(summary.reports[0].final_state, SectorState::Transformed);
        assert_eq!(
            summary.reports[1].outcome,
            SectorOutcome::Loaded(LoadReport { inserted: 1, skipped: 0 })
        );

        assert!(!summary.is_success());
        assert_eq!(summary.failed_sectors(), vec!["inwi".to_string()]);
        assert!(pipeline
            .repository()
            .stored_posts(&sector("inwi"))
            .await
            .is_empty());

        let error = summary.into_result().unwrap_err();
        assert!(matches!(error, CoreError::PipelineFailed { .. }));
    }

    #[tokio::test]
    async fn test_run_all_success_summary() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixtureSource::new()
            .with("inwi", Fixture::Posts(vec![post("a", &["one"]), post("c", &["x"])]))
            .with("InternetMaroc", Fixture::Posts(vec![post("b", &["two"])]));
        let pipeline = pipeline(source, MemoryPostRepository::new(), dir.path());

        let summary = pipeline
            .run_all(&[sector("inwi"), sector("InternetMaroc")])
            .await;

        assert!(summary.is_success());
        assert_eq!(summary.total_loaded(), LoadReport { inserted: 3, skipped: 0 });
        assert!(dir.path().join("cleaned_comments_inwi.csv").exists());
        assert!(dir.path().join("cleaned_comments_InternetMaroc.csv").exists());
        assert!(summary.into_result().is_ok());
    }

    #[test]
    fn test_pipeline_definition() {
        let definition = PipelineDefinition::new(vec![sector("inwi"), sector("InternetMaroc")]);

        assert_eq!(definition.id, "etl_pipeline_multiple_sectors");
        assert_eq!(definition.tags, vec!["reddit", "etl", "multiple_sectors"]);
        assert_eq!(
            definition.task_ids(),
            vec![
                "extract_data_inwi",
                "create_table_inwi",
                "process_data_inwi",
                "insert_data_inwi",
                "extract_data_InternetMaroc",
                "create_table_InternetMaroc",
                "process_data_InternetMaroc",
                "insert_data_InternetMaroc",
            ]
        );
    }
}
