use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use log::{debug, info};

use crate::error::{LocError, LocResult};
use crate::pipeline::{Stage, StageError};
use crate::session::Session;
use crate::wire::{stage_query, DecodedRequest, PoseResult};

use super::{write_localization_pairs, Orchestrator};

/// Local time stamp naming a run's result file and visualization folder.
pub const RUN_STAMP_FORMAT: &str = "%m_%d_%Y_%H:%M:%S";

impl Orchestrator {
    /// Localizes one decoded query against `session`'s sight.
    ///
    /// The run executes on its own task and holds the session lock from
    /// query staging to commit, so runs on one session never overlap each
    /// other or a maintenance reset. A caller that stops waiting does not
    /// cut the run short. Nothing in the session state changes unless
    /// every stage succeeded. `Ok(None)` means the solver ran but its
    /// answer held no usable pose.
    pub async fn run_localization(
        &self,
        session: &Arc<Session>,
        request: DecodedRequest,
    ) -> LocResult<Option<PoseResult>> {
        let orchestrator = self.clone();
        let session = Arc::clone(session);
        tokio::spawn(async move { orchestrator.localize_locked(&session, request).await })
            .await
            .map_err(|err| LocError::Storage(anyhow::anyhow!("localization task failed: {err}")))?
    }

    async fn localize_locked(
        &self,
        session: &Arc<Session>,
        request: DecodedRequest,
    ) -> LocResult<Option<PoseResult>> {
        let started = Instant::now();
        let mut state = session.lock().await;

        let layout = session.layout().clone();
        let sight_id = layout.sight_id.clone();
        let run_stamp = Local::now().format(RUN_STAMP_FORMAT).to_string();
        let result_file = layout.result_file(&run_stamp);
        let query_gps = request.gps;
        let rotation = request.rotation;

        let staged = {
            let layout = layout.clone();
            tokio::task::spawn_blocking(move || stage_query(&request, &layout))
                .await
                .map_err(|err| LocError::Storage(anyhow::anyhow!("query staging aborted: {err}")))??
        };
        debug!(
            "staged {} ({}x{}, turned {} degrees) for sight {sight_id}",
            staged.image_name,
            staged.width,
            staged.height,
            rotation.degrees()
        );

        let ranked = self.registry.rank_reference_images(
            &sight_id,
            &query_gps,
            self.settings.number_of_matches,
        )?;
        if ranked.is_empty() {
            return Err(LocError::NoReferenceImages(sight_id));
        }
        write_localization_pairs(&layout.localization_pairs, &staged.image_name, &ranked)?;

        let feature_config = self.feature_config();
        {
            let query_images = layout.query_images.clone();
            let output_dir = layout.localization_dir.clone();
            self.run_stage(Stage::ExtractFeatures, move |pipeline| {
                pipeline.extract_features(&feature_config, &query_images, &output_dir)
            })
            .await?;
        }

        {
            let matcher_config = self.matcher_config();
            let feature_name = self.settings.pipeline.feature_output.clone();
            let pairs = layout.localization_pairs.clone();
            let output_dir = layout.localization_dir.clone();
            self.run_stage(Stage::MatchFeatures, move |pipeline| {
                pipeline.match_features(&matcher_config, &pairs, &feature_name, &output_dir, false)
            })
            .await?;
        }

        {
            let layout = layout.clone();
            let result_file = result_file.clone();
            self.run_stage(Stage::Localize, move |pipeline| {
                pipeline.localize(
                    &layout.final_model,
                    &layout.intrinsics_file,
                    &layout.localization_pairs,
                    &layout.scratch_feature_file(),
                    &layout.scratch_match_file(),
                    &result_file,
                )
            })
            .await?;
        }

        let answer = tokio::fs::read_to_string(&result_file)
            .await
            .map_err(|err| LocError::stage(Stage::ReadResult, StageError::from(err)))?;
        let pose = PoseResult::parse_answer(&answer);

        state.commit_run(run_stamp, result_file, pose);
        drop(state);

        if let Some(cleanup) = &self.cleanup {
            cleanup.notify(Arc::clone(session));
        }

        info!(
            "localized query against {sight_id} ({} reference pair(s), pose {}) in {}ms",
            ranked.len(),
            if pose.is_some() { "found" } else { "missing" },
            started.elapsed().as_millis()
        );
        Ok(pose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GpsCoordinate;
    use crate::maintenance;
    use crate::orchestrator::testing::{fixture, Fixture};
    use crate::pipeline::testing::StubPipeline;
    use crate::wire::decode;
    use crate::wire::testing::{sample_jpeg, PayloadBuilder};
    use std::fs;
    use std::time::Duration;

    fn request() -> DecodedRequest {
        decode(&PayloadBuilder::new(&sample_jpeg(8, 6)).gps(48.8584, 2.2945).build()).unwrap()
    }

    #[tokio::test]
    async fn successful_run_commits_result_and_notifies() {
        let Fixture {
            dir: _dir,
            orchestrator,
            sessions,
            stub,
            ..
        } = fixture(StubPipeline::default()).await;
        let (notifier, mut inbox) = maintenance::cleanup_channel();
        let orchestrator = orchestrator.with_cleanup_notifier(notifier);
        let session = sessions.get_or_create("Tower").await.unwrap();

        let pose = orchestrator
            .run_localization(&session, request())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(pose.rotation, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(pose.position, [0.1, 0.2, 0.3]);

        let state = session.snapshot().await;
        assert!(state.cleanup_due);
        assert_eq!(state.generation, 1);
        assert_eq!(state.last_pose, Some(pose));
        assert!(state.result_file.unwrap().is_file());

        let layout = session.layout();
        assert_eq!(
            fs::read_to_string(&layout.localization_pairs).unwrap(),
            "query_image.jpg eiffel-2.jpg"
        );
        assert_eq!(
            stub.calls(),
            [Stage::ExtractFeatures, Stage::MatchFeatures, Stage::Localize]
        );

        let noticed = inbox.try_recv().unwrap();
        assert!(Arc::ptr_eq(&noticed, &session));
    }

    #[tokio::test]
    async fn failed_stage_leaves_previous_result_in_place() {
        let Fixture {
            dir: _dir,
            orchestrator,
            sessions,
            stub,
            ..
        } = fixture(StubPipeline::default()).await;
        let session = sessions.get_or_create("Tower").await.unwrap();
        orchestrator
            .run_localization(&session, request())
            .await
            .unwrap();
        let before = session.snapshot().await;

        stub.fail_at(Some(Stage::MatchFeatures));
        let err = orchestrator
            .run_localization(&session, request())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LocError::PipelineStageFailed {
                stage: Stage::MatchFeatures,
                ..
            }
        ));
        assert_eq!(session.snapshot().await, before);
    }

    #[tokio::test]
    async fn unreadable_answer_is_not_a_stage_failure() {
        let Fixture {
            dir: _dir,
            orchestrator,
            sessions,
            stub,
            ..
        } = fixture(StubPipeline::default()).await;
        stub.set_answer("query_image.jpg not a pose");
        let session = sessions.get_or_create("Tower").await.unwrap();

        let pose = orchestrator
            .run_localization(&session, request())
            .await
            .unwrap();

        assert_eq!(pose, None);
        assert!(session.snapshot().await.cleanup_due);
    }

    #[tokio::test]
    async fn top_k_limits_the_pairs() {
        let Fixture {
            dir: _dir,
            orchestrator,
            sessions,
            ..
        } = fixture(StubPipeline::default()).await;
        let session = sessions.get_or_create("Tower").await.unwrap();
        let mut request = request();
        request.gps = GpsCoordinate::new(48.8600, 2.2950);

        orchestrator
            .run_localization(&session, request)
            .await
            .unwrap();

        let pairs = fs::read_to_string(&session.layout().localization_pairs).unwrap();
        assert_eq!(pairs.lines().count(), 1);
        assert_eq!(pairs, "query_image.jpg eiffel-3.jpg");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abandoned_run_keeps_the_session_until_its_stages_finish() {
        let stub = StubPipeline::default();
        stub.hold(Stage::ExtractFeatures, Duration::from_millis(400));
        let Fixture {
            dir: _dir,
            orchestrator,
            sessions,
            stub,
            ..
        } = fixture(stub).await;
        let session = sessions.get_or_create("Tower").await.unwrap();

        let abandoned = {
            let orchestrator = orchestrator.clone();
            let session = session.clone();
            tokio::spawn(async move { orchestrator.run_localization(&session, request()).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        abandoned.abort();
        assert!(abandoned.await.unwrap_err().is_cancelled());

        orchestrator
            .run_localization(&session, request())
            .await
            .unwrap();

        assert_eq!(stub.max_running(), 1);
        assert_eq!(stub.calls().len(), 6);
        assert_eq!(session.snapshot().await.generation, 2);
    }
}
