mod common;

use adf_pipeline::audio::pipeline::reduce_states;
use adf_pipeline::audio::types::{EqualizerConfig, I2sConfig, PcmStreamConfig};
use adf_pipeline::{
    ElementId, ElementState, Equalizer, I2sReader, I2sWriter, PcmSink, PcmSource, Pipeline,
    PipelineConfig, PipelineError, PipelineEvent, PipelineState,
};
use common::{calls_for, new_log, order_of, CallLog, FakeStage, StageCall};
use proptest::prelude::*;

fn test_config() -> PipelineConfig {
    PipelineConfig {
        name: "pipeline_tests".to_string(),
        stop_timeout_ms: 200,
        ..Default::default()
    }
}

/// reader -> equalizer -> writer
fn playback_pipeline(log: &CallLog) -> (Pipeline, ElementId, ElementId, ElementId) {
    let mut pipeline = Pipeline::new(test_config()).unwrap();
    let reader = pipeline
        .add_element(Box::new(I2sReader::new(
            "reader",
            &I2sConfig::default(),
            FakeStage::boxed("reader", log),
        )))
        .unwrap();
    let eq = pipeline
        .add_element(Box::new(Equalizer::new(
            "equalizer",
            &EqualizerConfig::default(),
            FakeStage::boxed("equalizer", log),
        )))
        .unwrap();
    let writer = pipeline
        .add_element(Box::new(I2sWriter::new(
            "writer",
            &I2sConfig::default(),
            FakeStage::boxed("writer", log),
        )))
        .unwrap();
    (pipeline, reader, eq, writer)
}

fn rank(state: ElementState) -> u8 {
    match state {
        ElementState::Unavailable => 7,
        ElementState::Starting | ElementState::Preparing => 6,
        ElementState::Stopping => 5,
        ElementState::Pausing => 4,
        ElementState::Resuming => 3,
        ElementState::Paused => 2,
        ElementState::Running => 1,
        ElementState::Stopped => 0,
    }
}

/// Highest-precedence state present, computed independently
fn expected_state(states: &[ElementState]) -> PipelineState {
    match states.iter().copied().max_by_key(|s| rank(*s)) {
        None => PipelineState::Unavailable,
        Some(ElementState::Preparing) => PipelineState::Starting,
        Some(s) => PipelineState::from(s),
    }
}

fn element_state_strategy() -> impl Strategy<Value = ElementState> {
    prop::sample::select(ElementState::ALL.to_vec())
}

proptest! {
    #[test]
    fn test_reduction_matches_precedence(states in prop::collection::vec(element_state_strategy(), 1..8)) {
        prop_assert_eq!(reduce_states(&states), expected_state(&states));
    }
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;

    #[test]
    fn test_reduction_exhaustive_for_small_pipelines() {
        let all = ElementState::ALL;
        let mut checked = 0;
        for len in 2..=4u32 {
            for combo in 0..all.len().pow(len) {
                let mut index = combo;
                let states: Vec<ElementState> = (0..len)
                    .map(|_| {
                        let state = all[index % all.len()];
                        index /= all.len();
                        state
                    })
                    .collect();
                assert_eq!(reduce_states(&states), expected_state(&states), "{states:?}");
                checked += 1;
            }
        }
        assert_eq!(checked, 81 + 729 + 6561);
    }

    #[test]
    fn test_topology_order_enforced() {
        let log = new_log();
        let mut pipeline = Pipeline::new(test_config()).unwrap();
        pipeline
            .add_element(Box::new(I2sWriter::new(
                "writer",
                &I2sConfig::default(),
                FakeStage::boxed("writer", &log),
            )))
            .unwrap();

        let err = pipeline
            .add_element(Box::new(I2sReader::new(
                "reader",
                &I2sConfig::default(),
                FakeStage::boxed("reader", &log),
            )))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTopology(_)), "got {err:?}");
    }

    #[test]
    fn test_duplicate_and_invalid_names_rejected() {
        let log = new_log();
        let mut pipeline = Pipeline::new(test_config()).unwrap();
        pipeline
            .add_element(Box::new(I2sReader::new(
                "reader",
                &I2sConfig::default(),
                FakeStage::boxed("reader", &log),
            )))
            .unwrap();

        let duplicate = pipeline.add_element(Box::new(I2sReader::new(
            "reader",
            &I2sConfig::default(),
            FakeStage::boxed("reader", &log),
        )));
        assert!(matches!(duplicate, Err(PipelineError::InvalidTopology(_))));

        let bad_name = pipeline.add_element(Box::new(I2sReader::new(
            "bad;name",
            &I2sConfig::default(),
            FakeStage::boxed("bad", &log),
        )));
        assert!(matches!(bad_name, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            stop_timeout_ms: 0,
            ..test_config()
        };
        assert!(matches!(Pipeline::new(config), Err(PipelineError::Config(_))));
    }

    #[tokio::test]
    async fn test_start_requires_source_and_sink() {
        let log = new_log();
        let mut pipeline = Pipeline::new(test_config()).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Unavailable);
        assert!(matches!(
            pipeline.start().await,
            Err(PipelineError::InvalidTopology(_))
        ));

        pipeline
            .add_element(Box::new(I2sReader::new(
                "reader",
                &I2sConfig::default(),
                FakeStage::boxed("reader", &log),
            )))
            .unwrap();
        assert!(matches!(
            pipeline.start().await,
            Err(PipelineError::InvalidTopology(_))
        ));
        assert!(calls_for(&log, "reader").is_empty());
    }

    #[tokio::test]
    async fn test_start_and_stop_ordering() {
        let log = new_log();
        let (mut pipeline, ..) = playback_pipeline(&log);
        assert_eq!(pipeline.state(), PipelineState::Unavailable);

        pipeline.start().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);
        assert_eq!(
            order_of(&log, &StageCall::Run),
            vec!["reader", "equalizer", "writer"]
        );

        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(
            order_of(&log, &StageCall::RequestStop),
            vec!["writer", "equalizer", "reader"]
        );
    }

    #[tokio::test]
    async fn test_start_twice_changes_nothing() {
        let log = new_log();
        let (mut pipeline, ..) = playback_pipeline(&log);
        pipeline.start().await.unwrap();
        let states = pipeline.element_states();
        let calls = log.lock().unwrap().len();

        pipeline.start().await.unwrap();
        assert_eq!(pipeline.element_states(), states);
        assert_eq!(log.lock().unwrap().len(), calls);
    }

    #[tokio::test]
    async fn test_stop_continues_past_stuck_element() {
        let log = new_log();
        let config = PipelineConfig {
            stop_timeout_ms: 30,
            ..test_config()
        };
        let mut pipeline = Pipeline::new(config).unwrap();
        pipeline
            .add_element(Box::new(I2sReader::new(
                "reader",
                &I2sConfig::default(),
                FakeStage::boxed("reader", &log),
            )))
            .unwrap();
        let writer = pipeline
            .add_element(Box::new(I2sWriter::new(
                "writer",
                &I2sConfig::default(),
                Box::new(FakeStage::new("writer", &log).stuck_on_stop()),
            )))
            .unwrap();
        pipeline.start().await.unwrap();

        let err = pipeline.stop().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Element(adf_pipeline::audio::ElementError::StopTimeout { .. })
        ));
        assert_eq!(pipeline.element_state(writer).unwrap(), ElementState::Stopping);
        assert_eq!(pipeline.element_state(ElementId(0)).unwrap(), ElementState::Stopped);
        assert_eq!(pipeline.state(), PipelineState::Stopping);
    }

    #[tokio::test]
    async fn test_state_subscribers_see_transitions() {
        let log = new_log();
        let (mut pipeline, ..) = playback_pipeline(&log);
        let state_rx = pipeline.subscribe_state();
        let mut events = pipeline.subscribe_events();

        pipeline.start().await.unwrap();
        assert_eq!(*state_rx.borrow(), PipelineState::Running);

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            if let PipelineEvent::StateChanged { current, .. } = event {
                last = Some(current);
            }
        }
        assert_eq!(last, Some(PipelineState::Running));
    }

    #[tokio::test]
    async fn test_element_downcast() {
        let log = new_log();
        let (mut pipeline, reader, eq, _) = playback_pipeline(&log);
        pipeline.start().await.unwrap();

        pipeline
            .element_mut::<Equalizer>(eq)
            .unwrap()
            .set_eq(4, 3)
            .unwrap();
        assert_eq!(
            calls_for(&log, "equalizer").last(),
            Some(&StageCall::SetBandGain(4, 3))
        );

        assert!(matches!(
            pipeline.element_mut::<Equalizer>(reader),
            Err(PipelineError::WrongElementType { .. })
        ));
        assert!(matches!(
            pipeline.element_mut::<Equalizer>(ElementId(42)),
            Err(PipelineError::UnknownElement(ElementId(42)))
        ));
        assert_eq!(pipeline.find_element("writer"), Some(ElementId(2)));
        assert!(pipeline
            .element(reader)
            .unwrap()
            .as_any()
            .downcast_ref::<I2sReader>()
            .is_some());
    }

    #[tokio::test]
    async fn test_pause_with_unsupported_elements() {
        let log = new_log();
        let mut pipeline = Pipeline::new(test_config()).unwrap();
        pipeline
            .add_element(Box::new(I2sReader::new(
                "reader",
                &I2sConfig::default(),
                Box::new(FakeStage::new("reader", &log).pausable()),
            )))
            .unwrap();
        pipeline
            .add_element(Box::new(I2sWriter::new(
                "writer",
                &I2sConfig::default(),
                FakeStage::boxed("writer", &log),
            )))
            .unwrap();
        pipeline.start().await.unwrap();

        pipeline.pause().await.unwrap();
        assert_eq!(
            pipeline.element_states(),
            vec![ElementState::Paused, ElementState::Running]
        );
        assert_eq!(pipeline.state(), PipelineState::Paused);

        pipeline.resume().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);
    }

    #[tokio::test]
    async fn test_teardown_releases_everything() {
        let log = new_log();
        let (mut pipeline, ..) = playback_pipeline(&log);
        pipeline.start().await.unwrap();

        pipeline.teardown().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Unavailable);
        assert_eq!(
            order_of(&log, &StageCall::Release),
            vec!["writer", "equalizer", "reader"]
        );

        // Restart recreates native resources
        pipeline.start().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);
        let creates = calls_for(&log, "reader")
            .into_iter()
            .filter(|c| matches!(c, StageCall::Create(_)))
            .count();
        assert_eq!(creates, 2);
    }

    #[tokio::test]
    async fn test_pcm_source_to_sink_pipeline() {
        let log = new_log();
        let mut pipeline = Pipeline::new(test_config()).unwrap();
        let (source, _consumer) = PcmSource::new(
            "pcm_in",
            &PcmStreamConfig::default(),
            FakeStage::boxed("pcm_in", &log),
        );
        let source_id = pipeline.add_element(Box::new(source)).unwrap();
        let (sink, mut producer) = PcmSink::new(
            "pcm_out",
            &PcmStreamConfig::default(),
            FakeStage::boxed("pcm_out", &log),
        );
        let sink_id = pipeline.add_element(Box::new(sink)).unwrap();
        pipeline.start().await.unwrap();

        assert_eq!(
            pipeline
                .element_mut::<PcmSource>(source_id)
                .unwrap()
                .stream_write(&[9, 8, 7]),
            3
        );

        producer.push(42).unwrap();
        producer.push(43).unwrap();
        let mut buffer = [0u8; 4];
        let read = pipeline
            .element_mut::<PcmSink>(sink_id)
            .unwrap()
            .stream_read(&mut buffer);
        assert_eq!(&buffer[..read], &[42, 43]);
    }

    #[test]
    fn test_pipeline_from_json_config() {
        let config = PipelineConfig::from_json_str(
            r#"{"name": "kitchen_speaker", "stop_timeout_ms": 150}"#,
        )
        .unwrap();
        assert_eq!(config.max_negotiation_rounds, 4);

        let log = new_log();
        let mut pipeline = Pipeline::new(config).unwrap();
        pipeline
            .add_element(Box::new(I2sReader::new(
                "reader",
                &I2sConfig::default(),
                FakeStage::boxed("reader", &log),
            )))
            .unwrap();
        pipeline
            .add_element(Box::new(I2sWriter::new(
                "writer",
                &I2sConfig::default(),
                FakeStage::boxed("writer", &log),
            )))
            .unwrap();

        tokio_test::block_on(async {
            pipeline.start().await.unwrap();
            assert_eq!(pipeline.state(), PipelineState::Running);
            pipeline.teardown().await.unwrap();
        });
        assert_eq!(pipeline.name(), "kitchen_speaker");
        assert_eq!(pipeline.state(), PipelineState::Unavailable);
    }
}
