mod common;

use adf_pipeline::audio::types::I2sConfig;
use adf_pipeline::log::{init_logging, is_negotiation_trace_enabled, set_negotiation_trace};
use adf_pipeline::{I2sReader, I2sWriter, Pipeline, PipelineConfig, SettingsRequest};
use common::{new_log, FakeStage};
use serial_test::serial;

#[cfg(test)]
mod logging_tests {
    use super::*;

    #[test]
    #[serial]
    fn test_trace_flag_toggles() {
        set_negotiation_trace(true);
        assert!(is_negotiation_trace_enabled());

        set_negotiation_trace(false);
        assert!(!is_negotiation_trace_enabled());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging("debug");
        init_logging("info");
    }

    #[tokio::test]
    #[serial]
    async fn test_traced_negotiation_behaves_the_same() {
        init_logging("debug");
        let log = new_log();
        let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
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

        set_negotiation_trace(true);
        let traced = pipeline
            .request_settings(SettingsRequest::new().with_sampling_rate(48000))
            .await;
        set_negotiation_trace(false);

        let outcome = traced.unwrap();
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.settled.sampling_rate, Some(48000));
    }
}
