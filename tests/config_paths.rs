mod support;

use std::path::PathBuf;

use prostascan::config::{self, CLASSIFIER_PATH_ENV, CONFIG_FILE_NAME};
use prostascan::models::LoadFailure;
use prostascan::pipeline::{AnalysisError, Pipeline};
use support::images::write_test_png;
use support::prostascan_env::ProstascanEnvGuard;

#[test]
fn model_paths_default_to_the_app_models_dir() {
    let temp = tempfile::tempdir().unwrap();
    let home = temp.path().join("config");
    let _env = ProstascanEnvGuard::set_config_home(home.clone());

    let config = config::load_or_default().unwrap();
    let paths = config.model_paths().unwrap();

    let models = home.join(".prostascan").join("models");
    assert_eq!(paths.classifier, models.join("densenet121_prostate.onnx"));
    assert_eq!(paths.segmenter, models.join("attention_unet_prostate.onnx"));
    assert!(models.is_dir());
    assert!(paths.intra_threads >= 1);
}

#[test]
fn config_file_and_env_override_are_layered() {
    let temp = tempfile::tempdir().unwrap();
    let home = temp.path().join("config");
    let env = ProstascanEnvGuard::set_config_home(home.clone());
    let root = home.join(".prostascan");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(
        root.join(CONFIG_FILE_NAME),
        "[models]\nclassifier_path = \"/srv/cls.onnx\"\nsegmenter_path = \"/srv/seg.onnx\"\n",
    )
    .unwrap();

    let config = config::load_or_default().unwrap();
    assert_eq!(
        config.model_paths().unwrap().classifier,
        PathBuf::from("/srv/cls.onnx")
    );

    env.set_var(CLASSIFIER_PATH_ENV, "/opt/override.onnx");
    let paths = config.model_paths().unwrap();
    assert_eq!(paths.classifier, PathBuf::from("/opt/override.onnx"));
    assert_eq!(paths.segmenter, PathBuf::from("/srv/seg.onnx"));
}

#[test]
fn pipeline_without_weights_reports_the_missing_file() {
    let temp = tempfile::tempdir().unwrap();
    let _env = ProstascanEnvGuard::set_config_home(temp.path().join("config"));
    let image = write_test_png(temp.path(), "scan.png");

    let pipeline = Pipeline::from_config(&config::load_or_default().unwrap()).unwrap();
    let err = pipeline.analyze(&image).unwrap_err();

    match err {
        AnalysisError::ModelUnavailable(LoadFailure::MissingWeights { path, .. }) => {
            assert!(path.ends_with("densenet121_prostate.onnx"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!pipeline.health().models.classifier_loaded);
}
