//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - Configuration loading and saving
//! - Defaults when the file is missing
//! - Environment variable overrides
//! - Configuration validation
//! - Feeding the loaded scanner settings into a ScanRequest

use camino::Utf8PathBuf;
use locus::models::{AppConfig, DecoderMode, FacingMode, Resolution, Symbology};
use locus::{ConfigManager, ScanRequest};
use std::fs;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

fn manager(config_path: &Utf8PathBuf, prefix: &str) -> ConfigManager {
    ConfigManager::new(config_path)
        .unwrap()
        .with_env_prefix(prefix)
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), &config_path);
    assert_eq!(manager.config_path(), config_path.join("locus.yaml"));
}

#[test]
fn test_load_default_config() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = manager(&config_path, "LOCUS_IT_DEFAULT");

    // Config file doesn't exist, should return defaults
    let config = manager.load_config().unwrap();

    assert_eq!(config.scanner.confidence_threshold, 0.10);
    assert_eq!(config.scanner.ticks_per_second, 10);
    assert_eq!(config.scanner.preferred_facing, FacingMode::Environment);
    assert!(!config.scanner.exact_facing);
    assert_eq!(config.scanner.decoder_mode, DecoderMode::Continuous);
    assert!(config.scanner.symbologies.contains(&Symbology::Ean13));
    assert!(config.scanner.symbologies.contains(&Symbology::Qr));
    assert!(config.feedback.beep_enabled);
}

#[test]
fn test_save_and_load_config() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = manager(&config_path, "LOCUS_IT_SAVE");

    let mut config = AppConfig::default();
    config.scanner.confidence_threshold = 0.05;
    config.scanner.exact_facing = true;
    config.scanner.ideal_resolution = Some(Resolution::new(1920, 1080));
    config.scanner.symbologies = [Symbology::Ean13, Symbology::Ean8].into_iter().collect();
    config.feedback.tone_hz = 880.0;
    manager.save_config(&config).unwrap();

    let loaded = manager.load_config().unwrap();
    assert_eq!(loaded, config);

    // Allow-list keeps its order
    let order: Vec<Symbology> = loaded.scanner.symbologies.iter().copied().collect();
    assert_eq!(order, vec![Symbology::Ean13, Symbology::Ean8]);
}

#[test]
fn test_saved_file_is_readable_yaml() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = manager(&config_path, "LOCUS_IT_YAML");

    manager.save_config(&AppConfig::default()).unwrap();

    let contents = fs::read_to_string(manager.config_path()).unwrap();
    assert!(contents.contains("scanner:"));
    assert!(contents.contains("confidence_threshold: 0.1"));
    assert!(contents.contains("- ean13"));
}

#[test]
fn test_environment_overrides_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = manager(&config_path, "LOCUS_IT_ENV");
    fs::write(
        manager.config_path(),
        "scanner:\n  ticks_per_second: 12\n  decoder_mode: continuous\n",
    )
    .unwrap();

    // SAFETY: this prefix is only read by this test
    unsafe {
        std::env::set_var("LOCUS_IT_ENV_SCANNER__TICKS_PER_SECOND", "4");
        std::env::set_var("LOCUS_IT_ENV_SCANNER__DECODER_MODE", "single_shot");
    }

    let loaded = manager.load_config().unwrap();

    unsafe {
        std::env::remove_var("LOCUS_IT_ENV_SCANNER__TICKS_PER_SECOND");
        std::env::remove_var("LOCUS_IT_ENV_SCANNER__DECODER_MODE");
    }

    assert_eq!(loaded.scanner.ticks_per_second, 4);
    assert_eq!(loaded.scanner.decoder_mode, DecoderMode::SingleShot);
}

#[test]
fn test_out_of_range_values_rejected() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = manager(&config_path, "LOCUS_IT_RANGE");

    for yaml in [
        "scanner:\n  confidence_threshold: -0.1\n",
        "scanner:\n  ticks_per_second: 0\n",
        "scanner:\n  symbologies: []\n",
        "scanner:\n  render_target: '  '\n",
    ] {
        fs::write(manager.config_path(), yaml).unwrap();
        assert!(manager.load_config().is_err(), "Should reject: {}", yaml);
    }
}

#[test]
fn test_unknown_symbology_rejected() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = manager(&config_path, "LOCUS_IT_UNKNOWN");

    fs::write(
        manager.config_path(),
        "scanner:\n  symbologies: [ean13, datamatrix]\n",
    )
    .unwrap();

    assert!(manager.load_config().is_err());
}

#[test]
fn test_invalid_yaml_handling() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = manager(&config_path, "LOCUS_IT_INVALID");

    fs::write(manager.config_path(), "invalid: yaml: content: {{").unwrap();

    let result = manager.load_config();
    assert!(result.is_err(), "Should fail to parse invalid YAML");
}

#[test]
fn test_config_feeds_scan_request() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = manager(&config_path, "LOCUS_IT_REQUEST");
    fs::write(
        manager.config_path(),
        "scanner:\n  preferred_facing: user\n  exact_facing: true\n  symbologies: [qr]\n",
    )
    .unwrap();

    let config = manager.load_config().unwrap();
    let request = ScanRequest::from_settings(&config.scanner);

    assert_eq!(request.preferred_facing, FacingMode::User);
    assert!(request.exact_facing);
    assert_eq!(request.allowed_symbologies.len(), 1);
    assert!(config.allows(Symbology::Qr));
    assert!(!config.allows(Symbology::Ean13));
}

#[test]
fn test_config_directory_creation() {
    let temp_dir = TempDir::new().unwrap();
    let config_path =
        Utf8PathBuf::try_from(temp_dir.path().join("does/not/exist/yet")).unwrap();

    assert!(!config_path.exists());

    let _manager = ConfigManager::new(&config_path).unwrap();

    // Directory should now exist
    assert!(config_path.exists());
}

#[test]
fn test_concurrent_config_access() {
    use std::sync::Arc;

    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = Arc::new(manager(&config_path, "LOCUS_IT_CONCURRENT"));
    manager.save_config(&AppConfig::default()).unwrap();

    // Spawn multiple threads reading config concurrently
    let mut handles = vec![];

    for _ in 0..10 {
        let manager_clone = manager.clone();
        let handle = std::thread::spawn(move || {
            let _config = manager_clone.load_config().unwrap();
        });
        handles.push(handle);
    }

    // All threads should complete successfully
    for handle in handles {
        handle.join().unwrap();
    }
}
