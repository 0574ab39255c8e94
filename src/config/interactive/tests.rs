use super::load_existing_config;
use tempfile::TempDir;

#[test]
fn load_existing_config_falls_back_to_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = load_existing_config(temp_dir.path()).expect("config loaded successfully");
    assert!(!config.embedding.host.is_empty());
    assert!(config.embedding.port > 0);
    assert!(!config.embedding.model.is_empty());
    assert!(config.sync.top_k > 0);
}
