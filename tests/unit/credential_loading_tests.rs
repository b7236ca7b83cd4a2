//! Unit tests for model API key loading.
//!
//! The test environment has no keychain entry for the service, so every
//! case exercises the `LLM_API_KEY` fallback. Tests that touch the process
//! environment run serially.

use proactive_hub::config::GlobalConfig;

#[tokio::test]
#[serial_test::serial]
async fn env_var_supplies_api_key() {
    std::env::set_var("LLM_API_KEY", "sk-test-123");
    let mut config = GlobalConfig::default();

    config.load_credentials().await.expect("credentials load");
    assert_eq!(config.agent.api_key.as_deref(), Some("sk-test-123"));

    std::env::remove_var("LLM_API_KEY");
}

#[tokio::test]
#[serial_test::serial]
async fn missing_api_key_is_allowed() {
    std::env::remove_var("LLM_API_KEY");
    let mut config = GlobalConfig::default();

    config.load_credentials().await.expect("absence is not an error");
    assert!(config.agent.api_key.is_none());
}

#[tokio::test]
#[serial_test::serial]
async fn blank_env_var_counts_as_missing() {
    std::env::set_var("LLM_API_KEY", "   ");
    let mut config = GlobalConfig::default();

    config.load_credentials().await.expect("credentials load");
    assert!(config.agent.api_key.is_none());

    std::env::remove_var("LLM_API_KEY");
}
