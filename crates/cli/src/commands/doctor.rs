//! `sagechat doctor` — Diagnose configuration and connectivity.

use sagechat_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 SageChat Doctor — System Diagnostics");
    println!("======================================\n");

    let mut issues = 0;

    println!("  ✅ Rust binary running");

    // Check config
    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file — using defaults (run `sagechat onboard`)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  Fix the config file and re-run doctor.");
            return Ok(());
        }
    };

    // Check API key
    if config.has_api_key() {
        println!("  ✅ API key configured");
    } else {
        println!("  ⚠️  No API key configured — add api_key to config.toml or set SAGECHAT_API_KEY");
        issues += 1;
    }

    // Check provider
    let provider = sagechat_providers::build_provider(&config);
    match provider.health_check().await {
        Ok(true) => println!("  ✅ Provider '{}' reachable (model: {})", provider.name(), config.model),
        Ok(false) => {
            println!("  ⚠️  Provider '{}' answered but reported unhealthy", provider.name());
            issues += 1;
        }
        Err(e) => {
            println!("  ❌ Provider '{}' unreachable: {e}", provider.name());
            issues += 1;
        }
    }

    // Check search
    match sagechat_providers::build_search(&config) {
        Some(search) => {
            let state = if config.search.enabled { "on" } else { "off, toggle with /web" };
            println!("  ✅ Search backend '{}' configured ({state})", search.name());
        }
        None => println!("  ℹ️  No search endpoint — web augmentation unavailable"),
    }

    // Check storage
    let store = super::build_store(&config.storage);
    match store.load(&config.storage.session_key).await {
        Ok(Some(messages)) => println!(
            "  ✅ Session '{}' readable ({} messages, {} store)",
            config.storage.session_key,
            messages.len(),
            store.name()
        ),
        Ok(None) => println!("  ✅ Storage ready ({} store, no saved session)", store.name()),
        Err(e) => {
            println!("  ❌ Storage unreadable: {e}");
            issues += 1;
        }
    }

    println!(
        "  ℹ️  Critique pass: {}",
        if config.critique.enabled { "on" } else { "off" }
    );

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
