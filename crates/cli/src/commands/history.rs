//! `sagechat history` — Show or clear the saved conversation.

use sagechat_core::message::Role;

use super::{build_store, load_config};

pub async fn run(clear: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let store = build_store(&config.storage);
    let session = &config.storage.session_key;

    if clear {
        store
            .clear(session)
            .await
            .map_err(|e| format!("Failed to clear history: {e}"))?;
        println!("✅ Cleared conversation '{session}'");
        return Ok(());
    }

    let messages = store
        .load(session)
        .await
        .map_err(|e| format!("Failed to load history: {e}"))?
        .unwrap_or_default();

    if messages.is_empty() {
        println!("No saved conversation for '{session}' ({} store).", store.name());
        return Ok(());
    }

    println!("📜 Conversation '{session}' — {} messages\n", messages.len());
    for message in &messages {
        let who = match message.role {
            Role::User => "🧑 You",
            Role::Assistant => "🤖 Assistant",
            Role::Critic => "🔍 Critic",
        };
        println!(
            "[{}] {who}",
            message.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
        );
        for line in message.content.lines() {
            println!("    {line}");
        }
        println!();
    }

    Ok(())
}
