//! Session lifecycle walkthrough against a running storefront API
//!
//! Usage:
//!   STOREFRONT_API_URL=http://localhost:8080/api \
//!   STOREFRONT_EMAIL=user@example.com STOREFRONT_PASSWORD=secret \
//!   cargo run --example session_demo

use storefront_session::{token, AuthContext, ClientConfig, Credentials};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let mut config = ClientConfig::from_env()?;
    if config.storage_dir.is_none() {
        config.storage_dir = Some(std::env::temp_dir().join("storefront-session-demo"));
    }

    let email = std::env::var("STOREFRONT_EMAIL").unwrap_or_else(|_| "user@example.com".to_string());
    let password = std::env::var("STOREFRONT_PASSWORD").unwrap_or_else(|_| "password".to_string());

    println!("=== Storefront Session Example ===");
    println!("API: {}", config.api_base_url);
    println!("Storage: {:?}", config.storage_dir);
    println!();

    let refresh_check_interval = config.refresh_check_interval;
    let ctx = AuthContext::from_config(config)?;

    // Restore whatever a previous run left behind
    ctx.initialize().await;
    let state = ctx.user.state();
    println!("Restored user session: {:?}", state.phase);
    if let Some(error) = &state.error {
        println!("  error: {error}");
    }

    if !ctx.user.is_authenticated() {
        println!("Signing in as {email}...");
        match ctx.user.login(&Credentials::new(email, password)).await {
            Ok(user) => println!("✓ Signed in as {} <{}>", user.name, user.email),
            Err(e) => {
                println!("! Sign-in failed: {e}");
                return Ok(());
            }
        }
    }
    println!();

    if let Some(access_token) = ctx.user.access_token() {
        println!("Access token expires in {} minutes", token::time_remaining(&access_token));
        println!("Refresh due: {}", token::should_refresh(&access_token));
    }
    println!();

    let _refresh_task = ctx.user.spawn_auto_refresh(refresh_check_interval);
    println!("Auto-refresh task is running in the background...");

    // Watch state transitions for a while
    let mut changes = ctx.user.subscribe();
    let watch = async {
        while changes.changed().await.is_ok() {
            let state = changes.borrow_and_update().clone();
            println!("State changed: {:?} (loading: {})", state.phase, state.is_loading);
        }
    };
    let _ = tokio::time::timeout(std::time::Duration::from_secs(30), watch).await;

    println!();
    println!("Signing out...");
    ctx.user.logout().await;
    println!("Done!");

    Ok(())
}
