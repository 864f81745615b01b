use crate::server::config::AppConfig;
use shellcord_core::SqliteStore;
use std::path::Path;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("🏥 Shellcord Doctor\n");

    let mut all_ok = true;

    all_ok &= check_env_file();
    all_ok &= check_discord_token(config);
    all_ok &= check_database(config).await;

    println!();
    if all_ok {
        println!("✅ All checks passed! Ready to run Shellcord.");
    } else {
        println!("⚠️  Some checks failed. Please fix the issues above.");
        std::process::exit(1);
    }

    Ok(())
}

fn check_env_file() -> bool {
    print!("Checking .env file... ");

    if Path::new(".env").exists() {
        println!("✅ Found");
    } else {
        println!("ℹ️  Not found (using process environment)");
    }
    true
}

fn check_discord_token(config: &AppConfig) -> bool {
    print!("Checking Discord token... ");

    if config.discord.has_token() {
        println!("✅ Configured");
        true
    } else {
        println!("❌ Missing");
        println!("  Set DISCORD_BOT_TOKEN in .env or the environment");
        false
    }
}

async fn check_database(config: &AppConfig) -> bool {
    let path = config.database_path();
    print!("Checking database {}... ", path.display());

    let existed = path.exists();
    match SqliteStore::from_path(&path).await {
        Ok(_) if existed => {
            println!("✅ Opened");
            true
        }
        Ok(_) => {
            println!("✅ Created");
            true
        }
        Err(e) => {
            println!("❌ {}", e);
            false
        }
    }
}
