//! The `examforge init` command.

use std::path::Path;

use anyhow::Result;

use examforge_providers::config::CONFIG_FILE_NAME;

pub fn execute() -> Result<()> {
    if Path::new(CONFIG_FILE_NAME).exists() {
        println!("{CONFIG_FILE_NAME} already exists, skipping.");
    } else {
        std::fs::write(CONFIG_FILE_NAME, SAMPLE_CONFIG)?;
        println!("Created {CONFIG_FILE_NAME}");
    }

    println!("\nNext steps:");
    println!("  1. Export GEMINI_API_KEY (or set backend = \"mock\" to try it offline)");
    println!("  2. Run: examforge patterns");
    println!(
        "  3. Run: examforge create --name \"Asha\" --email asha@example.com \
         --board CBSE --class 10 --subject Mathematics"
    );

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# examforge configuration

# "gemini" or "mock"
backend = "gemini"

[gemini]
# Keys are tried in order; a key that runs out of quota is skipped.
api_keys = ["${GEMINI_API_KEY}"]
timeout_secs = 120

[models]
configured = "gemini-2.5-flash"
fallback = ["gemini-2.5-pro", "gemini-2.0-flash", "gemini-1.5-flash"]
backoff_step_ms = 2000

[uploads]
dir = "./uploads"
max_file_size = 10485760
allowed_extensions = [".pdf"]

[evaluation]
max_attempts = 3
retry_delay_ms = 2000

[store]
database = "./examforge-data/exams.db"
"#;
