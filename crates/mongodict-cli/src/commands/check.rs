use std::path::Path;

use anyhow::Result;

/// Execute the `check` command: validate table config and server connectivity.
pub fn execute(config_path: &Path) -> Result<()> {
    let mut dict = super::load_table(config_path)?;
    println!("Configuration:     OK");

    let config = dict.config();
    println!("{:18} {}", "Server:", config.endpoint);
    println!("{:18} {}", "Collection:", config.namespace);
    println!("{:18} {} -> {}", "Fields:", config.key_field, config.value_field);
    println!("{:18} {} ms", "Timeout:", config.timeout.as_millis());
    if let Some(creds) = &config.credentials {
        println!("{:18} {}", "User:", creds.user);
    }

    match dict.connect() {
        Ok(()) => {
            println!("Connection:        OK");
            println!("\nAll checks passed.");
            Ok(())
        }
        Err(err) => {
            println!("Connection:        FAILED");
            println!("  {err}");
            anyhow::bail!("One or more checks failed")
        }
    }
}
