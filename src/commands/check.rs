//! Check command implementation.
//!
//! Validates the environment and configuration.

use vigil_agent::config::{validate_effective_config, Config};
use vigil_agent::registry;
use vigil_agent::startup_checks::validate_environment;

/// Validates environment requirements and configuration.
pub fn command_check(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Vigil Agent - Environment Check");
    println!("==================================");

    let mut all_ok = true;

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => {
            println!("   ✅ Configuration is valid");
        }
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📁 Checking plugin directories...");
    let plugins_dir = config.plugins_dir();
    if plugins_dir.exists() {
        println!("   ✅ Bundled plugins root: {}", plugins_dir.display());
        match registry::installed_version(&plugins_dir) {
            Some(version) => {
                println!("   ✅ Installed bundle version: {}", version);
                let bundled = registry::scan_dir(&plugins_dir.join(&version), false);
                println!("   ✅ {} bundled plugin(s) discovered", bundled.len());
            }
            None => {
                println!("   ⚠️  No version marker - no bundle installed yet");
            }
        }
    } else {
        println!(
            "   ⚠️  Bundled plugins root missing: {}",
            plugins_dir.display()
        );
    }

    let custom_dir = config.custom_plugins_dir();
    if custom_dir.exists() {
        let custom = registry::scan_dir(&custom_dir, true);
        println!(
            "   ✅ {} custom plugin(s) in {}",
            custom.len(),
            custom_dir.display()
        );
    } else {
        println!(
            "   ⚠️  Custom plugins directory missing: {}",
            custom_dir.display()
        );
    }

    println!("\n🌐 Checking collaborator endpoints...");
    println!("   ├─ Config service: {}", config.config_service_url());
    println!("   └─ Metrics ingest: {}", config.ingest_url());

    println!("\n🖥️  Checking hostname...");
    match validate_environment(config) {
        Ok(_) => {
            println!("   ✅ Reporting as host '{}'", config.hostname());
        }
        Err(e) => {
            println!("   ❌ {}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - agent is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
