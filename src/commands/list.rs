//! List command implementation.
//!
//! Lists the plugins discoverable on this host.

use vigil_agent::config::Config;
use vigil_agent::registry;

/// Lists discovered plugins from the local directories.
pub fn command_list(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("📦 Vigil Agent - Discovered Plugins");
    println!("===================================");

    let plugins_root = config.plugins_dir();
    let bundled_dir = match registry::installed_version(&plugins_root) {
        Some(version) => {
            println!("Bundle version: {}", version);
            plugins_root.join(version)
        }
        None => {
            println!("Bundle version: (none installed)");
            plugins_root.clone()
        }
    };

    let plugins = registry::resolve(&bundled_dir, &config.custom_plugins_dir());
    if plugins.is_empty() {
        println!("\nNo plugins found.");
        return Ok(());
    }

    let mut names: Vec<_> = plugins.keys().collect();
    names.sort();

    println!("\n{:<24} {:<10} {:<8} PATH", "NAME", "FORMAT", "CUSTOM");
    for name in names {
        let plugin = &plugins[name];
        println!(
            "{:<24} {:<10} {:<8} {}",
            plugin.name,
            plugin.output.to_string(),
            if plugin.is_custom { "yes" } else { "no" },
            plugin.path.display()
        );
    }

    Ok(())
}
