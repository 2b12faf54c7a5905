//! Test command implementation.
//!
//! Runs one discovered plugin once and displays its parsed output.

use std::time::Duration;

use vigil_agent::api::Instance;
use vigil_agent::config::Config;
use vigil_agent::registry;
use vigil_agent::runner;

/// Runs a single plugin invocation outside the scheduler.
pub async fn command_test(
    plugin_name: &str,
    extra_args: &[String],
    timeout_secs: u64,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🧪 Vigil Agent - Plugin Test Mode");
    println!("=================================");

    let plugins = local_registry(config);
    let Some(plugin) = plugins.get(plugin_name) else {
        println!("❌ Plugin '{}' not found", plugin_name);
        println!(
            "   Searched {} and {}",
            config.plugins_dir().display(),
            config.custom_plugins_dir().display()
        );
        std::process::exit(1);
    };

    println!("\n🔌 Plugin: {}", plugin.name);
    println!("   ├─ Path: {}", plugin.path.display());
    println!("   ├─ Format: {}", plugin.output);
    println!("   ├─ Custom: {}", plugin.is_custom);
    println!("   └─ Rate patterns: {}", plugin.rate_patterns.len());

    let instance = Instance {
        name: String::new(),
        args_list: extra_args.to_vec(),
        args: Default::default(),
    };

    println!("\n🔄 Running with a {}s deadline...", timeout_secs);
    match runner::run(plugin, &instance, Duration::from_secs(timeout_secs)).await {
        Ok(output) => {
            println!("   ✅ State: {}", output.state);
            println!("   💬 Message: {}", output.message);

            if let Some(metrics) = &output.metrics {
                println!("   📊 Metrics ({}):", metrics.len());
                let mut names: Vec<_> = metrics.keys().collect();
                names.sort();
                for name in names {
                    let rate_marker = if plugin.is_rate_eligible(name) {
                        " (rate-eligible)"
                    } else {
                        ""
                    };
                    println!("      ├─ {} = {}{}", name, metrics[name], rate_marker);
                }
            }

            if let Some(points) = &output.points {
                println!("   📊 Point writes ({}):", points.len());
                for write in points {
                    println!("      ├─ {} ({} point(s))", write.name, write.points.len());
                }
            }

            println!("\n✅ Test completed successfully");
            Ok(())
        }
        Err(e) => {
            println!("   ❌ {}", e);
            std::process::exit(1);
        }
    }
}

/// Resolves the registry from local directories only, without the config
/// service (the test command must work offline).
fn local_registry(
    config: &Config,
) -> std::collections::HashMap<String, vigil_agent::PluginMetadata> {
    let plugins_root = config.plugins_dir();
    let bundled_dir = match registry::installed_version(&plugins_root) {
        Some(version) => plugins_root.join(version),
        None => plugins_root.clone(),
    };
    registry::resolve(&bundled_dir, &config.custom_plugins_dir())
}
