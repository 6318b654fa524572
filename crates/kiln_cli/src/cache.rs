//! `kiln cache`: inspect and prune the persisted compile cache.

use kiln_plugin::Project;

use crate::{resolve_project_root, CacheCommand, GlobalArgs};

/// Runs a `kiln cache` subcommand. Always returns exit code 0 on success.
pub fn run(command: &CacheCommand, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = Project::load(&resolve_project_root(global)?)?;
    if !project.config.cache.enabled {
        if !global.quiet {
            eprintln!("   Cache disabled in {}", kiln_config::CONFIG_FILE);
        }
        return Ok(0);
    }
    let store = project.open_cache();

    match command {
        CacheCommand::Clean => {
            store.clear()?;
            if !global.quiet {
                eprintln!("   Cleaned {}", project.cache_dir().display());
            }
        }
        CacheCommand::Gc => {
            let removed = store.gc()?;
            if !global.quiet {
                eprintln!("   Removed {removed} orphaned scope(s)");
            }
        }
        CacheCommand::Stats => {
            let stats = store.stats();
            println!("live scopes:     {}", stats.live_scopes);
            println!("orphaned scopes: {}", stats.orphaned_scopes);
            println!("entries:         {}", stats.entries);
        }
    }
    Ok(0)
}
