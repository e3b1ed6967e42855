use std::str::FromStr;

use log::{error, info, warn, LevelFilter};

use syncsonic::app_runtime::SyncRuntime;
use syncsonic::config::{config_file_path, load_or_create_config};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, LevelFilter::Trace);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_file = config_file_path()?;
    let config = load_or_create_config(&config_file)?;
    let level = LevelFilter::from_str(&config.log_level).unwrap_or_else(|_| {
        warn!(
            "Unknown log_level '{}', falling back to info",
            config.log_level
        );
        LevelFilter::Info
    });
    log::set_max_level(level);

    if config.sync.playlists.is_empty() {
        warn!(
            "No playlists configured. Add [[sync.playlists]] entries to {}",
            config_file.display()
        );
        return Ok(());
    }

    info!(
        "Syncing {} playlists into {}",
        config.sync.playlists.len(),
        config.library.endpoint
    );
    let runtime = SyncRuntime::build(&config)?;
    runtime.run()?;
    Ok(())
}
