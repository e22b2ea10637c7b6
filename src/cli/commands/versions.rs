//! The versions command: list the platform's catalog

use crate::cli::args::VersionsArgs;
use crate::config::Config;
use crate::error::{RbupError, RbupResult};
use crate::install::{self, InstallPaths};
use crate::platform::Platform;
use crate::ui::UiContext;

pub async fn execute(args: VersionsArgs, config: &Config) -> RbupResult<()> {
    let ui = UiContext::detect();
    let platform = Platform::detect()?;

    let paths = InstallPaths {
        tool_cache: config.install.tool_cache_dir.clone(),
        rubies_dir: config.install.rubies_dir(),
    };
    let installer =
        install::select_installer(&platform, &args.engine, args.architecture, paths, ui)?;

    let catalog = installer
        .catalogs()
        .engine(&args.engine)
        .ok_or_else(|| RbupError::UnknownEngine {
            engine: args.engine.clone(),
            platform: platform.name.clone(),
        })?;

    println!("{} on {}:", args.engine, platform);
    for entry in catalog.entries() {
        println!("  {}  ({})", entry.version, entry.architecture);
    }
    Ok(())
}
