//! The install command: resolve, install, then bundle

use crate::bundler::{self, DirStore};
use crate::catalog::resolve;
use crate::cli::args::InstallArgs;
use crate::config::Config;
use crate::error::{RbupError, RbupResult};
use crate::install::{self, InstallPaths};
use crate::platform::Platform;
use crate::request;
use crate::ui::{self, TaskSpinner, UiContext};
use std::path::Path;
use tracing::info;

pub async fn execute(args: InstallArgs, config: &Config) -> RbupResult<()> {
    let ui = UiContext::detect();

    // Relative paths below (gemfiles, vendor/bundle) follow the
    // process cwd, so move there first
    if let Some(ref dir) = args.working_directory {
        std::env::set_current_dir(dir)
            .map_err(|e| RbupError::io(format!("entering {}", dir.display()), e))?;
    }
    let workdir =
        std::env::current_dir().map_err(|e| RbupError::io("getting current directory", e))?;

    let platform = Platform::detect()?;
    let request = request::parse(&args.runtime, &workdir)?;
    info!(
        "Installing {}-{:?} on {} ({})",
        request.engine, request.version, platform, args.architecture
    );

    let paths = InstallPaths {
        tool_cache: config.install.tool_cache_dir.clone(),
        rubies_dir: config.install.rubies_dir(),
    };
    let installer = install::select_installer(
        &platform,
        &request.engine,
        args.architecture,
        paths,
        ui.clone(),
    )?;

    let catalog = installer
        .catalogs()
        .engine(&request.engine)
        .ok_or_else(|| RbupError::UnknownEngine {
            engine: request.engine.clone(),
            platform: platform.name.clone(),
        })?;
    let entry = resolve::resolve(catalog, &request.version, &platform.name)?;

    let mut env = install::pre_install_env(&platform, &request.engine);

    // JRuby builds extensions against the MSYS2 toolchain on Windows
    if platform.is_windows()
        && request.engine == "jruby"
        && !Path::new(r"C:\msys64\mingw64\bin\gcc.exe").exists()
    {
        ui::step_warn(&ui, "No C compiler found; native extensions will fail to build");
    }

    let runtime = installer
        .install(&request.engine, entry)
        .await
        .map_err(|e| {
            install::install_error(
                &request.engine,
                &entry.version,
                &platform,
                args.architecture,
                e,
            )
        })?;
    env.merge(runtime.env.clone());

    ui::step_ok(
        &ui,
        &format!(
            "{}-{} ready at {}",
            runtime.engine,
            runtime.version,
            runtime.prefix.display()
        ),
    );

    // Gem doc generation is wasted CI time
    if let Some(home) = dirs::home_dir() {
        let gem_v2 = bundler::gem_is_v2_or_later(&runtime).await.unwrap_or(true);
        bundler::write_default_gemrc(&home, gem_v2)?;
    }

    env.apply()?;
    emit_outputs(&ui, &runtime.prefix)?;

    if args.bundler != "none" {
        install_dependencies(&args, config, &ui, &runtime, &platform, &workdir).await?;
    }

    ui::outro_success(&ui, &format!("{}-{} installed", runtime.engine, runtime.version));
    Ok(())
}

async fn install_dependencies(
    args: &InstallArgs,
    config: &Config,
    ui: &UiContext,
    runtime: &crate::install::InstalledRuntime,
    platform: &Platform,
    workdir: &Path,
) -> RbupResult<()> {
    let Some(gemfiles) = bundler::detect_gemfile(workdir)? else {
        info!("Could not determine gemfile path, skipping bundle install and caching");
        return Ok(());
    };

    let lockfile = gemfiles.lockfile.exists().then(|| gemfiles.lockfile.as_path());
    let bundler_version =
        bundler::select_bundler_version(&args.bundler, lockfile, &runtime.engine, &runtime.version)?;

    let mut spinner = TaskSpinner::new(ui);
    spinner.start(&format!("Installing Bundler {bundler_version}"));
    match bundler::install_bundler(runtime, &bundler_version).await {
        Ok(()) => spinner.stop("Bundler ready"),
        Err(e) => {
            spinner.stop_error("Bundler install failed");
            return Err(e);
        }
    }

    if !args.bundler_cache {
        return Ok(());
    }

    let store = if config.cache.enabled {
        let root = args
            .cache_dir
            .clone()
            .unwrap_or_else(|| config.cache.store_dir());
        Some(DirStore::with_workdir(root, workdir))
    } else {
        info!("Dependency caching disabled by configuration");
        None
    };

    let outcome = bundler::bundle_install(
        runtime,
        &gemfiles,
        &platform.name,
        &bundler_version,
        store.as_ref().map(|s| s as &dyn bundler::CacheStore),
        workdir,
    )
    .await?;

    if let Some(report) = outcome.cache {
        ui::step_info(
            ui,
            &format!(
                "Dependency cache: {}",
                if report.reused() { "reused" } else { "cold" }
            ),
        );
    }
    Ok(())
}

/// Publish the installed prefix for later job steps
fn emit_outputs(ui: &UiContext, prefix: &Path) -> RbupResult<()> {
    ui::key_value(ui, "ruby-prefix", &prefix.display().to_string());

    if let Some(output_file) = std::env::var_os("GITHUB_OUTPUT") {
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&output_file)
            .map_err(|e| RbupError::io("opening GITHUB_OUTPUT", e))?;
        writeln!(f, "ruby-prefix={}", prefix.display())
            .map_err(|e| RbupError::io("writing GITHUB_OUTPUT", e))?;
    }
    Ok(())
}
