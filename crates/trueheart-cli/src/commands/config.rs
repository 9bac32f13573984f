use std::env;
use std::path::Path;

use trueheart_core::config::normalize_base_url;
use trueheart_core::util::normalize_text_option;

use crate::cli::ConfigCommands;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            api_base_url,
            app_id,
            no_activate,
        } => {
            let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
            let profile_name = apply_config_init(
                &mut config,
                profile.as_deref().or(global_profile),
                api_base_url,
                app_id,
                no_activate,
            )?;
            let path = config.save().map_err(CliError::Config)?;
            print_profile_summary(&config, &profile_name, &path);
            Ok(())
        }
    }
}

/// Merge explicit values, then environment, then what the profile already had.
pub fn apply_config_init(
    config: &mut CliProfilesConfig,
    profile_name: Option<&str>,
    api_base_url: Option<String>,
    app_id: Option<String>,
    no_activate: bool,
) -> Result<String, CliError> {
    let profile_name = config.resolve_profile_name(profile_name);
    let existing = config.profile(&profile_name).cloned().unwrap_or_default();

    let merged_api_base_url = normalize_text_option(api_base_url)
        .or_else(|| normalize_text_option(env::var("TRUEHEART_API_BASE_URL").ok()))
        .or_else(|| existing.api_base_url());
    let merged_app_id = normalize_text_option(app_id)
        .or_else(|| normalize_text_option(env::var("TRUEHEART_APP_ID").ok()))
        .or_else(|| existing.app_id());

    let merged_api_base_url = merged_api_base_url
        .map(|url| normalize_base_url(&url))
        .transpose()
        .map_err(|error| CliError::Config(format!("Invalid api base URL: {error}")))?;

    let profile = config.profile_mut_or_default(&profile_name);
    profile.api_base_url = merged_api_base_url;
    profile.app_id = merged_app_id;
    profile.sync_config().map_err(CliError::Config)?;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }
    Ok(profile_name)
}

fn print_profile_summary(config: &CliProfilesConfig, profile_name: &str, path: &Path) {
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let profile = config.profile(profile_name).cloned().unwrap_or_default();
    let CliProfile {
        api_base_url,
        app_id,
    } = profile;
    println!(
        "  api_base_url: {}",
        api_base_url.as_deref().unwrap_or("(not set, local only)")
    );
    println!(
        "  app_id: {}",
        app_id.as_deref().unwrap_or(trueheart_core::config::DEFAULT_APP_ID)
    );
    if config.active_profile.as_deref() == Some(profile_name) {
        println!("  active: yes");
    }
}
