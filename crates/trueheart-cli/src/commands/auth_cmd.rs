use trueheart_core::auth::SessionToken;

use crate::auth::{
    clear_stored_session_token, resolve_session_token, store_session_token, TokenSource,
    SESSION_TOKEN_ENV,
};
use crate::cli::AuthCommands;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub fn run_auth(command: AuthCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    match command {
        AuthCommands::Login { profile, token } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            let token = SessionToken::new(token)
                .ok_or_else(|| CliError::InvalidInput("token must not be empty".to_string()))?;
            store_session_token(&profile_name, &token)?;
            println!("Stored session for profile '{profile_name}'");

            let remote_configured = config
                .profile(&profile_name)
                .and_then(|profile| profile.api_base_url())
                .is_some();
            if !remote_configured {
                println!(
                    "Profile '{profile_name}' has no remote yet. Run `trueheart config init --profile {profile_name} --api-base-url <URL>`."
                );
            }
            Ok(())
        }
        AuthCommands::Status { profile } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            match resolve_session_token(&profile_name)? {
                Some((_, TokenSource::Environment)) => {
                    println!("Profile '{profile_name}' is signed in via {SESSION_TOKEN_ENV}.");
                }
                Some((_, TokenSource::Keychain)) => {
                    println!("Profile '{profile_name}' is signed in.");
                }
                None => println!("Profile '{profile_name}' is not signed in."),
            }
            Ok(())
        }
        AuthCommands::Logout { profile } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            if clear_stored_session_token(&profile_name)? {
                println!("Signed out profile '{profile_name}'");
            } else {
                println!("Profile '{profile_name}' was not signed in.");
            }
            Ok(())
        }
    }
}
