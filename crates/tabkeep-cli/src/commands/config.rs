use std::env;

use tabkeep_core::config::{ENV_ACCESS_TOKEN, ENV_SUPABASE_ANON_KEY, ENV_SUPABASE_URL, ENV_TABLE};
use tabkeep_core::util::normalize_text_option;

use crate::cli::ConfigCommands;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            supabase_url,
            supabase_anon_key,
            access_token,
            table,
            no_activate,
        } => run_config_init(
            global_profile,
            ProfileFields {
                supabase_url,
                supabase_anon_key,
                access_token,
                table,
            },
            no_activate,
        ),
    }
}

/// Values passed on the command line for `config init`
#[derive(Debug, Default)]
pub struct ProfileFields {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub access_token: Option<String>,
    pub table: Option<String>,
}

impl ProfileFields {
    /// Fill unset fields from the environment.
    pub fn or_lookup(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |explicit: Option<String>, key: &str| {
            normalize_text_option(explicit).or_else(|| normalize_text_option(lookup(key)))
        };
        Self {
            supabase_url: pick(self.supabase_url, ENV_SUPABASE_URL),
            supabase_anon_key: pick(self.supabase_anon_key, ENV_SUPABASE_ANON_KEY),
            access_token: pick(self.access_token, ENV_ACCESS_TOKEN),
            table: pick(self.table, ENV_TABLE),
        }
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    fields: ProfileFields,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = merge_profile(&mut config, profile_name, fields, no_activate)?;

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let missing_fields = config
        .profile(&profile_name)
        .map(crate::config_profiles::CliProfile::missing_fields)
        .unwrap_or_default();
    if missing_fields.is_empty() {
        println!("Profile '{profile_name}' is ready. Run `tabkeep sync` to reconcile.");
    } else {
        println!(
            "Profile '{}' is missing: {}",
            profile_name,
            missing_fields.join(", ")
        );
    }

    Ok(())
}

/// Merge explicit and environment values into the named profile.
pub fn merge_profile(
    config: &mut CliProfilesConfig,
    profile_name: Option<&str>,
    fields: ProfileFields,
    no_activate: bool,
) -> Result<String, CliError> {
    let profile_name = config.resolve_profile_name(profile_name);
    let fields = fields.or_lookup(|key| env::var(key).ok());

    let profile = config.profile_mut_or_default(&profile_name);
    if let Some(value) = fields.supabase_url {
        profile.supabase_url = Some(value.trim_end_matches('/').to_string());
    }
    if let Some(value) = fields.supabase_anon_key {
        profile.supabase_anon_key = Some(value);
    }
    if let Some(value) = fields.access_token {
        profile.access_token = Some(value);
    }
    if let Some(value) = fields.table {
        profile.table = Some(value);
    }
    profile.validate().map_err(CliError::Config)?;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }
    Ok(profile_name)
}
