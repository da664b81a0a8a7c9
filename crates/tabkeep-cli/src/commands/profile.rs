use std::path::Path;

use tabkeep_core::util::normalize_text_option;
use tabkeep_core::{Profile, Role};

use crate::cli::ProfileCommands;
use crate::commands::common::open_store;
use crate::error::CliError;

pub async fn run_profile(command: ProfileCommands, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    match command {
        ProfileCommands::Show { json } => {
            let profile = store.load_profile().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&profile)?);
            } else if let Some(profile) = profile {
                println!("{}", format_profile(&profile));
            } else {
                println!("No profile cached.");
            }
        }
        ProfileCommands::Set { id, email, role } => {
            let profile = build_profile(&id, email, &role)?;
            store.save_profile(&profile).await?;
            println!("{}", format_profile(&profile));
        }
        ProfileCommands::Clear => {
            store.clear_profile().await?;
            println!("Profile cleared.");
        }
    }
    Ok(())
}

pub fn build_profile(id: &str, email: Option<String>, role: &str) -> Result<Profile, CliError> {
    let id = normalize_text_option(Some(id.to_string())).ok_or_else(|| CliError::InvalidField {
        field: "id",
        message: "profile id cannot be empty".to_string(),
    })?;
    let role = role.parse::<Role>()?;
    Ok(Profile {
        id,
        email: normalize_text_option(email),
        role,
    })
}

pub fn format_profile(profile: &Profile) -> String {
    format!(
        "{}  {}  {}",
        profile.id,
        profile.email.as_deref().unwrap_or("-"),
        profile.role
    )
}
