use haven_core::util::to_iso8601;

use crate::auth::{auth_client, clear_stored_session, load_stored_session};
use crate::cli::AuthCommands;
use crate::commands::common::CliContext;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, context: &CliContext) -> Result<(), CliError> {
    let app_name = context.config.app_name.as_str();
    match command {
        AuthCommands::Login { email, password } => {
            let client = auth_client(&context.config)
                .map_err(|error| CliError::Auth(error.to_string()))?
                .ok_or(CliError::RemoteNotConfigured)?;
            let session = client
                .sign_in(&email, &password)
                .await
                .map_err(|error| CliError::Auth(error.to_string()))?;
            let email_label = session.user.email.as_deref().unwrap_or("(no email)");
            println!("Signed in as {email_label}");
            Ok(())
        }
        AuthCommands::Status => {
            let maybe_client = auth_client(&context.config)
                .map_err(|error| CliError::Auth(error.to_string()))?;
            let session = if let Some(client) = maybe_client {
                client
                    .restore_session()
                    .await
                    .map_err(|error| CliError::Auth(error.to_string()))?
            } else {
                load_stored_session(app_name).map_err(|error| CliError::Auth(error.to_string()))?
            };

            if let Some(session) = session {
                let email_label = session.user.email.as_deref().unwrap_or("(no email)");
                let expires_at = chrono::DateTime::from_timestamp(session.expires_at, 0)
                    .map_or_else(|| session.expires_at.to_string(), to_iso8601);
                println!(
                    "Signed in as {} (user {}, expires {})",
                    email_label, session.user.id, expires_at
                );
            } else {
                println!("Not signed in. Records are kept on this device only.");
            }
            Ok(())
        }
        AuthCommands::Logout => {
            let stored_session =
                load_stored_session(app_name).map_err(|error| CliError::Auth(error.to_string()))?;
            let maybe_client = auth_client(&context.config)
                .map_err(|error| CliError::Auth(error.to_string()))?;

            if let (Some(client), Some(session)) = (maybe_client, stored_session.as_ref()) {
                if let Err(error) = client.sign_out(&session.access_token).await {
                    tracing::warn!("Could not revoke session on the server: {}", error);
                }
            }
            clear_stored_session(app_name).map_err(|error| CliError::Auth(error.to_string()))?;

            let coordinator = context.coordinator().await?;
            let reset = coordinator.sign_out()?;
            println!("Signed out; sync state reset for {reset} collection(s)");
            Ok(())
        }
    }
}
