use anyhow::{bail, Context};
use clap::Subcommand;

use crate::auth::PasswordHasher;
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::database::models::UserProfile;
use crate::server::{AppState, Backend};

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Create a user that can log in")]
    Create {
        #[arg(long, help = "Display name")]
        name: String,
        #[arg(long, help = "Login email")]
        email: String,
        #[arg(long, help = "Password")]
        password: String,
    },
}

pub async fn handle(cmd: UserCommands, config: AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        UserCommands::Create { name, email, password } => {
            if config.database.url.is_none() {
                bail!("DATABASE_URL must be set to create users");
            }
            if password.is_empty() {
                bail!("password must not be empty");
            }

            let backend = Backend::postgres(&config).await.context("failed to initialize database")?;
            let state = AppState::new(backend, &config, PasswordHasher::default())?;
            let user = state
                .sessions
                .register(&name, &email, &password)
                .await
                .context("failed to create user")?;

            let profile = UserProfile::from(&user);
            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&profile)?),
                OutputFormat::Text => println!("Created user {} <{}> (id {})", profile.name, profile.email, profile.id),
            }
            Ok(())
        }
    }
}
