use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{PageQuery, UserCreateRequest, UserRole};
use rollcall_sdk::RollcallClient;
use uuid::Uuid;

mod event_commands;
mod format;

#[derive(Parser)]
#[command(name = "rollcall")]
#[command(about = "Rollcall event registration client")]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Bearer token from `rollcall login`
    #[arg(long, env = "ROLLCALL_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// ORGANIZER or PARTICIPANT
        #[arg(long, default_value = "PARTICIPANT")]
        role: UserRole,
    },
    /// Log in and print a bearer token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Browse and manage events
    Events {
        #[command(subcommand)]
        action: event_commands::EventAction,
    },
    /// Enroll in an event
    Enroll { event_id: Uuid },
    /// Join the waiting list of an event
    Waitlist { event_id: Uuid },
    /// List your enrollments
    MyEnrollments {
        #[arg(long, default_value_t = 0)]
        page: u64,
        #[arg(long, default_value_t = 10)]
        size: u64,
    },
    /// List enrollments of an event you organize
    EventEnrollments {
        event_id: Uuid,
        #[arg(long, default_value_t = 0)]
        page: u64,
        #[arg(long, default_value_t = 10)]
        size: u64,
    },
    /// Confirm a waiting enrollment
    Confirm { id: Uuid },
    /// Reject an enrollment
    Reject { id: Uuid },
    /// Cancel your enrollment
    Cancel { id: Uuid },
    /// Capacity statistics of an event
    Stats {
        event_id: Uuid,
        /// Include per-status counts (organizer only)
        #[arg(long)]
        detailed: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut client = RollcallClient::new(&cli.server);
    if let Some(token) = &cli.token {
        client.set_token(token);
    }

    match cli.command {
        Commands::Register {
            name,
            email,
            password,
            role,
        } => {
            let request = UserCreateRequest {
                name,
                email,
                password,
                role,
            };
            let user = client
                .register(&request)
                .await
                .context("registration failed")?;
            println!("✅ Registered {} ({}) as {}", user.name, user.email, user.role);
        }
        Commands::Login { email, password } => {
            let response = client
                .login(&email, &password)
                .await
                .context("login failed")?;
            println!("✅ Logged in as {} ({})", response.user.name, response.user.role);
            println!("   Token expires at {}", response.expires_at);
            println!("export ROLLCALL_TOKEN={}", response.token);
        }
        Commands::Events { action } => {
            event_commands::handle_event_command(&client, action).await?;
        }
        Commands::Enroll { event_id } => {
            let enrollment = client.enroll(event_id).await.context("enrollment failed")?;
            println!("✅ {}", format::enrollment_line(&enrollment));
        }
        Commands::Waitlist { event_id } => {
            let enrollment = client
                .join_waiting_list(event_id)
                .await
                .context("could not join the waiting list")?;
            println!("✅ {}", format::enrollment_line(&enrollment));
        }
        Commands::MyEnrollments { page, size } => {
            let page = client
                .my_enrollments(PageQuery::new(page, size))
                .await
                .context("failed to list enrollments")?;
            for enrollment in &page.content {
                println!("{}", format::enrollment_line(enrollment));
            }
            println!("{}", format::page_footer(&page));
        }
        Commands::EventEnrollments {
            event_id,
            page,
            size,
        } => {
            let page = client
                .event_enrollments(event_id, PageQuery::new(page, size))
                .await
                .context("failed to list event enrollments")?;
            for enrollment in &page.content {
                println!("{}", format::enrollment_line(enrollment));
            }
            println!("{}", format::page_footer(&page));
        }
        Commands::Confirm { id } => {
            let enrollment = client
                .confirm_enrollment(id)
                .await
                .context("confirm failed")?;
            println!("✅ {}", format::enrollment_line(&enrollment));
        }
        Commands::Reject { id } => {
            let enrollment = client
                .reject_enrollment(id)
                .await
                .context("reject failed")?;
            println!("✅ {}", format::enrollment_line(&enrollment));
        }
        Commands::Cancel { id } => {
            let enrollment = client
                .cancel_enrollment(id)
                .await
                .context("cancel failed")?;
            println!("✅ {}", format::enrollment_line(&enrollment));
        }
        Commands::Stats { event_id, detailed } => {
            let stats = client
                .event_stats(event_id)
                .await
                .context("failed to load statistics")?;
            let counts = if detailed {
                Some(
                    client
                        .enrollment_stats(event_id)
                        .await
                        .context("failed to load enrollment counts")?,
                )
            } else {
                None
            };
            println!("📊 {}", format::event_stats(&stats, counts.as_ref()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_server() {
        let cli = Cli::try_parse_from(["rollcall", "events", "list"]).unwrap();
        assert_eq!(cli.server, "http://127.0.0.1:3000");
        match cli.command {
            Commands::Events {
                action: event_commands::EventAction::List { page, size },
            } => {
                assert_eq!(page, 0);
                assert_eq!(size, 10);
            }
            _ => panic!("Expected events list command"),
        }
    }

    #[test]
    fn test_register_parses_role() {
        let cli = Cli::try_parse_from([
            "rollcall",
            "register",
            "--name",
            "Olga",
            "--email",
            "olga@example.com",
            "--password",
            "secret1",
            "--role",
            "organizer",
        ])
        .unwrap();
        match cli.command {
            Commands::Register { role, .. } => assert_eq!(role, UserRole::Organizer),
            _ => panic!("Expected register command"),
        }
    }

    #[test]
    fn test_enroll_requires_uuid() {
        assert!(Cli::try_parse_from(["rollcall", "enroll", "not-a-uuid"]).is_err());

        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from(["rollcall", "enroll", &id.to_string()]).unwrap();
        match cli.command {
            Commands::Enroll { event_id } => assert_eq!(event_id, id),
            _ => panic!("Expected enroll command"),
        }
    }

    #[test]
    fn test_event_create_parses_dates() {
        let cli = Cli::try_parse_from([
            "rollcall",
            "--token",
            "abc",
            "events",
            "create",
            "--title",
            "Rust meetup",
            "--description",
            "Monthly gathering of local Rustaceans",
            "--start",
            "2030-05-01T18:00:00Z",
            "--end",
            "2030-05-01T21:00:00Z",
            "--location",
            "Main hall",
            "--capacity",
            "30",
        ])
        .unwrap();
        assert_eq!(cli.token.as_deref(), Some("abc"));
        match cli.command {
            Commands::Events {
                action: event_commands::EventAction::Create { start, capacity, .. },
            } => {
                assert_eq!(start.to_rfc3339(), "2030-05-01T18:00:00+00:00");
                assert_eq!(capacity, 30);
            }
            _ => panic!("Expected events create command"),
        }
    }
}
