use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use rollcall_core::{EventCreateRequest, EventUpdateRequest, PageQuery};
use rollcall_sdk::RollcallClient;
use uuid::Uuid;

use crate::format;

#[derive(Subcommand)]
pub enum EventAction {
    /// List active events
    List {
        #[arg(long, default_value_t = 0)]
        page: u64,
        #[arg(long, default_value_t = 10)]
        size: u64,
    },
    /// Search active events by title or location
    Search {
        query: String,
        #[arg(long, default_value_t = 0)]
        page: u64,
        #[arg(long, default_value_t = 10)]
        size: u64,
    },
    /// Show one event
    Show { id: Uuid },
    /// List the events you organize
    Mine,
    /// Create an event (organizers only)
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        /// RFC 3339 start, e.g. 2030-05-01T18:00:00Z
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
        #[arg(long)]
        location: String,
        #[arg(long)]
        capacity: i32,
    },
    /// Change the capacity of an event you organize
    SetCapacity { id: Uuid, capacity: i32 },
    /// Delete an event (deactivates it when enrollments exist)
    Delete { id: Uuid },
    /// Promote the next waiting enrollment
    ProcessWaitingList { id: Uuid },
}

pub async fn handle_event_command(client: &RollcallClient, action: EventAction) -> Result<()> {
    match action {
        EventAction::List { page, size } => {
            let page = client
                .list_events(PageQuery::new(page, size))
                .await
                .context("failed to list events")?;
            for event in &page.content {
                println!("{}", format::event_line(event));
            }
            println!("{}", format::page_footer(&page));
        }
        EventAction::Search { query, page, size } => {
            let page = client
                .search_events(&query, PageQuery::new(page, size))
                .await
                .context("search failed")?;
            for event in &page.content {
                println!("{}", format::event_line(event));
            }
            println!("{}", format::page_footer(&page));
        }
        EventAction::Show { id } => {
            let event = client.get_event(id).await.context("failed to load event")?;
            println!("{}", format::event_details(&event));
        }
        EventAction::Mine => {
            let page = client
                .my_events(PageQuery::default())
                .await
                .context("failed to list your events")?;
            for event in &page.content {
                println!("{}", format::event_line(event));
            }
            println!("{}", format::page_footer(&page));
        }
        EventAction::Create {
            title,
            description,
            start,
            end,
            location,
            capacity,
        } => {
            let request = EventCreateRequest {
                title,
                description,
                start_date_time: start,
                end_date_time: end,
                location,
                capacity,
            };
            let event = client
                .create_event(&request)
                .await
                .context("failed to create event")?;
            println!("✅ Event created: {}", event.id);
        }
        EventAction::SetCapacity { id, capacity } => {
            let patch = EventUpdateRequest {
                capacity: Some(capacity),
                ..Default::default()
            };
            let event = client
                .update_event(id, &patch)
                .await
                .context("failed to update event")?;
            println!("✅ {}", format::event_line(&event));
        }
        EventAction::Delete { id } => {
            let message = client
                .delete_event(id)
                .await
                .context("failed to delete event")?;
            println!("✅ {}", message);
        }
        EventAction::ProcessWaitingList { id } => {
            match client
                .process_waiting_list(id)
                .await
                .context("failed to process waiting list")?
            {
                Some(enrollment) => println!("✅ Promoted {}", format::enrollment_line(&enrollment)),
                None => println!("Nothing to promote"),
            }
        }
    }
    Ok(())
}
