use rollcall_core::{EnrollmentResponse, EnrollmentStats, EventResponse, EventStats, Page};

pub fn event_line(event: &EventResponse) -> String {
    format!(
        "{} | {} | {} @ {} | {}/{} confirmed{}",
        event.id,
        event.title,
        event.start_date_time.format("%Y-%m-%d %H:%M"),
        event.location,
        event.current_enrollments,
        event.capacity,
        if event.is_active { "" } else { " | inactive" }
    )
}

pub fn event_details(event: &EventResponse) -> String {
    format!(
        "{}\n  {}\n  When: {} - {}\n  Where: {}\n  Capacity: {} ({} confirmed)\n  Organizer: {} <{}>\n  Active: {}",
        event.title,
        event.description,
        event.start_date_time.format("%Y-%m-%d %H:%M"),
        event.end_date_time.format("%Y-%m-%d %H:%M"),
        event.location,
        event.capacity,
        event.current_enrollments,
        event.organizer_name,
        event.organizer_email,
        event.is_active
    )
}

pub fn enrollment_line(enrollment: &EnrollmentResponse) -> String {
    format!(
        "{} | {} | {} | {} <{}> | since {}",
        enrollment.id,
        enrollment.status,
        enrollment.event_title,
        enrollment.participant_name,
        enrollment.participant_email,
        enrollment.enrollment_date.format("%Y-%m-%d %H:%M:%S")
    )
}

pub fn page_footer<T>(page: &Page<T>) -> String {
    format!(
        "page {}/{} ({} total)",
        page.number + 1,
        page.total_pages.max(1),
        page.total_elements
    )
}

pub fn event_stats(stats: &EventStats, counts: Option<&EnrollmentStats>) -> String {
    let mut text = format!(
        "Capacity: {}\nConfirmed: {}\nPending: {}\nAvailable spots: {}",
        stats.capacity, stats.confirmed, stats.pending, stats.available_spots
    );
    if let Some(counts) = counts {
        text.push_str(&format!(
            "\nCancelled: {}\nTotal records: {}",
            counts.cancelled, counts.total
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_footer_is_one_based() {
        let page: Page<u8> = Page {
            content: vec![],
            total_pages: 0,
            total_elements: 0,
            size: 10,
            number: 0,
        };
        assert_eq!(page_footer(&page), "page 1/1 (0 total)");
    }

    #[test]
    fn test_stats_with_counts() {
        let stats = EventStats {
            event_id: uuid::Uuid::nil(),
            capacity: 3,
            confirmed: 2,
            pending: 1,
            available_spots: 1,
        };
        let counts = EnrollmentStats {
            confirmed: 2,
            pending: 1,
            cancelled: 4,
            total: 7,
        };
        let text = event_stats(&stats, Some(&counts));
        assert!(text.contains("Available spots: 1"));
        assert!(text.contains("Cancelled: 4"));
        assert!(!event_stats(&stats, None).contains("Cancelled"));
    }
}
