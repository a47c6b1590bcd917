//! List sources command

use anyhow::Result;
use wledsync_core::capture;

/// List available capture sources
pub async fn list_sources() -> Result<()> {
    println!("WLEDVideoSync - Available Capture Sources\n");

    let sources = tokio::task::spawn_blocking(capture::list_sources).await??;

    if sources.is_empty() {
        println!("No screens or cameras found.");
        println!("\nNote: desktop and camera capture need the 'desktop' and 'webcam' features.");
        println!("Media files and 'queue' sources are always available.");
        return Ok(());
    }

    println!(
        "{:<24} {:<30} {:<10} {:<15}",
        "ID", "Name", "Type", "Resolution"
    );
    println!("{}", "-".repeat(79));

    for source in sources {
        let dims = source
            .dimensions
            .map(|(w, h)| format!("{}x{}", w, h))
            .unwrap_or_else(|| "Unknown".to_string());
        let primary = if source.primary { " [primary]" } else { "" };

        println!(
            "{:<24} {:<30} {:<10} {}{}",
            source.id,
            truncate(&source.name, 28),
            source.kind,
            dims,
            primary
        );
    }

    println!("\nUse the ID as the source of 'wledvideosync cast'.");

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 3).collect();
        format!("{}...", head)
    }
}
