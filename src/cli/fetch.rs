use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use hoard::config::HoardConfig;
use hoard::ingest::fetch_all;
use hoard::record::Record;
use hoard::registry::Registry;

/// Instantiate configured sources, fetch them all, and print records as JSON lines.
///
/// A source that fails to instantiate is reported and skipped. Ctrl-C
/// cancels every running fetch.
pub async fn fetch(config: &HoardConfig, only: &[String]) -> Result<()> {
    let registry = Registry::from_global();

    for entry in &config.sources {
        if !only.is_empty() && !only.contains(&entry.name) {
            continue;
        }
        let settings = entry.settings_json()?;
        let created = match registry.decode_config(&entry.kind, settings) {
            Ok(decoded) => registry
                .create_instance(&entry.name, &entry.kind, Some(decoded))
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = created {
            eprintln!("Warning: skipping source '{}': {e}", entry.name);
        }
    }

    let names = registry.instance_names();
    if names.is_empty() {
        eprintln!("No sources to fetch.");
        return Ok(());
    }
    eprintln!("Fetching {} source(s): {}", names.len(), names.join(", "));

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling...");
            on_ctrl_c.cancel();
        }
    });

    let options = config.ingest.fetch_options();
    let (tx, mut rx) = mpsc::channel::<Box<dyn Record>>(options.queue_capacity);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(record) = rx.recv().await {
            let line = serde_json::to_string(&record.to_generic())?;
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
        }
        stdout.flush().await?;
        anyhow::Ok(())
    });

    let outcomes = fetch_all(&registry, &cancel, &options, tx).await;
    writer.await??;

    eprintln!("Fetch complete:");
    for outcome in &outcomes {
        match &outcome.result {
            Ok(()) => eprintln!("  {:<20} {} records", outcome.name, outcome.records),
            Err(e) => eprintln!(
                "  {:<20} {} records, {e}",
                outcome.name, outcome.records
            ),
        }
    }

    registry.close_all()?;
    Ok(())
}
