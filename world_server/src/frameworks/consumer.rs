// Replay consumer loop: move log -> character store, at least once.

use crate::domain::ports::CharacterRecords;
use crate::frameworks::config;
use crate::frameworks::server::init_runtime;
use crate::interface_adapters::clients::characters::CharactersClient;
use crate::interface_adapters::event_log::MoveLogReader;
use crate::use_cases::replay::{ApplyOutcome, MoveReplayer, ReplayError};

use std::io::Result;
use tracing::{debug, info, warn};

pub async fn run_consumer() -> Result<()> {
    init_runtime();

    let log_path = config::move_log_path();
    let reader = MoveLogReader::new(&log_path);
    let records = CharactersClient::new(
        config::characters_service_url(),
        config::characters_request_timeout(),
    )
    .map_err(|e| std::io::Error::other(format!("failed to initialize characters client: {e}")))?
    .with_service_token(config::characters_service_token());
    let replayer = MoveReplayer { records };

    let poll_interval = config::move_consumer_poll_interval();
    let mut offset = reader.load_offset().await?;
    info!(
        path = %log_path.display(),
        offset,
        poll_ms = poll_interval.as_millis() as u64,
        "move consumer started"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        offset = consume_batch(&reader, &replayer, offset).await?;

        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    info!(offset, "move consumer stopped");
    Ok(())
}

/// Applies every complete entry after `offset` and commits how far it got.
/// A store failure stops the batch so the failed entry is retried next poll.
pub async fn consume_batch<R>(
    reader: &MoveLogReader,
    replayer: &MoveReplayer<R>,
    offset: u64,
) -> Result<u64>
where
    R: CharacterRecords,
{
    let entries = reader.read_from(offset).await?;
    if entries.is_empty() {
        debug!(offset, "no new moves");
        return Ok(offset);
    }

    let mut committed = offset;
    let mut applied = 0usize;
    for entry in &entries {
        match replayer.apply_line(&entry.line).await {
            Ok(ApplyOutcome::Applied) => applied += 1,
            Ok(ApplyOutcome::UnknownAction | ApplyOutcome::MissingCharacter) => {}
            Err(ReplayError::Decode(error)) => {
                warn!(offset = committed, %error, "skipping malformed move log entry");
            }
            Err(error @ ReplayError::Store(_)) => {
                warn!(offset = committed, %error, "character store failed; retrying later");
                break;
            }
        }
        committed = entry.end_offset;
    }

    if committed != offset {
        reader.commit_offset(committed).await?;
        info!(applied, offset = committed, "move log offset committed");
    }
    Ok(committed)
}
