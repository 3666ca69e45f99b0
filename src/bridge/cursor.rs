//! Update cursor and startup drain.

use tracing::{debug, info};

use crate::common::error::FeedResult;

use super::network::RemoteFeed;

/// Last acknowledged update id. Only kept in memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateCursor {
    last: Option<i64>,
}

impl UpdateCursor {
    pub fn new(last: Option<i64>) -> Self {
        Self { last }
    }

    pub fn last(&self) -> Option<i64> {
        self.last
    }

    /// Accept an update id if it is newer than the cursor, advancing it.
    pub fn accept(&mut self, update_id: i64) -> bool {
        match self.last {
            Some(last) if update_id <= last => false,
            _ => {
                self.last = Some(update_id);
                true
            }
        }
    }
}

/// Discard everything already queued on the feed.
///
/// The feed hands out the backlog a page at a time, so keep fetching past
/// the highest id seen until a fetch comes back empty. That last fetch
/// acknowledges the whole backlog. Messages sent while the bridge was
/// offline are therefore never replayed.
pub async fn drain(feed: &dyn RemoteFeed) -> FeedResult<Option<i64>> {
    let mut cursor = None;
    let mut discarded = 0;

    loop {
        let batch = feed.fetch_updates(cursor).await?;
        let Some(highest) = batch.iter().map(|u| u.update_id).max() else {
            break;
        };
        if cursor.is_some_and(|last| highest <= last) {
            // Feed ignored the cursor; stop rather than spin
            break;
        }
        discarded += batch.len();
        cursor = Some(highest);
    }

    match cursor {
        Some(last) => info!(discarded, cursor = last, "Discarded stale Telegram updates"),
        None => debug!("No stale Telegram updates"),
    }

    Ok(cursor)
}
