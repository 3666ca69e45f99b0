//! In-memory networks for bridge tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::common::error::{FeedError, FeedResult};
use crate::common::Origin;
use crate::telegram::types::{Chat, Message, MessagePayload, Update, User};

use super::network::{LocalNetwork, RemoteFeed};

pub fn text_update(update_id: i64, chat_id: i64, user_id: i64, text: &str) -> Update {
    payload_update(
        update_id,
        chat_id,
        user_id,
        MessagePayload::Text(text.to_string()),
    )
}

pub fn payload_update(update_id: i64, chat_id: i64, user_id: i64, payload: MessagePayload) -> Update {
    Update {
        update_id,
        message: Some(Message {
            message_id: update_id,
            chat: Chat {
                id: chat_id,
                title: None,
            },
            from: Some(User {
                id: user_id,
                username: Some(format!("user{}", user_id)),
                first_name: None,
                last_name: None,
            }),
            payload,
        }),
    }
}

/// Scripted Telegram feed.
///
/// `fetch_updates(None)` returns the backlog; polls pop scripted results and
/// block for the full timeout once the script runs out.
#[derive(Default)]
pub struct FakeFeed {
    backlog: Vec<Update>,
    polls: Mutex<VecDeque<FeedResult<Vec<Update>>>>,
    fetch_calls: Mutex<Vec<Option<i64>>>,
    fail_fetches: Mutex<usize>,
    sent: Mutex<Vec<(i64, String)>>,
    fail_sends: bool,
    /// Most updates one fetch returns; `None` returns the whole backlog.
    page_size: Option<usize>,
}

impl FakeFeed {
    pub fn with_backlog(backlog: Vec<Update>) -> Self {
        Self {
            backlog,
            ..Self::default()
        }
    }

    /// Page fetches like `getUpdates` does with its `limit`.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn failing_sends() -> Self {
        Self {
            fail_sends: true,
            ..Self::default()
        }
    }

    /// Make the next `count` fetches fail.
    pub fn fail_next_fetches(&self, count: usize) {
        *self.fail_fetches.lock().unwrap() = count;
    }

    pub fn push_poll(&self, result: FeedResult<Vec<Update>>) {
        self.polls.lock().unwrap().push_back(result);
    }

    pub fn fetch_calls(&self) -> Vec<Option<i64>> {
        self.fetch_calls.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn pending_polls(&self) -> usize {
        self.polls.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteFeed for FakeFeed {
    async fn fetch_updates(&self, cursor: Option<i64>) -> FeedResult<Vec<Update>> {
        {
            let mut failures = self.fail_fetches.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(FeedError::Decode {
                    message: "scripted fetch failure".to_string(),
                });
            }
        }
        self.fetch_calls.lock().unwrap().push(cursor);
        Ok(self
            .backlog
            .iter()
            .filter(|u| cursor.map_or(true, |c| u.update_id > c))
            .take(self.page_size.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn poll_updates(&self, timeout: Duration) -> FeedResult<Vec<Update>> {
        let next = self.polls.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => {
                tokio::time::sleep(timeout).await;
                Ok(Vec::new())
            }
        }
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> FeedResult<()> {
        if self.fail_sends {
            return Err(FeedError::Api {
                code: 403,
                description: "Forbidden: bot was kicked".to_string(),
            });
        }
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

/// Recording IRC network.
#[derive(Default)]
pub struct FakeLocal {
    joined: Mutex<HashSet<String>>,
    chat_ids: HashMap<String, i64>,
    outgoing: Mutex<Vec<(String, String, Origin)>>,
    incoming: Mutex<Vec<(String, String, String, Origin)>>,
}

impl FakeLocal {
    /// Network joined to every listed channel, bound to the given chat ids.
    pub fn new(bindings: &[(&str, i64)]) -> Self {
        Self {
            joined: Mutex::new(bindings.iter().map(|(c, _)| c.to_string()).collect()),
            chat_ids: bindings
                .iter()
                .map(|(c, id)| (c.to_string(), *id))
                .collect(),
            ..Self::default()
        }
    }

    pub fn join(&self, channel: &str) {
        self.joined.lock().unwrap().insert(channel.to_string());
    }

    pub fn part(&self, channel: &str) {
        self.joined.lock().unwrap().remove(channel);
    }

    pub fn outgoing(&self) -> Vec<(String, String, Origin)> {
        self.outgoing.lock().unwrap().clone()
    }

    pub fn incoming(&self) -> Vec<(String, String, String, Origin)> {
        self.incoming.lock().unwrap().clone()
    }
}

impl LocalNetwork for FakeLocal {
    fn feed_incoming(&self, channel: &str, author: &str, text: &str, origin: Origin) {
        self.incoming.lock().unwrap().push((
            channel.to_string(),
            author.to_string(),
            text.to_string(),
            origin,
        ));
    }

    fn enqueue_outgoing(&self, channel: &str, text: &str, origin: Origin) {
        self.outgoing
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string(), origin));
    }

    fn channels_joined(&self) -> HashSet<String> {
        self.joined.lock().unwrap().clone()
    }

    fn configured_chat_id(&self, channel: &str) -> i64 {
        self.chat_ids.get(channel).copied().unwrap_or(0)
    }
}
