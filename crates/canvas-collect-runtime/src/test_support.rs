//! Scripted in-memory `SlackApi` used by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::slack_api::{
    CanvasFile, CreatedCanvas, HistoryRequest, Page, RepliesRequest, SlackApi, SlackApiError,
    SlackChannel, SlackMessage, SlackReaction, SlackUser, SlackUserProfile,
};

pub(crate) fn message(ts: &str, reactions: &[&str]) -> SlackMessage {
    SlackMessage {
        ts: Some(ts.to_string()),
        user: None,
        text: None,
        reply_count: 0,
        reactions: reactions
            .iter()
            .map(|name| SlackReaction {
                name: name.to_string(),
                count: 1,
            })
            .collect(),
    }
}

pub(crate) fn thread_root(ts: &str, reactions: &[&str], reply_count: u32) -> SlackMessage {
    SlackMessage {
        reply_count,
        ..message(ts, reactions)
    }
}

pub(crate) fn channel(id: &str, name: &str) -> SlackChannel {
    SlackChannel {
        id: id.to_string(),
        name: Some(name.to_string()),
    }
}

fn paged<T: Clone>(pages: &[Vec<T>], cursor: Option<&str>) -> Page<T> {
    let index = cursor
        .and_then(|cursor| cursor.strip_prefix("page-"))
        .and_then(|index| index.parse::<usize>().ok())
        .unwrap_or(0);
    let items = pages.get(index).cloned().unwrap_or_default();
    let next_cursor = (index + 1 < pages.len()).then(|| format!("page-{}", index + 1));
    Page::new(items, next_cursor)
}

#[derive(Debug, Default)]
pub(crate) struct CallLog {
    pub(crate) history: Vec<HistoryRequest>,
    pub(crate) replies: Vec<RepliesRequest>,
    pub(crate) member_channel_pages: usize,
    pub(crate) channel_list_pages: usize,
    pub(crate) permalinks: usize,
    pub(crate) user_info: Vec<String>,
    pub(crate) created: Vec<(String, String, String)>,
    pub(crate) appended: Vec<(String, String)>,
    pub(crate) deleted: Vec<String>,
}

#[derive(Default)]
pub(crate) struct FakeSlackApi {
    pub(crate) member_channel_pages: Vec<Vec<SlackChannel>>,
    pub(crate) channel_pages: Vec<Vec<SlackChannel>>,
    pub(crate) channel_names: HashMap<String, String>,
    pub(crate) histories: HashMap<String, Vec<Vec<SlackMessage>>>,
    pub(crate) history_failures: HashMap<String, String>,
    pub(crate) replies: HashMap<(String, String), Vec<Vec<SlackMessage>>>,
    pub(crate) failing_permalinks: Vec<String>,
    pub(crate) users: HashMap<String, SlackUser>,
    pub(crate) failing_member_listing: Option<String>,
    pub(crate) canvases: Mutex<Vec<CanvasFile>>,
    pub(crate) create_response: Option<CreatedCanvas>,
    pub(crate) create_failure: Option<String>,
    pub(crate) append_failure: Option<String>,
    pub(crate) calls: Mutex<CallLog>,
}

impl FakeSlackApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_member_channels(mut self, channels: &[(&str, &str)]) -> Self {
        let listed = channels
            .iter()
            .map(|(id, name)| channel(id, name))
            .collect::<Vec<_>>();
        for (id, name) in channels {
            self.channel_names.insert(id.to_string(), name.to_string());
        }
        self.member_channel_pages = vec![listed.clone()];
        self.channel_pages = vec![listed];
        self
    }

    pub(crate) fn with_channel_name(mut self, id: &str, name: &str) -> Self {
        self.channel_names.insert(id.to_string(), name.to_string());
        self
    }

    pub(crate) fn with_history(mut self, channel: &str, pages: Vec<Vec<SlackMessage>>) -> Self {
        self.histories.insert(channel.to_string(), pages);
        self
    }

    pub(crate) fn with_history_failure(mut self, channel: &str, code: &str) -> Self {
        self.history_failures
            .insert(channel.to_string(), code.to_string());
        self
    }

    pub(crate) fn with_replies(
        mut self,
        channel: &str,
        thread_ts: &str,
        pages: Vec<Vec<SlackMessage>>,
    ) -> Self {
        self.replies
            .insert((channel.to_string(), thread_ts.to_string()), pages);
        self
    }

    pub(crate) fn with_user(mut self, id: &str, display_name: &str, locale: &str) -> Self {
        self.users.insert(
            id.to_string(),
            SlackUser {
                id: id.to_string(),
                name: Some(id.to_lowercase()),
                real_name: None,
                locale: Some(locale.to_string()),
                profile: SlackUserProfile {
                    display_name: Some(display_name.to_string()),
                    real_name: None,
                },
            },
        );
        self
    }

    pub(crate) fn with_canvas(self, id: &str, title: &str, updated: i64) -> Self {
        self.canvases
            .lock()
            .expect("canvas lock")
            .push(CanvasFile {
                id: id.to_string(),
                title: title.to_string(),
                updated,
            });
        self
    }

    pub(crate) fn calls(&self) -> std::sync::MutexGuard<'_, CallLog> {
        self.calls.lock().expect("call log lock")
    }
}

#[async_trait]
impl SlackApi for FakeSlackApi {
    async fn list_member_channels(
        &self,
        cursor: Option<&str>,
    ) -> Result<Page<SlackChannel>, SlackApiError> {
        self.calls().member_channel_pages += 1;
        if let Some(code) = self.failing_member_listing.as_deref() {
            return Err(SlackApiError::code(code));
        }
        Ok(paged(&self.member_channel_pages, cursor))
    }

    async fn list_channels(&self, cursor: Option<&str>) -> Result<Page<SlackChannel>, SlackApiError> {
        self.calls().channel_list_pages += 1;
        Ok(paged(&self.channel_pages, cursor))
    }

    async fn channel_history(
        &self,
        request: &HistoryRequest,
    ) -> Result<Page<SlackMessage>, SlackApiError> {
        self.calls().history.push(request.clone());
        if let Some(code) = self.history_failures.get(&request.channel) {
            return Err(SlackApiError::code(code.as_str()));
        }
        let pages = self
            .histories
            .get(&request.channel)
            .cloned()
            .unwrap_or_default();
        Ok(paged(&pages, request.cursor.as_deref()))
    }

    async fn thread_replies(
        &self,
        request: &RepliesRequest,
    ) -> Result<Page<SlackMessage>, SlackApiError> {
        self.calls().replies.push(request.clone());
        let pages = self
            .replies
            .get(&(request.channel.clone(), request.thread_ts.clone()))
            .cloned()
            .unwrap_or_default();
        Ok(paged(&pages, request.cursor.as_deref()))
    }

    async fn permalink(&self, channel: &str, ts: &str) -> Result<String, SlackApiError> {
        self.calls().permalinks += 1;
        if self.failing_permalinks.iter().any(|failing| failing == ts) {
            return Err(SlackApiError::code("message_not_found"));
        }
        Ok(format!(
            "https://example.slack.com/archives/{channel}/p{}",
            ts.replace('.', "")
        ))
    }

    async fn channel_info(&self, channel: &str) -> Result<SlackChannel, SlackApiError> {
        match self.channel_names.get(channel) {
            Some(name) => Ok(self::channel(channel, name)),
            None => Err(SlackApiError::code("channel_not_found")),
        }
    }

    async fn user_info(&self, user: &str) -> Result<SlackUser, SlackApiError> {
        self.calls().user_info.push(user.to_string());
        self.users
            .get(user)
            .cloned()
            .ok_or_else(|| SlackApiError::code("user_not_found"))
    }

    async fn list_canvases(
        &self,
        _channel: &str,
        cursor: Option<&str>,
    ) -> Result<Page<CanvasFile>, SlackApiError> {
        let canvases = self.canvases.lock().expect("canvas lock").clone();
        let pages = canvases
            .chunks(2)
            .map(|chunk| chunk.to_vec())
            .collect::<Vec<_>>();
        Ok(paged(&pages, cursor))
    }

    async fn create_canvas(
        &self,
        title: &str,
        channel: &str,
        markdown: &str,
    ) -> Result<CreatedCanvas, SlackApiError> {
        if let Some(code) = self.create_failure.as_deref() {
            return Err(SlackApiError::code(code));
        }
        let mut calls = self.calls();
        calls
            .created
            .push((title.to_string(), channel.to_string(), markdown.to_string()));
        let created = self.create_response.clone().unwrap_or_else(|| CreatedCanvas {
            canvas_id: Some(format!("F{}", calls.created.len())),
            canvas_url: None,
        });
        drop(calls);
        if let Some(id) = created.canvas_id.as_deref() {
            self.canvases.lock().expect("canvas lock").push(CanvasFile {
                id: id.to_string(),
                title: title.to_string(),
                updated: i64::MAX,
            });
        }
        Ok(created)
    }

    async fn append_to_canvas(
        &self,
        canvas_id: &str,
        markdown: &str,
    ) -> Result<(), SlackApiError> {
        if let Some(code) = self.append_failure.as_deref() {
            return Err(SlackApiError::code(code));
        }
        self.calls()
            .appended
            .push((canvas_id.to_string(), markdown.to_string()));
        Ok(())
    }

    async fn delete_canvas(&self, canvas_id: &str) -> Result<(), SlackApiError> {
        self.calls().deleted.push(canvas_id.to_string());
        self.canvases
            .lock()
            .expect("canvas lock")
            .retain(|canvas| canvas.id != canvas_id);
        Ok(())
    }
}
