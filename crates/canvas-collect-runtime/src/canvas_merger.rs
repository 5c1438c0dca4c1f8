//! Find-or-create for the per-tag collection canvas in an anchor channel.

use std::sync::OnceLock;

use canvas_collect_core::{CollectError, CollectErrorKind, CollectResult};
use regex::Regex;

use crate::backoff_gateway::ApiGateway;
use crate::slack_api::{CanvasFile, SlackApi};

/// Deterministic canvas title; identical for every locale.
pub fn canvas_title(tag: &str) -> String {
    format!(":{tag}: Collection Log")
}

fn team_domain_regex() -> &'static Regex {
    static TEAM_DOMAIN: OnceLock<Regex> = OnceLock::new();
    TEAM_DOMAIN.get_or_init(|| Regex::new(r"(?i)^[a-z0-9-]+$").expect("valid team domain regex"))
}

/// Workspace identity used to build canvas links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRef {
    team_id: String,
    team_domain: String,
}

impl WorkspaceRef {
    pub fn new(team_id: impl Into<String>, team_domain: impl Into<String>) -> CollectResult<Self> {
        let team_domain = team_domain.into();
        if !team_domain_regex().is_match(&team_domain) {
            return Err(CollectError::parse("error.invalidTeamDomain").with_detail(team_domain));
        }
        Ok(Self {
            team_id: team_id.into(),
            team_domain,
        })
    }

    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    pub fn team_domain(&self) -> &str {
        &self.team_domain
    }

    pub fn canvas_url(&self, canvas_id: &str) -> String {
        format!(
            "https://{}.slack.com/docs/{}/{canvas_id}",
            self.team_domain, self.team_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub url: String,
    pub is_new: bool,
}

pub struct CanvasMerger<'a> {
    api: &'a dyn SlackApi,
    gateway: &'a ApiGateway,
    workspace: &'a WorkspaceRef,
}

impl<'a> CanvasMerger<'a> {
    pub fn new(api: &'a dyn SlackApi, gateway: &'a ApiGateway, workspace: &'a WorkspaceRef) -> Self {
        Self {
            api,
            gateway,
            workspace,
        }
    }

    /// Appends to the existing canvas when `can_append`, otherwise replaces it.
    /// A missing canvas is always created fresh from `new_markdown`.
    pub async fn upsert(
        &self,
        anchor_channel: &str,
        tag: &str,
        new_markdown: &str,
        append_markdown: &str,
        can_append: bool,
    ) -> CollectResult<UpsertOutcome> {
        let title = canvas_title(tag);
        let existing = self.find_existing(anchor_channel, &title).await?;

        match existing {
            None => {
                tracing::info!(anchor_channel, tag, "creating collection canvas");
                self.create(anchor_channel, &title, new_markdown).await
            }
            Some(canvas) if can_append => {
                tracing::info!(anchor_channel, tag, canvas_id = canvas.id.as_str(), "appending to collection canvas");
                self.gateway
                    .call("canvases.edit", || {
                        self.api.append_to_canvas(&canvas.id, append_markdown)
                    })
                    .await?;
                Ok(UpsertOutcome {
                    url: self.workspace.canvas_url(&canvas.id),
                    is_new: false,
                })
            }
            Some(canvas) => {
                tracing::info!(anchor_channel, tag, canvas_id = canvas.id.as_str(), "replacing collection canvas");
                self.gateway
                    .call("canvases.delete", || self.api.delete_canvas(&canvas.id))
                    .await?;
                self.create(anchor_channel, &title, new_markdown).await
            }
        }
    }

    /// Most recently updated canvas whose title matches exactly.
    pub async fn find_existing(
        &self,
        anchor_channel: &str,
        title: &str,
    ) -> CollectResult<Option<CanvasFile>> {
        let mut newest: Option<CanvasFile> = None;
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .gateway
                .call("files.list", || {
                    self.api.list_canvases(anchor_channel, cursor.as_deref())
                })
                .await?;
            for canvas in page.items.into_iter().filter(|canvas| canvas.title == title) {
                let replace = newest
                    .as_ref()
                    .map_or(true, |current| canvas.updated > current.updated);
                if replace {
                    newest = Some(canvas);
                }
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(newest)
    }

    async fn create(
        &self,
        anchor_channel: &str,
        title: &str,
        markdown: &str,
    ) -> CollectResult<UpsertOutcome> {
        let created = self
            .gateway
            .call("canvases.create", || {
                self.api.create_canvas(title, anchor_channel, markdown)
            })
            .await?;
        let Some(canvas_id) = created.canvas_id.filter(|id| !id.trim().is_empty()) else {
            return Err(CollectError::new(CollectErrorKind::DocumentCreateFailed)
                .with_message_key("error.canvasCreateFailed"));
        };
        let url = created
            .canvas_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| self.workspace.canvas_url(&canvas_id));
        Ok(UpsertOutcome { url, is_new: true })
    }
}

#[cfg(test)]
mod tests {
    use canvas_collect_core::CollectErrorKind;

    use super::{canvas_title, CanvasMerger, WorkspaceRef};
    use crate::backoff_gateway::ApiGateway;
    use crate::slack_api::CreatedCanvas;
    use crate::test_support::FakeSlackApi;

    fn workspace() -> WorkspaceRef {
        WorkspaceRef::new("T123", "myteam").expect("workspace")
    }

    #[test]
    fn unit_title_and_url_are_deterministic() {
        assert_eq!(canvas_title("bookmark"), ":bookmark: Collection Log");
        assert_eq!(
            workspace().canvas_url("F1"),
            "https://myteam.slack.com/docs/T123/F1"
        );
    }

    #[test]
    fn regression_team_domain_rejects_url_injection() {
        for domain in ["evil.com/x", "my team", "", "a?b"] {
            let error = WorkspaceRef::new("T1", domain).expect_err("invalid domain");
            assert_eq!(error.kind, CollectErrorKind::ParseError);
            assert_eq!(error.message_key, Some("error.invalidTeamDomain"));
        }
        assert!(WorkspaceRef::new("T1", "My-Team-01").is_ok());
    }

    #[tokio::test]
    async fn functional_missing_canvas_is_created_for_any_tier() {
        for can_append in [true, false] {
            let api = FakeSlackApi::new().with_canvas("F9", ":other: Collection Log", 10);
            let gateway = ApiGateway::default();
            let workspace = workspace();

            let outcome = CanvasMerger::new(&api, &gateway, &workspace)
                .upsert("C1", "bookmark", "full", "delta", can_append)
                .await
                .expect("upsert");

            assert!(outcome.is_new);
            assert_eq!(outcome.url, "https://myteam.slack.com/docs/T123/F1");
            let calls = api.calls();
            assert_eq!(
                calls.created,
                vec![(
                    ":bookmark: Collection Log".to_string(),
                    "C1".to_string(),
                    "full".to_string()
                )]
            );
            assert!(calls.deleted.is_empty());
        }
    }

    #[tokio::test]
    async fn functional_existing_canvas_is_appended_when_allowed() {
        let api = FakeSlackApi::new()
            .with_canvas("F_OLD", ":bookmark: Collection Log", 100)
            .with_canvas("F_X", ":other: Collection Log", 500)
            .with_canvas("F_NEW", ":bookmark: Collection Log", 200);
        let gateway = ApiGateway::default();
        let workspace = workspace();

        let outcome = CanvasMerger::new(&api, &gateway, &workspace)
            .upsert("C1", "bookmark", "full", "delta", true)
            .await
            .expect("upsert");

        assert!(!outcome.is_new);
        assert_eq!(outcome.url, "https://myteam.slack.com/docs/T123/F_NEW");
        let calls = api.calls();
        assert_eq!(calls.appended, vec![("F_NEW".to_string(), "delta".to_string())]);
        assert!(calls.created.is_empty());
        assert!(calls.deleted.is_empty());
    }

    #[tokio::test]
    async fn functional_existing_canvas_is_replaced_when_append_not_allowed() {
        let api = FakeSlackApi::new().with_canvas("F_OLD", ":bookmark: Collection Log", 100);
        let gateway = ApiGateway::default();
        let workspace = workspace();

        let outcome = CanvasMerger::new(&api, &gateway, &workspace)
            .upsert("C1", "bookmark", "full", "delta", false)
            .await
            .expect("upsert");

        assert!(outcome.is_new);
        let calls = api.calls();
        assert_eq!(calls.deleted, vec!["F_OLD".to_string()]);
        assert_eq!(calls.created.len(), 1);
        assert_eq!(calls.created[0].2, "full");
        assert!(calls.appended.is_empty());
    }

    #[tokio::test]
    async fn functional_response_url_takes_precedence_over_built_url() {
        let mut api = FakeSlackApi::new();
        api.create_response = Some(CreatedCanvas {
            canvas_id: Some("F7".to_string()),
            canvas_url: Some("https://custom.example/canvas".to_string()),
        });
        let gateway = ApiGateway::default();
        let workspace = workspace();

        let outcome = CanvasMerger::new(&api, &gateway, &workspace)
            .upsert("C1", "bookmark", "full", "delta", true)
            .await
            .expect("upsert");
        assert_eq!(outcome.url, "https://custom.example/canvas");
    }

    #[tokio::test]
    async fn regression_create_without_id_is_an_error() {
        let mut api = FakeSlackApi::new();
        api.create_response = Some(CreatedCanvas {
            canvas_id: None,
            canvas_url: None,
        });
        let gateway = ApiGateway::default();
        let workspace = workspace();

        let error = CanvasMerger::new(&api, &gateway, &workspace)
            .upsert("C1", "bookmark", "full", "delta", true)
            .await
            .expect_err("missing id");
        assert_eq!(error.kind, CollectErrorKind::DocumentCreateFailed);
        assert_eq!(error.message_key, Some("error.canvasCreateFailed"));
    }

    #[tokio::test]
    async fn regression_append_failure_is_classified_as_edit_failure() {
        let mut api = FakeSlackApi::new().with_canvas("F1", ":bookmark: Collection Log", 1);
        api.append_failure = Some("canvas_editing_failed".to_string());
        let gateway = ApiGateway::default();
        let workspace = workspace();

        let error = CanvasMerger::new(&api, &gateway, &workspace)
            .upsert("C1", "bookmark", "full", "delta", true)
            .await
            .expect_err("edit failure");
        assert_eq!(error.kind, CollectErrorKind::DocumentEditFailed);
    }
}
