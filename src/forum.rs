//! Client for the forum API under test
//!
//! Every call goes through the shared `RequestExecutor` and returns a
//! [`Call`] with the route label, the outcome and any identifiers it
//! discovered. Discovered identifiers are also written to the shared
//! `IdCache`: after a successful list every listed id, after a successful
//! create (201 or 200) the new id.

use crate::traffic::executor::{Outcome, RequestExecutor, RequestSpec};
use crate::traffic::ids::{EntityId, EntityKind, IdCache};
use crate::traffic::join_url;
use crate::traffic::listing::{Identified, Listing};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Route templates used as statistics and metrics labels
pub mod routes {
    pub const BOARDS: &str = "/boards";
    pub const BOARD: &str = "/boards/{id}";
    pub const BOARD_POSTS: &str = "/boards/{id}/posts";
    pub const POSTS: &str = "/posts";
    pub const POST: &str = "/posts/{id}";
    pub const POST_COMMENTS: &str = "/posts/{id}/comments";
    pub const COMMENTS: &str = "/comments";
    pub const HEALTH: &str = "/health";
    pub const SLOW: &str = "/slow";
    pub const METRICS: &str = "/metrics";
}

/// Guard against servers that never stop reporting `has_more`
pub const MAX_PAGES: usize = 1000;

/// Author attached to generated posts and comments
pub const AUTHOR: &str = "Load Tester";

/// One API call and what it discovered
#[derive(Debug, Clone)]
pub struct Call {
    pub label: &'static str,
    pub outcome: Outcome,
    pub ids: Vec<EntityId>,
}

impl Call {
    fn new(label: &'static str, outcome: Outcome) -> Self {
        Self {
            label,
            outcome,
            ids: Vec::new(),
        }
    }

    /// First discovered id: the created entity, or the first listed one
    pub fn first_id(&self) -> Option<&EntityId> {
        self.ids.first()
    }

    pub fn into_labelled(self) -> (String, Outcome) {
        (self.label.to_string(), self.outcome)
    }
}

/// Result of a pagination-aware listing
#[derive(Debug, Clone, Default)]
pub struct PageWalk {
    pub ids: Vec<EntityId>,
    pub calls: Vec<Call>,
}

impl PageWalk {
    pub fn pages(&self) -> usize {
        self.calls.len()
    }
}

/// Typed access to the forum API
#[derive(Debug, Clone)]
pub struct ForumApi {
    base_url: String,
    executor: RequestExecutor,
    ids: Arc<IdCache>,
    page_size: u32,
}

impl ForumApi {
    pub fn new(
        base_url: impl Into<String>,
        executor: RequestExecutor,
        ids: Arc<IdCache>,
        page_size: u32,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            executor,
            ids,
            page_size: page_size.max(1),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn ids(&self) -> &Arc<IdCache> {
        &self.ids
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn send(&self, label: &'static str, request: RequestSpec) -> Call {
        let outcome = self.executor.execute(&request.with_label(label)).await;
        Call::new(label, outcome)
    }

    /// Send a list request and record every listed id under `kind`
    async fn list(&self, label: &'static str, path: &str, kind: EntityKind) -> Call {
        let mut call = self.send(label, RequestSpec::get(self.url(path))).await;
        if let Some(listing) = parse_listing(&call) {
            call.ids = listing.into_items().into_iter().map(|item| item.id).collect();
            self.ids.record_all(kind, call.ids.iter().cloned());
        }
        call
    }

    /// Send a create request and record the new id under `kind`
    async fn create(&self, label: &'static str, body: serde_json::Value, kind: EntityKind) -> Call {
        let mut call = self
            .send(label, RequestSpec::post(self.url(label), body))
            .await;

        let created = call
            .outcome
            .response()
            .filter(|r| r.status == 201 || r.status == 200)
            .and_then(|r| match r.json::<Identified>() {
                Ok(entity) => Some(entity.id),
                Err(e) => {
                    tracing::warn!(
                        endpoint = label,
                        error = %e,
                        "Create response did not contain an id"
                    );
                    None
                }
            });

        if let Some(id) = created {
            self.ids.record(kind, id.clone());
            call.ids.push(id);
        }
        call
    }

    pub async fn list_boards(&self) -> Call {
        self.list(routes::BOARDS, routes::BOARDS, EntityKind::Board)
            .await
    }

    /// Every board, following `next_page_state` across pages
    pub async fn browse_boards(&self) -> PageWalk {
        self.fetch_all(routes::BOARDS, routes::BOARDS, EntityKind::Board)
            .await
    }

    pub async fn get_board(&self, board: &EntityId) -> Call {
        self.send(
            routes::BOARD,
            RequestSpec::get(self.url(&format!("/boards/{}", board))),
        )
        .await
    }

    pub async fn create_board(&self) -> Call {
        self.create_board_with(
            &format!("Test Board {}", Uuid::new_v4()),
            "This is a test board created by load testing",
        )
        .await
    }

    pub async fn create_board_with(&self, name: &str, description: &str) -> Call {
        self.create(
            routes::BOARDS,
            json!({ "name": name, "description": description }),
            EntityKind::Board,
        )
        .await
    }

    pub async fn list_posts(&self, board: &EntityId) -> Call {
        self.list(
            routes::BOARD_POSTS,
            &format!("/boards/{}/posts", board),
            EntityKind::Post,
        )
        .await
    }

    pub async fn create_post(&self, board: &EntityId) -> Call {
        self.create_post_with(
            board,
            &format!("Test Post {}", Uuid::new_v4()),
            "This is a test post created by load testing",
            AUTHOR,
        )
        .await
    }

    pub async fn create_post_with(
        &self,
        board: &EntityId,
        title: &str,
        content: &str,
        author: &str,
    ) -> Call {
        self.create(
            routes::POSTS,
            json!({
                "board_id": board,
                "title": title,
                "content": content,
                "author": author,
            }),
            EntityKind::Post,
        )
        .await
    }

    pub async fn get_post(&self, post: &EntityId) -> Call {
        self.send(routes::POST, RequestSpec::get(self.url(&format!("/posts/{}", post))))
            .await
    }

    pub async fn list_comments(&self, post: &EntityId) -> Call {
        self.list(
            routes::POST_COMMENTS,
            &format!("/posts/{}/comments", post),
            EntityKind::Comment,
        )
        .await
    }

    pub async fn create_comment(&self, post: &EntityId) -> Call {
        self.create(
            routes::COMMENTS,
            json!({
                "post_id": post,
                "content": format!("Test comment {}", Uuid::new_v4()),
                "author": AUTHOR,
            }),
            EntityKind::Comment,
        )
        .await
    }

    pub async fn health(&self) -> Call {
        self.send(routes::HEALTH, RequestSpec::get(self.url(routes::HEALTH)))
            .await
    }

    pub async fn slow(&self) -> Call {
        self.send(routes::SLOW, RequestSpec::get(self.url(routes::SLOW)))
            .await
    }

    pub async fn metrics(&self) -> Call {
        self.send(routes::METRICS, RequestSpec::get(self.url(routes::METRICS)))
            .await
    }

    /// Walk every page of `path`, recording each id under `kind`
    ///
    /// Stops on a non-2xx or unparsable page and returns what was collected.
    pub async fn fetch_all(&self, path: &str, label: &'static str, kind: EntityKind) -> PageWalk {
        let mut walk = PageWalk::default();
        let mut page_state: Option<String> = None;
        let page_size = self.page_size.to_string();

        while walk.pages() < MAX_PAGES {
            let mut params = vec![("page_size", page_size.as_str())];
            if let Some(state) = &page_state {
                params.push(("page_state", state.as_str()));
            }

            let url = match reqwest::Url::parse_with_params(&self.url(path), &params) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(path, error = %e, "Cannot build page URL");
                    break;
                }
            };

            let mut call = self.send(label, RequestSpec::get(url.as_str())).await;
            let listing = parse_listing(&call);
            let next = listing.as_ref().and_then(Listing::next_page_token);

            if let Some(listing) = listing {
                call.ids = listing.into_items().into_iter().map(|item| item.id).collect();
                self.ids.record_all(kind, call.ids.iter().cloned());
                walk.ids.extend(call.ids.iter().cloned());
            }
            walk.calls.push(call);

            match next {
                Some(token) => page_state = Some(token),
                None => break,
            }
        }

        if walk.pages() >= MAX_PAGES {
            tracing::warn!(
                path,
                pages = walk.pages(),
                "Stopped pagination at the page limit"
            );
        }

        tracing::debug!(
            path,
            pages = walk.pages(),
            ids = walk.ids.len(),
            kind = %kind,
            "Pagination walk finished"
        );
        walk
    }
}

/// Parse a 2xx list response; anything else is "no usable data"
fn parse_listing(call: &Call) -> Option<Listing<Identified>> {
    let response = call.outcome.success_response()?;
    match response.json::<Listing<Identified>>() {
        Ok(listing) => Some(listing),
        Err(e) => {
            tracing::warn!(
                endpoint = call.label,
                status = response.status,
                error = %e,
                "Unparsable list response"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::executor::{Response, RetryPolicy, Transport, TransportError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers by exact URL; records every request it sees
    #[derive(Default)]
    struct Routes {
        answers: HashMap<String, (u16, String)>,
        seen: Mutex<Vec<RequestSpec>>,
    }

    impl Routes {
        fn with(mut self, url: &str, status: u16, body: &str) -> Self {
            self.answers
                .insert(url.to_string(), (status, body.to_string()));
            self
        }
    }

    #[async_trait]
    impl Transport for Routes {
        async fn send(&self, request: &RequestSpec) -> Result<Response, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            let (status, body) = self
                .answers
                .get(&request.url)
                .cloned()
                .unwrap_or((404, "{}".to_string()));
            Ok(Response::new(status, Duration::from_millis(1), body))
        }
    }

    fn api(routes: Routes) -> (ForumApi, Arc<Routes>) {
        let routes = Arc::new(routes);
        let executor = RequestExecutor::new(routes.clone(), RetryPolicy::default());
        (
            ForumApi::new("http://forum", executor, Arc::new(IdCache::default()), 2),
            routes,
        )
    }

    #[tokio::test]
    async fn test_list_boards_records_ids() {
        let (api, _) = api(Routes::default().with(
            "http://forum/boards",
            200,
            r#"[{"id": 4, "name": "a"}, {"id": 9, "name": "b"}]"#,
        ));

        let call = api.list_boards().await;

        assert_eq!(call.label, routes::BOARDS);
        assert_eq!(call.ids, vec![EntityId::Int(4), EntityId::Int(9)]);
        assert_eq!(api.ids().sample(EntityKind::Board), Some(EntityId::Int(4)));
    }

    #[tokio::test]
    async fn test_create_post_records_new_id_and_sends_payload() {
        let (api, routes) =
            api(Routes::default().with("http://forum/posts", 201, r#"{"id": "p-1"}"#));

        let call = api.create_post(&EntityId::Int(3)).await;

        assert_eq!(call.first_id(), Some(&EntityId::from("p-1")));
        assert_eq!(api.ids().sample(EntityKind::Post), Some(EntityId::from("p-1")));

        let seen = routes.seen.lock().unwrap();
        let body = seen[0].body.as_ref().unwrap();
        assert_eq!(body["board_id"], 3);
        assert_eq!(body["author"], AUTHOR);
        assert!(body["title"].as_str().unwrap().starts_with("Test Post "));
        assert_eq!(seen[0].label, routes::POSTS);
    }

    #[tokio::test]
    async fn test_failed_create_records_nothing() {
        let (api, _) = api(Routes::default().with("http://forum/boards", 500, "oops"));

        let call = api.create_board().await;

        assert!(call.outcome.is_error());
        assert!(call.ids.is_empty());
        assert!(api.ids().is_empty(EntityKind::Board));
    }

    #[tokio::test]
    async fn test_unparsable_list_is_no_data() {
        let (api, _) = api(Routes::default().with("http://forum/boards", 200, "<html>"));

        let call = api.list_boards().await;

        assert!(!call.outcome.is_error());
        assert!(call.ids.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_all_follows_page_state() {
        let (api, routes) = api(
            Routes::default()
                .with(
                    "http://forum/boards?page_size=2",
                    200,
                    r#"{"data": [{"id": 1}, {"id": 2}], "has_more": true, "next_page_state": "n 1"}"#,
                )
                .with(
                    "http://forum/boards?page_size=2&page_state=n+1",
                    200,
                    r#"{"data": [{"id": 3}], "has_more": false}"#,
                ),
        );

        let walk = api
            .fetch_all(routes::BOARDS, routes::BOARDS, EntityKind::Board)
            .await;

        assert_eq!(walk.pages(), 2);
        assert_eq!(
            walk.ids,
            vec![EntityId::Int(1), EntityId::Int(2), EntityId::Int(3)]
        );
        assert_eq!(api.ids().len(EntityKind::Board), 3);
        assert_eq!(routes.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_all_stops_on_error_page() {
        let (api, _) = api(Routes::default().with(
            "http://forum/boards?page_size=2",
            200,
            r#"{"data": [{"id": 1}], "has_more": true, "next_page_state": "x"}"#,
        ));

        let walk = api
            .fetch_all(routes::BOARDS, routes::BOARDS, EntityKind::Board)
            .await;

        assert_eq!(walk.pages(), 2);
        assert_eq!(walk.ids, vec![EntityId::Int(1)]);
        assert_eq!(walk.calls[1].outcome.status(), Some(404));
    }
}
