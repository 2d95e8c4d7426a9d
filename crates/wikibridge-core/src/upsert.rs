//! Page upsert with optimistic-locking retry.
//!
//! Publishing never overwrites: a free title is created under the target
//! parent, an existing page gets the new content appended as a clearly
//! demarcated section. Appends read the current version, write against
//! it, and retry on version conflicts with a fresh read, bounded so a
//! hot page cannot trap the broker in a livelock.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use wikibridge_tpl::escape_html;

use crate::error::CoreError;
use crate::ports::{PageSummary, WikiClient};
use crate::session::TargetIdentity;

/// Total write attempts against an existing page before giving up.
const MAX_UPSERT_ATTEMPTS: u32 = 3;

/// How a publish landed in the wiki.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum UpsertOutcome {
    /// A new page was created under the target parent.
    Created { page: PageSummary },
    /// The content was appended to an existing page of the same title.
    Appended { page: PageSummary, attempts: u32 },
}

impl UpsertOutcome {
    pub fn page(&self) -> &PageSummary {
        match self {
            Self::Created { page } | Self::Appended { page, .. } => page,
        }
    }
}

/// Create-or-append policy over a [`WikiClient`].
pub struct PageUpsertPolicy<'a> {
    wiki: &'a dyn WikiClient,
}

impl<'a> PageUpsertPolicy<'a> {
    pub fn new(wiki: &'a dyn WikiClient) -> Self {
        Self { wiki }
    }

    /// Publish `body` at the target identity.
    ///
    /// Without a merge key an occupied title is a hard error; with one,
    /// the new content is appended to the existing page under a section
    /// labelled by the key.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::DuplicatePage` for an occupied title without a
    /// merge key, `CoreError::ConcurrentModificationExceeded` when every
    /// append attempt hit a version conflict, and propagates wiki errors
    /// otherwise.
    #[instrument(skip(self, body), fields(title = target.title.as_str()))]
    pub async fn upsert(
        &self,
        target: &TargetIdentity,
        body: &str,
        merge_key: Option<&str>,
    ) -> Result<UpsertOutcome, CoreError> {
        let existing = self
            .wiki
            .find_page(&target.space_key, &target.title)
            .await?;

        let page_id = match existing {
            None => {
                match self
                    .wiki
                    .create_page(&target.space_key, &target.parent_page_id, &target.title, body)
                    .await
                {
                    Ok(page) => {
                        info!(page_id = page.id.as_str(), "page created");
                        return Ok(UpsertOutcome::Created { page });
                    }
                    // Lost a create race; the title now exists.
                    Err(CoreError::DuplicatePage { .. }) if merge_key.is_some() => {
                        debug!("create raced with an existing title, switching to append");
                        self.wiki
                            .find_page(&target.space_key, &target.title)
                            .await?
                            .ok_or_else(|| CoreError::DuplicatePage {
                                title: target.title.clone(),
                            })?
                            .id
                    }
                    Err(e) => return Err(e),
                }
            }
            Some(page) => {
                if merge_key.is_none() {
                    return Err(CoreError::DuplicatePage {
                        title: target.title.clone(),
                    });
                }
                page.id
            }
        };

        // merge_key is Some on every path that reaches here.
        let label = merge_key.unwrap_or_default();
        self.append_with_retry(&page_id, &target.title, body, label)
            .await
    }

    async fn append_with_retry(
        &self,
        page_id: &str,
        title: &str,
        body: &str,
        merge_key: &str,
    ) -> Result<UpsertOutcome, CoreError> {
        for attempt in 1..=MAX_UPSERT_ATTEMPTS {
            // Fresh read each attempt; the conflict means our last read
            // went stale.
            let current = self.wiki.get_page(page_id).await?;
            let merged = format!("{}{}", current.body, build_append_section(body, merge_key));

            match self
                .wiki
                .update_page(page_id, title, &merged, current.version)
                .await
            {
                Ok(page) => {
                    info!(page_id = page.id.as_str(), attempt, "content appended");
                    return Ok(UpsertOutcome::Appended { page, attempts: attempt });
                }
                Err(CoreError::PageConflict { .. }) => {
                    warn!(page_id, attempt, "version conflict, retrying append");
                }
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::ConcurrentModificationExceeded {
            title: title.to_owned(),
            attempts: MAX_UPSERT_ATTEMPTS,
        })
    }
}

/// Wrap new content in a demarcated section so appended runs stay
/// distinguishable from the original page body.
fn build_append_section(body: &str, merge_key: &str) -> String {
    let stamp = Utc::now().format("%Y-%m-%d %H:%M UTC");
    format!(
        "<hr /><ac:structured-macro ac:name=\"info\">\
         <ac:rich-text-body><p>{} update ({stamp})</p></ac:rich-text-body>\
         </ac:structured-macro>{body}",
        escape_html(merge_key),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PageContent;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory wiki with an injectable number of version conflicts.
    struct FakeWiki {
        state: Mutex<FakeState>,
    }

    struct FakeState {
        page: Option<PageContent>,
        conflicts_remaining: u32,
        create_calls: u32,
    }

    impl FakeWiki {
        fn empty() -> Self {
            Self {
                state: Mutex::new(FakeState {
                    page: None,
                    conflicts_remaining: 0,
                    create_calls: 0,
                }),
            }
        }

        fn with_page(body: &str, conflicts: u32) -> Self {
            Self {
                state: Mutex::new(FakeState {
                    page: Some(PageContent {
                        id: "p1".to_owned(),
                        title: "[PROJ-1] login".to_owned(),
                        body: body.to_owned(),
                        version: 4,
                        url: "https://wiki/p1".to_owned(),
                    }),
                    conflicts_remaining: conflicts,
                    create_calls: 0,
                }),
            }
        }

        fn body(&self) -> String {
            self.state
                .lock()
                .expect("fake lock")
                .page
                .as_ref()
                .expect("page should exist")
                .body
                .clone()
        }
    }

    #[async_trait]
    impl WikiClient for FakeWiki {
        async fn find_page(
            &self,
            _space_key: &str,
            title: &str,
        ) -> Result<Option<PageSummary>, CoreError> {
            let state = self.state.lock().expect("fake lock");
            Ok(state
                .page
                .as_ref()
                .filter(|p| p.title == title)
                .map(|p| PageSummary {
                    id: p.id.clone(),
                    title: p.title.clone(),
                    url: p.url.clone(),
                }))
        }

        async fn get_page(&self, page_id: &str) -> Result<PageContent, CoreError> {
            let state = self.state.lock().expect("fake lock");
            state
                .page
                .clone()
                .filter(|p| p.id == page_id)
                .ok_or_else(|| CoreError::PageConflict {
                    page_id: page_id.to_owned(),
                })
        }

        async fn create_page(
            &self,
            _space_key: &str,
            _parent_page_id: &str,
            title: &str,
            body: &str,
        ) -> Result<PageSummary, CoreError> {
            let mut state = self.state.lock().expect("fake lock");
            state.create_calls += 1;
            if state.page.is_some() {
                return Err(CoreError::DuplicatePage {
                    title: title.to_owned(),
                });
            }
            let page = PageContent {
                id: "p1".to_owned(),
                title: title.to_owned(),
                body: body.to_owned(),
                version: 1,
                url: "https://wiki/p1".to_owned(),
            };
            let summary = PageSummary {
                id: page.id.clone(),
                title: page.title.clone(),
                url: page.url.clone(),
            };
            state.page = Some(page);
            Ok(summary)
        }

        async fn update_page(
            &self,
            page_id: &str,
            _title: &str,
            body: &str,
            expected_version: u64,
        ) -> Result<PageSummary, CoreError> {
            let mut state = self.state.lock().expect("fake lock");
            if state.conflicts_remaining > 0 {
                state.conflicts_remaining -= 1;
                // A competing writer bumped the version between our read
                // and this write.
                if let Some(page) = state.page.as_mut() {
                    page.version += 1;
                }
                return Err(CoreError::PageConflict {
                    page_id: page_id.to_owned(),
                });
            }
            let page = state
                .page
                .as_mut()
                .filter(|p| p.version == expected_version)
                .ok_or_else(|| CoreError::PageConflict {
                    page_id: page_id.to_owned(),
                })?;
            page.body = body.to_owned();
            page.version += 1;
            Ok(PageSummary {
                id: page.id.clone(),
                title: page.title.clone(),
                url: page.url.clone(),
            })
        }
    }

    fn target() -> TargetIdentity {
        TargetIdentity {
            space_key: "ENG".to_owned(),
            parent_page_id: "1000".to_owned(),
            title: "[PROJ-1] login".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_should_create_page_when_title_is_free() {
        let wiki = FakeWiki::empty();
        let outcome = PageUpsertPolicy::new(&wiki)
            .upsert(&target(), "<p>new</p>", Some("PROJ-1"))
            .await
            .expect("upsert should succeed");

        assert!(matches!(outcome, UpsertOutcome::Created { .. }));
        assert_eq!(wiki.body(), "<p>new</p>");
    }

    #[tokio::test]
    async fn test_should_reject_occupied_title_without_merge_key() {
        let wiki = FakeWiki::with_page("<p>original</p>", 0);
        let result = PageUpsertPolicy::new(&wiki)
            .upsert(&target(), "<p>new</p>", None)
            .await;

        assert!(matches!(result, Err(CoreError::DuplicatePage { .. })));
        assert_eq!(wiki.body(), "<p>original</p>");
    }

    #[tokio::test]
    async fn test_should_append_demarcated_section_with_merge_key() {
        let wiki = FakeWiki::with_page("<p>original</p>", 0);
        let outcome = PageUpsertPolicy::new(&wiki)
            .upsert(&target(), "<p>addendum</p>", Some("PROJ-1"))
            .await
            .expect("upsert should succeed");

        assert!(matches!(outcome, UpsertOutcome::Appended { attempts: 1, .. }));
        let body = wiki.body();
        assert!(body.starts_with("<p>original</p>"));
        assert!(body.contains("ac:structured-macro"));
        assert!(body.contains("PROJ-1"));
        assert!(body.ends_with("<p>addendum</p>"));
    }

    #[tokio::test]
    async fn test_should_escape_markup_in_merge_key_label() {
        let wiki = FakeWiki::with_page("<p>original</p>", 0);
        PageUpsertPolicy::new(&wiki)
            .upsert(&target(), "<p>addendum</p>", Some("a & b <x>"))
            .await
            .expect("upsert should succeed");

        let body = wiki.body();
        assert!(body.contains("a &amp; b &lt;x&gt; update"));
        assert!(!body.contains("<x>"));
    }

    #[tokio::test]
    async fn test_should_retry_append_after_version_conflict() {
        let wiki = FakeWiki::with_page("<p>original</p>", 2);
        let outcome = PageUpsertPolicy::new(&wiki)
            .upsert(&target(), "<p>addendum</p>", Some("PROJ-1"))
            .await
            .expect("retry should eventually land");

        assert!(matches!(outcome, UpsertOutcome::Appended { attempts: 3, .. }));
        // Exactly one appended section despite the retries.
        assert_eq!(wiki.body().matches("ac:structured-macro").count(), 1);
    }

    #[tokio::test]
    async fn test_should_give_up_after_bounded_conflict_retries() {
        let wiki = FakeWiki::with_page("<p>original</p>", 5);
        let result = PageUpsertPolicy::new(&wiki)
            .upsert(&target(), "<p>addendum</p>", Some("PROJ-1"))
            .await;

        assert!(matches!(
            result,
            Err(CoreError::ConcurrentModificationExceeded { attempts: 3, .. })
        ));
        assert_eq!(wiki.body(), "<p>original</p>");
    }
}
