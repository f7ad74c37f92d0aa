//! Page session: one mounted page from mount to unmount.
//!
//! The session owns the [`ViewState`], the live subscription feeding it and, while
//! seeding runs, the seed task. All state changes happen on the task that drives
//! [`PageSession::next_event`] and [`PageSession::handle`].

use crate::detail::DetailView;
use crate::format::RenderContext;
use crate::input::{Command, CommandError, RecordRef};
use crate::page::{PageConfig, PageView, SeedStatus};
use crate::table::{HeaderCell, TableRow, TableView};
use ehrview_core::{
    resources_query, seed, subscribe, AuthError, Connection, Intent, SeedError, SeedReport,
    Subscription, SubscriptionError, ViewState,
};
use fhir::ResourceRecord;
use tokio::task::JoinHandle;

/// Something that changed the page without user input.
#[derive(Debug)]
pub enum SessionEvent {
    /// A snapshot was applied. Holds its record count.
    Snapshot(usize),
    /// The live query ended with an error.
    StreamFailed(String),
    /// Seeding finished, successfully or not.
    SeedFinished(SeedStatus),
}

/// What the caller should do after a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Updated,
    ShowHelp,
    Quit,
}

pub struct PageSession {
    connection: Connection,
    config: PageConfig,
    view: ViewState,
    subscription: Option<Subscription>,
    seed_status: SeedStatus,
    seed_task: Option<JoinHandle<Result<SeedReport, SeedError>>>,
}

impl std::fmt::Debug for PageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSession")
            .field("connection", &self.connection)
            .field("config", &self.config)
            .field("subscribed", &self.subscription.is_some())
            .field("seed_status", &self.seed_status)
            .finish()
    }
}

impl PageSession {
    /// Establish the session, then open the live query.
    ///
    /// # Errors
    ///
    /// [`AuthError`] if the anonymous session cannot be established. No query is
    /// opened in that case.
    pub async fn mount(connection: Connection, config: PageConfig) -> Result<Self, AuthError> {
        let session = connection.ensure_session().await?;
        let subscription = subscribe(&connection, &session, &resources_query());
        tracing::info!(seed_enabled = config.allow_demo_seed, "page mounted");
        Ok(Self {
            connection,
            config,
            view: ViewState::new(),
            subscription: Some(subscription),
            seed_status: SeedStatus::Ready,
            seed_task: None,
        })
    }

    /// Wait for the next snapshot, stream failure or seed completion.
    ///
    /// Returns `None` once there is nothing left to wait for.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let subscribed = self.subscription.is_some();
            let seeding = self.seed_task.is_some();
            if !subscribed && !seeding {
                return None;
            }

            tokio::select! {
                item = next_snapshot(&mut self.subscription), if subscribed => {
                    match item {
                        Some(Ok(records)) => return Some(self.apply_snapshot(records)),
                        Some(Err(err)) => return Some(self.fail_stream(err)),
                        None => self.subscription = None,
                    }
                }
                result = join_seed(&mut self.seed_task), if seeding => {
                    self.seed_task = None;
                    return Some(self.finish_seed(result));
                }
            }
        }
    }

    /// Apply one user command.
    ///
    /// Sort, open-by-row and close act on the table and panel as rendered with `ctx`,
    /// the same way a click would, and the resulting [`Intent`] is applied to the view.
    ///
    /// # Errors
    ///
    /// [`CommandError`] when the command refers to something that is not there. The
    /// view is left unchanged.
    pub fn handle(
        &mut self,
        command: Command,
        ctx: &RenderContext,
    ) -> Result<Outcome, CommandError> {
        let intent = match command {
            Command::Filter(text) => Intent::SetFilter(text),
            Command::Sort(key) => TableView::from_view(&self.view, ctx)
                .headers
                .iter()
                .find(|header| header.sort_key == Some(key))
                .and_then(HeaderCell::intent)
                .ok_or_else(|| CommandError::InvalidSortKey(key.name().to_string()))?,
            Command::Open(RecordRef::Id(id)) => Intent::SelectRecord(id),
            Command::Open(RecordRef::Row(row)) => {
                let table = TableView::from_view(&self.view, ctx);
                table
                    .row(row)
                    .map(TableRow::intent)
                    .ok_or(CommandError::RowOutOfRange {
                        row,
                        rows: table.rows().len(),
                    })?
            }
            Command::Close => match self.view.detail() {
                Some(detail) => DetailView::build(detail, ctx).close_intent(),
                None => return Ok(Outcome::Updated),
            },
            Command::Seed => {
                self.start_seed()?;
                return Ok(Outcome::Updated);
            }
            Command::Help => return Ok(Outcome::ShowHelp),
            Command::Quit => return Ok(Outcome::Quit),
        };
        self.view.apply(intent)?;
        Ok(Outcome::Updated)
    }

    /// Start writing demo documents in the background.
    pub fn start_seed(&mut self) -> Result<(), CommandError> {
        if !self.config.allow_demo_seed {
            return Err(CommandError::SeedDisabled);
        }
        if !self.seed_status.is_enabled() || self.seed_task.is_some() {
            return Err(CommandError::SeedUnavailable);
        }

        let connection = self.connection.clone();
        let count = self.config.seed_count;
        self.seed_status = SeedStatus::Pending;
        self.seed_task = Some(tokio::spawn(async move { seed(&connection, count).await }));
        Ok(())
    }

    pub fn page(&self, ctx: &RenderContext) -> PageView {
        PageView::build(&self.config, &self.view, &self.seed_status, ctx)
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn seed_status(&self) -> &SeedStatus {
        &self.seed_status
    }

    pub fn config(&self) -> &PageConfig {
        &self.config
    }

    /// Detach the live query and stop any running seed task.
    pub fn unmount(mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        if let Some(task) = self.seed_task.take() {
            tracing::warn!("page unmounted while seeding; remaining writes abandoned");
            task.abort();
        }
        tracing::info!("page unmounted");
    }

    fn apply_snapshot(&mut self, records: Vec<ResourceRecord>) -> SessionEvent {
        let count = records.len();
        self.view.on_snapshot(records);
        SessionEvent::Snapshot(count)
    }

    fn fail_stream(&mut self, err: SubscriptionError) -> SessionEvent {
        let message = err.to_string();
        self.view.on_stream_error(message.clone());
        self.subscription = None;
        SessionEvent::StreamFailed(message)
    }

    fn finish_seed(&mut self, result: Result<SeedReport, SeedError>) -> SessionEvent {
        match &result {
            Ok(report) => tracing::info!(written = report.written, "seeding finished"),
            Err(err) => tracing::warn!(written = err.written(), "seeding failed: {err}"),
        }
        self.seed_status = SeedStatus::finished(&result, self.config.seed_count);
        SessionEvent::SeedFinished(self.seed_status.clone())
    }
}

async fn next_snapshot(
    subscription: &mut Option<Subscription>,
) -> Option<Result<Vec<ResourceRecord>, SubscriptionError>> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

async fn join_seed(
    task: &mut Option<JoinHandle<Result<SeedReport, SeedError>>>,
) -> Result<SeedReport, SeedError> {
    match task {
        Some(handle) => match handle.await {
            Ok(result) => result,
            Err(join) => Err(SeedError::Aborted(join.to_string())),
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageBody;
    use chrono::Utc;
    use ehrview_core::constants::RESOURCES_COLLECTION;
    use ehrview_core::store::{MemoryStore, StoreFaults};
    use ehrview_core::{Connector, FirebaseOptions, SortKey, ViewError};
    use ehrview_types::DocumentId;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx() -> RenderContext {
        RenderContext::utc(Utc::now())
    }

    fn options() -> FirebaseOptions {
        FirebaseOptions {
            api_key: Some("key".into()),
            auth_domain: Some("domain".into()),
            project_id: Some("project".into()),
            in_memory: true,
            ..FirebaseOptions::default()
        }
    }

    fn connect(store: &MemoryStore) -> Connection {
        Connector::new()
            .connect_with_store(&options(), Arc::new(store.clone()))
            .expect("connect")
    }

    fn config(seed_count: usize) -> PageConfig {
        PageConfig {
            allow_demo_seed: true,
            seed_count,
            ..PageConfig::default()
        }
    }

    fn insert(store: &MemoryStore, id: &str, kind: &str, fetch: &str) {
        store.insert_with_id(
            RESOURCES_COLLECTION,
            DocumentId::new(id).expect("id"),
            json!({ "metadata": {
                "resourceType": kind,
                "state": "PROCESSING_STATE_COMPLETED",
                "fetchTime": fetch,
            }}),
        );
    }

    async fn wait_for_seed(session: &mut PageSession) -> SeedStatus {
        loop {
            match session.next_event().await.expect("event") {
                SessionEvent::SeedFinished(status) => return status,
                SessionEvent::StreamFailed(message) => panic!("stream failed: {message}"),
                SessionEvent::Snapshot(_) => {}
            }
        }
    }

    #[tokio::test]
    async fn mount_loads_first_snapshot() {
        let store = MemoryStore::new();
        insert(&store, "obs", "Observation", "2025-01-01T09:00:00Z");
        insert(&store, "cond", "Condition", "2025-01-01T10:00:00Z");
        let mut session = PageSession::mount(connect(&store), PageConfig::default())
            .await
            .expect("mount");
        assert!(session.view().is_loading());

        let event = session.next_event().await.expect("event");
        assert!(matches!(event, SessionEvent::Snapshot(2)));
        let kinds: Vec<&str> = session
            .view()
            .projection()
            .iter()
            .map(|r| r.resource_type())
            .collect();
        assert_eq!(kinds, vec!["Condition", "Observation"]);
        session.unmount();
    }

    #[tokio::test]
    async fn mount_fails_without_session() {
        let store = MemoryStore::with_faults(StoreFaults {
            reject_sign_in: Some("OPERATION_NOT_ALLOWED".into()),
            ..StoreFaults::default()
        });
        let err = PageSession::mount(connect(&store), PageConfig::default())
            .await
            .expect_err("auth fails");
        assert!(matches!(err, AuthError::Rejected(_)));
    }

    #[tokio::test]
    async fn commands_drive_the_view() {
        let store = MemoryStore::new();
        insert(&store, "obs", "Observation", "2025-01-01T09:00:00Z");
        insert(&store, "cond", "Condition", "2025-01-01T10:00:00Z");
        let mut session = PageSession::mount(connect(&store), PageConfig::default())
            .await
            .expect("mount");
        session.next_event().await.expect("snapshot");

        session.handle(Command::Filter("obs".into()), &ctx()).expect("filter");
        assert_eq!(session.view().projection().len(), 1);

        session.handle(Command::Open(RecordRef::Row(1)), &ctx()).expect("open row");
        let detail = session.view().detail().expect("open");
        assert_eq!(detail.record.id.as_str(), "obs");

        let err = session
            .handle(Command::Open(RecordRef::Row(2)), &ctx())
            .expect_err("only one row");
        assert_eq!(err, CommandError::RowOutOfRange { row: 2, rows: 1 });

        let missing = DocumentId::new("missing").expect("id");
        let err = session
            .handle(Command::Open(RecordRef::Id(missing.clone())), &ctx())
            .expect_err("unknown id");
        assert_eq!(err, CommandError::View(ViewError::UnknownRecord(missing)));

        session.handle(Command::Sort(SortKey::CreatedTime), &ctx()).expect("sort");
        assert_eq!(session.view().sort().key, SortKey::CreatedTime);

        session.handle(Command::Close, &ctx()).expect("close");
        assert!(session.view().detail().is_none());

        assert_eq!(session.handle(Command::Help, &ctx()), Ok(Outcome::ShowHelp));
        assert_eq!(session.handle(Command::Quit, &ctx()), Ok(Outcome::Quit));
        session.unmount();
    }

    #[tokio::test]
    async fn row_numbers_follow_the_rendered_table() {
        let store = MemoryStore::new();
        insert(&store, "obs", "Observation", "2025-01-01T09:00:00Z");
        insert(&store, "cond", "Condition", "2025-01-01T10:00:00Z");
        let mut session = PageSession::mount(connect(&store), PageConfig::default())
            .await
            .expect("mount");
        session.next_event().await.expect("snapshot");

        let table = TableView::from_view(session.view(), &ctx());
        assert_eq!(table.row(1).map(|r| r.id.as_str()), Some("cond"));

        // Second toggle on the current column flips it to ascending.
        session.handle(Command::Sort(SortKey::FetchTime), &ctx()).expect("sort");
        session.handle(Command::Open(RecordRef::Row(1)), &ctx()).expect("open");
        assert_eq!(session.view().detail().expect("open").record.id.as_str(), "obs");

        let table = TableView::from_view(session.view(), &ctx());
        let header = table
            .headers
            .iter()
            .find(|h| h.sort_key == Some(SortKey::FetchTime))
            .expect("fetched header");
        assert_eq!(header.indicator, Some(ehrview_core::SortDirection::Asc));

        // Closing with nothing open is accepted and changes nothing.
        session.handle(Command::Close, &ctx()).expect("close");
        assert_eq!(session.handle(Command::Close, &ctx()), Ok(Outcome::Updated));
        assert!(session.view().detail().is_none());
        session.unmount();
    }

    #[tokio::test]
    async fn seeding_disabled_by_config() {
        let store = MemoryStore::new();
        let mut session = PageSession::mount(connect(&store), PageConfig::default())
            .await
            .expect("mount");
        assert_eq!(session.handle(Command::Seed, &ctx()), Err(CommandError::SeedDisabled));
        assert_eq!(store.write_attempts(), 0);
        session.unmount();
    }

    #[tokio::test]
    async fn successful_seed_disables_control() {
        let store = MemoryStore::new();
        let mut session = PageSession::mount(connect(&store), config(3))
            .await
            .expect("mount");

        session.handle(Command::Seed, &ctx()).expect("seed");
        assert!(session.seed_status().is_pending());
        assert_eq!(session.handle(Command::Seed, &ctx()), Err(CommandError::SeedUnavailable));

        let status = wait_for_seed(&mut session).await;
        assert_eq!(status, SeedStatus::Seeded(3));
        assert_eq!(session.handle(Command::Seed, &ctx()), Err(CommandError::SeedUnavailable));
        assert_eq!(store.len(RESOURCES_COLLECTION), 3);
        session.unmount();
    }

    #[tokio::test]
    async fn failed_seed_keeps_written_docs_and_reenables_control() {
        let store = MemoryStore::with_faults(StoreFaults {
            fail_write_at: Some(10),
            ..StoreFaults::default()
        });
        let mut session = PageSession::mount(connect(&store), config(24))
            .await
            .expect("mount");

        session.handle(Command::Seed, &ctx()).expect("seed");
        let status = wait_for_seed(&mut session).await;
        assert!(matches!(
            status,
            SeedStatus::Failed {
                written: 9,
                requested: 24,
                ..
            }
        ));
        assert!(session.seed_status().is_enabled());
        assert_eq!(store.len(RESOURCES_COLLECTION), 9);
        assert_eq!(store.write_attempts(), 10);
        session.unmount();
    }

    #[tokio::test]
    async fn broken_stream_is_reported_and_ends_events() {
        let store = MemoryStore::new();
        let mut session = PageSession::mount(connect(&store), PageConfig::default())
            .await
            .expect("mount");
        session.next_event().await.expect("initial snapshot");

        store.break_listeners("connection reset");
        let event = session.next_event().await.expect("event");
        assert!(
            matches!(event, SessionEvent::StreamFailed(ref m) if m.contains("connection reset"))
        );
        assert!(session.next_event().await.is_none());

        let page = session.page(&RenderContext::local_now());
        let ready = page.ready().expect("ready");
        assert!(ready.stream_notice.is_some());
        assert!(!matches!(page.body, PageBody::Loading { .. }));
        session.unmount();
    }
}
