//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use gmail_cleanup::client::{LabelInfo, MailClient, ThreadPage};
use gmail_cleanup::error::{CleanupError, Result};
use gmail_cleanup::service::ServiceProvider;
use gmail_cleanup::tools::{CleanupTools, ToolSettings};
use gmail_cleanup::unsubscribe::LinkFetcher;
use mockall::mock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A thread in the simulated mailbox
#[derive(Debug, Clone, Default)]
pub struct FakeThread {
    pub id: String,
    pub age_days: u32,
    /// Whole rule strings (or bare search terms) this thread matches
    pub tags: HashSet<String>,
    pub label_ids: HashSet<String>,
    pub headers: Vec<(String, String)>,
}

impl FakeThread {
    pub fn new(id: &str, age_days: u32) -> Self {
        Self {
            id: id.to_string(),
            age_days,
            ..Default::default()
        }
    }

    pub fn matching(mut self, rule: &str) -> Self {
        self.tags.insert(rule.to_string());
        self
    }

    pub fn labelled(mut self, label_id: &str) -> Self {
        self.label_ids.insert(label_id.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug)]
struct MailboxState {
    threads: Vec<FakeThread>,
    labels: Vec<LabelInfo>,
    trashed: Vec<String>,
    deleted: Vec<String>,
    page_ceiling: u32,
    list_calls: usize,
    page_sizes: Vec<u32>,
    label_creates: usize,
    mutation_calls: usize,
    failing_ids: HashSet<String>,
    failing_queries: HashSet<String>,
    failing_header_ids: HashSet<String>,
}

impl Default for MailboxState {
    fn default() -> Self {
        Self {
            threads: Vec::new(),
            labels: Vec::new(),
            trashed: Vec::new(),
            deleted: Vec::new(),
            page_ceiling: 500,
            list_calls: 0,
            page_sizes: Vec::new(),
            label_creates: 0,
            mutation_calls: 0,
            failing_ids: HashSet::new(),
            failing_queries: HashSet::new(),
            failing_header_ids: HashSet::new(),
        }
    }
}

fn parse_days(term: &str) -> Option<u32> {
    term.strip_suffix('d')?.parse().ok()
}

/// Minimal query evaluator
///
/// A thread matches when it is tagged with the whole query, or when every
/// whitespace-separated term holds: `label:"name"`, `older_than:Nd`,
/// `newer_than:Nd`, or a bare tag.
fn matches(thread: &FakeThread, labels: &[LabelInfo], query: &str) -> bool {
    if thread.tags.contains(query) {
        return true;
    }
    query.split_whitespace().all(|term| {
        if let Some(name) = term.strip_prefix("label:") {
            let name = name.trim_matches('"');
            labels
                .iter()
                .any(|l| l.name == name && thread.label_ids.contains(&l.id))
        } else if let Some(days) = term.strip_prefix("older_than:").and_then(parse_days) {
            thread.age_days > days
        } else if let Some(days) = term.strip_prefix("newer_than:").and_then(parse_days) {
            thread.age_days < days
        } else {
            thread.tags.contains(term)
        }
    })
}

/// In-memory mailbox implementing `MailClient`
///
/// Clones share state. A read-only view rejects every mutation with
/// `Forbidden`, like a client holding only the readonly scope.
#[derive(Clone, Default)]
pub struct FakeMailbox {
    state: Arc<Mutex<MailboxState>>,
    read_only: bool,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threads(threads: Vec<FakeThread>) -> Self {
        let mailbox = Self::new();
        mailbox.state.lock().unwrap().threads = threads;
        mailbox
    }

    /// `count` threads `t0..` all tagged with `rule`
    pub fn with_rule_matches(rule: &str, count: usize) -> Self {
        Self::with_threads(
            (0..count)
                .map(|i| FakeThread::new(&format!("t{}", i), 1).matching(rule))
                .collect(),
        )
    }

    pub fn read_only_view(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            read_only: true,
        }
    }

    pub fn add_thread(&self, thread: FakeThread) {
        self.state.lock().unwrap().threads.push(thread);
    }

    pub fn add_label(&self, id: &str, name: &str) {
        self.state.lock().unwrap().labels.push(LabelInfo {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    /// Largest page the simulated service returns regardless of the request
    pub fn set_page_ceiling(&self, ceiling: u32) {
        self.state.lock().unwrap().page_ceiling = ceiling;
    }

    pub fn fail_mutations_for(&self, thread_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_ids
            .insert(thread_id.to_string());
    }

    pub fn fail_query(&self, query: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_queries
            .insert(query.to_string());
    }

    pub fn fail_headers_for(&self, thread_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_header_ids
            .insert(thread_id.to_string());
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn page_sizes(&self) -> Vec<u32> {
        self.state.lock().unwrap().page_sizes.clone()
    }

    pub fn label_creates(&self) -> usize {
        self.state.lock().unwrap().label_creates
    }

    pub fn mutation_calls(&self) -> usize {
        self.state.lock().unwrap().mutation_calls
    }

    pub fn labels(&self) -> Vec<LabelInfo> {
        self.state.lock().unwrap().labels.clone()
    }

    pub fn label_id(&self, name: &str) -> Option<String> {
        self.labels().into_iter().find(|l| l.name == name).map(|l| l.id)
    }

    /// Ids of live threads carrying `label_id`
    pub fn threads_with_label(&self, label_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .threads
            .iter()
            .filter(|t| t.label_ids.contains(label_id))
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn label_ids_of(&self, thread_id: &str) -> HashSet<String> {
        self.state
            .lock()
            .unwrap()
            .threads
            .iter()
            .find(|t| t.id == thread_id)
            .map(|t| t.label_ids.clone())
            .unwrap_or_default()
    }

    pub fn trashed(&self) -> Vec<String> {
        self.state.lock().unwrap().trashed.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    fn check_write(&self, operation: &str) -> Result<()> {
        if self.read_only {
            return Err(CleanupError::Forbidden(format!(
                "{} requires a write-scope client",
                operation
            )));
        }
        Ok(())
    }

    /// Count the attempt, then fail it if the thread is marked failing or unknown
    fn begin_mutation(state: &mut MailboxState, thread_id: &str) -> Result<usize> {
        state.mutation_calls += 1;
        if state.failing_ids.contains(thread_id) {
            return Err(CleanupError::ServerError {
                status: 500,
                message: format!("simulated failure for {}", thread_id),
            });
        }
        state
            .threads
            .iter()
            .position(|t| t.id == thread_id)
            .ok_or_else(|| CleanupError::NotFound(format!("thread {}", thread_id)))
    }
}

#[async_trait]
impl MailClient for FakeMailbox {
    async fn list_threads(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ThreadPage> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        state.page_sizes.push(page_size);

        if state.failing_queries.contains(query) {
            return Err(CleanupError::ServerError {
                status: 500,
                message: format!("simulated search failure for {}", query),
            });
        }

        let matching: Vec<String> = state
            .threads
            .iter()
            .filter(|t| matches(t, &state.labels, query))
            .map(|t| t.id.clone())
            .collect();

        let offset = page_token
            .and_then(|t| t.parse::<usize>().ok())
            .unwrap_or(0)
            .min(matching.len());
        let take = page_size.min(state.page_ceiling) as usize;
        let end = (offset + take).min(matching.len());

        Ok(ThreadPage {
            thread_ids: matching[offset..end].to_vec(),
            next_page_token: (end < matching.len()).then(|| end.to_string()),
        })
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        self.check_write("labels.create")?;
        let mut state = self.state.lock().unwrap();
        state.label_creates += 1;
        let id = format!("Label_{}", state.labels.len() + 1);
        state.labels.push(LabelInfo {
            id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn modify_thread_labels(
        &self,
        thread_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        self.check_write("threads.modify")?;
        let mut state = self.state.lock().unwrap();
        let index = Self::begin_mutation(&mut state, thread_id)?;
        let thread = &mut state.threads[index];
        for id in remove_label_ids {
            thread.label_ids.remove(id);
        }
        thread.label_ids.extend(add_label_ids.iter().cloned());
        Ok(())
    }

    async fn trash_thread(&self, thread_id: &str) -> Result<()> {
        self.check_write("threads.trash")?;
        let mut state = self.state.lock().unwrap();
        let index = Self::begin_mutation(&mut state, thread_id)?;
        let thread = state.threads.remove(index);
        state.trashed.push(thread.id);
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.check_write("threads.delete")?;
        let mut state = self.state.lock().unwrap();
        let index = Self::begin_mutation(&mut state, thread_id)?;
        let thread = state.threads.remove(index);
        state.deleted.push(thread.id);
        Ok(())
    }

    async fn thread_header_values(&self, thread_id: &str, header: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if state.failing_header_ids.contains(thread_id) {
            return Err(CleanupError::NotFound(format!("thread {}", thread_id)));
        }
        let thread = state
            .threads
            .iter()
            .find(|t| t.id == thread_id)
            .ok_or_else(|| CleanupError::NotFound(format!("thread {}", thread_id)))?;
        Ok(thread
            .headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(header))
            .map(|(_, value)| value.clone())
            .collect())
    }
}

/// Provider handing out a read-only view and a writable view of one mailbox
pub struct FakeProvider {
    mailbox: FakeMailbox,
    unavailable: Option<String>,
    reader_acquisitions: AtomicUsize,
    writer_acquisitions: AtomicUsize,
}

impl FakeProvider {
    pub fn new(mailbox: FakeMailbox) -> Self {
        Self {
            mailbox,
            unavailable: None,
            reader_acquisitions: AtomicUsize::new(0),
            writer_acquisitions: AtomicUsize::new(0),
        }
    }

    /// Provider whose every acquisition fails
    pub fn unavailable(reason: &str) -> Self {
        Self {
            unavailable: Some(reason.to_string()),
            ..Self::new(FakeMailbox::new())
        }
    }

    pub fn reader_acquisitions(&self) -> usize {
        self.reader_acquisitions.load(Ordering::SeqCst)
    }

    pub fn writer_acquisitions(&self) -> usize {
        self.writer_acquisitions.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        match &self.unavailable {
            Some(reason) => Err(CleanupError::ServiceUnavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ServiceProvider for FakeProvider {
    async fn reader(&self) -> Result<Arc<dyn MailClient>> {
        self.reader_acquisitions.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(Arc::new(self.mailbox.read_only_view()))
    }

    async fn writer(&self) -> Result<Arc<dyn MailClient>> {
        self.writer_acquisitions.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(Arc::new(self.mailbox.clone()))
    }
}

/// Link fetcher answering from a fixed table; unknown urls fail
#[derive(Default)]
pub struct StaticFetcher {
    statuses: HashMap<String, u16>,
    calls: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<u16> {
        self.calls.lock().unwrap().push(url.to_string());
        self.statuses
            .get(url)
            .copied()
            .ok_or_else(|| CleanupError::NetworkError(format!("connection refused: {}", url)))
    }
}

pub fn settings_with_label(label: &str) -> ToolSettings {
    ToolSettings {
        review_label: label.to_string(),
        ..ToolSettings::default()
    }
}

pub fn tools_over(provider: Arc<FakeProvider>, fetcher: Arc<StaticFetcher>) -> CleanupTools {
    CleanupTools::new(provider, fetcher, settings_with_label("trash-can"))
}

// Mock implementation of MailClient for testing
mock! {
    pub MailClient {}

    #[async_trait]
    impl MailClient for MailClient {
        async fn list_threads<'a, 'b, 'c>(
            &'a self,
            query: &'b str,
            page_size: u32,
            page_token: Option<&'c str>,
        ) -> Result<ThreadPage>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn create_label(&self, name: &str) -> Result<String>;
        async fn modify_thread_labels(
            &self,
            thread_id: &str,
            add_label_ids: &[String],
            remove_label_ids: &[String],
        ) -> Result<()>;
        async fn trash_thread(&self, thread_id: &str) -> Result<()>;
        async fn delete_thread(&self, thread_id: &str) -> Result<()>;
        async fn thread_header_values(&self, thread_id: &str, header: &str) -> Result<Vec<String>>;
    }
}

pub fn page(ids: &[&str], next: Option<&str>) -> ThreadPage {
    ThreadPage {
        thread_ids: ids.iter().map(|s| s.to_string()).collect(),
        next_page_token: next.map(|s| s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_mailbox_pages_by_offset() {
        let mailbox = FakeMailbox::with_rule_matches("rule", 5);
        let first = mailbox.list_threads("rule", 2, None).await.unwrap();
        assert_eq!(first.thread_ids, vec!["t0", "t1"]);
        assert_eq!(first.next_page_token.as_deref(), Some("2"));

        let last = mailbox.list_threads("rule", 10, Some("4")).await.unwrap();
        assert_eq!(last.thread_ids, vec!["t4"]);
        assert!(last.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_fake_mailbox_compound_query() {
        let mailbox = FakeMailbox::with_threads(vec![
            FakeThread::new("old", 30).labelled("L1"),
            FakeThread::new("young", 2).labelled("L1"),
            FakeThread::new("unlabelled", 30),
        ]);
        mailbox.add_label("L1", "trash-can");

        let page = mailbox
            .list_threads(r#"label:"trash-can" older_than:7d"#, 500, None)
            .await
            .unwrap();
        assert_eq!(page.thread_ids, vec!["old"]);
    }

    #[tokio::test]
    async fn test_read_only_view_rejects_writes() {
        let mailbox = FakeMailbox::with_rule_matches("rule", 1);
        let reader = mailbox.read_only_view();
        assert!(matches!(
            reader.trash_thread("t0").await,
            Err(CleanupError::Forbidden(_))
        ));
        assert_eq!(mailbox.mutation_calls(), 0);
    }
}
