//! Reference-data fetch hooks for the service form.
//!
//! A hook owns the state of one list (categories, or the subcategories of the
//! selected category). Each fetch takes a ticket; only the most recently
//! issued ticket may write its result, and nothing is written after
//! `unmount`. In-flight requests are left to finish and their results dropped.

use log::debug;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::gateway::DataGateway;
use crate::models::{Category, Subcategory};

#[derive(Debug, Clone, PartialEq)]
pub enum FetchState<T> {
    Idle,
    Loading,
    Ready(Vec<T>),
    Errored(String),
}

impl<T> FetchState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading)
    }

    /// The loaded rows, empty in every other state.
    pub fn items(&self) -> &[T] {
        match self {
            FetchState::Ready(items) => items,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            FetchState::Errored(message) => Some(message),
            _ => None,
        }
    }
}

struct HookState<T> {
    name: &'static str,
    state: watch::Sender<FetchState<T>>,
    issued: AtomicU64,
    lifetime: CancellationToken,
}

impl<T: Clone> HookState<T> {
    fn new(name: &'static str) -> Self {
        let (state, _) = watch::channel(FetchState::Idle);
        Self {
            name,
            state,
            issued: AtomicU64::new(0),
            lifetime: CancellationToken::new(),
        }
    }

    /// Issue a new ticket and move to `next`. Issuing and writing share the
    /// channel lock, so a result can never land between a newer ticket and
    /// its `Loading`.
    fn issue(&self, next: FetchState<T>) -> Option<u64> {
        if self.lifetime.is_cancelled() {
            return None;
        }
        let mut ticket = 0;
        self.state.send_modify(|state| {
            ticket = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            *state = next;
        });
        Some(ticket)
    }

    fn complete(&self, ticket: u64, result: Result<Vec<T>>) {
        if self.lifetime.is_cancelled() {
            debug!("{}: result arrived after unmount, dropped", self.name);
            return;
        }

        let next = match result {
            Ok(items) => FetchState::Ready(items),
            Err(err) => FetchState::Errored(err.user_message()),
        };
        let written = self.state.send_if_modified(|state| {
            if self.issued.load(Ordering::SeqCst) != ticket {
                return false;
            }
            *state = next;
            true
        });
        if !written {
            debug!("{}: stale result for request {} dropped", self.name, ticket);
        }
    }

    async fn run<F>(&self, fetch: F)
    where
        F: Future<Output = Result<Vec<T>>>,
    {
        let Some(ticket) = self.issue(FetchState::Loading) else {
            debug!("{}: unmounted, fetch skipped", self.name);
            return;
        };
        let result = fetch.await;
        self.complete(ticket, result);
    }

    fn snapshot(&self) -> FetchState<T> {
        self.state.borrow().clone()
    }
}

/// All categories, fetched on mount.
pub struct CategoriesHook {
    data: Arc<DataGateway>,
    inner: HookState<Category>,
}

impl CategoriesHook {
    pub async fn mount(data: Arc<DataGateway>) -> Self {
        let hook = Self {
            data,
            inner: HookState::new("categories"),
        };
        hook.refresh().await;
        hook
    }

    pub async fn refresh(&self) {
        self.inner.run(self.data.list_categories()).await;
    }

    pub fn state(&self) -> FetchState<Category> {
        self.inner.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState<Category>> {
        self.inner.state.subscribe()
    }

    pub fn unmount(&self) {
        self.inner.lifetime.cancel();
    }
}

/// Subcategories of the currently selected category.
pub struct SubcategoriesHook {
    data: Arc<DataGateway>,
    inner: HookState<Subcategory>,
}

impl SubcategoriesHook {
    pub fn mount(data: Arc<DataGateway>) -> Self {
        Self {
            data,
            inner: HookState::new("subcategories"),
        }
    }

    /// Load the subcategories of `category_id`. Clearing the selection
    /// empties the list without a request.
    pub async fn select_category(&self, category_id: Option<i64>) {
        match category_id {
            Some(category_id) => {
                self.inner
                    .run(self.data.list_subcategories(category_id))
                    .await
            }
            None => {
                self.inner.issue(FetchState::Ready(Vec::new()));
            }
        }
    }

    pub fn state(&self) -> FetchState<Subcategory> {
        self.inner.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState<Subcategory>> {
        self.inner.state.subscribe()
    }

    pub fn unmount(&self) {
        self.inner.lifetime.cancel();
    }
}
