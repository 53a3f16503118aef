//! In-memory canonical state for the codec canary.
//!
//! [`CategorizedStore`] owns the four finding logs and the total-seen
//! counter. Live ingestion only ever appends; the reclassification job swaps
//! the whole document at once. Persistence goes through a
//! [`canary_protocol::StoreBackend`], driven by [`Flusher`].

mod file;
mod flush;
mod page;

use canary_protocol::{Category, Finding, Metrics, StoreDocument};
use parking_lot::RwLock;
use tracing::{info, instrument};

pub use file::FileStoreBackend;
pub use flush::{FlushConfig, Flusher};
pub use page::{DEFAULT_PAGE_SIZE, Page, page_bounds, paginate};

#[derive(Debug, Default)]
struct StoreState {
    document: StoreDocument,
    revision: u64,
}

/// The four finding logs plus the total-seen counter.
///
/// Every mutation bumps a revision so persistence can tell whether anything
/// changed since it last saved.
#[derive(Debug, Default)]
pub struct CategorizedStore {
    state: RwLock<StoreState>,
}

impl CategorizedStore {
    pub fn new(document: StoreDocument) -> Self {
        Self {
            state: RwLock::new(StoreState {
                document,
                revision: 0,
            }),
        }
    }

    /// File a finding under the log its variant names.
    pub fn append(&self, finding: Finding) {
        let mut state = self.state.write();
        state.document.push(finding);
        state.revision += 1;
    }

    /// Count one observed line without filing anything.
    pub fn record_seen(&self) {
        let mut state = self.state.write();
        state.document.total_messages += 1;
        state.revision += 1;
    }

    /// Count one observed line and file its finding, if any, in one step.
    pub fn observe(&self, finding: Option<Finding>) {
        let mut state = self.state.write();
        state.document.total_messages += 1;
        if let Some(finding) = finding {
            state.document.push(finding);
        }
        state.revision += 1;
    }

    /// A tail-anchored page of one log with the default page size.
    pub fn read(&self, category: Category, from: Option<usize>) -> Page<Finding> {
        self.read_page(category, from, DEFAULT_PAGE_SIZE)
    }

    pub fn read_page(
        &self,
        category: Category,
        from: Option<usize>,
        page_size: usize,
    ) -> Page<Finding> {
        let state = self.state.read();
        let bounds = page_bounds(state.document.len(category), from, page_size);
        Page {
            last: bounds.start,
            data: state.document.findings(category, bounds),
        }
    }

    pub fn total_seen(&self) -> u64 {
        self.state.read().document.total_messages
    }

    pub fn metrics(&self) -> Metrics {
        self.state.read().document.metrics()
    }

    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    /// A copy of the whole document together with the revision it reflects.
    pub fn snapshot(&self) -> (u64, StoreDocument) {
        let state = self.state.read();
        (state.revision, state.document.clone())
    }

    /// Swap in a whole new document. Readers see either the old or the new
    /// one, never a mix.
    #[instrument(skip(self, document), fields(total_messages = document.total_messages))]
    pub fn replace_all(&self, document: StoreDocument) {
        let metrics = document.metrics();
        let mut state = self.state.write();
        state.document = document;
        state.revision += 1;
        drop(state);
        info!(
            unhandled = metrics.unhandled,
            undeserializable = metrics.undeserializable,
            unserializable = metrics.unserializable,
            inequal = metrics.inequal,
            "store replaced"
        );
    }
}
