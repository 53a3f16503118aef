use canary_classifier::classify;
use canary_protocol::{Codec, Finding, Metrics, StoreDocument};
use canary_store::CategorizedStore;
use serde::Serialize;
use tracing::{info, instrument, warn};

/// What a reclassification pass did with the stored lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclassifyReport {
    /// Lines read back from the old document.
    pub examined: usize,
    /// Lines that still produce a finding.
    pub retained: usize,
    /// Lines that now round-trip cleanly.
    pub resolved: usize,
    /// Lines the codec could not be consulted about.
    pub dropped: usize,
    pub before: Metrics,
    pub after: Metrics,
}

/// Rerun every stored line through `codec` and build the document that
/// should replace `document`.
///
/// Prior classification details are discarded; only each line's timestamp,
/// room and text are reused. Findings are ordered by timestamp before being
/// filed, and the total-seen counter carries over unchanged.
#[instrument(skip(document, codec), fields(total_messages = document.total_messages))]
pub async fn reclassify_document(
    document: &StoreDocument,
    codec: &dyn Codec,
) -> (StoreDocument, ReclassifyReport) {
    let mut report = ReclassifyReport {
        before: document.metrics(),
        ..ReclassifyReport::default()
    };
    let mut findings: Vec<Finding> = Vec::new();

    for observation in document.observations() {
        report.examined += 1;
        match classify(codec, observation.clone()).await {
            Ok(Some(finding)) => findings.push(finding),
            Ok(None) => report.resolved += 1,
            Err(error) => {
                report.dropped += 1;
                warn!(
                    %error,
                    room = %observation.room,
                    raw_message = %observation.raw_message,
                    "dropping record the codec could not classify"
                );
            }
        }
    }

    findings.sort_by_key(Finding::timestamp);
    report.retained = findings.len();

    let mut next = StoreDocument::with_total(document.total_messages);
    for finding in findings {
        next.push(finding);
    }
    report.after = next.metrics();

    (next, report)
}

/// Reclassify the store's current contents and swap the result in.
pub async fn reclassify(store: &CategorizedStore, codec: &dyn Codec) -> ReclassifyReport {
    let (_, document) = store.snapshot();
    let (next, report) = reclassify_document(&document, codec).await;
    store.replace_all(next);
    info!(
        examined = report.examined,
        retained = report.retained,
        resolved = report.resolved,
        dropped = report.dropped,
        "reclassification complete"
    );
    report
}
