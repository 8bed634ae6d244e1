//! Latest known progress per campaign, fed by bus events.
//!
//! Later events overwrite earlier ones for the same campaign. There is
//! no sequence number on the wire, so an out-of-order frame simply wins.

use std::collections::HashMap;
use std::sync::Arc;

use coldreach_core::types::CampaignId;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::client::EventBusClient;
use crate::handlers::HandlerId;
use crate::messages::{BusEvent, CampaignProgressData, EventKind};

/// Snapshot of one campaign's send progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignProgress {
    pub campaign_id: CampaignId,
    pub current: u64,
    pub total: u64,
    pub percentage: f64,
    pub stage: Option<String>,
    pub status: Option<String>,
}

impl CampaignProgress {
    fn empty(campaign_id: &str) -> Self {
        Self {
            campaign_id: campaign_id.to_string(),
            current: 0,
            total: 0,
            percentage: 0.0,
            stage: None,
            status: None,
        }
    }

    fn apply_progress(&mut self, data: &CampaignProgressData) {
        self.current = data.current;
        self.total = data.total;
        self.percentage = data
            .percentage
            .unwrap_or_else(|| derive_percentage(data.current, data.total));
        if data.stage.is_some() {
            self.stage.clone_from(&data.stage);
        }
        if data.status.is_some() {
            self.status.clone_from(&data.status);
        }
    }
}

/// Percentage from counters, 0 when `total` is zero.
fn derive_percentage(current: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (current as f64 / total as f64 * 100.0).min(100.0)
}

const TRACKED_KINDS: [EventKind; 4] = [
    EventKind::CampaignProgress,
    EventKind::CampaignProgressDetailed,
    EventKind::CampaignStatus,
    EventKind::CampaignStatusDetailed,
];

/// Campaign progress map maintained from the event bus.
#[derive(Default)]
pub struct CampaignTracker {
    campaigns: Arc<RwLock<HashMap<CampaignId, CampaignProgress>>>,
    registrations: Mutex<Vec<(EventKind, HandlerId)>>,
}

impl CampaignTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the tracker's handlers on `bus`.
    ///
    /// Attaching twice without [`detach`](Self::detach) is a no-op.
    pub fn attach(&self, bus: &EventBusClient) {
        let mut registrations = self.registrations.lock();
        if !registrations.is_empty() {
            return;
        }
        for kind in TRACKED_KINDS {
            let campaigns = Arc::clone(&self.campaigns);
            let id = bus.on(kind, move |event| apply_event(&campaigns, event));
            registrations.push((kind, id));
        }
    }

    /// Remove the tracker's handlers. Collected state is kept.
    pub fn detach(&self, bus: &EventBusClient) {
        for (kind, id) in self.registrations.lock().drain(..) {
            bus.off(kind, id);
        }
    }

    pub fn get(&self, campaign_id: &str) -> Option<CampaignProgress> {
        self.campaigns.read().get(campaign_id).cloned()
    }

    /// All tracked campaigns, ordered by id.
    pub fn all(&self) -> Vec<CampaignProgress> {
        let mut all: Vec<_> = self.campaigns.read().values().cloned().collect();
        all.sort_by(|a, b| a.campaign_id.cmp(&b.campaign_id));
        all
    }

    /// Apply one event directly, without a bus.
    pub fn apply(&self, event: &BusEvent) {
        apply_event(&self.campaigns, event);
    }
}

fn apply_event(campaigns: &RwLock<HashMap<CampaignId, CampaignProgress>>, event: &BusEvent) {
    let mut campaigns = campaigns.write();
    match event {
        BusEvent::CampaignProgress(data) => {
            entry(&mut campaigns, &data.campaign_id).apply_progress(data);
        }
        BusEvent::CampaignProgressDetailed(data) => {
            entry(&mut campaigns, &data.progress.campaign_id).apply_progress(&data.progress);
        }
        BusEvent::CampaignStatus(data) => {
            entry(&mut campaigns, &data.campaign_id).status = Some(data.status.clone());
        }
        BusEvent::CampaignStatusDetailed(data) => {
            entry(&mut campaigns, &data.campaign_id).status = Some(data.status.clone());
        }
        _ => {}
    }
}

fn entry<'a>(
    campaigns: &'a mut HashMap<CampaignId, CampaignProgress>,
    campaign_id: &str,
) -> &'a mut CampaignProgress {
    campaigns
        .entry(campaign_id.to_string())
        .or_insert_with(|| CampaignProgress::empty(campaign_id))
}
