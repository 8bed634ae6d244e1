//! `UsageMonitor` fed through a live `EventBusClient`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use coldreach_billing::UsageMonitor;
use coldreach_core::config::BusConfig;
use coldreach_events::{BusConnection, BusConnector, BusError, EventBusClient};
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};

type Push = mpsc::UnboundedSender<Result<String, BusError>>;

/// Accepts one connection and hands its server-side push channel to the test.
struct OneShotConnector {
    push: Mutex<Option<tokio::sync::oneshot::Sender<Push>>>,
}

#[async_trait]
impl BusConnector for OneShotConnector {
    async fn connect(&self, _url: &str) -> Result<BusConnection, BusError> {
        let Some(ready) = self.push.lock().unwrap().take() else {
            return Err(BusError::Connection("already connected once".into()));
        };
        let (client_tx, server_rx) = mpsc::unbounded::<String>();
        let (server_tx, client_rx) = mpsc::unbounded();
        let _ = ready.send(server_tx);

        // Client frames are not inspected here.
        tokio::spawn(server_rx.for_each(|_| async {}));

        Ok(BusConnection {
            sink: Box::pin(client_tx.sink_map_err(|e| BusError::Transport(e.to_string()))),
            stream: client_rx.boxed(),
        })
    }
}

async fn connected_bus() -> (EventBusClient, Push) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let connector = Arc::new(OneShotConnector {
        push: Mutex::new(Some(tx)),
    });
    let bus = EventBusClient::new(connector, "ws://bus.test/ws", BusConfig::default());
    bus.connect("t").unwrap();
    let push = tokio::time::timeout(Duration::from_secs(10), rx)
        .await
        .expect("bus should connect")
        .expect("connector should hand over the push channel");
    (bus, push)
}

async fn eventually<F: FnMut() -> bool>(mut condition: F) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition should hold before the timeout");
}

fn send(push: &Push, json: &str) {
    push.unbounded_send(Ok(json.to_string())).unwrap();
}

// ---------------------------------------------------------------------------
// Test: usage updates from the bus drive the limit queries
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn usage_updates_flow_from_bus() {
    let (bus, push) = connected_bus().await;
    let monitor = UsageMonitor::default();
    monitor.attach(&bus);

    send(
        &push,
        r#"{"type":"usage_update","data":{"metric":"emails","period":"2026-10","current":900,"limit":1000}}"#,
    );
    eventually(|| monitor.usage("emails").is_some()).await;
    assert_eq!(monitor.get_usage_percentage("emails"), 90.0);
    assert!(!monitor.has_usage_limit_reached("emails"));

    send(
        &push,
        r#"{"type":"usage_update","data":{"metric":"emails","period":"2026-10","current":1000,"limit":1000,"percentage":100}}"#,
    );
    eventually(|| monitor.has_usage_limit_reached("emails")).await;
    assert_eq!(monitor.all_usage().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: alerts inside a batch are de-duplicated and dismissible
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn batched_alerts_are_deduplicated() {
    let (bus, push) = connected_bus().await;
    let monitor = UsageMonitor::new(50);
    monitor.attach(&bus);

    send(
        &push,
        r#"{"type":"progress_batch","data":{"events":[
            {"type":"billing_alert","data":{"severity":"warning","title":"80% used","message":"m"}},
            {"type":"billing_alert","data":{"severity":"warning","title":"80% used","message":"m"}},
            {"type":"billing_alert","data":{"id":"srv-9","severity":"critical","title":"Limit reached","message":"m"}}
        ]}}"#,
    );
    eventually(|| bus.metrics().total_events == 3).await;

    let alerts = monitor.alerts();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].id, "srv-9");
    assert!(alerts[1].id.starts_with("alert-"));

    assert!(monitor.dismiss_alert_by_id("srv-9").is_some());
    assert_eq!(monitor.alerts().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: detach stops further updates
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn detach_stops_updates() {
    let (bus, push) = connected_bus().await;
    let monitor = UsageMonitor::default();
    monitor.attach(&bus);
    monitor.detach(&bus);

    send(
        &push,
        r#"{"type":"usage_update","data":{"metric":"emails","period":"2026-10","current":5,"limit":10}}"#,
    );
    eventually(|| bus.metrics().total_events == 1).await;
    assert!(monitor.usage("emails").is_none());
}
